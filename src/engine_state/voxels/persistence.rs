//! # Chunk Persistence
//!
//! Binary formats for chunks leaving memory.
//!
//! ## Disk
//!
//! One file per chunk, `chunk_{x}_{z}.bin`, holding the raw three-byte blocks in storage order
//! (x outer, y middle, z inner). Files are exactly `CHUNK_VOLUME * 3` bytes.
//!
//! ## Network
//!
//! Blocks are flattened x fastest, then z, then y, and run-length encoded:
//!
//! ```text
//! x: i32 | z: i32 | packet_count: i32 | (block: [u8; 3], count: i32) * packet_count
//! ```
//!
//! All integers are big-endian. Runs that stop short of a full chunk leave the remainder as air.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use super::block::{Block, BLOCK_DATA_BYTES};
use super::chunk::{Chunk, CHUNK_HEIGHT, CHUNK_SIZE, CHUNK_VOLUME};
use crate::error::{PipelineError, Result};

const INT_BYTES: usize = 4;
const HEADER_BYTES: usize = 3 * INT_BYTES;
const PACKET_BYTES: usize = BLOCK_DATA_BYTES + INT_BYTES;

/// Size in bytes of one chunk file.
pub const CHUNK_FILE_BYTES: usize = CHUNK_VOLUME * BLOCK_DATA_BYTES;

/// Path of the file holding chunk `(x, z)`.
pub fn chunk_file_path(worlds_dir: &Path, x: i32, z: i32) -> PathBuf {
    worlds_dir.join(format!("chunk_{}_{}.bin", x, z))
}

/// Writes a chunk to `worlds_dir`, creating the directory when needed.
pub fn save_chunk(chunk: &Chunk, worlds_dir: &Path) -> Result<()> {
    fs::create_dir_all(worlds_dir)?;
    let bytes: &[u8] = bytemuck::cast_slice(chunk.blocks());
    fs::write(chunk_file_path(worlds_dir, chunk.x, chunk.z), bytes)?;
    log::debug!("Saved chunk ({}, {})", chunk.x, chunk.z);
    Ok(())
}

/// Reads chunk `(x, z)` from `worlds_dir`.
///
/// # Returns
/// `Ok(None)` when no file exists for the chunk. The loaded chunk is not marked modified.
///
/// # Errors
/// `PipelineError::Codec` for a file of the wrong size, `PipelineError::Io` for read failures.
pub fn load_chunk(worlds_dir: &Path, x: i32, z: i32) -> Result<Option<Chunk>> {
    let bytes = match fs::read(chunk_file_path(worlds_dir, x, z)) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    if bytes.len() != CHUNK_FILE_BYTES {
        return Err(PipelineError::Codec(format!(
            "chunk file ({}, {}) is {} bytes, expected {}",
            x,
            z,
            bytes.len(),
            CHUNK_FILE_BYTES
        )));
    }
    let blocks: Vec<Block> = bytes
        .chunks_exact(BLOCK_DATA_BYTES)
        .map(|b| Block::from_bytes([b[0], b[1], b[2]]))
        .collect();
    log::debug!("Loaded chunk ({}, {}) from disk", x, z);
    Chunk::from_blocks(x, z, blocks).map(Some)
}

/// Network order: x fastest, then z, then y.
fn network_order() -> impl Iterator<Item = (usize, usize, usize)> {
    (0..CHUNK_HEIGHT).flat_map(|y| {
        (0..CHUNK_SIZE).flat_map(move |z| (0..CHUNK_SIZE).map(move |x| (x, y, z)))
    })
}

/// Run-length encodes a chunk for the network.
pub fn compress_chunk(chunk: &Chunk) -> Vec<u8> {
    let mut packets: Vec<(Block, u32)> = Vec::new();
    for (x, y, z) in network_order() {
        let block = chunk.block(x, y, z);
        match packets.last_mut() {
            Some((last, count)) if *last == block => *count += 1,
            _ => packets.push((block, 1)),
        }
    }

    let mut out = Vec::with_capacity(HEADER_BYTES + packets.len() * PACKET_BYTES);
    out.extend_from_slice(&chunk.x.to_be_bytes());
    out.extend_from_slice(&chunk.z.to_be_bytes());
    out.extend_from_slice(&(packets.len() as u32).to_be_bytes());
    for (block, count) in &packets {
        out.extend_from_slice(&block.to_bytes());
        out.extend_from_slice(&count.to_be_bytes());
    }
    out
}

fn read_u32(bytes: &[u8], at: usize) -> u32 {
    u32::from_be_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]])
}

/// Decodes a run-length encoded chunk.
///
/// # Errors
/// `PipelineError::Codec` when the buffer is shorter than a header and one packet, when it ends
/// inside a packet, or when the runs add up to more blocks than a chunk holds.
pub fn decompress_chunk(bytes: &[u8]) -> Result<Chunk> {
    if bytes.len() < HEADER_BYTES + PACKET_BYTES {
        return Err(PipelineError::Codec(format!(
            "buffer of {} bytes is smaller than the minimum of {}",
            bytes.len(),
            HEADER_BYTES + PACKET_BYTES
        )));
    }
    let x = read_u32(bytes, 0) as i32;
    let z = read_u32(bytes, INT_BYTES) as i32;
    let packet_count = read_u32(bytes, 2 * INT_BYTES) as usize;
    let needed = packet_count
        .checked_mul(PACKET_BYTES)
        .and_then(|n| n.checked_add(HEADER_BYTES));
    if needed.is_none_or(|n| bytes.len() < n) {
        return Err(PipelineError::Codec(format!(
            "buffer of {} bytes is truncated for {} packets",
            bytes.len(),
            packet_count
        )));
    }

    let mut flat = vec![Block::AIR; CHUNK_VOLUME];
    let mut filled = 0usize;
    for packet in bytes[HEADER_BYTES..]
        .chunks_exact(PACKET_BYTES)
        .take(packet_count)
    {
        let block = Block::from_bytes([packet[0], packet[1], packet[2]]);
        let count = read_u32(packet, BLOCK_DATA_BYTES) as usize;
        let end = filled
            .checked_add(count)
            .filter(|end| *end <= CHUNK_VOLUME)
            .ok_or_else(|| {
                PipelineError::Codec(format!("runs overflow chunk ({}, {})", x, z))
            })?;
        flat[filled..end].fill(block);
        filled = end;
    }

    let mut blocks = vec![Block::AIR; CHUNK_VOLUME];
    for (flat_block, (bx, by, bz)) in flat.into_iter().zip(network_order()) {
        blocks[Chunk::index(bx, by, bz)] = flat_block;
    }
    Chunk::from_blocks(x, z, blocks)
}
