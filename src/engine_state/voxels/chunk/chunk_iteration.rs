//! # Chunk Iteration Module
//!
//! This module provides an iterator over the blocks a mesh build samples.
//!
//! ## Strided Iteration
//!
//! A mesh built at LOD `n` samples every `n`th block along each axis, so the iterator steps by the
//! stride in x, z and y (in that nesting order) and skips air. At LOD 1 it visits every non-air
//! block in the chunk.

use super::{Chunk, CHUNK_HEIGHT, CHUNK_SIZE};
use crate::engine_state::voxels::block::{Block, BlockTypeSize};

/// An iterator over the non-air blocks of a chunk on a fixed stride.
///
/// Yields `(x, y, z, block)` with chunk-local coordinates.
pub struct ChunkBlockIterator<'a> {
    /// Reference to the chunk being iterated over
    chunk_ref: &'a Chunk,
    /// Id treated as empty
    air_id: BlockTypeSize,
    /// Step between sampled blocks, at least 1
    stride: usize,
    local_x: usize,
    local_y: usize,
    local_z: usize,
}

impl<'a> ChunkBlockIterator<'a> {
    /// Creates an iterator starting at the chunk origin.
    ///
    /// # Arguments
    /// * `chunk_ref` - The chunk to iterate over
    /// * `stride` - LOD stride, clamped to at least 1
    /// * `air_id` - Block type id that is skipped
    pub fn new(chunk_ref: &'a Chunk, stride: usize, air_id: BlockTypeSize) -> Self {
        ChunkBlockIterator {
            chunk_ref,
            air_id,
            stride: stride.max(1),
            local_x: 0,
            local_y: 0,
            local_z: 0,
        }
    }

    fn advance(&mut self) {
        self.local_y += self.stride;
        if self.local_y >= CHUNK_HEIGHT {
            self.local_y = 0;
            self.local_z += self.stride;
            if self.local_z >= CHUNK_SIZE {
                self.local_z = 0;
                self.local_x += self.stride;
            }
        }
    }
}

impl Iterator for ChunkBlockIterator<'_> {
    type Item = (usize, usize, usize, Block);

    fn next(&mut self) -> Option<Self::Item> {
        while self.local_x < CHUNK_SIZE {
            let (x, y, z) = (self.local_x, self.local_y, self.local_z);
            self.advance();
            let block = self.chunk_ref.block(x, y, z);
            if block.id() != self.air_id {
                return Some((x, y, z, block));
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_skips_air() {
        let mut chunk = Chunk::empty(0, 0);
        chunk.set(8, 64, 8, Block::of_type(4)).unwrap();
        chunk.set(0, 0, 15, Block::of_type(2)).unwrap();
        let found: Vec<_> = ChunkBlockIterator::new(&chunk, 1, 0)
            .map(|(x, y, z, b)| (x, y, z, b.id()))
            .collect();
        assert_eq!(found, vec![(0, 0, 15, 2), (8, 64, 8, 4)]);
    }

    #[test]
    fn test_stride_samples_grid() {
        let mut chunk = Chunk::empty(0, 0);
        for x in 0..CHUNK_SIZE as i32 {
            chunk.set(x, 0, 0, Block::of_type(3)).unwrap();
        }
        assert_eq!(ChunkBlockIterator::new(&chunk, 4, 0).count(), 4);
        assert_eq!(ChunkBlockIterator::new(&chunk, 16, 0).count(), 1);
        assert_eq!(ChunkBlockIterator::new(&chunk, 0, 0).count(), 16);
    }
}
