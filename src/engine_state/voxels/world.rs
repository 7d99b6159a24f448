//! # World Module
//!
//! This module provides the `VoxelStore`, which owns every chunk in memory and hands out shared
//! handles to them.
//!
//! ## Architecture
//!
//! Chunks are kept in a hash map keyed by chunk coordinates. Each chunk sits in its own
//! `MtResource`, so a mesh build can hold read guards on a chunk and its four neighbors while an
//! edit elsewhere in the world takes a write guard on an unrelated chunk. The map itself is only
//! locked long enough to look up or insert a handle.
//!
//! Missing chunks are loaded from `worlds_dir` when persistence is enabled, and generated
//! otherwise.
//!
//! ## Performance Considerations
//!
//! - Chunk lookup is O(1) using a hash map
//! - Generation happens outside the map lock; if two threads race to create the same chunk, the
//!   first insert wins and the other result is dropped
//! - `evict_outside` bounds memory for long sessions

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{PoisonError, RwLock};

use super::chunk::chunk_creation::TerrainGenerator;
use super::chunk::{Chunk, CHUNK_SIZE};
use super::persistence;
use crate::core::MtResource;
use crate::error::Result;

/// The four horizontal neighbors of a chunk, in `[north, west, south, east]` order.
pub type Neighbors = [Option<MtResource<Chunk>>; 4];

/// Converts a world coordinate into `(chunk, local)` coordinates, rounding toward negative
/// infinity so that world x = -1 lands in chunk -1 at local 15.
pub fn world_to_chunk(world: i32) -> (i32, i32) {
    let size = CHUNK_SIZE as i32;
    (world.div_euclid(size), world.rem_euclid(size))
}

/// In-memory cache of chunks keyed by chunk coordinates.
pub struct VoxelStore {
    chunks: RwLock<HashMap<(i32, i32), MtResource<Chunk>>>,
    generator: Box<dyn TerrainGenerator>,
    worlds_dir: Option<PathBuf>,
}

impl VoxelStore {
    /// Creates an empty store.
    ///
    /// # Arguments
    /// * `generator` - Produces chunks that are neither cached nor on disk
    /// * `worlds_dir` - Directory for chunk files, or `None` to keep the world in memory only
    pub fn new(generator: Box<dyn TerrainGenerator>, worlds_dir: Option<PathBuf>) -> Self {
        VoxelStore {
            chunks: RwLock::new(HashMap::new()),
            generator,
            worlds_dir,
        }
    }

    /// Returns the chunk at `(x, z)`, loading or generating it when it is not cached.
    ///
    /// Exactly one chunk instance exists per coordinate: concurrent callers always receive
    /// handles to the same chunk.
    pub fn get_chunk(&self, x: i32, z: i32) -> MtResource<Chunk> {
        if let Some(chunk) = self.try_get_chunk(x, z) {
            return chunk;
        }

        let chunk = MtResource::new(self.load_or_generate(x, z));
        let mut chunks = self.chunks.write().unwrap_or_else(PoisonError::into_inner);
        chunks.entry((x, z)).or_insert(chunk).clone()
    }

    /// Returns the chunk at `(x, z)` only if it is already in memory.
    pub fn try_get_chunk(&self, x: i32, z: i32) -> Option<MtResource<Chunk>> {
        self.chunks
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&(x, z))
            .cloned()
    }

    /// Resolves world coordinates to the owning chunk and the chunk-local `(x, z)`.
    pub fn get_chunk_at(&self, world_x: i32, world_z: i32) -> (MtResource<Chunk>, i32, i32) {
        let (cx, lx) = world_to_chunk(world_x);
        let (cz, lz) = world_to_chunk(world_z);
        (self.get_chunk(cx, cz), lx, lz)
    }

    /// The four horizontal neighbors of `(x, z)`, creating any that are missing.
    pub fn neighbors(&self, x: i32, z: i32) -> Neighbors {
        [
            Some(self.get_chunk(x, z - 1)),
            Some(self.get_chunk(x + 1, z)),
            Some(self.get_chunk(x, z + 1)),
            Some(self.get_chunk(x - 1, z)),
        ]
    }

    /// The four horizontal neighbors of `(x, z)` that are already in memory.
    pub fn loaded_neighbors(&self, x: i32, z: i32) -> Neighbors {
        [
            self.try_get_chunk(x, z - 1),
            self.try_get_chunk(x + 1, z),
            self.try_get_chunk(x, z + 1),
            self.try_get_chunk(x - 1, z),
        ]
    }

    /// Number of chunks in memory.
    pub fn len(&self) -> usize {
        self.chunks
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Whether no chunks are in memory.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether chunks are persisted to disk.
    pub fn persistence_enabled(&self) -> bool {
        self.worlds_dir.is_some()
    }

    /// Writes every modified chunk to disk and clears its `modified` flag.
    ///
    /// # Returns
    /// The number of chunks written. Always 0 when persistence is disabled.
    pub fn save_modified(&self) -> Result<usize> {
        let Some(dir) = &self.worlds_dir else {
            return Ok(0);
        };
        let handles: Vec<_> = self
            .chunks
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect();

        let mut saved = 0;
        for handle in handles {
            let mut chunk = handle.get_mut();
            if chunk.modified {
                persistence::save_chunk(&chunk, dir)?;
                chunk.modified = false;
                saved += 1;
            }
        }
        if saved > 0 {
            log::info!("Saved {} modified chunks", saved);
        }
        Ok(saved)
    }

    /// Drops every chunk farther than `radius` chunks from `(center_x, center_z)`, saving modified
    /// chunks first when persistence is enabled.
    ///
    /// # Returns
    /// The number of chunks evicted.
    pub fn evict_outside(&self, center_x: i32, center_z: i32, radius: i32) -> Result<usize> {
        let far = |(x, z): (i32, i32)| {
            let dx = (x - center_x) as i64;
            let dz = (z - center_z) as i64;
            dx * dx + dz * dz > (radius as i64) * (radius as i64)
        };

        let mut chunks = self.chunks.write().unwrap_or_else(PoisonError::into_inner);
        let doomed: Vec<(i32, i32)> = chunks.keys().copied().filter(|key| far(*key)).collect();
        for key in &doomed {
            if let (Some(dir), Some(handle)) = (&self.worlds_dir, chunks.get(key)) {
                let mut chunk = handle.get_mut();
                if chunk.modified {
                    persistence::save_chunk(&chunk, dir)?;
                    chunk.modified = false;
                }
            }
            chunks.remove(key);
        }
        if !doomed.is_empty() {
            log::debug!("Evicted {} chunks", doomed.len());
        }
        Ok(doomed.len())
    }

    fn load_or_generate(&self, x: i32, z: i32) -> Chunk {
        if let Some(dir) = &self.worlds_dir {
            match persistence::load_chunk(dir, x, z) {
                Ok(Some(chunk)) => return chunk,
                Ok(None) => {}
                Err(e) => log::warn!("Regenerating chunk ({}, {}): {}", x, z, e),
            }
        }
        self.generator.generate(x, z)
    }
}
