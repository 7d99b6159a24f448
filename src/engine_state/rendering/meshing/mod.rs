//! Mesh generation and caching for voxel rendering.
//!
//! This module keeps every built chunk mesh, keyed by chunk coordinate and level of detail, and
//! decides which LOD a chunk should be built at.
//!
//! # Architecture
//! - `MeshCache`: LRU map of `(x, z, lod)` to shared meshes, plus the queue of chunks waiting to be
//!   built
//! - `SortQueue`: meshes waiting for their transparent and liquid faces to be re-sorted
//! - `mesh/`: The builder that turns chunks into meshes
//!
//! # Level of Detail
//! A chunk inside the render distance is built at LOD 1. Beyond it the stride is multiplied by
//! the scaling constant until `lod * render_distance` reaches the chunk's distance, capped at the
//! maximum LOD. Several LODs of one chunk may be cached at once: a lookup returns the finest one,
//! so a chunk that moves to a new tier keeps drawing its old mesh until the new one lands.
//!
//! # Performance Considerations
//! - The LRU bound keeps memory flat over long sessions; evicted meshes are rebuilt on demand
//! - A lookup checks at most `log(max_lod)` keys
//! - The load queue ignores coordinates that are already waiting

use std::collections::{HashSet, VecDeque};
use std::num::NonZeroUsize;
use std::sync::Arc;

use lru::LruCache;

pub mod mesh;
pub mod sort_queue;

pub use mesh::*;
pub use sort_queue::SortQueue;

use crate::config::Settings;
use crate::engine_state::voxels::chunk::CHUNK_SIZE;

/// Identifies one cached mesh: chunk x, chunk z and LOD stride.
pub type ChunkMeshKey = (i32, i32, i32);

/// Converts a world-space position into fractional chunk units.
pub fn world_to_chunk_units(world: f32) -> f32 {
    world / CHUNK_SIZE as f32
}

/// Distance, in chunks, from the player to the centre of chunk `(x, z)`.
pub fn chunk_distance(x: i32, z: i32, player_x: f32, player_z: f32) -> f32 {
    let dx = x as f32 + 0.5 - world_to_chunk_units(player_x);
    let dz = z as f32 + 0.5 - world_to_chunk_units(player_z);
    (dx * dx + dz * dz).sqrt()
}

/// The LOD stride chunk `(x, z)` should be built at for a player at world `(player_x, player_z)`.
///
/// The result never decreases as the distance grows.
pub fn calculate_lod(settings: &Settings, x: i32, z: i32, player_x: f32, player_z: f32) -> i32 {
    let distance = chunk_distance(x, z, player_x, player_z);
    let render_distance = settings.chunk_render_distance;

    let mut lod = 1;
    if distance < render_distance as f32 {
        return lod;
    }
    let mut reach = render_distance;
    while lod < settings.max_lod && (reach as f32) < distance {
        lod *= settings.lod_scaling_constant;
        reach = lod * render_distance;
    }
    lod.min(settings.max_lod)
}

/// Whether transparent blocks of chunk `(x, z)` are meshed.
pub fn in_transparent_distance(
    settings: &Settings,
    x: i32,
    z: i32,
    player_x: f32,
    player_z: f32,
) -> bool {
    chunk_distance(x, z, player_x, player_z) <= settings.transparent_render_distance as f32
}

/// Whether foliage of chunk `(x, z)` is meshed.
pub fn in_foliage_distance(settings: &Settings, x: i32, z: i32, player_x: f32, player_z: f32) -> bool {
    chunk_distance(x, z, player_x, player_z) <= settings.foliage_render_distance as f32
}

/// Cache of chunk meshes at every level of detail, plus the queue of chunks to build.
pub struct MeshCache {
    meshes: LruCache<ChunkMeshKey, Arc<ChunkMesh>>,
    load_queue: VecDeque<(i32, i32)>,
    queued: HashSet<(i32, i32)>,
    max_lod: i32,
    lod_scaling_constant: i32,
}

impl MeshCache {
    /// Creates an empty cache holding at most `capacity` meshes.
    pub fn new(capacity: usize, max_lod: i32, lod_scaling_constant: i32) -> Self {
        MeshCache {
            meshes: LruCache::new(NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN)),
            load_queue: VecDeque::new(),
            queued: HashSet::new(),
            max_lod: max_lod.max(1),
            lod_scaling_constant: lod_scaling_constant.max(2),
        }
    }

    /// Creates a cache sized and tiered by `settings`.
    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(
            settings.chunk_cache_size,
            settings.max_lod,
            settings.lod_scaling_constant,
        )
    }

    /// Every LOD stride a mesh can be built at, finest first.
    pub fn lod_levels(&self) -> impl Iterator<Item = i32> {
        let max_lod = self.max_lod;
        let scale = self.lod_scaling_constant;
        std::iter::successors(Some(1), move |lod| Some(lod * scale)).take_while(move |lod| *lod <= max_lod)
    }

    /// Returns the finest cached mesh of chunk `(x, z)`.
    ///
    /// On a complete miss the coordinate is queued for building and `None` is returned.
    pub fn get(&mut self, x: i32, z: i32) -> Option<Arc<ChunkMesh>> {
        let found = self.get_any(x, z);
        if found.is_none() {
            self.queue_load(x, z);
        }
        found
    }

    /// Returns the finest cached mesh of chunk `(x, z)`, without queueing anything on a miss.
    pub fn get_any(&mut self, x: i32, z: i32) -> Option<Arc<ChunkMesh>> {
        let levels: Vec<i32> = self.lod_levels().collect();
        levels
            .into_iter()
            .find_map(|lod| self.meshes.get(&(x, z, lod)).cloned())
    }

    /// Returns the mesh built at exactly `lod`, without queueing anything.
    pub fn get_exact(&mut self, x: i32, z: i32, lod: i32) -> Option<Arc<ChunkMesh>> {
        self.meshes.get(&(x, z, lod)).cloned()
    }

    /// Whether a mesh for `(x, z, lod)` is cached. Does not touch LRU order.
    pub fn contains(&self, x: i32, z: i32, lod: i32) -> bool {
        self.meshes.contains(&(x, z, lod))
    }

    /// Stores a mesh under its own coordinate and LOD, replacing any previous one.
    pub fn insert(&mut self, mesh: impl Into<Arc<ChunkMesh>>) -> Arc<ChunkMesh> {
        let mesh = mesh.into();
        let key = (mesh.x, mesh.z, mesh.lod_scale);
        if let Some((evicted, _)) = self.meshes.push(key, mesh.clone()) {
            if evicted != key {
                log::trace!("Evicted mesh {:?} from the cache", evicted);
            }
        }
        mesh
    }

    /// Removes every LOD of chunk `(x, z)`.
    ///
    /// # Returns
    /// The number of meshes removed.
    pub fn invalidate_all_lods(&mut self, x: i32, z: i32) -> usize {
        let levels: Vec<i32> = self.lod_levels().collect();
        let removed = levels
            .into_iter()
            .filter(|lod| self.meshes.pop(&(x, z, *lod)).is_some())
            .count();
        if removed > 0 {
            log::debug!("Invalidated {} meshes of chunk ({}, {})", removed, x, z);
        }
        removed
    }

    /// Queues chunk `(x, z)` for building.
    ///
    /// # Returns
    /// `false` when the coordinate was already waiting.
    pub fn queue_load(&mut self, x: i32, z: i32) -> bool {
        if !self.queued.insert((x, z)) {
            return false;
        }
        self.load_queue.push_back((x, z));
        true
    }

    /// Takes up to `max` coordinates off the front of the load queue.
    pub fn pop_load_requests(&mut self, max: usize) -> Vec<(i32, i32)> {
        let count = max.min(self.load_queue.len());
        let requests: Vec<_> = self.load_queue.drain(..count).collect();
        for request in &requests {
            self.queued.remove(request);
        }
        requests
    }

    /// Number of coordinates waiting to be built.
    pub fn pending_loads(&self) -> usize {
        self.load_queue.len()
    }

    /// Number of cached meshes across all LODs.
    pub fn len(&self) -> usize {
        self.meshes.len()
    }

    /// Whether the cache holds no meshes.
    pub fn is_empty(&self) -> bool {
        self.meshes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> Settings {
        Settings {
            chunk_render_distance: 4,
            ..Settings::default()
        }
    }

    #[test]
    fn test_lod_inside_render_distance_is_full_detail() {
        let settings = settings();
        assert_eq!(calculate_lod(&settings, 0, 0, 8.0, 8.0), 1);
        assert_eq!(calculate_lod(&settings, 3, 0, 8.0, 8.0), 1);
        assert_eq!(calculate_lod(&settings, -3, -1, 8.0, 8.0), 1);
    }

    #[test]
    fn test_lod_tiers_and_cap() {
        let settings = settings();
        assert_eq!(calculate_lod(&settings, 4, 0, 8.0, 8.0), 1);
        assert_eq!(calculate_lod(&settings, 6, 0, 8.0, 8.0), 2);
        assert_eq!(calculate_lod(&settings, 12, 0, 8.0, 8.0), 4);
        assert_eq!(calculate_lod(&settings, 10_000, 0, 8.0, 8.0), settings.max_lod);
    }

    #[test]
    fn test_lod_is_monotonic_in_distance() {
        let settings = settings();
        let mut previous = 1;
        for x in 0..200 {
            let lod = calculate_lod(&settings, x, 0, 0.0, 0.0);
            assert!(lod >= previous, "lod dropped at chunk {}", x);
            assert!(lod <= settings.max_lod);
            previous = lod;
        }
    }

    #[test]
    fn test_distance_gates() {
        let settings = Settings {
            transparent_render_distance: 2,
            foliage_render_distance: 1,
            ..Settings::default()
        };
        assert!(in_transparent_distance(&settings, 1, 0, 8.0, 8.0));
        assert!(!in_transparent_distance(&settings, 3, 0, 8.0, 8.0));
        assert!(in_foliage_distance(&settings, 0, 1, 8.0, 8.0));
        assert!(!in_foliage_distance(&settings, 0, 2, 8.0, 8.0));
    }

    #[test]
    fn test_get_prefers_finest_lod() {
        let mut cache = MeshCache::new(16, 16, 2);
        cache.insert(ChunkMesh::empty(1, 1, 4, 0));
        assert_eq!(cache.get(1, 1).unwrap().lod_scale, 4);
        cache.insert(ChunkMesh::empty(1, 1, 2, 0));
        assert_eq!(cache.get(1, 1).unwrap().lod_scale, 2);
        cache.insert(ChunkMesh::empty(1, 1, 1, 0));
        assert_eq!(cache.get(1, 1).unwrap().lod_scale, 1);
        assert_eq!(cache.len(), 3);
        assert_eq!(cache.pending_loads(), 0);
    }

    #[test]
    fn test_invalidate_then_get_queues_once() {
        let mut cache = MeshCache::new(16, 16, 2);
        cache.insert(ChunkMesh::empty(0, 0, 1, 0));
        cache.insert(ChunkMesh::empty(0, 0, 8, 0));
        cache.insert(ChunkMesh::empty(5, 5, 1, 0));

        assert_eq!(cache.invalidate_all_lods(0, 0), 2);
        assert!(cache.get(0, 0).is_none());
        assert!(cache.get(0, 0).is_none());
        assert_eq!(cache.pending_loads(), 1);
        assert_eq!(cache.pop_load_requests(4), vec![(0, 0)]);
        assert!(cache.get_exact(5, 5, 1).is_some());
    }

    #[test]
    fn test_get_any_never_queues() {
        let mut cache = MeshCache::new(16, 16, 2);
        assert!(cache.get_any(3, 3).is_none());
        assert_eq!(cache.pending_loads(), 0);
        cache.insert(ChunkMesh::empty(3, 3, 8, 0));
        assert_eq!(cache.get_any(3, 3).unwrap().lod_scale, 8);
    }

    #[test]
    fn test_load_queue_is_fifo_and_requeueable() {
        let mut cache = MeshCache::new(16, 16, 2);
        assert!(cache.queue_load(1, 0));
        assert!(cache.queue_load(2, 0));
        assert!(!cache.queue_load(1, 0));
        assert_eq!(cache.pop_load_requests(1), vec![(1, 0)]);
        assert!(cache.queue_load(1, 0));
        assert_eq!(cache.pop_load_requests(10), vec![(2, 0), (1, 0)]);
        assert!(cache.pop_load_requests(10).is_empty());
    }

    #[test]
    fn test_lru_bound() {
        let mut cache = MeshCache::new(2, 16, 2);
        cache.insert(ChunkMesh::empty(0, 0, 1, 0));
        cache.insert(ChunkMesh::empty(1, 0, 1, 0));
        cache.get(0, 0);
        cache.insert(ChunkMesh::empty(2, 0, 1, 0));
        assert_eq!(cache.len(), 2);
        assert!(cache.contains(0, 0, 1));
        assert!(!cache.contains(1, 0, 1));
    }

    #[test]
    fn test_lod_levels_follow_scaling_constant() {
        let cache = MeshCache::new(4, 9, 3);
        assert_eq!(cache.lod_levels().collect::<Vec<_>>(), vec![1, 3, 9]);
        let cache = MeshCache::new(4, 16, 2);
        assert_eq!(cache.lod_levels().collect::<Vec<_>>(), vec![1, 2, 4, 8, 16]);
    }
}
