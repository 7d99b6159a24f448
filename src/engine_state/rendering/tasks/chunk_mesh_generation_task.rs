//! Background chunk mesh builds.
//!
//! This module contains the work item the frame driver hands to the worker pool and the context
//! every build runs against. A build holds read guards on its chunk and the four neighbors for its
//! whole duration, so the chunk cannot change under it; edits only wait for builds of the chunks
//! they touch.
//!
//! The result is checked against the revisions of the chunk and its neighbors before it is cached.
//! If any of them was edited or unloaded between the build and the insert, the mesh is dropped and
//! the coordinate queued again.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLockReadGuard};

use crate::{
    config::Settings,
    core::MtResource,
    engine_state::{
        rendering::meshing::{
            calculate_lod, in_foliage_distance, in_transparent_distance, ChunkMesh, MeshBuilder,
            MeshCache,
        },
        voxels::{
            block::{block_model::ModelCatalog, block_type::BlockCatalog},
            chunk::Chunk,
            world::VoxelStore,
        },
    },
};

/// One chunk to build, submitted to the worker pool.
///
/// The submitter keeps a handle to the item and may poll `is_complete`; the worker fills
/// `result` before raising the flag.
#[derive(Debug)]
pub struct ChunkWorkItem {
    pub x: i32,
    pub z: i32,
    pub player_x: f32,
    pub player_z: f32,
    complete: AtomicBool,
    result: Mutex<Option<Arc<ChunkMesh>>>,
}

impl ChunkWorkItem {
    pub fn new(x: i32, z: i32, player_x: f32, player_z: f32) -> Self {
        ChunkWorkItem {
            x,
            z,
            player_x,
            player_z,
            complete: AtomicBool::new(false),
            result: Mutex::new(None),
        }
    }

    /// Whether a worker has finished this item.
    pub fn is_complete(&self) -> bool {
        self.complete.load(Ordering::Acquire)
    }

    /// The mesh the build produced, once complete. `None` when the build was discarded as stale.
    pub fn result(&self) -> Option<Arc<ChunkMesh>> {
        self.result
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn finish(&self, mesh: Option<Arc<ChunkMesh>>) {
        *self.result.lock().unwrap_or_else(PoisonError::into_inner) = mesh;
        self.complete.store(true, Ordering::Release);
    }
}

/// Everything a mesh build reads, shared between the frame driver and the workers.
pub struct MeshingContext {
    pub settings: Settings,
    pub catalog: Arc<BlockCatalog>,
    pub models: Arc<ModelCatalog>,
    pub store: Arc<VoxelStore>,
    pub cache: MtResource<MeshCache>,
}

impl MeshingContext {
    pub fn new(
        settings: Settings,
        catalog: Arc<BlockCatalog>,
        models: Arc<ModelCatalog>,
        store: Arc<VoxelStore>,
    ) -> Self {
        let cache = MtResource::new(MeshCache::from_settings(&settings));
        MeshingContext {
            settings,
            catalog,
            models,
            store,
            cache,
        }
    }

    /// Builds chunk `(x, z)` at `lod` without touching the cache.
    ///
    /// The chunk and its neighbors are created when they are not in memory yet.
    pub fn build_mesh(&self, x: i32, z: i32, lod: i32, player_x: f32, player_z: f32) -> ChunkMesh {
        let handle = self.store.get_chunk(x, z);
        let neighbor_handles = self.store.neighbors(x, z);

        let chunk = handle.get();
        let guards: [Option<RwLockReadGuard<'_, Chunk>>; 4] =
            neighbor_handles.each_ref().map(|n| n.as_ref().map(MtResource::get));
        let neighbors = guards.each_ref().map(|g| g.as_deref());

        MeshBuilder::new(&self.catalog, &self.models).build(
            &chunk,
            neighbors,
            lod,
            in_transparent_distance(&self.settings, x, z, player_x, player_z),
            in_foliage_distance(&self.settings, x, z, player_x, player_z),
        )
    }

    /// Caches `mesh` unless its chunk was edited after the build read it.
    ///
    /// # Returns
    /// The cached mesh, or `None` when the mesh was stale; the coordinate is then queued again.
    pub fn store_mesh(&self, mesh: ChunkMesh) -> Option<Arc<ChunkMesh>> {
        let mesh = Arc::new(mesh);
        self.store_shared(&mesh).then_some(mesh)
    }

    fn store_shared(&self, mesh: &Arc<ChunkMesh>) -> bool {
        // revisions must be read under the cache lock; edits invalidate after their write
        let mut cache = self.cache.get_mut();
        if !self.is_current(mesh) {
            log::debug!(
                "Dropping stale mesh of chunk ({}, {}) built at revision {}",
                mesh.x,
                mesh.z,
                mesh.revision
            );
            cache.queue_load(mesh.x, mesh.z);
            return false;
        }
        cache.insert(mesh.clone());
        true
    }

    /// Whether neither the chunk nor any neighbor the build read has changed since.
    fn is_current(&self, mesh: &ChunkMesh) -> bool {
        let revision = |chunk: &MtResource<Chunk>| chunk.get().revision();
        if self.store.try_get_chunk(mesh.x, mesh.z).as_ref().map(revision) != Some(mesh.revision) {
            return false;
        }
        self.store
            .loaded_neighbors(mesh.x, mesh.z)
            .iter()
            .zip(mesh.neighbor_revisions)
            .all(|(neighbor, built)| neighbor.as_ref().map(revision) == built)
    }

    /// Builds chunk `(x, z)` at the LOD its distance calls for and caches the result.
    pub fn create_chunk_mesh(
        &self,
        x: i32,
        z: i32,
        player_x: f32,
        player_z: f32,
    ) -> Option<Arc<ChunkMesh>> {
        let lod = calculate_lod(&self.settings, x, z, player_x, player_z);
        let mesh = self.build_mesh(x, z, lod, player_x, player_z);
        self.store_mesh(mesh)
    }

    /// Returns the mesh cached for exactly `(x, z, lod)`, building and caching it on a miss.
    ///
    /// A fresh build is returned even when the cache refuses it as stale, so the caller always
    /// has something to draw.
    pub fn get_or_build(
        &self,
        x: i32,
        z: i32,
        lod: i32,
        player_x: f32,
        player_z: f32,
    ) -> Arc<ChunkMesh> {
        if let Some(mesh) = self.cache.get_mut().get_exact(x, z, lod) {
            return mesh;
        }
        let mesh = Arc::new(self.build_mesh(x, z, lod, player_x, player_z));
        self.store_shared(&mesh);
        mesh
    }
}

/// Worker entry point: builds the item's chunk, caches the mesh and marks the item complete.
pub fn process_chunk_work_item(context: &MeshingContext, item: Arc<ChunkWorkItem>) {
    let mesh = context.create_chunk_mesh(item.x, item.z, item.player_x, item.player_z);
    item.finish(mesh);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine_state::voxels::{block::Block, chunk::chunk_creation::FlatTerrain};

    fn context(height: usize) -> MeshingContext {
        let catalog = Arc::new(BlockCatalog::builtin().unwrap());
        let stone = catalog.id_of("stone").unwrap();
        let store = Arc::new(VoxelStore::new(
            Box::new(FlatTerrain {
                height,
                fill: stone,
            }),
            None,
        ));
        let settings = Settings {
            chunk_render_distance: 4,
            ..Settings::default()
        };
        MeshingContext::new(settings, catalog, Arc::new(ModelCatalog::builtin()), store)
    }

    #[test]
    fn test_work_item_completes_with_cached_mesh() {
        let context = context(4);
        let item = Arc::new(ChunkWorkItem::new(0, 0, 8.0, 8.0));
        assert!(!item.is_complete());

        process_chunk_work_item(&context, item.clone());

        assert!(item.is_complete());
        let mesh = item.result().unwrap();
        assert_eq!(mesh.lod_scale, 1);
        // the top layer of a 16x16 slab, neighbors present on every side
        assert_eq!(mesh.opaque.len(), 16 * 16);
        let cached = context.cache.get_mut().get_exact(0, 0, 1).unwrap();
        assert!(Arc::ptr_eq(&cached, &mesh));
    }

    #[test]
    fn test_far_chunk_builds_at_coarser_lod() {
        let context = context(4);
        let mesh = context.create_chunk_mesh(12, 0, 8.0, 8.0).unwrap();
        assert_eq!(mesh.lod_scale, 4);
        assert!(context.cache.get().contains(12, 0, 4));
    }

    #[test]
    fn test_stale_mesh_is_requeued() {
        let context = context(4);
        let mesh = context.build_mesh(1, 1, 1, 8.0, 8.0);
        context
            .store
            .get_chunk(1, 1)
            .get_mut()
            .set(0, 10, 0, Block::of_type(context.catalog.id_of("stone").unwrap()))
            .unwrap();

        assert!(context.store_mesh(mesh).is_none());
        let mut cache = context.cache.get_mut();
        assert!(cache.is_empty());
        assert_eq!(cache.pop_load_requests(4), vec![(1, 1)]);
    }

    #[test]
    fn test_neighbor_edit_during_build_is_rejected() {
        let context = context(0);
        let stone = Block::of_type(context.catalog.id_of("stone").unwrap());
        context.store.get_chunk(0, 0).get_mut().set(15, 1, 8, stone).unwrap();
        let in_flight = context.build_mesh(0, 0, 1, 8.0, 8.0);
        assert_eq!(in_flight.opaque.len(), 6);

        // covers the west face of the block in (0, 0)
        context.store.get_chunk(1, 0).get_mut().set(0, 1, 8, stone).unwrap();
        context.cache.get_mut().invalidate_all_lods(0, 0);
        let fresh = context.get_or_build(0, 0, 1, 8.0, 8.0);
        assert_eq!(fresh.opaque.len(), 5);

        assert!(context.store_mesh(in_flight).is_none());
        let mut cache = context.cache.get_mut();
        let cached = cache.get_exact(0, 0, 1).unwrap();
        assert!(Arc::ptr_eq(&cached, &fresh));
        assert!(cache.pop_load_requests(16).contains(&(0, 0)));
    }

    #[test]
    fn test_get_or_build_reuses_exact_entry() {
        let context = context(2);
        let first = context.get_or_build(0, 0, 2, 8.0, 8.0);
        let second = context.get_or_build(0, 0, 2, 8.0, 8.0);
        assert!(Arc::ptr_eq(&first, &second));
        assert!(context.get_or_build(0, 0, 1, 8.0, 8.0).lod_scale == 1);
        assert_eq!(context.cache.get().len(), 2);
    }

    #[test]
    fn test_building_creates_neighbors() {
        let context = context(0);
        context.build_mesh(5, 5, 1, 8.0, 8.0);
        assert_eq!(context.store.len(), 5);
    }
}
