//! # Engine State Module
//!
//! The frame driver that keeps a voxel world meshed around a moving player.
//!
//! ## Key Components
//!
//! * `EngineState` - Owns every subsystem and runs one `tick` per frame
//! * `rendering` - Mesh building, the LOD mesh cache, the sort queue and the world mesh
//! * `task_management` - The worker pool mesh builds run on
//! * `voxels` - Blocks, chunks, the voxel store, persistence and water
//!
//! ## Architecture
//!
//! `EngineState` is the single owner of the pipeline. Workers only see the shared
//! [`MeshingContext`]: the block and model catalogs, the voxel store and the mesh cache. The sort
//! queue, the water simulator and the world mesh buffer belong to the driving thread.
//!
//! ## Tick
//!
//! 1. Collect the cached meshes inside the render circle; misses are queued for loading
//! 2. When the player stepped onto another block, queue the 3x3 chunks around them for sorting
//! 3. Sort one queued mesh
//! 4. Hand up to `chunk_load_per_frame` queued chunks to the worker pool
//! 5. Run one water step and rebuild the meshes of every chunk it changed
//! 6. Rebuild the world mesh when the player moved or a rebuild was requested
//!
//! ## Performance Considerations
//!
//! * Mesh builds run on the pool and never block the tick
//! * Edits rebuild their chunk synchronously so the change is visible on the next frame
//! * Only one mesh is re-sorted per tick

use std::sync::Arc;

use rendering::{
    meshing::{calculate_lod, world_to_chunk_units, ChunkMesh, SortQueue},
    tasks::{process_chunk_work_item, ChunkWorkItem, MeshingContext},
    world_mesh::{WorldMesh, WorldMeshBuffer},
};
use task_management::{task::ProcessFn, WorkerPool};
use voxels::{
    block::{block_model::ModelCatalog, block_type::BlockCatalog, Block, MAX_WATER_LEVEL},
    chunk::{
        chunk_creation::{NoiseTerrain, TerrainGenerator},
        CHUNK_SIZE,
    },
    water::WaterSimulator,
    world::{world_to_chunk, VoxelStore},
};

use crate::{
    config::Settings,
    error::{PipelineError, Result},
};

pub mod rendering;
pub mod task_management;
pub mod voxels;

/// Chunk offsets in a square spiral around the origin, covering the `(2r + 1)²` square.
///
/// The walk goes +x, +z, -x, -z and lengthens its segment every second turn.
pub fn spiral_offsets(radius: i32) -> Vec<(i32, i32)> {
    const DIRECTIONS: [(i32, i32); 4] = [(1, 0), (0, 1), (-1, 0), (0, -1)];

    let side = 2 * radius.max(0) as usize + 1;
    let mut offsets = Vec::with_capacity(side * side);
    let (mut x, mut z) = (0, 0);
    let (mut direction, mut segment, mut walked, mut turns) = (0, 1, 0, 0);
    for _ in 0..side * side {
        offsets.push((x, z));
        x += DIRECTIONS[direction].0;
        z += DIRECTIONS[direction].1;
        walked += 1;
        if walked == segment {
            walked = 0;
            direction = (direction + 1) % DIRECTIONS.len();
            turns += 1;
            if turns % 2 == 0 {
                segment += 1;
            }
        }
    }
    offsets
}

/// What one tick did.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TickReport {
    /// Meshes inside the render circle that were ready to draw
    pub visible_chunks: usize,
    /// Load requests handed to the worker pool
    pub submitted: usize,
    /// Chunks the water step changed
    pub water_chunks: usize,
    /// Background builds that finished since the previous tick
    pub loaded: usize,
    /// Whether the world mesh was rebuilt
    pub rebuilt: bool,
}

/// The main state container for the meshing pipeline
///
/// # Examples
///
/// ```no_run
/// use voxel_mesh_pipeline::{config::Settings, engine_state::EngineState};
///
/// let mut engine = EngineState::with_noise_terrain(Settings::default()).unwrap();
/// engine.preload_initial_chunks(8.0, 8.0);
/// engine.wait_chunk_loading();
/// engine.tick([8.0, 80.0, 8.0]).unwrap();
/// let world = engine.get_world_mesh();
/// println!("{} faces", world.side_count());
/// engine.shutdown().unwrap();
/// ```
pub struct EngineState {
    settings: Settings,
    context: Arc<MeshingContext>,
    pool: WorkerPool<Arc<ChunkWorkItem>>,
    in_flight: Vec<Arc<ChunkWorkItem>>,
    sort_queue: SortQueue,
    water: WaterSimulator,
    world_mesh: WorldMeshBuffer,
    visible: Vec<Arc<ChunkMesh>>,
    last_player_block: Option<(i32, i32)>,
    rebuild_requested: bool,
    camera: [f32; 3],
}

impl EngineState {
    /// Creates the pipeline and starts its worker pool.
    ///
    /// # Errors
    /// - `PipelineError::Config` for invalid settings
    /// - Any worker pool initialization error
    pub fn new(
        settings: Settings,
        catalog: BlockCatalog,
        models: ModelCatalog,
        generator: Box<dyn TerrainGenerator>,
    ) -> Result<Self> {
        settings.validate()?;

        let catalog = Arc::new(catalog);
        let store = Arc::new(VoxelStore::new(generator, settings.worlds_dir.clone()));
        let context = Arc::new(MeshingContext::new(
            settings.clone(),
            catalog.clone(),
            Arc::new(models),
            store,
        ));

        let worker_context = context.clone();
        let process_fn: ProcessFn<Arc<ChunkWorkItem>> =
            Arc::new(move |item| process_chunk_work_item(&worker_context, item));
        let pool = WorkerPool::init(settings.worker_threads, Some(process_fn))?;

        log::info!(
            "Engine started: render distance {}, {} workers, persistence {}",
            settings.chunk_render_distance,
            settings.worker_threads,
            if context.store.persistence_enabled() { "on" } else { "off" }
        );

        Ok(EngineState {
            in_flight: Vec::new(),
            sort_queue: SortQueue::new(settings.transparent_render_distance),
            water: WaterSimulator::new(catalog),
            world_mesh: WorldMeshBuffer::new(),
            visible: Vec::new(),
            last_player_block: None,
            rebuild_requested: false,
            camera: [0.0; 3],
            settings,
            context,
            pool,
        })
    }

    /// Creates the pipeline over the built-in catalogs and noise terrain.
    ///
    /// # Errors
    /// Catalog, settings and worker pool errors.
    pub fn with_noise_terrain(settings: Settings) -> Result<Self> {
        let catalog = BlockCatalog::builtin()?;
        let models = ModelCatalog::builtin();
        let terrain = NoiseTerrain::new(&settings, &catalog)?;
        Self::new(settings, catalog, models, Box::new(terrain))
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// The voxel store every mesh is built from.
    pub fn store(&self) -> &VoxelStore {
        &self.context.store
    }

    pub fn catalog(&self) -> &BlockCatalog {
        &self.context.catalog
    }

    /// Number of meshes in the cache across all LODs.
    pub fn cached_meshes(&self) -> usize {
        self.context.cache.get().len()
    }

    /// Number of chunks waiting to be handed to the pool.
    pub fn pending_loads(&self) -> usize {
        self.context.cache.get().pending_loads()
    }

    /// Meshes collected by the last tick, back to front.
    pub fn visible_meshes(&self) -> &[Arc<ChunkMesh>] {
        &self.visible
    }

    /// Number of meshes waiting to be re-sorted.
    pub fn pending_sorts(&self) -> usize {
        self.sort_queue.len()
    }

    /// Number of chunks waiting for a water step.
    pub fn pending_water_chunks(&self) -> usize {
        self.water.pending_chunks()
    }

    fn player_chunk(&self) -> (i32, i32) {
        (
            world_to_chunk(self.camera[0].floor() as i32).0,
            world_to_chunk(self.camera[2].floor() as i32).0,
        )
    }

    /// The finest cached mesh of chunk `(x, z)`. A miss queues the chunk for loading.
    pub fn get_chunk_mesh(&self, x: i32, z: i32) -> Option<Arc<ChunkMesh>> {
        self.context.cache.get_mut().get(x, z)
    }

    /// The mesh of `(x, z)` at exactly `lod`, built synchronously when it is not cached.
    pub fn get_or_build(&self, x: i32, z: i32, lod: i32, player_x: f32, player_z: f32) -> Arc<ChunkMesh> {
        self.context.get_or_build(x, z, lod, player_x, player_z)
    }

    /// Brings chunk `(x, z)` and its four neighbors up to the LOD their distance calls for.
    ///
    /// Meshes already cached at that LOD are kept; the rest are built on this thread.
    ///
    /// # Returns
    /// The mesh of chunk `(x, z)`.
    pub fn update_chunk_mesh(&self, x: i32, z: i32, player_x: f32, player_z: f32) -> Arc<ChunkMesh> {
        for (cx, cz) in [(x + 1, z), (x - 1, z), (x, z + 1), (x, z - 1)] {
            let lod = calculate_lod(&self.settings, cx, cz, player_x, player_z);
            self.context.get_or_build(cx, cz, lod, player_x, player_z);
        }
        let lod = calculate_lod(&self.settings, x, z, player_x, player_z);
        self.context.get_or_build(x, z, lod, player_x, player_z)
    }

    /// Hands up to `chunk_load_per_frame` queued chunks to the worker pool.
    ///
    /// # Returns
    /// The number of work items submitted.
    pub fn load_chunks(&mut self, player_x: f32, player_z: f32) -> usize {
        let requests = self
            .context
            .cache
            .get_mut()
            .pop_load_requests(self.settings.chunk_load_per_frame);
        self.submit_loads(requests, player_x, player_z)
    }

    fn submit_loads(&mut self, requests: Vec<(i32, i32)>, player_x: f32, player_z: f32) -> usize {
        let mut submitted = 0;
        for (x, z) in requests {
            let item = Arc::new(ChunkWorkItem::new(x, z, player_x, player_z));
            match self.pool.submit(item.clone()) {
                Ok(()) => {
                    self.in_flight.push(item);
                    submitted += 1;
                }
                Err(e) => log::warn!("Could not submit chunk ({}, {}): {}", x, z, e),
            }
        }
        submitted
    }

    /// Queues every chunk inside the render circle that has no mesh yet, nearest first, and
    /// submits them all.
    ///
    /// # Returns
    /// The number of work items submitted.
    pub fn preload_initial_chunks(&mut self, player_x: f32, player_z: f32) -> usize {
        self.camera[0] = player_x;
        self.camera[2] = player_z;
        let (center_x, center_z) = self.player_chunk();
        let radius = self.settings.chunk_render_distance;

        let requests = {
            let mut cache = self.context.cache.get_mut();
            for (dx, dz) in spiral_offsets(radius) {
                if dx * dx + dz * dz > radius * radius {
                    continue;
                }
                let (x, z) = (center_x + dx, center_z + dz);
                if cache.get_any(x, z).is_none() {
                    cache.queue_load(x, z);
                }
            }
            let pending = cache.pending_loads();
            cache.pop_load_requests(pending)
        };

        let submitted = self.submit_loads(requests, player_x, player_z);
        log::info!(
            "Preloading {} chunks around ({}, {})",
            submitted,
            center_x,
            center_z
        );
        submitted
    }

    /// Takes finished builds off the in-flight list and queues their meshes for sorting.
    ///
    /// Builds discarded as stale count for nothing; their chunk is already queued again.
    fn collect_finished_loads(&mut self) -> usize {
        let (finished, in_flight): (Vec<_>, Vec<_>) = std::mem::take(&mut self.in_flight)
            .into_iter()
            .partition(|item| item.is_complete());
        self.in_flight = in_flight;

        let mut loaded = 0;
        for mesh in finished.iter().filter_map(|item| item.result()) {
            self.queue_chunk_for_sorting(mesh);
            loaded += 1;
        }
        if loaded > 0 {
            self.rebuild_requested = true;
        }
        loaded
    }

    /// Blocks until every submitted mesh build has finished.
    pub fn wait_chunk_loading(&self) {
        self.pool.wait_completion();
    }

    /// Queues `mesh` for re-sorting relative to the player.
    ///
    /// # Returns
    /// `false` when the mesh is too far away to need it.
    pub fn queue_chunk_for_sorting(&mut self, mesh: Arc<ChunkMesh>) -> bool {
        let (x, z) = self.player_chunk();
        self.sort_queue.enqueue(mesh, x, z)
    }

    /// Re-sorts the oldest queued mesh for the current camera.
    pub fn sort_chunk(&mut self) -> Option<Arc<ChunkMesh>> {
        self.sort_queue
            .drain_one(self.camera, self.settings.water_level)
    }

    /// Places `block` at chunk-local `(x, y, z)` of chunk `(chunk_x, chunk_z)`.
    ///
    /// Water levels are normalized first: a non-liquid block never carries one, and a liquid
    /// placed without a level becomes a full source. The chunk's meshes, and those of a neighbor
    /// when the block sits on the shared edge, are dropped and rebuilt right away, and the water
    /// around the block is woken up.
    ///
    /// # Returns
    /// The rebuilt mesh of the edited chunk.
    ///
    /// # Errors
    /// - `PipelineError::UnknownBlock` for an id missing from the catalog
    /// - `PipelineError::OutOfBounds` for coordinates outside the chunk
    pub fn set_block(
        &mut self,
        chunk_x: i32,
        chunk_z: i32,
        (x, y, z): (i32, i32, i32),
        block: Block,
    ) -> Result<Arc<ChunkMesh>> {
        let block_type = self
            .context
            .catalog
            .get(block.id())
            .ok_or_else(|| PipelineError::UnknownBlock(format!("id {}", block.id())))?;
        let water_level = match (block_type.liquid, block.water_level()) {
            (false, _) => 0,
            (true, 0) => MAX_WATER_LEVEL,
            (true, level) => level,
        };
        let block = Block::new(block.id(), block.orientation(), block.rotation(), water_level);

        self.context
            .store
            .get_chunk(chunk_x, chunk_z)
            .get_mut()
            .set(x, y, z, block)?;

        {
            let edge = CHUNK_SIZE as i32 - 1;
            let mut cache = self.context.cache.get_mut();
            cache.invalidate_all_lods(chunk_x, chunk_z);
            if x == 0 {
                cache.invalidate_all_lods(chunk_x - 1, chunk_z);
            } else if x == edge {
                cache.invalidate_all_lods(chunk_x + 1, chunk_z);
            }
            if z == 0 {
                cache.invalidate_all_lods(chunk_x, chunk_z - 1);
            } else if z == edge {
                cache.invalidate_all_lods(chunk_x, chunk_z + 1);
            }
        }

        let mesh = self.update_chunk_mesh(chunk_x, chunk_z, self.camera[0], self.camera[2]);
        self.water
            .check_for_flow(&self.context.store, chunk_x, chunk_z, x, y, z);
        self.queue_chunk_for_sorting(mesh.clone());
        self.rebuild_requested = true;
        log::debug!(
            "Set block {:?} at ({}, {}, {}) in chunk ({}, {})",
            block,
            x,
            y,
            z,
            chunk_x,
            chunk_z
        );
        Ok(mesh)
    }

    /// Places `block` at world coordinates.
    ///
    /// # Errors
    /// See [`EngineState::set_block`].
    pub fn set_block_at(&mut self, world_x: i32, y: i32, world_z: i32, block: Block) -> Result<Arc<ChunkMesh>> {
        let (chunk_x, x) = world_to_chunk(world_x);
        let (chunk_z, z) = world_to_chunk(world_z);
        self.set_block(chunk_x, chunk_z, (x, y, z), block)
    }

    /// Asks for the world mesh to be rebuilt on the next tick.
    pub fn request_rebuild(&mut self) {
        self.rebuild_requested = true;
    }

    /// The world mesh the renderer should draw.
    pub fn get_world_mesh(&self) -> Arc<WorldMesh> {
        self.world_mesh.active()
    }

    /// Advances the pipeline by one frame for a camera at `camera`.
    ///
    /// # Errors
    /// `PipelineError::Resource` when the world mesh could not grow. The previous world mesh stays
    /// active and the rebuild is retried on the next tick.
    pub fn tick(&mut self, camera: [f32; 3]) -> Result<TickReport> {
        let player_block = (camera[0].floor() as i32, camera[2].floor() as i32);
        let moved = self.last_player_block != Some(player_block);
        self.last_player_block = Some(player_block);
        self.camera = camera;
        let loaded = self.collect_finished_loads();

        let (player_chunk_x, player_chunk_z) = self.player_chunk();
        let radius = self.settings.chunk_render_distance;
        let mut visible = Vec::new();
        for dx in -radius..=radius {
            for dz in -radius..=radius {
                if dx * dx + dz * dz > radius * radius {
                    continue;
                }
                let Some(mesh) = self.get_chunk_mesh(player_chunk_x + dx, player_chunk_z + dz) else {
                    continue;
                };
                if moved && dx.abs() <= 1 && dz.abs() <= 1 {
                    self.queue_chunk_for_sorting(mesh.clone());
                }
                visible.push(mesh);
            }
        }

        self.sort_chunk();
        let submitted = self.load_chunks(camera[0], camera[2]);

        let modified = self.water.tick(&self.context.store);
        if !modified.is_empty() {
            {
                let mut cache = self.context.cache.get_mut();
                for (x, z) in &modified {
                    cache.invalidate_all_lods(*x, *z);
                }
            }
            for (x, z) in &modified {
                let mesh = self.update_chunk_mesh(*x, *z, camera[0], camera[2]);
                if let Some(slot) = visible.iter_mut().find(|m| m.x == *x && m.z == *z) {
                    *slot = mesh.clone();
                }
                self.queue_chunk_for_sorting(mesh);
            }
            self.rebuild_requested = true;
        }

        let (chunk_x, chunk_z) = (world_to_chunk_units(camera[0]), world_to_chunk_units(camera[2]));
        visible.sort_by(|a, b| {
            b.chunk_distance_squared(chunk_x, chunk_z)
                .total_cmp(&a.chunk_distance_squared(chunk_x, chunk_z))
        });

        let mut report = TickReport {
            visible_chunks: visible.len(),
            submitted,
            water_chunks: modified.len(),
            loaded,
            rebuilt: false,
        };
        if moved || self.rebuild_requested {
            self.world_mesh.rebuild(&visible)?;
            self.rebuild_requested = false;
            report.rebuilt = true;
        }
        self.visible = visible;

        if moved && self.context.store.persistence_enabled() {
            // chunks just past the render circle still serve as neighbors of edge chunks
            self.context
                .store
                .evict_outside(player_chunk_x, player_chunk_z, radius + 2)?;
        }
        Ok(report)
    }

    /// Stops the worker pool after it finishes queued builds, then saves modified chunks.
    ///
    /// # Returns
    /// The number of chunks written to disk.
    pub fn shutdown(&mut self) -> Result<usize> {
        self.pool.shutdown();
        let saved = self.context.store.save_modified()?;
        log::info!("Engine shut down, {} chunks saved", saved);
        Ok(saved)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine_state::voxels::chunk::chunk_creation::FlatTerrain;
    use std::collections::HashSet;

    const STONE: u16 = 4;

    fn settings() -> Settings {
        Settings {
            chunk_render_distance: 2,
            transparent_render_distance: 2,
            foliage_render_distance: 2,
            max_lod: 4,
            worker_threads: 2,
            chunk_load_per_frame: 4,
            ..Settings::default()
        }
    }

    fn engine(height: usize) -> EngineState {
        EngineState::new(
            settings(),
            BlockCatalog::builtin().unwrap(),
            ModelCatalog::builtin(),
            Box::new(FlatTerrain {
                height,
                fill: STONE,
            }),
        )
        .unwrap()
    }

    #[test]
    fn test_spiral_covers_square_once() {
        let offsets = spiral_offsets(3);
        assert_eq!(offsets.len(), 49);
        assert_eq!(offsets[..3], [(0, 0), (1, 0), (1, 1)]);
        let unique: HashSet<_> = offsets.iter().copied().collect();
        assert_eq!(unique.len(), 49);
        assert!(offsets.iter().all(|(x, z)| x.abs() <= 3 && z.abs() <= 3));
    }

    #[test]
    fn test_invalid_settings_are_rejected() {
        let result = EngineState::new(
            Settings {
                worker_threads: 0,
                ..settings()
            },
            BlockCatalog::builtin().unwrap(),
            ModelCatalog::builtin(),
            Box::new(FlatTerrain::air()),
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_preload_meshes_render_circle() {
        let mut engine = engine(4);
        let submitted = engine.preload_initial_chunks(8.0, 8.0);
        // chunks with dx² + dz² <= 4
        assert_eq!(submitted, 13);
        engine.wait_chunk_loading();
        assert_eq!(engine.cached_meshes(), 13);
        assert_eq!(engine.preload_initial_chunks(8.0, 8.0), 0);

        let report = engine.tick([8.0, 20.0, 8.0]).unwrap();
        assert_eq!(report.visible_chunks, 13);
        assert!(report.rebuilt);
        assert_eq!(engine.get_world_mesh().counts.opaque, 13 * 16 * 16);
    }

    #[test]
    fn test_tick_queues_and_loads_misses() {
        let mut engine = engine(1);
        let report = engine.tick([8.0, 20.0, 8.0]).unwrap();
        assert_eq!(report.visible_chunks, 0);
        assert_eq!(report.submitted, 4);
        assert_eq!(engine.pending_loads(), 9);

        engine.wait_chunk_loading();
        for _ in 0..3 {
            engine.tick([8.0, 20.0, 8.0]).unwrap();
            engine.wait_chunk_loading();
        }
        engine.request_rebuild();
        let report = engine.tick([8.0, 20.0, 8.0]).unwrap();
        assert_eq!(report.visible_chunks, 13);
        assert_eq!(engine.pending_loads(), 0);
    }

    #[test]
    fn test_finished_loads_show_up_without_moving() {
        let mut engine = engine(1);
        assert_eq!(engine.tick([8.0, 20.0, 8.0]).unwrap().submitted, 4);
        engine.wait_chunk_loading();

        let report = engine.tick([8.0, 20.0, 8.0]).unwrap();
        assert_eq!(report.loaded, 4);
        assert_eq!(report.visible_chunks, 4);
        assert!(report.rebuilt);
        assert_eq!(engine.get_world_mesh().counts.opaque, 4 * 16 * 16);
    }

    #[test]
    fn test_visible_meshes_are_back_to_front() {
        let mut engine = engine(1);
        engine.preload_initial_chunks(8.0, 8.0);
        engine.wait_chunk_loading();
        engine.tick([8.0, 20.0, 8.0]).unwrap();

        let distances: Vec<f32> = engine
            .visible_meshes()
            .iter()
            .map(|m| m.chunk_distance_squared(0.5, 0.5))
            .collect();
        assert!(distances.windows(2).all(|w| w[0] >= w[1]));
        let last = engine.visible_meshes().last().unwrap();
        assert_eq!((last.x, last.z), (0, 0));
    }

    #[test]
    fn test_world_mesh_only_rebuilds_on_move_or_request() {
        let mut engine = engine(1);
        engine.preload_initial_chunks(8.0, 8.0);
        engine.wait_chunk_loading();

        assert!(engine.tick([8.0, 20.0, 8.0]).unwrap().rebuilt);
        assert!(!engine.tick([8.4, 20.0, 8.2]).unwrap().rebuilt);
        assert!(engine.tick([9.1, 20.0, 8.2]).unwrap().rebuilt);
        engine.request_rebuild();
        assert!(engine.tick([9.1, 20.0, 8.2]).unwrap().rebuilt);
    }

    #[test]
    fn test_set_block_rebuilds_chunk_and_neighbor() {
        let mut engine = engine(1);
        engine.preload_initial_chunks(8.0, 8.0);
        engine.wait_chunk_loading();
        engine.tick([8.0, 20.0, 8.0]).unwrap();

        let before = engine.get_chunk_mesh(0, 0).unwrap();
        let neighbor_before = engine.get_chunk_mesh(1, 0).unwrap();
        let mesh = engine
            .set_block(0, 0, (15, 1, 8), Block::of_type(STONE))
            .unwrap();

        // the new block shows five faces and hides the top of the one below it
        assert_eq!(mesh.opaque.len(), before.opaque.len() + 4);
        assert!(!Arc::ptr_eq(&mesh, &before));
        let neighbor_after = engine.get_chunk_mesh(1, 0).unwrap();
        assert!(!Arc::ptr_eq(&neighbor_before, &neighbor_after));
        assert!(engine.pending_sorts() > 0);

        let report = engine.tick([8.0, 20.0, 8.0]).unwrap();
        assert!(report.rebuilt);
        assert_eq!(
            engine.get_world_mesh().counts.opaque,
            13 * 16 * 16 + 4
        );
    }

    #[test]
    fn test_set_block_normalizes_water_levels() {
        let mut engine = engine(1);
        let water = engine.catalog().water_id();

        engine
            .set_block(0, 0, (4, 1, 4), Block::new(STONE, None, 0, 5))
            .unwrap();
        engine
            .set_block(0, 0, (6, 1, 6), Block::of_type(water))
            .unwrap();

        let chunk = engine.store().get_chunk(0, 0);
        assert_eq!(chunk.get().get(4, 1, 4).unwrap().water_level(), 0);
        assert_eq!(chunk.get().get(6, 1, 6).unwrap().water_level(), MAX_WATER_LEVEL);
        assert_eq!(engine.pending_water_chunks(), 1);
    }

    #[test]
    fn test_set_block_rejects_unknown_ids_and_bounds() {
        let mut engine = engine(1);
        let err = engine
            .set_block(0, 0, (0, 1, 0), Block::of_type(999))
            .unwrap_err();
        assert!(matches!(err, PipelineError::UnknownBlock(_)));
        let err = engine
            .set_block(0, 0, (0, 300, 0), Block::of_type(STONE))
            .unwrap_err();
        assert!(matches!(err, PipelineError::OutOfBounds { .. }));
    }

    #[test]
    fn test_water_spreads_through_ticks() {
        let mut engine = engine(1);
        engine.preload_initial_chunks(8.0, 8.0);
        engine.wait_chunk_loading();
        let water = engine.catalog().water_id();
        engine
            .set_block_at(8, 1, 8, Block::of_type(water))
            .unwrap();

        let report = engine.tick([8.0, 20.0, 8.0]).unwrap();
        assert_eq!(report.water_chunks, 1);
        assert!(report.rebuilt);

        for _ in 0..50 {
            if engine.pending_water_chunks() == 0 {
                break;
            }
            engine.tick([8.0, 20.0, 8.0]).unwrap();
        }
        assert_eq!(engine.pending_water_chunks(), 0);
        let world = engine.get_world_mesh();
        assert!(world.counts.liquid > 1);
    }

    #[test]
    fn test_sort_queue_only_on_block_change() {
        let mut engine = engine(1);
        engine.preload_initial_chunks(8.0, 8.0);
        engine.wait_chunk_loading();

        engine.tick([8.0, 20.0, 8.0]).unwrap();
        // nine queued, one drained
        assert_eq!(engine.pending_sorts(), 8);
        engine.tick([8.5, 20.0, 8.0]).unwrap();
        assert_eq!(engine.pending_sorts(), 7);
    }

    #[test]
    fn test_shutdown_saves_modified_chunks() {
        let dir = tempfile::tempdir().unwrap();
        let mut engine = EngineState::new(
            Settings {
                worlds_dir: Some(dir.path().to_path_buf()),
                ..settings()
            },
            BlockCatalog::builtin().unwrap(),
            ModelCatalog::builtin(),
            Box::new(FlatTerrain {
                height: 1,
                fill: STONE,
            }),
        )
        .unwrap();
        engine
            .set_block(2, 3, (1, 1, 1), Block::of_type(STONE))
            .unwrap();
        assert_eq!(engine.shutdown().unwrap(), 1);
        assert!(dir.path().join("chunk_2_3.bin").exists());
    }
}
