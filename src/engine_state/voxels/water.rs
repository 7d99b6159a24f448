//! # Water Simulation
//!
//! A chunk-scoped cellular automaton that spreads and drains water.
//!
//! ## Architecture
//!
//! Block edits next to water mark chunks dirty through [`WaterSimulator::check_for_flow`]. Each
//! tick takes up to [`MAX_CHUNKS_PER_TICK`] dirty chunks and scans them top to bottom while
//! holding read guards on the chunk and its loaded neighbors. The scan only proposes
//! [`WaterUpdate`]s. Once every chunk is scanned the proposals are merged per position and
//! written in one batch, and every written position is checked for flow again so the water keeps
//! moving on the following ticks until nothing changes.
//!
//! ## Rules
//!
//! 1. A water block with two or more horizontal source neighbors becomes a source.
//! 2. Water falls first: the block below, when it is air, a plant, a torch or shallower water,
//!    becomes source water.
//! 3. Only water that cannot fall spreads sideways, losing [`WATER_LEVEL_DROPOFF`] per block.
//! 4. Flowing water that its neighbors no longer justify drains, down to air.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, PoisonError};

use super::block::block_side::BlockSide;
use super::block::block_type::BlockCatalog;
use super::block::{Block, BlockTypeSize};
use super::chunk::{Chunk, CHUNK_HEIGHT, CHUNK_SIZE};
use super::world::VoxelStore;
use crate::core::MtResource;

/// Level of a full water block produced by the simulation.
pub const WATER_SOURCE_LEVEL: u8 = 6;
/// Lowest level that counts as a source.
pub const WATER_SOURCE_MIN: u8 = 6;
/// Level lost per block of horizontal spread.
pub const WATER_LEVEL_DROPOFF: u8 = 2;
/// Dirty chunks processed per tick.
pub const MAX_CHUNKS_PER_TICK: usize = 16;
/// Updates proposed per tick before further proposals are dropped.
pub const MAX_UPDATES_PER_TICK: usize = 1000;

/// Horizontal offsets in side order: north, west, south, east.
const DIR_OFFSETS: [(i32, i32); 4] = [(0, -1), (1, 0), (0, 1), (-1, 0)];

/// A proposed change to one block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaterUpdate {
    /// Chunk x of the target block
    pub chunk_x: i32,
    /// Chunk z of the target block
    pub chunk_z: i32,
    /// Local x
    pub x: usize,
    /// Height
    pub y: usize,
    /// Local z
    pub z: usize,
    /// New water level, 0 removes the water
    pub new_level: u8,
    /// Turn a non-water block into water (otherwise only existing water is changed)
    pub set_water_block: bool,
}

/// A block found by a boundary-aware lookup, with where it lives.
struct Located {
    block: Block,
    chunk_x: i32,
    chunk_z: i32,
    x: usize,
    z: usize,
}

/// Read-only view of a chunk and its horizontal neighbors.
struct FlowView<'a> {
    center: &'a Chunk,
    adj: [Option<&'a Chunk>; 4],
}

impl FlowView<'_> {
    /// Looks up a block at local coordinates that may step one block outside the chunk.
    ///
    /// Out-of-range x or z resolve to the edge column of the matching neighbor; when both are out
    /// of range the z neighbor wins. Missing neighbors and heights outside the chunk yield `None`.
    fn get_block_at(&self, x: i32, y: i32, z: i32) -> Option<Located> {
        if !(0..CHUNK_HEIGHT as i32).contains(&y) {
            return None;
        }
        let last = CHUNK_SIZE as i32 - 1;
        let (mut target, mut tx, mut tz) = (self.center, x, z);

        if x < 0 {
            target = self.adj[BlockSide::EAST.index()]?;
            tx = last;
        } else if x > last {
            target = self.adj[BlockSide::WEST.index()]?;
            tx = 0;
        }
        if z < 0 {
            target = self.adj[BlockSide::NORTH.index()]?;
            tz = last;
        } else if z > last {
            target = self.adj[BlockSide::SOUTH.index()]?;
            tz = 0;
        }

        Some(Located {
            block: target.block(tx as usize, y as usize, tz as usize),
            chunk_x: target.x,
            chunk_z: target.z,
            x: tx as usize,
            z: tz as usize,
        })
    }
}

/// Bounded water simulation over dirty chunks.
pub struct WaterSimulator {
    catalog: Arc<BlockCatalog>,
    dirty: Mutex<VecDeque<(i32, i32)>>,
}

impl WaterSimulator {
    /// Creates a simulator with no dirty chunks.
    pub fn new(catalog: Arc<BlockCatalog>) -> Self {
        WaterSimulator {
            catalog,
            dirty: Mutex::new(VecDeque::new()),
        }
    }

    /// Number of chunks waiting to be simulated.
    pub fn pending_chunks(&self) -> usize {
        self.dirty.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Adds a chunk to the dirty list unless it is already queued.
    pub fn mark_chunk(&self, chunk_x: i32, chunk_z: i32) {
        let mut dirty = self.dirty.lock().unwrap_or_else(PoisonError::into_inner);
        if !dirty.contains(&(chunk_x, chunk_z)) {
            dirty.push_back((chunk_x, chunk_z));
        }
    }

    fn is_water(&self, block: Block) -> bool {
        block.id() == self.catalog.water_id()
    }

    fn is_destroyable(&self, id: BlockTypeSize) -> bool {
        if id == self.catalog.air_id() || id == self.catalog.water_id() {
            return false;
        }
        Some(id) == self.catalog.torch_id() || self.catalog.get(id).is_some_and(|t| t.is_foliage)
    }

    fn can_flow_into(&self, block: Block) -> bool {
        let id = block.id();
        id == self.catalog.air_id() || id == self.catalog.water_id() || self.is_destroyable(id)
    }

    /// Marks the chunk holding local `(x, y, z)` dirty if the block there, or any of its six
    /// neighbors, is water. Blocks on a chunk edge also mark the loaded neighbor across that edge.
    pub fn check_for_flow(&self, store: &VoxelStore, chunk_x: i32, chunk_z: i32, x: i32, y: i32, z: i32) {
        let Some(handle) = store.try_get_chunk(chunk_x, chunk_z) else {
            return;
        };
        let adj_handles = store.loaded_neighbors(chunk_x, chunk_z);
        let should_flow = {
            let center = handle.get();
            let adj_guards = adj_handles.each_ref().map(|h| h.as_ref().map(MtResource::get));
            let view = FlowView {
                center: &center,
                adj: adj_guards.each_ref().map(|g| g.as_deref()),
            };

            let here = view.get_block_at(x, y, z);
            here.is_some_and(|b| self.is_water(b.block))
                || BlockSide::all().into_iter().any(|side| {
                    let (dx, dy, dz) = side.offset();
                    view.get_block_at(x + dx, y + dy, z + dz)
                        .is_some_and(|b| self.is_water(b.block))
                })
        };
        if !should_flow {
            return;
        }

        self.mark_chunk(chunk_x, chunk_z);
        let last = CHUNK_SIZE as i32 - 1;
        let edges = [
            (z == 0, BlockSide::NORTH),
            (x == last, BlockSide::WEST),
            (z == last, BlockSide::SOUTH),
            (x == 0, BlockSide::EAST),
        ];
        for (on_edge, side) in edges {
            if on_edge && adj_handles[side.index()].is_some() {
                let (dx, _, dz) = side.offset();
                self.mark_chunk(chunk_x + dx, chunk_z + dz);
            }
        }
    }

    /// The level a position should hold given its surroundings, and whether the infinite-source
    /// rule applies to it.
    fn calculate_flow_level(&self, view: &FlowView, x: i32, y: i32, z: i32) -> (u8, bool) {
        let Some(here) = view.get_block_at(x, y, z) else {
            return (0, false);
        };

        if let Some(above) = view.get_block_at(x, y + 1, z) {
            if self.is_water(above.block) && above.block.water_level() > 0 {
                return (WATER_SOURCE_LEVEL, false);
            }
        }

        let mut max_adjacent = 0;
        let mut source_neighbors = 0;
        for (dx, dz) in DIR_OFFSETS {
            let Some(neighbor) = view.get_block_at(x + dx, y, z + dz) else {
                continue;
            };
            let level = neighbor.block.water_level();
            if self.is_water(neighbor.block) && level > 0 {
                if level >= WATER_SOURCE_MIN {
                    source_neighbors += 1;
                }
                max_adjacent = max_adjacent.max(level);
            }
        }

        if source_neighbors >= 2 && self.is_water(here.block) {
            return (WATER_SOURCE_LEVEL, true);
        }
        if max_adjacent > WATER_LEVEL_DROPOFF {
            (max_adjacent - WATER_LEVEL_DROPOFF, false)
        } else {
            (0, false)
        }
    }

    fn process_water_block(&self, view: &FlowView, x: i32, y: i32, z: i32, out: &mut UpdateBatch) {
        let block = view.center.block(x as usize, y as usize, z as usize);
        let level = block.water_level();
        if !self.is_water(block) || level == 0 {
            return;
        }

        let (_, should_become_source) = self.calculate_flow_level(view, x, y, z);
        if should_become_source && level < WATER_SOURCE_MIN {
            out.push(view.center.x, view.center.z, x as usize, y as usize, z as usize, WATER_SOURCE_LEVEL, false);
        }

        let mut can_flow_down = false;
        if y > 0 {
            if let Some(below) = view.get_block_at(x, y - 1, z) {
                if self.can_flow_into(below.block) {
                    can_flow_down = true;
                    let below_is_water = self.is_water(below.block);
                    if !below_is_water || below.block.water_level() < WATER_SOURCE_LEVEL {
                        out.push(
                            below.chunk_x,
                            below.chunk_z,
                            below.x,
                            y as usize - 1,
                            below.z,
                            WATER_SOURCE_LEVEL,
                            !below_is_water,
                        );
                    }
                }
            }
        }

        if level > WATER_LEVEL_DROPOFF && !can_flow_down {
            let spread = level - WATER_LEVEL_DROPOFF;
            for (dx, dz) in DIR_OFFSETS {
                let Some(neighbor) = view.get_block_at(x + dx, y, z + dz) else {
                    continue;
                };
                if self.can_flow_into(neighbor.block) && spread > neighbor.block.water_level() {
                    out.push(
                        neighbor.chunk_x,
                        neighbor.chunk_z,
                        neighbor.x,
                        y as usize,
                        neighbor.z,
                        spread,
                        !self.is_water(neighbor.block),
                    );
                }
            }
        }
    }

    fn recalculate_water_block(&self, view: &FlowView, x: i32, y: i32, z: i32, out: &mut UpdateBatch) {
        let block = view.center.block(x as usize, y as usize, z as usize);
        if !self.is_water(block) {
            return;
        }
        let level = block.water_level();
        let (new_level, _) = self.calculate_flow_level(view, x, y, z);
        if new_level < level && level < WATER_SOURCE_MIN {
            out.push(view.center.x, view.center.z, x as usize, y as usize, z as usize, new_level, false);
        }
    }

    fn scan_chunk(&self, store: &VoxelStore, chunk_x: i32, chunk_z: i32, out: &mut UpdateBatch) {
        let Some(handle) = store.try_get_chunk(chunk_x, chunk_z) else {
            return;
        };
        let adj_handles = store.loaded_neighbors(chunk_x, chunk_z);
        let center = handle.get();
        let adj_guards = adj_handles.each_ref().map(|h| h.as_ref().map(MtResource::get));
        let view = FlowView {
            center: &center,
            adj: adj_guards.each_ref().map(|g| g.as_deref()),
        };

        for y in (0..CHUNK_HEIGHT as i32).rev() {
            for x in 0..CHUNK_SIZE as i32 {
                for z in 0..CHUNK_SIZE as i32 {
                    self.process_water_block(&view, x, y, z, out);
                    self.recalculate_water_block(&view, x, y, z, out);
                }
            }
        }
    }

    /// Writes one update. Returns whether the block changed.
    fn apply(&self, store: &VoxelStore, update: &WaterUpdate) -> bool {
        let Some(handle) = store.try_get_chunk(update.chunk_x, update.chunk_z) else {
            return false;
        };
        let mut chunk = handle.get_mut();
        let current = chunk.block(update.x, update.y, update.z);
        let is_water = self.is_water(current);

        let replacement = if update.new_level == 0 && is_water {
            Block::of_type(self.catalog.air_id())
        } else if update.set_water_block || is_water {
            Block::new(self.catalog.water_id(), Some(BlockSide::DOWN), 0, update.new_level)
        } else {
            return false;
        };
        if replacement == current {
            return false;
        }
        chunk
            .set(update.x as i32, update.y as i32, update.z as i32, replacement)
            .is_ok()
    }

    /// Runs one simulation step.
    ///
    /// # Returns
    /// The chunks whose blocks changed. Their meshes must be invalidated and rebuilt.
    pub fn tick(&self, store: &VoxelStore) -> Vec<(i32, i32)> {
        let batch: Vec<(i32, i32)> = {
            let mut dirty = self.dirty.lock().unwrap_or_else(PoisonError::into_inner);
            let take = dirty.len().min(MAX_CHUNKS_PER_TICK);
            dirty.drain(..take).collect()
        };
        if batch.is_empty() {
            return Vec::new();
        }

        let mut updates = UpdateBatch::default();
        for (chunk_x, chunk_z) in &batch {
            self.scan_chunk(store, *chunk_x, *chunk_z, &mut updates);
        }

        let mut modified: Vec<(i32, i32)> = Vec::new();
        let mut changed = Vec::new();
        for update in updates.into_updates() {
            if self.apply(store, &update) {
                if !modified.contains(&(update.chunk_x, update.chunk_z)) {
                    modified.push((update.chunk_x, update.chunk_z));
                }
                changed.push(update);
            }
        }
        for update in &changed {
            self.check_for_flow(
                store,
                update.chunk_x,
                update.chunk_z,
                update.x as i32,
                update.y as i32,
                update.z as i32,
            );
        }

        log::debug!(
            "Water tick: {} chunks scanned, {} blocks changed in {} chunks",
            batch.len(),
            changed.len(),
            modified.len()
        );
        modified
    }
}

/// Proposed updates merged by position, so the result does not depend on scan order.
///
/// When several proposals target one block the highest level wins and any request to create
/// water is kept.
#[derive(Default)]
struct UpdateBatch {
    order: Vec<WaterUpdate>,
    index: HashMap<(i32, i32, usize, usize, usize), usize>,
    proposed: usize,
}

impl UpdateBatch {
    #[allow(clippy::too_many_arguments)]
    fn push(&mut self, chunk_x: i32, chunk_z: i32, x: usize, y: usize, z: usize, new_level: u8, set_water_block: bool) {
        if self.proposed >= MAX_UPDATES_PER_TICK {
            return;
        }
        self.proposed += 1;

        let key = (chunk_x, chunk_z, x, y, z);
        if let Some(&i) = self.index.get(&key) {
            let existing = &mut self.order[i];
            existing.new_level = existing.new_level.max(new_level);
            existing.set_water_block |= set_water_block;
            return;
        }
        self.index.insert(key, self.order.len());
        self.order.push(WaterUpdate {
            chunk_x,
            chunk_z,
            x,
            y,
            z,
            new_level,
            set_water_block,
        });
    }

    fn into_updates(self) -> Vec<WaterUpdate> {
        self.order
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine_state::voxels::block::MAX_WATER_LEVEL;
    use crate::engine_state::voxels::chunk::chunk_creation::FlatTerrain;

    fn setup() -> (Arc<BlockCatalog>, VoxelStore, WaterSimulator) {
        let catalog = Arc::new(BlockCatalog::builtin().unwrap());
        let stone = catalog.id_of("stone").unwrap();
        let store = VoxelStore::new(Box::new(FlatTerrain { height: 1, fill: stone }), None);
        for x in -1..=1 {
            for z in -1..=1 {
                store.get_chunk(x, z);
            }
        }
        let sim = WaterSimulator::new(catalog.clone());
        (catalog, store, sim)
    }

    fn water_at(catalog: &BlockCatalog, store: &VoxelStore, cx: i32, cz: i32, x: usize, y: usize, z: usize) -> Option<u8> {
        let block = store.get_chunk(cx, cz).get().block(x, y, z);
        (block.id() == catalog.water_id()).then(|| block.water_level())
    }

    fn place_water(catalog: &BlockCatalog, store: &VoxelStore, sim: &WaterSimulator, x: i32, y: i32, z: i32) {
        store
            .get_chunk(0, 0)
            .get_mut()
            .set(x, y, z, Block::new(catalog.water_id(), Some(BlockSide::DOWN), 0, MAX_WATER_LEVEL))
            .unwrap();
        sim.check_for_flow(store, 0, 0, x, y, z);
    }

    fn run_until_stable(store: &VoxelStore, sim: &WaterSimulator, max_ticks: usize) -> Option<usize> {
        for tick in 0..max_ticks {
            sim.tick(store);
            if sim.pending_chunks() == 0 {
                return Some(tick + 1);
            }
        }
        None
    }

    #[test]
    fn test_dry_edit_marks_nothing() {
        let (_, store, sim) = setup();
        sim.check_for_flow(&store, 0, 0, 8, 5, 8);
        assert_eq!(sim.pending_chunks(), 0);
        assert!(sim.tick(&store).is_empty());
    }

    #[test]
    fn test_mark_chunk_deduplicates() {
        let (_, _, sim) = setup();
        sim.mark_chunk(1, 2);
        sim.mark_chunk(1, 2);
        assert_eq!(sim.pending_chunks(), 1);
    }

    #[test]
    fn test_edge_marks_neighbor_chunk() {
        let (catalog, store, sim) = setup();
        place_water(&catalog, &store, &sim, 0, 1, 15);
        assert_eq!(sim.pending_chunks(), 3);
    }

    #[test]
    fn test_source_spreads_and_converges() {
        let (catalog, store, sim) = setup();
        place_water(&catalog, &store, &sim, 8, 1, 8);

        let ticks = run_until_stable(&store, &sim, 50);
        assert!(ticks.is_some(), "water did not settle");

        assert_eq!(water_at(&catalog, &store, 0, 0, 8, 1, 8), Some(MAX_WATER_LEVEL));
        assert_eq!(water_at(&catalog, &store, 0, 0, 9, 1, 8), Some(5));
        assert_eq!(water_at(&catalog, &store, 0, 0, 10, 1, 8), Some(3));
        assert_eq!(water_at(&catalog, &store, 0, 0, 11, 1, 8), Some(1));
        assert_eq!(water_at(&catalog, &store, 0, 0, 12, 1, 8), None);
        assert_eq!(water_at(&catalog, &store, 0, 0, 8, 1, 5), Some(1));

        let chunk = store.get_chunk(0, 0);
        let chunk = chunk.get();
        for block in chunk.blocks() {
            assert!(block.water_level() <= MAX_WATER_LEVEL);
            if block.id() == catalog.water_id() && block.water_level() != MAX_WATER_LEVEL {
                assert!(block.water_level() <= WATER_SOURCE_LEVEL);
            }
        }

        assert!(sim.tick(&store).is_empty());
    }

    #[test]
    fn test_water_falls_before_spreading() {
        let (catalog, store, sim) = setup();
        place_water(&catalog, &store, &sim, 4, 5, 4);
        sim.tick(&store);
        assert_eq!(water_at(&catalog, &store, 0, 0, 4, 4, 4), Some(WATER_SOURCE_LEVEL));
        assert_eq!(water_at(&catalog, &store, 0, 0, 5, 5, 4), None);
    }

    #[test]
    fn test_flow_crosses_chunk_boundary() {
        let (catalog, store, sim) = setup();
        place_water(&catalog, &store, &sim, 15, 1, 8);
        run_until_stable(&store, &sim, 50).unwrap();
        assert_eq!(water_at(&catalog, &store, 1, 0, 0, 1, 8), Some(5));
        assert_eq!(water_at(&catalog, &store, 1, 0, 1, 1, 8), Some(3));
    }

    #[test]
    fn test_water_destroys_foliage() {
        let (catalog, store, sim) = setup();
        let grass = catalog.id_of("tall_grass").unwrap();
        store.get_chunk(0, 0).get_mut().set(9, 1, 8, Block::of_type(grass)).unwrap();
        place_water(&catalog, &store, &sim, 8, 1, 8);
        sim.tick(&store);
        assert_eq!(water_at(&catalog, &store, 0, 0, 9, 1, 8), Some(5));
    }

    #[test]
    fn test_flowing_water_drains_without_source() {
        let (catalog, store, sim) = setup();
        place_water(&catalog, &store, &sim, 8, 1, 8);
        run_until_stable(&store, &sim, 50).unwrap();

        store
            .get_chunk(0, 0)
            .get_mut()
            .set(8, 1, 8, Block::of_type(catalog.air_id()))
            .unwrap();
        sim.check_for_flow(&store, 0, 0, 8, 1, 8);
        run_until_stable(&store, &sim, 50).unwrap();

        let chunk = store.get_chunk(0, 0);
        assert!(chunk.get().blocks().iter().all(|b| b.id() != catalog.water_id()));
    }

    #[test]
    fn test_two_sources_make_a_third() {
        let (catalog, store, sim) = setup();
        let water = |level| Block::new(catalog.water_id(), Some(BlockSide::DOWN), 0, level);
        {
            let chunk = store.get_chunk(0, 0);
            let mut chunk = chunk.get_mut();
            for x in 4..=12 {
                for z in 4..=12 {
                    chunk.set(x, 1, z, Block::of_type(catalog.id_of("stone").unwrap())).unwrap();
                }
            }
            chunk.set(7, 1, 8, water(WATER_SOURCE_LEVEL)).unwrap();
            chunk.set(9, 1, 8, water(WATER_SOURCE_LEVEL)).unwrap();
            chunk.set(8, 1, 8, water(4)).unwrap();
        }
        sim.mark_chunk(0, 0);
        sim.tick(&store);
        assert_eq!(water_at(&catalog, &store, 0, 0, 8, 1, 8), Some(WATER_SOURCE_LEVEL));
    }
}
