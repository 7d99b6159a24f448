//! # Chunk Creation Module
//!
//! Terrain generators and the builder they fill chunks with.
//!
//! Generation is a pure function of chunk coordinates and the world seed: asking twice for the
//! same coordinates yields identical chunks. The voxel store calls a generator whenever a chunk is
//! neither cached nor found on disk.
//!
//! ## Builder
//!
//! `ChunkCreationIterator` accepts blocks in storage order (x outer, y middle, z inner) and turns
//! them into a finished `Chunk` without the per-block bookkeeping `Chunk::set` does.

use noise::{NoiseFn, Perlin};

use super::{Chunk, CHUNK_HEIGHT, CHUNK_SIZE, CHUNK_VOLUME};
use crate::config::Settings;
use crate::engine_state::voxels::block::block_side::BlockSide;
use crate::engine_state::voxels::block::block_type::BlockCatalog;
use crate::engine_state::voxels::block::{Block, BlockTypeSize, MAX_WATER_LEVEL};
use crate::error::Result;

/// Produces the initial contents of a chunk.
pub trait TerrainGenerator: Send + Sync {
    /// Generates the chunk at chunk coordinates `(x, z)`.
    fn generate(&self, x: i32, z: i32) -> Chunk;
}

/// Builds a chunk from blocks supplied in storage order.
pub struct ChunkCreationIterator {
    x: i32,
    z: i32,
    blocks: Vec<Block>,
}

impl ChunkCreationIterator {
    /// Starts a chunk at chunk coordinates `(x, z)`.
    pub fn new(x: i32, z: i32) -> Self {
        ChunkCreationIterator {
            x,
            z,
            blocks: Vec::with_capacity(CHUNK_VOLUME),
        }
    }

    /// Appends the next block in storage order. Blocks past the end of the chunk are ignored.
    pub fn push_block(&mut self, block: Block) {
        if self.blocks.len() < CHUNK_VOLUME {
            self.blocks.push(block);
        }
    }

    /// Finishes the chunk, padding any positions never pushed with air.
    pub fn return_chunk(mut self) -> Chunk {
        self.blocks.resize(CHUNK_VOLUME, Block::AIR);
        match Chunk::from_blocks(self.x, self.z, self.blocks) {
            Ok(chunk) => chunk,
            Err(_) => Chunk::empty(self.x, self.z),
        }
    }
}

/// Every column filled with one block type up to a fixed height.
#[derive(Debug, Clone, Copy)]
pub struct FlatTerrain {
    /// Number of filled layers, starting at y = 0
    pub height: usize,
    /// Block type the layers are made of
    pub fill: BlockTypeSize,
}

impl FlatTerrain {
    /// A generator producing only air.
    pub fn air() -> Self {
        FlatTerrain { height: 0, fill: 0 }
    }
}

impl TerrainGenerator for FlatTerrain {
    fn generate(&self, x: i32, z: i32) -> Chunk {
        let fill = Block::of_type(self.fill);
        let mut cci = ChunkCreationIterator::new(x, z);
        for _ in 0..CHUNK_SIZE {
            for y in 0..CHUNK_HEIGHT {
                let block = if y < self.height { fill } else { Block::AIR };
                for _ in 0..CHUNK_SIZE {
                    cci.push_block(block);
                }
            }
        }
        cci.return_chunk()
    }
}

/// Rolling heightmap terrain with oceans and scattered plants.
///
/// Columns are stone, topped by three layers of dirt and a grass (or, at the shoreline, sand)
/// surface. Everything between the surface and `water_level` is source water.
pub struct NoiseTerrain {
    perlin: Perlin,
    seed: u32,
    base_height: i32,
    amplitude: f64,
    frequency: f64,
    water_level: i32,
    stone: BlockTypeSize,
    dirt: BlockTypeSize,
    grass: BlockTypeSize,
    sand: BlockTypeSize,
    water: BlockTypeSize,
    tall_grass: Option<BlockTypeSize>,
    flower: Option<BlockTypeSize>,
}

const DIRT_DEPTH: i32 = 3;
const TALL_GRASS_CHANCE: f64 = 1.0 / 12.0;
const FLOWER_CHANCE: f64 = 1.0 / 48.0;

impl NoiseTerrain {
    /// Creates the generator, resolving the block types it places.
    ///
    /// # Errors
    /// `PipelineError::UnknownBlock` if the catalog lacks stone, dirt, grass or sand. Plants are
    /// optional.
    pub fn new(settings: &Settings, catalog: &BlockCatalog) -> Result<Self> {
        Ok(NoiseTerrain {
            perlin: Perlin::new(settings.seed),
            seed: settings.seed,
            base_height: settings.base_terrain_height,
            amplitude: settings.height_amplitude,
            frequency: settings.height_frequency,
            water_level: settings.water_level,
            stone: catalog.id_of("stone")?,
            dirt: catalog.id_of("dirt")?,
            grass: catalog.id_of("grass")?,
            sand: catalog.id_of("sand")?,
            water: catalog.water_id(),
            tall_grass: catalog.id_of("tall_grass").ok(),
            flower: catalog.id_of("flower").ok(),
        })
    }

    /// Surface height of the world column at `(wx, wz)`.
    pub fn height_at(&self, wx: i32, wz: i32) -> i32 {
        let scale = self.frequency / CHUNK_SIZE as f64;
        let sample = self.perlin.get([wx as f64 * scale, wz as f64 * scale]);
        let height = self.base_height as f64 + sample * self.amplitude;
        (height as i32).clamp(1, CHUNK_HEIGHT as i32 - 2)
    }

    fn column_rng(&self, wx: i32, wz: i32) -> fastrand::Rng {
        let key = ((wx as u32 as u64) << 32) | wz as u32 as u64;
        fastrand::Rng::with_seed(key ^ (self.seed as u64).rotate_left(17))
    }

    fn plant_at(&self, wx: i32, wz: i32) -> Option<BlockTypeSize> {
        let roll = self.column_rng(wx, wz).f64();
        if roll < FLOWER_CHANCE {
            self.flower
        } else if roll < FLOWER_CHANCE + TALL_GRASS_CHANCE {
            self.tall_grass
        } else {
            None
        }
    }

    fn block_at(&self, y: i32, surface: i32, plant: Option<BlockTypeSize>) -> Block {
        let shore = surface <= self.water_level + 1;
        if y < surface - DIRT_DEPTH {
            Block::of_type(self.stone)
        } else if y < surface {
            Block::of_type(if shore { self.sand } else { self.dirt })
        } else if y == surface {
            Block::of_type(if shore { self.sand } else { self.grass })
        } else if y <= self.water_level {
            Block::new(self.water, Some(BlockSide::DOWN), 0, MAX_WATER_LEVEL)
        } else if y == surface + 1 && !shore {
            plant.map_or(Block::AIR, Block::of_type)
        } else {
            Block::AIR
        }
    }
}

impl TerrainGenerator for NoiseTerrain {
    fn generate(&self, x: i32, z: i32) -> Chunk {
        let origin_x = x * CHUNK_SIZE as i32;
        let origin_z = z * CHUNK_SIZE as i32;

        let mut columns = [[(0, None); CHUNK_SIZE]; CHUNK_SIZE];
        for (i, row) in columns.iter_mut().enumerate() {
            for (k, column) in row.iter_mut().enumerate() {
                let wx = origin_x + i as i32;
                let wz = origin_z + k as i32;
                *column = (self.height_at(wx, wz), self.plant_at(wx, wz));
            }
        }

        let mut cci = ChunkCreationIterator::new(x, z);
        for row in &columns {
            for y in 0..CHUNK_HEIGHT as i32 {
                for (surface, plant) in row {
                    cci.push_block(self.block_at(y, *surface, *plant));
                }
            }
        }
        log::trace!("Generated chunk ({}, {})", x, z);
        cci.return_chunk()
    }
}
