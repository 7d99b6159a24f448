//! Per-face queries used while packing a chunk: neighbor lookup across chunk borders, the
//! visibility test, ambient occlusion and the orientation-aware atlas lookup.

use crate::engine_state::rendering::vertex::SideInstance;
use crate::engine_state::voxels::block::{
    block_side::BlockSide,
    block_type::{BlockCatalog, BlockType},
    Block,
};
use crate::engine_state::voxels::chunk::{Chunk, CHUNK_HEIGHT, CHUNK_SIZE};

const SIZE: i32 = CHUNK_SIZE as i32;
const HEIGHT: i32 = CHUNK_HEIGHT as i32;

/// Edge offsets `(a, b)` of the four face vertices, in AO packing order.
const VERTEX_CORNERS: [(i32, i32); 4] = [(-1, -1), (1, -1), (1, 1), (-1, 1)];

/// Outcome of the visibility test for one side of one block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SideVisibility {
    /// Whether the face should be emitted
    pub visible: bool,
    /// The block across this side is water
    pub underwater: bool,
    /// Water level of the block across this side, 0 unless it is water
    pub water_level: u8,
}

/// A chunk and its four horizontal neighbors, read-only for the duration of a build.
///
/// Neighbors are indexed `[north, west, south, east]`. A missing neighbor reads as air for the
/// visibility test and as open space for ambient occlusion.
pub struct ChunkView<'a> {
    pub chunk: &'a Chunk,
    pub neighbors: [Option<&'a Chunk>; 4],
    pub catalog: &'a BlockCatalog,
}

impl<'a> ChunkView<'a> {
    pub fn new(
        chunk: &'a Chunk,
        neighbors: [Option<&'a Chunk>; 4],
        catalog: &'a BlockCatalog,
    ) -> Self {
        ChunkView {
            chunk,
            neighbors,
            catalog,
        }
    }

    /// Block at chunk-local coordinates that may step past the x or z border into a neighbor.
    ///
    /// Returns `None` above or below the world, inside an absent neighbor, more than one chunk
    /// away, or across a diagonal where no neighbor is available.
    pub fn block_at(&self, x: i32, y: i32, z: i32) -> Option<Block> {
        if !(0..HEIGHT).contains(&y) {
            return None;
        }
        let (target, local_x, local_z) = match (x.div_euclid(SIZE), z.div_euclid(SIZE)) {
            (0, 0) => (Some(self.chunk), x, z),
            (0, -1) => (self.neighbors[BlockSide::NORTH.index()], x, z + SIZE),
            (1, 0) => (self.neighbors[BlockSide::WEST.index()], x - SIZE, z),
            (0, 1) => (self.neighbors[BlockSide::SOUTH.index()], x, z - SIZE),
            (-1, 0) => (self.neighbors[BlockSide::EAST.index()], x + SIZE, z),
            _ => return None,
        };
        target?.get(local_x, y, local_z)
    }

    /// The block `lod_scale` steps away across `side`, air when there is none.
    pub fn adjacent_block(&self, x: i32, y: i32, z: i32, side: BlockSide, lod_scale: i32) -> Block {
        let (dx, dy, dz) = side.offset();
        self.block_at(x + dx * lod_scale, y + dy * lod_scale, z + dz * lod_scale)
            .unwrap_or(Block::AIR)
    }

    /// Decides whether `side` of the block at `(x, y, z)` is drawn.
    ///
    /// Unknown neighbor types hide the face. Liquids only hide faces against other liquids.
    /// Foliage faces are always drawn.
    pub fn side_visibility(
        &self,
        current: &BlockType,
        x: i32,
        y: i32,
        z: i32,
        side: BlockSide,
        lod_scale: i32,
    ) -> SideVisibility {
        let neighbor = self.adjacent_block(x, y, z, side, lod_scale);
        let Some(adjacent) = self.catalog.of(neighbor) else {
            return SideVisibility::default();
        };

        let is_air = adjacent.id == self.catalog.air_id();
        let is_water = adjacent.id == self.catalog.water_id();

        let mut visible = is_air || adjacent.transparent != current.transparent;
        if current.liquid {
            if adjacent.liquid {
                visible = false;
            } else if !is_water {
                visible = true;
            }
        }
        if adjacent.transparent != current.transparent
            || adjacent.is_custom_model
            || (adjacent.transparent && current.transparent && adjacent.id != current.id)
            || current.is_foliage
        {
            visible = true;
        }
        // the world has no floor below y = 0; above the top the lookup already yields air
        if side == BlockSide::DOWN {
            visible &= y > 0;
        }

        SideVisibility {
            visible,
            underwater: is_water,
            water_level: if is_water { neighbor.water_level() } else { 0 },
        }
    }

    /// Whether the cell at `(x, y, z)` darkens the vertices around it.
    pub fn is_ao_solid(&self, x: i32, y: i32, z: i32) -> bool {
        self.block_at(x, y, z)
            .and_then(|block| self.catalog.of(block))
            .is_some_and(|ty| {
                ty.id != self.catalog.air_id()
                    && !ty.is_custom_model
                    && !ty.transparent
                    && !ty.liquid
            })
    }

    /// Packed ambient occlusion for one face: four 2-bit values, vertex 0 in the low bits.
    pub fn face_ao(&self, x: i32, y: i32, z: i32, side: BlockSide) -> i32 {
        let (dx, dy, dz) = side.offset();
        let solid = |(ox, oy, oz): (i32, i32, i32)| self.is_ao_solid(x + ox, y + oy, z + oz);

        let mut packed = 0;
        for (vertex, &(a, b)) in VERTEX_CORNERS.iter().enumerate() {
            let (edge1, edge2, corner) = match side {
                BlockSide::UP | BlockSide::DOWN => ((a, dy, 0), (0, dy, b), (a, dy, b)),
                BlockSide::NORTH | BlockSide::SOUTH => ((a, 0, dz), (0, b, dz), (a, b, dz)),
                BlockSide::WEST | BlockSide::EAST => ((dx, 0, a), (dx, b, 0), (dx, b, a)),
            };
            let ao = vertex_ao(solid(edge1), solid(edge2), solid(corner));
            packed |= ao << (vertex * 2);
        }
        packed
    }
}

/// Standard four-level vertex occlusion: 0 is fully occluded, 3 is open.
pub fn vertex_ao(edge1: bool, edge2: bool, corner: bool) -> i32 {
    if edge1 && edge2 {
        return 0;
    }
    3 - (edge1 as i32 + edge2 as i32 + corner as i32)
}

/// The side whose atlas tile is shown on physical `side` of `block`.
///
/// Oriented cube types go through the orientation permutation, everything else through the
/// horizontal rotation. Foliage only has two distinct tiles.
pub fn display_side(block: Block, block_type: &BlockType, side: BlockSide) -> BlockSide {
    let mut display = side.rotated(block.rotation());
    if !block_type.is_custom_model && !block_type.is_foliage && block_type.oriented {
        display = side.converted(block.orientation());
    }
    if block_type.is_foliage && display.index() > 1 {
        display = BlockSide::from_index(side as u8 % 2).unwrap_or(display);
    }
    display
}

/// Builds the draw record for one visible face.
///
/// `origin` is the block's world position. Liquids carry their own level, other blocks the level
/// of the water they face.
pub fn pack_side(
    block: Block,
    block_type: &BlockType,
    origin: [i32; 3],
    side: BlockSide,
    visibility: SideVisibility,
    ao: i32,
) -> SideInstance {
    let orientation = if block_type.oriented {
        block.orientation().unwrap_or(BlockSide::DOWN)
    } else {
        BlockSide::DOWN
    };
    let water_level = if block_type.liquid {
        block.water_level()
    } else {
        visibility.water_level
    };
    let [atlas_x, atlas_y] = block_type.atlas(display_side(block, block_type, side));

    SideInstance {
        x: origin[0],
        y: origin[1],
        z: origin[2],
        atlas_x,
        atlas_y,
        side: side as i32,
        underwater: visibility.underwater as i32,
        orientation: orientation as i32,
        water_level: water_level as i32,
        water_level_transition: 0,
        ao,
    }
}
