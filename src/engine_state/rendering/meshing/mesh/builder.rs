//! Turns a chunk and its neighbors into a [`ChunkMesh`].
//!
//! Every sampled non-air block is routed to exactly one category:
//!
//! | block                     | category      | gated by             |
//! |---------------------------|---------------|----------------------|
//! | liquid                    | liquid        |                      |
//! | transparent, not foliage  | transparent   | `render_transparent` |
//! | transparent foliage       | foliage       | `render_foliage`     |
//! | custom model              | custom model  |                      |
//! | anything else             | opaque        |                      |
//!
//! Liquids additionally emit transition faces toward neighboring water at a different level so
//! the renderer can slope the surface between them.

use std::f32::consts::{FRAC_PI_2, PI};

use cgmath::{Matrix4, Rad, SquareMatrix, Vector3, Vector4};

use super::face::{pack_side, ChunkView};
use super::mesh::ChunkMesh;
use crate::core::MtResource;
use crate::engine_state::rendering::vertex::{SideInstance, AO_NONE, FLOATS_PER_MODEL_VERT};
use crate::engine_state::voxels::block::{
    block_model::ModelCatalog,
    block_side::BlockSide,
    block_type::{BlockCatalog, BlockType},
    Block,
};
use crate::engine_state::voxels::chunk::{chunk_iteration::ChunkBlockIterator, Chunk, CHUNK_SIZE};

/// Builds chunk meshes against a block catalog and a model catalog.
///
/// The builder holds no mutable state and can be shared by every worker thread.
#[derive(Clone, Copy)]
pub struct MeshBuilder<'a> {
    catalog: &'a BlockCatalog,
    models: &'a ModelCatalog,
}

impl<'a> MeshBuilder<'a> {
    pub fn new(catalog: &'a BlockCatalog, models: &'a ModelCatalog) -> Self {
        MeshBuilder { catalog, models }
    }

    /// Builds the mesh of `chunk` sampled every `lod_scale` blocks.
    ///
    /// # Arguments
    /// * `neighbors` - Chunks to the `[north, west, south, east]`, `None` where not loaded
    /// * `lod_scale` - Sampling stride, 1 for full detail
    /// * `render_transparent` - Whether transparent blocks are meshed
    /// * `render_foliage` - Whether foliage is meshed
    ///
    /// Blocks of unknown type and custom-model blocks whose model is missing are skipped.
    pub fn build(
        &self,
        chunk: &Chunk,
        neighbors: [Option<&Chunk>; 4],
        lod_scale: i32,
        render_transparent: bool,
        render_foliage: bool,
    ) -> ChunkMesh {
        let lod_scale = lod_scale.max(1);
        let mut packer = ChunkPacker {
            view: ChunkView::new(chunk, neighbors, self.catalog),
            models: self.models,
            lod_scale,
            origin_x: chunk.x * CHUNK_SIZE as i32,
            origin_z: chunk.z * CHUNK_SIZE as i32,
            unknown_blocks: 0,
            missing_models: 0,
        };

        let mut opaque = Vec::new();
        let mut transparent = Vec::new();
        let mut foliage = Vec::new();
        let mut liquid = Vec::new();
        let mut custom_model = Vec::new();

        let air = self.catalog.air_id();
        for (x, y, z, block) in ChunkBlockIterator::new(chunk, lod_scale as usize, air) {
            let (x, y, z) = (x as i32, y as i32, z as i32);
            let Some(block_type) = self.catalog.of(block) else {
                packer.unknown_blocks += 1;
                continue;
            };

            if block_type.liquid {
                packer.pack_block(block, block_type, x, y, z, &mut liquid);
                packer.pack_water_transitions(block, x, y, z, &mut liquid);
            } else if block_type.transparent && !block_type.is_foliage {
                if render_transparent {
                    packer.pack_block(block, block_type, x, y, z, &mut transparent);
                }
            } else if block_type.transparent && block_type.is_foliage {
                if render_foliage {
                    packer.pack_block(block, block_type, x, y, z, &mut foliage);
                }
            } else if block_type.is_custom_model {
                packer.pack_model(block, block_type, x, y, z, &mut custom_model);
            } else {
                packer.pack_block(block, block_type, x, y, z, &mut opaque);
            }
        }

        if packer.unknown_blocks > 0 {
            log::warn!(
                "Skipped {} blocks of unknown type in chunk ({}, {})",
                packer.unknown_blocks,
                chunk.x,
                chunk.z
            );
        }
        if packer.missing_models > 0 {
            log::warn!(
                "Skipped {} custom-model blocks without a loaded model in chunk ({}, {})",
                packer.missing_models,
                chunk.x,
                chunk.z
            );
        }

        ChunkMesh {
            x: chunk.x,
            z: chunk.z,
            lod_scale,
            revision: chunk.revision(),
            neighbor_revisions: neighbors.map(|n| n.map(Chunk::revision)),
            opaque,
            foliage,
            transparent: MtResource::new(transparent),
            liquid: MtResource::new(liquid),
            custom_model,
        }
    }
}

struct ChunkPacker<'a> {
    view: ChunkView<'a>,
    models: &'a ModelCatalog,
    lod_scale: i32,
    origin_x: i32,
    origin_z: i32,
    unknown_blocks: usize,
    missing_models: usize,
}

impl ChunkPacker<'_> {
    fn world(&self, x: i32, y: i32, z: i32) -> [i32; 3] {
        [self.origin_x + x, y, self.origin_z + z]
    }

    fn pack_block(
        &self,
        block: Block,
        block_type: &BlockType,
        x: i32,
        y: i32,
        z: i32,
        out: &mut Vec<SideInstance>,
    ) {
        let origin = self.world(x, y, z);
        for side in BlockSide::all() {
            let visibility = self
                .view
                .side_visibility(block_type, x, y, z, side, self.lod_scale);
            if !visibility.visible {
                continue;
            }
            let ao = self.view.face_ao(x, y, z, side);
            out.push(pack_side(block, block_type, origin, side, visibility, ao));
        }
    }

    /// Emits sloped-surface faces toward horizontal water neighbors at a different level.
    ///
    /// The higher block always emits. The lower block only emits when the difference is a single
    /// level, which closes the far edge of the slope without doubling faces.
    fn pack_water_transitions(
        &self,
        block: Block,
        x: i32,
        y: i32,
        z: i32,
        out: &mut Vec<SideInstance>,
    ) {
        let catalog = self.view.catalog;
        let water_id = catalog.water_id();
        let Some(water) = catalog.get(water_id) else {
            return;
        };
        let current = block.water_level();
        let [wx, wy, wz] = self.world(x, y, z);

        for side in BlockSide::horizontal() {
            let adjacent = self.view.adjacent_block(x, y, z, side, self.lod_scale);
            if adjacent.id() != water_id {
                continue;
            }
            let neighbor = adjacent.water_level();
            let (from, to) = if current > neighbor {
                (neighbor, current)
            } else if neighbor == current + 1 {
                (current, neighbor)
            } else {
                continue;
            };

            let [atlas_x, atlas_y] = water.atlas(side);
            out.push(SideInstance {
                x: wx,
                y: wy,
                z: wz,
                atlas_x,
                atlas_y,
                side: side as i32,
                underwater: 0,
                orientation: BlockSide::DOWN as i32,
                water_level: to as i32,
                water_level_transition: from as i32,
                ao: AO_NONE,
            });
        }
    }

    fn pack_model(
        &mut self,
        block: Block,
        block_type: &BlockType,
        x: i32,
        y: i32,
        z: i32,
        out: &mut Vec<f32>,
    ) {
        let Some(model) = block_type
            .model_for(block.orientation())
            .and_then(|name| self.models.get(name))
        else {
            self.missing_models += 1;
            return;
        };

        let transform = model_transform(block_type, block);
        let [wx, wy, wz] = self.world(x, y, z);
        let offset = Vector4::new(wx as f32, wy as f32, wz as f32, 0.0);

        out.reserve(model.index_count() * FLOATS_PER_MODEL_VERT);
        for &index in &model.indices {
            let Some(vertex) = model.vertices.get(index as usize) else {
                continue;
            };
            let [px, py, pz] = vertex.position;
            let [nx, ny, nz] = vertex.normal;
            let position = transform * Vector4::new(px, py, pz, 1.0) + offset;
            let normal = transform * Vector4::new(nx, ny, nz, 0.0);
            out.extend_from_slice(&[
                position.x,
                position.y,
                position.z,
                normal.x,
                normal.y,
                normal.z,
                vertex.uv[0],
                vertex.uv[1],
            ]);
        }
    }
}

/// Rotation of a custom model about the block centre.
///
/// Oriented types turn to face their stored orientation, other types turn by their horizontal
/// rotation in quarter turns.
pub fn model_transform(block_type: &BlockType, block: Block) -> Matrix4<f32> {
    let rotation = if block_type.oriented {
        match block.orientation() {
            Some(BlockSide::UP) => Matrix4::from_angle_x(Rad(PI)),
            Some(BlockSide::SOUTH) => Matrix4::from_angle_y(Rad(PI)),
            Some(BlockSide::EAST) => Matrix4::from_angle_y(Rad(FRAC_PI_2)),
            Some(BlockSide::WEST) => Matrix4::from_angle_y(Rad(-FRAC_PI_2)),
            _ => Matrix4::identity(),
        }
    } else {
        Matrix4::from_angle_y(Rad(block.rotation() as f32 * FRAC_PI_2))
    };
    Matrix4::from_translation(Vector3::new(0.5, 0.5, 0.5))
        * rotation
        * Matrix4::from_translation(Vector3::new(-0.5, -0.5, -0.5))
}
