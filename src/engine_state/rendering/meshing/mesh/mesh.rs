//! The per-chunk mesh produced by the builder and held by the mesh cache.

use std::cmp::Ordering;

use crate::core::MtResource;
use crate::engine_state::rendering::vertex::{SideInstance, FLOATS_PER_MODEL_VERT};

/// Render-ready geometry for one chunk at one level of detail.
///
/// Opaque and foliage faces are never touched after the build. Transparent and liquid faces sit
/// behind their own locks so the sort queue can reorder them in place while the mesh is shared
/// with the cache and the aggregator; sorting changes order only, never content.
#[derive(Debug)]
pub struct ChunkMesh {
    /// Chunk x coordinate
    pub x: i32,
    /// Chunk z coordinate
    pub z: i32,
    /// Sampling stride the mesh was built with
    pub lod_scale: i32,
    /// Revision of the chunk when it was read
    pub revision: u64,
    /// Revisions of the north, west, south and east neighbors when they were read
    pub neighbor_revisions: [Option<u64>; 4],
    pub opaque: Vec<SideInstance>,
    pub foliage: Vec<SideInstance>,
    pub transparent: MtResource<Vec<SideInstance>>,
    pub liquid: MtResource<Vec<SideInstance>>,
    /// Triangulated custom models, `FLOATS_PER_MODEL_VERT` floats per vertex
    pub custom_model: Vec<f32>,
}

impl ChunkMesh {
    /// Creates a mesh with no geometry.
    pub fn empty(x: i32, z: i32, lod_scale: i32, revision: u64) -> Self {
        ChunkMesh {
            x,
            z,
            lod_scale,
            revision,
            neighbor_revisions: [None; 4],
            opaque: Vec::new(),
            foliage: Vec::new(),
            transparent: MtResource::new(Vec::new()),
            liquid: MtResource::new(Vec::new()),
            custom_model: Vec::new(),
        }
    }

    /// Number of custom-model vertices.
    pub fn custom_vertex_count(&self) -> usize {
        self.custom_model.len() / FLOATS_PER_MODEL_VERT
    }

    /// Total number of cube faces across every category.
    pub fn side_count(&self) -> usize {
        self.opaque.len()
            + self.foliage.len()
            + self.transparent.get().len()
            + self.liquid.get().len()
    }

    /// Whether the mesh holds no geometry at all.
    pub fn is_empty(&self) -> bool {
        self.side_count() == 0 && self.custom_model.is_empty()
    }

    /// Squared distance, in chunks, between this chunk's centre and a position given in chunk
    /// units.
    pub fn chunk_distance_squared(&self, chunk_x: f32, chunk_z: f32) -> f32 {
        let dx = self.x as f32 + 0.5 - chunk_x;
        let dz = self.z as f32 + 0.5 - chunk_z;
        dx * dx + dz * dz
    }

    /// Orders transparent faces back to front as seen from `camera`.
    pub fn sort_transparent(&self, camera: [f32; 3]) {
        sort_by_distance(&mut self.transparent.get_mut(), camera, true);
    }

    /// Orders liquid faces for a camera above (`front_to_back`) or below the water surface.
    pub fn sort_liquid(&self, camera: [f32; 3], front_to_back: bool) {
        sort_by_distance(&mut self.liquid.get_mut(), camera, !front_to_back);
    }
}

fn sort_by_distance(sides: &mut [SideInstance], camera: [f32; 3], descending: bool) {
    let [cx, cy, cz] = camera;
    sides.sort_by(|a, b| {
        let da = a.distance_squared_to(cx, cy, cz);
        let db = b.distance_squared_to(cx, cy, cz);
        let order = da.partial_cmp(&db).unwrap_or(Ordering::Equal);
        if descending {
            order.reverse()
        } else {
            order
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    fn side_at(x: i32) -> SideInstance {
        SideInstance {
            x,
            ..Default::default()
        }
    }

    #[test]
    fn test_empty_mesh() {
        let mesh = ChunkMesh::empty(2, -3, 4, 7);
        assert!(mesh.is_empty());
        assert_eq!(mesh.custom_vertex_count(), 0);
        assert_eq!(mesh.neighbor_revisions, [None; 4]);
    }

    #[test]
    fn test_transparent_sorts_back_to_front() {
        let mesh = ChunkMesh::empty(0, 0, 1, 0);
        *mesh.transparent.get_mut() = vec![side_at(1), side_at(9), side_at(4)];
        mesh.sort_transparent([0.0, 0.0, 0.0]);
        let order: Vec<_> = mesh.transparent.get().iter().map(|s| s.x).collect();
        assert_eq!(order, vec![9, 4, 1]);
    }

    #[test]
    fn test_liquid_direction_follows_camera() {
        let mesh = ChunkMesh::empty(0, 0, 1, 0);
        *mesh.liquid.get_mut() = vec![side_at(5), side_at(2), side_at(8)];

        mesh.sort_liquid([0.0, 0.0, 0.0], true);
        let above: Vec<_> = mesh.liquid.get().iter().map(|s| s.x).collect();
        assert_eq!(above, vec![2, 5, 8]);

        mesh.sort_liquid([0.0, 0.0, 0.0], false);
        let below: Vec<_> = mesh.liquid.get().iter().map(|s| s.x).collect();
        assert_eq!(below, vec![8, 5, 2]);
        assert_eq!(mesh.side_count(), 3);
    }
}
