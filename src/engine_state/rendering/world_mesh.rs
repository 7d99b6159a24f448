//! # World Mesh
//!
//! Flattens the visible chunk meshes into one set of draw buffers per category.
//!
//! ## Aggregation
//!
//! The first pass sums the per-category counts of every input mesh, the second pass copies each
//! mesh into its slice of the combined buffers. Cube faces are written as `VBO_WIDTH` integers
//! each (see [`SideInstance::write_to`]), custom models as raw floats.
//!
//! ## Double Buffering
//!
//! [`WorldMeshBuffer`] keeps an active mesh, shared with the renderer behind an `Arc`, and a
//! staging mesh the next rebuild writes into. A rebuild swaps the two under a short lock. When the
//! renderer has let go of the old active mesh it becomes the next staging mesh, so both buffers
//! keep their high-water capacity and steady-state rebuilds do not allocate.
//!
//! [`SideInstance::write_to`]: crate::engine_state::rendering::vertex::SideInstance::write_to

use std::sync::{Arc, Mutex, PoisonError};

use super::meshing::ChunkMesh;
use super::vertex::{SideInstance, FLOATS_PER_MODEL_VERT, VBO_WIDTH};
use crate::error::{PipelineError, Result};

/// Per-category totals across a set of chunk meshes.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct MeshCounts {
    pub opaque: usize,
    pub transparent: usize,
    pub liquid: usize,
    pub foliage: usize,
    pub custom_verts: usize,
}

impl MeshCounts {
    /// Sums the counts of `meshes`.
    pub fn of(meshes: &[Arc<ChunkMesh>]) -> Self {
        meshes.iter().fold(MeshCounts::default(), |mut total, mesh| {
            total.opaque += mesh.opaque.len();
            total.transparent += mesh.transparent.get().len();
            total.liquid += mesh.liquid.get().len();
            total.foliage += mesh.foliage.len();
            total.custom_verts += mesh.custom_vertex_count();
            total
        })
    }
}

/// Draw buffers for every visible chunk.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct WorldMesh {
    pub opaque: Vec<i32>,
    pub transparent: Vec<i32>,
    pub liquid: Vec<i32>,
    pub foliage: Vec<i32>,
    pub custom_model: Vec<f32>,
    pub counts: MeshCounts,
}

fn reserve<T>(buffer: &mut Vec<T>, needed: usize, name: &str) -> Result<()> {
    if needed <= buffer.capacity() {
        return Ok(());
    }
    let grown = needed.saturating_add(needed / 2);
    buffer.clear();
    buffer
        .try_reserve_exact(grown)
        .or_else(|_| buffer.try_reserve_exact(needed))
        .map_err(|e| {
            PipelineError::Resource(format!("{} buffer of {} elements: {}", name, needed, e))
        })
}

fn slots(count: usize, width: usize, name: &str) -> Result<usize> {
    count.checked_mul(width).ok_or_else(|| {
        PipelineError::Resource(format!("{} buffer size overflows for {} entries", name, count))
    })
}

fn append_sides(buffer: &mut Vec<i32>, sides: &[SideInstance], lod_scale: i32) {
    for side in sides {
        let start = buffer.len();
        buffer.resize(start + VBO_WIDTH, 0);
        side.write_to(&mut buffer[start..], lod_scale);
    }
}

impl WorldMesh {
    /// Grows every buffer to hold `counts`, leaving half as much again as headroom.
    ///
    /// # Errors
    /// `PipelineError::Resource` when a buffer cannot grow. Buffers that already grew keep their
    /// new capacity and no content is written.
    pub fn ensure_capacity(&mut self, counts: MeshCounts) -> Result<()> {
        reserve(&mut self.opaque, slots(counts.opaque, VBO_WIDTH, "opaque")?, "opaque")?;
        reserve(
            &mut self.transparent,
            slots(counts.transparent, VBO_WIDTH, "transparent")?,
            "transparent",
        )?;
        reserve(&mut self.liquid, slots(counts.liquid, VBO_WIDTH, "liquid")?, "liquid")?;
        reserve(&mut self.foliage, slots(counts.foliage, VBO_WIDTH, "foliage")?, "foliage")?;
        reserve(
            &mut self.custom_model,
            slots(counts.custom_verts, FLOATS_PER_MODEL_VERT, "custom model")?,
            "custom model",
        )
    }

    /// Overwrites the buffers with `meshes`, in order. Capacity must already be ensured.
    fn fill(&mut self, meshes: &[Arc<ChunkMesh>], counts: MeshCounts) {
        self.opaque.clear();
        self.transparent.clear();
        self.liquid.clear();
        self.foliage.clear();
        self.custom_model.clear();
        for mesh in meshes {
            let lod = mesh.lod_scale;
            append_sides(&mut self.opaque, &mesh.opaque, lod);
            append_sides(&mut self.transparent, &mesh.transparent.get(), lod);
            append_sides(&mut self.liquid, &mesh.liquid.get(), lod);
            append_sides(&mut self.foliage, &mesh.foliage, lod);
            self.custom_model.extend_from_slice(&mesh.custom_model);
        }
        self.counts = counts;
    }

    /// Total number of cube faces.
    pub fn side_count(&self) -> usize {
        self.counts.opaque + self.counts.transparent + self.counts.liquid + self.counts.foliage
    }
}

/// Builds a fresh world mesh from `meshes`.
///
/// # Errors
/// `PipelineError::Resource` when the buffers cannot be allocated.
pub fn aggregate(meshes: &[Arc<ChunkMesh>]) -> Result<WorldMesh> {
    let counts = MeshCounts::of(meshes);
    let mut world = WorldMesh::default();
    world.ensure_capacity(counts)?;
    world.fill(meshes, counts);
    Ok(world)
}

/// Double-buffered world mesh shared between the frame driver and the renderer.
pub struct WorldMeshBuffer {
    active: Mutex<Arc<WorldMesh>>,
    staging: WorldMesh,
}

impl Default for WorldMeshBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl WorldMeshBuffer {
    pub fn new() -> Self {
        WorldMeshBuffer {
            active: Mutex::new(Arc::new(WorldMesh::default())),
            staging: WorldMesh::default(),
        }
    }

    /// The mesh the renderer should draw.
    pub fn active(&self) -> Arc<WorldMesh> {
        self.active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Aggregates `meshes` into the staging buffer and makes it active.
    ///
    /// # Errors
    /// `PipelineError::Resource` when the staging buffer cannot grow. The active mesh is left
    /// untouched, so the renderer keeps drawing the previous frame's geometry.
    pub fn rebuild(&mut self, meshes: &[Arc<ChunkMesh>]) -> Result<Arc<WorldMesh>> {
        let counts = MeshCounts::of(meshes);
        self.staging.ensure_capacity(counts)?;
        self.staging.fill(meshes, counts);

        let fresh = Arc::new(std::mem::take(&mut self.staging));
        let previous = {
            let mut active = self.active.lock().unwrap_or_else(PoisonError::into_inner);
            std::mem::replace(&mut *active, fresh.clone())
        };
        if let Ok(reclaimed) = Arc::try_unwrap(previous) {
            self.staging = reclaimed;
        }
        log::debug!(
            "World mesh rebuilt from {} chunks: {} faces, {} model vertices",
            meshes.len(),
            fresh.side_count(),
            counts.custom_verts
        );
        Ok(fresh)
    }

    #[cfg(test)]
    fn staging_opaque_capacity(&self) -> usize {
        self.staging.opaque.capacity()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mesh_with(x: i32, lod: i32, opaque: usize, liquid: usize, custom_verts: usize) -> Arc<ChunkMesh> {
        let mut mesh = ChunkMesh::empty(x, 0, lod, 0);
        mesh.opaque = (0..opaque)
            .map(|i| SideInstance {
                x: x * 16 + i as i32,
                ..Default::default()
            })
            .collect();
        *mesh.liquid.get_mut() = vec![SideInstance::default(); liquid];
        mesh.custom_model = vec![1.0; custom_verts * FLOATS_PER_MODEL_VERT];
        Arc::new(mesh)
    }

    #[test]
    fn test_aggregate_concatenates_in_order() {
        let meshes = vec![mesh_with(0, 1, 2, 1, 3), mesh_with(1, 2, 1, 0, 0)];
        let world = aggregate(&meshes).unwrap();

        assert_eq!(
            world.counts,
            MeshCounts {
                opaque: 3,
                transparent: 0,
                liquid: 1,
                foliage: 0,
                custom_verts: 3,
            }
        );
        assert_eq!(world.opaque.len(), 3 * VBO_WIDTH);
        assert_eq!(world.liquid.len(), VBO_WIDTH);
        assert_eq!(world.custom_model.len(), 3 * FLOATS_PER_MODEL_VERT);

        let xs: Vec<_> = world.opaque.chunks_exact(VBO_WIDTH).map(|s| s[0]).collect();
        assert_eq!(xs, vec![0, 1, 16]);
        let lods: Vec<_> = world.opaque.chunks_exact(VBO_WIDTH).map(|s| s[11]).collect();
        assert_eq!(lods, vec![1, 1, 2]);
    }

    #[test]
    fn test_aggregate_of_nothing_is_empty() {
        let world = aggregate(&[]).unwrap();
        assert_eq!(world.side_count(), 0);
        assert!(world.opaque.is_empty());
    }

    #[test]
    fn test_double_buffer_swaps_and_keeps_capacity() {
        let mut buffer = WorldMeshBuffer::new();
        assert_eq!(buffer.active().side_count(), 0);

        let big = vec![mesh_with(0, 1, 40, 0, 0)];
        let first = buffer.rebuild(&big).unwrap();
        assert_eq!(first.counts.opaque, 40);
        assert!(Arc::ptr_eq(&first, &buffer.active()));
        drop(first);

        let small = vec![mesh_with(0, 1, 2, 0, 0)];
        let second = buffer.rebuild(&small).unwrap();
        assert_eq!(second.counts.opaque, 2);
        drop(second);

        // the 40-face buffer came back as staging with its capacity intact
        assert!(buffer.staging_opaque_capacity() >= 40 * VBO_WIDTH);
        let third = buffer.rebuild(&small).unwrap();
        assert_eq!(third.opaque.len(), 2 * VBO_WIDTH);
    }

    #[test]
    fn test_growth_leaves_headroom() {
        let mut world = WorldMesh::default();
        world
            .ensure_capacity(MeshCounts {
                opaque: 10,
                ..Default::default()
            })
            .unwrap();
        assert!(world.opaque.capacity() >= 15 * VBO_WIDTH);
    }

    #[test]
    fn test_impossible_growth_is_a_resource_error() {
        let mut world = WorldMesh::default();
        let err = world
            .ensure_capacity(MeshCounts {
                opaque: usize::MAX / 2,
                ..Default::default()
            })
            .unwrap_err();
        assert!(matches!(err, PipelineError::Resource(_)));

        let err = world
            .ensure_capacity(MeshCounts {
                liquid: isize::MAX as usize / VBO_WIDTH,
                ..Default::default()
            })
            .unwrap_err();
        assert!(matches!(err, PipelineError::Resource(_)));
    }
}
