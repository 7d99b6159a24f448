//! Meshes waiting for their see-through faces to be re-sorted.
//!
//! Re-sorting every visible chunk every frame is wasted work: only meshes that were just built,
//! or that sit next to the player, change their back-to-front order noticeably. Those are queued
//! here and the frame driver sorts one per tick.

use std::collections::VecDeque;
use std::sync::Arc;

use super::mesh::ChunkMesh;

/// FIFO of meshes to sort, holding at most one entry per chunk coordinate.
#[derive(Debug)]
pub struct SortQueue {
    entries: VecDeque<Arc<ChunkMesh>>,
    transparent_render_distance: i32,
}

impl SortQueue {
    /// Creates an empty queue that ignores meshes beyond `transparent_render_distance` chunks.
    pub fn new(transparent_render_distance: i32) -> Self {
        SortQueue {
            entries: VecDeque::new(),
            transparent_render_distance,
        }
    }

    /// Queues `mesh` for sorting relative to the player's chunk.
    ///
    /// A mesh for a chunk that is already queued replaces the queued one in place, keeping its
    /// position in line.
    ///
    /// # Returns
    /// `false` when the mesh is too far away to need sorting.
    pub fn enqueue(&mut self, mesh: Arc<ChunkMesh>, player_chunk_x: i32, player_chunk_z: i32) -> bool {
        let dx = (mesh.x - player_chunk_x) as i64;
        let dz = (mesh.z - player_chunk_z) as i64;
        let limit = self.transparent_render_distance as i64;
        if dx * dx + dz * dz > limit * limit {
            return false;
        }

        match self
            .entries
            .iter_mut()
            .find(|queued| queued.x == mesh.x && queued.z == mesh.z)
        {
            Some(queued) => *queued = mesh,
            None => self.entries.push_back(mesh),
        }
        true
    }

    /// Sorts the oldest queued mesh for a camera at `camera`.
    ///
    /// Transparent faces go back to front. Liquid faces go front to back while the camera is
    /// above the water surface and back to front once it dips under it.
    pub fn drain_one(&mut self, camera: [f32; 3], water_level: i32) -> Option<Arc<ChunkMesh>> {
        let mesh = self.entries.pop_front()?;
        let above_water = camera[1] > (water_level + 1) as f32;
        mesh.sort_transparent(camera);
        mesh.sort_liquid(camera, above_water);
        log::trace!("Sorted chunk ({}, {})", mesh.x, mesh.z);
        Some(mesh)
    }

    /// Number of queued meshes.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine_state::rendering::vertex::SideInstance;

    fn side(x: i32, y: i32) -> SideInstance {
        SideInstance {
            x,
            y,
            ..Default::default()
        }
    }

    #[test]
    fn test_far_meshes_are_dropped() {
        let mut queue = SortQueue::new(2);
        assert!(queue.enqueue(Arc::new(ChunkMesh::empty(2, 0, 1, 0)), 0, 0));
        assert!(!queue.enqueue(Arc::new(ChunkMesh::empty(2, 1, 1, 0)), 0, 0));
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn test_same_chunk_replaces_entry() {
        let mut queue = SortQueue::new(8);
        let first = Arc::new(ChunkMesh::empty(1, 1, 1, 0));
        let second = Arc::new(ChunkMesh::empty(1, 1, 1, 1));
        queue.enqueue(Arc::new(ChunkMesh::empty(0, 0, 1, 0)), 0, 0);
        queue.enqueue(first, 0, 0);
        queue.enqueue(second.clone(), 0, 0);
        assert_eq!(queue.len(), 2);

        assert_eq!(queue.drain_one([0.0; 3], 64).unwrap().x, 0);
        let drained = queue.drain_one([0.0; 3], 64).unwrap();
        assert!(Arc::ptr_eq(&drained, &second));
        assert!(queue.drain_one([0.0; 3], 64).is_none());
    }

    #[test]
    fn test_liquid_order_flips_under_water() {
        let mut queue = SortQueue::new(8);
        let mesh = Arc::new(ChunkMesh::empty(0, 0, 1, 0));
        *mesh.liquid.get_mut() = vec![side(1, 64), side(6, 64), side(3, 64)];
        *mesh.transparent.get_mut() = vec![side(1, 64), side(6, 64)];

        queue.enqueue(mesh.clone(), 0, 0);
        queue.drain_one([0.0, 80.0, 0.0], 64);
        let above: Vec<_> = mesh.liquid.get().iter().map(|s| s.x).collect();
        assert_eq!(above, vec![1, 3, 6]);
        let glass: Vec<_> = mesh.transparent.get().iter().map(|s| s.x).collect();
        assert_eq!(glass, vec![6, 1]);

        queue.enqueue(mesh.clone(), 0, 0);
        queue.drain_one([0.0, 60.0, 0.0], 64);
        let below: Vec<_> = mesh.liquid.get().iter().map(|s| s.x).collect();
        assert_eq!(below, vec![6, 3, 1]);
    }
}
