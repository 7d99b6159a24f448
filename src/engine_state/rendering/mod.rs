//! Mesh side of the pipeline.
//!
//! This module turns chunks into per-category face lists, caches them per level of detail, keeps
//! their see-through faces sorted and flattens the visible set into one world mesh for the
//! renderer. Drawing itself happens elsewhere; everything here is CPU-side data.

pub mod meshing;
pub mod tasks;
pub mod vertex;
pub mod world_mesh;
