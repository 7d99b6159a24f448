//! Background tasks for the meshing pipeline.
//!
//! # Available Tasks
//! - `process_chunk_work_item`: Builds one chunk mesh on a worker thread and caches it

pub mod chunk_mesh_generation_task;

pub use chunk_mesh_generation_task::{process_chunk_work_item, ChunkWorkItem, MeshingContext};
