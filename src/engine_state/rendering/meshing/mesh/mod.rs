//! Mesh generation for voxel chunks.
//!
//! This module converts chunk data into per-category face lists ready for instanced drawing.
//!
//! # Architecture
//! - [`MeshBuilder`]: Walks a chunk on its LOD stride and routes each block to a category
//! - [`ChunkView`]: Neighbor lookup across chunk borders, face visibility and ambient occlusion
//! - [`ChunkMesh`]: The result, owned by the mesh cache once a build completes
//!
//! # Usage
//! ```no_run
//! use voxel_mesh_pipeline::engine_state::{
//!     rendering::meshing::mesh::MeshBuilder,
//!     voxels::{block::{block_model::ModelCatalog, block_type::BlockCatalog}, chunk::Chunk},
//! };
//!
//! let catalog = BlockCatalog::builtin().unwrap();
//! let models = ModelCatalog::builtin();
//! let chunk = Chunk::empty(0, 0);
//! let mesh = MeshBuilder::new(&catalog, &models).build(&chunk, [None; 4], 1, true, true);
//! assert!(mesh.is_empty());
//! ```
//!
//! # Performance Considerations
//! - Cube faces are emitted as one instance record each, never expanded into triangles
//! - A build only reads its chunk and four neighbors, so builds of different chunks run in
//!   parallel without coordination

mod builder;
mod face;
mod mesh;

pub use builder::{model_transform, MeshBuilder};
pub use face::{display_side, pack_side, vertex_ao, ChunkView, SideVisibility};
pub use mesh::ChunkMesh;
