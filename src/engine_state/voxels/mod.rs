//! # Voxel Data
//!
//! This module contains the voxel side of the pipeline: how blocks are packed, how chunks hold
//! them, where chunks live and how water moves through them.
//!
//! ## Architecture
//!
//! The voxel system is organized into several key components:
//!
//! * **Block**: Defines individual voxel types, properties, and behaviors
//! * **Chunk**: Manages fixed-size 3D arrays of blocks for efficient memory use and processing
//! * **World**: The voxel store, owning every chunk in memory and loading or generating missing ones
//! * **Persistence**: The on-disk chunk file and the run-length network encoding
//! * **Water**: The cellular automaton that spreads and drains water between ticks
//!
//! ## Performance Considerations
//!
//! * Each chunk sits behind its own read-write lock, so builds of different chunks never wait
//!   on each other
//! * Chunks far from the player can be evicted once they are saved
//! * Water only scans chunks that were marked dirty, a bounded number per tick
//!
//! ## Data Flow
//!
//! 1. The store receives a request for a chunk and loads or generates it when missing
//! 2. Edits take the chunk's write lock and bump its revision
//! 3. The frame driver drops the chunk's meshes and rebuilds them
//! 4. Edits next to water mark the chunk for the next water step

pub mod block;
pub mod chunk;
pub mod persistence;
pub mod water;
pub mod world;
