#![warn(rustdoc::missing_crate_level_docs)]
#![warn(rustdoc::invalid_rust_codeblocks)]

//! # Voxel Mesh Pipeline
//!
//! A concurrent world-meshing pipeline for chunked voxel worlds.
//!
//! The crate keeps the chunks around a moving player meshed: chunks are generated or loaded on
//! demand, built into per-category face lists on a worker pool at a level of detail that drops
//! with distance, cached, kept sorted for transparency and flattened into one world mesh a
//! renderer can upload as is. Block edits and a simple water simulation feed changes back into
//! the same cache.
//!
//! ## Key Modules
//!
//! * `config` - Runtime settings loaded from JSON
//! * `core` - Shared-resource primitives used throughout the pipeline
//! * `engine_state` - The frame driver and every pipeline stage
//! * `error` - The crate error type
//!
//! ## Usage
//!
//! ```no_run
//! use voxel_mesh_pipeline::{config::Settings, engine_state::EngineState};
//!
//! voxel_mesh_pipeline::init_logger();
//! let mut engine = EngineState::with_noise_terrain(Settings::default()).unwrap();
//! engine.preload_initial_chunks(0.0, 0.0);
//! engine.wait_chunk_loading();
//! let report = engine.tick([0.0, 90.0, 0.0]).unwrap();
//! println!("{} chunks visible", report.visible_chunks);
//! engine.shutdown().unwrap();
//! ```
//!
//! ## Performance Considerations
//!
//! * Each chunk has its own lock; a build only blocks edits to the five chunks it reads
//! * Meshes are shared behind `Arc`, never copied until the world mesh is assembled
//! * The world mesh is double-buffered and reuses its allocations across rebuilds

pub mod config;
pub mod core;
pub mod engine_state;
pub mod error;

pub use config::Settings;
pub use engine_state::EngineState;
pub use error::{PipelineError, Result};

/// Starts logging to stdout, filtered by `RUST_LOG`.
///
/// Calling it again after a logger is installed does nothing.
pub fn init_logger() {
    let mut log_builder = env_logger::Builder::new();
    let initialized = log_builder
        .target(env_logger::Target::Stdout)
        .parse_env("RUST_LOG")
        .try_init()
        .is_ok();
    if initialized {
        log::info!("Logger initialized");
    }
}
