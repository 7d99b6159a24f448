//! # Settings
//!
//! Tunables for the meshing pipeline, loaded from a JSON document. Every field has a default, so a
//! settings file only needs to name what it overrides:
//!
//! ```json
//! { "chunk_render_distance": 8, "worker_threads": 2 }
//! ```

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::engine_state::voxels::chunk::CHUNK_SIZE;
use crate::error::{PipelineError, Result};

/// Largest worker pool the pipeline accepts.
pub const MAX_WORKER_THREADS: usize = 16;

/// Runtime configuration for the pipeline.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Radius, in chunks, inside which meshes are built at full detail and collected for drawing.
    pub chunk_render_distance: i32,
    /// Factor the LOD stride is multiplied by for every tier beyond the render distance.
    pub lod_scaling_constant: i32,
    /// Coarsest LOD stride.
    pub max_lod: i32,
    /// Radius, in chunks, inside which transparent blocks are meshed and sorted.
    pub transparent_render_distance: i32,
    /// Radius, in chunks, inside which foliage is meshed.
    pub foliage_render_distance: i32,
    /// Number of mesh worker threads.
    pub worker_threads: usize,
    /// Load requests submitted to the pool per tick.
    pub chunk_load_per_frame: usize,
    /// Maximum number of cached chunk meshes across all LODs.
    pub chunk_cache_size: usize,
    /// Surface height of generated oceans, also used to pick the liquid sort direction.
    pub water_level: i32,
    /// World seed handed to terrain generation.
    pub seed: u32,
    /// Directory for `chunk_{x}_{z}.bin` files. Persistence is off when unset.
    pub worlds_dir: Option<PathBuf>,
    /// Average terrain height.
    pub base_terrain_height: i32,
    /// Height variation added on top of the base height.
    pub height_amplitude: f64,
    /// Frequency of the height noise, in cycles per chunk.
    pub height_frequency: f64,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            chunk_render_distance: 16,
            lod_scaling_constant: 2,
            max_lod: CHUNK_SIZE as i32,
            transparent_render_distance: 8,
            foliage_render_distance: 8,
            worker_threads: 4,
            chunk_load_per_frame: 1,
            chunk_cache_size: 1024,
            water_level: 64,
            seed: 42069,
            worlds_dir: None,
            base_terrain_height: 64,
            height_amplitude: 40.0,
            height_frequency: 0.25,
        }
    }
}

impl Settings {
    /// Parses settings from a JSON string and validates them.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let settings: Settings = serde_json::from_str(json)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Reads and validates a settings file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        log::info!("Loading settings from {}", path.as_ref().display());
        Self::from_json_str(&text)
    }

    /// Checks that the settings describe a pipeline that can actually run.
    ///
    /// # Returns
    /// `Err(PipelineError::Config)` naming the first offending field.
    pub fn validate(&self) -> Result<()> {
        if self.chunk_render_distance <= 0 {
            return Err(PipelineError::Config(
                "chunk_render_distance must be positive".into(),
            ));
        }
        if self.transparent_render_distance < 0 || self.foliage_render_distance < 0 {
            return Err(PipelineError::Config(
                "transparent and foliage render distances cannot be negative".into(),
            ));
        }
        if self.worker_threads == 0 || self.worker_threads > MAX_WORKER_THREADS {
            return Err(PipelineError::Config(format!(
                "worker_threads must be within 1..={}, got {}",
                MAX_WORKER_THREADS, self.worker_threads
            )));
        }
        if self.lod_scaling_constant < 2 {
            return Err(PipelineError::Config(
                "lod_scaling_constant must be at least 2".into(),
            ));
        }
        if self.max_lod < 1 || self.max_lod > CHUNK_SIZE as i32 {
            return Err(PipelineError::Config(format!(
                "max_lod must be within 1..={}",
                CHUNK_SIZE
            )));
        }
        let mut lod = 1;
        while lod < self.max_lod {
            lod *= self.lod_scaling_constant;
        }
        if lod != self.max_lod {
            return Err(PipelineError::Config(format!(
                "max_lod {} is not a power of lod_scaling_constant {}",
                self.max_lod, self.lod_scaling_constant
            )));
        }
        if self.chunk_cache_size == 0 {
            return Err(PipelineError::Config(
                "chunk_cache_size must be positive".into(),
            ));
        }
        if self.chunk_load_per_frame == 0 {
            return Err(PipelineError::Config(
                "chunk_load_per_frame must be positive".into(),
            ));
        }
        Ok(())
    }
}
