//! # Headless Pipeline Driver
//!
//! Runs the meshing pipeline without a window: preloads the world around the origin, walks the
//! player forward for a while and logs what the world mesh looks like.
//!
//! ## Usage
//!
//! ```bash
//! RUST_LOG=info cargo run --release -- [settings.json]
//! ```

use std::process::ExitCode;

use log::{error, info};
use voxel_mesh_pipeline::{EngineState, Result, Settings};
use web_time::Instant;

const TICKS: usize = 240;
const WALK_SPEED: f32 = 0.25;
const EYE_HEIGHT: f32 = 90.0;

fn run() -> Result<()> {
    let settings = match std::env::args().nth(1) {
        Some(path) => Settings::from_file(path)?,
        None => Settings::default(),
    };

    let start = Instant::now();
    let mut engine = EngineState::with_noise_terrain(settings)?;
    let submitted = engine.preload_initial_chunks(0.0, 0.0);
    engine.wait_chunk_loading();
    info!(
        "Preloaded {} chunks in {:.2?}",
        submitted,
        start.elapsed()
    );

    let start = Instant::now();
    let mut rebuilds = 0;
    for tick in 0..TICKS {
        let position = [tick as f32 * WALK_SPEED, EYE_HEIGHT, 0.0];
        let report = engine.tick(position)?;
        if report.rebuilt {
            rebuilds += 1;
        }
    }
    engine.wait_chunk_loading();
    info!(
        "{} ticks in {:.2?}, {} world mesh rebuilds",
        TICKS,
        start.elapsed(),
        rebuilds
    );

    let world = engine.get_world_mesh();
    info!(
        "World mesh: {} opaque, {} transparent, {} liquid, {} foliage faces, {} model vertices",
        world.counts.opaque,
        world.counts.transparent,
        world.counts.liquid,
        world.counts.foliage,
        world.counts.custom_verts
    );
    info!(
        "{} chunks in memory, {} meshes cached",
        engine.store().len(),
        engine.cached_meshes()
    );

    engine.shutdown()?;
    Ok(())
}

fn main() -> ExitCode {
    voxel_mesh_pipeline::init_logger();
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}
