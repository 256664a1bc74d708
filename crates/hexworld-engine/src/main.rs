//! # Hexworld
//!
//! Headless runner for the hex voxel world: opens a world, streams and
//! meshes chunks around a walking observer, then saves and exits.
//!
//! Usage: `hexworld [config.toml]` (defaults to `hexworld.toml`).

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(clippy::unwrap_used)]

mod config;
mod session;
mod timing;

use anyhow::Result;
use std::path::PathBuf;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::config::{EngineConfig, CONFIG_FILE};
use crate::session::Session;

/// Main entry point.
fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env().add_directive("hexworld=info".parse()?))
        .init();

    info!("Hexworld starting...");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let path = std::env::args_os()
        .nth(1)
        .map_or_else(|| PathBuf::from(CONFIG_FILE), PathBuf::from);
    let config = if path.exists() {
        EngineConfig::load_from(&path)
    } else {
        // Leave an editable copy of the defaults behind
        let config = EngineConfig::default();
        if let Err(e) = config.save_to(&path) {
            warn!("Failed to write default config: {e}");
        }
        config
    };

    let report = Session::open(config)?.run()?;
    info!(
        "Walked {:.1} units, placed {} torches, lit {} cells, built {} meshes",
        report.distance_walked, report.torches_placed, report.cells_lit, report.meshes_built
    );

    info!("Hexworld shutdown complete");
    Ok(())
}
