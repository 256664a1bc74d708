//! # Hexworld World
//!
//! Runtime core of the hex voxel world.
//!
//! This crate provides:
//! - Chunk storage and the run-length codec for persisting it
//! - Chunk store with in-memory and file backends
//! - Block definitions and capability lookups
//! - Incremental light propagation
//! - Actor collision against variable-height columns
//! - Resumable generation and meshing jobs with default implementations
//! - The chunk manager that streams, schedules and persists chunks
//! - The world catalog

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(clippy::unwrap_used)]

pub mod blocks;
pub mod catalog;
pub mod chunk;
pub mod codec;
pub mod config;
pub mod generation;
pub mod jobs;
pub mod lighting;
pub mod meshing;
pub mod persistence;
pub mod physics;
pub mod store;
pub mod streaming;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::blocks::{BlockDef, BlockRegistry, BlockSource};
    pub use crate::catalog::{PlayerState, WorldCatalog, WorldMeta};
    pub use crate::chunk::{Chunk, MAX_LIGHT};
    pub use crate::config::{ChunkManagerConfig, GeneratorConfig};
    pub use crate::generation::TerrainGenerator;
    pub use crate::jobs::{ChunkMesher, FaceQuery, GenerationJob, MeshJob, WorldGenerator};
    pub use crate::lighting::{LightEngine, LightField};
    pub use crate::meshing::SurfaceMesher;
    pub use crate::physics::{Actor, CollisionQuery, PhysicsConfig, PhysicsEngine, WorldCollision};
    pub use crate::store::{ChunkStore, FileBackend, MemoryBackend, RecordBackend};
    pub use crate::streaming::{ChunkManager, SaveSummary, TickReport, WantedSetReport};
}

pub use prelude::*;
