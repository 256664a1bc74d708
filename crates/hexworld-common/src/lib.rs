//! # Hexworld Common
//!
//! Common types and shared abstractions for the hexworld voxel runtime.
//!
//! This crate provides the foundational pieces used by every other crate:
//! - Hex axial math, chunk coordinates, and world-space conversion
//! - ID types (WorldId, RenderHandle)
//! - Common error types
//! - Prelude for convenient imports

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(clippy::unwrap_used)]

pub mod coords;
pub mod error;
pub mod ids;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::coords::*;
    pub use crate::error::*;
    pub use crate::ids::*;
}

pub use prelude::*;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunk_volume() {
        assert_eq!(CHUNK_VOLUME, 16_384);
    }

    #[test]
    fn test_world_id_generation() {
        let a = WorldId::generate();
        let b = WorldId::generate();
        assert_ne!(a, b);
        assert!(a.is_valid());
        assert_eq!(a.as_str().len(), 36);
        assert_eq!(a.as_str().as_bytes()[14], b'4');
    }

    #[test]
    fn test_world_id_rejects_paths() {
        assert!(!WorldId::new("../etc").is_valid());
        assert!(!WorldId::new("").is_valid());
        assert!(WorldId::new("my_world-1").is_valid());
    }

    #[test]
    fn test_error_display() {
        let err = JobError::Failed {
            coord: ChunkCoord::new(1, -2),
            reason: "boom".into(),
        };
        assert_eq!(err.to_string(), "Job for chunk 1:-2 failed: boom");
        let top: HexworldError = err.into();
        assert!(top.to_string().starts_with("Job error"));
    }
}
