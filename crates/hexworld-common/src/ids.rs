//! Identifier types for worlds and render resources.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of a saved world.
///
/// Generated ids are random UUID-v4 style strings. Ids are also used as
/// directory names by file-backed storage, so only ASCII alphanumerics,
/// `-` and `_` are considered valid.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorldId(String);

impl WorldId {
    /// Wraps an existing id string.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generates a fresh random id.
    #[must_use]
    pub fn generate() -> Self {
        let bits = fastrand::u128(..);
        // Version 4, variant 10xx.
        let bits = (bits & !(0xF << 76) | (0x4 << 76)) & !(0x3 << 62) | (0x2 << 62);
        let hex = format!("{bits:032x}");
        Self(format!(
            "{}-{}-{}-{}-{}",
            &hex[0..8],
            &hex[8..12],
            &hex[12..16],
            &hex[16..20],
            &hex[20..32]
        ))
    }

    /// Returns the id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Checks the id is non-empty and safe to use as a path component.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        !self.0.is_empty()
            && self
                .0
                .bytes()
                .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
    }
}

impl fmt::Display for WorldId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for WorldId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// Opaque handle to a chunk's render representation.
///
/// Handles are issued and owned by the mesher; the world core only stores
/// and returns them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RenderHandle(u64);

impl RenderHandle {
    /// Creates a handle from a raw value.
    #[must_use]
    pub const fn from_raw(value: u64) -> Self {
        Self(value)
    }

    /// Returns the raw handle value.
    #[must_use]
    pub const fn raw(self) -> u64 {
        self.0
    }
}
