//! Tunables for chunk streaming and terrain generation.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Chunk manager configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkManagerConfig {
    /// Streaming radius in chunks (hex distance)
    pub render_distance: u32,
    /// Chunks farther than this are flagged LOD
    pub lod_distance: u32,
    /// Work budget per tick in milliseconds
    pub frame_budget_ms: u64,
    /// Expected upper bound for one wanted-set update in milliseconds
    pub wanted_set_budget_ms: u64,
    /// Seconds between debounced flushes of modified chunks
    pub save_interval_secs: f32,
}

impl Default for ChunkManagerConfig {
    fn default() -> Self {
        Self {
            render_distance: 8,
            lod_distance: 4,
            frame_budget_ms: 12,
            wanted_set_budget_ms: 2,
            save_interval_secs: 5.0,
        }
    }
}

impl ChunkManagerConfig {
    /// Clamps values to sane ranges.
    pub fn validate(&mut self) {
        self.render_distance = self.render_distance.clamp(1, 32);
        self.lod_distance = self.lod_distance.min(self.render_distance);
        self.frame_budget_ms = self.frame_budget_ms.clamp(1, 100);
        self.wanted_set_budget_ms = self.wanted_set_budget_ms.clamp(1, 50);
        self.save_interval_secs = self.save_interval_secs.clamp(0.5, 600.0);
    }

    /// Tick budget as a duration.
    #[must_use]
    pub fn frame_budget(&self) -> Duration {
        Duration::from_millis(self.frame_budget_ms)
    }

    /// Wanted-set budget as a duration.
    #[must_use]
    pub fn wanted_set_budget(&self) -> Duration {
        Duration::from_millis(self.wanted_set_budget_ms)
    }

    /// Debounce interval as a duration.
    #[must_use]
    pub fn save_interval(&self) -> Duration {
        Duration::from_secs_f32(self.save_interval_secs.max(0.0))
    }
}

/// Terrain generator parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneratorConfig {
    /// World seed
    pub seed: u64,
    /// Water fills every column up to this layer
    pub sea_level: i32,
    /// Noise frequency per world unit (smaller = wider features)
    pub terrain_scale: f64,
    /// Plant trees on grass
    pub trees: bool,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            seed: 0,
            sea_level: 16,
            terrain_scale: 0.006,
            trees: true,
        }
    }
}

impl GeneratorConfig {
    /// Default parameters with a seed.
    #[must_use]
    pub fn with_seed(seed: u64) -> Self {
        Self {
            seed,
            ..Self::default()
        }
    }

    /// Clamps values to sane ranges.
    pub fn validate(&mut self) {
        self.sea_level = self.sea_level.clamp(1, 60);
        if !(self.terrain_scale > 0.0 && self.terrain_scale <= 1.0) {
            self.terrain_scale = 0.006;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ChunkManagerConfig::default();
        assert_eq!(config.render_distance, 8);
        assert_eq!(config.lod_distance, 4);
        assert_eq!(config.frame_budget(), Duration::from_millis(12));
        assert_eq!(config.save_interval(), Duration::from_secs(5));
    }

    #[test]
    fn test_validate_clamps() {
        let mut config = ChunkManagerConfig {
            render_distance: 0,
            lod_distance: 9,
            frame_budget_ms: 0,
            wanted_set_budget_ms: 1000,
            save_interval_secs: -3.0,
        };
        config.validate();
        assert_eq!(config.render_distance, 1);
        assert_eq!(config.lod_distance, 1);
        assert_eq!(config.frame_budget_ms, 1);
        assert_eq!(config.wanted_set_budget_ms, 50);
        assert_eq!(config.save_interval_secs, 0.5);

        let mut generator = GeneratorConfig {
            terrain_scale: f64::NAN,
            sea_level: 100,
            ..GeneratorConfig::default()
        };
        generator.validate();
        assert_eq!(generator.sea_level, 60);
        assert_eq!(generator.terrain_scale, 0.006);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: ChunkManagerConfig =
            serde_json::from_str(r#"{"render_distance": 3}"#).expect("valid json");
        assert_eq!(config.render_distance, 3);
        assert_eq!(config.frame_budget_ms, 12);
    }
}
