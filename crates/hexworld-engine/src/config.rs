//! Runner configuration.
//!
//! Everything the headless runner needs to open a world and drive it:
//! where data lives, which world to play, how long to simulate, and the
//! tunables of the chunk manager, physics and terrain. Loaded from and
//! saved to a TOML file.

use hexworld_world::config::{ChunkManagerConfig, GeneratorConfig};
use hexworld_world::physics::PhysicsConfig;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Configuration file name.
pub const CONFIG_FILE: &str = "hexworld.toml";

/// Runner configuration parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    // === Storage ===
    /// Directory holding the world catalog and chunk records
    pub data_dir: PathBuf,
    /// Optional JSON block definition file (built-in palette otherwise)
    pub block_definitions: Option<PathBuf>,

    // === World ===
    /// Name of the world to open, created if no world has it
    pub world_name: String,
    /// Seed for a newly created world (None = random)
    pub world_seed: Option<u64>,

    // === Simulation ===
    /// Frames to simulate before shutting down
    pub frames: u32,
    /// Simulated frames per second
    pub target_fps: u32,
    /// Pace frames against the wall clock instead of running flat out
    pub realtime: bool,
    /// Observer walking speed in units/s
    pub walk_speed: f32,
    /// Place a torch every this many frames (0 = never)
    pub torch_interval: u32,

    // === Subsystems ===
    /// Streaming and scheduling
    pub chunks: ChunkManagerConfig,
    /// Actor collision
    pub physics: PhysicsConfig,
    /// Terrain shape; the seed is taken from the opened world
    pub terrain: GeneratorConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("hexworld-data"),
            block_definitions: None,

            world_name: hexworld_world::catalog::DEFAULT_WORLD_NAME.to_string(),
            world_seed: None,

            frames: 600,
            target_fps: 60,
            realtime: false,
            walk_speed: 4.3,
            torch_interval: 120,

            chunks: ChunkManagerConfig::default(),
            physics: PhysicsConfig::default(),
            terrain: GeneratorConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Load configuration from a specific path.
    /// Returns default config if file doesn't exist or is invalid.
    pub fn load_from<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref();

        if !path.exists() {
            info!("Config file {} not found, using defaults", path.display());
            return Self::default();
        }

        let contents = match fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) => {
                warn!("Failed to read config file: {e}");
                return Self::default();
            },
        };

        match toml::from_str::<Self>(&contents) {
            Ok(mut config) => {
                config.validate();
                info!("Loaded config from {}", path.display());
                config
            },
            Err(e) => {
                warn!("Failed to parse config file: {e}");
                Self::default()
            },
        }
    }

    /// Save configuration to a specific path.
    pub fn save_to<P: AsRef<Path>>(&self, path: P) -> io::Result<()> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let contents = toml::to_string_pretty(self)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        fs::write(path, contents)?;

        info!("Saved config to {}", path.display());
        Ok(())
    }

    /// Validate and clamp configuration values to sensible ranges.
    pub fn validate(&mut self) {
        self.target_fps = self.target_fps.clamp(10, 240);
        self.walk_speed = self.walk_speed.clamp(0.0, 50.0);
        if self.world_name.trim().is_empty() {
            self.world_name = hexworld_world::catalog::DEFAULT_WORLD_NAME.to_string();
        }

        self.chunks.validate();
        self.physics.validate();
        self.terrain.validate();
    }

    /// Directory holding chunk records.
    #[must_use]
    pub fn chunk_dir(&self) -> PathBuf {
        self.data_dir.join("chunks")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = EngineConfig::default();
        assert_eq!(config.target_fps, 60);
        assert_eq!(config.world_name, "New World");
        assert!(config.world_seed.is_none());
        assert_eq!(config.chunks.render_distance, 8);
        assert_eq!(config.chunk_dir(), PathBuf::from("hexworld-data").join("chunks"));
    }

    #[test]
    fn test_config_validation() {
        let mut config = EngineConfig::default();
        config.target_fps = 1;
        config.walk_speed = -3.0;
        config.world_name = "  ".into();

        config.validate();

        assert_eq!(config.target_fps, 10);
        assert_eq!(config.walk_speed, 0.0);
        assert_eq!(config.world_name, "New World");
    }

    #[test]
    fn test_config_save_load() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let config_path = temp_dir.path().join("nested").join(CONFIG_FILE);

        let mut config = EngineConfig::default();
        config.frames = 42;
        config.world_seed = Some(12345);
        config.chunks.render_distance = 3;
        config.chunks.lod_distance = 2;
        config.terrain.trees = false;

        config.save_to(&config_path).expect("Failed to save config");

        let loaded = EngineConfig::load_from(&config_path);
        assert_eq!(loaded.frames, 42);
        assert_eq!(loaded.world_seed, Some(12345));
        assert_eq!(loaded.chunks.render_distance, 3);
        assert!(!loaded.terrain.trees);
    }

    #[test]
    fn test_config_load_missing_file() {
        let config = EngineConfig::load_from("/nonexistent/path/hexworld.toml");
        assert_eq!(config.frames, 600);
    }

    #[test]
    fn test_config_load_invalid_file() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let path = temp_dir.path().join(CONFIG_FILE);
        fs::write(&path, "frames = \"many\"").expect("write");

        let config = EngineConfig::load_from(&path);
        assert_eq!(config.frames, 600);
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let path = temp_dir.path().join(CONFIG_FILE);
        fs::write(&path, "world_name = \"Islands\"\n\n[chunks]\nrender_distance = 2\n")
            .expect("write");

        let config = EngineConfig::load_from(&path);
        assert_eq!(config.world_name, "Islands");
        assert_eq!(config.chunks.render_distance, 2);
        assert_eq!(config.chunks.lod_distance, 2);
        assert_eq!(config.target_fps, 60);
    }

    #[test]
    fn test_config_toml_serialization() {
        let config = EngineConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("Failed to serialize");

        assert!(toml_str.contains("data_dir"));
        assert!(toml_str.contains("[chunks]"));
        assert!(toml_str.contains("[physics]"));
    }
}
