//! World catalog: world metadata and per-world player state.
//!
//! Layout under the catalog root:
//! - `worlds/<id>.json` world metadata
//! - `players/<id>.json` last player state
//!
//! Chunk records live in the [`ChunkStore`] and are removed with the world.

use glam::Vec3;
use hexworld_common::{StoreError, WorldId};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;
use tracing::{info, warn};

use crate::store::ChunkStore;

const WORLDS_DIR: &str = "worlds";
const PLAYERS_DIR: &str = "players";

/// Name given to worlds created without one.
pub const DEFAULT_WORLD_NAME: &str = "New World";

/// Catalog errors.
#[derive(Debug, Error)]
pub enum CatalogError {
    /// Filesystem failure
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Metadata could not be encoded or decoded
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// No world with this id
    #[error("Unknown world: {0}")]
    UnknownWorld(WorldId),

    /// Id unusable as a file name
    #[error("Invalid world id: {0}")]
    InvalidWorldId(WorldId),

    /// Chunk store failure while deleting a world
    #[error("Chunk store error: {0}")]
    Store(#[from] StoreError),
}

/// Result type for catalog operations.
pub type CatalogResult<T> = Result<T, CatalogError>;

/// Persisted description of one world.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorldMeta {
    /// Unique id
    pub id: WorldId,
    /// Display name
    pub name: String,
    /// Terrain seed
    pub seed: u64,
    /// Creation time, ms since the Unix epoch
    pub created_at: u64,
    /// Last open time, ms since the Unix epoch
    pub last_played: u64,
}

/// Where the player was when the world was last saved.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PlayerState {
    /// Feet position
    pub position: Vec3,
    /// Horizontal look angle in radians
    pub yaw: f32,
    /// Vertical look angle in radians
    pub pitch: f32,
}

/// World metadata store rooted at a directory.
#[derive(Debug, Clone)]
pub struct WorldCatalog {
    root: PathBuf,
    store: ChunkStore,
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_millis() as u64)
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> CatalogResult<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_vec_pretty(value)?;
    let temp = path.with_extension("json.tmp");
    {
        let mut file = fs::File::create(&temp)?;
        file.write_all(&json)?;
        file.sync_all()?;
    }
    fs::rename(&temp, path)?;
    Ok(())
}

fn read_json<T: DeserializeOwned>(path: &Path) -> CatalogResult<Option<T>> {
    match fs::read(path) {
        Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

impl WorldCatalog {
    /// Opens a catalog. Directories are created on first write.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>, store: ChunkStore) -> Self {
        Self {
            root: root.into(),
            store,
        }
    }

    /// Catalog directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Chunk store the catalog's worlds use.
    #[must_use]
    pub fn store(&self) -> &ChunkStore {
        &self.store
    }

    fn meta_path(&self, id: &WorldId) -> CatalogResult<PathBuf> {
        if !id.is_valid() {
            return Err(CatalogError::InvalidWorldId(id.clone()));
        }
        Ok(self.root.join(WORLDS_DIR).join(format!("{id}.json")))
    }

    fn player_path(&self, id: &WorldId) -> CatalogResult<PathBuf> {
        if !id.is_valid() {
            return Err(CatalogError::InvalidWorldId(id.clone()));
        }
        Ok(self.root.join(PLAYERS_DIR).join(format!("{id}.json")))
    }

    /// Creates a world. A blank name becomes [`DEFAULT_WORLD_NAME`]; a
    /// missing seed is drawn at random.
    pub fn create(&self, name: &str, seed: Option<u64>) -> CatalogResult<WorldMeta> {
        let name = name.trim();
        let now = now_ms();
        let meta = WorldMeta {
            id: WorldId::generate(),
            name: if name.is_empty() {
                DEFAULT_WORLD_NAME.to_string()
            } else {
                name.to_string()
            },
            seed: seed.unwrap_or_else(|| fastrand::u64(0..i32::MAX as u64)),
            created_at: now,
            last_played: now,
        };
        write_json(&self.meta_path(&meta.id)?, &meta)?;
        info!("Created world {:?} ({})", meta.name, meta.id);
        Ok(meta)
    }

    /// Every readable world, most recently played first.
    pub fn list(&self) -> CatalogResult<Vec<WorldMeta>> {
        let dir = self.root.join(WORLDS_DIR);
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut worlds = Vec::new();
        for entry in entries {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            match read_json::<WorldMeta>(&path) {
                Ok(Some(meta)) => worlds.push(meta),
                Ok(None) => {},
                Err(e) => warn!("Skipping unreadable world file {}: {e}", path.display()),
            }
        }
        worlds.sort_by(|a, b| {
            b.last_played
                .cmp(&a.last_played)
                .then_with(|| a.name.cmp(&b.name))
        });
        Ok(worlds)
    }

    /// Metadata of a world, `None` when unknown.
    pub fn get(&self, id: &WorldId) -> CatalogResult<Option<WorldMeta>> {
        read_json(&self.meta_path(id)?)
    }

    /// Loads a world's metadata and stamps it as just played.
    pub fn open(&self, id: &WorldId) -> CatalogResult<WorldMeta> {
        let mut meta = self
            .get(id)?
            .ok_or_else(|| CatalogError::UnknownWorld(id.clone()))?;
        meta.last_played = now_ms().max(meta.last_played);
        write_json(&self.meta_path(id)?, &meta)?;
        info!("Opened world {:?}", meta.name);
        Ok(meta)
    }

    /// Renames a world. A blank name keeps the current one.
    pub fn rename(&self, id: &WorldId, name: &str) -> CatalogResult<WorldMeta> {
        let mut meta = self
            .get(id)?
            .ok_or_else(|| CatalogError::UnknownWorld(id.clone()))?;
        let name = name.trim();
        if !name.is_empty() {
            meta.name = name.to_string();
        }
        write_json(&self.meta_path(id)?, &meta)?;
        info!("Renamed world {id} to {:?}", meta.name);
        Ok(meta)
    }

    /// Deletes a world, its player state and all its chunk records.
    /// Returns the number of chunk records removed.
    pub fn delete(&self, id: &WorldId) -> CatalogResult<usize> {
        let meta_path = self.meta_path(id)?;
        if !meta_path.exists() {
            return Err(CatalogError::UnknownWorld(id.clone()));
        }
        fs::remove_file(&meta_path)?;
        match fs::remove_file(self.player_path(id)?) {
            Ok(()) => {},
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {},
            Err(e) => return Err(e.into()),
        }
        let removed = self.store.delete_world(id)?;
        info!("Deleted world {id}");
        Ok(removed)
    }

    /// Stores the player state of a world.
    pub fn save_player(&self, id: &WorldId, state: &PlayerState) -> CatalogResult<()> {
        write_json(&self.player_path(id)?, state)
    }

    /// Last stored player state, `None` for a fresh world.
    pub fn load_player(&self, id: &WorldId) -> CatalogResult<Option<PlayerState>> {
        read_json(&self.player_path(id)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::Chunk;
    use hexworld_common::ChunkCoord;
    use tempfile::TempDir;

    fn catalog() -> (TempDir, WorldCatalog) {
        let dir = TempDir::new().expect("temp dir");
        let catalog = WorldCatalog::new(dir.path(), ChunkStore::in_memory());
        (dir, catalog)
    }

    #[test]
    fn test_create_and_get() {
        let (_dir, catalog) = catalog();
        let meta = catalog.create("  Island  ", Some(42)).expect("create");
        assert_eq!(meta.name, "Island");
        assert_eq!(meta.seed, 42);
        assert_eq!(catalog.get(&meta.id).expect("read"), Some(meta.clone()));

        let unnamed = catalog.create("", None).expect("create");
        assert_eq!(unnamed.name, DEFAULT_WORLD_NAME);
        assert!(unnamed.seed < i32::MAX as u64);
    }

    #[test]
    fn test_list_most_recent_first() {
        let (_dir, catalog) = catalog();
        let a = catalog.create("a", Some(1)).expect("create");
        let b = catalog.create("b", Some(2)).expect("create");
        assert_eq!(catalog.list().expect("list").len(), 2);

        std::thread::sleep(std::time::Duration::from_millis(5));
        catalog.open(&a.id).expect("open");
        let names: Vec<String> = catalog
            .list()
            .expect("list")
            .into_iter()
            .map(|m| m.name)
            .collect();
        assert_eq!(names, ["a", "b"]);
        assert!(catalog.get(&b.id).expect("read").is_some());
    }

    #[test]
    fn test_rename() {
        let (_dir, catalog) = catalog();
        let meta = catalog.create("old", Some(1)).expect("create");
        assert_eq!(catalog.rename(&meta.id, "new").expect("rename").name, "new");
        assert_eq!(catalog.rename(&meta.id, "   ").expect("rename").name, "new");
        assert!(matches!(
            catalog.rename(&WorldId::new("nope"), "x"),
            Err(CatalogError::UnknownWorld(_))
        ));
    }

    #[test]
    fn test_delete_removes_chunks_and_player() {
        let (_dir, catalog) = catalog();
        let meta = catalog.create("doomed", Some(1)).expect("create");
        let other = catalog.create("kept", Some(2)).expect("create");
        let chunk = Chunk::new(ChunkCoord::new(0, 0));
        catalog.store().save(&meta.id, &chunk).expect("save");
        catalog.store().save(&other.id, &chunk).expect("save");
        catalog
            .save_player(
                &meta.id,
                &PlayerState {
                    position: Vec3::new(1.0, 30.0, 2.0),
                    yaw: 0.5,
                    pitch: -0.2,
                },
            )
            .expect("save player");

        assert_eq!(catalog.delete(&meta.id).expect("delete"), 1);
        assert!(catalog.get(&meta.id).expect("read").is_none());
        assert!(catalog.load_player(&meta.id).expect("read").is_none());
        assert!(catalog
            .store()
            .load(&other.id, ChunkCoord::new(0, 0))
            .expect("load")
            .is_some());
        assert!(matches!(
            catalog.delete(&meta.id),
            Err(CatalogError::UnknownWorld(_))
        ));
    }

    #[test]
    fn test_player_round_trip() {
        let (_dir, catalog) = catalog();
        let meta = catalog.create("p", Some(1)).expect("create");
        assert!(catalog.load_player(&meta.id).expect("read").is_none());
        let state = PlayerState {
            position: Vec3::new(-4.0, 20.5, 9.0),
            yaw: 1.0,
            pitch: 0.0,
        };
        catalog.save_player(&meta.id, &state).expect("save");
        assert_eq!(catalog.load_player(&meta.id).expect("read"), Some(state));
    }

    #[test]
    fn test_rejects_unsafe_ids() {
        let (_dir, catalog) = catalog();
        assert!(matches!(
            catalog.get(&WorldId::new("../x")),
            Err(CatalogError::InvalidWorldId(_))
        ));
    }

    #[test]
    fn test_skips_corrupt_metadata() {
        let (dir, catalog) = catalog();
        catalog.create("good", Some(1)).expect("create");
        fs::write(dir.path().join(WORLDS_DIR).join("bad.json"), b"{not json").expect("write");
        assert_eq!(catalog.list().expect("list").len(), 1);
    }
}
