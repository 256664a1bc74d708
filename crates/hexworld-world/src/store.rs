//! Persistence of compressed chunk records, scoped per world.
//!
//! [`ChunkStore`] compresses chunk arrays with the RLE codec and hands
//! [`ChunkRecord`]s to a [`RecordBackend`]. Backends do not retry; failures
//! propagate to the caller.

use ahash::{AHashMap, AHashSet};
use hexworld_common::{ChunkCoord, StoreError, StoreResult, WorldId, CHUNK_VOLUME};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::chunk::Chunk;
use crate::codec;

/// File extension of a chunk record.
const RECORD_EXT: &str = "chunk";

/// One persisted chunk. Overwritten on every save.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkRecord {
    /// Composite key `"{world}:{cq}:{cr}"`
    pub key: String,
    /// Owning world
    pub world_id: WorldId,
    /// Chunk q
    pub cq: i32,
    /// Chunk r
    pub cr: i32,
    /// RLE-encoded block array
    pub blocks_compressed: Vec<u8>,
    /// RLE-encoded light array; absent in records written without light
    pub light_compressed: Option<Vec<u8>>,
}

impl ChunkRecord {
    /// Composite key for a chunk of a world.
    #[must_use]
    pub fn key_for(world: &WorldId, coord: ChunkCoord) -> String {
        format!("{world}:{}:{}", coord.q, coord.r)
    }

    /// Compresses raw arrays into a record.
    #[must_use]
    pub fn encode(world: &WorldId, coord: ChunkCoord, blocks: &[u8], light: &[u8]) -> Self {
        Self {
            key: Self::key_for(world, coord),
            world_id: world.clone(),
            cq: coord.q,
            cr: coord.r,
            blocks_compressed: codec::encode(blocks),
            light_compressed: Some(codec::encode(light)),
        }
    }

    /// Chunk coordinate of this record.
    #[must_use]
    pub const fn coord(&self) -> ChunkCoord {
        ChunkCoord::new(self.cq, self.cr)
    }

    /// Serializes the record with bincode.
    pub fn to_bytes(&self) -> StoreResult<Vec<u8>> {
        bincode::serialize(self).map_err(|e| StoreError::Serialization(e.to_string()))
    }

    /// Deserializes a record written by [`ChunkRecord::to_bytes`].
    pub fn from_bytes(bytes: &[u8]) -> StoreResult<Self> {
        bincode::deserialize(bytes).map_err(|e| StoreError::Serialization(e.to_string()))
    }
}

/// Decompressed chunk arrays returned by [`ChunkStore::load`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadedChunk {
    /// Block ids, `CHUNK_VOLUME` long
    pub blocks: Vec<u8>,
    /// Light levels, `CHUNK_VOLUME` long
    pub light: Vec<u8>,
}

/// Key-value storage of chunk records with a per-world index.
pub trait RecordBackend: Send + Sync + fmt::Debug {
    /// Inserts or overwrites a record.
    fn put(&self, record: ChunkRecord) -> StoreResult<()>;

    /// Fetches a record, `None` when absent.
    fn get(&self, world: &WorldId, coord: ChunkCoord) -> StoreResult<Option<ChunkRecord>>;

    /// Removes every record of a world, returning how many were removed.
    fn delete_world(&self, world: &WorldId) -> StoreResult<usize>;

    /// Sum of compressed block payload sizes for a world.
    fn storage_size(&self, world: &WorldId) -> StoreResult<u64>;
}

/// Chunk persistence front end shared by the chunk manager and its save worker.
#[derive(Debug, Clone)]
pub struct ChunkStore {
    backend: Arc<dyn RecordBackend>,
}

impl ChunkStore {
    /// Wraps a backend.
    #[must_use]
    pub fn new(backend: Arc<dyn RecordBackend>) -> Self {
        Self { backend }
    }

    /// Store kept in memory only.
    #[must_use]
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryBackend::new()))
    }

    /// Store rooted at a directory.
    #[must_use]
    pub fn on_disk(root: impl Into<PathBuf>) -> Self {
        Self::new(Arc::new(FileBackend::new(root)))
    }

    /// Compresses and upserts both arrays of a chunk.
    pub fn save(&self, world: &WorldId, chunk: &Chunk) -> StoreResult<()> {
        self.save_arrays(world, chunk.coord(), chunk.blocks(), chunk.light())
    }

    /// Compresses and upserts raw arrays, e.g. a snapshot taken earlier.
    pub fn save_arrays(
        &self,
        world: &WorldId,
        coord: ChunkCoord,
        blocks: &[u8],
        light: &[u8],
    ) -> StoreResult<()> {
        self.backend
            .put(ChunkRecord::encode(world, coord, blocks, light))
    }

    /// Loads and decompresses a chunk.
    ///
    /// Absent records, records without a block payload and records the
    /// backend reports as corrupted all yield `None`.
    pub fn load(&self, world: &WorldId, coord: ChunkCoord) -> StoreResult<Option<LoadedChunk>> {
        let record = match self.backend.get(world, coord) {
            Ok(Some(record)) => record,
            Ok(None) => return Ok(None),
            Err(StoreError::Corrupted { key, reason }) => {
                warn!("Ignoring corrupted chunk record {key}: {reason}");
                return Ok(None);
            },
            Err(e) => return Err(e),
        };

        if record.blocks_compressed.is_empty() {
            warn!("Chunk record {} has no block payload", record.key);
            return Ok(None);
        }

        let blocks = codec::decode(&record.blocks_compressed, CHUNK_VOLUME);
        let light = match &record.light_compressed {
            Some(light) => codec::decode(light, CHUNK_VOLUME),
            None => vec![0; CHUNK_VOLUME],
        };
        Ok(Some(LoadedChunk { blocks, light }))
    }

    /// Removes every record of a world.
    pub fn delete_world(&self, world: &WorldId) -> StoreResult<usize> {
        let removed = self.backend.delete_world(world)?;
        info!("Deleted {removed} chunk records of world {world}");
        Ok(removed)
    }

    /// Approximate on-disk footprint of a world's blocks.
    pub fn storage_size(&self, world: &WorldId) -> StoreResult<u64> {
        self.backend.storage_size(world)
    }
}

#[derive(Debug, Default)]
struct MemoryState {
    records: AHashMap<String, ChunkRecord>,
    by_world: AHashMap<WorldId, AHashSet<String>>,
}

/// Backend holding records in a map, with a secondary index by world.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    state: RwLock<MemoryState>,
}

impl MemoryBackend {
    /// Creates an empty backend.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored records across all worlds.
    #[must_use]
    pub fn len(&self) -> usize {
        self.state.read().records.len()
    }

    /// Whether the backend holds no records.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl RecordBackend for MemoryBackend {
    fn put(&self, record: ChunkRecord) -> StoreResult<()> {
        let mut state = self.state.write();
        state
            .by_world
            .entry(record.world_id.clone())
            .or_default()
            .insert(record.key.clone());
        state.records.insert(record.key.clone(), record);
        Ok(())
    }

    fn get(&self, world: &WorldId, coord: ChunkCoord) -> StoreResult<Option<ChunkRecord>> {
        let key = ChunkRecord::key_for(world, coord);
        Ok(self.state.read().records.get(&key).cloned())
    }

    fn delete_world(&self, world: &WorldId) -> StoreResult<usize> {
        let mut state = self.state.write();
        let Some(keys) = state.by_world.remove(world) else {
            return Ok(0);
        };
        for key in &keys {
            state.records.remove(key);
        }
        Ok(keys.len())
    }

    fn storage_size(&self, world: &WorldId) -> StoreResult<u64> {
        let state = self.state.read();
        let size = state.by_world.get(world).map_or(0, |keys| {
            keys.iter()
                .filter_map(|k| state.records.get(k))
                .map(|r| r.blocks_compressed.len() as u64)
                .sum()
        });
        Ok(size)
    }
}

/// Backend writing one bincode file per chunk under `root/<world>/`.
///
/// The world directory doubles as the per-world index. Writes go to a
/// temporary file first and are renamed into place.
#[derive(Debug, Clone)]
pub struct FileBackend {
    root: PathBuf,
}

impl FileBackend {
    /// Creates a backend rooted at `root`. Directories are created lazily.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Root directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn world_dir(&self, world: &WorldId) -> StoreResult<PathBuf> {
        if !world.is_valid() {
            return Err(StoreError::InvalidWorldId(world.to_string()));
        }
        Ok(self.root.join(world.as_str()))
    }

    fn record_path(&self, world: &WorldId, coord: ChunkCoord) -> StoreResult<PathBuf> {
        Ok(self
            .world_dir(world)?
            .join(format!("{}_{}.{RECORD_EXT}", coord.q, coord.r)))
    }

    fn read_record(path: &Path, key: &str) -> StoreResult<ChunkRecord> {
        let bytes = fs::read(path)?;
        let record = ChunkRecord::from_bytes(&bytes).map_err(|e| StoreError::Corrupted {
            key: key.to_string(),
            reason: e.to_string(),
        })?;
        if record.key != key {
            return Err(StoreError::Corrupted {
                key: key.to_string(),
                reason: format!("file holds record {}", record.key),
            });
        }
        Ok(record)
    }
}

impl RecordBackend for FileBackend {
    fn put(&self, record: ChunkRecord) -> StoreResult<()> {
        let dir = self.world_dir(&record.world_id)?;
        fs::create_dir_all(&dir)?;

        let path = self.record_path(&record.world_id, record.coord())?;
        let temp_path = path.with_extension(format!("{RECORD_EXT}.tmp"));
        let bytes = record.to_bytes()?;

        let mut file = fs::File::create(&temp_path)?;
        file.write_all(&bytes)?;
        file.sync_all()?;
        drop(file);

        fs::rename(&temp_path, &path)?;
        debug!("Wrote chunk record {} ({} bytes)", record.key, bytes.len());
        Ok(())
    }

    fn get(&self, world: &WorldId, coord: ChunkCoord) -> StoreResult<Option<ChunkRecord>> {
        let path = self.record_path(world, coord)?;
        if !path.exists() {
            return Ok(None);
        }
        Self::read_record(&path, &ChunkRecord::key_for(world, coord)).map(Some)
    }

    fn delete_world(&self, world: &WorldId) -> StoreResult<usize> {
        let dir = self.world_dir(world)?;
        if !dir.exists() {
            return Ok(0);
        }
        let count = fs::read_dir(&dir)?
            .filter_map(Result::ok)
            .filter(|e| e.path().extension().is_some_and(|ext| ext == RECORD_EXT))
            .count();
        fs::remove_dir_all(&dir)?;
        Ok(count)
    }

    fn storage_size(&self, world: &WorldId) -> StoreResult<u64> {
        let dir = self.world_dir(world)?;
        if !dir.exists() {
            return Ok(0);
        }

        let mut total = 0u64;
        for entry in fs::read_dir(&dir)? {
            let path = entry?.path();
            if !path.extension().is_some_and(|ext| ext == RECORD_EXT) {
                continue;
            }
            match fs::read(&path)
                .map_err(StoreError::from)
                .and_then(|bytes| ChunkRecord::from_bytes(&bytes))
            {
                Ok(record) => total += record.blocks_compressed.len() as u64,
                Err(e) => warn!("Skipping unreadable record {}: {e}", path.display()),
            }
        }
        Ok(total)
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn sample_chunk(coord: ChunkCoord) -> Chunk {
        let mut chunk = Chunk::new(coord);
        for lq in 0..16 {
            chunk.set_block(lq, 3, 0, 6);
        }
        chunk.set_block(4, 4, 20, 3);
        chunk.set_light(4, 4, 21, 12);
        chunk
    }

    fn check_round_trip(store: &ChunkStore) {
        let world = WorldId::new("alpha");
        let coord = ChunkCoord::new(-2, 5);
        let chunk = sample_chunk(coord);

        store.save(&world, &chunk).expect("save");
        let loaded = store.load(&world, coord).expect("load").expect("present");
        assert_eq!(loaded.blocks, chunk.blocks());
        assert_eq!(loaded.light, chunk.light());

        assert!(store
            .load(&world, ChunkCoord::new(0, 0))
            .expect("load")
            .is_none());
        assert!(store
            .load(&WorldId::new("beta"), coord)
            .expect("load")
            .is_none());
    }

    fn check_world_scoping(store: &ChunkStore) {
        let alpha = WorldId::new("alpha");
        let beta = WorldId::new("beta");
        for q in 0..3 {
            store
                .save(&alpha, &sample_chunk(ChunkCoord::new(q, 0)))
                .expect("save");
        }
        store
            .save(&beta, &sample_chunk(ChunkCoord::new(0, 0)))
            .expect("save");

        let one = store.storage_size(&beta).expect("size");
        assert!(one > 0);
        assert_eq!(store.storage_size(&alpha).expect("size"), one * 3);

        assert_eq!(store.delete_world(&alpha).expect("delete"), 3);
        assert_eq!(store.storage_size(&alpha).expect("size"), 0);
        assert!(store
            .load(&alpha, ChunkCoord::new(1, 0))
            .expect("load")
            .is_none());
        assert!(store
            .load(&beta, ChunkCoord::new(0, 0))
            .expect("load")
            .is_some());
    }

    #[test]
    fn test_key_format() {
        let key = ChunkRecord::key_for(&WorldId::new("w1"), ChunkCoord::new(-3, 7));
        assert_eq!(key, "w1:-3:7");
    }

    #[test]
    fn test_memory_round_trip() {
        check_round_trip(&ChunkStore::in_memory());
    }

    #[test]
    fn test_memory_world_scoping() {
        check_world_scoping(&ChunkStore::in_memory());
    }

    #[test]
    fn test_file_round_trip() {
        let dir = TempDir::new().expect("temp dir");
        check_round_trip(&ChunkStore::on_disk(dir.path()));
    }

    #[test]
    fn test_file_world_scoping() {
        let dir = TempDir::new().expect("temp dir");
        check_world_scoping(&ChunkStore::on_disk(dir.path()));
    }

    #[test]
    fn test_overwrite_keeps_latest() {
        let store = ChunkStore::in_memory();
        let world = WorldId::new("alpha");
        let coord = ChunkCoord::new(0, 0);
        let mut chunk = Chunk::new(coord);
        store.save(&world, &chunk).expect("save");
        chunk.set_block(0, 0, 0, 9);
        store.save(&world, &chunk).expect("save");

        let loaded = store.load(&world, coord).expect("load").expect("present");
        assert_eq!(loaded.blocks[0], 9);
    }

    #[test]
    fn test_record_without_light_loads_dark() {
        let backend = Arc::new(MemoryBackend::new());
        let world = WorldId::new("legacy");
        let coord = ChunkCoord::new(1, 1);
        let mut record = ChunkRecord::encode(&world, coord, &[2; CHUNK_VOLUME], &[9; CHUNK_VOLUME]);
        record.light_compressed = None;
        backend.put(record).expect("put");

        let store = ChunkStore::new(backend);
        let loaded = store.load(&world, coord).expect("load").expect("present");
        assert!(loaded.blocks.iter().all(|&b| b == 2));
        assert!(loaded.light.iter().all(|&l| l == 0));
    }

    #[test]
    fn test_missing_block_payload_is_absent() {
        let backend = Arc::new(MemoryBackend::new());
        let world = WorldId::new("broken");
        let coord = ChunkCoord::new(0, 0);
        let mut record = ChunkRecord::encode(&world, coord, &[1; 8], &[0; 8]);
        record.blocks_compressed.clear();
        backend.put(record).expect("put");

        let store = ChunkStore::new(backend);
        assert!(store.load(&world, coord).expect("load").is_none());
    }

    #[test]
    fn test_corrupted_file_is_absent() {
        let dir = TempDir::new().expect("temp dir");
        let store = ChunkStore::on_disk(dir.path());
        let world = WorldId::new("alpha");
        let coord = ChunkCoord::new(0, 0);
        store.save(&world, &sample_chunk(coord)).expect("save");

        let path = dir.path().join("alpha").join("0_0.chunk");
        fs::write(&path, b"garbage").expect("overwrite");
        assert!(store.load(&world, coord).expect("load").is_none());
    }

    #[test]
    fn test_file_backend_rejects_unsafe_world_id() {
        let dir = TempDir::new().expect("temp dir");
        let store = ChunkStore::on_disk(dir.path());
        let world = WorldId::new("../escape");
        let result = store.save(&world, &Chunk::new(ChunkCoord::new(0, 0)));
        assert!(matches!(result, Err(StoreError::InvalidWorldId(_))));
    }

    #[test]
    fn test_io_failure_propagates() {
        let backend = Arc::new(testing::FlakyBackend::default());
        backend.set_fail_reads(true);
        let store = ChunkStore::new(backend);
        let result = store.load(&WorldId::new("w"), ChunkCoord::new(0, 0));
        assert!(matches!(result, Err(StoreError::Unavailable(_))));
    }
}
