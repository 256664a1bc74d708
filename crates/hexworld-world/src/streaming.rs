//! Chunk streaming around a moving observer.
//!
//! The [`ChunkManager`] owns every resident chunk. It decides which chunks
//! should be resident, drives at most one generation job and one mesh job
//! at a time within a per-tick budget, tracks dirty and modified state, and
//! debounces persistence through a background [`SaveWorker`].
//!
//! Invariants:
//! - A coordinate is never both resident and pending.
//! - Absent chunks read as air and darkness through every global accessor.
//! - A chunk is never dropped while a write of it is in flight.

use ahash::{AHashMap, AHashSet};
use hexworld_common::{
    Axial, ChunkCoord, JobError, RenderHandle, StoreError, StoreResult, VoxelPos, WorldId,
    CHUNK_HEIGHT,
};
use std::collections::VecDeque;
use std::mem;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::blocks::{BlockRegistry, BlockSource};
use crate::chunk::Chunk;
use crate::config::ChunkManagerConfig;
use crate::jobs::{ChunkMesher, FaceQuery, GenerationJob, MeshJob, WorldGenerator};
use crate::lighting::{LightEngine, LightField, LightUpdate};
use crate::persistence::{SaveOutcome, SaveRequest, SaveWorker};
use crate::store::ChunkStore;

/// A coordinate awaiting load or generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueuedChunk {
    /// Chunk coordinate
    pub coord: ChunkCoord,
    /// Hex distance to the observer chunk at the last wanted-set update
    pub distance: u32,
    /// Requested LOD state
    pub is_lod: bool,
}

/// Summary of one [`ChunkManager::update_wanted_set`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WantedSetReport {
    /// Observer chunk
    pub observer: ChunkCoord,
    /// Chunks inside the streaming radius
    pub wanted: usize,
    /// Newly queued coordinates
    pub enqueued: usize,
    /// Queued or in-flight coordinates dropped
    pub cancelled: usize,
    /// Resident chunks dropped
    pub evicted: usize,
    /// Evicted chunks kept aside because their flush failed
    pub parked: usize,
    /// Resident chunks whose LOD flag flipped
    pub lod_changed: usize,
    /// Wall time spent
    pub elapsed: Duration,
}

/// Summary of one [`ChunkManager::tick`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    /// Chunks installed from generation
    pub generated: usize,
    /// Chunks installed from the store
    pub loaded: usize,
    /// Parked chunks made resident again
    pub reinstated: usize,
    /// Mesh jobs completed
    pub meshed: usize,
    /// Generation or mesh jobs aborted
    pub failed_jobs: usize,
    /// Writes handed to the save worker
    pub saves_submitted: usize,
    /// Writes confirmed
    pub saves_completed: usize,
    /// Writes that failed and will be retried
    pub save_failures: usize,
}

/// Result of a synchronous flush.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SaveSummary {
    /// Chunks written
    pub saved: usize,
    /// Chunks whose write failed; they stay queued
    pub failed: usize,
}

/// The world being played and where its chunks are stored.
#[derive(Debug)]
struct Session {
    world: WorldId,
    store: ChunkStore,
    worker: SaveWorker,
}

/// Owner of resident chunks and the per-frame work scheduler.
pub struct ChunkManager {
    config: ChunkManagerConfig,
    blocks: Arc<BlockRegistry>,
    generator: Box<dyn WorldGenerator>,
    mesher: Box<dyn ChunkMesher>,

    chunks: AHashMap<ChunkCoord, Chunk>,
    /// Queued or generating, never resident
    pending: AHashSet<ChunkCoord>,
    /// Sorted by ascending distance
    queue: VecDeque<QueuedChunk>,
    generation: Option<Box<dyn GenerationJob>>,
    meshing: Option<Box<dyn MeshJob>>,
    light: LightEngine,
    observer: Option<ChunkCoord>,

    session: Option<Session>,
    /// Chunks awaiting a debounced save
    save_queue: AHashSet<ChunkCoord>,
    /// Chunks with a write at the worker
    in_flight: AHashSet<ChunkCoord>,
    /// Evicted chunks whose flush failed
    parked: AHashMap<ChunkCoord, Chunk>,
    save_timer: Duration,
}

impl ChunkManager {
    /// Creates a manager with no world attached. Without a store nothing is
    /// loaded or persisted; every chunk is generated.
    #[must_use]
    pub fn new(
        mut config: ChunkManagerConfig,
        blocks: Arc<BlockRegistry>,
        generator: Box<dyn WorldGenerator>,
        mesher: Box<dyn ChunkMesher>,
    ) -> Self {
        config.validate();
        Self {
            config,
            blocks,
            generator,
            mesher,
            chunks: AHashMap::new(),
            pending: AHashSet::new(),
            queue: VecDeque::new(),
            generation: None,
            meshing: None,
            light: LightEngine::new(),
            observer: None,
            session: None,
            save_queue: AHashSet::new(),
            in_flight: AHashSet::new(),
            parked: AHashMap::new(),
            save_timer: Duration::ZERO,
        }
    }

    /// Attaches a world's store and starts the save worker.
    pub fn attach_store(&mut self, world: WorldId, store: ChunkStore) -> StoreResult<()> {
        if !world.is_valid() {
            return Err(StoreError::InvalidWorldId(world.to_string()));
        }
        match self.session.as_ref().map(|current| current.world == world) {
            Some(true) => {
                self.save_all_modified();
            },
            Some(false) => self.detach_world(),
            None => {},
        }
        let worker = SaveWorker::spawn(store.clone())?;
        info!("Attached world {world} to chunk manager");
        self.session = Some(Session {
            world,
            store,
            worker,
        });
        Ok(())
    }

    /// Saves and drops everything belonging to the attached world.
    fn detach_world(&mut self) {
        let summary = self.save_all_modified();
        if summary.failed > 0 {
            warn!("Dropping {} unsaved chunks on world switch", summary.failed);
        }
        self.drop_resident();
        self.save_queue.clear();
        self.parked.clear();
        self.observer = None;
        if let Some(mut session) = self.session.take() {
            session.worker.shutdown();
            info!("Detached world {}", session.world);
        }
    }

    /// Discards jobs, queued work and resident chunks, releasing their meshes.
    fn drop_resident(&mut self) {
        self.generation = None;
        self.meshing = None;
        for (_, mut chunk) in self.chunks.drain() {
            if let Some(handle) = chunk.take_render_handle() {
                self.mesher.release(handle);
            }
        }
        self.pending.clear();
        self.queue.clear();
        self.in_flight.clear();
        self.save_timer = Duration::ZERO;
    }

    /// World currently attached.
    #[must_use]
    pub fn world(&self) -> Option<&WorldId> {
        self.session.as_ref().map(|s| &s.world)
    }

    // ---------------------------------------------------------------------
    // Wanted set
    // ---------------------------------------------------------------------

    /// Recomputes the resident set for an observer standing on global column
    /// `(observer_q, observer_r)`.
    ///
    /// Queues missing chunks nearest first, flips LOD flags on resident
    /// chunks, cancels work for chunks no longer wanted and evicts resident
    /// chunks outside the radius after flushing them.
    pub fn update_wanted_set(&mut self, observer_q: i32, observer_r: i32) -> WantedSetReport {
        let start = Instant::now();
        let center = Axial::new(observer_q, observer_r).to_chunk_coord();
        self.observer = Some(center);

        let wanted = wanted_chunks(center, self.config.render_distance);
        let lod = self.config.lod_distance;
        let mut report = WantedSetReport {
            observer: center,
            wanted: wanted.len(),
            ..WantedSetReport::default()
        };

        // Re-tag queued work; drop what left the radius.
        let before = self.queue.len();
        self.queue.retain_mut(|entry| match wanted.get(&entry.coord) {
            Some(&distance) => {
                entry.distance = distance;
                entry.is_lod = distance > lod;
                true
            },
            None => false,
        });
        report.cancelled = before - self.queue.len();
        self.pending.retain(|coord| wanted.contains_key(coord));

        if let Some(job) = &self.generation {
            if !wanted.contains_key(&job.coord()) {
                debug!("Discarding generation of chunk {}", job.coord());
                self.generation = None;
                report.cancelled += 1;
            }
        }
        if let Some(job) = &self.meshing {
            if !wanted.contains_key(&job.coord()) {
                self.meshing = None;
            }
        }

        let mut evict = Vec::new();
        for (coord, chunk) in &mut self.chunks {
            match wanted.get(coord) {
                Some(&distance) => {
                    if chunk.set_lod(distance > lod) {
                        chunk.mark_dirty();
                        report.lod_changed += 1;
                    }
                },
                None => evict.push(*coord),
            }
        }
        for coord in evict {
            if self.evict(coord) {
                report.evicted += 1;
            } else {
                report.parked += 1;
            }
        }

        for (&coord, &distance) in &wanted {
            if self.chunks.contains_key(&coord) || self.pending.contains(&coord) {
                continue;
            }
            self.pending.insert(coord);
            self.queue.push_back(QueuedChunk {
                coord,
                distance,
                is_lod: distance > lod,
            });
            report.enqueued += 1;
        }
        self.queue
            .make_contiguous()
            .sort_unstable_by_key(|entry| (entry.distance, entry.coord));

        report.elapsed = start.elapsed();
        if report.elapsed > self.config.wanted_set_budget() {
            warn!(
                "Wanted set update took {:.2}ms (budget {}ms, {} chunks)",
                report.elapsed.as_secs_f64() * 1000.0,
                self.config.wanted_set_budget_ms,
                report.wanted
            );
        }
        report
    }

    /// Drops a resident chunk, flushing it first. Returns false when the
    /// flush failed and the chunk was parked instead.
    fn evict(&mut self, coord: ChunkCoord) -> bool {
        if self.in_flight.contains(&coord) {
            self.wait_for_saves();
        }
        let Some(mut chunk) = self.chunks.remove(&coord) else {
            return true;
        };
        if let Some(handle) = chunk.take_render_handle() {
            self.mesher.release(handle);
        }

        if !chunk.is_modified() {
            self.save_queue.remove(&coord);
            return true;
        }
        match self.write_now(&chunk) {
            Ok(()) => {
                self.save_queue.remove(&coord);
                debug!("Evicted chunk {coord} after flush");
                true
            },
            Err(e) => {
                warn!("Failed to flush chunk {coord} on eviction, parking it: {e}");
                self.save_queue.insert(coord);
                self.parked.insert(coord, chunk);
                false
            },
        }
    }

    /// LOD state for a coordinate given the last observer.
    fn lod_for(&self, coord: ChunkCoord) -> bool {
        self.observer
            .is_some_and(|center| center.distance(coord) > self.config.lod_distance)
    }

    // ---------------------------------------------------------------------
    // Tick
    // ---------------------------------------------------------------------

    /// Runs budgeted work for one frame.
    ///
    /// Applies finished writes, advances the save debounce by `frame_time`,
    /// then spends the frame budget on generation first and meshing second.
    /// Each active job makes at least one step per tick. A new mesh job only
    /// starts once the load queue is empty and no generation is in flight.
    pub fn tick(&mut self, frame_time: Duration) -> TickReport {
        let deadline = Instant::now() + self.config.frame_budget();
        let mut report = TickReport::default();

        self.apply_save_outcomes(&mut report);
        self.save_timer += frame_time;
        if self.save_timer >= self.config.save_interval() {
            self.save_timer = Duration::ZERO;
            self.flush_save_queue(&mut report);
        }

        self.run_generation(deadline, &mut report);
        self.run_meshing(deadline, &mut report);
        report
    }

    fn run_generation(&mut self, deadline: Instant, report: &mut TickReport) {
        let mut first = true;
        while first || Instant::now() < deadline {
            first = false;

            if let Some(mut job) = self.generation.take() {
                let coord = job.coord();
                match job.resume() {
                    Ok(true) => self.generation = Some(job),
                    Ok(false) => match job.finish() {
                        Ok(chunk) => {
                            self.install(chunk);
                            report.generated += 1;
                        },
                        Err(e) => self.abort_generation(coord, &e, report),
                    },
                    Err(e) => self.abort_generation(coord, &e, report),
                }
                continue;
            }

            let Some(next) = self.queue.pop_front() else {
                break;
            };
            if let Some(chunk) = self.parked.remove(&next.coord) {
                debug!("Reinstating parked chunk {}", next.coord);
                self.install(chunk);
                report.reinstated += 1;
            } else if let Some(chunk) = self.load(next.coord) {
                self.install(chunk);
                report.loaded += 1;
            } else {
                self.generation = Some(self.generator.start(next.coord, next.is_lod));
            }
        }
    }

    fn abort_generation(&mut self, coord: ChunkCoord, error: &JobError, report: &mut TickReport) {
        warn!("Generation of chunk {coord} failed: {error}");
        self.pending.remove(&coord);
        report.failed_jobs += 1;
    }

    /// Reads a chunk from the attached store. Failures fall back to
    /// generation.
    fn load(&self, coord: ChunkCoord) -> Option<Chunk> {
        let session = self.session.as_ref()?;
        let loaded = match session.store.load(&session.world, coord) {
            Ok(loaded) => loaded?,
            Err(e) => {
                warn!("Failed to load chunk {coord}, regenerating: {e}");
                return None;
            },
        };
        match Chunk::from_arrays(coord, loaded.blocks, loaded.light) {
            Ok(chunk) => Some(chunk),
            Err(e) => {
                warn!("Discarding stored chunk {coord}: {e}");
                None
            },
        }
    }

    /// Makes a chunk resident and marks it and its neighbors for remeshing.
    fn install(&mut self, mut chunk: Chunk) {
        let coord = chunk.coord();
        self.pending.remove(&coord);
        chunk.set_lod(self.lod_for(coord));
        chunk.mark_dirty();
        if chunk.is_modified() {
            self.save_queue.insert(coord);
        }
        self.chunks.insert(coord, chunk);
        for neighbor in coord.neighbors() {
            if let Some(chunk) = self.chunks.get_mut(&neighbor) {
                chunk.mark_dirty();
            }
        }
    }

    fn run_meshing(&mut self, deadline: Instant, report: &mut TickReport) {
        let mut started = false;
        let mut first = true;
        while first || Instant::now() < deadline {
            first = false;

            if let Some(mut job) = self.meshing.take() {
                let coord = job.coord();
                match job.resume(&*self) {
                    Ok(true) => self.meshing = Some(job),
                    Ok(false) => match job.finish() {
                        Ok(handle) => {
                            self.attach_mesh(coord, handle);
                            report.meshed += 1;
                        },
                        Err(e) => {
                            warn!("Meshing of chunk {coord} failed: {e}");
                            report.failed_jobs += 1;
                        },
                    },
                    Err(e) => {
                        warn!("Meshing of chunk {coord} failed: {e}");
                        report.failed_jobs += 1;
                    },
                }
                continue;
            }

            // New meshes wait until no load or generation work remains
            if started || self.generation.is_some() || !self.queue.is_empty() {
                break;
            }
            let Some(coord) = self.nearest_dirty() else {
                break;
            };
            let Some(chunk) = self.chunks.get_mut(&coord) else {
                break;
            };
            chunk.clear_dirty();
            let blocks = chunk.blocks().to_vec();
            let is_lod = chunk.is_lod();
            self.meshing = Some(self.mesher.start(coord, blocks, is_lod));
            started = true;
        }
    }

    fn nearest_dirty(&self) -> Option<ChunkCoord> {
        let center = self.observer.unwrap_or_default();
        self.chunks
            .values()
            .filter(|chunk| chunk.is_dirty())
            .map(Chunk::coord)
            .min_by_key(|coord| (center.distance(*coord), *coord))
    }

    fn attach_mesh(&mut self, coord: ChunkCoord, handle: RenderHandle) {
        match self.chunks.get_mut(&coord) {
            Some(chunk) => {
                if let Some(old) = chunk.set_render_handle(handle) {
                    self.mesher.release(old);
                }
            },
            None => self.mesher.release(handle),
        }
    }

    // ---------------------------------------------------------------------
    // Persistence
    // ---------------------------------------------------------------------

    fn write_now(&self, chunk: &Chunk) -> StoreResult<()> {
        match &self.session {
            Some(session) => session.store.save(&session.world, chunk),
            None => Ok(()),
        }
    }

    fn apply_save_outcomes(&mut self, report: &mut TickReport) {
        let outcomes = match &mut self.session {
            Some(session) => session.worker.poll(),
            None => return,
        };
        for outcome in outcomes {
            self.apply_outcome(outcome, report);
        }
    }

    fn apply_outcome(&mut self, outcome: SaveOutcome, report: &mut TickReport) {
        let coord = outcome.coord;
        self.in_flight.remove(&coord);
        match outcome.result {
            Ok(()) => {
                report.saves_completed += 1;
                if self.parked.remove(&coord).is_some() {
                    self.save_queue.remove(&coord);
                    return;
                }
                let still_modified = self.chunks.get(&coord).is_some_and(Chunk::is_modified);
                if !still_modified {
                    self.save_queue.remove(&coord);
                }
            },
            Err(e) => {
                warn!("Failed to save chunk {coord}, will retry: {e}");
                report.save_failures += 1;
                if let Some(chunk) = self.chunks.get_mut(&coord) {
                    chunk.mark_modified();
                }
                self.save_queue.insert(coord);
            },
        }
    }

    /// Hands every queued chunk without a write in flight to the worker.
    fn flush_save_queue(&mut self, report: &mut TickReport) {
        let Some(session) = &mut self.session else {
            return;
        };
        let keys: Vec<ChunkCoord> = self
            .save_queue
            .iter()
            .copied()
            .filter(|coord| !self.in_flight.contains(coord))
            .collect();

        let mut submitted = 0;
        for coord in keys {
            let (blocks, light) = if let Some(chunk) = self.chunks.get_mut(&coord) {
                if !chunk.is_modified() {
                    self.save_queue.remove(&coord);
                    continue;
                }
                chunk.clear_modified();
                chunk.snapshot()
            } else if let Some(chunk) = self.parked.get(&coord) {
                chunk.snapshot()
            } else {
                self.save_queue.remove(&coord);
                continue;
            };

            let request = SaveRequest {
                world: session.world.clone(),
                coord,
                blocks,
                light,
            };
            if let Err(e) = session.worker.submit(request) {
                warn!("Save worker rejected chunk {coord}: {e}");
                if let Some(chunk) = self.chunks.get_mut(&coord) {
                    chunk.mark_modified();
                }
                break;
            }
            self.in_flight.insert(coord);
            submitted += 1;
        }

        report.saves_submitted += submitted;
        if submitted > 0 {
            debug!("Debounced flush submitted {submitted} chunks");
        }
    }

    /// Blocks until the save worker has reported every write.
    pub fn wait_for_saves(&mut self) -> TickReport {
        let mut report = TickReport::default();
        let outcomes = match &mut self.session {
            Some(session) => session.worker.wait_idle(),
            None => return report,
        };
        for outcome in outcomes {
            self.apply_outcome(outcome, &mut report);
        }
        report
    }

    /// Synchronously writes every modified resident chunk and every parked
    /// chunk. Failed writes stay queued.
    pub fn save_all_modified(&mut self) -> SaveSummary {
        self.wait_for_saves();
        let mut summary = SaveSummary::default();
        if self.session.is_none() {
            return summary;
        }

        let modified: Vec<ChunkCoord> = self
            .chunks
            .values()
            .filter(|chunk| chunk.is_modified())
            .map(Chunk::coord)
            .collect();
        for coord in modified {
            let Some(chunk) = self.chunks.get(&coord) else {
                continue;
            };
            match self.write_now(chunk) {
                Ok(()) => {
                    if let Some(chunk) = self.chunks.get_mut(&coord) {
                        chunk.clear_modified();
                    }
                    self.save_queue.remove(&coord);
                    summary.saved += 1;
                },
                Err(e) => {
                    warn!("Failed to save chunk {coord}: {e}");
                    self.save_queue.insert(coord);
                    summary.failed += 1;
                },
            }
        }

        let parked: Vec<ChunkCoord> = self.parked.keys().copied().collect();
        for coord in parked {
            let Some(chunk) = self.parked.get(&coord) else {
                continue;
            };
            match self.write_now(chunk) {
                Ok(()) => {
                    self.parked.remove(&coord);
                    self.save_queue.remove(&coord);
                    summary.saved += 1;
                },
                Err(e) => {
                    warn!("Failed to save parked chunk {coord}: {e}");
                    summary.failed += 1;
                },
            }
        }

        debug!(
            "Saved {} chunks ({} failed)",
            summary.saved, summary.failed
        );
        summary
    }

    /// Saves everything, stops the worker and drops all chunks and jobs.
    pub fn dispose(&mut self) -> SaveSummary {
        let summary = self.save_all_modified();
        self.drop_resident();
        if summary.failed == 0 {
            self.save_queue.clear();
            self.parked.clear();
        }
        if let Some(mut session) = self.session.take() {
            session.worker.shutdown();
            info!("Closed world {}", session.world);
        }
        summary
    }

    // ---------------------------------------------------------------------
    // Block and light access
    // ---------------------------------------------------------------------

    /// Block id at a global cell, 0 when out of range or not resident.
    #[must_use]
    pub fn get_block(&self, q: i32, r: i32, y: i32) -> u8 {
        let pos = VoxelPos::new(q, r, y);
        if !pos.in_height_range() {
            return 0;
        }
        let (lq, lr) = pos.column().to_local();
        self.chunks
            .get(&pos.chunk())
            .map_or(0, |chunk| chunk.get_block(lq, lr, y))
    }

    /// Light level at a global cell, 0 when out of range or not resident.
    #[must_use]
    pub fn get_light(&self, q: i32, r: i32, y: i32) -> u8 {
        let pos = VoxelPos::new(q, r, y);
        if !pos.in_height_range() {
            return 0;
        }
        let (lq, lr) = pos.column().to_local();
        self.chunks
            .get(&pos.chunk())
            .map_or(0, |chunk| chunk.get_light(lq, lr, y))
    }

    /// Writes a block id. Returns false when the owning chunk is not resident
    /// or `y` is out of range.
    ///
    /// Light is not updated; see [`ChunkManager::place_block`].
    pub fn edit_block(&mut self, q: i32, r: i32, y: i32, id: u8) -> bool {
        let pos = VoxelPos::new(q, r, y);
        if !pos.in_height_range() {
            return false;
        }
        let coord = pos.chunk();
        let (lq, lr) = pos.column().to_local();
        let Some(chunk) = self.chunks.get_mut(&coord) else {
            return false;
        };
        chunk.set_block(lq, lr, y, id);
        chunk.mark_dirty();
        chunk.mark_modified();

        for neighbor in pos.column().neighbors() {
            let other = neighbor.to_chunk_coord();
            if other != coord {
                if let Some(chunk) = self.chunks.get_mut(&other) {
                    chunk.mark_dirty();
                }
            }
        }
        self.save_queue.insert(coord);
        true
    }

    /// Edits a block and updates the light field in one step.
    pub fn place_block(&mut self, q: i32, r: i32, y: i32, id: u8) -> Option<LightUpdate> {
        let old = self.get_block(q, r, y);
        if !self.edit_block(q, r, y, id) {
            return None;
        }
        let blocks = Arc::clone(&self.blocks);
        let mut light = mem::take(&mut self.light);
        let update = light.on_block_changed(self, &blocks, VoxelPos::new(q, r, y), old, id);
        self.light = light;
        Some(update)
    }

    /// Seeds light from every source block in resident chunks.
    ///
    /// Chunks arrive from generation dark; call after the initial load.
    pub fn relight_sources(&mut self) -> LightUpdate {
        let blocks = Arc::clone(&self.blocks);
        let mut light = mem::take(&mut self.light);
        let sources: Vec<(VoxelPos, u8)> = self
            .chunks
            .values()
            .flat_map(Chunk::iter_blocks)
            .filter_map(|(pos, id)| {
                let level = blocks.light_level(id);
                (level > 0).then_some((pos, level))
            })
            .collect();
        for (pos, level) in sources {
            if self.light_at(pos) < level {
                self.set_light_at(pos, level);
            }
            light.queue_add(pos, level);
        }
        let update = light.update(self, &blocks);
        self.light = light;
        update
    }

    /// Forces every resident chunk to be remeshed.
    pub fn mark_all_dirty(&mut self) {
        for chunk in self.chunks.values_mut() {
            chunk.mark_dirty();
        }
    }

    // ---------------------------------------------------------------------
    // Introspection
    // ---------------------------------------------------------------------

    /// Configuration in effect.
    #[must_use]
    pub const fn config(&self) -> &ChunkManagerConfig {
        &self.config
    }

    /// Block registry.
    #[must_use]
    pub fn blocks(&self) -> &BlockRegistry {
        &self.blocks
    }

    /// Resident chunk.
    #[must_use]
    pub fn chunk(&self, coord: ChunkCoord) -> Option<&Chunk> {
        self.chunks.get(&coord)
    }

    /// Resident chunks in no particular order.
    pub fn chunks(&self) -> impl Iterator<Item = &Chunk> {
        self.chunks.values()
    }

    /// Number of resident chunks.
    #[must_use]
    pub fn resident_count(&self) -> usize {
        self.chunks.len()
    }

    /// Number of queued or generating chunks.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Whether a chunk is resident.
    #[must_use]
    pub fn is_resident(&self, coord: ChunkCoord) -> bool {
        self.chunks.contains_key(&coord)
    }

    /// Whether a chunk is queued or generating.
    #[must_use]
    pub fn is_pending(&self, coord: ChunkCoord) -> bool {
        self.pending.contains(&coord)
    }

    /// Whether a chunk was evicted with a failed flush.
    #[must_use]
    pub fn is_parked(&self, coord: ChunkCoord) -> bool {
        self.parked.contains_key(&coord)
    }

    /// Queue of coordinates awaiting load, nearest first.
    pub fn queued(&self) -> impl Iterator<Item = &QueuedChunk> {
        self.queue.iter()
    }

    /// Chunks awaiting a save.
    #[must_use]
    pub fn save_queue_len(&self) -> usize {
        self.save_queue.len()
    }

    /// Observer chunk from the last wanted-set update.
    #[must_use]
    pub const fn observer(&self) -> Option<ChunkCoord> {
        self.observer
    }

    /// Whether no load, generation or mesh work remains.
    #[must_use]
    pub fn is_idle(&self) -> bool {
        self.queue.is_empty()
            && self.generation.is_none()
            && self.meshing.is_none()
            && !self.chunks.values().any(Chunk::is_dirty)
    }
}

impl std::fmt::Debug for ChunkManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChunkManager")
            .field("resident", &self.chunks.len())
            .field("pending", &self.pending.len())
            .field("parked", &self.parked.len())
            .field("observer", &self.observer)
            .finish_non_exhaustive()
    }
}

/// Chunks within `render_distance` hex steps of `center`, with their distance.
#[must_use]
pub fn wanted_chunks(center: ChunkCoord, render_distance: u32) -> AHashMap<ChunkCoord, u32> {
    let radius = render_distance as i32;
    let mut wanted = AHashMap::new();
    for dr in -radius..=radius {
        for dq in -radius..=radius {
            let coord = ChunkCoord::new(center.q + dq, center.r + dr);
            let distance = center.distance(coord);
            if distance <= render_distance {
                wanted.insert(coord, distance);
            }
        }
    }
    wanted
}

impl BlockSource for ChunkManager {
    fn block_at(&self, pos: VoxelPos) -> u8 {
        self.get_block(pos.q, pos.r, pos.y)
    }
}

impl LightField for ChunkManager {
    fn light_at(&self, pos: VoxelPos) -> u8 {
        self.get_light(pos.q, pos.r, pos.y)
    }

    fn set_light_at(&mut self, pos: VoxelPos, level: u8) {
        if !pos.in_height_range() {
            return;
        }
        let coord = pos.chunk();
        let (lq, lr) = pos.column().to_local();
        if let Some(chunk) = self.chunks.get_mut(&coord) {
            if chunk.set_light(lq, lr, pos.y, level) {
                chunk.mark_dirty();
                chunk.mark_modified();
                self.save_queue.insert(coord);
            }
        }
    }

    fn is_loaded(&self, pos: VoxelPos) -> bool {
        pos.in_height_range() && self.chunks.contains_key(&pos.chunk())
    }
}

impl FaceQuery for ChunkManager {
    fn is_face_visible(&self, q: i32, r: i32, y: i32) -> bool {
        if y < 0 {
            return false;
        }
        if y >= CHUNK_HEIGHT {
            return true;
        }
        let pos = VoxelPos::new(q, r, y);
        if !self.chunks.contains_key(&pos.chunk()) {
            return true;
        }
        self.blocks.is_see_through(self.get_block(q, r, y))
    }
}
