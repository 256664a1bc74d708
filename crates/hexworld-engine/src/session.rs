//! Headless play session.
//!
//! Opens (or creates) a world from the catalog, streams chunks around a
//! walking observer, runs collision against the resident terrain, drops
//! torches along the way and persists everything on close.

use anyhow::{Context, Result};
use glam::Vec3;
use hexworld_common::{world_to_axial, Axial, ChunkCoord};
use hexworld_world::blocks::BlockRegistry;
use hexworld_world::catalog::{PlayerState, WorldCatalog, WorldMeta};
use hexworld_world::config::GeneratorConfig;
use hexworld_world::generation::TerrainGenerator;
use hexworld_world::meshing::{MeshObserver, SurfaceMesher};
use hexworld_world::physics::{Actor, PhysicsEngine, StepOutcome, WorldCollision};
use hexworld_world::store::ChunkStore;
use hexworld_world::streaming::{ChunkManager, TickReport};
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::EngineConfig;
use crate::timing::FrameClock;

/// Upward speed of a jump in units/s.
const JUMP_SPEED: f32 = 8.0;

/// Upward speed while paddling in water.
const SWIM_SPEED: f32 = 2.5;

/// Radians per second the walking heading drifts.
const TURN_RATE: f32 = 0.15;

/// Frames between progress lines.
const LOG_INTERVAL: u64 = 120;

/// What happened during a session.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SessionReport {
    /// Frames simulated
    pub frames: u64,
    /// Chunks produced by the terrain generator
    pub chunks_generated: usize,
    /// Chunks read back from the store
    pub chunks_loaded: usize,
    /// Mesh jobs completed
    pub meshes_built: usize,
    /// Generation or mesh jobs aborted
    pub failed_jobs: usize,
    /// Torches placed by the observer
    pub torches_placed: usize,
    /// Cells raised by light propagation
    pub cells_lit: usize,
    /// Chunk writes confirmed
    pub chunks_saved: usize,
    /// Chunk writes that failed
    pub save_failures: usize,
    /// Horizontal distance walked
    pub distance_walked: f32,
}

impl SessionReport {
    fn absorb(&mut self, tick: &TickReport) {
        self.chunks_generated += tick.generated;
        self.chunks_loaded += tick.loaded;
        self.meshes_built += tick.meshed;
        self.failed_jobs += tick.failed_jobs;
        self.chunks_saved += tick.saves_completed;
        self.save_failures += tick.save_failures;
    }
}

/// A world open for play.
#[derive(Debug)]
pub struct Session {
    config: EngineConfig,
    catalog: WorldCatalog,
    world: WorldMeta,
    manager: ChunkManager,
    meshes: MeshObserver,
    physics: PhysicsEngine,
    actor: Actor,
    yaw: f32,
    clock: FrameClock,
    observer_chunk: Option<ChunkCoord>,
    torch: u8,
    report: SessionReport,
}

impl Session {
    /// Opens the configured world, creating it when no world has that name.
    pub fn open(config: EngineConfig) -> Result<Self> {
        fs::create_dir_all(&config.data_dir).with_context(|| {
            format!("Failed to create data directory {}", config.data_dir.display())
        })?;

        let blocks = Arc::new(load_blocks(config.block_definitions.as_deref())?);
        let store = ChunkStore::on_disk(config.chunk_dir());
        let catalog = WorldCatalog::new(&config.data_dir, store.clone());

        let existing = catalog
            .list()?
            .into_iter()
            .find(|meta| meta.name == config.world_name);
        let id = match existing {
            Some(meta) => meta.id,
            None => catalog.create(&config.world_name, config.world_seed)?.id,
        };
        let world = catalog.open(&id)?;
        info!("Opened world '{}' ({}) seed {}", world.name, world.id, world.seed);

        let generator = TerrainGenerator::new(
            GeneratorConfig {
                seed: world.seed,
                ..config.terrain.clone()
            },
            &blocks,
        );

        let player = match catalog.load_player(&world.id)? {
            Some(player) => player,
            None => PlayerState {
                position: spawn_point(&generator),
                yaw: 0.0,
                pitch: 0.0,
            },
        };
        debug!("Player at {:?}", player.position);

        let mesher = SurfaceMesher::new();
        let meshes = mesher.observer();
        let torch = blocks.id_of("torch");
        let mut manager = ChunkManager::new(
            config.chunks.clone(),
            blocks,
            Box::new(generator),
            Box::new(mesher),
        );
        manager
            .attach_store(world.id.clone(), store)
            .context("Failed to attach chunk store")?;

        Ok(Self {
            clock: FrameClock::new(config.target_fps, config.realtime),
            physics: PhysicsEngine::new(config.physics.clone()),
            actor: Actor::new(player.position),
            yaw: player.yaw,
            config,
            catalog,
            world,
            manager,
            meshes,
            observer_chunk: None,
            torch,
            report: SessionReport::default(),
        })
    }

    /// Simulates the configured number of frames, then closes the world.
    pub fn run(mut self) -> Result<SessionReport> {
        for _ in 0..self.config.frames {
            self.frame();
            self.clock.sleep_remainder();
        }
        self.close()
    }

    /// Advances one frame: streaming, budgeted work, physics and edits.
    pub fn frame(&mut self) {
        let dt = self.clock.begin_frame();
        self.report.frames += 1;

        let column = self.column();
        let chunk = column.to_chunk_coord();
        if self.observer_chunk != Some(chunk) {
            let wanted = self.manager.update_wanted_set(column.q, column.r);
            debug!(
                "Observer entered chunk {chunk}: {} wanted, {} queued, {} evicted",
                wanted.wanted, wanted.enqueued, wanted.evicted
            );
            self.observer_chunk = Some(chunk);
        }

        let tick = self.manager.tick(Duration::from_secs_f32(dt));
        self.report.absorb(&tick);
        if tick.generated + tick.loaded > 0 && self.report.torches_placed > 0 {
            // New chunks arrive dark next to lit ones
            self.report.cells_lit += self.manager.relight_sources().lit;
        }

        let steps = self.clock.accumulate(dt);
        if self.surroundings_resident() {
            let start = self.actor.position;
            self.walk(steps);
            let moved = self.actor.position - start;
            self.report.distance_walked += Vec3::new(moved.x, 0.0, moved.z).length();
        }

        let interval = u64::from(self.config.torch_interval);
        if interval > 0 && self.clock.frames() % interval == 0 {
            self.place_torch();
        }

        if self.clock.frames() % LOG_INTERVAL == 0 {
            info!(
                "Frame {} ({:.0} fps): {} resident, {} pending, {} meshes, observer at ({:.1}, {:.1}, {:.1})",
                self.clock.frames(),
                self.clock.fps(),
                self.manager.resident_count(),
                self.manager.pending_count(),
                self.meshes.live_meshes(),
                self.actor.position.x,
                self.actor.position.y,
                self.actor.position.z,
            );
        }
    }

    /// Drops a torch on the ground just behind the observer.
    ///
    /// Returns whether a torch was placed.
    pub fn place_torch(&mut self) -> bool {
        if self.torch == 0 {
            return false;
        }
        let behind = self.actor.position - self.heading() * 1.5;
        let column = world_to_axial(behind.x, behind.z);
        let base = self.actor.position.y.floor() as i32;

        let Some(ground) = (base - 4..=base + 2)
            .rev()
            .find(|&y| self.manager.blocks().is_solid(self.manager.get_block(column.q, column.r, y)))
        else {
            return false;
        };
        let y = ground + 1;
        if self.manager.get_block(column.q, column.r, y) != 0 {
            return false;
        }
        match self.manager.place_block(column.q, column.r, y, self.torch) {
            Some(update) => {
                self.report.torches_placed += 1;
                self.report.cells_lit += update.lit;
                debug!("Torch at ({}, {}, {y}) lit {} cells", column.q, column.r, update.lit);
                true
            },
            None => false,
        }
    }

    /// Saves the player and every modified chunk and releases the world.
    pub fn close(mut self) -> Result<SessionReport> {
        let player = PlayerState {
            position: self.actor.position,
            yaw: self.yaw,
            pitch: 0.0,
        };
        self.catalog
            .save_player(&self.world.id, &player)
            .context("Failed to save player state")?;

        self.report.absorb(&self.manager.wait_for_saves());
        let summary = self.manager.dispose();
        self.report.chunks_saved += summary.saved;
        self.report.save_failures += summary.failed;
        if summary.failed > 0 {
            warn!("{} chunks could not be saved", summary.failed);
        }

        info!(
            "Closed '{}' after {} frames: {} generated, {} loaded, {} saved, {} failed jobs, {} failed writes",
            self.world.name,
            self.report.frames,
            self.report.chunks_generated,
            self.report.chunks_loaded,
            self.report.chunks_saved,
            self.report.failed_jobs,
            self.report.save_failures,
        );
        Ok(self.report)
    }
}

#[cfg(test)]
impl Session {
    /// The chunk manager.
    #[must_use]
    pub fn manager(&self) -> &ChunkManager {
        &self.manager
    }

    /// Published mesh summaries.
    #[must_use]
    pub fn meshes(&self) -> &MeshObserver {
        &self.meshes
    }

    /// The opened world.
    #[must_use]
    pub fn world(&self) -> &WorldMeta {
        &self.world
    }

    /// The walking observer.
    #[must_use]
    pub fn actor(&self) -> &Actor {
        &self.actor
    }

    /// Running totals.
    #[must_use]
    pub fn report(&self) -> &SessionReport {
        &self.report
    }
}

impl Session {
    fn column(&self) -> Axial {
        world_to_axial(self.actor.position.x, self.actor.position.z)
    }

    fn heading(&self) -> Vec3 {
        Vec3::new(self.yaw.cos(), 0.0, self.yaw.sin())
    }

    /// The observer's chunk and its six hex neighbors are resident, so the
    /// ground under any reachable footprint is known.
    fn surroundings_resident(&self) -> bool {
        let center = self.column().to_chunk_coord();
        let origin = Axial::new(center.q, center.r);
        std::iter::once(origin)
            .chain(origin.neighbors())
            .all(|c| self.manager.is_resident(ChunkCoord::new(c.q, c.r)))
    }

    fn walk(&mut self, steps: u32) {
        let dt = self.clock.fixed_dt();
        for _ in 0..steps {
            self.yaw += TURN_RATE * dt;
            let heading = self.heading() * self.config.walk_speed;
            self.actor.velocity.x = heading.x;
            self.actor.velocity.z = heading.z;

            let collision = WorldCollision::new(
                &self.manager,
                self.manager.blocks(),
                self.world.seed,
                self.physics.config(),
            );
            let outcome = self.physics.step(&mut self.actor, &collision, dt);
            self.react(outcome);
        }
    }

    fn react(&mut self, outcome: StepOutcome) {
        if outcome.feet_in_liquid {
            self.actor.velocity.y = self.actor.velocity.y.max(SWIM_SPEED);
        } else if outcome.on_ground && (outcome.blocked_x || outcome.blocked_z) {
            self.actor.velocity.y = JUMP_SPEED;
        }
    }
}

/// Loads block definitions from a JSON file, or the built-in palette.
fn load_blocks(path: Option<&Path>) -> Result<BlockRegistry> {
    let Some(path) = path else {
        return Ok(BlockRegistry::with_defaults());
    };
    let json = fs::read_to_string(path)
        .with_context(|| format!("Failed to read block definitions {}", path.display()))?;
    let registry = BlockRegistry::from_json(&json)
        .with_context(|| format!("Invalid block definitions in {}", path.display()))?;
    info!("Loaded {} block definitions from {}", registry.len(), path.display());
    Ok(registry)
}

/// Two layers above the ground or water at the origin column.
fn spawn_point(generator: &TerrainGenerator) -> Vec3 {
    let origin = Axial::new(0, 0);
    let ground = generator
        .surface_height(origin)
        .max(generator.config().sea_level);
    origin.center((ground + 2) as f32)
}

#[cfg(test)]
mod tests {
    use super::*;
    use hexworld_common::CHUNK_HEIGHT;
    use tempfile::TempDir;

    fn test_config(dir: &TempDir) -> EngineConfig {
        let mut config = EngineConfig {
            data_dir: dir.path().to_path_buf(),
            world_name: "Test World".into(),
            world_seed: Some(7),
            frames: 0,
            walk_speed: 0.0,
            torch_interval: 0,
            ..EngineConfig::default()
        };
        config.chunks.render_distance = 1;
        config.chunks.lod_distance = 1;
        config.chunks.frame_budget_ms = 50;
        config.validate();
        config
    }

    /// Runs frames until all streaming and meshing work is done.
    fn settle(session: &mut Session) {
        for _ in 0..5_000 {
            session.frame();
            if session.manager().is_idle() && session.manager().resident_count() == 7 {
                return;
            }
        }
        panic!("session never settled");
    }

    #[test]
    fn test_open_creates_world_once() {
        let dir = TempDir::new().expect("temp dir");
        let first = Session::open(test_config(&dir)).expect("open");
        let id = first.world().id.clone();
        assert_eq!(first.world().seed, 7);
        first.close().expect("close");

        let second = Session::open(test_config(&dir)).expect("reopen");
        assert_eq!(second.world().id, id);
        let worlds = second.catalog.list().expect("list");
        assert_eq!(worlds.len(), 1);
        second.close().expect("close");
    }

    #[test]
    fn test_streams_and_meshes_around_observer() {
        let dir = TempDir::new().expect("temp dir");
        let mut session = Session::open(test_config(&dir)).expect("open");
        settle(&mut session);

        assert_eq!(session.report().chunks_generated, 7);
        assert_eq!(session.meshes().live_meshes(), 7);
        assert!(session.report().meshes_built >= 7);
        assert!(session.actor().position.y > 0.0);

        let report = session.close().expect("close");
        assert_eq!(report.failed_jobs, 0);
        assert_eq!(report.save_failures, 0);
    }

    #[test]
    fn test_edits_and_player_survive_reopen() {
        let dir = TempDir::new().expect("temp dir");
        let mut session = Session::open(test_config(&dir)).expect("open");
        settle(&mut session);

        let torch = session.manager().blocks().id_of("torch");
        let (q, r) = (5, 5);
        let y = (1..CHUNK_HEIGHT)
            .rev()
            .find(|&y| session.manager().get_block(q, r, y) == 0)
            .expect("open air above the terrain");
        let update = session
            .manager
            .place_block(q, r, y, torch)
            .expect("column is resident");
        assert!(update.lit > 0);
        let position = session.actor().position;
        let report = session.close().expect("close");
        assert!(report.chunks_saved >= 1);

        let mut reopened = Session::open(test_config(&dir)).expect("reopen");
        assert_eq!(reopened.actor().position, position);
        settle(&mut reopened);
        assert_eq!(reopened.report().chunks_loaded + reopened.report().chunks_generated, 7);
        assert!(reopened.report().chunks_loaded >= 1);
        assert_eq!(reopened.manager().get_block(q, r, y), torch);
        assert_eq!(reopened.manager().get_light(q, r, y), 14);
        reopened.close().expect("close");
    }

    #[test]
    fn test_missing_block_file_is_an_error() {
        let dir = TempDir::new().expect("temp dir");
        let mut config = test_config(&dir);
        config.block_definitions = Some(dir.path().join("missing.json"));
        assert!(Session::open(config).is_err());
    }

    #[test]
    fn test_run_counts_frames() {
        let dir = TempDir::new().expect("temp dir");
        let mut config = test_config(&dir);
        config.frames = 30;
        config.torch_interval = 10;
        let report = Session::open(config).expect("open").run().expect("run");
        assert_eq!(report.frames, 30);
    }
}
