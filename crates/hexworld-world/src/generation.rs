//! Default procedural terrain.
//!
//! A seeded Perlin heightmap sampled at each column's world-space center,
//! so terrain is seamless across chunk borders. Generation advances one row
//! of 16 columns per step; trees are planted in a final step once every
//! column is filled.

use hexworld_common::{
    hex_distance, Axial, ChunkCoord, JobError, JobResult, CHUNK_HEIGHT, CHUNK_SIZE,
};
use noise::{NoiseFn, Perlin};
use std::fmt;
use std::sync::Arc;

use crate::blocks::BlockRegistry;
use crate::chunk::Chunk;
use crate::config::GeneratorConfig;
use crate::jobs::{GenerationJob, WorldGenerator};

const SIZE: usize = CHUNK_SIZE as usize;

/// Lowest surface layer an ocean trench may reach.
const MIN_SURFACE: i32 = 3;

/// Deepest trench below sea level.
const MAX_OCEAN_DEPTH: f64 = 14.0;

/// Normalized height below which columns become ocean floor.
const WATER_THRESHOLD: f64 = 0.32;

/// Block ids the generator places, resolved by name.
#[derive(Debug, Clone, Copy, Default)]
struct Palette {
    grass: u8,
    dirt: u8,
    stone: u8,
    sand: u8,
    water: u8,
    bedrock: u8,
    wood: u8,
    leaves: u8,
}

impl Palette {
    fn resolve(blocks: &BlockRegistry) -> Self {
        Self {
            grass: blocks.id_of("grass"),
            dirt: blocks.id_of("dirt"),
            stone: blocks.id_of("stone"),
            sand: blocks.id_of("sand"),
            water: blocks.id_of("water"),
            bedrock: blocks.id_of("bedrock"),
            wood: blocks.id_of("wood"),
            leaves: blocks.id_of("leaves"),
        }
    }
}

/// Noise fields and parameters shared by all jobs of one generator.
struct Terrain {
    config: GeneratorConfig,
    height: Perlin,
    forest: Perlin,
    palette: Palette,
}

/// A tree to plant once the chunk's columns are filled.
#[derive(Debug, Clone, Copy)]
struct TreeSite {
    lq: usize,
    lr: usize,
    base: i32,
    roll: f64,
}

impl Terrain {
    /// Raw octave sum mapped to `[0, 1]`.
    fn raw_height(&self, column: Axial) -> f64 {
        let world = column.to_world();
        let scale = self.config.terrain_scale;
        let (nx, nz) = (f64::from(world.x) * scale, f64::from(world.y) * scale);
        let value = self.height.get([nx, nz]) * 0.6
            + self.height.get([nx * 2.0, nz * 2.0]) * 0.3
            + self.height.get([nx * 4.0, nz * 4.0]) * 0.1;
        ((value + 1.0) / 2.0).clamp(0.0, 1.0)
    }

    /// Surface layer of a column.
    fn surface(&self, column: Axial) -> i32 {
        let sea = self.config.sea_level;
        let raw = self.raw_height(column);
        let shaped = raw.powf(1.8) * 0.85;
        let surface = (shaped * f64::from(CHUNK_HEIGHT - 20)).floor() as i32 + 12;
        if surface > sea {
            return surface.min(CHUNK_HEIGHT - 1);
        }
        if raw < WATER_THRESHOLD {
            let depth = (1.0 - raw / WATER_THRESHOLD).powi(2);
            (sea - (depth * MAX_OCEAN_DEPTH).floor() as i32).max(MIN_SURFACE)
        } else {
            sea
        }
    }

    /// Fills one column and reports a tree site if the roll succeeds.
    fn fill_column(&self, chunk: &mut Chunk, lq: usize, lr: usize) -> Option<TreeSite> {
        let column = chunk.coord().column(lq, lr);
        let surface = self.surface(column);
        let sea = self.config.sea_level;
        let p = self.palette;

        for y in 0..CHUNK_HEIGHT {
            let id = if y == 0 {
                p.bedrock
            } else if y < surface - 3 {
                p.stone
            } else if y < surface {
                if surface <= sea {
                    p.stone
                } else if y <= sea {
                    p.sand
                } else {
                    p.dirt
                }
            } else if y == surface {
                if surface < sea {
                    p.stone
                } else if surface == sea {
                    p.sand
                } else {
                    p.grass
                }
            } else if y <= sea {
                p.water
            } else {
                break;
            };
            chunk.set_block(lq, lr, y, id);
        }

        if !self.config.trees || surface <= sea {
            return None;
        }
        self.tree_roll(column, lq, lr).map(|roll| TreeSite {
            lq,
            lr,
            base: surface + 1,
            roll,
        })
    }

    /// Forest density from a second noise field, then a hashed per-column roll.
    fn tree_roll(&self, column: Axial, lq: usize, lr: usize) -> Option<f64> {
        if !(3..=SIZE - 4).contains(&lq) || !(3..=SIZE - 4).contains(&lr) {
            return None;
        }
        let world = column.to_world();
        let forest = (self.forest.get([
            f64::from(world.x) * 0.02 + 1000.0,
            f64::from(world.y) * 0.02 + 1000.0,
        ]) + 1.0)
            / 2.0;
        if forest <= 0.6 {
            return None;
        }
        let roll = column_roll(self.config.seed, column);
        (roll < (forest - 0.6) * 0.15).then_some(roll)
    }

    fn plant_tree(&self, chunk: &mut Chunk, site: TreeSite) {
        let trunk = 5 + (site.roll * 7.0).floor() as i32;
        let top = site.base + trunk;
        if top >= CHUNK_HEIGHT - 2 {
            return;
        }
        for y in site.base..top {
            chunk.set_block(site.lq, site.lr, y, self.palette.wood);
        }

        let leaf = |chunk: &mut Chunk, dq: i32, dr: i32, y: i32| {
            let lq = site.lq as i32 + dq;
            let lr = site.lr as i32 + dr;
            if !(0..CHUNK_SIZE).contains(&lq) || !(0..CHUNK_SIZE).contains(&lr) {
                return;
            }
            let (lq, lr) = (lq as usize, lr as usize);
            if chunk.get_block(lq, lr, y) == 0 {
                chunk.set_block(lq, lr, y, self.palette.leaves);
            }
        };

        for dr in -2..=2 {
            for dq in -2..=2 {
                let dist = hex_distance(dq, dr);
                if dist <= 2 {
                    if dist < 2 || site.roll > 0.5 {
                        leaf(chunk, dq, dr, top - 2);
                    }
                    leaf(chunk, dq, dr, top - 1);
                }
                if dist <= 1 {
                    leaf(chunk, dq, dr, top);
                }
            }
        }
        leaf(chunk, 0, 0, top + 1);
    }
}

/// Deterministic value in `[0, 1)` for a column.
fn column_roll(seed: u64, column: Axial) -> f64 {
    let mut h = seed.wrapping_add(0x2545_F491_4F6C_DD1D);
    h ^= u64::from(column.q as u32).wrapping_mul(0x9E37_79B9_7F4A_7C15);
    h = (h ^ (h >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    h ^= u64::from(column.r as u32).wrapping_mul(0xC2B2_AE3D_27D4_EB4F);
    h = (h ^ (h >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    h ^= h >> 31;
    (h >> 11) as f64 / (1u64 << 53) as f64
}

/// Seeded heightmap generator with water, beaches and trees.
#[derive(Clone)]
pub struct TerrainGenerator {
    terrain: Arc<Terrain>,
}

impl fmt::Debug for TerrainGenerator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TerrainGenerator")
            .field("config", &self.terrain.config)
            .finish_non_exhaustive()
    }
}

impl TerrainGenerator {
    /// Creates a generator placing ids looked up in `blocks`.
    #[must_use]
    pub fn new(config: GeneratorConfig, blocks: &BlockRegistry) -> Self {
        let seed = config.seed;
        Self {
            terrain: Arc::new(Terrain {
                height: Perlin::new(seed as u32),
                forest: Perlin::new((seed >> 32) as u32 ^ 0x5EED_F0E5),
                palette: Palette::resolve(blocks),
                config,
            }),
        }
    }

    /// Surface layer of the column at a global axial position.
    #[must_use]
    pub fn surface_height(&self, column: Axial) -> i32 {
        self.terrain.surface(column)
    }

    /// Generation parameters.
    #[must_use]
    pub fn config(&self) -> &GeneratorConfig {
        &self.terrain.config
    }
}

impl WorldGenerator for TerrainGenerator {
    fn start(&self, coord: ChunkCoord, is_lod: bool) -> Box<dyn GenerationJob> {
        Box::new(TerrainJob {
            terrain: Arc::clone(&self.terrain),
            chunk: Chunk::new(coord),
            is_lod,
            row: 0,
            trees: Vec::new(),
            done: false,
        })
    }
}

/// One chunk in progress.
struct TerrainJob {
    terrain: Arc<Terrain>,
    chunk: Chunk,
    is_lod: bool,
    /// Next row of columns to fill
    row: usize,
    trees: Vec<TreeSite>,
    done: bool,
}

impl GenerationJob for TerrainJob {
    fn coord(&self) -> ChunkCoord {
        self.chunk.coord()
    }

    fn is_lod(&self) -> bool {
        self.is_lod
    }

    fn resume(&mut self) -> JobResult<bool> {
        if self.done {
            return Ok(false);
        }
        if self.row < SIZE {
            let lr = self.row;
            for lq in 0..SIZE {
                if let Some(site) = self.terrain.fill_column(&mut self.chunk, lq, lr) {
                    self.trees.push(site);
                }
            }
            self.row += 1;
            return Ok(true);
        }

        for site in self.trees.drain(..) {
            self.terrain.plant_tree(&mut self.chunk, site);
        }
        self.done = true;
        Ok(false)
    }

    fn finish(self: Box<Self>) -> JobResult<Chunk> {
        if !self.done {
            return Err(JobError::Incomplete(self.chunk.coord()));
        }
        Ok(self.chunk)
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Generators for manager tests.

    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Stone up to `height`, air above. Completes in two steps.
    #[derive(Debug, Clone)]
    pub(crate) struct FlatGenerator {
        pub(crate) height: i32,
        pub(crate) block: u8,
        pub(crate) started: Arc<AtomicUsize>,
    }

    impl FlatGenerator {
        pub(crate) fn new(height: i32, block: u8) -> Self {
            Self {
                height,
                block,
                started: Arc::new(AtomicUsize::new(0)),
            }
        }

        pub(crate) fn started(&self) -> usize {
            self.started.load(Ordering::SeqCst)
        }
    }

    struct FlatJob {
        chunk: Chunk,
        height: i32,
        block: u8,
        is_lod: bool,
        steps: u8,
    }

    impl GenerationJob for FlatJob {
        fn coord(&self) -> ChunkCoord {
            self.chunk.coord()
        }

        fn is_lod(&self) -> bool {
            self.is_lod
        }

        fn resume(&mut self) -> JobResult<bool> {
            if self.steps == 0 {
                for lr in 0..SIZE {
                    for lq in 0..SIZE {
                        for y in 0..self.height {
                            self.chunk.set_block(lq, lr, y, self.block);
                        }
                    }
                }
            }
            self.steps += 1;
            Ok(self.steps < 2)
        }

        fn finish(self: Box<Self>) -> JobResult<Chunk> {
            if self.steps < 2 {
                return Err(JobError::Incomplete(self.chunk.coord()));
            }
            Ok(self.chunk)
        }
    }

    impl WorldGenerator for FlatGenerator {
        fn start(&self, coord: ChunkCoord, is_lod: bool) -> Box<dyn GenerationJob> {
            self.started.fetch_add(1, Ordering::SeqCst);
            Box::new(FlatJob {
                chunk: Chunk::new(coord),
                height: self.height,
                block: self.block,
                is_lod,
                steps: 0,
            })
        }
    }

    /// Fails on the first step for one chunk, delegates otherwise.
    pub(crate) struct FailingGenerator {
        pub(crate) inner: FlatGenerator,
        pub(crate) poisoned: ChunkCoord,
    }

    struct FailingJob(ChunkCoord);

    impl GenerationJob for FailingJob {
        fn coord(&self) -> ChunkCoord {
            self.0
        }

        fn is_lod(&self) -> bool {
            false
        }

        fn resume(&mut self) -> JobResult<bool> {
            Err(JobError::Failed {
                coord: self.0,
                reason: "noise backend exploded".into(),
            })
        }

        fn finish(self: Box<Self>) -> JobResult<Chunk> {
            Err(JobError::Incomplete(self.0))
        }
    }

    impl WorldGenerator for FailingGenerator {
        fn start(&self, coord: ChunkCoord, is_lod: bool) -> Box<dyn GenerationJob> {
            if coord == self.poisoned {
                return Box::new(FailingJob(coord));
            }
            self.inner.start(coord, is_lod)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(generator: &TerrainGenerator, coord: ChunkCoord) -> Chunk {
        let mut job = generator.start(coord, false);
        let mut steps = 0;
        while job.resume().expect("step succeeds") {
            steps += 1;
        }
        assert_eq!(steps, SIZE);
        job.finish().expect("job complete")
    }

    #[test]
    fn test_generation_is_deterministic() {
        let blocks = BlockRegistry::with_defaults();
        let a = TerrainGenerator::new(GeneratorConfig::with_seed(77), &blocks);
        let b = TerrainGenerator::new(GeneratorConfig::with_seed(77), &blocks);
        let coord = ChunkCoord::new(-2, 3);
        assert_eq!(run(&a, coord).blocks(), run(&b, coord).blocks());
    }

    #[test]
    fn test_columns_are_layered() {
        let blocks = BlockRegistry::with_defaults();
        let generator = TerrainGenerator::new(GeneratorConfig::with_seed(5), &blocks);
        let coord = ChunkCoord::new(1, 1);
        let chunk = run(&generator, coord);
        let sea = generator.config().sea_level;

        for lr in 0..SIZE {
            for lq in 0..SIZE {
                assert_eq!(chunk.get_block(lq, lr, 0), blocks.id_of("bedrock"));
                let surface = generator.surface_height(coord.column(lq, lr));
                assert!((MIN_SURFACE..CHUNK_HEIGHT).contains(&surface));
                let top = chunk.get_block(lq, lr, surface);
                assert!(
                    [blocks.id_of("grass"), blocks.id_of("sand"), blocks.id_of("stone")]
                        .contains(&top)
                );
                if surface < sea {
                    assert_eq!(chunk.get_block(lq, lr, sea), blocks.id_of("water"));
                }
            }
        }
    }

    #[test]
    fn test_finish_before_done_fails() {
        let blocks = BlockRegistry::with_defaults();
        let generator = TerrainGenerator::new(GeneratorConfig::default(), &blocks);
        let mut job = generator.start(ChunkCoord::new(0, 0), true);
        assert!(job.is_lod());
        assert!(job.resume().expect("step succeeds"));
        assert!(matches!(job.finish(), Err(JobError::Incomplete(_))));
    }

    #[test]
    fn test_trees_stay_inside_chunk() {
        let blocks = BlockRegistry::with_defaults();
        let generator = TerrainGenerator::new(GeneratorConfig::with_seed(9), &blocks);
        let terrain = &generator.terrain;
        let mut chunk = Chunk::new(ChunkCoord::new(0, 0));
        let site = TreeSite {
            lq: 3,
            lr: 3,
            base: 20,
            roll: 0.9,
        };
        terrain.plant_tree(&mut chunk, site);
        // 5 + floor(0.9 * 7) = 11 trunk blocks.
        assert_eq!(chunk.get_block(3, 3, 30), blocks.id_of("wood"));
        assert_eq!(chunk.get_block(3, 3, 31), blocks.id_of("leaves"));
        assert_eq!(chunk.get_block(3, 3, 32), blocks.id_of("leaves"));
        assert_eq!(chunk.get_block(1, 3, 29), blocks.id_of("leaves"));
        assert_eq!(chunk.get_block(1, 3, 31), 0);
    }

    #[test]
    fn test_column_roll_range() {
        for q in -50..50 {
            let roll = column_roll(3, Axial::new(q, q * 2));
            assert!((0.0..1.0).contains(&roll));
        }
    }
}
