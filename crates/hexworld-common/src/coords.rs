//! Hex axial coordinates, chunk coordinates, and world-space conversion.
//!
//! The hex grid is pointy-top with a unit hex size. Axial `(q, r)` address a
//! column; elevation is a separate integer layer `y` in `0..CHUNK_HEIGHT`.

use glam::{Vec2, Vec3};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Width of a chunk along both axial axes, in hex columns.
pub const CHUNK_SIZE: i32 = 16;

/// Number of height layers in a chunk.
pub const CHUNK_HEIGHT: i32 = 64;

/// Number of cells in one chunk (`16 * 16 * 64`).
pub const CHUNK_VOLUME: usize = (CHUNK_SIZE * CHUNK_SIZE * CHUNK_HEIGHT) as usize;

/// Outer radius of a hex in world units.
pub const HEX_SIZE: f32 = 1.0;

/// Horizontal distance between adjacent column centers (`sqrt(3) * HEX_SIZE`).
pub const HEX_WIDTH: f32 = 1.732_050_8 * HEX_SIZE;

/// The six axial neighbor offsets, counter-clockwise starting east.
pub const HEX_DIRECTIONS: [Axial; 6] = [
    Axial::new(1, 0),
    Axial::new(1, -1),
    Axial::new(0, -1),
    Axial::new(-1, 0),
    Axial::new(-1, 1),
    Axial::new(0, 1),
];

/// Axial hex coordinate of a column. The cube coordinate `s = -q - r` is derived.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Axial {
    /// Q axis
    pub q: i32,
    /// R axis
    pub r: i32,
}

impl Axial {
    /// Creates a new axial coordinate.
    #[must_use]
    pub const fn new(q: i32, r: i32) -> Self {
        Self { q, r }
    }

    /// Derived third cube coordinate.
    #[must_use]
    pub const fn s(self) -> i32 {
        -self.q - self.r
    }

    /// Hex distance in columns: `(|dq| + |dr| + |dq + dr|) / 2`.
    #[must_use]
    pub fn distance(self, other: Self) -> u32 {
        hex_distance(self.q - other.q, self.r - other.r)
    }

    /// Neighbor in the given direction (`0..6`, wraps).
    #[must_use]
    pub const fn neighbor(self, direction: usize) -> Self {
        let d = HEX_DIRECTIONS[direction % 6];
        Self::new(self.q + d.q, self.r + d.r)
    }

    /// All six horizontal neighbors.
    #[must_use]
    pub fn neighbors(self) -> [Self; 6] {
        HEX_DIRECTIONS.map(|d| Self::new(self.q + d.q, self.r + d.r))
    }

    /// Chunk owning this column.
    #[must_use]
    pub const fn to_chunk_coord(self) -> ChunkCoord {
        ChunkCoord {
            q: self.q.div_euclid(CHUNK_SIZE),
            r: self.r.div_euclid(CHUNK_SIZE),
        }
    }

    /// Position of this column inside its chunk, each in `0..CHUNK_SIZE`.
    #[must_use]
    pub const fn to_local(self) -> (usize, usize) {
        (
            self.q.rem_euclid(CHUNK_SIZE) as usize,
            self.r.rem_euclid(CHUNK_SIZE) as usize,
        )
    }

    /// Column center in the horizontal world plane, as `(x, z)`.
    #[must_use]
    pub fn to_world(self) -> Vec2 {
        let q = self.q as f32;
        let r = self.r as f32;
        Vec2::new(HEX_WIDTH * (q + r / 2.0), HEX_SIZE * 1.5 * r)
    }

    /// Column center at the given elevation.
    #[must_use]
    pub fn center(self, y: f32) -> Vec3 {
        let plane = self.to_world();
        Vec3::new(plane.x, y, plane.y)
    }
}

impl fmt::Display for Axial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.q, self.r)
    }
}

/// Hex distance for an axial delta.
#[must_use]
pub fn hex_distance(dq: i32, dr: i32) -> u32 {
    (dq.unsigned_abs() + dr.unsigned_abs() + (dq + dr).unsigned_abs()) / 2
}

/// Fractional axial coordinate of a world-space point on the horizontal plane.
#[must_use]
pub fn world_to_axial_fractional(x: f32, z: f32) -> (f32, f32) {
    let q = (3.0_f32.sqrt() / 3.0 * x - z / 3.0) / HEX_SIZE;
    let r = (2.0 / 3.0 * z) / HEX_SIZE;
    (q, r)
}

/// Column containing a world-space point.
#[must_use]
pub fn world_to_axial(x: f32, z: f32) -> Axial {
    let (q, r) = world_to_axial_fractional(x, z);
    axial_round(q, r)
}

/// Rounds a fractional axial coordinate to the nearest hex via cube rounding.
#[must_use]
pub fn axial_round(fq: f32, fr: f32) -> Axial {
    let fs = -fq - fr;
    let mut q = fq.round();
    let mut r = fr.round();
    let s = fs.round();

    let dq = (q - fq).abs();
    let dr = (r - fr).abs();
    let ds = (s - fs).abs();

    if dq > dr && dq > ds {
        q = -r - s;
    } else if dr > ds {
        r = -q - s;
    }

    Axial::new(q as i32, r as i32)
}

/// Chunk coordinate in chunk space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct ChunkCoord {
    /// Chunk q
    pub q: i32,
    /// Chunk r
    pub r: i32,
}

impl ChunkCoord {
    /// Creates a new chunk coordinate.
    #[must_use]
    pub const fn new(q: i32, r: i32) -> Self {
        Self { q, r }
    }

    /// Chunk containing the given column.
    #[must_use]
    pub const fn containing(column: Axial) -> Self {
        column.to_chunk_coord()
    }

    /// Global axial coordinate of local column `(0, 0)`.
    #[must_use]
    pub const fn origin(self) -> Axial {
        Axial::new(self.q * CHUNK_SIZE, self.r * CHUNK_SIZE)
    }

    /// Global column for a local offset inside this chunk.
    #[must_use]
    pub const fn column(self, lq: usize, lr: usize) -> Axial {
        Axial::new(
            self.q * CHUNK_SIZE + lq as i32,
            self.r * CHUNK_SIZE + lr as i32,
        )
    }

    /// Hex distance between chunk coordinates.
    #[must_use]
    pub fn distance(self, other: Self) -> u32 {
        hex_distance(self.q - other.q, self.r - other.r)
    }

    /// The eight surrounding chunks in the square neighborhood.
    #[must_use]
    pub fn neighbors(self) -> [Self; 8] {
        let mut out = [self; 8];
        let mut i = 0;
        for dr in -1..=1 {
            for dq in -1..=1 {
                if dq == 0 && dr == 0 {
                    continue;
                }
                out[i] = Self::new(self.q + dq, self.r + dr);
                i += 1;
            }
        }
        out
    }
}

impl fmt::Display for ChunkCoord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.q, self.r)
    }
}

/// Global voxel position: a column plus a height layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VoxelPos {
    /// Global q
    pub q: i32,
    /// Global r
    pub r: i32,
    /// Height layer
    pub y: i32,
}

impl VoxelPos {
    /// Creates a new voxel position.
    #[must_use]
    pub const fn new(q: i32, r: i32, y: i32) -> Self {
        Self { q, r, y }
    }

    /// Column of this voxel.
    #[must_use]
    pub const fn column(self) -> Axial {
        Axial::new(self.q, self.r)
    }

    /// Chunk owning this voxel.
    #[must_use]
    pub const fn chunk(self) -> ChunkCoord {
        self.column().to_chunk_coord()
    }

    /// Whether `y` lies inside `0..CHUNK_HEIGHT`.
    #[must_use]
    pub const fn in_height_range(self) -> bool {
        self.y >= 0 && self.y < CHUNK_HEIGHT
    }

    /// Offset by an axial delta and a layer delta.
    #[must_use]
    pub const fn offset(self, dq: i32, dr: i32, dy: i32) -> Self {
        Self::new(self.q + dq, self.r + dr, self.y + dy)
    }

    /// The six horizontal neighbors plus the cells above and below,
    /// skipping any outside the height range.
    pub fn neighbors(self) -> impl Iterator<Item = Self> {
        HEX_DIRECTIONS
            .into_iter()
            .map(move |d| self.offset(d.q, d.r, 0))
            .chain([self.offset(0, 0, 1), self.offset(0, 0, -1)])
            .filter(|p| p.in_height_range())
    }
}

impl fmt::Display for VoxelPos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, {})", self.q, self.r, self.y)
    }
}
