//! Chunk data structure: dense block and light storage for one chunk.

use hexworld_common::{ChunkCoord, RenderHandle, VoxelPos, CHUNK_HEIGHT, CHUNK_SIZE, CHUNK_VOLUME};
use thiserror::Error;

/// Highest light level a cell can hold.
pub const MAX_LIGHT: u8 = 15;

const SIZE: usize = CHUNK_SIZE as usize;
const LAYER: usize = SIZE * SIZE;

/// Chunk errors.
#[derive(Debug, Error)]
pub enum ChunkError {
    /// A raw array had the wrong length
    #[error("Invalid {array} array length: expected {expected}, got {actual}")]
    InvalidLength {
        /// Which array ("blocks" or "light")
        array: &'static str,
        /// Required length
        expected: usize,
        /// Supplied length
        actual: usize,
    },
}

/// Result type for chunk operations.
pub type ChunkResult<T> = Result<T, ChunkError>;

/// Linear index of a local cell: `lq + lr * 16 + y * 256`.
///
/// Returns `None` when any component is outside the chunk.
#[must_use]
pub fn local_index(lq: usize, lr: usize, y: i32) -> Option<usize> {
    if lq >= SIZE || lr >= SIZE || !(0..CHUNK_HEIGHT).contains(&y) {
        return None;
    }
    Some(lq + lr * SIZE + y as usize * LAYER)
}

/// Inverse of [`local_index`].
#[must_use]
pub const fn index_to_local(index: usize) -> (usize, usize, i32) {
    (index % SIZE, (index / SIZE) % SIZE, (index / LAYER) as i32)
}

/// A chunk of the world: 16 x 16 hex columns by 64 layers.
#[derive(Debug, Clone)]
pub struct Chunk {
    /// Chunk coordinate
    coord: ChunkCoord,
    /// Block ids, 0 = empty
    blocks: Box<[u8]>,
    /// Light levels, 0..=15
    light: Box<[u8]>,
    /// Render geometry is stale
    dirty: bool,
    /// Persisted copy is stale
    modified: bool,
    /// Rendered as a flattened far chunk
    lod: bool,
    /// Current render representation, owned by the mesher
    render_handle: Option<RenderHandle>,
}

impl Chunk {
    /// Creates an empty, dark chunk that still needs meshing.
    #[must_use]
    pub fn new(coord: ChunkCoord) -> Self {
        Self {
            coord,
            blocks: vec![0; CHUNK_VOLUME].into_boxed_slice(),
            light: vec![0; CHUNK_VOLUME].into_boxed_slice(),
            dirty: true,
            modified: false,
            lod: false,
            render_handle: None,
        }
    }

    /// Builds a chunk from raw arrays, e.g. after a store load.
    pub fn from_arrays(coord: ChunkCoord, blocks: Vec<u8>, light: Vec<u8>) -> ChunkResult<Self> {
        if blocks.len() != CHUNK_VOLUME {
            return Err(ChunkError::InvalidLength {
                array: "blocks",
                expected: CHUNK_VOLUME,
                actual: blocks.len(),
            });
        }
        if light.len() != CHUNK_VOLUME {
            return Err(ChunkError::InvalidLength {
                array: "light",
                expected: CHUNK_VOLUME,
                actual: light.len(),
            });
        }
        Ok(Self {
            blocks: blocks.into_boxed_slice(),
            light: light.into_boxed_slice(),
            ..Self::new(coord)
        })
    }

    /// Returns the chunk coordinate.
    #[must_use]
    pub const fn coord(&self) -> ChunkCoord {
        self.coord
    }

    /// Returns whether render geometry must be rebuilt.
    #[must_use]
    pub const fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Marks the chunk for remeshing.
    pub fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    /// Clears the remesh flag.
    pub fn clear_dirty(&mut self) {
        self.dirty = false;
    }

    /// Returns whether the chunk has unsaved changes.
    #[must_use]
    pub const fn is_modified(&self) -> bool {
        self.modified
    }

    /// Marks the chunk as needing persistence.
    pub fn mark_modified(&mut self) {
        self.modified = true;
    }

    /// Clears the persistence flag.
    pub fn clear_modified(&mut self) {
        self.modified = false;
    }

    /// Returns whether the chunk renders as LOD.
    #[must_use]
    pub const fn is_lod(&self) -> bool {
        self.lod
    }

    /// Sets the LOD flag. Returns `true` if it changed.
    pub fn set_lod(&mut self, lod: bool) -> bool {
        let changed = self.lod != lod;
        self.lod = lod;
        changed
    }

    /// Returns the current render handle.
    #[must_use]
    pub const fn render_handle(&self) -> Option<RenderHandle> {
        self.render_handle
    }

    /// Installs a new render handle, returning the replaced one.
    pub fn set_render_handle(&mut self, handle: RenderHandle) -> Option<RenderHandle> {
        self.render_handle.replace(handle)
    }

    /// Removes and returns the render handle.
    pub fn take_render_handle(&mut self) -> Option<RenderHandle> {
        self.render_handle.take()
    }

    /// Block id at a local cell, 0 when out of range.
    #[must_use]
    pub fn get_block(&self, lq: usize, lr: usize, y: i32) -> u8 {
        local_index(lq, lr, y).map_or(0, |i| self.blocks[i])
    }

    /// Writes a block id. Returns `false` when out of range.
    pub fn set_block(&mut self, lq: usize, lr: usize, y: i32, id: u8) -> bool {
        match local_index(lq, lr, y) {
            Some(i) => {
                self.blocks[i] = id;
                true
            },
            None => false,
        }
    }

    /// Light level at a local cell, 0 when out of range.
    #[must_use]
    pub fn get_light(&self, lq: usize, lr: usize, y: i32) -> u8 {
        local_index(lq, lr, y).map_or(0, |i| self.light[i])
    }

    /// Writes a light level, clamped to [`MAX_LIGHT`]. Returns `false` when out of range.
    pub fn set_light(&mut self, lq: usize, lr: usize, y: i32, level: u8) -> bool {
        match local_index(lq, lr, y) {
            Some(i) => {
                self.light[i] = level.min(MAX_LIGHT);
                true
            },
            None => false,
        }
    }

    /// Returns the block array.
    #[must_use]
    pub fn blocks(&self) -> &[u8] {
        &self.blocks
    }

    /// Returns the block array for bulk writes (generation).
    pub fn blocks_mut(&mut self) -> &mut [u8] {
        &mut self.blocks
    }

    /// Returns the light array.
    #[must_use]
    pub fn light(&self) -> &[u8] {
        &self.light
    }

    /// Copies both arrays, e.g. to hand them to a background writer.
    #[must_use]
    pub fn snapshot(&self) -> (Vec<u8>, Vec<u8>) {
        (self.blocks.to_vec(), self.light.to_vec())
    }

    /// Lazily iterates non-empty cells with their global positions.
    #[must_use]
    pub fn iter_blocks(&self) -> ChunkBlocks<'_> {
        ChunkBlocks {
            chunk: self,
            index: 0,
        }
    }
}

/// Iterator over the non-empty cells of a chunk, see [`Chunk::iter_blocks`].
#[derive(Debug)]
pub struct ChunkBlocks<'a> {
    chunk: &'a Chunk,
    index: usize,
}

impl Iterator for ChunkBlocks<'_> {
    type Item = (VoxelPos, u8);

    fn next(&mut self) -> Option<Self::Item> {
        while self.index < CHUNK_VOLUME {
            let index = self.index;
            self.index += 1;
            let id = self.chunk.blocks[index];
            if id != 0 {
                let (lq, lr, y) = index_to_local(index);
                let column = self.chunk.coord.column(lq, lr);
                return Some((VoxelPos::new(column.q, column.r, y), id));
            }
        }
        None
    }
}
