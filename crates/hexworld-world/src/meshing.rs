//! Headless mesher that counts visible faces.
//!
//! Stands in for a GPU mesh builder when running without a renderer. Each
//! finished job publishes a [`MeshSummary`] under a fresh handle.

use ahash::AHashMap;
use hexworld_common::{ChunkCoord, JobError, JobResult, RenderHandle, CHUNK_HEIGHT, CHUNK_SIZE};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::trace;

use crate::chunk::local_index;
use crate::jobs::{ChunkMesher, FaceQuery, MeshJob};

const SIZE: usize = CHUNK_SIZE as usize;

/// Layers processed per step.
const LAYERS_PER_STEP: i32 = 8;

/// What a finished mesh would contain.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MeshSummary {
    /// Chunk the mesh belongs to
    pub coord: ChunkCoord,
    /// Non-empty cells
    pub solid_cells: usize,
    /// Faces that passed the culling query
    pub visible_faces: usize,
    /// Built in LOD form (top faces only)
    pub lod: bool,
}

type MeshTable = Arc<Mutex<AHashMap<RenderHandle, MeshSummary>>>;

/// Face-counting [`ChunkMesher`].
#[derive(Debug, Default)]
pub struct SurfaceMesher {
    meshes: MeshTable,
    next_handle: Arc<AtomicU64>,
}

impl SurfaceMesher {
    /// Creates a mesher with no published meshes.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Summary published under a handle.
    #[must_use]
    pub fn summary(&self, handle: RenderHandle) -> Option<MeshSummary> {
        self.meshes.lock().get(&handle).copied()
    }

    /// Number of live meshes.
    #[must_use]
    pub fn live_meshes(&self) -> usize {
        self.meshes.lock().len()
    }

    /// Shared view of the mesh table, readable after the mesher is handed off.
    #[must_use]
    pub fn observer(&self) -> MeshObserver {
        MeshObserver {
            meshes: Arc::clone(&self.meshes),
        }
    }
}

/// Read-only handle onto a [`SurfaceMesher`]'s published meshes.
#[derive(Debug, Clone)]
pub struct MeshObserver {
    meshes: MeshTable,
}

impl MeshObserver {
    /// Number of live meshes.
    #[must_use]
    pub fn live_meshes(&self) -> usize {
        self.meshes.lock().len()
    }

    /// Total visible faces across live meshes.
    #[must_use]
    pub fn total_faces(&self) -> usize {
        self.meshes.lock().values().map(|m| m.visible_faces).sum()
    }

    /// Summary for the live mesh of a chunk.
    #[must_use]
    pub fn find(&self, coord: ChunkCoord) -> Option<MeshSummary> {
        self.meshes.lock().values().find(|m| m.coord == coord).copied()
    }
}

impl ChunkMesher for SurfaceMesher {
    fn start(&mut self, coord: ChunkCoord, blocks: Vec<u8>, is_lod: bool) -> Box<dyn MeshJob> {
        Box::new(SurfaceJob {
            summary: MeshSummary {
                coord,
                lod: is_lod,
                ..MeshSummary::default()
            },
            blocks,
            next_layer: 0,
            meshes: Arc::clone(&self.meshes),
            next_handle: Arc::clone(&self.next_handle),
        })
    }

    fn release(&mut self, handle: RenderHandle) {
        if self.meshes.lock().remove(&handle).is_some() {
            trace!("Released mesh {}", handle.raw());
        }
    }
}

struct SurfaceJob {
    summary: MeshSummary,
    blocks: Vec<u8>,
    next_layer: i32,
    meshes: MeshTable,
    next_handle: Arc<AtomicU64>,
}

impl SurfaceJob {
    fn count_layer(&mut self, faces: &dyn FaceQuery, y: i32) {
        for lr in 0..SIZE {
            for lq in 0..SIZE {
                let Some(index) = local_index(lq, lr, y) else {
                    continue;
                };
                if self.blocks[index] == 0 {
                    continue;
                }
                self.summary.solid_cells += 1;

                let column = self.summary.coord.column(lq, lr);
                let (q, r) = (column.q, column.r);
                if self.summary.lod {
                    if faces.is_face_visible(q, r, y + 1) {
                        self.summary.visible_faces += 1;
                    }
                    continue;
                }

                let sides = column
                    .neighbors()
                    .into_iter()
                    .filter(|n| faces.is_face_visible(n.q, n.r, y))
                    .count();
                let caps = [y + 1, y - 1]
                    .into_iter()
                    .filter(|&ny| faces.is_face_visible(q, r, ny))
                    .count();
                self.summary.visible_faces += sides + caps;
            }
        }
    }
}

impl MeshJob for SurfaceJob {
    fn coord(&self) -> ChunkCoord {
        self.summary.coord
    }

    fn is_lod(&self) -> bool {
        self.summary.lod
    }

    fn resume(&mut self, faces: &dyn FaceQuery) -> JobResult<bool> {
        let end = (self.next_layer + LAYERS_PER_STEP).min(CHUNK_HEIGHT);
        for y in self.next_layer..end {
            self.count_layer(faces, y);
        }
        self.next_layer = end;
        Ok(self.next_layer < CHUNK_HEIGHT)
    }

    fn finish(self: Box<Self>) -> JobResult<RenderHandle> {
        if self.next_layer < CHUNK_HEIGHT {
            return Err(JobError::Incomplete(self.summary.coord));
        }
        let handle = RenderHandle::from_raw(self.next_handle.fetch_add(1, Ordering::Relaxed) + 1);
        self.meshes.lock().insert(handle, self.summary);
        Ok(handle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::Chunk;
    use std::collections::HashSet;

    /// Cells listed are occupied; everything else is visible.
    struct Cells(HashSet<(i32, i32, i32)>);

    impl FaceQuery for Cells {
        fn is_face_visible(&self, q: i32, r: i32, y: i32) -> bool {
            y >= 0 && !self.0.contains(&(q, r, y))
        }
    }

    fn build(mesher: &mut SurfaceMesher, chunk: &Chunk, faces: &Cells, lod: bool) -> RenderHandle {
        let mut job = mesher.start(chunk.coord(), chunk.blocks().to_vec(), lod);
        let mut steps = 1;
        while job.resume(faces).expect("step succeeds") {
            steps += 1;
        }
        assert_eq!(steps, CHUNK_HEIGHT / LAYERS_PER_STEP);
        job.finish().expect("job complete")
    }

    #[test]
    fn test_single_block_has_eight_faces() {
        let mut mesher = SurfaceMesher::new();
        let mut chunk = Chunk::new(ChunkCoord::new(1, 0));
        chunk.set_block(2, 2, 5, 3);
        let faces = Cells(HashSet::from([(18, 2, 5)]));

        let handle = build(&mut mesher, &chunk, &faces, false);
        let summary = mesher.summary(handle).expect("published");
        assert_eq!(summary.solid_cells, 1);
        assert_eq!(summary.visible_faces, 8);
    }

    #[test]
    fn test_stacked_blocks_hide_shared_faces() {
        let mut mesher = SurfaceMesher::new();
        let mut chunk = Chunk::new(ChunkCoord::new(0, 0));
        chunk.set_block(4, 4, 0, 3);
        chunk.set_block(4, 4, 1, 3);
        let faces = Cells(HashSet::from([(4, 4, 0), (4, 4, 1)]));

        let handle = build(&mut mesher, &chunk, &faces, false);
        // Two sides of six each, one top; the bottom at y = -1 is culled.
        assert_eq!(mesher.summary(handle).map(|s| s.visible_faces), Some(13));

        let lod = build(&mut mesher, &chunk, &faces, true);
        assert_eq!(mesher.summary(lod).map(|s| s.visible_faces), Some(1));
        assert_ne!(handle, lod);
    }

    #[test]
    fn test_release_drops_summary() {
        let mut mesher = SurfaceMesher::new();
        let observer = mesher.observer();
        let chunk = Chunk::new(ChunkCoord::new(0, 0));
        let handle = build(&mut mesher, &chunk, &Cells(HashSet::new()), false);
        assert_eq!(observer.live_meshes(), 1);
        assert!(observer.find(ChunkCoord::new(0, 0)).is_some());
        mesher.release(handle);
        assert_eq!(observer.live_meshes(), 0);
    }

    #[test]
    fn test_finish_early_fails() {
        let mut mesher = SurfaceMesher::new();
        let job = mesher.start(ChunkCoord::new(0, 0), vec![0; hexworld_common::CHUNK_VOLUME], false);
        assert!(matches!(job.finish(), Err(JobError::Incomplete(_))));
    }
}
