//! Resumable work units driven by the chunk manager's frame budget.
//!
//! Generation and meshing never run to completion in one call. The manager
//! calls `resume` repeatedly until it reports no more work or the tick
//! budget runs out, then picks the job up again on the next tick.

use hexworld_common::{ChunkCoord, JobResult, RenderHandle};

use crate::chunk::Chunk;

/// A step-wise chunk generation.
pub trait GenerationJob: Send {
    /// Chunk being generated.
    fn coord(&self) -> ChunkCoord;

    /// Whether the chunk was requested as LOD.
    fn is_lod(&self) -> bool;

    /// Performs one bounded step. Returns `Ok(true)` while work remains.
    fn resume(&mut self) -> JobResult<bool>;

    /// Yields the finished chunk. Fails with `JobError::Incomplete` when
    /// called before `resume` reported completion.
    fn finish(self: Box<Self>) -> JobResult<Chunk>;
}

/// Source of generation jobs.
pub trait WorldGenerator: Send {
    /// Starts generating `coord`.
    fn start(&self, coord: ChunkCoord, is_lod: bool) -> Box<dyn GenerationJob>;
}

/// Face culling query answered by the chunk manager in global coordinates.
pub trait FaceQuery {
    /// Whether a face bordering the cell at `(q, r, y)` should be drawn.
    fn is_face_visible(&self, q: i32, r: i32, y: i32) -> bool;
}

/// A step-wise mesh build.
pub trait MeshJob: Send {
    /// Chunk being meshed.
    fn coord(&self) -> ChunkCoord;

    /// Whether the mesh is built in LOD form.
    fn is_lod(&self) -> bool;

    /// Performs one bounded step. Returns `Ok(true)` while work remains.
    fn resume(&mut self, faces: &dyn FaceQuery) -> JobResult<bool>;

    /// Publishes the mesh and returns its handle.
    fn finish(self: Box<Self>) -> JobResult<RenderHandle>;
}

/// Rendering collaborator that owns mesh representations.
pub trait ChunkMesher: Send {
    /// Starts a mesh build over a copy of the chunk's blocks.
    fn start(&mut self, coord: ChunkCoord, blocks: Vec<u8>, is_lod: bool) -> Box<dyn MeshJob>;

    /// Drops a representation the manager no longer references.
    fn release(&mut self, handle: RenderHandle);
}
