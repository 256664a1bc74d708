//! Background chunk writer.
//!
//! The chunk manager snapshots a chunk's arrays and hands them to the
//! worker thread, which compresses and writes them through the
//! [`ChunkStore`]. Outcomes come back over a second channel and are
//! applied on the simulation thread.

use crossbeam_channel::{unbounded, Receiver, Sender};
use hexworld_common::{ChunkCoord, StoreError, StoreResult, WorldId};
use std::thread::{self, JoinHandle};
use tracing::{debug, error, trace};

use crate::store::ChunkStore;

/// A chunk snapshot to persist.
#[derive(Debug, Clone)]
pub struct SaveRequest {
    /// Owning world
    pub world: WorldId,
    /// Chunk coordinate
    pub coord: ChunkCoord,
    /// Block ids at submit time
    pub blocks: Vec<u8>,
    /// Light levels at submit time
    pub light: Vec<u8>,
}

/// Result of one write.
#[derive(Debug)]
pub struct SaveOutcome {
    /// Chunk coordinate
    pub coord: ChunkCoord,
    /// Write result
    pub result: StoreResult<()>,
}

/// Owns the writer thread and its channels.
#[derive(Debug)]
pub struct SaveWorker {
    requests: Option<Sender<SaveRequest>>,
    outcomes: Receiver<SaveOutcome>,
    thread: Option<JoinHandle<()>>,
    in_flight: usize,
}

impl SaveWorker {
    /// Starts the writer thread.
    pub fn spawn(store: ChunkStore) -> StoreResult<Self> {
        let (request_tx, request_rx) = unbounded::<SaveRequest>();
        let (outcome_tx, outcome_rx) = unbounded::<SaveOutcome>();

        let thread = thread::Builder::new()
            .name("hexworld-save".into())
            .spawn(move || Self::run(&store, &request_rx, &outcome_tx))?;

        debug!("Save worker started");
        Ok(Self {
            requests: Some(request_tx),
            outcomes: outcome_rx,
            thread: Some(thread),
            in_flight: 0,
        })
    }

    fn run(store: &ChunkStore, requests: &Receiver<SaveRequest>, outcomes: &Sender<SaveOutcome>) {
        for request in requests {
            let result = store.save_arrays(
                &request.world,
                request.coord,
                &request.blocks,
                &request.light,
            );
            trace!("Wrote chunk {}: ok={}", request.coord, result.is_ok());
            if outcomes
                .send(SaveOutcome {
                    coord: request.coord,
                    result,
                })
                .is_err()
            {
                break;
            }
        }
    }

    /// Queues a write.
    pub fn submit(&mut self, request: SaveRequest) -> StoreResult<()> {
        let sender = self
            .requests
            .as_ref()
            .ok_or_else(|| StoreError::Unavailable("save worker stopped".into()))?;
        sender
            .send(request)
            .map_err(|_| StoreError::Unavailable("save worker disconnected".into()))?;
        self.in_flight += 1;
        Ok(())
    }

    /// Writes submitted but not yet reported.
    #[must_use]
    pub const fn in_flight(&self) -> usize {
        self.in_flight
    }

    /// Outcomes available without blocking.
    pub fn poll(&mut self) -> Vec<SaveOutcome> {
        let outcomes: Vec<_> = self.outcomes.try_iter().collect();
        self.in_flight = self.in_flight.saturating_sub(outcomes.len());
        outcomes
    }

    /// Blocks until every submitted write has reported.
    pub fn wait_idle(&mut self) -> Vec<SaveOutcome> {
        let mut outcomes = Vec::with_capacity(self.in_flight);
        while self.in_flight > 0 {
            match self.outcomes.recv() {
                Ok(outcome) => {
                    outcomes.push(outcome);
                    self.in_flight -= 1;
                },
                Err(_) => {
                    error!("Save worker exited with {} writes unreported", self.in_flight);
                    self.in_flight = 0;
                },
            }
        }
        outcomes
    }

    /// Closes the request channel and joins the thread.
    pub fn shutdown(&mut self) {
        self.requests = None;
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                error!("Save worker panicked");
            } else {
                debug!("Save worker stopped");
            }
        }
    }
}

impl Drop for SaveWorker {
    fn drop(&mut self) {
        self.shutdown();
    }
}
