use std::collections::HashSet;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{Receiver, Sender};
use tracing::{debug, warn};

use super::pathfinder::find_tile_path;
use super::tilemap::{TileCoord, Tilemap};
use crate::world::ActorId;

/// Identifies one search request. A result whose generation no longer matches the
/// actor's current generation is stale and must be dropped by the consumer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PathTicket {
    pub actor: ActorId,
    pub generation: u64,
}

#[derive(Debug, Clone)]
pub struct PathJob {
    pub ticket: PathTicket,
    pub tilemap: Arc<Tilemap>,
    pub layer: usize,
    pub start: TileCoord,
    pub goal: TileCoord,
    pub blocked: HashSet<TileCoord>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathOutcome {
    pub ticket: PathTicket,
    pub layer: usize,
    /// Empty when no path exists.
    pub tiles: Vec<TileCoord>,
}

impl PathJob {
    fn run(self) -> PathOutcome {
        let tiles = find_tile_path(
            &self.tilemap,
            self.layer,
            self.start,
            self.goal,
            &self.blocked,
        );
        PathOutcome {
            ticket: self.ticket,
            layer: self.layer,
            tiles,
        }
    }
}

/// Runs tile searches off the simulation thread. Results are only observed through
/// [`PathWorkerPool::poll_completed`], so they always land at a tick boundary.
/// With zero threads, jobs run inline on submit and are still delivered on the next poll.
pub struct PathWorkerPool {
    job_tx: Option<Sender<PathJob>>,
    result_tx: Sender<PathOutcome>,
    result_rx: Receiver<PathOutcome>,
    workers: Vec<JoinHandle<()>>,
    in_flight: usize,
}

impl PathWorkerPool {
    pub fn new(threads: usize) -> Self {
        let (result_tx, result_rx) = crossbeam_channel::unbounded::<PathOutcome>();
        if threads == 0 {
            return Self::inline(result_tx, result_rx);
        }

        let (job_tx, job_rx) = crossbeam_channel::unbounded::<PathJob>();
        let mut workers = Vec::with_capacity(threads);
        for index in 0..threads {
            let job_rx = job_rx.clone();
            let result_tx = result_tx.clone();
            let spawned = thread::Builder::new()
                .name(format!("path-worker-{index}"))
                .spawn(move || worker_loop(job_rx, result_tx));
            match spawned {
                Ok(handle) => workers.push(handle),
                Err(error) => {
                    warn!(worker = index, error = %error, "path_worker_spawn_failed");
                    break;
                }
            }
        }

        if workers.is_empty() {
            return Self::inline(result_tx, result_rx);
        }
        debug!(threads = workers.len(), "path_worker_pool_started");
        Self {
            job_tx: Some(job_tx),
            result_tx,
            result_rx,
            workers,
            in_flight: 0,
        }
    }

    fn inline(result_tx: Sender<PathOutcome>, result_rx: Receiver<PathOutcome>) -> Self {
        Self {
            job_tx: None,
            result_tx,
            result_rx,
            workers: Vec::new(),
            in_flight: 0,
        }
    }

    pub fn thread_count(&self) -> usize {
        self.workers.len()
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight
    }

    pub fn submit(&mut self, job: PathJob) {
        self.in_flight = self.in_flight.saturating_add(1);
        let job = match &self.job_tx {
            Some(job_tx) => match job_tx.send(job) {
                Ok(()) => return,
                // Every worker is gone; fall through and run it here.
                Err(error) => error.into_inner(),
            },
            None => job,
        };
        let _ = self.result_tx.send(job.run());
    }

    /// Drains every result that has finished so far, without blocking.
    pub fn poll_completed(&mut self) -> Vec<PathOutcome> {
        let completed = self.result_rx.try_iter().collect::<Vec<_>>();
        self.in_flight = self.in_flight.saturating_sub(completed.len());
        completed
    }

    /// Blocks until every submitted job has reported back. Used by tests and shutdown.
    pub fn wait_idle(&mut self) -> Vec<PathOutcome> {
        let mut completed = Vec::new();
        while self.in_flight > 0 {
            match self.result_rx.recv() {
                Ok(outcome) => {
                    self.in_flight -= 1;
                    completed.push(outcome);
                }
                Err(_) => break,
            }
        }
        completed
    }
}

impl Drop for PathWorkerPool {
    fn drop(&mut self) {
        self.job_tx.take();
        for handle in self.workers.drain(..) {
            if handle.join().is_err() {
                warn!("path_worker_panicked");
            }
        }
    }
}

fn worker_loop(job_rx: Receiver<PathJob>, result_tx: Sender<PathOutcome>) {
    while let Ok(job) = job_rx.recv() {
        if result_tx.send(job.run()).is_err() {
            break;
        }
    }
}
