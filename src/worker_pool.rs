//! Fixed-size worker pool with round-robin dispatch

use crate::{Error, Result};
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread::{self, JoinHandle};
use tracing::warn;

/// Unit of work run on a pool thread.
pub type Job<R> = Box<dyn FnOnce() -> R + Send + 'static>;

struct Worker<R> {
    id: usize,
    jobs: Option<Sender<Job<R>>>,
    results: Receiver<R>,
    handle: Option<JoinHandle<()>>,
}

impl<R: Send + 'static> Worker<R> {
    fn spawn(id: usize) -> Result<Self> {
        let (job_tx, job_rx) = mpsc::channel::<Job<R>>();
        let (result_tx, result_rx) = mpsc::channel::<R>();
        let handle = thread::Builder::new()
            .name(format!("voxseg-worker-{}", id))
            .spawn(move || {
                while let Ok(job) = job_rx.recv() {
                    if result_tx.send(job()).is_err() {
                        break;
                    }
                }
            })
            .map_err(|e| Error::OperationFailed(format!("Failed to spawn worker {}: {}", id, e)))?;
        Ok(Self {
            id,
            jobs: Some(job_tx),
            results: result_rx,
            handle: Some(handle),
        })
    }

    fn dispatch(&self, job: Job<R>) -> Result<()> {
        let sender = self
            .jobs
            .as_ref()
            .ok_or_else(|| Error::WorkerFailed(format!("worker {} is shut down", self.id)))?;
        sender
            .send(job)
            .map_err(|_| Error::WorkerFailed(format!("worker {} is gone", self.id)))
    }

    fn collect(&self) -> Result<R> {
        self.results
            .recv()
            .map_err(|_| Error::WorkerFailed(format!("worker {} died before replying", self.id)))
    }

    fn shutdown(&mut self) {
        self.jobs.take();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl<R> Drop for Worker<R> {
    fn drop(&mut self) {
        self.jobs.take();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

/// Pool of long-lived threads.
///
/// Jobs are assigned round-robin. A worker is never handed a new job while
/// its previous result is still uncollected, and [`WorkerPool::run_all`]
/// returns only after every job has produced a result or failed.
pub struct WorkerPool<R: Send + 'static> {
    workers: Vec<Worker<R>>,
}

impl<R: Send + 'static> WorkerPool<R> {
    pub fn new(size: usize) -> Result<Self> {
        if size == 0 {
            return Err(Error::InvalidParameter(
                "Worker pool needs at least one thread".to_string(),
            ));
        }
        let workers = (0..size).map(Worker::spawn).collect::<Result<Vec<_>>>()?;
        Ok(Self { workers })
    }

    pub fn size(&self) -> usize {
        self.workers.len()
    }

    fn respawn(&mut self, index: usize) {
        let id = self.workers[index].id;
        match Worker::spawn(id) {
            Ok(worker) => {
                let mut old = std::mem::replace(&mut self.workers[index], worker);
                old.shutdown();
            }
            Err(e) => warn!(worker = id, error = %e, "worker could not be respawned"),
        }
    }

    fn collect_from(&mut self, index: usize) -> Result<R> {
        let result = self.workers[index].collect();
        if result.is_err() {
            warn!(worker = self.workers[index].id, "worker died, respawning");
            self.respawn(index);
        }
        result
    }

    /// Run every job and return the results in job order.
    pub fn run_all(&mut self, jobs: Vec<Job<R>>) -> Vec<Result<R>> {
        let count = jobs.len();
        let mut results: Vec<Option<Result<R>>> = (0..count).map(|_| None).collect();
        let mut outstanding: Vec<Option<usize>> = vec![None; self.workers.len()];
        let mut next = 0usize;

        for (index, job) in jobs.into_iter().enumerate() {
            let worker = next;
            next = (next + 1) % self.workers.len();

            if let Some(previous) = outstanding[worker].take() {
                results[previous] = Some(self.collect_from(worker));
            }

            match self.workers[worker].dispatch(job) {
                Ok(()) => outstanding[worker] = Some(index),
                Err(e) => {
                    results[index] = Some(Err(e));
                    self.respawn(worker);
                }
            }
        }

        for worker in 0..self.workers.len() {
            if let Some(previous) = outstanding[worker].take() {
                results[previous] = Some(self.collect_from(worker));
            }
        }

        results
            .into_iter()
            .map(|r| r.unwrap_or_else(|| Err(Error::WorkerFailed("job produced no result".to_string()))))
            .collect()
    }
}
