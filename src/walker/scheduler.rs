//! Traversal scheduler - turns root targets into a complete file count
//!
//! The scheduler owns the bounded queues, the outstanding-job counter, and
//! the unbounded overflow buffer. Its loop never blocks on a send: a
//! discovered job that does not fit in the input queue is parked in the
//! overflow buffer, and one parked job is given another chance each time a
//! job completes. Workers therefore can always make progress pushing
//! discoveries, and the pool cannot deadlock on full queues.
//!
//! Termination detection needs no lock: the counter and the overflow buffer
//! are confined to the scheduler's own thread, and the traversal is done
//! exactly when no accepted job is outstanding (overflow entries are not
//! outstanding - they are re-counted when dispatched).

use crate::config::TallyConfig;
use crate::error::{DirError, Result, WorkerError};
use crate::walker::queue::{job_queue, DirJob, JobQueue, WorkerEvent};
use crate::walker::worker::Worker;
use crossbeam_channel::{unbounded, Receiver};
use std::collections::VecDeque;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Schedules one full traversal over a fixed worker pool
pub struct Scheduler {
    queue: JobQueue,
    workers: Vec<Worker>,
    results_rx: Receiver<u64>,
}

impl Scheduler {
    /// Create the queues and spawn the worker pool.
    ///
    /// Queue capacity follows the branching-factor heuristic
    /// `3 * hint / workers`; a result of zero degrades to rendezvous
    /// channels, which keeps the non-blocking dispatch semantics intact.
    pub fn new(config: Arc<TallyConfig>) -> Result<Self> {
        let capacity = 3 * config.hint / config.workers;
        let (queue, source, sink) = job_queue(capacity);
        let (results_tx, results_rx) = unbounded();

        let mut workers = Vec::with_capacity(config.workers);
        for id in 0..config.workers {
            workers.push(Worker::spawn(
                id,
                Arc::clone(&config),
                source.clone(),
                sink.clone(),
                results_tx.clone(),
            )?);
        }
        // the scheduler must not hold worker-side endpoints, or worker
        // death could never be observed as a disconnect
        drop(source);
        drop(sink);
        drop(results_tx);

        debug!(
            workers = workers.len(),
            capacity, "worker pool started"
        );

        Ok(Self {
            queue,
            workers,
            results_rx,
        })
    }

    /// Shared queue counters, usable after `run` via a retained clone
    pub fn stats(&self) -> Arc<crate::walker::queue::QueueStats> {
        self.queue.stats()
    }

    /// Run the traversal over the given root targets and return the total
    /// regular-file count.
    ///
    /// On a non-tolerated worker error the pool is drained and shut down,
    /// and the first error is returned; no partial count is reported.
    pub fn run(mut self, targets: &[String]) -> Result<u64> {
        let mut outstanding = 0usize;
        for target in targets {
            self.queue.dispatch(DirJob::root(target))?;
            outstanding += 1;
        }

        let mut overflow: VecDeque<DirJob> = VecDeque::new();
        let mut failure: Option<DirError> = None;

        while outstanding != 0 {
            let mut candidate = None;

            match self.queue.recv_event()? {
                WorkerEvent::Completed => {
                    outstanding -= 1;
                    // load reduced: give one parked job a chance to run
                    candidate = overflow.pop_front();
                }
                WorkerEvent::Failed(err) => {
                    outstanding -= 1;
                    if failure.is_none() {
                        warn!(error = %err, "aborting traversal");
                        failure = Some(err);
                    }
                    overflow.clear();
                }
                WorkerEvent::Discovered(job) => {
                    candidate = Some(job);
                }
            }

            if failure.is_some() {
                // draining: drop candidates, let outstanding reach zero
                continue;
            }

            if let Some(job) = candidate {
                match self.queue.try_dispatch(job)? {
                    None => outstanding += 1,
                    Some(job) => overflow.push_back(job),
                }
            }
        }

        let stats = self.queue.stats();
        debug!(
            dispatched = stats.dispatched_count(),
            completed = stats.completed_count(),
            overflowed = stats.overflow_count(),
            "traversal drained"
        );

        // harvest: one sentinel and one count per worker
        let mut total = 0u64;
        for _ in 0..self.workers.len() {
            self.queue.send_shutdown()?;
            total += self
                .results_rx
                .recv()
                .map_err(|_| WorkerError::ResultChannelClosed)?;
        }

        for worker in std::mem::take(&mut self.workers) {
            worker.join()?;
        }

        if let Some(err) = failure {
            return Err(err.into());
        }

        info!(files = total, roots = targets.len(), "traversal complete");
        Ok(total)
    }
}
