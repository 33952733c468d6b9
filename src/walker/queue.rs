//! Job values and bounded queues for the traversal pool
//!
//! Two bounded channels connect the dispatcher and the workers: the input
//! queue carries jobs (or a shutdown sentinel) toward the workers, and the
//! event queue carries discovered subdirectories and completion reports
//! back. The dispatcher side only ever sends non-blocking; workers may block
//! on the event queue, which is safe because the dispatcher is always ready
//! to receive.

use crate::error::{DirError, WorkerError};
use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// A directory traversal job
///
/// `prefix` marks how many leading bytes of `path` are excluded when
/// matching exclusion patterns, so patterns always apply relative to the
/// scan root. It is fixed when the root job is created and propagated
/// unchanged to every descendant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirJob {
    /// Absolute (or cwd-relative) directory path
    pub path: String,

    /// Byte length of the root path plus its trailing separator
    pub prefix: usize,
}

impl DirJob {
    /// Create the job for a scan root
    pub fn root(path: &str) -> Self {
        Self {
            prefix: path.len() + 1,
            path: path.to_string(),
        }
    }

    /// Create the job for a child directory, keeping the root prefix
    pub fn child(&self, name: &str) -> Self {
        Self {
            path: format!("{}/{}", self.path, name),
            prefix: self.prefix,
        }
    }

    /// Path relative to the scan root, used for pattern matching.
    ///
    /// Only meaningful on joined children; the root job itself is never
    /// matched against a pattern.
    pub fn relative(&self) -> &str {
        &self.path[self.prefix..]
    }
}

/// Message toward a worker
#[derive(Debug)]
pub enum WorkerInput {
    /// A directory to process
    Job(DirJob),

    /// Pool-wide termination sentinel: report your count and exit
    Shutdown,
}

/// Message from a worker back to the dispatcher
#[derive(Debug)]
pub enum WorkerEvent {
    /// A subdirectory discovered while processing a job
    Discovered(DirJob),

    /// One job finished; its file contribution is in the worker's running
    /// total
    Completed,

    /// One job finished with a non-tolerated error; the pool must abort
    Failed(DirError),
}

/// Counters shared by all queue handles
#[derive(Debug, Default)]
pub struct QueueStats {
    /// Jobs handed to the input queue
    pub dispatched: AtomicU64,

    /// Jobs taken off the input queue by workers
    pub started: AtomicU64,

    /// Completion events received
    pub completed: AtomicU64,

    /// Candidates that found the input queue full
    pub overflowed: AtomicU64,
}

impl QueueStats {
    /// Number of times a candidate was diverted to the overflow buffer
    pub fn overflow_count(&self) -> u64 {
        self.overflowed.load(Ordering::Relaxed)
    }

    /// Number of jobs dispatched into the input queue
    pub fn dispatched_count(&self) -> u64 {
        self.dispatched.load(Ordering::Relaxed)
    }

    /// Number of completion events observed
    pub fn completed_count(&self) -> u64 {
        self.completed.load(Ordering::Relaxed)
    }
}

/// Dispatcher-side endpoints of the two queues
pub struct JobQueue {
    input_tx: Sender<WorkerInput>,
    event_rx: Receiver<WorkerEvent>,
    stats: Arc<QueueStats>,
    capacity: usize,
}

/// Worker-side receiving end of the input queue
#[derive(Clone)]
pub struct JobSource {
    rx: Receiver<WorkerInput>,
    stats: Arc<QueueStats>,
}

/// Worker-side sending end of the event queue
#[derive(Clone)]
pub struct EventSink {
    tx: Sender<WorkerEvent>,
    stats: Arc<QueueStats>,
}

/// Create the queue pair with the given bounded capacity.
///
/// The dispatcher keeps the [`JobQueue`]; each worker gets a clone of the
/// [`JobSource`] and [`EventSink`]. Dropping all sinks (every worker gone)
/// disconnects the event queue, which the dispatcher reports as
/// [`WorkerError::AllWorkersDead`].
pub fn job_queue(capacity: usize) -> (JobQueue, JobSource, EventSink) {
    let (input_tx, input_rx) = bounded(capacity);
    let (event_tx, event_rx) = bounded(capacity);
    let stats = Arc::new(QueueStats::default());

    (
        JobQueue {
            input_tx,
            event_rx,
            stats: Arc::clone(&stats),
            capacity,
        },
        JobSource {
            rx: input_rx,
            stats: Arc::clone(&stats),
        },
        EventSink {
            tx: event_tx,
            stats,
        },
    )
}

impl JobQueue {
    /// Bounded capacity of each queue
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Shared counters
    pub fn stats(&self) -> Arc<QueueStats> {
        Arc::clone(&self.stats)
    }

    /// Non-blocking dispatch.
    ///
    /// Returns `Ok(None)` if the job entered the queue, `Ok(Some(job))`
    /// giving the job back if the queue is full.
    pub fn try_dispatch(&self, job: DirJob) -> Result<Option<DirJob>, WorkerError> {
        match self.input_tx.try_send(WorkerInput::Job(job)) {
            Ok(()) => {
                self.stats.dispatched.fetch_add(1, Ordering::Relaxed);
                Ok(None)
            }
            Err(TrySendError::Full(WorkerInput::Job(job))) => {
                self.stats.overflowed.fetch_add(1, Ordering::Relaxed);
                Ok(Some(job))
            }
            Err(_) => Err(WorkerError::QueueDisconnected),
        }
    }

    /// Blocking dispatch, used only for seeding the root jobs
    pub fn dispatch(&self, job: DirJob) -> Result<(), WorkerError> {
        self.input_tx
            .send(WorkerInput::Job(job))
            .map_err(|_| WorkerError::QueueDisconnected)?;
        self.stats.dispatched.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Send one pool-wide termination sentinel
    pub fn send_shutdown(&self) -> Result<(), WorkerError> {
        self.input_tx
            .send(WorkerInput::Shutdown)
            .map_err(|_| WorkerError::QueueDisconnected)
    }

    /// Receive the next worker event, blocking until one arrives
    pub fn recv_event(&self) -> Result<WorkerEvent, WorkerError> {
        let event = self
            .event_rx
            .recv()
            .map_err(|_| WorkerError::AllWorkersDead)?;
        if matches!(event, WorkerEvent::Completed | WorkerEvent::Failed(_)) {
            self.stats.completed.fetch_add(1, Ordering::Relaxed);
        }
        Ok(event)
    }
}

impl JobSource {
    /// Receive the next input message; `None` means the dispatcher is gone
    pub fn recv(&self) -> Option<WorkerInput> {
        let input = self.rx.recv().ok()?;
        if matches!(input, WorkerInput::Job(_)) {
            self.stats.started.fetch_add(1, Ordering::Relaxed);
        }
        Some(input)
    }
}

impl EventSink {
    /// Report a discovered subdirectory; blocks while the event queue is
    /// full
    pub fn discovered(&self, job: DirJob) -> Result<(), WorkerError> {
        self.tx
            .send(WorkerEvent::Discovered(job))
            .map_err(|_| WorkerError::QueueDisconnected)
    }

    /// Report completion of one job
    pub fn completed(&self) -> Result<(), WorkerError> {
        self.tx
            .send(WorkerEvent::Completed)
            .map_err(|_| WorkerError::QueueDisconnected)
    }

    /// Report a fatal failure of one job
    pub fn failed(&self, error: DirError) -> Result<(), WorkerError> {
        self.tx
            .send(WorkerEvent::Failed(error))
            .map_err(|_| WorkerError::QueueDisconnected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_prefix_propagation() {
        let root = DirJob::root("/data/projects");
        assert_eq!(root.prefix, "/data/projects".len() + 1);

        let child = root.child("src");
        let grandchild = child.child("walker");

        assert_eq!(child.path, "/data/projects/src");
        assert_eq!(grandchild.path, "/data/projects/src/walker");
        assert_eq!(child.prefix, root.prefix);
        assert_eq!(grandchild.prefix, root.prefix);
        assert_eq!(child.relative(), "src");
        assert_eq!(grandchild.relative(), "src/walker");
    }

    #[test]
    fn test_try_dispatch_backpressure() {
        let (queue, _source, _sink) = job_queue(2);

        assert!(queue.try_dispatch(DirJob::root("/a")).unwrap().is_none());
        assert!(queue.try_dispatch(DirJob::root("/b")).unwrap().is_none());

        // full queue gives the job back instead of blocking
        let bounced = queue.try_dispatch(DirJob::root("/c")).unwrap();
        assert_eq!(bounced.unwrap().path, "/c");
        assert_eq!(queue.stats().overflow_count(), 1);
        assert_eq!(queue.stats().dispatched_count(), 2);
    }

    #[test]
    fn test_events_round_trip() {
        let (queue, source, sink) = job_queue(4);

        queue.dispatch(DirJob::root("/t")).unwrap();
        match source.recv() {
            Some(WorkerInput::Job(job)) => assert_eq!(job.path, "/t"),
            other => panic!("expected job, got {other:?}"),
        }

        sink.discovered(DirJob::root("/t/sub")).unwrap();
        sink.completed().unwrap();

        assert!(matches!(
            queue.recv_event().unwrap(),
            WorkerEvent::Discovered(_)
        ));
        assert!(matches!(queue.recv_event().unwrap(), WorkerEvent::Completed));
        assert_eq!(queue.stats().completed_count(), 1);
    }

    #[test]
    fn test_event_queue_disconnect_when_workers_gone() {
        let (queue, source, sink) = job_queue(4);
        drop(source);
        drop(sink);

        assert!(matches!(
            queue.recv_event(),
            Err(WorkerError::AllWorkersDead)
        ));
    }

    #[test]
    fn test_shutdown_sentinel() {
        let (queue, source, _sink) = job_queue(1);
        queue.send_shutdown().unwrap();
        assert!(matches!(source.recv(), Some(WorkerInput::Shutdown)));
    }
}
