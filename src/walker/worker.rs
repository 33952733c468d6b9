//! Worker thread logic for the traversal pool
//!
//! Each worker:
//! - Blocks on the input queue until a job or the shutdown sentinel arrives
//! - Lists one directory per job through the raw dirent reader
//! - Counts regular files into a worker-local total
//! - Emits discovered subdirectories on the event queue
//! - Emits exactly one completion (or failure) event per job
//! - On shutdown, reports its accumulated total on the result channel and
//!   exits

use crate::config::TallyConfig;
use crate::dirent::{kind_of, read_dir_all, EntryKind};
use crate::error::{DirError, WorkerError};
use crate::walker::queue::{DirJob, EventSink, JobSource, WorkerInput};
use crossbeam_channel::Sender;
use std::fs::File;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{debug, error, trace, warn};

/// A worker thread that processes traversal jobs
pub struct Worker {
    id: usize,
    handle: Option<JoinHandle<()>>,
}

impl Worker {
    /// Spawn a new worker thread
    pub fn spawn(
        id: usize,
        config: Arc<TallyConfig>,
        jobs: JobSource,
        events: EventSink,
        results: Sender<u64>,
    ) -> Result<Self, WorkerError> {
        let handle = thread::Builder::new()
            .name(format!("tally-{id}"))
            .spawn(move || worker_loop(id, &config, &jobs, &events, &results))
            .map_err(|e| WorkerError::SpawnFailed {
                id,
                reason: e.to_string(),
            })?;

        Ok(Self {
            id,
            handle: Some(handle),
        })
    }

    /// Worker ID
    pub fn id(&self) -> usize {
        self.id
    }

    /// Wait for the worker thread to finish
    pub fn join(mut self) -> Result<(), WorkerError> {
        match self.handle.take() {
            Some(handle) => handle
                .join()
                .map_err(|_| WorkerError::Panicked { id: self.id }),
            None => Ok(()),
        }
    }
}

/// Main worker loop: waiting and processing states, terminal on the
/// shutdown sentinel
fn worker_loop(
    id: usize,
    config: &TallyConfig,
    jobs: &JobSource,
    events: &EventSink,
    results: &Sender<u64>,
) {
    debug!(worker = id, "worker starting");
    let mut count = 0u64;

    loop {
        match jobs.recv() {
            Some(WorkerInput::Job(job)) => {
                trace!(worker = id, path = %job.path, "processing directory");
                match process_job(id, &job, config, events) {
                    Ok(files) => {
                        count += files;
                        if events.completed().is_err() {
                            break;
                        }
                    }
                    Err(err) => {
                        // the dispatcher decides to abort the pool; this
                        // worker keeps draining until the sentinel arrives
                        if events.failed(err).is_err() {
                            break;
                        }
                    }
                }
            }
            Some(WorkerInput::Shutdown) | None => break,
        }
    }

    let _ = results.send(count);
    debug!(worker = id, files = count, "worker stopped");
}

/// Process one directory job, returning its regular-file contribution.
///
/// Tolerated races (vanished or retyped targets under fuzzy tolerance)
/// contribute zero with a warning; everything else is returned as a fatal
/// error for the dispatcher to act on.
fn process_job(
    id: usize,
    job: &DirJob,
    config: &TallyConfig,
    events: &EventSink,
) -> Result<u64, DirError> {
    let handle = match File::open(&job.path) {
        Ok(f) => f,
        Err(source) => {
            let err = DirError::Open {
                path: job.path.clone(),
                source,
            };
            if config.fuzzy && err.is_vanished() {
                warn!(worker = id, path = %job.path, error = %err, "directory vanished");
                return Ok(0);
            }
            return Err(err);
        }
    };

    let entries = match read_dir_all(&handle, config.hint) {
        Ok(entries) => entries,
        Err(source) => {
            let err = DirError::List {
                path: job.path.clone(),
                source,
            };
            // the path may also have been replaced by a non-directory
            // between discovery and listing
            if config.fuzzy && (err.is_vanished() || err.is_not_dir()) {
                warn!(worker = id, path = %job.path, error = %err, "directory changed under scan");
                return Ok(0);
            }
            return Err(err);
        }
    };
    drop(handle);

    let mut files = 0u64;
    for entry in entries {
        let mut kind = entry.kind;

        if kind == EntryKind::Unknown && config.stat_fallback {
            let child_path = format!("{}/{}", job.path, entry.name);
            match kind_of(&child_path) {
                Ok(resolved) => kind = resolved,
                Err(source) => {
                    let err = DirError::Stat {
                        path: child_path,
                        source,
                    };
                    if config.fuzzy && err.is_vanished() {
                        warn!(worker = id, path = err.path(), error = %err, "entry vanished before stat");
                        continue;
                    }
                    return Err(err);
                }
            }
        }

        match kind {
            EntryKind::Unknown => {
                return Err(DirError::UnknownKind {
                    path: job.child(&entry.name).path,
                });
            }
            EntryKind::Regular => {
                if config.filters_files() {
                    let child = job.child(&entry.name);
                    if config.matches_filter(child.relative()) {
                        trace!(worker = id, path = %child.path, "file excluded");
                        continue;
                    }
                }
                files += 1;
            }
            EntryKind::Directory => {
                let child = job.child(&entry.name);
                if config.matches_filter(child.relative()) {
                    trace!(worker = id, path = %child.path, "directory excluded");
                    continue;
                }
                if events.discovered(child).is_err() {
                    // dispatcher is gone; the run is already being torn down
                    error!(worker = id, "event queue closed during traversal");
                    return Ok(files);
                }
            }
            // pipes, devices, links, sockets: not counted, not entered
            _ => {}
        }
    }

    Ok(files)
}
