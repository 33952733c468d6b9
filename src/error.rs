//! Error types for dirtally
//!
//! This module defines the error hierarchy used across the crate:
//! - Directory I/O errors (open, list, stat, classification)
//! - Configuration and CLI errors
//! - Worker pool errors
//!
//! Design philosophy:
//! - Use thiserror for structured error types in library code
//! - A worker never terminates the process; it reports a typed error and the
//!   dispatcher aborts the pool
//! - Tolerable races (entries vanishing mid-scan) are distinguishable from
//!   hard failures via the errno helpers below

use crate::dirent::ReadDirError;
use std::io;
use thiserror::Error;

/// Top-level error type for the dirtally application
#[derive(Error, Debug)]
pub enum TallyError {
    /// Directory traversal errors
    #[error("traversal error: {0}")]
    Dir(#[from] DirError),

    /// Configuration errors
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Worker pool errors
    #[error("worker error: {0}")]
    Worker(#[from] WorkerError),

    /// Scan log serialization errors
    #[error("scan log error: {0}")]
    LogFormat(#[from] serde_json::Error),

    /// I/O errors (log file operations, etc.)
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Errors from operating on a single directory or entry
#[derive(Error, Debug)]
pub enum DirError {
    /// Opening the directory failed
    #[error("failed to open directory '{path}': {source}")]
    Open {
        path: String,
        #[source]
        source: io::Error,
    },

    /// Listing the directory failed partway through
    #[error("failed to list directory '{path}': {source}")]
    List {
        path: String,
        #[source]
        source: ReadDirError,
    },

    /// The lstat fallback for an untyped entry failed
    #[error("failed to stat '{path}': {source}")]
    Stat {
        path: String,
        #[source]
        source: io::Error,
    },

    /// The entry kind could not be determined and no fallback is configured.
    /// Skipping such an entry would silently undercount, so this is fatal.
    #[error("no file type information for '{path}'")]
    UnknownKind { path: String },
}

impl DirError {
    fn raw_errno(&self) -> Option<i32> {
        match self {
            DirError::Open { source, .. } | DirError::Stat { source, .. } => {
                source.raw_os_error()
            }
            DirError::List { source, .. } => source.source.raw_os_error(),
            DirError::UnknownKind { .. } => None,
        }
    }

    /// The target disappeared between discovery and this operation (ENOENT).
    pub fn is_vanished(&self) -> bool {
        self.raw_errno() == Some(libc::ENOENT)
    }

    /// The target stopped being a directory between discovery and listing
    /// (ENOTDIR).
    pub fn is_not_dir(&self) -> bool {
        self.raw_errno() == Some(libc::ENOTDIR)
    }

    /// Path the failed operation was applied to
    pub fn path(&self) -> &str {
        match self {
            DirError::Open { path, .. }
            | DirError::List { path, .. }
            | DirError::Stat { path, .. }
            | DirError::UnknownKind { path } => path,
        }
    }
}

/// Configuration and CLI errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Invalid worker count
    #[error("invalid worker count {count}: must be between 1 and {max}")]
    InvalidWorkerCount { count: usize, max: usize },

    /// Invalid exclusion pattern, rejected before any traversal starts
    #[error("invalid exclusion pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },

    /// Invalid scan interval
    #[error("invalid interval {seconds}: must be at least 1 second")]
    InvalidInterval { seconds: u64 },
}

/// Worker pool errors
#[derive(Error, Debug)]
pub enum WorkerError {
    /// Worker thread could not be spawned
    #[error("failed to spawn worker {id}: {reason}")]
    SpawnFailed { id: usize, reason: String },

    /// Worker panicked
    #[error("worker {id} panicked")]
    Panicked { id: usize },

    /// Event channel disconnected while jobs were outstanding
    #[error("all workers have terminated unexpectedly")]
    AllWorkersDead,

    /// Result channel closed before every worker reported its count
    #[error("result channel closed before all workers reported")]
    ResultChannelClosed,

    /// Job queue disconnected
    #[error("job queue disconnected")]
    QueueDisconnected,
}

/// Result type alias for TallyError
pub type Result<T> = std::result::Result<T, TallyError>;
