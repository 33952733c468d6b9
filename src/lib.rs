//! dirtally - Fast Concurrent Tunable File Counter
//!
//! Repeatedly counts the regular files under one or more directory trees.
//! Directories are listed at the `getdents64` level, so the kernel's entry
//! type byte usually makes per-entry stat calls unnecessary, and the
//! traversal is spread over a fixed pool of worker threads.
//!
//! # Features
//!
//! - **Raw directory listing**: entries are decoded straight from kernel
//!   `linux_dirent64` records, one 4096-byte buffer at a time.
//!
//! - **Bounded concurrency**: a fixed worker pool and bounded queues; when
//!   the job queue fills, discovered directories park in an overflow buffer
//!   owned by the scheduler, so nothing ever blocks the dispatch loop.
//!
//! - **Fuzzy tolerance**: directories that vanish or change type while the
//!   scan is running can be tolerated as warnings instead of failures.
//!
//! - **Periodic scans**: a scan turn runs every few seconds, printing one
//!   result line per turn and optionally appending JSON records to a log
//!   that later runs can continue from.
//!
//! # Example
//!
//! ```bash
//! # count files under /srv/data every 10 seconds
//! dirtally /srv/data
//!
//! # one shot, 8 workers, excluding temp files from the count
//! dirtally --turns 1 -w 8 --filter '*.tmp' --filter-files /srv/data
//! ```

pub mod config;
pub mod dirent;
pub mod error;
pub mod scan;
pub mod walker;

pub use config::{CliArgs, TallyConfig};
pub use dirent::{DirEntry, EntryKind};
pub use error::{Result, TallyError};
pub use walker::{DirJob, Scheduler};
