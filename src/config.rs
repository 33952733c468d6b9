//! Configuration types for dirtally
//!
//! This module defines:
//! - CLI argument parsing using clap derive macros
//! - The validated, immutable runtime configuration shared by the
//!   dispatcher and every worker
//!
//! All validation happens once in [`TallyConfig::from_args`], before any
//! worker is launched; in particular an invalid exclusion pattern is
//! rejected here and never reaches a traversal.

use crate::error::ConfigError;
use clap::Parser;
use globset::{GlobBuilder, GlobMatcher};
use std::path::PathBuf;

/// Maximum reasonable worker count
const MAX_WORKERS: usize = 512;

/// Fast concurrent tunable file counter
#[derive(Parser, Debug, Clone)]
#[command(
    name = "dirtally",
    version,
    about = "Fast concurrent tunable file counter",
    long_about = "Repeatedly counts the regular files under one or more directory trees\n\
                  using a fixed pool of worker threads over raw kernel directory listings.\n\n\
                  Every --scan seconds a fresh full traversal starts; each result is printed\n\
                  as one line, highlighted every --hili seconds, and optionally appended to a\n\
                  JSON log that later runs can continue from.",
    after_help = "EXAMPLES:\n    \
        dirtally /srv/data\n    \
        dirtally -w 8 --hint 1000 /srv/data /srv/archive\n    \
        dirtally --filter '*.tmp' --filter-files --fuzzy /srv/spool\n    \
        dirtally --logf scan.json --logcont /srv/data -- nightly run"
)]
pub struct CliArgs {
    /// Directories to count under (defaults to the current directory)
    #[arg(value_name = "TARGET")]
    pub targets: Vec<String>,

    /// Free-form message recorded in the scan log
    #[arg(last = true, value_name = "MESSAGE")]
    pub message: Vec<String>,

    /// Directory branchiness hint (average number of entries per directory)
    #[arg(long, default_value = "256", value_name = "NUM")]
    pub hint: usize,

    /// Number of worker threads
    #[arg(
        short = 'w',
        long,
        default_value_t = default_workers(),
        value_name = "NUM"
    )]
    pub workers: usize,

    /// Glob pattern to exclude, matched relative to each target; matching
    /// directories are not entered
    #[arg(long, value_name = "PATTERN")]
    pub filter: Option<String>,

    /// Apply --filter to file counting, too
    #[arg(long)]
    pub filter_files: bool,

    /// Salvage missing entry type information by falling back to lstat
    #[arg(long)]
    pub stat: bool,

    /// Tolerate filesystem fuzziness (errors due to ongoing changes)
    #[arg(long)]
    pub fuzzy: bool,

    /// Seconds between scans
    #[arg(long, default_value = "10", value_name = "SECS")]
    pub scan: u64,

    /// Seconds between highlighted scan results
    #[arg(long, default_value = "20", value_name = "SECS")]
    pub hili: u64,

    /// Number of scan turns (0 or less means run until interrupted)
    #[arg(long, default_value = "0", value_name = "NUM")]
    pub turns: i64,

    /// Stop once a scan reaches this many files (0 or less means no limit)
    #[arg(long, default_value = "0", value_name = "NUM")]
    pub flimit: i64,

    /// JSON log file for scan records
    #[arg(long, value_name = "FILE")]
    pub logf: Option<PathBuf>,

    /// Append to a previously existing log file
    #[arg(long)]
    pub logappend: bool,

    /// Continue turn numbering relative to an earlier log (implies
    /// --logappend)
    #[arg(long)]
    pub logcont: bool,

    /// Verbose output
    #[arg(short = 'v', long)]
    pub verbose: bool,
}

fn default_workers() -> usize {
    // traversal is I/O bound; one extra worker keeps the pool busy while
    // another blocks in a syscall
    num_cpus::get() + 1
}

/// Validated runtime configuration, immutable after construction
#[derive(Debug, Clone)]
pub struct TallyConfig {
    /// Number of worker threads
    pub workers: usize,

    /// Directory branchiness hint; sizes queues and entry vectors
    pub hint: usize,

    /// Tolerate vanished-entry races instead of aborting
    pub fuzzy: bool,

    /// Resolve Unknown entry kinds via lstat
    pub stat_fallback: bool,

    /// Compiled exclusion pattern
    pub filter: Option<GlobMatcher>,

    /// Apply the exclusion pattern to files as well as directories
    pub filter_files: bool,

    /// Cleaned root targets
    pub targets: Vec<String>,

    /// Seconds between scan turns
    pub scan_interval: u64,

    /// Seconds between highlighted results
    pub hili_interval: u64,

    /// Number of turns to run (<= 0 means unlimited)
    pub turns: i64,

    /// Stop once a turn counts at least this many files (<= 0 means no
    /// limit)
    pub file_limit: i64,

    /// Scan log path
    pub log_file: Option<PathBuf>,

    /// Append to an existing log instead of truncating
    pub log_append: bool,

    /// Recover the turn offset from an existing log (implies append)
    pub log_cont: bool,

    /// Free-form message recorded in the scan log
    pub message: Option<String>,
}

impl TallyConfig {
    /// Create and validate configuration from CLI arguments
    pub fn from_args(args: CliArgs) -> Result<Self, ConfigError> {
        if args.workers == 0 || args.workers > MAX_WORKERS {
            return Err(ConfigError::InvalidWorkerCount {
                count: args.workers,
                max: MAX_WORKERS,
            });
        }

        for seconds in [args.scan, args.hili] {
            if seconds == 0 {
                return Err(ConfigError::InvalidInterval { seconds });
            }
        }

        // compile the pattern once, before any traversal starts
        let filter = args
            .filter
            .as_deref()
            .filter(|p| !p.is_empty())
            .map(|p| {
                GlobBuilder::new(p)
                    .literal_separator(true)
                    .build()
                    .map(|g| g.compile_matcher())
                    .map_err(|e| ConfigError::InvalidPattern {
                        pattern: p.to_string(),
                        reason: e.to_string(),
                    })
            })
            .transpose()?;

        let mut targets: Vec<String> = args.targets.iter().map(|t| clean_path(t)).collect();
        if targets.is_empty() {
            targets.push(".".to_string());
        }

        let message = if args.message.is_empty() {
            None
        } else {
            Some(args.message.join(" "))
        };

        Ok(Self {
            workers: args.workers,
            hint: args.hint,
            fuzzy: args.fuzzy,
            stat_fallback: args.stat,
            filter,
            filter_files: args.filter_files,
            targets,
            scan_interval: args.scan,
            hili_interval: args.hili,
            turns: args.turns,
            file_limit: args.flimit,
            log_file: args.logf,
            log_append: args.logappend,
            log_cont: args.logcont,
            message,
        })
    }

    /// Check a root-relative path against the exclusion pattern
    pub fn matches_filter(&self, relative: &str) -> bool {
        self.filter.as_ref().is_some_and(|m| m.is_match(relative))
    }

    /// Whether regular files are subject to the exclusion pattern
    pub fn filters_files(&self) -> bool {
        self.filter.is_some() && self.filter_files
    }

    #[cfg(test)]
    pub(crate) fn for_tests(workers: usize, hint: usize, fuzzy: bool) -> Self {
        Self {
            workers,
            hint,
            fuzzy,
            stat_fallback: false,
            filter: None,
            filter_files: false,
            targets: Vec::new(),
            scan_interval: 10,
            hili_interval: 20,
            turns: 1,
            file_limit: 0,
            log_file: None,
            log_append: false,
            log_cont: false,
            message: None,
        }
    }
}

/// Strip trailing separators so the exclusion prefix lands directly after
/// the root path
fn clean_path(path: &str) -> String {
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() {
        "/".to_string()
    } else {
        trimmed.to_string()
    }
}
