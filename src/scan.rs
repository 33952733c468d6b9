//! Periodic scanning on top of the traversal pool
//!
//! Each turn runs one full fresh traversal on its own thread and prints a
//! single result line, highlighted at the wider interval. Results are
//! optionally appended to a JSON-lines log; a later run can continue the
//! relative turn numbering from such a log.
//!
//! The runner stops via a shared flag - when the configured number of
//! turns is reached, when a turn hits the file limit, or when a turn fails
//! - never by exiting the process from a scan thread.

use crate::config::TallyConfig;
use crate::error::{Result, TallyError};
use crate::walker::Scheduler;
use chrono::{DateTime, Utc};
use console::style;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Seek, SeekFrom, Write};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::error;

/// One completed scan turn
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanRecord {
    /// Traversal start time
    pub tstart: DateTime<Utc>,

    /// Traversal end time
    pub tend: DateTime<Utc>,

    /// Relative turn index (seconds since the first logged run began)
    pub trel: i64,

    /// Total regular files counted
    pub files: u64,
}

/// Written once when a logged run starts
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanHead {
    pub tstart: DateTime<Utc>,
    pub args: Vec<String>,
}

/// Optional operator note attached to a logged run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanMessage {
    pub tstart: DateTime<Utc>,
    pub message: String,
}

/// JSON-lines scan log
pub struct ScanLog {
    file: File,
}

impl ScanLog {
    /// Open (or create) the log file.
    ///
    /// Without `append` or `cont` the file is truncated. With `cont` the
    /// existing content is scanned first and the returned turn offset
    /// resumes the relative numbering of the previous run; otherwise the
    /// offset is 0.
    pub fn open(path: &Path, append: bool, cont: bool) -> Result<(Self, i64)> {
        let mut options = OpenOptions::new();
        options.read(true).write(true).create(true);
        if !(append || cont) {
            options.truncate(true);
        }
        let mut file = options.open(path)?;

        let mut toff = 0;
        if cont {
            toff = recover_offset(&mut file)?;
        }
        file.seek(SeekFrom::End(0))?;

        Ok((Self { file }, toff))
    }

    /// Append one record as a JSON line
    pub fn write<T: Serialize>(&mut self, record: &T) -> Result<()> {
        let mut line = serde_json::to_vec(record)?;
        line.push(b'\n');
        self.file.write_all(&line)?;
        Ok(())
    }
}

/// Recover the turn offset from an existing log: find the last object that
/// carries a `trel` field (ducktyped - heads and messages do not), and add
/// the seconds elapsed since that turn started.
fn recover_offset(file: &mut File) -> Result<i64> {
    let reader = BufReader::new(&mut *file);
    let mut last: Option<Value> = None;
    for line in reader.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        last = Some(serde_json::from_str(&line)?);
    }

    if let Some(value) = last {
        if value.get("trel").is_some() {
            let record: ScanRecord = serde_json::from_value(value)?;
            return Ok(record.trel + (Utc::now() - record.tstart).num_seconds());
        }
    }
    Ok(0)
}

/// Smallest value above `t` that is a whole multiple of one of `intervals`
pub fn next_tick(t: i64, intervals: &[i64]) -> i64 {
    let mut next = t + intervals[0];
    for &v in intervals {
        let candidate = t - t % v + v;
        if candidate < next {
            next = candidate;
        }
    }
    next
}

/// Print one turn result line
fn print_turn(turn: i64, files: u64, highlight: bool) {
    let line = format!("{turn:>3} {files:>6}");
    if highlight {
        println!("{}", style(line).red().bold());
    } else {
        println!("{line}");
    }
}

/// Drives scan turns until a limit is reached or a turn fails
pub struct ScanRunner {
    config: Arc<TallyConfig>,
    log: Option<Arc<Mutex<ScanLog>>>,
    toff: i64,
    stop: Arc<AtomicBool>,
    failure: Arc<Mutex<Option<TallyError>>>,
}

impl ScanRunner {
    /// Set up the runner: open the scan log if configured, recover the turn
    /// offset, and write the head (and message) records.
    ///
    /// `argv` is recorded verbatim in the head record.
    pub fn new(config: Arc<TallyConfig>, argv: Vec<String>) -> Result<Self> {
        let mut toff = 0;
        let log = match &config.log_file {
            Some(path) => {
                let (mut log, offset) =
                    ScanLog::open(path, config.log_append, config.log_cont)?;
                toff = offset;
                log.write(&ScanHead {
                    tstart: Utc::now(),
                    args: argv,
                })?;
                if let Some(message) = &config.message {
                    log.write(&ScanMessage {
                        tstart: Utc::now(),
                        message: message.clone(),
                    })?;
                }
                Some(Arc::new(Mutex::new(log)))
            }
            None => None,
        };

        Ok(Self {
            config,
            log,
            toff,
            stop: Arc::new(AtomicBool::new(false)),
            failure: Arc::new(Mutex::new(None)),
        })
    }

    /// Run turns until done. Returns the first turn failure, if any.
    pub fn run(self) -> Result<()> {
        let intervals = [
            self.config.scan_interval as i64,
            self.config.hili_interval as i64,
        ];
        let mut turns_left = self.config.turns;
        let mut turn = self.toff;
        let mut handles = Vec::new();

        loop {
            turns_left -= 1;
            let last = turns_left == 0;
            handles.push(self.spawn_turn(turn, last));
            if last {
                break;
            }

            let next = next_tick(turn, &intervals);
            self.sleep_for((next - turn) as u64);
            turn = next;

            // reap finished turns so an unlimited run stays flat
            handles.retain(|h| !h.is_finished());

            if self.stop.load(Ordering::SeqCst) {
                break;
            }
        }

        for handle in handles {
            let _ = handle.join();
        }

        if let Some(err) = self.failure.lock().expect("failure mutex poisoned").take() {
            return Err(err);
        }
        Ok(())
    }

    fn spawn_turn(&self, turn: i64, last: bool) -> JoinHandle<()> {
        let config = Arc::clone(&self.config);
        let log = self.log.clone();
        let stop = Arc::clone(&self.stop);
        let failure = Arc::clone(&self.failure);

        thread::spawn(move || {
            let tstart = Utc::now();
            let outcome =
                Scheduler::new(Arc::clone(&config)).and_then(|s| s.run(&config.targets));
            let tend = Utc::now();

            let files = match outcome {
                Ok(files) => files,
                Err(err) => {
                    error!(turn, error = %err, "scan turn failed");
                    set_failure(&failure, err);
                    stop.store(true, Ordering::SeqCst);
                    return;
                }
            };

            print_turn(turn, files, turn % config.hili_interval as i64 == 0);

            if let Some(log) = &log {
                let record = ScanRecord {
                    tstart,
                    tend,
                    trel: turn,
                    files,
                };
                let written = log.lock().expect("log mutex poisoned").write(&record);
                if let Err(err) = written {
                    error!(error = %err, "failed to write scan record");
                    set_failure(&failure, err);
                    stop.store(true, Ordering::SeqCst);
                    return;
                }
            }

            if last || (config.file_limit > 0 && files >= config.file_limit as u64) {
                stop.store(true, Ordering::SeqCst);
            }
        })
    }

    /// Sleep up to `seconds`, waking early when a turn requests a stop
    fn sleep_for(&self, seconds: u64) {
        let deadline = Instant::now() + Duration::from_secs(seconds);
        while Instant::now() < deadline {
            if self.stop.load(Ordering::SeqCst) {
                return;
            }
            thread::sleep(Duration::from_millis(100));
        }
    }
}

fn set_failure(slot: &Mutex<Option<TallyError>>, err: TallyError) {
    let mut guard = slot.lock().expect("failure mutex poisoned");
    if guard.is_none() {
        *guard = Some(err);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_next_tick_arithmetic() {
        assert_eq!(next_tick(0, &[10, 20]), 10);
        assert_eq!(next_tick(5, &[10, 20]), 10);
        assert_eq!(next_tick(10, &[10, 20]), 20);
        assert_eq!(next_tick(15, &[10, 20]), 20);
        assert_eq!(next_tick(20, &[10, 20]), 30);
        // uneven intervals pick whichever boundary comes first
        assert_eq!(next_tick(0, &[7, 10]), 7);
        assert_eq!(next_tick(7, &[7, 10]), 10);
        assert_eq!(next_tick(10, &[7, 10]), 14);
    }

    #[test]
    fn test_scan_record_shape() {
        let record = ScanRecord {
            tstart: Utc::now(),
            tend: Utc::now(),
            trel: 30,
            files: 1234,
        };
        let value: Value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["trel"], 30);
        assert_eq!(value["files"], 1234);
        assert!(value.get("tstart").is_some());
        assert!(value.get("tend").is_some());
    }

    #[test]
    fn test_log_offset_recovery() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("scan.json");

        {
            let (mut log, toff) = ScanLog::open(&path, false, false).unwrap();
            assert_eq!(toff, 0);
            log.write(&ScanHead {
                tstart: Utc::now(),
                args: vec!["dirtally".into()],
            })
            .unwrap();
            log.write(&ScanRecord {
                tstart: Utc::now(),
                tend: Utc::now(),
                trel: 10,
                files: 5,
            })
            .unwrap();
            log.write(&ScanRecord {
                tstart: Utc::now(),
                tend: Utc::now(),
                trel: 40,
                files: 6,
            })
            .unwrap();
        }

        // the last record started just now, so the recovered offset is its
        // trel plus at most a second of elapsed time
        let (_log, toff) = ScanLog::open(&path, false, true).unwrap();
        assert!((40..=41).contains(&toff), "toff = {toff}");
    }

    #[test]
    fn test_log_offset_ignored_when_last_entry_is_head() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("scan.json");

        {
            let (mut log, _) = ScanLog::open(&path, false, false).unwrap();
            log.write(&ScanRecord {
                tstart: Utc::now(),
                tend: Utc::now(),
                trel: 99,
                files: 1,
            })
            .unwrap();
            log.write(&ScanHead {
                tstart: Utc::now(),
                args: vec![],
            })
            .unwrap();
        }

        let (_log, toff) = ScanLog::open(&path, false, true).unwrap();
        assert_eq!(toff, 0);
    }

    #[test]
    fn test_log_truncates_without_append() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("scan.json");

        {
            let (mut log, _) = ScanLog::open(&path, false, false).unwrap();
            log.write(&ScanHead {
                tstart: Utc::now(),
                args: vec![],
            })
            .unwrap();
        }
        assert!(std::fs::metadata(&path).unwrap().len() > 0);

        let (_log, _) = ScanLog::open(&path, false, false).unwrap();
        assert_eq!(std::fs::metadata(&path).unwrap().len(), 0);

        // append mode keeps existing content
        {
            let (mut log, _) = ScanLog::open(&path, true, false).unwrap();
            log.write(&ScanHead {
                tstart: Utc::now(),
                args: vec![],
            })
            .unwrap();
        }
        let before = std::fs::metadata(&path).unwrap().len();
        let (_log, _) = ScanLog::open(&path, true, false).unwrap();
        assert_eq!(std::fs::metadata(&path).unwrap().len(), before);
    }

    #[test]
    fn test_malformed_log_line_is_an_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("scan.json");
        std::fs::write(&path, "{\"trel\": 5,\n").unwrap();

        assert!(ScanLog::open(&path, false, true).is_err());
    }
}
