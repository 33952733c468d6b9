//! dirdump - one-shot raw listing of a single directory
//!
//! Prints `KIND INO NAME` for every entry, straight from the decoded
//! dirent records. The debugging companion to dirtally.

use anyhow::{Context, Result};
use dirtally::dirent::read_dir_all;
use std::fs::File;

fn main() -> Result<()> {
    let path = std::env::args()
        .nth(1)
        .context("usage: dirdump DIRECTORY")?;

    let handle = File::open(&path).with_context(|| format!("cannot open '{path}'"))?;
    let entries = read_dir_all(&handle, 0)
        .with_context(|| format!("cannot list '{path}'"))?;

    for entry in entries {
        println!("{} {} {}", entry.kind.label(), entry.ino, entry.name);
    }

    Ok(())
}
