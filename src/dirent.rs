//! Raw directory entry decoding and reading
//!
//! This module reads directories below the level of `std::fs::read_dir`:
//! a fixed buffer is filled with raw `linux_dirent64` records via the
//! `getdents64` syscall and decoded into typed [`DirEntry`] values. Working
//! at this level gives us the entry type byte straight from the kernel, so
//! most traversals never need a per-entry stat.
//!
//! Decoding is pure (no I/O) and operates on plain byte buffers, which keeps
//! it testable with synthetic record streams.

use std::ffi::CString;
use std::fs::File;
use std::io;
use std::os::unix::io::AsRawFd;
use thiserror::Error;

/// Size of the I/O buffer used per directory listing
const DIRENT_BUF_LEN: usize = 4096;

/// Byte offset of the NUL-terminated name field inside a `linux_dirent64`
/// record: d_ino (8) + d_off (8) + d_reclen (2) + d_type (1)
const DIRENT_NAME_OFFSET: usize = 19;

/// Default capacity hint when the caller provides none
const DEFAULT_HINT: usize = 100;

/// BSD whiteout entry; not defined by libc on Linux but representable in the
/// dirent type field
const DT_WHT: u8 = 14;

/// Classification of a directory entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum EntryKind {
    /// Filesystem did not report a type; resolve via lstat if needed
    Unknown = 0,
    /// Named pipe (FIFO)
    Fifo = 1,
    /// Character device
    CharDevice = 2,
    /// Directory
    Directory = 4,
    /// Block device
    BlockDevice = 6,
    /// Regular file
    Regular = 8,
    /// Symbolic link
    Symlink = 10,
    /// Unix socket
    Socket = 12,
    /// Whiteout entry
    Whiteout = 14,
}

impl EntryKind {
    /// Convert from the `d_type` byte of a raw dirent record
    pub fn from_dirent_type(value: u8) -> Self {
        match value {
            libc::DT_FIFO => EntryKind::Fifo,
            libc::DT_CHR => EntryKind::CharDevice,
            libc::DT_DIR => EntryKind::Directory,
            libc::DT_BLK => EntryKind::BlockDevice,
            libc::DT_REG => EntryKind::Regular,
            libc::DT_LNK => EntryKind::Symlink,
            libc::DT_SOCK => EntryKind::Socket,
            DT_WHT => EntryKind::Whiteout,
            _ => EntryKind::Unknown,
        }
    }

    /// Convert from stat mode bits; the file type lives in bits 12..16 and
    /// uses the same numbering as the dirent type byte
    pub fn from_mode(mode: libc::mode_t) -> Self {
        Self::from_dirent_type(((mode >> 12) & 0o17) as u8)
    }

    /// Check if this is a regular file
    pub fn is_regular(&self) -> bool {
        *self == EntryKind::Regular
    }

    /// Check if this is a directory
    pub fn is_dir(&self) -> bool {
        *self == EntryKind::Directory
    }

    /// Short display label
    pub fn label(&self) -> &'static str {
        match self {
            EntryKind::Unknown => "UNKNOWN",
            EntryKind::Fifo => "FIFO",
            EntryKind::CharDevice => "CHR",
            EntryKind::Directory => "DIR",
            EntryKind::BlockDevice => "BLK",
            EntryKind::Regular => "REG",
            EntryKind::Symlink => "LNK",
            EntryKind::Socket => "SOCK",
            EntryKind::Whiteout => "WHT",
        }
    }
}

/// A decoded directory entry
///
/// `name` is never `"."` or `".."`; records with inode 0 (removed in place)
/// are dropped during decoding and never surfaced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    /// Filesystem inode number
    pub ino: u64,

    /// Entry classification from the kernel record
    pub kind: EntryKind,

    /// Entry name, relative to the containing directory
    pub name: String,
}

/// Error from the raw directory read, carrying the entries decoded before
/// the failure so the caller can decide whether to use them
#[derive(Error, Debug)]
#[error("readdirent: {source}")]
pub struct ReadDirError {
    #[source]
    pub source: io::Error,

    /// Entries accumulated before the failing refill
    pub partial: Vec<DirEntry>,
}

/// Decode back-to-back raw `linux_dirent64` records from `buf`.
///
/// Each record self-describes its length; the cursor advances by exactly
/// that length whether the record is kept or dropped, so decoding stays in
/// sync across skipped records. Records with inode 0 and the `.`/`..`
/// entries are dropped. Decoding stops when the buffer is exhausted or after
/// `max` entries have been kept (`None` = unlimited; traversal call sites
/// always pass `None`).
///
/// Returns the number of bytes consumed; kept entries are appended to
/// `entries` in on-disk record order.
pub fn decode_entries(buf: &[u8], max: Option<usize>, entries: &mut Vec<DirEntry>) -> usize {
    let mut pos = 0;
    let mut remaining = max;

    while pos + DIRENT_NAME_OFFSET <= buf.len() {
        if remaining == Some(0) {
            break;
        }
        let rec = &buf[pos..];
        let reclen = u16::from_ne_bytes([rec[16], rec[17]]) as usize;
        if reclen < DIRENT_NAME_OFFSET || reclen > rec.len() {
            // truncated or corrupt record; cannot resync past it
            break;
        }
        pos += reclen;

        let ino = u64::from_ne_bytes(rec[..8].try_into().expect("slice is 8 bytes"));
        if ino == 0 {
            // file removed from the directory after the kernel filled the buffer
            continue;
        }

        // The name field is fixed-size; the name ends at the first NUL.
        let name_field = &rec[DIRENT_NAME_OFFSET..reclen];
        let name_len = name_field
            .iter()
            .position(|&b| b == 0)
            .unwrap_or(name_field.len());
        let name = String::from_utf8_lossy(&name_field[..name_len]).into_owned();
        if name == "." || name == ".." {
            continue;
        }

        if let Some(n) = remaining.as_mut() {
            *n -= 1;
        }
        entries.push(DirEntry {
            ino,
            kind: EntryKind::from_dirent_type(rec[18]),
            name,
        });
    }

    pos
}

/// Raw read-directory-entries operation.
///
/// Returns the number of bytes written into `buf`; 0 means true
/// end-of-directory.
fn getdents64(dir: &File, buf: &mut [u8]) -> io::Result<usize> {
    let n = unsafe {
        libc::syscall(
            libc::SYS_getdents64,
            dir.as_raw_fd(),
            buf.as_mut_ptr() as *mut libc::c_void,
            buf.len(),
        )
    };
    if n < 0 {
        Err(io::Error::last_os_error())
    } else {
        Ok(n as usize)
    }
}

/// Read the complete set of entries from an open directory handle.
///
/// The buffer is refilled until the kernel reports end-of-directory, so the
/// result is never a short read. `hint` pre-sizes the result vector (0 is
/// normalized to a small default); it does not cap the result.
pub fn read_dir_all(dir: &File, hint: usize) -> Result<Vec<DirEntry>, ReadDirError> {
    let hint = if hint == 0 { DEFAULT_HINT } else { hint };
    let mut entries = Vec::with_capacity(hint);
    let mut buf = [0u8; DIRENT_BUF_LEN];
    let mut nbuf = 0usize;
    let mut bufp = 0usize;

    loop {
        // Refill the buffer if necessary
        if bufp >= nbuf {
            bufp = 0;
            match getdents64(dir, &mut buf) {
                Ok(0) => break,
                Ok(n) => nbuf = n,
                Err(source) => {
                    return Err(ReadDirError {
                        source,
                        partial: entries,
                    })
                }
            }
        }

        // Drain the buffer
        let consumed = decode_entries(&buf[bufp..nbuf], None, &mut entries);
        if consumed == 0 {
            // nothing decodable remains in this fill
            bufp = nbuf;
        } else {
            bufp += consumed;
        }
    }

    Ok(entries)
}

/// Resolve the kind of a single path via lstat.
///
/// Used only as the fallback for entries the filesystem reported as
/// [`EntryKind::Unknown`]; symlinks are not followed.
pub fn kind_of(path: &str) -> io::Result<EntryKind> {
    let cpath = CString::new(path)
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "path contains NUL byte"))?;
    let mut st: libc::stat = unsafe { std::mem::zeroed() };
    let rc = unsafe { libc::lstat(cpath.as_ptr(), &mut st) };
    if rc != 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(EntryKind::from_mode(st.st_mode))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::io::Write;
    use tempfile::tempdir;

    /// Build a synthetic linux_dirent64 record with `pad` trailing bytes of
    /// garbage after the name terminator (real records are padded for
    /// alignment).
    fn raw_record(ino: u64, dtype: u8, name: &str, pad: usize) -> Vec<u8> {
        let reclen = DIRENT_NAME_OFFSET + name.len() + 1 + pad;
        let mut rec = Vec::with_capacity(reclen);
        rec.extend_from_slice(&ino.to_ne_bytes());
        rec.extend_from_slice(&0u64.to_ne_bytes()); // d_off, unused here
        rec.extend_from_slice(&(reclen as u16).to_ne_bytes());
        rec.push(dtype);
        rec.extend_from_slice(name.as_bytes());
        rec.push(0);
        // nonzero padding to prove the name scan stops at the first NUL
        rec.resize(reclen, 0xAA);
        rec
    }

    #[test]
    fn test_decode_single_record() {
        let buf = raw_record(42, libc::DT_REG, "hello.txt", 3);
        let mut entries = Vec::new();
        let consumed = decode_entries(&buf, None, &mut entries);

        assert_eq!(consumed, buf.len());
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].ino, 42);
        assert_eq!(entries[0].kind, EntryKind::Regular);
        assert_eq!(entries[0].name, "hello.txt");
    }

    #[test]
    fn test_decode_resync_across_dropped_records() {
        let mut buf = Vec::new();
        buf.extend(raw_record(1, libc::DT_DIR, ".", 0));
        buf.extend(raw_record(2, libc::DT_DIR, "..", 5));
        buf.extend(raw_record(0, libc::DT_REG, "deleted", 2));
        buf.extend(raw_record(7, libc::DT_REG, "kept-a", 0));
        buf.extend(raw_record(0, libc::DT_DIR, "also-deleted", 7));
        buf.extend(raw_record(9, libc::DT_DIR, "kept-b", 4));

        let mut entries = Vec::new();
        let consumed = decode_entries(&buf, None, &mut entries);

        // every record consumed, dropped or not; order preserved
        assert_eq!(consumed, buf.len());
        let names: Vec<&str> = entries.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["kept-a", "kept-b"]);
        assert_eq!(entries[0].ino, 7);
        assert_eq!(entries[1].kind, EntryKind::Directory);
    }

    #[test]
    fn test_decode_max_stops_midway() {
        let rec_a = raw_record(1, libc::DT_REG, "a", 0);
        let rec_b = raw_record(2, libc::DT_REG, "b", 0);
        let mut buf = rec_a.clone();
        buf.extend(&rec_b);

        let mut entries = Vec::new();
        let consumed = decode_entries(&buf, Some(1), &mut entries);

        assert_eq!(consumed, rec_a.len());
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].name, "a");

        // the remainder decodes cleanly from the returned offset
        let consumed = decode_entries(&buf[consumed..], Some(1), &mut entries);
        assert_eq!(consumed, rec_b.len());
        assert_eq!(entries[1].name, "b");
    }

    #[test]
    fn test_decode_dropped_records_do_not_count_against_max() {
        let mut buf = Vec::new();
        buf.extend(raw_record(0, libc::DT_REG, "gone", 0));
        buf.extend(raw_record(1, libc::DT_DIR, ".", 0));
        buf.extend(raw_record(5, libc::DT_REG, "kept", 0));

        let mut entries = Vec::new();
        let consumed = decode_entries(&buf, Some(1), &mut entries);

        assert_eq!(consumed, buf.len());
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].name, "kept");
    }

    #[test]
    fn test_decode_truncated_record_stops() {
        let mut buf = raw_record(3, libc::DT_REG, "ok", 0);
        let full_len = buf.len();
        // a record claiming more bytes than the buffer holds
        buf.extend(raw_record(4, libc::DT_REG, "truncated", 0));
        buf.truncate(full_len + 10);

        let mut entries = Vec::new();
        let consumed = decode_entries(&buf, None, &mut entries);

        assert_eq!(consumed, full_len);
        assert_eq!(entries.len(), 1);
    }

    #[test]
    fn test_kind_conversions() {
        assert_eq!(EntryKind::from_dirent_type(libc::DT_REG), EntryKind::Regular);
        assert_eq!(EntryKind::from_dirent_type(libc::DT_DIR), EntryKind::Directory);
        assert_eq!(EntryKind::from_dirent_type(0), EntryKind::Unknown);
        assert_eq!(EntryKind::from_dirent_type(99), EntryKind::Unknown);
        assert_eq!(EntryKind::from_dirent_type(DT_WHT), EntryKind::Whiteout);

        assert_eq!(EntryKind::from_mode(0o100644), EntryKind::Regular);
        assert_eq!(EntryKind::from_mode(0o040755), EntryKind::Directory);
        assert_eq!(EntryKind::from_mode(0o120777), EntryKind::Symlink);
    }

    #[test]
    fn test_read_dir_all_multiple_refills() {
        let dir = tempdir().unwrap();

        // names long enough that the raw listing cannot fit in one
        // 4096-byte buffer fill
        let mut expected = Vec::new();
        for i in 0..200 {
            let name = format!("file_{i:04}_with_a_reasonably_long_name.dat");
            fs::File::create(dir.path().join(&name)).unwrap();
            expected.push(name);
        }

        let handle = fs::File::open(dir.path()).unwrap();
        let mut entries = read_dir_all(&handle, 0).unwrap();
        entries.sort_by(|a, b| a.name.cmp(&b.name));

        assert_eq!(entries.len(), expected.len());
        expected.sort();
        for (entry, name) in entries.iter().zip(&expected) {
            assert_eq!(&entry.name, name);
            assert_eq!(entry.kind, EntryKind::Regular);
            assert!(entry.ino != 0);
        }
    }

    #[test]
    fn test_read_dir_all_reports_subdirectories() {
        let dir = tempdir().unwrap();
        fs::create_dir(dir.path().join("sub")).unwrap();
        let mut f = fs::File::create(dir.path().join("data.txt")).unwrap();
        f.write_all(b"x").unwrap();

        let handle = fs::File::open(dir.path()).unwrap();
        let entries = read_dir_all(&handle, 10).unwrap();

        assert_eq!(entries.len(), 2);
        let sub = entries.iter().find(|e| e.name == "sub").unwrap();
        let data = entries.iter().find(|e| e.name == "data.txt").unwrap();
        assert!(sub.kind.is_dir());
        assert!(data.kind.is_regular());
    }

    #[test]
    fn test_kind_of_fallback() {
        let dir = tempdir().unwrap();
        fs::File::create(dir.path().join("plain")).unwrap();
        fs::create_dir(dir.path().join("nested")).unwrap();

        let file_path = dir.path().join("plain");
        let dir_path = dir.path().join("nested");
        assert_eq!(
            kind_of(file_path.to_str().unwrap()).unwrap(),
            EntryKind::Regular
        );
        assert_eq!(
            kind_of(dir_path.to_str().unwrap()).unwrap(),
            EntryKind::Directory
        );

        let missing = dir.path().join("missing");
        let err = kind_of(missing.to_str().unwrap()).unwrap_err();
        assert_eq!(err.raw_os_error(), Some(libc::ENOENT));
    }
}
