//! Scratch-file helpers for the demo CLI and integration tests.
//!
//! The engine itself never opens a file: callers own the file descriptor
//! (see [`crate::sort`]). These helpers exist so the CLI and tests don't
//! each reinvent "create a file sized for N pages".

use std::fs::{File, OpenOptions};
use std::io;
use std::path::Path;

/// Creates (or truncates) a file at `path` and pre-extends it to `len` bytes.
///
/// Pre-extending avoids short writes landing on sparse regions during
/// development and gives early feedback if the filesystem is out of space.
pub fn create_sized(path: &Path, len: u64) -> io::Result<File> {
    let file = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(true)
        .open(path)?;
    file.set_len(len)?;
    Ok(file)
}

/// Opens an existing file for read/write without truncating it.
pub fn open_existing(path: &Path) -> io::Result<File> {
    OpenOptions::new().read(true).write(true).open(path)
}
