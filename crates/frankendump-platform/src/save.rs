//! Save-container seam.
//!
//! The platform stores certificates inside an encrypted save container with
//! its own allocation-table filesystem. That reader is an external
//! collaborator; the dumping cores only need "open container, look a path
//! up, read its bytes". These traits pin that surface down. Containers are
//! opened read-only and closed by dropping the handle.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SaveError {
    /// The container itself could not be opened.
    #[error("save container {0:?} is unavailable")]
    ContainerUnavailable(String),
    /// No file entry exists at the given path inside the container.
    #[error("no file entry at {0:?}")]
    EntryNotFound(String),
    /// A read was issued past the end of the entry.
    #[error("read at offset {offset:#x} exceeds entry size {size:#x}")]
    OutOfBounds { offset: u64, size: u64 },
    /// The underlying storage failed mid-read.
    #[error("save storage i/o failure: {0}")]
    Io(String),
}

/// A resolved file entry inside an open container.
#[derive(Debug, Clone)]
pub struct SaveEntry {
    /// Path the entry was resolved from, kept for logging context.
    pub path: String,
    /// File size in bytes.
    pub size: u64,
}

/// An open, read-only save container.
pub trait SaveContainer {
    /// Resolve `path` to a file entry, surfacing its size.
    fn lookup(&self, path: &str) -> Result<SaveEntry, SaveError>;

    /// Read from `entry` starting at `offset`, filling as much of `buf` as
    /// the entry allows. Returns the number of bytes read.
    fn read(&self, entry: &SaveEntry, offset: u64, buf: &mut [u8]) -> Result<usize, SaveError>;
}

/// Access to the platform's save containers by mount path.
pub trait SaveStore {
    fn open(&self, container: &str) -> Result<Box<dyn SaveContainer + '_>, SaveError>;
}
