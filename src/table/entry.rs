//! File handles and table entries.

use std::fmt;

use crate::error::{CrudError, Result};

/// Maximum filename length on disk, including the terminating NUL.
pub const MAX_PATH_LENGTH: usize = 128;

/// Index into the file table, returned by `open`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FileHandle(u16);

impl FileHandle {
    /// Build a handle from a raw slot index.
    pub const fn from_raw(index: u16) -> Self {
        Self(index)
    }

    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for FileHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One slot of the file table.
///
/// A slot with an empty filename is free.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileTableEntry {
    pub filename: String,
    /// Backing object; `None` until the first write.
    pub object_id: Option<u32>,
    /// Cursor for the next read or write.
    pub position: u32,
    /// Size of the backing object in bytes.
    pub length: u32,
    pub open: bool,
}

impl FileTableEntry {
    /// Fresh, open entry for `filename` with no data.
    pub fn new(filename: &str) -> Self {
        Self {
            filename: filename.to_string(),
            object_id: None,
            position: 0,
            length: 0,
            open: true,
        }
    }

    #[inline]
    pub fn is_free(&self) -> bool {
        self.filename.is_empty()
    }

    /// Snapshot for callers.
    pub fn stat(&self) -> FileStat {
        FileStat {
            filename: self.filename.clone(),
            object_id: self.object_id,
            position: self.position,
            length: self.length,
            open: self.open,
        }
    }
}

/// Read-only view of an entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileStat {
    pub filename: String,
    pub object_id: Option<u32>,
    pub position: u32,
    pub length: u32,
    pub open: bool,
}

/// Check that `path` can be stored in a table record.
pub fn validate_path(path: &str) -> Result<()> {
    if path.is_empty() {
        return Err(CrudError::InvalidPath("empty filename".to_string()));
    }
    if path.len() >= MAX_PATH_LENGTH {
        return Err(CrudError::InvalidPath(format!(
            "filename is {} bytes, limit is {}",
            path.len(),
            MAX_PATH_LENGTH - 1
        )));
    }
    if path.contains('\0') {
        return Err(CrudError::InvalidPath("filename contains NUL".to_string()));
    }
    Ok(())
}
