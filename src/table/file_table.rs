//! Fixed-capacity file table.
//!
//! Slot index is the file handle. Lookup is a linear scan by filename,
//! allocation takes the first free slot.

use super::entry::{validate_path, FileHandle, FileTableEntry};
use crate::error::{CrudError, Result};

/// Number of slots in the persisted table.
pub const MAX_TOTAL_FILES: usize = 1024;

/// Largest table a `FileHandle` can address.
pub const MAX_TABLE_CAPACITY: usize = u16::MAX as usize + 1;

/// The handle → object mapping for one file system.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileTable {
    entries: Vec<FileTableEntry>,
}

impl FileTable {
    /// Table with `MAX_TOTAL_FILES` free slots.
    pub fn new() -> Self {
        Self::with_capacity(MAX_TOTAL_FILES)
    }

    /// Table with `capacity` free slots, capped at `MAX_TABLE_CAPACITY`.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: vec![FileTableEntry::default(); capacity.min(MAX_TABLE_CAPACITY)],
        }
    }

    /// Callers keep `entries` within `MAX_TABLE_CAPACITY`.
    pub(crate) fn from_entries(entries: Vec<FileTableEntry>) -> Self {
        debug_assert!(entries.len() <= MAX_TABLE_CAPACITY);
        Self { entries }
    }

    /// Free every slot.
    pub fn reset(&mut self) {
        self.entries.fill(FileTableEntry::default());
    }

    pub fn capacity(&self) -> usize {
        self.entries.len()
    }

    /// Number of slots holding a file.
    pub fn used(&self) -> usize {
        self.entries.iter().filter(|e| !e.is_free()).count()
    }

    pub fn entries(&self) -> &[FileTableEntry] {
        &self.entries
    }

    /// Find the slot holding `filename`.
    pub fn find(&self, filename: &str) -> Option<FileHandle> {
        if filename.is_empty() {
            return None;
        }
        self.entries
            .iter()
            .position(|e| e.filename == filename)
            .map(|i| FileHandle::from_raw(i as u16))
    }

    /// Open `path`, creating an entry if it does not exist.
    ///
    /// Reopening rewinds the cursor but keeps the data.
    pub fn open(&mut self, path: &str) -> Result<FileHandle> {
        validate_path(path)?;

        if let Some(fh) = self.find(path) {
            let entry = &mut self.entries[fh.index()];
            entry.position = 0;
            entry.open = true;
            return Ok(fh);
        }

        let slot = self
            .entries
            .iter()
            .position(FileTableEntry::is_free)
            .ok_or(CrudError::TableFull(self.entries.len()))?;

        self.entries[slot] = FileTableEntry::new(path);
        Ok(FileHandle::from_raw(slot as u16))
    }

    /// Entry for `fh`, which must name a used slot.
    pub fn get(&self, fh: FileHandle) -> Result<&FileTableEntry> {
        match self.entries.get(fh.index()) {
            Some(entry) if !entry.is_free() => Ok(entry),
            _ => Err(CrudError::InvalidHandle(fh)),
        }
    }

    /// Entry for `fh`, which must be used and open.
    pub fn get_open(&self, fh: FileHandle) -> Result<&FileTableEntry> {
        let entry = self.get(fh)?;
        if !entry.open {
            return Err(CrudError::NotOpen(fh));
        }
        Ok(entry)
    }

    /// Mutable entry for `fh`, which must be used and open.
    pub fn get_open_mut(&mut self, fh: FileHandle) -> Result<&mut FileTableEntry> {
        self.get_open(fh)?;
        Ok(&mut self.entries[fh.index()])
    }
}

impl Default for FileTable {
    fn default() -> Self {
        Self::new()
    }
}
