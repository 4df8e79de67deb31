//! File table module - handles, entries and the fixed-capacity table.
//!
//! The table maps each file handle (slot index) to the object that holds the
//! file's bytes, plus its cursor, size and open flag. It is persisted as a
//! single object by [`crate::codec::TableCodec`].

mod entry;
mod file_table;

pub use entry::{validate_path, FileHandle, FileStat, FileTableEntry, MAX_PATH_LENGTH};
pub use file_table::{FileTable, MAX_TABLE_CAPACITY, MAX_TOTAL_FILES};
