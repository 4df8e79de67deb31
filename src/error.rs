//! Error types for crudfs-client.

use std::time::Duration;

use thiserror::Error;

use crate::protocol::Opcode;
use crate::table::FileHandle;

/// Main error type for all file and object-store operations.
#[derive(Debug, Error)]
pub enum CrudError {
    /// The connection to the object store could not be established.
    #[error("Cannot connect to object store at {addr}: {source}")]
    Connection {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    /// I/O error in the middle of an exchange (disconnect, short transfer).
    #[error("Transport error: {0}")]
    Transport(#[from] std::io::Error),

    /// An exchange did not complete within the configured deadline.
    #[error("Exchange timed out after {0:?}")]
    Timeout(Duration),

    /// The object store answered with a non-success result.
    #[error("Object store rejected {opcode} for object {oid}")]
    Rejected { opcode: Opcode, oid: u32 },

    /// Protocol error (malformed word, unexpected payload, bad table image).
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// No session is active; mount or format first.
    #[error("File system is not mounted")]
    NotMounted,

    /// The handle exists but is not open.
    #[error("File handle {0} is not open")]
    NotOpen(FileHandle),

    /// The handle does not name an allocated table slot.
    #[error("Invalid file handle {0}")]
    InvalidHandle(FileHandle),

    /// Read on a file that has never been written.
    #[error("File handle {0} has no data")]
    NoData(FileHandle),

    /// Every table slot is in use.
    #[error("File table full ({0} entries)")]
    TableFull(usize),

    /// Filename is empty, too long or contains NUL.
    #[error("Invalid path: {0}")]
    InvalidPath(String),

    /// A buffer could not be sized for the requested object.
    #[error("Allocation error: {0}")]
    Allocation(String),

    /// Configuration could not be loaded.
    #[error("Config error: {0}")]
    Config(String),

    #[error("Format failed: {0}")]
    Format(#[source] Box<CrudError>),

    #[error("Mount failed: {0}")]
    Mount(#[source] Box<CrudError>),

    #[error("Unmount failed: {0}")]
    Unmount(#[source] Box<CrudError>),
}

impl CrudError {
    /// True for failures that leave the connection unusable.
    pub fn is_transport(&self) -> bool {
        matches!(self, CrudError::Transport(_) | CrudError::Timeout(_))
    }
}

/// Result type alias using CrudError.
pub type Result<T> = std::result::Result<T, CrudError>;
