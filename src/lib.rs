//! # crudfs-client
//!
//! POSIX-style file access on top of a remote whole-object CRUD store.
//!
//! Files are named entries in a table that itself lives in the store as a
//! priority object. Every file's bytes are one store object; writes that
//! grow a file move it to a new, larger object.
//!
//! ## Architecture
//!
//! - **Protocol**: one 64-bit word per request and response, payload only
//!   for CREATE/UPDATE requests and READ responses
//! - **Transport**: a single TCP connection, full-transfer send/receive
//! - **Engine**: [`CrudFs`] translates open/read/write/seek into store calls
//!
//! ## Example
//!
//! ```ignore
//! use crudfs_client::CrudFs;
//!
//! #[tokio::main]
//! async fn main() -> crudfs_client::Result<()> {
//!     let fs = CrudFs::builder().server_addr("127.0.0.1:19876").build();
//!
//!     fs.format().await?;
//!     fs.mount().await?;
//!
//!     let fh = fs.open("notes.txt").await?;
//!     fs.write(fh, b"hello").await?;
//!     fs.close(fh).await?;
//!
//!     fs.unmount().await
//! }
//! ```

pub mod codec;
pub mod config;
pub mod error;
pub mod protocol;
pub mod table;
pub mod transport;

mod fs;

pub use config::ClientConfig;
pub use error::{CrudError, Result};
pub use fs::{CrudFs, CrudFsBuilder, SessionState};
pub use table::{FileHandle, FileStat};
