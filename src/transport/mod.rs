//! Transport module - the single connection to the object store.
//!
//! Provides full-transfer send/receive of frames over any tokio byte
//! stream, with a TCP constructor for the real store.

mod stream;

pub(crate) use stream::alloc_zeroed;
pub use stream::Transport;
