//! Codec module - serialization of the persisted file table.
//!
//! - [`TableCodec`] - fixed-width big-endian records, one per table slot
//!
//! # Design
//!
//! Codecs are marker structs with static methods rather than trait objects.
//! The table image has a fixed size so `mount` can request exactly
//! [`TABLE_SIZE`] bytes.

mod table;

pub use table::{TableCodec, RECORD_SIZE, TABLE_SIZE};
