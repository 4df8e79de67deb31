//! Protocol module - wire word, flags and frames.
//!
//! This module implements the binary protocol spoken with the object store:
//! - 8-byte word encoding/decoding (network byte order)
//! - Frame struct pairing a word with its payload

mod frame;
mod wire_format;

pub use frame::{build_frame, Frame};
pub use wire_format::{
    flags, Opcode, Word, MAX_LENGTH, MAX_OBJECT_SIZE, TABLE_OID, UNALLOCATED_OID, WORD_SIZE,
};
