//! Frame struct with typed accessors.
//!
//! A frame is one word plus the payload that travels with it.
//! Uses `bytes::Bytes` so payloads can be shared without copying.
//!
//! # Example
//!
//! ```
//! use crudfs_client::protocol::{Frame, Opcode};
//! use bytes::Bytes;
//!
//! let frame = Frame::create(Bytes::from_static(b"hello"), 0);
//! assert_eq!(frame.opcode(), Opcode::Create);
//! assert_eq!(frame.word.length, 5);
//! assert_eq!(frame.payload(), b"hello");
//! ```

use bytes::Bytes;

use super::wire_format::{flags, Opcode, Word, WORD_SIZE};

/// A complete request or response.
#[derive(Debug, Clone)]
pub struct Frame {
    /// Decoded word.
    pub word: Word,
    /// Payload bytes; empty unless the opcode carries one.
    pub payload: Bytes,
}

impl Frame {
    /// Create a new frame from word and payload.
    pub fn new(word: Word, payload: Bytes) -> Self {
        Self { word, payload }
    }

    /// Frame without payload.
    pub fn bare(word: Word) -> Self {
        Self {
            word,
            payload: Bytes::new(),
        }
    }

    /// Session handshake.
    pub fn init() -> Self {
        Self::bare(Word::new(0, Opcode::Init, 0, flags::NONE))
    }

    /// Reset all storage.
    pub fn format() -> Self {
        Self::bare(Word::new(0, Opcode::Format, 0, flags::NONE))
    }

    /// Terminate the session.
    pub fn close() -> Self {
        Self::bare(Word::new(0, Opcode::Close, 0, flags::NONE))
    }

    /// Create a new object holding `payload`; the store picks the OID.
    pub fn create(payload: Bytes, flags: u8) -> Self {
        let word = Word::new(0, Opcode::Create, payload.len() as u32, flags);
        Self { word, payload }
    }

    /// Fetch the whole object `oid` of `length` bytes.
    pub fn read(oid: u32, length: u32, flags: u8) -> Self {
        Self::bare(Word::new(oid, Opcode::Read, length, flags))
    }

    /// Replace the whole object `oid` with `payload`.
    pub fn update(oid: u32, payload: Bytes, flags: u8) -> Self {
        let word = Word::new(oid, Opcode::Update, payload.len() as u32, flags);
        Self { word, payload }
    }

    /// Delete object `oid`.
    pub fn delete(oid: u32) -> Self {
        Self::bare(Word::new(oid, Opcode::Delete, 0, flags::NONE))
    }

    /// Get a reference to the payload bytes.
    #[inline]
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    #[inline]
    pub fn oid(&self) -> u32 {
        self.word.oid
    }

    #[inline]
    pub fn opcode(&self) -> Opcode {
        self.word.opcode
    }

    /// Check if the result bit reports success.
    #[inline]
    pub fn is_success(&self) -> bool {
        self.word.is_success()
    }

    /// Size on the wire (word + payload).
    #[inline]
    pub fn wire_len(&self) -> usize {
        WORD_SIZE + self.payload.len()
    }
}

/// Build a complete frame as a single byte vector.
///
/// # Example
///
/// ```
/// use crudfs_client::protocol::{build_frame, Opcode, Word};
///
/// let word = Word::new(3, Opcode::Update, 5, 0);
/// let bytes = build_frame(&word, b"hello");
/// assert_eq!(bytes.len(), 8 + 5);
/// ```
pub fn build_frame(word: &Word, payload: &[u8]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(WORD_SIZE + payload.len());
    buf.extend_from_slice(&word.encode());
    buf.extend_from_slice(payload);
    buf
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_sets_length_from_payload() {
        let frame = Frame::create(Bytes::from_static(b"abcdef"), flags::PRIORITY_OBJECT);
        assert_eq!(frame.word.length, 6);
        assert_eq!(frame.oid(), 0);
        assert!(frame.word.is_priority());
        assert_eq!(frame.wire_len(), WORD_SIZE + 6);
    }

    #[test]
    fn test_read_has_no_payload() {
        let frame = Frame::read(12, 4096, flags::NONE);
        assert_eq!(frame.opcode(), Opcode::Read);
        assert_eq!(frame.word.length, 4096);
        assert!(frame.payload().is_empty());
    }

    #[test]
    fn test_control_frames() {
        assert_eq!(Frame::init().opcode(), Opcode::Init);
        assert_eq!(Frame::format().opcode(), Opcode::Format);
        assert_eq!(Frame::close().opcode(), Opcode::Close);
        assert_eq!(Frame::delete(4).oid(), 4);
    }

    #[test]
    fn test_build_frame_layout() {
        let word = Word::new(1, Opcode::Create, 2, 0);
        let bytes = build_frame(&word, b"hi");
        assert_eq!(&bytes[..WORD_SIZE], &word.encode());
        assert_eq!(&bytes[WORD_SIZE..], b"hi");
    }
}
