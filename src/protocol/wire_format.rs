//! Wire format encoding and decoding.
//!
//! Every request and every response is a single 64-bit word:
//! ```text
//! ┌──────────────┬────────┬──────────────┬────────┐
//! │ Object ID    │ Opcode │ Length       │ Flags  │
//! │ bits 63..32  │ 31..28 │ 27..4        │ 3..0   │
//! └──────────────┴────────┴──────────────┴────────┘
//! ```
//!
//! The word travels Big Endian (network order). A payload of `length` bytes
//! follows CREATE/UPDATE requests and READ responses, unconverted.

use std::fmt;

use crate::error::{CrudError, Result};

/// Word size in bytes (fixed, exactly 8).
pub const WORD_SIZE: usize = 8;

/// Largest value the 24-bit length field can carry.
pub const MAX_LENGTH: u32 = 0x00FF_FFFF;

/// Largest object the client will allocate or send.
pub const MAX_OBJECT_SIZE: usize = MAX_LENGTH as usize;

/// Object ID meaning "not yet allocated".
pub const UNALLOCATED_OID: u32 = 0;

/// Default object ID of the persisted file table.
pub const TABLE_OID: u32 = 0;

const OPCODE_SHIFT: u32 = 28;
const LENGTH_SHIFT: u32 = 4;
const OID_SHIFT: u32 = 32;

/// Flag constants for the low nibble of the word.
pub mod flags {
    /// Response: the request failed (1) or succeeded (0).
    pub const FAILURE: u8 = 0b0001;
    /// Request addresses the priority object (the file table).
    pub const PRIORITY_OBJECT: u8 = 0b0010;
    /// No flags.
    pub const NONE: u8 = 0;

    /// Bits that must be clear on a request.
    pub const RESERVED_MASK: u8 = 0b1100;
    /// Whole nibble.
    pub const MASK: u8 = 0b1111;

    /// Check if a specific flag is set.
    #[inline]
    pub fn has_flag(flags: u8, flag: u8) -> bool {
        flags & flag != 0
    }
}

/// Request type carried in bits 31..28.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Opcode {
    Init = 0,
    Create = 1,
    Read = 2,
    Update = 3,
    Delete = 4,
    Format = 5,
    Close = 6,
}

impl Opcode {
    /// Decode an opcode nibble.
    pub fn from_nibble(value: u8) -> Option<Self> {
        match value {
            0 => Some(Opcode::Init),
            1 => Some(Opcode::Create),
            2 => Some(Opcode::Read),
            3 => Some(Opcode::Update),
            4 => Some(Opcode::Delete),
            5 => Some(Opcode::Format),
            6 => Some(Opcode::Close),
            _ => None,
        }
    }

    /// Requests with this opcode are followed by `length` payload bytes.
    #[inline]
    pub fn carries_request_payload(self) -> bool {
        matches!(self, Opcode::Create | Opcode::Update)
    }

    /// Responses with this opcode are followed by `length` payload bytes.
    #[inline]
    pub fn carries_response_payload(self) -> bool {
        self == Opcode::Read
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Opcode::Init => "INIT",
            Opcode::Create => "CREATE",
            Opcode::Read => "READ",
            Opcode::Update => "UPDATE",
            Opcode::Delete => "DELETE",
            Opcode::Format => "FORMAT",
            Opcode::Close => "CLOSE",
        }
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<u8> for Opcode {
    type Error = CrudError;

    fn try_from(value: u8) -> Result<Self> {
        Opcode::from_nibble(value)
            .ok_or_else(|| CrudError::Protocol(format!("Unknown opcode {}", value)))
    }
}

/// Decoded request/response word.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Word {
    /// Object identifier (0 = unallocated, or the table when flagged priority).
    pub oid: u32,
    /// Request type.
    pub opcode: Opcode,
    /// Payload length in bytes (24 bits).
    pub length: u32,
    /// Flag nibble (see `flags` module).
    pub flags: u8,
}

impl Word {
    /// Create a new word.
    pub fn new(oid: u32, opcode: Opcode, length: u32, flags: u8) -> Self {
        Self {
            oid,
            opcode,
            length,
            flags,
        }
    }

    /// Pack the fields into the 64-bit host value.
    ///
    /// Out-of-range length and flag bits are masked off; call `validate`
    /// first when the values come from outside.
    pub fn pack(&self) -> u64 {
        (u64::from(self.oid) << OID_SHIFT)
            | (u64::from(self.opcode as u8) << OPCODE_SHIFT)
            | (u64::from(self.length & MAX_LENGTH) << LENGTH_SHIFT)
            | u64::from(self.flags & flags::MASK)
    }

    /// Unpack a 64-bit host value.
    ///
    /// Fails only if the opcode nibble names no known request type.
    pub fn unpack(raw: u64) -> Result<Self> {
        let opcode = Opcode::try_from(((raw >> OPCODE_SHIFT) & 0xF) as u8)?;
        Ok(Self {
            oid: (raw >> OID_SHIFT) as u32,
            opcode,
            length: ((raw >> LENGTH_SHIFT) as u32) & MAX_LENGTH,
            flags: (raw as u8) & flags::MASK,
        })
    }

    /// Encode to network byte order.
    ///
    /// # Example
    ///
    /// ```
    /// use crudfs_client::protocol::{Opcode, Word};
    ///
    /// let word = Word::new(7, Opcode::Read, 100, 0);
    /// let bytes = word.encode();
    /// assert_eq!(bytes.len(), 8);
    /// assert_eq!(&bytes[..4], &[0, 0, 0, 7]);
    /// ```
    pub fn encode(&self) -> [u8; WORD_SIZE] {
        self.pack().to_be_bytes()
    }

    /// Decode from network byte order.
    ///
    /// Returns `Ok(None)` if the buffer is too short.
    pub fn decode(buf: &[u8]) -> Result<Option<Self>> {
        if buf.len() < WORD_SIZE {
            return Ok(None);
        }
        let mut raw = [0u8; WORD_SIZE];
        raw.copy_from_slice(&buf[..WORD_SIZE]);
        Word::unpack(u64::from_be_bytes(raw)).map(Some)
    }

    /// Validate a word before it goes on the wire.
    ///
    /// Checks:
    /// - Length fits in 24 bits
    /// - Flags fit in the nibble and reserved bits are 0
    pub fn validate(&self) -> Result<()> {
        if self.length > MAX_LENGTH {
            return Err(CrudError::Protocol(format!(
                "Length {} exceeds maximum {}",
                self.length, MAX_LENGTH
            )));
        }

        if self.flags & !flags::MASK != 0 || self.flags & flags::RESERVED_MASK != 0 {
            return Err(CrudError::Protocol(format!(
                "Reserved flag bits must be 0 (flags {:#06b})",
                self.flags
            )));
        }

        Ok(())
    }

    /// Response result bit is clear.
    #[inline]
    pub fn is_success(&self) -> bool {
        !flags::has_flag(self.flags, flags::FAILURE)
    }

    /// Word addresses the priority object.
    #[inline]
    pub fn is_priority(&self) -> bool {
        flags::has_flag(self.flags, flags::PRIORITY_OBJECT)
    }
}

impl fmt::Display for Word {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} oid={} len={} flags={:#06b}",
            self.opcode, self.oid, self.length, self.flags
        )
    }
}
