//! Fixed-width binary codec for the persisted file table.
//!
//! The table object is `MAX_TOTAL_FILES` records back to back:
//! ```text
//! ┌──────────────┬──────────┬──────────┬──────────┬──────┬──────────┐
//! │ Filename     │ Object ID│ Position │ Length   │ Open │ Reserved │
//! │ 128 bytes NUL│ uint32 BE│ uint32 BE│ uint32 BE│ u8   │ 3 bytes  │
//! └──────────────┴──────────┴──────────┴──────────┴──────┴──────────┘
//! ```
//!
//! Object ID 0 on disk means the file has no backing object yet.
//!
//! # Example
//!
//! ```
//! use crudfs_client::codec::{TableCodec, RECORD_SIZE};
//! use crudfs_client::table::FileTable;
//!
//! let mut table = FileTable::with_capacity(4);
//! table.open("notes.txt").unwrap();
//!
//! let image = TableCodec::encode(&table);
//! assert_eq!(image.len(), 4 * RECORD_SIZE);
//! assert_eq!(TableCodec::decode(&image).unwrap(), table);
//! ```

use std::collections::HashSet;

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{CrudError, Result};
use crate::protocol::UNALLOCATED_OID;
use crate::table::{
    FileTable, FileTableEntry, MAX_PATH_LENGTH, MAX_TABLE_CAPACITY, MAX_TOTAL_FILES,
};

/// Size of one persisted entry.
pub const RECORD_SIZE: usize = MAX_PATH_LENGTH + 4 + 4 + 4 + 1 + 3;

/// Size of the persisted table object.
pub const TABLE_SIZE: usize = MAX_TOTAL_FILES * RECORD_SIZE;

/// Codec for the table object.
pub struct TableCodec;

impl TableCodec {
    /// Encode every slot of `table`.
    pub fn encode(table: &FileTable) -> Bytes {
        let mut buf = BytesMut::with_capacity(table.capacity() * RECORD_SIZE);
        for entry in table.entries() {
            encode_record(&mut buf, entry);
        }
        buf.freeze()
    }

    /// Decode a table image; its size fixes the capacity.
    ///
    /// # Errors
    ///
    /// `Protocol` if the image is not a whole number of records or holds more
    /// than `MAX_TABLE_CAPACITY` of them, a filename is not UTF-8 or fills
    /// its field with no NUL, an open byte is not 0/1, or a filename repeats.
    pub fn decode(image: &[u8]) -> Result<FileTable> {
        if image.is_empty() || image.len() % RECORD_SIZE != 0 {
            return Err(CrudError::Protocol(format!(
                "Table image of {} bytes is not a multiple of {}",
                image.len(),
                RECORD_SIZE
            )));
        }
        if image.len() / RECORD_SIZE > MAX_TABLE_CAPACITY {
            return Err(CrudError::Protocol(format!(
                "Table image holds {} records, limit is {}",
                image.len() / RECORD_SIZE,
                MAX_TABLE_CAPACITY
            )));
        }

        let mut seen = HashSet::new();
        let mut entries = Vec::with_capacity(image.len() / RECORD_SIZE);
        let mut buf = image;

        while buf.has_remaining() {
            let slot = entries.len();
            let entry = decode_record(&mut buf, slot)?;
            if !entry.is_free() && !seen.insert(entry.filename.clone()) {
                return Err(CrudError::Protocol(format!(
                    "Filename {:?} appears twice in table",
                    entry.filename
                )));
            }
            entries.push(entry);
        }

        Ok(FileTable::from_entries(entries))
    }
}

fn encode_record(buf: &mut BytesMut, entry: &FileTableEntry) {
    let name = entry.filename.as_bytes();
    // The name field always ends in at least one NUL.
    let name_len = name.len().min(MAX_PATH_LENGTH - 1);
    buf.put_slice(&name[..name_len]);
    buf.put_bytes(0, MAX_PATH_LENGTH - name_len);

    buf.put_u32(entry.object_id.unwrap_or(UNALLOCATED_OID));
    buf.put_u32(entry.position);
    buf.put_u32(entry.length);
    buf.put_u8(u8::from(entry.open));
    buf.put_bytes(0, 3);
}

fn decode_record(buf: &mut &[u8], slot: usize) -> Result<FileTableEntry> {
    let raw_name = &buf[..MAX_PATH_LENGTH];
    let name_len = raw_name.iter().position(|&b| b == 0).ok_or_else(|| {
        CrudError::Protocol(format!("Slot {} filename is not NUL terminated", slot))
    })?;
    let filename = std::str::from_utf8(&raw_name[..name_len])
        .map_err(|e| CrudError::Protocol(format!("Slot {} filename is not UTF-8: {}", slot, e)))?
        .to_string();
    buf.advance(MAX_PATH_LENGTH);

    let object_id = match buf.get_u32() {
        UNALLOCATED_OID => None,
        oid => Some(oid),
    };
    let position = buf.get_u32();
    let length = buf.get_u32();
    let open = match buf.get_u8() {
        0 => false,
        1 => true,
        other => {
            return Err(CrudError::Protocol(format!(
                "Slot {} has open byte {}",
                slot, other
            )))
        }
    };
    buf.advance(3);

    Ok(FileTableEntry {
        filename,
        object_id,
        position,
        length,
        open,
    })
}
