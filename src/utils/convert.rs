//! Key layout of the sled record tree.
//!
//! `u16 BE len(collection_id) ‖ collection_id ‖ u64 BE offset`
//!
//! The length prefix keeps one collection's keys contiguous even when one
//! collection id is a prefix of another. Offsets are always >= 1, so the
//! big-endian unsigned encoding sorts in offset order.

use crate::Result;
use crate::StorageError;

/// Longest collection id the length prefix can encode
pub const MAX_COLLECTION_ID_LEN: usize = u16::MAX as usize;

const LEN_PREFIX: usize = 2;
const OFFSET_LEN: usize = 8;

pub fn collection_prefix(collection_id: &str) -> Vec<u8> {
    let id = collection_id.as_bytes();
    let mut key = Vec::with_capacity(LEN_PREFIX + id.len() + OFFSET_LEN);
    key.extend_from_slice(&(id.len() as u16).to_be_bytes());
    key.extend_from_slice(id);
    key
}

pub fn record_key(
    collection_id: &str,
    offset: i64,
) -> Vec<u8> {
    let mut key = collection_prefix(collection_id);
    key.extend_from_slice(&(offset.max(0) as u64).to_be_bytes());
    key
}

/// Extracts the offset from a record key.
pub fn record_key_offset<K: AsRef<[u8]>>(key: K) -> Result<i64> {
    let key = key.as_ref();
    if key.len() < LEN_PREFIX + OFFSET_LEN {
        return Err(StorageError::DataCorruption {
            location: format!("record key of length {}", key.len()),
        }
        .into());
    }
    let id_len = u16::from_be_bytes([key[0], key[1]]) as usize;
    if key.len() != LEN_PREFIX + id_len + OFFSET_LEN {
        return Err(StorageError::DataCorruption {
            location: format!("record key with id length {id_len}"),
        }
        .into());
    }
    let mut offset = [0u8; OFFSET_LEN];
    offset.copy_from_slice(&key[LEN_PREFIX + id_len..]);
    Ok(u64::from_be_bytes(offset) as i64)
}
