//! On-disk and in-memory record formats shared across the LSM engine.
//!
//! ## Internal keys
//!
//! Every stored record is keyed by an internal key `(user_key, seq, type)`.
//! Ordering is lexicographic by user key ascending; within one user key,
//! **higher sequence numbers sort first**, so the newest version of a key
//! is always encountered first during forward iteration. Tombstones and
//! values never share a `(user_key, seq)` pair.
//!
//! ## Encoded record layout (little-endian)
//!
//! ```text
//! [u32 ksize][user_key][u64 seq][u8 type][u32 vsize][value]
//! ```
//!
//! The same `[u32 ksize][user_key][u64 seq][u8 type]` prefix reappears in
//! SSTable index entries and the smallest/largest trailer keys.

use std::cmp::Ordering;
use std::path::PathBuf;

use crate::encoding::{Decode, Encode, EncodingError};

/// Per-write monotonic sequence number.
pub type SeqNum = u64;

/// The largest possible sequence number; used as the snapshot for
/// latest-visible reads.
pub const MAX_SEQ: SeqNum = u64::MAX;

/// Bytes of the fixed per-record key envelope: `u32 ksize + u64 seq + u8 type`.
pub const KEY_ENVELOPE: usize = 4 + 8 + 1;

// ------------------------------------------------------------------------------------------------
// Record type
// ------------------------------------------------------------------------------------------------

/// Kind of a stored record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum RecordType {
    /// A live value.
    Value = 1,
    /// A deletion marker shadowing any older value for the same user key.
    Deletion = 2,
}

impl RecordType {
    /// Decodes a record type byte.
    pub fn from_u8(byte: u8) -> Option<Self> {
        match byte {
            1 => Some(Self::Value),
            2 => Some(Self::Deletion),
            _ => None,
        }
    }
}

// ------------------------------------------------------------------------------------------------
// Internal key
// ------------------------------------------------------------------------------------------------

/// An owned internal key `(user_key, seq, type)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InternalKey {
    /// Opaque user key bytes.
    pub user_key: Vec<u8>,
    /// Sequence number of the write.
    pub seq: SeqNum,
    /// Record kind.
    pub ty: RecordType,
}

impl InternalKey {
    pub fn new(user_key: impl Into<Vec<u8>>, seq: SeqNum, ty: RecordType) -> Self {
        Self {
            user_key: user_key.into(),
            seq,
            ty,
        }
    }

    /// The key every lookup for `(user_key, seq)` targets: the newest
    /// visible position in internal-key order.
    pub fn lookup(user_key: impl Into<Vec<u8>>, seq: SeqNum) -> Self {
        Self::new(user_key, seq, RecordType::Value)
    }

    /// Encoded length of the `[ksize][user_key][seq][type]` prefix.
    pub fn encoded_len(&self) -> usize {
        KEY_ENVELOPE + self.user_key.len()
    }

    /// Compares `(user_key asc, seq desc, type asc)` against borrowed parts.
    pub fn cmp_parts(&self, user_key: &[u8], seq: SeqNum, ty: RecordType) -> Ordering {
        internal_cmp(
            (self.user_key.as_slice(), self.seq, self.ty),
            (user_key, seq, ty),
        )
    }
}

impl PartialOrd for InternalKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for InternalKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.cmp_parts(&other.user_key, other.seq, other.ty)
    }
}

/// Internal-key ordering over borrowed parts: user key ascending, then
/// sequence descending (newer first), then record type ascending.
pub fn internal_cmp(
    a: (&[u8], SeqNum, RecordType),
    b: (&[u8], SeqNum, RecordType),
) -> Ordering {
    a.0.cmp(b.0)
        .then_with(|| b.1.cmp(&a.1))
        .then_with(|| a.2.cmp(&b.2))
}

// ------------------------------------------------------------------------------------------------
// Record — the owned stream item flowing through merges and compactions
// ------------------------------------------------------------------------------------------------

/// One versioned record: an internal key plus its value bytes.
///
/// Tombstones carry an empty value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub key: InternalKey,
    pub value: Vec<u8>,
}

impl Record {
    pub fn put(user_key: impl Into<Vec<u8>>, seq: SeqNum, value: impl Into<Vec<u8>>) -> Self {
        Self {
            key: InternalKey::new(user_key, seq, RecordType::Value),
            value: value.into(),
        }
    }

    pub fn tombstone(user_key: impl Into<Vec<u8>>, seq: SeqNum) -> Self {
        Self {
            key: InternalKey::new(user_key, seq, RecordType::Deletion),
            value: Vec::new(),
        }
    }

    /// Encoded byte footprint of this record inside a block, excluding
    /// the block's offset-array slot.
    pub fn encoded_len(&self) -> usize {
        self.key.encoded_len() + 4 + self.value.len()
    }
}

impl PartialOrd for Record {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Record {
    fn cmp(&self, other: &Self) -> Ordering {
        self.key.cmp(&other.key)
    }
}

// ------------------------------------------------------------------------------------------------
// Lookup result
// ------------------------------------------------------------------------------------------------

/// Result of a point lookup at one layer of the tree.
///
/// `Deleted` is decisive: a tombstone found in a newer layer suppresses
/// values in older layers. `NotFound` means "this layer has no
/// information" and the search continues downward.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GetResult {
    /// The newest visible record is a live value.
    Found(Vec<u8>),
    /// The newest visible record is a tombstone.
    Deleted,
    /// No record for this user key at or below the snapshot.
    NotFound,
}

// ------------------------------------------------------------------------------------------------
// SSTable metadata
// ------------------------------------------------------------------------------------------------

/// Location of one block within an SSTable file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockHandle {
    /// Byte offset of the block.
    pub offset: u64,
    /// Total block size in bytes, including the record offset array.
    pub size: u64,
    /// Number of records in the block.
    pub count: u64,
}

/// One sparse-index entry: the largest internal key stored in a block,
/// plus the block's handle.
#[derive(Debug, Clone)]
pub struct IndexEntry {
    pub key: InternalKey,
    pub handle: BlockHandle,
}

/// Sidecar metadata describing a finished SSTable file.
///
/// Persisted next to the `.sst` file (with a CRC32 trailer) and kept in
/// memory by the version tree.
#[derive(Debug, Clone, PartialEq)]
pub struct SstInfo {
    /// Total file size in bytes.
    pub size: u64,
    /// Number of records.
    pub count: u64,
    /// Engine-assigned file id.
    pub sst_id: u64,
    /// Byte offset where the index begins.
    pub index_offset: u64,
    /// Byte offset where the bloom filter begins.
    pub bloom_filter_offset: u64,
    /// Path of the SSTable file.
    pub path: PathBuf,
}

impl Encode for SstInfo {
    fn encode_to(&self, buf: &mut Vec<u8>) -> Result<(), EncodingError> {
        self.size.encode_to(buf)?;
        self.count.encode_to(buf)?;
        self.sst_id.encode_to(buf)?;
        self.index_offset.encode_to(buf)?;
        self.bloom_filter_offset.encode_to(buf)?;
        self.path.to_string_lossy().into_owned().encode_to(buf)?;
        Ok(())
    }
}

impl Decode for SstInfo {
    fn decode_from(buf: &[u8]) -> Result<(Self, usize), EncodingError> {
        let mut off = 0;
        let (size, n) = u64::decode_from(&buf[off..])?;
        off += n;
        let (count, n) = u64::decode_from(&buf[off..])?;
        off += n;
        let (sst_id, n) = u64::decode_from(&buf[off..])?;
        off += n;
        let (index_offset, n) = u64::decode_from(&buf[off..])?;
        off += n;
        let (bloom_filter_offset, n) = u64::decode_from(&buf[off..])?;
        off += n;
        let (path, n) = String::decode_from(&buf[off..])?;
        off += n;
        Ok((
            Self {
                size,
                count,
                sst_id,
                index_offset,
                bloom_filter_offset,
                path: PathBuf::from(path),
            },
            off,
        ))
    }
}

#[cfg(test)]
mod format_tests {
    use super::*;

    #[test]
    fn ordering_is_key_asc_seq_desc() {
        let a = InternalKey::new(b"a".to_vec(), 5, RecordType::Value);
        let a_newer = InternalKey::new(b"a".to_vec(), 9, RecordType::Value);
        let b = InternalKey::new(b"b".to_vec(), 1, RecordType::Value);

        assert!(a_newer < a, "newer seq sorts first within one user key");
        assert!(a < b);
        assert!(a_newer < b);
    }

    #[test]
    fn value_sorts_before_deletion_at_equal_seq() {
        let v = InternalKey::new(b"k".to_vec(), 3, RecordType::Value);
        let d = InternalKey::new(b"k".to_vec(), 3, RecordType::Deletion);
        assert!(v < d);
    }

    #[test]
    fn sst_info_round_trip() {
        let info = SstInfo {
            size: 4096,
            count: 17,
            sst_id: 3,
            index_offset: 3000,
            bloom_filter_offset: 3500,
            path: PathBuf::from("/tmp/000003.sst"),
        };
        let bytes = crate::encoding::encode_to_vec(&info).unwrap();
        let (decoded, consumed) = crate::encoding::decode_from_slice::<SstInfo>(&bytes).unwrap();
        assert_eq!(decoded, info);
        assert_eq!(consumed, bytes.len());
    }
}
