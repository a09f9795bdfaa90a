//! Storage facade.
//!
//! One [`Storage`] contract served by three backends, selected through
//! [`StorageBackend`](crate::options::StorageBackend):
//!
//! | Backend | Module | Notes |
//! |---------|--------|-------|
//! | `memory` | [`memory`] | ordered in-memory tables |
//! | `b+tree` | [`bptree`] | in-memory B+tree with typed comparators |
//! | `lsm` | [`lsm`] | one LSM tree per table |
//!
//! Keys arrive at the facade in their natural encodings — integers as 4-
//! or 8-byte little-endian, floats as 8-byte IEEE-754, strings as raw
//! bytes. The B+tree and memory backends order them with a
//! [`KeyComparator`] chosen by the table's primary-key type; the LSM
//! backend stores keys in an order-preserving (memcomparable) encoding
//! instead, since SSTables compare raw bytes.

pub mod bptree;
pub mod lsm;
pub mod memory;


use std::cmp::Ordering;
use std::path::Path;

use thiserror::Error;

use crate::catalog::{LogicalType, TableSchema};
use crate::lsm::LsmError;
use crate::options::{DbOptions, StorageBackend};

// ------------------------------------------------------------------------------------------------
// Error Types
// ------------------------------------------------------------------------------------------------

/// Errors returned by the storage facade.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Underlying I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Error from the LSM backend.
    #[error("LSM error: {0}")]
    Lsm(#[from] LsmError),

    /// `create` of a table that already exists.
    #[error("table `{0}` already exists")]
    TableExists(String),

    /// Operation on a table that does not exist.
    #[error("table `{0}` not found")]
    TableNotFound(String),

    /// Insert of a primary key that is already present.
    #[error("duplicate primary key")]
    DuplicateKey,

    /// A stored blob failed to decode.
    #[error("corruption: {0}")]
    Corruption(String),

    /// Internal invariant violation or poisoned lock.
    #[error("internal error: {0}")]
    Internal(String),
}

// ------------------------------------------------------------------------------------------------
// Range bounds
// ------------------------------------------------------------------------------------------------

/// One endpoint of a range scan: `(value, unbounded?, inclusive?)`.
#[derive(Debug, Clone, Default)]
pub struct RangeBound {
    /// Encoded key value; ignored when `unbounded`.
    pub value: Vec<u8>,
    /// Endpoint is open-ended.
    pub unbounded: bool,
    /// Endpoint includes `value`.
    pub inclusive: bool,
}

impl RangeBound {
    pub fn unbounded() -> Self {
        Self {
            value: Vec::new(),
            unbounded: true,
            inclusive: false,
        }
    }

    pub fn inclusive(value: impl Into<Vec<u8>>) -> Self {
        Self {
            value: value.into(),
            unbounded: false,
            inclusive: true,
        }
    }

    pub fn exclusive(value: impl Into<Vec<u8>>) -> Self {
        Self {
            value: value.into(),
            unbounded: false,
            inclusive: false,
        }
    }
}

// ------------------------------------------------------------------------------------------------
// Key comparators
// ------------------------------------------------------------------------------------------------

/// Primary-key comparison strategy, chosen by the key column's type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyComparator {
    /// Integers; 4-byte encodings widen to 64 bits before comparing.
    Integer,
    /// 8-byte IEEE-754 floats.
    Float,
    /// Lexicographic byte comparison.
    Lex,
}

impl KeyComparator {
    /// Comparator for a primary key of type `ty`.
    pub fn for_type(ty: LogicalType) -> Self {
        match ty {
            LogicalType::Int => Self::Integer,
            LogicalType::Float => Self::Float,
            LogicalType::String => Self::Lex,
        }
    }

    /// Compares two encoded keys.
    pub fn compare(&self, a: &[u8], b: &[u8]) -> Ordering {
        match self {
            Self::Integer => widen_int(a).cmp(&widen_int(b)),
            Self::Float => {
                let l = read_f64(a);
                let r = read_f64(b);
                l.partial_cmp(&r).unwrap_or(Ordering::Equal)
            }
            Self::Lex => a.cmp(b),
        }
    }

    /// Order-preserving encoding: byte-wise comparison of the output
    /// matches [`compare`](Self::compare) on the input. Used by the LSM
    /// backend, whose files order keys as raw bytes.
    pub fn encode_ordered(&self, key: &[u8]) -> Vec<u8> {
        match self {
            Self::Integer => {
                let v = widen_int(key) as u64;
                (v ^ (1 << 63)).to_be_bytes().to_vec()
            }
            Self::Float => {
                let bits = read_f64(key).to_bits();
                let ordered = if bits & (1 << 63) != 0 {
                    !bits
                } else {
                    bits | (1 << 63)
                };
                ordered.to_be_bytes().to_vec()
            }
            Self::Lex => key.to_vec(),
        }
    }

    /// Inverse of [`encode_ordered`](Self::encode_ordered), yielding the
    /// canonical 8-byte little-endian form for numeric keys.
    pub fn decode_ordered(&self, key: &[u8]) -> Vec<u8> {
        match self {
            Self::Integer => {
                let v = read_be_u64(key) ^ (1 << 63);
                (v as i64).to_le_bytes().to_vec()
            }
            Self::Float => {
                let ordered = read_be_u64(key);
                let bits = if ordered & (1 << 63) != 0 {
                    ordered & !(1 << 63)
                } else {
                    !ordered
                };
                f64::from_bits(bits).to_le_bytes().to_vec()
            }
            Self::Lex => key.to_vec(),
        }
    }
}

/// Widens a stored integer key to 64 bits. Keys may arrive 4-byte or
/// 8-byte encoded.
fn widen_int(key: &[u8]) -> i64 {
    match key.len() {
        4 => i32::from_le_bytes([key[0], key[1], key[2], key[3]]) as i64,
        n if n >= 8 => i64::from_le_bytes([
            key[0], key[1], key[2], key[3], key[4], key[5], key[6], key[7],
        ]),
        _ => 0,
    }
}

fn read_f64(key: &[u8]) -> f64 {
    if key.len() >= 8 {
        f64::from_le_bytes([
            key[0], key[1], key[2], key[3], key[4], key[5], key[6], key[7],
        ])
    } else {
        0.0
    }
}

fn read_be_u64(key: &[u8]) -> u64 {
    if key.len() >= 8 {
        u64::from_be_bytes([
            key[0], key[1], key[2], key[3], key[4], key[5], key[6], key[7],
        ])
    } else {
        0
    }
}

// ------------------------------------------------------------------------------------------------
// Storage contract
// ------------------------------------------------------------------------------------------------

/// Owned key-value iterator returned by scans.
pub type KvIter = Box<dyn Iterator<Item = (Vec<u8>, Vec<u8>)>>;

/// Uniform table store contract shared by every backend.
pub trait Storage: Send + Sync {
    /// Creates a table. Fails with [`StorageError::TableExists`] when the
    /// name is taken.
    fn create(&self, schema: &TableSchema) -> Result<(), StorageError>;

    /// Drops a table. Fails with [`StorageError::TableNotFound`] when it
    /// does not exist.
    fn drop_table(&self, table: &str) -> Result<(), StorageError>;

    /// Latest non-deleted value of `key`, or `None`.
    fn get(&self, table: &str, key: &[u8]) -> Result<Option<Vec<u8>>, StorageError>;

    /// Writes or replaces `key`.
    fn put(&self, table: &str, key: &[u8], value: &[u8]) -> Result<(), StorageError>;

    /// Deletes `key` (tombstone or physical removal, per backend).
    fn delete(&self, table: &str, key: &[u8]) -> Result<(), StorageError>;

    /// Forward scan of the whole table in primary-key order.
    fn iter(&self, table: &str) -> Result<KvIter, StorageError>;

    /// Forward scan bounded by `lo` and `hi`.
    fn range_iter(
        &self,
        table: &str,
        lo: &RangeBound,
        hi: &RangeBound,
    ) -> Result<KvIter, StorageError>;
}

/// Opens the backend configured in `opts`. `dir` hosts per-table data for
/// the LSM backend; in-memory backends ignore it.
pub fn open_storage(
    dir: impl AsRef<Path>,
    opts: &DbOptions,
) -> Result<Box<dyn Storage>, StorageError> {
    Ok(match opts.storage_backend {
        StorageBackend::Memory => Box::new(memory::MemoryStorage::new()),
        StorageBackend::BPlusTree => {
            Box::new(bptree::BPlusTreeStorage::new(opts.buf_pool_max_page))
        }
        StorageBackend::Lsm => Box::new(lsm::LsmStorage::new(dir.as_ref(), opts.lsm.clone())),
    })
}

#[cfg(test)]
mod comparator_tests {
    use super::*;

    #[test]
    fn integer_widens_mixed_encodings() {
        let four = 7i32.to_le_bytes().to_vec();
        let eight = 7i64.to_le_bytes().to_vec();
        assert_eq!(KeyComparator::Integer.compare(&four, &eight), Ordering::Equal);

        let neg = (-3i64).to_le_bytes().to_vec();
        assert_eq!(KeyComparator::Integer.compare(&neg, &four), Ordering::Less);
    }

    #[test]
    fn ordered_encoding_preserves_integer_order() {
        let cmp = KeyComparator::Integer;
        let values = [-100i64, -1, 0, 1, 42, i64::MAX];
        let encoded: Vec<Vec<u8>> = values
            .iter()
            .map(|v| cmp.encode_ordered(&v.to_le_bytes()))
            .collect();
        for pair in encoded.windows(2) {
            assert!(pair[0] < pair[1]);
        }
        // Round trip back to canonical 8-byte form.
        for (v, e) in values.iter().zip(&encoded) {
            assert_eq!(cmp.decode_ordered(e), v.to_le_bytes().to_vec());
        }
    }

    #[test]
    fn ordered_encoding_preserves_float_order() {
        let cmp = KeyComparator::Float;
        let values = [-2.5f64, -0.0, 0.0, 1.25, 1e9];
        let encoded: Vec<Vec<u8>> = values
            .iter()
            .map(|v| cmp.encode_ordered(&v.to_le_bytes()))
            .collect();
        for (pair_v, pair_e) in values.windows(2).zip(encoded.windows(2)) {
            if pair_v[0] < pair_v[1] {
                assert!(pair_e[0] < pair_e[1]);
            }
        }
    }
}
