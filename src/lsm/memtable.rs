//! In-memory write buffer.
//!
//! The memtable stores multiple versions per user key in internal-key
//! order (user key ascending, sequence descending), the same order its
//! flush stream and the SSTables use. Deletes are tombstone entries, not
//! physical removals.
//!
//! # Concurrency
//!
//! Readers proceed concurrently under a read lock; the engine serialises
//! writers, so at most one writer mutates the map at a time. Sequence
//! numbers are allocated by the owning tree, not here.

use std::cmp::Reverse;
use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::RwLock;

use tracing::trace;

use crate::lsm::format::{GetResult, InternalKey, Record, RecordType, SeqNum};
use crate::lsm::LsmError;

/// Map key: `(user_key, Reverse(seq))` so iteration yields newest-first
/// within each user key.
type MemKey = (Vec<u8>, Reverse<SeqNum>);

/// The in-memory versioned write buffer.
pub struct MemTable {
    entries: RwLock<BTreeMap<MemKey, (RecordType, Vec<u8>)>>,
    approximate_size: AtomicUsize,
}

impl Default for MemTable {
    fn default() -> Self {
        Self::new()
    }
}

impl MemTable {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(BTreeMap::new()),
            approximate_size: AtomicUsize::new(0),
        }
    }

    /// Inserts a value version.
    pub fn put(&self, user_key: Vec<u8>, seq: SeqNum, value: Vec<u8>) -> Result<(), LsmError> {
        trace!(seq, key_len = user_key.len(), "memtable put");
        let size = user_key.len() + value.len() + std::mem::size_of::<MemKey>();
        let mut entries = self
            .entries
            .write()
            .map_err(|_| LsmError::Internal("memtable lock poisoned".into()))?;
        entries.insert((user_key, Reverse(seq)), (RecordType::Value, value));
        self.approximate_size.fetch_add(size, Ordering::Relaxed);
        Ok(())
    }

    /// Inserts a tombstone version.
    pub fn delete(&self, user_key: Vec<u8>, seq: SeqNum) -> Result<(), LsmError> {
        trace!(seq, key_len = user_key.len(), "memtable delete");
        let size = user_key.len() + std::mem::size_of::<MemKey>();
        let mut entries = self
            .entries
            .write()
            .map_err(|_| LsmError::Internal("memtable lock poisoned".into()))?;
        entries.insert((user_key, Reverse(seq)), (RecordType::Deletion, Vec::new()));
        self.approximate_size.fetch_add(size, Ordering::Relaxed);
        Ok(())
    }

    /// Newest record for `user_key` with sequence ≤ `seq`.
    pub fn get(&self, user_key: &[u8], seq: SeqNum) -> Result<GetResult, LsmError> {
        let entries = self
            .entries
            .read()
            .map_err(|_| LsmError::Internal("memtable lock poisoned".into()))?;

        // Entries for this key sort newest-first; start at the first one
        // whose sequence is ≤ the snapshot.
        let start = Bound::Included((user_key.to_vec(), Reverse(seq)));
        let result = entries
            .range((start, Bound::Unbounded))
            .next()
            .filter(|((key, _), _)| key.as_slice() == user_key)
            .map(|(_, (ty, value))| match ty {
                RecordType::Value => GetResult::Found(value.clone()),
                RecordType::Deletion => GetResult::Deleted,
            });
        Ok(result.unwrap_or(GetResult::NotFound))
    }

    /// Approximate in-memory footprint in bytes.
    pub fn approximate_size(&self) -> usize {
        self.approximate_size.load(Ordering::Relaxed)
    }

    pub fn is_empty(&self) -> bool {
        match self.entries.read() {
            Ok(entries) => entries.is_empty(),
            Err(_) => true,
        }
    }

    /// Snapshot of all records in internal-key order. Consumed by flushes
    /// and full scans; does not mutate in-memory state.
    pub fn records(&self) -> Result<Vec<Record>, LsmError> {
        let entries = self
            .entries
            .read()
            .map_err(|_| LsmError::Internal("memtable lock poisoned".into()))?;
        Ok(entries
            .iter()
            .map(|((key, Reverse(seq)), (ty, value))| Record {
                key: InternalKey::new(key.clone(), *seq, *ty),
                value: value.clone(),
            })
            .collect())
    }

    /// Snapshot of records with user key ≥ `lo`, in internal-key order.
    pub fn records_from(&self, lo: &[u8]) -> Result<Vec<Record>, LsmError> {
        let entries = self
            .entries
            .read()
            .map_err(|_| LsmError::Internal("memtable lock poisoned".into()))?;
        let start = Bound::Included((lo.to_vec(), Reverse(SeqNum::MAX)));
        Ok(entries
            .range((start, Bound::Unbounded))
            .map(|((key, Reverse(seq)), (ty, value))| Record {
                key: InternalKey::new(key.clone(), *seq, *ty),
                value: value.clone(),
            })
            .collect())
    }
}
