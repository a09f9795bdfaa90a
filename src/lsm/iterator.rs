//! Merge and visibility primitives for record streams.
//!
//! All engine layers expose their contents as streams of [`Record`]s in
//! internal-key order. [`MergeIterator`] combines any number of such
//! streams with a binary heap; [`VisibilityFilter`] turns the merged
//! multi-version stream into the user-visible view at a snapshot: newest
//! visible version per user key, tombstones dropped.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use crate::lsm::format::{Record, RecordType, SeqNum};

// ------------------------------------------------------------------------------------------------
// MergeIterator — heap-based k-way merge
// ------------------------------------------------------------------------------------------------

/// K-way merge over record streams, yielding `(user_key asc, seq desc)`
/// order.
///
/// Sources must each be internally sorted. Ties on `(user_key, seq)` never
/// arise under the sequence-allocation contract, so source order among
/// equal heads is immaterial.
pub struct MergeIterator<'a> {
    sources: Vec<Box<dyn Iterator<Item = Record> + 'a>>,
    heap: BinaryHeap<HeapEntry>,
}

struct HeapEntry {
    record: Record,
    source: usize,
}

impl Ord for HeapEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // BinaryHeap is a max-heap: reverse so the smallest internal key
        // pops first.
        self.record.cmp(&other.record).reverse()
    }
}

impl PartialOrd for HeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for HeapEntry {
    fn eq(&self, other: &Self) -> bool {
        self.record == other.record
    }
}

impl Eq for HeapEntry {}

impl<'a> MergeIterator<'a> {
    pub fn new(mut sources: Vec<Box<dyn Iterator<Item = Record> + 'a>>) -> Self {
        let mut heap = BinaryHeap::with_capacity(sources.len());
        for (idx, source) in sources.iter_mut().enumerate() {
            if let Some(record) = source.next() {
                heap.push(HeapEntry {
                    record,
                    source: idx,
                });
            }
        }
        Self { sources, heap }
    }
}

impl Iterator for MergeIterator<'_> {
    type Item = Record;

    fn next(&mut self) -> Option<Record> {
        let entry = self.heap.pop()?;
        if let Some(record) = self.sources[entry.source].next() {
            self.heap.push(HeapEntry {
                record,
                source: entry.source,
            });
        }
        Some(entry.record)
    }
}

// ------------------------------------------------------------------------------------------------
// VisibilityFilter — snapshot view of a merged stream
// ------------------------------------------------------------------------------------------------

/// Resolves a merged multi-version stream into user-visible pairs.
///
/// For each user key, the first record with sequence ≤ the snapshot is
/// authoritative: a value is emitted, a tombstone suppresses the key.
/// Records newer than the snapshot and older shadowed versions are
/// skipped.
pub struct VisibilityFilter<I> {
    input: I,
    snapshot: SeqNum,
    last_user_key: Option<Vec<u8>>,
}

impl<I> VisibilityFilter<I>
where
    I: Iterator<Item = Record>,
{
    pub fn new(input: I, snapshot: SeqNum) -> Self {
        Self {
            input,
            snapshot,
            last_user_key: None,
        }
    }
}

impl<I> Iterator for VisibilityFilter<I>
where
    I: Iterator<Item = Record>,
{
    type Item = (Vec<u8>, Vec<u8>);

    fn next(&mut self) -> Option<(Vec<u8>, Vec<u8>)> {
        for record in self.input.by_ref() {
            if record.key.seq > self.snapshot {
                continue;
            }
            if self.last_user_key.as_deref() == Some(record.key.user_key.as_slice()) {
                continue; // Older version of an already-decided key.
            }
            self.last_user_key = Some(record.key.user_key.clone());
            match record.key.ty {
                RecordType::Deletion => continue,
                RecordType::Value => return Some((record.key.user_key, record.value)),
            }
        }
        None
    }
}
