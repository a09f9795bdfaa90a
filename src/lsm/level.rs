//! Sorted runs and levels.
//!
//! A sorted run is an ordered sequence of SSTables with disjoint user-key
//! ranges, binary-searchable by user key. A level holds an ordered list of
//! runs: level 0 accumulates overlapping runs from flushes (newest last),
//! deeper levels hold a single run under leveled compaction and multiple
//! runs under tiered compaction.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::lsm::format::{GetResult, Record, SeqNum};
use crate::lsm::sst::{SSTable, SstIterator};
use crate::lsm::LsmError;

// ------------------------------------------------------------------------------------------------
// SortedRun
// ------------------------------------------------------------------------------------------------

/// An ordered, non-overlapping sequence of SSTables.
pub struct SortedRun {
    ssts: Vec<Arc<SSTable>>,
    size: u64,
    remove_tag: AtomicBool,
}

impl SortedRun {
    pub fn new(ssts: Vec<Arc<SSTable>>) -> Self {
        let size = ssts.iter().map(|s| s.info().size).sum();
        Self {
            ssts,
            size,
            remove_tag: AtomicBool::new(false),
        }
    }

    pub fn ssts(&self) -> &[Arc<SSTable>] {
        &self.ssts
    }

    /// Total byte size of the run's files.
    pub fn size(&self) -> u64 {
        self.size
    }

    /// When set, every SSTable in the run is marked for unlinking as the
    /// run is dropped.
    pub fn set_remove_tag(&self, remove: bool) {
        self.remove_tag.store(remove, Ordering::Release);
    }

    fn sst_covering(&self, user_key: &[u8]) -> Option<usize> {
        if self.ssts.is_empty() {
            return None;
        }
        // First SST whose largest user key is ≥ the probe.
        let idx = self
            .ssts
            .partition_point(|sst| sst.largest().user_key.as_slice() < user_key);
        if idx == self.ssts.len() {
            return None;
        }
        (self.ssts[idx].smallest().user_key.as_slice() <= user_key).then_some(idx)
    }

    /// Point lookup delegated to the single SST whose key range covers
    /// `user_key`.
    pub fn get(&self, user_key: &[u8], seq: SeqNum) -> Result<GetResult, LsmError> {
        match self.sst_covering(user_key) {
            Some(idx) => self.ssts[idx].get(user_key, seq),
            None => Ok(GetResult::NotFound),
        }
    }

    /// Iterator over the whole run.
    pub fn iter(self: &Arc<Self>) -> RunIterator {
        RunIterator {
            run: Arc::clone(self),
            sst_idx: 0,
            inner: self.ssts.first().map(|sst| sst.iter()),
        }
    }

    /// Iterator positioned at the first record ≥ `(user_key, seq, Value)`,
    /// advancing across SST boundaries.
    pub fn seek(self: &Arc<Self>, user_key: &[u8], seq: SeqNum) -> RunIterator {
        let sst_idx = self
            .ssts
            .partition_point(|sst| sst.largest().user_key.as_slice() < user_key);
        let inner = self.ssts.get(sst_idx).map(|sst| sst.seek(user_key, seq));
        RunIterator {
            run: Arc::clone(self),
            sst_idx,
            inner,
        }
    }
}

impl Drop for SortedRun {
    fn drop(&mut self) {
        if self.remove_tag.load(Ordering::Acquire) {
            for sst in &self.ssts {
                sst.set_remove_tag(true);
            }
        }
    }
}

/// Iterator over one sorted run.
pub struct RunIterator {
    run: Arc<SortedRun>,
    sst_idx: usize,
    inner: Option<SstIterator>,
}

impl Iterator for RunIterator {
    type Item = Record;

    fn next(&mut self) -> Option<Record> {
        loop {
            let inner = self.inner.as_mut()?;
            if let Some(record) = inner.next() {
                return Some(record);
            }
            self.sst_idx += 1;
            self.inner = self.run.ssts.get(self.sst_idx).map(|sst| sst.iter());
        }
    }
}

// ------------------------------------------------------------------------------------------------
// Level
// ------------------------------------------------------------------------------------------------

/// One level of the tree: an ordered list of sorted runs, oldest first.
#[derive(Clone, Default)]
pub struct Level {
    runs: Vec<Arc<SortedRun>>,
    size: u64,
}

impl Level {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn runs(&self) -> &[Arc<SortedRun>] {
        &self.runs
    }

    /// Total byte size of the level.
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Appends a run as the newest in this level.
    pub fn push_run(&mut self, run: Arc<SortedRun>) {
        self.size += run.size();
        self.runs.push(run);
    }

    /// Removes the given runs (by identity), keeping order.
    pub fn remove_runs(&mut self, retired: &[Arc<SortedRun>]) {
        self.runs.retain(|run| {
            let keep = !retired.iter().any(|r| Arc::ptr_eq(r, run));
            if !keep {
                self.size -= run.size();
            }
            keep
        });
    }

    /// Point lookup scanning runs newest-first. The first decisive result
    /// (found or deleted) wins; a tombstone in a newer run suppresses
    /// older values.
    pub fn get(&self, user_key: &[u8], seq: SeqNum) -> Result<GetResult, LsmError> {
        for run in self.runs.iter().rev() {
            let result = run.get(user_key, seq)?;
            if result != GetResult::NotFound {
                return Ok(result);
            }
        }
        Ok(GetResult::NotFound)
    }
}
