//! Version and SuperVersion snapshots.
//!
//! A [`Version`] is an immutable vector of levels. A [`SuperVersion`]
//! bundles the active memtable, the immutable memtables awaiting flush
//! (newest first), and a version. Readers clone an `Arc<SuperVersion>` at
//! query start and keep it for the query's duration; writers install
//! replacements, so a snapshot may outlive its installation. File
//! lifetimes follow the `Arc` graph: an SSTable retired from the current
//! version stays on disk until the last snapshot referencing it drops.

use std::sync::Arc;

use crate::lsm::format::{GetResult, Record, SeqNum};
use crate::lsm::iterator::{MergeIterator, VisibilityFilter};
use crate::lsm::level::Level;
use crate::lsm::memtable::MemTable;
use crate::lsm::LsmError;

// ------------------------------------------------------------------------------------------------
// Version
// ------------------------------------------------------------------------------------------------

/// Immutable snapshot of the on-disk tree: one [`Level`] per depth.
#[derive(Clone, Default)]
pub struct Version {
    levels: Vec<Level>,
}

impl Version {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn levels(&self) -> &[Level] {
        &self.levels
    }

    pub fn levels_mut(&mut self) -> &mut Vec<Level> {
        &mut self.levels
    }

    /// Ensures a level exists at `depth` and returns it mutably.
    pub fn level_mut(&mut self, depth: usize) -> &mut Level {
        while self.levels.len() <= depth {
            self.levels.push(Level::new());
        }
        &mut self.levels[depth]
    }

    /// Point lookup walking levels shallow to deep.
    pub fn get(&self, user_key: &[u8], seq: SeqNum) -> Result<GetResult, LsmError> {
        for level in &self.levels {
            let result = level.get(user_key, seq)?;
            if result != GetResult::NotFound {
                return Ok(result);
            }
        }
        Ok(GetResult::NotFound)
    }
}

// ------------------------------------------------------------------------------------------------
// SuperVersion
// ------------------------------------------------------------------------------------------------

/// A full read snapshot: active memtable, immutable memtables (newest
/// first), and the on-disk version.
pub struct SuperVersion {
    pub mem: Arc<MemTable>,
    pub imms: Vec<Arc<MemTable>>,
    pub version: Arc<Version>,
}

impl SuperVersion {
    pub fn new(mem: Arc<MemTable>, imms: Vec<Arc<MemTable>>, version: Arc<Version>) -> Self {
        Self { mem, imms, version }
    }

    /// Point lookup at snapshot `seq`: memtable, then immutable memtables
    /// newest-first, then the version. The first decisive answer wins.
    pub fn get(&self, user_key: &[u8], seq: SeqNum) -> Result<GetResult, LsmError> {
        let result = self.mem.get(user_key, seq)?;
        if result != GetResult::NotFound {
            return Ok(result);
        }
        for imm in &self.imms {
            let result = imm.get(user_key, seq)?;
            if result != GetResult::NotFound {
                return Ok(result);
            }
        }
        self.version.get(user_key, seq)
    }

    /// Merged record stream of every layer, starting at user key `lo`
    /// (or the beginning when `None`), in internal-key order. The stream
    /// is multi-version; apply a [`VisibilityFilter`] for the user view.
    pub fn record_stream(
        &self,
        lo: Option<&[u8]>,
    ) -> Result<MergeIterator<'static>, LsmError> {
        let mut sources: Vec<Box<dyn Iterator<Item = Record>>> = Vec::new();

        let mem_records = match lo {
            Some(lo) => self.mem.records_from(lo)?,
            None => self.mem.records()?,
        };
        sources.push(Box::new(mem_records.into_iter()));

        for imm in &self.imms {
            let records = match lo {
                Some(lo) => imm.records_from(lo)?,
                None => imm.records()?,
            };
            sources.push(Box::new(records.into_iter()));
        }

        for level in self.version.levels() {
            for run in level.runs() {
                let iter = match lo {
                    Some(lo) => run.seek(lo, SeqNum::MAX),
                    None => run.iter(),
                };
                sources.push(Box::new(iter));
            }
        }

        Ok(MergeIterator::new(sources))
    }

    /// User-visible scan at snapshot `seq` over user keys in
    /// `[lo, hi]`-style bounds (`None` = unbounded, `hi` inclusive flag).
    ///
    /// The returned iterator owns its sources (snapshot references
    /// included), so it may outlive this handle.
    pub fn scan(
        &self,
        lo: Option<&[u8]>,
        hi: Option<(&[u8], bool)>,
        seq: SeqNum,
    ) -> Result<Box<dyn Iterator<Item = (Vec<u8>, Vec<u8>)>>, LsmError> {
        let stream = self.record_stream(lo)?;
        let hi = hi.map(|(key, inclusive)| (key.to_vec(), inclusive));
        let visible = VisibilityFilter::new(stream, seq);
        Ok(Box::new(visible.take_while(move |(key, _)| match &hi {
            None => true,
            Some((bound, true)) => key.as_slice() <= bound.as_slice(),
            Some((bound, false)) => key.as_slice() < bound.as_slice(),
        })))
    }
}
