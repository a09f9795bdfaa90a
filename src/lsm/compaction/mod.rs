//! Compaction: job execution and policy pickers.
//!
//! A compaction is described by a [`Compaction`] value produced by one of
//! the [`picker`] policies and executed by [`CompactionJob`]: the inputs
//! are merged into an internal-key-ordered stream, deduplicated per user
//! key (highest sequence wins), and rewritten as a sequence of SSTables
//! each at most `sst_file_size` bytes.
//!
//! Jobs are cooperatively cancellable between SST boundaries; a cancelled
//! job deletes the SSTables it already produced and returns
//! [`LsmError::Cancelled`], leaving the previous version authoritative.

pub mod picker;

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use tracing::{debug, warn};

use crate::lsm::format::{Record, SstInfo};
use crate::lsm::level::SortedRun;
use crate::lsm::sst::{sidecar_path, SSTable, SstBuilder};
use crate::lsm::LsmError;
use crate::options::LsmOptions;

// ------------------------------------------------------------------------------------------------
// Compaction description
// ------------------------------------------------------------------------------------------------

/// One unit of compaction work picked by a policy.
pub struct Compaction {
    /// Whole runs consumed from the source level.
    pub inputs: Vec<Arc<SortedRun>>,
    /// Individual SSTables consumed from the source level's single run
    /// (leveled compaction below L0). Empty when whole runs are consumed.
    pub input_ssts: Vec<Arc<SSTable>>,
    /// Level the inputs come from.
    pub src_level: usize,
    /// Level the output run lands in.
    pub target_level: usize,
    /// An existing run at the target level that the output replaces.
    /// Under `trivial_move` the moved tables are relinked into this run
    /// instead of being rewritten. `None` when the output simply becomes
    /// a new run.
    pub target_run: Option<Arc<SortedRun>>,
    /// When set, the inputs are relinked at the target level without
    /// rewriting any file.
    pub trivial_move: bool,
}

impl Compaction {
    /// Total input bytes, target run included.
    pub fn input_bytes(&self) -> u64 {
        let runs: u64 = self.inputs.iter().map(|r| r.size()).sum();
        let ssts: u64 = self.input_ssts.iter().map(|s| s.info().size).sum();
        runs + ssts + self.target_run.as_ref().map_or(0, |r| r.size())
    }
}

// ------------------------------------------------------------------------------------------------
// File name generation
// ------------------------------------------------------------------------------------------------

/// Engine-scoped monotonic SSTable file-name generator.
pub struct FileNameGenerator {
    dir: PathBuf,
    next_id: AtomicU64,
}

impl FileNameGenerator {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            next_id: AtomicU64::new(1),
        }
    }

    /// Allocates the next `(path, sst_id)` pair.
    pub fn generate(&self) -> (PathBuf, u64) {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        (self.dir.join(format!("{id:06}.sst")), id)
    }
}

// ------------------------------------------------------------------------------------------------
// CompactionJob
// ------------------------------------------------------------------------------------------------

/// Rewrites an ordered record stream into a sequence of SSTables.
pub struct CompactionJob<'a> {
    file_gen: &'a FileNameGenerator,
    opts: &'a LsmOptions,
    cancel: &'a AtomicBool,
}

impl<'a> CompactionJob<'a> {
    pub fn new(
        file_gen: &'a FileNameGenerator,
        opts: &'a LsmOptions,
        cancel: &'a AtomicBool,
    ) -> Self {
        Self {
            file_gen,
            opts,
            cancel,
        }
    }

    /// Consumes `input` (internal-key ordered) and emits SSTables.
    ///
    /// Adjacent records with the same user key are deduplicated: the
    /// first — highest-sequence — record wins and older versions are
    /// dropped. Output rotates to a new SSTable when the accumulated
    /// record bytes would exceed `sst_file_size`.
    pub fn run(
        &self,
        input: impl Iterator<Item = Record>,
    ) -> Result<Vec<SstInfo>, LsmError> {
        let mut outputs: Vec<SstInfo> = Vec::new();
        let mut builder: Option<SstBuilder> = None;
        let mut builder_bytes: u64 = 0;
        let mut last_user_key: Option<Vec<u8>> = None;

        let result = (|| {
            for record in input {
                if last_user_key.as_deref() == Some(record.key.user_key.as_slice()) {
                    continue; // Older version of the key just emitted.
                }
                last_user_key = Some(record.key.user_key.clone());

                let record_bytes = (record.encoded_len() + 4) as u64;
                if let Some(current) = builder.take() {
                    if builder_bytes + record_bytes > self.opts.sst_file_size as u64 {
                        outputs.push(current.finish()?);
                        builder_bytes = 0;
                        if self.cancel.load(Ordering::Acquire) {
                            return Err(LsmError::Cancelled);
                        }
                    } else {
                        builder = Some(current);
                    }
                }

                let current = match builder.as_mut() {
                    Some(current) => current,
                    None => {
                        let (path, sst_id) = self.file_gen.generate();
                        builder = Some(SstBuilder::new(
                            path,
                            sst_id,
                            self.opts.block_size,
                            self.opts.bloom_bits_per_key,
                        )?);
                        builder
                            .as_mut()
                            .ok_or_else(|| LsmError::Internal("builder vanished".into()))?
                    }
                };
                current.append(record.key, &record.value)?;
                builder_bytes += record_bytes;
            }

            if let Some(current) = builder.take() {
                if current.count() > 0 {
                    outputs.push(current.finish()?);
                }
            }
            Ok(())
        })();

        match result {
            Ok(()) => {
                debug!(
                    outputs = outputs.len(),
                    bytes = outputs.iter().map(|o| o.size).sum::<u64>(),
                    "compaction job finished"
                );
                Ok(outputs)
            }
            Err(e) => {
                // Discard partial outputs; the previous version stays
                // authoritative.
                for info in &outputs {
                    remove_output(&info.path);
                }
                Err(e)
            }
        }
    }
}

fn remove_output(path: &Path) {
    if let Err(e) = fs::remove_file(path) {
        warn!(?path, %e, "failed to remove discarded compaction output");
    }
    if let Err(e) = fs::remove_file(sidecar_path(path)) {
        warn!(?path, %e, "failed to remove discarded compaction sidecar");
    }
}
