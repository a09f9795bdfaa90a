//! The LSM tree engine.
//!
//! Ties the storage pieces together: sequence allocation, the active
//! memtable and its rotation, flushing immutable memtables into L0, and
//! background compaction driven by the configured picker.
//!
//! ## Concurrency model
//!
//! - **Writers** are serialised by the tree's state lock; each write
//!   allocates a monotonic sequence number.
//! - **Readers** clone the current [`SuperVersion`] pointer and never
//!   block writers. A read at snapshot `S` observes every write with
//!   sequence ≤ `S` completed before the snapshot was taken.
//! - **Flush and compaction** run on one background worker; picking is
//!   re-invoked after every installation, and at most one compaction is
//!   in flight at a time. Jobs are cancellable between SST boundaries.
//! - **File lifetime** follows the `Arc` graph: SSTables retired by a
//!   compaction are tagged for removal and unlinked when the last
//!   snapshot referencing them is dropped.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::thread::JoinHandle;

use crossbeam::channel::{unbounded, Receiver, Sender};
use tracing::{debug, info, warn};

use crate::lsm::compaction::picker::picker_for;
use crate::lsm::compaction::{Compaction, CompactionJob, FileNameGenerator};
use crate::lsm::format::{GetResult, Record, SeqNum, MAX_SEQ};
use crate::lsm::iterator::MergeIterator;
use crate::lsm::level::SortedRun;
use crate::lsm::memtable::MemTable;
use crate::lsm::sst::SSTable;
use crate::lsm::version::{SuperVersion, Version};
use crate::lsm::LsmError;
use crate::options::LsmOptions;

enum WorkerMsg {
    FlushAndCompact,
    Shutdown,
}

/// Writer-side view of the tree, guarded by a mutex.
struct TreeState {
    mem: Arc<MemTable>,
    /// Immutable memtables awaiting flush, newest first.
    imms: Vec<Arc<MemTable>>,
    version: Arc<Version>,
}

struct TreeInner {
    opts: LsmOptions,
    dir: PathBuf,
    next_seq: AtomicU64,
    file_gen: FileNameGenerator,
    state: Mutex<TreeState>,
    current: RwLock<Arc<SuperVersion>>,
    /// Serialises flush/compaction work between the background worker and
    /// synchronous [`LsmTree::flush`] calls.
    work_lock: Mutex<()>,
    worker_tx: Sender<WorkerMsg>,
    worker: Mutex<Option<JoinHandle<()>>>,
    cancel: AtomicBool,
}

/// Per-level summary returned by [`LsmTree::level_stats`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LevelStats {
    /// Number of sorted runs in the level.
    pub runs: usize,
    /// Number of SSTables in the level.
    pub ssts: usize,
    /// Total byte size of the level.
    pub bytes: u64,
}

/// A log-structured merge tree over one directory.
///
/// Cheap to clone; clones share the same engine instance.
pub struct LsmTree {
    inner: Arc<TreeInner>,
}

impl Clone for LsmTree {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl LsmTree {
    /// Opens a tree rooted at `dir`, creating the directory when missing,
    /// and starts the background flush/compaction worker.
    pub fn open(dir: impl AsRef<Path>, opts: LsmOptions) -> Result<Self, LsmError> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;
        info!(?dir, "opening LSM tree");

        let mem = Arc::new(MemTable::new());
        let version = Arc::new(Version::new());
        let initial = Arc::new(SuperVersion::new(
            Arc::clone(&mem),
            Vec::new(),
            Arc::clone(&version),
        ));

        let (worker_tx, worker_rx) = unbounded();
        let inner = Arc::new(TreeInner {
            file_gen: FileNameGenerator::new(&dir),
            opts,
            dir,
            next_seq: AtomicU64::new(1),
            state: Mutex::new(TreeState {
                mem,
                imms: Vec::new(),
                version,
            }),
            current: RwLock::new(initial),
            work_lock: Mutex::new(()),
            worker_tx,
            worker: Mutex::new(None),
            cancel: AtomicBool::new(false),
        });

        let worker_inner = Arc::clone(&inner);
        let handle = std::thread::Builder::new()
            .name("lsm-worker".into())
            .spawn(move || worker_loop(worker_inner, worker_rx))?;
        *lock(&inner.worker)? = Some(handle);

        Ok(Self { inner })
    }

    /// Writes or replaces `user_key`, returning the allocated sequence.
    pub fn put(&self, user_key: Vec<u8>, value: Vec<u8>) -> Result<SeqNum, LsmError> {
        let seq = self.inner.next_seq.fetch_add(1, Ordering::SeqCst);
        let mut state = lock(&self.inner.state)?;
        state.mem.put(user_key, seq, value)?;
        self.maybe_rotate(&mut state)?;
        Ok(seq)
    }

    /// Writes a tombstone for `user_key`, returning the allocated
    /// sequence.
    pub fn delete(&self, user_key: Vec<u8>) -> Result<SeqNum, LsmError> {
        let seq = self.inner.next_seq.fetch_add(1, Ordering::SeqCst);
        let mut state = lock(&self.inner.state)?;
        state.mem.delete(user_key, seq)?;
        self.maybe_rotate(&mut state)?;
        Ok(seq)
    }

    /// Highest sequence number allocated so far.
    pub fn latest_seq(&self) -> SeqNum {
        self.inner.next_seq.load(Ordering::SeqCst).saturating_sub(1)
    }

    /// Latest visible value of `user_key`, tombstones respected.
    pub fn get(&self, user_key: &[u8]) -> Result<Option<Vec<u8>>, LsmError> {
        self.get_at(user_key, MAX_SEQ)
    }

    /// Value of `user_key` as of snapshot `seq`.
    pub fn get_at(&self, user_key: &[u8], seq: SeqNum) -> Result<Option<Vec<u8>>, LsmError> {
        let sv = self.super_version()?;
        Ok(match sv.get(user_key, seq)? {
            GetResult::Found(value) => Some(value),
            GetResult::Deleted | GetResult::NotFound => None,
        })
    }

    /// Forward scan of the latest visible state. `lo` is inclusive; `hi`
    /// carries its own inclusivity flag; `None` bounds are open.
    pub fn scan(
        &self,
        lo: Option<&[u8]>,
        hi: Option<(&[u8], bool)>,
    ) -> Result<Box<dyn Iterator<Item = (Vec<u8>, Vec<u8>)>>, LsmError> {
        self.scan_at(lo, hi, MAX_SEQ)
    }

    /// Forward scan at snapshot `seq`. The iterator owns a snapshot
    /// reference and stays valid across later installations.
    pub fn scan_at(
        &self,
        lo: Option<&[u8]>,
        hi: Option<(&[u8], bool)>,
        seq: SeqNum,
    ) -> Result<Box<dyn Iterator<Item = (Vec<u8>, Vec<u8>)>>, LsmError> {
        let sv = self.super_version()?;
        sv.scan(lo, hi, seq)
    }

    /// Rotates the active memtable (when non-empty) and synchronously
    /// flushes every immutable memtable, then compacts until stable.
    pub fn flush(&self) -> Result<(), LsmError> {
        {
            let mut state = lock(&self.inner.state)?;
            if !state.mem.is_empty() {
                self.rotate(&mut state)?;
            }
        }
        let _work = lock(&self.inner.work_lock)?;
        flush_pending(&self.inner)?;
        compact_until_stable(&self.inner)?;
        Ok(())
    }

    /// Per-level run/SST/byte counts of the current version.
    pub fn level_stats(&self) -> Result<Vec<LevelStats>, LsmError> {
        let sv = self.super_version()?;
        Ok(sv
            .version
            .levels()
            .iter()
            .map(|level| LevelStats {
                runs: level.runs().len(),
                ssts: level.runs().iter().map(|r| r.ssts().len()).sum(),
                bytes: level.size(),
            })
            .collect())
    }

    /// Number of immutable memtables awaiting flush.
    pub fn imm_count(&self) -> Result<usize, LsmError> {
        Ok(lock(&self.inner.state)?.imms.len())
    }

    /// Stops the background worker. In-flight compactions are cancelled
    /// at the next SST boundary; memtable contents are dropped (crash
    /// recovery is out of scope for this engine).
    pub fn close(&self) -> Result<(), LsmError> {
        self.inner.cancel.store(true, Ordering::Release);
        let _ = self.inner.worker_tx.send(WorkerMsg::Shutdown);
        if let Some(handle) = lock(&self.inner.worker)?.take() {
            let _ = handle.join();
        }
        info!(dir = ?self.inner.dir, "closed LSM tree");
        Ok(())
    }

    fn super_version(&self) -> Result<Arc<SuperVersion>, LsmError> {
        let guard = self
            .inner
            .current
            .read()
            .map_err(|_| LsmError::Internal("superversion lock poisoned".into()))?;
        Ok(Arc::clone(&guard))
    }

    fn maybe_rotate(&self, state: &mut TreeState) -> Result<(), LsmError> {
        if state.mem.approximate_size() >= self.inner.opts.write_buffer_size {
            self.rotate(state)?;
            let _ = self.inner.worker_tx.send(WorkerMsg::FlushAndCompact);
        }
        Ok(())
    }

    fn rotate(&self, state: &mut TreeState) -> Result<(), LsmError> {
        debug!(
            bytes = state.mem.approximate_size(),
            imms = state.imms.len(),
            "rotating memtable"
        );
        let full = std::mem::replace(&mut state.mem, Arc::new(MemTable::new()));
        state.imms.insert(0, full);
        install_super_version(&self.inner, state)
    }
}

impl Drop for LsmTree {
    fn drop(&mut self) {
        // Last handle going away: stop the worker so the thread's Arc is
        // released. Worker handles also hold `inner`, hence the count of 2.
        if Arc::strong_count(&self.inner) <= 2 {
            let _ = self.close();
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> Result<std::sync::MutexGuard<'_, T>, LsmError> {
    mutex
        .lock()
        .map_err(|_| LsmError::Internal("lsm tree lock poisoned".into()))
}

fn install_super_version(inner: &TreeInner, state: &TreeState) -> Result<(), LsmError> {
    let sv = Arc::new(SuperVersion::new(
        Arc::clone(&state.mem),
        state.imms.clone(),
        Arc::clone(&state.version),
    ));
    *inner
        .current
        .write()
        .map_err(|_| LsmError::Internal("superversion lock poisoned".into()))? = sv;
    Ok(())
}

// ------------------------------------------------------------------------------------------------
// Background worker
// ------------------------------------------------------------------------------------------------

fn worker_loop(inner: Arc<TreeInner>, rx: Receiver<WorkerMsg>) {
    while let Ok(msg) = rx.recv() {
        match msg {
            WorkerMsg::Shutdown => break,
            WorkerMsg::FlushAndCompact => {
                let Ok(_work) = inner.work_lock.lock() else {
                    break;
                };
                if let Err(e) = flush_pending(&inner) {
                    warn!(%e, "background flush failed");
                    continue;
                }
                match compact_until_stable(&inner) {
                    Ok(()) => {}
                    Err(LsmError::Cancelled) => break,
                    Err(e) => warn!(%e, "background compaction failed"),
                }
            }
        }
    }
}

/// Flushes immutable memtables oldest-first until none remain.
fn flush_pending(inner: &TreeInner) -> Result<(), LsmError> {
    loop {
        let imm = {
            let state = lock(&inner.state)?;
            state.imms.last().cloned()
        };
        let Some(imm) = imm else {
            return Ok(());
        };

        let job = CompactionJob::new(&inner.file_gen, &inner.opts, &inner.cancel);
        let infos = job.run(imm.records()?.into_iter())?;

        let mut ssts = Vec::with_capacity(infos.len());
        for info in infos {
            ssts.push(Arc::new(SSTable::open(info)?));
        }

        let mut state = lock(&inner.state)?;
        state.imms.pop();
        if !ssts.is_empty() {
            let run = Arc::new(SortedRun::new(ssts));
            let mut version = (*state.version).clone();
            version.level_mut(0).push_run(run);
            state.version = Arc::new(version);
        }
        install_super_version(inner, &state)?;
        debug!(imms_left = state.imms.len(), "flushed immutable memtable");
    }
}

/// Runs the configured picker to exhaustion, re-picking after every
/// installation.
fn compact_until_stable(inner: &TreeInner) -> Result<(), LsmError> {
    let picker = picker_for(&inner.opts);
    loop {
        if inner.cancel.load(Ordering::Acquire) {
            return Err(LsmError::Cancelled);
        }
        let version = Arc::clone(&lock(&inner.state)?.version);
        let Some(compaction) = picker.pick(&version) else {
            return Ok(());
        };

        if compaction.trivial_move {
            let mut state = lock(&inner.state)?;
            apply_trivial_move(&mut state, &compaction);
            install_super_version(inner, &state)?;
            debug!(
                src = compaction.src_level,
                target = compaction.target_level,
                "trivial move"
            );
            continue;
        }

        let mut sources: Vec<Box<dyn Iterator<Item = Record>>> = Vec::new();
        for run in &compaction.inputs {
            sources.push(Box::new(run.iter()));
        }
        for sst in &compaction.input_ssts {
            sources.push(Box::new(sst.iter()));
        }
        if let Some(run) = &compaction.target_run {
            sources.push(Box::new(run.iter()));
        }

        let job = CompactionJob::new(&inner.file_gen, &inner.opts, &inner.cancel);
        let infos = job.run(MergeIterator::new(sources))?;

        let mut ssts = Vec::with_capacity(infos.len());
        for info in infos {
            ssts.push(Arc::new(SSTable::open(info)?));
        }

        let mut state = lock(&inner.state)?;
        apply_compaction(&mut state, &compaction, ssts);
        install_super_version(inner, &state)?;
        debug!(
            src = compaction.src_level,
            target = compaction.target_level,
            input_bytes = compaction.input_bytes(),
            "installed compaction"
        );
    }
}

/// Relinks trivially-moved inputs at the target level without rewriting.
fn apply_trivial_move(state: &mut TreeState, compaction: &Compaction) {
    let mut version = (*state.version).clone();
    relink_trivial_move(&mut version, compaction);
    state.version = Arc::new(version);
}

/// Relinks a trivial move inside a version. When the target level already
/// holds a run, the moved tables merge into it — a replacement run over
/// the same (unrewritten) files — so leveled levels keep exactly one run.
/// Without a target run the inputs land as new runs.
pub(crate) fn relink_trivial_move(version: &mut Version, compaction: &Compaction) {
    remove_inputs(version, compaction);

    let mut moved: Vec<Arc<SSTable>> = Vec::new();
    for run in &compaction.inputs {
        moved.extend(run.ssts().iter().cloned());
    }
    moved.extend(compaction.input_ssts.iter().cloned());

    let target = version.level_mut(compaction.target_level);
    match &compaction.target_run {
        Some(existing) => {
            let mut ssts = existing.ssts().to_vec();
            ssts.extend(moved);
            ssts.sort_by(|a, b| a.smallest().user_key.cmp(&b.smallest().user_key));
            target.remove_runs(std::slice::from_ref(existing));
            target.push_run(Arc::new(SortedRun::new(ssts)));
        }
        None => {
            for run in &compaction.inputs {
                target.push_run(Arc::clone(run));
            }
            if !compaction.input_ssts.is_empty() {
                target.push_run(Arc::new(SortedRun::new(compaction.input_ssts.clone())));
            }
        }
    }
}

/// Installs compaction outputs, retiring the inputs. Retired files are
/// tagged and unlinked once the last snapshot referencing them drops.
fn apply_compaction(state: &mut TreeState, compaction: &Compaction, ssts: Vec<Arc<SSTable>>) {
    let mut version = (*state.version).clone();

    remove_inputs(&mut version, compaction);
    for run in &compaction.inputs {
        run.set_remove_tag(true);
    }
    for sst in &compaction.input_ssts {
        sst.set_remove_tag(true);
    }

    if let Some(target_run) = &compaction.target_run {
        version
            .level_mut(compaction.target_level)
            .remove_runs(std::slice::from_ref(target_run));
        target_run.set_remove_tag(true);
    }

    if !ssts.is_empty() {
        version
            .level_mut(compaction.target_level)
            .push_run(Arc::new(SortedRun::new(ssts)));
    }

    state.version = Arc::new(version);
}

fn remove_inputs(version: &mut Version, compaction: &Compaction) {
    let src = version.level_mut(compaction.src_level);
    src.remove_runs(&compaction.inputs);

    if !compaction.input_ssts.is_empty() {
        // Individual SSTs come out of the level's single run; rebuild it
        // from the survivors.
        if let Some(run) = src.runs().first().cloned() {
            let remaining: Vec<Arc<SSTable>> = run
                .ssts()
                .iter()
                .filter(|sst| {
                    !compaction
                        .input_ssts
                        .iter()
                        .any(|picked| Arc::ptr_eq(picked, sst))
                })
                .cloned()
                .collect();
            src.remove_runs(std::slice::from_ref(&run));
            if !remaining.is_empty() {
                src.push_run(Arc::new(SortedRun::new(remaining)));
            }
        }
    }
}
