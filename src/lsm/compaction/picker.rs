//! Compaction pickers: leveled, tiered, lazy-leveling, and fluid.
//!
//! A picker inspects a [`Version`] and returns the next unit of work, or
//! `None` when no trigger fires. Pickers never mutate state; the tree
//! re-invokes the picker after every installation.

use std::sync::Arc;

use crate::lsm::compaction::Compaction;
use crate::lsm::sst::SSTable;
use crate::lsm::version::Version;
use crate::options::{CompactionPolicy, LsmOptions};

/// Policy interface for choosing the next compaction.
pub trait CompactionPicker: Send + Sync {
    /// Returns the next compaction to run against `version`, if any.
    fn pick(&self, version: &Version) -> Option<Compaction>;
}

/// Instantiates the picker configured by `opts.compaction`.
pub fn picker_for(opts: &LsmOptions) -> Box<dyn CompactionPicker> {
    match opts.compaction {
        CompactionPolicy::Leveled => Box::new(LeveledPicker {
            ratio: opts.ratio,
            base_level_size: opts.base_level_size,
            level0_trigger: opts.level0_compaction_trigger,
        }),
        CompactionPolicy::Tiered => Box::new(TieredPicker {
            ratio: opts.ratio,
            base_level_size: opts.base_level_size,
        }),
        CompactionPolicy::LazyLeveling => Box::new(LazyLevelingPicker {
            ratio: opts.ratio,
            base_level_size: opts.base_level_size,
        }),
        CompactionPolicy::Fluid { alpha } => Box::new(FluidPicker {
            alpha,
            base_level_size: opts.base_level_size,
            level0_trigger: opts.level0_compaction_trigger,
        }),
    }
}

fn level_size_limit(base: usize, ratio: usize, depth: usize) -> u64 {
    (base as u64).saturating_mul((ratio as u64).saturating_pow(depth as u32))
}

fn overlaps(a: &SSTable, b: &SSTable) -> bool {
    a.smallest().user_key <= b.largest().user_key && b.smallest().user_key <= a.largest().user_key
}

// ------------------------------------------------------------------------------------------------
// Leveled
// ------------------------------------------------------------------------------------------------

/// Classic leveled compaction: L0 compacts wholesale into L1 once its run
/// count passes the trigger; deeper levels compact one SSTable at a time
/// into the next level's single run when they exceed
/// `base_level_size · ratio^L`. A trivially-moved table still joins the
/// target level's run, keeping levels below L0 at exactly one run.
pub struct LeveledPicker {
    pub ratio: usize,
    pub base_level_size: usize,
    pub level0_trigger: usize,
}

impl CompactionPicker for LeveledPicker {
    fn pick(&self, version: &Version) -> Option<Compaction> {
        let levels = version.levels();

        if let Some(l0) = levels.first() {
            if l0.runs().len() > self.level0_trigger {
                return Some(Compaction {
                    inputs: l0.runs().to_vec(),
                    input_ssts: Vec::new(),
                    src_level: 0,
                    target_level: 1,
                    target_run: levels.get(1).and_then(|l| l.runs().first().cloned()),
                    trivial_move: false,
                });
            }
        }

        for (depth, level) in levels.iter().enumerate().skip(1) {
            if level.size() < level_size_limit(self.base_level_size, self.ratio, depth) {
                continue;
            }
            let run = level.runs().first()?;
            let target = levels
                .get(depth + 1)
                .and_then(|l| l.runs().first().cloned());

            let Some(target_run) = target else {
                // No run below: relink the whole run one level down.
                return Some(Compaction {
                    inputs: vec![Arc::clone(run)],
                    input_ssts: Vec::new(),
                    src_level: depth,
                    target_level: depth + 1,
                    target_run: None,
                    trivial_move: true,
                });
            };

            // One SSTable at a time: a non-overlapping candidate is
            // relinked into the run below without rewriting, otherwise
            // the one with the least overlap below is rewritten (ties:
            // first encountered).
            let mut best: Option<(u64, &Arc<SSTable>)> = None;
            for sst in run.ssts() {
                let overlap: u64 = target_run
                    .ssts()
                    .iter()
                    .filter(|t| overlaps(sst, t))
                    .map(|t| t.info().size)
                    .sum();
                if overlap == 0 {
                    return Some(Compaction {
                        inputs: Vec::new(),
                        input_ssts: vec![Arc::clone(sst)],
                        src_level: depth,
                        target_level: depth + 1,
                        target_run: Some(Arc::clone(&target_run)),
                        trivial_move: true,
                    });
                }
                if best.as_ref().is_none_or(|(least, _)| overlap < *least) {
                    best = Some((overlap, sst));
                }
            }
            let (_, sst) = best?;
            return Some(Compaction {
                inputs: Vec::new(),
                input_ssts: vec![Arc::clone(sst)],
                src_level: depth,
                target_level: depth + 1,
                target_run: Some(target_run),
                trivial_move: false,
            });
        }
        None
    }
}

// ------------------------------------------------------------------------------------------------
// Tiered
// ------------------------------------------------------------------------------------------------

/// Tiered compaction: scanning from the deepest level upward, a level
/// with at least `ratio` runs or more than `base_level_size · ratio^L`
/// bytes merges all its runs into a single new run one level deeper.
/// Outputs always form a fresh run; existing target-level runs are left
/// in place.
pub struct TieredPicker {
    pub ratio: usize,
    pub base_level_size: usize,
}

impl CompactionPicker for TieredPicker {
    fn pick(&self, version: &Version) -> Option<Compaction> {
        for (depth, level) in version.levels().iter().enumerate().rev() {
            let run_trigger = level.runs().len() >= self.ratio.max(2);
            let size_trigger =
                level.size() >= level_size_limit(self.base_level_size, self.ratio, depth);
            if !level.runs().is_empty() && (run_trigger || size_trigger) {
                return Some(Compaction {
                    inputs: level.runs().to_vec(),
                    input_ssts: Vec::new(),
                    src_level: depth,
                    target_level: depth + 1,
                    target_run: None,
                    trivial_move: false,
                });
            }
        }
        None
    }
}

// ------------------------------------------------------------------------------------------------
// Lazy leveling
// ------------------------------------------------------------------------------------------------

/// Tiered compaction with a leveled bottom: the deepest populated level is
/// maintained as a single sorted run. Merging the second-deepest level
/// pulls the bottom run in as an input.
pub struct LazyLevelingPicker {
    pub ratio: usize,
    pub base_level_size: usize,
}

impl CompactionPicker for LazyLevelingPicker {
    fn pick(&self, version: &Version) -> Option<Compaction> {
        let levels = version.levels();
        if levels.is_empty() {
            return None;
        }
        let last = levels.len() - 1;

        // Restore the single-run invariant at the bottom first.
        if levels[last].runs().len() > 1 {
            return Some(Compaction {
                inputs: levels[last].runs().to_vec(),
                input_ssts: Vec::new(),
                src_level: last,
                target_level: last,
                target_run: None,
                trivial_move: false,
            });
        }

        for depth in (0..last).rev() {
            let level = &levels[depth];
            let run_trigger = level.runs().len() >= self.ratio.max(2);
            let size_trigger =
                level.size() >= level_size_limit(self.base_level_size, self.ratio, depth);
            if !level.runs().is_empty() && (run_trigger || size_trigger) {
                let target_run = (depth + 1 == last)
                    .then(|| levels[last].runs().first().cloned())
                    .flatten();
                return Some(Compaction {
                    inputs: level.runs().to_vec(),
                    input_ssts: Vec::new(),
                    src_level: depth,
                    target_level: depth + 1,
                    target_run,
                    trivial_move: false,
                });
            }
        }
        None
    }
}

// ------------------------------------------------------------------------------------------------
// Fluid
// ------------------------------------------------------------------------------------------------

/// Workload-adaptive meta-picker: read-heavy workloads (`alpha ≥ 0.3`)
/// delegate to leveled with ratio `⌊36·alpha⌋`; write-heavy workloads
/// delegate to tiered with ratio 8.
pub struct FluidPicker {
    pub alpha: f64,
    pub base_level_size: usize,
    pub level0_trigger: usize,
}

impl CompactionPicker for FluidPicker {
    fn pick(&self, version: &Version) -> Option<Compaction> {
        if self.alpha >= 0.3 {
            let picker = LeveledPicker {
                ratio: (36.0 * self.alpha) as usize,
                base_level_size: self.base_level_size,
                level0_trigger: 1,
            };
            return picker.pick(version);
        }

        let ratio = 8;
        let sst_file_size = self.base_level_size / self.level0_trigger.max(1);
        let picker = TieredPicker {
            ratio,
            base_level_size: sst_file_size * ratio,
        };
        picker.pick(version)
    }
}
