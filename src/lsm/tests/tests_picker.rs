#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use tempfile::TempDir;

    use crate::lsm::compaction::picker::{
        CompactionPicker, FluidPicker, LazyLevelingPicker, LeveledPicker, TieredPicker,
    };
    use crate::lsm::level::SortedRun;
    use crate::lsm::tests::helpers::{build_run, init_tracing, put};
    use crate::lsm::tree::relink_trivial_move;
    use crate::lsm::version::Version;

    fn run_with_keys(
        tmp: &TempDir,
        first_id: u64,
        lo: &str,
        hi: &str,
    ) -> Arc<SortedRun> {
        build_run(
            tmp.path(),
            first_id,
            4096,
            &[&[put(lo.as_bytes(), 1, b"v"), put(hi.as_bytes(), 1, b"v")]],
        )
    }

    #[test]
    fn leveled_picks_l0_when_run_count_passes_trigger() {
        init_tracing();
        let tmp = TempDir::new().unwrap();

        let mut version = Version::new();
        for i in 0..3 {
            version
                .level_mut(0)
                .push_run(run_with_keys(&tmp, i * 10 + 1, "a", "z"));
        }

        let picker = LeveledPicker {
            ratio: 10,
            base_level_size: 1 << 30,
            level0_trigger: 2,
        };
        let compaction = picker.pick(&version).unwrap();
        assert_eq!(compaction.src_level, 0);
        assert_eq!(compaction.target_level, 1);
        assert_eq!(compaction.inputs.len(), 3);
        assert!(!compaction.trivial_move);
        assert!(compaction.target_run.is_none());
    }

    #[test]
    fn leveled_stays_quiet_below_the_trigger() {
        init_tracing();
        let tmp = TempDir::new().unwrap();

        let mut version = Version::new();
        version.level_mut(0).push_run(run_with_keys(&tmp, 1, "a", "z"));

        let picker = LeveledPicker {
            ratio: 10,
            base_level_size: 1 << 30,
            level0_trigger: 2,
        };
        assert!(picker.pick(&version).is_none());
    }

    #[test]
    fn leveled_moves_trivially_when_target_level_is_empty() {
        init_tracing();
        let tmp = TempDir::new().unwrap();

        let mut version = Version::new();
        version.level_mut(1).push_run(run_with_keys(&tmp, 1, "a", "z"));

        let picker = LeveledPicker {
            ratio: 2,
            base_level_size: 1, // any size triggers
            level0_trigger: 100,
        };
        let compaction = picker.pick(&version).unwrap();
        assert!(compaction.trivial_move);
        assert_eq!(compaction.src_level, 1);
        assert_eq!(compaction.target_level, 2);
        assert!(compaction.target_run.is_none());
    }

    #[test]
    fn leveled_picks_least_overlapping_sst() {
        init_tracing();
        let tmp = TempDir::new().unwrap();

        // L1 run: two SSTs, [a..c] and [m..p]. L2 run: [a..c] only, so
        // [m..p] has no overlap below and moves trivially.
        let l1 = build_run(
            tmp.path(),
            1,
            4096,
            &[
                &[put(b"a", 1, b"v"), put(b"c", 1, b"v")],
                &[put(b"m", 1, b"v"), put(b"p", 1, b"v")],
            ],
        );
        let l2 = run_with_keys(&tmp, 10, "a", "c");

        let mut version = Version::new();
        version.level_mut(1).push_run(l1);
        version.level_mut(2).push_run(l2);

        let picker = LeveledPicker {
            ratio: 2,
            base_level_size: 1,
            level0_trigger: 100,
        };
        let compaction = picker.pick(&version).unwrap();
        assert!(compaction.trivial_move);
        assert_eq!(compaction.input_ssts.len(), 1);
        assert_eq!(compaction.input_ssts[0].smallest().user_key, b"m".to_vec());
        // The move joins L2's existing run rather than landing beside it.
        assert!(compaction.target_run.is_some());
    }

    #[test]
    fn trivial_move_merges_into_the_existing_target_run() {
        init_tracing();
        let tmp = TempDir::new().unwrap();

        // Same shape as above: L1 holds [a..c] and [m..p], L2 holds
        // [a..c], so [m..p] moves trivially.
        let l1 = build_run(
            tmp.path(),
            1,
            4096,
            &[
                &[put(b"a", 1, b"v"), put(b"c", 1, b"v")],
                &[put(b"m", 1, b"v"), put(b"p", 1, b"v")],
            ],
        );
        let l2 = run_with_keys(&tmp, 10, "a", "c");

        let mut version = Version::new();
        version.level_mut(1).push_run(l1);
        version.level_mut(2).push_run(l2);

        let picker = LeveledPicker {
            ratio: 2,
            base_level_size: 1,
            level0_trigger: 100,
        };
        let compaction = picker.pick(&version).unwrap();
        assert!(compaction.trivial_move);
        relink_trivial_move(&mut version, &compaction);

        // The source run shrank in place.
        assert_eq!(version.levels()[1].runs().len(), 1);
        assert_eq!(version.levels()[1].runs()[0].ssts().len(), 1);

        // L2 still holds exactly one run, now covering both tables in
        // key order — no orphan run appended behind the existing one.
        let l2_runs = version.levels()[2].runs();
        assert_eq!(l2_runs.len(), 1);
        assert_eq!(l2_runs[0].ssts().len(), 2);
        assert_eq!(l2_runs[0].ssts()[0].smallest().user_key, b"a".to_vec());
        assert_eq!(l2_runs[0].ssts()[1].smallest().user_key, b"m".to_vec());
    }

    #[test]
    fn tiered_merges_the_deepest_triggered_level() {
        init_tracing();
        let tmp = TempDir::new().unwrap();

        let mut version = Version::new();
        for i in 0..2 {
            version
                .level_mut(0)
                .push_run(run_with_keys(&tmp, i * 10 + 1, "a", "z"));
        }
        for i in 0..2 {
            version
                .level_mut(1)
                .push_run(run_with_keys(&tmp, 100 + i * 10, "a", "z"));
        }

        let picker = TieredPicker {
            ratio: 2,
            base_level_size: 1 << 30,
        };
        let compaction = picker.pick(&version).unwrap();
        // Deepest level first.
        assert_eq!(compaction.src_level, 1);
        assert_eq!(compaction.target_level, 2);
        assert_eq!(compaction.inputs.len(), 2);
        assert!(compaction.target_run.is_none());
    }

    #[test]
    fn lazy_leveling_keeps_the_bottom_as_one_run() {
        init_tracing();
        let tmp = TempDir::new().unwrap();

        let mut version = Version::new();
        version.level_mut(0).push_run(run_with_keys(&tmp, 1, "a", "z"));
        version.level_mut(1).push_run(run_with_keys(&tmp, 10, "a", "m"));
        version.level_mut(1).push_run(run_with_keys(&tmp, 20, "n", "z"));

        let picker = LazyLevelingPicker {
            ratio: 8,
            base_level_size: 1 << 30,
        };
        let compaction = picker.pick(&version).unwrap();
        assert_eq!(compaction.src_level, 1);
        assert_eq!(compaction.target_level, 1);
        assert_eq!(compaction.inputs.len(), 2);
    }

    #[test]
    fn lazy_leveling_pulls_the_bottom_run_into_the_merge() {
        init_tracing();
        let tmp = TempDir::new().unwrap();

        let mut version = Version::new();
        for i in 0..2 {
            version
                .level_mut(0)
                .push_run(run_with_keys(&tmp, i * 10 + 1, "a", "z"));
        }
        version.level_mut(1).push_run(run_with_keys(&tmp, 100, "a", "z"));

        let picker = LazyLevelingPicker {
            ratio: 2,
            base_level_size: 1 << 30,
        };
        let compaction = picker.pick(&version).unwrap();
        assert_eq!(compaction.src_level, 0);
        assert_eq!(compaction.target_level, 1);
        assert!(compaction.target_run.is_some());
    }

    #[test]
    fn fluid_delegates_by_alpha() {
        init_tracing();
        let tmp = TempDir::new().unwrap();

        // One oversized run at L1: leveled (read-heavy) triggers on its
        // size, tiered (write-heavy) needs more runs.
        let mut version = Version::new();
        version.level_mut(1).push_run(run_with_keys(&tmp, 1, "a", "z"));

        let read_heavy = FluidPicker {
            alpha: 0.5,
            base_level_size: 1,
            level0_trigger: 4,
        };
        assert!(read_heavy.pick(&version).is_some());

        let write_heavy = FluidPicker {
            alpha: 0.1,
            base_level_size: 1 << 30,
            level0_trigger: 4,
        };
        assert!(write_heavy.pick(&version).is_none());
    }
}
