//! Engine configuration.
//!
//! [`DbOptions`] is the single configuration root passed to
//! [`Database::open`](crate::db::Database::open); the nested option
//! structs travel to the subsystems that consume them. All structs carry
//! sensible defaults so callers override only what they need:
//!
//! ```rust
//! use wrendb::options::{DbOptions, StorageBackend};
//!
//! let opts = DbOptions {
//!     storage_backend: StorageBackend::Lsm,
//!     ..DbOptions::default()
//! };
//! ```

/// Storage backend selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageBackend {
    /// Ordered in-memory tables. No persistence.
    Memory,
    /// In-memory B+tree tables with typed key comparators.
    BPlusTree,
    /// Log-structured merge trees, one per table.
    Lsm,
}

impl StorageBackend {
    /// Parses the configuration names `memory`, `b+tree`, and `lsm`.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "memory" => Some(Self::Memory),
            "b+tree" => Some(Self::BPlusTree),
            "lsm" => Some(Self::Lsm),
            _ => None,
        }
    }
}

/// Compaction policy selector for the LSM backend.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CompactionPolicy {
    /// Leveled compaction: one sorted run per level below L0.
    Leveled,
    /// Tiered compaction: runs stack up per level and merge downward.
    Tiered,
    /// Tiered everywhere except the deepest level, which is kept as a
    /// single sorted run.
    LazyLeveling,
    /// Workload-adaptive meta-policy: delegates to leveled when the
    /// read fraction `alpha` is at least 0.3, otherwise to tiered.
    Fluid {
        /// Read fraction of the workload, in `[0, 1]`.
        alpha: f64,
    },
}

/// Options for the LSM storage engine.
#[derive(Debug, Clone)]
pub struct LsmOptions {
    /// Target bytes per data block, including the record offset array.
    pub block_size: usize,

    /// Target bytes per SSTable file.
    pub sst_file_size: usize,

    /// Bloom filter bits per user key.
    pub bloom_bits_per_key: usize,

    /// Max memtable size (bytes) before rotation.
    pub write_buffer_size: usize,

    /// Bypass the OS page cache for SSTable I/O. Accepted for
    /// compatibility; reads currently go through buffered maps.
    pub use_direct_io: bool,

    /// Number of L0 runs that triggers an L0 → L1 compaction.
    pub level0_compaction_trigger: usize,

    /// Size ratio between adjacent levels.
    pub ratio: usize,

    /// Target byte size of L1.
    pub base_level_size: usize,

    /// Compaction policy.
    pub compaction: CompactionPolicy,
}

impl Default for LsmOptions {
    fn default() -> Self {
        Self {
            block_size: 4 * 1024,
            sst_file_size: 4 * 1024 * 1024,
            bloom_bits_per_key: 10,
            write_buffer_size: 4 * 1024 * 1024,
            use_direct_io: false,
            level0_compaction_trigger: 4,
            ratio: 10,
            base_level_size: 16 * 1024 * 1024,
            compaction: CompactionPolicy::Leveled,
        }
    }
}

/// Options for the cost-based optimizer.
#[derive(Debug, Clone, Default)]
pub struct OptimizerOptions {
    /// Enable the cost-based join-order planner.
    pub enable_cost_based: bool,

    /// Cost charged per scanned row.
    pub scan_cost: f64,

    /// Cost charged per row passing through a hash table.
    pub hash_join_cost: f64,

    /// Exact cardinalities keyed by table-name sets. When present these
    /// take precedence over catalog statistics.
    pub true_cardinality_hints: Option<Vec<(Vec<String>, f64)>>,
}

impl OptimizerOptions {
    /// Defaults with cost constants populated; cost-based planning stays
    /// off until enabled explicitly.
    pub fn new() -> Self {
        Self {
            enable_cost_based: false,
            scan_cost: 0.001,
            hash_join_cost: 0.01,
            true_cardinality_hints: None,
        }
    }
}

/// Options for the vectorized executors.
#[derive(Debug, Clone, Default)]
pub struct ExecOptions {
    /// Wrap non-DML plans in a predicate-transfer node.
    pub enable_predicate_transfer: bool,
}

/// Top-level configuration for a [`Database`](crate::db::Database).
#[derive(Debug, Clone)]
pub struct DbOptions {
    /// Max rows per execution batch.
    pub size_batch: usize,

    /// Node arena sizing hint for the B+tree backend, in pages.
    pub buf_pool_max_page: usize,

    /// Which storage backend serves this database.
    pub storage_backend: StorageBackend,

    /// Create the data directory if it is absent.
    pub create_if_missing: bool,

    /// LSM backend options.
    pub lsm: LsmOptions,

    /// Executor options.
    pub exec: ExecOptions,

    /// Optimizer options.
    pub optimizer: OptimizerOptions,
}

impl Default for DbOptions {
    fn default() -> Self {
        Self {
            size_batch: 1024,
            buf_pool_max_page: 1024,
            storage_backend: StorageBackend::Memory,
            create_if_missing: true,
            lsm: LsmOptions::default(),
            exec: ExecOptions::default(),
            optimizer: OptimizerOptions::new(),
        }
    }
}
