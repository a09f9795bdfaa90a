//! # LSM Storage Engine
//!
//! A multi-threaded log-structured merge tree with block-based SSTables,
//! bloom filters, and pluggable compaction policies.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────┐
//! │                      LsmTree                           │
//! │  ┌────────────┐  ┌──────────────┐  ┌───────────────┐  │
//! │  │  Active     │  │  Immutable   │  │  Levels of    │  │
//! │  │  Memtable   │  │  Memtables   │  │  Sorted Runs  │  │
//! │  └─────┬───────┘  └──────┬───────┘  └──────┬────────┘  │
//! │        │   rotate        │   flush         │           │
//! │        └─────────►       └────────►        │           │
//! │                                            │           │
//! │  ┌─────────────────────────────────────────┘           │
//! │  │  Compaction (leveled / tiered / lazy-leveling)     │
//! │  └────────────────────────────────────────────────────┘│
//! └────────────────────────────────────────────────────────┘
//! ```
//!
//! Readers acquire an immutable [`SuperVersion`](version::SuperVersion)
//! snapshot — `(memtable, immutable memtables, version)` — at query start
//! and keep it for the query's duration. Writers install replacement
//! snapshots; files retired by compaction are unlinked when the last
//! snapshot referencing them is dropped.
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`format`] | Internal keys, record types, SSTable metadata |
//! | [`block`] | Fixed-size block builder and iterator |
//! | [`sst`] | SSTable builder, reader, and iterator |
//! | [`memtable`] | Versioned in-memory write buffer |
//! | [`iterator`] | K-way merge heap and snapshot visibility filtering |
//! | [`level`] | Sorted runs and levels |
//! | [`version`] | Version and SuperVersion snapshots |
//! | [`compaction`] | Compaction job and policy pickers |
//! | [`tree`] | The engine: write path, flush, background compaction |

pub mod block;
pub mod compaction;
pub mod format;
pub mod iterator;
pub mod level;
pub mod memtable;
pub mod sst;
pub mod tree;
pub mod version;

#[cfg(test)]
mod tests;

use thiserror::Error;

use crate::encoding::EncodingError;

pub use format::{GetResult, InternalKey, Record, RecordType, SeqNum, SstInfo};
pub use tree::LsmTree;

/// Errors returned by the LSM subsystem.
#[derive(Debug, Error)]
pub enum LsmError {
    /// Underlying I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Sidecar or tuple encoding error.
    #[error("encoding error: {0}")]
    Encoding(#[from] EncodingError),

    /// A file failed structural validation or a checksum check.
    #[error("corruption: {0}")]
    Corruption(String),

    /// A compaction was cancelled between SST boundaries.
    #[error("compaction cancelled")]
    Cancelled,

    /// Internal invariant violation or poisoned lock.
    #[error("internal error: {0}")]
    Internal(String),
}
