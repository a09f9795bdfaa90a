//! # wrendb
//!
//! A small relational query core: a **cost-based join-order planner**, a
//! **vectorized execution engine**, and an **LSM-tree storage engine**
//! with a B+tree alternative behind one storage facade.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────┐
//! │                        Database                           │
//! │                                                           │
//! │   logical plan ──► optimizer ──► physical plan            │
//! │                  (subset-DP join ordering,                │
//! │                   hash-join conversion)                   │
//! │                        │                                  │
//! │                        ▼                                  │
//! │   executor factory ──► vectorized operator pipeline       │
//! │   (scan / filter / project / hash join / NL join)         │
//! │                        │ batches                          │
//! │                        ▼                                  │
//! │   storage facade:  memory │ b+tree │ lsm                  │
//! │                                    │                      │
//! │                        memtable ── flush ── SSTables      │
//! │                        compaction: leveled / tiered /     │
//! │                                    lazy-leveling / fluid  │
//! └───────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`db`] | Database facade: DDL, DML, plan execution |
//! | [`plan`] | Plan trees, predicate vectors, join-order DP planner |
//! | [`exec`] | Batched operators and expression evaluation |
//! | [`storage`] | Storage facade and the memory / B+tree backends |
//! | [`lsm`] | LSM tree: blocks, SSTables, levels, compaction |
//! | [`catalog`] | Table schemas, output schemas, statistics |
//! | [`options`] | Configuration |
//! | [`encoding`] | Deterministic binary encoding for tuples and sidecars |
//! | [`hash`] / [`bloom`] | Hash primitives and per-SSTable bloom filters |
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use wrendb::catalog::{ColumnSchema, LogicalType, TableSchema};
//! use wrendb::db::Database;
//! use wrendb::exec::batch::Field;
//! use wrendb::options::{DbOptions, StorageBackend};
//!
//! let opts = DbOptions {
//!     storage_backend: StorageBackend::Lsm,
//!     ..DbOptions::default()
//! };
//! let db = Database::open("/tmp/mydb", opts).unwrap();
//!
//! db.create_table(TableSchema::new(
//!     "users",
//!     vec![
//!         ColumnSchema::primary("id", LogicalType::Int),
//!         ColumnSchema::new("name", LogicalType::String),
//!     ],
//! ))
//! .unwrap();
//!
//! db.insert("users", vec![vec![Field::Int(1), Field::str("ada")]]).unwrap();
//!
//! let result = db.execute(db.scan_plan("users").unwrap());
//! assert!(result.ok());
//! assert_eq!(result.rows.len(), 1);
//! ```

pub mod bloom;
pub mod catalog;
pub mod db;
pub mod encoding;
pub mod exec;
pub mod hash;
pub mod lsm;
pub mod options;
pub mod plan;
pub mod storage;

pub use db::{Database, DbError, ResultSet};
pub use options::DbOptions;
