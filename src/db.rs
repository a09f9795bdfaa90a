//! Database facade.
//!
//! Ties the pieces together: the catalog of table schemas and statistics,
//! the configured storage backend, the optimizer, and the executor
//! factory. A parsed statement arrives here as a logical [`PlanNode`]
//! tree (the SQL front-end is an external collaborator); [`Database::execute`]
//! optimizes it, runs it, and packages rows or the error into a
//! [`ResultSet`].
//!
//! DDL is serialised under an exclusive catalog lock. DML statements
//! (insert, delete, update) are executed here against the storage facade;
//! everything else runs through the vectorized operator pipeline.

use std::path::{Path, PathBuf};
use std::sync::RwLock;

use thiserror::Error;
use tracing::{debug, info};

use crate::catalog::{Catalog, CatalogError, OutputSchema, TableSchema};
use crate::exec::batch::{encode_key, encode_row, Field};
use crate::exec::executor::build_executor;
use crate::exec::expr::Expr;
use crate::exec::ExecError;
use crate::options::{DbOptions, StorageBackend};
use crate::plan::optimizer::CostBasedOptimizer;
use crate::plan::{PlanNode, PlanOp};
use crate::storage::{open_storage, RangeBound, Storage, StorageError};

// ------------------------------------------------------------------------------------------------
// Error Types
// ------------------------------------------------------------------------------------------------

/// Planning errors: the statement references schema objects that do not
/// exist or do not line up.
#[derive(Debug, Error)]
pub enum PlanError {
    /// The statement references an unknown table.
    #[error("unknown table `{0}`")]
    UnknownTable(String),

    /// The statement references an unknown column.
    #[error("unknown column `{0}`")]
    UnknownColumn(String),

    /// Row shape or value types contradict the table schema.
    #[error("schema mismatch: {0}")]
    SchemaMismatch(String),
}

/// Top-level database errors.
#[derive(Debug, Error)]
pub enum DbError {
    /// The database could not be opened.
    #[error("cannot open database: {0}")]
    Open(String),

    /// Catalog error (DDL).
    #[error(transparent)]
    Catalog(#[from] CatalogError),

    /// Planning error.
    #[error(transparent)]
    Plan(#[from] PlanError),

    /// Storage error.
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// Execution error.
    #[error(transparent)]
    Exec(#[from] ExecError),

    /// Internal invariant violation or poisoned lock.
    #[error("internal error: {0}")]
    Internal(String),
}

// ------------------------------------------------------------------------------------------------
// ResultSet
// ------------------------------------------------------------------------------------------------

/// Outcome of one executed statement.
///
/// Errors do not propagate out of [`Database::execute`]; they are
/// packaged here and the query short-circuits.
#[derive(Debug, Default)]
pub struct ResultSet {
    /// Output rows of a query; empty for DML.
    pub rows: Vec<Vec<Field>>,
    /// Rows written or removed by a DML statement.
    pub affected: usize,
    /// Error message when the statement failed.
    pub error: Option<String>,
}

impl ResultSet {
    fn from_error(e: impl std::fmt::Display) -> Self {
        Self {
            rows: Vec::new(),
            affected: 0,
            error: Some(e.to_string()),
        }
    }

    /// Whether the statement completed without error.
    pub fn ok(&self) -> bool {
        self.error.is_none()
    }
}

// ------------------------------------------------------------------------------------------------
// Database
// ------------------------------------------------------------------------------------------------

/// One database instance: catalog + storage + planner + executors.
pub struct Database {
    catalog: RwLock<Catalog>,
    storage: Box<dyn Storage>,
    opts: DbOptions,
    #[allow(dead_code)]
    dir: PathBuf,
}

impl Database {
    /// Opens a database rooted at `path` with the given options.
    ///
    /// For the LSM backend the directory is created when missing and
    /// `create_if_missing` is set; in-memory backends accept any path.
    pub fn open(path: impl AsRef<Path>, opts: DbOptions) -> Result<Self, DbError> {
        let dir = path.as_ref().to_path_buf();
        if opts.storage_backend == StorageBackend::Lsm && !dir.exists() {
            if !opts.create_if_missing {
                return Err(DbError::Open(format!(
                    "data directory {dir:?} does not exist and create_if_missing is off"
                )));
            }
            std::fs::create_dir_all(&dir).map_err(|e| DbError::Open(e.to_string()))?;
        }

        let storage = open_storage(&dir, &opts)?;
        info!(?dir, backend = ?opts.storage_backend, "opened database");
        Ok(Self {
            catalog: RwLock::new(Catalog::new()),
            storage,
            opts,
            dir,
        })
    }

    /// The configured options.
    pub fn options(&self) -> &DbOptions {
        &self.opts
    }

    /// Direct access to the storage facade.
    pub fn storage(&self) -> &dyn Storage {
        self.storage.as_ref()
    }

    // --------------------------------------------------------------------------------------------
    // DDL
    // --------------------------------------------------------------------------------------------

    /// Creates a table in the catalog and the storage backend.
    pub fn create_table(&self, schema: TableSchema) -> Result<usize, DbError> {
        let mut catalog = self.catalog_mut()?;
        let table_id = catalog.add_table(schema.clone())?;
        if let Err(e) = self.storage.create(&schema) {
            catalog.remove_table(&schema.name).ok();
            return Err(e.into());
        }
        debug!(table = %schema.name, table_id, "created table");
        Ok(table_id)
    }

    /// Drops a table from the storage backend and the catalog.
    pub fn drop_table(&self, name: &str) -> Result<(), DbError> {
        let mut catalog = self.catalog_mut()?;
        self.storage.drop_table(name)?;
        catalog.remove_table(name)?;
        debug!(table = %name, "dropped table");
        Ok(())
    }

    // --------------------------------------------------------------------------------------------
    // Plan construction helpers
    // --------------------------------------------------------------------------------------------

    /// Sequential-scan plan over `table`.
    pub fn scan_plan(&self, table: &str) -> Result<PlanNode, DbError> {
        let catalog = self.catalog_ref()?;
        let (table_id, schema) = catalog
            .table(table)
            .map_err(|_| PlanError::UnknownTable(table.to_string()))?;
        Ok(PlanNode::seq_scan(
            table,
            table_id,
            OutputSchema::from_table(schema, table_id),
        ))
    }

    /// Range-scan plan over `table`'s primary key.
    pub fn range_scan_plan(
        &self,
        table: &str,
        lo: RangeBound,
        hi: RangeBound,
    ) -> Result<PlanNode, DbError> {
        let catalog = self.catalog_ref()?;
        let (table_id, schema) = catalog
            .table(table)
            .map_err(|_| PlanError::UnknownTable(table.to_string()))?;
        Ok(PlanNode::range_scan(
            table,
            table_id,
            OutputSchema::from_table(schema, table_id),
            lo,
            hi,
        ))
    }

    /// Column-reference expression for `table.column`.
    pub fn column(&self, table: &str, column: &str) -> Result<Expr, DbError> {
        let catalog = self.catalog_ref()?;
        let (table_id, schema) = catalog
            .table(table)
            .map_err(|_| PlanError::UnknownTable(table.to_string()))?;
        let idx = schema
            .column_index(column)
            .ok_or_else(|| PlanError::UnknownColumn(format!("{table}.{column}")))?;
        Ok(Expr::column(table_id, idx, schema.columns[idx].ty))
    }

    // --------------------------------------------------------------------------------------------
    // DML helpers
    // --------------------------------------------------------------------------------------------

    /// Inserts rows, enforcing schema shape and primary-key uniqueness.
    pub fn insert(&self, table: &str, rows: Vec<Vec<Field>>) -> Result<usize, DbError> {
        let (pk_idx, types, name) = {
            let catalog = self.catalog_ref()?;
            let (_, schema) = catalog
                .table(table)
                .map_err(|_| PlanError::UnknownTable(table.to_string()))?;
            let pk = schema
                .primary_key_index()
                .ok_or_else(|| DbError::Internal("table without a primary key".into()))?;
            (pk, schema.types(), schema.name.clone())
        };

        for row in &rows {
            if row.len() != types.len() {
                return Err(PlanError::SchemaMismatch(format!(
                    "row has {} values, table `{name}` has {} columns",
                    row.len(),
                    types.len()
                ))
                .into());
            }
            for (field, ty) in row.iter().zip(&types) {
                if field.ty() != *ty {
                    return Err(PlanError::SchemaMismatch(format!(
                        "value {field:?} does not match column type {ty:?}"
                    ))
                    .into());
                }
            }
        }

        let mut written = 0;
        for row in rows {
            let key = encode_key(&row[pk_idx]);
            if self.storage.get(table, &key)?.is_some() {
                return Err(StorageError::DuplicateKey.into());
            }
            let value = encode_row(&row).map_err(ExecError::Encoding)?;
            self.storage.put(table, &key, &value)?;
            written += 1;
        }
        self.catalog_mut()?.bump_row_count(table, written as f64);
        Ok(written)
    }

    /// Latest visible row for a primary key.
    pub fn get_row(&self, table: &str, key: &Field) -> Result<Option<Vec<Field>>, DbError> {
        let types = {
            let catalog = self.catalog_ref()?;
            let (_, schema) = catalog
                .table(table)
                .map_err(|_| PlanError::UnknownTable(table.to_string()))?;
            schema.types()
        };
        match self.storage.get(table, &encode_key(key))? {
            Some(bytes) => Ok(Some(
                crate::exec::batch::decode_row(&bytes, &types).map_err(ExecError::Encoding)?,
            )),
            None => Ok(None),
        }
    }

    /// Deletes one row by primary key; returns whether it existed.
    pub fn delete_row(&self, table: &str, key: &Field) -> Result<bool, DbError> {
        let encoded = encode_key(key);
        let existed = self.storage.get(table, &encoded)?.is_some();
        self.storage.delete(table, &encoded)?;
        if existed {
            self.catalog_mut()?.bump_row_count(table, -1.0);
        }
        Ok(existed)
    }

    // --------------------------------------------------------------------------------------------
    // Execution
    // --------------------------------------------------------------------------------------------

    /// Runs the optimizer only, returning the physical plan. Useful for
    /// inspecting join orders and costs without executing.
    pub fn optimize(&self, plan: PlanNode) -> Result<PlanNode, DbError> {
        let catalog = self.catalog_ref()?;
        Ok(CostBasedOptimizer::optimize(
            plan,
            &catalog,
            &self.opts.optimizer,
            &self.opts.exec,
        ))
    }

    /// Optimizes and executes a plan. Errors are packaged into the
    /// returned [`ResultSet`].
    pub fn execute(&self, plan: PlanNode) -> ResultSet {
        let plan = match self.optimize(plan) {
            Ok(plan) => plan,
            Err(e) => return ResultSet::from_error(e),
        };

        let result = if plan.is_dml() {
            self.execute_dml(&plan)
        } else {
            self.execute_query(&plan)
        };
        match result {
            Ok(result) => result,
            Err(e) => ResultSet::from_error(e),
        }
    }

    fn execute_query(&self, plan: &PlanNode) -> Result<ResultSet, DbError> {
        let mut executor = build_executor(plan, self.storage.as_ref(), self.opts.size_batch)?;
        executor.init()?;

        let mut rows = Vec::new();
        loop {
            let batch = executor.next()?;
            if batch.is_empty() {
                break;
            }
            for i in batch.selected_rows() {
                rows.push(batch.row(i));
            }
        }
        Ok(ResultSet {
            rows,
            affected: 0,
            error: None,
        })
    }

    fn execute_dml(&self, plan: &PlanNode) -> Result<ResultSet, DbError> {
        let child = plan
            .child
            .as_deref()
            .ok_or_else(|| DbError::Internal("DML node missing its child".into()))?;
        let input = self.execute_query(child)?;

        let affected = match &plan.op {
            PlanOp::Insert { table } => self.insert(table, input.rows)?,

            PlanOp::Delete { table } => {
                let pk_pos = self.pk_position(table, child)?;
                let mut removed = 0;
                for row in input.rows {
                    if self.delete_row(table, &row[pk_pos])? {
                        removed += 1;
                    }
                }
                removed
            }

            PlanOp::Update { table, sets } => {
                let pk_pos = self.pk_position(table, child)?;
                let (table_id, ncols) = {
                    let catalog = self.catalog_ref()?;
                    let (id, schema) = catalog
                        .table(table)
                        .map_err(|_| PlanError::UnknownTable(table.to_string()))?;
                    (id, schema.columns.len())
                };
                let mut updated = 0;
                for row in input.rows {
                    let mut new_row = Vec::with_capacity(ncols);
                    for col in 0..ncols {
                        let pos = child.output_schema.position(table_id, col).ok_or_else(|| {
                            PlanError::SchemaMismatch(format!(
                                "update input does not carry column {col} of `{table}`"
                            ))
                        })?;
                        new_row.push(row[pos].clone());
                    }
                    for (col, expr) in sets {
                        new_row[*col] = expr.eval_row(&child.output_schema, &row)?;
                    }
                    let key = encode_key(&row[pk_pos]);
                    let value = encode_row(&new_row).map_err(ExecError::Encoding)?;
                    self.storage.put(table, &key, &value)?;
                    updated += 1;
                }
                updated
            }

            _ => return Err(DbError::Internal("not a DML node".into())),
        };

        Ok(ResultSet {
            rows: Vec::new(),
            affected,
            error: None,
        })
    }

    /// Position of `table`'s primary key column within `child`'s output.
    fn pk_position(&self, table: &str, child: &PlanNode) -> Result<usize, DbError> {
        let catalog = self.catalog_ref()?;
        let (table_id, schema) = catalog
            .table(table)
            .map_err(|_| PlanError::UnknownTable(table.to_string()))?;
        let pk = schema
            .primary_key_index()
            .ok_or_else(|| DbError::Internal("table without a primary key".into()))?;
        child
            .output_schema
            .position(table_id, pk)
            .ok_or_else(|| {
                PlanError::SchemaMismatch(format!(
                    "DML input does not carry the primary key of `{table}`"
                ))
                .into()
            })
    }

    fn catalog_ref(&self) -> Result<std::sync::RwLockReadGuard<'_, Catalog>, DbError> {
        self.catalog
            .read()
            .map_err(|_| DbError::Internal("catalog lock poisoned".into()))
    }

    fn catalog_mut(&self) -> Result<std::sync::RwLockWriteGuard<'_, Catalog>, DbError> {
        self.catalog
            .write()
            .map_err(|_| DbError::Internal("catalog lock poisoned".into()))
    }
}
