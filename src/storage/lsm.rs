//! LSM storage backend.
//!
//! One [`LsmTree`] per table, rooted in a per-table sub-directory.
//! SSTables order user keys as raw bytes, so primary keys are stored in
//! the comparator's order-preserving encoding and translated back to
//! their canonical form on the way out.

use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::sync::RwLock;

use tracing::info;

use crate::catalog::TableSchema;
use crate::lsm::LsmTree;
use crate::options::LsmOptions;
use crate::storage::{KeyComparator, KvIter, RangeBound, Storage, StorageError};

struct Table {
    tree: LsmTree,
    cmp: KeyComparator,
    dir: PathBuf,
}

/// LSM storage backend: one tree per table under `dir`.
pub struct LsmStorage {
    dir: PathBuf,
    opts: LsmOptions,
    tables: RwLock<HashMap<String, Table>>,
}

impl LsmStorage {
    pub fn new(dir: impl Into<PathBuf>, opts: LsmOptions) -> Self {
        Self {
            dir: dir.into(),
            opts,
            tables: RwLock::new(HashMap::new()),
        }
    }

    fn with_table<R>(
        &self,
        table: &str,
        f: impl FnOnce(&Table) -> Result<R, StorageError>,
    ) -> Result<R, StorageError> {
        let tables = self
            .tables
            .read()
            .map_err(|_| StorageError::Internal("storage lock poisoned".into()))?;
        let t = tables
            .get(table)
            .ok_or_else(|| StorageError::TableNotFound(table.to_string()))?;
        f(t)
    }
}

impl Storage for LsmStorage {
    fn create(&self, schema: &TableSchema) -> Result<(), StorageError> {
        let pk = schema
            .primary_key_index()
            .ok_or_else(|| StorageError::Internal("table without a primary key".into()))?;
        let cmp = KeyComparator::for_type(schema.columns[pk].ty);

        let mut tables = self
            .tables
            .write()
            .map_err(|_| StorageError::Internal("storage lock poisoned".into()))?;
        if tables.contains_key(&schema.name) {
            return Err(StorageError::TableExists(schema.name.clone()));
        }

        let table_dir = self.dir.join(&schema.name);
        let tree = LsmTree::open(&table_dir, self.opts.clone())?;
        info!(table = %schema.name, dir = ?table_dir, "created LSM table");
        tables.insert(
            schema.name.clone(),
            Table {
                tree,
                cmp,
                dir: table_dir,
            },
        );
        Ok(())
    }

    fn drop_table(&self, table: &str) -> Result<(), StorageError> {
        let mut tables = self
            .tables
            .write()
            .map_err(|_| StorageError::Internal("storage lock poisoned".into()))?;
        let t = tables
            .remove(table)
            .ok_or_else(|| StorageError::TableNotFound(table.to_string()))?;
        t.tree.close()?;
        drop(t.tree);
        fs::remove_dir_all(&t.dir)?;
        Ok(())
    }

    fn get(&self, table: &str, key: &[u8]) -> Result<Option<Vec<u8>>, StorageError> {
        self.with_table(table, |t| {
            Ok(t.tree.get(&t.cmp.encode_ordered(key))?)
        })
    }

    fn put(&self, table: &str, key: &[u8], value: &[u8]) -> Result<(), StorageError> {
        self.with_table(table, |t| {
            t.tree.put(t.cmp.encode_ordered(key), value.to_vec())?;
            Ok(())
        })
    }

    fn delete(&self, table: &str, key: &[u8]) -> Result<(), StorageError> {
        self.with_table(table, |t| {
            t.tree.delete(t.cmp.encode_ordered(key))?;
            Ok(())
        })
    }

    fn iter(&self, table: &str) -> Result<KvIter, StorageError> {
        self.with_table(table, |t| {
            let cmp = t.cmp;
            let scan = t.tree.scan(None, None)?;
            Ok(Box::new(scan.map(move |(k, v)| (cmp.decode_ordered(&k), v))) as KvIter)
        })
    }

    fn range_iter(
        &self,
        table: &str,
        lo: &RangeBound,
        hi: &RangeBound,
    ) -> Result<KvIter, StorageError> {
        self.with_table(table, |t| {
            let cmp = t.cmp;
            let lo_key = (!lo.unbounded).then(|| cmp.encode_ordered(&lo.value));
            let hi_key = (!hi.unbounded).then(|| (cmp.encode_ordered(&hi.value), hi.inclusive));

            let scan = t.tree.scan(
                lo_key.as_deref(),
                hi_key.as_ref().map(|(k, inc)| (k.as_slice(), *inc)),
            )?;

            // An exclusive lower bound is not expressible in the tree's
            // seek; drop the boundary key after the fact.
            let skip_exact = (!lo.unbounded && !lo.inclusive).then(|| cmp.encode_ordered(&lo.value));
            Ok(Box::new(scan.filter_map(move |(k, v)| {
                if skip_exact.as_deref() == Some(k.as_slice()) {
                    return None;
                }
                Some((cmp.decode_ordered(&k), v))
            })) as KvIter)
        })
    }
}
