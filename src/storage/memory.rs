//! Ordered in-memory backend.
//!
//! Each table is a `BTreeMap` whose keys are ordered by the table's
//! [`KeyComparator`]. Deletes remove physically; scans return snapshots.

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use std::ops::Bound;
use std::sync::RwLock;

use crate::catalog::TableSchema;
use crate::storage::{KeyComparator, KvIter, RangeBound, Storage, StorageError};

/// Map key ordered by the table's comparator.
#[derive(Clone)]
struct OrdKey {
    bytes: Vec<u8>,
    cmp: KeyComparator,
}

impl PartialEq for OrdKey {
    fn eq(&self, other: &Self) -> bool {
        self.cmp.compare(&self.bytes, &other.bytes) == Ordering::Equal
    }
}

impl Eq for OrdKey {}

impl PartialOrd for OrdKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for OrdKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.cmp.compare(&self.bytes, &other.bytes)
    }
}

struct Table {
    cmp: KeyComparator,
    rows: BTreeMap<OrdKey, Vec<u8>>,
}

/// In-memory storage backend.
#[derive(Default)]
pub struct MemoryStorage {
    tables: RwLock<HashMap<String, Table>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_table<R>(
        &self,
        table: &str,
        f: impl FnOnce(&Table) -> R,
    ) -> Result<R, StorageError> {
        let tables = self
            .tables
            .read()
            .map_err(|_| StorageError::Internal("storage lock poisoned".into()))?;
        let t = tables
            .get(table)
            .ok_or_else(|| StorageError::TableNotFound(table.to_string()))?;
        Ok(f(t))
    }

    fn with_table_mut<R>(
        &self,
        table: &str,
        f: impl FnOnce(&mut Table) -> R,
    ) -> Result<R, StorageError> {
        let mut tables = self
            .tables
            .write()
            .map_err(|_| StorageError::Internal("storage lock poisoned".into()))?;
        let t = tables
            .get_mut(table)
            .ok_or_else(|| StorageError::TableNotFound(table.to_string()))?;
        Ok(f(t))
    }
}

impl Storage for MemoryStorage {
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
        tables.insert(
            schema.name.clone(),
            Table {
                cmp,
                rows: BTreeMap::new(),
            },
        );
        Ok(())
    }

    fn drop_table(&self, table: &str) -> Result<(), StorageError> {
        let mut tables = self
            .tables
            .write()
            .map_err(|_| StorageError::Internal("storage lock poisoned".into()))?;
        tables
            .remove(table)
            .map(|_| ())
            .ok_or_else(|| StorageError::TableNotFound(table.to_string()))
    }

    fn get(&self, table: &str, key: &[u8]) -> Result<Option<Vec<u8>>, StorageError> {
        self.with_table(table, |t| {
            t.rows
                .get(&OrdKey {
                    bytes: key.to_vec(),
                    cmp: t.cmp,
                })
                .cloned()
        })
    }

    fn put(&self, table: &str, key: &[u8], value: &[u8]) -> Result<(), StorageError> {
        self.with_table_mut(table, |t| {
            t.rows.insert(
                OrdKey {
                    bytes: key.to_vec(),
                    cmp: t.cmp,
                },
                value.to_vec(),
            );
        })
    }

    fn delete(&self, table: &str, key: &[u8]) -> Result<(), StorageError> {
        self.with_table_mut(table, |t| {
            t.rows.remove(&OrdKey {
                bytes: key.to_vec(),
                cmp: t.cmp,
            });
        })
    }

    fn iter(&self, table: &str) -> Result<KvIter, StorageError> {
        let rows: Vec<(Vec<u8>, Vec<u8>)> = self.with_table(table, |t| {
            t.rows
                .iter()
                .map(|(k, v)| (k.bytes.clone(), v.clone()))
                .collect()
        })?;
        Ok(Box::new(rows.into_iter()))
    }

    fn range_iter(
        &self,
        table: &str,
        lo: &RangeBound,
        hi: &RangeBound,
    ) -> Result<KvIter, StorageError> {
        let rows: Vec<(Vec<u8>, Vec<u8>)> = self.with_table(table, |t| {
            // Inverted or empty bounds: BTreeMap::range panics on them.
            if !lo.unbounded && !hi.unbounded {
                match t.cmp.compare(&lo.value, &hi.value) {
                    Ordering::Greater => return Vec::new(),
                    Ordering::Equal if !(lo.inclusive && hi.inclusive) => return Vec::new(),
                    _ => {}
                }
            }
            let wrap = |bound: &RangeBound| OrdKey {
                bytes: bound.value.clone(),
                cmp: t.cmp,
            };
            let start = if lo.unbounded {
                Bound::Unbounded
            } else if lo.inclusive {
                Bound::Included(wrap(lo))
            } else {
                Bound::Excluded(wrap(lo))
            };
            let end = if hi.unbounded {
                Bound::Unbounded
            } else if hi.inclusive {
                Bound::Included(wrap(hi))
            } else {
                Bound::Excluded(wrap(hi))
            };
            t.rows
                .range((start, end))
                .map(|(k, v)| (k.bytes.clone(), v.clone()))
                .collect()
        })?;
        Ok(Box::new(rows.into_iter()))
    }
}
