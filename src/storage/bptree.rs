//! B+tree backend.
//!
//! An in-memory B+tree per table, parameterized by the table's
//! [`KeyComparator`]: integer keys (4- or 8-byte encodings widen to 64
//! bits), float keys, or lexicographic string keys. Leaves are chained
//! for range scans. Nodes live in an arena indexed by page id;
//! `buf_pool_max_page` sizes the arena's initial capacity.
//!
//! Deletion is lazy: keys are removed from their leaf without rebalancing.
//! Underfull or empty leaves are tolerated by search and skipped by the
//! leaf chain during scans.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::RwLock;

use crate::catalog::TableSchema;
use crate::storage::{KeyComparator, KvIter, RangeBound, Storage, StorageError};

/// Max keys per node before a split.
const NODE_ORDER: usize = 64;

// ------------------------------------------------------------------------------------------------
// Tree
// ------------------------------------------------------------------------------------------------

enum Node {
    Internal {
        /// `keys[i]` separates `children[i]` (keys < it) from
        /// `children[i + 1]` (keys ≥ it).
        keys: Vec<Vec<u8>>,
        children: Vec<usize>,
    },
    Leaf {
        keys: Vec<Vec<u8>>,
        values: Vec<Vec<u8>>,
        next: Option<usize>,
    },
}

/// One table's B+tree.
pub struct BPlusTree {
    cmp: KeyComparator,
    nodes: Vec<Node>,
    root: usize,
    len: usize,
}

impl BPlusTree {
    pub fn new(cmp: KeyComparator, capacity_hint: usize) -> Self {
        let mut nodes = Vec::with_capacity(capacity_hint.clamp(1, 1 << 20));
        nodes.push(Node::Leaf {
            keys: Vec::new(),
            values: Vec::new(),
            next: None,
        });
        Self {
            cmp,
            nodes,
            root: 0,
            len: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Walks from the root to the leaf responsible for `key`, recording
    /// `(internal_node, child_position)` along the way.
    fn find_leaf(&self, key: &[u8]) -> (usize, Vec<(usize, usize)>) {
        let mut path = Vec::new();
        let mut node = self.root;
        loop {
            match &self.nodes[node] {
                Node::Leaf { .. } => return (node, path),
                Node::Internal { keys, children } => {
                    let pos = keys.partition_point(|k| self.cmp.compare(k, key).is_le());
                    path.push((node, pos));
                    node = children[pos];
                }
            }
        }
    }

    pub fn get(&self, key: &[u8]) -> Option<Vec<u8>> {
        let (leaf, _) = self.find_leaf(key);
        let Node::Leaf { keys, values, .. } = &self.nodes[leaf] else {
            return None;
        };
        keys.binary_search_by(|k| self.cmp.compare(k, key))
            .ok()
            .map(|pos| values[pos].clone())
    }

    /// Inserts or replaces; returns `true` when the key was new.
    pub fn insert(&mut self, key: &[u8], value: &[u8]) -> bool {
        let (leaf, path) = self.find_leaf(key);
        let Node::Leaf { keys, values, .. } = &mut self.nodes[leaf] else {
            return false;
        };
        match keys.binary_search_by(|k| self.cmp.compare(k, key)) {
            Ok(pos) => {
                values[pos] = value.to_vec();
                return false;
            }
            Err(pos) => {
                keys.insert(pos, key.to_vec());
                values.insert(pos, value.to_vec());
            }
        }
        self.len += 1;

        if leaf_len(&self.nodes[leaf]) > NODE_ORDER {
            self.split(leaf, path);
        }
        true
    }

    /// Removes `key`; returns `true` when it was present. No rebalancing.
    pub fn remove(&mut self, key: &[u8]) -> bool {
        let (leaf, _) = self.find_leaf(key);
        let Node::Leaf { keys, values, .. } = &mut self.nodes[leaf] else {
            return false;
        };
        match keys.binary_search_by(|k| self.cmp.compare(k, key)) {
            Ok(pos) => {
                keys.remove(pos);
                values.remove(pos);
                self.len -= 1;
                true
            }
            Err(_) => false,
        }
    }

    fn split(&mut self, node: usize, mut path: Vec<(usize, usize)>) {
        let (separator, sibling) = match &mut self.nodes[node] {
            Node::Leaf { keys, values, next } => {
                let mid = keys.len() / 2;
                let sibling_keys = keys.split_off(mid);
                let sibling_values = values.split_off(mid);
                let separator = sibling_keys[0].clone();
                let sibling = Node::Leaf {
                    keys: sibling_keys,
                    values: sibling_values,
                    next: next.take(),
                };
                (separator, sibling)
            }
            Node::Internal { keys, children } => {
                let mid = keys.len() / 2;
                let mut sibling_keys = keys.split_off(mid);
                let separator = sibling_keys.remove(0);
                let sibling_children = children.split_off(mid + 1);
                let sibling = Node::Internal {
                    keys: sibling_keys,
                    children: sibling_children,
                };
                (separator, sibling)
            }
        };

        let sibling_id = self.nodes.len();
        self.nodes.push(sibling);
        if let Node::Leaf { next, .. } = &mut self.nodes[node] {
            *next = Some(sibling_id);
        }

        match path.pop() {
            Some((parent, pos)) => {
                let Node::Internal { keys, children } = &mut self.nodes[parent] else {
                    return;
                };
                keys.insert(pos, separator);
                children.insert(pos + 1, sibling_id);
                if keys.len() > NODE_ORDER {
                    self.split(parent, path);
                }
            }
            None => {
                // Root split: grow the tree by one level.
                let new_root = Node::Internal {
                    keys: vec![separator],
                    children: vec![node, sibling_id],
                };
                self.nodes.push(new_root);
                self.root = self.nodes.len() - 1;
            }
        }
    }

    fn leftmost_leaf(&self) -> usize {
        let mut node = self.root;
        loop {
            match &self.nodes[node] {
                Node::Leaf { .. } => return node,
                Node::Internal { children, .. } => node = children[0],
            }
        }
    }

    /// Rows in key order starting from `lo` (or the beginning), stopping
    /// at `hi` per its flags.
    pub fn scan(&self, lo: &RangeBound, hi: &RangeBound) -> Vec<(Vec<u8>, Vec<u8>)> {
        let (mut leaf, mut pos) = if lo.unbounded {
            (self.leftmost_leaf(), 0)
        } else {
            let (leaf, _) = self.find_leaf(&lo.value);
            let Node::Leaf { keys, .. } = &self.nodes[leaf] else {
                return Vec::new();
            };
            let pos = if lo.inclusive {
                keys.partition_point(|k| self.cmp.compare(k, &lo.value).is_lt())
            } else {
                keys.partition_point(|k| self.cmp.compare(k, &lo.value).is_le())
            };
            (leaf, pos)
        };

        let mut rows = Vec::new();
        loop {
            let Node::Leaf { keys, values, next } = &self.nodes[leaf] else {
                break;
            };
            while pos < keys.len() {
                if !hi.unbounded {
                    let ord = self.cmp.compare(&keys[pos], &hi.value);
                    let past = match (ord, hi.inclusive) {
                        (Ordering::Greater, _) => true,
                        (Ordering::Equal, false) => true,
                        _ => false,
                    };
                    if past {
                        return rows;
                    }
                }
                rows.push((keys[pos].clone(), values[pos].clone()));
                pos += 1;
            }
            match next {
                Some(n) => {
                    leaf = *n;
                    pos = 0;
                }
                None => break,
            }
        }
        rows
    }
}

fn leaf_len(node: &Node) -> usize {
    match node {
        Node::Leaf { keys, .. } => keys.len(),
        Node::Internal { keys, .. } => keys.len(),
    }
}

// ------------------------------------------------------------------------------------------------
// Facade
// ------------------------------------------------------------------------------------------------

/// B+tree storage backend: one tree per table.
pub struct BPlusTreeStorage {
    tables: RwLock<HashMap<String, BPlusTree>>,
    capacity_hint: usize,
}

impl BPlusTreeStorage {
    pub fn new(buf_pool_max_page: usize) -> Self {
        Self {
            tables: RwLock::new(HashMap::new()),
            capacity_hint: buf_pool_max_page,
        }
    }

    fn with_tree<R>(
        &self,
        table: &str,
        f: impl FnOnce(&BPlusTree) -> R,
    ) -> Result<R, StorageError> {
        let tables = self
            .tables
            .read()
            .map_err(|_| StorageError::Internal("storage lock poisoned".into()))?;
        let tree = tables
            .get(table)
            .ok_or_else(|| StorageError::TableNotFound(table.to_string()))?;
        Ok(f(tree))
    }

    fn with_tree_mut<R>(
        &self,
        table: &str,
        f: impl FnOnce(&mut BPlusTree) -> R,
    ) -> Result<R, StorageError> {
        let mut tables = self
            .tables
            .write()
            .map_err(|_| StorageError::Internal("storage lock poisoned".into()))?;
        let tree = tables
            .get_mut(table)
            .ok_or_else(|| StorageError::TableNotFound(table.to_string()))?;
        Ok(f(tree))
    }
}

impl Storage for BPlusTreeStorage {
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
        tables.insert(schema.name.clone(), BPlusTree::new(cmp, self.capacity_hint));
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
        self.with_tree(table, |tree| tree.get(key))
    }

    fn put(&self, table: &str, key: &[u8], value: &[u8]) -> Result<(), StorageError> {
        self.with_tree_mut(table, |tree| {
            tree.insert(key, value);
        })
    }

    fn delete(&self, table: &str, key: &[u8]) -> Result<(), StorageError> {
        self.with_tree_mut(table, |tree| {
            tree.remove(key);
        })
    }

    fn iter(&self, table: &str) -> Result<KvIter, StorageError> {
        let rows =
            self.with_tree(table, |tree| tree.scan(&RangeBound::unbounded(), &RangeBound::unbounded()))?;
        Ok(Box::new(rows.into_iter()))
    }

    fn range_iter(
        &self,
        table: &str,
        lo: &RangeBound,
        hi: &RangeBound,
    ) -> Result<KvIter, StorageError> {
        let rows = self.with_tree(table, |tree| tree.scan(lo, hi))?;
        Ok(Box::new(rows.into_iter()))
    }
}
