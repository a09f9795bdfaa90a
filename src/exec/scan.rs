//! Leaf operators: sequential scan, range scan, and literal values.
//!
//! Scans pull `(key, tuple)` pairs from a storage iterator, decode the
//! tuple bytes against the table's column types, and fill batches up to
//! the configured size. The storage iterator is created in `init`, not in
//! the constructor, so building a pipeline does no I/O.

use crate::catalog::OutputSchema;
use crate::exec::batch::{decode_row, Field, TupleBatch};
use crate::exec::executor::VecExecutor;
use crate::exec::ExecError;
use crate::storage::{KvIter, RangeBound, Storage};

// ------------------------------------------------------------------------------------------------
// SeqScanExec
// ------------------------------------------------------------------------------------------------

/// Full-table scan in primary-key order.
pub struct SeqScanExec<'a> {
    storage: &'a dyn Storage,
    table: String,
    schema: OutputSchema,
    max_batch_size: usize,
    iter: Option<KvIter>,
    stat_output_size: usize,
}

impl<'a> SeqScanExec<'a> {
    pub fn new(
        storage: &'a dyn Storage,
        table: String,
        schema: OutputSchema,
        max_batch_size: usize,
    ) -> Self {
        Self {
            storage,
            table,
            schema,
            max_batch_size,
            iter: None,
            stat_output_size: 0,
        }
    }
}

impl VecExecutor for SeqScanExec<'_> {
    fn init(&mut self) -> Result<(), ExecError> {
        self.iter = Some(self.storage.iter(&self.table)?);
        Ok(())
    }

    fn next(&mut self) -> Result<TupleBatch, ExecError> {
        let types = self.schema.types();
        let mut batch = TupleBatch::init(&types, self.max_batch_size);
        if let Some(iter) = self.iter.as_mut() {
            while batch.size() < self.max_batch_size {
                let Some((_key, value)) = iter.next() else {
                    break;
                };
                let row = decode_row(&value, &types)?;
                batch.append(&row);
            }
        }
        self.stat_output_size += batch.size();
        Ok(batch)
    }

    fn total_output_size(&self) -> usize {
        self.stat_output_size
    }
}

// ------------------------------------------------------------------------------------------------
// RangeScanExec
// ------------------------------------------------------------------------------------------------

/// Bounded scan in primary-key order.
pub struct RangeScanExec<'a> {
    storage: &'a dyn Storage,
    table: String,
    lo: RangeBound,
    hi: RangeBound,
    schema: OutputSchema,
    max_batch_size: usize,
    iter: Option<KvIter>,
    stat_output_size: usize,
}

impl<'a> RangeScanExec<'a> {
    pub fn new(
        storage: &'a dyn Storage,
        table: String,
        lo: RangeBound,
        hi: RangeBound,
        schema: OutputSchema,
        max_batch_size: usize,
    ) -> Self {
        Self {
            storage,
            table,
            lo,
            hi,
            schema,
            max_batch_size,
            iter: None,
            stat_output_size: 0,
        }
    }
}

impl VecExecutor for RangeScanExec<'_> {
    fn init(&mut self) -> Result<(), ExecError> {
        self.iter = Some(self.storage.range_iter(&self.table, &self.lo, &self.hi)?);
        Ok(())
    }

    fn next(&mut self) -> Result<TupleBatch, ExecError> {
        let types = self.schema.types();
        let mut batch = TupleBatch::init(&types, self.max_batch_size);
        if let Some(iter) = self.iter.as_mut() {
            while batch.size() < self.max_batch_size {
                let Some((_key, value)) = iter.next() else {
                    break;
                };
                let row = decode_row(&value, &types)?;
                batch.append(&row);
            }
        }
        self.stat_output_size += batch.size();
        Ok(batch)
    }

    fn total_output_size(&self) -> usize {
        self.stat_output_size
    }
}

// ------------------------------------------------------------------------------------------------
// ValuesExec
// ------------------------------------------------------------------------------------------------

/// Emits a literal row list (`VALUES` clauses, `INSERT` payloads).
pub struct ValuesExec {
    rows: Vec<Vec<Field>>,
    schema: OutputSchema,
    max_batch_size: usize,
    cursor: usize,
    stat_output_size: usize,
}

impl ValuesExec {
    pub fn new(rows: Vec<Vec<Field>>, schema: OutputSchema, max_batch_size: usize) -> Self {
        Self {
            rows,
            schema,
            max_batch_size,
            cursor: 0,
            stat_output_size: 0,
        }
    }
}

impl VecExecutor for ValuesExec {
    fn init(&mut self) -> Result<(), ExecError> {
        self.cursor = 0;
        Ok(())
    }

    fn next(&mut self) -> Result<TupleBatch, ExecError> {
        let types = self.schema.types();
        let mut batch = TupleBatch::init(&types, self.max_batch_size);
        while self.cursor < self.rows.len() && batch.size() < self.max_batch_size {
            batch.append(&self.rows[self.cursor]);
            self.cursor += 1;
        }
        self.stat_output_size += batch.size();
        Ok(batch)
    }

    fn total_output_size(&self) -> usize {
        self.stat_output_size
    }
}
