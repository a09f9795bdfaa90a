//! Hash join.
//!
//! ## Build phase (`init`)
//!
//! The left child is drained; for each batch the left hash expressions
//! are evaluated into column vectors and every valid row's per-column
//! hashes are combined into one bucket key by seed chaining: the chain
//! starts at [`hash::JOIN_SEED`], string columns run the byte hash seeded
//! by the previous link, and numeric columns run the 8-byte scalar hash
//! (floats by bit pattern). `(batch_id, row_id)` lands in the bucket;
//! collisions chain in a list and are never re-hashed.
//!
//! ## Probe phase (`next`)
//!
//! One probe batch is pulled from the right child per call; bucket keys
//! are computed identically and every matching build entry materialises
//! `[build_cols..., probe_cols...]`. A full output batch gets the
//! residual predicate applied (masking the selection bitmap) and is
//! parked in an internal buffer, drained by subsequent calls before more
//! probe input is fetched. The final partial batch is filtered the same
//! way before being returned.
//!
//! The hash is advisory: equality is decided by the residual predicate,
//! so bucket collisions only cost the predicate evaluation.

use std::collections::HashMap;

use crate::catalog::{LogicalType, OutputSchema};
use crate::exec::batch::{Field, TupleBatch, Vector};
use crate::exec::executor::VecExecutor;
use crate::exec::expr::Expr;
use crate::exec::ExecError;
use crate::hash;

/// Vectorized hash join operator.
pub struct HashJoinExec<'a> {
    left: Box<dyn VecExecutor + 'a>,
    right: Box<dyn VecExecutor + 'a>,
    predicate: Option<Expr>,
    left_hash_exprs: Vec<Expr>,
    right_hash_exprs: Vec<Expr>,
    left_schema: OutputSchema,
    right_schema: OutputSchema,
    schema: OutputSchema,
    max_batch_size: usize,

    build_batches: Vec<TupleBatch>,
    hash_table: HashMap<u64, Vec<(usize, usize)>>,
    buffer: Vec<TupleBatch>,
    probe_done: bool,

    stat_output_size: usize,
}

impl<'a> HashJoinExec<'a> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        left: Box<dyn VecExecutor + 'a>,
        right: Box<dyn VecExecutor + 'a>,
        predicate: Option<Expr>,
        left_hash_exprs: Vec<Expr>,
        right_hash_exprs: Vec<Expr>,
        left_schema: OutputSchema,
        right_schema: OutputSchema,
        schema: OutputSchema,
        max_batch_size: usize,
    ) -> Self {
        Self {
            left,
            right,
            predicate,
            left_hash_exprs,
            right_hash_exprs,
            left_schema,
            right_schema,
            schema,
            max_batch_size,
            build_batches: Vec::new(),
            hash_table: HashMap::new(),
            buffer: Vec::new(),
            probe_done: false,
            stat_output_size: 0,
        }
    }

    fn build_hash_table(&mut self, batch: &TupleBatch, batch_id: usize) -> Result<(), ExecError> {
        let mut hash_cols = Vec::with_capacity(self.left_hash_exprs.len());
        for expr in &self.left_hash_exprs {
            hash_cols.push(expr.eval(&self.left_schema, batch.cols(), batch.size())?);
        }
        for row in 0..batch.size() {
            if !batch.is_valid(row) {
                continue;
            }
            let key = bucket_key(&hash_cols, row);
            self.hash_table
                .entry(key)
                .or_default()
                .push((batch_id, row));
        }
        Ok(())
    }

}

/// Masks out rows of `batch` failing the residual predicate.
fn apply_residual(
    predicate: Option<&Expr>,
    schema: &OutputSchema,
    batch: &mut TupleBatch,
) -> Result<(), ExecError> {
    let Some(predicate) = predicate else {
        return Ok(());
    };
    if batch.is_empty() {
        return Ok(());
    }
    let result = predicate.eval(schema, batch.cols(), batch.size())?;
    for i in 0..batch.size() {
        if result.get(i).as_int()? == 0 {
            batch.set_valid(i, false);
        }
    }
    Ok(())
}

impl VecExecutor for HashJoinExec<'_> {
    fn init(&mut self) -> Result<(), ExecError> {
        self.left.init()?;
        self.right.init()?;
        self.build_batches.clear();
        self.hash_table.clear();
        self.buffer.clear();
        self.probe_done = false;

        let mut batch_id = 0;
        loop {
            let batch = self.left.next()?;
            if batch.is_empty() {
                break;
            }
            self.build_hash_table(&batch, batch_id)?;
            self.build_batches.push(batch);
            batch_id += 1;
        }
        Ok(())
    }

    fn next(&mut self) -> Result<TupleBatch, ExecError> {
        loop {
            if let Some(buffered) = self.buffer.pop() {
                self.stat_output_size += buffered.selected_count();
                return Ok(buffered);
            }

            let mut out = TupleBatch::init(&self.schema.types(), self.max_batch_size);
            if self.probe_done {
                return Ok(out);
            }

            let probe = self.right.next()?;
            if probe.is_empty() {
                self.probe_done = true;
                return Ok(out);
            }

            let mut hash_cols = Vec::with_capacity(self.right_hash_exprs.len());
            for expr in &self.right_hash_exprs {
                hash_cols.push(expr.eval(&self.right_schema, probe.cols(), probe.size())?);
            }

            for row in 0..probe.size() {
                if !probe.is_valid(row) {
                    continue;
                }
                let key = bucket_key(&hash_cols, row);
                let Some(entries) = self.hash_table.get(&key) else {
                    continue;
                };
                for &(batch_id, build_row) in entries {
                    if out.size() == self.max_batch_size {
                        let mut full = std::mem::replace(
                            &mut out,
                            TupleBatch::init(&self.schema.types(), self.max_batch_size),
                        );
                        apply_residual(self.predicate.as_ref(), &self.schema, &mut full)?;
                        self.buffer.push(full);
                    }
                    let mut joined = self.build_batches[batch_id].row(build_row);
                    joined.extend(probe.row(row));
                    out.append(&joined);
                }
            }

            apply_residual(self.predicate.as_ref(), &self.schema, &mut out)?;
            if out.is_empty() {
                // No matches for this probe batch; a premature empty
                // batch would read as end-of-stream.
                continue;
            }
            self.stat_output_size += out.selected_count();
            return Ok(out);
        }
    }

    fn total_output_size(&self) -> usize {
        self.left.total_output_size() + self.right.total_output_size() + self.stat_output_size
    }
}

/// Combines one row's per-column hash values by seed chaining.
fn bucket_key(hash_cols: &[Vector], row: usize) -> u64 {
    let mut seed = hash::JOIN_SEED;
    for col in hash_cols {
        seed = match (col.ty(), col.get(row)) {
            (LogicalType::String, Field::Str(s)) => hash::hash(s.as_bytes(), seed),
            (_, Field::Int(v)) => hash::hash8(*v as u64, seed),
            (_, Field::Float(v)) => hash::hash8(v.to_bits(), seed),
            (_, Field::Str(s)) => hash::hash(s.as_bytes(), seed),
        };
    }
    seed
}
