//! Nested-loop join.
//!
//! The left (build) child is fully materialised during `init`. For each
//! probe row from the right child, the predicate is evaluated once per
//! build batch — the probe row broadcast as constant vectors against the
//! build columns — and matching rows are emitted as
//! `[build_cols..., probe_cols...]`.
//!
//! The `(probe_index, build_index, b_index)` triple preserves the exact
//! resume position so each `next` call yields at most `max_batch_size`
//! rows and continues where it left off.

use crate::catalog::OutputSchema;
use crate::exec::batch::{TupleBatch, Vector};
use crate::exec::executor::VecExecutor;
use crate::exec::expr::Expr;
use crate::exec::ExecError;

/// Vectorized nested-loop join operator.
pub struct NestedLoopJoinExec<'a> {
    left: Box<dyn VecExecutor + 'a>,
    right: Box<dyn VecExecutor + 'a>,
    predicate: Option<Expr>,
    schema: OutputSchema,
    max_batch_size: usize,

    build: Vec<TupleBatch>,
    probe: TupleBatch,
    probe_done: bool,
    pred_result: Option<Vector>,

    probe_index: usize,
    build_index: usize,
    b_index: usize,

    stat_output_size: usize,
}

impl<'a> NestedLoopJoinExec<'a> {
    pub fn new(
        left: Box<dyn VecExecutor + 'a>,
        right: Box<dyn VecExecutor + 'a>,
        predicate: Option<Expr>,
        schema: OutputSchema,
        max_batch_size: usize,
    ) -> Self {
        Self {
            left,
            right,
            predicate,
            schema,
            max_batch_size,
            build: Vec::new(),
            probe: TupleBatch::default(),
            probe_done: false,
            pred_result: None,
            probe_index: 0,
            build_index: 0,
            b_index: 0,
            stat_output_size: 0,
        }
    }

    /// Evaluates the predicate for probe row `i` against build batch `j`:
    /// input layout `[build_cols..., probe_row broadcast...]`, matching
    /// the output schema.
    fn eval_predicate(&mut self, i: usize, j: usize) -> Result<(), ExecError> {
        let Some(predicate) = &self.predicate else {
            self.pred_result = None;
            return Ok(());
        };
        let bb = &self.build[j];
        let mut input: Vec<Vector> = bb.cols().to_vec();
        for col in self.probe.cols() {
            input.push(Vector::constant(col.get(i).clone(), bb.size()));
        }
        self.pred_result = Some(predicate.eval(&self.schema, &input, bb.size())?);
        Ok(())
    }
}

impl VecExecutor for NestedLoopJoinExec<'_> {
    fn init(&mut self) -> Result<(), ExecError> {
        self.left.init()?;
        self.right.init()?;
        self.build.clear();

        // Materialise the build side, compacting away masked rows.
        loop {
            let batch = self.left.next()?;
            if batch.is_empty() {
                break;
            }
            let types: Vec<_> = batch.cols().iter().map(Vector::ty).collect();
            let mut compacted = TupleBatch::init(&types, self.max_batch_size);
            for i in batch.selected_rows() {
                compacted.append(&batch.row(i));
            }
            if !compacted.is_empty() {
                self.build.push(compacted);
            }
        }

        self.probe = TupleBatch::default();
        self.probe_done = false;
        self.probe_index = 0;
        self.build_index = 0;
        self.b_index = 0;
        Ok(())
    }

    fn next(&mut self) -> Result<TupleBatch, ExecError> {
        let mut out = TupleBatch::init(&self.schema.types(), self.max_batch_size);
        if self.probe_done {
            return Ok(out);
        }

        loop {
            if self.probe_index >= self.probe.size() {
                self.probe = self.right.next()?;
                if self.probe.is_empty() {
                    self.probe_done = true;
                    self.stat_output_size += out.size();
                    return Ok(out);
                }
                self.probe_index = 0;
                self.build_index = 0;
                self.b_index = 0;
            }

            let mut i = self.probe_index;
            while i < self.probe.size() {
                if !self.probe.is_valid(i) {
                    i += 1;
                    self.build_index = 0;
                    self.b_index = 0;
                    continue;
                }
                let mut j = self.build_index;
                while j < self.build.len() {
                    if self.b_index == 0 {
                        self.eval_predicate(i, j)?;
                    }
                    let start = self.b_index;
                    for b in start..self.build[j].size() {
                        let passes = match &self.pred_result {
                            Some(result) => result.get(b).as_int()? != 0,
                            None => true,
                        };
                        if passes && self.build[j].is_valid(b) {
                            let mut row = self.build[j].row(b);
                            row.extend(self.probe.row(i));
                            out.append(&row);
                            if out.size() == self.max_batch_size {
                                self.probe_index = i;
                                self.build_index = j;
                                self.b_index = b + 1;
                                self.stat_output_size += out.size();
                                return Ok(out);
                            }
                        }
                    }
                    self.b_index = 0;
                    j += 1;
                }
                self.build_index = 0;
                i += 1;
            }
            self.probe_index = self.probe.size();
        }
    }

    fn total_output_size(&self) -> usize {
        self.left.total_output_size() + self.right.total_output_size() + self.stat_output_size
    }
}
