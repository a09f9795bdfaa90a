//! Filter and projection operators.

use crate::catalog::OutputSchema;
use crate::exec::batch::TupleBatch;
use crate::exec::executor::VecExecutor;
use crate::exec::expr::Expr;
use crate::exec::ExecError;

// ------------------------------------------------------------------------------------------------
// FilterExec
// ------------------------------------------------------------------------------------------------

/// Masks out rows whose predicate evaluates to zero. Batches pass through
/// with their selection bitmaps tightened; rows are never compacted.
pub struct FilterExec<'a> {
    child: Box<dyn VecExecutor + 'a>,
    predicate: Option<Expr>,
    schema: OutputSchema,
    stat_output_size: usize,
}

impl<'a> FilterExec<'a> {
    pub fn new(
        child: Box<dyn VecExecutor + 'a>,
        predicate: Option<Expr>,
        schema: OutputSchema,
    ) -> Self {
        Self {
            child,
            predicate,
            schema,
            stat_output_size: 0,
        }
    }
}

impl VecExecutor for FilterExec<'_> {
    fn init(&mut self) -> Result<(), ExecError> {
        self.child.init()
    }

    fn next(&mut self) -> Result<TupleBatch, ExecError> {
        let mut batch = self.child.next()?;
        if batch.is_empty() {
            return Ok(batch);
        }
        if let Some(predicate) = &self.predicate {
            let result = predicate.eval(&self.schema, batch.cols(), batch.size())?;
            for i in 0..batch.size() {
                if batch.is_valid(i) && result.get(i).as_int()? == 0 {
                    batch.set_valid(i, false);
                }
            }
        }
        self.stat_output_size += batch.selected_count();
        Ok(batch)
    }

    fn total_output_size(&self) -> usize {
        self.child.total_output_size() + self.stat_output_size
    }
}

// ------------------------------------------------------------------------------------------------
// ProjectExec
// ------------------------------------------------------------------------------------------------

/// Evaluates one expression per output column over the child's batches.
pub struct ProjectExec<'a> {
    child: Box<dyn VecExecutor + 'a>,
    exprs: Vec<Expr>,
    input_schema: OutputSchema,
    output_schema: OutputSchema,
    max_batch_size: usize,
    stat_output_size: usize,
}

impl<'a> ProjectExec<'a> {
    pub fn new(
        child: Box<dyn VecExecutor + 'a>,
        exprs: Vec<Expr>,
        input_schema: OutputSchema,
        output_schema: OutputSchema,
        max_batch_size: usize,
    ) -> Self {
        Self {
            child,
            exprs,
            input_schema,
            output_schema,
            max_batch_size,
            stat_output_size: 0,
        }
    }
}

impl VecExecutor for ProjectExec<'_> {
    fn init(&mut self) -> Result<(), ExecError> {
        self.child.init()
    }

    fn next(&mut self) -> Result<TupleBatch, ExecError> {
        // A fully-masked input batch projects to zero rows, which would
        // read as end-of-stream; keep pulling until rows or exhaustion.
        loop {
            let input = self.child.next()?;
            if input.is_empty() {
                return Ok(TupleBatch::init(
                    &self.output_schema.types(),
                    self.max_batch_size,
                ));
            }

            let mut out = TupleBatch::init(&self.output_schema.types(), self.max_batch_size);
            let columns: Vec<_> = self
                .exprs
                .iter()
                .map(|e| e.eval(&self.input_schema, input.cols(), input.size()))
                .collect::<Result<_, _>>()?;
            for i in input.selected_rows() {
                let row: Vec<_> = columns.iter().map(|col| col.get(i).clone()).collect();
                out.append(&row);
            }

            if out.is_empty() {
                continue;
            }
            self.stat_output_size += out.size();
            return Ok(out);
        }
    }

    fn total_output_size(&self) -> usize {
        self.child.total_output_size() + self.stat_output_size
    }
}
