//! Executor contract and plan-to-pipeline factory.
//!
//! Operators follow a pull model:
//!
//! - `init()` is invoked exactly once before execution; it allocates
//!   state and, for blocking operators, drains build-side children.
//! - `next()` returns the next batch; an **empty batch** signals
//!   end-of-stream, after which `next()` must not be called again.
//! - `total_output_size()` reports cumulative output rows, aggregated
//!   recursively through children.

use crate::exec::batch::TupleBatch;
use crate::exec::filter::{FilterExec, ProjectExec};
use crate::exec::hash_join::HashJoinExec;
use crate::exec::join::NestedLoopJoinExec;
use crate::exec::scan::{RangeScanExec, SeqScanExec, ValuesExec};
use crate::exec::ExecError;
use crate::plan::{PlanNode, PlanOp};
use crate::storage::Storage;

/// Batched pull-model operator.
pub trait VecExecutor {
    /// One-time initialisation. Build-side children are drained here.
    fn init(&mut self) -> Result<(), ExecError>;

    /// Produces the next batch; empty means end-of-stream.
    fn next(&mut self) -> Result<TupleBatch, ExecError>;

    /// Cumulative output rows of this operator and its children.
    fn total_output_size(&self) -> usize;
}

/// Builds the vectorized operator pipeline for a physical plan.
pub fn build_executor<'a>(
    plan: &PlanNode,
    storage: &'a dyn Storage,
    max_batch_size: usize,
) -> Result<Box<dyn VecExecutor + 'a>, ExecError> {
    match &plan.op {
        PlanOp::SeqScan { table, .. } => Ok(Box::new(SeqScanExec::new(
            storage,
            table.clone(),
            plan.output_schema.clone(),
            max_batch_size,
        ))),

        PlanOp::RangeScan { table, lo, hi, .. } => Ok(Box::new(RangeScanExec::new(
            storage,
            table.clone(),
            lo.clone(),
            hi.clone(),
            plan.output_schema.clone(),
            max_batch_size,
        ))),

        PlanOp::Print { rows } => Ok(Box::new(ValuesExec::new(
            rows.clone(),
            plan.output_schema.clone(),
            max_batch_size,
        ))),

        PlanOp::Filter => {
            let child = child_of(plan, storage, max_batch_size)?;
            Ok(Box::new(FilterExec::new(
                child,
                plan.predicate.gen_expr(),
                plan.output_schema.clone(),
            )))
        }

        PlanOp::Project { exprs } => {
            let input_schema = plan
                .child
                .as_ref()
                .map(|c| c.output_schema.clone())
                .unwrap_or_default();
            let child = child_of(plan, storage, max_batch_size)?;
            Ok(Box::new(ProjectExec::new(
                child,
                exprs.clone(),
                input_schema,
                plan.output_schema.clone(),
                max_batch_size,
            )))
        }

        PlanOp::Join => {
            let left = child_of(plan, storage, max_batch_size)?;
            let right = child2_of(plan, storage, max_batch_size)?;
            Ok(Box::new(NestedLoopJoinExec::new(
                left,
                right,
                plan.predicate.gen_expr(),
                plan.output_schema.clone(),
                max_batch_size,
            )))
        }

        PlanOp::HashJoin {
            left_hash,
            right_hash,
        } => {
            let left_schema = plan
                .child
                .as_ref()
                .map(|c| c.output_schema.clone())
                .unwrap_or_default();
            let right_schema = plan
                .child2
                .as_ref()
                .map(|c| c.output_schema.clone())
                .unwrap_or_default();
            let left = child_of(plan, storage, max_batch_size)?;
            let right = child2_of(plan, storage, max_batch_size)?;
            Ok(Box::new(HashJoinExec::new(
                left,
                right,
                plan.predicate.gen_expr(),
                left_hash.clone(),
                right_hash.clone(),
                left_schema,
                right_schema,
                plan.output_schema.clone(),
                max_batch_size,
            )))
        }

        // The predicate-transfer optimisation itself is out of scope;
        // the wrapper executes as a pass-through.
        PlanOp::PredicateTransfer => child_of(plan, storage, max_batch_size),

        PlanOp::Aggregate { .. } => Err(ExecError::Unsupported("aggregate".into())),
        PlanOp::Insert { .. } | PlanOp::Delete { .. } | PlanOp::Update { .. } => Err(
            ExecError::Unsupported("DML nodes are executed by the database facade".into()),
        ),
    }
}

fn child_of<'a>(
    plan: &PlanNode,
    storage: &'a dyn Storage,
    max_batch_size: usize,
) -> Result<Box<dyn VecExecutor + 'a>, ExecError> {
    let child = plan
        .child
        .as_ref()
        .ok_or_else(|| ExecError::Internal("plan node missing its child".into()))?;
    build_executor(child, storage, max_batch_size)
}

fn child2_of<'a>(
    plan: &PlanNode,
    storage: &'a dyn Storage,
    max_batch_size: usize,
) -> Result<Box<dyn VecExecutor + 'a>, ExecError> {
    let child = plan
        .child2
        .as_ref()
        .ok_or_else(|| ExecError::Internal("plan node missing its second child".into()))?;
    build_executor(child, storage, max_batch_size)
}
