//! # Vectorized Execution Engine
//!
//! Batched pull-model operators over columnar tuple batches.
//!
//! Every operator implements [`executor::VecExecutor`]: `init` once, then
//! `next` until an empty batch signals end-of-stream. Batches hold up to
//! `size_batch` rows column-wise with a selection bitmap; operators mask
//! rows out rather than compacting batches.
//!
//! | Module | Operators |
//! |--------|-----------|
//! | [`scan`] | sequential scan, range scan |
//! | [`filter`] | filter, projection |
//! | [`join`] | nested-loop join |
//! | [`hash_join`] | hash join |
//!
//! [`batch`] defines the columnar containers, [`expr`] the vectorized
//! expression evaluator the operators share.

pub mod batch;
pub mod executor;
pub mod expr;
pub mod filter;
pub mod hash_join;
pub mod join;
pub mod scan;

#[cfg(test)]
mod tests;

use thiserror::Error;

use crate::encoding::EncodingError;
use crate::storage::StorageError;

/// Errors raised during plan execution.
#[derive(Debug, Error)]
pub enum ExecError {
    /// Error from the storage layer.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// A stored tuple failed to decode.
    #[error("tuple decode error: {0}")]
    Encoding(#[from] EncodingError),

    /// Expression evaluation failed (type mismatch, unresolved column).
    #[error("expression error: {0}")]
    Expression(String),

    /// The plan contains a node this executor set cannot run.
    #[error("unsupported plan node: {0}")]
    Unsupported(String),

    /// Internal invariant violation.
    #[error("internal error: {0}")]
    Internal(String),
}
