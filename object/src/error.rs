use thiserror::Error;

use crate::Tag;

/// Precondition failures of value and object accessors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ObjectError {
    #[error("tag mismatch: expected {expected:?}, found {found:?}")]
    TagMismatch { expected: Tag, found: Tag },

    #[error("index {index} out of range (limit {limit})")]
    OutOfRange { index: usize, limit: usize },

    #[error("negative index {0}")]
    NegativeIndex(i64),

    #[error("{0} does not fit in a small integer")]
    SmallIntOverflow(i128),
}
