use object::{Handle, ObjectError, Space};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HeapError {
    #[error(transparent)]
    Object(#[from] ObjectError),

    #[error("{space:?} pool exhausted at {segments} segments")]
    OutOfMemory { space: Space, segments: usize },

    #[error("object of {words} words exceeds segment capacity of {segment_words} words")]
    ObjectTooLarge { words: usize, segment_words: usize },

    #[error("stale handle {0:?}")]
    StaleHandle(Handle),

    #[error("invalid heap settings: {0}")]
    InvalidSettings(&'static str),
}

impl HeapError {
    /// Whether the error means the heap can no longer be trusted, as
    /// opposed to a rejected precondition on a single access.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            HeapError::OutOfMemory { .. } | HeapError::StaleHandle(_)
        )
    }
}
