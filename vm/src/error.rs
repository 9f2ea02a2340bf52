use bytecode::DecodeError;
use heap::HeapError;
use object::ObjectError;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RuntimeError {
    #[error(transparent)]
    Heap(#[from] HeapError),

    #[error(transparent)]
    MalformedBytecode(#[from] DecodeError),

    #[error("{receiver_type} does not understand #{selector}")]
    UnknownSelector {
        selector: String,
        receiver_type: String,
    },

    #[error("conditional jump on a non-boolean")]
    MustBeBoolean,

    #[error("non-local return from a block whose home context is dead")]
    CannotReturn,

    #[error("method expects {expected} arguments, got {got}")]
    WrongArgumentCount { expected: usize, got: usize },

    #[error("operand stack overflow at ip {ip}")]
    StackOverflow { ip: usize },

    #[error("operand stack underflow at ip {ip}")]
    StackUnderflow { ip: usize },

    #[error("invalid method: {0}")]
    InvalidMethod(&'static str),

    #[error("special selector index {0} out of range")]
    InvalidSpecialSelector(u8),

    #[error("no process is runnable and none can become runnable")]
    Deadlock,

    #[error("invalid VM settings: {0}")]
    InvalidSettings(&'static str),
}

impl From<ObjectError> for RuntimeError {
    fn from(e: ObjectError) -> Self {
        RuntimeError::Heap(HeapError::Object(e))
    }
}

impl RuntimeError {
    /// Whether a primitive that hits this error must abort the run instead
    /// of declining. Rejected tag, range and size checks decline; a broken
    /// heap or an interpreter-level failure aborts.
    pub fn aborts_primitive(&self) -> bool {
        match self {
            RuntimeError::Heap(e) => e.is_fatal(),
            _ => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use object::{ObjectError, Space};

    use super::*;

    #[test]
    fn value_level_errors_decline() {
        let e: RuntimeError = ObjectError::NegativeIndex(-1).into();
        assert!(!e.aborts_primitive());
        let e: RuntimeError = HeapError::ObjectTooLarge {
            words: 10,
            segment_words: 4,
        }
        .into();
        assert!(!e.aborts_primitive());
    }

    #[test]
    fn heap_exhaustion_and_vm_errors_abort() {
        let e: RuntimeError = HeapError::OutOfMemory {
            space: Space::Ephemeral,
            segments: 4,
        }
        .into();
        assert!(e.aborts_primitive());
        assert!(RuntimeError::MustBeBoolean.aborts_primitive());
    }
}
