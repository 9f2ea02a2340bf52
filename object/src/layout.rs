//! Field layouts of the runtime's own object kinds.
//!
//! Indices are zero-based positions in the fielded body.

use crate::{ObjectError, Tag, Value};

// ── Type ──────────────────────────────────────────────────────────────

pub const TYPE_SUPERTYPE: usize = 0;
pub const TYPE_NAME: usize = 1;
pub const TYPE_FIXED_FIELDS: usize = 2;
pub const TYPE_TALLY: usize = 3;
pub const TYPE_SELECTORS: usize = 4;
pub const TYPE_METHODS: usize = 5;
pub const TYPE_FORMAT: usize = 6;
pub const TYPE_SIZE: usize = 7;

// ── CompiledMethod ────────────────────────────────────────────────────

pub const METHOD_HEADER: usize = 0;
pub const METHOD_OWNER: usize = 1;
pub const METHOD_SELECTOR: usize = 2;
pub const METHOD_OPCODES: usize = 3;
/// First literal; literals run to the end of the object.
pub const METHOD_LITERALS: usize = 4;

// ── Context ───────────────────────────────────────────────────────────

pub const CONTEXT_SENDER: usize = 0;
pub const CONTEXT_IP: usize = 1;
pub const CONTEXT_SP: usize = 2;
pub const CONTEXT_METHOD: usize = 3;
pub const CONTEXT_RECEIVER: usize = 4;
pub const CONTEXT_HOME: usize = 5;
pub const CONTEXT_INITIAL_IP: usize = 6;
pub const CONTEXT_BLOCK_ARGC: usize = 7;
pub const CONTEXT_CALLER: usize = 8;
/// First tail slot. Method contexts keep temporaries here followed by
/// the operand stack; block contexts keep only the operand stack.
pub const CONTEXT_TAIL: usize = 9;

// ── Scheduling ────────────────────────────────────────────────────────

pub const PROCESS_CONTEXT: usize = 0;
pub const PROCESS_TIME: usize = 1;
pub const PROCESS_SIZE: usize = 2;

pub const SEMAPHORE_EXCESS: usize = 0;
pub const SEMAPHORE_FIRST: usize = 1;
pub const SEMAPHORE_LAST: usize = 2;
pub const SEMAPHORE_SIZE: usize = 3;

pub const LINK_VALUE: usize = 0;
pub const LINK_NEXT: usize = 1;
pub const LINK_SIZE: usize = 2;

pub const PROCESSOR_ACTIVE: usize = 0;
pub const PROCESSOR_IRQ_TABLE: usize = 1;
pub const PROCESSOR_FIRST: usize = 2;
pub const PROCESSOR_LAST: usize = 3;
pub const PROCESSOR_SIZE: usize = 4;

pub const IRQ_TIMER: usize = 0;
pub const IRQ_INPUT: usize = 1;
pub const IRQ_SIZE: usize = 2;

// ── Tables ────────────────────────────────────────────────────────────

pub const DICTIONARY_TALLY: usize = 0;
pub const DICTIONARY_KEYS: usize = 1;
pub const DICTIONARY_VALUES: usize = 2;
pub const DICTIONARY_SIZE: usize = 3;

pub const SYMBOL_TABLE_TALLY: usize = 0;
pub const SYMBOL_TABLE_KEYS: usize = 1;
pub const SYMBOL_TABLE_SIZE: usize = 2;

// ── Instance format ───────────────────────────────────────────────────

/// Body representation of a type's instances.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Storage {
    Fields,
    Bytes,
    Words,
}

impl Storage {
    pub fn tag(self) -> Tag {
        match self {
            Storage::Fields => Tag::Object,
            Storage::Bytes => Tag::Bytes,
            Storage::Words => Tag::Words,
        }
    }
}

/// Instance format stored in a Type's `format` field.
///
/// Encoded as a SmallInt: bits 0-1 storage, bit 2 indexable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Format {
    pub storage: Storage,
    pub indexable: bool,
}

impl Format {
    pub const FIXED: Self = Self {
        storage: Storage::Fields,
        indexable: false,
    };
    pub const INDEXABLE: Self = Self {
        storage: Storage::Fields,
        indexable: true,
    };
    pub const BYTES: Self = Self {
        storage: Storage::Bytes,
        indexable: true,
    };
    pub const WORDS: Self = Self {
        storage: Storage::Words,
        indexable: true,
    };

    pub fn to_value(self) -> Value {
        let storage = match self.storage {
            Storage::Fields => 0,
            Storage::Bytes => 1,
            Storage::Words => 2,
        };
        Value::from_i64(storage | (self.indexable as i64) << 2)
    }

    pub fn from_value(value: Value) -> Result<Self, ObjectError> {
        let bits = value.as_small_int()?;
        let storage = match bits & 0b11 {
            0 => Storage::Fields,
            1 => Storage::Bytes,
            2 => Storage::Words,
            _ => {
                return Err(ObjectError::OutOfRange {
                    index: (bits & 0b11) as usize,
                    limit: 3,
                });
            }
        };
        Ok(Self {
            storage,
            indexable: bits & 0b100 != 0,
        })
    }
}
