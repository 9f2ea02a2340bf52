//! Primitive table.
//!
//! A primitive sees the receiver and its `argc` arguments on top of the
//! operand stack. On success it replaces them with its result (or leaves
//! the receiver as the result) and answers `Ok(true)`. Answering
//! `Ok(false)` declines; the caller restores the stack pointer and falls
//! back to the method body or a full send.

use object::Value;

use crate::{Interpreter, RuntimeError};

pub mod block;
pub mod integer;
pub mod instance;
pub mod process;

pub type PrimitiveFn = fn(&mut Interpreter, usize) -> Result<bool, RuntimeError>;

#[derive(Clone, Copy)]
pub struct PrimitiveDesc {
    pub name: &'static str,
    pub arity: u8,
    pub func: PrimitiveFn,
}

impl PrimitiveDesc {
    pub const fn new(name: &'static str, arity: u8, func: PrimitiveFn) -> Self {
        Self { name, arity, func }
    }
}

impl std::fmt::Debug for PrimitiveDesc {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PrimitiveDesc")
            .field("name", &self.name)
            .field("arity", &self.arity)
            .finish()
    }
}

// Indices into `default_primitives()`. Method headers refer to these.
pub const ADD: usize = 0;
pub const SUB: usize = 1;
pub const MUL: usize = 2;
pub const DIV: usize = 3;
pub const MOD: usize = 4;
pub const LT: usize = 5;
pub const GT: usize = 6;
pub const LE: usize = 7;
pub const GE: usize = 8;
pub const EQ: usize = 9;
pub const NE: usize = 10;
pub const BIT_AND: usize = 11;
pub const BIT_OR: usize = 12;
pub const BIT_SHIFT: usize = 13;
pub const IDENTICAL: usize = 14;
pub const CLASS: usize = 15;
pub const BASIC_NEW: usize = 16;
pub const BASIC_NEW_SIZED: usize = 17;
pub const BASIC_AT: usize = 18;
pub const BASIC_AT_PUT: usize = 19;
pub const BASIC_SIZE: usize = 20;
pub const HASH: usize = 21;
pub const VALUE: usize = 22;
pub const VALUE_1: usize = 23;
pub const VALUE_2: usize = 24;
pub const VALUE_3: usize = 25;
pub const VALUE_WITH_ARGUMENTS: usize = 26;
pub const PERFORM: usize = 27;
pub const PERFORM_WITH: usize = 28;
pub const PERFORM_WITH_WITH: usize = 29;
pub const FORK: usize = 30;
pub const WAIT: usize = 31;
pub const SIGNAL: usize = 32;
pub const YIELD: usize = 33;
pub const NEXT_INPUT_EVENT: usize = 34;
pub const NEW_SEMAPHORE: usize = 35;

pub fn default_primitives() -> Vec<PrimitiveDesc> {
    vec![
        PrimitiveDesc::new("int_add", 1, integer::int_add),
        PrimitiveDesc::new("int_sub", 1, integer::int_sub),
        PrimitiveDesc::new("int_mul", 1, integer::int_mul),
        PrimitiveDesc::new("int_div", 1, integer::int_div),
        PrimitiveDesc::new("int_mod", 1, integer::int_mod),
        PrimitiveDesc::new("int_lt", 1, integer::int_lt),
        PrimitiveDesc::new("int_gt", 1, integer::int_gt),
        PrimitiveDesc::new("int_le", 1, integer::int_le),
        PrimitiveDesc::new("int_ge", 1, integer::int_ge),
        PrimitiveDesc::new("int_eq", 1, integer::int_eq),
        PrimitiveDesc::new("int_ne", 1, integer::int_ne),
        PrimitiveDesc::new("int_bit_and", 1, integer::int_bit_and),
        PrimitiveDesc::new("int_bit_or", 1, integer::int_bit_or),
        PrimitiveDesc::new("int_bit_shift", 1, integer::int_bit_shift),
        PrimitiveDesc::new("identical", 1, instance::identical),
        PrimitiveDesc::new("class", 0, instance::class),
        PrimitiveDesc::new("basic_new", 0, instance::basic_new),
        PrimitiveDesc::new("basic_new_sized", 1, instance::basic_new_sized),
        PrimitiveDesc::new("basic_at", 1, instance::basic_at),
        PrimitiveDesc::new("basic_at_put", 2, instance::basic_at_put),
        PrimitiveDesc::new("basic_size", 0, instance::basic_size),
        PrimitiveDesc::new("hash", 0, instance::hash),
        PrimitiveDesc::new("block_value", 0, block::block_value),
        PrimitiveDesc::new("block_value_1", 1, block::block_value),
        PrimitiveDesc::new("block_value_2", 2, block::block_value),
        PrimitiveDesc::new("block_value_3", 3, block::block_value),
        PrimitiveDesc::new("block_value_with_arguments", 1, block::value_with_arguments),
        PrimitiveDesc::new("perform", 1, instance::perform),
        PrimitiveDesc::new("perform_with", 2, instance::perform),
        PrimitiveDesc::new("perform_with_with", 3, instance::perform),
        PrimitiveDesc::new("fork", 0, process::fork),
        PrimitiveDesc::new("semaphore_wait", 0, process::wait),
        PrimitiveDesc::new("semaphore_signal", 0, process::signal),
        PrimitiveDesc::new("processor_yield", 0, process::yield_processor),
        PrimitiveDesc::new("next_input_event", 0, process::next_input_event),
        PrimitiveDesc::new("new_semaphore", 0, process::new_semaphore),
    ]
}

// ── Helpers shared by the primitive bodies ─────────────────────────

impl Interpreter {
    /// Drop the receiver and `argc` arguments and push `result`.
    pub(crate) fn primitive_answer(&mut self, argc: usize, result: Value) -> Result<bool, RuntimeError> {
        self.pop_n(argc + 1)?;
        self.push(result)?;
        Ok(true)
    }

    /// The receiver of a primitive called with `argc` arguments.
    pub(crate) fn primitive_receiver(&self, argc: usize) -> Result<Value, RuntimeError> {
        self.stack_value(argc)
    }

    /// Argument `n` (zero-based, in send order) of a primitive called with
    /// `argc` arguments.
    pub(crate) fn primitive_argument(&self, argc: usize, n: usize) -> Result<Value, RuntimeError> {
        self.stack_value(argc - 1 - n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::selectors::SPECIAL_SELECTORS;

    #[test]
    fn indices_match_table() {
        let table = default_primitives();
        assert_eq!(table.len(), NEW_SEMAPHORE + 1);
        assert_eq!(table[ADD].name, "int_add");
        assert_eq!(table[BIT_SHIFT].name, "int_bit_shift");
        assert_eq!(table[HASH].name, "hash");
        assert_eq!(table[VALUE_3].arity, 3);
        assert_eq!(table[PERFORM_WITH_WITH].arity, 3);
        assert_eq!(table[NEW_SEMAPHORE].name, "new_semaphore");
    }

    #[test]
    fn special_selectors_agree_with_primitive_arity() {
        let table = default_primitives();
        for s in SPECIAL_SELECTORS {
            if let Some(index) = s.primitive {
                assert_eq!(table[index].arity, s.arity, "{}", s.name);
            }
        }
    }
}
