//! Process and semaphore primitives. Switches they request happen at the
//! interpreter's next housekeeping point, after the primitive's result is
//! on the stack.

use object::layout::*;
use object::{Space, Tag, Value};

use crate::{Interpreter, RuntimeError};

impl Interpreter {
    fn is_instance_of(&self, value: Value, ty: Value) -> Result<bool, RuntimeError> {
        Ok(value.tag() == Tag::Object && self.heap.type_of(value)? == ty)
    }

    /// A fresh Semaphore with no excess signals and no waiters.
    pub fn new_semaphore(&mut self) -> Result<Value, RuntimeError> {
        let nil = self.special.nil;
        let semaphore = self.heap.allocate_fields(
            Space::Ephemeral,
            self.special.semaphore,
            SEMAPHORE_SIZE,
            nil,
        )?;
        self.heap
            .store_field(semaphore, SEMAPHORE_EXCESS, Value::from_i64(0))?;
        Ok(semaphore)
    }
}

/// `fork`: run the receiver block in a new process. Answers the process.
pub fn fork(interp: &mut Interpreter, _argc: usize) -> Result<bool, RuntimeError> {
    let block = interp.primitive_receiver(0)?;
    if !interp.is_block(block)? {
        return Ok(false);
    }
    let expected = interp.heap.fetch_field(block, CONTEXT_BLOCK_ARGC)?.as_index()?;
    if expected != 0 {
        return Err(RuntimeError::WrongArgumentCount { expected, got: 0 });
    }
    let nil = interp.special.nil;
    let context = interp.instantiate_block(block, nil)?;
    let process = interp.fork_process(context)?;
    interp.primitive_answer(0, process)
}

pub fn wait(interp: &mut Interpreter, _argc: usize) -> Result<bool, RuntimeError> {
    let semaphore = interp.primitive_receiver(0)?;
    if !interp.is_instance_of(semaphore, interp.special.semaphore)? {
        return Ok(false);
    }
    interp.wait_semaphore(semaphore)?;
    Ok(true)
}

pub fn signal(interp: &mut Interpreter, _argc: usize) -> Result<bool, RuntimeError> {
    let semaphore = interp.primitive_receiver(0)?;
    if !interp.is_instance_of(semaphore, interp.special.semaphore)? {
        return Ok(false);
    }
    interp.signal_semaphore(semaphore)?;
    Ok(true)
}

pub fn yield_processor(interp: &mut Interpreter, _argc: usize) -> Result<bool, RuntimeError> {
    interp.yield_processor()?;
    Ok(true)
}

/// Oldest unread input event, or nil.
pub fn next_input_event(interp: &mut Interpreter, _argc: usize) -> Result<bool, RuntimeError> {
    let event = match interp.next_input_event() {
        Some(event) => Value::try_from_i64(event)?,
        None => interp.special.nil,
    };
    interp.primitive_answer(0, event)
}

pub fn new_semaphore(interp: &mut Interpreter, _argc: usize) -> Result<bool, RuntimeError> {
    let semaphore = interp.new_semaphore()?;
    interp.primitive_answer(0, semaphore)
}
