use object::layout::*;
use object::Tag;

use crate::{Interpreter, RuntimeError};

/// `value`, `value:`, ...: evaluate the receiver block with the `argc`
/// arguments above it on the stack.
pub fn block_value(interp: &mut Interpreter, argc: usize) -> Result<bool, RuntimeError> {
    let block = interp.primitive_receiver(argc)?;
    if !interp.is_block(block)? {
        return Ok(false);
    }
    let source = interp.regs.active_context;
    let first = interp.regs.sp + 1 - argc;
    interp.activate_block(block, source, first, argc, argc + 1)?;
    Ok(true)
}

/// `valueWithArguments:` takes the arguments from an Array.
pub fn value_with_arguments(interp: &mut Interpreter, _argc: usize) -> Result<bool, RuntimeError> {
    let block = interp.primitive_receiver(1)?;
    let args = interp.primitive_argument(1, 0)?;
    if !interp.is_block(block)?
        || args.tag() != Tag::Object
        || interp.heap.type_of(args)? != interp.special.array
    {
        return Ok(false);
    }
    let count = interp.heap.field_count(args)?;
    let expected = interp.heap.fetch_field(block, CONTEXT_BLOCK_ARGC)?.as_index()?;
    if count != expected {
        return Err(RuntimeError::WrongArgumentCount { expected, got: count });
    }
    interp.activate_block(block, args, 0, count, 2)?;
    Ok(true)
}
