//! Primitive-backed methods every interpreter starts with.
//!
//! Each is a `Primitive` method whose fallback body sends
//! `primitiveFailed` to the receiver, so a declined primitive reaches user
//! code (or fails with `UnknownSelector` if nothing handles it).

use bytecode::BytecodeBuilder;
use object::{MethodHeader, Value};

use crate::method::{Literal, MethodSpec};
use crate::primitives as prim;
use crate::{Interpreter, RuntimeError};

/// Which side of a Type a kernel method lives on.
#[derive(Clone, Copy)]
enum Side {
    Instance(fn(&Interpreter) -> Value),
    Class(fn(&Interpreter) -> Value),
}

struct KernelMethod {
    side: Side,
    selector: &'static str,
    primitive: usize,
}

const fn on(ty: fn(&Interpreter) -> Value, selector: &'static str, primitive: usize) -> KernelMethod {
    KernelMethod {
        side: Side::Instance(ty),
        selector,
        primitive,
    }
}

const fn on_class(ty: fn(&Interpreter) -> Value, selector: &'static str, primitive: usize) -> KernelMethod {
    KernelMethod {
        side: Side::Class(ty),
        selector,
        primitive,
    }
}

fn small_integer(i: &Interpreter) -> Value {
    i.special.small_integer
}
fn object(i: &Interpreter) -> Value {
    i.special.object
}
fn block(i: &Interpreter) -> Value {
    i.special.block_context
}
fn semaphore(i: &Interpreter) -> Value {
    i.special.semaphore
}
fn processor(i: &Interpreter) -> Value {
    i.special.processor_scheduler
}
fn class(i: &Interpreter) -> Value {
    i.special.class
}

const KERNEL: &[KernelMethod] = &[
    on(small_integer, "+", prim::ADD),
    on(small_integer, "-", prim::SUB),
    on(small_integer, "*", prim::MUL),
    on(small_integer, "//", prim::DIV),
    on(small_integer, "\\\\", prim::MOD),
    on(small_integer, "<", prim::LT),
    on(small_integer, ">", prim::GT),
    on(small_integer, "<=", prim::LE),
    on(small_integer, ">=", prim::GE),
    on(small_integer, "=", prim::EQ),
    on(small_integer, "~=", prim::NE),
    on(small_integer, "bitAnd:", prim::BIT_AND),
    on(small_integer, "bitOr:", prim::BIT_OR),
    on(small_integer, "bitShift:", prim::BIT_SHIFT),
    on(object, "==", prim::IDENTICAL),
    on(object, "=", prim::IDENTICAL),
    on(object, "class", prim::CLASS),
    on(object, "basicAt:", prim::BASIC_AT),
    on(object, "basicAt:put:", prim::BASIC_AT_PUT),
    on(object, "basicSize", prim::BASIC_SIZE),
    on(object, "at:", prim::BASIC_AT),
    on(object, "at:put:", prim::BASIC_AT_PUT),
    on(object, "size", prim::BASIC_SIZE),
    on(object, "hash", prim::HASH),
    on(object, "perform:", prim::PERFORM),
    on(object, "perform:with:", prim::PERFORM_WITH),
    on(object, "perform:with:with:", prim::PERFORM_WITH_WITH),
    on(block, "value", prim::VALUE),
    on(block, "value:", prim::VALUE_1),
    on(block, "value:value:", prim::VALUE_2),
    on(block, "value:value:value:", prim::VALUE_3),
    on(block, "valueWithArguments:", prim::VALUE_WITH_ARGUMENTS),
    on(block, "fork", prim::FORK),
    on(semaphore, "wait", prim::WAIT),
    on(semaphore, "signal", prim::SIGNAL),
    on(processor, "yield", prim::YIELD),
    on(processor, "nextInputEvent", prim::NEXT_INPUT_EVENT),
    // Class is the superclass of every metatype, so these are class-side
    // methods of every type.
    on(class, "basicNew", prim::BASIC_NEW),
    on(class, "basicNew:", prim::BASIC_NEW_SIZED),
    on(class, "new", prim::BASIC_NEW),
    on(class, "new:", prim::BASIC_NEW_SIZED),
    on_class(semaphore, "new", prim::NEW_SEMAPHORE),
];

fn arity(selector: &str) -> u8 {
    if !selector.starts_with(|c: char| c.is_ascii_alphabetic()) {
        return 1;
    }
    selector.matches(':').count() as u8
}

pub(crate) fn install(interp: &mut Interpreter) -> Result<(), RuntimeError> {
    let mut fallback = BytecodeBuilder::new();
    fallback.push_receiver();
    fallback.send(0, 0);
    fallback.return_top();
    let fallback = fallback.into_bytes();

    for method in KERNEL {
        let ty = match method.side {
            Side::Instance(ty) => ty(interp),
            Side::Class(ty) => {
                let ty = ty(interp);
                interp.heap.type_of(ty)?
            }
        };
        let args = arity(method.selector);
        let header = MethodHeader::primitive(method.primitive as u16, args, args);
        let spec = MethodSpec::new(method.selector, header, fallback.clone())
            .with_literals(vec![Literal::Symbol("primitiveFailed")]);
        interp.define_method(ty, &spec)?;
    }
    log::debug!("installed {} kernel methods", KERNEL.len());
    Ok(())
}
