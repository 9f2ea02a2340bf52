//! Small programs assembled with [`BytecodeBuilder`], used by the `stvm`
//! binary and the benchmarks.

use bytecode::{BytecodeBuilder, SpecialValue};
use object::{MethodHeader, Value};

use crate::method::{Literal, MethodSpec};
use crate::selectors as sel;
use crate::{Interpreter, RuntimeError};

/// `(3 + 4) * 6`, run as a doit with nil as receiver.
pub fn arith(vm: &mut Interpreter) -> Result<Value, RuntimeError> {
    let mut code = BytecodeBuilder::new();
    code.push_literal(0);
    code.push_literal(1);
    code.special_send(sel::PLUS, 1);
    code.push_literal(2);
    code.special_send(sel::TIMES, 1);
    code.return_top();
    let spec = MethodSpec::new("doit", MethodHeader::bytecodes(0, 0), code.into_bytes())
        .with_literals(vec![Literal::Int(3), Literal::Int(4), Literal::Int(6)]);
    let method = vm.compile_method(&spec)?;
    let nil = vm.nil();
    vm.execute(method, nil, &[])
}

/// Install `SmallInteger>>fib`:
///
/// ```text
/// fib
///     self < 2 ifTrue: [^self].
///     ^(self - 1) fib + (self - 2) fib
/// ```
pub fn install_fib(vm: &mut Interpreter) -> Result<Value, RuntimeError> {
    let mut code = BytecodeBuilder::new();
    code.push_receiver();
    code.push_special(SpecialValue::Two);
    code.special_send(sel::LESS, 1);
    let recurse = code.jump_if_false();
    code.push_receiver();
    code.return_top();
    code.bind(recurse);
    code.push_receiver();
    code.push_special(SpecialValue::One);
    code.special_send(sel::MINUS, 1);
    code.send(0, 0);
    code.push_receiver();
    code.push_special(SpecialValue::Two);
    code.special_send(sel::MINUS, 1);
    code.send(0, 0);
    code.special_send(sel::PLUS, 1);
    code.return_top();

    let spec = MethodSpec::new("fib", MethodHeader::bytecodes(0, 0), code.into_bytes())
        .with_literals(vec![Literal::Symbol("fib")]);
    let small_integer = vm.special().small_integer;
    vm.define_method(small_integer, &spec)
}

pub fn fib(vm: &mut Interpreter, n: i64) -> Result<Value, RuntimeError> {
    install_fib(vm)?;
    vm.send_message(Value::try_from_i64(n)?, "fib", &[])
}

/// Install `Object>>producerConsumer:`. A forked producer adds `1..n`
/// into a shared total, signalling after each step; the caller waits `n`
/// times and answers the total.
///
/// ```text
/// producerConsumer: n
///     | sem total i j |
///     sem := Semaphore new.
///     total := 0.
///     [i := 1.
///      [i <= n] whileTrue: [total := total + i. sem signal. i := i + 1]] fork.
///     j := 0.
///     [j < n] whileTrue: [sem wait. j := j + 1].
///     ^total
/// ```
pub fn install_producer_consumer(vm: &mut Interpreter) -> Result<Value, RuntimeError> {
    const N: u8 = 0;
    const SEM: u8 = 1;
    const TOTAL: u8 = 2;
    const I: u8 = 3;
    const J: u8 = 4;

    let mut code = BytecodeBuilder::new();
    code.push_global(0);
    code.send(1, 0);
    code.pop_store_temporary(SEM);
    code.push_special(SpecialValue::Zero);
    code.pop_store_temporary(TOTAL);

    let block = code.block_copy(0);
    code.push_special(SpecialValue::One);
    code.pop_store_temporary(I);
    let produce = code.current_offset();
    code.push_temporary(I);
    code.push_temporary(N);
    code.special_send(sel::LESS_EQUAL, 1);
    let produced = code.jump_if_false();
    code.push_temporary(TOTAL);
    code.push_temporary(I);
    code.special_send(sel::PLUS, 1);
    code.pop_store_temporary(TOTAL);
    code.push_temporary(SEM);
    code.send(3, 0);
    code.pop();
    code.push_temporary(I);
    code.push_special(SpecialValue::One);
    code.special_send(sel::PLUS, 1);
    code.pop_store_temporary(I);
    code.jump_back(produce);
    code.bind(produced);
    code.push_nil();
    code.block_return();
    code.end_block(block);
    code.send(2, 0);
    code.pop();

    code.push_special(SpecialValue::Zero);
    code.pop_store_temporary(J);
    let consume = code.current_offset();
    code.push_temporary(J);
    code.push_temporary(N);
    code.special_send(sel::LESS, 1);
    let consumed = code.jump_if_false();
    code.push_temporary(SEM);
    code.send(4, 0);
    code.pop();
    code.push_temporary(J);
    code.push_special(SpecialValue::One);
    code.special_send(sel::PLUS, 1);
    code.pop_store_temporary(J);
    code.jump_back(consume);
    code.bind(consumed);
    code.push_temporary(TOTAL);
    code.return_top();

    let spec = MethodSpec::new(
        "producerConsumer:",
        MethodHeader::bytecodes(1, 5),
        code.into_bytes(),
    )
    .with_literals(vec![
        Literal::Symbol("Semaphore"),
        Literal::Symbol("new"),
        Literal::Symbol("fork"),
        Literal::Symbol("signal"),
        Literal::Symbol("wait"),
    ]);
    let object = vm.special().object;
    vm.define_method(object, &spec)
}

pub fn processes(vm: &mut Interpreter, n: i64) -> Result<Value, RuntimeError> {
    install_producer_consumer(vm)?;
    let nil = vm.nil();
    vm.send_message(nil, "producerConsumer:", &[Value::try_from_i64(n)?])
}

/// Install `Object>>churn:`, which allocates `n` hundred-slot Arrays and
/// keeps only the last, answering `n`.
pub fn install_churn(vm: &mut Interpreter) -> Result<Value, RuntimeError> {
    const N: u8 = 0;
    const I: u8 = 1;
    const KEEP: u8 = 2;

    let mut code = BytecodeBuilder::new();
    code.push_special(SpecialValue::Zero);
    code.pop_store_temporary(I);
    let top = code.current_offset();
    code.push_temporary(I);
    code.push_temporary(N);
    code.special_send(sel::LESS, 1);
    let done = code.jump_if_false();
    code.push_global(0);
    code.push_literal(1);
    code.special_send(sel::BASIC_NEW_SIZED, 1);
    code.pop_store_temporary(KEEP);
    code.push_temporary(I);
    code.push_special(SpecialValue::One);
    code.special_send(sel::PLUS, 1);
    code.pop_store_temporary(I);
    code.jump_back(top);
    code.bind(done);
    code.push_temporary(I);
    code.return_top();

    let spec = MethodSpec::new("churn:", MethodHeader::bytecodes(1, 3), code.into_bytes())
        .with_literals(vec![Literal::Symbol("Array"), Literal::Int(100)]);
    let object = vm.special().object;
    vm.define_method(object, &spec)
}

pub fn gc_churn(vm: &mut Interpreter, n: i64) -> Result<Value, RuntimeError> {
    install_churn(vm)?;
    let nil = vm.nil();
    vm.send_message(nil, "churn:", &[Value::try_from_i64(n)?])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::VMCreateInfo;

    #[test]
    fn arith_answers_42() {
        let mut vm = Interpreter::new(VMCreateInfo::default()).unwrap();
        assert_eq!(arith(&mut vm).unwrap(), Value::from_i64(42));
    }

    #[test]
    fn fib_of_ten() {
        let mut vm = Interpreter::new(VMCreateInfo::default()).unwrap();
        assert_eq!(fib(&mut vm, 10).unwrap(), Value::from_i64(55));
    }
}
