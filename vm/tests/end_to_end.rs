use std::thread;
use std::time::Duration;

use bytecode::{BytecodeBuilder, ReturnKind, SpecialValue};
use heap::{HeapError, HeapSettings};
use object::{Format, MethodHeader, Value};
use vm::selectors as sel;
use vm::{Interpreter, Literal, MethodSpec, RuntimeError, VMCreateInfo, demos};

fn new_vm() -> Interpreter {
    Interpreter::new(VMCreateInfo::default()).expect("bootstrap")
}

fn small_heap() -> VMCreateInfo {
    VMCreateInfo {
        heap: HeapSettings {
            segment_words: 1024,
            max_root_segments: 16,
            max_ephemeral_segments: 256,
            gc_threshold_segments: 2,
        },
        ..VMCreateInfo::default()
    }
}

fn int(n: i64) -> Value {
    Value::from_i64(n)
}

/// Compile a method with `temps` temporaries and run it with nil as
/// receiver.
fn doit(
    vm: &mut Interpreter,
    temps: u8,
    literals: Vec<Literal<'_>>,
    build: impl FnOnce(&mut BytecodeBuilder),
) -> Result<Value, RuntimeError> {
    let mut code = BytecodeBuilder::new();
    build(&mut code);
    let spec = MethodSpec::new("doit", MethodHeader::bytecodes(0, temps), code.into_bytes())
        .with_literals(literals);
    let method = vm.compile_method(&spec)?;
    let nil = vm.nil();
    vm.execute(method, nil, &[])
}

fn define(
    vm: &mut Interpreter,
    ty: Value,
    selector: &str,
    header: MethodHeader,
    literals: Vec<Literal<'_>>,
    build: impl FnOnce(&mut BytecodeBuilder),
) {
    let mut code = BytecodeBuilder::new();
    build(&mut code);
    let spec = MethodSpec::new(selector, header, code.into_bytes()).with_literals(literals);
    vm.define_method(ty, &spec).expect("define method");
}

// ── Arithmetic and sends ──────────────────────────────────────────────

#[test]
fn three_plus_four() {
    let mut vm = new_vm();
    let result = doit(&mut vm, 0, vec![Literal::Int(3), Literal::Int(4)], |c| {
        c.push_literal(0);
        c.push_literal(1);
        c.special_send(sel::PLUS, 1);
        c.return_top();
    });
    assert_eq!(result, Ok(int(7)));
}

#[test]
fn demo_programs() {
    let mut vm = new_vm();
    assert_eq!(demos::arith(&mut vm), Ok(int(42)));
    assert_eq!(demos::fib(&mut vm, 20), Ok(int(6765)));
}

#[test]
fn method_answering_self() {
    let mut vm = new_vm();
    let object = vm.special().object;
    define(&mut vm, object, "yourself", MethodHeader::bytecodes(0, 0), vec![], |c| {
        c.ret(ReturnKind::Receiver)
    });
    let array = vm.new_array(&[int(1)]).unwrap();
    assert_eq!(vm.send_message(array, "yourself", &[]), Ok(array));
    assert_eq!(vm.send_message(int(9), "yourself", &[]), Ok(int(9)));
}

#[test]
fn overrides_win_and_inherited_methods_are_found() {
    let mut vm = new_vm();
    let object = vm.special().object;
    let animal = vm.define_type("Animal", object, 0, Format::FIXED).unwrap();
    let dog = vm.define_type("Dog", animal, 0, Format::FIXED).unwrap();

    let answer_literal = |c: &mut BytecodeBuilder| {
        c.push_literal(0);
        c.return_top();
    };
    let header = MethodHeader::bytecodes(0, 0);
    define(&mut vm, animal, "speak", header, vec![Literal::Int(1)], answer_literal);
    define(&mut vm, animal, "legs", header, vec![Literal::Int(4)], answer_literal);
    define(&mut vm, dog, "speak", header, vec![Literal::Int(2)], answer_literal);

    let rex = vm.instantiate(dog, 0).unwrap();
    assert_eq!(vm.send_message(rex, "speak", &[]), Ok(int(2)));
    assert_eq!(vm.send_message(rex, "legs", &[]), Ok(int(4)));
    let generic = vm.instantiate(animal, 0).unwrap();
    assert_eq!(vm.send_message(generic, "speak", &[]), Ok(int(1)));
    assert_eq!(vm.global_at("Dog"), Ok(Some(dog)));
}

#[test]
fn accessors_run_without_a_context() {
    let mut vm = new_vm();
    let object = vm.special().object;
    let point = vm.define_type("Point", object, 2, Format::FIXED).unwrap();
    vm.define_method(point, &MethodSpec::getter("x", 0)).unwrap();
    vm.define_method(point, &MethodSpec::setter("x:", 0)).unwrap();

    let p = vm.instantiate(point, 0).unwrap();
    assert_eq!(vm.send_message(p, "x:", &[int(5)]), Ok(p));
    assert_eq!(vm.send_message(p, "x", &[]), Ok(int(5)));

    // Twenty accessor sends allocate exactly as much as one.
    let allocated = |vm: &mut Interpreter, sends: usize| {
        let before = vm.heap().stats().ephemeral_objects;
        let result = doit(vm, 0, vec![Literal::Value(p), Literal::Symbol("x")], |c| {
            for _ in 1..sends {
                c.push_literal(0);
                c.send(1, 0);
                c.pop();
            }
            c.push_literal(0);
            c.send(1, 0);
            c.return_top();
        });
        assert_eq!(result, Ok(int(5)));
        vm.heap().stats().ephemeral_objects - before
    };
    allocated(&mut vm, 1);
    let one = allocated(&mut vm, 1);
    let twenty = allocated(&mut vm, 20);
    assert_eq!(one, twenty);
}

#[test]
fn declined_primitive_runs_the_method_body() {
    let mut vm = new_vm();
    let small_integer = vm.special().small_integer;
    define(
        &mut vm,
        small_integer,
        "plusOrArg:",
        MethodHeader::primitive(vm::primitives::ADD as u16, 1, 1),
        vec![],
        |c| {
            c.push_temporary(0);
            c.return_top();
        },
    );
    assert_eq!(vm.send_message(int(3), "plusOrArg:", &[int(4)]), Ok(int(7)));
    let nil = vm.nil();
    assert_eq!(vm.send_message(int(3), "plusOrArg:", &[nil]), Ok(nil));
    let t = vm.special().true_obj;
    assert_eq!(vm.send_message(int(3), "plusOrArg:", &[t]), Ok(t));
}

#[test]
fn overflow_declines_to_the_kernel_fallback() {
    let mut vm = new_vm();
    let max = int(Value::SMALL_INT_MAX);
    assert_eq!(
        vm.send_message(max, "+", &[int(1)]),
        Err(RuntimeError::UnknownSelector {
            selector: "primitiveFailed".into(),
            receiver_type: "SmallInteger".into(),
        })
    );
}

#[test]
fn indexed_access_through_special_sends() {
    let mut vm = new_vm();
    let literals = vec![
        Literal::Symbol("Array"),
        Literal::Int(3),
        Literal::Int(2),
        Literal::Int(9),
    ];
    let result = doit(&mut vm, 1, literals, |c| {
        c.push_global(0);
        c.push_literal(1);
        c.special_send(sel::BASIC_NEW_SIZED, 1);
        c.pop_store_temporary(0);
        c.push_temporary(0);
        c.push_literal(2);
        c.push_literal(3);
        c.special_send(sel::AT_PUT, 2);
        c.pop();
        c.push_temporary(0);
        c.push_literal(2);
        c.special_send(sel::AT, 1);
        c.push_temporary(0);
        c.special_send(sel::SIZE, 0);
        c.special_send(sel::PLUS, 1);
        c.return_top();
    });
    assert_eq!(result, Ok(int(12)));
}

#[test]
fn special_sends_find_user_overrides() {
    let mut vm = new_vm();
    let object = vm.special().object;
    let stack = vm.define_type("Stack", object, 1, Format::FIXED).unwrap();
    vm.define_method(stack, &MethodSpec::getter("size", 0)).unwrap();
    vm.define_method(stack, &MethodSpec::setter("depth:", 0)).unwrap();
    define(&mut vm, stack, "at:", MethodHeader::bytecodes(1, 1), vec![], |c| {
        c.push_temporary(0);
        c.return_top();
    });
    let s = vm.instantiate(stack, 0).unwrap();
    assert_eq!(vm.send_message(s, "depth:", &[int(5)]), Ok(s));

    let result = doit(&mut vm, 0, vec![Literal::Value(s), Literal::Int(7)], |c| {
        c.push_literal(0);
        c.special_send(sel::SIZE, 0);
        c.push_literal(0);
        c.push_literal(1);
        c.special_send(sel::AT, 1);
        c.special_send(sel::PLUS, 1);
        c.return_top();
    });
    assert_eq!(result, Ok(int(12)));
}

#[test]
fn oversized_basic_new_declines_to_the_kernel_fallback() {
    let mut vm = new_vm();
    let literals = vec![Literal::Symbol("Array"), Literal::Int(Value::SMALL_INT_MAX)];
    let result = doit(&mut vm, 0, literals, |c| {
        c.push_global(0);
        c.push_literal(1);
        c.special_send(sel::BASIC_NEW_SIZED, 1);
        c.return_top();
    });
    assert_eq!(
        result,
        Err(RuntimeError::UnknownSelector {
            selector: "primitiveFailed".into(),
            receiver_type: "Array class".into(),
        })
    );
    // The interpreter is still usable afterwards.
    assert_eq!(demos::arith(&mut vm), Ok(int(42)));
}

#[test]
fn perform_sends_a_computed_selector() {
    let mut vm = new_vm();
    let plus = vm.intern("+").unwrap();
    assert_eq!(vm.send_message(int(3), "perform:with:", &[plus, int(4)]), Ok(int(7)));
    let negated = vm.intern("negated").unwrap();
    assert!(matches!(
        vm.send_message(int(3), "perform:", &[negated]),
        Err(RuntimeError::UnknownSelector { .. })
    ));
}

#[test]
fn globals_store_and_load() {
    let mut vm = new_vm();
    let literals = vec![Literal::Symbol("Counter"), Literal::Int(5)];
    let result = doit(&mut vm, 0, literals, |c| {
        c.push_literal(1);
        c.pop_store_global(0);
        c.push_global(0);
        c.push_special(SpecialValue::One);
        c.special_send(sel::PLUS, 1);
        c.return_top();
    });
    assert_eq!(result, Ok(int(6)));
    assert_eq!(vm.global_at("Counter"), Ok(Some(int(5))));

    let missing = doit(&mut vm, 0, vec![Literal::Symbol("Missing")], |c| {
        c.push_global(0);
        c.return_top();
    });
    assert_eq!(missing, Ok(vm.nil()));
}

// ── Failures ──────────────────────────────────────────────────────────

#[test]
fn unknown_selector_names_selector_and_type() {
    let mut vm = new_vm();
    assert_eq!(
        vm.send_message(int(3), "frobnicate", &[]),
        Err(RuntimeError::UnknownSelector {
            selector: "frobnicate".into(),
            receiver_type: "SmallInteger".into(),
        })
    );
}

#[test]
fn does_not_understand_receives_the_selector() {
    let mut vm = new_vm();
    let object = vm.special().object;
    define(&mut vm, object, "doesNotUnderstand:", MethodHeader::bytecodes(1, 1), vec![], |c| {
        c.push_temporary(0);
        c.return_top();
    });
    let result = vm.send_message(int(3), "foo:bar:", &[int(1), int(2)]).unwrap();
    assert_eq!(vm.find_symbol("foo:bar:"), Ok(Some(result)));
}

#[test]
fn conditional_jump_on_integer_fails() {
    let mut vm = new_vm();
    let result = doit(&mut vm, 0, vec![Literal::Int(3)], |c| {
        c.push_literal(0);
        let skip = c.jump_if_false();
        c.push_nil();
        c.bind(skip);
        c.push_nil();
        c.return_top();
    });
    assert_eq!(result, Err(RuntimeError::MustBeBoolean));
}

// ── Blocks ────────────────────────────────────────────────────────────

#[test]
fn block_with_two_arguments() {
    let mut vm = new_vm();
    let result = doit(&mut vm, 2, vec![Literal::Int(10), Literal::Int(3)], |c| {
        let block = c.block_copy(2);
        c.pop_store_temporary(1);
        c.pop_store_temporary(0);
        c.push_temporary(0);
        c.push_temporary(1);
        c.special_send(sel::MINUS, 1);
        c.block_return();
        c.end_block(block);
        c.push_literal(0);
        c.push_literal(1);
        c.special_send(sel::VALUE_2, 2);
        c.return_top();
    });
    assert_eq!(result, Ok(int(7)));
}

#[test]
fn block_arity_mismatch_is_an_error() {
    let mut vm = new_vm();
    let result = doit(&mut vm, 1, vec![], |c| {
        let block = c.block_copy(1);
        c.pop_store_temporary(0);
        c.push_temporary(0);
        c.block_return();
        c.end_block(block);
        c.special_send(sel::VALUE, 0);
        c.return_top();
    });
    assert_eq!(result, Err(RuntimeError::WrongArgumentCount { expected: 1, got: 0 }));
}

#[test]
fn non_local_return_leaves_the_home_method() {
    let mut vm = new_vm();
    let object = vm.special().object;
    // callBlock: aBlock  aBlock value. ^99
    define(
        &mut vm,
        object,
        "callBlock:",
        MethodHeader::bytecodes(1, 1),
        vec![Literal::Int(99)],
        |c| {
            c.push_temporary(0);
            c.special_send(sel::VALUE, 0);
            c.pop();
            c.push_literal(0);
            c.return_top();
        },
    );
    // nlr  self callBlock: [^42]. ^0
    define(
        &mut vm,
        object,
        "nlr",
        MethodHeader::bytecodes(0, 0),
        vec![Literal::Symbol("callBlock:"), Literal::Int(42)],
        |c| {
            c.push_receiver();
            let block = c.block_copy(0);
            c.push_literal(1);
            c.return_top();
            c.end_block(block);
            c.send(0, 1);
            c.pop();
            c.push_special(SpecialValue::Zero);
            c.return_top();
        },
    );
    let nil = vm.nil();
    assert_eq!(vm.send_message(nil, "nlr", &[]), Ok(int(42)));
}

#[test]
fn non_local_return_to_a_dead_home_fails() {
    let mut vm = new_vm();
    let object = vm.special().object;
    // makeBlock  ^[^1]
    define(&mut vm, object, "makeBlock", MethodHeader::bytecodes(0, 0), vec![], |c| {
        let block = c.block_copy(0);
        c.push_special(SpecialValue::One);
        c.return_top();
        c.end_block(block);
        c.return_top();
    });
    // useBlock  ^self makeBlock value
    define(
        &mut vm,
        object,
        "useBlock",
        MethodHeader::bytecodes(0, 0),
        vec![Literal::Symbol("makeBlock")],
        |c| {
            c.push_receiver();
            c.send(0, 0);
            c.special_send(sel::VALUE, 0);
            c.return_top();
        },
    );
    let nil = vm.nil();
    assert_eq!(vm.send_message(nil, "useBlock", &[]), Err(RuntimeError::CannotReturn));
}

// ── Processes ─────────────────────────────────────────────────────────

#[test]
fn producer_and_consumer() {
    let mut vm = new_vm();
    assert_eq!(demos::processes(&mut vm, 10), Ok(int(55)));
    assert_eq!(vm.ready_processes(), Ok(vec![]));
    assert!(vm.context_switches() > 0);
}

#[test]
fn forked_process_runs_before_the_forker_resumes() {
    let mut vm = new_vm();
    let literals = vec![Literal::Symbol("Order"), Literal::Int(10), Literal::Symbol("fork")];
    let result = doit(&mut vm, 0, literals, |c| {
        c.push_special(SpecialValue::Zero);
        c.pop_store_global(0);
        let block = c.block_copy(0);
        c.push_global(0);
        c.push_literal(1);
        c.special_send(sel::TIMES, 1);
        c.push_special(SpecialValue::One);
        c.special_send(sel::PLUS, 1);
        c.pop_store_global(0);
        c.push_nil();
        c.block_return();
        c.end_block(block);
        c.send(2, 0);
        c.pop();
        c.push_global(0);
        c.push_literal(1);
        c.special_send(sel::TIMES, 1);
        c.push_special(SpecialValue::Two);
        c.special_send(sel::PLUS, 1);
        c.pop_store_global(0);
        c.push_global(0);
        c.return_top();
    });
    assert_eq!(result, Ok(int(12)));
}

#[test]
fn semaphore_wakes_waiters_in_order() {
    let mut vm = new_vm();
    const S: u8 = 0;
    const ORDER: u8 = 3;
    let literals = vec![
        Literal::Symbol("S"),
        Literal::Symbol("Semaphore"),
        Literal::Symbol("new"),
        Literal::Symbol("Order"),
        Literal::Symbol("wait"),
        Literal::Symbol("fork"),
        Literal::Symbol("signal"),
        Literal::Symbol("Processor"),
        Literal::Symbol("yield"),
        Literal::Int(10),
    ];
    let result = doit(&mut vm, 0, literals, |c| {
        c.push_global(1);
        c.send(2, 0);
        c.pop_store_global(S);
        c.push_special(SpecialValue::Zero);
        c.pop_store_global(ORDER);
        for digit in [SpecialValue::One, SpecialValue::Two] {
            let block = c.block_copy(0);
            c.push_global(S);
            c.send(4, 0);
            c.pop();
            c.push_global(ORDER);
            c.push_literal(9);
            c.special_send(sel::TIMES, 1);
            c.push_special(digit);
            c.special_send(sel::PLUS, 1);
            c.pop_store_global(ORDER);
            c.push_nil();
            c.block_return();
            c.end_block(block);
            c.send(5, 0);
            c.pop();
        }
        for _ in 0..2 {
            c.push_global(S);
            c.send(6, 0);
            c.pop();
        }
        c.push_global(7);
        c.send(8, 0);
        c.pop();
        c.push_global(ORDER);
        c.return_top();
    });
    assert_eq!(result, Ok(int(12)));
}

#[test]
fn excess_signal_lets_wait_pass() {
    let mut vm = new_vm();
    let literals = vec![
        Literal::Symbol("Semaphore"),
        Literal::Symbol("new"),
        Literal::Symbol("signal"),
        Literal::Symbol("wait"),
        Literal::Int(7),
    ];
    let result = doit(&mut vm, 0, literals, |c| {
        c.push_global(0);
        c.send(1, 0);
        c.send(2, 0);
        c.send(3, 0);
        c.pop();
        c.push_literal(4);
        c.return_top();
    });
    assert_eq!(result, Ok(int(7)));
}

#[test]
fn waiting_with_nothing_runnable_deadlocks() {
    let mut vm = Interpreter::new(VMCreateInfo {
        idle_limit: Some(Duration::from_millis(50)),
        ..VMCreateInfo::default()
    })
    .unwrap();
    let literals = vec![
        Literal::Symbol("Semaphore"),
        Literal::Symbol("new"),
        Literal::Symbol("wait"),
    ];
    let result = doit(&mut vm, 0, literals, |c| {
        c.push_global(0);
        c.send(1, 0);
        c.send(2, 0);
        c.return_top();
    });
    assert_eq!(result, Err(RuntimeError::Deadlock));
}

#[test]
fn execute_after_a_deadlock_starts_clean() {
    let mut vm = Interpreter::new(VMCreateInfo {
        idle_limit: Some(Duration::from_millis(50)),
        ..VMCreateInfo::default()
    })
    .unwrap();
    let literals = vec![Literal::Symbol("InputSemaphore"), Literal::Symbol("wait")];
    let result = doit(&mut vm, 0, literals, |c| {
        c.push_global(0);
        c.send(1, 0);
        c.return_top();
    });
    assert_eq!(result, Err(RuntimeError::Deadlock));
    let input = vm.global_at("InputSemaphore").unwrap().unwrap();
    assert_eq!(vm.waiting_processes(input).unwrap().len(), 1);

    // The signal finds no waiter left over from the aborted run.
    let literals = vec![Literal::Symbol("InputSemaphore"), Literal::Symbol("signal")];
    let result = doit(&mut vm, 0, literals, |c| {
        c.push_global(0);
        c.send(1, 0);
        c.pop();
        c.push_special(SpecialValue::One);
        c.return_top();
    });
    assert_eq!(result, Ok(int(1)));
    assert_eq!(vm.waiting_processes(input), Ok(vec![]));
    assert_eq!(vm.ready_processes(), Ok(vec![]));

    let literals = vec![Literal::Symbol("InputSemaphore"), Literal::Symbol("wait")];
    let result = doit(&mut vm, 0, literals, |c| {
        c.push_global(0);
        c.send(1, 0);
        c.pop();
        c.push_special(SpecialValue::Two);
        c.return_top();
    });
    assert_eq!(result, Ok(int(2)));
}

#[test]
fn input_from_another_thread_wakes_a_waiter() {
    let mut vm = new_vm();
    let feed = vm.input_feed();
    let producer = thread::spawn(move || {
        thread::sleep(Duration::from_millis(20));
        feed.push(42);
    });
    let literals = vec![
        Literal::Symbol("InputSemaphore"),
        Literal::Symbol("wait"),
        Literal::Symbol("Processor"),
        Literal::Symbol("nextInputEvent"),
    ];
    let result = doit(&mut vm, 0, literals, |c| {
        c.push_global(0);
        c.send(1, 0);
        c.pop();
        c.push_global(2);
        c.send(3, 0);
        c.return_top();
    });
    producer.join().unwrap();
    assert_eq!(result, Ok(int(42)));
}

// ── Collection ────────────────────────────────────────────────────────

#[test]
fn recursion_survives_collections() {
    let mut vm = Interpreter::new(small_heap()).unwrap();
    assert_eq!(demos::fib(&mut vm, 15), Ok(int(610)));
    assert!(vm.heap().stats().collections >= 2);
}

#[test]
fn allocation_churn_is_reclaimed() {
    let mut vm = Interpreter::new(small_heap()).unwrap();
    assert_eq!(demos::gc_churn(&mut vm, 2000), Ok(int(2000)));
    let stats = vm.heap().stats();
    assert!(stats.collections > 0);
    assert!(stats.ephemeral_segments < 256);
}

#[test]
fn processes_survive_collections() {
    let mut vm = Interpreter::new(small_heap()).unwrap();
    assert_eq!(demos::processes(&mut vm, 200), Ok(int(20_100)));
    assert_eq!(vm.ready_processes(), Ok(vec![]));
}

#[test]
fn pinned_values_move_and_old_handles_go_stale() {
    let mut vm = new_vm();
    let array = vm.new_array(&[int(7)]).unwrap();
    let id = vm.pin(array);
    vm.collect_garbage().unwrap();

    let moved = vm.pinned(id).unwrap();
    assert_ne!(moved, array);
    assert_eq!(vm.heap().fetch_field(moved, 0), Ok(int(7)));
    assert!(matches!(
        vm.heap().fetch_field(array, 0),
        Err(HeapError::StaleHandle(_))
    ));
    assert_eq!(vm.unpin(id), Some(moved));
}

#[test]
fn globals_and_methods_survive_explicit_collection() {
    let mut vm = new_vm();
    demos::install_fib(&mut vm).unwrap();
    let array = vm.new_array(&[int(1), int(2)]).unwrap();
    vm.global_at_put("Kept", array).unwrap();
    vm.collect_garbage().unwrap();
    vm.collect_garbage().unwrap();

    let kept = vm.global_at("Kept").unwrap().unwrap();
    assert_eq!(vm.heap().fetch_field(kept, 1), Ok(int(2)));
    assert_eq!(vm.send_message(int(10), "fib", &[]), Ok(int(55)));
}
