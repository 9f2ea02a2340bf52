use bytecode::{Instruction, ReturnKind, SpecialValue, decode_at};
use heap::{GcCycle, Heap, RootProvider};
use object::layout::*;
use object::{SpecialObjects, Value};

use crate::dictionary::{GLOBALS, Tables};
use crate::handles::RootSet;
use crate::input::InputFeed;
use crate::primitives::{PrimitiveDesc, default_primitives};
use crate::scheduler::Scheduler;
use crate::send::MethodCache;
use crate::special::bootstrap;
use crate::{RuntimeError, VMCreateInfo};

/// Interpreter registers. Everything here that holds a [`Value`] is a
/// collector root.
pub(crate) struct Registers {
    pub active_context: Value,
    pub home_context: Value,
    pub method: Value,
    pub receiver: Value,
    /// Opcode buffer of `method`.
    pub opcodes: Value,
    pub ip: usize,
    /// Field index of the top of the operand stack.
    pub sp: usize,
    /// First operand stack field of the active context.
    pub stack_base: usize,
    /// Field count of the active context.
    pub stack_limit: usize,
    /// Temporaries of the home method.
    pub temp_count: usize,
    /// Process that runs embedder calls.
    pub entry_process: Value,
    /// Semaphore the entry process is queued on, or nil.
    pub entry_wait: Value,
    /// Set when the entry process's bottom context returns.
    pub result: Option<Value>,
}

impl Registers {
    fn cleared(nil: Value, entry_process: Value) -> Self {
        Self {
            active_context: nil,
            home_context: nil,
            method: nil,
            receiver: nil,
            opcodes: nil,
            ip: 0,
            sp: 0,
            stack_base: 0,
            stack_limit: 0,
            temp_count: 0,
            entry_process,
            entry_wait: nil,
            result: None,
        }
    }
}

pub(crate) struct InterpreterRoots<'a> {
    regs: &'a mut Registers,
    special: &'a mut SpecialObjects,
    pins: &'a mut RootSet,
}

impl RootProvider for InterpreterRoots<'_> {
    fn visit_roots(&mut self, visitor: &mut dyn FnMut(&mut Value)) {
        visitor(&mut self.regs.active_context);
        visitor(&mut self.regs.home_context);
        visitor(&mut self.regs.method);
        visitor(&mut self.regs.receiver);
        visitor(&mut self.regs.opcodes);
        visitor(&mut self.regs.entry_process);
        visitor(&mut self.regs.entry_wait);
        if let Some(result) = &mut self.regs.result {
            visitor(result);
        }
        self.special.visit(visitor);
        self.pins.visit(visitor);
    }
}

/// A bytecode interpreter with its own heap and process scheduler.
///
/// Instances are independent; several may coexist in one program.
pub struct Interpreter {
    pub(crate) heap: Heap,
    pub(crate) special: SpecialObjects,
    pub(crate) settings: VMCreateInfo,
    pub(crate) primitives: Vec<PrimitiveDesc>,
    pub(crate) regs: Registers,
    pub(crate) cache: MethodCache,
    pub(crate) scheduler: Scheduler,
    pub(crate) input: InputFeed,
    pub(crate) pins: RootSet,
    /// Instructions since the last housekeeping pass.
    pub(crate) ticks: u32,
    pub(crate) instructions: u64,
}

impl Interpreter {
    pub fn new(settings: VMCreateInfo) -> Result<Self, RuntimeError> {
        settings.validate().map_err(RuntimeError::InvalidSettings)?;
        let mut heap = Heap::new(settings.heap.clone())?;
        let special = bootstrap(&mut heap, &settings)?;
        let entry_process = heap.fetch_field(special.processor, PROCESSOR_ACTIVE)?;

        let mut interpreter = Self {
            regs: Registers::cleared(special.nil, entry_process),
            heap,
            special,
            primitives: default_primitives(),
            cache: MethodCache::new(),
            scheduler: Scheduler::new(),
            input: InputFeed::new(),
            pins: RootSet::new(),
            ticks: 0,
            instructions: 0,
            settings,
        };
        crate::kernel::install(&mut interpreter)?;
        log::info!(
            "interpreter ready: {} primitives, heap {:?}",
            interpreter.primitives.len(),
            interpreter.heap.stats()
        );
        Ok(interpreter)
    }

    // ── Accessors ──────────────────────────────────────────────────

    pub fn heap(&self) -> &Heap {
        &self.heap
    }

    pub fn heap_mut(&mut self) -> &mut Heap {
        &mut self.heap
    }

    pub fn special(&self) -> &SpecialObjects {
        &self.special
    }

    pub fn settings(&self) -> &VMCreateInfo {
        &self.settings
    }

    /// A handle on the input queue that other threads can push into.
    pub fn input_feed(&self) -> InputFeed {
        self.input.clone()
    }

    /// Instructions executed since creation.
    pub fn instructions(&self) -> u64 {
        self.instructions
    }

    pub fn nil(&self) -> Value {
        self.special.nil
    }

    pub(crate) fn tables(&self) -> Tables {
        Tables {
            nil: self.special.nil,
            array: self.special.array,
            capacity: self.settings.dictionary_capacity,
            growth: self.settings.dictionary_growth,
        }
    }

    pub(crate) fn literal(&self, index: u8) -> Result<Value, RuntimeError> {
        Ok(self
            .heap
            .fetch_field(self.regs.method, METHOD_LITERALS + index as usize)?)
    }

    // ── Execution ──────────────────────────────────────────────────

    /// Run `method` on `receiver` in the entry process until its bottom
    /// context returns.
    ///
    /// Values obtained before the call may be stale afterwards if a
    /// collection ran; keep long-lived values in globals or pin them.
    pub fn execute(
        &mut self,
        method: Value,
        receiver: Value,
        args: &[Value],
    ) -> Result<Value, RuntimeError> {
        let context = self.entry_context(method, receiver, args)?;
        self.detach_entry_process()?;

        let processor = self.special.processor;
        self.heap
            .store_field(processor, PROCESSOR_ACTIVE, self.regs.entry_process)?;
        self.heap
            .store_field(self.regs.entry_process, PROCESS_CONTEXT, context)?;
        self.scheduler.switch_pending = false;
        self.scheduler.mark_running();
        self.regs.result = None;
        self.reload(context)?;
        self.run()
    }

    /// Send `selector` to `receiver` through normal lookup, as if from
    /// code, and run until it answers.
    pub fn send_message(
        &mut self,
        receiver: Value,
        selector: &str,
        args: &[Value],
    ) -> Result<Value, RuntimeError> {
        let trampoline = self.trampoline(receiver, selector, args)?;
        let nil = self.special.nil;
        self.execute(trampoline, nil, &[])
    }

    fn run(&mut self) -> Result<Value, RuntimeError> {
        let period = self.settings.housekeeping_period;
        loop {
            self.ticks += 1;
            if self.scheduler.switch_pending || self.ticks >= period {
                self.ticks = 0;
                self.housekeeping()?;
            }
            if self.heap.needs_collection() {
                self.collect_garbage()?;
            }

            self.step()?;
            self.instructions += 1;

            if let Some(result) = self.regs.result.take() {
                return Ok(result);
            }
        }
    }

    /// Collect the ephemeral pool with the interpreter's registers, the
    /// special objects and the pinned values as roots.
    pub fn collect_garbage(&mut self) -> Result<GcCycle, RuntimeError> {
        self.flush()?;
        let mut roots = InterpreterRoots {
            regs: &mut self.regs,
            special: &mut self.special,
            pins: &mut self.pins,
        };
        let cycle = self.heap.collect(&mut roots)?;
        self.cache.flush();
        if self.regs.active_context != self.special.nil {
            self.reload(self.regs.active_context)?;
        }
        Ok(cycle)
    }

    // ── Dispatch ───────────────────────────────────────────────────

    pub(crate) fn step(&mut self) -> Result<(), RuntimeError> {
        let ip = self.regs.ip;
        let (instruction, next) = decode_at(self.heap.bytes(self.regs.opcodes)?, ip)?;
        self.regs.ip = next;
        log::trace!("{ip:4}: {instruction}");

        match instruction {
            Instruction::Return(kind) => self.execute_return(kind),
            Instruction::PushSpecial(value) => {
                let value = match value {
                    SpecialValue::Receiver => self.regs.receiver,
                    SpecialValue::True => self.special.true_obj,
                    SpecialValue::False => self.special.false_obj,
                    SpecialValue::Nil => self.special.nil,
                    SpecialValue::MinusOne => Value::from_i64(-1),
                    SpecialValue::Zero => Value::from_i64(0),
                    SpecialValue::One => Value::from_i64(1),
                    SpecialValue::Two => Value::from_i64(2),
                };
                self.push(value)
            }
            Instruction::PushLiteral { index } => {
                let value = self.literal(index)?;
                self.push(value)
            }
            Instruction::PushTemporary { index } => {
                let value = self.temporary(index as usize)?;
                self.push(value)
            }
            Instruction::PushField { index } => {
                let value = self.heap.fetch_field(self.regs.receiver, index as usize)?;
                self.push(value)
            }
            Instruction::PushGlobal { literal } => {
                let name = self.literal(literal)?;
                let globals = self.special.globals;
                let value = self
                    .tables()
                    .lookup(&self.heap, globals, GLOBALS, name)?
                    .unwrap_or(self.special.nil);
                self.push(value)
            }
            Instruction::PopStoreTemporary { index } => {
                let value = self.pop()?;
                self.store_temporary(index as usize, value)
            }
            Instruction::PopStoreField { index } => {
                let value = self.pop()?;
                self.heap
                    .store_field(self.regs.receiver, index as usize, value)?;
                Ok(())
            }
            Instruction::PopStoreGlobal { literal } => {
                let name = self.literal(literal)?;
                let value = self.pop()?;
                let globals = self.special.globals;
                self.tables()
                    .at_put(&mut self.heap, globals, GLOBALS, name, value)?;
                Ok(())
            }
            Instruction::Pop => self.pop().map(drop),
            Instruction::Dup => {
                let value = self.top()?;
                self.push(value)
            }
            Instruction::Send { literal, argc } => {
                let selector = self.literal(literal)?;
                self.send(selector, argc as usize)
            }
            Instruction::SpecialSend { selector, argc } => {
                self.special_send(selector, argc as usize)
            }
            Instruction::Jump { delta } => {
                self.regs.ip += delta as usize;
                Ok(())
            }
            Instruction::JumpBack { delta } => {
                self.regs.ip = self.regs.ip.saturating_sub(delta as usize);
                Ok(())
            }
            Instruction::JumpIfTrue { delta } => self.conditional_jump(true, delta),
            Instruction::JumpIfFalse { delta } => self.conditional_jump(false, delta),
            Instruction::BlockCopy { argc, len } => self.block_copy(argc, len),
        }
    }

    fn conditional_jump(&mut self, when: bool, delta: u16) -> Result<(), RuntimeError> {
        let condition = self.pop()?;
        let truth = if condition == self.special.true_obj {
            true
        } else if condition == self.special.false_obj {
            false
        } else {
            return Err(RuntimeError::MustBeBoolean);
        };
        if truth == when {
            self.regs.ip += delta as usize;
        }
        Ok(())
    }

    fn execute_return(&mut self, kind: ReturnKind) -> Result<(), RuntimeError> {
        match kind {
            ReturnKind::Receiver => self.method_return(self.regs.receiver),
            ReturnKind::True => self.method_return(self.special.true_obj),
            ReturnKind::False => self.method_return(self.special.false_obj),
            ReturnKind::Nil => self.method_return(self.special.nil),
            ReturnKind::TopToSender => {
                let value = self.pop()?;
                self.method_return(value)
            }
            ReturnKind::TopToCaller => {
                let value = self.pop()?;
                self.block_return(value)
            }
        }
    }
}
