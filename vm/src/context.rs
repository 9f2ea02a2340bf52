//! Contexts, the operand stack, and returns.
//!
//! A context is an ordinary fielded object:
//!
//! ```text
//! 0 sender | 1 ip | 2 sp | 3 method | 4 receiver | 5 home | 6 initialIP
//! 7 blockArgumentCount | 8 caller | 9.. tail
//! ```
//!
//! Method contexts keep their temporaries at the start of the tail and
//! the operand stack after them. Block contexts keep only an operand
//! stack and reach temporaries through `home`. A method context whose
//! `ip` is nil has returned.

use object::layout::*;
use object::{MethodHeader, MethodKind, Space, Value};

use crate::{Interpreter, RuntimeError};

impl Interpreter {
    // ── Registers ──────────────────────────────────────────────────

    /// Write `ip` and `sp` back into the active context.
    pub(crate) fn flush(&mut self) -> Result<(), RuntimeError> {
        let ctx = self.regs.active_context;
        if ctx == self.special.nil {
            return Ok(());
        }
        self.heap
            .store_field(ctx, CONTEXT_IP, Value::from_usize(self.regs.ip))?;
        self.heap
            .store_field(ctx, CONTEXT_SP, Value::from_usize(self.regs.sp))?;
        Ok(())
    }

    /// Make `ctx` the active context and load the registers from it.
    pub(crate) fn reload(&mut self, ctx: Value) -> Result<(), RuntimeError> {
        let heap = &self.heap;
        let method = heap.fetch_field(ctx, CONTEXT_METHOD)?;
        let ip = heap.fetch_field(ctx, CONTEXT_IP)?.as_index()?;
        let sp = heap.fetch_field(ctx, CONTEXT_SP)?.as_index()?;
        let receiver = heap.fetch_field(ctx, CONTEXT_RECEIVER)?;
        let is_block = heap.fetch_field(ctx, CONTEXT_BLOCK_ARGC)?.is_small_int();
        let home = if is_block {
            heap.fetch_field(ctx, CONTEXT_HOME)?
        } else {
            ctx
        };
        let header = MethodHeader::from_value(heap.fetch_field(method, METHOD_HEADER)?)?;
        let opcodes = heap.fetch_field(method, METHOD_OPCODES)?;
        let stack_limit = heap.field_count(ctx)?;

        let temps = header.temporaries as usize;
        self.regs.active_context = ctx;
        self.regs.home_context = home;
        self.regs.method = method;
        self.regs.receiver = receiver;
        self.regs.opcodes = opcodes;
        self.regs.ip = ip;
        self.regs.sp = sp;
        self.regs.temp_count = temps;
        self.regs.stack_base = if is_block {
            CONTEXT_TAIL
        } else {
            CONTEXT_TAIL + temps
        };
        self.regs.stack_limit = stack_limit;
        Ok(())
    }

    /// Forget the active context once its process has no more to run.
    pub(crate) fn clear_registers(&mut self) {
        let nil = self.special.nil;
        self.regs.active_context = nil;
        self.regs.home_context = nil;
        self.regs.method = nil;
        self.regs.receiver = nil;
        self.regs.opcodes = nil;
        self.regs.ip = 0;
        self.regs.sp = 0;
    }

    // ── Operand stack ──────────────────────────────────────────────

    pub(crate) fn push(&mut self, value: Value) -> Result<(), RuntimeError> {
        let sp = self.regs.sp + 1;
        if sp >= self.regs.stack_limit {
            return Err(RuntimeError::StackOverflow { ip: self.regs.ip });
        }
        self.heap.store_field(self.regs.active_context, sp, value)?;
        self.regs.sp = sp;
        Ok(())
    }

    pub(crate) fn pop(&mut self) -> Result<Value, RuntimeError> {
        let value = self.top()?;
        self.regs.sp -= 1;
        Ok(value)
    }

    pub(crate) fn top(&self) -> Result<Value, RuntimeError> {
        self.stack_value(0)
    }

    /// The value `depth` slots below the top.
    pub(crate) fn stack_value(&self, depth: usize) -> Result<Value, RuntimeError> {
        if self.regs.sp < self.regs.stack_base + depth {
            return Err(RuntimeError::StackUnderflow { ip: self.regs.ip });
        }
        Ok(self
            .heap
            .fetch_field(self.regs.active_context, self.regs.sp - depth)?)
    }

    pub(crate) fn pop_n(&mut self, n: usize) -> Result<(), RuntimeError> {
        if self.regs.sp + 1 < self.regs.stack_base + n {
            return Err(RuntimeError::StackUnderflow { ip: self.regs.ip });
        }
        self.regs.sp -= n;
        Ok(())
    }

    // ── Temporaries ────────────────────────────────────────────────

    pub(crate) fn temporary(&self, index: usize) -> Result<Value, RuntimeError> {
        if index >= self.regs.temp_count {
            return Err(RuntimeError::InvalidMethod("temporary index out of range"));
        }
        Ok(self
            .heap
            .fetch_field(self.regs.home_context, CONTEXT_TAIL + index)?)
    }

    pub(crate) fn store_temporary(&mut self, index: usize, value: Value) -> Result<(), RuntimeError> {
        if index >= self.regs.temp_count {
            return Err(RuntimeError::InvalidMethod("temporary index out of range"));
        }
        self.heap
            .store_field(self.regs.home_context, CONTEXT_TAIL + index, value)?;
        Ok(())
    }

    // ── Activation ─────────────────────────────────────────────────

    /// Allocate a method context for `method`. The caller fills in the
    /// arguments.
    fn new_method_context(
        &mut self,
        method: Value,
        header: MethodHeader,
        sender: Value,
        receiver: Value,
    ) -> Result<Value, RuntimeError> {
        let temps = header.temporaries as usize;
        let size = CONTEXT_TAIL + temps + self.settings.context_stack_depth;
        let nil = self.special.nil;
        let ctx = self
            .heap
            .allocate_fields(Space::Ephemeral, self.special.method_context, size, nil)?;
        let heap = &mut self.heap;
        heap.store_field(ctx, CONTEXT_SENDER, sender)?;
        heap.store_field(ctx, CONTEXT_IP, Value::from_i64(0))?;
        heap.store_field(ctx, CONTEXT_SP, Value::from_usize(CONTEXT_TAIL + temps - 1))?;
        heap.store_field(ctx, CONTEXT_METHOD, method)?;
        heap.store_field(ctx, CONTEXT_RECEIVER, receiver)?;
        Ok(ctx)
    }

    /// Activate `method` for the receiver and `argc` arguments on top of
    /// the stack.
    pub(crate) fn activate_method(
        &mut self,
        method: Value,
        header: MethodHeader,
        argc: usize,
    ) -> Result<(), RuntimeError> {
        let receiver = self.stack_value(argc)?;
        let sender = self.regs.active_context;
        let ctx = self.new_method_context(method, header, sender, receiver)?;
        let first_arg = self.regs.sp + 1 - argc;
        self.heap
            .transfer_fields(sender, first_arg, ctx, CONTEXT_TAIL, argc)?;
        self.pop_n(argc + 1)?;
        self.flush()?;
        self.reload(ctx)
    }

    /// A bottom context (no sender) for an embedder call.
    pub(crate) fn entry_context(
        &mut self,
        method: Value,
        receiver: Value,
        args: &[Value],
    ) -> Result<Value, RuntimeError> {
        let header = MethodHeader::from_value(self.heap.fetch_field(method, METHOD_HEADER)?)?;
        if !matches!(header.kind, MethodKind::Bytecodes | MethodKind::Primitive) {
            return Err(RuntimeError::InvalidMethod("entry method has no bytecode body"));
        }
        if header.arguments as usize != args.len() {
            return Err(RuntimeError::WrongArgumentCount {
                expected: header.arguments as usize,
                got: args.len(),
            });
        }
        let nil = self.special.nil;
        let ctx = self.new_method_context(method, header, nil, receiver)?;
        for (i, arg) in args.iter().enumerate() {
            self.heap.store_field(ctx, CONTEXT_TAIL + i, *arg)?;
        }
        Ok(ctx)
    }

    /// `BlockCopy`: push a block context for the body at `ip` and skip it.
    pub(crate) fn block_copy(&mut self, argc: u8, len: u16) -> Result<(), RuntimeError> {
        let body = self.regs.ip;
        let size = CONTEXT_TAIL + self.settings.context_stack_depth;
        let nil = self.special.nil;
        let block = self
            .heap
            .allocate_fields(Space::Ephemeral, self.special.block_context, size, nil)?;

        let home = self.regs.home_context;
        let home_sender = self.heap.fetch_field(home, CONTEXT_SENDER)?;
        let heap = &mut self.heap;
        heap.store_field(block, CONTEXT_SENDER, home_sender)?;
        heap.store_field(block, CONTEXT_IP, Value::from_usize(body))?;
        heap.store_field(block, CONTEXT_SP, Value::from_usize(CONTEXT_TAIL - 1))?;
        heap.store_field(block, CONTEXT_METHOD, self.regs.method)?;
        heap.store_field(block, CONTEXT_RECEIVER, self.regs.receiver)?;
        heap.store_field(block, CONTEXT_HOME, home)?;
        heap.store_field(block, CONTEXT_INITIAL_IP, Value::from_usize(body))?;
        heap.store_field(block, CONTEXT_BLOCK_ARGC, Value::from_i64(argc as i64))?;

        self.push(block)?;
        self.regs.ip = body + len as usize;
        Ok(())
    }

    pub(crate) fn is_block(&self, value: Value) -> Result<bool, RuntimeError> {
        Ok(value.is_ref()
            && value.tag() == object::Tag::Object
            && self.heap.type_of(value)? == self.special.block_context)
    }

    /// A fresh activation of the block template `block`: same home,
    /// method and entry point, empty stack, ready to run from its start.
    pub(crate) fn instantiate_block(&mut self, block: Value, caller: Value) -> Result<Value, RuntimeError> {
        let size = self.heap.field_count(block)?;
        let nil = self.special.nil;
        let ctx = self
            .heap
            .allocate_fields(Space::Ephemeral, self.special.block_context, size, nil)?;
        self.heap.transfer_fields(block, 0, ctx, 0, CONTEXT_TAIL)?;
        let initial_ip = self.heap.fetch_field(block, CONTEXT_INITIAL_IP)?;
        let heap = &mut self.heap;
        heap.store_field(ctx, CONTEXT_IP, initial_ip)?;
        heap.store_field(ctx, CONTEXT_SP, Value::from_usize(CONTEXT_TAIL - 1))?;
        heap.store_field(ctx, CONTEXT_CALLER, caller)?;
        Ok(ctx)
    }

    /// Evaluate `block` with `argc` arguments taken from the fields of
    /// `source` starting at `first`, after popping `consumed` values off
    /// the current stack. Each evaluation runs in its own context, so a
    /// block may be re-entered.
    pub(crate) fn activate_block(
        &mut self,
        block: Value,
        source: Value,
        first: usize,
        argc: usize,
        consumed: usize,
    ) -> Result<(), RuntimeError> {
        let expected = self.heap.fetch_field(block, CONTEXT_BLOCK_ARGC)?.as_index()?;
        if expected != argc {
            return Err(RuntimeError::WrongArgumentCount { expected, got: argc });
        }
        let caller = self.regs.active_context;
        let ctx = self.instantiate_block(block, caller)?;
        self.heap
            .transfer_fields(source, first, ctx, CONTEXT_TAIL, argc)?;
        self.heap
            .store_field(ctx, CONTEXT_SP, Value::from_usize(CONTEXT_TAIL + argc - 1))?;

        self.pop_n(consumed)?;
        self.flush()?;
        self.reload(ctx)
    }

    // ── Returns ────────────────────────────────────────────────────

    fn mark_dead(&mut self, ctx: Value) -> Result<(), RuntimeError> {
        let nil = self.special.nil;
        self.heap.store_field(ctx, CONTEXT_IP, nil)?;
        Ok(())
    }

    /// Return `value` to the home context's sender. From inside a block
    /// this is a non-local return and fails if the home already returned.
    pub(crate) fn method_return(&mut self, value: Value) -> Result<(), RuntimeError> {
        let active = self.regs.active_context;
        let home = self.regs.home_context;
        if home != active {
            if self.heap.fetch_field(home, CONTEXT_IP)? == self.special.nil {
                return Err(RuntimeError::CannotReturn);
            }
            self.mark_dead(active)?;
        }
        let target = self.heap.fetch_field(home, CONTEXT_SENDER)?;
        self.mark_dead(home)?;
        self.resume(target, value)
    }

    /// Return `value` from a block to whoever evaluated it. In a method
    /// context this is an ordinary method return.
    pub(crate) fn block_return(&mut self, value: Value) -> Result<(), RuntimeError> {
        let active = self.regs.active_context;
        if active == self.regs.home_context {
            return self.method_return(value);
        }
        let caller = self.heap.fetch_field(active, CONTEXT_CALLER)?;
        let nil = self.special.nil;
        self.heap.store_field(active, CONTEXT_CALLER, nil)?;
        self.mark_dead(active)?;
        self.resume(caller, value)
    }

    fn resume(&mut self, target: Value, value: Value) -> Result<(), RuntimeError> {
        let nil = self.special.nil;
        if target == nil {
            return self.process_finished(value);
        }
        if self.heap.fetch_field(target, CONTEXT_IP)? == nil {
            return Err(RuntimeError::CannotReturn);
        }
        self.reload(target)?;
        self.push(value)
    }
}
