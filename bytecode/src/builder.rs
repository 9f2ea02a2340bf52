use crate::instruction::{ReturnKind, SpecialValue};
use crate::op::{self, ESCAPE, MAX_JUMP, Op};

/// A forward jump whose delta has not yet been resolved.
///
/// Created by [`BytecodeBuilder::jump`], [`BytecodeBuilder::jump_if_true`],
/// and [`BytecodeBuilder::jump_if_false`]. Resolve it with
/// [`BytecodeBuilder::bind`].
#[derive(Debug)]
#[must_use]
pub struct Label {
    /// Position of the jump's opcode byte.
    op_pos: usize,
}

/// An open block body, closed by [`BytecodeBuilder::end_block`].
#[derive(Debug)]
#[must_use]
pub struct BlockLabel {
    /// Position of the big-endian length bytes.
    len_pos: usize,
}

/// Builds a bytecode byte sequence.
///
/// Operands above 6 are emitted in escaped form automatically. This is
/// what a compiler targeting the interpreter emits; the runtime itself
/// only decodes.
#[derive(Debug, Default)]
pub struct BytecodeBuilder {
    buf: Vec<u8>,
}

impl BytecodeBuilder {
    pub fn new() -> Self {
        Self { buf: Vec::new() }
    }

    /// Current byte offset in the bytecode stream.
    pub fn current_offset(&self) -> usize {
        self.buf.len()
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    // ── emit helpers ───────────────────────────────────────────────

    fn emit_with_operand(&mut self, op: Op, operand: u8) {
        if operand < ESCAPE {
            self.buf.push(op::join(op, operand));
        } else {
            self.buf.push(op::join(op, ESCAPE));
            self.buf.push(operand);
        }
    }

    fn emit_jump(&mut self, op: Op, delta: u16) {
        debug_assert!(delta <= MAX_JUMP, "jump delta {delta} out of range");
        self.buf.push(op::join(op, (delta >> 8) as u8));
        self.buf.push(delta as u8);
    }

    // ── pushes and stores ──────────────────────────────────────────

    pub fn push_special(&mut self, value: SpecialValue) {
        let operand = match value {
            SpecialValue::Receiver => 0,
            SpecialValue::True => 1,
            SpecialValue::False => 2,
            SpecialValue::Nil => 3,
            SpecialValue::MinusOne => 4,
            SpecialValue::Zero => 5,
            SpecialValue::One => 6,
            SpecialValue::Two => 7,
        };
        self.emit_with_operand(Op::PushSpecial, operand);
    }

    pub fn push_receiver(&mut self) {
        self.push_special(SpecialValue::Receiver);
    }

    pub fn push_nil(&mut self) {
        self.push_special(SpecialValue::Nil);
    }

    pub fn push_literal(&mut self, index: u8) {
        self.emit_with_operand(Op::PushLiteral, index);
    }

    pub fn push_temporary(&mut self, index: u8) {
        self.emit_with_operand(Op::PushTemporary, index);
    }

    pub fn push_field(&mut self, index: u8) {
        self.emit_with_operand(Op::PushField, index);
    }

    /// `literal` indexes the symbol naming the global.
    pub fn push_global(&mut self, literal: u8) {
        self.emit_with_operand(Op::PushGlobal, literal);
    }

    pub fn pop_store_temporary(&mut self, index: u8) {
        self.emit_with_operand(Op::PopStoreTemporary, index);
    }

    pub fn pop_store_field(&mut self, index: u8) {
        self.emit_with_operand(Op::PopStoreField, index);
    }

    pub fn pop_store_global(&mut self, literal: u8) {
        self.emit_with_operand(Op::PopStoreGlobal, literal);
    }

    pub fn pop(&mut self) {
        self.buf.push(Op::Pop as u8);
    }

    pub fn dup(&mut self) {
        self.buf.push(Op::Dup as u8);
    }

    // ── sends ──────────────────────────────────────────────────────

    /// Send the selector in literal `literal` with `argc` arguments.
    pub fn send(&mut self, literal: u8, argc: u8) {
        match argc {
            0 => self.emit_with_operand(Op::Send0, literal),
            1 => self.emit_with_operand(Op::Send1, literal),
            2 => self.emit_with_operand(Op::Send2, literal),
            _ => {
                self.emit_with_operand(Op::SendN, literal);
                self.buf.push(argc);
            }
        }
    }

    /// Send through the special selector table.
    pub fn special_send(&mut self, selector: u8, argc: u8) {
        match argc {
            0 => self.emit_with_operand(Op::SpecialSend0, selector),
            1 => self.emit_with_operand(Op::SpecialSend1, selector),
            2 => self.emit_with_operand(Op::SpecialSend2, selector),
            _ => {
                self.emit_with_operand(Op::SpecialSendN, selector);
                self.buf.push(argc);
            }
        }
    }

    // ── returns ────────────────────────────────────────────────────

    pub fn ret(&mut self, kind: ReturnKind) {
        let operand = match kind {
            ReturnKind::Receiver => 0,
            ReturnKind::True => 1,
            ReturnKind::False => 2,
            ReturnKind::Nil => 3,
            ReturnKind::TopToSender => 4,
            ReturnKind::TopToCaller => 5,
        };
        self.emit_with_operand(Op::Return, operand);
    }

    /// `^ top` from a method, or a non-local return from a block.
    pub fn return_top(&mut self) {
        self.ret(ReturnKind::TopToSender);
    }

    /// Value of a block body, returned to whoever evaluated the block.
    pub fn block_return(&mut self) {
        self.ret(ReturnKind::TopToCaller);
    }

    // ── control flow ───────────────────────────────────────────────

    fn forward(&mut self, op: Op) -> Label {
        let op_pos = self.buf.len();
        self.emit_jump(op, 0);
        Label { op_pos }
    }

    pub fn jump(&mut self) -> Label {
        self.forward(Op::Jump)
    }

    pub fn jump_if_true(&mut self) -> Label {
        self.forward(Op::JumpIfTrue)
    }

    pub fn jump_if_false(&mut self) -> Label {
        self.forward(Op::JumpIfFalse)
    }

    /// Resolve `label` to the current offset.
    pub fn bind(&mut self, label: Label) {
        let delta = self.buf.len() - (label.op_pos + 2);
        debug_assert!(delta <= MAX_JUMP as usize, "jump delta {delta} out of range");
        let code = self.buf[label.op_pos] & op::OP_MASK;
        self.buf[label.op_pos] = code | ((delta >> 8) as u8) << op::OP_BITS;
        self.buf[label.op_pos + 1] = delta as u8;
    }

    /// Jump backwards to `target`, an earlier [`current_offset`](Self::current_offset).
    pub fn jump_back(&mut self, target: usize) {
        let delta = self.buf.len() + 2 - target;
        self.emit_jump(Op::JumpBack, delta as u16);
    }

    /// Open a block body taking `argc` arguments. The body runs until the
    /// matching [`end_block`](Self::end_block); execution of the enclosing
    /// code resumes after it.
    pub fn block_copy(&mut self, argc: u8) -> BlockLabel {
        self.emit_with_operand(Op::BlockCopy, argc);
        let len_pos = self.buf.len();
        self.buf.extend_from_slice(&[0, 0]);
        BlockLabel { len_pos }
    }

    pub fn end_block(&mut self, label: BlockLabel) {
        let len = self.buf.len() - (label.len_pos + 2);
        debug_assert!(len <= u16::MAX as usize, "block body too long");
        self.buf[label.len_pos..label.len_pos + 2].copy_from_slice(&(len as u16).to_be_bytes());
    }
}
