/// Bytecode opcodes.
///
/// Every instruction starts with one byte: the low five bits select the
/// opcode, the high three bits carry an inline operand. An inline value
/// of [`ESCAPE`] means the operand is in the following byte instead.
/// Jumps never escape; their inline bits are the high bits of an 11-bit
/// delta whose low byte always follows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Op {
    /// Return. Operand selects receiver / true / false / nil / top of
    /// stack to the sender / top of stack to the caller.
    Return = 0,

    /// Push receiver, true, false, nil, -1, 0, 1; the escaped form pushes 2.
    PushSpecial,

    /// Push a method literal.
    PushLiteral,

    /// Push a temporary of the home context.
    PushTemporary,

    /// Push a field of the receiver.
    PushField,

    /// Push the value of the global named by a literal symbol.
    PushGlobal,

    /// Pop into a temporary of the home context.
    PopStoreTemporary,

    /// Pop into a field of the receiver.
    PopStoreField,

    /// Pop into the global named by a literal symbol.
    PopStoreGlobal,

    Pop,
    Dup,

    /// Send with the selector in a literal. `SendN` takes the argument
    /// count in an extra byte.
    Send0,
    Send1,
    Send2,
    SendN,

    /// Send through the special selector table.
    SpecialSend0,
    SpecialSend1,
    SpecialSend2,
    SpecialSendN,

    /// Relative jumps. Operands: 11-bit delta, counted from the end of
    /// the instruction.
    Jump,
    JumpBack,
    JumpIfTrue,
    JumpIfFalse,

    /// Create a block context for the body that follows.
    /// Operands: argument count, `len:u16` (big endian).
    BlockCopy,
}

/// Inline operand value that defers to the next byte.
pub const ESCAPE: u8 = 7;

pub const OP_BITS: u32 = 5;
pub const OP_MASK: u8 = (1 << OP_BITS) - 1;

/// Largest delta a jump can encode.
pub const MAX_JUMP: u16 = 0x7ff;

impl Op {
    pub const COUNT: usize = Self::BlockCopy as usize + 1;

    pub fn from_u8(byte: u8) -> Option<Self> {
        use Op::*;
        const TABLE: [Op; Op::COUNT] = [
            Return,
            PushSpecial,
            PushLiteral,
            PushTemporary,
            PushField,
            PushGlobal,
            PopStoreTemporary,
            PopStoreField,
            PopStoreGlobal,
            Pop,
            Dup,
            Send0,
            Send1,
            Send2,
            SendN,
            SpecialSend0,
            SpecialSend1,
            SpecialSend2,
            SpecialSendN,
            Jump,
            JumpBack,
            JumpIfTrue,
            JumpIfFalse,
            BlockCopy,
        ];
        TABLE.get(byte as usize).copied()
    }

    #[inline]
    pub fn is_jump(self) -> bool {
        matches!(
            self,
            Op::Jump | Op::JumpBack | Op::JumpIfTrue | Op::JumpIfFalse
        )
    }
}

/// Split an instruction byte into its opcode bits and inline operand.
#[inline(always)]
pub fn split(byte: u8) -> (u8, u8) {
    (byte & OP_MASK, byte >> OP_BITS)
}

#[inline(always)]
pub fn join(op: Op, inline: u8) -> u8 {
    debug_assert!(inline <= ESCAPE);
    op as u8 | inline << OP_BITS
}
