use thiserror::Error;

use crate::instruction::{Instruction, ReturnKind, SpecialValue};
use crate::op::{self, ESCAPE, Op};

/// An instruction that cannot be decoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("malformed bytecode at {ip}: {reason} (byte {byte:#04x})")]
pub struct DecodeError {
    /// Offset of the instruction's first byte.
    pub ip: usize,
    pub byte: u8,
    pub reason: &'static str,
}

/// Decode the instruction starting at `ip`.
///
/// Returns the instruction and the offset just past it.
pub fn decode_at(bytes: &[u8], ip: usize) -> Result<(Instruction, usize), DecodeError> {
    let mut cursor = Cursor { bytes, start: ip, pos: ip, byte: 0 };
    let first = cursor.next("instruction past end of code")?;
    cursor.byte = first;
    let (code, inline) = op::split(first);
    let Some(op) = Op::from_u8(code) else {
        return Err(cursor.error("unknown opcode"));
    };

    let instruction = if op.is_jump() {
        let low = cursor.next("truncated jump")?;
        let delta = (inline as u16) << 8 | low as u16;
        match op {
            Op::Jump => Instruction::Jump { delta },
            Op::JumpBack => Instruction::JumpBack { delta },
            Op::JumpIfTrue => Instruction::JumpIfTrue { delta },
            _ => Instruction::JumpIfFalse { delta },
        }
    } else {
        decode_operand_op(&mut cursor, op, inline)?
    };
    Ok((instruction, cursor.pos))
}

fn decode_operand_op(
    cursor: &mut Cursor<'_>,
    op: Op,
    inline: u8,
) -> Result<Instruction, DecodeError> {
    let operand = |cursor: &mut Cursor<'_>| {
        if inline == ESCAPE {
            cursor.next("truncated escape operand")
        } else {
            Ok(inline)
        }
    };

    Ok(match op {
        Op::Return => Instruction::Return(match operand(cursor)? {
            0 => ReturnKind::Receiver,
            1 => ReturnKind::True,
            2 => ReturnKind::False,
            3 => ReturnKind::Nil,
            4 => ReturnKind::TopToSender,
            5 => ReturnKind::TopToCaller,
            _ => return Err(cursor.error("invalid return operand")),
        }),
        Op::PushSpecial => Instruction::PushSpecial(match operand(cursor)? {
            0 => SpecialValue::Receiver,
            1 => SpecialValue::True,
            2 => SpecialValue::False,
            3 => SpecialValue::Nil,
            4 => SpecialValue::MinusOne,
            5 => SpecialValue::Zero,
            6 => SpecialValue::One,
            7 => SpecialValue::Two,
            _ => return Err(cursor.error("invalid special constant")),
        }),
        Op::PushLiteral => Instruction::PushLiteral { index: operand(cursor)? },
        Op::PushTemporary => Instruction::PushTemporary { index: operand(cursor)? },
        Op::PushField => Instruction::PushField { index: operand(cursor)? },
        Op::PushGlobal => Instruction::PushGlobal { literal: operand(cursor)? },
        Op::PopStoreTemporary => Instruction::PopStoreTemporary { index: operand(cursor)? },
        Op::PopStoreField => Instruction::PopStoreField { index: operand(cursor)? },
        Op::PopStoreGlobal => Instruction::PopStoreGlobal { literal: operand(cursor)? },
        Op::Pop => Instruction::Pop,
        Op::Dup => Instruction::Dup,
        Op::Send0 | Op::Send1 | Op::Send2 => Instruction::Send {
            literal: operand(cursor)?,
            argc: op as u8 - Op::Send0 as u8,
        },
        Op::SendN => {
            let literal = operand(cursor)?;
            let argc = cursor.next("truncated argument count")?;
            Instruction::Send { literal, argc }
        }
        Op::SpecialSend0 | Op::SpecialSend1 | Op::SpecialSend2 => Instruction::SpecialSend {
            selector: operand(cursor)?,
            argc: op as u8 - Op::SpecialSend0 as u8,
        },
        Op::SpecialSendN => {
            let selector = operand(cursor)?;
            let argc = cursor.next("truncated argument count")?;
            Instruction::SpecialSend { selector, argc }
        }
        Op::BlockCopy => {
            let argc = operand(cursor)?;
            let high = cursor.next("truncated block length")?;
            let low = cursor.next("truncated block length")?;
            Instruction::BlockCopy {
                argc,
                len: u16::from_be_bytes([high, low]),
            }
        }
        Op::Jump | Op::JumpBack | Op::JumpIfTrue | Op::JumpIfFalse => {
            return Err(cursor.error("jump decoded as operand op"));
        }
    })
}

struct Cursor<'a> {
    bytes: &'a [u8],
    start: usize,
    pos: usize,
    byte: u8,
}

impl Cursor<'_> {
    fn next(&mut self, reason: &'static str) -> Result<u8, DecodeError> {
        let b = self.bytes.get(self.pos).copied().ok_or(DecodeError {
            ip: self.start,
            byte: self.byte,
            reason,
        })?;
        self.pos += 1;
        Ok(b)
    }

    fn error(&self, reason: &'static str) -> DecodeError {
        DecodeError {
            ip: self.start,
            byte: self.byte,
            reason,
        }
    }
}

/// Decodes a bytecode sequence one instruction at a time.
pub struct BytecodeDecoder<'a> {
    bytes: &'a [u8],
    pos: usize,
    failed: bool,
}

impl<'a> BytecodeDecoder<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        Self {
            bytes,
            pos: 0,
            failed: false,
        }
    }

    /// Current byte offset in the bytecode stream.
    pub fn offset(&self) -> usize {
        self.pos
    }

    pub fn is_at_end(&self) -> bool {
        self.pos >= self.bytes.len()
    }

    /// Decode the next instruction, or `None` at the end of the stream.
    pub fn decode_next(&mut self) -> Option<Result<Instruction, DecodeError>> {
        if self.failed || self.is_at_end() {
            return None;
        }
        match decode_at(self.bytes, self.pos) {
            Ok((instruction, next)) => {
                self.pos = next;
                Some(Ok(instruction))
            }
            Err(e) => {
                self.failed = true;
                Some(Err(e))
            }
        }
    }
}

impl Iterator for BytecodeDecoder<'_> {
    type Item = Result<Instruction, DecodeError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.decode_next()
    }
}
