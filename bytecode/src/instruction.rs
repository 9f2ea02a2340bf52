use core::fmt;

/// Return variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReturnKind {
    Receiver,
    True,
    False,
    Nil,
    /// Method return: to the home context's sender.
    TopToSender,
    /// Block return: to the context that invoked the block.
    TopToCaller,
}

/// Constants pushed by [`Instruction::PushSpecial`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpecialValue {
    Receiver,
    True,
    False,
    Nil,
    MinusOne,
    Zero,
    One,
    Two,
}

impl SpecialValue {
    /// The SmallInt constants; `None` for the object constants.
    pub fn small_int(self) -> Option<i64> {
        match self {
            SpecialValue::MinusOne => Some(-1),
            SpecialValue::Zero => Some(0),
            SpecialValue::One => Some(1),
            SpecialValue::Two => Some(2),
            _ => None,
        }
    }
}

/// A decoded instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Instruction {
    Return(ReturnKind),
    PushSpecial(SpecialValue),
    PushLiteral { index: u8 },
    PushTemporary { index: u8 },
    PushField { index: u8 },
    PushGlobal { literal: u8 },
    PopStoreTemporary { index: u8 },
    PopStoreField { index: u8 },
    PopStoreGlobal { literal: u8 },
    Pop,
    Dup,
    Send { literal: u8, argc: u8 },
    SpecialSend { selector: u8, argc: u8 },
    Jump { delta: u16 },
    JumpBack { delta: u16 },
    JumpIfTrue { delta: u16 },
    JumpIfFalse { delta: u16 },
    BlockCopy { argc: u8, len: u16 },
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Instruction::Return(kind) => write!(f, "Return {kind:?}"),
            Instruction::PushSpecial(v) => write!(f, "PushSpecial {v:?}"),
            Instruction::PushLiteral { index } => write!(f, "PushLiteral {index}"),
            Instruction::PushTemporary { index } => write!(f, "PushTemporary {index}"),
            Instruction::PushField { index } => write!(f, "PushField {index}"),
            Instruction::PushGlobal { literal } => write!(f, "PushGlobal lit{literal}"),
            Instruction::PopStoreTemporary { index } => write!(f, "PopStoreTemporary {index}"),
            Instruction::PopStoreField { index } => write!(f, "PopStoreField {index}"),
            Instruction::PopStoreGlobal { literal } => write!(f, "PopStoreGlobal lit{literal}"),
            Instruction::Pop => write!(f, "Pop"),
            Instruction::Dup => write!(f, "Dup"),
            Instruction::Send { literal, argc } => write!(f, "Send lit{literal} argc={argc}"),
            Instruction::SpecialSend { selector, argc } => {
                write!(f, "SpecialSend #{selector} argc={argc}")
            }
            Instruction::Jump { delta } => write!(f, "Jump +{delta}"),
            Instruction::JumpBack { delta } => write!(f, "JumpBack -{delta}"),
            Instruction::JumpIfTrue { delta } => write!(f, "JumpIfTrue +{delta}"),
            Instruction::JumpIfFalse { delta } => write!(f, "JumpIfFalse +{delta}"),
            Instruction::BlockCopy { argc, len } => write!(f, "BlockCopy argc={argc} len={len}"),
        }
    }
}
