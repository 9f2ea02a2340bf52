use crate::{ObjectError, Value};

/// How a CompiledMethod is executed when it is selected by a send.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MethodKind {
    /// Activate a context and run the opcodes.
    Bytecodes = 0,
    /// Try the primitive first; run the opcodes if it declines.
    Primitive = 1,
    /// Getter: replace the receiver with one of its fields.
    ReturnField = 2,
    /// Setter: pop the argument into a field; the receiver is the result.
    PopAndStoreField = 3,
}

const KIND_MASK: i64 = 0b11;
const TEMPS_SHIFT: u32 = 2;
const TEMPS_MASK: i64 = 0xff;
const ARGS_SHIFT: u32 = 10;
const ARGS_MASK: i64 = 0x1f;
const INDEX_SHIFT: u32 = 15;
const INDEX_MASK: i64 = 0xfff;

/// Decoded form of a CompiledMethod's header word.
///
/// ```text
/// bits  0..1  : kind
/// bits  2..9  : temporaries (arguments included)
/// bits 10..14 : argument count
/// bits 15..26 : primitive index or field index
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MethodHeader {
    pub kind: MethodKind,
    pub temporaries: u8,
    pub arguments: u8,
    pub index: u16,
}

impl MethodHeader {
    pub const MAX_ARGUMENTS: u8 = ARGS_MASK as u8;
    pub const MAX_INDEX: u16 = INDEX_MASK as u16;

    pub fn bytecodes(arguments: u8, temporaries: u8) -> Self {
        debug_assert!(arguments <= Self::MAX_ARGUMENTS);
        debug_assert!(temporaries >= arguments);
        Self {
            kind: MethodKind::Bytecodes,
            temporaries,
            arguments,
            index: 0,
        }
    }

    pub fn primitive(index: u16, arguments: u8, temporaries: u8) -> Self {
        debug_assert!(index <= Self::MAX_INDEX);
        Self {
            kind: MethodKind::Primitive,
            index,
            ..Self::bytecodes(arguments, temporaries)
        }
    }

    pub fn return_field(field: u16) -> Self {
        Self {
            kind: MethodKind::ReturnField,
            temporaries: 0,
            arguments: 0,
            index: field,
        }
    }

    pub fn pop_and_store_field(field: u16) -> Self {
        Self {
            kind: MethodKind::PopAndStoreField,
            temporaries: 1,
            arguments: 1,
            index: field,
        }
    }

    pub fn encode(self) -> i64 {
        (self.kind as i64)
            | (self.temporaries as i64) << TEMPS_SHIFT
            | (self.arguments as i64) << ARGS_SHIFT
            | (self.index as i64) << INDEX_SHIFT
    }

    pub fn decode(bits: i64) -> Self {
        let kind = match bits & KIND_MASK {
            0 => MethodKind::Bytecodes,
            1 => MethodKind::Primitive,
            2 => MethodKind::ReturnField,
            _ => MethodKind::PopAndStoreField,
        };
        Self {
            kind,
            temporaries: ((bits >> TEMPS_SHIFT) & TEMPS_MASK) as u8,
            arguments: ((bits >> ARGS_SHIFT) & ARGS_MASK) as u8,
            index: ((bits >> INDEX_SHIFT) & INDEX_MASK) as u16,
        }
    }

    #[inline]
    pub fn to_value(self) -> Value {
        Value::from_i64(self.encode())
    }

    #[inline]
    pub fn from_value(value: Value) -> Result<Self, ObjectError> {
        Ok(Self::decode(value.as_small_int()?))
    }
}
