//! Identity, reflection, instantiation and indexed access.

use object::layout::*;
use object::{Format, ObjectError, Space, Storage, Tag, Value};

use crate::{Interpreter, RuntimeError};

pub fn identical(interp: &mut Interpreter, _argc: usize) -> Result<bool, RuntimeError> {
    let receiver = interp.primitive_receiver(1)?;
    let argument = interp.primitive_argument(1, 0)?;
    let result = interp.special.boolean(receiver.identical(argument));
    interp.primitive_answer(1, result)
}

pub fn class(interp: &mut Interpreter, _argc: usize) -> Result<bool, RuntimeError> {
    let receiver = interp.primitive_receiver(0)?;
    let ty = interp.class_of(receiver)?;
    interp.primitive_answer(0, ty)
}

// ── Instantiation ──────────────────────────────────────────────────

impl Interpreter {
    /// Whether `value` is a Type: its own type is a metatype.
    pub fn is_type(&self, value: Value) -> Result<bool, RuntimeError> {
        if value.tag() != Tag::Object {
            return Ok(false);
        }
        let meta = self.heap.type_of(value)?;
        Ok(self.heap.type_of(meta)? == self.special.metaclass)
    }

    /// A new instance of `ty` with `indexed` slots past its fixed fields
    /// (bytes or words for buffer types). Fields start out nil, buffers
    /// zeroed.
    pub fn instantiate(&mut self, ty: Value, indexed: usize) -> Result<Value, RuntimeError> {
        let format = Format::from_value(self.heap.fetch_field(ty, TYPE_FORMAT)?)?;
        let fixed = self.heap.fetch_field(ty, TYPE_FIXED_FIELDS)?.as_index()?;
        if indexed > 0 && !format.indexable {
            return Err(ObjectError::OutOfRange { index: indexed, limit: 0 }.into());
        }
        let nil = self.special.nil;
        let instance = match format.storage {
            Storage::Fields => {
                self.heap
                    .allocate_fields(Space::Ephemeral, ty, fixed.saturating_add(indexed), nil)?
            }
            Storage::Bytes => self.heap.allocate_bytes(Space::Ephemeral, ty, indexed)?,
            Storage::Words => self.heap.allocate_words(Space::Ephemeral, ty, indexed)?,
        };
        Ok(instance)
    }
}

pub fn basic_new(interp: &mut Interpreter, _argc: usize) -> Result<bool, RuntimeError> {
    let ty = interp.primitive_receiver(0)?;
    if !interp.is_type(ty)? {
        return Ok(false);
    }
    let instance = interp.instantiate(ty, 0)?;
    interp.primitive_answer(0, instance)
}

pub fn basic_new_sized(interp: &mut Interpreter, _argc: usize) -> Result<bool, RuntimeError> {
    let ty = interp.primitive_receiver(1)?;
    let size = interp.primitive_argument(1, 0)?.as_index()?;
    if !interp.is_type(ty)? {
        return Ok(false);
    }
    let format = Format::from_value(interp.heap.fetch_field(ty, TYPE_FORMAT)?)?;
    if !format.indexable {
        return Ok(false);
    }
    let instance = interp.instantiate(ty, size)?;
    interp.primitive_answer(1, instance)
}

// ── Indexed access ─────────────────────────────────────────────────

/// Where a 1-based index lands inside a receiver.
enum Slot {
    Field(usize),
    Byte(usize),
    Word(usize),
}

impl Interpreter {
    /// Fixed fields of `receiver`'s type, skipped by indexed access.
    fn fixed_fields(&self, receiver: Value) -> Result<usize, RuntimeError> {
        let ty = self.heap.type_of(receiver)?;
        Ok(self.heap.fetch_field(ty, TYPE_FIXED_FIELDS)?.as_index()?)
    }

    fn indexed_size(&self, receiver: Value) -> Result<usize, RuntimeError> {
        Ok(match receiver.tag() {
            Tag::SmallInt => 0,
            Tag::Object => self
                .heap
                .field_count(receiver)?
                .saturating_sub(self.fixed_fields(receiver)?),
            Tag::Bytes => self.heap.byte_size(receiver)?,
            Tag::Words => self.heap.word_count(receiver)?,
        })
    }

    /// Resolve a 1-based index; `None` when out of bounds.
    fn indexed_slot(&self, receiver: Value, index: Value) -> Result<Option<Slot>, RuntimeError> {
        let index = index.as_index()?;
        if index == 0 || index > self.indexed_size(receiver)? {
            return Ok(None);
        }
        let offset = index - 1;
        Ok(Some(match receiver.tag() {
            Tag::Object => Slot::Field(self.fixed_fields(receiver)? + offset),
            Tag::Bytes => Slot::Byte(offset),
            Tag::Words => Slot::Word(offset),
            Tag::SmallInt => return Ok(None),
        }))
    }
}

pub fn basic_at(interp: &mut Interpreter, _argc: usize) -> Result<bool, RuntimeError> {
    let receiver = interp.primitive_receiver(1)?;
    let index = interp.primitive_argument(1, 0)?;
    let Some(slot) = interp.indexed_slot(receiver, index)? else {
        return Ok(false);
    };
    let value = match slot {
        Slot::Field(i) => interp.heap.fetch_field(receiver, i)?,
        Slot::Byte(i) => Value::from_i64(interp.heap.fetch_byte(receiver, i)? as i64),
        Slot::Word(i) => {
            let word = interp.heap.fetch_word(receiver, i)?;
            let Ok(word) = i64::try_from(word) else {
                return Ok(false);
            };
            Value::try_from_i64(word)?
        }
    };
    interp.primitive_answer(1, value)
}

pub fn basic_at_put(interp: &mut Interpreter, _argc: usize) -> Result<bool, RuntimeError> {
    let receiver = interp.primitive_receiver(2)?;
    let index = interp.primitive_argument(2, 0)?;
    let value = interp.primitive_argument(2, 1)?;
    let Some(slot) = interp.indexed_slot(receiver, index)? else {
        return Ok(false);
    };
    match slot {
        Slot::Field(i) => interp.heap.store_field(receiver, i, value)?,
        Slot::Byte(i) => {
            let Ok(byte) = u8::try_from(value.as_small_int()?) else {
                return Ok(false);
            };
            interp.heap.store_byte(receiver, i, byte)?;
        }
        Slot::Word(i) => {
            let word = value.as_index()? as u64;
            interp.heap.store_word(receiver, i, word)?;
        }
    }
    interp.primitive_answer(2, value)
}

pub fn basic_size(interp: &mut Interpreter, _argc: usize) -> Result<bool, RuntimeError> {
    let receiver = interp.primitive_receiver(0)?;
    let size = interp.indexed_size(receiver)?;
    interp.primitive_answer(0, Value::from_usize(size))
}

/// SmallInts hash to themselves, buffers by content, fielded objects to 0
/// (their handles move, so identity is not hashable).
pub fn hash(interp: &mut Interpreter, _argc: usize) -> Result<bool, RuntimeError> {
    let receiver = interp.primitive_receiver(0)?;
    let hash = match receiver.tag() {
        Tag::SmallInt => receiver,
        Tag::Bytes | Tag::Words => Value::try_from_i64(interp.heap.content_hash(receiver)?)?,
        Tag::Object => Value::from_i64(0),
    };
    interp.primitive_answer(0, hash)
}

// ── Reflective send ────────────────────────────────────────────────

/// `perform:` and friends: drop the selector argument and send it with
/// the remaining arguments.
pub fn perform(interp: &mut Interpreter, argc: usize) -> Result<bool, RuntimeError> {
    let selector = interp.primitive_argument(argc, 0)?;
    if selector.tag() != Tag::Bytes || interp.heap.type_of(selector)? != interp.special.symbol {
        return Ok(false);
    }
    let ctx = interp.regs.active_context;
    let slot = interp.regs.sp + 1 - argc;
    interp
        .heap
        .transfer_fields(ctx, slot + 1, ctx, slot, argc - 1)?;
    interp.pop()?;
    interp.send(selector, argc - 1)?;
    Ok(true)
}
