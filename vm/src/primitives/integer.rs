//! SmallInteger arithmetic, comparison and bit operations.
//!
//! A non-integer operand or a result outside the SmallInt range declines,
//! leaving the fallback to the method body.

use object::Value;

use crate::{Interpreter, RuntimeError};

fn operands(interp: &Interpreter) -> Result<(i64, i64), RuntimeError> {
    let receiver = interp.primitive_receiver(1)?.as_small_int()?;
    let argument = interp.primitive_argument(1, 0)?.as_small_int()?;
    Ok((receiver, argument))
}

fn arithmetic(
    interp: &mut Interpreter,
    op: impl FnOnce(i64, i64) -> Option<i64>,
) -> Result<bool, RuntimeError> {
    let (a, b) = operands(interp)?;
    let Some(result) = op(a, b) else {
        return Ok(false);
    };
    let result = Value::try_from_i64(result)?;
    interp.primitive_answer(1, result)
}

fn comparison(interp: &mut Interpreter, op: impl FnOnce(i64, i64) -> bool) -> Result<bool, RuntimeError> {
    let (a, b) = operands(interp)?;
    let result = interp.special.boolean(op(a, b));
    interp.primitive_answer(1, result)
}

/// Quotient rounded toward negative infinity.
pub fn floor_div(a: i64, b: i64) -> Option<i64> {
    let q = a.checked_div(b)?;
    if a % b != 0 && ((a < 0) != (b < 0)) {
        Some(q - 1)
    } else {
        Some(q)
    }
}

/// Remainder with the sign of the divisor.
pub fn floor_mod(a: i64, b: i64) -> Option<i64> {
    let r = a.checked_rem(b)?;
    if r != 0 && ((r < 0) != (b < 0)) {
        Some(r + b)
    } else {
        Some(r)
    }
}

pub fn shift(a: i64, by: i64) -> Option<i64> {
    if by >= 0 {
        if a == 0 {
            return Some(0);
        }
        if by >= 63 {
            return None;
        }
        let shifted = (a as i128) << by;
        i64::try_from(shifted).ok()
    } else {
        Some(a >> by.unsigned_abs().min(63))
    }
}

pub fn int_add(interp: &mut Interpreter, _argc: usize) -> Result<bool, RuntimeError> {
    arithmetic(interp, i64::checked_add)
}

pub fn int_sub(interp: &mut Interpreter, _argc: usize) -> Result<bool, RuntimeError> {
    arithmetic(interp, i64::checked_sub)
}

pub fn int_mul(interp: &mut Interpreter, _argc: usize) -> Result<bool, RuntimeError> {
    arithmetic(interp, i64::checked_mul)
}

pub fn int_div(interp: &mut Interpreter, _argc: usize) -> Result<bool, RuntimeError> {
    arithmetic(interp, floor_div)
}

pub fn int_mod(interp: &mut Interpreter, _argc: usize) -> Result<bool, RuntimeError> {
    arithmetic(interp, floor_mod)
}

pub fn int_bit_and(interp: &mut Interpreter, _argc: usize) -> Result<bool, RuntimeError> {
    arithmetic(interp, |a, b| Some(a & b))
}

pub fn int_bit_or(interp: &mut Interpreter, _argc: usize) -> Result<bool, RuntimeError> {
    arithmetic(interp, |a, b| Some(a | b))
}

pub fn int_bit_shift(interp: &mut Interpreter, _argc: usize) -> Result<bool, RuntimeError> {
    arithmetic(interp, shift)
}

pub fn int_lt(interp: &mut Interpreter, _argc: usize) -> Result<bool, RuntimeError> {
    comparison(interp, |a, b| a < b)
}

pub fn int_gt(interp: &mut Interpreter, _argc: usize) -> Result<bool, RuntimeError> {
    comparison(interp, |a, b| a > b)
}

pub fn int_le(interp: &mut Interpreter, _argc: usize) -> Result<bool, RuntimeError> {
    comparison(interp, |a, b| a <= b)
}

pub fn int_ge(interp: &mut Interpreter, _argc: usize) -> Result<bool, RuntimeError> {
    comparison(interp, |a, b| a >= b)
}

/// Equality against any argument; a non-integer is simply unequal.
pub fn int_eq(interp: &mut Interpreter, _argc: usize) -> Result<bool, RuntimeError> {
    let receiver = interp.primitive_receiver(1)?;
    if !receiver.is_small_int() {
        return Ok(false);
    }
    let argument = interp.primitive_argument(1, 0)?;
    let result = interp.special.boolean(receiver == argument);
    interp.primitive_answer(1, result)
}

pub fn int_ne(interp: &mut Interpreter, _argc: usize) -> Result<bool, RuntimeError> {
    let receiver = interp.primitive_receiver(1)?;
    if !receiver.is_small_int() {
        return Ok(false);
    }
    let argument = interp.primitive_argument(1, 0)?;
    let result = interp.special.boolean(receiver != argument);
    interp.primitive_answer(1, result)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn division_floors() {
        assert_eq!(floor_div(7, 2), Some(3));
        assert_eq!(floor_div(-7, 2), Some(-4));
        assert_eq!(floor_div(7, -2), Some(-4));
        assert_eq!(floor_div(-7, -2), Some(3));
        assert_eq!(floor_div(6, -3), Some(-2));
        assert_eq!(floor_div(1, 0), None);
    }

    #[test]
    fn modulo_takes_divisor_sign() {
        assert_eq!(floor_mod(7, 2), Some(1));
        assert_eq!(floor_mod(-7, 2), Some(1));
        assert_eq!(floor_mod(7, -2), Some(-1));
        assert_eq!(floor_mod(-6, 3), Some(0));
        assert_eq!(floor_mod(1, 0), None);
    }

    #[test]
    fn shifts_check_overflow() {
        assert_eq!(shift(1, 4), Some(16));
        assert_eq!(shift(-16, -2), Some(-4));
        assert_eq!(shift(5, -100), Some(0));
        assert_eq!(shift(-5, -100), Some(-1));
        assert_eq!(shift(0, 1000), Some(0));
        assert_eq!(shift(1, 63), None);
        assert_eq!(shift(1 << 40, 30), None);
    }
}
