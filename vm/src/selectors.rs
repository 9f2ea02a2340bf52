//! The special selector table.
//!
//! `SpecialSend` instructions name a selector by its index here and try
//! the attached primitive before any lookup. Entries without a primitive
//! always do a full send, so user types can override them. The symbols
//! themselves live in the `special_selectors` Array, in the same order.

use crate::primitives as prim;

#[derive(Debug, Clone, Copy)]
pub struct SpecialSelector {
    pub name: &'static str,
    pub arity: u8,
    pub primitive: Option<usize>,
}

const fn entry(name: &'static str, arity: u8, primitive: usize) -> SpecialSelector {
    SpecialSelector {
        name,
        arity,
        primitive: Some(primitive),
    }
}

const fn send_only(name: &'static str, arity: u8) -> SpecialSelector {
    SpecialSelector {
        name,
        arity,
        primitive: None,
    }
}

pub const SPECIAL_SELECTORS: &[SpecialSelector] = &[
    entry("+", 1, prim::ADD),
    entry("-", 1, prim::SUB),
    entry("<", 1, prim::LT),
    entry(">", 1, prim::GT),
    entry("<=", 1, prim::LE),
    entry(">=", 1, prim::GE),
    entry("=", 1, prim::EQ),
    entry("~=", 1, prim::NE),
    entry("*", 1, prim::MUL),
    entry("//", 1, prim::DIV),
    entry("\\\\", 1, prim::MOD),
    entry("bitAnd:", 1, prim::BIT_AND),
    entry("bitOr:", 1, prim::BIT_OR),
    entry("bitShift:", 1, prim::BIT_SHIFT),
    entry("==", 1, prim::IDENTICAL),
    entry("class", 0, prim::CLASS),
    entry("basicNew", 0, prim::BASIC_NEW),
    entry("basicNew:", 1, prim::BASIC_NEW_SIZED),
    entry("value", 0, prim::VALUE),
    entry("value:", 1, prim::VALUE_1),
    entry("value:value:", 2, prim::VALUE_2),
    entry("value:value:value:", 3, prim::VALUE_3),
    entry("perform:", 1, prim::PERFORM),
    entry("perform:with:", 2, prim::PERFORM_WITH),
    send_only("at:", 1),
    send_only("at:put:", 2),
    send_only("size", 0),
];

/// Index of `name` in [`SPECIAL_SELECTORS`].
pub fn special_index(name: &str) -> Option<u8> {
    SPECIAL_SELECTORS
        .iter()
        .position(|s| s.name == name)
        .map(|i| i as u8)
}

// Indices used by code builders.
pub const PLUS: u8 = 0;
pub const MINUS: u8 = 1;
pub const LESS: u8 = 2;
pub const GREATER: u8 = 3;
pub const LESS_EQUAL: u8 = 4;
pub const GREATER_EQUAL: u8 = 5;
pub const EQUAL: u8 = 6;
pub const NOT_EQUAL: u8 = 7;
pub const TIMES: u8 = 8;
pub const INT_DIV: u8 = 9;
pub const INT_MOD: u8 = 10;
pub const IDENTICAL: u8 = 14;
pub const CLASS: u8 = 15;
pub const BASIC_NEW: u8 = 16;
pub const BASIC_NEW_SIZED: u8 = 17;
pub const VALUE: u8 = 18;
pub const VALUE_1: u8 = 19;
pub const VALUE_2: u8 = 20;
pub const PERFORM: u8 = 22;
pub const AT: u8 = 24;
pub const AT_PUT: u8 = 25;
pub const SIZE: u8 = 26;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn named_indices_match_table() {
        let checks = [
            (PLUS, "+"),
            (MINUS, "-"),
            (LESS, "<"),
            (GREATER_EQUAL, ">="),
            (NOT_EQUAL, "~="),
            (TIMES, "*"),
            (INT_MOD, "\\\\"),
            (IDENTICAL, "=="),
            (CLASS, "class"),
            (BASIC_NEW_SIZED, "basicNew:"),
            (VALUE, "value"),
            (VALUE_2, "value:value:"),
            (PERFORM, "perform:"),
            (AT_PUT, "at:put:"),
            (SIZE, "size"),
        ];
        for (index, name) in checks {
            assert_eq!(SPECIAL_SELECTORS[index as usize].name, name);
            assert_eq!(special_index(name), Some(index));
        }
    }

    #[test]
    fn arity_matches_selector_shape() {
        for s in SPECIAL_SELECTORS {
            let colons = s.name.matches(':').count() as u8;
            let binary = !s.name.chars().next().is_some_and(|c| c.is_ascii_alphabetic());
            let expected = if binary { 1 } else { colons };
            assert_eq!(s.arity, expected, "{}", s.name);
        }
    }

    #[test]
    fn overridable_selectors_have_no_primitive() {
        for index in [AT, AT_PUT, SIZE] {
            assert!(SPECIAL_SELECTORS[index as usize].primitive.is_none());
        }
        assert_eq!(SPECIAL_SELECTORS[PLUS as usize].primitive, Some(prim::ADD));
    }
}
