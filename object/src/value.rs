use crate::{Handle, ObjectError};

/// Tag constants.
const REF_BIT: u64 = 0b1;
const KIND_SHIFT: u32 = 1;
const KIND_MASK: u64 = 0b11;
const HANDLE_SHIFT: u32 = 3;

const KIND_OBJECT: u64 = 0;
const KIND_BYTES: u64 = 1;
const KIND_WORDS: u64 = 2;

/// The representation kind of a [`Value`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tag {
    SmallInt,
    Object,
    Bytes,
    Words,
}

/// A [`Value`] split into its tag and payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decoded {
    SmallInt(i64),
    Object(Handle),
    Bytes(Handle),
    Words(Handle),
}

/// A tagged 64-bit value.
///
/// Encoding:
/// - **SmallInt**:  `...XXXXX0`: 63-bit signed integer (low bit 0).
/// - **Reference**: `...HHKK1`: `KK` selects fielded / byte / word
///   storage, the remaining 61 bits hold a [`Handle`].
///
/// Identity is bit equality, so `==` on two values is `==` in the
/// language.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct Value(u64);

impl Value {
    pub const SMALL_INT_MIN: i64 = -(1 << 62);
    pub const SMALL_INT_MAX: i64 = (1 << 62) - 1;

    #[inline(always)]
    pub const fn raw(self) -> u64 {
        self.0
    }

    // ── SmallInt ───────────────────────────────────────────────────

    #[inline(always)]
    pub const fn is_small_int(self) -> bool {
        self.0 & REF_BIT == 0
    }

    /// Encode an integer that is known to fit.
    ///
    /// Intended for counts, indices, and literal constants; arithmetic
    /// results go through [`Value::try_from_i64`].
    #[inline(always)]
    pub fn from_i64(n: i64) -> Self {
        debug_assert!(
            (Self::SMALL_INT_MIN..=Self::SMALL_INT_MAX).contains(&n),
            "small integer overflow: {n}"
        );
        Self((n << 1) as u64)
    }

    #[inline]
    pub fn try_from_i64(n: i64) -> Result<Self, ObjectError> {
        if (Self::SMALL_INT_MIN..=Self::SMALL_INT_MAX).contains(&n) {
            Ok(Self((n << 1) as u64))
        } else {
            Err(ObjectError::SmallIntOverflow(n as i128))
        }
    }

    #[inline]
    pub fn from_usize(n: usize) -> Self {
        Self::from_i64(n as i64)
    }

    /// Returns the integer if this is a SmallInt.
    #[inline(always)]
    pub const fn small_int(self) -> Option<i64> {
        if self.is_small_int() {
            Some((self.0 as i64) >> 1)
        } else {
            None
        }
    }

    #[inline]
    pub fn as_small_int(self) -> Result<i64, ObjectError> {
        self.small_int().ok_or(ObjectError::TagMismatch {
            expected: Tag::SmallInt,
            found: self.tag(),
        })
    }

    /// A non-negative SmallInt as an index or count.
    #[inline]
    pub fn as_index(self) -> Result<usize, ObjectError> {
        let n = self.as_small_int()?;
        usize::try_from(n).map_err(|_| ObjectError::NegativeIndex(n))
    }

    // ── Reference ──────────────────────────────────────────────────

    #[inline(always)]
    pub const fn is_ref(self) -> bool {
        self.0 & REF_BIT != 0
    }

    #[inline]
    fn from_handle(kind: u64, handle: Handle) -> Self {
        debug_assert!(handle.raw() >> (64 - HANDLE_SHIFT) == 0);
        Self((handle.raw() << HANDLE_SHIFT) | (kind << KIND_SHIFT) | REF_BIT)
    }

    #[inline]
    pub fn object(handle: Handle) -> Self {
        Self::from_handle(KIND_OBJECT, handle)
    }

    #[inline]
    pub fn bytes(handle: Handle) -> Self {
        Self::from_handle(KIND_BYTES, handle)
    }

    #[inline]
    pub fn words(handle: Handle) -> Self {
        Self::from_handle(KIND_WORDS, handle)
    }

    /// Same tag as `self`, pointing at `handle`. Used by the collector
    /// when it relocates an object.
    #[inline]
    pub fn with_handle(self, handle: Handle) -> Self {
        debug_assert!(self.is_ref());
        Self::from_handle((self.0 >> KIND_SHIFT) & KIND_MASK, handle)
    }

    #[inline]
    pub fn tag(self) -> Tag {
        if self.is_small_int() {
            return Tag::SmallInt;
        }
        match (self.0 >> KIND_SHIFT) & KIND_MASK {
            KIND_OBJECT => Tag::Object,
            KIND_BYTES => Tag::Bytes,
            // Kind 3 is never produced.
            _ => Tag::Words,
        }
    }

    #[inline]
    pub fn decode(self) -> Decoded {
        match self.tag() {
            Tag::SmallInt => Decoded::SmallInt((self.0 as i64) >> 1),
            Tag::Object => Decoded::Object(self.raw_handle()),
            Tag::Bytes => Decoded::Bytes(self.raw_handle()),
            Tag::Words => Decoded::Words(self.raw_handle()),
        }
    }

    #[inline(always)]
    fn raw_handle(self) -> Handle {
        Handle::from_raw(self.0 >> HANDLE_SHIFT)
    }

    /// The handle of any reference value.
    #[inline]
    pub fn handle(self) -> Result<Handle, ObjectError> {
        if self.is_ref() {
            Ok(self.raw_handle())
        } else {
            Err(ObjectError::TagMismatch {
                expected: Tag::Object,
                found: Tag::SmallInt,
            })
        }
    }

    /// The handle, checking that the value carries `expected`.
    #[inline]
    pub fn expect_tag(self, expected: Tag) -> Result<Handle, ObjectError> {
        let found = self.tag();
        if found == expected && found != Tag::SmallInt {
            Ok(self.raw_handle())
        } else {
            Err(ObjectError::TagMismatch { expected, found })
        }
    }

    #[inline(always)]
    pub fn identical(self, other: Value) -> bool {
        self.0 == other.0
    }
}

impl core::fmt::Debug for Value {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self.decode() {
            Decoded::SmallInt(n) => write!(f, "SmallInt({n})"),
            Decoded::Object(h) => write!(f, "Object({h:?})"),
            Decoded::Bytes(h) => write!(f, "Bytes({h:?})"),
            Decoded::Words(h) => write!(f, "Words({h:?})"),
        }
    }
}
