use crate::{Handle, Value};

/// Size of an object header, in words.
pub const HEADER_WORDS: usize = 2;

/// Lifecycle state of a heap object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeapState {
    /// Live in the current epoch.
    Original,
    /// Evacuated during a collection; the copy lives at the handle.
    Forwarded(Handle),
    /// Lives in the root pool and is never moved.
    Permanent,
}

/// Per-object metadata.
///
/// `size` counts body words. For byte buffers `odd` is the number of
/// unused trailing bytes in the last word, so the byte length is
/// `size * 8 - odd`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub size: u32,
    pub odd: u8,
    pub ty: Value,
    pub state: HeapState,
}

impl Header {
    #[inline]
    pub fn new(size: u32, odd: u8, ty: Value, state: HeapState) -> Self {
        debug_assert!(odd < 8);
        Self {
            size,
            odd,
            ty,
            state,
        }
    }

    /// Header for a byte buffer of `len` bytes.
    #[inline]
    pub fn for_bytes(len: usize, ty: Value, state: HeapState) -> Self {
        let words = len.div_ceil(8);
        Self::new(words as u32, (words * 8 - len) as u8, ty, state)
    }

    #[inline]
    pub fn byte_len(&self) -> usize {
        self.size as usize * 8 - self.odd as usize
    }

    /// Header plus body, in words.
    #[inline]
    pub fn total_words(&self) -> usize {
        HEADER_WORDS + self.size as usize
    }

    #[inline]
    pub fn is_forwarded(&self) -> bool {
        matches!(self.state, HeapState::Forwarded(_))
    }

    #[inline]
    pub fn is_permanent(&self) -> bool {
        self.state == HeapState::Permanent
    }
}
