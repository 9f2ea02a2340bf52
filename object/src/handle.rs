/// Which allocation pool an object lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Space {
    /// Ordinary objects; evacuated by every collection.
    Ephemeral,
    /// Permanent objects; never moved, always scanned as roots.
    Root,
}

const INDEX_BITS: u32 = 20;
const SEGMENT_BITS: u32 = 12;
const EPOCH_BITS: u32 = 28;

const SEGMENT_SHIFT: u32 = INDEX_BITS;
const EPOCH_SHIFT: u32 = SEGMENT_SHIFT + SEGMENT_BITS;
const SPACE_SHIFT: u32 = EPOCH_SHIFT + EPOCH_BITS;

/// Index-based reference to a heap object.
///
/// ```text
/// bit  60     : space (0 = ephemeral, 1 = root)
/// bits 32..59 : epoch of the ephemeral pool the handle was issued in
/// bits 20..31 : segment
/// bits  0..19 : object index within the segment
/// ```
///
/// Handles into the ephemeral pool carry the pool epoch so that a value
/// kept across a collection is detected instead of silently aliasing a
/// different object. Epochs wrap after [`Handle::MAX_EPOCH`] + 1
/// collections; a handle held across that many collections is not
/// detected.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct Handle(u64);

impl Handle {
    pub const MAX_INDEX: u32 = (1 << INDEX_BITS) - 1;
    pub const MAX_SEGMENT: u32 = (1 << SEGMENT_BITS) - 1;
    pub const MAX_EPOCH: u32 = (1 << EPOCH_BITS) - 1;

    #[inline]
    pub fn new(space: Space, epoch: u32, segment: u32, index: u32) -> Self {
        debug_assert!(segment <= Self::MAX_SEGMENT);
        debug_assert!(index <= Self::MAX_INDEX);
        debug_assert!(epoch <= Self::MAX_EPOCH);
        let space_bit = match space {
            Space::Ephemeral => 0,
            Space::Root => 1,
        };
        Self(
            (space_bit << SPACE_SHIFT)
                | ((epoch as u64) << EPOCH_SHIFT)
                | ((segment as u64) << SEGMENT_SHIFT)
                | index as u64,
        )
    }

    #[inline(always)]
    pub const fn raw(self) -> u64 {
        self.0
    }

    #[inline(always)]
    pub(crate) const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    #[inline]
    pub fn space(self) -> Space {
        if (self.0 >> SPACE_SHIFT) & 1 == 1 {
            Space::Root
        } else {
            Space::Ephemeral
        }
    }

    #[inline]
    pub fn epoch(self) -> u32 {
        ((self.0 >> EPOCH_SHIFT) & Self::MAX_EPOCH as u64) as u32
    }

    #[inline]
    pub fn segment(self) -> usize {
        ((self.0 >> SEGMENT_SHIFT) & Self::MAX_SEGMENT as u64) as usize
    }

    #[inline]
    pub fn index(self) -> usize {
        (self.0 & Self::MAX_INDEX as u64) as usize
    }
}

impl core::fmt::Debug for Handle {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let space = match self.space() {
            Space::Ephemeral => 'e',
            Space::Root => 'r',
        };
        write!(
            f,
            "{space}{}:{}:{}",
            self.epoch(),
            self.segment(),
            self.index()
        )
    }
}
