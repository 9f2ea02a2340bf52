//! Segmented object heap.
//!
//! Objects live in two pools. The root pool holds permanent objects
//! (boot types, singletons, the scheduler) that are never moved and are
//! scanned as roots by every collection. The ephemeral pool holds
//! everything else and is evacuated wholesale by [`Heap::collect`].
//!
//! Objects are addressed through [`Handle`]s carried inside [`Value`]s.
//! Every accessor is bounds- and tag-checked and reports a [`HeapError`]
//! instead of touching memory it does not own.

use std::cmp::Ordering;

use object::{HEADER_WORDS, Handle, Header, HeapState, ObjectError, Space, Tag, Value};

use crate::segment::{Body, HeapObject, Pool};
use crate::HeapError;

// ── Heap settings ─────────────────────────────────────────────────────

/// Configuration for the segmented heap.
#[derive(Debug, Clone)]
pub struct HeapSettings {
    /// Capacity of one segment in words (headers included). Also the
    /// largest object that can be allocated.
    pub segment_words: usize,
    /// Segment limit of the root pool.
    pub max_root_segments: usize,
    /// Segment limit of the ephemeral pool.
    pub max_ephemeral_segments: usize,
    /// Ephemeral segment count at which a collection is requested. Grows
    /// to twice the surviving segment count after each collection.
    pub gc_threshold_segments: usize,
}

impl Default for HeapSettings {
    fn default() -> Self {
        Self {
            segment_words: 65_536, // 512 KB
            max_root_segments: 16,
            max_ephemeral_segments: 1_024,
            gc_threshold_segments: 8,
        }
    }
}

impl HeapSettings {
    pub fn validate(&self) -> Result<(), &'static str> {
        if self.segment_words < 64 {
            return Err("segment_words must be at least 64");
        }
        if self.segment_words > u32::MAX as usize {
            return Err("segment_words must fit in 32 bits");
        }
        if self.max_root_segments == 0 || self.max_ephemeral_segments == 0 {
            return Err("segment limits must be > 0");
        }
        if self.max_root_segments > Handle::MAX_SEGMENT as usize + 1
            || self.max_ephemeral_segments > Handle::MAX_SEGMENT as usize + 1
        {
            return Err("segment limit exceeds handle range");
        }
        if self.gc_threshold_segments < 2 {
            return Err("gc_threshold_segments must be at least 2");
        }
        if self.gc_threshold_segments > self.max_ephemeral_segments {
            return Err("gc_threshold_segments must not exceed max_ephemeral_segments");
        }
        Ok(())
    }
}

/// Counters reported by [`Heap::stats`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeapStats {
    pub collections: u64,
    pub root_segments: usize,
    pub root_words: usize,
    pub ephemeral_segments: usize,
    pub ephemeral_words: usize,
    pub ephemeral_objects: usize,
    pub threshold_segments: usize,
    pub epoch: u32,
}

// ── Heap ──────────────────────────────────────────────────────────────

pub struct Heap {
    pub(crate) settings: HeapSettings,
    pub(crate) root: Pool,
    pub(crate) ephemeral: Pool,
    pub(crate) threshold: usize,
    pub(crate) collections: u64,
}

impl Heap {
    pub fn new(settings: HeapSettings) -> Result<Self, HeapError> {
        settings.validate().map_err(HeapError::InvalidSettings)?;
        let root = Pool::new(
            Space::Root,
            0,
            settings.segment_words,
            settings.max_root_segments,
        );
        let ephemeral = Pool::new(
            Space::Ephemeral,
            1,
            settings.segment_words,
            settings.max_ephemeral_segments,
        );
        log::debug!("heap created: {settings:?}");
        Ok(Self {
            threshold: settings.gc_threshold_segments,
            settings,
            root,
            ephemeral,
            collections: 0,
        })
    }

    #[inline]
    pub fn settings(&self) -> &HeapSettings {
        &self.settings
    }

    #[inline]
    pub fn epoch(&self) -> u32 {
        self.ephemeral.epoch()
    }

    /// Whether the ephemeral pool has grown past the collection threshold.
    #[inline]
    pub fn needs_collection(&self) -> bool {
        self.ephemeral.segment_count() >= self.threshold
    }

    pub fn stats(&self) -> HeapStats {
        HeapStats {
            collections: self.collections,
            root_segments: self.root.segment_count(),
            root_words: self.root.used_words(),
            ephemeral_segments: self.ephemeral.segment_count(),
            ephemeral_words: self.ephemeral.used_words(),
            ephemeral_objects: self.ephemeral.object_count(),
            threshold_segments: self.threshold,
            epoch: self.ephemeral.epoch(),
        }
    }

    // ── Allocation ─────────────────────────────────────────────────

    fn pool_mut(&mut self, space: Space) -> &mut Pool {
        match space {
            Space::Root => &mut self.root,
            Space::Ephemeral => &mut self.ephemeral,
        }
    }

    fn state_for(space: Space) -> HeapState {
        match space {
            Space::Root => HeapState::Permanent,
            Space::Ephemeral => HeapState::Original,
        }
    }

    /// Rejects a body of `body_words` that cannot fit one segment, before
    /// any storage for it is built.
    fn check_size(&self, body_words: usize) -> Result<u32, HeapError> {
        let segment_words = self.settings.segment_words;
        let words = body_words.saturating_add(HEADER_WORDS);
        if words > segment_words {
            return Err(HeapError::ObjectTooLarge { words, segment_words });
        }
        // validate() keeps segment_words within u32
        Ok(body_words as u32)
    }

    /// Allocate a fielded object with every field set to `fill`.
    pub fn allocate_fields(
        &mut self,
        space: Space,
        ty: Value,
        count: usize,
        fill: Value,
    ) -> Result<Value, HeapError> {
        let size = self.check_size(count)?;
        let header = Header::new(size, 0, ty, Self::state_for(space));
        let body = Body::Fields(vec![fill; count].into_boxed_slice());
        let handle = self.pool_mut(space).allocate(HeapObject { header, body })?;
        Ok(Value::object(handle))
    }

    /// Allocate a zeroed byte buffer of `len` bytes.
    pub fn allocate_bytes(&mut self, space: Space, ty: Value, len: usize) -> Result<Value, HeapError> {
        self.check_size(len.div_ceil(8))?;
        self.allocate_bytes_from(space, ty, &vec![0; len])
    }

    pub fn allocate_bytes_from(
        &mut self,
        space: Space,
        ty: Value,
        bytes: &[u8],
    ) -> Result<Value, HeapError> {
        self.check_size(bytes.len().div_ceil(8))?;
        let header = Header::for_bytes(bytes.len(), ty, Self::state_for(space));
        let body = Body::Bytes(bytes.into());
        let handle = self.pool_mut(space).allocate(HeapObject { header, body })?;
        Ok(Value::bytes(handle))
    }

    /// Allocate a zeroed word buffer of `count` words.
    pub fn allocate_words(&mut self, space: Space, ty: Value, count: usize) -> Result<Value, HeapError> {
        let size = self.check_size(count)?;
        let header = Header::new(size, 0, ty, Self::state_for(space));
        let body = Body::Words(vec![0; count].into_boxed_slice());
        let handle = self.pool_mut(space).allocate(HeapObject { header, body })?;
        Ok(Value::words(handle))
    }

    // ── Object access ──────────────────────────────────────────────

    fn object(&self, value: Value) -> Result<&HeapObject, HeapError> {
        let handle = value.handle()?;
        match handle.space() {
            Space::Root => self.root.get(handle),
            Space::Ephemeral => self.ephemeral.get(handle),
        }
    }

    fn object_mut(&mut self, value: Value) -> Result<&mut HeapObject, HeapError> {
        let handle = value.handle()?;
        match handle.space() {
            Space::Root => self.root.get_mut(handle),
            Space::Ephemeral => self.ephemeral.get_mut(handle),
        }
    }

    pub fn header(&self, value: Value) -> Result<&Header, HeapError> {
        Ok(&self.object(value)?.header)
    }

    /// The type recorded in a reference's header.
    pub fn type_of(&self, value: Value) -> Result<Value, HeapError> {
        Ok(self.object(value)?.header.ty)
    }

    pub fn set_type(&mut self, value: Value, ty: Value) -> Result<(), HeapError> {
        self.object_mut(value)?.header.ty = ty;
        Ok(())
    }

    pub fn is_permanent(&self, value: Value) -> Result<bool, HeapError> {
        Ok(self.object(value)?.header.is_permanent())
    }

    fn fields(&self, value: Value) -> Result<&[Value], HeapError> {
        value.expect_tag(Tag::Object)?;
        match &self.object(value)?.body {
            Body::Fields(fields) => Ok(fields),
            _ => Err(tag_mismatch(Tag::Object, value)),
        }
    }

    fn fields_mut(&mut self, value: Value) -> Result<&mut [Value], HeapError> {
        value.expect_tag(Tag::Object)?;
        match &mut self.object_mut(value)?.body {
            Body::Fields(fields) => Ok(fields),
            _ => Err(tag_mismatch(Tag::Object, value)),
        }
    }

    fn bytes_mut(&mut self, value: Value) -> Result<&mut [u8], HeapError> {
        value.expect_tag(Tag::Bytes)?;
        match &mut self.object_mut(value)?.body {
            Body::Bytes(bytes) => Ok(bytes),
            _ => Err(tag_mismatch(Tag::Bytes, value)),
        }
    }

    fn words(&self, value: Value) -> Result<&[u64], HeapError> {
        value.expect_tag(Tag::Words)?;
        match &self.object(value)?.body {
            Body::Words(words) => Ok(words),
            _ => Err(tag_mismatch(Tag::Words, value)),
        }
    }

    fn words_mut(&mut self, value: Value) -> Result<&mut [u64], HeapError> {
        value.expect_tag(Tag::Words)?;
        match &mut self.object_mut(value)?.body {
            Body::Words(words) => Ok(words),
            _ => Err(tag_mismatch(Tag::Words, value)),
        }
    }

    // ── Fields ─────────────────────────────────────────────────────

    pub fn field_count(&self, value: Value) -> Result<usize, HeapError> {
        Ok(self.fields(value)?.len())
    }

    pub fn fetch_field(&self, value: Value, index: usize) -> Result<Value, HeapError> {
        let fields = self.fields(value)?;
        fields.get(index).copied().ok_or_else(|| out_of_range(index, fields.len()))
    }

    pub fn store_field(&mut self, value: Value, index: usize, new: Value) -> Result<(), HeapError> {
        let fields = self.fields_mut(value)?;
        let limit = fields.len();
        let slot = fields.get_mut(index).ok_or_else(|| out_of_range(index, limit))?;
        *slot = new;
        Ok(())
    }

    /// Copy `count` fields between two fielded objects (or within one).
    pub fn transfer_fields(
        &mut self,
        src: Value,
        src_start: usize,
        dst: Value,
        dst_start: usize,
        count: usize,
    ) -> Result<(), HeapError> {
        let source = self.fields(src)?;
        let end = src_start.checked_add(count).filter(|&e| e <= source.len());
        let Some(end) = end else {
            return Err(out_of_range(src_start + count, source.len()));
        };
        let moved: Vec<Value> = source[src_start..end].to_vec();

        let target = self.fields_mut(dst)?;
        let limit = target.len();
        let slots = target
            .get_mut(dst_start..dst_start + count)
            .ok_or_else(|| out_of_range(dst_start + count, limit))?;
        slots.copy_from_slice(&moved);
        Ok(())
    }

    // ── Bytes ──────────────────────────────────────────────────────

    pub fn bytes(&self, value: Value) -> Result<&[u8], HeapError> {
        value.expect_tag(Tag::Bytes)?;
        match &self.object(value)?.body {
            Body::Bytes(bytes) => Ok(bytes),
            _ => Err(tag_mismatch(Tag::Bytes, value)),
        }
    }

    pub fn byte_size(&self, value: Value) -> Result<usize, HeapError> {
        Ok(self.bytes(value)?.len())
    }

    pub fn fetch_byte(&self, value: Value, index: usize) -> Result<u8, HeapError> {
        let bytes = self.bytes(value)?;
        bytes.get(index).copied().ok_or_else(|| out_of_range(index, bytes.len()))
    }

    pub fn store_byte(&mut self, value: Value, index: usize, byte: u8) -> Result<(), HeapError> {
        let bytes = self.bytes_mut(value)?;
        let limit = bytes.len();
        let slot = bytes.get_mut(index).ok_or_else(|| out_of_range(index, limit))?;
        *slot = byte;
        Ok(())
    }

    pub fn transfer_bytes(
        &mut self,
        src: Value,
        src_start: usize,
        dst: Value,
        dst_start: usize,
        count: usize,
    ) -> Result<(), HeapError> {
        let source = self.bytes(src)?;
        let Some(moved) = source.get(src_start..src_start + count) else {
            return Err(out_of_range(src_start + count, source.len()));
        };
        let moved = moved.to_vec();

        let target = self.bytes_mut(dst)?;
        let limit = target.len();
        let slots = target
            .get_mut(dst_start..dst_start + count)
            .ok_or_else(|| out_of_range(dst_start + count, limit))?;
        slots.copy_from_slice(&moved);
        Ok(())
    }

    // ── Words ──────────────────────────────────────────────────────

    pub fn word_count(&self, value: Value) -> Result<usize, HeapError> {
        Ok(self.words(value)?.len())
    }

    pub fn fetch_word(&self, value: Value, index: usize) -> Result<u64, HeapError> {
        let words = self.words(value)?;
        words.get(index).copied().ok_or_else(|| out_of_range(index, words.len()))
    }

    pub fn store_word(&mut self, value: Value, index: usize, word: u64) -> Result<(), HeapError> {
        let words = self.words_mut(value)?;
        let limit = words.len();
        let slot = words.get_mut(index).ok_or_else(|| out_of_range(index, limit))?;
        *slot = word;
        Ok(())
    }

    // ── Buffer contents ────────────────────────────────────────────

    /// Raw contents of a byte or word buffer, as bytes.
    fn content(&self, value: Value) -> Result<Vec<u8>, HeapError> {
        match value.tag() {
            Tag::Bytes => Ok(self.bytes(value)?.to_vec()),
            Tag::Words => Ok(self
                .words(value)?
                .iter()
                .flat_map(|w| w.to_le_bytes())
                .collect()),
            found => Err(ObjectError::TagMismatch {
                expected: Tag::Bytes,
                found,
            }
            .into()),
        }
    }

    /// Content hash of a byte or word buffer; see [`content_hash`].
    pub fn content_hash(&self, value: Value) -> Result<i64, HeapError> {
        if value.tag() == Tag::Bytes {
            return Ok(content_hash(self.bytes(value)?));
        }
        Ok(content_hash(&self.content(value)?))
    }

    /// Length first, then bytes lexicographically.
    pub fn content_compare(&self, a: Value, b: Value) -> Result<Ordering, HeapError> {
        let (a, b) = (self.content(a)?, self.content(b)?);
        Ok(a.len().cmp(&b.len()).then_with(|| a.cmp(&b)))
    }

    pub fn content_equals(&self, a: Value, b: Value) -> Result<bool, HeapError> {
        Ok(self.content_compare(a, b)? == Ordering::Equal)
    }
}

/// Absolute value of the sum of the bytes read as signed.
pub fn content_hash(bytes: &[u8]) -> i64 {
    bytes
        .iter()
        .fold(0i64, |acc, &b| acc.wrapping_add(b as i8 as i64))
        .wrapping_abs()
}

#[inline]
fn out_of_range(index: usize, limit: usize) -> HeapError {
    ObjectError::OutOfRange { index, limit }.into()
}

#[inline]
fn tag_mismatch(expected: Tag, value: Value) -> HeapError {
    ObjectError::TagMismatch {
        expected,
        found: value.tag(),
    }
    .into()
}
