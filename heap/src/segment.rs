use object::{Handle, Header, Space, Value};

use crate::HeapError;

/// Object payload.
#[derive(Debug, Clone)]
pub enum Body {
    Fields(Box<[Value]>),
    Bytes(Box<[u8]>),
    Words(Box<[u64]>),
}

impl Body {
    pub(crate) fn empty() -> Self {
        Body::Fields(Box::new([]))
    }
}

#[derive(Debug)]
pub struct HeapObject {
    pub header: Header,
    pub body: Body,
}

impl HeapObject {
    #[inline]
    pub fn words(&self) -> usize {
        self.header.total_words()
    }
}

/// A bounded run of objects, measured in words.
#[derive(Debug)]
pub(crate) struct Segment {
    objects: Vec<HeapObject>,
    used_words: usize,
}

impl Segment {
    fn new() -> Self {
        Self {
            objects: Vec::new(),
            used_words: 0,
        }
    }

    #[inline]
    pub(crate) fn len(&self) -> usize {
        self.objects.len()
    }

    #[inline]
    pub(crate) fn used_words(&self) -> usize {
        self.used_words
    }

    #[inline]
    pub(crate) fn objects_mut(&mut self) -> &mut [HeapObject] {
        &mut self.objects
    }
}

/// A pool of segments sharing one space and epoch.
///
/// Allocation bumps into the last segment and opens a new one when the
/// object does not fit, up to `max_segments`.
#[derive(Debug)]
pub(crate) struct Pool {
    space: Space,
    epoch: u32,
    segment_words: usize,
    max_segments: usize,
    segments: Vec<Segment>,
}

impl Pool {
    pub(crate) fn new(space: Space, epoch: u32, segment_words: usize, max_segments: usize) -> Self {
        Self {
            space,
            epoch,
            segment_words,
            max_segments,
            segments: vec![Segment::new()],
        }
    }

    #[inline]
    pub(crate) fn epoch(&self) -> u32 {
        self.epoch
    }

    #[inline]
    pub(crate) fn segment_count(&self) -> usize {
        self.segments.len()
    }

    #[inline]
    pub(crate) fn segments_mut(&mut self) -> &mut [Segment] {
        &mut self.segments
    }

    #[inline]
    pub(crate) fn segment_len(&self, segment: usize) -> usize {
        self.segments.get(segment).map_or(0, Segment::len)
    }

    pub(crate) fn used_words(&self) -> usize {
        self.segments.iter().map(Segment::used_words).sum()
    }

    pub(crate) fn object_count(&self) -> usize {
        self.segments.iter().map(Segment::len).sum()
    }

    pub(crate) fn allocate(&mut self, object: HeapObject) -> Result<Handle, HeapError> {
        let words = object.words();
        if words > self.segment_words {
            return Err(HeapError::ObjectTooLarge {
                words,
                segment_words: self.segment_words,
            });
        }

        let needs_segment = self
            .segments
            .last()
            .is_none_or(|s| s.used_words + words > self.segment_words || s.len() > Handle::MAX_INDEX as usize);
        if needs_segment {
            if self.segments.len() >= self.max_segments {
                return Err(HeapError::OutOfMemory {
                    space: self.space,
                    segments: self.segments.len(),
                });
            }
            self.segments.push(Segment::new());
            log::debug!(
                "{:?} pool grew to {} segments",
                self.space,
                self.segments.len()
            );
        }

        let segment_index = self.segments.len() - 1;
        let segment = &mut self.segments[segment_index];
        let index = segment.objects.len();
        segment.objects.push(object);
        segment.used_words += words;

        Ok(Handle::new(
            self.space,
            self.epoch,
            segment_index as u32,
            index as u32,
        ))
    }

    fn check(&self, handle: Handle) -> Result<(), HeapError> {
        if handle.space() != self.space || handle.epoch() != self.epoch {
            return Err(HeapError::StaleHandle(handle));
        }
        Ok(())
    }

    pub(crate) fn get(&self, handle: Handle) -> Result<&HeapObject, HeapError> {
        self.check(handle)?;
        self.segments
            .get(handle.segment())
            .and_then(|s| s.objects.get(handle.index()))
            .ok_or(HeapError::StaleHandle(handle))
    }

    pub(crate) fn get_mut(&mut self, handle: Handle) -> Result<&mut HeapObject, HeapError> {
        self.check(handle)?;
        self.segments
            .get_mut(handle.segment())
            .and_then(|s| s.objects.get_mut(handle.index()))
            .ok_or(HeapError::StaleHandle(handle))
    }

    /// Object at a scan position, without a handle.
    #[inline]
    pub(crate) fn at_mut(&mut self, segment: usize, index: usize) -> Option<&mut HeapObject> {
        self.segments.get_mut(segment)?.objects.get_mut(index)
    }
}
