//! Copying collector for the ephemeral pool.
//!
//! A collection opens a fresh ephemeral pool with the next epoch,
//! evacuates everything reachable from the caller's roots and from the
//! root pool into it, then scans the copies breadth-first (Cheney) until
//! no unscanned object remains. The old pool is dropped afterwards, so
//! any handle issued before the collection is reported as stale.

use std::time::{Duration, Instant};

use object::{Handle, HeapState, Space, Value};

use crate::segment::{Body, HeapObject, Pool};
use crate::{Heap, HeapError};

/// Consumers implement this to provide GC roots.
///
/// The visitor receives `&mut Value` so the collector can update root
/// references in place when their objects move.
pub trait RootProvider {
    fn visit_roots(&mut self, visitor: &mut dyn FnMut(&mut Value));
}

/// Summary of one collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GcCycle {
    pub epoch: u32,
    pub objects_copied: usize,
    pub words_copied: usize,
    pub segments_before: usize,
    pub segments_after: usize,
    pub elapsed: Duration,
}

struct Evacuator<'a> {
    from: Pool,
    to: &'a mut Pool,
    objects: usize,
    words: usize,
}

impl Evacuator<'_> {
    /// Copy the referent of `value` into to-space (once) and return the
    /// relocated value. SmallInts and root-pool references pass through.
    fn evacuate(&mut self, value: Value) -> Result<Value, HeapError> {
        if value.is_small_int() {
            return Ok(value);
        }
        let handle = value.handle()?;
        if handle.space() == Space::Root {
            return Ok(value);
        }

        let object = self.from.get_mut(handle)?;
        match object.header.state {
            HeapState::Forwarded(to) => return Ok(value.with_handle(to)),
            HeapState::Permanent => return Ok(value),
            HeapState::Original => {}
        }

        let header = object.header;
        let body = std::mem::replace(&mut object.body, Body::empty());
        let copy = HeapObject { header, body };
        self.words += copy.words();
        self.objects += 1;

        let moved = self.to.allocate(copy)?;
        self.from.get_mut(handle)?.header.state = HeapState::Forwarded(moved);
        Ok(value.with_handle(moved))
    }

    /// Evacuate the type and fields of one object in place.
    fn scan(&mut self, object: &mut HeapObject) -> Result<(), HeapError> {
        object.header.ty = self.evacuate(object.header.ty)?;
        if let Body::Fields(fields) = &mut object.body {
            for field in fields.iter_mut() {
                *field = self.evacuate(*field)?;
            }
        }
        Ok(())
    }
}

impl Heap {
    /// Collect the ephemeral pool.
    ///
    /// Must only be called when every live reference is reachable from
    /// `roots` or from the root pool. On error the heap is unusable.
    pub fn collect(&mut self, roots: &mut dyn RootProvider) -> Result<GcCycle, HeapError> {
        let started = Instant::now();
        let segments_before = self.ephemeral.segment_count();
        let next_epoch = (self.ephemeral.epoch() + 1) & Handle::MAX_EPOCH;
        log::debug!("gc: start, epoch {} -> {next_epoch}", self.ephemeral.epoch());

        let fresh = Pool::new(
            Space::Ephemeral,
            next_epoch,
            self.settings.segment_words,
            self.settings.max_ephemeral_segments,
        );
        let from = std::mem::replace(&mut self.ephemeral, fresh);
        let mut evac = Evacuator {
            from,
            to: &mut self.ephemeral,
            objects: 0,
            words: 0,
        };

        // Caller roots.
        let mut failure = None;
        roots.visit_roots(&mut |slot| {
            if failure.is_some() {
                return;
            }
            match evac.evacuate(*slot) {
                Ok(moved) => *slot = moved,
                Err(e) => failure = Some(e),
            }
        });
        if let Some(e) = failure {
            return Err(e);
        }

        // The root pool is scanned in full.
        for segment in self.root.segments_mut() {
            for object in segment.objects_mut() {
                evac.scan(object)?;
            }
        }

        // Cheney scan over to-space.
        let (mut segment, mut index) = (0, 0);
        loop {
            if index >= evac.to.segment_len(segment) {
                if segment + 1 < evac.to.segment_count() {
                    segment += 1;
                    index = 0;
                    continue;
                }
                break;
            }
            // Detach the object so evacuation may grow to-space.
            let Some(slot) = evac.to.at_mut(segment, index) else {
                break;
            };
            let mut object = HeapObject {
                header: slot.header,
                body: std::mem::replace(&mut slot.body, Body::empty()),
            };
            evac.scan(&mut object)?;
            if let Some(slot) = evac.to.at_mut(segment, index) {
                *slot = object;
            }
            index += 1;
        }

        let (objects_copied, words_copied) = (evac.objects, evac.words);
        drop(evac);
        let cycle = GcCycle {
            epoch: next_epoch,
            objects_copied,
            words_copied,
            segments_before,
            segments_after: self.ephemeral.segment_count(),
            elapsed: started.elapsed(),
        };

        self.collections += 1;
        self.threshold = (cycle.segments_after * 2)
            .max(self.settings.gc_threshold_segments)
            .min(self.settings.max_ephemeral_segments);
        log::info!(
            "gc #{}: copied {} objects ({} words), {} -> {} segments in {:?}",
            self.collections,
            cycle.objects_copied,
            cycle.words_copied,
            cycle.segments_before,
            cycle.segments_after,
            cycle.elapsed
        );
        Ok(cycle)
    }
}
