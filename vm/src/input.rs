use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;

/// Host-side input queue.
///
/// Clones share one queue, so a host thread can keep a clone and push
/// events while the interpreter drains them at its housekeeping points.
#[derive(Debug, Clone, Default)]
pub struct InputFeed {
    queue: Arc<Mutex<VecDeque<i64>>>,
}

impl InputFeed {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, event: i64) {
        self.queue.lock().push_back(event);
    }

    /// Take every queued event, oldest first.
    pub fn drain(&self) -> Vec<i64> {
        self.queue.lock().drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.queue.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.lock().is_empty()
    }
}
