//! Values pinned by the embedder.
//!
//! A collection moves every ephemeral object, so a `Value` held outside
//! the heap goes stale. Pinning registers it as a root; reading it back
//! through its [`RootId`] yields the current location.

use object::Value;

use crate::Interpreter;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RootId(usize);

#[derive(Debug, Default)]
pub(crate) struct RootSet {
    slots: Vec<Option<Value>>,
    free: Vec<usize>,
}

impl RootSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pin(&mut self, value: Value) -> RootId {
        match self.free.pop() {
            Some(index) => {
                self.slots[index] = Some(value);
                RootId(index)
            }
            None => {
                self.slots.push(Some(value));
                RootId(self.slots.len() - 1)
            }
        }
    }

    pub fn get(&self, id: RootId) -> Option<Value> {
        self.slots.get(id.0).copied().flatten()
    }

    pub fn unpin(&mut self, id: RootId) -> Option<Value> {
        let value = self.slots.get_mut(id.0)?.take();
        if value.is_some() {
            self.free.push(id.0);
        }
        value
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.slots.len() - self.free.len()
    }

    pub fn visit(&mut self, visitor: &mut dyn FnMut(&mut Value)) {
        for value in self.slots.iter_mut().flatten() {
            visitor(value);
        }
    }
}

impl Interpreter {
    /// Keep `value` alive and trackable across collections.
    pub fn pin(&mut self, value: Value) -> RootId {
        self.pins.pin(value)
    }

    /// Current location of a pinned value.
    pub fn pinned(&self, id: RootId) -> Option<Value> {
        self.pins.get(id)
    }

    pub fn unpin(&mut self, id: RootId) -> Option<Value> {
        self.pins.unpin(id)
    }
}
