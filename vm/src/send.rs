//! Message sends: lookup, the method cache, and method invocation.

use object::layout::*;
use object::{MethodHeader, MethodKind, Value};

use crate::dictionary::METHOD_TABLE;
use crate::selectors::SPECIAL_SELECTORS;
use crate::{Interpreter, RuntimeError};

const CACHE_SIZE: usize = 256;

#[derive(Debug, Clone, Copy)]
struct CacheEntry {
    ty: Value,
    selector: Value,
    method: Value,
}

/// Direct-mapped `(type, selector) -> method` cache.
///
/// Entries hold raw values, so it is flushed after every collection and
/// whenever a method is installed.
pub(crate) struct MethodCache {
    entries: Vec<Option<CacheEntry>>,
    pub hits: u64,
    pub misses: u64,
}

impl MethodCache {
    pub fn new() -> Self {
        Self {
            entries: vec![None; CACHE_SIZE],
            hits: 0,
            misses: 0,
        }
    }

    #[inline]
    fn slot(ty: Value, selector: Value) -> usize {
        ((ty.raw() ^ selector.raw().rotate_left(7)) >> 3) as usize % CACHE_SIZE
    }

    fn get(&mut self, ty: Value, selector: Value) -> Option<Value> {
        match self.entries[Self::slot(ty, selector)] {
            Some(e) if e.ty == ty && e.selector == selector => {
                self.hits += 1;
                Some(e.method)
            }
            _ => {
                self.misses += 1;
                None
            }
        }
    }

    fn put(&mut self, ty: Value, selector: Value, method: Value) {
        self.entries[Self::slot(ty, selector)] = Some(CacheEntry {
            ty,
            selector,
            method,
        });
    }

    pub fn flush(&mut self) {
        self.entries.fill(None);
    }
}

impl Interpreter {
    /// Method cache `(hits, misses)` since creation.
    pub fn method_cache_stats(&self) -> (u64, u64) {
        (self.cache.hits, self.cache.misses)
    }

    /// The Type of any value; SmallInts answer the SmallInteger type.
    pub fn class_of(&self, value: Value) -> Result<Value, RuntimeError> {
        if value.is_small_int() {
            return Ok(self.special.small_integer);
        }
        Ok(self.heap.type_of(value)?)
    }

    /// The method `ty` itself defines for `selector`, ignoring supertypes.
    pub fn method_at(&self, ty: Value, selector: Value) -> Result<Option<Value>, RuntimeError> {
        let found = self
            .tables()
            .lookup(&self.heap, ty, METHOD_TABLE, selector)?;
        Ok(found.filter(|m| *m != self.special.nil))
    }

    /// Walk the supertype chain from `ty`; the most derived definition wins.
    pub fn lookup_method(&self, ty: Value, selector: Value) -> Result<Option<Value>, RuntimeError> {
        let nil = self.special.nil;
        let mut current = ty;
        while current != nil {
            if let Some(method) = self.method_at(current, selector)? {
                return Ok(Some(method));
            }
            current = self.heap.fetch_field(current, TYPE_SUPERTYPE)?;
        }
        Ok(None)
    }

    /// [`lookup_method`](Self::lookup_method) through the method cache.
    pub(crate) fn lookup(&mut self, ty: Value, selector: Value) -> Result<Option<Value>, RuntimeError> {
        if let Some(method) = self.cache.get(ty, selector) {
            return Ok(Some(method));
        }
        let found = self.lookup_method(ty, selector)?;
        if let Some(method) = found {
            self.cache.put(ty, selector, method);
        }
        Ok(found)
    }

    /// Send `selector` to the receiver `argc` slots below the top.
    pub(crate) fn send(&mut self, selector: Value, argc: usize) -> Result<(), RuntimeError> {
        let receiver = self.stack_value(argc)?;
        let ty = self.class_of(receiver)?;
        match self.lookup(ty, selector)? {
            Some(method) => self.invoke(method, argc),
            None => self.does_not_understand(ty, selector, argc),
        }
    }

    /// Replace the arguments with the selector and send
    /// `doesNotUnderstand:`, or fail if the receiver has no handler.
    fn does_not_understand(
        &mut self,
        ty: Value,
        selector: Value,
        argc: usize,
    ) -> Result<(), RuntimeError> {
        let dnu = self.special.does_not_understand;
        if selector != dnu
            && let Some(handler) = self.lookup(ty, dnu)?
        {
            log::debug!("{} does not understand #{}", self.type_name(ty)?, self.symbol_text(selector)?);
            self.pop_n(argc)?;
            self.push(selector)?;
            return self.invoke(handler, 1);
        }
        Err(RuntimeError::UnknownSelector {
            selector: self.symbol_text(selector)?,
            receiver_type: self.type_name(ty)?,
        })
    }

    /// Run `method` for the receiver and `argc` arguments on the stack.
    pub(crate) fn invoke(&mut self, method: Value, argc: usize) -> Result<(), RuntimeError> {
        let header = MethodHeader::from_value(self.heap.fetch_field(method, METHOD_HEADER)?)?;
        if header.arguments as usize != argc {
            return Err(RuntimeError::WrongArgumentCount {
                expected: header.arguments as usize,
                got: argc,
            });
        }
        let index = header.index as usize;
        match header.kind {
            MethodKind::Bytecodes => self.activate_method(method, header, argc),
            MethodKind::Primitive => {
                if self.try_primitive(index, argc)? {
                    Ok(())
                } else {
                    self.activate_method(method, header, argc)
                }
            }
            MethodKind::ReturnField => {
                let receiver = self.pop()?;
                let value = self.heap.fetch_field(receiver, index)?;
                self.push(value)
            }
            MethodKind::PopAndStoreField => {
                let value = self.pop()?;
                let receiver = self.top()?;
                self.heap.store_field(receiver, index, value)?;
                Ok(())
            }
        }
    }

    /// Run primitive `index`. Answers whether it succeeded; on decline
    /// the operand stack is as it was.
    pub(crate) fn try_primitive(&mut self, index: usize, argc: usize) -> Result<bool, RuntimeError> {
        let Some(desc) = self.primitives.get(index).copied() else {
            return Ok(false);
        };
        if desc.arity as usize != argc {
            return Ok(false);
        }
        let sp = self.regs.sp;
        match (desc.func)(self, argc) {
            Ok(true) => Ok(true),
            Ok(false) => {
                self.regs.sp = sp;
                Ok(false)
            }
            Err(e) if !e.aborts_primitive() => {
                log::debug!("primitive {} declined: {e}", desc.name);
                self.regs.sp = sp;
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }

    /// Send through the special selector table: try the selector's
    /// primitive first, then fall back to a full send.
    pub(crate) fn special_send(&mut self, index: u8, argc: usize) -> Result<(), RuntimeError> {
        let Some(entry) = SPECIAL_SELECTORS.get(index as usize) else {
            return Err(RuntimeError::InvalidSpecialSelector(index));
        };
        if entry.arity as usize != argc {
            return Err(RuntimeError::WrongArgumentCount {
                expected: entry.arity as usize,
                got: argc,
            });
        }
        if let Some(primitive) = entry.primitive
            && self.try_primitive(primitive, argc)?
        {
            return Ok(());
        }
        let selector = self
            .heap
            .fetch_field(self.special.special_selectors, index as usize)?;
        self.send(selector, argc)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cache_hits_after_put_and_clears_on_flush() {
        let mut cache = MethodCache::new();
        let (ty, sel, m) = (Value::from_i64(10), Value::from_i64(20), Value::from_i64(30));
        assert_eq!(cache.get(ty, sel), None);
        cache.put(ty, sel, m);
        assert_eq!(cache.get(ty, sel), Some(m));
        assert_eq!(cache.get(sel, ty), None);
        cache.flush();
        assert_eq!(cache.get(ty, sel), None);
        assert_eq!(cache.hits, 1);
        assert_eq!(cache.misses, 3);
    }
}
