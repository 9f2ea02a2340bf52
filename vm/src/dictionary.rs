//! Open-addressing tables stored in ordinary heap objects.
//!
//! Three owners share one algorithm: a Type's method table
//! (`selectors` / `methods`), the globals Dictionary (`keys` / `values`),
//! and the SymbolTable (`keys` only). Keys and values live in parallel
//! Arrays; an empty slot holds nil. Probing is linear from
//! `hash % capacity`, and a table grows in fixed increments before its
//! load would exceed three quarters.

use heap::{Heap, HeapError, content_hash};
use object::layout::*;
use object::{Decoded, ObjectError, Space, Value};

/// Which fields of the owner hold the tally and the backing arrays.
#[derive(Debug, Clone, Copy)]
pub(crate) struct TableLayout {
    tally: usize,
    keys: usize,
    values: Option<usize>,
}

pub(crate) const METHOD_TABLE: TableLayout = TableLayout {
    tally: TYPE_TALLY,
    keys: TYPE_SELECTORS,
    values: Some(TYPE_METHODS),
};

pub(crate) const GLOBALS: TableLayout = TableLayout {
    tally: DICTIONARY_TALLY,
    keys: DICTIONARY_KEYS,
    values: Some(DICTIONARY_VALUES),
};

pub(crate) const SYMBOLS: TableLayout = TableLayout {
    tally: SYMBOL_TABLE_TALLY,
    keys: SYMBOL_TABLE_KEYS,
    values: None,
};

enum Probe {
    Found(usize),
    Vacant(usize),
    Full,
}

/// Hash of a table key: SmallInts hash to themselves, buffers to their
/// content hash, fielded objects to zero.
pub(crate) fn key_hash(heap: &Heap, key: Value) -> Result<u64, HeapError> {
    Ok(match key.decode() {
        Decoded::SmallInt(n) => n.unsigned_abs(),
        Decoded::Bytes(_) | Decoded::Words(_) => heap.content_hash(key)?.unsigned_abs(),
        Decoded::Object(_) => 0,
    })
}

fn table_full(limit: usize) -> HeapError {
    ObjectError::OutOfRange { index: limit, limit }.into()
}

/// Parameters shared by every table operation.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Tables {
    pub nil: Value,
    pub array: Value,
    pub capacity: usize,
    pub growth: usize,
}

impl Tables {
    fn probe(
        &self,
        heap: &Heap,
        keys: Value,
        hash: u64,
        matches: &mut dyn FnMut(&Heap, Value) -> Result<bool, HeapError>,
    ) -> Result<Probe, HeapError> {
        if keys == self.nil {
            return Ok(Probe::Full);
        }
        let capacity = heap.field_count(keys)?;
        if capacity == 0 {
            return Ok(Probe::Full);
        }
        let start = (hash % capacity as u64) as usize;
        for i in 0..capacity {
            let slot = (start + i) % capacity;
            let k = heap.fetch_field(keys, slot)?;
            if k == self.nil {
                return Ok(Probe::Vacant(slot));
            }
            if matches(heap, k)? {
                return Ok(Probe::Found(slot));
            }
        }
        Ok(Probe::Full)
    }

    fn probe_identity(&self, heap: &Heap, keys: Value, key: Value) -> Result<Probe, HeapError> {
        let hash = key_hash(heap, key)?;
        self.probe(heap, keys, hash, &mut |_, k| Ok(k == key))
    }

    /// Value stored under `key` (compared by identity).
    pub(crate) fn lookup(
        &self,
        heap: &Heap,
        owner: Value,
        layout: TableLayout,
        key: Value,
    ) -> Result<Option<Value>, HeapError> {
        let keys = heap.fetch_field(owner, layout.keys)?;
        match self.probe_identity(heap, keys, key)? {
            Probe::Found(slot) => match layout.values {
                Some(values) => {
                    let values = heap.fetch_field(owner, values)?;
                    Ok(Some(heap.fetch_field(values, slot)?))
                }
                None => Ok(Some(key)),
            },
            Probe::Vacant(_) | Probe::Full => Ok(None),
        }
    }

    /// Insert or replace the entry for `key` (compared by identity).
    pub(crate) fn at_put(
        &self,
        heap: &mut Heap,
        owner: Value,
        layout: TableLayout,
        key: Value,
        value: Value,
    ) -> Result<(), HeapError> {
        let keys = heap.fetch_field(owner, layout.keys)?;
        if let Probe::Found(slot) = self.probe_identity(heap, keys, key)? {
            if let Some(values) = layout.values {
                let values = heap.fetch_field(owner, values)?;
                heap.store_field(values, slot, value)?;
            }
            return Ok(());
        }
        let hash = key_hash(heap, key)?;
        self.insert_new(heap, owner, layout, hash, key, value)
    }

    /// Store a key known to be absent, growing first if needed.
    fn insert_new(
        &self,
        heap: &mut Heap,
        owner: Value,
        layout: TableLayout,
        hash: u64,
        key: Value,
        value: Value,
    ) -> Result<(), HeapError> {
        let tally = heap.fetch_field(owner, layout.tally)?.as_index()?;
        let keys = heap.fetch_field(owner, layout.keys)?;
        let capacity = if keys == self.nil { 0 } else { heap.field_count(keys)? };
        let fits = |capacity: usize| (tally + 1) * 4 <= capacity * 3;
        if !fits(capacity) {
            let mut target = if capacity == 0 { self.capacity } else { capacity };
            while !fits(target) {
                target += self.growth.max(1);
            }
            self.grow(heap, owner, layout, target)?;
        }

        let keys = heap.fetch_field(owner, layout.keys)?;
        let Probe::Vacant(slot) = self.probe(heap, keys, hash, &mut |_, _| Ok(false))? else {
            return Err(table_full(tally));
        };
        heap.store_field(keys, slot, key)?;
        if let Some(values) = layout.values {
            let values = heap.fetch_field(owner, values)?;
            heap.store_field(values, slot, value)?;
        }
        heap.store_field(owner, layout.tally, Value::from_usize(tally + 1))
    }

    /// Rehash every entry into fresh arrays of `capacity` slots.
    fn grow(
        &self,
        heap: &mut Heap,
        owner: Value,
        layout: TableLayout,
        capacity: usize,
    ) -> Result<(), HeapError> {
        let old_keys = heap.fetch_field(owner, layout.keys)?;
        let old_values = match layout.values {
            Some(values) => Some(heap.fetch_field(owner, values)?),
            None => None,
        };
        let keys = heap.allocate_fields(Space::Ephemeral, self.array, capacity, self.nil)?;
        let values = match layout.values {
            Some(_) => Some(heap.allocate_fields(Space::Ephemeral, self.array, capacity, self.nil)?),
            None => None,
        };

        if old_keys != self.nil {
            for slot in 0..heap.field_count(old_keys)? {
                let key = heap.fetch_field(old_keys, slot)?;
                if key == self.nil {
                    continue;
                }
                let hash = key_hash(heap, key)?;
                let Probe::Vacant(new_slot) = self.probe(heap, keys, hash, &mut |_, _| Ok(false))?
                else {
                    return Err(table_full(capacity));
                };
                heap.store_field(keys, new_slot, key)?;
                if let (Some(old), Some(new)) = (old_values, values) {
                    let value = heap.fetch_field(old, slot)?;
                    heap.store_field(new, new_slot, value)?;
                }
            }
        }

        heap.store_field(owner, layout.keys, keys)?;
        if let (Some(field), Some(values)) = (layout.values, values) {
            heap.store_field(owner, field, values)?;
        }
        log::trace!("table grew to {capacity} slots");
        Ok(())
    }

    /// The symbol spelled `name`, if interned.
    pub(crate) fn find_symbol(
        &self,
        heap: &Heap,
        table: Value,
        name: &str,
    ) -> Result<Option<Value>, HeapError> {
        let keys = heap.fetch_field(table, SYMBOLS.keys)?;
        let hash = content_hash(name.as_bytes()).unsigned_abs();
        match self.probe(heap, keys, hash, &mut |heap, k| {
            Ok(heap.bytes(k)? == name.as_bytes())
        })? {
            Probe::Found(slot) => Ok(Some(heap.fetch_field(keys, slot)?)),
            Probe::Vacant(_) | Probe::Full => Ok(None),
        }
    }

    /// The unique symbol spelled `name`, creating it on first use.
    pub(crate) fn intern(
        &self,
        heap: &mut Heap,
        table: Value,
        symbol_type: Value,
        name: &str,
    ) -> Result<Value, HeapError> {
        if let Some(symbol) = self.find_symbol(heap, table, name)? {
            return Ok(symbol);
        }
        let symbol = heap.allocate_bytes_from(Space::Ephemeral, symbol_type, name.as_bytes())?;
        let hash = content_hash(name.as_bytes()).unsigned_abs();
        self.insert_new(heap, table, SYMBOLS, hash, symbol, self.nil)?;
        Ok(symbol)
    }

    #[cfg(test)]
    pub(crate) fn tally(&self, heap: &Heap, owner: Value, layout: TableLayout) -> Result<usize, HeapError> {
        Ok(heap.fetch_field(owner, layout.tally)?.as_index()?)
    }
}

#[cfg(test)]
mod tests {
    use heap::HeapSettings;

    use super::*;

    fn setup() -> (Heap, Tables, Value) {
        let mut heap = Heap::new(HeapSettings::default()).unwrap();
        let nil = heap.allocate_fields(Space::Root, Value::from_i64(0), 0, Value::from_i64(0)).unwrap();
        let array = heap.allocate_fields(Space::Root, nil, 0, nil).unwrap();
        let tables = Tables {
            nil,
            array,
            capacity: 4,
            growth: 4,
        };
        (heap, tables, nil)
    }

    fn new_dictionary(heap: &mut Heap, nil: Value) -> Value {
        let d = heap.allocate_fields(Space::Root, nil, DICTIONARY_SIZE, nil).unwrap();
        heap.store_field(d, DICTIONARY_TALLY, Value::from_i64(0)).unwrap();
        d
    }

    #[test]
    fn insert_lookup_replace() {
        let (mut heap, tables, nil) = setup();
        let d = new_dictionary(&mut heap, nil);
        let k = Value::from_i64(5);

        assert_eq!(tables.lookup(&heap, d, GLOBALS, k).unwrap(), None);
        tables.at_put(&mut heap, d, GLOBALS, k, Value::from_i64(50)).unwrap();
        assert_eq!(tables.lookup(&heap, d, GLOBALS, k).unwrap(), Some(Value::from_i64(50)));

        tables.at_put(&mut heap, d, GLOBALS, k, Value::from_i64(51)).unwrap();
        assert_eq!(tables.lookup(&heap, d, GLOBALS, k).unwrap(), Some(Value::from_i64(51)));
        assert_eq!(tables.tally(&heap, d, GLOBALS).unwrap(), 1);
    }

    #[test]
    fn growth_keeps_every_entry() {
        let (mut heap, tables, nil) = setup();
        let d = new_dictionary(&mut heap, nil);
        for i in 0..20 {
            tables
                .at_put(&mut heap, d, GLOBALS, Value::from_i64(i * 3), Value::from_i64(i))
                .unwrap();
        }
        for i in 0..20 {
            assert_eq!(
                tables.lookup(&heap, d, GLOBALS, Value::from_i64(i * 3)).unwrap(),
                Some(Value::from_i64(i))
            );
        }
        let keys = heap.fetch_field(d, DICTIONARY_KEYS).unwrap();
        let capacity = heap.field_count(keys).unwrap();
        assert!(20 * 4 <= capacity * 3, "load factor exceeded at {capacity}");
        assert_eq!(tables.tally(&heap, d, GLOBALS).unwrap(), 20);
    }

    #[test]
    fn small_growth_steps_still_bound_the_load() {
        let (mut heap, mut tables, nil) = setup();
        tables.growth = 1;
        let d = new_dictionary(&mut heap, nil);
        for i in 0..40 {
            tables
                .at_put(&mut heap, d, GLOBALS, Value::from_i64(i), Value::from_i64(i))
                .unwrap();
            let keys = heap.fetch_field(d, DICTIONARY_KEYS).unwrap();
            let capacity = heap.field_count(keys).unwrap();
            let tally = tables.tally(&heap, d, GLOBALS).unwrap();
            assert!(tally * 4 <= capacity * 3, "{tally} entries in {capacity} slots");
        }
        for i in 0..40 {
            assert_eq!(
                tables.lookup(&heap, d, GLOBALS, Value::from_i64(i)).unwrap(),
                Some(Value::from_i64(i))
            );
        }
    }

    #[test]
    fn colliding_keys_probe_linearly() {
        let (mut heap, tables, nil) = setup();
        let d = new_dictionary(&mut heap, nil);
        // Fielded keys all hash to zero.
        let a = heap.allocate_fields(Space::Ephemeral, nil, 0, nil).unwrap();
        let b = heap.allocate_fields(Space::Ephemeral, nil, 0, nil).unwrap();
        tables.at_put(&mut heap, d, GLOBALS, a, Value::from_i64(1)).unwrap();
        tables.at_put(&mut heap, d, GLOBALS, b, Value::from_i64(2)).unwrap();
        assert_eq!(tables.lookup(&heap, d, GLOBALS, a).unwrap(), Some(Value::from_i64(1)));
        assert_eq!(tables.lookup(&heap, d, GLOBALS, b).unwrap(), Some(Value::from_i64(2)));
    }

    #[test]
    fn interning_is_unique() {
        let (mut heap, tables, nil) = setup();
        let table = heap.allocate_fields(Space::Root, nil, SYMBOL_TABLE_SIZE, nil).unwrap();
        heap.store_field(table, SYMBOL_TABLE_TALLY, Value::from_i64(0)).unwrap();

        let a = tables.intern(&mut heap, table, nil, "foo").unwrap();
        let b = tables.intern(&mut heap, table, nil, "foo").unwrap();
        let c = tables.intern(&mut heap, table, nil, "oof").unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(heap.bytes(c).unwrap(), b"oof");
        assert_eq!(tables.find_symbol(&heap, table, "bar").unwrap(), None);

        for i in 0..40 {
            tables.intern(&mut heap, table, nil, &format!("sym{i}")).unwrap();
        }
        assert_eq!(tables.find_symbol(&heap, table, "foo").unwrap(), Some(a));
        assert_eq!(tables.tally(&heap, table, SYMBOLS).unwrap(), 42);
    }
}
