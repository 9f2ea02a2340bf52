//! Bootstrap of the minimal class graph.
//!
//! Everything allocated here lives in the root pool. Every Type gets its
//! own metatype; metatypes are instances of `Metaclass`, whose type is
//! itself. `Object class` inherits from `Class`, so class-side lookup
//! ends in the ordinary instance-side hierarchy.

use heap::Heap;
use object::layout::*;
use object::{Format, SpecialObjects, Space, Value};

use crate::dictionary::{GLOBALS, Tables};
use crate::selectors::SPECIAL_SELECTORS;
use crate::{RuntimeError, VMCreateInfo};

/// Fill in a Type's own fields. The name is set once symbols exist.
fn init_type(
    heap: &mut Heap,
    ty: Value,
    supertype: Value,
    fixed: usize,
    format: Format,
) -> Result<(), RuntimeError> {
    heap.store_field(ty, TYPE_SUPERTYPE, supertype)?;
    heap.store_field(ty, TYPE_FIXED_FIELDS, Value::from_usize(fixed))?;
    heap.store_field(ty, TYPE_TALLY, Value::from_i64(0))?;
    heap.store_field(ty, TYPE_FORMAT, format.to_value())?;
    Ok(())
}

/// A Type and its metatype, both in the root pool. The metatype inherits
/// from the supertype's metatype, or from nil for a root type until the
/// caller patches it.
pub(crate) fn new_type(
    heap: &mut Heap,
    nil: Value,
    metaclass: Value,
    supertype: Value,
    fixed: usize,
    format: Format,
) -> Result<Value, RuntimeError> {
    let meta_super = if supertype == nil {
        nil
    } else {
        heap.type_of(supertype)?
    };
    let meta = heap.allocate_fields(Space::Root, metaclass, TYPE_SIZE, nil)?;
    init_type(heap, meta, meta_super, TYPE_SIZE, Format::FIXED)?;
    let ty = heap.allocate_fields(Space::Root, meta, TYPE_SIZE, nil)?;
    init_type(heap, ty, supertype, fixed, format)?;
    Ok(ty)
}

/// Intern the names of `ty` and its metatype.
pub(crate) fn name_type(
    heap: &mut Heap,
    tables: &Tables,
    special: &SpecialObjects,
    ty: Value,
    name: &str,
) -> Result<Value, RuntimeError> {
    let (table, symbol_type) = (special.symbol_table, special.symbol);
    let symbol = tables.intern(heap, table, symbol_type, name)?;
    heap.store_field(ty, TYPE_NAME, symbol)?;
    let meta = heap.type_of(ty)?;
    if meta != ty {
        let meta_name = tables.intern(heap, table, symbol_type, &format!("{name} class"))?;
        heap.store_field(meta, TYPE_NAME, meta_name)?;
    }
    Ok(symbol)
}

fn root_instance(heap: &mut Heap, ty: Value, size: usize, nil: Value) -> Result<Value, RuntimeError> {
    Ok(heap.allocate_fields(Space::Root, ty, size, nil)?)
}

pub(crate) fn bootstrap(heap: &mut Heap, settings: &VMCreateInfo) -> Result<SpecialObjects, RuntimeError> {
    // ── Singletons and the metaclass ───────────────────────────────
    // Typed with a placeholder until the real types exist.
    let placeholder = Value::from_i64(0);
    let nil = heap.allocate_fields(Space::Root, placeholder, 0, placeholder)?;
    let true_obj = heap.allocate_fields(Space::Root, placeholder, 0, nil)?;
    let false_obj = heap.allocate_fields(Space::Root, placeholder, 0, nil)?;
    let metaclass = heap.allocate_fields(Space::Root, placeholder, TYPE_SIZE, nil)?;
    heap.set_type(metaclass, metaclass)?;

    let mut s = SpecialObjects::filled(nil);
    s.true_obj = true_obj;
    s.false_obj = false_obj;
    s.metaclass = metaclass;

    // ── Boot types ─────────────────────────────────────────────────
    let ty = |heap: &mut Heap, supertype: Value, fixed: usize, format: Format| {
        new_type(heap, nil, metaclass, supertype, fixed, format)
    };
    s.object = ty(heap, nil, 0, Format::FIXED)?;
    s.undefined_object = ty(heap, s.object, 0, Format::FIXED)?;
    s.boolean = ty(heap, s.object, 0, Format::FIXED)?;
    s.true_type = ty(heap, s.boolean, 0, Format::FIXED)?;
    s.false_type = ty(heap, s.boolean, 0, Format::FIXED)?;
    s.small_integer = ty(heap, s.object, 0, Format::FIXED)?;
    s.string = ty(heap, s.object, 0, Format::BYTES)?;
    s.symbol = ty(heap, s.string, 0, Format::BYTES)?;
    s.array = ty(heap, s.object, 0, Format::INDEXABLE)?;
    s.byte_array = ty(heap, s.object, 0, Format::BYTES)?;
    s.word_array = ty(heap, s.object, 0, Format::WORDS)?;
    s.compiled_method = ty(heap, s.object, METHOD_LITERALS, Format::INDEXABLE)?;
    s.method_context = ty(heap, s.object, CONTEXT_TAIL, Format::INDEXABLE)?;
    s.block_context = ty(heap, s.object, CONTEXT_TAIL, Format::INDEXABLE)?;
    s.process = ty(heap, s.object, PROCESS_SIZE, Format::FIXED)?;
    s.semaphore = ty(heap, s.object, SEMAPHORE_SIZE, Format::FIXED)?;
    s.link = ty(heap, s.object, LINK_SIZE, Format::FIXED)?;
    s.processor_scheduler = ty(heap, s.object, PROCESSOR_SIZE, Format::FIXED)?;
    s.dictionary = ty(heap, s.object, DICTIONARY_SIZE, Format::FIXED)?;
    s.symbol_table_type = ty(heap, s.object, SYMBOL_TABLE_SIZE, Format::FIXED)?;
    s.class = ty(heap, s.object, TYPE_SIZE, Format::FIXED)?;

    let object_meta = heap.type_of(s.object)?;
    heap.store_field(object_meta, TYPE_SUPERTYPE, s.class)?;
    init_type(heap, metaclass, s.class, TYPE_SIZE, Format::FIXED)?;

    heap.set_type(nil, s.undefined_object)?;
    heap.set_type(true_obj, s.true_type)?;
    heap.set_type(false_obj, s.false_type)?;

    // ── Symbols and globals ────────────────────────────────────────
    let tables = Tables {
        nil,
        array: s.array,
        capacity: settings.dictionary_capacity,
        growth: settings.dictionary_growth,
    };
    s.symbol_table = root_instance(heap, s.symbol_table_type, SYMBOL_TABLE_SIZE, nil)?;
    heap.store_field(s.symbol_table, SYMBOL_TABLE_TALLY, Value::from_i64(0))?;
    s.globals = root_instance(heap, s.dictionary, DICTIONARY_SIZE, nil)?;
    heap.store_field(s.globals, DICTIONARY_TALLY, Value::from_i64(0))?;

    let named = [
        ("Object", s.object),
        ("UndefinedObject", s.undefined_object),
        ("Boolean", s.boolean),
        ("True", s.true_type),
        ("False", s.false_type),
        ("SmallInteger", s.small_integer),
        ("String", s.string),
        ("Symbol", s.symbol),
        ("Array", s.array),
        ("ByteArray", s.byte_array),
        ("WordArray", s.word_array),
        ("CompiledMethod", s.compiled_method),
        ("MethodContext", s.method_context),
        ("BlockContext", s.block_context),
        ("Process", s.process),
        ("Semaphore", s.semaphore),
        ("Link", s.link),
        ("ProcessorScheduler", s.processor_scheduler),
        ("Dictionary", s.dictionary),
        ("SymbolTable", s.symbol_table_type),
        ("Class", s.class),
        ("Metaclass", s.metaclass),
    ];
    for (name, ty) in named {
        let symbol = name_type(heap, &tables, &s, ty, name)?;
        tables.at_put(heap, s.globals, GLOBALS, symbol, ty)?;
    }

    // ── Processor ──────────────────────────────────────────────────
    let timer = root_instance(heap, s.semaphore, SEMAPHORE_SIZE, nil)?;
    let input = root_instance(heap, s.semaphore, SEMAPHORE_SIZE, nil)?;
    let irq = root_instance(heap, s.array, IRQ_SIZE, nil)?;
    for (slot, semaphore) in [(IRQ_TIMER, timer), (IRQ_INPUT, input)] {
        heap.store_field(semaphore, SEMAPHORE_EXCESS, Value::from_i64(0))?;
        heap.store_field(irq, slot, semaphore)?;
    }
    let entry = root_instance(heap, s.process, PROCESS_SIZE, nil)?;
    heap.store_field(entry, PROCESS_TIME, Value::from_i64(0))?;
    s.processor = root_instance(heap, s.processor_scheduler, PROCESSOR_SIZE, nil)?;
    heap.store_field(s.processor, PROCESSOR_ACTIVE, entry)?;
    heap.store_field(s.processor, PROCESSOR_IRQ_TABLE, irq)?;
    for (name, value) in [
        ("Processor", s.processor),
        ("TimerSemaphore", timer),
        ("InputSemaphore", input),
    ] {
        let symbol = tables.intern(heap, s.symbol_table, s.symbol, name)?;
        tables.at_put(heap, s.globals, GLOBALS, symbol, value)?;
    }

    // ── Selectors ──────────────────────────────────────────────────
    s.special_selectors = root_instance(heap, s.array, SPECIAL_SELECTORS.len(), nil)?;
    for (i, selector) in SPECIAL_SELECTORS.iter().enumerate() {
        let symbol = tables.intern(heap, s.symbol_table, s.symbol, selector.name)?;
        heap.store_field(s.special_selectors, i, symbol)?;
    }
    s.does_not_understand = tables.intern(heap, s.symbol_table, s.symbol, "doesNotUnderstand:")?;

    log::debug!("bootstrap allocated {:?}", heap.stats());
    Ok(s)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Interpreter;

    fn interpreter() -> Interpreter {
        Interpreter::new(VMCreateInfo::default()).unwrap()
    }

    #[test]
    fn singletons_have_their_types() {
        let vm = interpreter();
        let s = *vm.special();
        assert_eq!(vm.class_of(s.nil).unwrap(), s.undefined_object);
        assert_eq!(vm.class_of(s.true_obj).unwrap(), s.true_type);
        assert_eq!(vm.class_of(s.false_obj).unwrap(), s.false_type);
        assert_eq!(vm.class_of(Value::from_i64(3)).unwrap(), s.small_integer);
        assert_ne!(s.nil, s.true_obj);
        assert_ne!(s.true_obj, s.false_obj);
    }

    #[test]
    fn metatype_chain_terminates_at_metaclass() {
        let vm = interpreter();
        let s = *vm.special();
        let heap = vm.heap();
        for ty in [s.object, s.array, s.semaphore, s.class] {
            let meta = heap.type_of(ty).unwrap();
            assert_ne!(meta, ty);
            assert_eq!(heap.type_of(meta).unwrap(), s.metaclass);
            assert!(vm.is_type(ty).unwrap());
        }
        assert_eq!(heap.type_of(s.metaclass).unwrap(), s.metaclass);
        let object_meta = heap.type_of(s.object).unwrap();
        assert_eq!(heap.fetch_field(object_meta, TYPE_SUPERTYPE).unwrap(), s.class);
        let array_meta = heap.type_of(s.array).unwrap();
        assert_eq!(heap.fetch_field(array_meta, TYPE_SUPERTYPE).unwrap(), object_meta);
        assert!(!vm.is_type(s.nil).unwrap());
    }

    #[test]
    fn types_are_named_and_registered() {
        let vm = interpreter();
        let s = *vm.special();
        assert_eq!(vm.type_name(s.symbol).unwrap(), "Symbol");
        assert_eq!(vm.type_name(vm.heap().type_of(s.array).unwrap()).unwrap(), "Array class");
        assert_eq!(vm.global_at("Semaphore").unwrap(), Some(s.semaphore));
        assert_eq!(vm.global_at("Processor").unwrap(), Some(s.processor));
        let irq = vm.heap().fetch_field(s.processor, PROCESSOR_IRQ_TABLE).unwrap();
        let input = vm.heap().fetch_field(irq, IRQ_INPUT).unwrap();
        assert_eq!(vm.global_at("InputSemaphore").unwrap(), Some(input));
        assert_eq!(vm.global_at("Nonexistent").unwrap(), None);
    }

    #[test]
    fn boot_objects_are_permanent() {
        let vm = interpreter();
        let s = *vm.special();
        for v in [s.nil, s.object, s.processor, s.globals, s.metaclass] {
            assert!(vm.heap().is_permanent(v).unwrap());
        }
    }

    #[test]
    fn special_selectors_are_interned() {
        let vm = interpreter();
        let s = *vm.special();
        let plus = vm.heap().fetch_field(s.special_selectors, 0).unwrap();
        assert_eq!(vm.find_symbol("+").unwrap(), Some(plus));
        assert_eq!(vm.symbol_text(s.does_not_understand).unwrap(), "doesNotUnderstand:");
    }
}
