use crate::Value;

/// Well-known singleton objects and boot types.
///
/// **Objects are not allocated here.** The VM bootstrap allocates them
/// in the root pool and stores the references. Everything listed here
/// is permanent, but [`SpecialObjects::visit`] still reports each slot
/// so a root provider can hand the whole set to the collector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpecialObjects {
    // ── Singletons ─────────────────────────────────────────────────
    pub nil: Value,
    pub true_obj: Value,
    pub false_obj: Value,

    /// The ProcessorScheduler instance.
    pub processor: Value,
    /// Global namespace Dictionary.
    pub globals: Value,
    /// SymbolTable used for interning.
    pub symbol_table: Value,
    /// Array of the special selector symbols, by special-send index.
    pub special_selectors: Value,
    /// The `doesNotUnderstand:` symbol.
    pub does_not_understand: Value,

    // ── Boot types ─────────────────────────────────────────────────
    pub object: Value,
    pub undefined_object: Value,
    pub boolean: Value,
    pub true_type: Value,
    pub false_type: Value,
    pub small_integer: Value,
    pub symbol: Value,
    pub string: Value,
    pub array: Value,
    pub byte_array: Value,
    pub word_array: Value,
    pub compiled_method: Value,
    pub method_context: Value,
    pub block_context: Value,
    pub process: Value,
    pub semaphore: Value,
    pub link: Value,
    pub processor_scheduler: Value,
    pub dictionary: Value,
    pub symbol_table_type: Value,
    pub class: Value,
    pub metaclass: Value,
}

impl SpecialObjects {
    /// All slots set to `filler`; the bootstrap overwrites each one.
    pub fn filled(filler: Value) -> Self {
        Self {
            nil: filler,
            true_obj: filler,
            false_obj: filler,
            processor: filler,
            globals: filler,
            symbol_table: filler,
            special_selectors: filler,
            does_not_understand: filler,
            object: filler,
            undefined_object: filler,
            boolean: filler,
            true_type: filler,
            false_type: filler,
            small_integer: filler,
            symbol: filler,
            string: filler,
            array: filler,
            byte_array: filler,
            word_array: filler,
            compiled_method: filler,
            method_context: filler,
            block_context: filler,
            process: filler,
            semaphore: filler,
            link: filler,
            processor_scheduler: filler,
            dictionary: filler,
            symbol_table_type: filler,
            class: filler,
            metaclass: filler,
        }
    }

    #[inline]
    pub fn boolean(&self, b: bool) -> Value {
        if b { self.true_obj } else { self.false_obj }
    }

    pub fn visit(&mut self, visitor: &mut dyn FnMut(&mut Value)) {
        for slot in [
            &mut self.nil,
            &mut self.true_obj,
            &mut self.false_obj,
            &mut self.processor,
            &mut self.globals,
            &mut self.symbol_table,
            &mut self.special_selectors,
            &mut self.does_not_understand,
            &mut self.object,
            &mut self.undefined_object,
            &mut self.boolean,
            &mut self.true_type,
            &mut self.false_type,
            &mut self.small_integer,
            &mut self.symbol,
            &mut self.string,
            &mut self.array,
            &mut self.byte_array,
            &mut self.word_array,
            &mut self.compiled_method,
            &mut self.method_context,
            &mut self.block_context,
            &mut self.process,
            &mut self.semaphore,
            &mut self.link,
            &mut self.processor_scheduler,
            &mut self.dictionary,
            &mut self.symbol_table_type,
            &mut self.class,
            &mut self.metaclass,
        ] {
            visitor(slot);
        }
    }
}
