//! Embedding API: symbols, globals, types and compiled methods.
//!
//! Method bodies come from [`bytecode::BytecodeBuilder`]; this module turns
//! them into CompiledMethod objects and installs them in method tables.

use bytecode::{BytecodeBuilder, BytecodeDecoder};
use object::layout::*;
use object::{Format, MethodHeader, MethodKind, Space, Tag, Value};

use crate::dictionary::{GLOBALS, METHOD_TABLE};
use crate::special::{name_type, new_type};
use crate::{Interpreter, RuntimeError};

/// A literal of a method being compiled.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Literal<'a> {
    Int(i64),
    Symbol(&'a str),
    String(&'a str),
    Value(Value),
    Nil,
    True,
    False,
}

/// Everything needed to build a CompiledMethod.
#[derive(Debug, Clone)]
pub struct MethodSpec<'a> {
    pub selector: &'a str,
    pub header: MethodHeader,
    pub literals: Vec<Literal<'a>>,
    pub opcodes: Vec<u8>,
}

impl<'a> MethodSpec<'a> {
    pub fn new(selector: &'a str, header: MethodHeader, opcodes: Vec<u8>) -> Self {
        Self {
            selector,
            header,
            literals: Vec::new(),
            opcodes,
        }
    }

    pub fn with_literals(mut self, literals: Vec<Literal<'a>>) -> Self {
        self.literals = literals;
        self
    }

    /// Accessor answering field `field` of the receiver.
    pub fn getter(selector: &'a str, field: u16) -> Self {
        Self::new(selector, MethodHeader::return_field(field), Vec::new())
    }

    /// One-argument accessor storing into field `field`.
    pub fn setter(selector: &'a str, field: u16) -> Self {
        Self::new(selector, MethodHeader::pop_and_store_field(field), Vec::new())
    }
}

impl Interpreter {
    // ── Symbols and strings ────────────────────────────────────────

    pub fn intern(&mut self, name: &str) -> Result<Value, RuntimeError> {
        let tables = self.tables();
        let (table, symbol) = (self.special.symbol_table, self.special.symbol);
        Ok(tables.intern(&mut self.heap, table, symbol, name)?)
    }

    pub fn find_symbol(&self, name: &str) -> Result<Option<Value>, RuntimeError> {
        Ok(self
            .tables()
            .find_symbol(&self.heap, self.special.symbol_table, name)?)
    }

    /// Text of a Symbol or String.
    pub fn symbol_text(&self, value: Value) -> Result<String, RuntimeError> {
        Ok(String::from_utf8_lossy(self.heap.bytes(value)?).into_owned())
    }

    pub fn type_name(&self, ty: Value) -> Result<String, RuntimeError> {
        let name = self.heap.fetch_field(ty, TYPE_NAME)?;
        if name == self.special.nil {
            return Ok("<anonymous>".to_string());
        }
        self.symbol_text(name)
    }

    pub fn new_string(&mut self, text: &str) -> Result<Value, RuntimeError> {
        Ok(self
            .heap
            .allocate_bytes_from(Space::Ephemeral, self.special.string, text.as_bytes())?)
    }

    pub fn new_array(&mut self, values: &[Value]) -> Result<Value, RuntimeError> {
        let nil = self.special.nil;
        let array = self
            .heap
            .allocate_fields(Space::Ephemeral, self.special.array, values.len(), nil)?;
        for (i, v) in values.iter().enumerate() {
            self.heap.store_field(array, i, *v)?;
        }
        Ok(array)
    }

    // ── Globals ────────────────────────────────────────────────────

    pub fn global_at(&self, name: &str) -> Result<Option<Value>, RuntimeError> {
        let Some(symbol) = self.find_symbol(name)? else {
            return Ok(None);
        };
        Ok(self
            .tables()
            .lookup(&self.heap, self.special.globals, GLOBALS, symbol)?)
    }

    pub fn global_at_put(&mut self, name: &str, value: Value) -> Result<(), RuntimeError> {
        let symbol = self.intern(name)?;
        let tables = self.tables();
        tables.at_put(&mut self.heap, self.special.globals, GLOBALS, symbol, value)?;
        Ok(())
    }

    // ── Types ──────────────────────────────────────────────────────

    /// Create a Type named `name` under `supertype`, adding `fields`
    /// instance fields to the inherited ones, and register it as a global.
    pub fn define_type(
        &mut self,
        name: &str,
        supertype: Value,
        fields: usize,
        format: Format,
    ) -> Result<Value, RuntimeError> {
        let inherited = self
            .heap
            .fetch_field(supertype, TYPE_FIXED_FIELDS)?
            .as_index()?;
        let (nil, metaclass) = (self.special.nil, self.special.metaclass);
        let ty = new_type(
            &mut self.heap,
            nil,
            metaclass,
            supertype,
            inherited + fields,
            format,
        )?;
        let tables = self.tables();
        let symbol = name_type(&mut self.heap, &tables, &self.special, ty, name)?;
        tables.at_put(&mut self.heap, self.special.globals, GLOBALS, symbol, ty)?;
        log::debug!("defined type {name} ({} fields)", inherited + fields);
        Ok(ty)
    }

    // ── Methods ────────────────────────────────────────────────────

    fn literal_value(&mut self, literal: Literal<'_>) -> Result<Value, RuntimeError> {
        Ok(match literal {
            Literal::Int(n) => Value::try_from_i64(n)?,
            Literal::Symbol(name) => self.intern(name)?,
            Literal::String(text) => self.new_string(text)?,
            Literal::Value(v) => v,
            Literal::Nil => self.special.nil,
            Literal::True => self.special.true_obj,
            Literal::False => self.special.false_obj,
        })
    }

    /// Build a CompiledMethod. Opcodes are checked by decoding them once.
    pub fn compile_method(&mut self, spec: &MethodSpec<'_>) -> Result<Value, RuntimeError> {
        if spec.literals.len() > u8::MAX as usize + 1 {
            return Err(RuntimeError::InvalidMethod("more than 256 literals"));
        }
        let has_body = matches!(spec.header.kind, MethodKind::Bytecodes | MethodKind::Primitive);
        if has_body && spec.opcodes.is_empty() {
            return Err(RuntimeError::InvalidMethod("method has no bytecode body"));
        }
        if spec.header.temporaries < spec.header.arguments && has_body {
            return Err(RuntimeError::InvalidMethod("fewer temporaries than arguments"));
        }
        for instruction in BytecodeDecoder::new(&spec.opcodes) {
            instruction?;
        }

        let nil = self.special.nil;
        let method = self.heap.allocate_fields(
            Space::Ephemeral,
            self.special.compiled_method,
            METHOD_LITERALS + spec.literals.len(),
            nil,
        )?;
        let selector = self.intern(spec.selector)?;
        let opcodes = self
            .heap
            .allocate_bytes_from(Space::Ephemeral, self.special.byte_array, &spec.opcodes)?;
        self.heap
            .store_field(method, METHOD_HEADER, spec.header.to_value())?;
        self.heap.store_field(method, METHOD_SELECTOR, selector)?;
        self.heap.store_field(method, METHOD_OPCODES, opcodes)?;
        for (i, literal) in spec.literals.iter().enumerate() {
            let value = self.literal_value(*literal)?;
            self.heap.store_field(method, METHOD_LITERALS + i, value)?;
        }
        Ok(method)
    }

    /// Enter `method` in `ty`'s method table under its selector.
    pub fn install_method(&mut self, ty: Value, method: Value) -> Result<(), RuntimeError> {
        let selector = self.heap.fetch_field(method, METHOD_SELECTOR)?;
        self.heap.store_field(method, METHOD_OWNER, ty)?;
        let tables = self.tables();
        tables.at_put(&mut self.heap, ty, METHOD_TABLE, selector, method)?;
        self.cache.flush();
        Ok(())
    }

    /// [`compile_method`](Self::compile_method) then
    /// [`install_method`](Self::install_method).
    pub fn define_method(&mut self, ty: Value, spec: &MethodSpec<'_>) -> Result<Value, RuntimeError> {
        let method = self.compile_method(spec)?;
        self.install_method(ty, method)?;
        log::trace!("installed {}>>{}", self.type_name(ty)?, spec.selector);
        Ok(method)
    }

    /// A method with no arguments whose body sends `selector` to
    /// `receiver` with `args` and returns the answer.
    pub(crate) fn trampoline(
        &mut self,
        receiver: Value,
        selector: &str,
        args: &[Value],
    ) -> Result<Value, RuntimeError> {
        if args.len() + 2 > u8::MAX as usize + 1 {
            return Err(RuntimeError::InvalidMethod("too many arguments"));
        }
        let argc = args.len() as u8;
        let mut code = BytecodeBuilder::new();
        for i in 0..=argc {
            code.push_literal(i);
        }
        code.send(argc + 1, argc);
        code.return_top();

        let mut literals = Vec::with_capacity(args.len() + 2);
        literals.push(Literal::Value(receiver));
        literals.extend(args.iter().map(|a| Literal::Value(*a)));
        literals.push(Literal::Symbol(selector));

        let spec = MethodSpec::new(selector, MethodHeader::bytecodes(0, 0), code.into_bytes())
            .with_literals(literals);
        self.compile_method(&spec)
    }

    /// Whether `value` is a Symbol.
    pub fn is_symbol(&self, value: Value) -> Result<bool, RuntimeError> {
        Ok(value.tag() == Tag::Bytes && self.heap.type_of(value)? == self.special.symbol)
    }
}
