//! Bytecode interpreter, message sends, and the cooperative scheduler.
//!
//! [`Interpreter::new`] bootstraps a heap with the minimal class graph and
//! the kernel methods. Embedders add types and methods (bodies built with
//! [`bytecode::BytecodeBuilder`]) and run them with
//! [`Interpreter::execute`] or [`Interpreter::send_message`].

pub mod config;
pub mod demos;
pub mod error;
pub mod input;
pub mod primitives;
pub mod selectors;

mod context;
mod dictionary;
mod handles;
mod interpreter;
mod kernel;
mod method;
mod scheduler;
mod send;
mod special;

pub use config::VMCreateInfo;
pub use error::RuntimeError;
pub use handles::RootId;
pub use input::InputFeed;
pub use interpreter::Interpreter;
pub use method::{Literal, MethodSpec};
pub use primitives::{PrimitiveDesc, PrimitiveFn};
