//! Value model and stack-based virtual machine for the Gad embeddable
//! scripting language (spec.md §§3-5, 7, 9).
//!
//! `gad-core` owns the static shapes (bytecode, source positions); this
//! crate owns everything that exists only while a program runs: the
//! [`Value`] taxonomy, the [`Vm`] dispatch loop, the module cache and
//! resolver, and the fiber scheduler built on cooperative green threads.

pub mod arithmetic;
pub mod builtins;
pub mod decimal;
pub mod error;
pub mod fiber;
pub mod frame;
pub mod iterator;
pub mod module;
pub mod value;
pub mod vm;

pub use decimal::Decimal;
pub use error::{ErrorKind, ErrorValue, RuntimeError, TraceFrame};
pub use frame::ModuleLinkage;
pub use module::{BuiltinModuleResolver, FileSystemResolver, ModuleCache, ModuleResolver, ModuleSource, ResolveError};
pub use value::{Builtin, Cell, Closure, DictMap, Reader, Value, ValueIterator, Writer};
pub use vm::{SharedState, Vm};
