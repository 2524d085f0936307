//! Gad Core: shared source-map and bytecode primitives.
//!
//! Both `gad-compiler` (which emits bytecode) and `gad-runtime` (which
//! executes it) depend on this crate instead of on each other, so the
//! instruction vocabulary and source-position bookkeeping live in exactly
//! one place.

pub mod bytecode;
pub mod source;

pub use bytecode::{
    CompiledFunction, Constant, FreeVarSource, NamedParam, Opcode, OperandWidth, ParamSpec,
    TryRegion,
};
pub use source::{Pos, Position, SourceFile, SourceMap};
