//! The dynamic value model every Gad expression evaluates to, per
//! spec.md §3's "Runtime value" closed variant set.
//!
//! `Writer`/`Reader` cover the standard-stream literals (`stdin`,
//! `stdout`, `stderr`) the compiler resolves as builtins; `Buffer`,
//! `ReflectValue`, `BuiltinObjectType` and user-declared struct types
//! from spec.md §3 have no constructing syntax anywhere in this
//! compiler's AST (no struct declarations, no reflection builtins) and
//! are left out; see DESIGN.md.

use crate::decimal::Decimal;
use crate::error::ErrorValue;
use crate::frame::ModuleLinkage;
use gad_core::CompiledFunction;
use indexmap::IndexMap;
use std::cell::RefCell;
use std::fmt;
use std::io::{BufRead, Write};
use std::rc::Rc;
use std::sync::{Arc, Mutex};

/// A boxed mutable location shared between an owning frame and any
/// closures that captured it (spec.md §9 "mutable shared cells").
pub type Cell = Rc<RefCell<Value>>;

pub type ArrayRef = Rc<RefCell<Vec<Value>>>;
pub type DictMap = IndexMap<String, Value>;
pub type DictRef = Rc<RefCell<DictMap>>;
pub type SyncDictRef = Arc<Mutex<DictMap>>;

/// A host function exposed to scripts via `Opcode::GetBuiltin`. Takes the
/// already-bound positional arguments (variadic gathering, named-arg
/// binding etc. all happen before a builtin ever sees its arguments,
/// same as any other callable per the calling convention in spec.md
/// §4.7) and returns a value or a `RuntimeError`.
pub type BuiltinFn = fn(&mut crate::vm::Vm, &[Value]) -> Result<Value, crate::error::RuntimeError>;

#[derive(Clone)]
pub struct Builtin {
    pub name: &'static str,
    pub func: BuiltinFn,
}

impl fmt::Debug for Builtin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<builtin {}>", self.name)
    }
}

#[derive(Clone)]
pub struct Closure {
    pub func: Arc<CompiledFunction>,
    pub free: Rc<Vec<Cell>>,
    /// The unit this closure was compiled under. A call site only shares
    /// its *caller's* linkage for a bare `CompiledFunction` constant; a
    /// `Closure` carries its own, since it can be handed across an
    /// `import` boundary and called from a module whose constant pool and
    /// global-name table are entirely different (spec.md §4.7).
    pub module: Rc<ModuleLinkage>,
}

impl fmt::Debug for Closure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<closure {}>", self.func.name.as_deref().unwrap_or("anonymous"))
    }
}

pub trait ValueIterator {
    /// Advances the iterator; returns `false` once exhausted. Must be
    /// idempotent once it has returned `false`.
    fn advance(&mut self) -> bool;
    fn key(&self) -> Value;
    fn current(&self) -> Value;
    /// Idempotent per spec.md §9.
    fn close(&mut self) {}
}

#[derive(Clone)]
pub struct IteratorHandle(pub Rc<RefCell<dyn ValueIterator>>);

impl fmt::Debug for IteratorHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<iterator>")
    }
}

#[derive(Clone)]
pub struct Writer(pub Rc<RefCell<dyn Write>>);

impl fmt::Debug for Writer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<writer>")
    }
}

#[derive(Clone)]
pub struct Reader(pub Rc<RefCell<dyn BufRead>>);

impl fmt::Debug for Reader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<reader>")
    }
}

#[derive(Debug, Clone)]
pub enum Value {
    Nil,
    Bool(bool),
    Flag(bool),
    Int(i64),
    Uint(u64),
    Float(f64),
    Decimal(Decimal),
    Char(char),
    Str(Rc<str>),
    RawStr(Rc<str>),
    Bytes(Rc<Vec<u8>>),
    Array(ArrayRef),
    Dict(DictRef),
    SyncDict(SyncDictRef),
    Iterator(IteratorHandle),
    Builtin(Builtin),
    CompiledFunction(Arc<CompiledFunction>),
    Closure(Closure),
    Error(Rc<ErrorValue>),
    Writer(Writer),
    Reader(Reader),
    /// A mutable cell holding another value, for host code that needs a
    /// shared mutable box without a full closure (spec.md §3 `ObjectPtr`).
    ObjectPtr(Cell),
}

impl Value {
    pub fn str(s: impl Into<Rc<str>>) -> Value {
        Value::Str(s.into())
    }

    pub fn array(values: Vec<Value>) -> Value {
        Value::Array(Rc::new(RefCell::new(values)))
    }

    pub fn dict(map: DictMap) -> Value {
        Value::Dict(Rc::new(RefCell::new(map)))
    }

    /// The name `type(x)` reports, per spec.md's value-taxonomy naming.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Nil => "nil",
            Value::Bool(_) => "bool",
            Value::Flag(_) => "flag",
            Value::Int(_) => "int",
            Value::Uint(_) => "uint",
            Value::Float(_) => "float",
            Value::Decimal(_) => "decimal",
            Value::Char(_) => "char",
            Value::Str(_) => "string",
            Value::RawStr(_) => "string",
            Value::Bytes(_) => "bytes",
            Value::Array(_) => "array",
            Value::Dict(_) => "map",
            Value::SyncDict(_) => "syncMap",
            Value::Iterator(_) => "iterator",
            Value::Builtin(_) => "builtin-function",
            Value::CompiledFunction(_) => "compiled-function",
            Value::Closure(_) => "compiled-function",
            Value::Error(_) => "error",
            Value::Writer(_) => "writer",
            Value::Reader(_) => "reader",
            Value::ObjectPtr(_) => "objectPtr",
        }
    }

    /// Per spec.md §9/this language's lineage convention: nil, false
    /// flags/bools, zero numerics, and empty collections are falsy;
    /// everything else (including functions, errors, iterators) is
    /// truthy.
    pub fn is_falsy(&self) -> bool {
        match self {
            Value::Nil => true,
            Value::Bool(b) | Value::Flag(b) => !b,
            Value::Int(n) => *n == 0,
            Value::Uint(n) => *n == 0,
            Value::Float(f) => *f == 0.0,
            Value::Decimal(d) => d.is_zero(),
            Value::Char(c) => *c == '\0',
            Value::Str(s) | Value::RawStr(s) => s.is_empty(),
            Value::Bytes(b) => b.is_empty(),
            Value::Array(a) => a.borrow().is_empty(),
            Value::Dict(d) => d.borrow().is_empty(),
            Value::SyncDict(d) => d.lock().unwrap().is_empty(),
            _ => false,
        }
    }

    pub fn is_nil(&self) -> bool {
        matches!(self, Value::Nil)
    }

    pub fn is_callable(&self) -> bool {
        matches!(self, Value::Builtin(_) | Value::CompiledFunction(_) | Value::Closure(_))
    }

    /// Cycle-safe value equality (spec.md §9): arrays/dicts compare
    /// pointer-identity first so a self-referential container compares
    /// equal to itself without infinite recursion.
    pub fn value_eq(&self, other: &Value) -> bool {
        eq_with_visited(self, other, &mut Vec::new())
    }

    /// Cycle-safe stringification used by string interpolation, `~~`,
    /// and `print`/`sprintf`. A container that contains itself renders
    /// `[...]`/`{...}` for the cyclic slot instead of recursing forever.
    pub fn display_string(&self) -> String {
        let mut out = String::new();
        write_display(self, &mut out, &mut Vec::new());
        out
    }
}

fn numeric_as_f64(v: &Value) -> Option<f64> {
    match v {
        Value::Int(n) => Some(*n as f64),
        Value::Uint(n) => Some(*n as f64),
        Value::Float(f) => Some(*f),
        Value::Decimal(d) => Some(d.to_f64()),
        _ => None,
    }
}

fn eq_with_visited(a: &Value, b: &Value, visited: &mut Vec<(*const (), *const ())>) -> bool {
    match (a, b) {
        (Value::Nil, Value::Nil) => true,
        (Value::Bool(x), Value::Bool(y)) => x == y,
        (Value::Flag(x), Value::Flag(y)) => x == y,
        (Value::Char(x), Value::Char(y)) => x == y,
        (Value::Str(x), Value::Str(y))
        | (Value::RawStr(x), Value::RawStr(y))
        | (Value::Str(x), Value::RawStr(y))
        | (Value::RawStr(x), Value::Str(y)) => x == y,
        (Value::Bytes(x), Value::Bytes(y)) => x == y,
        (Value::Array(x), Value::Array(y)) => {
            let xp = Rc::as_ptr(x) as *const ();
            let yp = Rc::as_ptr(y) as *const ();
            if xp == yp || visited.contains(&(xp, yp)) {
                return true;
            }
            visited.push((xp, yp));
            let xb = x.borrow();
            let yb = y.borrow();
            xb.len() == yb.len() && xb.iter().zip(yb.iter()).all(|(a, b)| eq_with_visited(a, b, visited))
        }
        (Value::Dict(x), Value::Dict(y)) => {
            let xp = Rc::as_ptr(x) as *const ();
            let yp = Rc::as_ptr(y) as *const ();
            if xp == yp || visited.contains(&(xp, yp)) {
                return true;
            }
            visited.push((xp, yp));
            let xb = x.borrow();
            let yb = y.borrow();
            xb.len() == yb.len()
                && xb
                    .iter()
                    .all(|(k, v)| yb.get(k).is_some_and(|yv| eq_with_visited(v, yv, visited)))
        }
        (Value::Error(x), Value::Error(y)) => Rc::ptr_eq(x, y),
        _ => {
            if let (Some(x), Some(y)) = (numeric_as_f64(a), numeric_as_f64(b)) {
                x == y
            } else {
                false
            }
        }
    }
}

fn write_display(v: &Value, out: &mut String, visited: &mut Vec<*const ()>) {
    match v {
        Value::Nil => out.push_str("nil"),
        Value::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
        Value::Flag(b) => out.push_str(if *b { "yes" } else { "no" }),
        Value::Int(n) => out.push_str(&n.to_string()),
        Value::Uint(n) => out.push_str(&n.to_string()),
        Value::Float(f) => out.push_str(&f.to_string()),
        Value::Decimal(d) => out.push_str(&d.to_string()),
        Value::Char(c) => out.push(*c),
        Value::Str(s) | Value::RawStr(s) => out.push_str(s),
        Value::Bytes(b) => out.push_str(&format!("{b:?}")),
        Value::Array(a) => {
            let p = Rc::as_ptr(a) as *const ();
            if visited.contains(&p) {
                out.push_str("[...]");
                return;
            }
            visited.push(p);
            out.push('[');
            for (i, item) in a.borrow().iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                write_display(item, out, visited);
            }
            out.push(']');
            visited.pop();
        }
        Value::Dict(d) => {
            let p = Rc::as_ptr(d) as *const ();
            if visited.contains(&p) {
                out.push_str("{...}");
                return;
            }
            visited.push(p);
            out.push('{');
            for (i, (k, val)) in d.borrow().iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                out.push_str(k);
                out.push_str(": ");
                write_display(val, out, visited);
            }
            out.push('}');
            visited.pop();
        }
        Value::SyncDict(d) => {
            out.push('{');
            for (i, (k, val)) in d.lock().unwrap().iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                out.push_str(k);
                out.push_str(": ");
                write_display(val, out, visited);
            }
            out.push('}');
        }
        Value::Iterator(_) => out.push_str("<iterator>"),
        Value::Builtin(b) => out.push_str(&format!("<builtin {}>", b.name)),
        Value::CompiledFunction(f) | Value::Closure(Closure { func: f, .. }) => {
            out.push_str(&format!("<function {}>", f.name.as_deref().unwrap_or("anonymous")));
        }
        Value::Error(e) => out.push_str(&format!("error: {}", e.message)),
        Value::Writer(_) => out.push_str("<writer>"),
        Value::Reader(_) => out.push_str("<reader>"),
        Value::ObjectPtr(cell) => write_display(&cell.borrow(), out, visited),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn falsy_matches_lineage_convention() {
        assert!(Value::Nil.is_falsy());
        assert!(Value::Int(0).is_falsy());
        assert!(!Value::Int(1).is_falsy());
        assert!(Value::str("").is_falsy());
        assert!(!Value::str("a").is_falsy());
        assert!(Value::array(vec![]).is_falsy());
        assert!(!Value::array(vec![Value::Nil]).is_falsy());
    }

    #[test]
    fn self_referential_array_equals_itself() {
        let arr = Rc::new(RefCell::new(vec![Value::Int(1)]));
        let v = Value::Array(arr.clone());
        arr.borrow_mut().push(v.clone());
        assert!(v.value_eq(&v));
        assert_eq!(v.display_string(), "[1, [...]]");
    }

    #[test]
    fn numeric_cross_type_equality() {
        assert!(Value::Int(3).value_eq(&Value::Float(3.0)));
        assert!(!Value::Int(3).value_eq(&Value::Float(3.5)));
    }

    #[test]
    fn dict_display_preserves_insertion_order() {
        let mut map = DictMap::new();
        map.insert("b".to_string(), Value::Int(2));
        map.insert("a".to_string(), Value::Int(1));
        assert_eq!(Value::dict(map).display_string(), "{b: 2, a: 1}");
    }
}
