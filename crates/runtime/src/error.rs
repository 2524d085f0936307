//! Runtime error taxonomy, per spec.md §7.
//!
//! Runtime errors are first-class script values: an [`ErrorValue`] carries
//! a `kind`, a `message`, an optional `cause` chain, and a captured
//! stack-trace (one [`TraceFrame`] per call frame live at throw time).
//! [`RuntimeError`] is the Rust-side `std::error::Error` the VM's opcode
//! dispatch loop returns internally; it is turned into a catchable
//! `Value::Error` the moment it crosses a `try`/`catch` boundary, and into
//! the user-visible rendered trace (spec.md §7's
//! `<kind>: <message>\n  at <file>:<line>:<column>\n    ...` format) if it
//! escapes the program entirely.

use crate::value::Value;
use gad_core::{Position, SourceMap};
use std::fmt;
use std::rc::Rc;

/// spec.md §7's closed error-kind taxonomy. `User` covers values thrown
/// explicitly by script code (`throw expr`); `Aborted` is raised by
/// `Abort()` and, uniquely, is re-thrown even out of a matching `catch`
/// while the abort flag remains set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Type,
    IndexOutOfBounds,
    InvalidIndexType,
    WrongArgCount,
    UnexpectedNamedArg,
    DivisionByZero,
    NotCallable,
    NotIndexable,
    NotIterable,
    KeyNotFound,
    User,
    Aborted,
}

impl ErrorKind {
    pub fn label(&self) -> &'static str {
        match self {
            ErrorKind::Type => "TypeError",
            ErrorKind::IndexOutOfBounds => "IndexOutOfBoundsError",
            ErrorKind::InvalidIndexType => "InvalidIndexTypeError",
            ErrorKind::WrongArgCount => "WrongArgCountError",
            ErrorKind::UnexpectedNamedArg => "UnexpectedNamedArgError",
            ErrorKind::DivisionByZero => "DivisionByZeroError",
            ErrorKind::NotCallable => "NotCallableError",
            ErrorKind::NotIndexable => "NotIndexableError",
            ErrorKind::NotIterable => "NotIterableError",
            ErrorKind::KeyNotFound => "KeyNotFoundError",
            ErrorKind::User => "UserError",
            ErrorKind::Aborted => "AbortedError",
        }
    }
}

/// One call frame's contribution to a captured stack-trace: the source
/// position of the instruction pointer at throw time, plus the enclosing
/// function's name (`None` for the top-level unit).
#[derive(Debug, Clone)]
pub struct TraceFrame {
    pub position: Position,
    pub function: Option<String>,
}

/// The script-visible error value (the `error` type spec.md §3 lists in
/// the runtime value taxonomy). `cause` is boxed rather than `Rc`-shared
/// since a cause chain is a simple linked list walked in one direction,
/// never re-shared.
#[derive(Debug, Clone)]
pub struct ErrorValue {
    pub kind: ErrorKind,
    pub message: String,
    pub cause: Option<Box<Value>>,
    pub trace: Vec<TraceFrame>,
}

impl ErrorValue {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        ErrorValue {
            kind,
            message: message.into(),
            cause: None,
            trace: Vec::new(),
        }
    }

    pub fn with_cause(mut self, cause: Value) -> Self {
        self.cause = Some(Box::new(cause));
        self
    }

    /// Renders the spec.md §7 user-visible format: the kind/message line
    /// followed by one `  at file:line:column` + source excerpt block per
    /// captured trace frame, innermost first.
    pub fn render(&self, map: &SourceMap) -> String {
        let mut out = format!("{}: {}\n", self.kind.label(), self.message);
        for frame in &self.trace {
            let file = map.file(frame.position.file).name();
            out.push_str(&format!("  at {file}:{frame_pos}\n", frame_pos = frame.position));
            out.push_str(&indent(&map.render_trace(frame.position, 0)));
        }
        out
    }
}

fn indent(text: &str) -> String {
    text.lines().map(|l| format!("    {l}\n")).collect()
}

impl fmt::Display for ErrorValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind.label(), self.message)
    }
}

/// The Rust-side error the VM's dispatch loop returns internally before an
/// in-flight `try`/`catch` (or the top-level driver) turns it into a
/// `Value::Error` or a rendered trace. Cloneable so a pending unwind can be
/// stashed on a frame without giving up ownership of the original.
#[derive(Debug, Clone)]
pub struct RuntimeError(pub Rc<ErrorValue>);

impl RuntimeError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        RuntimeError(Rc::new(ErrorValue::new(kind, message)))
    }

    pub fn aborted() -> Self {
        RuntimeError::new(ErrorKind::Aborted, "aborted")
    }

    pub fn is_aborted(&self) -> bool {
        self.0.kind == ErrorKind::Aborted
    }

    /// Attaches a captured call-stack trace, innermost frame first.
    pub fn with_trace(self, trace: Vec<TraceFrame>) -> Self {
        let mut inner = (*self.0).clone();
        inner.trace = trace;
        RuntimeError(Rc::new(inner))
    }

    pub fn into_value(self) -> Value {
        Value::Error(self.0)
    }
}

impl fmt::Display for RuntimeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for RuntimeError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn label_matches_kind() {
        assert_eq!(ErrorKind::DivisionByZero.label(), "DivisionByZeroError");
        assert_eq!(ErrorKind::Aborted.label(), "AbortedError");
    }

    #[test]
    fn aborted_error_is_recognized() {
        let err = RuntimeError::aborted();
        assert!(err.is_aborted());
        assert!(!RuntimeError::new(ErrorKind::Type, "nope").is_aborted());
    }

    #[test]
    fn display_matches_kind_and_message() {
        let err = RuntimeError::new(ErrorKind::KeyNotFound, "no such key: \"x\"");
        assert_eq!(err.to_string(), "KeyNotFoundError: no such key: \"x\"");
    }

    #[test]
    fn render_includes_trace_frames() {
        let mut map = SourceMap::new();
        map.add_file("a.gad", b"x[10]\n".to_vec());
        let pos = map.position(1);
        let err = ErrorValue::new(ErrorKind::IndexOutOfBounds, "index 10 out of bounds").with_cause(Value::Nil);
        let err = ErrorValue {
            trace: vec![TraceFrame {
                position: pos,
                function: Some("main".to_string()),
            }],
            ..err
        };
        let rendered = err.render(&map);
        assert!(rendered.starts_with("IndexOutOfBoundsError: index 10 out of bounds\n"));
        assert!(rendered.contains("at a.gad:1:2"));
    }
}
