//! Builtin-function table. Entries and their order must match
//! `gadc::compiler::BUILTINS` exactly (`Opcode::GetBuiltin`'s operand is
//! a plain index into this table, with no name lookup at runtime).

use crate::error::{ErrorKind, RuntimeError};
use crate::value::{Builtin, DictMap, Value};
use crate::vm::Vm;

pub static TABLE: &[Builtin] = &[
    Builtin { name: "len", func: len },
    Builtin { name: "print", func: print },
    Builtin { name: "println", func: println },
    Builtin { name: "type", func: type_of },
    Builtin { name: "append", func: append },
    Builtin { name: "keys", func: keys },
    Builtin { name: "values", func: values },
    Builtin { name: "copy", func: copy },
    Builtin { name: "sprintf", func: sprintf },
    Builtin { name: "error", func: error },
    Builtin { name: "stdin", func: stdin },
    Builtin { name: "stdout", func: stdout },
    Builtin { name: "stderr", func: stderr },
    Builtin { name: "Gosched", func: gosched },
    Builtin { name: "spawn", func: spawn },
];

fn wrong_arg_count(name: &str, want: &str, got: usize) -> RuntimeError {
    RuntimeError::new(ErrorKind::WrongArgCount, format!("{name}: want {want} argument(s), got {got}"))
}

fn len(_vm: &mut Vm, args: &[Value]) -> Result<Value, RuntimeError> {
    if args.len() != 1 {
        return Err(wrong_arg_count("len", "1", args.len()));
    }
    let n = match &args[0] {
        Value::Str(s) | Value::RawStr(s) => s.chars().count(),
        Value::Bytes(b) => b.len(),
        Value::Array(a) => a.borrow().len(),
        Value::Dict(d) => d.borrow().len(),
        Value::SyncDict(d) => d.lock().unwrap().len(),
        other => {
            return Err(RuntimeError::new(
                ErrorKind::Type,
                format!("len: {} has no length", other.type_name()),
            ));
        }
    };
    Ok(Value::Int(n as i64))
}

fn print(vm: &mut Vm, args: &[Value]) -> Result<Value, RuntimeError> {
    let joined = args.iter().map(|v| v.display_string()).collect::<Vec<_>>().join(" ");
    vm.write_stdout(&joined);
    Ok(Value::Nil)
}

fn println(vm: &mut Vm, args: &[Value]) -> Result<Value, RuntimeError> {
    let joined = args.iter().map(|v| v.display_string()).collect::<Vec<_>>().join(" ");
    vm.write_stdout(&joined);
    vm.write_stdout("\n");
    Ok(Value::Nil)
}

fn type_of(_vm: &mut Vm, args: &[Value]) -> Result<Value, RuntimeError> {
    if args.len() != 1 {
        return Err(wrong_arg_count("type", "1", args.len()));
    }
    Ok(Value::str(args[0].type_name()))
}

/// Returns a new array with `args[1..]` appended after `args[0]`'s
/// elements, matching the lineage convention that `append` does not
/// mutate its receiver in place.
fn append(_vm: &mut Vm, args: &[Value]) -> Result<Value, RuntimeError> {
    let Some((first, rest)) = args.split_first() else {
        return Err(wrong_arg_count("append", "at least 1", args.len()));
    };
    let Value::Array(arr) = first else {
        return Err(RuntimeError::new(ErrorKind::Type, format!("append: {} is not an array", first.type_name())));
    };
    let mut out = arr.borrow().clone();
    out.extend_from_slice(rest);
    Ok(Value::array(out))
}

fn keys(_vm: &mut Vm, args: &[Value]) -> Result<Value, RuntimeError> {
    if args.len() != 1 {
        return Err(wrong_arg_count("keys", "1", args.len()));
    }
    match &args[0] {
        Value::Dict(d) => Ok(Value::array(d.borrow().keys().map(|k| Value::str(k.as_str())).collect())),
        Value::SyncDict(d) => Ok(Value::array(d.lock().unwrap().keys().map(|k| Value::str(k.as_str())).collect())),
        other => Err(RuntimeError::new(ErrorKind::Type, format!("keys: {} is not a map", other.type_name()))),
    }
}

fn values(_vm: &mut Vm, args: &[Value]) -> Result<Value, RuntimeError> {
    if args.len() != 1 {
        return Err(wrong_arg_count("values", "1", args.len()));
    }
    match &args[0] {
        Value::Dict(d) => Ok(Value::array(d.borrow().values().cloned().collect())),
        Value::SyncDict(d) => Ok(Value::array(d.lock().unwrap().values().cloned().collect())),
        other => Err(RuntimeError::new(ErrorKind::Type, format!("values: {} is not a map", other.type_name()))),
    }
}

/// A shallow copy: array/dict contents are cloned one level deep, nested
/// containers keep sharing their inner `Rc`s (matching `append`'s
/// no-deep-clone convention above).
fn copy(_vm: &mut Vm, args: &[Value]) -> Result<Value, RuntimeError> {
    if args.len() != 1 {
        return Err(wrong_arg_count("copy", "1", args.len()));
    }
    match &args[0] {
        Value::Array(a) => Ok(Value::array(a.borrow().clone())),
        Value::Dict(d) => Ok(Value::dict(d.borrow().clone())),
        other => Ok(other.clone()),
    }
}

/// A small, dependency-free subset of `%`-style formatting: `%s` (display
/// form), `%d` (integer), `%v` (display form, same as `%s`), `%%` (a
/// literal percent). Anything else is copied through unchanged.
fn sprintf(_vm: &mut Vm, args: &[Value]) -> Result<Value, RuntimeError> {
    let Some((fmt, rest)) = args.split_first() else {
        return Err(wrong_arg_count("sprintf", "at least 1", args.len()));
    };
    let Value::Str(fmt) | Value::RawStr(fmt) = fmt else {
        return Err(RuntimeError::new(ErrorKind::Type, "sprintf: format is not a string".to_string()));
    };
    let mut out = String::new();
    let mut arg_idx = 0;
    let mut chars = fmt.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '%' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('%') => out.push('%'),
            Some('s') | Some('v') | Some('d') => {
                let Some(arg) = rest.get(arg_idx) else {
                    return Err(RuntimeError::new(ErrorKind::WrongArgCount, "sprintf: not enough arguments".to_string()));
                };
                out.push_str(&arg.display_string());
                arg_idx += 1;
            }
            Some(other) => {
                out.push('%');
                out.push(other);
            }
            None => out.push('%'),
        }
    }
    Ok(Value::str(out))
}

/// Constructs a user error value (`ErrorKind::User`), the runtime
/// counterpart of script code writing `throw error("message")`.
fn error(_vm: &mut Vm, args: &[Value]) -> Result<Value, RuntimeError> {
    if args.is_empty() || args.len() > 2 {
        return Err(wrong_arg_count("error", "1 or 2", args.len()));
    }
    let message = args[0].display_string();
    let mut value = crate::error::ErrorValue::new(ErrorKind::User, message);
    if let Some(cause) = args.get(1) {
        value = value.with_cause(cause.clone());
    }
    Ok(Value::Error(std::rc::Rc::new(value)))
}

fn stdin(vm: &mut Vm, _args: &[Value]) -> Result<Value, RuntimeError> {
    Ok(Value::Reader(vm.stdin_handle()))
}

fn stdout(vm: &mut Vm, _args: &[Value]) -> Result<Value, RuntimeError> {
    Ok(Value::Writer(vm.stdout_handle()))
}

fn stderr(vm: &mut Vm, _args: &[Value]) -> Result<Value, RuntimeError> {
    Ok(Value::Writer(vm.stderr_handle()))
}

/// Parks the current fiber so others get a turn (spec.md §5's cooperative
/// scheduling model).
fn gosched(vm: &mut Vm, args: &[Value]) -> Result<Value, RuntimeError> {
    if !args.is_empty() {
        return Err(wrong_arg_count("Gosched", "0", args.len()));
    }
    vm.check_abort()?;
    crate::fiber::yield_now();
    Ok(Value::Nil)
}

/// Starts `args[0]` (a zero-argument callable) running in its own fiber,
/// sharing this VM's globals, module cache, and abort flag (spec.md §5).
/// Fire-and-forget: the new fiber's result is not observable from the
/// spawning script.
fn spawn(vm: &mut Vm, args: &[Value]) -> Result<Value, RuntimeError> {
    if args.len() != 1 {
        return Err(wrong_arg_count("spawn", "1", args.len()));
    }
    let closure = args[0].clone();
    if !closure.is_callable() {
        return Err(RuntimeError::new(
            ErrorKind::Type,
            format!("spawn: {} is not callable", closure.type_name()),
        ));
    }
    let abort = vm.abort_flag();
    crate::fiber::spawn(vm, closure, abort);
    Ok(Value::Nil)
}

#[allow(dead_code)]
fn empty_dict() -> Value {
    Value::dict(DictMap::new())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_matches_compiler_builtins_positionally() {
        let names: Vec<&str> = TABLE.iter().map(|b| b.name).collect();
        assert_eq!(names, gadc::compiler::BUILTINS.to_vec());
    }

    #[test]
    fn sprintf_substitutes_in_order() {
        let mut vm = Vm::for_test();
        let result = sprintf(&mut vm, &[Value::str("%s is %d"), Value::str("n"), Value::Int(3)]).unwrap();
        assert_eq!(result.display_string(), "n is 3");
    }

    #[test]
    fn append_does_not_mutate_receiver() {
        let mut vm = Vm::for_test();
        let arr = Value::array(vec![Value::Int(1)]);
        let result = append(&mut vm, &[arr.clone(), Value::Int(2)]).unwrap();
        assert_eq!(result.display_string(), "[1, 2]");
        assert_eq!(arr.display_string(), "[1]");
    }

    #[test]
    fn len_rejects_non_sized_value() {
        let mut vm = Vm::for_test();
        assert!(len(&mut vm, &[Value::Int(1)]).is_err());
    }

    #[test]
    fn spawn_rejects_non_callable_argument() {
        let mut vm = Vm::for_test();
        assert!(spawn(&mut vm, &[Value::Int(1)]).is_err());
    }
}
