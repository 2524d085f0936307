//! The bytecode interpreter: a stack machine that dispatches
//! [`gad_core::Opcode`]s against a data stack and a stack of call
//! [`Frame`]s, per spec.md §4.7.
//!
//! Locals live off the data stack (boxed per [`Frame`], see `frame.rs`),
//! so `stack` here only ever holds expression temporaries, matching the
//! compiler's assumption that every opcode's stack effect is exactly what
//! `compiler.rs` emitted for it.

use crate::builtins;
use crate::decimal::Decimal;
use crate::error::{ErrorKind, RuntimeError, TraceFrame};
use crate::frame::{ActiveTry, Frame, ModuleLinkage, Pending};
use crate::iterator::{ArrayIter, BytesIter, DictIter, StrIter};
use crate::module::{ModuleCache, ModuleResolver, ModuleSource, ModuleState};
use crate::value::{Cell, Closure, DictMap, IteratorHandle, Reader, Value, ValueIterator, Writer};
use gad_core::{Constant, FreeVarSource, Opcode, SourceMap};
use std::cell::RefCell;
use std::io::{BufRead, Write};
use std::path::PathBuf;
use std::rc::Rc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Everything a spawned fiber shares with its parent: globals, module
/// cache, resolver, working directory, and standard streams. Each fiber
/// still gets its own data stack and call-frame stack (`Vm::stack` /
/// `Vm::frames`), matching spec.md §5's "each fiber owns its own stack
/// and call frames".
#[derive(Clone)]
pub struct SharedState {
    pub globals: Rc<RefCell<DictMap>>,
    pub module_cache: Rc<RefCell<ModuleCache>>,
    pub resolver: Rc<dyn ModuleResolver>,
    pub work_dir: PathBuf,
    pub stdout: Rc<RefCell<dyn Write>>,
    pub stderr: Rc<RefCell<dyn Write>>,
    pub stdin: Rc<RefCell<dyn BufRead>>,
}

pub struct Vm {
    stack: Vec<Value>,
    frames: Vec<Frame>,
    shared: SharedState,
    abort: Arc<AtomicBool>,
}

/// How many instructions run between abort-flag checks on a pure
/// straight-line path, on top of the sampling spec.md §4.7 requires at
/// every backward jump, call, and iterator step.
const ABORT_CHECK_INTERVAL: u32 = 4096;

impl Vm {
    pub fn new(work_dir: PathBuf, resolver: Rc<dyn ModuleResolver>) -> Self {
        Vm {
            stack: Vec::new(),
            frames: Vec::new(),
            shared: SharedState {
                globals: Rc::new(RefCell::new(DictMap::new())),
                module_cache: Rc::new(RefCell::new(ModuleCache::new())),
                resolver,
                work_dir,
                stdout: Rc::new(RefCell::new(std::io::stdout())),
                stderr: Rc::new(RefCell::new(std::io::stderr())),
                stdin: Rc::new(RefCell::new(std::io::BufReader::new(std::io::stdin()))),
            },
            abort: Arc::new(AtomicBool::new(false)),
        }
    }

    #[cfg(test)]
    pub fn for_test() -> Self {
        Vm::new(PathBuf::from("."), Rc::new(crate::module::FileSystemResolver::new()))
    }

    pub fn with_shared_state(shared: SharedState, abort: Arc<AtomicBool>) -> Self {
        Vm {
            stack: Vec::new(),
            frames: Vec::new(),
            shared,
            abort,
        }
    }

    pub fn shared_state(&self) -> SharedState {
        self.shared.clone()
    }

    pub fn abort_flag(&self) -> Arc<AtomicBool> {
        self.abort.clone()
    }

    pub fn abort(&self) {
        self.abort.store(true, Ordering::SeqCst);
    }

    pub fn check_abort(&self) -> Result<(), RuntimeError> {
        if self.abort.load(Ordering::Relaxed) {
            Err(RuntimeError::aborted())
        } else {
            Ok(())
        }
    }

    pub fn globals(&self) -> &Rc<RefCell<DictMap>> {
        &self.shared.globals
    }

    pub fn write_stdout(&self, s: &str) {
        let _ = self.shared.stdout.borrow_mut().write_all(s.as_bytes());
    }

    pub fn write_stderr(&self, s: &str) {
        let _ = self.shared.stderr.borrow_mut().write_all(s.as_bytes());
    }

    pub fn stdin_handle(&self) -> Reader {
        Reader(self.shared.stdin.clone())
    }

    pub fn stdout_handle(&self) -> Writer {
        Writer(self.shared.stdout.clone())
    }

    pub fn stderr_handle(&self) -> Writer {
        Writer(self.shared.stderr.clone())
    }

    /// Number of call frames currently live, for `.locals`/`.return`-style
    /// REPL introspection and for sizing stack traces.
    pub fn call_depth(&self) -> usize {
        self.frames.len()
    }

    fn push(&mut self, v: Value) {
        self.stack.push(v);
    }

    fn pop(&mut self) -> Value {
        self.stack.pop().expect("stack underflow: compiler emitted unbalanced bytecode")
    }

    fn frame(&mut self) -> &mut Frame {
        self.frames.last_mut().unwrap()
    }

    fn frame_module(&self) -> &ModuleLinkage {
        &self.frames.last().unwrap().module
    }

    fn current_module(&self) -> Rc<ModuleLinkage> {
        self.frames.last().map(|f| f.module.clone()).unwrap_or_else(|| {
            Rc::new(ModuleLinkage {
                constants: Vec::new(),
                global_names: Vec::new(),
                source_map: Rc::new(SourceMap::new()),
            })
        })
    }

    /// Runs one compiled unit (the top-level `main` function or an
    /// imported module's top-level) to completion, returning its final
    /// value (spec.md: "return outside of a function (top level is
    /// allowed, producing the module's return value)").
    pub fn run(
        &mut self,
        main: Arc<gad_core::CompiledFunction>,
        constants: Vec<Constant>,
        global_names: Vec<String>,
        source_map: SourceMap,
    ) -> Result<Value, RuntimeError> {
        let module = Rc::new(ModuleLinkage {
            constants,
            global_names,
            source_map: Rc::new(source_map),
        });
        self.ensure_globals(&module.global_names);
        let frame = Frame::new(main, Vec::new(), Rc::new(Vec::new()), module);
        self.frames.push(frame);
        let base_depth = self.frames.len() - 1;
        let result = self.dispatch(base_depth);
        self.frames.truncate(base_depth);
        result
    }

    fn ensure_globals(&mut self, names: &[String]) {
        let mut globals = self.shared.globals.borrow_mut();
        for name in names {
            globals.entry(name.clone()).or_insert(Value::Nil);
        }
    }

    /// Calls any callable [`Value`] with already-evaluated positional
    /// arguments (named arguments are not supported through this
    /// entrypoint: it exists for builtins like `spawn`'s fiber launch
    /// and for host embedding, not for compiled `Call` sites).
    pub fn call_value(&mut self, callee: Value, args: &[Value]) -> Result<Value, RuntimeError> {
        let base_depth = self.frames.len();
        self.push(callee);
        for a in args {
            self.push(a.clone());
        }
        self.invoke(args.len(), 0, false, false)?;
        if self.frames.len() == base_depth {
            // A builtin already returned directly; nothing was pushed as a frame.
            return Ok(self.pop());
        }
        let result = self.dispatch(base_depth);
        self.frames.truncate(base_depth);
        result
    }

    /// The main fetch-decode-execute loop. Runs until the frame at
    /// `base_depth` returns, producing its return value.
    fn dispatch(&mut self, base_depth: usize) -> Result<Value, RuntimeError> {
        let mut since_abort_check: u32 = 0;
        loop {
            since_abort_check += 1;
            if since_abort_check >= ABORT_CHECK_INTERVAL {
                since_abort_check = 0;
                self.check_abort()?;
            }

            let (op, ip) = {
                let frame = self.frames.last().unwrap();
                let ip = frame.ip;
                if ip >= frame.func.instructions.len() {
                    // Fell off the end without an explicit return.
                    if let Some(v) = self.finish_frame(base_depth, Value::Nil) {
                        return Ok(v);
                    }
                    continue;
                }
                let byte = frame.func.instructions[ip];
                let op = Opcode::from_u8(byte).expect("valid opcode byte");
                (op, ip)
            };
            let (operands, next_ip) = {
                let frame = self.frames.last().unwrap();
                gad_core::bytecode::read_operands(op, &frame.func.instructions, ip as u32 + 1)
            };
            self.frame().ip = next_ip as usize;

            match self.exec(op, &operands) {
                Ok(ControlFlow::Continue) => {}
                Ok(ControlFlow::Returned(value)) => {
                    if let Some(v) = self.finish_frame(base_depth, value) {
                        return Ok(v);
                    }
                }
                Err(err) => {
                    if let Some(result) = self.unwind(err, base_depth) {
                        return result;
                    }
                }
            }
        }
    }

    /// Pops the current frame, pushing its return value onto the caller's
    /// stack. Returns `Some(value)` once the frame at `base_depth` itself
    /// has returned (the dispatch loop's exit condition).
    fn finish_frame(&mut self, base_depth: usize, value: Value) -> Option<Value> {
        let finished_depth = self.frames.len() - 1;
        self.frames.pop();
        if finished_depth == base_depth {
            return Some(value);
        }
        self.push(value);
        None
    }

    /// Unwinds a thrown `RuntimeError` one region at a time: the
    /// innermost frame's active `try` (if any) absorbs it and execution
    /// resumes there (`Ok(None)`); otherwise the frame itself is popped
    /// and unwinding continues into the caller. Returns `Some(result)`
    /// once unwinding passes `base_depth`: the error (now carrying a
    /// trace) escapes this `dispatch` call entirely.
    ///
    /// A call-stack trace is built incrementally as frames are walked,
    /// since a frame popped here is gone for good by the time the error
    /// would otherwise finally get rendered.
    fn unwind(&mut self, err: RuntimeError, base_depth: usize) -> Option<Result<Value, RuntimeError>> {
        let mut trace = Vec::new();
        loop {
            let frame = self.frames.last().unwrap();
            let pc = frame.ip.saturating_sub(1) as u32;
            if let Some(pos) = frame.func.position_at(pc) {
                trace.push(TraceFrame {
                    position: frame.module.source_map.position(pos),
                    function: frame.name().map(|s| s.to_string()),
                });
            }

            if let Some(region) = self.frame().active_trys.pop() {
                self.stack.truncate(region.stack_depth);
                if region.catch_pc != region.finally_pc {
                    // A `catch` clause exists: its first instruction is a
                    // `SetLocal`/`Pop` for the bound name, so the thrown
                    // value must already be on the stack for it.
                    self.push(err.into_value());
                    self.frame().ip = region.catch_pc as usize;
                } else {
                    // No `catch`: stash the value and let `EndFinally`
                    // re-raise it once the `finally` block has run.
                    self.frame().pending = Some(Pending::Throw(err.into_value()));
                    self.frame().ip = region.finally_pc as usize;
                }
                return None;
            }

            let finished_depth = self.frames.len() - 1;
            self.frames.pop();
            if finished_depth == base_depth {
                let err = if trace.is_empty() { err } else { err.with_trace(trace) };
                return Some(Err(err));
            }
        }
    }

    fn exec(&mut self, op: Opcode, operands: &[u32]) -> Result<ControlFlow, RuntimeError> {
        use Opcode::*;
        match op {
            PushConst => {
                let idx = operands[0] as usize;
                let c = &self.frame_module().constants[idx];
                self.push(const_to_value(c));
            }
            PushNil => self.push(Value::Nil),
            PushTrue => self.push(Value::Bool(true)),
            PushFalse => self.push(Value::Bool(false)),
            Pop => {
                self.pop();
            }
            Dup => {
                let top = self.stack.last().unwrap().clone();
                self.push(top);
            }
            Add | Sub | Mul | Div | Rem | Pow | BitAnd | BitOr | BitXor | AndNot | Shl | Shr => {
                let b = self.pop();
                let a = self.pop();
                let result = crate::arithmetic::binary_numeric(op, a, b)?;
                self.push(result);
            }
            Equal => {
                let b = self.pop();
                let a = self.pop();
                self.push(Value::Bool(a.value_eq(&b)));
            }
            NotEqual => {
                let b = self.pop();
                let a = self.pop();
                self.push(Value::Bool(!a.value_eq(&b)));
            }
            Less | LessEq | Greater | GreaterEq => {
                let b = self.pop();
                let a = self.pop();
                self.push(Value::Bool(crate::arithmetic::compare(op, &a, &b)?));
            }
            LogicalNot => {
                let a = self.pop();
                self.push(Value::Bool(a.is_falsy()));
            }
            Negate => {
                let a = self.pop();
                self.push(self.negate(a)?);
            }
            NullCheck => {
                let a = self.pop();
                self.push(Value::Bool(a.is_nil()));
            }
            NotNullCheck => {
                let a = self.pop();
                self.push(Value::Bool(!a.is_nil()));
            }
            Default => {
                let b = self.pop();
                let a = self.pop();
                self.push(if a.is_nil() { b } else { a });
            }
            GetLocal => {
                let idx = operands[0] as usize;
                let v = self.frame().locals[idx].borrow().clone();
                self.push(v);
            }
            SetLocal | DefineLocal => {
                let idx = operands[0] as usize;
                let v = self.pop();
                *self.frame().locals[idx].borrow_mut() = v;
            }
            GetGlobal => {
                let idx = operands[0] as usize;
                let name = self.frame_module().global_names[idx].clone();
                let v = self.shared.globals.borrow().get(&name).cloned().unwrap_or(Value::Nil);
                self.push(v);
            }
            SetGlobal => {
                let idx = operands[0] as usize;
                let name = self.frame_module().global_names[idx].clone();
                let v = self.pop();
                self.shared.globals.borrow_mut().insert(name, v);
            }
            GetBuiltin => {
                let idx = operands[0] as usize;
                let b = &builtins::TABLE[idx];
                self.push(Value::Builtin(b.clone()));
            }
            GetFree => {
                let idx = operands[0] as usize;
                let v = self.frame().free[idx].borrow().clone();
                self.push(v);
            }
            SetFree => {
                let idx = operands[0] as usize;
                let v = self.pop();
                *self.frame().free[idx].borrow_mut() = v;
            }
            Jump => {
                self.frame().ip = operands[0] as usize;
            }
            JumpFalsy => {
                let v = self.pop();
                if v.is_falsy() {
                    self.frame().ip = operands[0] as usize;
                }
            }
            JumpTruthy => {
                let v = self.pop();
                if !v.is_falsy() {
                    self.frame().ip = operands[0] as usize;
                }
            }
            JumpNotNil => {
                let top = self.stack.last().unwrap();
                if !top.is_nil() {
                    self.frame().ip = operands[0] as usize;
                }
            }
            SetupTry => {
                let catch_pc = operands[0];
                let finally_pc = operands[1];
                let stack_depth = self.stack.len();
                self.frame().active_trys.push(ActiveTry {
                    catch_pc,
                    finally_pc,
                    catch_local: None,
                    stack_depth,
                });
            }
            PopTry => {
                self.frame().active_trys.pop();
            }
            Throw => {
                let v = self.pop();
                return Err(self.throw_value(v));
            }
            Return => {
                let v = self.pop();
                return Ok(ControlFlow::Returned(v));
            }
            ReturnNil => {
                return Ok(ControlFlow::Returned(Value::Nil));
            }
            Call => {
                let positional = operands[0] as usize;
                let named = operands[1] as usize;
                let has_spread = operands[2] & 1 != 0;
                let has_named_spread = operands[2] & 2 != 0;
                self.invoke(positional, named, has_spread, has_named_spread)?;
            }
            Closure => {
                let const_idx = operands[0] as usize;
                let func = match &self.frame_module().constants[const_idx] {
                    Constant::Function(f) => f.clone(),
                    _ => unreachable!("Closure operand must reference a constant function"),
                };
                // The compiler never pushes capture values onto the stack
                // before `Closure`: `func.free_vars` describes where each
                // free slot lives in *this* (enclosing) frame, and it is
                // resolved directly off that frame's locals/free cells.
                let captured = self.resolve_free_vars(&func.free_vars);
                let module = self.frames.last().unwrap().module.clone();
                self.push(Value::Closure(Closure { func, free: Rc::new(captured), module }));
            }
            Import => {
                let const_idx = operands[0] as usize;
                let name = match &self.frame_module().constants[const_idx] {
                    Constant::Str(s) => s.clone(),
                    _ => unreachable!("Import operand must reference a constant string"),
                };
                let value = self.import_module(&name)?;
                self.push(value);
            }
            Array => {
                let n = operands[0] as usize;
                let start = self.stack.len() - n;
                let elements = self.stack.split_off(start);
                self.push(Value::array(elements));
            }
            Dict => {
                let n = operands[0] as usize;
                let start = self.stack.len() - n * 2;
                let pairs = self.stack.split_off(start);
                let mut map = DictMap::new();
                for chunk in pairs.chunks(2) {
                    let key = chunk[0].display_string();
                    map.insert(key, chunk[1].clone());
                }
                self.push(Value::dict(map));
            }
            Slice => {
                let high = self.pop();
                let low = self.pop();
                let target = self.pop();
                self.push(self.slice(target, low, high)?);
            }
            Index => {
                let index = self.pop();
                let target = self.pop();
                self.push(self.index(target, index)?);
            }
            Selector => {
                let const_idx = operands[0] as usize;
                let field = match &self.frame_module().constants[const_idx] {
                    Constant::Str(s) => s.clone(),
                    _ => unreachable!(),
                };
                let target = self.pop();
                self.push(self.index(target, Value::str(field))?);
            }
            NullishSelector => {
                let const_idx = operands[0] as usize;
                let field = match &self.frame_module().constants[const_idx] {
                    Constant::Str(s) => s.clone(),
                    _ => unreachable!(),
                };
                let target = self.pop();
                if target.is_nil() {
                    self.push(Value::Nil);
                } else {
                    self.push(self.index(target, Value::str(field))?);
                }
            }
            SetIndex => {
                let value = self.pop();
                let index = self.pop();
                let target = self.pop();
                self.set_index(target, index, value)?;
            }
            MakeIterator => {
                let v = self.pop();
                self.push(self.make_iterator(v)?);
            }
            IterNext => {
                let Value::Iterator(handle) = self.stack.last().unwrap().clone() else {
                    return Err(RuntimeError::new(ErrorKind::NotIterable, "IterNext on a non-iterator"));
                };
                let advanced = handle.0.borrow_mut().advance();
                self.push(Value::Bool(advanced));
            }
            IterKey => {
                let Value::Iterator(handle) = self.stack.last().unwrap().clone() else {
                    return Err(RuntimeError::new(ErrorKind::NotIterable, "IterKey on a non-iterator"));
                };
                let k = handle.0.borrow().key();
                self.push(k);
            }
            IterValue => {
                let Value::Iterator(handle) = self.stack.last().unwrap().clone() else {
                    return Err(RuntimeError::new(ErrorKind::NotIterable, "IterValue on a non-iterator"));
                };
                let v = handle.0.borrow().current();
                self.push(v);
            }
            IterClose => {
                let Value::Iterator(handle) = self.pop() else {
                    return Err(RuntimeError::new(ErrorKind::NotIterable, "IterClose on a non-iterator"));
                };
                handle.0.borrow_mut().close();
            }
            Concat => {
                let b = self.pop();
                let a = self.pop();
                self.push(Value::str(format!("{}{}", a.display_string(), b.display_string())));
            }
            SetPendingReturn => {
                // This try's own region is done being "tried": an
                // exception raised while its `finally` runs must only be
                // catchable by an *outer* try, never this one's own
                // `catch` (compiler.rs's `compile_try`/`Stmt::Return`).
                let v = self.pop();
                self.frame().pending = Some(Pending::Return(v));
                self.frame().active_trys.pop();
            }
            EndFinally => {
                return self.end_finally();
            }
        }
        Ok(ControlFlow::Continue)
    }

    /// Resolves what a `finally` block leaves pending once it finishes
    /// running. A pending `return` cascades outward one enclosing `try`
    /// at a time (each one's own region was already popped when this
    /// frame's `SetPendingReturn` ran for it), finalizing into an actual
    /// function return once no enclosing try remains. A pending `throw`
    /// (from an uncaught error in the guarded body, or a rethrow from the
    /// `finally` block replacing the original) simply re-raises, letting
    /// the ordinary `unwind` path decide whether an outer `catch` handles
    /// it.
    fn end_finally(&mut self) -> Result<ControlFlow, RuntimeError> {
        match self.frame().pending.take() {
            None => Ok(ControlFlow::Continue),
            Some(Pending::Return(v)) => {
                if let Some(region) = self.frame().active_trys.last().cloned() {
                    // An outer try still guards this point: keep the
                    // return pending and jump to its finally next.
                    self.frame().pending = Some(Pending::Return(v));
                    self.frame().ip = region.finally_pc as usize;
                    Ok(ControlFlow::Continue)
                } else {
                    Ok(ControlFlow::Returned(v))
                }
            }
            Some(Pending::Throw(v)) => Err(self.throw_value(v)),
        }
    }

    fn throw_value(&self, v: Value) -> RuntimeError {
        if let Value::Error(e) = &v {
            RuntimeError(e.clone())
        } else {
            RuntimeError::new(ErrorKind::User, v.display_string())
        }
    }

    fn resolve_free_vars(&self, sources: &[FreeVarSource]) -> Vec<Cell> {
        let frame = self.frames.last().unwrap();
        sources
            .iter()
            .map(|s| match s {
                FreeVarSource::ParentLocal(i) => frame.locals[*i as usize].clone(),
                FreeVarSource::ParentFree(i) => frame.free[*i as usize].clone(),
            })
            .collect()
    }

    // --- calling convention (spec.md §4.7) ------------------------------

    /// Pops, from the top of the stack downward: a `**dict` spread value if
    /// `has_named_spread`, then `named` (name, value) pairs, then
    /// `positional` positional values (the last one a spread sequence if
    /// `has_spread`), then the callable itself. Builds the new frame (or
    /// runs the builtin directly) per the callee's kind.
    fn invoke(
        &mut self,
        positional: usize,
        named: usize,
        has_spread: bool,
        has_named_spread: bool,
    ) -> Result<(), RuntimeError> {
        let spread_dict = if has_named_spread { Some(self.pop()) } else { None };

        let named_start = self.stack.len() - named * 2;
        let named_pairs = self.stack.split_off(named_start);
        let mut named_args: Vec<(String, Value)> = Vec::with_capacity(named);
        for chunk in named_pairs.chunks(2) {
            named_args.push((chunk[0].display_string(), chunk[1].clone()));
        }

        // Explicit `name=value` arguments win over same-named entries
        // coming from a `**dict` spread.
        if let Some(Value::Dict(d)) = spread_dict {
            for (k, v) in d.borrow().iter() {
                if !named_args.iter().any(|(n, _)| n == k) {
                    named_args.push((k.clone(), v.clone()));
                }
            }
        }

        let pos_start = self.stack.len() - positional;
        let mut pos_args = self.stack.split_off(pos_start);
        if has_spread {
            if let Some(last) = pos_args.pop() {
                match last {
                    Value::Array(a) => pos_args.extend(a.borrow().iter().cloned()),
                    other => pos_args.push(other),
                }
            }
        }

        let callee = self.pop();
        match callee {
            Value::Builtin(b) => {
                if !named_args.is_empty() {
                    return Err(RuntimeError::new(
                        ErrorKind::UnexpectedNamedArg,
                        format!("{}: builtins take no named arguments", b.name),
                    ));
                }
                let result = (b.func)(self, &pos_args)?;
                self.push(result);
                Ok(())
            }
            Value::CompiledFunction(func) => {
                let module = self.current_module();
                self.push_call_frame(func, Rc::new(Vec::new()), module, pos_args, named_args)
            }
            Value::Closure(c) => self.push_call_frame(c.func, c.free, c.module, pos_args, named_args),
            other => Err(RuntimeError::new(
                ErrorKind::NotCallable,
                format!("{} is not callable", other.type_name()),
            )),
        }
    }

    fn push_call_frame(
        &mut self,
        func: Arc<gad_core::CompiledFunction>,
        free: Rc<Vec<Cell>>,
        module: Rc<ModuleLinkage>,
        pos_args: Vec<Value>,
        named_args: Vec<(String, Value)>,
    ) -> Result<(), RuntimeError> {
        let params = &func.params;
        let min_positional = params.num_positional as usize;
        if (pos_args.len() < min_positional && !params.variadic_positional)
            || (pos_args.len() > min_positional && !params.variadic_positional)
        {
            return Err(RuntimeError::new(
                ErrorKind::WrongArgCount,
                format!(
                    "{}: want {} positional argument(s), got {}",
                    func.name.as_deref().unwrap_or("<anonymous>"),
                    min_positional,
                    pos_args.len()
                ),
            ));
        }

        let mut locals: Vec<Cell> = Vec::with_capacity(func.num_locals as usize);
        for i in 0..min_positional {
            locals.push(Rc::new(RefCell::new(pos_args.get(i).cloned().unwrap_or(Value::Nil))));
        }
        if params.variadic_positional {
            let rest = if pos_args.len() > min_positional {
                pos_args[min_positional..].to_vec()
            } else {
                Vec::new()
            };
            locals.push(Rc::new(RefCell::new(Value::array(rest))));
        }

        let mut remaining_named = named_args;
        for named_param in &params.named {
            if let Some(pos) = remaining_named.iter().position(|(n, _)| n == &named_param.name) {
                let (_, v) = remaining_named.remove(pos);
                locals.push(Rc::new(RefCell::new(v)));
            } else if let Some(default_fn) = &named_param.default {
                let v = self.run_default(default_fn.clone(), module.clone())?;
                locals.push(Rc::new(RefCell::new(v)));
            } else {
                locals.push(Rc::new(RefCell::new(Value::Bool(false))));
            }
        }
        if params.variadic_named {
            let mut kw = DictMap::new();
            for (n, v) in remaining_named.drain(..) {
                kw.insert(n, v);
            }
            locals.push(Rc::new(RefCell::new(Value::dict(kw))));
        } else if !remaining_named.is_empty() {
            let (name, _) = &remaining_named[0];
            return Err(RuntimeError::new(
                ErrorKind::UnexpectedNamedArg,
                format!("unexpected named argument `{name}`"),
            ));
        }

        while locals.len() < func.num_locals as usize {
            locals.push(Rc::new(RefCell::new(Value::Nil)));
        }

        self.frames.push(Frame::new(func, locals, free, module));
        Ok(())
    }

    /// Runs a named parameter's default-value thunk (a zero-arg
    /// `CompiledFunction` sharing its enclosing function's constant pool,
    /// per `compiler.rs`'s `compile_named_default`) to completion as a
    /// fully nested VM call.
    fn run_default(
        &mut self,
        func: Arc<gad_core::CompiledFunction>,
        module: Rc<ModuleLinkage>,
    ) -> Result<Value, RuntimeError> {
        let base_depth = self.frames.len();
        self.frames.push(Frame::new(func, Vec::new(), Rc::new(Vec::new()), module));
        self.dispatch(base_depth)
    }

    // --- imports ---------------------------------------------------------

    fn import_module(&mut self, name: &str) -> Result<Value, RuntimeError> {
        if let Some(state) = self.shared.module_cache.borrow().get(name) {
            match state {
                ModuleState::Done(v) => return Ok(v.clone()),
                ModuleState::InFlight => return Ok(Value::Nil),
                ModuleState::Failed(msg) => {
                    return Err(RuntimeError::new(ErrorKind::Type, format!("import {name}: {msg}")));
                }
            }
        }
        self.shared.module_cache.borrow_mut().mark_in_flight(name);
        let source = self.shared.resolver.resolve(&self.shared.work_dir.clone(), name).map_err(|e| {
            let err = RuntimeError::new(ErrorKind::Type, format!("import {name}: {e}"));
            self.shared.module_cache.borrow_mut().mark_failed(name, e.to_string());
            err
        })?;
        let exports = match source {
            ModuleSource::Exports(v) => v,
            ModuleSource::Source(bytes) => self.run_module_source(name, &bytes)?,
        };
        self.shared.module_cache.borrow_mut().mark_done(name, exports.clone());
        Ok(exports)
    }

    fn run_module_source(&mut self, name: &str, bytes: &[u8]) -> Result<Value, RuntimeError> {
        let mut map = SourceMap::new();
        let base = map.add_file(name, bytes.to_vec());
        let unit = gadc::compile(bytes, map.file(base).base(), &gadc::CompilerConfig::default())
            .map_err(|e| RuntimeError::new(ErrorKind::Type, format!("import {name}: {e}")))?;
        self.run(Arc::new(unit.main), unit.constants, unit.global_names, map)
    }

    // --- arithmetic / indexing / slicing / iteration --------------------

    fn negate(&self, a: Value) -> Result<Value, RuntimeError> {
        match a {
            Value::Int(n) => Ok(Value::Int(n.wrapping_neg())),
            Value::Uint(n) => Ok(Value::Int((n as i64).wrapping_neg())),
            Value::Float(f) => Ok(Value::Float(-f)),
            Value::Decimal(d) => Ok(Value::Decimal(d.neg())),
            other => Err(RuntimeError::new(ErrorKind::Type, format!("cannot negate {}", other.type_name()))),
        }
    }

    fn make_iterator(&self, v: Value) -> Result<Value, RuntimeError> {
        let it: Rc<RefCell<dyn ValueIterator>> = match v {
            Value::Array(a) => Rc::new(RefCell::new(ArrayIter::new(a))),
            Value::Dict(d) => Rc::new(RefCell::new(DictIter::new(d))),
            Value::Str(s) | Value::RawStr(s) => Rc::new(RefCell::new(StrIter::new(s))),
            Value::Bytes(b) => Rc::new(RefCell::new(BytesIter::new(b))),
            Value::Iterator(handle) => handle.0,
            other => {
                return Err(RuntimeError::new(
                    ErrorKind::NotIterable,
                    format!("{} is not iterable", other.type_name()),
                ));
            }
        };
        Ok(Value::Iterator(IteratorHandle(it)))
    }

    fn index(&self, target: Value, index: Value) -> Result<Value, RuntimeError> {
        match (&target, &index) {
            (Value::Array(a), Value::Int(_) | Value::Uint(_)) => {
                let i = as_index(&index)?;
                let arr = a.borrow();
                arr.get(i).cloned().ok_or_else(|| {
                    RuntimeError::new(ErrorKind::IndexOutOfBounds, format!("index {i} out of bounds (len {})", arr.len()))
                })
            }
            (Value::Bytes(b), Value::Int(_) | Value::Uint(_)) => {
                let i = as_index(&index)?;
                b.get(i)
                    .map(|v| Value::Uint(*v as u64))
                    .ok_or_else(|| RuntimeError::new(ErrorKind::IndexOutOfBounds, format!("index {i} out of bounds")))
            }
            (Value::Str(s) | Value::RawStr(s), Value::Int(_) | Value::Uint(_)) => {
                let i = as_index(&index)?;
                s.chars()
                    .nth(i)
                    .map(Value::Char)
                    .ok_or_else(|| RuntimeError::new(ErrorKind::IndexOutOfBounds, format!("index {i} out of bounds")))
            }
            (Value::Dict(d), Value::Str(k) | Value::RawStr(k)) => d
                .borrow()
                .get(k.as_ref())
                .cloned()
                .ok_or_else(|| RuntimeError::new(ErrorKind::KeyNotFound, format!("key not found: {k:?}"))),
            (Value::SyncDict(d), Value::Str(k) | Value::RawStr(k)) => d
                .lock()
                .unwrap()
                .get(k.as_ref())
                .cloned()
                .ok_or_else(|| RuntimeError::new(ErrorKind::KeyNotFound, format!("key not found: {k:?}"))),
            (Value::Array(_) | Value::Bytes(_) | Value::Str(_) | Value::RawStr(_), _) => {
                Err(RuntimeError::new(ErrorKind::InvalidIndexType, format!("invalid index type {}", index.type_name())))
            }
            (Value::Dict(_) | Value::SyncDict(_), _) => {
                Err(RuntimeError::new(ErrorKind::InvalidIndexType, format!("invalid index type {}", index.type_name())))
            }
            _ => Err(RuntimeError::new(ErrorKind::NotIndexable, format!("{} is not indexable", target.type_name()))),
        }
    }

    fn set_index(&self, target: Value, index: Value, value: Value) -> Result<(), RuntimeError> {
        match (&target, &index) {
            (Value::Array(a), Value::Int(_) | Value::Uint(_)) => {
                let i = as_index(&index)?;
                let mut arr = a.borrow_mut();
                if i >= arr.len() {
                    return Err(RuntimeError::new(ErrorKind::IndexOutOfBounds, format!("index {i} out of bounds")));
                }
                arr[i] = value;
                Ok(())
            }
            (Value::Dict(d), Value::Str(k) | Value::RawStr(k)) => {
                d.borrow_mut().insert(k.to_string(), value);
                Ok(())
            }
            (Value::SyncDict(d), Value::Str(k) | Value::RawStr(k)) => {
                d.lock().unwrap().insert(k.to_string(), value);
                Ok(())
            }
            _ => Err(RuntimeError::new(ErrorKind::NotIndexable, format!("{} is not assignable by index", target.type_name()))),
        }
    }

    fn slice(&self, target: Value, low: Value, high: Value) -> Result<Value, RuntimeError> {
        match target {
            Value::Array(a) => {
                let arr = a.borrow();
                let (lo, hi) = slice_bounds(&low, &high, arr.len())?;
                Ok(Value::array(arr[lo..hi].to_vec()))
            }
            Value::Str(s) | Value::RawStr(s) => {
                let chars: Vec<char> = s.chars().collect();
                let (lo, hi) = slice_bounds(&low, &high, chars.len())?;
                Ok(Value::str(chars[lo..hi].iter().collect::<String>()))
            }
            Value::Bytes(b) => {
                let (lo, hi) = slice_bounds(&low, &high, b.len())?;
                Ok(Value::Bytes(Rc::new(b[lo..hi].to_vec())))
            }
            other => Err(RuntimeError::new(ErrorKind::NotIndexable, format!("{} cannot be sliced", other.type_name()))),
        }
    }
}

enum ControlFlow {
    Continue,
    Returned(Value),
}

fn const_to_value(c: &Constant) -> Value {
    match c {
        Constant::Int(n) => Value::Int(*n),
        Constant::Uint(n) => Value::Uint(*n),
        Constant::Float(f) => Value::Float(*f),
        Constant::Decimal(m, s) => Value::Decimal(Decimal::new(*m, *s)),
        Constant::Str(s) => Value::str(s.as_str()),
        Constant::Bytes(b) => Value::Bytes(Rc::new(b.clone())),
        Constant::Function(f) => Value::CompiledFunction(f.clone()),
    }
}

fn as_index(v: &Value) -> Result<usize, RuntimeError> {
    match v {
        Value::Int(n) if *n >= 0 => Ok(*n as usize),
        Value::Int(n) => Err(RuntimeError::new(ErrorKind::IndexOutOfBounds, format!("negative index {n}"))),
        Value::Uint(n) => Ok(*n as usize),
        other => Err(RuntimeError::new(ErrorKind::InvalidIndexType, format!("invalid index type {}", other.type_name()))),
    }
}

fn slice_bounds(low: &Value, high: &Value, len: usize) -> Result<(usize, usize), RuntimeError> {
    let lo = if low.is_nil() { 0 } else { as_index(low)? };
    let hi = if high.is_nil() { len } else { as_index(high)? };
    if lo > hi || hi > len {
        return Err(RuntimeError::new(ErrorKind::IndexOutOfBounds, format!("slice [{lo}:{hi}] out of bounds (len {len})")));
    }
    Ok((lo, hi))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::module::FileSystemResolver;

    fn run_src(src: &str) -> Value {
        let mut map = SourceMap::new();
        let base = map.add_file("test.gad", src.as_bytes().to_vec());
        let unit = gadc::compile(src.as_bytes(), map.file(base).base(), &gadc::CompilerConfig::default())
            .unwrap_or_else(|e| panic!("compile error: {e}"));
        let mut vm = Vm::new(PathBuf::from("."), Rc::new(FileSystemResolver::new()));
        vm.run(Arc::new(unit.main), unit.constants, unit.global_names, map)
            .unwrap_or_else(|e| panic!("runtime error: {e}"))
    }

    #[test]
    fn arithmetic_end_to_end() {
        let v = run_src("return 1 + 2 * 3");
        assert!(matches!(v, Value::Int(7)));
    }

    #[test]
    fn closure_state_counter() {
        let v = run_src(
            "mkCounter := func() { n := 0; return func() { n = n + 1; return n } }\n\
             c := mkCounter()\n\
             return [c(), c(), c()]",
        );
        assert_eq!(v.display_string(), "[1, 2, 3]");
    }

    #[test]
    fn try_catch_finally_ordering() {
        let v = run_src(
            r#"r := ""
try { r = r + "t"; throw "x" } catch e { r = r + "c:" + e } finally { r = r + "f" }
return r"#,
        );
        assert_eq!(v.display_string(), "tc:xf");
    }

    #[test]
    fn return_inside_try_still_runs_finally() {
        let v = run_src(
            "f := func() { try { return 1 } finally { print(\"\") } return 2 }\n\
             return f()",
        );
        assert!(matches!(v, Value::Int(1)));
    }

    #[test]
    fn uncaught_throw_inside_try_still_runs_finally_then_propagates() {
        let mut map = SourceMap::new();
        let src = br#"try { throw "boom" } finally { }"#;
        let base = map.add_file("t.gad", src.to_vec());
        let unit = gadc::compile(src, map.file(base).base(), &gadc::CompilerConfig::default()).unwrap();
        let mut vm = Vm::new(PathBuf::from("."), Rc::new(FileSystemResolver::new()));
        let err = vm.run(Arc::new(unit.main), unit.constants, unit.global_names, map).unwrap_err();
        assert_eq!(err.0.kind, ErrorKind::User);
    }

    #[test]
    fn named_args_with_variadic() {
        let v = run_src(
            "f := func(a, *rest; k=1, **kw) { return [a, rest, k, kw] }\n\
             return f(10, 20, 30, k=5, m=6, n=7)",
        );
        assert_eq!(v.display_string(), "[10, [20, 30], 5, {m: 6, n: 7}]");
    }

    #[test]
    fn call_with_dict_spread_as_named_args() {
        let v = run_src(
            "f := func(a; k=1, **kw) { return [a, k, kw] }\n\
             opts := {k: 9, m: 2}\n\
             return f(10, **opts)",
        );
        assert_eq!(v.display_string(), "[10, 9, {m: 2}]");
    }

    #[test]
    fn explicit_named_arg_wins_over_dict_spread() {
        let v = run_src(
            "f := func(; k=1) { return k }\n\
             opts := {k: 9}\n\
             return f(k=3, **opts)",
        );
        assert!(matches!(v, Value::Int(3)));
    }

    #[test]
    fn division_by_zero_is_runtime_error_not_folded() {
        let mut map = SourceMap::new();
        let base = map.add_file("t.gad", b"return 1 / 0".to_vec());
        let unit = gadc::compile(b"return 1 / 0", map.file(base).base(), &gadc::CompilerConfig::default()).unwrap();
        let mut vm = Vm::new(PathBuf::from("."), Rc::new(FileSystemResolver::new()));
        let err = vm.run(Arc::new(unit.main), unit.constants, unit.global_names, map).unwrap_err();
        assert_eq!(err.0.kind, ErrorKind::DivisionByZero);
    }

    #[test]
    fn for_in_over_array_sums_elements() {
        let v = run_src("arr := [1, 2, 3]\nsum := 0\nfor _, x in arr { sum = sum + x }\nreturn sum");
        assert!(matches!(v, Value::Int(6)));
    }
}
