//! One call's activation record. Locals are boxed from the moment a frame
//! is created (`Vec<Cell>`, not a shared stack window) so `Opcode::Closure`
//! can capture a running function's live local straight off this vector
//! without the compiler having to mark in advance which locals ever get
//! captured (`CompiledFunction` carries no such metadata).

use crate::value::{Cell, Value};
use gad_core::{CompiledFunction, Constant, SourceMap};
use std::rc::Rc;
use std::sync::Arc;

/// A `try` region currently active on this frame's call stack, pushed when
/// execution enters a `SetupTry`-guarded block and popped on normal exit
/// or once its catch/finally has run. `stack_depth` is the operand stack's
/// height at entry, restored before jumping to `catch_pc` so a throw mid
/// expression doesn't leave partial operands behind.
#[derive(Debug, Clone)]
pub struct ActiveTry {
    pub catch_pc: u32,
    pub finally_pc: u32,
    pub catch_local: Option<u16>,
    pub stack_depth: usize,
}

/// An unwind in progress through a `finally` block: the value a `return`
/// or `throw` inside the guarded body wants to propagate once `EndFinally`
/// resumes it, unless the `finally` block itself returns or throws first
/// and overrides it.
#[derive(Debug, Clone)]
pub enum Pending {
    Return(Value),
    Throw(Value),
}

/// Everything about a compiled unit that every frame running code from it
/// needs, besides the function body itself: its constant pool (`PushConst`/
/// `Closure`/`Import` all index into this) and its global-scope name list
/// (used to translate `GetGlobal`/`SetGlobal`'s index operand into a key on
/// the VM's single shared `Globals` dict, spec.md §4.7). Every ordinary
/// call shares its caller's linkage; only `Import` swaps in a new one.
pub struct ModuleLinkage {
    pub constants: Vec<Constant>,
    pub global_names: Vec<String>,
    /// The source this unit was compiled from, kept alongside it so a
    /// thrown error's trace can render positions from whichever module
    /// (main program or an imported one) raised it, even once execution
    /// has returned to a caller compiled against a different map.
    pub source_map: Rc<SourceMap>,
}

pub struct Frame {
    pub func: Arc<CompiledFunction>,
    pub ip: usize,
    pub locals: Vec<Cell>,
    pub free: Rc<Vec<Cell>>,
    pub active_trys: Vec<ActiveTry>,
    pub pending: Option<Pending>,
    pub module: Rc<ModuleLinkage>,
}

impl Frame {
    pub fn new(func: Arc<CompiledFunction>, locals: Vec<Cell>, free: Rc<Vec<Cell>>, module: Rc<ModuleLinkage>) -> Self {
        Frame {
            func,
            ip: 0,
            locals,
            free,
            active_trys: Vec::new(),
            pending: None,
            module,
        }
    }

    pub fn name(&self) -> Option<&str> {
        self.func.name.as_deref()
    }

    /// The innermost `try` region that guards the current `ip`, if any,
    /// matching `CompiledFunction::try_region_at`'s innermost-wins rule.
    pub fn try_region_at_ip(&self) -> Option<&gad_core::TryRegion> {
        self.func.try_region_at(self.ip as u32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gad_core::ParamSpec;
    use std::cell::RefCell;

    fn make_func() -> Arc<CompiledFunction> {
        Arc::new(CompiledFunction::new(ParamSpec::default()))
    }

    fn empty_module() -> Rc<ModuleLinkage> {
        Rc::new(ModuleLinkage {
            constants: Vec::new(),
            global_names: Vec::new(),
            source_map: Rc::new(SourceMap::new()),
        })
    }

    #[test]
    fn new_frame_starts_at_zero_with_no_active_trys() {
        let frame = Frame::new(make_func(), Vec::new(), Rc::new(Vec::new()), empty_module());
        assert_eq!(frame.ip, 0);
        assert!(frame.active_trys.is_empty());
        assert!(frame.pending.is_none());
    }

    #[test]
    fn locals_are_independently_mutable_cells() {
        let locals = vec![Rc::new(RefCell::new(Value::Int(1))), Rc::new(RefCell::new(Value::Int(2)))];
        let frame = Frame::new(make_func(), locals, Rc::new(Vec::new()), empty_module());
        *frame.locals[0].borrow_mut() = Value::Int(9);
        assert!(matches!(*frame.locals[0].borrow(), Value::Int(9)));
        assert!(matches!(*frame.locals[1].borrow(), Value::Int(2)));
    }
}
