//! Bytecode compiler: walks the (optimized) AST and emits
//! [`gad_core::bytecode`] instructions into a stack of compilation
//! scopes, one per function body being compiled.

use crate::ast::*;
use crate::symbol::{ScopeKind, SymbolTable};
use gad_core::bytecode::{emit, patch_u32};
use gad_core::{
    CompiledFunction, Constant, FreeVarSource, NamedParam, Opcode, ParamSpec, Pos, TryRegion,
};
use std::sync::Arc;

#[derive(Debug, Clone, thiserror::Error)]
#[error("compile error at {pos}: {message}")]
pub struct CompileError {
    pub pos: Pos,
    pub message: String,
}

/// One function body's in-progress instruction buffer plus the
/// back-patch bookkeeping (loop break/continue targets, try regions)
/// needed while compiling it.
struct CompilationScope {
    instructions: Vec<u8>,
    positions: Vec<(u32, Pos)>,
    break_targets: Vec<Vec<u32>>,
    continue_targets: Vec<Vec<u32>>,
    /// One entry per try statement currently being compiled (innermost
    /// last); collects the offsets of `Jump` operands emitted by a
    /// `return` inside that try's body/catch, back-patched to the try's
    /// `finally_pc` once known. A `return` inside the finally block
    /// itself targets the next-enclosing entry, since this try's own
    /// entry is popped before the finally is compiled.
    return_in_try_targets: Vec<Vec<u32>>,
    try_regions: Vec<TryRegion>,
    num_locals: u16,
}

impl CompilationScope {
    fn new() -> Self {
        CompilationScope {
            instructions: Vec::new(),
            positions: Vec::new(),
            break_targets: Vec::new(),
            continue_targets: Vec::new(),
            return_in_try_targets: Vec::new(),
            try_regions: Vec::new(),
            num_locals: 0,
        }
    }

    fn emit(&mut self, pos: Pos, op: Opcode, operands: &[u32]) -> u32 {
        let at = emit(&mut self.instructions, op, operands);
        self.positions.push((at, pos));
        at
    }

    fn len(&self) -> u32 {
        self.instructions.len() as u32
    }
}

/// Builtin function names resolved as `Opcode::GetBuiltin` rather than as
/// ordinary global lookups; the standard streams live here too, since
/// the VM treats them as pre-bound builtin values rather than a
/// dedicated opcode. Order matters: `gad_runtime::builtins::TABLE` is
/// indexed positionally by the same list, since `GetBuiltin`'s operand is
/// this slice's index rather than the name.
pub const BUILTINS: &[&str] = &[
    "len", "print", "println", "type", "append", "keys", "values", "copy", "sprintf", "error",
    "stdin", "stdout", "stderr", "Gosched", "spawn",
];

pub struct Compiler {
    scopes: Vec<CompilationScope>,
    symbols: SymbolTable,
    constants: Vec<Constant>,
}

impl Compiler {
    pub fn new() -> Self {
        let mut symbols = SymbolTable::new();
        for (i, name) in BUILTINS.iter().enumerate() {
            symbols.define_builtin(i as u16, name);
        }
        Compiler {
            scopes: vec![CompilationScope::new()],
            symbols,
            constants: Vec::new(),
        }
    }

    /// Like [`Compiler::new`], but pre-declares `names` as global-scope
    /// symbols before any statement is compiled. The host (`gad-cli`)
    /// uses this to expose the CLI's `Args`/`NamedArgs` values (spec.md
    /// §6) as ordinary global identifiers a script can reference without
    /// first assigning to them.
    pub fn with_predefined_globals(names: &[String]) -> Self {
        let mut compiler = Compiler::new();
        for name in names {
            compiler.symbols.define(name);
        }
        compiler
    }

    fn scope(&mut self) -> &mut CompilationScope {
        self.scopes.last_mut().unwrap()
    }

    fn add_constant(&mut self, c: Constant) -> u32 {
        self.constants.push(c);
        (self.constants.len() - 1) as u32
    }

    pub fn compile_program(
        mut self,
        program: &Program,
    ) -> Result<(CompiledFunction, Vec<Constant>, Vec<String>), CompileError> {
        for stmt in &program.statements {
            self.compile_stmt(stmt)?;
        }
        self.scope().emit(0, Opcode::ReturnNil, &[]);
        let scope = self.scopes.pop().unwrap();
        let mut main = CompiledFunction::new(ParamSpec::default());
        main.name = Some("<main>".to_string());
        main.instructions = scope.instructions;
        main.positions = scope.positions;
        main.num_locals = scope.num_locals;
        main.try_regions = scope.try_regions;
        let global_names = self.symbols.global_names();
        Ok((main, self.constants, global_names))
    }

    fn enter_function(&mut self) {
        self.scopes.push(CompilationScope::new());
        self.symbols.enter_function_scope();
    }

    fn leave_function(&mut self) -> (CompilationScope, Vec<FreeVarSource>) {
        let free_syms = self.symbols.free_symbols().to_vec();
        self.symbols.leave_scope();
        let scope = self.scopes.pop().unwrap();
        let free_sources = free_syms
            .iter()
            .map(|sym| match sym.scope {
                ScopeKind::Local => FreeVarSource::ParentLocal(sym.index),
                ScopeKind::Free => FreeVarSource::ParentFree(sym.index),
                _ => FreeVarSource::ParentLocal(sym.index),
            })
            .collect();
        (scope, free_sources)
    }

    // --- statements -----------------------------------------------------

    fn compile_stmt(&mut self, stmt: &Stmt) -> Result<(), CompileError> {
        match stmt {
            Stmt::Expr(e) => {
                self.compile_expr(e)?;
                self.scope().emit(e.pos(), Opcode::Pop, &[]);
            }
            Stmt::VarDecl { pos, names, values } | Stmt::ConstDecl { pos, names, values } => {
                if values.is_empty() {
                    for name in names {
                        self.scope().emit(*pos, Opcode::PushNil, &[]);
                        self.define_and_store(*pos, name);
                    }
                } else {
                    for (i, name) in names.iter().enumerate() {
                        if let Some(v) = values.get(i) {
                            self.compile_expr(v)?;
                        } else {
                            self.scope().emit(*pos, Opcode::PushNil, &[]);
                        }
                        self.define_and_store(*pos, name);
                    }
                }
            }
            Stmt::ParamDecl { pos, names, .. } => {
                for name in names {
                    let sym = self.symbols.define(name);
                    self.scope().num_locals = self.scope().num_locals.max(sym.index + 1);
                }
            }
            Stmt::GlobalDecl { .. } => {
                // Names resolve against the shared global scope lazily on
                // first reference; no bytecode is emitted here.
            }
            Stmt::Assign {
                pos,
                target,
                op,
                value,
            } => self.compile_assign_stmt(*pos, target, *op, value)?,
            Stmt::Return { pos, value } => {
                let in_try = !self.scope().return_in_try_targets.is_empty();
                if in_try {
                    // A return inside a protected try body/catch must run
                    // the enclosing finally first: stash the value as this
                    // frame's pending action and jump there instead of
                    // returning directly. `EndFinally` resolves it (or
                    // cascades further out) once the finally completes.
                    match value {
                        Some(v) => self.compile_expr(v)?,
                        None => {
                            self.scope().emit(*pos, Opcode::PushNil, &[]);
                        }
                    }
                    self.scope().emit(*pos, Opcode::SetPendingReturn, &[]);
                    let jump = self.scope().emit(*pos, Opcode::Jump, &[0]);
                    let depth = self.scope().return_in_try_targets.len();
                    self.scope().return_in_try_targets[depth - 1].push(jump + 1);
                } else if let Some(v) = value {
                    self.compile_expr(v)?;
                    self.scope().emit(*pos, Opcode::Return, &[]);
                } else {
                    self.scope().emit(*pos, Opcode::ReturnNil, &[]);
                }
            }
            Stmt::If {
                pos,
                cond,
                then_block,
                else_block,
            } => self.compile_if(*pos, cond, then_block, else_block.as_ref())?,
            Stmt::For { pos, kind, body } => self.compile_for(*pos, kind, body)?,
            Stmt::Break { pos } => {
                let depth = self.scope().break_targets.len();
                if depth == 0 {
                    return Err(CompileError {
                        pos: *pos,
                        message: "break outside loop".to_string(),
                    });
                }
                let jump = self.scope().emit(*pos, Opcode::Jump, &[0]);
                self.scope().break_targets[depth - 1].push(jump + 1);
            }
            Stmt::Continue { pos } => {
                let depth = self.scope().continue_targets.len();
                if depth == 0 {
                    return Err(CompileError {
                        pos: *pos,
                        message: "continue outside loop".to_string(),
                    });
                }
                let jump = self.scope().emit(*pos, Opcode::Jump, &[0]);
                self.scope().continue_targets[depth - 1].push(jump + 1);
            }
            Stmt::Try {
                pos,
                body,
                catch,
                finally,
            } => self.compile_try(*pos, body, catch.as_ref(), finally.as_ref())?,
            Stmt::Throw { pos, value } => {
                self.compile_expr(value)?;
                self.scope().emit(*pos, Opcode::Throw, &[]);
            }
            Stmt::Import { pos, alias, path } => {
                let const_idx = self.add_constant(Constant::Str(path.clone()));
                self.scope().emit(*pos, Opcode::Import, &[const_idx]);
                if let Some(name) = alias {
                    self.define_and_store(*pos, name);
                } else {
                    self.scope().emit(*pos, Opcode::Pop, &[]);
                }
            }
            Stmt::Block(b) => self.compile_block_stmts(b)?,
        }
        Ok(())
    }

    fn define_and_store(&mut self, pos: Pos, name: &str) {
        let sym = self.symbols.define(name);
        self.bind_slot(pos, &sym);
    }

    /// Emits the store instruction matching where `define`/`resolve`
    /// placed `sym`; assumes the value to store is already on top of the
    /// stack, and consumes it (the Set* opcodes never leave a value
    /// behind, callers that need the stored value to remain use `Dup`
    /// before calling this).
    fn bind_slot(&mut self, pos: Pos, sym: &crate::symbol::Symbol) {
        match sym.scope {
            ScopeKind::Global => {
                self.scope()
                    .emit(pos, Opcode::SetGlobal, &[sym.index as u32]);
            }
            ScopeKind::Local => {
                let idx = sym.index as u32;
                self.scope().num_locals = self.scope().num_locals.max(sym.index + 1);
                self.scope().emit(pos, Opcode::SetLocal, &[idx]);
            }
            ScopeKind::Free => {
                self.scope().emit(pos, Opcode::SetFree, &[sym.index as u32]);
            }
            ScopeKind::Builtin => unreachable!("builtins are never assignment targets"),
        }
    }

    fn compile_block_stmts(&mut self, block: &Block) -> Result<(), CompileError> {
        self.symbols.enter_block_scope();
        for s in &block.statements {
            self.compile_stmt(s)?;
        }
        self.symbols.leave_scope();
        Ok(())
    }

    fn compile_if(
        &mut self,
        pos: Pos,
        cond: &Expr,
        then_block: &Block,
        else_block: Option<&Block>,
    ) -> Result<(), CompileError> {
        self.compile_expr(cond)?;
        let jump_over_then = self.scope().emit(pos, Opcode::JumpFalsy, &[0]);
        self.compile_block_stmts(then_block)?;
        let jump_over_else = self.scope().emit(pos, Opcode::Jump, &[0]);
        let else_start = self.scope().len();
        patch_u32(&mut self.scope().instructions, jump_over_then + 1, else_start);
        if let Some(b) = else_block {
            self.compile_block_stmts(b)?;
        }
        let after = self.scope().len();
        patch_u32(&mut self.scope().instructions, jump_over_else + 1, after);
        Ok(())
    }

    fn compile_for(&mut self, pos: Pos, kind: &ForKind, body: &Block) -> Result<(), CompileError> {
        self.symbols.enter_block_scope();
        self.scope().break_targets.push(Vec::new());
        self.scope().continue_targets.push(Vec::new());

        // Every arm is responsible for making `continue` land on the
        // right place (loop_start for infinite/while/range, the post
        // clause for classic for).
        match kind {
            ForKind::Infinite => {
                let loop_start = self.scope().len();
                self.patch_continues_to(loop_start);
                self.compile_block_stmts(body)?;
                self.scope().emit(pos, Opcode::Jump, &[loop_start]);
            }
            ForKind::While { cond } => {
                let loop_start = self.scope().len();
                self.patch_continues_to(loop_start);
                self.compile_expr(cond)?;
                let exit_jump = self.scope().emit(pos, Opcode::JumpFalsy, &[0]);
                self.compile_block_stmts(body)?;
                self.scope().emit(pos, Opcode::Jump, &[loop_start]);
                let after = self.scope().len();
                patch_u32(&mut self.scope().instructions, exit_jump + 1, after);
            }
            ForKind::Classic { init, cond, post } => {
                if let Some(init) = init {
                    self.compile_stmt(init)?;
                }
                let loop_start = self.scope().len();
                let exit_jump = if let Some(cond) = cond {
                    self.compile_expr(cond)?;
                    Some(self.scope().emit(pos, Opcode::JumpFalsy, &[0]))
                } else {
                    None
                };
                self.compile_block_stmts(body)?;
                let continue_target = self.scope().len();
                self.patch_continues_to(continue_target);
                if let Some(post) = post {
                    self.compile_stmt(post)?;
                }
                self.scope().emit(pos, Opcode::Jump, &[loop_start]);
                let after = self.scope().len();
                if let Some(j) = exit_jump {
                    patch_u32(&mut self.scope().instructions, j + 1, after);
                }
            }
            ForKind::Range {
                key,
                value,
                iterable,
                else_block,
            } => {
                self.compile_expr(iterable)?;
                self.scope().emit(pos, Opcode::MakeIterator, &[]);
                self.scope().emit(pos, Opcode::IterNext, &[]);
                let first_falsy = self.scope().emit(pos, Opcode::JumpFalsy, &[0]);

                // Reached only once the first `IterNext` came back true.
                let body_entry = self.scope().len();
                if let Some(k) = key {
                    self.scope().emit(pos, Opcode::IterKey, &[]);
                    self.define_and_store(pos, k);
                }
                self.scope().emit(pos, Opcode::IterValue, &[]);
                self.define_and_store(pos, value);
                self.compile_block_stmts(body)?;

                // `continue` re-enters here: advance the iterator and loop
                // back to `body_entry` if another element is available.
                let advance_pc = self.scope().len();
                self.patch_continues_to(advance_pc);
                self.scope().emit(pos, Opcode::IterNext, &[]);
                let loop_truthy = self.scope().emit(pos, Opcode::JumpTruthy, &[0]);
                patch_u32(&mut self.scope().instructions, loop_truthy + 1, body_entry);

                self.scope().emit(pos, Opcode::IterClose, &[]);
                let skip_else = self.scope().emit(pos, Opcode::Jump, &[0]);

                let zero_pc = self.scope().len();
                patch_u32(&mut self.scope().instructions, first_falsy + 1, zero_pc);
                if let Some(eb) = else_block {
                    self.compile_block_stmts(eb)?;
                }
                let after = self.scope().len();
                patch_u32(&mut self.scope().instructions, skip_else + 1, after);
            }
        }

        let loop_end = self.scope().len();
        let breaks = self.scope().break_targets.pop().unwrap();
        for offset in breaks {
            patch_u32(&mut self.scope().instructions, offset, loop_end);
        }
        self.scope().continue_targets.pop();
        self.symbols.leave_scope();
        Ok(())
    }

    fn patch_continues_to(&mut self, target: u32) {
        let depth = self.scope().continue_targets.len();
        if depth == 0 {
            return;
        }
        let pending = std::mem::take(&mut self.scope().continue_targets[depth - 1]);
        for offset in pending {
            patch_u32(&mut self.scope().instructions, offset, target);
        }
    }

    fn compile_try(
        &mut self,
        pos: Pos,
        body: &Block,
        catch: Option<&(Option<String>, Block)>,
        finally: Option<&Block>,
    ) -> Result<(), CompileError> {
        let setup = self.scope().emit(pos, Opcode::SetupTry, &[0, 0]);
        let try_start = self.scope().len();
        self.scope().return_in_try_targets.push(Vec::new());
        self.compile_block_stmts(body)?;
        self.scope().emit(pos, Opcode::PopTry, &[]);
        let jump_over_catch = self.scope().emit(pos, Opcode::Jump, &[0]);

        // `catch_pc` doubling as `finally_pc` below (no bytes emitted in
        // between) is how the VM tells "no catch clause" apart from "catch
        // clause present": a throw that matches this region jumps straight
        // to `finally_pc` with the value stashed as a pending re-throw
        // instead of being bound/popped by catch code that doesn't exist.
        let catch_pc = self.scope().len();
        let mut catch_local = None;
        if let Some((name, block)) = catch {
            self.symbols.enter_block_scope();
            if let Some(n) = name {
                let sym = self.symbols.define(n);
                self.scope().num_locals = self.scope().num_locals.max(sym.index + 1);
                self.scope().emit(pos, Opcode::SetLocal, &[sym.index as u32]);
                catch_local = Some(sym.index);
            } else {
                self.scope().emit(pos, Opcode::Pop, &[]);
            }
            for s in &block.statements {
                self.compile_stmt(s)?;
            }
            self.symbols.leave_scope();
        }
        let after_catch = self.scope().len();
        patch_u32(&mut self.scope().instructions, jump_over_catch + 1, after_catch);

        let finally_pc = self.scope().len();
        let pending_returns = self.scope().return_in_try_targets.pop().unwrap();
        for offset in pending_returns {
            patch_u32(&mut self.scope().instructions, offset, finally_pc);
        }
        if let Some(block) = finally {
            self.compile_block_stmts(block)?;
        }
        self.scope().emit(pos, Opcode::EndFinally, &[]);

        patch_u32(&mut self.scope().instructions, setup + 1, catch_pc);
        patch_u32(&mut self.scope().instructions, setup + 5, finally_pc);

        let try_end = self.scope().len();
        self.scope().try_regions.push(TryRegion {
            start_pc: try_start,
            end_pc: try_end,
            catch_pc,
            finally_pc,
            catch_local,
        });
        Ok(())
    }

    /// Statement-level assignment. Compound ops (`+=` etc.) are desugared
    /// into `target = target <op> value` at this level: the target
    /// sub-expression is evaluated twice (once to read, once to write),
    /// which is only observable if indexing/selector evaluation has side
    /// effects.
    fn compile_assign_stmt(
        &mut self,
        pos: Pos,
        target: &Expr,
        op: AssignOp,
        value: &Expr,
    ) -> Result<(), CompileError> {
        if matches!(op, AssignOp::Define) {
            if let Expr::Ident { name, .. } = target {
                self.compile_expr(value)?;
                self.define_and_store(pos, name);
                return Ok(());
            }
        }

        let effective_value: Expr = match op {
            AssignOp::Assign | AssignOp::Define => value.clone(),
            AssignOp::Land => Expr::Logical {
                pos,
                op: LogicalOp::And,
                lhs: Box::new(target.clone()),
                rhs: Box::new(value.clone()),
            },
            AssignOp::Lor => Expr::Logical {
                pos,
                op: LogicalOp::Or,
                lhs: Box::new(target.clone()),
                rhs: Box::new(value.clone()),
            },
            AssignOp::Nullich => Expr::Nullish {
                pos,
                lhs: Box::new(target.clone()),
                rhs: Box::new(value.clone()),
            },
            other => Expr::Binary {
                pos,
                op: assign_to_binary(other),
                lhs: Box::new(target.clone()),
                rhs: Box::new(value.clone()),
            },
        };

        match target {
            Expr::Ident { name, .. } => {
                self.compile_expr(&effective_value)?;
                let sym = self.symbols.resolve(name).ok_or_else(|| CompileError {
                    pos,
                    message: format!("undefined name `{name}`"),
                })?;
                self.bind_slot(pos, &sym);
            }
            Expr::Index { target: base, index, .. } => {
                self.compile_expr(base)?;
                self.compile_expr(index)?;
                self.compile_expr(&effective_value)?;
                self.scope().emit(pos, Opcode::SetIndex, &[]);
            }
            Expr::Selector { target: base, field, .. } => {
                self.compile_expr(base)?;
                let const_idx = self.add_constant(Constant::Str(field.clone()));
                self.scope().emit(pos, Opcode::PushConst, &[const_idx]);
                self.compile_expr(&effective_value)?;
                self.scope().emit(pos, Opcode::SetIndex, &[]);
            }
            _ => {
                return Err(CompileError {
                    pos,
                    message: "invalid assignment target".to_string(),
                });
            }
        }
        Ok(())
    }

    // --- expressions ------------------------------------------------

    fn compile_expr(&mut self, expr: &Expr) -> Result<(), CompileError> {
        match expr {
            Expr::IntLit { pos, value } => {
                let idx = self.add_constant(Constant::Int(*value));
                self.scope().emit(*pos, Opcode::PushConst, &[idx]);
            }
            Expr::UintLit { pos, value } => {
                let idx = self.add_constant(Constant::Uint(*value));
                self.scope().emit(*pos, Opcode::PushConst, &[idx]);
            }
            Expr::FloatLit { pos, value } => {
                let idx = self.add_constant(Constant::Float(*value));
                self.scope().emit(*pos, Opcode::PushConst, &[idx]);
            }
            Expr::DecimalLit { pos, mantissa, scale } => {
                let idx = self.add_constant(Constant::Decimal(*mantissa, *scale));
                self.scope().emit(*pos, Opcode::PushConst, &[idx]);
            }
            Expr::CharLit { pos, value } => {
                let idx = self.add_constant(Constant::Int(*value as i64));
                self.scope().emit(*pos, Opcode::PushConst, &[idx]);
            }
            Expr::BoolLit { pos, value } | Expr::FlagLit { pos, value } => {
                self.scope().emit(
                    *pos,
                    if *value { Opcode::PushTrue } else { Opcode::PushFalse },
                    &[],
                );
            }
            Expr::NilLit { pos } => {
                self.scope().emit(*pos, Opcode::PushNil, &[]);
            }
            Expr::StdStream { pos, stream } => {
                let name = match stream {
                    StdStream::Stdin => "stdin",
                    StdStream::Stdout => "stdout",
                    StdStream::Stderr => "stderr",
                };
                self.compile_ident(*pos, name)?;
            }
            Expr::StringLit { pos, parts, .. } => self.compile_string_parts(*pos, parts)?,
            Expr::ArrayLit { pos, elements } => {
                for e in elements {
                    self.compile_expr(e)?;
                }
                self.scope()
                    .emit(*pos, Opcode::Array, &[elements.len() as u32]);
            }
            Expr::DictLit { pos, entries } => {
                for (k, v) in entries {
                    self.compile_expr(k)?;
                    self.compile_expr(v)?;
                }
                self.scope()
                    .emit(*pos, Opcode::Dict, &[entries.len() as u32]);
            }
            Expr::Ident { pos, name } => self.compile_ident(*pos, name)?,
            Expr::Unary { pos, op, operand } => {
                self.compile_expr(operand)?;
                match op {
                    UnaryOp::Neg => {
                        self.scope().emit(*pos, Opcode::Negate, &[]);
                    }
                    UnaryOp::Not => {
                        self.scope().emit(*pos, Opcode::LogicalNot, &[]);
                    }
                    UnaryOp::BitNot => {
                        self.scope().emit(*pos, Opcode::Negate, &[]);
                        // bitwise complement modeled as part of the runtime's
                        // arithmetic dispatch on `Negate` for integer types;
                        // see gad-runtime::value for the per-type rules.
                    }
                    UnaryOp::Plus => {}
                }
            }
            Expr::Binary { pos, op, lhs, rhs } => {
                self.compile_expr(lhs)?;
                self.compile_expr(rhs)?;
                let opcode = binary_op_opcode(*op);
                self.scope().emit(*pos, opcode, &[]);
            }
            Expr::Logical { pos, op, lhs, rhs } => {
                self.compile_expr(lhs)?;
                self.scope().emit(*pos, Opcode::Dup, &[]);
                let short_circuit_on = match op {
                    LogicalOp::And => Opcode::JumpFalsy,
                    LogicalOp::Or => Opcode::JumpTruthy,
                };
                let jump = self.scope().emit(*pos, short_circuit_on, &[0]);
                self.scope().emit(*pos, Opcode::Pop, &[]);
                self.compile_expr(rhs)?;
                let after = self.scope().len();
                patch_u32(&mut self.scope().instructions, jump + 1, after);
            }
            Expr::Nullish { pos, lhs, rhs } => {
                self.compile_expr(lhs)?;
                self.scope().emit(*pos, Opcode::Dup, &[]);
                let jump = self.scope().emit(*pos, Opcode::JumpNotNil, &[0]);
                self.scope().emit(*pos, Opcode::Pop, &[]);
                self.compile_expr(rhs)?;
                let after = self.scope().len();
                patch_u32(&mut self.scope().instructions, jump + 1, after);
            }
            Expr::Ternary {
                pos,
                cond,
                then_expr,
                else_expr,
            } => {
                self.compile_expr(cond)?;
                let jump_over_then = self.scope().emit(*pos, Opcode::JumpFalsy, &[0]);
                self.compile_expr(then_expr)?;
                let jump_over_else = self.scope().emit(*pos, Opcode::Jump, &[0]);
                let else_start = self.scope().len();
                patch_u32(&mut self.scope().instructions, jump_over_then + 1, else_start);
                self.compile_expr(else_expr)?;
                let after = self.scope().len();
                patch_u32(&mut self.scope().instructions, jump_over_else + 1, after);
            }
            Expr::Index {
                pos,
                target,
                index,
                ..
            } => {
                self.compile_expr(target)?;
                self.compile_expr(index)?;
                self.scope().emit(*pos, Opcode::Index, &[]);
            }
            Expr::Slice {
                pos,
                target,
                low,
                high,
            } => {
                self.compile_expr(target)?;
                match low {
                    Some(e) => self.compile_expr(e)?,
                    None => {
                        self.scope().emit(*pos, Opcode::PushNil, &[]);
                    }
                }
                match high {
                    Some(e) => self.compile_expr(e)?,
                    None => {
                        self.scope().emit(*pos, Opcode::PushNil, &[]);
                    }
                }
                self.scope().emit(*pos, Opcode::Slice, &[]);
            }
            Expr::Selector {
                pos,
                target,
                field,
                optional,
            } => {
                self.compile_expr(target)?;
                let const_idx = self.add_constant(Constant::Str(field.clone()));
                self.scope().emit(
                    *pos,
                    if *optional { Opcode::NullishSelector } else { Opcode::Selector },
                    &[const_idx],
                );
            }
            Expr::Call {
                pos,
                callee,
                args,
                named_args,
                named_spread,
            } => self.compile_call(*pos, callee, args, named_args, named_spread.as_deref())?,
            Expr::Pipe { pos, lhs, rhs } => match &**rhs {
                Expr::Call {
                    callee,
                    args,
                    named_args,
                    named_spread,
                    ..
                } => {
                    let mut full_args = Vec::with_capacity(args.len() + 1);
                    full_args.push(Arg::Positional((**lhs).clone()));
                    full_args.extend(args.clone());
                    self.compile_call(*pos, callee, &full_args, named_args, named_spread.as_deref())?;
                }
                other => {
                    self.compile_call(*pos, other, &[Arg::Positional((**lhs).clone())], &[], None)?;
                }
            },
            Expr::PreIncDec { pos, op, target } => self.compile_inc_dec(*pos, *op, target, false)?,
            Expr::PostIncDec { pos, op, target } => self.compile_inc_dec(*pos, *op, target, true)?,
            Expr::Spread { value, .. } => self.compile_expr(value)?,
            Expr::FuncLit { pos, params, body } => self.compile_func_lit(*pos, params, body)?,
            Expr::ImmediateInvoke { pos, func, args } => {
                self.compile_call(*pos, func, args, &[], None)?;
            }
        }
        Ok(())
    }

    fn compile_ident(&mut self, pos: Pos, name: &str) -> Result<(), CompileError> {
        let sym = self.symbols.resolve(name).ok_or_else(|| CompileError {
            pos,
            message: format!("undefined name `{name}`"),
        })?;
        let opcode = match sym.scope {
            ScopeKind::Builtin => Opcode::GetBuiltin,
            ScopeKind::Global => Opcode::GetGlobal,
            ScopeKind::Local => Opcode::GetLocal,
            ScopeKind::Free => Opcode::GetFree,
        };
        self.scope().emit(pos, opcode, &[sym.index as u32]);
        Ok(())
    }

    fn compile_string_parts(&mut self, pos: Pos, parts: &[StringPart]) -> Result<(), CompileError> {
        if parts.len() == 1 {
            if let StringPart::Text(t) = &parts[0] {
                let idx = self.add_constant(Constant::Str(t.clone()));
                self.scope().emit(pos, Opcode::PushConst, &[idx]);
                return Ok(());
            }
        }
        if parts.is_empty() {
            let idx = self.add_constant(Constant::Str(String::new()));
            self.scope().emit(pos, Opcode::PushConst, &[idx]);
            return Ok(());
        }
        for (i, part) in parts.iter().enumerate() {
            match part {
                StringPart::Text(t) => {
                    let idx = self.add_constant(Constant::Str(t.clone()));
                    self.scope().emit(pos, Opcode::PushConst, &[idx]);
                }
                StringPart::Interp(e) => self.compile_expr(e)?,
            }
            if i > 0 {
                self.scope().emit(pos, Opcode::Concat, &[]);
            }
        }
        Ok(())
    }

    fn compile_call(
        &mut self,
        pos: Pos,
        callee: &Expr,
        args: &[Arg],
        named_args: &[(String, Expr)],
        named_spread: Option<&Expr>,
    ) -> Result<(), CompileError> {
        self.compile_expr(callee)?;
        let mut positional = 0u32;
        for a in args {
            // Spread arguments are flattened by the VM at call time; the
            // compiler just marks how many leading stack slots are plain
            // positional values versus a single trailing spread by always
            // compiling spreads last in source order (grammar already
            // requires this shape for calls that mix them).
            match a {
                Arg::Positional(e) => {
                    self.compile_expr(e)?;
                    positional += 1;
                }
                Arg::Spread(e) => {
                    self.compile_expr(e)?;
                    positional += 1;
                }
            }
        }
        for (name, value) in named_args {
            let idx = self.add_constant(Constant::Str(name.clone()));
            self.scope().emit(pos, Opcode::PushConst, &[idx]);
            self.compile_expr(value)?;
        }
        if let Some(spread) = named_spread {
            self.compile_expr(spread)?;
        }
        let has_spread = args.iter().any(|a| matches!(a, Arg::Spread(_)));
        let flags = (has_spread as u32) | ((named_spread.is_some() as u32) << 1);
        self.scope().emit(
            pos,
            Opcode::Call,
            &[positional, named_args.len() as u32, flags],
        );
        Ok(())
    }

    fn compile_inc_dec(
        &mut self,
        pos: Pos,
        op: IncDecOp,
        target: &Expr,
        is_post: bool,
    ) -> Result<(), CompileError> {
        let Expr::Ident { name, .. } = target else {
            return Err(CompileError {
                pos,
                message: "++/-- target must be a name".to_string(),
            });
        };
        self.compile_ident(pos, name)?;
        if is_post {
            self.scope().emit(pos, Opcode::Dup, &[]);
        }
        let one_idx = self.add_constant(Constant::Int(1));
        self.scope().emit(pos, Opcode::PushConst, &[one_idx]);
        self.scope().emit(
            pos,
            if op == IncDecOp::Inc { Opcode::Add } else { Opcode::Sub },
            &[],
        );
        if !is_post {
            self.scope().emit(pos, Opcode::Dup, &[]);
        }
        let sym = self.symbols.resolve(name).ok_or_else(|| CompileError {
            pos,
            message: format!("undefined name `{name}`"),
        })?;
        self.bind_slot(pos, &sym);
        Ok(())
    }

    fn compile_func_lit(
        &mut self,
        pos: Pos,
        params: &FuncParams,
        body: &Block,
    ) -> Result<(), CompileError> {
        self.enter_function();
        for name in &params.positional {
            let sym = self.symbols.define(name);
            self.scope().num_locals = self.scope().num_locals.max(sym.index + 1);
        }
        if let Some(name) = &params.variadic_positional {
            let sym = self.symbols.define(name);
            self.scope().num_locals = self.scope().num_locals.max(sym.index + 1);
        }
        let mut named_specs = Vec::new();
        for (name, default_expr) in &params.named {
            let sym = self.symbols.define(name);
            self.scope().num_locals = self.scope().num_locals.max(sym.index + 1);
            let default = match default_expr {
                Some(expr) => Some(self.compile_named_default(pos, expr)?),
                None => None,
            };
            named_specs.push(NamedParam {
                name: name.clone(),
                default,
            });
        }
        if let Some(name) = &params.variadic_named {
            let sym = self.symbols.define(name);
            self.scope().num_locals = self.scope().num_locals.max(sym.index + 1);
        }

        for stmt in &body.statements {
            self.compile_stmt(stmt)?;
        }
        self.scope().emit(pos, Opcode::ReturnNil, &[]);

        let (scope, free_sources) = self.leave_function();
        let param_spec = ParamSpec {
            num_positional: params.positional.len() as u16,
            variadic_positional: params.variadic_positional.is_some(),
            named: named_specs,
            variadic_named: params.variadic_named.is_some(),
        };
        let mut compiled = CompiledFunction::new(param_spec);
        compiled.instructions = scope.instructions;
        compiled.positions = scope.positions;
        compiled.num_locals = scope.num_locals;
        compiled.free_vars = free_sources.clone();
        compiled.try_regions = scope.try_regions;

        let const_idx = self.add_constant(Constant::Function(Arc::new(compiled)));
        self.scope().emit(
            pos,
            Opcode::Closure,
            &[const_idx, free_sources.len() as u32],
        );
        Ok(())
    }

    /// Compiles a named-parameter default-value expression to its own
    /// zero-argument `CompiledFunction`, sharing this compiler's constant
    /// pool but resolving names against a snapshot of the root (builtin +
    /// global) scope only.
    fn compile_named_default(
        &mut self,
        pos: Pos,
        expr: &Expr,
    ) -> Result<Arc<CompiledFunction>, CompileError> {
        let saved_symbols = std::mem::replace(&mut self.symbols, self.symbols.snapshot_root());
        self.scopes.push(CompilationScope::new());
        let result = self.compile_expr(expr);
        self.scope().emit(pos, Opcode::Return, &[]);
        let scope = self.scopes.pop().unwrap();
        self.symbols = saved_symbols;
        result?;

        let mut compiled = CompiledFunction::new(ParamSpec::default());
        compiled.name = Some("<param-default>".to_string());
        compiled.instructions = scope.instructions;
        compiled.positions = scope.positions;
        compiled.num_locals = scope.num_locals;
        Ok(Arc::new(compiled))
    }
}

impl Default for Compiler {
    fn default() -> Self {
        Self::new()
    }
}

fn assign_to_binary(op: AssignOp) -> BinaryOp {
    match op {
        AssignOp::Add => BinaryOp::Add,
        AssignOp::Sub => BinaryOp::Sub,
        AssignOp::Mul => BinaryOp::Mul,
        AssignOp::Quo => BinaryOp::Quo,
        AssignOp::Rem => BinaryOp::Rem,
        AssignOp::And => BinaryOp::BitAnd,
        AssignOp::Or => BinaryOp::BitOr,
        AssignOp::Xor => BinaryOp::BitXor,
        AssignOp::Shl => BinaryOp::Shl,
        AssignOp::Shr => BinaryOp::Shr,
        AssignOp::AndNot => BinaryOp::AndNot,
        AssignOp::Assign | AssignOp::Define | AssignOp::Land | AssignOp::Lor | AssignOp::Nullich => {
            unreachable!("handled separately in compile_assign_stmt")
        }
    }
}

fn binary_op_opcode(op: BinaryOp) -> Opcode {
    match op {
        BinaryOp::Add => Opcode::Add,
        BinaryOp::Sub => Opcode::Sub,
        BinaryOp::Mul => Opcode::Mul,
        BinaryOp::Quo => Opcode::Div,
        BinaryOp::Rem => Opcode::Rem,
        BinaryOp::Pow => Opcode::Pow,
        BinaryOp::BitAnd => Opcode::BitAnd,
        BinaryOp::BitOr => Opcode::BitOr,
        BinaryOp::BitXor => Opcode::BitXor,
        BinaryOp::Shl => Opcode::Shl,
        BinaryOp::Shr => Opcode::Shr,
        BinaryOp::AndNot => Opcode::AndNot,
        BinaryOp::Eq => Opcode::Equal,
        BinaryOp::Neq => Opcode::NotEqual,
        BinaryOp::Lt => Opcode::Less,
        BinaryOp::Leq => Opcode::LessEq,
        BinaryOp::Gt => Opcode::Greater,
        BinaryOp::Geq => Opcode::GreaterEq,
        BinaryOp::Concat => Opcode::Concat,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::Parser;
    use crate::scanner::{ScannerConfig, tokenize};

    fn compile(src: &str) -> (CompiledFunction, Vec<Constant>) {
        let (tokens, scan_errs) = tokenize(src.as_bytes(), 0, ScannerConfig::default());
        assert!(scan_errs.is_empty(), "{scan_errs:?}");
        let mut parser = Parser::new(tokens);
        let program = parser.parse_program();
        assert!(parser.errors().is_empty(), "{:?}", parser.errors());
        let compiler = Compiler::new();
        let (main, constants, _global_names) = compiler.compile_program(&program).expect("compiles");
        (main, constants)
    }

    #[test]
    fn compiles_arithmetic_expression_statement() {
        let (main, constants) = compile("1 + 2");
        assert!(!main.instructions.is_empty());
        assert_eq!(constants.len(), 2);
        assert!(main.instructions.contains(&(Opcode::Add as u8)));
    }

    #[test]
    fn compiles_var_decl_and_global_roundtrip() {
        let (main, _) = compile("var x = 1\nx + 1");
        assert!(main.instructions.contains(&(Opcode::SetGlobal as u8)));
        assert!(main.instructions.contains(&(Opcode::GetGlobal as u8)));
    }

    #[test]
    fn exposes_global_names_in_definition_order() {
        let (tokens, _) = tokenize(b"var b = 1\nvar a = 2", 0, ScannerConfig::default());
        let mut parser = Parser::new(tokens);
        let program = parser.parse_program();
        let compiler = Compiler::new();
        let (_, _, global_names) = compiler.compile_program(&program).expect("compiles");
        assert_eq!(global_names, vec!["b".to_string(), "a".to_string()]);
    }

    #[test]
    fn compiles_if_with_jump_patched() {
        let (main, _) = compile("if true { var x = 1 }");
        assert!(main.instructions.contains(&(Opcode::JumpFalsy as u8)));
    }

    #[test]
    fn compiles_closure_with_free_variable() {
        let (_, constants) = compile("var x = 1\nvar f = func() { return x }");
        let has_closure_fn = constants
            .iter()
            .any(|c| matches!(c, Constant::Function(f) if !f.free_vars.is_empty()));
        assert!(has_closure_fn);
    }

    #[test]
    fn compiles_string_interpolation_with_concat() {
        let (main, _) = compile(r#"var x = 1 "a${x}b""#);
        assert!(main.instructions.contains(&(Opcode::Concat as u8)));
    }

    #[test]
    fn compiles_for_range_loop_with_iterator_opcodes() {
        let (main, _) = compile("for k, v in arr { }");
        assert!(main.instructions.contains(&(Opcode::MakeIterator as u8)));
        assert!(main.instructions.contains(&(Opcode::IterNext as u8)));
        assert!(main.instructions.contains(&(Opcode::IterClose as u8)));
    }

    #[test]
    fn undefined_name_is_a_compile_error() {
        let (tokens, _) = tokenize(b"y + 1", 0, ScannerConfig::default());
        let mut parser = Parser::new(tokens);
        let program = parser.parse_program();
        let compiler = Compiler::new();
        assert!(compiler.compile_program(&program).is_err());
    }
}
