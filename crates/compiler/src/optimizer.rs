//! AST-level optimizer: constant folding and dead-code elimination,
//! run as a small fixed-point loop before compilation.

use crate::ast::*;

#[derive(Debug, Clone)]
pub struct OptimizerConfig {
    pub max_passes: u8,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        OptimizerConfig { max_passes: 3 }
    }
}

/// Runs constant-folding/dead-code passes until a fixpoint or
/// `config.max_passes`, whichever comes first.
pub fn optimize(program: &mut Program, config: &OptimizerConfig) {
    for _ in 0..config.max_passes {
        let mut changed = false;
        for stmt in &mut program.statements {
            changed |= optimize_stmt(stmt);
        }
        if !changed {
            break;
        }
    }
}

fn optimize_stmt(stmt: &mut Stmt) -> bool {
    let mut changed = false;
    match stmt {
        Stmt::Expr(e) => changed |= optimize_expr(e),
        Stmt::VarDecl { values, .. } | Stmt::ConstDecl { values, .. } => {
            for v in values {
                changed |= optimize_expr(v);
            }
        }
        Stmt::Assign { target, value, .. } => {
            changed |= optimize_expr(target);
            changed |= optimize_expr(value);
        }
        Stmt::Return { value: Some(v), .. } => changed |= optimize_expr(v),
        Stmt::Return { value: None, .. } => {}
        Stmt::If {
            cond,
            then_block,
            else_block,
            ..
        } => {
            changed |= optimize_expr(cond);
            changed |= optimize_block(then_block);
            if let Some(b) = else_block {
                changed |= optimize_block(b);
            }
            if let Some(value) = const_bool(cond) {
                let replacement = if value {
                    std::mem::replace(then_block, Block { statements: vec![] })
                } else {
                    else_block
                        .take()
                        .unwrap_or(Block { statements: vec![] })
                };
                *stmt = Stmt::Block(replacement);
                changed = true;
            }
        }
        Stmt::For { kind, body, .. } => {
            match kind {
                ForKind::Classic { init, cond, post } => {
                    if let Some(init) = init {
                        changed |= optimize_stmt(init);
                    }
                    if let Some(cond) = cond {
                        changed |= optimize_expr(cond);
                    }
                    if let Some(post) = post {
                        changed |= optimize_stmt(post);
                    }
                }
                ForKind::Range {
                    iterable,
                    else_block,
                    ..
                } => {
                    changed |= optimize_expr(iterable);
                    if let Some(b) = else_block {
                        changed |= optimize_block(b);
                    }
                }
                ForKind::While { cond } => changed |= optimize_expr(cond),
                ForKind::Infinite => {}
            }
            changed |= optimize_block(body);
        }
        Stmt::Try {
            body,
            catch,
            finally,
            ..
        } => {
            changed |= optimize_block(body);
            if let Some((_, b)) = catch {
                changed |= optimize_block(b);
            }
            if let Some(b) = finally {
                changed |= optimize_block(b);
            }
        }
        Stmt::Throw { value, .. } => changed |= optimize_expr(value),
        Stmt::Block(b) => changed |= optimize_block(b),
        Stmt::Break { .. }
        | Stmt::Continue { .. }
        | Stmt::ParamDecl { .. }
        | Stmt::GlobalDecl { .. }
        | Stmt::Import { .. } => {}
    }
    changed
}

fn optimize_block(block: &mut Block) -> bool {
    let mut changed = false;
    for s in &mut block.statements {
        changed |= optimize_stmt(s);
    }
    changed |= strip_dead_tail(&mut block.statements);
    changed
}

/// Removes statements following an unconditional `return`/`break`/
/// `continue`/`throw` within the same block (they can never execute).
fn strip_dead_tail(statements: &mut Vec<Stmt>) -> bool {
    if let Some(idx) = statements.iter().position(is_terminator) {
        if idx + 1 < statements.len() {
            statements.truncate(idx + 1);
            return true;
        }
    }
    false
}

fn is_terminator(stmt: &Stmt) -> bool {
    matches!(
        stmt,
        Stmt::Return { .. } | Stmt::Break { .. } | Stmt::Continue { .. } | Stmt::Throw { .. }
    )
}

fn const_bool(expr: &Expr) -> Option<bool> {
    match expr {
        Expr::BoolLit { value, .. } | Expr::FlagLit { value, .. } => Some(*value),
        Expr::NilLit { .. } => Some(false),
        _ => None,
    }
}

fn optimize_expr(expr: &mut Expr) -> bool {
    let mut changed = false;
    match expr {
        Expr::Unary { op, operand, .. } => {
            changed |= optimize_expr(operand);
            if let Some(folded) = fold_unary(*op, operand) {
                *expr = folded;
                changed = true;
            }
        }
        Expr::Binary { op, lhs, rhs, pos } => {
            changed |= optimize_expr(lhs);
            changed |= optimize_expr(rhs);
            if let Some(folded) = fold_binary(*op, lhs, rhs, *pos) {
                *expr = folded;
                changed = true;
            }
        }
        Expr::Logical { lhs, rhs, .. } => {
            changed |= optimize_expr(lhs);
            changed |= optimize_expr(rhs);
        }
        Expr::Nullish { lhs, rhs, .. } => {
            changed |= optimize_expr(lhs);
            changed |= optimize_expr(rhs);
        }
        Expr::Ternary {
            cond,
            then_expr,
            else_expr,
            ..
        } => {
            changed |= optimize_expr(cond);
            changed |= optimize_expr(then_expr);
            changed |= optimize_expr(else_expr);
            if let Some(value) = const_bool(cond) {
                *expr = if value {
                    (**then_expr).clone()
                } else {
                    (**else_expr).clone()
                };
                changed = true;
            }
        }
        Expr::Index { target, index, .. } => {
            changed |= optimize_expr(target);
            changed |= optimize_expr(index);
        }
        Expr::Slice { target, low, high, .. } => {
            changed |= optimize_expr(target);
            if let Some(l) = low {
                changed |= optimize_expr(l);
            }
            if let Some(h) = high {
                changed |= optimize_expr(h);
            }
        }
        Expr::Selector { target, .. } => changed |= optimize_expr(target),
        Expr::Call {
            callee,
            args,
            named_args,
            named_spread,
            ..
        } => {
            changed |= optimize_expr(callee);
            for a in args {
                match a {
                    Arg::Positional(e) | Arg::Spread(e) => changed |= optimize_expr(e),
                }
            }
            for (_, e) in named_args {
                changed |= optimize_expr(e);
            }
            if let Some(e) = named_spread {
                changed |= optimize_expr(e);
            }
        }
        Expr::Pipe { lhs, rhs, .. } => {
            changed |= optimize_expr(lhs);
            changed |= optimize_expr(rhs);
        }
        Expr::PreIncDec { target, .. } | Expr::PostIncDec { target, .. } => {
            changed |= optimize_expr(target);
        }
        Expr::Spread { value, .. } => changed |= optimize_expr(value),
        Expr::ArrayLit { elements, .. } => {
            for e in elements {
                changed |= optimize_expr(e);
            }
        }
        Expr::DictLit { entries, .. } => {
            for (k, v) in entries {
                changed |= optimize_expr(k);
                changed |= optimize_expr(v);
            }
        }
        Expr::StringLit { parts, .. } => {
            for p in parts {
                if let StringPart::Interp(e) = p {
                    changed |= optimize_expr(e);
                }
            }
        }
        Expr::ImmediateInvoke { func, args, .. } => {
            changed |= optimize_expr(func);
            for a in args {
                match a {
                    Arg::Positional(e) | Arg::Spread(e) => changed |= optimize_expr(e),
                }
            }
        }
        Expr::FuncLit { .. }
        | Expr::Ident { .. }
        | Expr::IntLit { .. }
        | Expr::UintLit { .. }
        | Expr::FloatLit { .. }
        | Expr::DecimalLit { .. }
        | Expr::CharLit { .. }
        | Expr::BoolLit { .. }
        | Expr::FlagLit { .. }
        | Expr::NilLit { .. }
        | Expr::StdStream { .. } => {}
    }
    changed
}

fn fold_unary(op: UnaryOp, operand: &Expr) -> Option<Expr> {
    match (op, operand) {
        (UnaryOp::Neg, Expr::IntLit { pos, value }) => Some(Expr::IntLit {
            pos: *pos,
            value: value.wrapping_neg(),
        }),
        (UnaryOp::Neg, Expr::FloatLit { pos, value }) => Some(Expr::FloatLit {
            pos: *pos,
            value: -value,
        }),
        (UnaryOp::Not, Expr::BoolLit { pos, value }) => Some(Expr::BoolLit {
            pos: *pos,
            value: !value,
        }),
        (UnaryOp::BitNot, Expr::IntLit { pos, value }) => Some(Expr::IntLit {
            pos: *pos,
            value: !value,
        }),
        _ => None,
    }
}

/// Folds a binary op over two literal operands. Division/modulo by a
/// literal zero is deliberately left unfolded so it still raises a
/// runtime error instead of silently becoming a compile-time constant.
fn fold_binary(op: BinaryOp, lhs: &Expr, rhs: &Expr, pos: gad_core::Pos) -> Option<Expr> {
    use Expr::*;
    match (lhs, rhs) {
        (IntLit { value: a, .. }, IntLit { value: b, .. }) => {
            if matches!(op, BinaryOp::Quo | BinaryOp::Rem) && *b == 0 {
                return None;
            }
            let value = match op {
                BinaryOp::Add => a.wrapping_add(*b),
                BinaryOp::Sub => a.wrapping_sub(*b),
                BinaryOp::Mul => a.wrapping_mul(*b),
                BinaryOp::Quo => a.wrapping_div(*b),
                BinaryOp::Rem => a.wrapping_rem(*b),
                BinaryOp::BitAnd => a & b,
                BinaryOp::BitOr => a | b,
                BinaryOp::BitXor => a ^ b,
                BinaryOp::Shl => a.wrapping_shl(*b as u32),
                BinaryOp::Shr => a.wrapping_shr(*b as u32),
                BinaryOp::AndNot => a & !b,
                _ => return None,
            };
            Some(IntLit { pos, value })
        }
        (FloatLit { value: a, .. }, FloatLit { value: b, .. }) => {
            let value = match op {
                BinaryOp::Add => a + b,
                BinaryOp::Sub => a - b,
                BinaryOp::Mul => a * b,
                BinaryOp::Quo => a / b,
                BinaryOp::Rem => a % b,
                _ => return None,
            };
            Some(FloatLit { pos, value })
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::Parser;
    use crate::scanner::{ScannerConfig, tokenize};

    fn optimized(src: &str) -> Program {
        let (tokens, _) = tokenize(src.as_bytes(), 0, ScannerConfig::default());
        let mut parser = Parser::new(tokens);
        let mut program = parser.parse_program();
        assert!(parser.errors().is_empty());
        optimize(&mut program, &OptimizerConfig::default());
        program
    }

    #[test]
    fn folds_constant_arithmetic() {
        let program = optimized("var x = 1 + 2 * 3");
        match &program.statements[0] {
            Stmt::VarDecl { values, .. } => {
                assert!(matches!(values[0], Expr::IntLit { value: 7, .. }));
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn leaves_division_by_literal_zero_unfolded() {
        let program = optimized("var x = 1 / 0");
        match &program.statements[0] {
            Stmt::VarDecl { values, .. } => {
                assert!(matches!(values[0], Expr::Binary { op: BinaryOp::Quo, .. }));
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn strips_dead_code_after_return() {
        let program = optimized("func() { return 1\n var x = 2 }");
        // top-level is an expr-statement wrapping the func literal; look at
        // the nested block via the FuncLit directly.
        if let Stmt::Expr(Expr::FuncLit { body, .. }) = &program.statements[0] {
            assert_eq!(body.statements.len(), 1);
        } else {
            panic!("unexpected shape: {:?}", program.statements[0]);
        }
    }

    #[test]
    fn collapses_constant_if() {
        let program = optimized("if true { var x = 1 } else { var y = 2 }");
        assert!(matches!(program.statements[0], Stmt::Block(_)));
    }
}
