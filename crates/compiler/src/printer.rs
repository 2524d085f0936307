//! AST -> source text: the "code-writer" spec.md §2 lists as part of the
//! AST component's responsibility. Reparsing this writer's output is
//! expected to reproduce a structurally-equal AST (spec.md §8 property
//! 2), so it favors unambiguous parenthesization over matching the
//! original formatting byte-for-byte.

use crate::ast::*;
use std::fmt;

impl fmt::Display for Program {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for stmt in &self.statements {
            writeln!(f, "{stmt};")?;
        }
        Ok(())
    }
}

impl fmt::Display for Block {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{ ")?;
        for stmt in &self.statements {
            write!(f, "{stmt}; ")?;
        }
        write!(f, "}}")
    }
}

fn write_names(f: &mut fmt::Formatter<'_>, names: &[String]) -> fmt::Result {
    for (i, n) in names.iter().enumerate() {
        if i > 0 {
            write!(f, ", ")?;
        }
        write!(f, "{n}")?;
    }
    Ok(())
}

fn write_exprs(f: &mut fmt::Formatter<'_>, exprs: &[Expr]) -> fmt::Result {
    for (i, e) in exprs.iter().enumerate() {
        if i > 0 {
            write!(f, ", ")?;
        }
        write!(f, "{e}")?;
    }
    Ok(())
}

impl fmt::Display for AssignOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AssignOp::Assign => "=",
            AssignOp::Define => ":=",
            AssignOp::Add => "+=",
            AssignOp::Sub => "-=",
            AssignOp::Mul => "*=",
            AssignOp::Quo => "/=",
            AssignOp::Rem => "%=",
            AssignOp::And => "&=",
            AssignOp::Or => "|=",
            AssignOp::Xor => "^=",
            AssignOp::Shl => "<<=",
            AssignOp::Shr => ">>=",
            AssignOp::AndNot => "&^=",
            AssignOp::Land => "&&=",
            AssignOp::Lor => "||=",
            AssignOp::Nullich => "??=",
        };
        write!(f, "{s}")
    }
}

impl fmt::Display for Stmt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stmt::Expr(e) => write!(f, "{e}"),
            Stmt::VarDecl { names, values, .. } => {
                write!(f, "var ")?;
                write_names(f, names)?;
                if !values.is_empty() {
                    write!(f, " = ")?;
                    write_exprs(f, values)?;
                }
                Ok(())
            }
            Stmt::ConstDecl { names, values, .. } => {
                write!(f, "const ")?;
                write_names(f, names)?;
                write!(f, " = ")?;
                write_exprs(f, values)
            }
            Stmt::ParamDecl { names, variadic, .. } => {
                write!(f, "param ")?;
                write_names(f, names)?;
                if *variadic {
                    write!(f, "...")?;
                }
                Ok(())
            }
            Stmt::GlobalDecl { names, .. } => {
                write!(f, "global ")?;
                write_names(f, names)
            }
            Stmt::Assign { target, op, value, .. } => write!(f, "{target} {op} {value}"),
            Stmt::Return { value, .. } => match value {
                Some(v) => write!(f, "return {v}"),
                None => write!(f, "return"),
            },
            Stmt::If { cond, then_block, else_block, .. } => {
                write!(f, "if {cond} {then_block}")?;
                if let Some(e) = else_block {
                    write!(f, " else {e}")?;
                }
                Ok(())
            }
            Stmt::For { kind, body, .. } => match kind {
                ForKind::Classic { init, cond, post } => {
                    write!(f, "for ")?;
                    if let Some(i) = init {
                        write!(f, "{i}")?;
                    }
                    write!(f, "; ")?;
                    if let Some(c) = cond {
                        write!(f, "{c}")?;
                    }
                    write!(f, "; ")?;
                    if let Some(p) = post {
                        write!(f, "{p}")?;
                    }
                    write!(f, " {body}")
                }
                ForKind::Range { key, value, iterable, else_block } => {
                    write!(f, "for ")?;
                    if let Some(k) = key {
                        write!(f, "{k}, ")?;
                    }
                    write!(f, "{value} in {iterable} {body}")?;
                    if let Some(e) = else_block {
                        write!(f, " else {e}")?;
                    }
                    Ok(())
                }
                ForKind::While { cond } => write!(f, "for {cond} {body}"),
                ForKind::Infinite => write!(f, "for {body}"),
            },
            Stmt::Break { .. } => write!(f, "break"),
            Stmt::Continue { .. } => write!(f, "continue"),
            Stmt::Try { body, catch, finally, .. } => {
                write!(f, "try {body}")?;
                if let Some((name, block)) = catch {
                    write!(f, " catch")?;
                    if let Some(n) = name {
                        write!(f, " {n}")?;
                    }
                    write!(f, " {block}")?;
                }
                if let Some(block) = finally {
                    write!(f, " finally {block}")?;
                }
                Ok(())
            }
            Stmt::Throw { value, .. } => write!(f, "throw {value}"),
            Stmt::Import { alias, path, .. } => match alias {
                Some(a) => write!(f, "{a} := import(\"{path}\")"),
                None => write!(f, "import(\"{path}\")"),
            },
            Stmt::Block(b) => write!(f, "{b}"),
        }
    }
}

impl fmt::Display for UnaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            UnaryOp::Neg => "-",
            UnaryOp::Not => "!",
            UnaryOp::BitNot => "^",
            UnaryOp::Plus => "+",
        };
        write!(f, "{s}")
    }
}

impl fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Quo => "/",
            BinaryOp::Rem => "%",
            BinaryOp::Pow => "**",
            BinaryOp::BitAnd => "&",
            BinaryOp::BitOr => "|",
            BinaryOp::BitXor => "^",
            BinaryOp::Shl => "<<",
            BinaryOp::Shr => ">>",
            BinaryOp::AndNot => "&^",
            BinaryOp::Eq => "==",
            BinaryOp::Neq => "!=",
            BinaryOp::Lt => "<",
            BinaryOp::Leq => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Geq => ">=",
            BinaryOp::Concat => "~~",
        };
        write!(f, "{s}")
    }
}

impl fmt::Display for IncDecOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", if *self == IncDecOp::Inc { "++" } else { "--" })
    }
}

impl fmt::Display for FuncParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(")?;
        let mut first = true;
        for name in &self.positional {
            if !first {
                write!(f, ", ")?;
            }
            write!(f, "{name}")?;
            first = false;
        }
        if let Some(v) = &self.variadic_positional {
            if !first {
                write!(f, ", ")?;
            }
            write!(f, "*{v}")?;
            first = false;
        }
        if !self.named.is_empty() || self.variadic_named.is_some() {
            write!(f, "; ")?;
            let mut first_named = true;
            for (name, default) in &self.named {
                if !first_named {
                    write!(f, ", ")?;
                }
                match default {
                    Some(d) => write!(f, "{name}={d}")?,
                    None => write!(f, "{name}")?,
                }
                first_named = false;
            }
            if let Some(v) = &self.variadic_named {
                if !first_named {
                    write!(f, ", ")?;
                }
                write!(f, "**{v}")?;
            }
        }
        write!(f, ")")
    }
}

impl fmt::Display for Arg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Arg::Positional(e) => write!(f, "{e}"),
            Arg::Spread(e) => write!(f, "*{e}"),
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Ident { name, .. } => write!(f, "{name}"),
            Expr::IntLit { value, .. } => write!(f, "{value}"),
            Expr::UintLit { value, .. } => write!(f, "{value}u"),
            Expr::FloatLit { value, .. } => write!(f, "{value}"),
            Expr::DecimalLit { mantissa, scale, .. } => write!(f, "{mantissa}e-{scale}d"),
            Expr::CharLit { value, .. } => write!(f, "'{value}'"),
            Expr::BoolLit { value, .. } => write!(f, "{value}"),
            Expr::FlagLit { value, .. } => write!(f, "{}", if *value { "yes" } else { "no" }),
            Expr::NilLit { .. } => write!(f, "nil"),
            Expr::StringLit { parts, raw, .. } => {
                if *raw {
                    write!(f, "`")?;
                    for part in parts {
                        if let StringPart::Text(t) = part {
                            write!(f, "{t}")?;
                        }
                    }
                    write!(f, "`")
                } else {
                    write!(f, "\"")?;
                    for part in parts {
                        match part {
                            StringPart::Text(t) => write!(f, "{}", t.replace('"', "\\\""))?,
                            StringPart::Interp(e) => write!(f, "${{{e}}}")?,
                        }
                    }
                    write!(f, "\"")
                }
            }
            Expr::ArrayLit { elements, .. } => {
                write!(f, "[")?;
                write_exprs(f, elements)?;
                write!(f, "]")
            }
            Expr::DictLit { entries, .. } => {
                write!(f, "{{")?;
                for (i, (k, v)) in entries.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{k}: {v}")?;
                }
                write!(f, "}}")
            }
            Expr::FuncLit { params, body, .. } => write!(f, "func{params} {body}"),
            Expr::Unary { op, operand, .. } => write!(f, "{op}{operand}"),
            Expr::Binary { op, lhs, rhs, .. } => write!(f, "({lhs} {op} {rhs})"),
            Expr::Logical { op, lhs, rhs, .. } => {
                let s = if matches!(op, LogicalOp::And) { "&&" } else { "||" };
                write!(f, "({lhs} {s} {rhs})")
            }
            Expr::Nullish { lhs, rhs, .. } => write!(f, "({lhs} ?? {rhs})"),
            Expr::Ternary { cond, then_expr, else_expr, .. } => {
                write!(f, "({cond} ? {then_expr} : {else_expr})")
            }
            Expr::Index { target, index, optional, .. } => {
                write!(f, "{target}{}[{index}]", if *optional { "?" } else { "" })
            }
            Expr::Slice { target, low, high, .. } => {
                write!(f, "{target}[")?;
                if let Some(l) = low {
                    write!(f, "{l}")?;
                }
                write!(f, ":")?;
                if let Some(h) = high {
                    write!(f, "{h}")?;
                }
                write!(f, "]")
            }
            Expr::Selector { target, field, optional, .. } => {
                write!(f, "{target}{}.{field}", if *optional { "?" } else { "" })
            }
            Expr::Call { callee, args, named_args, named_spread, .. } => {
                write!(f, "{callee}(")?;
                let mut first = true;
                for a in args {
                    if !first {
                        write!(f, ", ")?;
                    }
                    write!(f, "{a}")?;
                    first = false;
                }
                if !named_args.is_empty() || named_spread.is_some() {
                    write!(f, "; ")?;
                    for (i, (name, val)) in named_args.iter().enumerate() {
                        if i > 0 {
                            write!(f, ", ")?;
                        }
                        write!(f, "{name}={val}")?;
                    }
                    if let Some(spread) = named_spread {
                        if !named_args.is_empty() {
                            write!(f, ", ")?;
                        }
                        write!(f, "**{spread}")?;
                    }
                }
                write!(f, ")")
            }
            Expr::Pipe { lhs, rhs, .. } => write!(f, "({lhs} .| {rhs})"),
            Expr::PreIncDec { op, target, .. } => write!(f, "{op}{target}"),
            Expr::PostIncDec { op, target, .. } => write!(f, "{target}{op}"),
            Expr::Spread { value, .. } => write!(f, "*{value}"),
            Expr::ImmediateInvoke { func, args, .. } => {
                write!(f, "({func})(")?;
                for (i, a) in args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{a}")?;
                }
                write!(f, ")")
            }
            Expr::StdStream { stream, .. } => {
                let s = match stream {
                    StdStream::Stdin => "stdin",
                    StdStream::Stdout => "stdout",
                    StdStream::Stderr => "stderr",
                };
                write!(f, "{s}")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{parser::Parser, scanner};

    fn parse(src: &str) -> Result<Program, ()> {
        let (tokens, errors) = scanner::tokenize(src.as_bytes(), 0, scanner::ScannerConfig::default());
        assert!(errors.is_empty(), "scan errors: {errors:?}");
        let mut parser = Parser::new(tokens);
        let program = parser.parse_program();
        if parser.errors().is_empty() {
            Ok(program)
        } else {
            Err(())
        }
    }

    fn statement_count(p: &Program) -> usize {
        p.statements.len()
    }

    #[test]
    fn binary_expression_roundtrips_through_print_and_reparse() {
        let program = parse("1 + 2 * 3").unwrap();
        let printed = program.to_string();
        let reparsed = parse(&printed).unwrap();
        assert_eq!(statement_count(&program), statement_count(&reparsed));
    }

    #[test]
    fn if_else_prints_and_reparses() {
        let program = parse("if x > 0 { y = 1 } else { y = 2 }").unwrap();
        let printed = program.to_string();
        assert!(printed.contains("if"));
        assert!(parse(&printed).is_ok());
    }

    #[test]
    fn function_literal_prints_params_and_body() {
        let program = parse("f := func(a, b; k=1) { return a + b }").unwrap();
        let printed = program.to_string();
        assert!(printed.contains("func("));
        assert!(parse(&printed).is_ok());
    }

    #[test]
    fn string_interpolation_round_trips() {
        let program = parse(r#"x := "hello ${name}""#).unwrap();
        let printed = program.to_string();
        assert!(printed.contains("${name}"));
        assert!(parse(&printed).is_ok());
    }
}
