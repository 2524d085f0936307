//! Recursive-descent parser with Pratt-style expression precedence
//! climbing, producing the [`crate::ast`] tree from a token stream.

use crate::ast::*;
use crate::token::{Token, TokenKind, precedence, right_associative};
use gad_core::Pos;
use std::rc::Rc;

#[derive(Debug, Clone, PartialEq)]
pub struct ParseError {
    pub pos: Pos,
    pub message: String,
}

pub struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    errors: Vec<ParseError>,
}

type PResult<T> = Result<T, ()>;

impl Parser {
    pub fn new(tokens: Vec<Token>) -> Self {
        Parser {
            tokens,
            pos: 0,
            errors: Vec::new(),
        }
    }

    pub fn errors(&self) -> &[ParseError] {
        &self.errors
    }

    pub fn parse_program(&mut self) -> Program {
        let mut statements = Vec::new();
        while !self.at(TokenKind::Eof) {
            if self.at(TokenKind::Semi) {
                self.advance();
                continue;
            }
            match self.parse_statement() {
                Ok(stmt) => statements.push(stmt),
                Err(()) => self.synchronize(),
            }
        }
        Program { statements }
    }

    // --- token helpers -----------------------------------------------

    fn cur(&self) -> &Token {
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn cur_kind(&self) -> TokenKind {
        self.cur().kind
    }

    fn at(&self, kind: TokenKind) -> bool {
        self.cur_kind() == kind
    }

    fn advance(&mut self) -> Token {
        let tok = self.cur().clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        tok
    }

    fn eat(&mut self, kind: TokenKind) -> PResult<Token> {
        if self.at(kind) {
            Ok(self.advance())
        } else {
            let pos = self.cur().pos;
            let found = self.cur_kind();
            self.error(pos, format!("expected {kind:?}, found {found:?}"));
            Err(())
        }
    }

    fn error(&mut self, pos: Pos, message: impl Into<String>) {
        self.errors.push(ParseError {
            pos,
            message: message.into(),
        });
    }

    /// Skips ahead to the next statement boundary after a parse error, so
    /// the parser can keep collecting further errors in one pass.
    fn synchronize(&mut self) {
        loop {
            match self.cur_kind() {
                TokenKind::Semi => {
                    self.advance();
                    return;
                }
                TokenKind::Eof
                | TokenKind::KwVar
                | TokenKind::KwConst
                | TokenKind::KwFunc
                | TokenKind::KwIf
                | TokenKind::KwFor
                | TokenKind::KwReturn
                | TokenKind::RBrace => return,
                _ => {
                    self.advance();
                }
            }
        }
    }

    fn skip_semis(&mut self) {
        while self.at(TokenKind::Semi) {
            self.advance();
        }
    }

    // --- statements -----------------------------------------------------

    fn parse_statement(&mut self) -> PResult<Stmt> {
        match self.cur_kind() {
            TokenKind::KwVar => self.parse_var_decl(),
            TokenKind::KwConst => self.parse_const_decl(),
            TokenKind::KwParam => self.parse_param_decl(),
            TokenKind::KwGlobal => self.parse_global_decl(),
            TokenKind::KwReturn => self.parse_return(),
            TokenKind::KwIf => self.parse_if(),
            TokenKind::KwFor => self.parse_for(),
            TokenKind::KwBreak => {
                let pos = self.advance().pos;
                Ok(Stmt::Break { pos })
            }
            TokenKind::KwContinue => {
                let pos = self.advance().pos;
                Ok(Stmt::Continue { pos })
            }
            TokenKind::KwTry => self.parse_try(),
            TokenKind::KwThrow => {
                let pos = self.advance().pos;
                let value = self.parse_expr(0)?;
                Ok(Stmt::Throw { pos, value })
            }
            TokenKind::KwImport => self.parse_import(),
            TokenKind::LBrace => Ok(Stmt::Block(self.parse_block()?)),
            _ => self.parse_expr_or_assign_statement(),
        }
    }

    fn parse_name_list(&mut self) -> PResult<Vec<String>> {
        let mut names = vec![self.eat(TokenKind::Ident)?.text];
        while self.at(TokenKind::Comma) {
            self.advance();
            names.push(self.eat(TokenKind::Ident)?.text);
        }
        Ok(names)
    }

    fn parse_var_decl(&mut self) -> PResult<Stmt> {
        let pos = self.advance().pos;
        let names = self.parse_name_list()?;
        let mut values = Vec::new();
        if self.at(TokenKind::Assign) || self.at(TokenKind::Define) {
            self.advance();
            values.push(self.parse_expr(0)?);
            while self.at(TokenKind::Comma) {
                self.advance();
                values.push(self.parse_expr(0)?);
            }
        }
        Ok(Stmt::VarDecl { pos, names, values })
    }

    fn parse_const_decl(&mut self) -> PResult<Stmt> {
        let pos = self.advance().pos;
        let names = self.parse_name_list()?;
        self.eat(TokenKind::Assign)?;
        let mut values = vec![self.parse_expr(0)?];
        while self.at(TokenKind::Comma) {
            self.advance();
            values.push(self.parse_expr(0)?);
        }
        Ok(Stmt::ConstDecl { pos, names, values })
    }

    fn parse_param_decl(&mut self) -> PResult<Stmt> {
        let pos = self.advance().pos;
        let mut variadic = false;
        if self.at(TokenKind::Mul) {
            self.advance();
            variadic = true;
        }
        let names = self.parse_name_list()?;
        Ok(Stmt::ParamDecl {
            pos,
            names,
            variadic,
        })
    }

    fn parse_global_decl(&mut self) -> PResult<Stmt> {
        let pos = self.advance().pos;
        let names = self.parse_name_list()?;
        Ok(Stmt::GlobalDecl { pos, names })
    }

    fn parse_return(&mut self) -> PResult<Stmt> {
        let pos = self.advance().pos;
        let value = if self.at(TokenKind::Semi) || self.at(TokenKind::Eof) || self.at(TokenKind::RBrace) {
            None
        } else {
            Some(self.parse_expr(0)?)
        };
        Ok(Stmt::Return { pos, value })
    }

    fn parse_block(&mut self) -> PResult<Block> {
        self.eat(TokenKind::LBrace)?;
        let mut statements = Vec::new();
        self.skip_semis();
        while !self.at(TokenKind::RBrace) && !self.at(TokenKind::Eof) {
            match self.parse_statement() {
                Ok(stmt) => statements.push(stmt),
                Err(()) => self.synchronize(),
            }
            self.skip_semis();
        }
        self.eat(TokenKind::RBrace)?;
        Ok(Block { statements })
    }

    fn parse_if(&mut self) -> PResult<Stmt> {
        let pos = self.advance().pos;
        let cond = self.parse_expr(0)?;
        let then_block = self.parse_block()?;
        let else_block = if self.at(TokenKind::KwElse) {
            self.advance();
            if self.at(TokenKind::KwIf) {
                let nested = self.parse_if()?;
                Some(Block {
                    statements: vec![nested],
                })
            } else {
                Some(self.parse_block()?)
            }
        } else {
            None
        };
        Ok(Stmt::If {
            pos,
            cond,
            then_block,
            else_block,
        })
    }

    /// Consumes a trailing `else { ... }` if present; used by `for-in`,
    /// whose else branch runs iff the iterable yielded nothing.
    fn parse_optional_else_block(&mut self) -> PResult<Option<Block>> {
        if self.at(TokenKind::KwElse) {
            self.advance();
            Ok(Some(self.parse_block()?))
        } else {
            Ok(None)
        }
    }

    fn parse_for(&mut self) -> PResult<Stmt> {
        let pos = self.advance().pos;

        if self.at(TokenKind::LBrace) {
            let body = self.parse_block()?;
            return Ok(Stmt::For {
                pos,
                kind: ForKind::Infinite,
                body,
            });
        }

        // `for ident[, ident] in expr { ... }`
        if self.at(TokenKind::Ident) {
            let save = self.pos;
            let first = self.advance().text;
            if self.at(TokenKind::Comma) {
                self.advance();
                if let Ok(second) = self.eat(TokenKind::Ident) {
                    if self.at(TokenKind::KwIn) {
                        self.advance();
                        let iterable = self.parse_expr(0)?;
                        let body = self.parse_block()?;
                        let else_block = self.parse_optional_else_block()?;
                        return Ok(Stmt::For {
                            pos,
                            kind: ForKind::Range {
                                key: Some(first),
                                value: second.text,
                                iterable,
                                else_block,
                            },
                            body,
                        });
                    }
                }
                self.pos = save;
            } else if self.at(TokenKind::KwIn) {
                self.advance();
                let iterable = self.parse_expr(0)?;
                let body = self.parse_block()?;
                let else_block = self.parse_optional_else_block()?;
                return Ok(Stmt::For {
                    pos,
                    kind: ForKind::Range {
                        key: None,
                        value: first,
                        iterable,
                        else_block,
                    },
                    body,
                });
            } else {
                self.pos = save;
            }
        }

        // classic `for init; cond; post { ... }`, or plain `for cond { ... }`
        let save = self.pos;
        let init_or_cond = if self.at(TokenKind::Semi) {
            None
        } else {
            Some(self.parse_expr_or_assign_statement()?)
        };
        if self.at(TokenKind::Semi) {
            self.advance();
            let cond = if self.at(TokenKind::Semi) {
                None
            } else {
                Some(self.parse_expr(0)?)
            };
            self.eat(TokenKind::Semi)?;
            let post = if self.at(TokenKind::LBrace) {
                None
            } else {
                Some(Box::new(self.parse_expr_or_assign_statement()?))
            };
            let body = self.parse_block()?;
            return Ok(Stmt::For {
                pos,
                kind: ForKind::Classic {
                    init: init_or_cond.map(Box::new),
                    cond,
                    post,
                },
                body,
            });
        }

        // plain `for cond { ... }`: re-interpret init_or_cond as a bare expr
        self.pos = save;
        let cond = self.parse_expr(0)?;
        let body = self.parse_block()?;
        Ok(Stmt::For {
            pos,
            kind: ForKind::While { cond },
            body,
        })
    }

    fn parse_try(&mut self) -> PResult<Stmt> {
        let pos = self.advance().pos;
        let body = self.parse_block()?;
        let catch = if self.at(TokenKind::KwCatch) {
            self.advance();
            let name = if self.at(TokenKind::Ident) {
                Some(self.advance().text)
            } else {
                None
            };
            Some((name, self.parse_block()?))
        } else {
            None
        };
        let finally = if self.at(TokenKind::KwFinally) {
            self.advance();
            Some(self.parse_block()?)
        } else {
            None
        };
        Ok(Stmt::Try {
            pos,
            body,
            catch,
            finally,
        })
    }

    fn parse_import(&mut self) -> PResult<Stmt> {
        let pos = self.advance().pos;
        let mut alias = None;
        if self.at(TokenKind::Ident) {
            // `import alias "path"` form
            let save = self.pos;
            let name = self.advance().text;
            if self.at(TokenKind::String) {
                alias = Some(name);
            } else {
                self.pos = save;
            }
        }
        let path_tok = self.eat(TokenKind::String)?;
        Ok(Stmt::Import {
            pos,
            alias,
            path: path_tok.text,
        })
    }

    fn parse_expr_or_assign_statement(&mut self) -> PResult<Stmt> {
        let pos = self.cur().pos;
        let expr = self.parse_expr(0)?;
        if self.cur_kind().is_assign_op() {
            let op_tok = self.advance();
            let op = assign_op_for(op_tok.kind);
            let value = self.parse_expr(0)?;
            return Ok(Stmt::Assign {
                pos,
                target: Box::new(expr),
                op,
                value: Box::new(value),
            });
        }
        let _ = pos;
        Ok(Stmt::Expr(expr))
    }

    // --- expressions ------------------------------------------------

    fn parse_expr(&mut self, min_bp: u8) -> PResult<Expr> {
        let mut lhs = self.parse_unary()?;

        loop {
            let kind = self.cur_kind();

            if kind == TokenKind::Question {
                if min_bp > 0 {
                    break;
                }
                let pos = self.advance().pos;
                let then_expr = self.parse_expr(0)?;
                self.eat(TokenKind::Colon)?;
                let else_expr = self.parse_expr(0)?;
                lhs = Expr::Ternary {
                    pos,
                    cond: Box::new(lhs),
                    then_expr: Box::new(then_expr),
                    else_expr: Box::new(else_expr),
                };
                continue;
            }

            if kind == TokenKind::NullichCoalesce {
                let bp = 1;
                if bp < min_bp {
                    break;
                }
                let pos = self.advance().pos;
                let rhs = self.parse_expr(bp + 1)?;
                lhs = Expr::Nullish {
                    pos,
                    lhs: Box::new(lhs),
                    rhs: Box::new(rhs),
                };
                continue;
            }

            if kind == TokenKind::Pipe {
                let bp = precedence(kind).unwrap();
                if bp < min_bp {
                    break;
                }
                let pos = self.advance().pos;
                let rhs = self.parse_expr(bp + 1)?;
                lhs = Expr::Pipe {
                    pos,
                    lhs: Box::new(lhs),
                    rhs: Box::new(rhs),
                };
                continue;
            }

            let Some(bp) = precedence(kind) else { break };
            if bp < min_bp {
                break;
            }
            let next_min = if right_associative(kind) { bp } else { bp + 1 };
            let pos = self.advance().pos;
            let rhs = self.parse_expr(next_min)?;

            lhs = match kind {
                TokenKind::Land => Expr::Logical {
                    pos,
                    op: LogicalOp::And,
                    lhs: Box::new(lhs),
                    rhs: Box::new(rhs),
                },
                TokenKind::Lor => Expr::Logical {
                    pos,
                    op: LogicalOp::Or,
                    lhs: Box::new(lhs),
                    rhs: Box::new(rhs),
                },
                TokenKind::Tilde => Expr::Binary {
                    pos,
                    op: BinaryOp::Concat,
                    lhs: Box::new(lhs),
                    rhs: Box::new(rhs),
                },
                _ => Expr::Binary {
                    pos,
                    op: binary_op_for(kind),
                    lhs: Box::new(lhs),
                    rhs: Box::new(rhs),
                },
            };
        }

        Ok(lhs)
    }

    fn parse_unary(&mut self) -> PResult<Expr> {
        let pos = self.cur().pos;
        match self.cur_kind() {
            TokenKind::Sub => {
                self.advance();
                let operand = self.parse_unary()?;
                Ok(Expr::Unary {
                    pos,
                    op: UnaryOp::Neg,
                    operand: Box::new(operand),
                })
            }
            TokenKind::Add => {
                self.advance();
                let operand = self.parse_unary()?;
                Ok(Expr::Unary {
                    pos,
                    op: UnaryOp::Plus,
                    operand: Box::new(operand),
                })
            }
            TokenKind::Not => {
                self.advance();
                let operand = self.parse_unary()?;
                Ok(Expr::Unary {
                    pos,
                    op: UnaryOp::Not,
                    operand: Box::new(operand),
                })
            }
            TokenKind::Tilde => {
                self.advance();
                let operand = self.parse_unary()?;
                Ok(Expr::Unary {
                    pos,
                    op: UnaryOp::BitNot,
                    operand: Box::new(operand),
                })
            }
            TokenKind::Inc | TokenKind::Dec => {
                let op_tok = self.advance();
                let op = if op_tok.kind == TokenKind::Inc {
                    IncDecOp::Inc
                } else {
                    IncDecOp::Dec
                };
                let target = self.parse_unary()?;
                Ok(Expr::PreIncDec {
                    pos,
                    op,
                    target: Box::new(target),
                })
            }
            TokenKind::Mul => {
                // spread/unpack in call-argument / array-literal position
                self.advance();
                let value = self.parse_unary()?;
                Ok(Expr::Spread {
                    pos,
                    value: Box::new(value),
                })
            }
            _ => self.parse_postfix(),
        }
    }

    fn parse_postfix(&mut self) -> PResult<Expr> {
        let mut expr = self.parse_primary()?;
        loop {
            let pos = self.cur().pos;
            match self.cur_kind() {
                TokenKind::Dot => {
                    self.advance();
                    let field = self.eat(TokenKind::Ident)?.text;
                    expr = Expr::Selector {
                        pos,
                        target: Box::new(expr),
                        field,
                        optional: false,
                    };
                }
                TokenKind::NullDot => {
                    self.advance();
                    let field = self.eat(TokenKind::Ident)?.text;
                    expr = Expr::Selector {
                        pos,
                        target: Box::new(expr),
                        field,
                        optional: true,
                    };
                }
                TokenKind::LBrack => {
                    self.advance();
                    if self.at(TokenKind::Colon) {
                        self.advance();
                        let high = if self.at(TokenKind::RBrack) {
                            None
                        } else {
                            Some(Box::new(self.parse_expr(0)?))
                        };
                        self.eat(TokenKind::RBrack)?;
                        expr = Expr::Slice {
                            pos,
                            target: Box::new(expr),
                            low: None,
                            high,
                        };
                        continue;
                    }
                    let first = self.parse_expr(0)?;
                    if self.at(TokenKind::Colon) {
                        self.advance();
                        let high = if self.at(TokenKind::RBrack) {
                            None
                        } else {
                            Some(Box::new(self.parse_expr(0)?))
                        };
                        self.eat(TokenKind::RBrack)?;
                        expr = Expr::Slice {
                            pos,
                            target: Box::new(expr),
                            low: Some(Box::new(first)),
                            high,
                        };
                    } else {
                        self.eat(TokenKind::RBrack)?;
                        expr = Expr::Index {
                            pos,
                            target: Box::new(expr),
                            index: Box::new(first),
                            optional: false,
                        };
                    }
                }
                TokenKind::LParen => {
                    let (args, named_args, named_spread) = self.parse_call_args()?;
                    expr = Expr::Call {
                        pos,
                        callee: Box::new(expr),
                        args,
                        named_args,
                        named_spread,
                    };
                }
                TokenKind::Inc | TokenKind::Dec => {
                    let op_tok = self.advance();
                    let op = if op_tok.kind == TokenKind::Inc {
                        IncDecOp::Inc
                    } else {
                        IncDecOp::Dec
                    };
                    expr = Expr::PostIncDec {
                        pos,
                        op,
                        target: Box::new(expr),
                    };
                }
                _ => break,
            }
        }
        Ok(expr)
    }

    /// Call argument lists mirror parameter lists: positional values first,
    /// then named `name=value` pairs, then an optional `**dict` spread. An
    /// explicit `;` may separate the positional and named halves, but named
    /// args are also recognized by their own `name=value` shape wherever
    /// they appear, so the separator is accepted rather than required.
    fn parse_call_args(&mut self) -> PResult<(Vec<Arg>, Vec<(String, Expr)>, Option<Box<Expr>>)> {
        self.eat(TokenKind::LParen)?;
        let mut args = Vec::new();
        let mut named_args = Vec::new();
        let mut named_spread = None;
        while !self.at(TokenKind::RParen) {
            if self.at(TokenKind::Semi) {
                self.advance();
                continue;
            }
            if self.at(TokenKind::Pow) {
                self.advance();
                named_spread = Some(Box::new(self.parse_expr(0)?));
            } else if self.at(TokenKind::Mul) {
                self.advance();
                args.push(Arg::Spread(self.parse_expr(0)?));
            } else if self.at(TokenKind::Ident) {
                let save = self.pos;
                let name = self.advance().text;
                if self.at(TokenKind::Assign) {
                    self.advance();
                    let value = self.parse_expr(0)?;
                    named_args.push((name, value));
                } else {
                    self.pos = save;
                    args.push(Arg::Positional(self.parse_expr(0)?));
                }
            } else {
                args.push(Arg::Positional(self.parse_expr(0)?));
            }
            if self.at(TokenKind::Comma) || self.at(TokenKind::Semi) {
                self.advance();
            } else {
                break;
            }
        }
        self.eat(TokenKind::RParen)?;
        Ok((args, named_args, named_spread))
    }

    fn parse_primary(&mut self) -> PResult<Expr> {
        let tok = self.cur().clone();
        let pos = tok.pos;
        match tok.kind {
            TokenKind::Int => {
                self.advance();
                Ok(Expr::IntLit {
                    pos,
                    value: parse_int_literal(&tok.text),
                })
            }
            TokenKind::Uint => {
                self.advance();
                Ok(Expr::UintLit {
                    pos,
                    value: parse_int_literal(&tok.text) as u64,
                })
            }
            TokenKind::Float => {
                self.advance();
                Ok(Expr::FloatLit {
                    pos,
                    value: tok.text.parse().unwrap_or(0.0),
                })
            }
            TokenKind::Decimal => {
                self.advance();
                let (mantissa, scale) = parse_decimal_literal(&tok.text);
                Ok(Expr::DecimalLit {
                    pos,
                    mantissa,
                    scale,
                })
            }
            TokenKind::Char => {
                self.advance();
                Ok(Expr::CharLit {
                    pos,
                    value: tok.text.chars().next().unwrap_or('\0'),
                })
            }
            TokenKind::String | TokenKind::RawString | TokenKind::Heredoc => {
                self.advance();
                let raw = tok.kind != TokenKind::String;
                let parts = if raw {
                    vec![StringPart::Text(tok.text)]
                } else {
                    split_interpolations(&tok.text)
                };
                Ok(Expr::StringLit { pos, parts, raw })
            }
            TokenKind::True => {
                self.advance();
                Ok(Expr::BoolLit { pos, value: true })
            }
            TokenKind::False => {
                self.advance();
                Ok(Expr::BoolLit { pos, value: false })
            }
            TokenKind::Flag => {
                self.advance();
                Ok(Expr::FlagLit {
                    pos,
                    value: tok.text == "yes",
                })
            }
            TokenKind::Nil => {
                self.advance();
                Ok(Expr::NilLit { pos })
            }
            TokenKind::KwStdin => {
                self.advance();
                Ok(Expr::StdStream {
                    pos,
                    stream: StdStream::Stdin,
                })
            }
            TokenKind::KwStdout => {
                self.advance();
                Ok(Expr::StdStream {
                    pos,
                    stream: StdStream::Stdout,
                })
            }
            TokenKind::KwStderr => {
                self.advance();
                Ok(Expr::StdStream {
                    pos,
                    stream: StdStream::Stderr,
                })
            }
            TokenKind::Ident => {
                self.advance();
                Ok(Expr::Ident {
                    pos,
                    name: tok.text,
                })
            }
            TokenKind::LParen => {
                self.advance();
                let inner = self.parse_expr(0)?;
                self.eat(TokenKind::RParen)?;
                Ok(inner)
            }
            TokenKind::LBrack => self.parse_array_lit(),
            TokenKind::LBrace => self.parse_dict_lit(),
            TokenKind::KwFunc => self.parse_func_lit(),
            _ => {
                self.error(pos, format!("unexpected token {:?}", tok.kind));
                self.advance();
                Err(())
            }
        }
    }

    fn parse_array_lit(&mut self) -> PResult<Expr> {
        let pos = self.eat(TokenKind::LBrack)?.pos;
        let mut elements = Vec::new();
        while !self.at(TokenKind::RBrack) {
            elements.push(self.parse_expr(0)?);
            if self.at(TokenKind::Comma) {
                self.advance();
            } else {
                break;
            }
        }
        self.eat(TokenKind::RBrack)?;
        Ok(Expr::ArrayLit { pos, elements })
    }

    fn parse_dict_lit(&mut self) -> PResult<Expr> {
        let pos = self.eat(TokenKind::LBrace)?.pos;
        let mut entries = Vec::new();
        while !self.at(TokenKind::RBrace) {
            let key = if self.at(TokenKind::Ident) {
                let tok = self.advance();
                Expr::StringLit {
                    pos: tok.pos,
                    parts: vec![StringPart::Text(tok.text)],
                    raw: true,
                }
            } else {
                self.parse_expr(0)?
            };
            self.eat(TokenKind::Colon)?;
            let value = self.parse_expr(0)?;
            entries.push((key, value));
            if self.at(TokenKind::Comma) {
                self.advance();
            } else {
                break;
            }
        }
        self.eat(TokenKind::RBrace)?;
        Ok(Expr::DictLit { pos, entries })
    }

    fn parse_func_lit(&mut self) -> PResult<Expr> {
        let pos = self.eat(TokenKind::KwFunc)?.pos;
        self.eat(TokenKind::LParen)?;
        let mut params = FuncParams::default();
        while !self.at(TokenKind::RParen) {
            if self.at(TokenKind::Semi) {
                // Optional split between the positional and named halves
                // (spec.md §4.2); named params are also recognized by
                // their own `name=value` shape regardless of position.
                self.advance();
                continue;
            }
            if self.at(TokenKind::Mul) {
                self.advance();
                params.variadic_positional = Some(self.eat(TokenKind::Ident)?.text);
            } else if self.at(TokenKind::Pow) {
                self.advance();
                params.variadic_named = Some(self.eat(TokenKind::Ident)?.text);
            } else {
                let name = self.eat(TokenKind::Ident)?.text;
                if self.at(TokenKind::Assign) {
                    self.advance();
                    let default = self.parse_expr(0)?;
                    params.named.push((name, Some(default)));
                } else {
                    params.positional.push(name);
                }
            }
            if self.at(TokenKind::Comma) || self.at(TokenKind::Semi) {
                self.advance();
            } else {
                break;
            }
        }
        self.eat(TokenKind::RParen)?;
        let body = self.parse_block()?;
        Ok(Expr::FuncLit {
            pos,
            params: Rc::new(params),
            body: Rc::new(body),
        })
    }
}

fn assign_op_for(kind: TokenKind) -> AssignOp {
    use TokenKind::*;
    match kind {
        Assign => AssignOp::Assign,
        Define => AssignOp::Define,
        AddAssign => AssignOp::Add,
        SubAssign => AssignOp::Sub,
        MulAssign => AssignOp::Mul,
        QuoAssign => AssignOp::Quo,
        RemAssign => AssignOp::Rem,
        AndAssign => AssignOp::And,
        OrAssign => AssignOp::Or,
        XorAssign => AssignOp::Xor,
        ShlAssign => AssignOp::Shl,
        ShrAssign => AssignOp::Shr,
        AndNotAssign => AssignOp::AndNot,
        LandAssign => AssignOp::Land,
        LorAssign => AssignOp::Lor,
        NullichAssign => AssignOp::Nullich,
        _ => AssignOp::Assign,
    }
}

fn binary_op_for(kind: TokenKind) -> BinaryOp {
    use TokenKind::*;
    match kind {
        Add => BinaryOp::Add,
        Sub => BinaryOp::Sub,
        Mul => BinaryOp::Mul,
        Quo => BinaryOp::Quo,
        Rem => BinaryOp::Rem,
        Pow => BinaryOp::Pow,
        And => BinaryOp::BitAnd,
        Or => BinaryOp::BitOr,
        Xor => BinaryOp::BitXor,
        Shl => BinaryOp::Shl,
        Shr => BinaryOp::Shr,
        AndNot => BinaryOp::AndNot,
        Eql => BinaryOp::Eq,
        Neq => BinaryOp::Neq,
        Lss => BinaryOp::Lt,
        Leq => BinaryOp::Leq,
        Gtr => BinaryOp::Gt,
        Geq => BinaryOp::Geq,
        _ => BinaryOp::Add,
    }
}

fn parse_int_literal(text: &str) -> i64 {
    let body = text.trim_end_matches(['u', 'd']);
    if let Some(hex) = body.strip_prefix("0x").or_else(|| body.strip_prefix("0X")) {
        i64::from_str_radix(hex, 16).unwrap_or(0)
    } else if body.len() > 1 && body.starts_with('0') && body.bytes().all(|b| (b'0'..=b'7').contains(&b)) {
        i64::from_str_radix(body, 8).unwrap_or(0)
    } else {
        body.parse().unwrap_or(0)
    }
}

/// Parses a `d`-suffixed decimal literal like `19.99d` into
/// `(mantissa, scale)` such that the value equals `mantissa * 10^-scale`.
fn parse_decimal_literal(text: &str) -> (i128, u8) {
    let body = text.trim_end_matches('d');
    match body.split_once('.') {
        Some((int_part, frac_part)) => {
            let scale = frac_part.len() as u8;
            let digits = format!("{int_part}{frac_part}");
            (digits.parse().unwrap_or(0), scale)
        }
        None => (body.parse().unwrap_or(0), 0),
    }
}

/// Splits a scanned string literal's text on `${...}` interpolation
/// markers into alternating text/expression segments. Interpolated
/// expressions are parsed with a fresh sub-parser over a re-tokenized
/// slice.
fn split_interpolations(text: &str) -> Vec<StringPart> {
    let mut parts = Vec::new();
    let mut rest = text;
    loop {
        match rest.find("${") {
            None => {
                if !rest.is_empty() {
                    parts.push(StringPart::Text(rest.to_string()));
                }
                break;
            }
            Some(start) => {
                if start > 0 {
                    parts.push(StringPart::Text(rest[..start].to_string()));
                }
                let after = &rest[start + 2..];
                match after.find('}') {
                    None => {
                        parts.push(StringPart::Text(rest[start..].to_string()));
                        break;
                    }
                    Some(end) => {
                        let expr_src = &after[..end];
                        let (tokens, _errs) = crate::scanner::tokenize(
                            expr_src.as_bytes(),
                            0,
                            crate::scanner::ScannerConfig::default(),
                        );
                        let mut sub = Parser::new(tokens);
                        if let Ok(expr) = sub.parse_expr(0) {
                            parts.push(StringPart::Interp(Box::new(expr)));
                        }
                        rest = &after[end + 1..];
                    }
                }
            }
        }
    }
    if parts.is_empty() {
        parts.push(StringPart::Text(String::new()));
    }
    parts
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scanner::{ScannerConfig, tokenize};

    fn parse(src: &str) -> (Program, Vec<ParseError>) {
        let (tokens, scan_errs) = tokenize(src.as_bytes(), 0, ScannerConfig::default());
        assert!(scan_errs.is_empty(), "{scan_errs:?}");
        let mut parser = Parser::new(tokens);
        let program = parser.parse_program();
        (program, parser.errors().to_vec())
    }

    #[test]
    fn parses_var_decl_with_init() {
        let (program, errs) = parse("var x = 1 + 2");
        assert!(errs.is_empty(), "{errs:?}");
        assert_eq!(program.statements.len(), 1);
        match &program.statements[0] {
            Stmt::VarDecl { names, values, .. } => {
                assert_eq!(names, &["x"]);
                assert_eq!(values.len(), 1);
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn precedence_shapes_binary_tree() {
        let (program, errs) = parse("1 + 2 * 3");
        assert!(errs.is_empty());
        match &program.statements[0] {
            Stmt::Expr(Expr::Binary { op: BinaryOp::Add, rhs, .. }) => {
                assert!(matches!(**rhs, Expr::Binary { op: BinaryOp::Mul, .. }));
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn parses_if_else_chain() {
        let (program, errs) = parse("if x { 1 } else if y { 2 } else { 3 }");
        assert!(errs.is_empty(), "{errs:?}");
        assert!(matches!(program.statements[0], Stmt::If { .. }));
    }

    #[test]
    fn parses_func_literal_with_named_default() {
        let (program, errs) = parse("var f = func(a, b=1) { return a + b }");
        assert!(errs.is_empty(), "{errs:?}");
        match &program.statements[0] {
            Stmt::VarDecl { values, .. } => match &values[0] {
                Expr::FuncLit { params, .. } => {
                    assert_eq!(params.positional, vec!["a".to_string()]);
                    assert_eq!(params.named.len(), 1);
                }
                other => panic!("unexpected: {other:?}"),
            },
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn parses_call_with_named_and_spread_args() {
        let (program, errs) = parse("f(1, *xs, name=2)");
        assert!(errs.is_empty(), "{errs:?}");
        match &program.statements[0] {
            Stmt::Expr(Expr::Call {
                args, named_args, ..
            }) => {
                assert_eq!(args.len(), 2);
                assert_eq!(named_args.len(), 1);
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn parses_call_with_named_spread() {
        let (program, errs) = parse("f(1; k=2, **opts)");
        assert!(errs.is_empty(), "{errs:?}");
        match &program.statements[0] {
            Stmt::Expr(Expr::Call {
                args,
                named_args,
                named_spread,
                ..
            }) => {
                assert_eq!(args.len(), 1);
                assert_eq!(named_args.len(), 1);
                assert!(named_spread.is_some());
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn reports_error_and_continues_past_it() {
        let (program, errs) = parse("var = ; var y = 1");
        assert!(!errs.is_empty());
        assert!(program.statements.iter().any(|s| matches!(s, Stmt::VarDecl { names, .. } if names == &["y"])));
    }

    #[test]
    fn classic_for_loop_parses_three_clauses() {
        let (program, errs) = parse("for var i = 0; i < 10; i++ { }");
        assert!(errs.is_empty(), "{errs:?}");
        assert!(matches!(
            program.statements[0],
            Stmt::For {
                kind: ForKind::Classic { .. },
                ..
            }
        ));
    }
}
