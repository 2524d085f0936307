//! Abstract syntax tree: a closed set of statement and expression node
//! variants, each carrying its source position for diagnostics.

use gad_core::Pos;
use std::rc::Rc;

#[derive(Debug, Clone)]
pub struct Program {
    pub statements: Vec<Stmt>,
}

#[derive(Debug, Clone)]
pub enum Stmt {
    Expr(Expr),
    VarDecl {
        pos: Pos,
        names: Vec<String>,
        values: Vec<Expr>,
    },
    ConstDecl {
        pos: Pos,
        names: Vec<String>,
        values: Vec<Expr>,
    },
    ParamDecl {
        pos: Pos,
        names: Vec<String>,
        variadic: bool,
    },
    GlobalDecl {
        pos: Pos,
        names: Vec<String>,
    },
    Assign {
        pos: Pos,
        target: Box<Expr>,
        op: AssignOp,
        value: Box<Expr>,
    },
    Return {
        pos: Pos,
        value: Option<Expr>,
    },
    If {
        pos: Pos,
        cond: Expr,
        then_block: Block,
        else_block: Option<Block>,
    },
    For {
        pos: Pos,
        kind: ForKind,
        body: Block,
    },
    Break {
        pos: Pos,
    },
    Continue {
        pos: Pos,
    },
    Try {
        pos: Pos,
        body: Block,
        catch: Option<(Option<String>, Block)>,
        finally: Option<Block>,
    },
    Throw {
        pos: Pos,
        value: Expr,
    },
    Import {
        pos: Pos,
        alias: Option<String>,
        path: String,
    },
    Block(Block),
}

#[derive(Debug, Clone)]
pub enum ForKind {
    /// `for init; cond; post { ... }`, any clause may be absent.
    Classic {
        init: Option<Box<Stmt>>,
        cond: Option<Expr>,
        post: Option<Box<Stmt>>,
    },
    /// `for k, v in expr { ... } else { ... }`, the `else` block runs iff
    /// the iterable produced zero elements.
    Range {
        key: Option<String>,
        value: String,
        iterable: Expr,
        else_block: Option<Block>,
    },
    /// `for cond { ... }`
    While { cond: Expr },
    /// `for { ... }`
    Infinite,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssignOp {
    Assign,
    Define,
    Add,
    Sub,
    Mul,
    Quo,
    Rem,
    And,
    Or,
    Xor,
    Shl,
    Shr,
    AndNot,
    Land,
    Lor,
    Nullich,
}

#[derive(Debug, Clone)]
pub struct Block {
    pub statements: Vec<Stmt>,
}

#[derive(Debug, Clone)]
pub enum Expr {
    Ident {
        pos: Pos,
        name: String,
    },
    IntLit {
        pos: Pos,
        value: i64,
    },
    UintLit {
        pos: Pos,
        value: u64,
    },
    FloatLit {
        pos: Pos,
        value: f64,
    },
    DecimalLit {
        pos: Pos,
        mantissa: i128,
        scale: u8,
    },
    CharLit {
        pos: Pos,
        value: char,
    },
    BoolLit {
        pos: Pos,
        value: bool,
    },
    FlagLit {
        pos: Pos,
        value: bool,
    },
    NilLit {
        pos: Pos,
    },
    StringLit {
        pos: Pos,
        /// Plain segments interleaved with `${expr}` interpolations; a
        /// literal with no interpolations has a single `Text` segment.
        parts: Vec<StringPart>,
        raw: bool,
    },
    ArrayLit {
        pos: Pos,
        elements: Vec<Expr>,
    },
    DictLit {
        pos: Pos,
        entries: Vec<(Expr, Expr)>,
    },
    FuncLit {
        pos: Pos,
        params: Rc<FuncParams>,
        body: Rc<Block>,
    },
    Unary {
        pos: Pos,
        op: UnaryOp,
        operand: Box<Expr>,
    },
    Binary {
        pos: Pos,
        op: BinaryOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    Logical {
        pos: Pos,
        op: LogicalOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    Nullish {
        pos: Pos,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    Ternary {
        pos: Pos,
        cond: Box<Expr>,
        then_expr: Box<Expr>,
        else_expr: Box<Expr>,
    },
    Index {
        pos: Pos,
        target: Box<Expr>,
        index: Box<Expr>,
        optional: bool,
    },
    Slice {
        pos: Pos,
        target: Box<Expr>,
        low: Option<Box<Expr>>,
        high: Option<Box<Expr>>,
    },
    Selector {
        pos: Pos,
        target: Box<Expr>,
        field: String,
        optional: bool,
    },
    Call {
        pos: Pos,
        callee: Box<Expr>,
        args: Vec<Arg>,
        named_args: Vec<(String, Expr)>,
        /// `**expr`: a dict expanded as additional named arguments.
        named_spread: Option<Box<Expr>>,
    },
    Pipe {
        pos: Pos,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    PreIncDec {
        pos: Pos,
        op: IncDecOp,
        target: Box<Expr>,
    },
    PostIncDec {
        pos: Pos,
        op: IncDecOp,
        target: Box<Expr>,
    },
    Spread {
        pos: Pos,
        value: Box<Expr>,
    },
    ImmediateInvoke {
        pos: Pos,
        func: Box<Expr>,
        args: Vec<Arg>,
    },
    StdStream {
        pos: Pos,
        stream: StdStream,
    },
}

#[derive(Debug, Clone)]
pub enum StringPart {
    Text(String),
    Interp(Box<Expr>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StdStream {
    Stdin,
    Stdout,
    Stderr,
}

#[derive(Debug, Clone)]
pub enum Arg {
    Positional(Expr),
    Spread(Expr),
}

#[derive(Debug, Clone, Default)]
pub struct FuncParams {
    pub positional: Vec<String>,
    pub variadic_positional: Option<String>,
    pub named: Vec<(String, Option<Expr>)>,
    pub variadic_named: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Not,
    BitNot,
    Plus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Quo,
    Rem,
    Pow,
    BitAnd,
    BitOr,
    BitXor,
    Shl,
    Shr,
    AndNot,
    Eq,
    Neq,
    Lt,
    Leq,
    Gt,
    Geq,
    Concat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogicalOp {
    And,
    Or,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IncDecOp {
    Inc,
    Dec,
}

impl Expr {
    pub fn pos(&self) -> Pos {
        match self {
            Expr::Ident { pos, .. }
            | Expr::IntLit { pos, .. }
            | Expr::UintLit { pos, .. }
            | Expr::FloatLit { pos, .. }
            | Expr::DecimalLit { pos, .. }
            | Expr::CharLit { pos, .. }
            | Expr::BoolLit { pos, .. }
            | Expr::FlagLit { pos, .. }
            | Expr::NilLit { pos }
            | Expr::StringLit { pos, .. }
            | Expr::ArrayLit { pos, .. }
            | Expr::DictLit { pos, .. }
            | Expr::FuncLit { pos, .. }
            | Expr::Unary { pos, .. }
            | Expr::Binary { pos, .. }
            | Expr::Logical { pos, .. }
            | Expr::Nullish { pos, .. }
            | Expr::Ternary { pos, .. }
            | Expr::Index { pos, .. }
            | Expr::Slice { pos, .. }
            | Expr::Selector { pos, .. }
            | Expr::Call { pos, .. }
            | Expr::Pipe { pos, .. }
            | Expr::PreIncDec { pos, .. }
            | Expr::PostIncDec { pos, .. }
            | Expr::Spread { pos, .. }
            | Expr::ImmediateInvoke { pos, .. }
            | Expr::StdStream { pos, .. } => *pos,
        }
    }
}
