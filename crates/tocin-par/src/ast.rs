//! AST node definitions.
//!
//! Nodes are plain sums dispatched by `match` — there is no visitor
//! hierarchy. Every node records the span of its originating token for
//! diagnostics. Expressions carry a mutable type-annotation slot that
//! stays `None` until the semantic analyzer fills it; after a clean
//! analysis every slot holds a concrete type, and poisoned subtrees hold
//! the `unknown` type rather than `None`.

use tocin_util::{Span, Symbol, TypeId};

/// One parsed source file.
#[derive(Debug, Clone, PartialEq)]
pub struct Module {
    /// Module name: from a `module` declaration, else the file stem.
    pub name: Symbol,
    pub body: Vec<Stmt>,
    pub span: Span,
}

/// An expression with its annotation slot.
#[derive(Debug, Clone, PartialEq)]
pub struct Expr {
    pub kind: ExprKind,
    pub span: Span,
    /// Filled by the semantic analyzer.
    pub ty: Option<TypeId>,
}

impl Expr {
    pub fn new(kind: ExprKind, span: Span) -> Self {
        Self {
            kind,
            span,
            ty: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind {
    Int(i64),
    Float(f64),
    Bool(bool),
    Str(Symbol),
    Char(char),
    Nil,
    /// Variable reference.
    Var(Symbol),
    /// `module::name`.
    Qualified { module: Symbol, name: Symbol },
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    Binary {
        op: BinaryOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    /// Parenthesized expression, kept for faithful pretty-printing.
    Group(Box<Expr>),
    /// Assignment; `op` is `Some` for compound forms (`+=` family).
    /// The target is restricted to variable / field / index forms.
    Assign {
        target: Box<Expr>,
        op: Option<BinaryOp>,
        value: Box<Expr>,
    },
    Call {
        callee: Box<Expr>,
        generic_args: Vec<TypeExpr>,
        args: Vec<Expr>,
    },
    Field {
        object: Box<Expr>,
        name: Symbol,
    },
    /// `obj?.name` — yields nil when the receiver is nil.
    SafeField {
        object: Box<Expr>,
        name: Symbol,
    },
    /// `e!!` — asserts a nullable is non-nil.
    NullAssert(Box<Expr>),
    /// `a ?: b` — `a` if non-nil, else `b`.
    NullCoalesce {
        value: Box<Expr>,
        fallback: Box<Expr>,
    },
    Index {
        object: Box<Expr>,
        index: Box<Expr>,
    },
    List(Vec<Expr>),
    Dict(Vec<(Expr, Expr)>),
    Lambda {
        params: Vec<Param>,
        ret: Option<TypeExpr>,
        body: Box<Expr>,
    },
    Await(Box<Expr>),
    /// String interpolation: alternating static text and expressions.
    Interp(Vec<InterpPart>),
    New {
        class: TypeExpr,
        args: Vec<Expr>,
    },
    Delete(Box<Expr>),
    /// `move x` — transfers ownership out of the named binding.
    Move(Box<Expr>),
    /// `ch <- v`.
    ChanSend {
        chan: Box<Expr>,
        value: Box<Expr>,
    },
    /// `<-ch`.
    ChanRecv(Box<Expr>),
    OptionSome(Box<Expr>),
    OptionNone,
    ResultOk(Box<Expr>),
    ResultErr(Box<Expr>),
    /// Placeholder produced by error recovery.
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Not,
    BitNot,
    PreInc,
    PreDec,
}

impl UnaryOp {
    pub fn symbol(self) -> &'static str {
        match self {
            UnaryOp::Neg => "-",
            UnaryOp::Not => "!",
            UnaryOp::BitNot => "~",
            UnaryOp::PreInc => "++",
            UnaryOp::PreDec => "--",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
    BitAnd,
    BitOr,
    BitXor,
    Shl,
    Shr,
}

impl BinaryOp {
    pub fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Rem => "%",
            BinaryOp::Eq => "==",
            BinaryOp::Ne => "!=",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Ge => ">=",
            BinaryOp::And => "and",
            BinaryOp::Or => "or",
            BinaryOp::BitAnd => "&",
            BinaryOp::BitOr => "|",
            BinaryOp::BitXor => "^",
            BinaryOp::Shl => "<<",
            BinaryOp::Shr => ">>",
        }
    }

    pub fn is_comparison(self) -> bool {
        matches!(
            self,
            BinaryOp::Eq | BinaryOp::Ne | BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge
        )
    }

    pub fn is_logical(self) -> bool {
        matches!(self, BinaryOp::And | BinaryOp::Or)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum InterpPart {
    Text(Symbol),
    Expr(Expr),
}

/// A statement or declaration.
#[derive(Debug, Clone, PartialEq)]
pub struct Stmt {
    pub kind: StmtKind,
    pub span: Span,
}

impl Stmt {
    pub fn new(kind: StmtKind, span: Span) -> Self {
        Self { kind, span }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum StmtKind {
    Expr(Expr),
    /// `let` (mutable) or `const` (immutable, initializer required).
    Let {
        name: Symbol,
        ty: Option<TypeExpr>,
        init: Option<Expr>,
        mutable: bool,
        /// The binding's resolved type, filled by the semantic
        /// analyzer (like the expression annotation slot).
        resolved: Option<TypeId>,
    },
    If {
        cond: Expr,
        then_body: Vec<Stmt>,
        elifs: Vec<(Expr, Vec<Stmt>)>,
        else_body: Option<Vec<Stmt>>,
    },
    While {
        cond: Expr,
        body: Vec<Stmt>,
    },
    For {
        var: Symbol,
        iterable: Expr,
        body: Vec<Stmt>,
    },
    Function(FunctionDecl),
    Return(Option<Expr>),
    Class(ClassDecl),
    Trait(TraitDecl),
    Impl(ImplDecl),
    Import(ImportDecl),
    Export(Box<Stmt>),
    /// `module a.b` declaration.
    Module(Vec<Symbol>),
    Match {
        scrutinee: Expr,
        cases: Vec<MatchCase>,
    },
    /// `go f(args)` — spawns the call on the runtime scheduler.
    Go(Expr),
    Select {
        cases: Vec<SelectCase>,
        default: Option<Vec<Stmt>>,
    },
    /// Placeholder produced by error recovery.
    Error,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FunctionDecl {
    pub name: Symbol,
    pub generics: Vec<GenericParam>,
    pub params: Vec<Param>,
    /// `None` means void.
    pub ret: Option<TypeExpr>,
    pub body: Vec<Stmt>,
    pub is_async: bool,
    pub is_pure: bool,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GenericParam {
    pub name: Symbol,
    /// Trait bounds, in declaration order.
    pub bounds: Vec<Symbol>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    pub name: Symbol,
    pub ty: TypeExpr,
    /// Move-by-value parameter: passing an argument moves the source.
    pub is_move: bool,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClassDecl {
    pub name: Symbol,
    pub generics: Vec<GenericParam>,
    pub superclass: Option<TypeExpr>,
    pub traits: Vec<TypeExpr>,
    pub fields: Vec<FieldDecl>,
    pub methods: Vec<FunctionDecl>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FieldDecl {
    pub name: Symbol,
    pub ty: TypeExpr,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TraitDecl {
    pub name: Symbol,
    pub generics: Vec<GenericParam>,
    pub methods: Vec<TraitMethod>,
    pub span: Span,
}

/// A trait method: a required signature, optionally with a default body.
#[derive(Debug, Clone, PartialEq)]
pub struct TraitMethod {
    pub decl: FunctionDecl,
    pub has_default: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ImplDecl {
    /// `None` for an inherent/extension impl (`impl Type:`).
    pub trait_name: Option<Symbol>,
    pub target: TypeExpr,
    pub methods: Vec<FunctionDecl>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ImportDecl {
    /// Dotted module path, e.g. `a.b`.
    pub path: Vec<Symbol>,
    /// `Some` for `from path import x [as y], …`; `None` imports the
    /// module itself. An empty list means `import *`.
    pub items: Option<Vec<(Symbol, Option<Symbol>)>>,
    /// `import a.b as alias`.
    pub alias: Option<Symbol>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MatchCase {
    pub pattern: Pattern,
    pub body: Vec<Stmt>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Pattern {
    pub kind: PatternKind,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PatternKind {
    /// `Name(p, …)` — also covers bare `None`.
    Constructor { name: Symbol, args: Vec<Pattern> },
    Literal(LiteralPat),
    /// A lowercase name binds the matched value.
    Binding(Symbol),
    Wildcard,
}

#[derive(Debug, Clone, PartialEq)]
pub enum LiteralPat {
    Int(i64),
    Float(f64),
    Str(Symbol),
    Char(char),
    Bool(bool),
    Nil,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SelectCase {
    pub op: SelectOp,
    pub body: Vec<Stmt>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SelectOp {
    /// `case v = <-ch:` or `case <-ch:`.
    Recv {
        chan: Expr,
        binding: Option<Symbol>,
    },
    /// `case ch <- e:`.
    Send { chan: Expr, value: Expr },
}

/// A surface type expression, before resolution to an interned type.
#[derive(Debug, Clone, PartialEq)]
pub struct TypeExpr {
    pub kind: TypeExprKind,
    pub span: Span,
}

impl TypeExpr {
    pub fn new(kind: TypeExprKind, span: Span) -> Self {
        Self { kind, span }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TypeExprKind {
    /// `Name` or `Name<Args>`; covers primitives, classes, traits,
    /// `Option`, `Result`, `Chan`, `Future`.
    Named {
        name: Symbol,
        args: Vec<TypeExpr>,
    },
    /// The receiver type inside a trait declaration.
    SelfType,
    /// `T?`.
    Nullable(Box<TypeExpr>),
    /// `*T`.
    Pointer(Box<TypeExpr>),
    /// `&T` / `&mut T`. The `mut` marker is the `move` keyword's sibling
    /// spelling `&mut`.
    Reference {
        inner: Box<TypeExpr>,
        mutable: bool,
    },
    /// `(T1, T2, …)` with two or more elements.
    Tuple(Vec<TypeExpr>),
    /// `[T]` or `[T; N]`.
    Array {
        elem: Box<TypeExpr>,
        len: Option<u64>,
    },
    /// `{K: V}`.
    Dict {
        key: Box<TypeExpr>,
        value: Box<TypeExpr>,
    },
    /// `(T1, T2) -> R`.
    Func {
        params: Vec<TypeExpr>,
        ret: Box<TypeExpr>,
    },
}
