//! Parsed form of a ulib source unit
//!
//! The AST keeps declaration order and source positions; name resolution,
//! typing, and import recording all happen later, in lowering.

/// Source position of a node (start token).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate)struct Span {
    /// 1-based line.
    pub(crate)line: u32,
    /// 1-based column.
    pub(crate)column: u32,
}

/// A whole parsed unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate)struct Unit {
    /// Declared module name.
    pub(crate)module: String,
    /// Imported module names, in order.
    pub(crate)uses: Vec<String>,
    /// Top-level declarations, in order.
    pub(crate)decls: Vec<Decl>,
}

/// Declared visibility keyword, default public.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub(crate)enum VisKeyword {
    /// No keyword or `public`.
    #[default]
    Public,
    /// `internal`
    Internal,
    /// `private`
    Private,
}

/// Modifier keywords attached to a declaration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate)struct ModKeywords {
    /// `open`
    pub(crate)open: bool,
    /// `abstract`
    pub(crate)abstract_: bool,
    /// `inline`
    pub(crate)inline: bool,
    /// `const`
    pub(crate)const_: bool,
    /// `lateinit`
    pub(crate)lateinit: bool,
    /// `infix`
    pub(crate)infix: bool,
    /// `tailrec`
    pub(crate)tailrec: bool,
}

/// A type as written in source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate)enum TypeName {
    /// `Int`
    Int,
    /// `Str`
    Str,
    /// `Unit`
    Unit,
    /// A class name.
    Named(String),
}

/// Top-level declaration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate)enum Decl {
    /// A class.
    Class(ClassDecl),
    /// A free function.
    Fun(FunDecl),
    /// A module-level property.
    Prop(PropDecl),
}

/// Class member.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate)enum Member {
    /// A method.
    Fun(FunDecl),
    /// A field.
    Prop(PropDecl),
}

/// Possibly module-qualified name, `Base` or `lib.Base`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate)struct QualName {
    /// Qualifying module, when written.
    pub(crate)module: Option<String>,
    /// The name itself.
    pub(crate)name: String,
}

/// `class` declaration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate)struct ClassDecl {
    /// Class name.
    pub(crate)name: String,
    /// Visibility keyword.
    pub(crate)vis: VisKeyword,
    /// Modifier keywords.
    pub(crate)mods: ModKeywords,
    /// Superclass, when declared with `: Base`.
    pub(crate)parent: Option<QualName>,
    /// Members in declaration order.
    pub(crate)members: Vec<Member>,
    /// Position of the `class` keyword.
    pub(crate)span: Span,
}

/// `fun` declaration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate)struct FunDecl {
    /// Function name.
    pub(crate)name: String,
    /// Visibility keyword.
    pub(crate)vis: VisKeyword,
    /// Modifier keywords.
    pub(crate)mods: ModKeywords,
    /// Parameters in order.
    pub(crate)params: Vec<(String, TypeName)>,
    /// Declared return type, `Unit` when omitted.
    pub(crate)ret: TypeName,
    /// Body; absent only for `abstract` members.
    pub(crate)body: Option<FunBody>,
    /// Position of the `fun` keyword.
    pub(crate)span: Span,
}

/// Function body form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate)enum FunBody {
    /// `= expr`
    Expr(Expr),
    /// `{ stmt* }`
    Block(Vec<Stmt>),
}

/// `val`/`var` declaration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate)struct PropDecl {
    /// Property name.
    pub(crate)name: String,
    /// Visibility keyword.
    pub(crate)vis: VisKeyword,
    /// Modifier keywords.
    pub(crate)mods: ModKeywords,
    /// Declared with `var`.
    pub(crate)mutable: bool,
    /// Declared type.
    pub(crate)ty: TypeName,
    /// Initializer; absent only for `lateinit`.
    pub(crate)init: Option<Expr>,
    /// Position of the `val`/`var` keyword.
    pub(crate)span: Span,
}

/// Block statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate)enum Stmt {
    /// Expression evaluated for effect.
    Expr(Expr),
    /// `target = expr`; target shape validated in lowering.
    Assign {
        /// Assignment target as parsed.
        target: Expr,
        /// Right-hand side.
        value: Expr,
        /// Position of the `=`.
        span: Span,
    },
}

/// Expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate)enum Expr {
    /// Integer literal.
    Int(i64, Span),
    /// String literal.
    Str(String, Span),
    /// Bare identifier: parameter, local symbol, or module head.
    Ident(String, Span),
    /// `a + b`
    Add(Box<Expr>, Box<Expr>, Span),
    /// `f(args)` on a bare name.
    Call {
        /// Callee name.
        name: String,
        /// Arguments in order.
        args: Vec<Expr>,
        /// Position of the callee.
        span: Span,
    },
    /// `recv.name` field or qualified read.
    Field {
        /// Receiver expression.
        recv: Box<Expr>,
        /// Accessed name.
        name: String,
        /// Position of the name.
        span: Span,
    },
    /// `recv.name(args)` method or qualified call.
    Method {
        /// Receiver expression.
        recv: Box<Expr>,
        /// Called name.
        name: String,
        /// Arguments in order.
        args: Vec<Expr>,
        /// Position of the name.
        span: Span,
    },
    /// `new Class` / `new lib.Class`
    New {
        /// The class to construct.
        class: QualName,
        /// Position of `new`.
        span: Span,
    },
}

impl Expr {
    /// Position of an expression, for diagnostics.
    #[must_use]
    pub(crate)fn span(&self) -> Span {
        match self {
            Self::Int(_, s) | Self::Str(_, s) | Self::Ident(_, s) | Self::Add(_, _, s) => *s,
            Self::Call { span, .. }
            | Self::Field { span, .. }
            | Self::Method { span, .. }
            | Self::New { span, .. } => *span,
        }
    }
}
