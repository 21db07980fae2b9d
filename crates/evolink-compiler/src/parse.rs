//! Recursive-descent parser for ulib units
//!
//! Fails fast: the first syntax error stops the parse and becomes the
//! unit's compile diagnostic. Modifier/visibility *placement* is accepted
//! liberally here; semantic validity (`const` on functions, bodies on
//! abstract members) is checked during lowering.

use crate::ast::{
    ClassDecl, Decl, Expr, FunBody, FunDecl, Member, ModKeywords, PropDecl, QualName, Span, Stmt,
    TypeName, Unit, VisKeyword,
};
use crate::lexer::{tokenize, Tok, Token};
use evolink_artifact::{Diagnostic, DiagnosticOrigin, SourceLocation};

/// Parse one source unit into its AST.
///
/// # Errors
/// Returns the lexical or syntax diagnostics that stopped the parse.
pub(crate) fn parse_unit(
    unit_label: &str,
    source: &str,
    origin: DiagnosticOrigin,
) -> Result<Unit, Vec<Diagnostic>> {
    let tokens = tokenize(unit_label, source, origin)?;
    Parser {
        unit_label,
        origin,
        tokens,
        pos: 0,
        uses: Vec::new(),
    }
    .unit()
    .map_err(|d| vec![d])
}

struct Parser<'a> {
    unit_label: &'a str,
    origin: DiagnosticOrigin,
    tokens: Vec<Token>,
    pos: usize,
    /// Modules named by `use`, collected before declarations so `new`
    /// can tell a module qualifier from a member access.
    uses: Vec<String>,
}

impl Parser<'_> {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn bump(&mut self) -> Option<Token> {
        let t = self.tokens.get(self.pos).cloned();
        if t.is_some() {
            self.pos += 1;
        }
        t
    }

    fn span_of(token: &Token) -> Span {
        Span {
            line: token.line,
            column: token.column,
        }
    }

    fn err_at(&self, span: Span, message: impl Into<String>) -> Diagnostic {
        Diagnostic::error(self.origin, message).at(SourceLocation::new(
            self.unit_label,
            span.line,
            span.column,
        ))
    }

    fn err_here(&self, message: impl Into<String>) -> Diagnostic {
        match self.peek() {
            Some(t) => {
                let span = Self::span_of(t);
                self.err_at(span, message)
            }
            None => Diagnostic::error(
                self.origin,
                format!("{}, found end of input", message.into()),
            ),
        }
    }

    fn expect(&mut self, want: &Tok, what: &str) -> Result<Token, Diagnostic> {
        match self.peek() {
            Some(t) if t.tok == *want => Ok(self.bump().unwrap_or_else(|| unreachable!())),
            Some(t) => {
                let found = t.tok.describe();
                Err(self.err_here(format!("expected {what}, found {found}")))
            }
            None => Err(self.err_here(format!("expected {what}"))),
        }
    }

    fn expect_ident(&mut self, what: &str) -> Result<(String, Span), Diagnostic> {
        match self.peek() {
            Some(Token {
                tok: Tok::Ident(_), ..
            }) => {
                let t = self.bump().unwrap_or_else(|| unreachable!());
                let span = Self::span_of(&t);
                match t.tok {
                    Tok::Ident(name) => Ok((name, span)),
                    _ => unreachable!(),
                }
            }
            Some(t) => {
                let found = t.tok.describe();
                Err(self.err_here(format!("expected {what}, found {found}")))
            }
            None => Err(self.err_here(format!("expected {what}"))),
        }
    }

    fn unit(mut self) -> Result<Unit, Diagnostic> {
        self.expect(&Tok::Module, "`module`")?;
        let (module, _) = self.expect_ident("module name")?;

        while matches!(self.peek(), Some(t) if t.tok == Tok::Use) {
            self.bump();
            let (name, _) = self.expect_ident("module name after `use`")?;
            self.uses.push(name);
        }

        let mut decls = Vec::new();
        while self.peek().is_some() {
            decls.push(self.decl()?);
        }

        Ok(Unit {
            module,
            uses: self.uses,
            decls,
        })
    }

    fn visibility(&mut self) -> VisKeyword {
        let vis = match self.peek().map(|t| &t.tok) {
            Some(Tok::Public) => VisKeyword::Public,
            Some(Tok::Internal) => VisKeyword::Internal,
            Some(Tok::Private) => VisKeyword::Private,
            _ => return VisKeyword::default(),
        };
        self.bump();
        vis
    }

    fn modifier_keywords(&mut self) -> ModKeywords {
        let mut mods = ModKeywords::default();
        loop {
            match self.peek().map(|t| &t.tok) {
                Some(Tok::Open) => mods.open = true,
                Some(Tok::Abstract) => mods.abstract_ = true,
                Some(Tok::Inline) => mods.inline = true,
                Some(Tok::Const) => mods.const_ = true,
                Some(Tok::Lateinit) => mods.lateinit = true,
                Some(Tok::Infix) => mods.infix = true,
                Some(Tok::Tailrec) => mods.tailrec = true,
                _ => return mods,
            }
            self.bump();
        }
    }

    fn decl(&mut self) -> Result<Decl, Diagnostic> {
        let vis = self.visibility();
        let mods = self.modifier_keywords();
        match self.peek().map(|t| &t.tok) {
            Some(Tok::Class) => Ok(Decl::Class(self.class_decl(vis, mods)?)),
            Some(Tok::Fun) => Ok(Decl::Fun(self.fun_decl(vis, mods)?)),
            Some(Tok::Val | Tok::Var) => Ok(Decl::Prop(self.prop_decl(vis, mods)?)),
            _ => Err(self.err_here("expected `class`, `fun`, `val`, or `var`")),
        }
    }

    fn qual_name(&mut self) -> Result<QualName, Diagnostic> {
        let (first, _) = self.expect_ident("name")?;
        if matches!(self.peek(), Some(t) if t.tok == Tok::Dot) {
            self.bump();
            let (name, _) = self.expect_ident("name after `.`")?;
            Ok(QualName {
                module: Some(first),
                name,
            })
        } else {
            Ok(QualName {
                module: None,
                name: first,
            })
        }
    }

    /// Class name after `new`. The dot is consumed as part of the class
    /// name only when the head names a `use`d module (`new lib.Task`);
    /// otherwise it starts a member access on the fresh instance
    /// (`new Square .area()`).
    fn new_class_name(&mut self) -> Result<QualName, Diagnostic> {
        let (first, _) = self.expect_ident("class name after `new`")?;
        if self.uses.iter().any(|u| u == &first)
            && matches!(self.peek(), Some(t) if t.tok == Tok::Dot)
        {
            self.bump();
            let (name, _) = self.expect_ident("class name after `.`")?;
            return Ok(QualName {
                module: Some(first),
                name,
            });
        }
        Ok(QualName {
            module: None,
            name: first,
        })
    }

    fn class_decl(&mut self, vis: VisKeyword, mods: ModKeywords) -> Result<ClassDecl, Diagnostic> {
        let kw = self.expect(&Tok::Class, "`class`")?;
        let span = Self::span_of(&kw);
        let (name, _) = self.expect_ident("class name")?;

        let parent = if matches!(self.peek(), Some(t) if t.tok == Tok::Colon) {
            self.bump();
            Some(self.qual_name()?)
        } else {
            None
        };

        self.expect(&Tok::LBrace, "`{`")?;
        let mut members = Vec::new();
        loop {
            match self.peek().map(|t| &t.tok) {
                Some(Tok::RBrace) => {
                    self.bump();
                    break;
                }
                Some(_) => {
                    let mvis = self.visibility();
                    let mmods = self.modifier_keywords();
                    match self.peek().map(|t| &t.tok) {
                        Some(Tok::Fun) => members.push(Member::Fun(self.fun_decl(mvis, mmods)?)),
                        Some(Tok::Val | Tok::Var) => {
                            members.push(Member::Prop(self.prop_decl(mvis, mmods)?));
                        }
                        _ => return Err(self.err_here("expected `fun`, `val`, `var`, or `}`")),
                    }
                }
                None => return Err(self.err_here("expected `}` to close class body")),
            }
        }

        Ok(ClassDecl {
            name,
            vis,
            mods,
            parent,
            members,
            span,
        })
    }

    fn type_name(&mut self) -> Result<TypeName, Diagnostic> {
        let (name, _) = self.expect_ident("type name")?;
        Ok(match name.as_str() {
            "Int" => TypeName::Int,
            "Str" => TypeName::Str,
            "Unit" => TypeName::Unit,
            _ => TypeName::Named(name),
        })
    }

    fn fun_decl(&mut self, vis: VisKeyword, mods: ModKeywords) -> Result<FunDecl, Diagnostic> {
        let kw = self.expect(&Tok::Fun, "`fun`")?;
        let span = Self::span_of(&kw);
        let (name, _) = self.expect_ident("function name")?;
        self.expect(&Tok::LParen, "`(`")?;

        let mut params = Vec::new();
        if !matches!(self.peek(), Some(t) if t.tok == Tok::RParen) {
            loop {
                let (pname, _) = self.expect_ident("parameter name")?;
                self.expect(&Tok::Colon, "`:` after parameter name")?;
                let ty = self.type_name()?;
                params.push((pname, ty));
                if matches!(self.peek(), Some(t) if t.tok == Tok::Comma) {
                    self.bump();
                } else {
                    break;
                }
            }
        }
        self.expect(&Tok::RParen, "`)`")?;

        let ret = if matches!(self.peek(), Some(t) if t.tok == Tok::Colon) {
            self.bump();
            self.type_name()?
        } else {
            TypeName::Unit
        };

        let body = match self.peek().map(|t| &t.tok) {
            Some(Tok::Assign) => {
                self.bump();
                Some(FunBody::Expr(self.expr()?))
            }
            Some(Tok::LBrace) => Some(FunBody::Block(self.block()?)),
            _ => None,
        };

        Ok(FunDecl {
            name,
            vis,
            mods,
            params,
            ret,
            body,
            span,
        })
    }

    fn prop_decl(&mut self, vis: VisKeyword, mods: ModKeywords) -> Result<PropDecl, Diagnostic> {
        let kw = self.bump().ok_or_else(|| self.err_here("expected `val` or `var`"))?;
        let span = Self::span_of(&kw);
        let mutable = kw.tok == Tok::Var;
        let (name, _) = self.expect_ident("property name")?;
        self.expect(&Tok::Colon, "`:` after property name")?;
        let ty = self.type_name()?;

        let init = if matches!(self.peek(), Some(t) if t.tok == Tok::Assign) {
            self.bump();
            Some(self.expr()?)
        } else {
            None
        };

        Ok(PropDecl {
            name,
            vis,
            mods,
            mutable,
            ty,
            init,
            span,
        })
    }

    fn block(&mut self) -> Result<Vec<Stmt>, Diagnostic> {
        self.expect(&Tok::LBrace, "`{`")?;
        let mut stmts = Vec::new();
        loop {
            match self.peek().map(|t| &t.tok) {
                Some(Tok::RBrace) => {
                    self.bump();
                    return Ok(stmts);
                }
                Some(_) => {
                    let expr = self.expr()?;
                    if matches!(self.peek(), Some(t) if t.tok == Tok::Assign) {
                        let eq = self.bump().unwrap_or_else(|| unreachable!());
                        let value = self.expr()?;
                        stmts.push(Stmt::Assign {
                            target: expr,
                            value,
                            span: Self::span_of(&eq),
                        });
                    } else {
                        stmts.push(Stmt::Expr(expr));
                    }
                }
                None => return Err(self.err_here("expected `}` to close block")),
            }
        }
    }

    fn expr(&mut self) -> Result<Expr, Diagnostic> {
        let mut lhs = self.postfix()?;
        while matches!(self.peek(), Some(t) if t.tok == Tok::Plus) {
            let plus = self.bump().unwrap_or_else(|| unreachable!());
            let rhs = self.postfix()?;
            lhs = Expr::Add(Box::new(lhs), Box::new(rhs), Self::span_of(&plus));
        }
        Ok(lhs)
    }

    fn postfix(&mut self) -> Result<Expr, Diagnostic> {
        let mut expr = self.primary()?;
        while matches!(self.peek(), Some(t) if t.tok == Tok::Dot) {
            self.bump();
            let (name, span) = self.expect_ident("member name after `.`")?;
            if matches!(self.peek(), Some(t) if t.tok == Tok::LParen) {
                let args = self.args()?;
                expr = Expr::Method {
                    recv: Box::new(expr),
                    name,
                    args,
                    span,
                };
            } else {
                expr = Expr::Field {
                    recv: Box::new(expr),
                    name,
                    span,
                };
            }
        }
        Ok(expr)
    }

    fn args(&mut self) -> Result<Vec<Expr>, Diagnostic> {
        self.expect(&Tok::LParen, "`(`")?;
        let mut args = Vec::new();
        if !matches!(self.peek(), Some(t) if t.tok == Tok::RParen) {
            loop {
                args.push(self.expr()?);
                if matches!(self.peek(), Some(t) if t.tok == Tok::Comma) {
                    self.bump();
                } else {
                    break;
                }
            }
        }
        self.expect(&Tok::RParen, "`)`")?;
        Ok(args)
    }

    fn primary(&mut self) -> Result<Expr, Diagnostic> {
        match self.peek().map(|t| t.tok.clone()) {
            Some(Tok::Int(v)) => {
                let t = self.bump().unwrap_or_else(|| unreachable!());
                Ok(Expr::Int(v, Self::span_of(&t)))
            }
            Some(Tok::Str(s)) => {
                let t = self.bump().unwrap_or_else(|| unreachable!());
                Ok(Expr::Str(s, Self::span_of(&t)))
            }
            Some(Tok::New) => {
                let t = self.bump().unwrap_or_else(|| unreachable!());
                let class = self.new_class_name()?;
                Ok(Expr::New {
                    class,
                    span: Self::span_of(&t),
                })
            }
            Some(Tok::Ident(_)) => {
                let (name, span) = self.expect_ident("expression")?;
                if matches!(self.peek(), Some(t) if t.tok == Tok::LParen) {
                    let args = self.args()?;
                    Ok(Expr::Call { name, args, span })
                } else {
                    Ok(Expr::Ident(name, span))
                }
            }
            _ => Err(self.err_here("expected expression")),
        }
    }
}
