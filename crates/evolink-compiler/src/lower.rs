//! Lowering: AST to sealed artifact parts
//!
//! Lowering runs in three passes over one unit:
//!
//! 1. collect declared class names,
//! 2. collect typed signatures for every declaration (duplicates and
//!    modifier misuse are rejected here),
//! 3. lower bodies to [`Expr`] trees, resolving every reference.
//!
//! Cross-module references resolve against dependency artifacts and are
//! recorded in the unit's import table with the signature observed *now*.
//! Calls to `inline` functions copy the dependency body into this unit;
//! reads of `const` properties copy the literal. Both leave a `captured`
//! import that the linker will never re-resolve.

use crate::ast;
use evolink_artifact::{
    mangle, AccessMode, Artifact, ArtifactKind, Body, ClassCode, ClassRef, CodeSection, DepRef,
    Diagnostic, DiagnosticOrigin, Expr, FunctionCode, ImportRecord, InterfaceTable, Modifiers,
    Param, PropertyCode, SignatureDescriptor, SourceLocation, SymbolKind, TypeRef, Visibility,
    ENTRY_KEY,
};
use std::collections::{HashMap, HashSet};

/// Everything lowering produces for one unit, ready to seal.
#[derive(Debug)]
pub(crate) struct Lowered {
    /// Declared module name.
    pub(crate) module: String,
    /// Program when the unit declares `fun main()`.
    pub(crate) kind: ArtifactKind,
    /// Exported surface.
    pub(crate) interface: InterfaceTable,
    /// Executable payload.
    pub(crate) code: CodeSection,
    /// Recorded cross-module bindings.
    pub(crate) imports: Vec<ImportRecord>,
    /// Dependencies pinned by hash.
    pub(crate) deps: Vec<DepRef>,
}

/// Lower a parsed unit against its dependency artifacts.
///
/// # Errors
/// Returns every diagnostic found; declarations are checked independently
/// so one bad function does not hide errors in the next.
pub(crate) fn lower_unit(
    unit: &ast::Unit,
    deps: &[Artifact],
    origin: DiagnosticOrigin,
) -> Result<Lowered, Vec<Diagnostic>> {
    let mut lowerer = Lowerer::new(unit, deps, origin);
    lowerer.check_uses();
    lowerer.collect_class_names();
    lowerer.collect_signatures();
    lowerer.lower_declarations();
    lowerer.finish()
}

#[derive(Debug, Clone)]
struct FnSig {
    params: Vec<(String, TypeRef)>,
    ret: TypeRef,
    vis: Visibility,
    mods: Modifiers,
}

#[derive(Debug, Clone)]
struct PropSig {
    ty: TypeRef,
    mutable: bool,
    vis: Visibility,
    mods: Modifiers,
}

#[derive(Debug, Clone)]
struct ClassSig {
    vis: Visibility,
    mods: Modifiers,
    parent: Option<ast::QualName>,
    // member keys are class-relative: `describe()`, `name`
    methods: HashMap<String, FnSig>,
    fields: HashMap<String, PropSig>,
}

#[derive(Debug, Default)]
struct LocalIndex {
    class_names: HashSet<String>,
    functions: HashMap<String, FnSig>,
    props: HashMap<String, PropSig>,
    classes: HashMap<String, ClassSig>,
}

/// Where a resolved member lives.
#[derive(Debug, Clone)]
enum Owner {
    Local,
    Dep { module: String, class: String },
}

struct Lowerer<'a> {
    unit: &'a ast::Unit,
    origin: DiagnosticOrigin,
    deps: HashMap<&'a str, &'a Artifact>,
    dep_order: Vec<&'a Artifact>,
    local: LocalIndex,
    imports: Vec<ImportRecord>,
    import_ids: HashMap<(String, String, AccessMode), usize>,
    interface: InterfaceTable,
    code: CodeSection,
    errors: Vec<Diagnostic>,
}

struct BodyEnv<'a> {
    params: &'a [(String, TypeRef)],
    /// Set when lowering a method or field initializer of this class.
    enclosing_class: Option<&'a str>,
}

impl<'a> Lowerer<'a> {
    fn new(unit: &'a ast::Unit, deps: &'a [Artifact], origin: DiagnosticOrigin) -> Self {
        let mut dep_map = HashMap::new();
        for dep in deps {
            dep_map.insert(dep.module(), dep);
        }
        Self {
            unit,
            origin,
            deps: dep_map,
            dep_order: deps.iter().collect(),
            local: LocalIndex::default(),
            imports: Vec::new(),
            import_ids: HashMap::new(),
            interface: InterfaceTable::new(),
            code: CodeSection::new(),
            errors: Vec::new(),
        }
    }

    fn err(&mut self, span: ast::Span, message: impl Into<String>) {
        self.errors.push(self.make_err(span, message));
    }

    fn make_err(&self, span: ast::Span, message: impl Into<String>) -> Diagnostic {
        Diagnostic::error(self.origin, message).at(SourceLocation::new(
            &self.unit.module,
            span.line,
            span.column,
        ))
    }

    fn check_uses(&mut self) {
        let mut seen = HashSet::new();
        for used in &self.unit.uses {
            let span = ast::Span { line: 1, column: 1 };
            if used == &self.unit.module {
                self.err(span, format!("module `{used}` cannot use itself"));
            } else if !seen.insert(used.clone()) {
                self.err(span, format!("duplicate use of module `{used}`"));
            } else if !self.deps.contains_key(used.as_str()) {
                self.err(span, format!("unknown module `{used}`"));
            }
        }
    }

    fn collect_class_names(&mut self) {
        for decl in &self.unit.decls {
            if let ast::Decl::Class(c) = decl {
                self.local.class_names.insert(c.name.clone());
            }
        }
    }

    fn visibility(vis: ast::VisKeyword) -> Visibility {
        match vis {
            ast::VisKeyword::Public => Visibility::Public,
            ast::VisKeyword::Internal => Visibility::Internal,
            ast::VisKeyword::Private => Visibility::Private,
        }
    }

    fn modifiers(mods: ast::ModKeywords) -> Modifiers {
        Modifiers {
            is_open: mods.open,
            is_abstract: mods.abstract_,
            is_inline: mods.inline,
            is_const: mods.const_,
            is_lateinit: mods.lateinit,
            is_infix: mods.infix,
            is_tailrec: mods.tailrec,
        }
    }

    fn lower_type(&mut self, ty: &ast::TypeName, span: ast::Span) -> TypeRef {
        match ty {
            ast::TypeName::Int => TypeRef::Int,
            ast::TypeName::Str => TypeRef::Str,
            ast::TypeName::Unit => TypeRef::Unit,
            ast::TypeName::Named(name) => {
                if !self.local.class_names.contains(name) {
                    self.err(span, format!("unknown type `{name}`"));
                }
                TypeRef::Named(name.clone())
            }
        }
    }

    fn fun_sig(&mut self, f: &ast::FunDecl, member: bool) -> FnSig {
        let mods = Self::modifiers(f.mods);
        if mods.is_const || mods.is_lateinit {
            self.err(f.span, "modifiers `const` and `lateinit` only apply to properties");
        }
        if mods.is_abstract && !member {
            self.err(f.span, "only class members may be abstract");
        }
        if mods.is_open && !member {
            self.err(f.span, "modifier `open` only applies to classes and members");
        }
        if mods.is_inline && member {
            self.err(f.span, "modifier `inline` only applies to top-level functions");
        }
        if mods.is_infix && f.params.len() != 1 {
            self.err(f.span, "infix function must take exactly one parameter");
        }
        if mods.is_abstract && f.body.is_some() {
            self.err(f.span, format!("abstract function `{}` must not have a body", f.name));
        }
        if !mods.is_abstract && f.body.is_none() {
            self.err(f.span, format!("function `{}` requires a body", f.name));
        }

        let mut names = HashSet::new();
        let mut params = Vec::new();
        for (name, ty) in &f.params {
            if !names.insert(name.clone()) {
                self.err(f.span, format!("duplicate parameter `{name}`"));
            }
            let ty = self.lower_type(ty, f.span);
            params.push((name.clone(), ty));
        }
        let ret = self.lower_type(&f.ret, f.span);
        FnSig {
            params,
            ret,
            vis: Self::visibility(f.vis),
            mods,
        }
    }

    fn prop_sig(&mut self, p: &ast::PropDecl, member: bool) -> PropSig {
        let mods = Self::modifiers(p.mods);
        if mods.is_inline || mods.is_infix || mods.is_tailrec || mods.is_abstract {
            self.err(p.span, format!("modifier not applicable to property `{}`", p.name));
        }
        if mods.is_open {
            self.err(p.span, "modifier `open` only applies to classes and members");
        }
        if mods.is_const {
            if member {
                self.err(p.span, "`const` only applies to module-level `val`");
            }
            if p.mutable {
                self.err(p.span, format!("const property `{}` must be `val`", p.name));
            }
            match p.init {
                Some(ast::Expr::Int(_, _) | ast::Expr::Str(_, _)) => {}
                _ => self.err(p.span, format!("const property `{}` requires a literal initializer", p.name)),
            }
        }
        if mods.is_lateinit {
            if member {
                self.err(p.span, "`lateinit` only applies to module-level properties");
            }
            if !p.mutable {
                self.err(p.span, format!("lateinit property `{}` must be `var`", p.name));
            }
            if p.init.is_some() {
                self.err(p.span, format!("lateinit property `{}` must not have an initializer", p.name));
            }
        } else if p.init.is_none() {
            self.err(p.span, format!("property `{}` requires an initializer", p.name));
        }

        let ty = self.lower_type(&p.ty, p.span);
        PropSig {
            ty,
            mutable: p.mutable,
            vis: Self::visibility(p.vis),
            mods,
        }
    }

    fn collect_signatures(&mut self) {
        for decl in &self.unit.decls {
            match decl {
                ast::Decl::Fun(f) => {
                    let sig = self.fun_sig(f, false);
                    let key = mangle(&f.name, &sig.params.iter().map(|(_, t)| t.clone()).collect::<Vec<_>>());
                    if f.name == "print" {
                        self.err(f.span, "cannot redeclare builtin `print`");
                    } else if self.local.functions.insert(key.clone(), sig).is_some() {
                        self.err(f.span, format!("duplicate symbol `{key}`"));
                    }
                }
                ast::Decl::Prop(p) => {
                    let sig = self.prop_sig(p, false);
                    if self.local.classes.contains_key(&p.name)
                        || self.local.props.insert(p.name.clone(), sig).is_some()
                    {
                        self.err(p.span, format!("duplicate symbol `{}`", p.name));
                    }
                }
                ast::Decl::Class(c) => {
                    let sig = self.class_sig(c);
                    if self.local.props.contains_key(&c.name)
                        || self.local.classes.insert(c.name.clone(), sig).is_some()
                    {
                        self.err(c.span, format!("duplicate symbol `{}`", c.name));
                    }
                }
            }
        }
    }

    fn class_sig(&mut self, c: &ast::ClassDecl) -> ClassSig {
        let mods = Self::modifiers(c.mods);
        if mods.is_inline || mods.is_const || mods.is_lateinit || mods.is_infix || mods.is_tailrec {
            self.err(c.span, format!("modifier not applicable to class `{}`", c.name));
        }

        if let Some(parent) = &c.parent {
            self.check_parent(c, parent);
        }

        let mut methods = HashMap::new();
        let mut fields = HashMap::new();
        let mut has_abstract_member = false;
        for member in &c.members {
            match member {
                ast::Member::Fun(f) => {
                    let sig = self.fun_sig(f, true);
                    if sig.mods.is_abstract {
                        has_abstract_member = true;
                    }
                    let key = mangle(&f.name, &sig.params.iter().map(|(_, t)| t.clone()).collect::<Vec<_>>());
                    if methods.insert(key.clone(), sig).is_some() {
                        self.err(f.span, format!("duplicate member `{}.{key}`", c.name));
                    }
                }
                ast::Member::Prop(p) => {
                    let sig = self.prop_sig(p, true);
                    if fields.insert(p.name.clone(), sig).is_some() {
                        self.err(p.span, format!("duplicate member `{}.{}`", c.name, p.name));
                    }
                }
            }
        }
        if has_abstract_member && !mods.is_abstract {
            self.err(c.span, format!("class `{}` has abstract members and must be abstract", c.name));
        }

        ClassSig {
            vis: Self::visibility(c.vis),
            mods,
            parent: c.parent.clone(),
            methods,
            fields,
        }
    }

    fn check_parent(&mut self, c: &ast::ClassDecl, parent: &ast::QualName) {
        match &parent.module {
            None => {
                if !self.local.class_names.contains(&parent.name) {
                    self.err(c.span, format!("unknown parent class `{}`", parent.name));
                }
                // openness of local parents is validated when lowering; the
                // class map is still being built here
            }
            Some(module) => {
                let Some(dep) = self.deps.get(module.as_str()).copied() else {
                    self.err(c.span, format!("unknown module `{module}`"));
                    return;
                };
                match dep.interface().get(&parent.name) {
                    None => {
                        self.err(c.span, format!("unresolved reference `{module}.{}`", parent.name));
                    }
                    Some(desc) if desc.kind != SymbolKind::Class => {
                        self.err(c.span, format!("`{module}.{}` is not a class", parent.name));
                    }
                    Some(desc) if !desc.visibility.is_linkable() => {
                        self.err(c.span, format!("symbol `{module}.{}` is {}", parent.name, desc.visibility));
                    }
                    Some(desc) => {
                        if !desc.modifiers.is_open && !desc.modifiers.is_abstract {
                            self.err(c.span, format!("class `{module}.{}` is not open", parent.name));
                        }
                        let expected = desc.clone();
                        self.record_import(module, parent.name.clone(), AccessMode::Extend, expected, false);
                    }
                }
            }
        }
    }

    fn record_import(
        &mut self,
        module: &str,
        key: String,
        mode: AccessMode,
        expected: SignatureDescriptor,
        captured: bool,
    ) -> usize {
        let id_key = (module.to_owned(), key.clone(), mode);
        if let Some(&idx) = self.import_ids.get(&id_key) {
            return idx;
        }
        let idx = self.imports.len();
        self.imports.push(ImportRecord {
            module: module.to_owned(),
            key,
            mode,
            expected,
            captured,
        });
        self.import_ids.insert(id_key, idx);
        idx
    }

    fn lower_declarations(&mut self) {
        for decl in &self.unit.decls {
            match decl {
                ast::Decl::Fun(f) => self.lower_fun(f),
                ast::Decl::Prop(p) => self.lower_prop(p),
                ast::Decl::Class(c) => self.lower_class(c),
            }
        }
    }

    fn lower_fun(&mut self, f: &ast::FunDecl) {
        let key = Self::fn_key(f);
        let Some(sig) = self.local.functions.get(&key).cloned() else {
            return; // signature collection already failed
        };

        if key == ENTRY_KEY && sig.ret != TypeRef::Unit {
            self.err(f.span, "`main` must return Unit");
        }

        let Some(ast_body) = &f.body else {
            // abstract top-level already rejected; nothing to emit
            return;
        };
        let params = sig.params.clone();
        let env = BodyEnv {
            params: &params,
            enclosing_class: None,
        };
        let Some(body) = self.lower_body(ast_body, &env, &sig.ret, f.span) else {
            return; // body lowering failed, error recorded
        };

        if sig.mods.is_inline && !inline_body_is_self_contained(&body) {
            self.err(
                f.span,
                format!("inline function `{}` body may only use parameters and literals", f.name),
            );
        }

        self.code.functions.insert(
            key.clone(),
            FunctionCode {
                params: sig.params.iter().map(|(n, _)| n.clone()).collect(),
                body: Some(body),
            },
        );
        if sig.vis != Visibility::Private {
            let descriptor = SignatureDescriptor::function(
                sig.vis,
                sig.params
                    .iter()
                    .map(|(n, t)| Param {
                        name: n.clone(),
                        ty: t.clone(),
                    })
                    .collect(),
                sig.ret.clone(),
                sig.mods,
            );
            if let Err(e) = self.interface.insert(key, descriptor) {
                self.err(f.span, e.to_string());
            }
        }
    }

    fn fn_key(f: &ast::FunDecl) -> String {
        // recompute the mangled key from declared types; unknown types were
        // already reported and lower to Named placeholders
        let types: Vec<TypeRef> = f
            .params
            .iter()
            .map(|(_, t)| match t {
                ast::TypeName::Int => TypeRef::Int,
                ast::TypeName::Str => TypeRef::Str,
                ast::TypeName::Unit => TypeRef::Unit,
                ast::TypeName::Named(n) => TypeRef::Named(n.clone()),
            })
            .collect();
        mangle(&f.name, &types)
    }

    fn lower_prop(&mut self, p: &ast::PropDecl) {
        let Some(sig) = self.local.props.get(&p.name).cloned() else {
            return;
        };
        let env = BodyEnv {
            params: &[],
            enclosing_class: None,
        };
        let initializer = match &p.init {
            Some(expr) => match self.lower_expr(expr, &env) {
                Ok((lowered, ty)) => {
                    if ty != sig.ty {
                        self.err(
                            p.span,
                            format!("initializer type {ty} does not match declared type {} of `{}`", sig.ty, p.name),
                        );
                    }
                    Some(lowered)
                }
                Err(d) => {
                    self.errors.push(d);
                    None
                }
            },
            None => None,
        };

        self.code.properties.insert(
            p.name.clone(),
            PropertyCode {
                initializer,
                mutable: sig.mutable,
                lateinit: sig.mods.is_lateinit,
            },
        );
        if sig.vis != Visibility::Private {
            let descriptor =
                SignatureDescriptor::property(sig.vis, sig.ty.clone(), sig.mutable, sig.mods);
            if let Err(e) = self.interface.insert(p.name.clone(), descriptor) {
                self.err(p.span, e.to_string());
            }
        }
    }

    fn lower_class(&mut self, c: &ast::ClassDecl) {
        let Some(sig) = self.local.classes.get(&c.name).cloned() else {
            return;
        };

        // local parent must allow subclassing
        if let Some(ast::QualName { module: None, name }) = &sig.parent {
            if let Some(parent_sig) = self.local.classes.get(name).cloned() {
                if !parent_sig.mods.is_open && !parent_sig.mods.is_abstract {
                    self.err(c.span, format!("class `{name}` is not open"));
                }
            }
        }

        let parent_ref = sig.parent.as_ref().and_then(|p| match &p.module {
            None => Some(ClassRef::Local(p.name.clone())),
            Some(module) => {
                let idx = self
                    .import_ids
                    .get(&(module.clone(), p.name.clone(), AccessMode::Extend))
                    .copied();
                idx.map(|import| ClassRef::Dep { import })
            }
        });

        let mut class_code = ClassCode {
            parent: parent_ref,
            methods: indexmap::IndexMap::new(),
            fields: indexmap::IndexMap::new(),
        };

        let exported = sig.vis != Visibility::Private;
        if exported {
            let descriptor = SignatureDescriptor::class(sig.vis, sig.mods);
            if let Err(e) = self.interface.insert(c.name.clone(), descriptor) {
                self.err(c.span, e.to_string());
            }
        }

        for member in &c.members {
            match member {
                ast::Member::Fun(f) => {
                    let key = Self::fn_key(f);
                    let Some(msig) = sig.methods.get(&key).cloned() else {
                        continue;
                    };
                    self.check_override(c, &sig, &key, f.span);
                    let body = match &f.body {
                        Some(b) => {
                            let params = msig.params.clone();
                            let env = BodyEnv {
                                params: &params,
                                enclosing_class: Some(&c.name),
                            };
                            self.lower_body(b, &env, &msig.ret, f.span)
                        }
                        None => None,
                    };
                    class_code.methods.insert(
                        key.clone(),
                        FunctionCode {
                            params: msig.params.iter().map(|(n, _)| n.clone()).collect(),
                            body,
                        },
                    );
                    if exported && msig.vis != Visibility::Private {
                        let descriptor = SignatureDescriptor::function(
                            msig.vis,
                            msig.params
                                .iter()
                                .map(|(n, t)| Param {
                                    name: n.clone(),
                                    ty: t.clone(),
                                })
                                .collect(),
                            msig.ret.clone(),
                            msig.mods,
                        );
                        if let Err(e) = self.interface.insert(format!("{}.{key}", c.name), descriptor) {
                            self.err(f.span, e.to_string());
                        }
                    }
                }
                ast::Member::Prop(p) => {
                    let Some(psig) = sig.fields.get(&p.name).cloned() else {
                        continue;
                    };
                    let initializer = match &p.init {
                        Some(expr) => {
                            let env = BodyEnv {
                                params: &[],
                                enclosing_class: Some(&c.name),
                            };
                            match self.lower_expr(expr, &env) {
                                Ok((lowered, ty)) => {
                                    if ty != psig.ty {
                                        self.err(
                                            p.span,
                                            format!(
                                                "initializer type {ty} does not match declared type {} of `{}.{}`",
                                                psig.ty, c.name, p.name
                                            ),
                                        );
                                    }
                                    Some(lowered)
                                }
                                Err(d) => {
                                    self.errors.push(d);
                                    None
                                }
                            }
                        }
                        None => None,
                    };
                    class_code.fields.insert(
                        p.name.clone(),
                        PropertyCode {
                            initializer,
                            mutable: psig.mutable,
                            lateinit: false,
                        },
                    );
                    if exported && psig.vis != Visibility::Private {
                        let descriptor = SignatureDescriptor::property(
                            psig.vis,
                            psig.ty.clone(),
                            psig.mutable,
                            psig.mods,
                        );
                        if let Err(e) = self
                            .interface
                            .insert(format!("{}.{}", c.name, p.name), descriptor)
                        {
                            self.err(p.span, e.to_string());
                        }
                    }
                }
            }
        }

        self.code.classes.insert(c.name.clone(), class_code);
    }

    fn check_override(&mut self, c: &ast::ClassDecl, sig: &ClassSig, key: &str, span: ast::Span) {
        let Some(parent) = &sig.parent else { return };
        let parent_sig = match &parent.module {
            None => self
                .local
                .classes
                .get(&parent.name)
                .and_then(|p| p.methods.get(key))
                .map(|m| (m.mods.is_open, m.mods.is_abstract)),
            Some(module) => self
                .deps
                .get(module.as_str())
                .and_then(|dep| dep.interface().get(&format!("{}.{key}", parent.name)))
                .map(|d| (d.modifiers.is_open, d.modifiers.is_abstract)),
        };
        if let Some((open, abstract_)) = parent_sig {
            if !open && !abstract_ {
                self.err(
                    span,
                    format!("member `{key}` of the parent of `{}` is not open", c.name),
                );
            }
        }
    }

    fn lower_body(
        &mut self,
        body: &ast::FunBody,
        env: &BodyEnv<'_>,
        declared_ret: &TypeRef,
        span: ast::Span,
    ) -> Option<Body> {
        match body {
            ast::FunBody::Expr(expr) => match self.lower_expr(expr, env) {
                Ok((lowered, ty)) => {
                    if &ty != declared_ret {
                        self.err(
                            span,
                            format!("body type {ty} does not match declared return type {declared_ret}"),
                        );
                    }
                    Some(Body::Expr(lowered))
                }
                Err(d) => {
                    self.errors.push(d);
                    None
                }
            },
            ast::FunBody::Block(stmts) => {
                if declared_ret != &TypeRef::Unit {
                    self.err(span, format!("block-bodied function declares return type {declared_ret}"));
                }
                let mut lowered = Vec::new();
                for stmt in stmts {
                    match self.lower_stmt(stmt, env) {
                        Ok(e) => lowered.push(e),
                        Err(d) => self.errors.push(d),
                    }
                }
                Some(Body::Block(lowered))
            }
        }
    }

    fn lower_stmt(&mut self, stmt: &ast::Stmt, env: &BodyEnv<'_>) -> Result<Expr, Diagnostic> {
        match stmt {
            ast::Stmt::Expr(expr) => Ok(self.lower_expr(expr, env)?.0),
            ast::Stmt::Assign {
                target,
                value,
                span,
            } => {
                let (value_expr, value_ty) = self.lower_expr(value, env)?;
                match target {
                    ast::Expr::Ident(name, ispan) => {
                        let Some(prop) = self.local.props.get(name).cloned() else {
                            return Err(self.make_err(*ispan, format!("unresolved reference `{name}`")));
                        };
                        if !prop.mutable {
                            return Err(self.make_err(*span, format!("property `{name}` is immutable")));
                        }
                        if value_ty != prop.ty {
                            return Err(self.make_err(
                                *span,
                                format!("cannot assign {value_ty} to `{name}` of type {}", prop.ty),
                            ));
                        }
                        Ok(Expr::LocalWrite {
                            key: name.clone(),
                            value: Box::new(value_expr),
                        })
                    }
                    ast::Expr::Field { recv, name, span: fspan } => {
                        let ast::Expr::Ident(head, _) = recv.as_ref() else {
                            return Err(self.make_err(*span, "invalid assignment target"));
                        };
                        if !self.is_module_head(head, env) {
                            return Err(self.make_err(*span, "invalid assignment target"));
                        }
                        let (desc, module) = self.dep_symbol(head, name, *fspan)?;
                        if desc.kind != SymbolKind::Property {
                            return Err(self.make_err(*fspan, format!("`{module}.{name}` is not a property")));
                        }
                        if !desc.mutable {
                            return Err(self.make_err(*span, format!("property `{module}.{name}` is immutable")));
                        }
                        if value_ty != desc.return_type {
                            return Err(self.make_err(
                                *span,
                                format!("cannot assign {value_ty} to `{module}.{name}` of type {}", desc.return_type),
                            ));
                        }
                        let import = self.record_import(
                            &module,
                            name.clone(),
                            AccessMode::Write,
                            desc,
                            false,
                        );
                        Ok(Expr::DepWrite {
                            import,
                            value: Box::new(value_expr),
                        })
                    }
                    _ => Err(self.make_err(*span, "invalid assignment target")),
                }
            }
        }
    }

    /// Look up `module.name` in a dependency's linkable surface.
    fn dep_symbol(
        &self,
        module: &str,
        key: &str,
        span: ast::Span,
    ) -> Result<(SignatureDescriptor, String), Diagnostic> {
        let Some(dep) = self.deps.get(module).copied() else {
            return Err(self.make_err(span, format!("unknown module `{module}`")));
        };
        match dep.interface().get(key) {
            None => Err(self.make_err(span, format!("unresolved reference `{module}.{key}`"))),
            Some(desc) if !desc.visibility.is_linkable() => Err(self.make_err(
                span,
                format!("symbol `{module}.{key}` is {}", desc.visibility),
            )),
            Some(desc) => Ok((desc.clone(), module.to_owned())),
        }
    }

    fn lower_expr(
        &mut self,
        expr: &ast::Expr,
        env: &BodyEnv<'_>,
    ) -> Result<(Expr, TypeRef), Diagnostic> {
        match expr {
            ast::Expr::Int(v, _) => Ok((Expr::Int(*v), TypeRef::Int)),
            ast::Expr::Str(s, _) => Ok((Expr::Str(s.clone()), TypeRef::Str)),
            ast::Expr::Add(lhs, rhs, span) => {
                let (l, lt) = self.lower_expr(lhs, env)?;
                let (r, rt) = self.lower_expr(rhs, env)?;
                match (&lt, &rt) {
                    (TypeRef::Int, TypeRef::Int) => {
                        Ok((Expr::Add(Box::new(l), Box::new(r)), TypeRef::Int))
                    }
                    (TypeRef::Str, TypeRef::Str) => {
                        Ok((Expr::Add(Box::new(l), Box::new(r)), TypeRef::Str))
                    }
                    _ => Err(self.make_err(*span, format!("cannot apply `+` to {lt} and {rt}"))),
                }
            }
            ast::Expr::Ident(name, span) => self.lower_ident(name, *span, env),
            ast::Expr::Call { name, args, span } => self.lower_call(name, args, *span, env),
            ast::Expr::Field { recv, name, span } => self.lower_field(recv, name, *span, env),
            ast::Expr::Method {
                recv,
                name,
                args,
                span,
            } => self.lower_method(recv, name, args, *span, env),
            ast::Expr::New { class, span } => self.lower_new(class, *span),
        }
    }

    fn lower_ident(
        &mut self,
        name: &str,
        span: ast::Span,
        env: &BodyEnv<'_>,
    ) -> Result<(Expr, TypeRef), Diagnostic> {
        if let Some((_, ty)) = env.params.iter().find(|(n, _)| n == name) {
            return Ok((Expr::Param(name.to_owned()), ty.clone()));
        }
        if let Some(class) = env.enclosing_class {
            if let Some((owner, ty)) = self.find_field_in_chain(class, name, span)? {
                if let Owner::Dep { module, class: owner_class } = owner {
                    let (desc, module) =
                        self.dep_symbol(&module, &format!("{owner_class}.{name}"), span)?;
                    self.record_import(
                        &module,
                        format!("{owner_class}.{name}"),
                        AccessMode::Read,
                        desc,
                        false,
                    );
                }
                return Ok((
                    Expr::SelfField {
                        field: name.to_owned(),
                    },
                    ty,
                ));
            }
        }
        if let Some(prop) = self.local.props.get(name).cloned() {
            return Ok((
                Expr::LocalRead {
                    key: name.to_owned(),
                },
                prop.ty,
            ));
        }
        Err(self.make_err(span, format!("unresolved reference `{name}`")))
    }

    fn lower_args(
        &mut self,
        args: &[ast::Expr],
        env: &BodyEnv<'_>,
    ) -> Result<(Vec<Expr>, Vec<TypeRef>), Diagnostic> {
        let mut lowered = Vec::new();
        let mut types = Vec::new();
        for arg in args {
            let (e, t) = self.lower_expr(arg, env)?;
            lowered.push(e);
            types.push(t);
        }
        Ok((lowered, types))
    }

    fn lower_call(
        &mut self,
        name: &str,
        args: &[ast::Expr],
        span: ast::Span,
        env: &BodyEnv<'_>,
    ) -> Result<(Expr, TypeRef), Diagnostic> {
        let (lowered_args, arg_types) = self.lower_args(args, env)?;

        if name == "print" {
            if lowered_args.len() != 1 {
                return Err(self.make_err(span, "`print` takes exactly one argument"));
            }
            if !matches!(arg_types[0], TypeRef::Int | TypeRef::Str) {
                return Err(self.make_err(
                    span,
                    format!("`print` argument must be Int or Str, found {}", arg_types[0]),
                ));
            }
            return Ok((
                Expr::Print(Box::new(lowered_args.into_iter().next().unwrap_or(Expr::Int(0)))),
                TypeRef::Unit,
            ));
        }

        let key = mangle(name, &arg_types);
        if let Some(class) = env.enclosing_class {
            if let Some((owner, sig_ret)) = self.find_method_in_chain(class, &key, span)? {
                if let Owner::Dep { module, class: owner_class } = owner {
                    let (desc, module) =
                        self.dep_symbol(&module, &format!("{owner_class}.{key}"), span)?;
                    self.record_import(
                        &module,
                        format!("{owner_class}.{key}"),
                        AccessMode::Call,
                        desc,
                        false,
                    );
                }
                return Ok((
                    Expr::SelfCall {
                        key,
                        args: lowered_args,
                    },
                    sig_ret,
                ));
            }
        }
        if let Some(sig) = self.local.functions.get(&key).cloned() {
            return Ok((
                Expr::LocalCall {
                    key,
                    args: lowered_args,
                },
                sig.ret,
            ));
        }
        Err(self.make_err(span, format!("unresolved reference `{key}`")))
    }

    fn lower_field(
        &mut self,
        recv: &ast::Expr,
        name: &str,
        span: ast::Span,
        env: &BodyEnv<'_>,
    ) -> Result<(Expr, TypeRef), Diagnostic> {
        // `lib.symbol` when the head is a used module and not a local binding
        if let ast::Expr::Ident(head, _) = recv {
            if self.is_module_head(head, env) {
                let (desc, module) = self.dep_symbol(head, name, span)?;
                if desc.kind != SymbolKind::Property {
                    return Err(self.make_err(span, format!("`{module}.{name}` is not a property")));
                }
                let ty = desc.return_type.clone();
                if desc.modifiers.is_const {
                    let literal = self.captured_const(&module, name, span)?;
                    self.record_import(&module, name.to_owned(), AccessMode::Read, desc, true);
                    return Ok((literal, ty));
                }
                let import = self.record_import(&module, name.to_owned(), AccessMode::Read, desc, false);
                return Ok((Expr::DepRead { import }, ty));
            }
        }

        let (recv_expr, recv_ty) = self.lower_expr(recv, env)?;
        let TypeRef::Named(class) = recv_ty else {
            return Err(self.make_err(span, format!("type {recv_ty} has no members")));
        };
        let (owner, ty) = self.resolve_instance_field(&class, name, span)?;
        if let Owner::Dep { module, class: owner_class } = owner {
            let (desc, module) = self.dep_symbol(&module, &format!("{owner_class}.{name}"), span)?;
            self.record_import(&module, format!("{owner_class}.{name}"), AccessMode::Read, desc, false);
        }
        Ok((
            Expr::FieldRead {
                recv: Box::new(recv_expr),
                field: name.to_owned(),
            },
            ty,
        ))
    }

    fn lower_method(
        &mut self,
        recv: &ast::Expr,
        name: &str,
        args: &[ast::Expr],
        span: ast::Span,
        env: &BodyEnv<'_>,
    ) -> Result<(Expr, TypeRef), Diagnostic> {
        let (lowered_args, arg_types) = self.lower_args(args, env)?;
        let key = mangle(name, &arg_types);

        // `lib.f(args)` when the head is a used module and not a local binding
        if let ast::Expr::Ident(head, _) = recv {
            if self.is_module_head(head, env) {
                let (desc, module) = self.dep_symbol(head, &key, span)?;
                if desc.kind != SymbolKind::Function {
                    return Err(self.make_err(span, format!("`{module}.{key}` is not a function")));
                }
                let ret = desc.return_type.clone();
                if desc.modifiers.is_inline {
                    let captured = self.captured_inline(&module, &key, span)?;
                    self.record_import(&module, key, AccessMode::Call, desc, true);
                    let (params, body) = captured;
                    return Ok((
                        Expr::Captured {
                            params,
                            body: Box::new(body),
                            args: lowered_args,
                        },
                        ret,
                    ));
                }
                let import = self.record_import(&module, key, AccessMode::Call, desc, false);
                return Ok((
                    Expr::DepCall {
                        import,
                        args: lowered_args,
                    },
                    ret,
                ));
            }
        }

        let (recv_expr, recv_ty) = self.lower_expr(recv, env)?;
        let TypeRef::Named(class) = recv_ty else {
            return Err(self.make_err(span, format!("type {recv_ty} has no members")));
        };
        let (owner, ret) = self.resolve_instance_method(&class, &key, span)?;
        if let Owner::Dep { module, class: owner_class } = owner {
            let (desc, module) = self.dep_symbol(&module, &format!("{owner_class}.{key}"), span)?;
            self.record_import(&module, format!("{owner_class}.{key}"), AccessMode::Call, desc, false);
        }
        Ok((
            Expr::MethodCall {
                recv: Box::new(recv_expr),
                key,
                args: lowered_args,
            },
            ret,
        ))
    }

    fn lower_new(&mut self, class: &ast::QualName, span: ast::Span) -> Result<(Expr, TypeRef), Diagnostic> {
        match &class.module {
            None => {
                let Some(sig) = self.local.classes.get(&class.name).cloned() else {
                    return Err(self.make_err(span, format!("unknown class `{}`", class.name)));
                };
                if sig.mods.is_abstract {
                    return Err(self.make_err(span, format!("class `{}` is abstract", class.name)));
                }
                Ok((
                    Expr::Construct {
                        class: ClassRef::Local(class.name.clone()),
                    },
                    TypeRef::Named(class.name.clone()),
                ))
            }
            Some(module) => {
                let (desc, module) = self.dep_symbol(module, &class.name, span)?;
                if desc.kind != SymbolKind::Class {
                    return Err(self.make_err(span, format!("`{module}.{}` is not a class", class.name)));
                }
                if desc.modifiers.is_abstract {
                    return Err(self.make_err(span, format!("class `{module}.{}` is abstract", class.name)));
                }
                let import =
                    self.record_import(&module, class.name.clone(), AccessMode::Construct, desc, false);
                Ok((
                    Expr::Construct {
                        class: ClassRef::Dep { import },
                    },
                    TypeRef::Named(class.name.clone()),
                ))
            }
        }
    }

    /// A bare head counts as a module path only when it names a `use`d
    /// module and nothing local shadows it.
    fn is_module_head(&self, head: &str, env: &BodyEnv<'_>) -> bool {
        if !self.unit.uses.iter().any(|u| u == head) {
            return false;
        }
        let shadowed = env.params.iter().any(|(n, _)| n == head)
            || self.local.props.contains_key(head)
            || env
                .enclosing_class
                .and_then(|c| self.local.classes.get(c))
                .is_some_and(|c| c.fields.contains_key(head));
        !shadowed
    }

    fn captured_const(&self, module: &str, key: &str, span: ast::Span) -> Result<Expr, Diagnostic> {
        let dep = self.deps.get(module).copied().ok_or_else(|| {
            self.make_err(span, format!("unknown module `{module}`"))
        })?;
        match dep.code().property(key).and_then(|p| p.initializer.clone()) {
            Some(lit @ (Expr::Int(_) | Expr::Str(_))) => Ok(lit),
            _ => Err(self.make_err(
                span,
                format!("const property `{module}.{key}` has no captured value"),
            )),
        }
    }

    fn captured_inline(
        &self,
        module: &str,
        key: &str,
        span: ast::Span,
    ) -> Result<(Vec<String>, Body), Diagnostic> {
        let dep = self.deps.get(module).copied().ok_or_else(|| {
            self.make_err(span, format!("unknown module `{module}`"))
        })?;
        match dep.code().function(key) {
            Some(FunctionCode {
                params,
                body: Some(body),
            }) => Ok((params.clone(), body.clone())),
            _ => Err(self.make_err(
                span,
                format!("inline function `{module}.{key}` has no captured body"),
            )),
        }
    }

    /// Walk a local class and its parents looking for a field.
    fn find_field_in_chain(
        &self,
        class: &str,
        field: &str,
        span: ast::Span,
    ) -> Result<Option<(Owner, TypeRef)>, Diagnostic> {
        let mut current = class.to_owned();
        loop {
            let Some(sig) = self.local.classes.get(&current) else {
                return Ok(None);
            };
            if let Some(f) = sig.fields.get(field) {
                return Ok(Some((Owner::Local, f.ty.clone())));
            }
            match &sig.parent {
                None => return Ok(None),
                Some(ast::QualName { module: None, name }) => current = name.clone(),
                Some(ast::QualName {
                    module: Some(m),
                    name,
                }) => {
                    return Ok(self
                        .dep_member_descriptor(m, name, field, span)?
                        .map(|(owner_class, desc)| {
                            (
                                Owner::Dep {
                                    module: m.clone(),
                                    class: owner_class,
                                },
                                desc.return_type,
                            )
                        }));
                }
            }
        }
    }

    fn find_method_in_chain(
        &self,
        class: &str,
        key: &str,
        span: ast::Span,
    ) -> Result<Option<(Owner, TypeRef)>, Diagnostic> {
        let mut current = class.to_owned();
        loop {
            let Some(sig) = self.local.classes.get(&current) else {
                return Ok(None);
            };
            if let Some(m) = sig.methods.get(key) {
                return Ok(Some((Owner::Local, m.ret.clone())));
            }
            match &sig.parent {
                None => return Ok(None),
                Some(ast::QualName { module: None, name }) => current = name.clone(),
                Some(ast::QualName {
                    module: Some(m),
                    name,
                }) => {
                    return Ok(self
                        .dep_member_descriptor(m, name, key, span)?
                        .map(|(owner_class, desc)| {
                            (
                                Owner::Dep {
                                    module: m.clone(),
                                    class: owner_class,
                                },
                                desc.return_type,
                            )
                        }));
                }
            }
        }
    }

    /// Walk a dependency class chain for `Class.member`, returning the
    /// owning class and the descriptor.
    fn dep_member_descriptor(
        &self,
        module: &str,
        class: &str,
        member_key: &str,
        span: ast::Span,
    ) -> Result<Option<(String, SignatureDescriptor)>, Diagnostic> {
        let Some(dep) = self.deps.get(module).copied() else {
            return Err(self.make_err(span, format!("unknown module `{module}`")));
        };
        let mut current = class.to_owned();
        loop {
            let dotted = format!("{current}.{member_key}");
            if let Some(desc) = dep.interface().get(&dotted) {
                if !desc.visibility.is_linkable() {
                    return Err(self.make_err(
                        span,
                        format!("symbol `{module}.{dotted}` is {}", desc.visibility),
                    ));
                }
                return Ok(Some((current, desc.clone())));
            }
            match dep.code().class(&current).and_then(|c| c.parent.clone()) {
                Some(ClassRef::Local(parent)) => current = parent,
                _ => return Ok(None),
            }
        }
    }

    /// Resolve a field on an instance whose static type is `class`.
    fn resolve_instance_field(
        &self,
        class: &str,
        field: &str,
        span: ast::Span,
    ) -> Result<(Owner, TypeRef), Diagnostic> {
        if self.local.classes.contains_key(class) {
            return self
                .find_field_in_chain(class, field, span)?
                .ok_or_else(|| self.make_err(span, format!("class `{class}` has no field `{field}`")));
        }
        for dep in &self.dep_order {
            if dep.interface().get(class).is_some() {
                return self
                    .dep_member_descriptor(dep.module(), class, field, span)?
                    .map(|(owner_class, desc)| {
                        (
                            Owner::Dep {
                                module: dep.module().to_owned(),
                                class: owner_class,
                            },
                            desc.return_type,
                        )
                    })
                    .ok_or_else(|| {
                        self.make_err(span, format!("class `{class}` has no field `{field}`"))
                    });
            }
        }
        Err(self.make_err(span, format!("unknown class `{class}`")))
    }

    fn resolve_instance_method(
        &self,
        class: &str,
        key: &str,
        span: ast::Span,
    ) -> Result<(Owner, TypeRef), Diagnostic> {
        if self.local.classes.contains_key(class) {
            return self
                .find_method_in_chain(class, key, span)?
                .ok_or_else(|| self.make_err(span, format!("class `{class}` has no member `{key}`")));
        }
        for dep in &self.dep_order {
            if dep.interface().get(class).is_some() {
                return self
                    .dep_member_descriptor(dep.module(), class, key, span)?
                    .map(|(owner_class, desc)| {
                        (
                            Owner::Dep {
                                module: dep.module().to_owned(),
                                class: owner_class,
                            },
                            desc.return_type,
                        )
                    })
                    .ok_or_else(|| {
                        self.make_err(span, format!("class `{class}` has no member `{key}`"))
                    });
            }
        }
        Err(self.make_err(span, format!("unknown class `{class}`")))
    }

    fn finish(self) -> Result<Lowered, Vec<Diagnostic>> {
        if !self.errors.is_empty() {
            return Err(self.errors);
        }
        let kind = if self.code.functions.contains_key(ENTRY_KEY) {
            ArtifactKind::Program
        } else {
            ArtifactKind::Library
        };
        let deps = self
            .dep_order
            .iter()
            .map(|d| DepRef {
                module: d.module().to_owned(),
                hash: *d.hash(),
            })
            .collect();
        Ok(Lowered {
            module: self.unit.module.clone(),
            kind,
            interface: self.interface,
            code: self.code,
            imports: self.imports,
            deps,
        })
    }
}

fn inline_body_is_self_contained(body: &Body) -> bool {
    fn expr_ok(e: &Expr) -> bool {
        match e {
            Expr::Int(_) | Expr::Str(_) | Expr::Param(_) => true,
            Expr::Add(l, r) => expr_ok(l) && expr_ok(r),
            _ => false,
        }
    }
    match body {
        Body::Expr(e) => expr_ok(e),
        Body::Block(_) => false,
    }
}
