//! Exported interface tables
//!
//! Every artifact seals an [`InterfaceTable`]: an ordered map from symbol
//! key to [`SignatureDescriptor`]. The table is the library's binary
//! surface. Clients compile against it, the linker resolves against it,
//! and the fingerprint delta diffs two of them for reports.
//!
//! Symbol keys are mangled with parameter types (`add(Int,Int)`) so
//! overloads occupy distinct entries; properties and classes use their
//! plain dotted path (`Counter.limit`, `Counter`).

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt::{self, Display, Formatter};

/// A type as it appears in signatures.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TypeRef {
    /// 64-bit integer.
    Int,
    /// Immutable string.
    Str,
    /// No value.
    Unit,
    /// A class type, by exported name.
    Named(String),
}

impl Display for TypeRef {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int => write!(f, "Int"),
            Self::Str => write!(f, "Str"),
            Self::Unit => write!(f, "Unit"),
            Self::Named(name) => write!(f, "{name}"),
        }
    }
}

/// What a symbol is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SymbolKind {
    /// A class declaration.
    Class,
    /// A free function or method.
    Function,
    /// A module-level property or class field.
    Property,
}

impl Display for SymbolKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Class => write!(f, "class"),
            Self::Function => write!(f, "function"),
            Self::Property => write!(f, "property"),
        }
    }
}

/// Declared visibility of a symbol.
///
/// `Private` declarations never reach an interface table; `Internal` ones
/// are recorded so evolution deltas can tell "narrowed" from "deleted",
/// but only `Public` symbols are linkable from other modules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Visibility {
    /// Linkable from any module.
    Public,
    /// Present in the artifact, not linkable across modules.
    Internal,
    /// Invisible outside the declaring unit.
    Private,
}

impl Visibility {
    /// True if other modules may bind to the symbol.
    #[inline]
    #[must_use]
    pub fn is_linkable(self) -> bool {
        self == Self::Public
    }
}

impl Display for Visibility {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Public => write!(f, "public"),
            Self::Internal => write!(f, "internal"),
            Self::Private => write!(f, "private"),
        }
    }
}

/// Declaration modifiers that may or may not be linkage-relevant.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Modifiers {
    /// Class or member may be overridden / subclassed.
    pub is_open: bool,
    /// Class cannot be constructed; member has no body.
    pub is_abstract: bool,
    /// Function body is captured into callers at compile time.
    pub is_inline: bool,
    /// Property value is captured into readers at compile time.
    pub is_const: bool,
    /// Mutable property initialized after construction.
    pub is_lateinit: bool,
    /// Function callable in infix position.
    pub is_infix: bool,
    /// Function declared tail-recursive.
    pub is_tailrec: bool,
}

impl Modifiers {
    /// No modifiers set.
    #[inline]
    #[must_use]
    pub fn none() -> Self {
        Self::default()
    }

    /// Names of the set flags, in declaration-keyword order.
    #[must_use]
    pub fn as_keywords(&self) -> Vec<&'static str> {
        let mut out = Vec::new();
        if self.is_open {
            out.push("open");
        }
        if self.is_abstract {
            out.push("abstract");
        }
        if self.is_inline {
            out.push("inline");
        }
        if self.is_const {
            out.push("const");
        }
        if self.is_lateinit {
            out.push("lateinit");
        }
        if self.is_infix {
            out.push("infix");
        }
        if self.is_tailrec {
            out.push("tailrec");
        }
        out
    }
}

/// A named, typed function parameter.
///
/// Names are kept for reporting but are not part of binary identity:
/// renaming a parameter changes neither the mangled key nor link outcome.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Param {
    /// Declared name.
    pub name: String,
    /// Declared type.
    pub ty: TypeRef,
}

/// Structural summary of one exported symbol.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignatureDescriptor {
    /// Class, function, or property.
    pub kind: SymbolKind,
    /// Declared visibility.
    pub visibility: Visibility,
    /// Parameters (functions only; empty otherwise).
    pub params: Vec<Param>,
    /// Return type for functions, value type for properties,
    /// `Unit` for classes.
    pub return_type: TypeRef,
    /// Declaration modifiers.
    pub modifiers: Modifiers,
    /// Property declared `var` rather than `val`.
    pub mutable: bool,
}

impl SignatureDescriptor {
    /// Descriptor for a class.
    #[must_use]
    pub fn class(visibility: Visibility, modifiers: Modifiers) -> Self {
        Self {
            kind: SymbolKind::Class,
            visibility,
            params: Vec::new(),
            return_type: TypeRef::Unit,
            modifiers,
            mutable: false,
        }
    }

    /// Descriptor for a function.
    #[must_use]
    pub fn function(
        visibility: Visibility,
        params: Vec<Param>,
        return_type: TypeRef,
        modifiers: Modifiers,
    ) -> Self {
        Self {
            kind: SymbolKind::Function,
            visibility,
            params,
            return_type,
            modifiers,
            mutable: false,
        }
    }

    /// Descriptor for a property.
    #[must_use]
    pub fn property(
        visibility: Visibility,
        ty: TypeRef,
        mutable: bool,
        modifiers: Modifiers,
    ) -> Self {
        Self {
            kind: SymbolKind::Property,
            visibility,
            params: Vec::new(),
            return_type: ty,
            modifiers,
            mutable,
        }
    }

    /// Parameter types only, for signature comparison.
    #[must_use]
    pub fn param_types(&self) -> Vec<&TypeRef> {
        self.params.iter().map(|p| &p.ty).collect()
    }
}

/// Mangle a function path with its parameter types.
///
/// `mangle("Counter.add", [Int, Int])` yields `Counter.add(Int,Int)`.
#[must_use]
pub fn mangle(path: &str, param_types: &[TypeRef]) -> String {
    let types = param_types
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(",");
    format!("{path}({types})")
}

/// Ordered exported-symbol table of one artifact.
///
/// Insertion order is declaration order; two artifacts of the same logical
/// library are structurally comparable entry by entry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InterfaceTable {
    symbols: IndexMap<String, SignatureDescriptor>,
}

impl InterfaceTable {
    /// Empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a symbol under its mangled key.
    ///
    /// # Errors
    /// Returns [`InterfaceError::DuplicateSymbol`] if the key is taken.
    pub fn insert(
        &mut self,
        key: impl Into<String>,
        descriptor: SignatureDescriptor,
    ) -> Result<(), InterfaceError> {
        let key = key.into();
        if self.symbols.contains_key(&key) {
            return Err(InterfaceError::DuplicateSymbol { key });
        }
        self.symbols.insert(key, descriptor);
        Ok(())
    }

    /// Look up a symbol by mangled key.
    #[inline]
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&SignatureDescriptor> {
        self.symbols.get(key)
    }

    /// All entries in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &SignatureDescriptor)> {
        self.symbols.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Entries other modules may bind to.
    pub fn linkable(&self) -> impl Iterator<Item = (&str, &SignatureDescriptor)> {
        self.iter().filter(|(_, d)| d.visibility.is_linkable())
    }

    /// Number of entries.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    /// True when no symbols are exported.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    /// True if the key is present.
    #[inline]
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.symbols.contains_key(key)
    }
}

/// Errors while building interface tables.
#[derive(Debug, thiserror::Error)]
pub enum InterfaceError {
    /// Two declarations mangled to the same key.
    #[error("duplicate symbol `{key}`")]
    DuplicateSymbol {
        /// The contested mangled key.
        key: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_fn() -> SignatureDescriptor {
        SignatureDescriptor::function(
            Visibility::Public,
            vec![Param {
                name: "name".into(),
                ty: TypeRef::Str,
            }],
            TypeRef::Str,
            Modifiers::none(),
        )
    }

    #[test]
    fn mangle_includes_param_types_only() {
        assert_eq!(mangle("greet", &[TypeRef::Str]), "greet(Str)");
        assert_eq!(
            mangle("Counter.add", &[TypeRef::Int, TypeRef::Int]),
            "Counter.add(Int,Int)"
        );
        assert_eq!(mangle("makeFoo", &[]), "makeFoo()");
    }

    #[test]
    fn overloads_occupy_distinct_entries() {
        let mut table = InterfaceTable::new();
        table.insert(mangle("greet", &[]), sample_fn()).unwrap();
        table
            .insert(mangle("greet", &[TypeRef::Str]), sample_fn())
            .unwrap();
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn duplicate_keys_are_rejected() {
        let mut table = InterfaceTable::new();
        table.insert("greet(Str)", sample_fn()).unwrap();
        let err = table.insert("greet(Str)", sample_fn()).unwrap_err();
        assert!(matches!(err, InterfaceError::DuplicateSymbol { key } if key == "greet(Str)"));
    }

    #[test]
    fn iteration_preserves_declaration_order() {
        let mut table = InterfaceTable::new();
        for key in ["zeta()", "alpha()", "mid()"] {
            table.insert(key, sample_fn()).unwrap();
        }
        let keys: Vec<_> = table.iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["zeta()", "alpha()", "mid()"]);
    }

    #[test]
    fn linkable_excludes_internal_symbols() {
        let mut table = InterfaceTable::new();
        table.insert("pub()", sample_fn()).unwrap();
        let mut hidden = sample_fn();
        hidden.visibility = Visibility::Internal;
        table.insert("hidden()", hidden).unwrap();

        let linkable: Vec<_> = table.linkable().map(|(k, _)| k).collect();
        assert_eq!(linkable, vec!["pub()"]);
    }

    #[test]
    fn modifier_keywords_render_in_declaration_order() {
        let mods = Modifiers {
            is_open: true,
            is_inline: true,
            ..Modifiers::none()
        };
        assert_eq!(mods.as_keywords(), vec!["open", "inline"]);
    }

    #[test]
    fn table_serde_round_trip_keeps_order() {
        let mut table = InterfaceTable::new();
        table.insert("b()", sample_fn()).unwrap();
        table.insert("a()", sample_fn()).unwrap();
        let json = serde_json::to_string(&table).unwrap();
        let back: InterfaceTable = serde_json::from_str(&json).unwrap();
        let keys: Vec<_> = back.iter().map(|(k, _)| k.to_owned()).collect();
        assert_eq!(keys, vec!["b()", "a()"]);
    }
}
