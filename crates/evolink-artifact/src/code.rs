//! Compiled code sections
//!
//! The executable payload of an artifact: lowered expression trees for
//! every declaration, plus the import table for client units. References
//! are resolved at compile time into explicit local / dependency
//! operations; the sandbox interprets them without re-parsing source.

use crate::interface::SignatureDescriptor;
use serde::{Deserialize, Serialize};

/// How a client unit uses an imported symbol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessMode {
    /// Calls a function.
    Call,
    /// Reads a property.
    Read,
    /// Writes a property.
    Write,
    /// Constructs a class.
    Construct,
    /// Declares a subclass of a class.
    Extend,
}

impl std::fmt::Display for AccessMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let tag = match self {
            Self::Call => "call",
            Self::Read => "read",
            Self::Write => "write",
            Self::Construct => "construct",
            Self::Extend => "extend",
        };
        write!(f, "{tag}")
    }
}

/// One binding from a client unit to a dependency symbol.
///
/// Sealed at client-compile time with the signature observed then; the
/// linker later re-resolves `key` against a substitute artifact. Captured
/// imports (inline bodies, const values) are exempt from re-resolution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportRecord {
    /// Dependency module name.
    pub module: String,
    /// Mangled symbol key inside that module's interface table.
    pub key: String,
    /// How the client uses the symbol.
    pub mode: AccessMode,
    /// Signature observed against the baseline artifact.
    pub expected: SignatureDescriptor,
    /// Body or value was copied into this unit at compile time.
    pub captured: bool,
}

/// Reference to a class, either in this unit or through an import.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClassRef {
    /// Class declared in the same unit.
    Local(String),
    /// Class reached through the import table.
    Dep {
        /// Index into the unit's import records.
        import: usize,
    },
}

/// A lowered expression.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Expr {
    /// Integer literal.
    Int(i64),
    /// String literal.
    Str(String),
    /// Read of an enclosing function's parameter.
    Param(String),
    /// `Int` addition or `Str` concatenation.
    Add(Box<Expr>, Box<Expr>),
    /// Builtin: evaluate, write one stdout line, yield `Unit`.
    Print(Box<Expr>),
    /// Call a function declared in this unit.
    LocalCall {
        /// Mangled function key.
        key: String,
        /// Argument expressions.
        args: Vec<Expr>,
    },
    /// Read a property declared in this unit.
    LocalRead {
        /// Property key.
        key: String,
    },
    /// Write a property declared in this unit; yields `Unit`.
    LocalWrite {
        /// Property key.
        key: String,
        /// New value.
        value: Box<Expr>,
    },
    /// Call through the import table.
    DepCall {
        /// Index into the import records.
        import: usize,
        /// Argument expressions.
        args: Vec<Expr>,
    },
    /// Property read through the import table.
    DepRead {
        /// Index into the import records.
        import: usize,
    },
    /// Property write through the import table; yields `Unit`.
    DepWrite {
        /// Index into the import records.
        import: usize,
        /// New value.
        value: Box<Expr>,
    },
    /// `new C`: instantiate with field initializers.
    Construct {
        /// The class to instantiate.
        class: ClassRef,
    },
    /// Method call on an instance, dispatched by its runtime class.
    MethodCall {
        /// Receiver expression.
        recv: Box<Expr>,
        /// Mangled member key relative to the class (`greet()`).
        key: String,
        /// Argument expressions.
        args: Vec<Expr>,
    },
    /// Field read on an instance.
    FieldRead {
        /// Receiver expression.
        recv: Box<Expr>,
        /// Field name.
        field: String,
    },
    /// Read of the receiver's own field inside a method body.
    SelfField {
        /// Field name.
        field: String,
    },
    /// Call on the receiver inside a method body, virtual by runtime class.
    SelfCall {
        /// Mangled member key relative to the class.
        key: String,
        /// Argument expressions.
        args: Vec<Expr>,
    },
    /// Inline-function body captured at compile time.
    Captured {
        /// Parameter names the body binds.
        params: Vec<String>,
        /// The copied body.
        body: Box<Body>,
        /// Argument expressions evaluated at the call site.
        args: Vec<Expr>,
    },
}

/// Executable body of a function or method.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Body {
    /// `= expr`: the body's value.
    Expr(Expr),
    /// `{ stmt* }`: statements for effect, value `Unit`.
    Block(Vec<Expr>),
}

/// Lowered function or method.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionCode {
    /// Parameter names in order.
    pub params: Vec<String>,
    /// Body; `None` for abstract members.
    pub body: Option<Body>,
}

/// Lowered property.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertyCode {
    /// Initializer; `None` for `lateinit`.
    pub initializer: Option<Expr>,
    /// Declared `var`.
    pub mutable: bool,
    /// Declared `lateinit`: reads before the first write fail at runtime.
    pub lateinit: bool,
}

/// Lowered class.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassCode {
    /// Superclass, when declared.
    pub parent: Option<ClassRef>,
    /// Methods by mangled member key, in declaration order.
    pub methods: indexmap::IndexMap<String, FunctionCode>,
    /// Fields by name, in declaration order.
    pub fields: indexmap::IndexMap<String, PropertyCode>,
}

/// The full executable payload of one compiled unit.
///
/// Unlike the interface table, the code section keeps private and
/// internal declarations: they still run, they just aren't linkable.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeSection {
    /// Free functions by mangled key.
    pub functions: indexmap::IndexMap<String, FunctionCode>,
    /// Module-level properties by name.
    pub properties: indexmap::IndexMap<String, PropertyCode>,
    /// Classes by name.
    pub classes: indexmap::IndexMap<String, ClassCode>,
}

impl CodeSection {
    /// Empty code section.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up a free function.
    #[inline]
    #[must_use]
    pub fn function(&self, key: &str) -> Option<&FunctionCode> {
        self.functions.get(key)
    }

    /// Look up a module-level property.
    #[inline]
    #[must_use]
    pub fn property(&self, key: &str) -> Option<&PropertyCode> {
        self.properties.get(key)
    }

    /// Look up a class.
    #[inline]
    #[must_use]
    pub fn class(&self, key: &str) -> Option<&ClassCode> {
        self.classes.get(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn code_section_serde_round_trip() {
        let mut section = CodeSection::new();
        section.functions.insert(
            "greet(Str)".into(),
            FunctionCode {
                params: vec!["name".into()],
                body: Some(Body::Expr(Expr::Add(
                    Box::new(Expr::Str("hello ".into())),
                    Box::new(Expr::Param("name".into())),
                ))),
            },
        );
        section.properties.insert(
            "counter".into(),
            PropertyCode {
                initializer: Some(Expr::Int(0)),
                mutable: true,
                lateinit: false,
            },
        );

        let json = serde_json::to_string(&section).unwrap();
        let back: CodeSection = serde_json::from_str(&json).unwrap();
        assert_eq!(section, back);
    }

    #[test]
    fn abstract_members_have_no_body() {
        let code = FunctionCode {
            params: vec![],
            body: None,
        };
        assert!(code.body.is_none());
    }
}
