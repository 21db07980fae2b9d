//! Binary-level import resolution
//!
//! The client artifact is never recompiled: its import table pins the
//! signatures it observed at compile time, and [`resolve`] re-binds each
//! non-captured import against the substitute artifact's exported
//! interface. The rules:
//!
//! - symbol missing, or no longer exported → `unresolved symbol`
//! - symbol kind changed → `symbol kind mismatch`
//! - function return type changed → `signature mismatch` (parameter types
//!   are pinned by the mangled key, so a parameter change surfaces as
//!   `unresolved symbol`)
//! - property read: type must match; a `val` may freely become `var`
//! - property write: the substitute property must still be mutable →
//!   `property is immutable`
//! - construct: the class must not be abstract → `class is abstract`
//! - subclass: the class must be open or abstract → `class is not open`
//! - captured imports are never resolved
//!
//! Every failing import yields its own link diagnostic; resolution reports
//! them all rather than stopping at the first.

use evolink_artifact::{
    AccessMode, Artifact, Diagnostic, DiagnosticOrigin, ImportRecord, SignatureDescriptor,
};
use serde::{Deserialize, Serialize};

/// How one import was bound.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Binding {
    /// Bound to the substitute's symbol of the same key.
    Resolved {
        /// The mangled symbol key.
        key: String,
    },
    /// Compile-time capture; carries no runtime binding.
    Captured {
        /// The key the capture originally came from.
        key: String,
    },
}

/// The per-import binding map sealed into a linked image.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resolution {
    /// One binding per client import, in import-table order.
    pub bindings: Vec<Binding>,
}

impl Resolution {
    /// Number of imports bound to the substitute.
    #[must_use]
    pub fn resolved(&self) -> usize {
        self.bindings
            .iter()
            .filter(|b| matches!(b, Binding::Resolved { .. }))
            .count()
    }

    /// Number of imports satisfied by compile-time capture.
    #[must_use]
    pub fn captured(&self) -> usize {
        self.bindings.len() - self.resolved()
    }
}

/// Resolve a client's import table against a substitute artifact.
///
/// # Errors
/// Returns every link diagnostic when at least one import fails to bind.
pub fn resolve(client: &Artifact, substitute: &Artifact) -> Result<Resolution, Vec<Diagnostic>> {
    let mut bindings = Vec::with_capacity(client.imports().len());
    let mut errors = Vec::new();

    for import in client.imports() {
        if import.captured {
            bindings.push(Binding::Captured {
                key: import.key.clone(),
            });
            continue;
        }
        match bind(import, substitute) {
            Ok(binding) => bindings.push(binding),
            Err(diagnostic) => errors.push(diagnostic),
        }
    }

    if errors.is_empty() {
        tracing::debug!(
            client = client.module(),
            substitute = %substitute.hash().short(),
            resolved = bindings.len(),
            "image linked"
        );
        Ok(Resolution { bindings })
    } else {
        Err(errors)
    }
}

fn link_error(message: String) -> Diagnostic {
    Diagnostic::error(DiagnosticOrigin::Link, message)
}

fn bind(import: &ImportRecord, substitute: &Artifact) -> Result<Binding, Diagnostic> {
    let qualified = format!("{}.{}", import.module, import.key);

    if import.module != substitute.module() {
        return Err(link_error(format!(
            "unresolved symbol `{qualified}`: no artifact provides module `{}`",
            import.module
        )));
    }

    let Some(found) = substitute.interface().get(&import.key) else {
        return Err(link_error(format!("unresolved symbol `{qualified}`")));
    };
    if !found.visibility.is_linkable() {
        return Err(link_error(format!(
            "unresolved symbol `{qualified}`: narrowed to {}",
            found.visibility
        )));
    }
    if found.kind != import.expected.kind {
        return Err(link_error(format!(
            "symbol kind mismatch for `{qualified}`: expected {}, found {}",
            import.expected.kind, found.kind
        )));
    }

    check_mode(import, &qualified, found)?;

    Ok(Binding::Resolved {
        key: import.key.clone(),
    })
}

fn check_mode(
    import: &ImportRecord,
    qualified: &str,
    found: &SignatureDescriptor,
) -> Result<(), Diagnostic> {
    match import.mode {
        AccessMode::Call => {
            if found.return_type != import.expected.return_type {
                return Err(link_error(format!(
                    "signature mismatch for `{qualified}`: return type {} -> {}",
                    import.expected.return_type, found.return_type
                )));
            }
        }
        AccessMode::Read => {
            if found.return_type != import.expected.return_type {
                return Err(link_error(format!(
                    "signature mismatch for `{qualified}`: type {} -> {}",
                    import.expected.return_type, found.return_type
                )));
            }
        }
        AccessMode::Write => {
            if found.return_type != import.expected.return_type {
                return Err(link_error(format!(
                    "signature mismatch for `{qualified}`: type {} -> {}",
                    import.expected.return_type, found.return_type
                )));
            }
            if !found.mutable {
                return Err(link_error(format!("property `{qualified}` is immutable")));
            }
        }
        AccessMode::Construct => {
            if found.modifiers.is_abstract {
                return Err(link_error(format!("class `{qualified}` is abstract")));
            }
        }
        AccessMode::Extend => {
            if !found.modifiers.is_open && !found.modifiers.is_abstract {
                return Err(link_error(format!("class `{qualified}` is not open")));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use evolink_artifact::{
        mangle, ArtifactKind, ArtifactMeta, CodeSection, InterfaceTable, Modifiers, TypeRef,
        Visibility, DEFAULT_TARGET,
    };

    fn library(build: impl FnOnce(&mut InterfaceTable)) -> Artifact {
        let mut interface = InterfaceTable::new();
        build(&mut interface);
        Artifact::seal(
            ArtifactMeta {
                module: "lib".into(),
                kind: ArtifactKind::Library,
                producer: "test".into(),
                target: DEFAULT_TARGET.into(),
            },
            interface,
            CodeSection::new(),
            vec![],
            vec![],
        )
        .unwrap()
    }

    fn client_with(imports: Vec<ImportRecord>) -> Artifact {
        Artifact::seal(
            ArtifactMeta {
                module: "main".into(),
                kind: ArtifactKind::Program,
                producer: "test".into(),
                target: DEFAULT_TARGET.into(),
            },
            InterfaceTable::new(),
            CodeSection::new(),
            imports,
            vec![],
        )
        .unwrap()
    }

    fn fun_desc(ret: TypeRef) -> SignatureDescriptor {
        SignatureDescriptor::function(Visibility::Public, vec![], ret, Modifiers::none())
    }

    fn import(key: &str, mode: AccessMode, expected: SignatureDescriptor) -> ImportRecord {
        ImportRecord {
            module: "lib".into(),
            key: key.into(),
            mode,
            expected,
            captured: false,
        }
    }

    #[test]
    fn resolves_an_unchanged_function() {
        let lib = library(|i| {
            i.insert(mangle("greet", &[]), fun_desc(TypeRef::Str)).unwrap();
        });
        let client = client_with(vec![import(
            "greet()",
            AccessMode::Call,
            fun_desc(TypeRef::Str),
        )]);
        let resolution = resolve(&client, &lib).unwrap();
        assert_eq!(resolution.resolved(), 1);
        assert_eq!(resolution.captured(), 0);
    }

    #[test]
    fn deleted_symbol_is_unresolved() {
        let lib = library(|_| {});
        let client = client_with(vec![import(
            "greet()",
            AccessMode::Call,
            fun_desc(TypeRef::Str),
        )]);
        let errors = resolve(&client, &lib).unwrap_err();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].message.contains("unresolved symbol `lib.greet()`"));
        assert_eq!(errors[0].origin, DiagnosticOrigin::Link);
    }

    #[test]
    fn narrowed_symbol_is_unresolved_with_detail() {
        let lib = library(|i| {
            i.insert(
                mangle("greet", &[]),
                SignatureDescriptor::function(
                    Visibility::Internal,
                    vec![],
                    TypeRef::Str,
                    Modifiers::none(),
                ),
            )
            .unwrap();
        });
        let client = client_with(vec![import(
            "greet()",
            AccessMode::Call,
            fun_desc(TypeRef::Str),
        )]);
        let errors = resolve(&client, &lib).unwrap_err();
        assert!(errors[0].message.contains("unresolved symbol"));
        assert!(errors[0].message.contains("narrowed to internal"));
    }

    #[test]
    fn changed_return_type_is_a_signature_mismatch() {
        let lib = library(|i| {
            i.insert(mangle("count", &[]), fun_desc(TypeRef::Str)).unwrap();
        });
        let client = client_with(vec![import(
            "count()",
            AccessMode::Call,
            fun_desc(TypeRef::Int),
        )]);
        let errors = resolve(&client, &lib).unwrap_err();
        assert!(errors[0]
            .message
            .contains("signature mismatch for `lib.count()`: return type Int -> Str"));
    }

    #[test]
    fn kind_change_is_reported_as_kind_mismatch() {
        let lib = library(|i| {
            i.insert(
                "greet()",
                SignatureDescriptor::property(
                    Visibility::Public,
                    TypeRef::Str,
                    false,
                    Modifiers::none(),
                ),
            )
            .unwrap();
        });
        let client = client_with(vec![import(
            "greet()",
            AccessMode::Call,
            fun_desc(TypeRef::Str),
        )]);
        let errors = resolve(&client, &lib).unwrap_err();
        assert!(errors[0].message.contains("symbol kind mismatch"));
        assert!(errors[0].message.contains("expected function, found property"));
    }

    #[test]
    fn val_to_var_still_satisfies_readers() {
        let lib = library(|i| {
            i.insert(
                "limit",
                SignatureDescriptor::property(
                    Visibility::Public,
                    TypeRef::Int,
                    true,
                    Modifiers::none(),
                ),
            )
            .unwrap();
        });
        let client = client_with(vec![import(
            "limit",
            AccessMode::Read,
            SignatureDescriptor::property(Visibility::Public, TypeRef::Int, false, Modifiers::none()),
        )]);
        assert!(resolve(&client, &lib).is_ok());
    }

    #[test]
    fn var_to_val_breaks_writers_only() {
        let lib = library(|i| {
            i.insert(
                "counter",
                SignatureDescriptor::property(
                    Visibility::Public,
                    TypeRef::Int,
                    false,
                    Modifiers::none(),
                ),
            )
            .unwrap();
        });
        let reader = client_with(vec![import(
            "counter",
            AccessMode::Read,
            SignatureDescriptor::property(Visibility::Public, TypeRef::Int, true, Modifiers::none()),
        )]);
        assert!(resolve(&reader, &lib).is_ok());

        let writer = client_with(vec![import(
            "counter",
            AccessMode::Write,
            SignatureDescriptor::property(Visibility::Public, TypeRef::Int, true, Modifiers::none()),
        )]);
        let errors = resolve(&writer, &lib).unwrap_err();
        assert!(errors[0].message.contains("property `lib.counter` is immutable"));
    }

    #[test]
    fn construct_needs_a_concrete_class() {
        let mut mods = Modifiers::none();
        mods.is_abstract = true;
        let lib = library(|i| {
            i.insert("Shape", SignatureDescriptor::class(Visibility::Public, mods))
                .unwrap();
        });
        let client = client_with(vec![import(
            "Shape",
            AccessMode::Construct,
            SignatureDescriptor::class(Visibility::Public, Modifiers::none()),
        )]);
        let errors = resolve(&client, &lib).unwrap_err();
        assert!(errors[0].message.contains("class `lib.Shape` is abstract"));
    }

    #[test]
    fn extend_needs_open_or_abstract() {
        let lib = library(|i| {
            i.insert(
                "Base",
                SignatureDescriptor::class(Visibility::Public, Modifiers::none()),
            )
            .unwrap();
        });
        let mut open = Modifiers::none();
        open.is_open = true;
        let client = client_with(vec![import(
            "Base",
            AccessMode::Extend,
            SignatureDescriptor::class(Visibility::Public, open),
        )]);
        let errors = resolve(&client, &lib).unwrap_err();
        assert!(errors[0].message.contains("class `lib.Base` is not open"));
    }

    #[test]
    fn captured_imports_survive_symbol_deletion() {
        let lib = library(|_| {});
        let mut record = import("LIMIT", AccessMode::Read, fun_desc(TypeRef::Int));
        record.captured = true;
        let client = client_with(vec![record]);
        let resolution = resolve(&client, &lib).unwrap();
        assert_eq!(resolution.captured(), 1);
    }

    #[test]
    fn all_failing_imports_are_reported_together() {
        let lib = library(|_| {});
        let client = client_with(vec![
            import("gone()", AccessMode::Call, fun_desc(TypeRef::Unit)),
            import("also()", AccessMode::Call, fun_desc(TypeRef::Unit)),
        ]);
        let errors = resolve(&client, &lib).unwrap_err();
        assert_eq!(errors.len(), 2);
    }
}
