//! evolink Artifact Format
//!
//! Content-addressed compiled units with sealed interface tables.
//!
//! # Core Concepts
//!
//! - [`Artifact`]: immutable compiled unit (metadata, interface, code)
//! - [`ContentHash`]: 32-byte Blake3 hash giving every artifact its identity
//! - [`InterfaceTable`]: ordered exported-symbol surface clients link against
//! - [`CodeSection`]: lowered executable payload the sandbox interprets
//! - [`InterfaceDelta`]: structural diff of two surfaces, for reports only
//! - [`Diagnostic`]: structured finding tagged with its pipeline stage
//!
//! # Example
//!
//! ```rust,ignore
//! use evolink_artifact::{Artifact, ArtifactKind, ArtifactMeta};
//!
//! let artifact = Artifact::seal(meta, interface, code, imports, deps)?;
//! println!("sealed {} as {}", artifact.module(), artifact.hash().short());
//! assert!(artifact.verify());
//! ```

#![warn(unreachable_pub)]

// Core modules
mod artifact;
mod code;
mod diagnostic;
mod fingerprint;
mod hash;
mod interface;

// Re-exports
pub use artifact::{
    Artifact, ArtifactError, ArtifactKind, ArtifactMeta, DepRef, DEFAULT_TARGET, ENTRY_KEY,
};
pub use code::{
    AccessMode, Body, ClassCode, ClassRef, CodeSection, Expr, FunctionCode, ImportRecord,
    PropertyCode,
};
pub use diagnostic::{has_errors, Diagnostic, DiagnosticOrigin, Severity, SourceLocation};
pub use fingerprint::{FieldChange, InterfaceDelta, SymbolChange};
pub use hash::{ContentHash, HashError};
pub use interface::{
    mangle, InterfaceError, InterfaceTable, Modifiers, Param, SignatureDescriptor, SymbolKind,
    TypeRef, Visibility,
};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod integration_tests {
    use super::*;

    #[test]
    fn library_surface_survives_a_process_boundary() {
        let mut interface = InterfaceTable::new();
        interface
            .insert(
                mangle("greet", &[TypeRef::Str]),
                SignatureDescriptor::function(
                    Visibility::Public,
                    vec![Param {
                        name: "name".into(),
                        ty: TypeRef::Str,
                    }],
                    TypeRef::Str,
                    Modifiers::none(),
                ),
            )
            .unwrap();

        let artifact = Artifact::seal(
            ArtifactMeta {
                module: "lib".into(),
                kind: ArtifactKind::Library,
                producer: format!("refc/{VERSION}"),
                target: DEFAULT_TARGET.into(),
            },
            interface,
            CodeSection::new(),
            vec![],
            vec![],
        )
        .unwrap();

        let wire = serde_json::to_vec(&artifact).unwrap();
        let back: Artifact = serde_json::from_slice(&wire).unwrap();
        assert!(back.verify());
        assert_eq!(back.hash(), artifact.hash());
        assert!(back.interface().contains("greet(Str)"));
    }

    #[test]
    fn delta_between_evolutions_names_the_narrowed_symbol() {
        let mut baseline = InterfaceTable::new();
        baseline
            .insert(
                "limit",
                SignatureDescriptor::property(
                    Visibility::Public,
                    TypeRef::Int,
                    false,
                    Modifiers::none(),
                ),
            )
            .unwrap();
        let mut evolved = InterfaceTable::new();
        evolved
            .insert(
                "limit",
                SignatureDescriptor::property(
                    Visibility::Internal,
                    TypeRef::Int,
                    false,
                    Modifiers::none(),
                ),
            )
            .unwrap();

        let delta = InterfaceDelta::between(&baseline, &evolved);
        assert!(delta.render().contains("limit"));
        assert!(delta.render().contains("public -> internal"));
    }
}
