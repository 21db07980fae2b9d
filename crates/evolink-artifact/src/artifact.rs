//! Sealed compiled artifacts
//!
//! An [`Artifact`] is the immutable output of compiling one source unit:
//! metadata, exported interface table, code section, and (for client
//! units) the import table. Its [`ContentHash`] is computed over the
//! canonical encoding of everything else at seal time and never changes;
//! [`Artifact::verify`] recomputes it after a trip across a process
//! boundary.

use crate::code::{CodeSection, FunctionCode, ImportRecord};
use crate::hash::{ContentHash, HashError};
use crate::interface::InterfaceTable;
use serde::{Deserialize, Serialize};

/// Mangled key of a program's entry point.
pub const ENTRY_KEY: &str = "main()";

/// Target tag of the interpreted reference format.
pub const DEFAULT_TARGET: &str = "ulib-v1";

/// What role a compiled unit plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    /// A library other units link against.
    Library,
    /// An executable unit with an entry point and an import table.
    Program,
}

/// Producer and platform provenance of an artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactMeta {
    /// Module name declared by the source unit.
    pub module: String,
    /// Library or program.
    pub kind: ArtifactKind,
    /// Compiler identity, `name/version`.
    pub producer: String,
    /// Target platform tag.
    pub target: String,
}

/// Pinned dependency of a client artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepRef {
    /// Dependency module name.
    pub module: String,
    /// Content hash of the artifact compiled against.
    pub hash: ContentHash,
}

// Everything the content hash covers, borrowed to avoid clones at seal time.
#[derive(Serialize)]
struct SealedParts<'a> {
    meta: &'a ArtifactMeta,
    interface: &'a InterfaceTable,
    code: &'a CodeSection,
    imports: &'a [ImportRecord],
    deps: &'a [DepRef],
}

/// One immutable compiled unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artifact {
    hash: ContentHash,
    meta: ArtifactMeta,
    interface: InterfaceTable,
    code: CodeSection,
    imports: Vec<ImportRecord>,
    deps: Vec<DepRef>,
}

impl Artifact {
    /// Seal an artifact, computing its content hash.
    ///
    /// # Errors
    /// Returns an error if the parts fail to serialize for hashing.
    pub fn seal(
        meta: ArtifactMeta,
        interface: InterfaceTable,
        code: CodeSection,
        imports: Vec<ImportRecord>,
        deps: Vec<DepRef>,
    ) -> Result<Self, ArtifactError> {
        let hash = ContentHash::compute_serializable(&SealedParts {
            meta: &meta,
            interface: &interface,
            code: &code,
            imports: &imports,
            deps: &deps,
        })?;
        Ok(Self {
            hash,
            meta,
            interface,
            code,
            imports,
            deps,
        })
    }

    /// Content identity.
    #[inline]
    #[must_use]
    pub const fn hash(&self) -> &ContentHash {
        &self.hash
    }

    /// Provenance metadata.
    #[inline]
    #[must_use]
    pub const fn meta(&self) -> &ArtifactMeta {
        &self.meta
    }

    /// Declared module name.
    #[inline]
    #[must_use]
    pub fn module(&self) -> &str {
        &self.meta.module
    }

    /// Library or program.
    #[inline]
    #[must_use]
    pub const fn kind(&self) -> ArtifactKind {
        self.meta.kind
    }

    /// Exported interface table.
    #[inline]
    #[must_use]
    pub const fn interface(&self) -> &InterfaceTable {
        &self.interface
    }

    /// Executable payload.
    #[inline]
    #[must_use]
    pub const fn code(&self) -> &CodeSection {
        &self.code
    }

    /// Import records, in first-use order.
    #[inline]
    #[must_use]
    pub fn imports(&self) -> &[ImportRecord] {
        &self.imports
    }

    /// Dependencies pinned at compile time.
    #[inline]
    #[must_use]
    pub fn deps(&self) -> &[DepRef] {
        &self.deps
    }

    /// Entry function, if this is a program that declares one.
    #[must_use]
    pub fn entry(&self) -> Option<&FunctionCode> {
        match self.meta.kind {
            ArtifactKind::Program => self.code.function(ENTRY_KEY),
            ArtifactKind::Library => None,
        }
    }

    /// Recompute the content hash and compare with the sealed one.
    ///
    /// Returns false if the artifact was corrupted in transit (or if the
    /// parts no longer serialize, which is itself corruption).
    #[must_use]
    pub fn verify(&self) -> bool {
        ContentHash::compute_serializable(&SealedParts {
            meta: &self.meta,
            interface: &self.interface,
            code: &self.code,
            imports: &self.imports,
            deps: &self.deps,
        })
        .map(|recomputed| recomputed == self.hash)
        .unwrap_or(false)
    }
}

/// Errors while sealing artifacts.
#[derive(Debug, thiserror::Error)]
pub enum ArtifactError {
    /// The artifact parts could not be serialized for hashing.
    #[error("artifact hashing failed: {0}")]
    Hash(#[from] HashError),
}
