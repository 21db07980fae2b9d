//! Compiler contract and the ulib reference front end
//!
//! [`ArtifactCompiler`] is the seam between the verification engine and any
//! compiler front end:
//!
//! - `compile` turns one source unit plus already-built dependency artifacts
//!   into a sealed [`Artifact`] or a set of rejection diagnostics,
//! - rejection is data (the engine verdicts on it), a [`CompilerFault`] is an
//!   infrastructure failure (the engine fails the case outright).
//!
//! [`ReferenceCompiler`] implements the contract for ulib units with a
//! hand-written lexer, parser and lowering pass. It is deterministic: the
//! same text compiled against the same dependency set always seals to the
//! same artifact hash.

use crate::{lower, parse};
use async_trait::async_trait;
use evolink_artifact::{
    Artifact, ArtifactError, ArtifactMeta, Diagnostic, DiagnosticOrigin, DEFAULT_TARGET,
};
use std::panic::{catch_unwind, AssertUnwindSafe};

/// One unit of source text handed to a compiler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceUnit {
    /// Label used in diagnostic locations ("lib", "main").
    pub name: String,
    /// Complete source text.
    pub text: String,
    /// Stage tag applied to every diagnostic this compile produces.
    pub origin: DiagnosticOrigin,
}

impl SourceUnit {
    /// A unit compiled as the baseline library.
    #[must_use]
    pub fn baseline(name: impl Into<String>, text: impl Into<String>) -> Self {
        Self::new(name, text, DiagnosticOrigin::BaselineCompile)
    }

    /// A unit compiled as the evolved library.
    #[must_use]
    pub fn evolved(name: impl Into<String>, text: impl Into<String>) -> Self {
        Self::new(name, text, DiagnosticOrigin::EvolvedCompile)
    }

    /// A unit compiled as the client program.
    #[must_use]
    pub fn client(name: impl Into<String>, text: impl Into<String>) -> Self {
        Self::new(name, text, DiagnosticOrigin::ClientCompile)
    }

    /// A unit with an explicit stage tag.
    #[must_use]
    pub fn new(name: impl Into<String>, text: impl Into<String>, origin: DiagnosticOrigin) -> Self {
        Self {
            name: name.into(),
            text: text.into(),
            origin,
        }
    }
}

/// What a compile produced.
#[derive(Debug, Clone, PartialEq)]
pub enum CompileOutput {
    /// The unit compiled; here is its sealed artifact.
    Success(Artifact),
    /// The unit was rejected; the diagnostics say why.
    Rejected(Vec<Diagnostic>),
}

impl CompileOutput {
    /// The artifact, when compilation succeeded.
    #[inline]
    #[must_use]
    pub fn artifact(&self) -> Option<&Artifact> {
        match self {
            Self::Success(artifact) => Some(artifact),
            Self::Rejected(_) => None,
        }
    }

    /// True when compilation produced an artifact.
    #[inline]
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }
}

/// Infrastructure failure inside a compiler, as opposed to a source
/// rejection.
#[derive(Debug, thiserror::Error)]
pub enum CompilerFault {
    /// The front end panicked mid-compile.
    #[error("compiler panicked: {0}")]
    Panicked(String),

    /// The compiled parts failed to seal into an artifact.
    #[error(transparent)]
    Seal(#[from] ArtifactError),

    /// An external front end failed to read or write its working files.
    #[error("compiler i/o failure: {0}")]
    Io(#[from] std::io::Error),
}

/// Pluggable compiler front end.
///
/// Implementations must be deterministic for identical input: same unit
/// text, same dependency artifact set, same [`fingerprint`], same output.
///
/// [`fingerprint`]: ArtifactCompiler::fingerprint
#[async_trait]
pub trait ArtifactCompiler: Send + Sync {
    /// Stable compiler identity, `name/version`.
    ///
    /// Recorded as artifact provenance and mixed into compile-cache keys so
    /// two different front ends never share cache entries.
    fn fingerprint(&self) -> &str;

    /// Compile one unit against already-built dependency artifacts.
    ///
    /// A rejected unit is a success of the *harness* (the rejection becomes
    /// verdict data); only infrastructure failures surface as errors.
    ///
    /// # Errors
    /// Returns a [`CompilerFault`] when the compiler itself breaks rather
    /// than the unit being invalid.
    async fn compile(
        &self,
        unit: &SourceUnit,
        deps: &[Artifact],
    ) -> Result<CompileOutput, CompilerFault>;
}

/// The built-in ulib front end.
#[derive(Debug, Clone)]
pub struct ReferenceCompiler {
    fingerprint: String,
}

impl ReferenceCompiler {
    /// Build the reference front end.
    #[must_use]
    pub fn new() -> Self {
        Self {
            fingerprint: format!("refc/{}", crate::VERSION),
        }
    }

    fn run_front_end(&self, unit: &SourceUnit, deps: &[Artifact]) -> Result<CompileOutput, CompilerFault> {
        let parsed = match parse::parse_unit(&unit.name, &unit.text, unit.origin) {
            Ok(parsed) => parsed,
            Err(diagnostics) => return Ok(CompileOutput::Rejected(diagnostics)),
        };
        let lowered = match lower::lower_unit(&parsed, deps, unit.origin) {
            Ok(lowered) => lowered,
            Err(diagnostics) => return Ok(CompileOutput::Rejected(diagnostics)),
        };
        let meta = ArtifactMeta {
            module: lowered.module,
            kind: lowered.kind,
            producer: self.fingerprint.clone(),
            target: DEFAULT_TARGET.to_owned(),
        };
        let artifact = Artifact::seal(
            meta,
            lowered.interface,
            lowered.code,
            lowered.imports,
            lowered.deps,
        )?;
        tracing::debug!(
            unit = %unit.name,
            module = artifact.module(),
            hash = %artifact.hash().short(),
            "unit compiled"
        );
        Ok(CompileOutput::Success(artifact))
    }
}

impl Default for ReferenceCompiler {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ArtifactCompiler for ReferenceCompiler {
    fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    async fn compile(
        &self,
        unit: &SourceUnit,
        deps: &[Artifact],
    ) -> Result<CompileOutput, CompilerFault> {
        // the front end is pure CPU work; a panic in it must not take the
        // suite down, it becomes an infra fault on the one case
        match catch_unwind(AssertUnwindSafe(|| self.run_front_end(unit, deps))) {
            Ok(result) => result,
            Err(payload) => {
                let message = payload
                    .downcast_ref::<&str>()
                    .map(|s| (*s).to_owned())
                    .or_else(|| payload.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_owned());
                tracing::error!(unit = %unit.name, %message, "front end panicked");
                Err(CompilerFault::Panicked(message))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use evolink_artifact::ArtifactKind;
    use pretty_assertions::assert_eq;

    const LIB: &str = "module lib\nfun greet(): Str = \"hello\"\n";

    #[tokio::test]
    async fn compiles_a_library_unit() {
        let compiler = ReferenceCompiler::new();
        let out = compiler
            .compile(&SourceUnit::baseline("lib", LIB), &[])
            .await
            .unwrap();
        let artifact = out.artifact().expect("expected success");
        assert_eq!(artifact.kind(), ArtifactKind::Library);
        assert_eq!(artifact.module(), "lib");
        assert!(artifact.interface().contains("greet()"));
        assert_eq!(artifact.meta().producer, compiler.fingerprint());
    }

    #[tokio::test]
    async fn rejection_carries_the_unit_stage_tag() {
        let compiler = ReferenceCompiler::new();
        let out = compiler
            .compile(&SourceUnit::evolved("lib", "module lib\nfun broken(: Int = 1\n"), &[])
            .await
            .unwrap();
        let CompileOutput::Rejected(diagnostics) = out else {
            panic!("expected rejection");
        };
        assert!(!diagnostics.is_empty());
        assert!(diagnostics
            .iter()
            .all(|d| d.origin == DiagnosticOrigin::EvolvedCompile));
    }

    #[tokio::test]
    async fn client_compiles_against_a_dependency() {
        let compiler = ReferenceCompiler::new();
        let lib = compiler
            .compile(&SourceUnit::baseline("lib", LIB), &[])
            .await
            .unwrap();
        let lib = lib.artifact().expect("lib").clone();
        let client = compiler
            .compile(
                &SourceUnit::client("main", "module main\nuse lib\nfun main() { print(lib.greet()) }"),
                std::slice::from_ref(&lib),
            )
            .await
            .unwrap();
        let client = client.artifact().expect("client");
        assert_eq!(client.kind(), ArtifactKind::Program);
        assert_eq!(client.deps().len(), 1);
        assert_eq!(client.deps()[0].hash, *lib.hash());
        assert!(client.entry().is_some());
    }

    #[tokio::test]
    async fn identical_input_seals_identical_hashes() {
        let compiler = ReferenceCompiler::new();
        let unit = SourceUnit::baseline("lib", LIB);
        let a = compiler.compile(&unit, &[]).await.unwrap();
        let b = compiler.compile(&unit, &[]).await.unwrap();
        assert_eq!(
            a.artifact().expect("a").hash(),
            b.artifact().expect("b").hash()
        );
    }

    #[tokio::test]
    async fn baseline_and_evolved_tags_do_not_change_the_artifact() {
        let compiler = ReferenceCompiler::new();
        let a = compiler
            .compile(&SourceUnit::baseline("lib", LIB), &[])
            .await
            .unwrap();
        let b = compiler
            .compile(&SourceUnit::evolved("lib", LIB), &[])
            .await
            .unwrap();
        assert_eq!(
            a.artifact().expect("a").hash(),
            b.artifact().expect("b").hash()
        );
    }
}
