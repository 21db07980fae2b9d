//! Structured diagnostics
//!
//! Every reportable condition in the pipeline is a [`Diagnostic`]: a
//! severity, the pipeline stage that raised it, a message, and an optional
//! source location. Verdict comparison and reporting pattern-match on the
//! structure instead of scraping strings.

use serde::{Deserialize, Serialize};
use std::fmt::{self, Display, Formatter};

/// How serious a diagnostic is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    /// Condition that fails the producing stage.
    Error,
    /// Notable but non-fatal condition.
    Warning,
}

impl Display for Severity {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Error => write!(f, "error"),
            Self::Warning => write!(f, "warning"),
        }
    }
}

/// The pipeline stage that produced a diagnostic.
///
/// Origins keep failure classes distinguishable: an evolved-source compile
/// rejection is not a link failure, and neither is an infrastructure fault.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosticOrigin {
    /// Compiling the baseline library source.
    BaselineCompile,
    /// Compiling the client against the baseline artifact.
    ClientCompile,
    /// Compiling the evolved library source.
    EvolvedCompile,
    /// Resolving the client's imports against the substitute artifact.
    Link,
    /// Running the linked image.
    Execute,
    /// Harness-side fault: timeouts, compiler crashes, sandbox failures.
    Infra,
}

impl Display for DiagnosticOrigin {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let tag = match self {
            Self::BaselineCompile => "baseline-compile",
            Self::ClientCompile => "client-compile",
            Self::EvolvedCompile => "evolved-compile",
            Self::Link => "link",
            Self::Execute => "execute",
            Self::Infra => "infra",
        };
        write!(f, "{tag}")
    }
}

/// Position inside a source unit.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SourceLocation {
    /// Module name of the unit ("lib", "main").
    pub unit: String,
    /// 1-based line.
    pub line: u32,
    /// 1-based column.
    pub column: u32,
}

impl SourceLocation {
    /// Build a location.
    #[must_use]
    pub fn new(unit: impl Into<String>, line: u32, column: u32) -> Self {
        Self {
            unit: unit.into(),
            line,
            column,
        }
    }
}

impl Display for SourceLocation {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.unit, self.line, self.column)
    }
}

/// One reportable condition from one pipeline stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    /// Error or warning.
    pub severity: Severity,
    /// Stage that raised this.
    pub origin: DiagnosticOrigin,
    /// Human-readable message, stable enough to pattern-match.
    pub message: String,
    /// Where in the source, when known.
    pub location: Option<SourceLocation>,
}

impl Diagnostic {
    /// An error-severity diagnostic.
    #[must_use]
    pub fn error(origin: DiagnosticOrigin, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Error,
            origin,
            message: message.into(),
            location: None,
        }
    }

    /// A warning-severity diagnostic.
    #[must_use]
    pub fn warning(origin: DiagnosticOrigin, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Warning,
            origin,
            message: message.into(),
            location: None,
        }
    }

    /// Attach a source location.
    #[must_use]
    pub fn at(mut self, location: SourceLocation) -> Self {
        self.location = Some(location);
        self
    }

    /// True for error severity.
    #[inline]
    #[must_use]
    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }

    /// True if the harness, not the subject, is at fault.
    #[inline]
    #[must_use]
    pub fn is_infra(&self) -> bool {
        self.origin == DiagnosticOrigin::Infra
    }
}

impl Display for Diagnostic {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}[{}]: {}", self.severity, self.origin, self.message)?;
        if let Some(loc) = &self.location {
            write!(f, " ({loc})")?;
        }
        Ok(())
    }
}

/// True if any diagnostic in the slice is an error.
#[must_use]
pub fn has_errors(diagnostics: &[Diagnostic]) -> bool {
    diagnostics.iter().any(Diagnostic::is_error)
}
