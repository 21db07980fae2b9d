//! Empirical outcome of one evolution scenario

use evolink_artifact::{Diagnostic, DiagnosticOrigin};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// What actually happened when the unchanged client met the evolved
/// artifact.
///
/// Produced once per case run and never mutated. The comparator reads it
/// against the case's expected outcome; reports render it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Verdict {
    /// Every non-captured import resolved against the substitute.
    pub linked: bool,
    /// The image ran to completion with exit code zero.
    pub executed: bool,
    /// Exit code of the executed image, when execution was attempted.
    pub exit_code: Option<i32>,
    /// Captured stdout, byte-for-byte.
    pub stdout: String,
    /// Everything the stages reported, in occurrence order.
    pub diagnostics: Vec<Diagnostic>,
}

impl Verdict {
    /// Verdict for a scenario that never reached execution: a link failure
    /// or an evolved-source compile rejection.
    #[must_use]
    pub fn not_linked(diagnostics: Vec<Diagnostic>) -> Self {
        Self {
            linked: false,
            executed: false,
            exit_code: None,
            stdout: String::new(),
            diagnostics,
        }
    }

    /// Verdict for an execution attempt that ran to some exit.
    #[must_use]
    pub fn completed(exit_code: i32, stdout: String, diagnostics: Vec<Diagnostic>) -> Self {
        Self {
            linked: true,
            executed: exit_code == 0,
            exit_code: Some(exit_code),
            stdout,
            diagnostics,
        }
    }

    /// Verdict for an execution killed at the wall-clock limit.
    #[must_use]
    pub fn timed_out(limit: Duration) -> Self {
        Self {
            linked: true,
            executed: false,
            exit_code: None,
            stdout: String::new(),
            diagnostics: vec![Diagnostic::error(
                DiagnosticOrigin::Infra,
                format!("execution timed out after {}ms", limit.as_millis()),
            )],
        }
    }

    /// Verdict for a harness-side fault anywhere in the pipeline.
    #[must_use]
    pub fn infra_fault(message: impl Into<String>) -> Self {
        Self {
            linked: false,
            executed: false,
            exit_code: None,
            stdout: String::new(),
            diagnostics: vec![Diagnostic::error(DiagnosticOrigin::Infra, message)],
        }
    }

    /// True when any diagnostic is an infrastructure fault.
    #[must_use]
    pub fn has_infra_fault(&self) -> bool {
        self.diagnostics.iter().any(Diagnostic::is_infra)
    }

    /// Diagnostics produced by one stage.
    pub fn from_origin(&self, origin: DiagnosticOrigin) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics.iter().filter(move |d| d.origin == origin)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn completed_with_zero_exit_counts_as_executed() {
        let verdict = Verdict::completed(0, "5\n".into(), vec![]);
        assert!(verdict.linked);
        assert!(verdict.executed);
        assert_eq!(verdict.exit_code, Some(0));
    }

    #[test]
    fn completed_with_nonzero_exit_does_not() {
        let verdict = Verdict::completed(1, String::new(), vec![]);
        assert!(verdict.linked);
        assert!(!verdict.executed);
    }

    #[test]
    fn timeout_is_an_infra_fault() {
        let verdict = Verdict::timed_out(Duration::from_secs(10));
        assert!(!verdict.executed);
        assert!(verdict.has_infra_fault());
        assert!(verdict.diagnostics[0].message.contains("timed out"));
    }

    #[test]
    fn origin_filter_separates_stages() {
        let verdict = Verdict::not_linked(vec![
            Diagnostic::error(DiagnosticOrigin::Link, "unresolved symbol `lib.gone()`"),
            Diagnostic::error(DiagnosticOrigin::Infra, "tempdir vanished"),
        ]);
        assert_eq!(verdict.from_origin(DiagnosticOrigin::Link).count(), 1);
        assert_eq!(verdict.from_origin(DiagnosticOrigin::Infra).count(), 1);
    }
}
