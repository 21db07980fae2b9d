//! Verdict comparison against the case oracle
//!
//! [`compare`] is a pure function from an observed [`Verdict`] and an
//! [`ExpectedOutcome`] to a [`CaseDisposition`]. One rule overrides all
//! outcome logic: an infra-origin diagnostic fails the case regardless of
//! expectation, so harness faults can never masquerade as findings. After
//! that, failures explain themselves by naming the first divergent field
//! in pipeline order: linked, executed, stdout, diagnostics.

use crate::case::ExpectedOutcome;
use evolink_artifact::{Diagnostic, DiagnosticOrigin};
use evolink_sandbox::Verdict;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Final classification of one case.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CaseDisposition {
    /// The verdict matched the oracle.
    Pass,
    /// Unexpected compatibility or incompatibility; the finding class.
    Fail {
        /// Human-readable account of the first divergence.
        explanation: String,
    },
    /// Baseline or client source failed to compile; a defect in the case
    /// itself, never a compatibility finding.
    Malformed {
        /// Stage tag, `baseline-compile` or `client-compile`.
        stage: String,
        /// The rejection diagnostics, rendered.
        explanation: String,
    },
    /// Harness fault: compiler panic, timeout, subprocess breakage.
    Infra {
        /// What broke.
        detail: String,
    },
}

impl CaseDisposition {
    /// True only for [`CaseDisposition::Pass`].
    #[inline]
    #[must_use]
    pub fn is_pass(&self) -> bool {
        matches!(self, Self::Pass)
    }

    /// Short lowercase tag for report lines.
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::Pass => "pass",
            Self::Fail { .. } => "fail",
            Self::Malformed { .. } => "malformed",
            Self::Infra { .. } => "infra",
        }
    }
}

/// Compares a verdict against the expectation it was run under.
#[must_use]
pub fn compare(verdict: &Verdict, expected: &ExpectedOutcome) -> CaseDisposition {
    if verdict.has_infra_fault() {
        let detail = verdict
            .diagnostics
            .iter()
            .find(|d| d.is_infra())
            .map_or_else(
                || "unspecified infrastructure fault".to_owned(),
                |d| d.message.clone(),
            );
        return CaseDisposition::Infra { detail };
    }

    match expected {
        ExpectedOutcome::CompatibleRuntimeMatch { stdout }
        | ExpectedOutcome::IncompatibleRuntimeBehaviorChange { stdout } => {
            expect_clean_run(verdict, stdout)
        }
        ExpectedOutcome::CompatibleLinkOnly => {
            if verdict.linked {
                CaseDisposition::Pass
            } else {
                CaseDisposition::Fail {
                    explanation: did_not_link(verdict),
                }
            }
        }
        ExpectedOutcome::IncompatibleLinkError { pattern } => expect_link_error(verdict, pattern),
    }
}

fn expect_clean_run(verdict: &Verdict, expected_stdout: &str) -> CaseDisposition {
    if !verdict.linked {
        return CaseDisposition::Fail {
            explanation: did_not_link(verdict),
        };
    }
    if !verdict.executed {
        let exit = verdict
            .exit_code
            .map_or_else(|| "none".to_owned(), |c| c.to_string());
        return CaseDisposition::Fail {
            explanation: format!(
                "image linked but execution failed (exit code {exit}):\n{}",
                render_diagnostics(&verdict.diagnostics)
            ),
        };
    }
    if verdict.stdout != expected_stdout {
        return CaseDisposition::Fail {
            explanation: stdout_diff(expected_stdout, &verdict.stdout),
        };
    }
    CaseDisposition::Pass
}

fn expect_link_error(verdict: &Verdict, pattern: &Regex) -> CaseDisposition {
    if verdict.linked {
        return CaseDisposition::Fail {
            explanation: format!(
                "expected a link failure matching `{pattern}`, but the image linked"
            ),
        };
    }
    let matched = verdict
        .from_origin(DiagnosticOrigin::Link)
        .any(|d| pattern.is_match(&d.message));
    if matched {
        CaseDisposition::Pass
    } else {
        CaseDisposition::Fail {
            explanation: format!(
                "no link diagnostic matches `{pattern}`:\n{}",
                render_diagnostics(&verdict.diagnostics)
            ),
        }
    }
}

fn did_not_link(verdict: &Verdict) -> String {
    format!(
        "image did not link:\n{}",
        render_diagnostics(&verdict.diagnostics)
    )
}

/// One indented line per diagnostic, in emission order.
pub(crate) fn render_diagnostics(diagnostics: &[Diagnostic]) -> String {
    if diagnostics.is_empty() {
        return "  (no diagnostics)".to_owned();
    }
    let mut out = String::new();
    for diag in diagnostics {
        out.push_str("  - ");
        out.push_str(&diag.to_string());
        out.push('\n');
    }
    out.pop();
    out
}

/// Unified-style stdout diff: shared prefix as context, then expected
/// lines removed, actual lines added.
fn stdout_diff(expected: &str, actual: &str) -> String {
    let exp: Vec<&str> = expected.lines().collect();
    let act: Vec<&str> = actual.lines().collect();
    let shared = exp
        .iter()
        .zip(act.iter())
        .take_while(|(e, a)| e == a)
        .count();

    let mut out = String::from("stdout diverged:\n--- expected\n+++ actual\n");
    for line in &exp[..shared] {
        out.push(' ');
        out.push_str(line);
        out.push('\n');
    }
    for line in &exp[shared..] {
        out.push('-');
        out.push_str(line);
        out.push('\n');
    }
    for line in &act[shared..] {
        out.push('+');
        out.push_str(line);
        out.push('\n');
    }
    out.pop();
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use evolink_artifact::Diagnostic;
    use pretty_assertions::assert_eq;
    use std::time::Duration;

    fn completed(stdout: &str) -> Verdict {
        Verdict::completed(0, stdout.to_owned(), Vec::new())
    }

    fn link_failed(message: &str) -> Verdict {
        Verdict::not_linked(vec![Diagnostic::error(
            DiagnosticOrigin::Link,
            message.to_owned(),
        )])
    }

    #[test]
    fn runtime_match_passes_on_identical_stdout() {
        let expected = ExpectedOutcome::CompatibleRuntimeMatch {
            stdout: "7\n".to_owned(),
        };
        assert!(compare(&completed("7\n"), &expected).is_pass());
    }

    #[test]
    fn runtime_match_diffs_divergent_stdout() {
        let expected = ExpectedOutcome::CompatibleRuntimeMatch {
            stdout: "a\nb\n".to_owned(),
        };
        let disposition = compare(&completed("a\nc\n"), &expected);
        let CaseDisposition::Fail { explanation } = disposition else {
            panic!("expected a failure");
        };
        assert!(explanation.contains("stdout diverged"));
        assert!(explanation.contains(" a"));
        assert!(explanation.contains("-b"));
        assert!(explanation.contains("+c"));
    }

    #[test]
    fn link_only_ignores_the_execution_outcome() {
        let expected = ExpectedOutcome::CompatibleLinkOnly;
        let crashed = Verdict::completed(
            1,
            String::new(),
            vec![Diagnostic::error(
                DiagnosticOrigin::Execute,
                "boom".to_owned(),
            )],
        );
        assert!(compare(&crashed, &expected).is_pass());
    }

    #[test]
    fn link_error_needs_a_matching_link_diagnostic() {
        let expected = ExpectedOutcome::IncompatibleLinkError {
            pattern: Regex::new("unresolved symbol").unwrap(),
        };
        assert!(compare(&link_failed("unresolved symbol `lib.f()`"), &expected).is_pass());

        let wrong = compare(&link_failed("signature mismatch for `lib.f()`"), &expected);
        assert!(matches!(wrong, CaseDisposition::Fail { .. }));

        let linked = compare(&completed(""), &expected);
        let CaseDisposition::Fail { explanation } = linked else {
            panic!("expected a failure");
        };
        assert!(explanation.contains("but the image linked"));
    }

    #[test]
    fn link_error_ignores_non_link_origins() {
        let expected = ExpectedOutcome::IncompatibleLinkError {
            pattern: Regex::new("unresolved").unwrap(),
        };
        let rejection = Verdict::not_linked(vec![Diagnostic::error(
            DiagnosticOrigin::EvolvedCompile,
            "unresolved symbol `x`".to_owned(),
        )]);
        assert!(matches!(
            compare(&rejection, &expected),
            CaseDisposition::Fail { .. }
        ));
    }

    #[test]
    fn infra_faults_override_every_expectation() {
        let expected = ExpectedOutcome::CompatibleLinkOnly;
        let timed_out = Verdict::timed_out(Duration::from_secs(5));
        let disposition = compare(&timed_out, &expected);
        assert!(matches!(disposition, CaseDisposition::Infra { .. }));
        assert_eq!(disposition.label(), "infra");
    }

    #[test]
    fn behavior_change_pins_the_old_output() {
        let expected = ExpectedOutcome::IncompatibleRuntimeBehaviorChange {
            stdout: "v1\n".to_owned(),
        };
        assert!(compare(&completed("v1\n"), &expected).is_pass());
        assert!(!compare(&completed("v2\n"), &expected).is_pass());
    }
}
