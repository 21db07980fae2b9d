//! Suite reports
//!
//! One [`SuiteReport`] per run: identity, timestamps, configuration echo,
//! per-case results sorted by id, and any harness-level errors. Rendered
//! as aligned text for terminals or pretty JSON for machines; the report
//! never re-runs anything, it only presents what the pipeline recorded.

use crate::case::CaseId;
use crate::compare::CaseDisposition;
use crate::config::SuiteConfig;
use crate::pipeline::CaseResult;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use uuid::Uuid;

/// Aggregate outcome of one suite run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuiteReport {
    /// Unique id for this run.
    pub run_id: Uuid,
    /// Suite name from the manifest.
    pub suite: String,
    /// Configuration the run executed under.
    pub config: SuiteConfig,
    /// When the run started.
    pub started_at: DateTime<Utc>,
    /// When the run finished.
    pub finished_at: DateTime<Utc>,
    /// Per-case results, sorted by case id.
    pub results: Vec<CaseResult>,
    /// Task-level failures that could not be attributed to a case.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub harness_errors: Vec<String>,
}

impl SuiteReport {
    /// True iff every case passed and no harness error occurred.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.harness_errors.is_empty() && self.results.iter().all(CaseResult::passed)
    }

    /// Count of results with the given disposition label.
    #[must_use]
    pub fn count(&self, label: &str) -> usize {
        self.results
            .iter()
            .filter(|r| r.disposition.label() == label)
            .count()
    }

    /// Ids of every non-passing case, in report order.
    #[must_use]
    pub fn failing_ids(&self) -> Vec<&CaseId> {
        self.results
            .iter()
            .filter(|r| !r.passed())
            .map(|r| &r.id)
            .collect()
    }

    /// Aligned per-case lines plus a summary footer.
    #[must_use]
    pub fn render_text(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(
            out,
            "suite {} (run {}): {} cases",
            self.suite,
            self.run_id,
            self.results.len()
        );
        out.push('\n');

        for result in &self.results {
            let _ = writeln!(
                out,
                "  {:<10} {:<28} [{:<14}] {:>5}ms  {}",
                result.disposition.label(),
                result.id,
                result.expected,
                result.duration.as_millis(),
                verdict_summary(result),
            );
            match &result.disposition {
                CaseDisposition::Pass => {}
                CaseDisposition::Fail { explanation } => indent_block(&mut out, explanation),
                CaseDisposition::Malformed { stage, explanation } => {
                    let _ = writeln!(out, "      malformed at {stage}:");
                    indent_block(&mut out, explanation);
                }
                CaseDisposition::Infra { detail } => indent_block(&mut out, detail),
            }
        }

        out.push('\n');
        let _ = write!(
            out,
            "{} cases: {} passed",
            self.results.len(),
            self.count("pass")
        );
        for label in ["fail", "malformed", "infra"] {
            let n = self.count(label);
            if n > 0 {
                let _ = write!(out, ", {n} {label}");
            }
        }
        out.push('\n');

        if !self.is_success() {
            let failing: Vec<&str> = self.failing_ids().iter().map(|id| id.as_str()).collect();
            if !failing.is_empty() {
                let _ = writeln!(out, "failing: {}", failing.join(", "));
            }
            for err in &self.harness_errors {
                let _ = writeln!(out, "harness error: {err}");
            }
        }
        out
    }

    /// The whole report as pretty JSON.
    ///
    /// # Errors
    ///
    /// Returns the underlying serialization error, which only occurs if a
    /// report field fails to serialize.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

fn verdict_summary(result: &CaseResult) -> String {
    match &result.verdict {
        None => "no verdict".to_owned(),
        Some(v) if !v.linked => format!("link failed ({} diagnostics)", v.diagnostics.len()),
        Some(v) => match v.exit_code {
            Some(code) => format!("linked, exit {code}"),
            None => "linked".to_owned(),
        },
    }
}

fn indent_block(out: &mut String, text: &str) {
    for line in text.lines() {
        out.push_str("      ");
        out.push_str(line);
        out.push('\n');
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use evolink_sandbox::Verdict;
    use pretty_assertions::assert_eq;
    use std::time::Duration;

    fn result(id: &str, disposition: CaseDisposition, verdict: Option<Verdict>) -> CaseResult {
        CaseResult {
            id: CaseId::from_stem(id),
            title: None,
            expected: "runtime-match".to_owned(),
            disposition,
            verdict,
            duration: Duration::from_millis(12),
        }
    }

    fn report(results: Vec<CaseResult>) -> SuiteReport {
        SuiteReport {
            run_id: Uuid::new_v4(),
            suite: "demo".to_owned(),
            config: SuiteConfig::new(),
            started_at: Utc::now(),
            finished_at: Utc::now(),
            results,
            harness_errors: Vec::new(),
        }
    }

    #[test]
    fn success_needs_every_case_to_pass() {
        let ok = report(vec![result(
            "one",
            CaseDisposition::Pass,
            Some(Verdict::completed(0, String::new(), Vec::new())),
        )]);
        assert!(ok.is_success());

        let mixed = report(vec![
            result("one", CaseDisposition::Pass, None),
            result(
                "two",
                CaseDisposition::Fail {
                    explanation: "stdout diverged".to_owned(),
                },
                None,
            ),
        ]);
        assert!(!mixed.is_success());
        let failing: Vec<_> = mixed.failing_ids().iter().map(|id| id.as_str()).collect();
        assert_eq!(failing, ["Two"]);
    }

    #[test]
    fn harness_errors_fail_the_run() {
        let mut rep = report(vec![result("one", CaseDisposition::Pass, None)]);
        rep.harness_errors.push("case task panicked".to_owned());
        assert!(!rep.is_success());
        assert!(rep.render_text().contains("harness error: case task panicked"));
    }

    #[test]
    fn text_render_carries_counts_and_explanations() {
        let rep = report(vec![
            result(
                "good",
                CaseDisposition::Pass,
                Some(Verdict::completed(0, "hi\n".to_owned(), Vec::new())),
            ),
            result(
                "bad",
                CaseDisposition::Infra {
                    detail: "execution timed out after 5000ms".to_owned(),
                },
                None,
            ),
        ]);
        let text = rep.render_text();
        assert!(text.contains("2 cases: 1 passed, 1 infra"));
        assert!(text.contains("linked, exit 0"));
        assert!(text.contains("execution timed out"));
        assert!(text.contains("failing: Bad"));
    }

    #[test]
    fn json_round_trips() {
        let rep = report(vec![result("one", CaseDisposition::Pass, None)]);
        let json = rep.to_json().unwrap();
        let back: SuiteReport = serde_json::from_str(&json).unwrap();
        assert_eq!(back.suite, "demo");
        assert_eq!(back.results.len(), 1);
        assert_eq!(back.run_id, rep.run_id);
    }
}
