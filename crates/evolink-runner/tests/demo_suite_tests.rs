//! End-to-end runs of the demo suite shipped under `cases/`.
//!
//! The whole suite must be green, and a few verdicts carry assertions
//! beyond their case's own oracle: `addOpenToClass` must actually link,
//! `deletePrivateMembers` must replay the baseline output, and a widened
//! property must bind without a single diagnostic.

use evolink_compiler::ReferenceCompiler;
use evolink_runner::{run_case, CaseRegistry, RunContext, SuiteConfig, SuiteRunner};
use evolink_sandbox::{Isolation, Sandbox};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

fn demo_suite() -> CaseRegistry {
    let dir = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../../cases");
    CaseRegistry::load(&dir).expect("demo suite loads")
}

fn config() -> SuiteConfig {
    SuiteConfig::new()
        .with_isolation(Isolation::InProcess)
        .with_exec_timeout(Duration::from_secs(5))
}

fn ctx() -> RunContext {
    RunContext::new(
        Arc::new(ReferenceCompiler::new()),
        Sandbox::new(Duration::from_secs(5), Isolation::InProcess),
    )
}

#[tokio::test]
async fn the_whole_demo_suite_is_green() {
    let registry = demo_suite();
    assert_eq!(registry.len(), 14);
    let report = SuiteRunner::new(config()).run(&registry).await;
    assert!(report.is_success(), "{}", report.render_text());
    assert_eq!(report.count("pass"), 14);
    assert!(report.harness_errors.is_empty());
}

#[tokio::test]
async fn adding_open_is_invisible_to_factory_clients() {
    let registry = demo_suite();
    let case = registry.get("AddOpenToClass").expect("case registered");
    let result = run_case(&ctx(), case).await;
    assert!(result.passed(), "{:?}", result.disposition);
    let verdict = result.verdict.expect("verdict recorded");
    assert!(verdict.linked);
}

#[tokio::test]
async fn private_member_deletion_replays_the_baseline_output() {
    let registry = demo_suite();
    let case = registry.get("DeletePrivateMembers").expect("case registered");
    let result = run_case(&ctx(), case).await;
    assert!(result.passed(), "{:?}", result.disposition);
    let verdict = result.verdict.expect("verdict recorded");
    assert!(verdict.executed);
    assert_eq!(verdict.stdout, "9\n");
}

#[tokio::test]
async fn widening_val_to_var_binds_without_diagnostics() {
    let registry = demo_suite();
    let case = registry
        .get("ChangePropertyFromValToVar")
        .expect("case registered");
    let result = run_case(&ctx(), case).await;
    assert!(result.passed(), "{:?}", result.disposition);
    let verdict = result.verdict.expect("verdict recorded");
    assert!(verdict.linked);
    assert!(verdict.diagnostics.is_empty());
}

#[tokio::test]
async fn capture_cases_report_their_pinned_outputs() {
    let registry = demo_suite();
    for (id, pinned) in [("InlineBodyChange", "v1\n"), ("ChangeConstInitialization", "10\n")] {
        let case = registry.get(id).expect("case registered");
        let result = run_case(&ctx(), case).await;
        assert!(result.passed(), "{id}: {:?}", result.disposition);
        let verdict = result.verdict.expect("verdict recorded");
        assert_eq!(verdict.stdout, pinned, "{id} pinned stdout");
    }
}
