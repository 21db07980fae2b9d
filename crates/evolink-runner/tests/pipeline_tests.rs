//! Pipeline behavior through the public API: no-op evolutions, rerun
//! determinism, and the fault paths a suite run must survive without
//! misclassifying anything as a compatibility finding.

use async_trait::async_trait;
use evolink_artifact::{Artifact, DiagnosticOrigin};
use evolink_compiler::{
    ArtifactCompiler, CompileOutput, CompilerFault, ReferenceCompiler, SourceUnit,
};
use evolink_runner::{
    run_case, CaseDisposition, CaseId, CaseRegistry, EvolutionCase, ExpectedOutcome, RunContext,
    SuiteConfig, SuiteRunner,
};
use evolink_sandbox::{Isolation, Sandbox};
use evolink_test_utils::{write_suite, COUNTER_CLIENT, COUNTER_LIB, COUNTER_STDOUT};
use regex::Regex;
use std::sync::Arc;
use std::time::Duration;

fn ctx() -> RunContext {
    RunContext::new(
        Arc::new(ReferenceCompiler::new()),
        Sandbox::new(Duration::from_secs(5), Isolation::InProcess),
    )
}

fn config() -> SuiteConfig {
    SuiteConfig::new()
        .with_isolation(Isolation::InProcess)
        .with_exec_timeout(Duration::from_secs(5))
}

fn case(baseline: &str, evolved: &str, client: &str, expected: ExpectedOutcome) -> EvolutionCase {
    EvolutionCase {
        id: CaseId::from_stem("underTest"),
        title: None,
        baseline: baseline.to_owned(),
        evolved: evolved.to_owned(),
        client: client.to_owned(),
        expected,
    }
}

#[tokio::test]
async fn a_no_op_evolution_always_matches() {
    let case = case(
        COUNTER_LIB,
        COUNTER_LIB,
        COUNTER_CLIENT,
        ExpectedOutcome::CompatibleRuntimeMatch {
            stdout: COUNTER_STDOUT.to_owned(),
        },
    );
    let result = run_case(&ctx(), &case).await;
    assert!(result.passed(), "{:?}", result.disposition);
    let verdict = result.verdict.expect("verdict recorded");
    assert!(verdict.linked);
    assert!(verdict.executed);
}

#[tokio::test]
async fn reruns_yield_identical_dispositions() {
    const STEADY: &str = "\
//// baseline
module lib
fun greet(): Str = \"hi\"
//// evolved
module lib
fun greet(): Str = \"hi\"
//// client
module main
use lib
fun main() { print(lib.greet()) }
//// expect: runtime-match
hi
";
    const VANISH: &str = "\
//// baseline
module lib
fun gone(): Int = 7
//// evolved
module lib
fun kept(): Int = 7
//// client
module main
use lib
fun main() { print(lib.gone()) }
//// expect: link-error
pattern: unresolved symbol
";
    let dir = tempfile::tempdir().unwrap();
    write_suite(dir.path(), "det", &[("steady.evo", STEADY), ("vanish.evo", VANISH)]);
    let registry = CaseRegistry::load(dir.path()).unwrap();

    let runner = SuiteRunner::new(config());
    let first = runner.run(&registry).await;
    let second = runner.run(&registry).await;
    assert_ne!(first.run_id, second.run_id);

    let dispositions = |report: &evolink_runner::SuiteReport| {
        report
            .results
            .iter()
            .map(|r| (r.id.clone(), r.disposition.clone()))
            .collect::<Vec<_>>()
    };
    assert_eq!(dispositions(&first), dispositions(&second));
    assert!(first.is_success());
}

#[tokio::test]
async fn execution_faults_are_invisible_to_link_only() {
    let lib = "module lib\nfun spin(n: Int): Int = spin(n)\n";
    let client = "module main\nuse lib\nfun main() { print(lib.spin(1)) }";

    let tolerant = case(lib, lib, client, ExpectedOutcome::CompatibleLinkOnly);
    let result = run_case(&ctx(), &tolerant).await;
    assert!(result.passed(), "{:?}", result.disposition);
    let verdict = result.verdict.expect("verdict recorded");
    assert!(verdict.linked);
    assert!(!verdict.executed);
    assert!(verdict
        .from_origin(DiagnosticOrigin::Execute)
        .any(|d| d.message.contains("call depth")));

    let strict = case(
        lib,
        lib,
        client,
        ExpectedOutcome::CompatibleRuntimeMatch {
            stdout: "1\n".to_owned(),
        },
    );
    let result = run_case(&ctx(), &strict).await;
    let CaseDisposition::Fail { explanation } = &result.disposition else {
        panic!("expected a failure, got {:?}", result.disposition);
    };
    assert!(explanation.contains("execution failed"));
}

#[tokio::test]
async fn an_evolved_rejection_never_satisfies_a_link_error_oracle() {
    let case = case(
        "module lib\nfun f(): Int = 1\n",
        "module lib\nfun f(): Int = oops\n",
        "module main\nuse lib\nfun main() { print(lib.f()) }",
        ExpectedOutcome::IncompatibleLinkError {
            pattern: Regex::new("unresolved").unwrap(),
        },
    );
    let result = run_case(&ctx(), &case).await;
    let verdict = result.verdict.expect("rejection still yields a verdict");
    assert!(!verdict.linked);
    assert!(verdict
        .diagnostics
        .iter()
        .all(|d| d.origin == DiagnosticOrigin::EvolvedCompile));
    let CaseDisposition::Fail { explanation } = &result.disposition else {
        panic!("expected a failure, got {:?}", result.disposition);
    };
    assert!(explanation.contains("no link diagnostic matches"));
}

struct FaultyCompiler;

#[async_trait]
impl ArtifactCompiler for FaultyCompiler {
    fn fingerprint(&self) -> &str {
        "faulty/0.0"
    }

    async fn compile(
        &self,
        _unit: &SourceUnit,
        _deps: &[Artifact],
    ) -> Result<CompileOutput, CompilerFault> {
        Err(CompilerFault::Panicked("injected fault".to_owned()))
    }
}

#[tokio::test]
async fn compiler_faults_fail_cases_as_infra_not_findings() {
    const ANY: &str = "\
//// baseline
module lib
fun f(): Int = 1
//// evolved
module lib
fun f(): Int = 1
//// client
module main
use lib
fun main() { print(lib.f()) }
//// expect: runtime-match
1
";
    let dir = tempfile::tempdir().unwrap();
    write_suite(dir.path(), "faulty", &[("one.evo", ANY), ("two.evo", ANY)]);
    let registry = CaseRegistry::load(dir.path()).unwrap();

    let runner = SuiteRunner::with_compiler(config(), Arc::new(FaultyCompiler));
    let report = runner.run(&registry).await;
    assert!(!report.is_success());
    assert_eq!(report.count("infra"), 2);
    assert_eq!(report.count("fail"), 0);
    for result in &report.results {
        let CaseDisposition::Infra { detail } = &result.disposition else {
            panic!("expected infra, got {:?}", result.disposition);
        };
        assert!(detail.contains("injected fault"));
    }
}

#[tokio::test]
async fn a_subset_runs_only_the_named_cases() {
    const CASE: &str = "\
//// baseline
module lib
fun f(): Int = 1
//// evolved
module lib
fun f(): Int = 1
//// client
module main
use lib
fun main() { print(lib.f()) }
//// expect: runtime-match
1
";
    let dir = tempfile::tempdir().unwrap();
    write_suite(
        dir.path(),
        "trimmed",
        &[("alpha.evo", CASE), ("bravo.evo", CASE), ("gamma.evo", CASE)],
    );
    let registry = CaseRegistry::load(dir.path()).unwrap();
    let subset = registry.subset(&["Bravo".to_owned()]).unwrap();
    let report = SuiteRunner::new(config()).run(&subset).await;
    assert!(report.is_success());
    assert_eq!(report.results.len(), 1);
    assert_eq!(report.results[0].id.as_str(), "Bravo");
}
