//! Evolution-case pipeline and suite orchestration
//!
//! The top layer of evolink: everything between a directory of `.evo`
//! case files and a process exit code.
//!
//! - **Cases** (`case`, `registry`): the `.evo` format, stable case ids,
//!   the `suite.toml` manifest, and the load-time completeness invariant
//! - **Pipeline** (`pipeline`): the per-case state machine that compiles
//!   baseline, client, and evolved sources, links, executes, and records
//!   a verdict
//! - **Comparison** (`compare`): the pure oracle check, with the
//!   infra-override rule and first-divergence explanations
//! - **Orchestration** (`suite`, `report`, `config`): parallel case
//!   execution bounded by a semaphore, aggregated into text or JSON
//!   reports
//!
//! # Core Concepts
//!
//! A case is an experiment: compile a client against a baseline library,
//! evolve the library, and observe empirically whether the stale client
//! still links and behaves. The expected outcome lives in the case file;
//! the harness never hardcodes an oracle.
//!
//! # Example
//!
//! ```ignore
//! use evolink_runner::{CaseRegistry, SuiteConfig, SuiteRunner};
//!
//! let registry = CaseRegistry::load(Path::new("cases"))?;
//! let report = SuiteRunner::new(SuiteConfig::new()).run(&registry).await;
//! print!("{}", report.render_text());
//! std::process::exit(if report.is_success() { 0 } else { 1 });
//! ```

#![warn(unreachable_pub)]

mod case;
mod compare;
mod config;
mod pipeline;
mod registry;
mod report;
mod suite;

pub use case::{CaseError, CaseId, EvolutionCase, ExpectedOutcome};
pub use compare::{compare, CaseDisposition};
pub use config::{SuiteConfig, DEFAULT_MAX_PARALLEL_CASES};
pub use pipeline::{
    run_case, validate_transition, ArtifactStore, CaseResult, CaseState, RunContext,
};
pub use registry::{CaseRegistry, SuiteError, MANIFEST_NAME};
pub use report::SuiteReport;
pub use suite::SuiteRunner;

/// Crate version, exposed for diagnostics and reports.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
