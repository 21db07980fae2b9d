//! Suite orchestration
//!
//! Runs every case of a loaded registry in parallel: one tokio task per
//! case on a [`JoinSet`], bounded by a semaphore sized from
//! [`SuiteConfig::max_parallel_cases`]. Cases never abort siblings;
//! results land in a mutex-protected collector at case completion and the
//! report is sorted by case id afterwards, so output order never depends
//! on scheduling. Dropping the runner's future aborts the `JoinSet`, and
//! in-flight sandbox children die with it via kill-on-drop.

use crate::config::SuiteConfig;
use crate::pipeline::{run_case, CaseResult, RunContext};
use crate::registry::CaseRegistry;
use crate::report::SuiteReport;
use chrono::Utc;
use evolink_compiler::{ArtifactCompiler, ReferenceCompiler};
use evolink_sandbox::Sandbox;
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use uuid::Uuid;

/// Drives suite runs under one configuration.
pub struct SuiteRunner {
    config: SuiteConfig,
    compiler: Arc<dyn ArtifactCompiler>,
}

impl SuiteRunner {
    /// Runner over the reference compiler.
    #[must_use]
    pub fn new(config: SuiteConfig) -> Self {
        Self::with_compiler(config, Arc::new(ReferenceCompiler::new()))
    }

    /// Runner over a caller-supplied compiler.
    #[must_use]
    pub fn with_compiler(config: SuiteConfig, compiler: Arc<dyn ArtifactCompiler>) -> Self {
        Self { config, compiler }
    }

    /// The configuration this runner executes under.
    #[inline]
    #[must_use]
    pub fn config(&self) -> &SuiteConfig {
        &self.config
    }

    /// Runs every case in the registry and aggregates the report.
    pub async fn run(&self, registry: &CaseRegistry) -> SuiteReport {
        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        tracing::info!(
            run = %run_id,
            suite = registry.name(),
            cases = registry.len(),
            parallel = self.config.max_parallel_cases,
            "suite run started"
        );

        let ctx = Arc::new(RunContext::new(
            Arc::clone(&self.compiler),
            Sandbox::new(self.config.exec_timeout, self.config.isolation),
        ));
        let semaphore = Arc::new(Semaphore::new(self.config.max_parallel_cases));
        let collector = Arc::new(Mutex::new(Vec::with_capacity(registry.len())));
        let mut tasks = JoinSet::new();

        for case in registry.cases() {
            let case = case.clone();
            let ctx = Arc::clone(&ctx);
            let semaphore = Arc::clone(&semaphore);
            let collector = Arc::clone(&collector);
            tasks.spawn(async move {
                // Closed only when the whole set is being torn down.
                let Ok(_permit) = semaphore.acquire_owned().await else {
                    return;
                };
                let result = run_case(&ctx, &case).await;
                collector.lock().push(result);
            });
        }

        let mut harness_errors = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            if let Err(err) = joined {
                tracing::error!(error = %err, "case task failed");
                harness_errors.push(err.to_string());
            }
        }

        let mut results = match Arc::try_unwrap(collector) {
            Ok(mutex) => mutex.into_inner(),
            Err(shared) => shared.lock().clone(),
        };
        results.sort_by(|a, b| a.id.cmp(&b.id));

        let report = SuiteReport {
            run_id,
            suite: registry.name().to_owned(),
            config: self.config.clone(),
            started_at,
            finished_at: Utc::now(),
            results,
            harness_errors,
        };
        tracing::info!(
            run = %run_id,
            passed = report.count("pass"),
            total = report.results.len(),
            success = report.is_success(),
            "suite run finished"
        );
        report
    }
}
