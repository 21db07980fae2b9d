//! Per-case compatibility pipeline
//!
//! Drives one [`EvolutionCase`] through the full state machine:
//!
//! ```text
//! Init -> BaselineCompiled -> ClientCompiled -> EvolvedCompiled
//!      -> Linked -> Executed -> Verdicted
//! ```
//!
//! A terminal event short-circuits any state straight to `Verdicted`.
//! Baseline or client rejection marks the case malformed; an evolved
//! rejection is a legitimate not-linked verdict; compiler and sandbox
//! faults are infra failures, never compatibility findings.

use crate::case::{CaseId, EvolutionCase};
use crate::compare::{compare, render_diagnostics, CaseDisposition};
use dashmap::DashMap;
use evolink_artifact::{Artifact, ContentHash, Diagnostic, InterfaceDelta};
use evolink_compiler::{ArtifactCompiler, CompileCache, CompileOutput, CompilerFault, SourceUnit};
use evolink_sandbox::{Sandbox, Verdict};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Pipeline stages for one case, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaseState {
    /// Nothing compiled yet.
    Init,
    /// Baseline library artifact sealed.
    BaselineCompiled,
    /// Client artifact sealed against the baseline.
    ClientCompiled,
    /// Evolved compile finished, accepted or rejected.
    EvolvedCompiled,
    /// Client imports resolved against the evolved artifact.
    Linked,
    /// Image execution finished.
    Executed,
    /// Final disposition reached.
    Verdicted,
}

/// True when `from -> to` is a legal pipeline step: the next sequential
/// stage, or a short-circuit to `Verdicted` from anywhere else.
#[must_use]
pub fn validate_transition(from: CaseState, to: CaseState) -> bool {
    use CaseState::{
        BaselineCompiled, ClientCompiled, EvolvedCompiled, Executed, Init, Linked, Verdicted,
    };
    matches!(
        (from, to),
        (Init, BaselineCompiled)
            | (BaselineCompiled, ClientCompiled)
            | (ClientCompiled, EvolvedCompiled)
            | (EvolvedCompiled, Linked)
            | (Linked, Executed)
    ) || (to == Verdicted && from != Verdicted)
}

struct Progress {
    id: CaseId,
    state: CaseState,
}

impl Progress {
    fn new(id: CaseId) -> Self {
        Self {
            id,
            state: CaseState::Init,
        }
    }

    /// Moves to the next stage; an illegal move is a harness bug and
    /// surfaces as an infra failure upstream.
    fn advance(&mut self, to: CaseState) -> Result<(), String> {
        if !validate_transition(self.state, to) {
            return Err(format!(
                "illegal pipeline transition {:?} -> {to:?}",
                self.state
            ));
        }
        tracing::debug!(case = %self.id, from = ?self.state, to = ?to, "pipeline transition");
        self.state = to;
        Ok(())
    }
}

/// Artifacts sealed during one run, keyed by content hash.
///
/// Kept so reports can look artifacts up after the pipeline moved on;
/// dropped with the run.
#[derive(Debug, Default)]
pub struct ArtifactStore {
    inner: DashMap<ContentHash, Artifact>,
}

impl ArtifactStore {
    /// Records one artifact under its content hash.
    pub fn insert(&self, artifact: &Artifact) {
        self.inner.insert(*artifact.hash(), artifact.clone());
    }

    /// Fetches a copy by hash.
    #[must_use]
    pub fn get(&self, hash: &ContentHash) -> Option<Artifact> {
        self.inner.get(hash).map(|entry| entry.value().clone())
    }

    /// Number of distinct artifacts sealed so far.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    /// True when nothing has been sealed yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

/// Shared machinery for one suite run: compiler, cache, artifact store,
/// sandbox. Dropped when the run ends; nothing persists across runs.
pub struct RunContext {
    compiler: Arc<dyn ArtifactCompiler>,
    cache: CompileCache,
    store: ArtifactStore,
    sandbox: Sandbox,
}

impl RunContext {
    /// Builds a run context around a compiler and a configured sandbox.
    #[must_use]
    pub fn new(compiler: Arc<dyn ArtifactCompiler>, sandbox: Sandbox) -> Self {
        Self {
            compiler,
            cache: CompileCache::default(),
            store: ArtifactStore::default(),
            sandbox,
        }
    }

    /// The artifacts sealed during this run.
    #[inline]
    #[must_use]
    pub fn store(&self) -> &ArtifactStore {
        &self.store
    }

    async fn compile(
        &self,
        unit: &SourceUnit,
        deps: &[Artifact],
    ) -> Result<CompileOutput, CompilerFault> {
        self.cache
            .compile_with(self.compiler.as_ref(), unit, deps)
            .await
    }
}

/// Outcome of one case run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaseResult {
    /// The case this result belongs to.
    pub id: CaseId,
    /// Optional title from the case file.
    pub title: Option<String>,
    /// Expected-outcome kind the case declared.
    pub expected: String,
    /// Final classification.
    pub disposition: CaseDisposition,
    /// The observed verdict, absent for malformed cases and early faults.
    pub verdict: Option<Verdict>,
    /// Wall-clock time the case took.
    pub duration: Duration,
}

impl CaseResult {
    /// True when the case passed.
    #[inline]
    #[must_use]
    pub fn passed(&self) -> bool {
        self.disposition.is_pass()
    }
}

struct Outcome {
    disposition: CaseDisposition,
    verdict: Option<Verdict>,
}

impl Outcome {
    fn infra(detail: String) -> Self {
        Self {
            disposition: CaseDisposition::Infra { detail },
            verdict: None,
        }
    }

    fn malformed(stage: &str, diagnostics: &[Diagnostic]) -> Self {
        Self {
            disposition: CaseDisposition::Malformed {
                stage: stage.to_owned(),
                explanation: render_diagnostics(diagnostics),
            },
            verdict: None,
        }
    }
}

/// Runs one case end to end and classifies the result.
pub async fn run_case(ctx: &RunContext, case: &EvolutionCase) -> CaseResult {
    let started = Instant::now();
    tracing::debug!(case = %case.id, expected = case.expected.kind(), "case started");

    let outcome = match drive(ctx, case).await {
        Ok(outcome) => outcome,
        Err(bug) => Outcome::infra(bug),
    };

    let duration = started.elapsed();
    tracing::debug!(
        case = %case.id,
        disposition = outcome.disposition.label(),
        ?duration,
        "case finished"
    );
    CaseResult {
        id: case.id.clone(),
        title: case.title.clone(),
        expected: case.expected.kind().to_owned(),
        disposition: outcome.disposition,
        verdict: outcome.verdict,
        duration,
    }
}

async fn drive(ctx: &RunContext, case: &EvolutionCase) -> Result<Outcome, String> {
    let mut progress = Progress::new(case.id.clone());

    let baseline_unit = SourceUnit::baseline("baseline", &case.baseline);
    let baseline = match ctx.compile(&baseline_unit, &[]).await {
        Err(fault) => return Ok(Outcome::infra(format!("baseline compile fault: {fault}"))),
        Ok(CompileOutput::Rejected(diags)) => {
            return Ok(Outcome::malformed("baseline-compile", &diags));
        }
        Ok(CompileOutput::Success(artifact)) => artifact,
    };
    progress.advance(CaseState::BaselineCompiled)?;
    ctx.store.insert(&baseline);

    // The evolved compile has no data dependency on the client compile.
    let client_unit = SourceUnit::client("client", &case.client);
    let evolved_unit = SourceUnit::evolved("evolved", &case.evolved);
    let (client_out, evolved_out) = tokio::join!(
        ctx.compile(&client_unit, std::slice::from_ref(&baseline)),
        ctx.compile(&evolved_unit, &[]),
    );

    let client = match client_out {
        Err(fault) => return Ok(Outcome::infra(format!("client compile fault: {fault}"))),
        Ok(CompileOutput::Rejected(diags)) => {
            return Ok(Outcome::malformed("client-compile", &diags));
        }
        Ok(CompileOutput::Success(artifact)) => artifact,
    };
    progress.advance(CaseState::ClientCompiled)?;
    ctx.store.insert(&client);

    let evolved = match evolved_out {
        Err(fault) => return Ok(Outcome::infra(format!("evolved compile fault: {fault}"))),
        Ok(CompileOutput::Rejected(diags)) => {
            // A rejected evolution is a terminal verdict, not a defect:
            // the client simply has nothing to link against.
            progress.advance(CaseState::EvolvedCompiled)?;
            progress.advance(CaseState::Verdicted)?;
            let verdict = Verdict::not_linked(diags);
            let disposition = compare(&verdict, &case.expected);
            return Ok(Outcome {
                disposition,
                verdict: Some(verdict),
            });
        }
        Ok(CompileOutput::Success(artifact)) => artifact,
    };
    progress.advance(CaseState::EvolvedCompiled)?;
    ctx.store.insert(&evolved);

    let verdict = match ctx.sandbox.run(&client, &evolved).await {
        Ok(verdict) => verdict,
        Err(err) => return Ok(Outcome::infra(format!("sandbox fault: {err}"))),
    };
    if verdict.linked {
        progress.advance(CaseState::Linked)?;
        progress.advance(CaseState::Executed)?;
    }
    progress.advance(CaseState::Verdicted)?;

    let mut disposition = compare(&verdict, &case.expected);
    if let CaseDisposition::Fail { explanation } = &mut disposition {
        explanation.push_str("\ninterface delta:\n");
        let delta = InterfaceDelta::between(baseline.interface(), evolved.interface()).render();
        for line in delta.lines() {
            explanation.push_str("  ");
            explanation.push_str(line);
            explanation.push('\n');
        }
        explanation.pop();
    }
    Ok(Outcome {
        disposition,
        verdict: Some(verdict),
    })
}
