//! Link-then-execute driver with process isolation
//!
//! [`Sandbox::run`] resolves the client against a substitute artifact and,
//! when the link holds, executes the image. The default isolation spawns
//! the current executable in `exec-image` mode against a temp-file image
//! with a cleared environment and a kill-on-timeout guard; in-process mode
//! skips the child process for callers that are not the real binary, such
//! as unit tests.

use crate::exec::{self, ExecOutcome};
use crate::image::LinkedImage;
use crate::link;
use crate::verdict::Verdict;
use evolink_artifact::Artifact;
use serde::{Deserialize, Serialize};
use std::process::Stdio;
use std::time::Duration;
use thiserror::Error;
use tokio::process::Command;

/// Wall-clock budget for one execution when none is configured.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// How an image is executed relative to the calling process.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Isolation {
    /// Spawn the current executable in `exec-image` mode. Only valid when
    /// the current executable is the evolink binary itself.
    #[default]
    Subprocess,
    /// Interpret on a blocking task inside this process.
    InProcess,
}

/// Infrastructure failures around an execution attempt.
///
/// These are faults of the harness, not of the image; callers surface
/// them as infra diagnostics rather than case outcomes.
#[derive(Debug, Error)]
pub enum SandboxError {
    /// Filesystem or process-spawn failure.
    #[error("sandbox i/o: {0}")]
    Io(#[from] std::io::Error),
    /// The image could not cross the process boundary.
    #[error("image encoding: {0}")]
    Image(#[from] serde_json::Error),
    /// The child exited without reporting an outcome.
    #[error("child runner failed with {status}: {stderr}")]
    Child {
        /// Exit status of the child process.
        status: std::process::ExitStatus,
        /// Captured child stderr, for the report.
        stderr: String,
    },
    /// The in-process execution task was cancelled or panicked.
    #[error("execution task failed: {0}")]
    Task(String),
}

/// Executes linked images under a timeout.
#[derive(Debug, Clone)]
pub struct Sandbox {
    timeout: Duration,
    isolation: Isolation,
}

impl Default for Sandbox {
    fn default() -> Self {
        Self::new(DEFAULT_TIMEOUT, Isolation::Subprocess)
    }
}

impl Sandbox {
    /// Creates a sandbox with an explicit timeout and isolation mode.
    #[must_use]
    pub fn new(timeout: Duration, isolation: Isolation) -> Self {
        Self { timeout, isolation }
    }

    /// Shorthand for an in-process sandbox, the mode tests use.
    #[must_use]
    pub fn in_process(timeout: Duration) -> Self {
        Self::new(timeout, Isolation::InProcess)
    }

    /// Configured wall-clock budget per execution.
    #[inline]
    #[must_use]
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Configured isolation mode.
    #[inline]
    #[must_use]
    pub fn isolation(&self) -> Isolation {
        self.isolation
    }

    /// Links `client` against `substitute` and executes the image.
    ///
    /// A failed link is a regular verdict, not an error; `Err` is reserved
    /// for harness faults such as a child that died without reporting.
    ///
    /// # Errors
    ///
    /// Returns [`SandboxError`] when the temp image cannot be written, the
    /// child cannot be spawned, or its output cannot be decoded.
    pub async fn run(
        &self,
        client: &Artifact,
        substitute: &Artifact,
    ) -> Result<Verdict, SandboxError> {
        let resolution = match link::resolve(client, substitute) {
            Ok(resolution) => resolution,
            Err(diagnostics) => return Ok(Verdict::not_linked(diagnostics)),
        };
        let image = LinkedImage::new(client.clone(), substitute.clone(), resolution);
        match self.isolation {
            Isolation::InProcess => self.run_in_process(image).await,
            Isolation::Subprocess => self.run_subprocess(image).await,
        }
    }

    async fn run_in_process(&self, image: LinkedImage) -> Result<Verdict, SandboxError> {
        let handle = tokio::task::spawn_blocking(move || exec::execute(&image));
        match tokio::time::timeout(self.timeout, handle).await {
            Ok(joined) => {
                let outcome = joined.map_err(|err| SandboxError::Task(err.to_string()))?;
                Ok(Verdict::completed(
                    outcome.exit_code,
                    outcome.stdout,
                    outcome.diagnostics,
                ))
            }
            Err(_) => Ok(Verdict::timed_out(self.timeout)),
        }
    }

    async fn run_subprocess(&self, image: LinkedImage) -> Result<Verdict, SandboxError> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("image.json");
        tokio::fs::write(&path, image.to_bytes()?).await?;

        let exe = std::env::current_exe()?;
        let mut command = Command::new(exe);
        command
            .arg("exec-image")
            .arg(&path)
            .env_clear()
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        tracing::debug!(image = %path.display(), "spawning image runner");

        let child = command.spawn()?;
        let output = match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(output) => output?,
            Err(_) => return Ok(Verdict::timed_out(self.timeout)),
        };

        // The child reports runtime exit codes inside the outcome, so an
        // undecodable stdout means the runner itself broke.
        let outcome: ExecOutcome = match serde_json::from_slice(&output.stdout) {
            Ok(outcome) => outcome,
            Err(_) => {
                return Err(SandboxError::Child {
                    status: output.status,
                    stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
                });
            }
        };
        tracing::debug!(exit_code = outcome.exit_code, "image executed");
        Ok(Verdict::completed(
            outcome.exit_code,
            outcome.stdout,
            outcome.diagnostics,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use evolink_compiler::{ArtifactCompiler, ReferenceCompiler, SourceUnit};
    use pretty_assertions::assert_eq;

    async fn compile(unit: SourceUnit, deps: &[Artifact]) -> Artifact {
        ReferenceCompiler::new()
            .compile(&unit, deps)
            .await
            .unwrap()
            .artifact()
            .expect("fixture source must compile")
            .clone()
    }

    fn sandbox() -> Sandbox {
        Sandbox::in_process(Duration::from_secs(5))
    }

    #[tokio::test]
    async fn clean_run_yields_a_completed_verdict() {
        let lib = compile(SourceUnit::baseline("lib", "module lib\nval answer: Int = 41\n"), &[])
            .await;
        let client = compile(
            SourceUnit::client(
                "main",
                "module main\nuse lib\nfun main() { print(lib.answer + 1) }",
            ),
            std::slice::from_ref(&lib),
        )
        .await;

        let verdict = sandbox().run(&client, &lib).await.unwrap();
        assert!(verdict.linked);
        assert!(verdict.executed);
        assert_eq!(verdict.exit_code, Some(0));
        assert_eq!(verdict.stdout, "42\n");
    }

    #[tokio::test]
    async fn broken_link_yields_a_not_linked_verdict() {
        let baseline = compile(
            SourceUnit::baseline("lib", "module lib\nfun gone(): Int = 7\n"),
            &[],
        )
        .await;
        let client = compile(
            SourceUnit::client("main", "module main\nuse lib\nfun main() { print(lib.gone()) }"),
            std::slice::from_ref(&baseline),
        )
        .await;
        let evolved = compile(
            SourceUnit::evolved("lib", "module lib\nval other: Int = 1\n"),
            &[],
        )
        .await;

        let verdict = sandbox().run(&client, &evolved).await.unwrap();
        assert!(!verdict.linked);
        assert!(!verdict.executed);
        assert_eq!(verdict.exit_code, None);
        assert!(verdict
            .diagnostics
            .iter()
            .any(|d| d.message.contains("unresolved symbol `lib.gone()`")));
    }

    #[tokio::test]
    async fn runtime_fault_keeps_linked_but_not_executed() {
        let lib = compile(
            SourceUnit::baseline("lib", "module lib\nlateinit var tag: Str\n"),
            &[],
        )
        .await;
        let client = compile(
            SourceUnit::client("main", "module main\nuse lib\nfun main() { print(lib.tag) }"),
            std::slice::from_ref(&lib),
        )
        .await;

        let verdict = sandbox().run(&client, &lib).await.unwrap();
        assert!(verdict.linked);
        assert!(!verdict.executed);
        assert_eq!(verdict.exit_code, Some(1));
        assert!(verdict.diagnostics[0].message.contains("lateinit"));
    }
}
