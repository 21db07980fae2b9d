//! Shared fixtures and helpers for evolink tests
//!
//! Canned ulib sources, compile shortcuts that panic on rejection, and a
//! suite-directory writer. Everything here is test support; panics are
//! the failure mode by design of the callers, not errors to propagate.

use evolink_artifact::Artifact;
use evolink_compiler::{ArtifactCompiler, CompileOutput, ReferenceCompiler, SourceUnit};
use evolink_sandbox::{Isolation, Sandbox, Verdict};
use std::path::Path;
use std::time::Duration;

/// A small library exporting a function, a mutable property, and a class
/// reachable through a factory.
pub const COUNTER_LIB: &str = "\
module lib
val label: Str = \"count: \"
var total: Int = 0
fun bump(n: Int): Int = n + 1
class Counter {
  val step: Int = 1
  fun next(n: Int): Int = n + step
}
fun makeCounter(): Counter = new Counter
";

/// A client exercising every export of [`COUNTER_LIB`].
pub const COUNTER_CLIENT: &str = "\
module main
use lib
fun main() {
  lib.total = lib.bump(4)
  print(lib.label + \"start\")
  print(lib.total)
  print(lib.makeCounter().next(10))
}
";

/// Stdout of [`COUNTER_CLIENT`] against [`COUNTER_LIB`].
pub const COUNTER_STDOUT: &str = "count: start\n5\n11\n";

/// Compiles one unit with the reference compiler, panicking on rejection
/// so fixture mistakes fail loudly.
pub async fn compile(unit: SourceUnit, deps: &[Artifact]) -> Artifact {
    let label = unit.name.clone();
    let output = ReferenceCompiler::new()
        .compile(&unit, deps)
        .await
        .unwrap_or_else(|fault| panic!("compiler fault in fixture `{label}`: {fault}"));
    match output {
        CompileOutput::Success(artifact) => artifact,
        CompileOutput::Rejected(diags) => {
            panic!("fixture `{label}` does not compile: {diags:?}")
        }
    }
}

/// Baseline library artifact from source text.
pub async fn baseline(module: &str, text: &str) -> Artifact {
    compile(SourceUnit::baseline(module, text), &[]).await
}

/// Evolved library artifact from source text.
pub async fn evolved(module: &str, text: &str) -> Artifact {
    compile(SourceUnit::evolved(module, text), &[]).await
}

/// Client artifact compiled against one dependency.
pub async fn client(text: &str, dep: &Artifact) -> Artifact {
    compile(SourceUnit::client("main", text), std::slice::from_ref(dep)).await
}

/// In-process sandbox with a short timeout, the mode tests run under.
#[must_use]
pub fn sandbox() -> Sandbox {
    Sandbox::new(Duration::from_secs(5), Isolation::InProcess)
}

/// Compiles baseline, client, and evolved sources, then links and runs
/// the client against the evolved artifact in-process.
pub async fn verdict_of(baseline_src: &str, evolved_src: &str, client_src: &str) -> Verdict {
    let base = baseline("lib", baseline_src).await;
    let cli = client(client_src, &base).await;
    let evo = evolved("lib", evolved_src).await;
    sandbox()
        .run(&cli, &evo)
        .await
        .unwrap_or_else(|err| panic!("sandbox fault in fixture run: {err}"))
}

/// Writes a complete suite directory: every `.evo` file plus a manifest
/// registering each derived id. Panics on I/O failure.
pub fn write_suite(dir: &Path, name: &str, files: &[(&str, &str)]) {
    let mut manifest = format!("[suite]\nname = \"{name}\"\n");
    for (file, _) in files {
        let stem = file.trim_end_matches(".evo");
        manifest.push_str("[[case]]\nid = \"");
        manifest.push_str(&upper_camel(stem));
        manifest.push_str("\"\n");
    }
    std::fs::write(dir.join("suite.toml"), manifest)
        .unwrap_or_else(|err| panic!("writing suite manifest: {err}"));
    for (file, text) in files {
        std::fs::write(dir.join(file), text)
            .unwrap_or_else(|err| panic!("writing case file `{file}`: {err}"));
    }
}

fn upper_camel(stem: &str) -> String {
    let mut id = String::with_capacity(stem.len());
    for segment in stem.split(['-', '_', '.', ' ']) {
        let mut chars = segment.chars();
        if let Some(first) = chars.next() {
            id.extend(first.to_uppercase());
            id.push_str(chars.as_str());
        }
    }
    id
}
