//! Linking and isolated execution for evolink artifacts
//!
//! This crate takes the dependency resolution step that the compiler
//! deferred and carries it through to a process-level verdict:
//!
//! - **Link**: re-resolve a client's import table against a substitute
//!   artifact, enforcing presence, visibility, symbol kind, signature
//!   shape, mutability, and instantiability
//! - **Image**: bundle client, substitute, and resolution into a
//!   serializable unit that can cross a process boundary intact
//! - **Execute**: interpret the image's entry point, dispatching
//!   non-captured references into the substitute
//! - **Sandbox**: drive link-then-execute under a timeout, in a killable
//!   child process or inline for tests
//!
//! # Core Concepts
//!
//! A **substitute** is whatever artifact stands in for the client's
//! compile-time dependency at run time; binary compatibility is the
//! question of whether an *evolved* substitute still links and behaves.
//! A [`Verdict`] records how far an attempt got: linked, executed, exit
//! code, captured stdout, and any diagnostics along the way.
//!
//! # Example
//!
//! ```ignore
//! use evolink_sandbox::{Isolation, Sandbox};
//! use std::time::Duration;
//!
//! let sandbox = Sandbox::new(Duration::from_secs(10), Isolation::Subprocess);
//! let verdict = sandbox.run(&client, &evolved).await?;
//! if !verdict.linked {
//!     for diag in &verdict.diagnostics {
//!         eprintln!("{diag}");
//!     }
//! }
//! ```

#![warn(unreachable_pub)]

mod exec;
mod image;
mod link;
mod process;
mod verdict;

pub use exec::{execute, ExecOutcome};
pub use image::LinkedImage;
pub use link::{resolve, Binding, Resolution};
pub use process::{Isolation, Sandbox, SandboxError, DEFAULT_TIMEOUT};
pub use verdict::Verdict;

/// Crate version, exposed for diagnostics and reports.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod integration_tests {
    use super::*;
    use evolink_artifact::Artifact;
    use evolink_compiler::{ArtifactCompiler, ReferenceCompiler, SourceUnit};
    use pretty_assertions::assert_eq;
    use std::time::Duration;

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
    async fn compatible_evolution_replays_identically() {
        let baseline = compile(
            SourceUnit::baseline("lib", "module lib\nfun greet(): Str = \"hi\"\n"),
            &[],
        )
        .await;
        let evolved = compile(
            SourceUnit::evolved(
                "lib",
                "module lib\nfun greet(): Str = \"hi\"\nfun extra(): Int = 9\n",
            ),
            &[],
        )
        .await;
        let client = compile(
            SourceUnit::client("main", "module main\nuse lib\nfun main() { print(lib.greet()) }"),
            std::slice::from_ref(&baseline),
        )
        .await;

        let before = sandbox().run(&client, &baseline).await.unwrap();
        let after = sandbox().run(&client, &evolved).await.unwrap();
        assert!(before.linked && after.linked);
        assert_eq!(before.stdout, after.stdout);
        assert_eq!(before.exit_code, after.exit_code);
    }

    #[tokio::test]
    async fn kind_change_is_caught_at_link_time() {
        let baseline = compile(
            SourceUnit::baseline("lib", "module lib\nfun version(): Int = 1\n"),
            &[],
        )
        .await;
        let evolved = compile(
            SourceUnit::evolved("lib", "module lib\nval version: Int = 2\n"),
            &[],
        )
        .await;
        let client = compile(
            SourceUnit::client(
                "main",
                "module main\nuse lib\nfun main() { print(lib.version()) }",
            ),
            std::slice::from_ref(&baseline),
        )
        .await;

        let verdict = sandbox().run(&client, &evolved).await.unwrap();
        assert!(!verdict.linked);
        assert!(verdict
            .diagnostics
            .iter()
            .any(|d| d.message.contains("symbol kind mismatch")));
    }

    #[tokio::test]
    async fn image_survives_the_wire_and_replays() {
        let lib = compile(
            SourceUnit::baseline("lib", "module lib\nval seed: Int = 3\nfun bump(x: Int): Int = x + 1\n"),
            &[],
        )
        .await;
        let client = compile(
            SourceUnit::client(
                "main",
                "module main\nuse lib\nfun main() { print(lib.bump(lib.seed)) }",
            ),
            std::slice::from_ref(&lib),
        )
        .await;

        let resolution = resolve(&client, &lib).unwrap();
        let image = LinkedImage::new(client, lib, resolution);
        let direct = execute(&image);

        let bytes = image.to_bytes().unwrap();
        let revived = LinkedImage::from_bytes(&bytes).unwrap();
        assert!(revived.verify());
        let replayed = execute(&revived);

        assert_eq!(direct, replayed);
        assert_eq!(direct.stdout, "4\n");
    }
}
