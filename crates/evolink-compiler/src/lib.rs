//! evolink Compiler Contract
//!
//! The seam between the verification engine and compiler front ends, plus
//! the built-in ulib reference front end.
//!
//! # Core Concepts
//!
//! - [`ArtifactCompiler`]: async trait turning one source unit plus prior
//!   artifacts into an [`evolink_artifact::Artifact`] or a rejection
//! - [`SourceUnit`]: source text with the stage tag its diagnostics carry
//! - [`CompileOutput`]: success with a sealed artifact, or rejection with
//!   structured diagnostics
//! - [`CompilerFault`]: infrastructure failure, distinct from rejection
//! - [`CompileCache`]: per-run memoization keyed by content, dropped with
//!   the run
//! - [`ReferenceCompiler`]: deterministic ulib front end (lexer, parser,
//!   lowering)
//!
//! # Example
//!
//! ```rust,ignore
//! use evolink_compiler::{ArtifactCompiler, ReferenceCompiler, SourceUnit};
//!
//! let compiler = ReferenceCompiler::new();
//! let out = compiler
//!     .compile(&SourceUnit::baseline("lib", source), &[])
//!     .await?;
//! ```

#![warn(unreachable_pub)]

// Front-end pipeline
mod ast;
mod lexer;
mod lower;
mod parse;

// Contract and caching
mod cache;
mod reference;

// Re-exports
pub use cache::CompileCache;
pub use reference::{
    ArtifactCompiler, CompileOutput, CompilerFault, ReferenceCompiler, SourceUnit,
};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
