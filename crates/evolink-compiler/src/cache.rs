//! Per-run compile memoization
//!
//! One [`CompileCache`] is owned by one suite run and dropped with it, so
//! repeated compiles of the same unit (shared fixtures, no-op evolutions)
//! are paid once while nothing persists across runs.
//!
//! The key is `blake3(source text ‖ dependency hashes ‖ compiler
//! fingerprint)`. The unit's stage tag and label stay out of it: identical
//! text against identical dependencies is one compile regardless of which
//! pipeline stage asks. Only successful outputs are cached; rejections
//! re-run so their diagnostics always carry the asking stage's tag.

use crate::{ArtifactCompiler, CompileOutput, CompilerFault, SourceUnit};
use evolink_artifact::{Artifact, ContentHash};
use moka::future::Cache;

/// Entry bound that comfortably covers a large suite's distinct units.
const DEFAULT_CAPACITY: u64 = 512;

/// Memoizing front for an [`ArtifactCompiler`].
#[derive(Debug)]
pub struct CompileCache {
    entries: Cache<ContentHash, Artifact>,
}

impl CompileCache {
    /// Build a cache holding at most `capacity` artifacts.
    #[must_use]
    pub fn new(capacity: u64) -> Self {
        Self {
            entries: Cache::builder().max_capacity(capacity).build(),
        }
    }

    /// The cache key for one compile request.
    #[must_use]
    pub fn key(unit: &SourceUnit, deps: &[Artifact], fingerprint: &str) -> ContentHash {
        let mut chunks: Vec<&[u8]> = Vec::with_capacity(deps.len() + 2);
        chunks.push(unit.text.as_bytes());
        for dep in deps {
            chunks.push(dep.hash().as_bytes());
        }
        chunks.push(fingerprint.as_bytes());
        ContentHash::chain(chunks)
    }

    /// Compile through the cache.
    ///
    /// # Errors
    /// Propagates the compiler's [`CompilerFault`]; faults are never cached.
    pub async fn compile_with<C>(
        &self,
        compiler: &C,
        unit: &SourceUnit,
        deps: &[Artifact],
    ) -> Result<CompileOutput, CompilerFault>
    where
        C: ArtifactCompiler + ?Sized,
    {
        let key = Self::key(unit, deps, compiler.fingerprint());
        if let Some(artifact) = self.entries.get(&key).await {
            tracing::debug!(unit = %unit.name, key = %key.short(), "compile cache hit");
            return Ok(CompileOutput::Success(artifact));
        }
        let output = compiler.compile(unit, deps).await?;
        if let CompileOutput::Success(artifact) = &output {
            self.entries.insert(key, artifact.clone()).await;
        }
        Ok(output)
    }
}

impl Default for CompileCache {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ReferenceCompiler;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const LIB: &str = "module lib\nfun greet(): Str = \"hello\"\n";

    struct Counting {
        inner: ReferenceCompiler,
        calls: AtomicUsize,
    }

    impl Counting {
        fn new() -> Self {
            Self {
                inner: ReferenceCompiler::new(),
                calls: AtomicUsize::new(0),
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::Relaxed)
        }
    }

    #[async_trait]
    impl ArtifactCompiler for Counting {
        fn fingerprint(&self) -> &str {
            self.inner.fingerprint()
        }

        async fn compile(
            &self,
            unit: &SourceUnit,
            deps: &[Artifact],
        ) -> Result<CompileOutput, CompilerFault> {
            self.calls.fetch_add(1, Ordering::Relaxed);
            self.inner.compile(unit, deps).await
        }
    }

    #[tokio::test]
    async fn second_compile_hits_the_cache() {
        let cache = CompileCache::default();
        let compiler = Counting::new();
        let unit = SourceUnit::baseline("lib", LIB);

        let first = cache.compile_with(&compiler, &unit, &[]).await.unwrap();
        let second = cache.compile_with(&compiler, &unit, &[]).await.unwrap();

        assert_eq!(compiler.calls(), 1);
        assert_eq!(
            first.artifact().expect("first").hash(),
            second.artifact().expect("second").hash()
        );
    }

    #[tokio::test]
    async fn evolved_stage_reuses_the_baseline_compile() {
        let cache = CompileCache::default();
        let compiler = Counting::new();

        let baseline = SourceUnit::baseline("lib", LIB);
        let evolved = SourceUnit::evolved("lib", LIB);
        cache.compile_with(&compiler, &baseline, &[]).await.unwrap();
        cache.compile_with(&compiler, &evolved, &[]).await.unwrap();

        assert_eq!(compiler.calls(), 1);
    }

    #[tokio::test]
    async fn rejections_are_not_cached() {
        let cache = CompileCache::default();
        let compiler = Counting::new();
        let unit = SourceUnit::baseline("lib", "module lib\nfun broken(: Int = 1\n");

        let first = cache.compile_with(&compiler, &unit, &[]).await.unwrap();
        let second = cache.compile_with(&compiler, &unit, &[]).await.unwrap();

        assert!(!first.is_success());
        assert!(!second.is_success());
        assert_eq!(compiler.calls(), 2);
    }

    #[tokio::test]
    async fn fingerprint_and_dependencies_shape_the_key() {
        let compiler = ReferenceCompiler::new();
        let lib_a = compiler
            .compile(&SourceUnit::baseline("lib", LIB), &[])
            .await
            .unwrap();
        let lib_b = compiler
            .compile(
                &SourceUnit::baseline("lib", "module lib\nfun greet(): Str = \"hi\"\n"),
                &[],
            )
            .await
            .unwrap();
        let lib_a = lib_a.artifact().expect("a").clone();
        let lib_b = lib_b.artifact().expect("b").clone();

        let client = SourceUnit::client("main", "module main\nuse lib\nfun main() { }");
        let against_a = CompileCache::key(&client, std::slice::from_ref(&lib_a), "refc/1");
        let against_b = CompileCache::key(&client, std::slice::from_ref(&lib_b), "refc/1");
        let other_front_end = CompileCache::key(&client, std::slice::from_ref(&lib_a), "extc/9");

        assert_ne!(against_a, against_b);
        assert_ne!(against_a, other_front_end);
    }
}
