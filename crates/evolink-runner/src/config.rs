//! Suite-level configuration
//!
//! One [`SuiteConfig`] covers a whole run; the CLI overlays flags on top
//! of the defaults. Serializable so a report can echo the configuration
//! it ran under.

use evolink_sandbox::{Isolation, DEFAULT_TIMEOUT};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Bound on concurrently running cases when none is configured.
pub const DEFAULT_MAX_PARALLEL_CASES: usize = 8;

/// Knobs for one suite run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuiteConfig {
    /// Upper bound on cases in flight at once; never below one.
    pub max_parallel_cases: usize,
    /// Wall-clock budget for each sandbox execution.
    pub exec_timeout: Duration,
    /// How linked images are executed.
    pub isolation: Isolation,
}

impl Default for SuiteConfig {
    fn default() -> Self {
        Self {
            max_parallel_cases: DEFAULT_MAX_PARALLEL_CASES,
            exec_timeout: DEFAULT_TIMEOUT,
            isolation: Isolation::Subprocess,
        }
    }
}

impl SuiteConfig {
    /// Configuration with all defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Caps concurrent cases; zero is clamped to one.
    #[must_use]
    pub fn with_max_parallel_cases(mut self, bound: usize) -> Self {
        self.max_parallel_cases = bound.max(1);
        self
    }

    /// Sets the per-execution timeout.
    #[must_use]
    pub fn with_exec_timeout(mut self, timeout: Duration) -> Self {
        self.exec_timeout = timeout;
        self
    }

    /// Sets the isolation mode.
    #[must_use]
    pub fn with_isolation(mut self, isolation: Isolation) -> Self {
        self.isolation = isolation;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn builders_overlay_defaults() {
        let config = SuiteConfig::new()
            .with_max_parallel_cases(2)
            .with_exec_timeout(Duration::from_secs(3))
            .with_isolation(Isolation::InProcess);
        assert_eq!(config.max_parallel_cases, 2);
        assert_eq!(config.exec_timeout, Duration::from_secs(3));
        assert_eq!(config.isolation, Isolation::InProcess);
    }

    #[test]
    fn zero_parallelism_is_clamped() {
        let config = SuiteConfig::new().with_max_parallel_cases(0);
        assert_eq!(config.max_parallel_cases, 1);
    }

    #[test]
    fn survives_a_serde_round_trip() {
        let config = SuiteConfig::new().with_isolation(Isolation::InProcess);
        let json = serde_json::to_string(&config).unwrap();
        let back: SuiteConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(config, back);
    }
}
