//! Pipeline configuration surface.
//!
//! Defaults can be overridden from the environment with `from_env`
//! (`POLYSOLVE_*` variables) or by deserializing a JSON document; missing
//! fields fall back to their defaults.

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::capability::RetryPolicy;
use crate::domain::{PipelineError, PipelineResult};

/// Largest accepted `retry.max_retries`.
pub const MAX_RETRIES_LIMIT: u32 = 10;

/// Tunables consumed by the pipeline controller and its stages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Maximum number of roles (K).
    pub role_cap: usize,
    /// Retry bounds applied to every external call.
    pub retry: RetryPolicy,
    /// Searches issued per role during evidence collection.
    pub queries_per_role: usize,
    /// Claims kept from a single search response.
    pub max_claims_per_query: usize,
    /// Supplementary fact-check searches allowed per run.
    pub lookup_cap: u32,
    /// Key-term Jaccard similarity at which two claims are considered related.
    pub overlap_threshold: f64,
    /// Upper bound on refinement iterations.
    pub max_iterations: u32,
    /// Score at which refinement stops early.
    pub quality_threshold: f64,
    /// Overall run deadline (milliseconds).
    pub run_deadline_ms: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            role_cap: 6,
            retry: RetryPolicy::default(),
            queries_per_role: 2,
            max_claims_per_query: 5,
            lookup_cap: 2,
            overlap_threshold: 0.3,
            max_iterations: 4,
            quality_threshold: 0.8,
            run_deadline_ms: 120_000,
        }
    }
}

fn env_override<T: std::str::FromStr>(key: &str, target: &mut T) {
    if let Ok(raw) = std::env::var(key) {
        match raw.trim().parse() {
            Ok(v) => *target = v,
            Err(_) => warn!(key, value = %raw, "ignoring unparsable config override"),
        }
    }
}

impl PipelineConfig {
    /// Defaults overridden by `POLYSOLVE_*` environment variables.
    pub fn from_env() -> Self {
        let mut cfg = Self::default();
        env_override("POLYSOLVE_ROLE_CAP", &mut cfg.role_cap);
        env_override("POLYSOLVE_MAX_ITERATIONS", &mut cfg.max_iterations);
        env_override("POLYSOLVE_QUALITY_THRESHOLD", &mut cfg.quality_threshold);
        env_override("POLYSOLVE_DEADLINE_MS", &mut cfg.run_deadline_ms);
        env_override("POLYSOLVE_MAX_RETRIES", &mut cfg.retry.max_retries);
        env_override("POLYSOLVE_LOOKUP_CAP", &mut cfg.lookup_cap);
        cfg
    }

    pub fn with_role_cap(mut self, k: usize) -> Self {
        self.role_cap = k;
        self
    }

    pub fn with_max_iterations(mut self, n: u32) -> Self {
        self.max_iterations = n;
        self
    }

    pub fn with_quality_threshold(mut self, t: f64) -> Self {
        self.quality_threshold = t;
        self
    }

    pub fn with_deadline_ms(mut self, ms: u64) -> Self {
        self.run_deadline_ms = ms;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_lookup_cap(mut self, cap: u32) -> Self {
        self.lookup_cap = cap;
        self
    }

    /// Reject configurations the pipeline cannot honour.
    pub fn validate(&self) -> PipelineResult<()> {
        let invalid = |msg: &str| Err(PipelineError::InvalidConfig(msg.to_string()));
        if self.role_cap == 0 {
            return invalid("role_cap must be at least 1");
        }
        if self.queries_per_role == 0 {
            return invalid("queries_per_role must be at least 1");
        }
        if self.max_claims_per_query == 0 {
            return invalid("max_claims_per_query must be at least 1");
        }
        if self.max_iterations == 0 {
            return invalid("max_iterations must be at least 1");
        }
        if !(0.0..=1.0).contains(&self.quality_threshold) {
            return invalid("quality_threshold must be within [0, 1]");
        }
        if !(0.0..=1.0).contains(&self.overlap_threshold) || self.overlap_threshold == 0.0 {
            return invalid("overlap_threshold must be within (0, 1]");
        }
        if self.run_deadline_ms == 0 {
            return invalid("run_deadline_ms must be positive");
        }
        if self.retry.timeout_ms == 0 {
            return invalid("retry.timeout_ms must be positive");
        }
        if self.retry.max_retries > MAX_RETRIES_LIMIT {
            return invalid(&format!("retry.max_retries must be at most {MAX_RETRIES_LIMIT}"));
        }
        Ok(())
    }
}
