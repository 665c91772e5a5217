use std::time::Duration as StdDuration;

use chrono::Duration;
use serde::{Deserialize, Serialize};

use crate::error::{CurationError, Result};

/// Every tunable of the validation core.
///
/// All sections carry defaults so a deployment only has to spell out the
/// knobs it actually changes.
#[derive(Clone, Debug, Serialize, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct CurationConfig {
    /// Distributed scheduler lock.
    pub lock: SchedulerLockConfig,
    /// Persisted circuit breaker guarding the metadata gateway.
    pub circuit_breaker: CircuitBreakerConfig,
    /// Per-process pacing of outbound gateway calls.
    pub throttle: ThrottleConfig,
    /// Selection and batching for validation passes.
    pub validation: ValidationConfig,
    /// Budgets applied to every coordination-store call.
    pub timeouts: StoreTimeouts,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SchedulerLockConfig {
    /// How long a holder may keep the lock before it can be reclaimed. Must
    /// comfortably exceed the longest expected run.
    pub lock_ttl_minutes: u32,
    /// Fixed identifier of the single lock row.
    pub resource_id: String,
}

impl Default for SchedulerLockConfig {
    fn default() -> Self {
        Self {
            lock_ttl_minutes: 120,
            resource_id: "content_validation_scheduler".into(),
        }
    }
}

impl SchedulerLockConfig {
    pub fn ttl(&self) -> Duration {
        Duration::minutes(i64::from(self.lock_ttl_minutes))
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    /// When false every request is allowed and nothing is recorded.
    pub enabled: bool,
    /// Fixed identifier of the single breaker row.
    pub resource_id: String,
    /// Rate-limit errors inside one window that trip the breaker.
    pub rolling_window_error_threshold: u32,
    pub rolling_window_minutes: u32,
    /// Cooldown at backoff level 0.
    pub cooldown_base_minutes: u32,
    /// Growth factor applied per backoff level.
    pub cooldown_multiplier: f64,
    /// Upper bound for the exponential cooldown, before jitter.
    pub cooldown_max_minutes: u32,
    /// Random extra cooldown in `[0, jitter]` so instances do not probe in lockstep.
    pub cooldown_jitter_seconds: u32,
    /// Highest backoff level reachable through failed probes.
    pub max_backoff_level: u32,
    /// Quiet period after the last failure before a success lowers the level.
    pub backoff_decay_hours: u32,
    /// A probe without a recorded result after this long counts as failed.
    pub probe_timeout_seconds: u32,
    /// Attempts for one read-compute-write cycle before giving up.
    pub max_persistence_retries: u32,
    /// Extra lowercase substrings that mark an upstream error as rate limiting.
    pub extra_rate_limit_patterns: Vec<String>,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            resource_id: "metadata_gateway".into(),
            rolling_window_error_threshold: 3,
            rolling_window_minutes: 10,
            cooldown_base_minutes: 60,
            cooldown_multiplier: 3.0,
            cooldown_max_minutes: 2880,
            cooldown_jitter_seconds: 60,
            max_backoff_level: 4,
            backoff_decay_hours: 48,
            probe_timeout_seconds: 30,
            max_persistence_retries: 3,
            extra_rate_limit_patterns: Vec::new(),
        }
    }
}

impl CircuitBreakerConfig {
    pub fn rolling_window(&self) -> Duration {
        Duration::minutes(i64::from(self.rolling_window_minutes))
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::seconds(i64::from(self.probe_timeout_seconds))
    }

    pub fn backoff_decay(&self) -> Duration {
        Duration::hours(i64::from(self.backoff_decay_hours))
    }

    /// `base * multiplier^level`, capped at the configured maximum. Jitter is
    /// added by the caller.
    pub fn cooldown_for_level(&self, level: u32) -> Duration {
        let base_secs = f64::from(self.cooldown_base_minutes) * 60.0;
        let max_secs = f64::from(self.cooldown_max_minutes) * 60.0;
        let exponent = i32::try_from(level).unwrap_or(i32::MAX);
        let scaled = base_secs * self.cooldown_multiplier.max(1.0).powi(exponent);
        let capped = scaled.min(max_secs).max(0.0);
        Duration::seconds(capped.round() as i64)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ThrottleConfig {
    pub enabled: bool,
    /// Minimum spacing between two outbound calls from this process.
    pub delay_between_items_ms: u64,
    /// Random extra spacing in `[0, jitter_ms)`.
    pub jitter_ms: u64,
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            delay_between_items_ms: 3_000,
            jitter_ms: 1_000,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ValidationConfig {
    /// Default item budget for a run when the trigger does not pass one.
    pub max_items_per_run: u32,
    /// Items validated more recently than this are left alone.
    pub staleness_hours: u32,
    /// Ids handed to the gateway per call; progress is persisted after each batch.
    pub batch_size: usize,
    /// Actor recorded on audit events when the trigger names no actor.
    pub system_actor: String,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            max_items_per_run: 10,
            staleness_hours: 24,
            batch_size: 25,
            system_actor: "Content Validation".into(),
        }
    }
}

impl ValidationConfig {
    pub fn staleness(&self) -> Duration {
        Duration::hours(i64::from(self.staleness_hours))
    }
}

/// Read/write budgets for store calls. On expiry the caller applies its
/// fail-safe policy.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct StoreTimeouts {
    pub read_secs: u64,
    pub write_secs: u64,
    /// Selection and listing queries that may scan many rows.
    pub bulk_query_secs: u64,
}

impl Default for StoreTimeouts {
    fn default() -> Self {
        Self {
            read_secs: 5,
            write_secs: 10,
            bulk_query_secs: 30,
        }
    }
}

impl StoreTimeouts {
    pub fn read(&self) -> StdDuration {
        StdDuration::from_secs(self.read_secs)
    }

    pub fn write(&self) -> StdDuration {
        StdDuration::from_secs(self.write_secs)
    }

    pub fn bulk_query(&self) -> StdDuration {
        StdDuration::from_secs(self.bulk_query_secs)
    }
}

impl CurationConfig {
    /// Guard rails on values that would make the coordination primitives unsafe
    /// or useless.
    pub fn validate(&self) -> Result<()> {
        let mut problems = Vec::new();
        let breaker = &self.circuit_breaker;

        if !(10..=1440).contains(&self.lock.lock_ttl_minutes) {
            problems.push("lock.lock_ttl_minutes must be within 10..=1440");
        }
        if !(1..=20).contains(&breaker.rolling_window_error_threshold) {
            problems.push(
                "circuit_breaker.rolling_window_error_threshold must be within 1..=20",
            );
        }
        if !(1..=60).contains(&breaker.rolling_window_minutes) {
            problems
                .push("circuit_breaker.rolling_window_minutes must be within 1..=60");
        }
        if breaker.cooldown_base_minutes == 0 {
            problems.push("circuit_breaker.cooldown_base_minutes must be at least 1");
        }
        if breaker.cooldown_base_minutes > breaker.cooldown_max_minutes {
            problems.push(
                "circuit_breaker.cooldown_base_minutes must not exceed cooldown_max_minutes",
            );
        }
        if !breaker.cooldown_multiplier.is_finite() || breaker.cooldown_multiplier < 1.0 {
            problems.push("circuit_breaker.cooldown_multiplier must be >= 1.0");
        }
        if !(5..=120).contains(&breaker.probe_timeout_seconds) {
            problems.push("circuit_breaker.probe_timeout_seconds must be within 5..=120");
        }
        if !(1..=10).contains(&breaker.max_persistence_retries) {
            problems
                .push("circuit_breaker.max_persistence_retries must be within 1..=10");
        }
        if self.throttle.delay_between_items_ms > 60_000 {
            problems.push("throttle.delay_between_items_ms must not exceed 60000");
        }
        if self.throttle.jitter_ms > 30_000 {
            problems.push("throttle.jitter_ms must not exceed 30000");
        }
        if self.validation.max_items_per_run > 500 {
            problems.push("validation.max_items_per_run must not exceed 500");
        }
        if self.validation.batch_size == 0 {
            problems.push("validation.batch_size must be at least 1");
        }
        if self.timeouts.read_secs == 0 || self.timeouts.write_secs == 0 {
            problems.push("timeouts.read_secs and timeouts.write_secs must be at least 1");
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(CurationError::InvalidConfig(problems.join("; ")))
        }
    }
}
