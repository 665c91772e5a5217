use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::config::CircuitBreakerConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CircuitState {
    #[default]
    Closed,
    Open,
    HalfOpen,
}

impl CircuitState {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Closed => "CLOSED",
            Self::Open => "OPEN",
            Self::HalfOpen => "HALF_OPEN",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "CLOSED" => Some(Self::Closed),
            "OPEN" => Some(Self::Open),
            "HALF_OPEN" => Some(Self::HalfOpen),
            _ => None,
        }
    }
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Single-flight probe lease.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProbeStatus {
    #[default]
    None,
    InFlight,
}

impl ProbeStatus {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::None => "NONE",
            Self::InFlight => "IN_FLIGHT",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "NONE" => Some(Self::None),
            "IN_FLIGHT" => Some(Self::InFlight),
            _ => None,
        }
    }
}

/// Cluster-shared breaker record. Every write is a
/// [`compare_and_set`](crate::database::ports::CircuitBreakerRepository)
/// against the version read in the same cycle.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CircuitBreakerState {
    pub state: CircuitState,
    pub opened_at: Option<DateTime<Utc>>,
    pub cooldown_until: Option<DateTime<Utc>>,
    pub last_triggered_by: Option<String>,
    pub trigger_message: Option<String>,
    /// Rate-limit errors counted in the current rolling window.
    pub consecutive_failures: u32,
    pub last_failure_at: Option<DateTime<Utc>>,
    pub window_start_at: Option<DateTime<Utc>>,
    pub backoff_level: u32,
    pub probe_status: ProbeStatus,
    pub probe_started_at: Option<DateTime<Utc>>,
    /// 0 until the first write, then strictly increasing.
    pub version: i64,
}

/// What an `allow_request` cycle has to do after reading the state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum AllowTransition {
    Allow,
    Block,
    /// Persist `next` (version-guarded) and answer `allowed` if the write wins.
    Write {
        next: CircuitBreakerState,
        allowed: bool,
    },
}

/// A rate-limit failure as recorded on the breaker.
#[derive(Debug, Clone, Copy)]
pub(crate) struct FailureRecord<'a> {
    pub triggered_by: &'a str,
    pub message: &'a str,
}

impl CircuitBreakerState {
    fn successor(&self) -> Self {
        let mut next = self.clone();
        next.version = self.version + 1;
        next
    }

    pub fn remaining_cooldown(&self, now: DateTime<Utc>) -> Duration {
        match (self.state, self.cooldown_until) {
            (CircuitState::Open, Some(until)) if until > now => until - now,
            _ => Duration::zero(),
        }
    }

    fn probe_timed_out(
        &self,
        now: DateTime<Utc>,
        config: &CircuitBreakerConfig,
    ) -> bool {
        match self.probe_started_at {
            Some(started) => now >= started + config.probe_timeout(),
            None => true,
        }
    }

    pub(crate) fn evaluate_allow(
        &self,
        now: DateTime<Utc>,
        config: &CircuitBreakerConfig,
        jitter: Duration,
    ) -> AllowTransition {
        match self.state {
            CircuitState::Closed => AllowTransition::Allow,
            CircuitState::Open => {
                if self.cooldown_until.is_some_and(|until| now < until) {
                    AllowTransition::Block
                } else {
                    AllowTransition::Write {
                        next: self.claim_probe(now),
                        allowed: true,
                    }
                }
            }
            CircuitState::HalfOpen => match self.probe_status {
                ProbeStatus::InFlight if self.probe_timed_out(now, config) => {
                    AllowTransition::Write {
                        next: self.reopen(
                            now,
                            config,
                            jitter,
                            FailureRecord {
                                triggered_by: "ProbeTimeout",
                                message: "probe produced no result before the timeout",
                            },
                        ),
                        allowed: false,
                    }
                }
                ProbeStatus::InFlight => AllowTransition::Block,
                ProbeStatus::None => AllowTransition::Write {
                    next: self.claim_probe(now),
                    allowed: true,
                },
            },
        }
    }

    fn claim_probe(&self, now: DateTime<Utc>) -> Self {
        let mut next = self.successor();
        next.state = CircuitState::HalfOpen;
        next.probe_status = ProbeStatus::InFlight;
        next.probe_started_at = Some(now);
        next
    }

    /// Failed or timed-out probe: one more backoff level and a fresh cooldown.
    pub(crate) fn reopen(
        &self,
        now: DateTime<Utc>,
        config: &CircuitBreakerConfig,
        jitter: Duration,
        failure: FailureRecord<'_>,
    ) -> Self {
        let mut next = self.successor();
        next.backoff_level =
            (self.backoff_level + 1).min(config.max_backoff_level);
        next.open_at(now, config, jitter, failure);
        next
    }

    fn open_at(
        &mut self,
        now: DateTime<Utc>,
        config: &CircuitBreakerConfig,
        jitter: Duration,
        failure: FailureRecord<'_>,
    ) {
        let cooldown = config.cooldown_for_level(self.backoff_level) + jitter;
        self.state = CircuitState::Open;
        self.opened_at = Some(now);
        self.cooldown_until = Some(now + cooldown);
        self.probe_status = ProbeStatus::None;
        self.probe_started_at = None;
        self.last_failure_at = Some(now);
        self.last_triggered_by = Some(failure.triggered_by.to_string());
        self.trigger_message = Some(failure.message.to_string());
    }

    pub(crate) fn after_rate_limit(
        &self,
        now: DateTime<Utc>,
        config: &CircuitBreakerConfig,
        jitter: Duration,
        failure: FailureRecord<'_>,
    ) -> Self {
        let window_cutoff = now - config.rolling_window();
        let (failures, window_start) = match self.window_start_at {
            Some(start) if start >= window_cutoff => {
                (self.consecutive_failures.saturating_add(1), start)
            }
            _ => (1, now),
        };

        let mut next = match self.state {
            CircuitState::HalfOpen => self.reopen(now, config, jitter, failure),
            CircuitState::Closed
                if failures >= config.rolling_window_error_threshold =>
            {
                let mut next = self.successor();
                next.open_at(now, config, jitter, failure);
                next
            }
            // Late failures while open are counted but never extend the cooldown.
            CircuitState::Closed | CircuitState::Open => {
                let mut next = self.successor();
                next.last_failure_at = Some(now);
                next.last_triggered_by = Some(failure.triggered_by.to_string());
                next.trigger_message = Some(failure.message.to_string());
                next
            }
        };
        next.consecutive_failures = failures;
        next.window_start_at = Some(window_start);
        next
    }

    /// `None` when the success changes nothing.
    pub(crate) fn after_success(
        &self,
        now: DateTime<Utc>,
        config: &CircuitBreakerConfig,
    ) -> Option<Self> {
        match self.state {
            CircuitState::HalfOpen => {
                let mut next = self.successor();
                next.state = CircuitState::Closed;
                next.opened_at = None;
                next.cooldown_until = None;
                next.consecutive_failures = 0;
                next.window_start_at = None;
                next.probe_status = ProbeStatus::None;
                next.probe_started_at = None;
                Some(next)
            }
            CircuitState::Closed if self.backoff_level > 0 => {
                let last_failure = self.last_failure_at?;
                if last_failure >= now - config.backoff_decay() {
                    return None;
                }
                let mut next = self.successor();
                next.backoff_level = self.backoff_level - 1;
                // Restart the quiet period so each step needs its own decay window.
                next.last_failure_at = Some(now);
                Some(next)
            }
            CircuitState::Closed | CircuitState::Open => None,
        }
    }

    pub(crate) fn after_reset(&self) -> Self {
        Self {
            version: self.version + 1,
            ..Self::default()
        }
    }
}

/// Read-only view for monitoring endpoints and the scheduler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CircuitBreakerStatus {
    pub enabled: bool,
    pub state: CircuitState,
    pub opened_at: Option<DateTime<Utc>>,
    pub cooldown_until: Option<DateTime<Utc>>,
    pub remaining_cooldown_ms: i64,
    pub last_triggered_by: Option<String>,
    pub trigger_message: Option<String>,
    pub last_failure_at: Option<DateTime<Utc>>,
    pub backoff_level: u32,
    pub consecutive_failures: u32,
    pub probe_status: ProbeStatus,
    pub version: i64,
}

impl CircuitBreakerStatus {
    pub fn from_state(
        state: &CircuitBreakerState,
        enabled: bool,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            enabled,
            state: state.state,
            opened_at: state.opened_at,
            cooldown_until: state.cooldown_until,
            remaining_cooldown_ms: state.remaining_cooldown(now).num_milliseconds(),
            last_triggered_by: state.last_triggered_by.clone(),
            trigger_message: state.trigger_message.clone(),
            last_failure_at: state.last_failure_at,
            backoff_level: state.backoff_level,
            consecutive_failures: state.consecutive_failures,
            probe_status: state.probe_status,
            version: state.version,
        }
    }

    /// Conservative status used when the shared record cannot be read.
    pub fn unavailable(enabled: bool) -> Self {
        Self {
            enabled,
            state: CircuitState::Open,
            opened_at: None,
            cooldown_until: None,
            remaining_cooldown_ms: 0,
            last_triggered_by: None,
            trigger_message: Some("circuit breaker state unavailable".into()),
            last_failure_at: None,
            backoff_level: 0,
            consecutive_failures: 0,
            probe_status: ProbeStatus::None,
            version: 0,
        }
    }

    pub fn is_open(&self) -> bool {
        self.enabled && self.state != CircuitState::Closed
    }

    /// Open and still inside its cooldown; no probe can be claimed yet.
    pub fn is_cooling_down(&self) -> bool {
        self.enabled && self.state == CircuitState::Open && self.remaining_cooldown_ms > 0
    }
}
