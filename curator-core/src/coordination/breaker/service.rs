use std::{fmt, sync::Arc};

use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use tracing::{debug, info, warn};

use super::{
    classifier::RateLimitClassifier,
    state::{
        AllowTransition, CircuitBreakerState, CircuitBreakerStatus, CircuitState,
        FailureRecord,
    },
};
use crate::{
    config::{CircuitBreakerConfig, StoreTimeouts},
    database::{bounded, ports::CircuitBreakerRepository},
    error::{CurationError, Result},
    gateway::GatewayFailure,
    time::Clock,
};

/// Outcome of [`CircuitBreakerService::try_allow`]: the decision plus the
/// state it was based on, so callers do not need a second read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AllowDecision {
    pub allowed: bool,
    pub status: CircuitBreakerStatus,
}

/// Persisted, cluster-shared circuit breaker in front of the metadata gateway.
///
/// Every mutation is a read / compute / version-guarded write cycle retried
/// up to `max_persistence_retries` times. When the shared record cannot be
/// read or written the breaker blocks.
pub struct CircuitBreakerService {
    store: Arc<dyn CircuitBreakerRepository>,
    config: CircuitBreakerConfig,
    timeouts: StoreTimeouts,
    clock: Arc<dyn Clock>,
    classifier: RateLimitClassifier,
}

impl fmt::Debug for CircuitBreakerService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CircuitBreakerService")
            .field("resource_id", &self.config.resource_id)
            .field("enabled", &self.config.enabled)
            .field("timeouts", &self.timeouts)
            .finish_non_exhaustive()
    }
}

impl CircuitBreakerService {
    pub fn new(
        store: Arc<dyn CircuitBreakerRepository>,
        config: CircuitBreakerConfig,
        timeouts: StoreTimeouts,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let classifier = RateLimitClassifier::new(&config.extra_rate_limit_patterns);
        Self {
            store,
            config,
            timeouts,
            clock,
            classifier,
        }
    }

    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    /// Whether a request may go out now. See [`Self::try_allow`].
    pub async fn allow_request(&self) -> bool {
        self.try_allow().await.allowed
    }

    /// Decide whether one outbound request may proceed.
    ///
    /// CLOSED allows. OPEN blocks until the cooldown passes, after which the
    /// first caller to win the version-guarded probe claim is let through and
    /// everyone else is blocked until the probe resolves or times out.
    pub async fn try_allow(&self) -> AllowDecision {
        if !self.config.enabled {
            return AllowDecision {
                allowed: true,
                status: CircuitBreakerStatus::from_state(
                    &CircuitBreakerState::default(),
                    false,
                    self.clock.now(),
                ),
            };
        }

        for attempt in 1..=self.config.max_persistence_retries {
            let current = match self.read().await {
                Ok(state) => state,
                Err(err) => {
                    warn!(error = %err, "circuit breaker state unreadable; blocking request");
                    return AllowDecision {
                        allowed: false,
                        status: CircuitBreakerStatus::unavailable(true),
                    };
                }
            };
            let now = self.clock.now();

            match current.evaluate_allow(now, &self.config, self.jitter()) {
                AllowTransition::Allow => return self.decision(true, &current, now),
                AllowTransition::Block => return self.decision(false, &current, now),
                AllowTransition::Write { next, allowed } => {
                    match self.write(current.version, &next).await {
                        Ok(true) => {
                            log_transition(&current, &next);
                            return self.decision(allowed, &next, now);
                        }
                        Ok(false) => {
                            debug!(attempt, "circuit breaker version conflict; re-reading");
                        }
                        Err(err) => {
                            warn!(error = %err, "circuit breaker write failed; blocking request");
                            return self.decision(false, &current, now);
                        }
                    }
                }
            }
        }

        warn!(
            retries = self.config.max_persistence_retries,
            "circuit breaker retries exhausted; blocking request"
        );
        AllowDecision {
            allowed: false,
            status: CircuitBreakerStatus::unavailable(true),
        }
    }

    /// Closes a HALF_OPEN breaker, or decays the backoff level of a CLOSED one
    /// that has been quiet long enough.
    pub async fn record_success(&self) {
        if !self.config.enabled {
            return;
        }
        let config = &self.config;
        if let Err(err) = self
            .mutate(|state, now| state.after_success(now, config))
            .await
        {
            warn!(error = %err, "failed to record success on circuit breaker");
        }
    }

    /// Feed a gateway failure to the breaker. Failures that are not rate
    /// limiting are ignored.
    pub async fn record_rate_limit_error(&self, failure: &GatewayFailure) {
        if !self.config.enabled || !self.is_rate_limit_error(failure) {
            return;
        }
        warn!(kind = %failure.kind, message = %failure.message, "rate-limit error detected");

        let config = &self.config;
        let record = FailureRecord {
            triggered_by: &failure.kind,
            message: &failure.message,
        };
        if let Err(err) = self
            .mutate(|state, now| {
                Some(state.after_rate_limit(now, config, self.jitter(), record))
            })
            .await
        {
            warn!(error = %err, "failed to record rate-limit error on circuit breaker");
        }
    }

    pub fn is_rate_limit_error(&self, failure: &GatewayFailure) -> bool {
        self.classifier.is_rate_limit(failure)
    }

    pub async fn status(&self) -> Result<CircuitBreakerStatus> {
        let state = self.read().await?;
        Ok(CircuitBreakerStatus::from_state(
            &state,
            self.config.enabled,
            self.clock.now(),
        ))
    }

    /// Force CLOSED with backoff level 0. Returns the persisted status.
    pub async fn reset(&self) -> Result<CircuitBreakerStatus> {
        let next = self
            .mutate(|state, _| Some(state.after_reset()))
            .await?
            .ok_or_else(|| {
                CurationError::Internal("reset produced no state".into())
            })?;
        info!(version = next.version, "circuit breaker reset to CLOSED");
        Ok(CircuitBreakerStatus::from_state(
            &next,
            self.config.enabled,
            self.clock.now(),
        ))
    }

    /// One optimistic read-compute-write cycle, retried on version conflicts.
    /// `Ok(None)` when `compute` decided nothing has to change.
    async fn mutate<F>(&self, compute: F) -> Result<Option<CircuitBreakerState>>
    where
        F: Fn(&CircuitBreakerState, DateTime<Utc>) -> Option<CircuitBreakerState>,
    {
        for attempt in 1..=self.config.max_persistence_retries {
            let current = self.read().await?;
            let Some(next) = compute(&current, self.clock.now()) else {
                return Ok(None);
            };

            if self.write(current.version, &next).await? {
                log_transition(&current, &next);
                return Ok(Some(next));
            }
            debug!(attempt, "circuit breaker version conflict; retrying");
        }

        Err(CurationError::Conflict(format!(
            "circuit breaker update lost {} consecutive version races",
            self.config.max_persistence_retries
        )))
    }

    async fn read(&self) -> Result<CircuitBreakerState> {
        let state = bounded(
            self.timeouts.read(),
            "circuit breaker read",
            self.store.load(&self.config.resource_id),
        )
        .await?;
        Ok(state.unwrap_or_default())
    }

    async fn write(&self, expected_version: i64, next: &CircuitBreakerState) -> Result<bool> {
        bounded(
            self.timeouts.write(),
            "circuit breaker write",
            self.store
                .compare_and_set(&self.config.resource_id, expected_version, next),
        )
        .await
    }

    fn jitter(&self) -> Duration {
        let max_ms = i64::from(self.config.cooldown_jitter_seconds) * 1_000;
        if max_ms == 0 {
            return Duration::zero();
        }
        Duration::milliseconds(rand::rng().random_range(0..=max_ms))
    }

    fn decision(
        &self,
        allowed: bool,
        state: &CircuitBreakerState,
        now: DateTime<Utc>,
    ) -> AllowDecision {
        AllowDecision {
            allowed,
            status: CircuitBreakerStatus::from_state(state, self.config.enabled, now),
        }
    }
}

fn log_transition(previous: &CircuitBreakerState, next: &CircuitBreakerState) {
    match (previous.state, next.state) {
        (CircuitState::Closed, CircuitState::Open) => warn!(
            backoff_level = next.backoff_level,
            cooldown_until = ?next.cooldown_until,
            triggered_by = ?next.last_triggered_by,
            failures = next.consecutive_failures,
            "circuit breaker opened"
        ),
        (CircuitState::HalfOpen, CircuitState::Open) => warn!(
            backoff_level_from = previous.backoff_level,
            backoff_level = next.backoff_level,
            cooldown_until = ?next.cooldown_until,
            triggered_by = ?next.last_triggered_by,
            "circuit breaker reopened"
        ),
        (_, CircuitState::HalfOpen) if previous.state != CircuitState::HalfOpen => {
            info!(
                probe_started_at = ?next.probe_started_at,
                "circuit breaker half-open; probe claimed"
            )
        }
        (from, CircuitState::Closed) if from != CircuitState::Closed => {
            info!(backoff_level = next.backoff_level, "circuit breaker closed")
        }
        _ if next.backoff_level < previous.backoff_level => info!(
            from = previous.backoff_level,
            to = next.backoff_level,
            "circuit breaker backoff level decayed"
        ),
        _ => debug!(
            state = %next.state,
            failures = next.consecutive_failures,
            version = next.version,
            "circuit breaker state updated"
        ),
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use futures::future::join_all;

    use super::*;
    use crate::{
        coordination::breaker::ProbeStatus, database::memory::InMemoryStore,
        time::ManualClock,
    };

    struct Harness {
        store: Arc<InMemoryStore>,
        clock: Arc<ManualClock>,
        breaker: CircuitBreakerService,
    }

    fn harness() -> Harness {
        let store = Arc::new(InMemoryStore::default());
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap(),
        ));
        let breaker = CircuitBreakerService::new(
            store.clone(),
            CircuitBreakerConfig {
                rolling_window_error_threshold: 5,
                rolling_window_minutes: 10,
                cooldown_base_minutes: 10,
                cooldown_multiplier: 2.0,
                cooldown_max_minutes: 60,
                cooldown_jitter_seconds: 0,
                max_backoff_level: 4,
                ..CircuitBreakerConfig::default()
            },
            StoreTimeouts::default(),
            clock.clone(),
        );
        Harness {
            store,
            clock,
            breaker,
        }
    }

    fn bot_check() -> GatewayFailure {
        GatewayFailure::new("SignInConfirmNotBot", "Sign in to confirm you're not a bot")
    }

    impl Harness {
        async fn trip(&self) {
            for _ in 0..5 {
                self.breaker.record_rate_limit_error(&bot_check()).await;
                self.clock.advance(Duration::seconds(30));
            }
        }

        /// Wait out the cooldown and claim the probe.
        async fn claim_probe(&self) {
            let status = self.breaker.status().await.unwrap();
            self.clock
                .advance(Duration::milliseconds(status.remaining_cooldown_ms));
            assert!(self.breaker.allow_request().await);
        }
    }

    #[tokio::test]
    async fn five_errors_inside_the_window_open_the_breaker() {
        let h = harness();
        let first_error_at = h.clock.now();
        h.trip().await;

        let status = h.breaker.status().await.unwrap();
        assert_eq!(status.state, CircuitState::Open);
        assert!(status.cooldown_until.is_some_and(|until| until > h.clock.now()));
        assert_eq!(status.last_triggered_by.as_deref(), Some("SignInConfirmNotBot"));
        assert!(!h.breaker.allow_request().await);

        h.clock.set(first_error_at + Duration::minutes(11));
        h.breaker.record_rate_limit_error(&bot_check()).await;
        assert_eq!(h.breaker.status().await.unwrap().consecutive_failures, 1);
    }

    #[tokio::test]
    async fn generic_failures_are_ignored() {
        let h = harness();
        for _ in 0..10 {
            h.breaker
                .record_rate_limit_error(&GatewayFailure::new("Network", "connection reset"))
                .await;
        }

        let status = h.breaker.status().await.unwrap();
        assert_eq!(status.state, CircuitState::Closed);
        assert_eq!(status.version, 0);
    }

    #[tokio::test]
    async fn exactly_one_concurrent_caller_claims_the_probe() {
        let h = harness();
        h.trip().await;
        h.clock.advance(Duration::minutes(11));

        let results = join_all((0..10).map(|_| h.breaker.allow_request())).await;

        assert_eq!(results.iter().filter(|allowed| **allowed).count(), 1);
        let status = h.breaker.status().await.unwrap();
        assert_eq!(status.state, CircuitState::HalfOpen);
        assert_eq!(status.probe_status, ProbeStatus::InFlight);
    }

    #[tokio::test]
    async fn successful_probe_closes_and_clears_failures() {
        let h = harness();
        h.trip().await;
        h.claim_probe().await;

        h.breaker.record_success().await;

        let status = h.breaker.status().await.unwrap();
        assert_eq!(status.state, CircuitState::Closed);
        assert_eq!(status.consecutive_failures, 0);
        assert_eq!(status.probe_status, ProbeStatus::None);
        assert!(h.breaker.allow_request().await);
    }

    #[tokio::test]
    async fn failed_probes_grow_the_cooldown_until_capped() {
        let h = harness();
        h.trip().await;

        let cooldown_minutes = |status: CircuitBreakerStatus| {
            (status.cooldown_until.unwrap() - status.opened_at.unwrap()).num_minutes()
        };
        let mut minutes = vec![cooldown_minutes(h.breaker.status().await.unwrap())];
        for _ in 0..4 {
            h.claim_probe().await;
            h.breaker.record_rate_limit_error(&bot_check()).await;
            minutes.push(cooldown_minutes(h.breaker.status().await.unwrap()));
        }

        assert_eq!(minutes, vec![10, 20, 40, 60, 60]);
        assert_eq!(h.breaker.status().await.unwrap().backoff_level, 4);
    }

    #[tokio::test]
    async fn probe_timeout_reopens_one_level_higher() {
        let h = harness();
        h.trip().await;
        h.claim_probe().await;

        h.clock.advance(Duration::seconds(31));
        assert!(!h.breaker.allow_request().await);

        let status = h.breaker.status().await.unwrap();
        assert_eq!(status.state, CircuitState::Open);
        assert_eq!(status.backoff_level, 1);
        assert_eq!(status.last_triggered_by.as_deref(), Some("ProbeTimeout"));
    }

    #[tokio::test]
    async fn unreadable_state_blocks_requests() {
        let h = harness();
        h.store.set_unavailable(true);

        let decision = h.breaker.try_allow().await;

        assert!(!decision.allowed);
        assert!(decision.status.is_open());
        assert!(h.breaker.status().await.is_err());
    }

    #[tokio::test]
    async fn disabled_breaker_always_allows_and_records_nothing() {
        let h = harness();
        let disabled = CircuitBreakerService::new(
            h.store.clone(),
            CircuitBreakerConfig {
                enabled: false,
                ..h.breaker.config().clone()
            },
            StoreTimeouts::default(),
            h.clock.clone(),
        );
        for _ in 0..10 {
            disabled.record_rate_limit_error(&bot_check()).await;
        }

        assert!(disabled.allow_request().await);
        assert_eq!(h.breaker.status().await.unwrap().version, 0);
    }

    #[tokio::test]
    async fn reset_forces_closed_at_level_zero() {
        let h = harness();
        h.trip().await;
        h.claim_probe().await;
        h.breaker.record_rate_limit_error(&bot_check()).await;

        let status = h.breaker.reset().await.unwrap();

        assert_eq!(status.state, CircuitState::Closed);
        assert_eq!(status.backoff_level, 0);
        assert!(h.breaker.allow_request().await);
    }
}
