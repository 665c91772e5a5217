use std::{fmt, sync::Arc, time::Duration};

use async_trait::async_trait;
use tracing::{debug, warn};

use super::{
    BatchValidation, ContentValidator, GatewayFailure, ItemOutcome, LookupError,
    MetadataGateway,
};
use crate::{
    coordination::{breaker::CircuitBreakerService, throttle::Throttler},
    types::ContentType,
};

/// Production [`ContentValidator`]: every lookup is gated by the circuit
/// breaker, paced by the throttler and bounded by a per-call timeout.
///
/// Once the breaker blocks inside a batch, the remaining ids of that batch
/// are reported as breaker rejections without another breaker round-trip.
pub struct GuardedGateway<G: MetadataGateway + ?Sized> {
    gateway: Arc<G>,
    breaker: Arc<CircuitBreakerService>,
    throttler: Arc<Throttler>,
    call_timeout: Duration,
}

impl<G: MetadataGateway + ?Sized> fmt::Debug for GuardedGateway<G> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GuardedGateway")
            .field("gateway_type", &std::any::type_name_of_val(self.gateway.as_ref()))
            .field("breaker", &self.breaker)
            .field("call_timeout", &self.call_timeout)
            .finish()
    }
}

impl<G: MetadataGateway + ?Sized> GuardedGateway<G> {
    pub fn new(
        gateway: Arc<G>,
        breaker: Arc<CircuitBreakerService>,
        throttler: Arc<Throttler>,
        call_timeout: Duration,
    ) -> Self {
        Self {
            gateway,
            breaker,
            throttler,
            call_timeout,
        }
    }

    async fn check_one(&self, content_type: ContentType, external_id: &str) -> ItemOutcome {
        self.throttler.acquire().await;

        let lookup = self.gateway.lookup(content_type, external_id);
        let result = match tokio::time::timeout(self.call_timeout, lookup).await {
            Ok(result) => result,
            Err(_) => Err(LookupError::Failed(GatewayFailure::timeout(
                self.call_timeout,
            ))),
        };

        match &result {
            Ok(_) | Err(LookupError::NotFound) => self.breaker.record_success().await,
            Err(LookupError::Failed(failure)) => {
                if self.breaker.is_rate_limit_error(failure) {
                    self.breaker.record_rate_limit_error(failure).await;
                } else {
                    debug!(
                        content_type = %content_type,
                        external_id,
                        error = %failure,
                        "lookup failed with a non rate-limit error"
                    );
                }
            }
        }

        ItemOutcome::from(result)
    }
}

#[async_trait]
impl<G: MetadataGateway + ?Sized> ContentValidator for GuardedGateway<G> {
    async fn validate_batch(
        &self,
        content_type: ContentType,
        external_ids: &[String],
    ) -> BatchValidation {
        let mut batch = BatchValidation::default();
        let mut blocked = false;

        for external_id in external_ids {
            if !blocked && !self.breaker.allow_request().await {
                warn!(
                    content_type = %content_type,
                    remaining = external_ids.len() - batch.checks.len(),
                    "circuit breaker blocked lookups; deferring the rest of the batch"
                );
                blocked = true;
            }

            let outcome = if blocked {
                ItemOutcome::Error(GatewayFailure::breaker_open())
            } else {
                self.check_one(content_type, external_id).await
            };
            batch.push(external_id.clone(), outcome);
        }

        batch
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::*;
    use crate::{
        config::{CircuitBreakerConfig, StoreTimeouts},
        coordination::breaker::CircuitState,
        database::memory::InMemoryCircuitBreakerRepository,
        gateway::MockMetadataGateway,
        time::ManualClock,
        types::ItemDetails,
    };

    fn breaker(threshold: u32) -> Arc<CircuitBreakerService> {
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap(),
        ));
        Arc::new(CircuitBreakerService::new(
            Arc::new(InMemoryCircuitBreakerRepository::default()),
            CircuitBreakerConfig {
                rolling_window_error_threshold: threshold,
                cooldown_jitter_seconds: 0,
                ..CircuitBreakerConfig::default()
            },
            StoreTimeouts::default(),
            clock,
        ))
    }

    fn ids(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| (*v).to_string()).collect()
    }

    #[tokio::test]
    async fn classifies_each_lookup_result() {
        let mut gateway = MockMetadataGateway::new();
        gateway.expect_lookup().returning(|_, id| match id {
            "ok" => Ok(ItemDetails {
                title: Some("Still here".into()),
            }),
            "gone" => Err(LookupError::NotFound),
            _ => Err(LookupError::Failed(GatewayFailure::new("Network", "reset"))),
        });

        let guarded = GuardedGateway::new(
            Arc::new(gateway),
            breaker(3),
            Arc::new(Throttler::disabled()),
            Duration::from_secs(5),
        );
        let batch = guarded
            .validate_batch(ContentType::Video, &ids(&["ok", "gone", "flaky"]))
            .await;

        assert!(matches!(batch.outcome_for("ok"), Some(ItemOutcome::Valid(_))));
        assert_eq!(batch.outcome_for("gone"), Some(&ItemOutcome::NotFound));
        assert!(matches!(batch.outcome_for("flaky"), Some(ItemOutcome::Error(_))));
    }

    #[tokio::test]
    async fn tripping_mid_batch_defers_the_remaining_items() {
        let mut gateway = MockMetadataGateway::new();
        gateway.expect_lookup().times(2).returning(|_, _| {
            Err(LookupError::Failed(GatewayFailure::new(
                "SignInConfirmNotBot",
                "Sign in to confirm you're not a bot",
            )))
        });

        let breaker = breaker(2);
        let guarded = GuardedGateway::new(
            Arc::new(gateway),
            Arc::clone(&breaker),
            Arc::new(Throttler::disabled()),
            Duration::from_secs(5),
        );
        let batch = guarded
            .validate_batch(ContentType::Channel, &ids(&["a", "b", "c", "d"]))
            .await;

        assert_eq!(breaker.status().await.unwrap().state, CircuitState::Open);
        for id in ["c", "d"] {
            let Some(ItemOutcome::Error(failure)) = batch.outcome_for(id) else {
                panic!("{id} should have been deferred");
            };
            assert!(failure.is_breaker_rejection());
        }
    }

    #[tokio::test]
    async fn generic_failures_leave_the_breaker_closed() {
        let mut gateway = MockMetadataGateway::new();
        gateway.expect_lookup().returning(|_, _| {
            Err(LookupError::Failed(GatewayFailure::new(
                "Http503",
                "unavailable",
            )))
        });

        let breaker = breaker(1);
        let guarded = GuardedGateway::new(
            Arc::new(gateway),
            Arc::clone(&breaker),
            Arc::new(Throttler::disabled()),
            Duration::from_secs(5),
        );
        guarded
            .validate_batch(ContentType::Playlist, &ids(&["x", "y"]))
            .await;

        let status = breaker.status().await.unwrap();
        assert_eq!(status.state, CircuitState::Closed);
        assert_eq!(status.consecutive_failures, 0);
    }
}
