use std::time::Duration;

use rand::Rng;
use tokio::{sync::Mutex, time::Instant};
use tracing::trace;

use crate::config::ThrottleConfig;

/// Per-process pacing of outbound gateway calls.
///
/// Callers serialize on an async mutex; each waits until at least
/// `delay + random(jitter)` has passed since the previous call left.
#[derive(Debug)]
pub struct Throttler {
    config: ThrottleConfig,
    last_call: Mutex<Option<Instant>>,
}

impl Throttler {
    pub fn new(config: ThrottleConfig) -> Self {
        Self {
            config,
            last_call: Mutex::new(None),
        }
    }

    pub fn disabled() -> Self {
        Self::new(ThrottleConfig {
            enabled: false,
            ..ThrottleConfig::default()
        })
    }

    pub async fn acquire(&self) {
        if !self.config.enabled {
            return;
        }

        let mut last_call = self.last_call.lock().await;
        if let Some(previous) = *last_call {
            let ready_at = previous + self.spacing();
            if ready_at > Instant::now() {
                trace!(
                    wait_ms = (ready_at - Instant::now()).as_millis() as u64,
                    "throttling outbound call"
                );
                tokio::time::sleep_until(ready_at).await;
            }
        }
        *last_call = Some(Instant::now());
    }

    fn spacing(&self) -> Duration {
        let jitter = if self.config.jitter_ms == 0 {
            0
        } else {
            rand::rng().random_range(0..self.config.jitter_ms)
        };
        Duration::from_millis(self.config.delay_between_items_ms + jitter)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    fn fixed(delay_ms: u64) -> Throttler {
        Throttler::new(ThrottleConfig {
            enabled: true,
            delay_between_items_ms: delay_ms,
            jitter_ms: 0,
        })
    }

    #[tokio::test(start_paused = true)]
    async fn first_call_is_immediate_and_second_waits_the_delay() {
        let throttler = fixed(3_000);
        let start = Instant::now();

        throttler.acquire().await;
        assert_eq!(start.elapsed(), Duration::ZERO);

        throttler.acquire().await;
        assert!(start.elapsed() >= Duration::from_millis(3_000));
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_callers_are_spaced_out() {
        let throttler = Arc::new(fixed(1_000));
        let start = Instant::now();

        let handles: Vec<_> = (0..3)
            .map(|_| {
                let throttler = Arc::clone(&throttler);
                tokio::spawn(async move { throttler.acquire().await })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap();
        }

        assert!(start.elapsed() >= Duration::from_millis(2_000));
    }

    #[tokio::test(start_paused = true)]
    async fn disabled_throttler_never_sleeps() {
        let throttler = Throttler::disabled();
        let start = Instant::now();
        for _ in 0..5 {
            throttler.acquire().await;
        }
        assert_eq!(start.elapsed(), Duration::ZERO);
    }
}
