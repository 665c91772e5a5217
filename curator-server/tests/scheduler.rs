use chrono::Duration;
use curator_core::{
    config::{SchedulerLockConfig, StoreTimeouts},
    coordination::SchedulerLockService,
    gateway::GatewayFailure,
    types::{CatalogItem, ContentType},
    validation::{RunStatus, TriggerType},
};
use curator_server::infra::{
    config::{ScheduledScope, SchedulerConfig},
    scheduler::TickOutcome,
};
use uuid::Uuid;

mod common;
use common::{Answer, ScriptedGateway, build_test_app_with_config, seed, test_config};

fn scheduled_app() -> common::TestApp {
    let mut config = test_config();
    config.scheduler = SchedulerConfig {
        enabled: true,
        scope: ScheduledScope::Video,
        max_items: Some(5),
        ..SchedulerConfig::default()
    };
    build_test_app_with_config(ScriptedGateway::default(), config)
}

#[tokio::test]
async fn disabled_scheduler_does_nothing() {
    let app = build_test_app_with_config(ScriptedGateway::default(), test_config());

    assert!(matches!(app.state.scheduler().tick().await, TickOutcome::Disabled));
    assert!(app.state.validation().latest_run().await.unwrap().is_none());
}

#[tokio::test]
async fn tick_runs_a_scheduled_validation() {
    let app = scheduled_app();
    seed(
        &app.store,
        &[
            CatalogItem::new(ContentType::Video, "v-1"),
            CatalogItem::new(ContentType::Channel, "c-1"),
        ],
    )
    .await;

    let TickOutcome::Ran(run) = app.state.scheduler().tick().await else {
        panic!("expected a scheduled run");
    };

    assert_eq!(run.trigger_type, TriggerType::Scheduled);
    assert_eq!(run.status, RunStatus::Completed);
    assert_eq!(run.counters.videos.checked, 1);
    assert_eq!(run.counters.channels.checked, 0);
}

#[tokio::test]
async fn open_breaker_skips_until_the_cooldown_elapses() {
    let app = scheduled_app();
    let failure = GatewayFailure::new("RateLimited", "HTTP 429 Too Many Requests");
    let threshold = app
        .state
        .config()
        .curation
        .circuit_breaker
        .rolling_window_error_threshold;
    for _ in 0..threshold {
        app.state.breaker().record_rate_limit_error(&failure).await;
    }
    assert!(app.state.breaker().status().await.unwrap().is_cooling_down());

    assert!(matches!(app.state.scheduler().tick().await, TickOutcome::BreakerOpen));

    let base = app.state.config().curation.circuit_breaker.cooldown_base_minutes;
    app.clock.advance(Duration::minutes(i64::from(base) + 1));
    assert!(matches!(app.state.scheduler().tick().await, TickOutcome::Ran(_)));
}

#[tokio::test]
async fn lock_held_elsewhere_skips_the_tick() {
    let app = scheduled_app();
    let other = SchedulerLockService::new(
        app.stores.locks.clone(),
        SchedulerLockConfig::default(),
        StoreTimeouts::default(),
        app.clock.clone(),
        "other-node",
    );
    assert!(other.try_acquire(Uuid::now_v7()).await);

    assert!(matches!(app.state.scheduler().tick().await, TickOutcome::LockHeld));
}

#[tokio::test]
async fn panicking_scheduled_run_fails_and_the_next_tick_proceeds() {
    let mut config = test_config();
    config.scheduler = SchedulerConfig {
        enabled: true,
        scope: ScheduledScope::Video,
        ..SchedulerConfig::default()
    };
    let app = build_test_app_with_config(
        ScriptedGateway::default().answer("boom", Answer::Panic),
        config,
    );
    seed(&app.store, &[CatalogItem::new(ContentType::Video, "boom")]).await;

    let TickOutcome::Ran(run) = app.state.scheduler().tick().await else {
        panic!("expected the tick to finalize the run");
    };
    assert_eq!(run.status, RunStatus::Failed);
    assert!(app.state.validation().lock().status().await.unwrap().is_none());

    // The item was never written, so it is still due and panics again.
    let TickOutcome::Ran(second) = app.state.scheduler().tick().await else {
        panic!("expected the lock to be free for the next tick");
    };
    assert_ne!(second.id, run.id);
    assert_eq!(second.status, RunStatus::Failed);
}
