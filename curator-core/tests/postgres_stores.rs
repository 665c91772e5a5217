//! Postgres adapter behaviour. Run with `--features e2e` and `DATABASE_URL`
//! pointing at a disposable database.
#![cfg(feature = "e2e")]

use chrono::{DateTime, Duration, TimeZone, Utc};
use curator_core::{
    coordination::{CircuitBreakerState, CircuitState},
    database::{
        PostgresDatabase,
        ports::{
            CatalogRepository, CircuitBreakerRepository, SchedulerLockRecord,
            SchedulerLockRepository, ValidationRunRepository, ValidationUpdate,
        },
    },
    gateway::ItemOutcome,
    types::{CatalogItem, ContentType, ValidationStatus},
    validation::{RunStatus, TriggerType, ValidationRun},
};
use sqlx::PgPool;
use uuid::Uuid;

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 6, 1, 4, 0, 0).unwrap()
}

fn lock(owner: &str, at: DateTime<Utc>) -> SchedulerLockRecord {
    SchedulerLockRecord {
        resource_id: "content_validation_scheduler".into(),
        locked_by: owner.into(),
        locked_at: at,
        expires_at: at + Duration::minutes(120),
        run_id: Uuid::now_v7(),
    }
}

#[sqlx::test(migrator = "curator_core::MIGRATOR")]
async fn lock_is_exclusive_until_it_expires(pool: PgPool) {
    let repo = PostgresDatabase::from_pool(pool).scheduler_lock_repository();
    let first = lock("node-a", t0());

    assert!(repo.acquire_if_free(&first, t0()).await.unwrap());
    let contender = lock("node-b", t0());
    assert!(
        !repo
            .acquire_if_free(&contender, t0() + Duration::minutes(5))
            .await
            .unwrap()
    );

    let later = t0() + Duration::minutes(121);
    let reclaim = lock("node-b", later);
    assert!(repo.acquire_if_free(&reclaim, later).await.unwrap());

    let held = repo.current(&reclaim.resource_id).await.unwrap().unwrap();
    assert_eq!(held, reclaim);

    assert!(!repo.release_if_owner(&reclaim.resource_id, "node-a", first.run_id).await.unwrap());
    assert!(repo.release_if_owner(&reclaim.resource_id, "node-b", reclaim.run_id).await.unwrap());
    assert!(repo.current(&reclaim.resource_id).await.unwrap().is_none());
}

#[sqlx::test(migrator = "curator_core::MIGRATOR")]
async fn breaker_writes_are_version_guarded(pool: PgPool) {
    let repo = PostgresDatabase::from_pool(pool).circuit_breaker_repository();
    let opened = CircuitBreakerState {
        state: CircuitState::Open,
        opened_at: Some(t0()),
        cooldown_until: Some(t0() + Duration::minutes(60)),
        consecutive_failures: 3,
        version: 1,
        ..CircuitBreakerState::default()
    };

    assert!(repo.compare_and_set("gateway", 0, &opened).await.unwrap());
    assert!(!repo.compare_and_set("gateway", 0, &opened).await.unwrap());

    let stale = CircuitBreakerState { version: 2, ..opened.clone() };
    assert!(!repo.compare_and_set("gateway", 5, &stale).await.unwrap());
    assert!(repo.compare_and_set("gateway", 1, &stale).await.unwrap());

    assert_eq!(repo.load("gateway").await.unwrap(), Some(stale));
}

#[sqlx::test(migrator = "curator_core::MIGRATOR")]
async fn catalog_selection_and_archival_listing(pool: PgPool) {
    let repo = PostgresDatabase::from_pool(pool).catalog_repository();
    let never = CatalogItem::new(ContentType::Video, "never");
    let stale = CatalogItem::new(ContentType::Video, "stale")
        .with_status(ValidationStatus::Error, Some(t0() - Duration::hours(25)));
    let fresh = CatalogItem::new(ContentType::Video, "fresh")
        .with_status(ValidationStatus::Valid, Some(t0() - Duration::hours(23)));
    let legacy = CatalogItem::new(ContentType::Video, "legacy")
        .with_status(ValidationStatus::Unavailable, Some(t0() - Duration::days(3)));
    for item in [&never, &stale, &fresh, &legacy] {
        repo.upsert(item).await.unwrap();
    }

    let due = repo
        .due_for_validation(ContentType::Video, t0() - Duration::hours(24), 10)
        .await
        .unwrap();
    let ids: Vec<&str> = due.iter().map(|item| item.external_id.as_str()).collect();
    assert_eq!(ids, vec!["never", "stale"]);

    let update = ValidationUpdate {
        status: ValidationStatus::Archived,
        validated_at: t0(),
        title: None,
    };
    assert!(repo.record_validation(ContentType::Video, stale.id, &update).await.unwrap());
    assert!(!repo.record_validation(ContentType::Channel, stale.id, &update).await.unwrap());

    let archived = repo.list_archived(ContentType::Video, 10).await.unwrap();
    let ids: Vec<&str> = archived.iter().map(|item| item.external_id.as_str()).collect();
    assert_eq!(ids, vec!["stale", "legacy"]);
    assert_eq!(repo.count_archived(ContentType::Video).await.unwrap(), 2);
}

#[sqlx::test(migrator = "curator_core::MIGRATOR")]
async fn run_progress_overwrites_the_same_row(pool: PgPool) {
    let repo = PostgresDatabase::from_pool(pool).validation_run_repository();
    let mut run = ValidationRun::start(TriggerType::Manual, Some("u-1".into()), None, t0());
    repo.save(&run).await.unwrap();

    run.begin_type(ContentType::Video, 1);
    run.record_outcome(ContentType::Video, "gone", &ItemOutcome::NotFound);
    run.complete(t0() + Duration::seconds(3));
    repo.save(&run).await.unwrap();

    let loaded = repo.get(run.id).await.unwrap().unwrap();
    assert_eq!(loaded.status, RunStatus::Completed);
    assert_eq!(loaded.counters.videos.archived, 1);
    assert_eq!(loaded.details, run.details);
    assert_eq!(repo.history(5).await.unwrap().len(), 1);
}
