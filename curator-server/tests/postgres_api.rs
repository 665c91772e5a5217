#![cfg(feature = "e2e")]

use std::sync::Arc;

use axum::http::StatusCode;
use axum_test::TestServer;
use curator_core::{
    database::{CurationStores, PostgresDatabase, ports::CatalogRepository},
    time::SystemClock,
    types::{CatalogItem, ContentType, ValidationStatus},
    validation::{RunStatus, ValidationRun},
};
use curator_server::{AppState, routes::{content_validation::BASE, create_app}};
use sqlx::PgPool;

mod common;
use common::{Answer, ScriptedGateway, test_config};

#[sqlx::test(migrator = "curator_core::MIGRATOR")]
async fn video_run_persists_through_postgres(pool: PgPool) {
    let db = PostgresDatabase::from_pool(pool);
    let stores = CurationStores::postgres(&db);
    let gone = CatalogItem::new(ContentType::Video, "gone");
    let present = CatalogItem::new(ContentType::Video, "present");
    stores.catalog.upsert(&gone).await.unwrap();
    stores.catalog.upsert(&present).await.unwrap();

    let state = AppState::assemble(
        Arc::new(test_config()),
        stores.clone(),
        Arc::new(ScriptedGateway::default().answer("gone", Answer::Gone)),
        Arc::new(SystemClock),
        "pg-node".to_string(),
        Some(Arc::new(db)),
    );
    let server = TestServer::new(create_app(state)).unwrap();

    let response = server.post(&format!("{BASE}/trigger/video")).await;
    response.assert_status_ok();
    let run = response.json::<ValidationRun>();
    assert_eq!(run.status, RunStatus::Completed);
    assert_eq!(run.counters.videos.archived, 1);

    let archived = stores.catalog.list_archived(ContentType::Video, 10).await.unwrap();
    assert_eq!(archived.len(), 1);
    assert_eq!(archived[0].id, gone.id);
    assert_eq!(archived[0].validation_status, ValidationStatus::Archived);

    let history = server.get(&format!("{BASE}/history")).await;
    history.assert_status_ok();
    assert_eq!(history.json::<Vec<ValidationRun>>()[0].id, run.id);

    server
        .get(&format!("{BASE}/lock"))
        .await
        .assert_status(StatusCode::OK);
    server.get("/health").await.assert_status_ok();
}
