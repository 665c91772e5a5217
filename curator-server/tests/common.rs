#![allow(dead_code)]

use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use axum_test::TestServer;
use chrono::{DateTime, TimeZone, Utc};
use curator_core::{
    database::{CurationStores, memory::InMemoryStore, ports::CatalogRepository},
    gateway::{GatewayFailure, LookupError, MetadataGateway},
    time::ManualClock,
    types::{CatalogItem, ContentType, ItemDetails},
};
use curator_server::{
    AppState,
    infra::config::{Config, SchedulerConfig},
    routes::create_app,
};

pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 6, 1, 4, 0, 0).unwrap()
}

#[derive(Debug, Clone, Copy)]
pub enum Answer {
    Present,
    Gone,
    RateLimited,
    Panic,
}

/// Metadata service double answering from a fixed script; unknown ids exist.
#[derive(Debug, Default)]
pub struct ScriptedGateway {
    answers: HashMap<String, Answer>,
}

impl ScriptedGateway {
    pub fn answer(mut self, external_id: &str, answer: Answer) -> Self {
        self.answers.insert(external_id.to_string(), answer);
        self
    }
}

#[async_trait]
impl MetadataGateway for ScriptedGateway {
    async fn lookup(
        &self,
        _content_type: ContentType,
        external_id: &str,
    ) -> Result<ItemDetails, LookupError> {
        match self.answers.get(external_id).copied().unwrap_or(Answer::Present) {
            Answer::Present => Ok(ItemDetails {
                title: Some(format!("title of {external_id}")),
            }),
            Answer::Gone => Err(LookupError::NotFound),
            Answer::RateLimited => Err(LookupError::Failed(GatewayFailure::new(
                "RateLimited",
                "HTTP 429 Too Many Requests",
            ))),
            Answer::Panic => panic!("metadata client exploded"),
        }
    }
}

pub struct TestApp {
    pub server: TestServer,
    pub state: AppState,
    pub stores: CurationStores,
    pub store: Arc<InMemoryStore>,
    pub clock: Arc<ManualClock>,
}

/// Config for tests: no throttling, no background scheduler, no jitter.
pub fn test_config() -> Config {
    let mut config = Config::default();
    config.curation.throttle.enabled = false;
    config.curation.circuit_breaker.cooldown_jitter_seconds = 0;
    config.scheduler = SchedulerConfig {
        enabled: false,
        ..SchedulerConfig::default()
    };
    config
}

pub fn build_test_app(gateway: ScriptedGateway) -> TestApp {
    build_test_app_with_config(gateway, test_config())
}

pub fn build_test_app_with_config(gateway: ScriptedGateway, config: Config) -> TestApp {
    let (stores, store) = CurationStores::in_memory();
    let clock = Arc::new(ManualClock::new(t0()));
    let state = AppState::assemble(
        Arc::new(config),
        stores.clone(),
        Arc::new(gateway),
        clock.clone(),
        "test-node-1".to_string(),
        None,
    );
    let server = TestServer::new(create_app(state.clone())).unwrap();

    TestApp {
        server,
        state,
        stores,
        store,
        clock,
    }
}

pub async fn seed(store: &InMemoryStore, items: &[CatalogItem]) {
    for item in items {
        store.upsert(item).await.unwrap();
    }
}
