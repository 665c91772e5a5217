#![allow(dead_code)]

use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use curator_core::{
    config::{CurationConfig, SchedulerLockConfig, StoreTimeouts, ValidationConfig},
    coordination::SchedulerLockService,
    database::{CurationStores, memory::InMemoryStore, ports::ValidationRunRepository},
    gateway::{BatchValidation, ContentValidator, GatewayFailure, ItemOutcome},
    time::ManualClock,
    types::{ContentType, ItemDetails},
    validation::{ValidationRun, ValidationService},
};
use tokio::sync::Mutex;

pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 6, 1, 4, 0, 0).unwrap()
}

/// Answers from a fixed script; unknown ids are valid.
#[derive(Debug, Default)]
pub struct ScriptedValidator {
    script: HashMap<String, ItemOutcome>,
    seen: Mutex<Vec<String>>,
}

impl ScriptedValidator {
    pub fn with(mut self, external_id: &str, outcome: ItemOutcome) -> Self {
        self.script.insert(external_id.to_string(), outcome);
        self
    }

    pub async fn seen(&self) -> Vec<String> {
        self.seen.lock().await.clone()
    }
}

#[async_trait]
impl ContentValidator for ScriptedValidator {
    async fn validate_batch(
        &self,
        _content_type: ContentType,
        external_ids: &[String],
    ) -> BatchValidation {
        self.seen.lock().await.extend(external_ids.iter().cloned());
        let mut batch = BatchValidation::default();
        for id in external_ids {
            let outcome = self
                .script
                .get(id)
                .cloned()
                .unwrap_or(ItemOutcome::Valid(ItemDetails::default()));
            batch.push(id.clone(), outcome);
        }
        batch
    }
}

fn all_valid(external_ids: &[String]) -> BatchValidation {
    let mut batch = BatchValidation::default();
    for id in external_ids {
        batch.push(id.clone(), ItemOutcome::Valid(ItemDetails::default()));
    }
    batch
}

/// Snapshots the most recently persisted run whenever a batch arrives.
pub struct ProgressRecorder {
    runs: Arc<dyn ValidationRunRepository>,
    snapshots: Mutex<Vec<ValidationRun>>,
}

impl ProgressRecorder {
    pub fn new(runs: Arc<dyn ValidationRunRepository>) -> Self {
        Self {
            runs,
            snapshots: Mutex::new(Vec::new()),
        }
    }

    pub async fn snapshots(&self) -> Vec<ValidationRun> {
        self.snapshots.lock().await.clone()
    }
}

#[async_trait]
impl ContentValidator for ProgressRecorder {
    async fn validate_batch(
        &self,
        _content_type: ContentType,
        external_ids: &[String],
    ) -> BatchValidation {
        if let Some(run) = self.runs.latest().await.unwrap() {
            self.snapshots.lock().await.push(run);
        }
        all_valid(external_ids)
    }
}

/// Panics on the first batch.
#[derive(Debug, Default)]
pub struct PanickingValidator;

#[async_trait]
impl ContentValidator for PanickingValidator {
    async fn validate_batch(
        &self,
        _content_type: ContentType,
        _external_ids: &[String],
    ) -> BatchValidation {
        panic!("metadata client exploded");
    }
}

pub fn rate_limited() -> ItemOutcome {
    ItemOutcome::Error(GatewayFailure::new(
        "SignInConfirmNotBot",
        "Sign in to confirm you're not a bot",
    ))
}

pub struct Harness {
    pub store: Arc<InMemoryStore>,
    pub stores: CurationStores,
    pub clock: Arc<ManualClock>,
    pub validator: Arc<ScriptedValidator>,
    pub service: ValidationService,
}

impl Harness {
    pub fn new(validator: ScriptedValidator) -> Self {
        Self::with_config(validator, CurationConfig::default().validation)
    }

    pub fn with_config(validator: ScriptedValidator, config: ValidationConfig) -> Self {
        let (stores, store) = CurationStores::in_memory();
        let clock = Arc::new(ManualClock::new(t0()));
        let validator = Arc::new(validator);
        let service = Self::service_on(&stores, &clock, validator.clone(), config, "node-a");
        Self {
            store,
            stores,
            clock,
            validator,
            service,
        }
    }

    /// A second instance sharing this harness' store and clock.
    pub fn peer(&self, instance: &str) -> ValidationService {
        Self::service_on(
            &self.stores,
            &self.clock,
            self.validator.clone(),
            CurationConfig::default().validation,
            instance,
        )
    }

    /// A service on this harness' store and clock with its own validator.
    pub fn service_with(
        &self,
        validator: Arc<dyn ContentValidator>,
        config: ValidationConfig,
    ) -> ValidationService {
        Self::service_on(&self.stores, &self.clock, validator, config, "node-a")
    }

    fn service_on(
        stores: &CurationStores,
        clock: &Arc<ManualClock>,
        validator: Arc<dyn ContentValidator>,
        config: ValidationConfig,
        instance: &str,
    ) -> ValidationService {
        let lock = SchedulerLockService::new(
            stores.locks.clone(),
            SchedulerLockConfig::default(),
            StoreTimeouts::default(),
            clock.clone(),
            instance,
        );
        ValidationService::new(
            Arc::new(lock),
            validator,
            stores.catalog.clone(),
            stores.runs.clone(),
            stores.audit.clone(),
            config,
            StoreTimeouts::default(),
            clock.clone(),
        )
    }
}
