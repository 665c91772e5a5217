use std::{collections::BTreeMap, fmt, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::{
    gateway::ItemOutcome,
    types::{ContentType, ParseEnumError},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TriggerType {
    Scheduled,
    Manual,
    Import,
    Export,
}

impl TriggerType {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Scheduled => "SCHEDULED",
            Self::Manual => "MANUAL",
            Self::Import => "IMPORT",
            Self::Export => "EXPORT",
        }
    }
}

impl FromStr for TriggerType {
    type Err = ParseEnumError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "SCHEDULED" => Ok(Self::Scheduled),
            "MANUAL" => Ok(Self::Manual),
            "IMPORT" => Ok(Self::Import),
            "EXPORT" => Ok(Self::Export),
            other => Err(ParseEnumError::new("trigger type", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunStatus {
    Running,
    Completed,
    Failed,
}

impl RunStatus {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Running => "RUNNING",
            Self::Completed => "COMPLETED",
            Self::Failed => "FAILED",
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RunStatus {
    type Err = ParseEnumError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "RUNNING" => Ok(Self::Running),
            "COMPLETED" => Ok(Self::Completed),
            "FAILED" => Ok(Self::Failed),
            other => Err(ParseEnumError::new("run status", other)),
        }
    }
}

/// Coarse progress marker for pollers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunPhase {
    Starting,
    Initializing,
    Channels,
    Playlists,
    Videos,
    Complete,
}

impl RunPhase {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Starting => "STARTING",
            Self::Initializing => "INITIALIZING",
            Self::Channels => "CHANNELS",
            Self::Playlists => "PLAYLISTS",
            Self::Videos => "VIDEOS",
            Self::Complete => "COMPLETE",
        }
    }

    pub const fn for_type(content_type: ContentType) -> Self {
        match content_type {
            ContentType::Channel => Self::Channels,
            ContentType::Playlist => Self::Playlists,
            ContentType::Video => Self::Videos,
        }
    }
}

impl FromStr for RunPhase {
    type Err = ParseEnumError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "STARTING" => Ok(Self::Starting),
            "INITIALIZING" => Ok(Self::Initializing),
            "CHANNELS" => Ok(Self::Channels),
            "PLAYLISTS" => Ok(Self::Playlists),
            "VIDEOS" => Ok(Self::Videos),
            "COMPLETE" => Ok(Self::Complete),
            other => Err(ParseEnumError::new("run phase", other)),
        }
    }
}

/// Progress for one content type.
///
/// `checked` counts items whose outcome was written back; `skipped` counts
/// items whose catalog write failed and were left for the next pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypeCounters {
    pub total_to_check: u32,
    pub checked: u32,
    pub archived: u32,
    pub skipped: u32,
    pub error: u32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunCounters {
    pub channels: TypeCounters,
    pub playlists: TypeCounters,
    pub videos: TypeCounters,
}

impl RunCounters {
    pub fn for_type(&self, content_type: ContentType) -> &TypeCounters {
        match content_type {
            ContentType::Channel => &self.channels,
            ContentType::Playlist => &self.playlists,
            ContentType::Video => &self.videos,
        }
    }

    fn for_type_mut(&mut self, content_type: ContentType) -> &mut TypeCounters {
        match content_type {
            ContentType::Channel => &mut self.channels,
            ContentType::Playlist => &mut self.playlists,
            ContentType::Video => &mut self.videos,
        }
    }

    pub fn total_checked(&self) -> u32 {
        self.channels.checked + self.playlists.checked + self.videos.checked
    }

    pub fn total_archived(&self) -> u32 {
        self.channels.archived + self.playlists.archived + self.videos.archived
    }
}

/// One validation run, persisted after every batch so pollers see live
/// progress.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationRun {
    pub id: Uuid,
    pub trigger_type: TriggerType,
    /// Actor identifier, absent for scheduled runs.
    pub triggered_by: Option<String>,
    pub triggered_by_display_name: Option<String>,
    pub status: RunStatus,
    pub current_phase: RunPhase,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub duration_ms: Option<i64>,
    pub counters: RunCounters,
    /// Free-form details: `archivedVideoIds`, `errorChannelIds`,
    /// `playlistMessage`, `errorMessage`, ...
    pub details: BTreeMap<String, Value>,
    pub error_message: Option<String>,
}

impl ValidationRun {
    pub fn start(
        trigger_type: TriggerType,
        triggered_by: Option<String>,
        triggered_by_display_name: Option<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::now_v7(),
            trigger_type,
            triggered_by,
            triggered_by_display_name,
            status: RunStatus::Running,
            current_phase: RunPhase::Starting,
            started_at: now,
            completed_at: None,
            duration_ms: None,
            counters: RunCounters::default(),
            details: BTreeMap::new(),
            error_message: None,
        }
    }

    pub fn is_finished(&self) -> bool {
        self.status != RunStatus::Running
    }

    pub fn enter_phase(&mut self, phase: RunPhase) {
        self.current_phase = phase;
    }

    /// Start the pass for one type with `total` selected items.
    pub fn begin_type(&mut self, content_type: ContentType, total: usize) {
        self.current_phase = RunPhase::for_type(content_type);
        self.counters.for_type_mut(content_type).total_to_check =
            u32::try_from(total).unwrap_or(u32::MAX);
        if total == 0 {
            self.details.insert(
                format!("{}Message", content_type.as_str()),
                Value::from(format!("No {} need validation", content_type.plural())),
            );
        }
    }

    pub fn record_outcome(
        &mut self,
        content_type: ContentType,
        external_id: &str,
        outcome: &ItemOutcome,
    ) {
        let counters = self.counters.for_type_mut(content_type);
        counters.checked += 1;
        match outcome {
            ItemOutcome::Valid(_) => {}
            ItemOutcome::NotFound => {
                counters.archived += 1;
                self.push_detail("archived", content_type, external_id);
            }
            ItemOutcome::Error(_) => {
                counters.error += 1;
                self.push_detail("error", content_type, external_id);
            }
        }
    }

    pub fn record_skipped(&mut self, content_type: ContentType) {
        self.counters.for_type_mut(content_type).skipped += 1;
    }

    fn push_detail(&mut self, prefix: &str, content_type: ContentType, external_id: &str) {
        let key = format!("{prefix}{}Ids", content_type.detail_stem());
        let entry = self
            .details
            .entry(key)
            .or_insert_with(|| Value::Array(Vec::new()));
        if let Value::Array(ids) = entry {
            ids.push(Value::from(external_id));
        }
    }

    pub fn complete(&mut self, now: DateTime<Utc>) {
        self.finish(RunStatus::Completed, now);
    }

    pub fn fail(&mut self, message: impl Into<String>, now: DateTime<Utc>) {
        let message = message.into();
        self.details
            .insert("errorMessage".into(), Value::from(message.clone()));
        self.error_message = Some(message);
        self.finish(RunStatus::Failed, now);
    }

    fn finish(&mut self, status: RunStatus, now: DateTime<Utc>) {
        self.status = status;
        self.current_phase = RunPhase::Complete;
        self.completed_at = Some(now);
        self.duration_ms = Some((now - self.started_at).num_milliseconds().max(0));
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone};

    use super::*;
    use crate::gateway::GatewayFailure;

    #[test]
    fn outcomes_update_counters_and_id_lists() {
        let now = Utc.with_ymd_and_hms(2025, 6, 1, 2, 0, 0).unwrap();
        let mut run = ValidationRun::start(TriggerType::Manual, None, None, now);
        run.begin_type(ContentType::Video, 3);

        run.record_outcome(ContentType::Video, "v1", &ItemOutcome::NotFound);
        run.record_outcome(
            ContentType::Video,
            "v2",
            &ItemOutcome::Error(GatewayFailure::breaker_open()),
        );
        run.record_skipped(ContentType::Video);

        let videos = run.counters.videos;
        assert_eq!((videos.total_to_check, videos.checked), (3, 2));
        assert_eq!((videos.archived, videos.error, videos.skipped), (1, 1, 1));
        assert_eq!(run.details["archivedVideoIds"], serde_json::json!(["v1"]));
        assert_eq!(run.details["errorVideoIds"], serde_json::json!(["v2"]));
        assert_eq!(run.current_phase, RunPhase::Videos);

        run.complete(now + Duration::seconds(42));
        assert_eq!(run.status, RunStatus::Completed);
        assert_eq!(run.duration_ms, Some(42_000));
    }

    #[test]
    fn empty_selection_leaves_a_message() {
        let now = Utc.with_ymd_and_hms(2025, 6, 1, 2, 0, 0).unwrap();
        let mut run = ValidationRun::start(TriggerType::Scheduled, None, None, now);
        run.begin_type(ContentType::Playlist, 0);

        assert_eq!(
            run.details["playlistMessage"],
            Value::from("No playlists need validation")
        );
    }
}
