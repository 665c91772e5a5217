use std::{fmt, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The three curated entity kinds. They share one validation shape.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum ContentType {
    Channel,
    Playlist,
    Video,
}

impl ContentType {
    /// Processing order used by all-types runs.
    pub const ALL: [ContentType; 3] =
        [ContentType::Channel, ContentType::Playlist, ContentType::Video];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Channel => "channel",
            Self::Playlist => "playlist",
            Self::Video => "video",
        }
    }

    pub const fn plural(self) -> &'static str {
        match self {
            Self::Channel => "channels",
            Self::Playlist => "playlists",
            Self::Video => "videos",
        }
    }

    /// Capitalised name used to build run detail keys (`archivedVideoIds`).
    pub(crate) const fn detail_stem(self) -> &'static str {
        match self {
            Self::Channel => "Channel",
            Self::Playlist => "Playlist",
            Self::Video => "Video",
        }
    }
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a string does not name a known enum variant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseEnumError {
    kind: &'static str,
    invalid_value: String,
}

impl ParseEnumError {
    pub fn new(kind: &'static str, value: &str) -> Self {
        Self {
            kind,
            invalid_value: value.to_string(),
        }
    }
}

impl fmt::Display for ParseEnumError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid {}: {}", self.kind, self.invalid_value)
    }
}

impl std::error::Error for ParseEnumError {}

impl FromStr for ContentType {
    type Err = ParseEnumError;

    /// Accepts singular or plural, any case (`video`, `VIDEOS`).
    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "channel" | "channels" => Ok(Self::Channel),
            "playlist" | "playlists" => Ok(Self::Playlist),
            "video" | "videos" => Ok(Self::Video),
            _ => Err(ParseEnumError::new("content type", value)),
        }
    }
}

/// Validation state of a catalog item as seen by the validation core.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ValidationStatus {
    NeverValidated,
    Valid,
    Archived,
    Error,
    /// Legacy archived marker; treated like `Archived` everywhere.
    Unavailable,
}

impl ValidationStatus {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::NeverValidated => "NEVER_VALIDATED",
            Self::Valid => "VALID",
            Self::Archived => "ARCHIVED",
            Self::Error => "ERROR",
            Self::Unavailable => "UNAVAILABLE",
        }
    }

    /// Archived items are never selected for re-validation and show up in
    /// the archived listing.
    pub const fn is_archived(self) -> bool {
        matches!(self, Self::Archived | Self::Unavailable)
    }
}

impl fmt::Display for ValidationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ValidationStatus {
    type Err = ParseEnumError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "NEVER_VALIDATED" => Ok(Self::NeverValidated),
            "VALID" => Ok(Self::Valid),
            "ARCHIVED" => Ok(Self::Archived),
            "ERROR" => Ok(Self::Error),
            "UNAVAILABLE" => Ok(Self::Unavailable),
            other => Err(ParseEnumError::new("validation status", other)),
        }
    }
}

/// A curated channel, playlist or video.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogItem {
    pub id: Uuid,
    pub content_type: ContentType,
    /// Identifier on the external platform.
    pub external_id: String,
    pub title: Option<String>,
    pub validation_status: ValidationStatus,
    pub last_validated_at: Option<DateTime<Utc>>,
}

impl CatalogItem {
    pub fn new(content_type: ContentType, external_id: impl Into<String>) -> Self {
        Self {
            id: Uuid::now_v7(),
            content_type,
            external_id: external_id.into(),
            title: None,
            validation_status: ValidationStatus::NeverValidated,
            last_validated_at: None,
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_status(
        mut self,
        status: ValidationStatus,
        last_validated_at: Option<DateTime<Utc>>,
    ) -> Self {
        self.validation_status = status;
        self.last_validated_at = last_validated_at;
        self
    }

    /// Eligible for a pass whose staleness cutoff is `stale_before`.
    pub fn is_due(&self, stale_before: DateTime<Utc>) -> bool {
        if self.validation_status.is_archived() {
            return false;
        }
        match self.last_validated_at {
            None => true,
            Some(at) => at < stale_before,
        }
    }
}

/// Metadata returned by the gateway for an item confirmed to exist.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemDetails {
    pub title: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_type_parses_plural_and_uppercase() {
        assert_eq!("VIDEOS".parse::<ContentType>(), Ok(ContentType::Video));
        assert_eq!("channel".parse::<ContentType>(), Ok(ContentType::Channel));
        assert!("podcast".parse::<ContentType>().is_err());
    }

    #[test]
    fn archived_and_unavailable_items_are_never_due() {
        let cutoff = Utc::now();
        let archived = CatalogItem::new(ContentType::Video, "a")
            .with_status(ValidationStatus::Archived, None);
        let unavailable = CatalogItem::new(ContentType::Video, "b")
            .with_status(ValidationStatus::Unavailable, None);
        let errored = CatalogItem::new(ContentType::Video, "c")
            .with_status(ValidationStatus::Error, None);

        assert!(!archived.is_due(cutoff));
        assert!(!unavailable.is_due(cutoff));
        assert!(errored.is_due(cutoff));
    }
}
