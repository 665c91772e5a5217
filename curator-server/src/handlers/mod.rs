//! HTTP request handlers organized by functionality

pub mod admin;
pub mod health;

use axum::http::HeaderMap;

/// Header carrying the authenticated actor's id, set by the fronting gateway.
pub const ACTOR_ID_HEADER: &str = "x-actor-id";
/// Header carrying the actor's display name.
pub const ACTOR_NAME_HEADER: &str = "x-actor-name";

/// Caller identity as forwarded by the authenticating proxy in front of the
/// service. Both parts are optional.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Actor {
    pub id: Option<String>,
    pub name: Option<String>,
}

impl Actor {
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let read = |name: &str| {
            headers
                .get(name)
                .and_then(|value| value.to_str().ok())
                .map(str::trim)
                .filter(|value| !value.is_empty())
                .map(str::to_string)
        };
        Self {
            id: read(ACTOR_ID_HEADER),
            name: read(ACTOR_NAME_HEADER),
        }
    }

    /// Name recorded on audit events for manual actions.
    pub fn audit_name(&self) -> String {
        self.name
            .clone()
            .or_else(|| self.id.clone())
            .unwrap_or_else(|| "anonymous".to_string())
    }
}
