use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::{GatewayFailure, LookupError, MetadataGateway};
use crate::{
    error::{CurationError, Result},
    types::{ContentType, ItemDetails},
};

/// Longest upstream body excerpt kept in a failure message.
const BODY_EXCERPT_LIMIT: usize = 512;

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct HttpGatewayConfig {
    /// Base URL of the metadata service, e.g. `http://metadata:8080/api`.
    pub base_url: String,
    pub request_timeout_secs: u64,
    /// Sent as a bearer token when set.
    pub api_key: Option<String>,
}

impl Default for HttpGatewayConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8081".into(),
            request_timeout_secs: 10,
            api_key: None,
        }
    }
}

impl HttpGatewayConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// [`MetadataGateway`] backed by a JSON metadata service exposing
/// `GET {base}/{type}s/{external_id}`.
#[derive(Debug, Clone)]
pub struct HttpMetadataGateway {
    client: Client,
    base_url: String,
    api_key: Option<String>,
}

impl HttpMetadataGateway {
    pub fn new(config: &HttpGatewayConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| {
                CurationError::Internal(format!("Failed to build HTTP client: {e}"))
            })?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
        })
    }

    fn item_url(&self, content_type: ContentType, external_id: &str) -> String {
        format!("{}/{}/{}", self.base_url, content_type.plural(), external_id)
    }
}

fn transport_failure(err: &reqwest::Error) -> GatewayFailure {
    let kind = if err.is_timeout() {
        GatewayFailure::TIMEOUT
    } else if err.is_connect() {
        "Connect"
    } else {
        "Network"
    };
    GatewayFailure::new(kind, err.to_string())
}

fn excerpt(body: &str) -> &str {
    match body.char_indices().nth(BODY_EXCERPT_LIMIT) {
        Some((cut, _)) => &body[..cut],
        None => body,
    }
}

#[async_trait]
impl MetadataGateway for HttpMetadataGateway {
    async fn lookup(
        &self,
        content_type: ContentType,
        external_id: &str,
    ) -> std::result::Result<ItemDetails, LookupError> {
        let url = self.item_url(content_type, external_id);
        let mut request = self.client.get(&url);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| LookupError::Failed(transport_failure(&e)))?;
        let status = response.status();

        if status.is_success() {
            return match response.json::<ItemDetails>().await {
                Ok(details) => Ok(details),
                Err(e) => {
                    warn!(%url, error = %e, "metadata response was not valid JSON; keeping item");
                    Ok(ItemDetails::default())
                }
            };
        }

        if matches!(status, StatusCode::NOT_FOUND | StatusCode::GONE) {
            debug!(%url, status = status.as_u16(), "item not found upstream");
            return Err(LookupError::NotFound);
        }

        let body = response.text().await.unwrap_or_default();
        let failure = if status == StatusCode::TOO_MANY_REQUESTS {
            GatewayFailure::new(
                "RateLimited",
                format!("HTTP 429 Too Many Requests: {}", excerpt(&body)),
            )
        } else {
            GatewayFailure::new(
                format!("Http{}", status.as_u16()),
                format!("HTTP {}: {}", status.as_u16(), excerpt(&body)),
            )
        };
        Err(LookupError::Failed(failure))
    }
}
