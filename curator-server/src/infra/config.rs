use anyhow::{Context, anyhow, bail};
use curator_core::{
    config::CurationConfig, gateway::HttpGatewayConfig, types::ContentType,
    validation::RunScope,
};
use serde::{Deserialize, Serialize};
use std::{
    env, fs,
    path::{Path, PathBuf},
    time::Duration,
};

/// Source that produced the server configuration.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ConfigSource {
    #[default]
    Default,
    EnvPath(PathBuf),
    EnvInline,
    File(PathBuf),
}

/// Everything the server process needs. Every section has defaults so a
/// config file only carries the values it changes.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    /// Background pool that executes asynchronously triggered runs.
    pub workers: WorkerPoolConfig,
    pub scheduler: SchedulerConfig,
    pub gateway: GatewayConfig,
    /// Lock, breaker, throttle and validation tunables.
    pub curation: CurationConfig,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 8080,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Falls back to `DATABASE_URL` when unset.
    pub url: Option<String>,
    pub max_connections: u32,
    pub min_connections: u32,
    pub acquire_timeout_secs: u64,
    /// Apply embedded migrations on startup.
    pub run_migrations: bool,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: None,
            max_connections: 10,
            min_connections: 1,
            acquire_timeout_secs: 10,
            run_migrations: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct WorkerPoolConfig {
    pub size: usize,
    /// Runs waiting for a worker. A trigger that finds the queue full is
    /// rejected with 503.
    pub queue_capacity: usize,
    /// Hint returned to rejected callers.
    pub retry_after_secs: u64,
}

impl Default for WorkerPoolConfig {
    fn default() -> Self {
        Self {
            size: 2,
            queue_capacity: 4,
            retry_after_secs: 60,
        }
    }
}

/// What a scheduled run validates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ScheduledScope {
    All,
    Channel,
    Playlist,
    #[default]
    Video,
}

impl ScheduledScope {
    pub fn run_scope(self) -> RunScope {
        match self {
            Self::All => RunScope::All,
            Self::Channel => RunScope::Single(ContentType::Channel),
            Self::Playlist => RunScope::Single(ContentType::Playlist),
            Self::Video => RunScope::Single(ContentType::Video),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct SchedulerConfig {
    pub enabled: bool,
    pub interval_minutes: u64,
    /// Delay before the first scheduled run after startup.
    pub initial_delay_secs: u64,
    pub scope: ScheduledScope,
    /// Item budget per scheduled run; `None` uses `curation.validation.max_items_per_run`.
    pub max_items: Option<u32>,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_minutes: 60,
            initial_delay_secs: 60,
            scope: ScheduledScope::Video,
            max_items: None,
        }
    }
}

impl SchedulerConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_minutes.saturating_mul(60))
    }

    pub fn initial_delay(&self) -> Duration {
        Duration::from_secs(self.initial_delay_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct GatewayConfig {
    #[serde(flatten)]
    pub http: HttpGatewayConfig,
    /// Upper bound for one guarded lookup, throttling excluded.
    pub call_timeout_secs: u64,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            http: HttpGatewayConfig::default(),
            call_timeout_secs: 15,
        }
    }
}

impl GatewayConfig {
    pub fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.call_timeout_secs)
    }
}

impl Config {
    /// Load configuration using environment variables.
    /// Evaluation order:
    /// 1) `$CURATOR_CONFIG_PATH` (TOML or JSON file),
    /// 2) `$CURATOR_CONFIG_JSON` (inline JSON),
    /// 3) the first default candidate file that exists,
    /// 4) defaults.
    pub fn load_from_env() -> anyhow::Result<(Self, ConfigSource)> {
        if let Ok(path_str) = env::var("CURATOR_CONFIG_PATH")
            && !path_str.trim().is_empty()
        {
            let path = PathBuf::from(path_str);
            let config = Self::load_from_file(&path)?;
            return Ok((config, ConfigSource::EnvPath(path)));
        }

        if let Ok(raw) = env::var("CURATOR_CONFIG_JSON")
            && !raw.trim().is_empty()
        {
            let parsed = Self::parse_json(&raw)
                .context("failed to parse CURATOR_CONFIG_JSON")?;
            return Ok((parsed, ConfigSource::EnvInline));
        }

        if let Some(path) = Self::find_default_file() {
            let config = Self::load_from_file(&path)?;
            return Ok((config, ConfigSource::File(path)));
        }

        Ok((Self::default(), ConfigSource::Default))
    }

    pub fn load_from_file(path: &Path) -> anyhow::Result<Self> {
        let contents = fs::read_to_string(path).with_context(|| {
            format!("failed to read curator config from {}", path.display())
        })?;

        match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => Self::parse_json(&contents).with_context(|| {
                format!("invalid curator config {}", path.display())
            }),
            Some("toml") => toml::from_str(&contents).map_err(|err| {
                anyhow!("invalid curator config {}: {}", path.display(), err)
            }),
            _ => Self::parse_from_str(&contents, &path.display().to_string()),
        }
    }

    /// Try TOML first, then JSON.
    pub fn parse_from_str(contents: &str, origin: &str) -> anyhow::Result<Self> {
        toml::from_str(contents).or_else(|toml_err| {
            serde_json::from_str(contents).map_err(|json_err| {
                anyhow!(
                    "failed to parse curator config {}: toml error: {}; json error: {}",
                    origin,
                    toml_err,
                    json_err
                )
            })
        })
    }

    pub fn parse_json(raw: &str) -> anyhow::Result<Self> {
        serde_json::from_str(raw)
            .map_err(|err| anyhow!("invalid curator config json: {err}"))
    }

    fn find_default_file() -> Option<PathBuf> {
        const CANDIDATES: &[&str] = &[
            "curator.toml",
            "curator.json",
            "config/curator.toml",
            "config/curator.json",
        ];

        CANDIDATES
            .iter()
            .map(Path::new)
            .find(|path| path.exists())
            .map(|path| path.to_path_buf())
    }

    /// Reject settings the server cannot run with.
    pub fn validate(&self) -> anyhow::Result<()> {
        self.curation
            .validate()
            .context("invalid curation settings")?;

        if self.workers.size == 0 {
            bail!("workers.size must be at least 1");
        }
        if self.workers.queue_capacity == 0 {
            bail!("workers.queue_capacity must be at least 1");
        }
        if self.scheduler.enabled && self.scheduler.interval_minutes == 0 {
            bail!("scheduler.interval_minutes must be at least 1");
        }
        if self.gateway.call_timeout_secs == 0 {
            bail!("gateway.call_timeout_secs must be at least 1");
        }
        if let Some(url) = &self.database.url
            && !(url.starts_with("postgres://") || url.starts_with("postgresql://"))
        {
            bail!(
                "Invalid database URL: must start with postgres:// or postgresql://"
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_toml_keeps_defaults() {
        let config = Config::parse_from_str(
            r#"
            [server]
            port = 9090

            [scheduler]
            scope = "all"
            max_items = 30

            [curation.circuit_breaker]
            cooldown_base_minutes = 5
            "#,
            "inline",
        )
        .unwrap();

        assert_eq!(config.server.port, 9090);
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.scheduler.scope, ScheduledScope::All);
        assert_eq!(config.scheduler.max_items, Some(30));
        assert_eq!(config.curation.circuit_breaker.cooldown_base_minutes, 5);
        assert_eq!(config.curation.circuit_breaker.rolling_window_minutes, 10);
        assert_eq!(config.workers, WorkerPoolConfig::default());
    }

    #[test]
    fn json_is_accepted_as_fallback() {
        let config = Config::parse_from_str(
            r#"{"gateway": {"base_url": "http://meta:9000", "call_timeout_secs": 3}}"#,
            "inline",
        )
        .unwrap();

        assert_eq!(config.gateway.http.base_url, "http://meta:9000");
        assert_eq!(config.gateway.call_timeout_secs, 3);
    }

    #[test]
    fn validation_rejects_unusable_settings() {
        let mut config = Config::default();
        assert!(config.validate().is_ok());

        config.workers.size = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.database.url = Some("mysql://localhost/curator".into());
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.curation.circuit_breaker.rolling_window_error_threshold = 0;
        assert!(config.validate().is_err());
    }
}
