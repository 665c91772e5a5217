//! # Curator Server
//!
//! Periodic, cluster-safe re-validation of curated channels, playlists and
//! videos against an external metadata service.
//!
//! ## Architecture
//!
//! The server is built on Axum and uses:
//! - PostgreSQL for the catalog, the scheduler lock, the circuit breaker and
//!   validation run records
//! - A bounded worker pool for asynchronously triggered runs
//! - A periodic scheduler; every instance runs one and the lock picks the winner

use std::{net::SocketAddr, sync::Arc};

use anyhow::Context;
use clap::{Args as ClapArgs, Parser, Subcommand};
use curator_core::{
    database::{CurationStores, PostgresDatabase, postgres::PoolSettings},
    gateway::HttpMetadataGateway,
    instance::instance_id,
    time::SystemClock,
};
use curator_server::{
    AppState,
    infra::config::{Config, ConfigSource},
    routes,
};
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// CLI entry point
#[derive(Parser, Debug)]
#[command(name = "curator-server")]
#[command(about = "Cluster-safe content validation service")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    #[command(flatten)]
    serve: ServeArgs,
}

#[derive(ClapArgs, Debug, Clone)]
struct ServeArgs {
    /// Server port (overrides config)
    #[arg(short, long, env = "SERVER_PORT")]
    port: Option<u16>,

    /// Server host (overrides config)
    #[arg(long, env = "SERVER_HOST")]
    host: Option<String>,

    /// PostgreSQL connection URL (overrides config)
    #[arg(long, env = "DATABASE_URL")]
    database_url: Option<String>,

    /// Run on in-process stores instead of PostgreSQL. State is lost on exit
    /// and not shared with other instances.
    #[arg(long, env = "CURATOR_IN_MEMORY", default_value_t = false)]
    in_memory: bool,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(subcommand)]
    Db(DbCommand),
}

#[derive(Debug, Subcommand)]
enum DbCommand {
    /// Apply database migrations and exit
    Migrate,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let env_file_loaded = dotenvy::dotenv().is_ok();
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                // Override via RUST_LOG.
                "info,curator_core=info,tower_http=warn".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    if env_file_loaded {
        info!("loaded .env file");
    }

    if let Some(command) = cli.command {
        match command {
            Command::Db(DbCommand::Migrate) => {
                run_db_migrate(&cli.serve).await?;
                return Ok(());
            }
        }
    }

    run_server(cli.serve).await
}

async fn run_db_migrate(args: &ServeArgs) -> anyhow::Result<()> {
    let config = load_runtime_config(args)?;
    let database_url = require_database_url(&config)?;
    let pg = PostgresDatabase::connect(&database_url, pool_settings(&config))
        .await
        .context("failed to connect to PostgreSQL for migration")?;
    pg.initialize_schema()
        .await
        .context("database migration failed")?;

    info!("Database migrations applied successfully");
    Ok(())
}

fn load_runtime_config(args: &ServeArgs) -> anyhow::Result<Config> {
    let (mut config, source) =
        Config::load_from_env().context("failed to load configuration")?;

    match &source {
        ConfigSource::Default => info!("no config file found; using defaults"),
        ConfigSource::EnvPath(path) => {
            info!(path = %path.display(), "config loaded from env path")
        }
        ConfigSource::EnvInline => info!("config loaded from inline environment json"),
        ConfigSource::File(path) => info!(path = %path.display(), "config loaded from file"),
    }

    if let Some(port) = args.port {
        config.server.port = port;
    }
    if let Some(host) = args.host.clone() {
        config.server.host = host;
    }
    if let Some(url) = args.database_url.clone() {
        config.database.url = Some(url);
    }

    config.validate()?;

    let breaker = &config.curation.circuit_breaker;
    info!(
        breaker.enabled = breaker.enabled,
        breaker.threshold = breaker.rolling_window_error_threshold,
        breaker.window_minutes = breaker.rolling_window_minutes,
        breaker.cooldown_base_minutes = breaker.cooldown_base_minutes,
        scheduler.enabled = config.scheduler.enabled,
        scheduler.interval_minutes = config.scheduler.interval_minutes,
        workers.size = config.workers.size,
        "curation configuration in effect"
    );
    if !config.curation.throttle.enabled {
        warn!("outbound throttling disabled; the metadata service may rate limit this instance");
    }

    Ok(config)
}

fn require_database_url(config: &Config) -> anyhow::Result<String> {
    match &config.database.url {
        Some(url) => Ok(url.clone()),
        None => {
            error!("DATABASE_URL must be provided unless --in-memory is set");
            Err(anyhow::anyhow!("No PostgreSQL connection configuration found"))
        }
    }
}

fn pool_settings(config: &Config) -> PoolSettings {
    PoolSettings {
        max_connections: config.database.max_connections,
        min_connections: config.database.min_connections,
        acquire_timeout: std::time::Duration::from_secs(config.database.acquire_timeout_secs),
    }
}

async fn wire_app_state(args: &ServeArgs, config: Arc<Config>) -> anyhow::Result<AppState> {
    let (stores, postgres) = if args.in_memory {
        warn!("running on in-memory stores; coordination is limited to this process");
        let (stores, _) = CurationStores::in_memory();
        (stores, None)
    } else {
        let database_url = require_database_url(&config)?;
        let pg = PostgresDatabase::connect(&database_url, pool_settings(&config))
            .await
            .context("Database connection failed")?;
        info!("Successfully connected to PostgreSQL");

        if config.database.run_migrations {
            pg.initialize_schema()
                .await
                .context("database migration failed")?;
        }
        (CurationStores::postgres(&pg), Some(Arc::new(pg)))
    };

    let gateway = HttpMetadataGateway::new(&config.gateway.http)
        .context("failed to build metadata gateway client")?;
    let instance = instance_id();
    info!(instance = %instance, "instance identity resolved");

    Ok(AppState::assemble(
        config,
        stores,
        Arc::new(gateway),
        Arc::new(SystemClock),
        instance,
        postgres,
    ))
}

async fn run_server(args: ServeArgs) -> anyhow::Result<()> {
    let config = Arc::new(load_runtime_config(&args)?);
    let state = wire_app_state(&args, Arc::clone(&config)).await?;

    let scheduler = state.scheduler().spawn();
    let router = routes::create_app(state);

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .context("invalid server host/port")?;
    info!(
        "Starting Curator server (HTTP) on {}:{}",
        config.server.host, config.server.port
    );

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    scheduler.abort();
    info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        error!(error = %err, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("shutdown signal received");
}
