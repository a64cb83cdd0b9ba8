//! World engine binary for the Marchland simulation.
//!
//! Wires the `PostgreSQL` world store, the NATS notification publisher and
//! the two schedulers together, then runs until Ctrl-C.
//!
//! # Startup Sequence
//!
//! 1. Load configuration from `marchland-config.yaml`
//! 2. Initialize structured logging (tracing)
//! 3. Connect to `PostgreSQL` and apply migrations
//! 4. Connect to NATS for notification delivery
//! 5. Spawn the resolution and resource tick schedulers
//! 6. On Ctrl-C, stop both schedulers and close connections
//!
//! The config path can be given as the first argument or through
//! `MARCHLAND_CONFIG`.

mod error;
mod nats_notify;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context as _;
use marchland_core::config::LoggingConfig;
use marchland_core::{
    GameConfig, ResolutionScheduler, ResourceTickScheduler, SchedulerControl, SystemClock, World,
};
use marchland_db::{PostgresConfig, PostgresPool};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::error::EngineError;
use crate::nats_notify::NatsDispatcher;

/// Default configuration file, relative to the working directory.
const DEFAULT_CONFIG_PATH: &str = "marchland-config.yaml";

/// Application entry point for the world engine.
///
/// # Errors
///
/// Returns an error if any startup step fails or a scheduler task dies.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. Load configuration. Logging is not up yet, so the outcome is
    //    reported once the subscriber is installed.
    let (config, config_source) = load_config()?;

    // 2. Initialize structured logging.
    init_logging(&config.logging)?;
    info!("marchland-engine starting");
    info!(
        source = config_source,
        world_name = config.world.name,
        troop_types = config.combat.troops.len(),
        resolution_interval_ms = config.schedulers.resolution_interval_ms,
        resource_tick_interval_ms = config.schedulers.resource_tick_interval_ms,
        max_concurrency = config.schedulers.max_concurrency,
        "Configuration loaded"
    );

    // 3. Connect to PostgreSQL.
    let pg_config = PostgresConfig::from_infrastructure(&config.infrastructure);
    let pool = PostgresPool::connect(&pg_config)
        .await
        .map_err(EngineError::from)
        .context("connecting to PostgreSQL")?;
    pool.run_migrations().await.map_err(EngineError::from)?;

    // 4. Connect to NATS.
    let dispatcher = NatsDispatcher::connect(&config.infrastructure.nats_url).await?;

    // 5. Spawn schedulers.
    let world = World::new(
        Arc::new(pool.world_store()),
        Arc::new(dispatcher.clone()),
        Arc::new(SystemClock),
        Arc::new(config),
    );
    let control = Arc::new(SchedulerControl::new());
    let resolution = tokio::spawn(ResolutionScheduler::new(world.clone(), Arc::clone(&control)).run());
    let resource_tick = tokio::spawn(ResourceTickScheduler::new(world, Arc::clone(&control)).run());
    info!("Schedulers running");

    // 6. Wait for Ctrl-C, then shut down.
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Shutdown requested"),
        Err(e) => warn!(error = %e, "Failed to listen for Ctrl-C, shutting down"),
    }
    control.request_stop();

    let joined = [
        join_scheduler("resolution", resolution).await,
        join_scheduler("resource_tick", resource_tick).await,
    ];
    if let Err(e) = dispatcher.flush().await {
        warn!(error = %e, "Pending notifications may have been lost");
    }
    pool.close().await;

    let status = control.status();
    info!(
        passes_completed = status.passes_completed,
        paused = status.paused,
        started_at = %status.started_at,
        elapsed_seconds = status.elapsed_seconds,
        "marchland-engine shutdown complete"
    );
    for result in joined {
        result?;
    }
    Ok(())
}

/// Load the game configuration.
///
/// The first command-line argument wins, then `MARCHLAND_CONFIG`, then
/// `marchland-config.yaml` in the working directory. A missing default
/// file falls back to built-in defaults; a missing explicit path is an
/// error.
fn load_config() -> Result<(GameConfig, String), EngineError> {
    let explicit = std::env::args()
        .nth(1)
        .or_else(|| std::env::var("MARCHLAND_CONFIG").ok())
        .map(PathBuf::from);

    let path = explicit
        .clone()
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH));
    if explicit.is_none() && !path.exists() {
        let mut config = GameConfig::default();
        config.infrastructure.apply_env_overrides();
        return Ok((config, "defaults".to_owned()));
    }
    let config = GameConfig::from_file(&path)?;
    Ok((config, path.display().to_string()))
}

/// Install the tracing subscriber. `RUST_LOG` wins over the configured level.
fn init_logging(logging: &LoggingConfig) -> Result<(), EngineError> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&logging.level))
        .map_err(|e| EngineError::Logging {
            message: format!("invalid log level `{}`: {e}", logging.level),
        })?;
    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_target(true);
    let installed = if logging.json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
    installed.map_err(|e| EngineError::Logging { message: e.to_string() })
}

/// Wait for a scheduler task and report how it ended.
async fn join_scheduler(name: &'static str, handle: JoinHandle<()>) -> Result<(), EngineError> {
    match handle.await {
        Ok(()) => {
            info!(scheduler = name, "Scheduler stopped");
            Ok(())
        }
        Err(e) => {
            error!(scheduler = name, error = %e, "Scheduler task failed");
            Err(EngineError::Task {
                name,
                message: e.to_string(),
            })
        }
    }
}
