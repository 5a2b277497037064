//! Alert Agent - node alert decision agent
//!
//! This binary runs on each monitored node, evaluating configured
//! composite and anomaly checks against the collector's metric reports
//! and emitting alert events.

use agent_lib::{
    alerting::CheckRegistry,
    anomaly::HistoryStore,
    config::ChecksConfig,
    engine::{EngineConfig, EvaluationEngine, FileSnapshotProvider, TracingSink},
    health::{components, HealthRegistry},
    observability::StructuredLogger,
    rules::RuleCache,
};
use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod api;
mod config;

const AGENT_VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and env filter
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    info!("Starting alert-agent");

    // Load configuration
    let config = config::AgentConfig::load()?;
    info!(node_name = %config.node_name, checks_file = %config.checks_file, "Agent configured");

    // Load check definitions and compile rules
    let checks = ChecksConfig::from_file(&config.checks_file)?;
    let mut cache = RuleCache::new();
    let registry = CheckRegistry::from_config(&checks, &mut cache);

    // History store, persisted across restarts when a path is configured
    let history = if config.history_path.is_empty() {
        HistoryStore::new()
    } else {
        HistoryStore::with_persistence(&config.history_path)
    };

    // Initialize health registry
    let health_registry = HealthRegistry::new();
    health_registry.register(components::RULE_ENGINE).await;
    health_registry.register(components::ANOMALY_DETECTOR).await;
    health_registry.register(components::HISTORY_STORE).await;
    health_registry.register(components::SNAPSHOT_PROVIDER).await;

    // Initialize structured logger
    let logger = StructuredLogger::new(&config.node_name);
    logger.log_startup(AGENT_VERSION, registry.len());

    // Build the evaluation engine
    let engine = EvaluationEngine::new(
        registry,
        history,
        Arc::new(FileSnapshotProvider::new(&config.report_path)),
        Arc::new(TracingSink),
        logger.clone(),
        EngineConfig {
            cycle_interval: Duration::from_secs(config.cycle_interval_secs),
            flush_interval: Duration::from_secs(config.flush_interval_secs),
        },
    );

    // Create shared application state
    let app_state = Arc::new(api::AppState::new(
        health_registry.clone(),
        engine.status_handle(),
    ));

    // Mark agent as ready after initialization
    health_registry.set_ready(true).await;

    // Start health and metrics server
    let _api_handle = tokio::spawn(api::serve(config.api_port, app_state));

    // Run the evaluation loop until SIGINT
    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    let engine_handle = tokio::spawn(engine.run(shutdown_rx));

    tokio::signal::ctrl_c().await?;
    logger.log_shutdown("SIGINT received");

    let _ = shutdown_tx.send(());
    let _ = engine_handle.await;
    info!("Shutting down");

    Ok(())
}
