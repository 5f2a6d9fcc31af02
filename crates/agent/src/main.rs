//! Perf Agent - vSphere performance counter collector
//!
//! Polls the realtime performance counters of every configured endpoint and
//! forwards them to the ingestion backend.

use anyhow::{Context, Result};
use perf_agent_lib::{
    health::{components, HealthRegistry},
    ingest::HttpIngestionClient,
    observability::{AgentMetrics, StructuredLogger},
    poller::{EngineConfig, PollSchedulerBuilder},
    source::{HttpSourceRegistry, SourceIdentityCache},
};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod api;
mod config;
mod endpoints;

const AGENT_VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and env filter
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    info!("Starting perf-agent");

    // Load configuration
    let config = config::AgentConfig::load()?;
    info!(
        instance = %config.instance_name,
        org_id = %config.org_id,
        endpoints = config.monitored_entities.len(),
        "Agent configured"
    );

    // Initialize health registry
    let health_registry = HealthRegistry::new();
    health_registry.register(components::SOURCE_REGISTRY).await;
    health_registry.register(components::INGESTION).await;

    let metrics = AgentMetrics::new();
    let logger = StructuredLogger::new(&config.instance_name);
    logger.log_startup(AGENT_VERSION, config.monitored_entities.len());

    // Shared backends
    let registry = HttpSourceRegistry::new(
        config.registry.base_url.clone(),
        &config.registry.api_key,
        config.registry.timeout(),
    )
    .context("Failed to create source registry client")?;
    let sources = Arc::new(SourceIdentityCache::new(Arc::new(registry)));

    let ingestion = Arc::new(
        HttpIngestionClient::new(
            config.ingestion.base_url.clone(),
            &config.ingestion.api_key,
            config.ingestion.timeout(),
        )
        .context("Failed to create ingestion client")?,
    );

    let ctx = endpoints::EndpointContext {
        engine_config: EngineConfig {
            org_id: config.org_id.clone(),
            instance_name: config.instance_name.clone(),
            cadence: config.poll_interval(),
            max_replay: config.max_replay(),
        },
        sources,
        ingestion,
        health: health_registry.clone(),
        metrics: metrics.clone(),
        logger: logger.clone(),
    };

    // One engine per endpoint that could be set up; the others stay disabled
    let engines = ctx.engines(&config.monitored_entities).await;
    let scheduler = if engines.is_empty() {
        warn!("No endpoint could be scheduled; serving health endpoints only");
        None
    } else {
        let builder = engines.into_iter().fold(
            PollSchedulerBuilder::new().period(config.poll_interval()),
            |builder, engine| builder.engine(engine),
        );
        Some(builder.build().context("Failed to build poll scheduler")?)
    };

    // Create shared application state
    let app_state = Arc::new(api::AppState::new(health_registry.clone(), metrics.clone()));

    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    let poller_handle = scheduler.map(|scheduler| tokio::spawn(scheduler.run(shutdown_rx)));

    // Mark agent as ready after initialization
    health_registry.set_ready(true).await;

    // Start health and metrics server
    let api_handle = tokio::spawn(api::serve(config.api_port, app_state));

    // Wait for shutdown signal
    tokio::signal::ctrl_c().await?;
    logger.log_shutdown("SIGINT received");
    health_registry.set_ready(false).await;

    let _ = shutdown_tx.send(());
    if let Some(handle) = poller_handle {
        if let Err(e) = handle.await {
            error!(error = %e, "Poll scheduler terminated abnormally");
        }
    }
    api_handle.abort();

    info!("Shutting down");
    Ok(())
}
