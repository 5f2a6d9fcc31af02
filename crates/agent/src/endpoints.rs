//! Per-endpoint startup
//!
//! Every monitored entity gets its own poll engine. An entity whose catalog
//! or session cannot be set up is disabled on its own; the rest still run.

use perf_agent_lib::{
    catalog::Catalog,
    endpoint::ViJsonSession,
    health::{components, HealthRegistry},
    ingest::IngestionClient,
    observability::{AgentMetrics, StructuredLogger},
    poller::{EngineConfig, PollCycleEngine},
    source::SourceIdentityCache,
    MonitoredEntity,
};
use std::sync::Arc;
use std::time::Duration;

/// Request timeout for vSphere endpoints; QueryPerf on large inventories is slow
pub const ENDPOINT_TIMEOUT: Duration = Duration::from_secs(60);

/// Shared collaborators handed to every engine
pub struct EndpointContext {
    pub engine_config: EngineConfig,
    pub sources: Arc<SourceIdentityCache>,
    pub ingestion: Arc<dyn IngestionClient>,
    pub health: HealthRegistry,
    pub metrics: AgentMetrics,
    pub logger: StructuredLogger,
}

impl EndpointContext {
    async fn disable(&self, endpoint: &str, reason: String) {
        self.logger.log_endpoint_disabled(endpoint, &reason);
        self.metrics.inc_endpoints_disabled();
        self.health
            .set_unhealthy(&components::poller(endpoint), reason)
            .await;
    }

    /// Build an engine for `entity`, or disable it and return `None`
    pub async fn engine_for(&self, entity: &MonitoredEntity) -> Option<Arc<PollCycleEngine>> {
        let catalog = match Catalog::load(entity.catalog.as_path()).await {
            Ok(catalog) => catalog,
            Err(e) => {
                self.disable(&entity.name, e.to_string()).await;
                return None;
            }
        };
        if !catalog.validate(true) {
            let reason = format!("catalog {} is invalid", entity.catalog.display());
            self.disable(&entity.name, reason).await;
            return None;
        }

        let session = match ViJsonSession::new(entity, ENDPOINT_TIMEOUT) {
            Ok(session) => session,
            Err(e) => {
                self.disable(&entity.name, format!("session setup failed: {e}"))
                    .await;
                return None;
            }
        };

        self.health.register(&components::poller(&entity.name)).await;
        Some(Arc::new(PollCycleEngine::new(
            entity.name.clone(),
            entity.catalog.clone(),
            self.engine_config.clone(),
            Arc::new(session),
            self.sources.clone(),
            self.ingestion.clone(),
            self.health.clone(),
        )))
    }

    /// Engines for every entity that could be set up
    pub async fn engines(&self, entities: &[MonitoredEntity]) -> Vec<Arc<PollCycleEngine>> {
        let mut engines = Vec::with_capacity(entities.len());
        for entity in entities {
            if let Some(engine) = self.engine_for(entity).await {
                engines.push(engine);
            }
        }
        engines
    }
}
