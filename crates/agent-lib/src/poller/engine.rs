//! Poll cycle of one endpoint
//!
//! A tick walks `Locking -> Connecting -> RefreshingMetadata -> Enumerating
//! -> Querying -> Transforming -> Submitting`. The lock is a non-blocking
//! compare-and-swap: a tick that finds a poll in flight records an overrun
//! and does nothing else.

use super::window::{PollWindow, Window};
use crate::catalog::{Catalog, CatalogSource};
use crate::counters::{fetch_all, normalize_value, ResolvedMetadata};
use crate::endpoint::{
    EndpointSession, EntityMetric, ManagedObject, RawSeries, SampleInfo, REALTIME_INTERVAL_ID,
};
use crate::error::{CatalogError, PollError, PollStage};
use crate::health::{components, HealthRegistry};
use crate::ingest::IngestionClient;
use crate::models::Measurement;
use crate::observability::{AgentMetrics, StructuredLogger};
use crate::source::SourceIdentityCache;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

/// Settings shared by every engine of the agent
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Organization that owns the sources
    pub org_id: String,
    /// Agent instance name used in lifecycle events
    pub instance_name: String,
    /// Tick period; also the length of the first window
    pub cadence: Duration,
    /// Oldest sample a replayed window may reach back to
    pub max_replay: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            org_id: String::new(),
            instance_name: "perf-agent".to_string(),
            cadence: Duration::from_secs(20),
            max_replay: Duration::from_secs(300),
        }
    }
}

/// Summary of a completed tick
#[derive(Debug, Clone, PartialEq)]
pub struct CycleReport {
    pub window_start: DateTime<Utc>,
    pub window_end: DateTime<Utc>,
    pub objects: usize,
    pub measurements: usize,
    /// False if the batch was empty or the ingestion backend failed
    pub delivered: bool,
}

/// Result of one tick
#[derive(Debug)]
pub enum TickOutcome {
    Completed(CycleReport),
    /// Another tick still held the lock
    Overrun,
    /// Transient failure; the window was not advanced
    Failed(PollError),
    /// The endpoint is permanently disabled
    Disabled,
}

/// Releases the poll lock on drop
struct PollGuard<'a>(&'a AtomicBool);

impl<'a> PollGuard<'a> {
    fn try_acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| PollGuard(flag))
    }
}

impl Drop for PollGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Samples of one queried object
struct ObjectSamples {
    object_type: String,
    object: ManagedObject,
    results: Vec<EntityMetric>,
}

/// Per-endpoint poll state machine
pub struct PollCycleEngine {
    name: String,
    component: String,
    catalog: CatalogSource,
    config: EngineConfig,
    session: Arc<dyn EndpointSession>,
    sources: Arc<SourceIdentityCache>,
    ingestion: Arc<dyn IngestionClient>,
    health: HealthRegistry,
    metrics: AgentMetrics,
    logger: StructuredLogger,
    in_flight: AtomicBool,
    disabled: AtomicBool,
    overruns: AtomicU64,
    metadata: Mutex<Option<Arc<ResolvedMetadata>>>,
    window: Mutex<PollWindow>,
    skew_secs: Mutex<Option<i64>>,
}

impl PollCycleEngine {
    pub fn new(
        name: impl Into<String>,
        catalog: impl Into<CatalogSource>,
        config: EngineConfig,
        session: Arc<dyn EndpointSession>,
        sources: Arc<SourceIdentityCache>,
        ingestion: Arc<dyn IngestionClient>,
        health: HealthRegistry,
    ) -> Self {
        let name = name.into();
        let window = PollWindow::new(config.cadence, config.max_replay);
        let logger = StructuredLogger::new(config.instance_name.clone());

        Self {
            component: components::poller(&name),
            name,
            catalog: catalog.into(),
            config,
            session,
            sources,
            ingestion,
            health,
            metrics: AgentMetrics::new(),
            logger,
            in_flight: AtomicBool::new(false),
            disabled: AtomicBool::new(false),
            overruns: AtomicU64::new(0),
            metadata: Mutex::new(None),
            window: Mutex::new(window),
            skew_secs: Mutex::new(None),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Health component name of this engine
    pub fn component(&self) -> &str {
        &self.component
    }

    pub fn cadence(&self) -> Duration {
        self.config.cadence
    }

    pub fn is_disabled(&self) -> bool {
        self.disabled.load(Ordering::Acquire)
    }

    /// Ticks skipped because a poll was still in flight
    pub fn overruns(&self) -> u64 {
        self.overruns.load(Ordering::Relaxed)
    }

    /// Sources resolved so far, across all endpoints sharing the cache
    pub fn sources_cached(&self) -> usize {
        self.sources.len()
    }

    /// End of the last delivered window
    pub async fn last_poll(&self) -> Option<DateTime<Utc>> {
        self.window.lock().await.last_poll()
    }

    /// Drop the resolved metadata so the next tick refetches the counter table
    pub async fn invalidate_metadata(&self) {
        *self.metadata.lock().await = None;
        info!(endpoint = %self.name, "Counter metadata invalidated");
    }

    /// Run one poll cycle
    pub async fn tick(&self) -> TickOutcome {
        if self.is_disabled() {
            return TickOutcome::Disabled;
        }

        let Some(_guard) = PollGuard::try_acquire(&self.in_flight) else {
            let overruns = self.overruns.fetch_add(1, Ordering::Relaxed) + 1;
            self.metrics.inc_poll_overruns(&self.name);
            self.logger.log_poll_overrun(&self.name, overruns);
            return TickOutcome::Overrun;
        };

        let started = Instant::now();
        let outcome = match self.poll().await {
            Ok(report) => {
                self.health.set_healthy(&self.component).await;
                TickOutcome::Completed(report)
            }
            Err(e) if e.is_fatal() => {
                self.disabled.store(true, Ordering::Release);
                self.metrics.inc_endpoints_disabled();
                self.logger.log_endpoint_disabled(&self.name, &e.to_string());
                self.health
                    .set_unhealthy(&self.component, e.to_string())
                    .await;
                self.session.disconnect().await;
                TickOutcome::Disabled
            }
            Err(e) => {
                error!(
                    endpoint = %self.name,
                    stage = %e.stage(),
                    error = %e,
                    "Poll failed, window will be replayed"
                );
                self.metrics.inc_poll_errors(&self.name, e.stage());
                self.health
                    .set_degraded(&self.component, e.to_string())
                    .await;
                self.session.disconnect().await;
                TickOutcome::Failed(e)
            }
        };

        self.metrics
            .observe_poll_duration(&self.name, started.elapsed().as_secs_f64());
        outcome
    }

    async fn poll(&self) -> Result<CycleReport, PollError> {
        if !self.session.is_session_valid().await {
            self.session.disconnect().await;
            self.session
                .connect()
                .await
                .map_err(|e| PollError::endpoint(PollStage::Connecting, e))?;
        }

        let metadata = self.resolved_metadata().await?;

        let now = self
            .session
            .server_time()
            .await
            .map_err(|e| PollError::endpoint(PollStage::Querying, e))?;
        self.check_skew(now).await;

        let window = self.window.lock().await.begin(now);
        if window.is_empty() {
            warn!(
                endpoint = %self.name,
                start = %window.start,
                end = %window.end,
                "Endpoint clock moved backwards, skipping tick"
            );
            return Ok(CycleReport {
                window_start: window.start,
                window_end: window.end,
                objects: 0,
                measurements: 0,
                delivered: false,
            });
        }

        let mut objects = Vec::new();
        for object_type in metadata.object_types() {
            let found = self
                .session
                .enumerate_managed_objects(object_type)
                .await
                .map_err(|e| PollError::endpoint(PollStage::Enumerating, e))?;
            objects.extend(found.into_iter().map(|o| (object_type.to_string(), o)));
        }

        let samples = self.query(&metadata, objects, window).await?;
        let object_count = samples.len();
        let batch = self.transform(&metadata, samples).await;
        let delivered = self.submit(&batch, window).await;

        self.window.lock().await.advance(now);

        Ok(CycleReport {
            window_start: window.start,
            window_end: window.end,
            objects: object_count,
            measurements: batch.len(),
            delivered,
        })
    }

    async fn resolved_metadata(&self) -> Result<Arc<ResolvedMetadata>, PollError> {
        let mut slot = self.metadata.lock().await;
        if let Some(metadata) = slot.as_ref() {
            return Ok(metadata.clone());
        }

        let catalog = Catalog::load(self.catalog.clone()).await?;
        if !catalog.validate(true) {
            return Err(CatalogError::Invalid(self.catalog_label()).into());
        }

        let counters = fetch_all(self.session.as_ref())
            .await
            .map_err(|e| PollError::endpoint(PollStage::RefreshingMetadata, e))?;
        let metadata = Arc::new(ResolvedMetadata::build(&catalog, counters)?);

        for definition in metadata.declarations() {
            if let Err(e) = self.ingestion.declare_metric(&definition).await {
                warn!(
                    endpoint = %self.name,
                    metric = %definition.metric,
                    error = %e,
                    "Failed to declare metric"
                );
            }
        }

        *slot = Some(metadata.clone());
        Ok(metadata)
    }

    fn catalog_label(&self) -> String {
        match &self.catalog {
            CatalogSource::Path(path) => path.display().to_string(),
            CatalogSource::Json(_) => format!("<inline catalog for {}>", self.name),
        }
    }

    async fn check_skew(&self, server_now: DateTime<Utc>) {
        let skew = Utc::now().signed_duration_since(server_now);
        let mut last = self.skew_secs.lock().await;

        if skew.num_milliseconds().abs() > 1000 {
            if *last != Some(skew.num_seconds()) {
                warn!(
                    endpoint = %self.name,
                    skew_secs = skew.num_seconds(),
                    "Endpoint and local clocks are skewed"
                );
                *last = Some(skew.num_seconds());
            }
        } else {
            *last = None;
        }
    }

    async fn query(
        &self,
        metadata: &ResolvedMetadata,
        objects: Vec<(String, ManagedObject)>,
        window: Window,
    ) -> Result<Vec<ObjectSamples>, PollError> {
        let mut samples = Vec::with_capacity(objects.len());

        for (object_type, object) in objects {
            let counter_ids = metadata.counter_ids_for(&object_type);
            debug!(
                endpoint = %self.name,
                object = %object.name,
                counters = ?counter_ids,
                start = %window.start,
                end = %window.end,
                "Querying samples"
            );

            let results = self
                .session
                .query_samples(
                    &object.reference,
                    &counter_ids,
                    window.start,
                    window.end,
                    REALTIME_INTERVAL_ID,
                )
                .await
                .map_err(|e| PollError::endpoint(PollStage::Querying, e))?;

            samples.push(ObjectSamples {
                object_type,
                object,
                results,
            });
        }

        Ok(samples)
    }

    async fn transform(
        &self,
        metadata: &ResolvedMetadata,
        samples: Vec<ObjectSamples>,
    ) -> Vec<Measurement> {
        let mut batch = Vec::new();
        let mut unresolved_sources = 0usize;

        for ObjectSamples {
            object_type,
            object,
            results,
        } in samples
        {
            for result in results {
                let (sample_info, series) = match result {
                    EntityMetric::Sampled {
                        samples, series, ..
                    } => (samples, series),
                    EntityMetric::Unrecognized(type_name) => {
                        warn!(
                            endpoint = %self.name,
                            object = %object.name,
                            type_name = %type_name,
                            "Unrecognized performance result, ignoring"
                        );
                        self.metrics.inc_series_skipped(&self.name, "unrecognized");
                        continue;
                    }
                };

                let usable =
                    self.usable_series(metadata, &object_type, &object, &sample_info, series);
                if usable.is_empty() {
                    continue;
                }

                let source_name = format!("{}-{}", self.name, object.name);
                let source = match self
                    .sources
                    .resolve(&self.config.org_id, &source_name)
                    .await
                {
                    Ok(source) => source,
                    Err(e) => {
                        warn!(
                            endpoint = %self.name,
                            source = %source_name,
                            error = %e,
                            "Could not resolve source, dropping samples"
                        );
                        unresolved_sources += 1;
                        for _ in &usable {
                            self.metrics
                                .inc_series_skipped(&self.name, "source_unresolved");
                        }
                        continue;
                    }
                };

                for (unit, metric, values) in usable {
                    for (sample, raw) in sample_info.iter().zip(values) {
                        let value = normalize_value(&unit, raw);
                        match Measurement::new(
                            source.source_id,
                            metric.as_str(),
                            value,
                            sample.timestamp,
                        ) {
                            Ok(measurement) => batch.push(measurement),
                            Err(e) => {
                                warn!(
                                    endpoint = %self.name,
                                    source = %source_name,
                                    error = %e,
                                    "Dropping invalid measurement"
                                );
                                self.metrics.inc_series_skipped(&self.name, "invalid");
                            }
                        }
                    }
                }
            }
        }

        if unresolved_sources > 0 {
            self.health
                .set_degraded(
                    components::SOURCE_REGISTRY,
                    format!("{} sources unresolved on {}", unresolved_sources, self.name),
                )
                .await;
        } else {
            self.health.set_healthy(components::SOURCE_REGISTRY).await;
        }
        self.metrics.set_sources_cached(self.sources.len());
        batch
    }

    /// Resolve series to `(unit, metric, values)`, one per counter.
    ///
    /// Queries ask for every instance; the aggregate instance (empty name)
    /// wins when present so each metric gets one value per sample.
    fn usable_series(
        &self,
        metadata: &ResolvedMetadata,
        object_type: &str,
        object: &ManagedObject,
        sample_info: &[SampleInfo],
        series: Vec<RawSeries>,
    ) -> Vec<(String, String, Vec<i64>)> {
        let mut by_counter: HashMap<i32, (String, Vec<i64>)> = HashMap::new();

        for raw in series {
            let (counter_id, instance, values) = match raw {
                RawSeries::Int {
                    counter_id,
                    instance,
                    values,
                } => (counter_id, instance, values),
                RawSeries::Unrecognized(type_name) => {
                    warn!(
                        endpoint = %self.name,
                        object = %object.name,
                        type_name = %type_name,
                        "Unrecognized series type, ignoring"
                    );
                    self.metrics.inc_series_skipped(&self.name, "unrecognized");
                    continue;
                }
            };

            match by_counter.get(&counter_id) {
                Some((kept, _)) if kept.is_empty() || !instance.is_empty() => {
                    debug!(counter_id, instance = %instance, "Ignoring per-instance series");
                }
                _ => {
                    by_counter.insert(counter_id, (instance, values));
                }
            }
        }

        let mut usable = Vec::with_capacity(by_counter.len());
        let mut counter_ids: Vec<i32> = by_counter.keys().copied().collect();
        counter_ids.sort_unstable();

        for counter_id in counter_ids {
            let Some((_, values)) = by_counter.remove(&counter_id) else {
                continue;
            };

            let Some((counter, definition)) = metadata.resolve_series(object_type, counter_id) else {
                warn!(
                    endpoint = %self.name,
                    object = %object.name,
                    counter_id,
                    "Series for unknown counter, skipping"
                );
                self.metrics.inc_series_skipped(&self.name, "unresolved");
                continue;
            };

            if sample_info.is_empty() || values.is_empty() {
                warn!(
                    endpoint = %self.name,
                    object = %object.name,
                    counter = %counter.full_name(),
                    "No samples received for counter"
                );
                self.metrics.inc_series_skipped(&self.name, "no_data");
                continue;
            }

            if values.len() != sample_info.len() {
                debug!(
                    counter = %counter.full_name(),
                    values = values.len(),
                    samples = sample_info.len(),
                    "Series and sample info lengths differ"
                );
            }

            usable.push((counter.unit.clone(), definition.metric.clone(), values));
        }

        usable
    }

    async fn submit(&self, batch: &[Measurement], window: Window) -> bool {
        if batch.is_empty() {
            warn!(endpoint = %self.name, "No measurements collected in last poll");
            return false;
        }

        match self.ingestion.submit_measurements(batch).await {
            Ok(()) => {
                self.metrics.add_measurements_submitted(&self.name, batch.len());
                self.logger
                    .log_batch_submitted(&self.name, batch.len(), window.start, window.end);
                self.health.set_healthy(components::INGESTION).await;
                true
            }
            Err(e) => {
                error!(
                    endpoint = %self.name,
                    measurements = batch.len(),
                    error = %e,
                    "Failed to submit measurements, batch dropped"
                );
                self.metrics.inc_submission_failures(&self.name);
                self.metrics.inc_poll_errors(&self.name, PollStage::Submitting);
                self.health
                    .set_degraded(components::INGESTION, e.to_string())
                    .await;
                false
            }
        }
    }
}
