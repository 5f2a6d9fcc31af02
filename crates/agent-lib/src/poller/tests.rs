//! Poll cycle tests
//!
//! The engine runs against in-memory fakes of the endpoint session, the
//! source registry and the ingestion backend.

use super::*;
use crate::catalog::CatalogSource;
use crate::endpoint::{EndpointSession, EntityMetric, ManagedObject, RawSeries, SampleInfo};
use crate::error::{EndpointError, IngestError, PollStage, RegistryError};
use crate::health::{components, ComponentStatus, HealthRegistry};
use crate::ingest::IngestionClient;
use crate::models::{
    CounterInfo, ManagedObjectRef, Measurement, MetricDefinition, MetricUnit, RollupType,
    SourceMetadata,
};
use crate::source::{SourceIdentityCache, SourceRegistry};
use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, TimeZone, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{broadcast, Notify};
use tokio::time::MissedTickBehavior;

const CATALOG: &str = r#"{
    "definitions": [
        { "metric": "SYSTEM_CPU", "displayName": "CPU", "unit": "number" },
        { "metric": "SYSTEM_MEM", "displayName": "Memory", "unit": "number" },
        { "metric": "SYSTEM_DISK", "displayName": "Disk used", "unit": "bytecount" }
    ],
    "catalog": [
        {
            "type": "VirtualMachine",
            "counters": [
                { "name": "cpu.usage.AVERAGE", "metric": "SYSTEM_CPU" },
                { "name": "mem.consumed.AVERAGE", "metric": "SYSTEM_MEM" },
                { "name": "disk.used.LATEST", "metric": "SYSTEM_DISK" }
            ]
        },
        {
            "type": "Datastore",
            "counters": [
                { "name": "disk.used.LATEST", "metric": "SYSTEM_DISK" }
            ]
        }
    ]
}"#;

const BROKEN_CATALOG: &str = r#"{
    "definitions": [],
    "catalog": [
        {
            "type": "VirtualMachine",
            "counters": [ { "name": "cpu.usage.AVERAGE", "metric": "SYSTEM_CPU" } ]
        }
    ]
}"#;

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 20).unwrap()
}

fn secs(n: i64) -> TimeDelta {
    TimeDelta::seconds(n)
}

fn vm(value: &str, name: &str) -> ManagedObject {
    ManagedObject {
        reference: ManagedObjectRef::new("VirtualMachine", value),
        name: name.to_string(),
    }
}

fn int_series(counter_id: i32, instance: &str, values: Vec<i64>) -> RawSeries {
    RawSeries::Int {
        counter_id,
        instance: instance.to_string(),
        values,
    }
}

fn sampled(value: &str, timestamps: &[DateTime<Utc>], series: Vec<RawSeries>) -> EntityMetric {
    EntityMetric::Sampled {
        entity: ManagedObjectRef::new("VirtualMachine", value),
        samples: timestamps
            .iter()
            .map(|ts| SampleInfo {
                timestamp: *ts,
                interval_secs: 20,
            })
            .collect(),
        series,
    }
}

/// Pauses `query_samples` until released
struct Gate {
    started: Notify,
    release: Notify,
}

struct FakeSession {
    counters: Vec<CounterInfo>,
    objects: HashMap<String, Vec<ManagedObject>>,
    results: Mutex<HashMap<String, Vec<EntityMetric>>>,
    now: Mutex<DateTime<Utc>>,
    connected: AtomicBool,
    connects: AtomicUsize,
    counter_fetches: AtomicUsize,
    fail_connect: AtomicBool,
    fail_query: AtomicBool,
    enumerated: Mutex<Vec<String>>,
    queries: Mutex<Vec<(String, Vec<i32>, DateTime<Utc>, DateTime<Utc>)>>,
    gate: Option<Arc<Gate>>,
}

impl FakeSession {
    fn new(objects: Vec<ManagedObject>) -> Self {
        Self {
            counters: vec![
                CounterInfo {
                    id: 2,
                    group: "cpu".to_string(),
                    name: "usage".to_string(),
                    rollup: RollupType::Average,
                    unit: "percent".to_string(),
                },
                CounterInfo {
                    id: 24,
                    group: "mem".to_string(),
                    name: "consumed".to_string(),
                    rollup: RollupType::Average,
                    unit: "kiloBytes".to_string(),
                },
            ],
            objects: HashMap::from([("VirtualMachine".to_string(), objects)]),
            results: Mutex::new(HashMap::new()),
            now: Mutex::new(t0()),
            connected: AtomicBool::new(false),
            connects: AtomicUsize::new(0),
            counter_fetches: AtomicUsize::new(0),
            fail_connect: AtomicBool::new(false),
            fail_query: AtomicBool::new(false),
            enumerated: Mutex::new(Vec::new()),
            queries: Mutex::new(Vec::new()),
            gate: None,
        }
    }

    fn with_gate(mut self, gate: Arc<Gate>) -> Self {
        self.gate = Some(gate);
        self
    }

    fn set_results(&self, object: &str, results: Vec<EntityMetric>) {
        self.results
            .lock()
            .unwrap()
            .insert(object.to_string(), results);
    }

    fn set_now(&self, now: DateTime<Utc>) {
        *self.now.lock().unwrap() = now;
    }
}

#[async_trait]
impl EndpointSession for FakeSession {
    async fn connect(&self) -> Result<(), EndpointError> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        if self.fail_connect.load(Ordering::SeqCst) {
            return Err(EndpointError::Status {
                operation: "Login".to_string(),
                status: 401,
                body: String::new(),
            });
        }
        self.connected.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn is_session_valid(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn disconnect(&self) {
        self.connected.store(false, Ordering::SeqCst);
    }

    async fn server_time(&self) -> Result<DateTime<Utc>, EndpointError> {
        Ok(*self.now.lock().unwrap())
    }

    async fn enumerate_managed_objects(
        &self,
        object_type: &str,
    ) -> Result<Vec<ManagedObject>, EndpointError> {
        self.enumerated
            .lock()
            .unwrap()
            .push(object_type.to_string());
        Ok(self.objects.get(object_type).cloned().unwrap_or_default())
    }

    async fn list_all_counters(&self) -> Result<Vec<CounterInfo>, EndpointError> {
        self.counter_fetches.fetch_add(1, Ordering::SeqCst);
        Ok(self.counters.clone())
    }

    async fn query_samples(
        &self,
        object: &ManagedObjectRef,
        counter_ids: &[i32],
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        interval_id: i32,
    ) -> Result<Vec<EntityMetric>, EndpointError> {
        assert_eq!(interval_id, 20);

        if let Some(gate) = &self.gate {
            gate.started.notify_one();
            gate.release.notified().await;
        }

        self.queries
            .lock()
            .unwrap()
            .push((object.value.clone(), counter_ids.to_vec(), start, end));

        if self.fail_query.load(Ordering::SeqCst) {
            return Err(EndpointError::Status {
                operation: "QueryPerf".to_string(),
                status: 503,
                body: String::new(),
            });
        }

        Ok(self
            .results
            .lock()
            .unwrap()
            .get(&object.value)
            .cloned()
            .unwrap_or_default())
    }
}

#[derive(Default)]
struct FakeRegistry {
    records: Mutex<HashMap<String, SourceMetadata>>,
    failing: HashSet<String>,
}

#[async_trait]
impl SourceRegistry for FakeRegistry {
    async fn create_source(&self, org: &str, name: &str) -> Result<String, RegistryError> {
        if self.failing.contains(name) {
            return Err(RegistryError::Status {
                status: 500,
                body: "registry down".to_string(),
            });
        }
        let mut records = self.records.lock().unwrap();
        let source_id = 1000 + records.len() as i64;
        records.insert(
            name.to_string(),
            SourceMetadata {
                id: name.to_string(),
                name: name.to_string(),
                source_id,
                org_id: org.to_string(),
            },
        );
        Ok(name.to_string())
    }

    async fn get_source_by_id(
        &self,
        _org: &str,
        id: &str,
    ) -> Result<Option<SourceMetadata>, RegistryError> {
        Ok(self.records.lock().unwrap().get(id).cloned())
    }

    async fn get_source_by_name(
        &self,
        _org: &str,
        name: &str,
    ) -> Result<Option<SourceMetadata>, RegistryError> {
        Ok(self.records.lock().unwrap().get(name).cloned())
    }
}

#[derive(Default)]
struct FakeIngestion {
    batches: Mutex<Vec<Vec<Measurement>>>,
    declared: Mutex<Vec<MetricDefinition>>,
    fail: AtomicBool,
}

impl FakeIngestion {
    fn submitted(&self) -> Vec<Measurement> {
        self.batches.lock().unwrap().concat()
    }
}

#[async_trait]
impl IngestionClient for FakeIngestion {
    async fn submit_measurements(&self, batch: &[Measurement]) -> Result<(), IngestError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(IngestError::Status {
                status: 503,
                body: "unavailable".to_string(),
            });
        }
        self.batches.lock().unwrap().push(batch.to_vec());
        Ok(())
    }

    async fn declare_metric(&self, definition: &MetricDefinition) -> Result<(), IngestError> {
        self.declared.lock().unwrap().push(definition.clone());
        Ok(())
    }
}

struct Harness {
    engine: Arc<PollCycleEngine>,
    session: Arc<FakeSession>,
    registry: Arc<FakeRegistry>,
    ingestion: Arc<FakeIngestion>,
    health: HealthRegistry,
}

fn harness_with(session: FakeSession, registry: FakeRegistry, catalog: &str) -> Harness {
    let session = Arc::new(session);
    let registry = Arc::new(registry);
    let ingestion = Arc::new(FakeIngestion::default());
    let sources = Arc::new(SourceIdentityCache::new(registry.clone()));
    let health = HealthRegistry::new();

    let config = EngineConfig {
        org_id: "org1".to_string(),
        instance_name: "test".to_string(),
        ..EngineConfig::default()
    };
    let engine = Arc::new(PollCycleEngine::new(
        "lab",
        CatalogSource::Json(catalog.to_string()),
        config,
        session.clone(),
        sources,
        ingestion.clone(),
        health.clone(),
    ));

    Harness {
        engine,
        session,
        registry,
        ingestion,
        health,
    }
}

fn harness(session: FakeSession) -> Harness {
    harness_with(session, FakeRegistry::default(), CATALOG)
}

fn completed(outcome: TickOutcome) -> CycleReport {
    match outcome {
        TickOutcome::Completed(report) => report,
        other => panic!("expected completed tick, got {other:?}"),
    }
}

#[tokio::test]
async fn test_percent_sample_becomes_single_measurement() {
    let h = harness(FakeSession::new(vec![vm("vm-1", "web-01")]));
    h.session.set_results(
        "vm-1",
        vec![sampled("vm-1", &[t0()], vec![int_series(2, "", vec![550])])],
    );

    let report = completed(h.engine.tick().await);

    let submitted = h.ingestion.submitted();
    assert_eq!(submitted.len(), 1);
    assert_eq!(submitted[0].metric(), "SYSTEM_CPU");
    assert_eq!(submitted[0].value(), 0.055);
    assert_eq!(submitted[0].timestamp(), t0());
    assert_eq!(submitted[0].source_id(), 1000);

    assert_eq!(report.measurements, 1);
    assert_eq!(report.objects, 1);
    assert!(report.delivered);
    assert_eq!(report.window_start, t0() - secs(20));
    assert_eq!(h.engine.last_poll().await, Some(t0()));
}

#[tokio::test]
async fn test_one_measurement_per_sample() {
    let h = harness(FakeSession::new(vec![vm("vm-1", "web-01")]));
    h.session.set_results(
        "vm-1",
        vec![sampled(
            "vm-1",
            &[t0() - secs(20), t0()],
            vec![int_series(2, "", vec![550, 600]), int_series(24, "", vec![10, 20])],
        )],
    );

    completed(h.engine.tick().await);

    let submitted = h.ingestion.submitted();
    assert_eq!(submitted.len(), 4);

    let mem: Vec<f64> = submitted
        .iter()
        .filter(|m| m.metric() == "SYSTEM_MEM")
        .map(|m| m.value())
        .collect();
    assert_eq!(mem, vec![10240.0, 20480.0]);
}

#[tokio::test]
async fn test_source_name_prefixed_with_endpoint() {
    let h = harness(FakeSession::new(vec![vm("vm-1", "web-01")]));
    h.session.set_results(
        "vm-1",
        vec![sampled("vm-1", &[t0()], vec![int_series(2, "", vec![1])])],
    );

    completed(h.engine.tick().await);

    let records = h.registry.records.lock().unwrap();
    assert!(records.contains_key("lab-web-01"));
    assert_eq!(records["lab-web-01"].org_id, "org1");
    assert_eq!(h.engine.sources_cached(), 1);
}

#[tokio::test]
async fn test_overrun_leaves_window_untouched() {
    let gate = Arc::new(Gate {
        started: Notify::new(),
        release: Notify::new(),
    });
    let h = harness(FakeSession::new(vec![vm("vm-1", "web-01")]).with_gate(gate.clone()));

    let engine = h.engine.clone();
    let first = tokio::spawn(async move { engine.tick().await });
    gate.started.notified().await;

    let before = h.engine.last_poll().await;
    let outcome = h.engine.tick().await;

    assert!(matches!(outcome, TickOutcome::Overrun));
    assert_eq!(h.engine.overruns(), 1);
    assert_eq!(h.engine.last_poll().await, before);

    gate.release.notify_one();
    completed(first.await.unwrap());
    assert_eq!(h.engine.last_poll().await, Some(t0()));
}

#[tokio::test]
async fn test_query_failure_replays_window() {
    let h = harness(FakeSession::new(vec![vm("vm-1", "web-01")]));
    completed(h.engine.tick().await);
    assert_eq!(h.engine.last_poll().await, Some(t0()));

    h.session.set_now(t0() + secs(20));
    h.session.fail_query.store(true, Ordering::SeqCst);
    match h.engine.tick().await {
        TickOutcome::Failed(e) => assert_eq!(e.stage(), PollStage::Querying),
        other => panic!("expected failure, got {other:?}"),
    }
    assert_eq!(h.engine.last_poll().await, Some(t0()));
    assert!(!h.session.connected.load(Ordering::SeqCst));

    h.session.set_now(t0() + secs(40));
    h.session.fail_query.store(false, Ordering::SeqCst);
    let report = completed(h.engine.tick().await);

    assert_eq!(report.window_start, t0());
    assert_eq!(report.window_end, t0() + secs(40));
    assert_eq!(h.engine.last_poll().await, Some(t0() + secs(40)));

    // Failed tick and retry both asked for the window starting at t0
    let starts: Vec<DateTime<Utc>> = h
        .session
        .queries
        .lock()
        .unwrap()
        .iter()
        .map(|q| q.2)
        .collect();
    assert_eq!(starts, vec![t0() - secs(20), t0(), t0()]);
    assert_eq!(h.session.connects.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_replay_limited_to_max_replay() {
    let h = harness(FakeSession::new(vec![vm("vm-1", "web-01")]));
    completed(h.engine.tick().await);

    h.session.fail_query.store(true, Ordering::SeqCst);
    for n in 1..=20 {
        h.session.set_now(t0() + secs(20 * n));
        assert!(matches!(h.engine.tick().await, TickOutcome::Failed(_)));
    }

    h.session.set_now(t0() + secs(420));
    h.session.fail_query.store(false, Ordering::SeqCst);
    let report = completed(h.engine.tick().await);

    assert_eq!(report.window_start, t0() + secs(120));
}

#[tokio::test]
async fn test_missing_catalog_counter_is_skipped() {
    let h = harness(FakeSession::new(vec![vm("vm-1", "web-01")]));
    h.session.set_results(
        "vm-1",
        vec![sampled("vm-1", &[t0()], vec![int_series(24, "", vec![1])])],
    );

    let report = completed(h.engine.tick().await);
    assert_eq!(report.measurements, 1);

    // disk.used.LATEST is unknown to the endpoint: VM still polls the rest,
    // Datastore has nothing left and is never enumerated
    let queries = h.session.queries.lock().unwrap().clone();
    assert_eq!(queries[0].1, vec![2, 24]);
    assert_eq!(
        *h.session.enumerated.lock().unwrap(),
        vec!["VirtualMachine".to_string()]
    );
}

#[tokio::test]
async fn test_invalid_catalog_disables_endpoint() {
    let h = harness_with(
        FakeSession::new(vec![vm("vm-1", "web-01")]),
        FakeRegistry::default(),
        BROKEN_CATALOG,
    );

    assert!(matches!(h.engine.tick().await, TickOutcome::Disabled));
    assert!(h.engine.is_disabled());
    assert!(matches!(h.engine.tick().await, TickOutcome::Disabled));

    assert_eq!(h.session.connects.load(Ordering::SeqCst), 1);
    assert_eq!(h.session.counter_fetches.load(Ordering::SeqCst), 0);
    assert!(h.ingestion.submitted().is_empty());

    let health = h.health.health().await;
    assert_eq!(
        health.components[h.engine.component()].status,
        ComponentStatus::Unhealthy
    );
}

#[tokio::test]
async fn test_submission_failure_still_advances_window() {
    let h = harness(FakeSession::new(vec![vm("vm-1", "web-01")]));
    h.session.set_results(
        "vm-1",
        vec![sampled("vm-1", &[t0()], vec![int_series(2, "", vec![550])])],
    );
    h.ingestion.fail.store(true, Ordering::SeqCst);

    let report = completed(h.engine.tick().await);

    assert!(!report.delivered);
    assert_eq!(report.measurements, 1);
    assert_eq!(h.engine.last_poll().await, Some(t0()));
    // Submission failures do not tear down the endpoint session
    assert!(h.session.connected.load(Ordering::SeqCst));

    let health = h.health.health().await;
    assert_eq!(
        health.components[components::INGESTION].status,
        ComponentStatus::Degraded
    );
}

#[tokio::test]
async fn test_empty_batch_is_not_submitted() {
    let h = harness(FakeSession::new(vec![]));

    let report = completed(h.engine.tick().await);

    assert_eq!(report.measurements, 0);
    assert!(!report.delivered);
    assert!(h.ingestion.batches.lock().unwrap().is_empty());
    assert_eq!(h.engine.last_poll().await, Some(t0()));
}

#[tokio::test]
async fn test_metadata_fetched_and_declared_once() {
    let h = harness(FakeSession::new(vec![vm("vm-1", "web-01")]));

    completed(h.engine.tick().await);
    h.session.set_now(t0() + secs(20));
    completed(h.engine.tick().await);

    assert_eq!(h.session.counter_fetches.load(Ordering::SeqCst), 1);

    let declared = h.ingestion.declared.lock().unwrap().clone();
    assert_eq!(declared.len(), 2);
    let mem = declared.iter().find(|d| d.metric == "SYSTEM_MEM").unwrap();
    assert_eq!(mem.unit, MetricUnit::Bytecount);

    h.engine.invalidate_metadata().await;
    h.session.set_now(t0() + secs(40));
    completed(h.engine.tick().await);
    assert_eq!(h.session.counter_fetches.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_unrecognized_and_unresolved_series_are_skipped() {
    let h = harness(FakeSession::new(vec![vm("vm-1", "web-01")]));
    h.session.set_results(
        "vm-1",
        vec![
            EntityMetric::Unrecognized("PerfEntityMetricCSV".to_string()),
            sampled(
                "vm-1",
                &[t0()],
                vec![
                    RawSeries::Unrecognized("PerfMetricSeriesCSV".to_string()),
                    int_series(99, "", vec![5]),
                    int_series(24, "", vec![]),
                    int_series(2, "", vec![550]),
                ],
            ),
        ],
    );

    let report = completed(h.engine.tick().await);

    assert_eq!(report.measurements, 1);
    assert_eq!(h.ingestion.submitted()[0].metric(), "SYSTEM_CPU");
}

#[tokio::test]
async fn test_series_without_samples_is_no_data() {
    let h = harness(FakeSession::new(vec![vm("vm-1", "web-01")]));
    h.session.set_results(
        "vm-1",
        vec![sampled("vm-1", &[], vec![int_series(2, "", vec![550])])],
    );

    let report = completed(h.engine.tick().await);
    assert_eq!(report.measurements, 0);
    // Nothing to report means no source is created either
    assert_eq!(h.engine.sources_cached(), 0);
}

#[tokio::test]
async fn test_aggregate_instance_is_preferred() {
    let h = harness(FakeSession::new(vec![vm("vm-1", "web-01")]));
    h.session.set_results(
        "vm-1",
        vec![sampled(
            "vm-1",
            &[t0()],
            vec![
                int_series(2, "0", vec![100]),
                int_series(2, "", vec![550]),
                int_series(2, "1", vec![200]),
            ],
        )],
    );

    completed(h.engine.tick().await);

    let submitted = h.ingestion.submitted();
    assert_eq!(submitted.len(), 1);
    assert_eq!(submitted[0].value(), 0.055);
}

#[tokio::test]
async fn test_source_failure_drops_only_that_object() {
    let registry = FakeRegistry {
        failing: HashSet::from(["lab-bad-01".to_string()]),
        ..FakeRegistry::default()
    };
    let h = harness_with(
        FakeSession::new(vec![vm("vm-1", "web-01"), vm("vm-2", "bad-01")]),
        registry,
        CATALOG,
    );
    for object in ["vm-1", "vm-2"] {
        h.session.set_results(
            object,
            vec![sampled(object, &[t0()], vec![int_series(2, "", vec![550])])],
        );
    }

    let report = completed(h.engine.tick().await);

    assert_eq!(report.objects, 2);
    assert_eq!(report.measurements, 1);
    assert!(report.delivered);

    let health = h.health.health().await;
    assert_eq!(
        health.components[components::SOURCE_REGISTRY].status,
        ComponentStatus::Degraded
    );
}

#[tokio::test]
async fn test_expired_session_reconnects() {
    let h = harness(FakeSession::new(vec![]));

    completed(h.engine.tick().await);
    h.session.connected.store(false, Ordering::SeqCst);
    h.session.set_now(t0() + secs(20));
    completed(h.engine.tick().await);

    assert_eq!(h.session.connects.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_connect_failure_keeps_window_and_retries() {
    let h = harness(FakeSession::new(vec![vm("vm-1", "web-01")]));
    completed(h.engine.tick().await);

    h.session.connected.store(false, Ordering::SeqCst);
    h.session.fail_connect.store(true, Ordering::SeqCst);
    h.session.set_now(t0() + secs(20));
    match h.engine.tick().await {
        TickOutcome::Failed(e) => assert_eq!(e.stage(), PollStage::Connecting),
        other => panic!("expected failure, got {other:?}"),
    }
    assert_eq!(h.engine.last_poll().await, Some(t0()));
    assert!(!h.engine.is_disabled());

    let health = h.health.health().await;
    assert_eq!(
        health.components[&components::poller("lab")].status,
        ComponentStatus::Degraded
    );

    h.session.fail_connect.store(false, Ordering::SeqCst);
    h.session.set_now(t0() + secs(40));
    let report = completed(h.engine.tick().await);

    assert_eq!(report.window_start, t0());
    assert_eq!(h.session.connects.load(Ordering::SeqCst), 3);
    assert!(h.session.connected.load(Ordering::SeqCst));
}

#[tokio::test]
async fn test_scheduler_ticks_until_shutdown() {
    let h = harness(FakeSession::new(vec![vm("vm-1", "web-01")]));
    let scheduler = PollSchedulerBuilder::new()
        .engine(h.engine.clone())
        .period(Duration::from_millis(20))
        .build()
        .unwrap();

    let (tx, rx) = broadcast::channel(1);
    let handle = tokio::spawn(scheduler.run(rx));

    tokio::time::sleep(Duration::from_millis(100)).await;
    tx.send(()).unwrap();
    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("scheduler did not stop")
        .unwrap();

    assert!(h.session.connects.load(Ordering::SeqCst) >= 1);
    assert!(!h.session.queries.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_scheduler_stops_disabled_endpoint() {
    let h = harness_with(
        FakeSession::new(vec![]),
        FakeRegistry::default(),
        BROKEN_CATALOG,
    );
    let scheduler = PollSchedulerBuilder::new()
        .engine(h.engine.clone())
        .period(Duration::from_millis(10))
        .build()
        .unwrap();

    let (_tx, rx) = broadcast::channel::<()>(1);
    tokio::time::timeout(Duration::from_secs(5), scheduler.run(rx))
        .await
        .expect("scheduler kept polling a disabled endpoint");

    assert!(h.engine.is_disabled());
}

#[tokio::test]
async fn test_missed_ticks_are_skipped() {
    let ticker = super::scheduler::endpoint_ticker(Duration::from_secs(20));
    assert_eq!(ticker.missed_tick_behavior(), MissedTickBehavior::Skip);
    assert_eq!(ticker.period(), Duration::from_secs(20));
}

#[test]
fn test_scheduler_builder_requires_engine() {
    assert!(PollSchedulerBuilder::new().build().is_err());
}

#[test]
fn test_engine_config_default() {
    let config = EngineConfig::default();
    assert_eq!(config.cadence, Duration::from_secs(20));
    assert_eq!(config.max_replay, Duration::from_secs(300));
}
