//! vSphere VI/JSON session
//!
//! Talks to the JSON binding of the vim25 API served under
//! `{uri}/sdk/vim25/{release}/`. Every managed object method maps to
//! `{type}/{id}/{method}`; the session token travels in the
//! `vmware-api-session-id` header.

use super::{
    EndpointSession, EntityMetric, ManagedObject, RawSeries, SampleInfo, SESSION_IDLE_LIMIT,
};
use crate::error::EndpointError;
use crate::models::{CounterInfo, ManagedObjectRef, MonitoredEntity, RollupType};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use url::Url;

const SESSION_HEADER: &str = "vmware-api-session-id";

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ServiceContent {
    root_folder: ManagedObjectRef,
    property_collector: ManagedObjectRef,
    view_manager: ManagedObjectRef,
    perf_manager: ManagedObjectRef,
    session_manager: ManagedObjectRef,
}

struct Session {
    token: String,
    content: ServiceContent,
    last_activity: Instant,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RetrieveResult {
    #[serde(default)]
    token: Option<String>,
    #[serde(default)]
    objects: Vec<ObjectContent>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ObjectContent {
    obj: ManagedObjectRef,
    #[serde(default)]
    prop_set: Vec<DynamicProperty>,
}

#[derive(Debug, Deserialize)]
struct DynamicProperty {
    name: String,
    val: Value,
}

#[derive(Debug, Deserialize)]
struct ElementKey {
    key: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireCounterInfo {
    key: i32,
    name_info: ElementKey,
    group_info: ElementKey,
    unit_info: ElementKey,
    rollup_type: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireEntityMetric {
    entity: ManagedObjectRef,
    #[serde(default)]
    sample_info: Vec<WireSampleInfo>,
    #[serde(default)]
    value: Vec<Value>,
}

#[derive(Debug, Deserialize)]
struct WireSampleInfo {
    timestamp: DateTime<Utc>,
    interval: i32,
}

#[derive(Debug, Deserialize)]
struct WireIntSeries {
    id: WireMetricId,
    #[serde(default)]
    value: Vec<i64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireMetricId {
    counter_id: i32,
    #[serde(default)]
    instance: String,
}

/// [`EndpointSession`] over the vSphere VI/JSON API
pub struct ViJsonSession {
    name: String,
    base: Url,
    username: String,
    password: String,
    http: reqwest::Client,
    session: RwLock<Option<Session>>,
}

impl ViJsonSession {
    /// Create a session for the entity. No request is made until `connect`.
    pub fn new(entity: &MonitoredEntity, timeout: Duration) -> Result<Self, EndpointError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .danger_accept_invalid_certs(entity.insecure_tls)
            .build()?;

        if entity.insecure_tls {
            warn!(
                endpoint = %entity.name,
                "TLS certificate verification disabled for endpoint"
            );
        }

        Self::with_client(entity, http)
    }

    /// Create a session that uses an existing HTTP client
    pub fn with_client(
        entity: &MonitoredEntity,
        http: reqwest::Client,
    ) -> Result<Self, EndpointError> {
        let mut root = entity.uri.clone();
        root.set_path("/");
        root.set_query(None);
        let base = root.join(&format!("sdk/vim25/{}/", entity.api_release))?;

        Ok(Self {
            name: entity.name.clone(),
            base,
            username: entity.username.clone(),
            password: entity.password.clone(),
            http,
            session: RwLock::new(None),
        })
    }

    /// Base URL of the vim25 API for this endpoint
    pub fn base_url(&self) -> &Url {
        &self.base
    }

    async fn send(
        &self,
        method: Method,
        path: &str,
        token: Option<&str>,
        body: Option<Value>,
        operation: &str,
    ) -> Result<reqwest::Response, EndpointError> {
        let mut request = self.http.request(method, self.base.join(path)?);
        if let Some(token) = token {
            request = request.header(SESSION_HEADER, token);
        }
        if let Some(body) = body {
            request = request.json(&body);
        }

        let response = request.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        Err(EndpointError::Status {
            operation: operation.to_string(),
            status: status.as_u16(),
            body,
        })
    }

    async fn active(&self) -> Result<(String, ServiceContent), EndpointError> {
        let session = self.session.read().await;
        session
            .as_ref()
            .map(|s| (s.token.clone(), s.content.clone()))
            .ok_or_else(|| EndpointError::NotConnected(self.name.clone()))
    }

    async fn touch(&self) {
        if let Some(session) = self.session.write().await.as_mut() {
            session.last_activity = Instant::now();
        }
    }

    /// Invoke a method on a managed object within the open session
    async fn invoke(
        &self,
        method: Method,
        object: &ManagedObjectRef,
        operation: &str,
        body: Option<Value>,
    ) -> Result<Value, EndpointError> {
        let (token, _) = self.active().await?;
        let path = format!("{}/{}/{}", object.object_type, object.value, operation);
        let response = self
            .send(method, &path, Some(&token), body, operation)
            .await?;
        self.touch().await;

        let text = response.text().await?;
        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&text)
            .map_err(|e| EndpointError::Protocol(format!("{}: {}", operation, e)))
    }

    async fn retrieve_names(
        &self,
        content: &ServiceContent,
        view: &ManagedObjectRef,
        object_type: &str,
    ) -> Result<Vec<ManagedObject>, EndpointError> {
        let body = json!({
            "specSet": [{
                "_typeName": "PropertyFilterSpec",
                "propSet": [{
                    "_typeName": "PropertySpec",
                    "type": object_type,
                    "pathSet": ["name"],
                }],
                "objectSet": [{
                    "_typeName": "ObjectSpec",
                    "obj": moref_json(view),
                    "skip": true,
                    "selectSet": [{
                        "_typeName": "TraversalSpec",
                        "name": "traverseEntities",
                        "type": "ContainerView",
                        "path": "view",
                        "skip": false,
                    }],
                }],
            }],
            "options": { "_typeName": "RetrieveOptions" },
        });

        let value = self
            .invoke(
                Method::POST,
                &content.property_collector,
                "RetrievePropertiesEx",
                Some(body),
            )
            .await?;
        let mut page: RetrieveResult = parse_or_default("RetrievePropertiesEx", value)?;
        let mut objects = Vec::new();

        loop {
            objects.extend(page.objects.into_iter().map(|oc| {
                let name = oc
                    .prop_set
                    .iter()
                    .find(|p| p.name == "name")
                    .and_then(|p| property_string(&p.val))
                    .unwrap_or_else(|| oc.obj.value.clone());
                ManagedObject {
                    reference: oc.obj,
                    name,
                }
            }));

            let Some(token) = page.token else {
                break;
            };
            let value = self
                .invoke(
                    Method::POST,
                    &content.property_collector,
                    "ContinueRetrievePropertiesEx",
                    Some(json!({ "token": token })),
                )
                .await?;
            page = parse_or_default("ContinueRetrievePropertiesEx", value)?;
        }

        Ok(objects)
    }
}

#[async_trait]
impl EndpointSession for ViJsonSession {
    async fn connect(&self) -> Result<(), EndpointError> {
        let response = self
            .send(
                Method::GET,
                "ServiceInstance/ServiceInstance/content",
                None,
                None,
                "RetrieveServiceContent",
            )
            .await?;
        let content: ServiceContent = response
            .json()
            .await
            .map_err(|e| EndpointError::Protocol(format!("service content: {}", e)))?;

        let login_path = format!(
            "{}/{}/Login",
            content.session_manager.object_type, content.session_manager.value
        );
        let credentials = json!({
            "userName": self.username,
            "password": self.password,
        });

        let response = match self
            .send(Method::POST, &login_path, None, Some(credentials), "Login")
            .await
        {
            Ok(response) => response,
            Err(EndpointError::Status { status, body, .. })
                if status == StatusCode::UNAUTHORIZED.as_u16()
                    || status == StatusCode::FORBIDDEN.as_u16()
                    || body.contains("InvalidLogin") =>
            {
                return Err(EndpointError::Authentication(self.name.clone()));
            }
            Err(e) => return Err(e),
        };

        let token = response
            .headers()
            .get(SESSION_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .ok_or_else(|| {
                EndpointError::Protocol(format!("Login response missing {} header", SESSION_HEADER))
            })?;

        *self.session.write().await = Some(Session {
            token,
            content,
            last_activity: Instant::now(),
        });

        info!(endpoint = %self.name, url = %self.base, "Connected to endpoint");
        Ok(())
    }

    async fn is_session_valid(&self) -> bool {
        self.session
            .read()
            .await
            .as_ref()
            .map(|s| s.last_activity.elapsed() < SESSION_IDLE_LIMIT)
            .unwrap_or(false)
    }

    async fn disconnect(&self) {
        let Some(session) = self.session.write().await.take() else {
            return;
        };

        let path = format!(
            "{}/{}/Logout",
            session.content.session_manager.object_type, session.content.session_manager.value
        );
        match self
            .send(Method::POST, &path, Some(&session.token), None, "Logout")
            .await
        {
            Ok(_) => debug!(endpoint = %self.name, "Logged out of endpoint"),
            Err(e) => debug!(endpoint = %self.name, error = %e, "Logout failed, session dropped"),
        }
    }

    async fn server_time(&self) -> Result<DateTime<Utc>, EndpointError> {
        let service_instance = ManagedObjectRef::new("ServiceInstance", "ServiceInstance");
        let value = self
            .invoke(Method::POST, &service_instance, "CurrentTime", None)
            .await?;
        serde_json::from_value(value)
            .map_err(|e| EndpointError::Protocol(format!("CurrentTime: {}", e)))
    }

    async fn enumerate_managed_objects(
        &self,
        object_type: &str,
    ) -> Result<Vec<ManagedObject>, EndpointError> {
        let (_, content) = self.active().await?;

        let body = json!({
            "container": moref_json(&content.root_folder),
            "type": [object_type],
            "recursive": true,
        });
        let value = self
            .invoke(
                Method::POST,
                &content.view_manager,
                "CreateContainerView",
                Some(body),
            )
            .await?;
        let view: ManagedObjectRef = serde_json::from_value(value)
            .map_err(|e| EndpointError::Protocol(format!("CreateContainerView: {}", e)))?;

        let result = self.retrieve_names(&content, &view, object_type).await;

        if let Err(e) = self.invoke(Method::POST, &view, "DestroyView", None).await {
            debug!(endpoint = %self.name, view = %view.value, error = %e, "Failed to destroy container view");
        }

        let objects = result?;
        debug!(
            endpoint = %self.name,
            object_type = %object_type,
            count = objects.len(),
            "Enumerated managed objects"
        );
        Ok(objects)
    }

    async fn list_all_counters(&self) -> Result<Vec<CounterInfo>, EndpointError> {
        let (_, content) = self.active().await?;
        let value = self
            .invoke(Method::GET, &content.perf_manager, "perfCounter", None)
            .await?;
        let wire: Vec<WireCounterInfo> = parse_or_default("perfCounter", value)?;

        let mut counters = Vec::with_capacity(wire.len());
        for info in wire {
            match info.rollup_type.parse::<RollupType>() {
                Ok(rollup) => counters.push(CounterInfo {
                    id: info.key,
                    group: info.group_info.key,
                    name: info.name_info.key,
                    rollup,
                    unit: info.unit_info.key,
                }),
                Err(e) => debug!(counter_id = info.key, error = %e, "Skipping counter"),
            }
        }

        Ok(counters)
    }

    async fn query_samples(
        &self,
        object: &ManagedObjectRef,
        counter_ids: &[i32],
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        interval_id: i32,
    ) -> Result<Vec<EntityMetric>, EndpointError> {
        let (_, content) = self.active().await?;

        let metric_ids: Vec<Value> = counter_ids
            .iter()
            .map(|id| {
                json!({
                    "_typeName": "PerfMetricId",
                    "counterId": id,
                    "instance": "*",
                })
            })
            .collect();
        let body = json!({
            "querySpec": [{
                "_typeName": "PerfQuerySpec",
                "entity": moref_json(object),
                "startTime": start.to_rfc3339_opts(SecondsFormat::Millis, true),
                "endTime": end.to_rfc3339_opts(SecondsFormat::Millis, true),
                "intervalId": interval_id,
                "format": "normal",
                "metricId": metric_ids,
            }],
        });

        let value = self
            .invoke(Method::POST, &content.perf_manager, "QueryPerf", Some(body))
            .await?;
        let results: Vec<Value> = parse_or_default("QueryPerf", value)?;

        results.into_iter().map(entity_metric_from).collect()
    }
}

fn moref_json(reference: &ManagedObjectRef) -> Value {
    json!({
        "_typeName": "ManagedObjectReference",
        "type": reference.object_type,
        "value": reference.value,
    })
}

fn type_name(value: &Value) -> Option<&str> {
    value.get("_typeName").and_then(Value::as_str)
}

/// Read a string property, bare or wrapped as `{"_typeName": "string", "_value": ...}`
fn property_string(value: &Value) -> Option<String> {
    value
        .as_str()
        .or_else(|| value.get("_value").and_then(Value::as_str))
        .map(str::to_string)
}

fn parse_or_default<T: DeserializeOwned + Default>(
    operation: &str,
    value: Value,
) -> Result<T, EndpointError> {
    if value.is_null() {
        return Ok(T::default());
    }
    serde_json::from_value(value).map_err(|e| EndpointError::Protocol(format!("{}: {}", operation, e)))
}

fn entity_metric_from(value: Value) -> Result<EntityMetric, EndpointError> {
    match type_name(&value) {
        Some("PerfEntityMetric") => {
            let wire: WireEntityMetric = serde_json::from_value(value)
                .map_err(|e| EndpointError::Protocol(format!("PerfEntityMetric: {}", e)))?;
            let samples = wire
                .sample_info
                .into_iter()
                .map(|s| SampleInfo {
                    timestamp: s.timestamp,
                    interval_secs: s.interval,
                })
                .collect();
            let series = wire
                .value
                .into_iter()
                .map(series_from)
                .collect::<Result<Vec<_>, _>>()?;

            Ok(EntityMetric::Sampled {
                entity: wire.entity,
                samples,
                series,
            })
        }
        other => Ok(EntityMetric::Unrecognized(
            other.unwrap_or("<untyped>").to_string(),
        )),
    }
}

fn series_from(value: Value) -> Result<RawSeries, EndpointError> {
    match type_name(&value) {
        Some("PerfMetricIntSeries") => {
            let wire: WireIntSeries = serde_json::from_value(value)
                .map_err(|e| EndpointError::Protocol(format!("PerfMetricIntSeries: {}", e)))?;
            Ok(RawSeries::Int {
                counter_id: wire.id.counter_id,
                instance: wire.id.instance,
                values: wire.value,
            })
        }
        other => Ok(RawSeries::Unrecognized(
            other.unwrap_or("<untyped>").to_string(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::{Matcher, Server, ServerGuard};

    const BASE: &str = "/sdk/vim25/8.0.1.0";

    fn entity(server: &ServerGuard) -> MonitoredEntity {
        serde_json::from_value(json!({
            "uri": format!("{}/sdk", server.url()),
            "username": "administrator@vsphere.local",
            "password": "secret",
            "name": "lab",
            "catalog": "catalog.json",
        }))
        .unwrap()
    }

    fn service_content() -> Value {
        let moref = |t: &str, v: &str| {
            json!({ "_typeName": "ManagedObjectReference", "type": t, "value": v })
        };
        json!({
            "_typeName": "ServiceContent",
            "rootFolder": moref("Folder", "group-d1"),
            "propertyCollector": moref("PropertyCollector", "propertyCollector"),
            "viewManager": moref("ViewManager", "ViewManager"),
            "perfManager": moref("PerformanceManager", "PerfMgr"),
            "sessionManager": moref("SessionManager", "SessionManager"),
        })
    }

    async fn connected(server: &mut ServerGuard) -> ViJsonSession {
        server
            .mock("GET", format!("{BASE}/ServiceInstance/ServiceInstance/content").as_str())
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(service_content().to_string())
            .create_async()
            .await;
        server
            .mock("POST", format!("{BASE}/SessionManager/SessionManager/Login").as_str())
            .match_body(Matcher::PartialJson(json!({
                "userName": "administrator@vsphere.local",
                "password": "secret",
            })))
            .with_status(200)
            .with_header(SESSION_HEADER, "token-1")
            .with_body("{}")
            .create_async()
            .await;

        let session = ViJsonSession::new(&entity(server), Duration::from_secs(5)).unwrap();
        session.connect().await.unwrap();
        session
    }

    #[test]
    fn test_base_url_drops_configured_path() {
        let entity: MonitoredEntity = serde_json::from_value(json!({
            "uri": "https://vcenter.local/sdk",
            "username": "u",
            "password": "p",
            "name": "vc",
            "catalog": "c.json",
            "api_release": "7.0.3.0",
        }))
        .unwrap();
        let session = ViJsonSession::new(&entity, Duration::from_secs(1)).unwrap();

        assert_eq!(
            session.base_url().as_str(),
            "https://vcenter.local/sdk/vim25/7.0.3.0/"
        );
    }

    #[tokio::test]
    async fn test_connect_establishes_session() {
        let mut server = Server::new_async().await;
        let session = connected(&mut server).await;

        assert!(session.is_session_valid().await);

        let logout = server
            .mock("POST", format!("{BASE}/SessionManager/SessionManager/Logout").as_str())
            .match_header(SESSION_HEADER, "token-1")
            .with_status(200)
            .create_async()
            .await;

        session.disconnect().await;
        assert!(!session.is_session_valid().await);
        logout.assert_async().await;
    }

    #[tokio::test]
    async fn test_login_rejected_is_authentication_error() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", format!("{BASE}/ServiceInstance/ServiceInstance/content").as_str())
            .with_status(200)
            .with_body(service_content().to_string())
            .create_async()
            .await;
        server
            .mock("POST", format!("{BASE}/SessionManager/SessionManager/Login").as_str())
            .with_status(400)
            .with_body(r#"{"_typeName":"InvalidLogin"}"#)
            .create_async()
            .await;

        let session = ViJsonSession::new(&entity(&server), Duration::from_secs(5)).unwrap();
        let err = session.connect().await.unwrap_err();

        assert!(matches!(err, EndpointError::Authentication(_)));
        assert!(!session.is_session_valid().await);
    }

    #[tokio::test]
    async fn test_calls_without_session_fail() {
        let server = Server::new_async().await;
        let session = ViJsonSession::new(&entity(&server), Duration::from_secs(5)).unwrap();

        let err = session.list_all_counters().await.unwrap_err();
        assert!(matches!(err, EndpointError::NotConnected(_)));
    }

    #[tokio::test]
    async fn test_server_time() {
        let mut server = Server::new_async().await;
        let session = connected(&mut server).await;

        server
            .mock("POST", format!("{BASE}/ServiceInstance/ServiceInstance/CurrentTime").as_str())
            .match_header(SESSION_HEADER, "token-1")
            .with_status(200)
            .with_body(r#""2024-03-01T12:00:20.123Z""#)
            .create_async()
            .await;

        let now = session.server_time().await.unwrap();
        assert_eq!(now.to_rfc3339_opts(SecondsFormat::Millis, true), "2024-03-01T12:00:20.123Z");
    }

    #[tokio::test]
    async fn test_list_all_counters() {
        let mut server = Server::new_async().await;
        let session = connected(&mut server).await;

        let body = json!([
            {
                "_typeName": "PerfCounterInfo",
                "key": 2,
                "nameInfo": { "key": "usage" },
                "groupInfo": { "key": "cpu" },
                "unitInfo": { "key": "percent" },
                "rollupType": "average",
                "statsType": "rate"
            },
            {
                "_typeName": "PerfCounterInfo",
                "key": 98,
                "nameInfo": { "key": "consumed" },
                "groupInfo": { "key": "mem" },
                "unitInfo": { "key": "kiloBytes" },
                "rollupType": "maximum"
            }
        ]);
        server
            .mock("GET", format!("{BASE}/PerformanceManager/PerfMgr/perfCounter").as_str())
            .with_status(200)
            .with_body(body.to_string())
            .create_async()
            .await;

        let counters = session.list_all_counters().await.unwrap();
        assert_eq!(counters.len(), 2);
        assert_eq!(counters[0].full_name(), "cpu.usage.AVERAGE");
        assert_eq!(counters[1].id, 98);
        assert_eq!(counters[1].unit, "kiloBytes");
        assert_eq!(counters[1].rollup, RollupType::Maximum);
    }

    #[tokio::test]
    async fn test_enumerate_follows_continuation_and_destroys_view() {
        let mut server = Server::new_async().await;
        let session = connected(&mut server).await;

        server
            .mock("POST", format!("{BASE}/ViewManager/ViewManager/CreateContainerView").as_str())
            .match_body(Matcher::PartialJson(json!({
                "type": ["VirtualMachine"],
                "recursive": true,
            })))
            .with_status(200)
            .with_body(
                json!({ "_typeName": "ManagedObjectReference", "type": "ContainerView", "value": "view-vm-1" })
                    .to_string(),
            )
            .create_async()
            .await;

        let first_page = json!({
            "_typeName": "RetrieveResult",
            "token": "page-2",
            "objects": [{
                "_typeName": "ObjectContent",
                "obj": { "_typeName": "ManagedObjectReference", "type": "VirtualMachine", "value": "vm-1" },
                "propSet": [{ "_typeName": "DynamicProperty", "name": "name", "val": { "_typeName": "string", "_value": "web-01" } }]
            }]
        });
        let second_page = json!({
            "_typeName": "RetrieveResult",
            "objects": [{
                "_typeName": "ObjectContent",
                "obj": { "_typeName": "ManagedObjectReference", "type": "VirtualMachine", "value": "vm-2" },
                "propSet": [{ "_typeName": "DynamicProperty", "name": "name", "val": { "_typeName": "string", "_value": "db-01" } }]
            }]
        });
        server
            .mock("POST", format!("{BASE}/PropertyCollector/propertyCollector/RetrievePropertiesEx").as_str())
            .with_status(200)
            .with_body(first_page.to_string())
            .create_async()
            .await;
        server
            .mock("POST", format!("{BASE}/PropertyCollector/propertyCollector/ContinueRetrievePropertiesEx").as_str())
            .match_body(Matcher::PartialJson(json!({ "token": "page-2" })))
            .with_status(200)
            .with_body(second_page.to_string())
            .create_async()
            .await;
        let destroy = server
            .mock("POST", format!("{BASE}/ContainerView/view-vm-1/DestroyView").as_str())
            .with_status(200)
            .expect(1)
            .create_async()
            .await;

        let objects = session.enumerate_managed_objects("VirtualMachine").await.unwrap();

        assert_eq!(objects.len(), 2);
        assert_eq!(objects[0].name, "web-01");
        assert_eq!(objects[1].reference, ManagedObjectRef::new("VirtualMachine", "vm-2"));
        destroy.assert_async().await;
    }

    #[tokio::test]
    async fn test_query_samples_parses_variants() {
        let mut server = Server::new_async().await;
        let session = connected(&mut server).await;

        let body = json!([
            {
                "_typeName": "PerfEntityMetric",
                "entity": { "_typeName": "ManagedObjectReference", "type": "VirtualMachine", "value": "vm-1" },
                "sampleInfo": [
                    { "_typeName": "PerfSampleInfo", "timestamp": "2024-03-01T12:00:00Z", "interval": 20 },
                    { "_typeName": "PerfSampleInfo", "timestamp": "2024-03-01T12:00:20Z", "interval": 20 }
                ],
                "value": [
                    {
                        "_typeName": "PerfMetricIntSeries",
                        "id": { "_typeName": "PerfMetricId", "counterId": 2, "instance": "" },
                        "value": [550, 600]
                    },
                    {
                        "_typeName": "PerfMetricSeriesCSV",
                        "id": { "_typeName": "PerfMetricId", "counterId": 3, "instance": "" },
                        "value": "1,2"
                    }
                ]
            },
            { "_typeName": "PerfEntityMetricCSV" }
        ]);
        let query = server
            .mock("POST", format!("{BASE}/PerformanceManager/PerfMgr/QueryPerf").as_str())
            .match_body(Matcher::PartialJson(json!({
                "querySpec": [{
                    "intervalId": 20,
                    "format": "normal",
                    "metricId": [{ "counterId": 2, "instance": "*" }],
                }]
            })))
            .with_status(200)
            .with_body(body.to_string())
            .create_async()
            .await;

        let end = Utc::now();
        let start = end - chrono::TimeDelta::seconds(20);
        let results = session
            .query_samples(&ManagedObjectRef::new("VirtualMachine", "vm-1"), &[2], start, end, 20)
            .await
            .unwrap();

        query.assert_async().await;
        assert_eq!(results.len(), 2);
        match &results[0] {
            EntityMetric::Sampled { entity, samples, series } => {
                assert_eq!(entity.value, "vm-1");
                assert_eq!(samples.len(), 2);
                assert_eq!(
                    series[0],
                    RawSeries::Int { counter_id: 2, instance: String::new(), values: vec![550, 600] }
                );
                assert_eq!(series[1], RawSeries::Unrecognized("PerfMetricSeriesCSV".to_string()));
            }
            other => panic!("unexpected result: {other:?}"),
        }
        assert_eq!(results[1], EntityMetric::Unrecognized("PerfEntityMetricCSV".to_string()));
    }

    #[tokio::test]
    async fn test_query_samples_empty_response() {
        let mut server = Server::new_async().await;
        let session = connected(&mut server).await;

        server
            .mock("POST", format!("{BASE}/PerformanceManager/PerfMgr/QueryPerf").as_str())
            .with_status(200)
            .with_body("")
            .create_async()
            .await;

        let end = Utc::now();
        let results = session
            .query_samples(&ManagedObjectRef::new("HostSystem", "host-9"), &[2], end, end, 20)
            .await
            .unwrap();
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn test_server_error_maps_to_status() {
        let mut server = Server::new_async().await;
        let session = connected(&mut server).await;

        server
            .mock("GET", format!("{BASE}/PerformanceManager/PerfMgr/perfCounter").as_str())
            .with_status(503)
            .with_body("unavailable")
            .create_async()
            .await;

        match session.list_all_counters().await.unwrap_err() {
            EndpointError::Status { status, operation, .. } => {
                assert_eq!(status, 503);
                assert_eq!(operation, "perfCounter");
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
