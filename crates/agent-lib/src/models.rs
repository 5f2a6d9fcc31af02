//! Core data models for the collector

use crate::error::InvalidMeasurement;
use chrono::{DateTime, DurationRound, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use url::Url;

/// Aggregation semantic of a performance counter over its sampling interval
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RollupType {
    Average,
    Minimum,
    Maximum,
    Summation,
    Latest,
    None,
}

impl RollupType {
    /// Upper-case form used in counter full names
    pub fn as_upper(&self) -> &'static str {
        match self {
            RollupType::Average => "AVERAGE",
            RollupType::Minimum => "MINIMUM",
            RollupType::Maximum => "MAXIMUM",
            RollupType::Summation => "SUMMATION",
            RollupType::Latest => "LATEST",
            RollupType::None => "NONE",
        }
    }
}

impl std::fmt::Display for RollupType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_upper())
    }
}

impl std::str::FromStr for RollupType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "average" => Ok(RollupType::Average),
            "minimum" => Ok(RollupType::Minimum),
            "maximum" => Ok(RollupType::Maximum),
            "summation" => Ok(RollupType::Summation),
            "latest" => Ok(RollupType::Latest),
            "none" => Ok(RollupType::None),
            other => Err(format!("unknown rollup type: {}", other)),
        }
    }
}

/// A performance counter as known to the endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CounterInfo {
    /// Runtime-assigned id, not stable across server versions or restarts
    pub id: i32,
    pub group: String,
    pub name: String,
    pub rollup: RollupType,
    /// Unit key reported by the endpoint (e.g. `kiloBytes`, `percent`, `number`)
    pub unit: String,
}

impl CounterInfo {
    /// Stable cross-run join key, e.g. `cpu.usage.AVERAGE`
    pub fn full_name(&self) -> String {
        crate::counters::full_name(&self.group, &self.name, self.rollup.as_upper())
    }
}

/// Unit of a metric in the ingestion backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricUnit {
    Percent,
    #[default]
    Number,
    Bytecount,
    Duration,
}

impl MetricUnit {
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricUnit::Percent => "percent",
            MetricUnit::Number => "number",
            MetricUnit::Bytecount => "bytecount",
            MetricUnit::Duration => "duration",
        }
    }
}

impl std::fmt::Display for MetricUnit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Default graphing aggregate of a metric in the ingestion backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricAggregate {
    #[default]
    Avg,
    Max,
    Min,
    Sum,
}

/// Definition of a metric in the ingestion backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricDefinition {
    /// Metric identifier, globally unique in the backend
    pub metric: String,
    #[serde(default)]
    pub display_name: String,
    /// Terse name, ideally under 15 characters
    #[serde(default)]
    pub display_name_short: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub unit: MetricUnit,
    #[serde(default)]
    pub default_aggregate: MetricAggregate,
    #[serde(rename = "defaultResolutionMS", default)]
    pub default_resolution_ms: u64,
    #[serde(rename = "isDisabled", default)]
    pub is_disabled: bool,
}

/// Opaque reference to a managed object on the endpoint
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ManagedObjectRef {
    /// Object type, e.g. `VirtualMachine`
    #[serde(rename = "type")]
    pub object_type: String,
    /// Endpoint-assigned identifier, e.g. `vm-42`
    pub value: String,
}

impl ManagedObjectRef {
    pub fn new(object_type: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            object_type: object_type.into(),
            value: value.into(),
        }
    }
}

/// Identity of a source registered in the ingestion backend
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceMetadata {
    /// Registry record id
    pub id: String,
    pub name: String,
    /// Numeric identifier used to tag measurements
    #[serde(rename = "obs_domain_id")]
    pub source_id: i64,
    #[serde(rename = "orgId", default)]
    pub org_id: String,
}

/// A normalized data point ready for ingestion
#[derive(Debug, Clone, PartialEq)]
pub struct Measurement {
    source_id: i64,
    metric: String,
    value: f64,
    timestamp: DateTime<Utc>,
}

impl Measurement {
    /// Create a validated measurement. The timestamp is truncated to milliseconds.
    pub fn new(
        source_id: i64,
        metric: impl Into<String>,
        value: f64,
        timestamp: DateTime<Utc>,
    ) -> Result<Self, InvalidMeasurement> {
        let metric = metric.into();
        if metric.is_empty() {
            return Err(InvalidMeasurement::EmptyMetric);
        }
        if source_id < 0 {
            return Err(InvalidMeasurement::NegativeSource(source_id));
        }
        if !value.is_finite() {
            return Err(InvalidMeasurement::NonFiniteValue(metric));
        }

        let timestamp = timestamp
            .duration_trunc(TimeDelta::milliseconds(1))
            .unwrap_or(timestamp);

        Ok(Self {
            source_id,
            metric,
            value,
            timestamp,
        })
    }

    pub fn source_id(&self) -> i64 {
        self.source_id
    }

    pub fn metric(&self) -> &str {
        &self.metric
    }

    pub fn value(&self) -> f64 {
        self.value
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
}

/// A virtualization endpoint to poll, loaded once from configuration
#[derive(Clone, Deserialize)]
pub struct MonitoredEntity {
    /// Endpoint URI, e.g. `https://vcenter.example.com`
    pub uri: Url,
    pub username: String,
    pub password: String,
    /// Display name, used as the prefix of every source name
    pub name: String,
    /// Path to the counter catalog for this endpoint
    pub catalog: PathBuf,
    /// vim25 API release used in request paths
    #[serde(default = "default_api_release")]
    pub api_release: String,
    /// Skip TLS certificate verification (lab endpoints with self-signed certs)
    #[serde(default)]
    pub insecure_tls: bool,
}

fn default_api_release() -> String {
    "8.0.1.0".to_string()
}

impl std::fmt::Debug for MonitoredEntity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MonitoredEntity")
            .field("uri", &self.uri.as_str())
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("name", &self.name)
            .field("catalog", &self.catalog)
            .field("api_release", &self.api_release)
            .field("insecure_tls", &self.insecure_tls)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_measurement_truncates_to_millis() {
        let ts = Utc.timestamp_opt(1_700_000_000, 123_456_789).unwrap();
        let m = Measurement::new(7, "SYSTEM_CPU", 0.5, ts).unwrap();

        assert_eq!(m.timestamp().timestamp_subsec_nanos(), 123_000_000);
        assert_eq!(m.source_id(), 7);
        assert_eq!(m.metric(), "SYSTEM_CPU");
    }

    #[test]
    fn test_measurement_rejects_missing_fields() {
        let ts = Utc::now();

        assert_eq!(
            Measurement::new(1, "", 1.0, ts),
            Err(InvalidMeasurement::EmptyMetric)
        );
        assert_eq!(
            Measurement::new(-1, "M", 1.0, ts),
            Err(InvalidMeasurement::NegativeSource(-1))
        );
        assert!(matches!(
            Measurement::new(1, "M", f64::NAN, ts),
            Err(InvalidMeasurement::NonFiniteValue(_))
        ));
    }

    #[test]
    fn test_metric_definition_wire_names() {
        let json = r#"{
            "metric": "SYSTEM_CPU_USAGE_AVERAGE",
            "displayName": "CPU Average Utilization",
            "displayNameShort": "cpu-avg",
            "description": "Average CPU utilization",
            "unit": "percent",
            "defaultAggregate": "avg",
            "defaultResolutionMS": 20000,
            "isDisabled": false
        }"#;

        let def: MetricDefinition = serde_json::from_str(json).unwrap();
        assert_eq!(def.unit, MetricUnit::Percent);
        assert_eq!(def.default_resolution_ms, 20000);

        let back = serde_json::to_value(&def).unwrap();
        assert_eq!(back["defaultResolutionMS"], 20000);
        assert_eq!(back["isDisabled"], false);
    }

    #[test]
    fn test_monitored_entity_debug_redacts_password() {
        let entity: MonitoredEntity = serde_json::from_value(serde_json::json!({
            "uri": "https://vcenter.local",
            "username": "admin",
            "password": "hunter2",
            "name": "lab",
            "catalog": "catalogs/default-catalog.json"
        }))
        .unwrap();

        let debug = format!("{:?}", entity);
        assert!(!debug.contains("hunter2"));
        assert_eq!(entity.api_release, "8.0.1.0");
    }
}
