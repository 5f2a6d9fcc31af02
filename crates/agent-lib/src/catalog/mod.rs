//! Operator-supplied counter catalog
//!
//! A catalog maps managed object types to the performance counters collected
//! for them, and each counter to a metric definition in the ingestion
//! backend. A catalog whose counters reference undefined metrics never
//! drives collection.


use crate::error::CatalogError;
use crate::models::MetricDefinition;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use tracing::{debug, error};

/// Metrics collected for one object type, keyed by counter full name
pub type TypeMetrics = HashMap<String, MetricDefinition>;

/// A counter to collect and the metric it feeds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CounterRef {
    /// Counter full name, e.g. `cpu.usage.AVERAGE`
    pub name: String,
    /// Metric identifier in `definitions`
    pub metric: String,
}

/// Counters collected for one managed object type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogEntry {
    #[serde(rename = "type")]
    pub object_type: String,
    #[serde(default)]
    pub counters: Vec<CounterRef>,
}

/// Where a catalog is read from
#[derive(Debug, Clone)]
pub enum CatalogSource {
    Path(PathBuf),
    Json(String),
}

impl From<&Path> for CatalogSource {
    fn from(path: &Path) -> Self {
        CatalogSource::Path(path.to_path_buf())
    }
}

impl From<PathBuf> for CatalogSource {
    fn from(path: PathBuf) -> Self {
        CatalogSource::Path(path)
    }
}

/// Counter catalog document. Both collections are required.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Catalog {
    definitions: Vec<MetricDefinition>,
    catalog: Vec<CatalogEntry>,
}

impl Catalog {
    pub fn new(definitions: Vec<MetricDefinition>, entries: Vec<CatalogEntry>) -> Self {
        Self {
            definitions,
            catalog: entries,
        }
    }

    /// Load a catalog from a file or an inline JSON document
    pub async fn load(source: impl Into<CatalogSource>) -> Result<Self, CatalogError> {
        match source.into() {
            CatalogSource::Path(path) => {
                let raw = tokio::fs::read_to_string(&path)
                    .await
                    .map_err(|source| CatalogError::Load {
                        path: path.clone(),
                        source,
                    })?;
                let catalog = Self::from_json(&raw)?;
                debug!(
                    path = %path.display(),
                    entries = catalog.catalog.len(),
                    definitions = catalog.definitions.len(),
                    "Loaded counter catalog"
                );
                Ok(catalog)
            }
            CatalogSource::Json(raw) => Self::from_json(&raw),
        }
    }

    /// Parse a catalog from a JSON document
    pub fn from_json(raw: &str) -> Result<Self, CatalogError> {
        Ok(serde_json::from_str(raw)?)
    }

    pub fn definitions(&self) -> &[MetricDefinition] {
        &self.definitions
    }

    pub fn entries(&self) -> &[CatalogEntry] {
        &self.catalog
    }

    /// Look up a metric definition by metric identifier
    pub fn definition(&self, metric: &str) -> Option<&MetricDefinition> {
        self.definitions.iter().find(|d| d.metric == metric)
    }

    /// Every counter reference that names an undefined metric
    pub fn unresolved_references(&self) -> Vec<CatalogError> {
        let defined: HashSet<&str> = self.definitions.iter().map(|d| d.metric.as_str()).collect();

        self.catalog
            .iter()
            .flat_map(|entry| {
                entry
                    .counters
                    .iter()
                    .filter(|counter| !defined.contains(counter.metric.as_str()))
                    .map(move |counter| CatalogError::UnknownMetricReference {
                        object_type: entry.object_type.clone(),
                        counter: counter.name.clone(),
                        metric: counter.metric.clone(),
                    })
            })
            .collect()
    }

    /// Defined metrics that no counter reference points at
    pub fn unused_definitions(&self) -> Vec<&str> {
        let referenced: HashSet<&str> = self
            .catalog
            .iter()
            .flat_map(|entry| entry.counters.iter().map(|c| c.metric.as_str()))
            .collect();

        self.definitions
            .iter()
            .map(|d| d.metric.as_str())
            .filter(|metric| !referenced.contains(metric))
            .collect()
    }

    /// Check referential integrity across every entry.
    ///
    /// Strict mode logs each problem at error level.
    pub fn validate(&self, strict: bool) -> bool {
        let problems = self.unresolved_references();

        for problem in &problems {
            if strict {
                error!(error = %problem, "Invalid catalog reference");
            } else {
                debug!(error = %problem, "Invalid catalog reference");
            }
        }

        problems.is_empty()
    }

    /// Metrics to collect per object type, keyed by counter full name
    pub fn metrics_by_type(&self) -> Result<HashMap<String, TypeMetrics>, CatalogError> {
        if let Some(problem) = self.unresolved_references().into_iter().next() {
            return Err(problem);
        }

        let mut by_type: HashMap<String, TypeMetrics> = HashMap::new();
        for entry in &self.catalog {
            let metrics = by_type.entry(entry.object_type.clone()).or_default();
            for counter in &entry.counters {
                if let Some(definition) = self.definition(&counter.metric) {
                    metrics.insert(counter.name.clone(), definition.clone());
                }
            }
        }

        Ok(by_type)
    }
}
