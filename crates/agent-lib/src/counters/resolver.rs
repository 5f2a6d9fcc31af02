//! Join of the catalog with the endpoint's live counter table

use super::naming::ingestion_unit_for;
use crate::catalog::{Catalog, TypeMetrics};
use crate::endpoint::EndpointSession;
use crate::error::{CatalogError, EndpointError};
use crate::models::{CounterInfo, MetricDefinition, MetricUnit};
use std::collections::HashMap;
use tracing::{debug, info, warn};

/// Fetch the endpoint's full counter table.
///
/// Counter ids are assigned at runtime by the endpoint, so the table is
/// fetched once per endpoint and cached by the caller.
pub async fn fetch_all(session: &dyn EndpointSession) -> Result<Vec<CounterInfo>, EndpointError> {
    let counters = session.list_all_counters().await?;
    debug!(count = counters.len(), "Fetched counter table");
    Ok(counters)
}

/// Counter metadata resolved for one endpoint
#[derive(Debug, Clone, Default)]
pub struct ResolvedMetadata {
    ids_by_name: HashMap<String, i32>,
    counters_by_id: HashMap<i32, CounterInfo>,
    metrics_by_type: HashMap<String, TypeMetrics>,
}

impl ResolvedMetadata {
    /// Intersect the catalog with the live counter table.
    ///
    /// Catalog counters the endpoint does not offer are logged and skipped.
    /// Object types left without counters are dropped.
    pub fn build(catalog: &Catalog, counters: Vec<CounterInfo>) -> Result<Self, CatalogError> {
        let wanted = catalog.metrics_by_type()?;

        let mut ids_by_name = HashMap::with_capacity(counters.len());
        let mut counters_by_id = HashMap::with_capacity(counters.len());
        for counter in counters {
            ids_by_name.insert(counter.full_name(), counter.id);
            counters_by_id.insert(counter.id, counter);
        }

        let mut metrics_by_type = HashMap::new();
        for (object_type, metrics) in wanted {
            let resolved: TypeMetrics = metrics
                .into_iter()
                .filter(|(full_name, _)| {
                    let present = ids_by_name.contains_key(full_name);
                    if !present {
                        warn!(
                            object_type = %object_type,
                            counter = %full_name,
                            "Endpoint does not offer counter, skipping"
                        );
                    }
                    present
                })
                .collect();

            if resolved.is_empty() {
                warn!(object_type = %object_type, "No counters resolved for object type");
                continue;
            }
            metrics_by_type.insert(object_type, resolved);
        }

        info!(
            counters = counters_by_id.len(),
            object_types = metrics_by_type.len(),
            "Resolved counter metadata"
        );

        Ok(Self {
            ids_by_name,
            counters_by_id,
            metrics_by_type,
        })
    }

    /// Runtime id of a counter full name
    pub fn id_for(&self, full_name: &str) -> Option<i32> {
        self.ids_by_name.get(full_name).copied()
    }

    pub fn counter(&self, id: i32) -> Option<&CounterInfo> {
        self.counters_by_id.get(&id)
    }

    /// Object types with at least one resolved counter, sorted
    pub fn object_types(&self) -> Vec<&str> {
        let mut types: Vec<&str> = self.metrics_by_type.keys().map(String::as_str).collect();
        types.sort_unstable();
        types
    }

    pub fn metrics_for(&self, object_type: &str) -> Option<&TypeMetrics> {
        self.metrics_by_type.get(object_type)
    }

    /// Counter ids to query for an object type, sorted
    pub fn counter_ids_for(&self, object_type: &str) -> Vec<i32> {
        let mut ids: Vec<i32> = self
            .metrics_by_type
            .get(object_type)
            .map(|metrics| metrics.keys().filter_map(|name| self.id_for(name)).collect())
            .unwrap_or_default();
        ids.sort_unstable();
        ids
    }

    /// Counter and target metric for a series of an object type
    pub fn resolve_series(
        &self,
        object_type: &str,
        counter_id: i32,
    ) -> Option<(&CounterInfo, &MetricDefinition)> {
        let counter = self.counters_by_id.get(&counter_id)?;
        let definition = self
            .metrics_by_type
            .get(object_type)?
            .get(&counter.full_name())?;
        Some((counter, definition))
    }

    /// Each resolved metric once, with the unit implied by its counter.
    ///
    /// A counter reported in `kiloBytes` or `percent` overrides the catalog
    /// unit since values are normalized to bytes and fractions.
    pub fn declarations(&self) -> Vec<MetricDefinition> {
        let mut by_metric: HashMap<&str, MetricDefinition> = HashMap::new();

        for metrics in self.metrics_by_type.values() {
            for (full_name, definition) in metrics {
                if by_metric.contains_key(definition.metric.as_str()) {
                    continue;
                }
                let mut declared = definition.clone();
                if let Some(counter) = self.id_for(full_name).and_then(|id| self.counter(id)) {
                    let unit = ingestion_unit_for(&counter.unit);
                    if unit != MetricUnit::Number {
                        declared.unit = unit;
                    }
                }
                by_metric.insert(definition.metric.as_str(), declared);
            }
        }

        let mut declarations: Vec<MetricDefinition> = by_metric.into_values().collect();
        declarations.sort_by(|a, b| a.metric.cmp(&b.metric));
        declarations
    }
}
