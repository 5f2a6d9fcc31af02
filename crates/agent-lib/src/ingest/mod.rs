//! Measurement ingestion
//!
//! Measurements are posted in bulk as
//! `[[source_id, metric, value, timestamp_ms], ...]`. Metric definitions are
//! created or updated with a `PUT` per metric.

use crate::error::IngestError;
use crate::http::{api_base, basic_auth_parts};
use crate::models::{Measurement, MetricDefinition};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::debug;
use url::Url;

/// Backend that receives measurements
#[async_trait]
pub trait IngestionClient: Send + Sync {
    /// Submit a batch in a single call
    async fn submit_measurements(&self, batch: &[Measurement]) -> Result<(), IngestError>;

    /// Create or update a metric definition
    async fn declare_metric(&self, definition: &MetricDefinition) -> Result<(), IngestError>;
}

/// Bulk wire form of a measurement
pub fn bulk_entry(measurement: &Measurement) -> Value {
    json!([
        measurement.source_id().to_string(),
        measurement.metric(),
        measurement.value(),
        measurement.timestamp().timestamp_millis(),
    ])
}

/// [`IngestionClient`] backed by the metrics REST API
#[derive(Clone)]
pub struct HttpIngestionClient {
    base: Url,
    api_key: String,
    http: reqwest::Client,
}

impl HttpIngestionClient {
    pub fn new(base: Url, api_key: impl Into<String>, timeout: Duration) -> Result<Self, IngestError> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self::with_client(base, api_key, http))
    }

    pub fn with_client(base: Url, api_key: impl Into<String>, http: reqwest::Client) -> Self {
        Self {
            base: api_base(base),
            api_key: api_key.into(),
            http,
        }
    }

    fn url(&self, path: &str) -> Result<Url, IngestError> {
        Ok(self.base.join(path)?)
    }

    async fn check(response: reqwest::Response) -> Result<(), IngestError> {
        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let body = response.text().await.unwrap_or_default();
        Err(IngestError::Status {
            status: status.as_u16(),
            body,
        })
    }
}

#[async_trait]
impl IngestionClient for HttpIngestionClient {
    async fn submit_measurements(&self, batch: &[Measurement]) -> Result<(), IngestError> {
        let payload: Vec<Value> = batch.iter().map(bulk_entry).collect();
        let (user, password) = basic_auth_parts(&self.api_key);

        let response = self
            .http
            .post(self.url("v1/measurements")?)
            .basic_auth(user, Some(password))
            .json(&payload)
            .send()
            .await?;

        Self::check(response).await?;
        debug!(count = batch.len(), "Submitted measurements");
        Ok(())
    }

    async fn declare_metric(&self, definition: &MetricDefinition) -> Result<(), IngestError> {
        let (user, password) = basic_auth_parts(&self.api_key);

        let response = self
            .http
            .put(self.url(&format!("v1/metrics/{}", definition.metric))?)
            .basic_auth(user, Some(password))
            .json(definition)
            .send()
            .await?;

        Self::check(response).await?;
        debug!(metric = %definition.metric, "Declared metric");
        Ok(())
    }
}
