//! Error taxonomy for the collection pipeline
//!
//! Each collaborator boundary has its own error type. `PollError` wraps them
//! and records the stage of the poll cycle that failed, which decides whether
//! the failure is transient (retried next tick) or fatal to the endpoint.

use std::path::PathBuf;

/// Errors raised while loading or checking a counter catalog.
#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    /// The catalog file could not be read.
    #[error("failed to read catalog {path}: {source}")]
    Load {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The catalog document is not valid JSON or has the wrong shape.
    #[error("malformed catalog: {0}")]
    Parse(#[from] serde_json::Error),

    /// A counter reference names a metric with no definition in the catalog.
    #[error("counter {counter} on {object_type} references undefined metric {metric}")]
    UnknownMetricReference {
        object_type: String,
        counter: String,
        metric: String,
    },

    /// `validate` reported the catalog as inconsistent.
    #[error("catalog {0} failed validation")]
    Invalid(String),
}

/// Errors from the virtualization endpoint session.
#[derive(Debug, thiserror::Error)]
pub enum EndpointError {
    #[error("endpoint transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("endpoint returned HTTP {status} for {operation}: {body}")]
    Status {
        operation: String,
        status: u16,
        body: String,
    },

    #[error("endpoint rejected credentials for {0}")]
    Authentication(String),

    #[error("no active session with {0}")]
    NotConnected(String),

    #[error("unexpected endpoint response: {0}")]
    Protocol(String),

    #[error("invalid endpoint url: {0}")]
    Url(#[from] url::ParseError),
}

/// Errors from the source registry backend.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    /// The name is already registered; callers fall back to lookup-by-name.
    #[error("source {0} already exists")]
    Conflict(String),

    /// Lookup-by-name matched more than one record.
    #[error("source name {name} is ambiguous: {count} matches")]
    Ambiguous { name: String, count: usize },

    #[error("registry transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("registry returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("unexpected registry response: {0}")]
    InvalidResponse(String),
}

/// A source name could not be mapped to a backend source identifier.
#[derive(Debug, thiserror::Error)]
pub enum SourceResolutionError {
    #[error("registry error resolving {name}: {source}")]
    Registry {
        name: String,
        #[source]
        source: RegistryError,
    },

    #[error("registry has no record for {0} after create")]
    Missing(String),
}

/// Errors from the ingestion backend.
#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("ingestion transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("ingestion returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("invalid ingestion url: {0}")]
    Url(#[from] url::ParseError),
}

/// A measurement failed construction-time validation.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum InvalidMeasurement {
    #[error("measurement metric name is empty")]
    EmptyMetric,

    #[error("measurement source id {0} is negative")]
    NegativeSource(i64),

    #[error("measurement value for {0} is not a finite number")]
    NonFiniteValue(String),
}

/// Stage of the poll cycle, used to label failures. Transforming samples
/// cannot fail, so it has no stage here.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollStage {
    Connecting,
    RefreshingMetadata,
    Enumerating,
    Querying,
    Submitting,
}

impl PollStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            PollStage::Connecting => "connecting",
            PollStage::RefreshingMetadata => "refreshing_metadata",
            PollStage::Enumerating => "enumerating",
            PollStage::Querying => "querying",
            PollStage::Submitting => "submitting",
        }
    }
}

impl std::fmt::Display for PollStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failure of a single poll cycle.
#[derive(Debug, thiserror::Error)]
pub enum PollError {
    /// The catalog is unusable. Fatal to the endpoint.
    #[error("catalog error: {0}")]
    Catalog(#[from] CatalogError),

    /// A call to the endpoint failed. Transient.
    #[error("{stage} failed: {source}")]
    Endpoint {
        stage: PollStage,
        #[source]
        source: EndpointError,
    },
}

impl PollError {
    pub fn endpoint(stage: PollStage, source: EndpointError) -> Self {
        PollError::Endpoint { stage, source }
    }

    /// Returns true if this failure should permanently stop polling the endpoint.
    pub fn is_fatal(&self) -> bool {
        matches!(self, PollError::Catalog(_))
    }

    pub fn stage(&self) -> PollStage {
        match self {
            PollError::Catalog(_) => PollStage::RefreshingMetadata,
            PollError::Endpoint { stage, .. } => *stage,
        }
    }
}
