//! Source identities in the ingestion backend
//!
//! Each managed object is reported under a named source. The cache maps
//! `(org, name)` to the backend's numeric source id, creating the source on
//! first use. Entries never expire.

mod registry;

pub use registry::HttpSourceRegistry;

use crate::error::{RegistryError, SourceResolutionError};
use crate::models::SourceMetadata;
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{debug, info};

/// Backend that owns source records
#[async_trait]
pub trait SourceRegistry: Send + Sync {
    /// Create a source and return its registry record id.
    ///
    /// Returns `RegistryError::Conflict` if the name is already taken.
    async fn create_source(&self, org: &str, name: &str) -> Result<String, RegistryError>;

    async fn get_source_by_id(
        &self,
        org: &str,
        id: &str,
    ) -> Result<Option<SourceMetadata>, RegistryError>;

    /// Look a source up by name. More than one match is `RegistryError::Ambiguous`.
    async fn get_source_by_name(
        &self,
        org: &str,
        name: &str,
    ) -> Result<Option<SourceMetadata>, RegistryError>;
}

type CacheKey = (String, String);

/// Create-on-first-use cache of source identities
///
/// Concurrent resolution of one key is serialized on that key's cell so the
/// registry sees exactly one create. Distinct keys never wait on each other.
pub struct SourceIdentityCache {
    registry: Arc<dyn SourceRegistry>,
    entries: DashMap<CacheKey, Arc<OnceCell<SourceMetadata>>>,
}

impl SourceIdentityCache {
    pub fn new(registry: Arc<dyn SourceRegistry>) -> Self {
        Self {
            registry,
            entries: DashMap::new(),
        }
    }

    /// Resolve a source name to its backend identity
    pub async fn resolve(
        &self,
        org: &str,
        name: &str,
    ) -> Result<SourceMetadata, SourceResolutionError> {
        // The shard lock is released at the end of this statement
        let cell = self
            .entries
            .entry((org.to_string(), name.to_string()))
            .or_default()
            .clone();

        let metadata = cell
            .get_or_try_init(|| self.create_or_get(org, name))
            .await?;

        Ok(metadata.clone())
    }

    /// Cached identity, without touching the registry
    pub fn get(&self, org: &str, name: &str) -> Option<SourceMetadata> {
        self.entries
            .get(&(org.to_string(), name.to_string()))
            .and_then(|cell| cell.get().cloned())
    }

    /// Number of resolved identities
    pub fn len(&self) -> usize {
        self.entries
            .iter()
            .filter(|entry| entry.value().initialized())
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    async fn create_or_get(
        &self,
        org: &str,
        name: &str,
    ) -> Result<SourceMetadata, SourceResolutionError> {
        let wrap = |source| SourceResolutionError::Registry {
            name: name.to_string(),
            source,
        };

        let found = match self.registry.create_source(org, name).await {
            Ok(id) => {
                info!(org = %org, source = %name, id = %id, "Created source");
                self.registry.get_source_by_id(org, &id).await.map_err(wrap)?
            }
            Err(RegistryError::Conflict(_)) => {
                debug!(org = %org, source = %name, "Source exists, looking up by name");
                self.registry
                    .get_source_by_name(org, name)
                    .await
                    .map_err(wrap)?
            }
            Err(e) => return Err(wrap(e)),
        };

        found.ok_or_else(|| SourceResolutionError::Missing(name.to_string()))
    }
}
