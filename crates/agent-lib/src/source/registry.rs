//! HTTP client for the source registry
//!
//! Sources live under `{base}/{org}/meters`. Creating a source answers
//! `201 Created` with a `Location` whose last segment is the record id, or
//! `409 Conflict` when the name is taken.

use super::SourceRegistry;
use crate::error::RegistryError;
use crate::http::{api_base, basic_auth_parts};
use crate::models::SourceMetadata;
use async_trait::async_trait;
use reqwest::header::LOCATION;
use reqwest::StatusCode;
use serde_json::json;
use std::time::Duration;
use tracing::debug;
use url::Url;

/// [`SourceRegistry`] backed by the registry's REST API
#[derive(Clone)]
pub struct HttpSourceRegistry {
    base: Url,
    api_key: String,
    http: reqwest::Client,
}

impl HttpSourceRegistry {
    pub fn new(base: Url, api_key: impl Into<String>, timeout: Duration) -> Result<Self, RegistryError> {
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

    fn meters_url(&self, org: &str, id: Option<&str>) -> Result<Url, RegistryError> {
        let path = match id {
            Some(id) => format!("{}/meters/{}", org, id),
            None => format!("{}/meters", org),
        };
        self.base
            .join(&path)
            .map_err(|e| RegistryError::InvalidResponse(format!("bad registry path {}: {}", path, e)))
    }

    fn authorized(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        let (user, password) = basic_auth_parts(&self.api_key);
        request.basic_auth(user, Some(password))
    }
}

async fn status_error(response: reqwest::Response) -> RegistryError {
    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();
    RegistryError::Status { status, body }
}

#[async_trait]
impl SourceRegistry for HttpSourceRegistry {
    async fn create_source(&self, org: &str, name: &str) -> Result<String, RegistryError> {
        let url = self.meters_url(org, None)?;
        let response = self
            .authorized(self.http.post(url))
            .json(&json!({ "name": name }))
            .send()
            .await?;

        match response.status() {
            StatusCode::CONFLICT => return Err(RegistryError::Conflict(name.to_string())),
            status if !status.is_success() => return Err(status_error(response).await),
            _ => {}
        }

        let location = response
            .headers()
            .get(LOCATION)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| RegistryError::InvalidResponse("create response has no Location".to_string()))?;

        let id = location
            .trim_end_matches('/')
            .rsplit('/')
            .next()
            .filter(|segment| !segment.is_empty())
            .ok_or_else(|| RegistryError::InvalidResponse(format!("bad Location: {}", location)))?;

        debug!(org = %org, source = %name, id = %id, "Registry created source");
        Ok(id.to_string())
    }

    async fn get_source_by_id(
        &self,
        org: &str,
        id: &str,
    ) -> Result<Option<SourceMetadata>, RegistryError> {
        let url = self.meters_url(org, Some(id))?;
        let response = self.authorized(self.http.get(url)).send().await?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => Ok(Some(response.json().await?)),
            _ => Err(status_error(response).await),
        }
    }

    async fn get_source_by_name(
        &self,
        org: &str,
        name: &str,
    ) -> Result<Option<SourceMetadata>, RegistryError> {
        let url = self.meters_url(org, None)?;
        let response = self
            .authorized(self.http.get(url))
            .query(&[("name", name)])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(status_error(response).await);
        }

        let mut matches: Vec<SourceMetadata> = response.json().await?;
        match matches.len() {
            0 => Ok(None),
            1 => Ok(matches.pop()),
            count => Err(RegistryError::Ambiguous {
                name: name.to_string(),
                count,
            }),
        }
    }
}
