//! Source registry commands

use anyhow::{Context, Result};
use perf_agent_lib::source::{HttpSourceRegistry, SourceRegistry};
use serde::Serialize;
use std::time::Duration;
use tabled::Tabled;
use url::Url;

use crate::output::{print_table, print_warning, OutputFormat};

const REGISTRY_TIMEOUT: Duration = Duration::from_secs(30);

/// Row for the source table
#[derive(Tabled, Serialize)]
struct SourceRow {
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Source ID")]
    source_id: i64,
    #[tabled(rename = "Org")]
    org_id: String,
}

/// Look a source up by name; returns whether it exists
pub async fn lookup(
    registry_url: Url,
    org: &str,
    api_key: &str,
    name: &str,
    format: OutputFormat,
) -> Result<bool> {
    let registry = HttpSourceRegistry::new(registry_url, api_key, REGISTRY_TIMEOUT)
        .context("Failed to create registry client")?;

    let Some(source) = registry
        .get_source_by_name(org, name)
        .await
        .with_context(|| format!("Failed to look up source {}", name))?
    else {
        print_warning(&format!("No source named {} in org {}", name, org));
        return Ok(false);
    };

    let row = SourceRow {
        id: source.id,
        name: source.name,
        source_id: source.source_id,
        org_id: if source.org_id.is_empty() {
            org.to_string()
        } else {
            source.org_id
        },
    };
    print_table(&[row], format);

    Ok(true)
}
