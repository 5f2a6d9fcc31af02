//! Counter catalog commands

use anyhow::{Context, Result};
use colored::Colorize;
use perf_agent_lib::catalog::Catalog;
use perf_agent_lib::error::CatalogError;
use serde::Serialize;
use std::path::Path;
use tabled::Tabled;

use crate::output::{print_error, print_info, print_success, print_table, print_warning, OutputFormat};

/// Row for the unresolved references table
#[derive(Tabled, Serialize)]
struct ReferenceRow {
    #[tabled(rename = "Type")]
    object_type: String,
    #[tabled(rename = "Counter")]
    counter: String,
    #[tabled(rename = "Undefined Metric")]
    metric: String,
}

/// Row for the catalog contents table
#[derive(Tabled, Serialize)]
struct CounterRow {
    #[tabled(rename = "Type")]
    object_type: String,
    #[tabled(rename = "Counter")]
    counter: String,
    #[tabled(rename = "Metric")]
    metric: String,
    #[tabled(rename = "Unit")]
    unit: String,
}

#[derive(Serialize)]
struct ValidationReport {
    path: String,
    valid: bool,
    unresolved: Vec<ReferenceRow>,
    unused: Vec<String>,
}

async fn load(path: &Path) -> Result<Catalog> {
    Catalog::load(path)
        .await
        .with_context(|| format!("Failed to load catalog {}", path.display()))
}

/// Validate a catalog; returns whether it passed
pub async fn validate(path: &Path, strict: bool, format: OutputFormat) -> Result<bool> {
    let catalog = load(path).await?;

    let unresolved: Vec<ReferenceRow> = catalog
        .unresolved_references()
        .into_iter()
        .filter_map(|problem| match problem {
            CatalogError::UnknownMetricReference {
                object_type,
                counter,
                metric,
            } => Some(ReferenceRow {
                object_type,
                counter,
                metric,
            }),
            _ => None,
        })
        .collect();
    let unused: Vec<String> = catalog
        .unused_definitions()
        .into_iter()
        .map(str::to_string)
        .collect();
    let valid = catalog.validate(strict);

    match format {
        OutputFormat::Json => {
            let report = ValidationReport {
                path: path.display().to_string(),
                valid,
                unresolved,
                unused,
            };
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        OutputFormat::Table => {
            if !unresolved.is_empty() {
                println!("{}", "Unresolved metric references".bold());
                print_table(&unresolved, format);
            }
            for metric in &unused {
                print_warning(&format!("Metric {} is defined but never collected", metric));
            }

            if valid {
                print_success(&format!("catalog {} is valid", path.display()));
            } else {
                print_error(&format!("catalog {} is not valid", path.display()));
            }
        }
    }

    Ok(valid)
}

/// Show the counters a catalog collects per object type
pub async fn show(path: &Path, format: OutputFormat) -> Result<()> {
    let catalog = load(path).await?;

    let rows: Vec<CounterRow> = catalog
        .entries()
        .iter()
        .flat_map(|entry| {
            let catalog = &catalog;
            entry.counters.iter().map(move |counter| CounterRow {
                object_type: entry.object_type.clone(),
                counter: counter.name.clone(),
                metric: counter.metric.clone(),
                unit: catalog
                    .definition(&counter.metric)
                    .map(|d| d.unit.to_string())
                    .unwrap_or_else(|| "-".to_string()),
            })
        })
        .collect();

    print_table(&rows, format);

    if matches!(format, OutputFormat::Table) {
        print_info(&format!(
            "{} object types, {} counters, {} metric definitions",
            catalog.entries().len(),
            rows.len(),
            catalog.definitions().len()
        ));
    }

    Ok(())
}
