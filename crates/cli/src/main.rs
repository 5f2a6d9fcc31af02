//! vSphere Performance Collector CLI
//!
//! Operator tooling for checking counter catalogs and inspecting the
//! source registry.

mod commands;
mod output;

use anyhow::Result;
use clap::{Parser, Subcommand};
use commands::{catalog, source};
use std::path::PathBuf;
use std::process::ExitCode;
use url::Url;

/// vSphere Performance Collector CLI
#[derive(Parser)]
#[command(name = "perfctl")]
#[command(author, version, about = "CLI for the vSphere Performance Collector", long_about = None)]
pub struct Cli {
    /// Output format
    #[arg(long, short, global = true, default_value = "table")]
    pub format: output::OutputFormat,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Inspect and validate counter catalogs
    #[command(subcommand)]
    Catalog(CatalogCommands),

    /// Query the source registry
    #[command(subcommand)]
    Source(SourceCommands),
}

#[derive(Subcommand)]
pub enum CatalogCommands {
    /// Check that every counter references a defined metric
    Validate {
        /// Path to the catalog file
        path: PathBuf,

        /// Log each unresolved reference at error level
        #[arg(long)]
        strict: bool,
    },

    /// List object types, counters and target metrics
    Show {
        /// Path to the catalog file
        path: PathBuf,
    },
}

#[derive(Subcommand)]
pub enum SourceCommands {
    /// Look a source up by name
    Lookup {
        /// Source name, e.g. `vc-lab-web-01`
        name: String,

        /// Registry base URL
        #[arg(long, env = "PERF_REGISTRY_URL")]
        registry_url: Url,

        /// Organization owning the source
        #[arg(long, env = "PERF_ORG_ID")]
        org: String,

        /// Registry API key
        #[arg(long, env = "PERF_REGISTRY_API_KEY", hide_env_values = true)]
        api_key: String,
    },
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    let ok = match cli.command {
        Commands::Catalog(catalog_cmd) => match catalog_cmd {
            CatalogCommands::Validate { path, strict } => {
                catalog::validate(&path, strict, cli.format).await?
            }
            CatalogCommands::Show { path } => {
                catalog::show(&path, cli.format).await?;
                true
            }
        },
        Commands::Source(source_cmd) => match source_cmd {
            SourceCommands::Lookup {
                name,
                registry_url,
                org,
                api_key,
            } => source::lookup(registry_url, &org, &api_key, &name, cli.format).await?,
        },
    };

    Ok(if ok { ExitCode::SUCCESS } else { ExitCode::FAILURE })
}
