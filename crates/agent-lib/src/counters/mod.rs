//! Performance counter naming, unit normalization and metadata resolution
//!
//! Counters are joined across three identifier spaces: the operator's metric
//! names in the catalog, the endpoint's runtime counter ids, and the stable
//! `group.name.ROLLUP` full name that links the two.

mod naming;
mod resolver;

pub use naming::{full_name, ingestion_unit_for, normalize_value};
pub use resolver::{fetch_all, ResolvedMetadata};
