//! Counter naming and unit rules

use crate::models::MetricUnit;

/// Build the stable full name of a counter, e.g. `cpu.usage.AVERAGE`.
pub fn full_name(group: &str, name: &str, rollup: &str) -> String {
    format!("{}.{}.{}", group, name, rollup.to_uppercase())
}

/// Convert a raw sample into the unit the ingestion backend expects.
///
/// `kiloBytes` become bytes and `percent` (reported in hundredths of a
/// percent) becomes a fraction. Every other unit passes through.
pub fn normalize_value(unit_key: &str, raw: i64) -> f64 {
    if unit_key.eq_ignore_ascii_case("kiloBytes") {
        raw as f64 * 1024.0
    } else if unit_key.eq_ignore_ascii_case("percent") {
        raw as f64 / 10000.0
    } else {
        raw as f64
    }
}

/// Map an endpoint unit key to the ingestion backend's unit.
pub fn ingestion_unit_for(unit_key: &str) -> MetricUnit {
    if unit_key.eq_ignore_ascii_case("kiloBytes") {
        MetricUnit::Bytecount
    } else if unit_key.eq_ignore_ascii_case("percent") {
        MetricUnit::Percent
    } else {
        MetricUnit::Number
    }
}
