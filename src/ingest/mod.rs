// Tabular ingestion: CSV adapters turning source tables into SeasonRecords
// and crosswalk rows. The pipeline core never fetches anything itself; these
// readers consume files an external collector already materialized.

pub mod crosswalk;
pub mod tables;

use std::collections::BTreeMap;

#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("failed to read file {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[error("CSV error in {path}: {source}")]
    Csv { path: String, source: csv::Error },
}

/// Extract the numeric columns from the extra fields a serde flatten
/// absorbed. CSV cells arrive as strings or inferred numbers depending on
/// the deserializer's guess; both forms are accepted, anything non-numeric
/// (team abbreviations, name columns) is ignored.
pub(crate) fn numeric_stats(
    extra: &BTreeMap<String, serde_json::Value>,
) -> BTreeMap<String, f64> {
    let mut stats = BTreeMap::new();
    for (column, value) in extra {
        let parsed = match value {
            serde_json::Value::Number(n) => n.as_f64(),
            serde_json::Value::String(s) => s.trim().parse::<f64>().ok(),
            _ => None,
        };
        if let Some(v) = parsed {
            if v.is_finite() {
                stats.insert(column.clone(), v);
            }
        }
    }
    stats
}
