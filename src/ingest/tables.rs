// Source-table readers for the three statistical table shapes.
//
// Each shape has fixed key columns; every remaining numeric column becomes a
// stat, so new columns in a source export flow through without code changes.
// Non-numeric extras (team, name fragments) are ignored.

use std::collections::BTreeMap;
use std::io::Read;
use std::path::Path;

use serde::Deserialize;
use tracing::warn;

use crate::ingest::{numeric_stats, IngestError};
use crate::record::{Namespace, Role, SeasonRecord, SourceTag};

// ---------------------------------------------------------------------------
// Raw CSV serde structs (private)
// ---------------------------------------------------------------------------

/// FanGraphs-shaped season-aggregate row: fangraphs id + season year, stats
/// in the remaining columns. `IDfg` is the alias FanGraphs exports use.
#[derive(Debug, Deserialize)]
struct RawSeasonRow {
    #[serde(alias = "IDfg")]
    playerid: String,
    #[serde(alias = "season", alias = "year")]
    #[serde(rename = "Season")]
    season: u16,
    #[serde(default)]
    #[serde(rename = "Pos", alias = "position")]
    pos: String,
    /// Absorb every stat column.
    #[serde(flatten)]
    extra: BTreeMap<String, serde_json::Value>,
}

/// Savant-shaped expected-stats row, keyed by MLBAM id.
#[derive(Debug, Deserialize)]
struct RawStatcastRow {
    player_id: String,
    year: u16,
    #[serde(flatten)]
    extra: BTreeMap<String, serde_json::Value>,
}

// ---------------------------------------------------------------------------
// Reader-based loaders (private, enable testing without temp files)
// ---------------------------------------------------------------------------

fn load_season_from_reader<R: Read>(
    rdr: R,
    role: Role,
    source: &SourceTag,
) -> Result<Vec<SeasonRecord>, csv::Error> {
    let mut records = Vec::new();
    let mut reader = csv::Reader::from_reader(rdr);
    for result in reader.deserialize::<RawSeasonRow>() {
        match result {
            Ok(raw) => {
                let external_id = raw.playerid.trim().to_string();
                if external_id.is_empty() {
                    warn!(source = %source.name, "skipping season row with empty player id");
                    continue;
                }
                let pos = raw.pos.trim();
                records.push(SeasonRecord {
                    namespace: Namespace::Fangraphs,
                    external_id,
                    year: raw.season,
                    role,
                    position: (!pos.is_empty()).then(|| pos.to_string()),
                    stats: numeric_stats(&raw.extra),
                    source: source.clone(),
                });
            }
            Err(e) => {
                warn!(source = %source.name, "skipping malformed season row: {}", e);
            }
        }
    }
    Ok(records)
}

fn load_statcast_from_reader<R: Read>(
    rdr: R,
    role: Role,
    source: &SourceTag,
) -> Result<Vec<SeasonRecord>, csv::Error> {
    let mut records = Vec::new();
    let mut reader = csv::Reader::from_reader(rdr);
    for result in reader.deserialize::<RawStatcastRow>() {
        match result {
            Ok(raw) => {
                let external_id = raw.player_id.trim().to_string();
                if external_id.is_empty() {
                    warn!(source = %source.name, "skipping statcast row with empty player id");
                    continue;
                }
                records.push(SeasonRecord {
                    namespace: Namespace::Mlbam,
                    external_id,
                    year: raw.year,
                    role,
                    position: None,
                    stats: numeric_stats(&raw.extra),
                    source: source.clone(),
                });
            }
            Err(e) => {
                warn!(source = %source.name, "skipping malformed statcast row: {}", e);
            }
        }
    }
    Ok(records)
}

fn load_split_from_reader<R: Read>(
    rdr: R,
    role: Role,
    source: &SourceTag,
) -> Result<Vec<SeasonRecord>, csv::Error> {
    // Split tables share the FanGraphs season shape; stat names get a _2h
    // suffix so second-half metrics never collide with full-season columns.
    let mut records = load_season_from_reader(rdr, role, source)?;
    for record in &mut records {
        record.stats = record
            .stats
            .iter()
            .map(|(stat, value)| (format!("{stat}_2h"), *value))
            .collect();
    }
    Ok(records)
}

// ---------------------------------------------------------------------------
// Public path-based loaders
// ---------------------------------------------------------------------------

/// Load a FanGraphs-shaped season-aggregate table.
pub fn load_season_table(
    path: &Path,
    role: Role,
    source: &SourceTag,
) -> Result<Vec<SeasonRecord>, IngestError> {
    let file = std::fs::File::open(path).map_err(|e| IngestError::Io {
        path: path.display().to_string(),
        source: e,
    })?;
    load_season_from_reader(file, role, source).map_err(|e| IngestError::Csv {
        path: path.display().to_string(),
        source: e,
    })
}

/// Load a Savant-shaped expected-stats table (MLBAM-keyed).
pub fn load_statcast_table(
    path: &Path,
    role: Role,
    source: &SourceTag,
) -> Result<Vec<SeasonRecord>, IngestError> {
    let file = std::fs::File::open(path).map_err(|e| IngestError::Io {
        path: path.display().to_string(),
        source: e,
    })?;
    load_statcast_from_reader(file, role, source).map_err(|e| IngestError::Csv {
        path: path.display().to_string(),
        source: e,
    })
}

/// Load a second-half split table (FanGraphs-shaped, stats suffixed `_2h`).
pub fn load_split_table(
    path: &Path,
    role: Role,
    source: &SourceTag,
) -> Result<Vec<SeasonRecord>, IngestError> {
    let file = std::fs::File::open(path).map_err(|e| IngestError::Io {
        path: path.display().to_string(),
        source: e,
    })?;
    load_split_from_reader(file, role, source).map_err(|e| IngestError::Csv {
        path: path.display().to_string(),
        source: e,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
