// Chadwick-register-shaped crosswalk ingestion: one row per person, with
// that person's identifier in each namespace that knows them. Blank id
// cells mean unknown/unscraped, not empty-string identities.

use std::collections::BTreeMap;
use std::io::Read;
use std::path::Path;

use serde::Deserialize;
use tracing::warn;

use crate::identity::CrosswalkRow;
use crate::ingest::IngestError;
use crate::record::{Namespace, PlayerKey};

/// Raw crosswalk CSV row. Id columns default to empty so a snapshot that
/// lacks a namespace column entirely still loads.
#[derive(Debug, Deserialize)]
struct RawCrosswalkRow {
    key_person: String,
    #[serde(default)]
    name_last: String,
    #[serde(default)]
    name_first: String,
    #[serde(default)]
    key_mlbam: String,
    #[serde(default)]
    key_fangraphs: String,
    #[serde(default)]
    key_bbref: String,
    #[serde(default)]
    key_retro: String,
}

fn load_from_reader<R: Read>(rdr: R) -> Result<Vec<CrosswalkRow>, csv::Error> {
    let mut reader = csv::Reader::from_reader(rdr);
    let mut rows = Vec::new();
    for result in reader.deserialize::<RawCrosswalkRow>() {
        match result {
            Ok(raw) => {
                let key_person = raw.key_person.trim();
                if key_person.is_empty() {
                    warn!("skipping crosswalk row with empty person key");
                    continue;
                }

                let mut ids: BTreeMap<Namespace, String> = BTreeMap::new();
                for (namespace, cell) in [
                    (Namespace::Mlbam, &raw.key_mlbam),
                    (Namespace::Fangraphs, &raw.key_fangraphs),
                    (Namespace::Bbref, &raw.key_bbref),
                    (Namespace::Retro, &raw.key_retro),
                ] {
                    let cell = cell.trim();
                    if !cell.is_empty() {
                        ids.insert(namespace, cell.to_string());
                    }
                }

                rows.push(CrosswalkRow {
                    key: PlayerKey::new(key_person),
                    name_last: raw.name_last.trim().to_string(),
                    name_first: raw.name_first.trim().to_string(),
                    ids,
                });
            }
            Err(e) => {
                warn!("skipping malformed crosswalk row: {}", e);
            }
        }
    }
    Ok(rows)
}

/// Load the ID-crosswalk table from a CSV file.
pub fn load_crosswalk(path: &Path) -> Result<Vec<CrosswalkRow>, IngestError> {
    let file = std::fs::File::open(path).map_err(|e| IngestError::Io {
        path: path.display().to_string(),
        source: e,
    })?;
    load_from_reader(file).map_err(|e| IngestError::Csv {
        path: path.display().to_string(),
        source: e,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
