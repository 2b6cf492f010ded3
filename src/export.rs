// Flat CSV export of feature rows.

use std::collections::BTreeSet;
use std::io::Write;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::record::{FeatureRow, Role};

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("failed to write features CSV at {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to encode features CSV at {path}: {source}")]
    Csv { path: PathBuf, source: csv::Error },
}

/// Write feature rows as a flat CSV: fixed identity columns first, then the
/// union of every feature column across all rows (sorted), then quality
/// flags. Rows missing a column leave the cell empty, so a downstream frame
/// reader sees a proper NA rather than a sentinel.
pub fn write_features_csv(path: &Path, rows: &[FeatureRow]) -> Result<(), ExportError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).map_err(|e| ExportError::Io {
                path: path.to_path_buf(),
                source: e,
            })?;
        }
    }
    let file = std::fs::File::create(path).map_err(|e| ExportError::Io {
        path: path.to_path_buf(),
        source: e,
    })?;
    write_features(file, rows).map_err(|e| ExportError::Csv {
        path: path.to_path_buf(),
        source: e,
    })
}

fn write_features<W: Write>(writer: W, rows: &[FeatureRow]) -> Result<(), csv::Error> {
    let columns: BTreeSet<&str> = rows
        .iter()
        .flat_map(|row| row.features.keys().map(String::as_str))
        .collect();

    let mut wtr = csv::Writer::from_writer(writer);

    let mut header: Vec<&str> = vec!["player_key", "year", "role", "position"];
    header.extend(columns.iter().copied());
    header.extend([
        "is_rookie",
        "limited_prior",
        "has_imputed",
        "missing_features",
    ]);
    wtr.write_record(&header)?;

    for row in rows {
        let mut record: Vec<String> = Vec::with_capacity(header.len());
        record.push(row.key.as_str().to_string());
        record.push(row.year.to_string());
        record.push(
            match row.role {
                Role::Batter => "batter",
                Role::Pitcher => "pitcher",
            }
            .to_string(),
        );
        record.push(row.position.clone().unwrap_or_default());
        for column in &columns {
            match row.features.get(*column) {
                Some(value) => record.push(value.to_string()),
                None => record.push(String::new()),
            }
        }
        record.push((row.flags.is_rookie as u8).to_string());
        record.push((row.flags.limited_prior as u8).to_string());
        record.push((row.flags.has_imputed as u8).to_string());
        record.push(row.flags.missing_features.to_string());
        wtr.write_record(&record)?;
    }

    wtr.flush().map_err(csv::Error::from)?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
