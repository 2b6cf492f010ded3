// Peer-cohort aggregates used to fill rookie gaps, plus the position
// normalization that defines who counts as a peer.
//
// Outfield slots are interchangeable for cohort purposes (LF/CF/RF all fill
// OF), and multi-position strings reduce to a primary position by scarcity:
// an elite-scarce slot like C or SS says more about a player's peer group
// than a deep one like 1B.

use std::collections::HashMap;
use std::str::FromStr;

use thiserror::Error;

use crate::record::{Role, UnifiedSeasonRecord};

/// Scarcity order used to pick a primary position from a multi-position
/// string.
pub const POSITION_PRIORITY: [&str; 6] = ["C", "SS", "2B", "3B", "1B", "OF"];

// ---------------------------------------------------------------------------
// Position normalization
// ---------------------------------------------------------------------------

/// Reduce a raw position string to a normalized primary position.
///
/// LF/CF/RF fold to OF; "2B/SS" picks SS (scarcer); positions outside the
/// priority list (DH, SP, RP) yield None and fall back to role-only cohorts.
pub fn normalize_position(raw: &str) -> Option<String> {
    let normalized: Vec<String> = raw
        .split('/')
        .map(|p| {
            let p = p.trim().to_ascii_uppercase();
            match p.as_str() {
                "LF" | "CF" | "RF" => "OF".to_string(),
                _ => p,
            }
        })
        .collect();

    POSITION_PRIORITY
        .iter()
        .find(|priority| normalized.iter().any(|p| p == *priority))
        .map(|p| p.to_string())
}

// ---------------------------------------------------------------------------
// Aggregate choice
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CohortAggregate {
    Mean,
    Median,
}

#[derive(Debug, Error)]
#[error("unknown cohort aggregate: {0} (expected \"mean\" or \"median\")")]
pub struct UnknownAggregate(pub String);

impl FromStr for CohortAggregate {
    type Err = UnknownAggregate;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "mean" => Ok(CohortAggregate::Mean),
            "median" => Ok(CohortAggregate::Median),
            other => Err(UnknownAggregate(other.to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// Cohort index
// ---------------------------------------------------------------------------

/// Stat values indexed by (role, stat), each tagged with its season year and
/// normalized position. Built once per imputation pass; queries filter to
/// years strictly before the target so cohort fills can never leak the
/// target season into itself.
#[derive(Debug)]
pub struct CohortIndex {
    entries: HashMap<(Role, String), Vec<CohortEntry>>,
}

#[derive(Debug)]
struct CohortEntry {
    year: u16,
    position: Option<String>,
    value: f64,
}

impl CohortIndex {
    pub fn build(population: &[UnifiedSeasonRecord]) -> Self {
        let mut entries: HashMap<(Role, String), Vec<CohortEntry>> = HashMap::new();
        for record in population {
            let position = record.position.as_deref().and_then(normalize_position);
            for (stat, value) in &record.stats {
                entries
                    .entry((record.role, stat.clone()))
                    .or_default()
                    .push(CohortEntry {
                        year: record.year,
                        position: position.clone(),
                        value: *value,
                    });
            }
        }
        CohortIndex { entries }
    }

    /// Aggregate a stat over the peer cohort using only seasons strictly
    /// before `before_year`. With `position` given, peers are restricted to
    /// that normalized position; when the restricted cohort is empty the
    /// caller should retry role-only.
    pub fn aggregate(
        &self,
        role: Role,
        position: Option<&str>,
        stat: &str,
        before_year: u16,
        aggregate: CohortAggregate,
    ) -> Option<f64> {
        let entries = self.entries.get(&(role, stat.to_string()))?;
        let mut values: Vec<f64> = entries
            .iter()
            .filter(|e| e.year < before_year)
            .filter(|e| match position {
                Some(want) => e.position.as_deref() == Some(want),
                None => true,
            })
            .map(|e| e.value)
            .collect();

        if values.is_empty() {
            return None;
        }

        match aggregate {
            CohortAggregate::Mean => Some(values.iter().sum::<f64>() / values.len() as f64),
            CohortAggregate::Median => {
                values.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
                let mid = values.len() / 2;
                if values.len() % 2 == 1 {
                    Some(values[mid])
                } else {
                    Some((values[mid - 1] + values[mid]) / 2.0)
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
