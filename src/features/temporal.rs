// Lagged, rolling, and year-over-year delta features per player, ordered by
// season, with no-lookahead enforced at every historical read.
//
// Gaps in a player's year sequence are genuine gaps: lag-by-1 after a missed
// season must stay unset rather than treating the nearest earlier year as
// "1 year ago". All lookups do exact year arithmetic against a year-indexed
// history, never positional indexing.

use std::collections::BTreeMap;

use tracing::debug;

use crate::features::{delta_column, lag_column, rolling_column, FeatureSpec};
use crate::record::{FeatureRow, PlayerKey, Provenance, QualityFlags, Role, UnifiedSeasonRecord};

/// Derive one feature row per unified record.
///
/// Own-year stats are copied in as `Observed` features (they carry the
/// training target and playing-time columns downstream); every historical
/// feature reads only records with year strictly less than the row's year.
/// Output is sorted by (key, year, role) and the whole pass is idempotent.
pub fn build(unified: Vec<UnifiedSeasonRecord>, spec: &FeatureSpec) -> Vec<FeatureRow> {
    // Per (player, role) history indexed by year. Post-merge there is at
    // most one record per (key, year, role), so the inner map never clobbers.
    let mut histories: BTreeMap<(PlayerKey, Role), BTreeMap<u16, UnifiedSeasonRecord>> =
        BTreeMap::new();
    for record in unified {
        histories
            .entry((record.key.clone(), record.role))
            .or_default()
            .insert(record.year, record);
    }

    let mut rows = Vec::new();
    for ((key, role), history) in &histories {
        for (&year, record) in history {
            rows.push(build_row(key, *role, year, record, history, spec));
        }
    }

    rows.sort_by(|a, b| (&a.key, a.year, a.role).cmp(&(&b.key, b.year, b.role)));
    debug!(rows = rows.len(), "temporal feature build complete");
    rows
}

fn build_row(
    key: &PlayerKey,
    role: Role,
    year: u16,
    record: &UnifiedSeasonRecord,
    history: &BTreeMap<u16, UnifiedSeasonRecord>,
    spec: &FeatureSpec,
) -> FeatureRow {
    let mut features: BTreeMap<String, f64> = BTreeMap::new();
    let mut provenance: BTreeMap<String, Provenance> = BTreeMap::new();

    // Own-year stats pass through as observed.
    for (stat, value) in &record.stats {
        features.insert(stat.clone(), *value);
        provenance.insert(stat.clone(), Provenance::Observed);
    }

    for stat in &spec.lag_stats {
        // Exact-year lags; a missing prior year leaves the column unset for
        // the imputation policy.
        for &depth in &spec.lag_depths {
            let Some(prior_year) = year.checked_sub(u16::from(depth)) else {
                continue;
            };
            if let Some(value) = stat_at(history, year, prior_year, stat) {
                features.insert(lag_column(stat, depth), value);
                provenance.insert(lag_column(stat, depth), Provenance::Lag { depth });
            }
        }

        // Rolling averages over the window years strictly preceding Y. Only
        // seasons that actually exist contribute; missing years are never
        // fabricated as zero, and the true count used is recorded.
        for &window in &spec.rolling_windows {
            let start = year.saturating_sub(u16::from(window));
            let values: Vec<f64> = (start..year)
                .filter_map(|prior_year| stat_at(history, year, prior_year, stat))
                .collect();
            if !values.is_empty() {
                let mean = values.iter().sum::<f64>() / values.len() as f64;
                features.insert(rolling_column(stat, window), mean);
                provenance.insert(
                    rolling_column(stat, window),
                    Provenance::Rolling {
                        window,
                        seasons_used: values.len() as u8,
                    },
                );
            }
        }
    }

    // Year-over-year deltas need both exact prior years; a gap disables the
    // delta entirely.
    for stat in &spec.delta_stats {
        let (Some(y1), Some(y2)) = (year.checked_sub(1), year.checked_sub(2)) else {
            continue;
        };
        let newer = stat_at(history, year, y1, stat);
        let older = stat_at(history, year, y2, stat);
        if let (Some(newer), Some(older)) = (newer, older) {
            features.insert(delta_column(stat), newer - older);
            provenance.insert(delta_column(stat), Provenance::Delta { newer: 1, older: 2 });
        }
    }

    FeatureRow {
        key: key.clone(),
        year,
        role,
        position: record.position.clone(),
        features,
        provenance,
        flags: QualityFlags::default(),
    }
}

/// Read one stat from the history at an exact prior year. The no-lookahead
/// assertion makes any read of year >= target a programming-error-class
/// fault: it can only fire on a bug in this module, never on bad input.
fn stat_at(
    history: &BTreeMap<u16, UnifiedSeasonRecord>,
    target_year: u16,
    source_year: u16,
    stat: &str,
) -> Option<f64> {
    assert!(
        source_year < target_year,
        "lookahead violation: feature for year {target_year} tried to read year {source_year}"
    );
    history.get(&source_year).and_then(|r| r.stats.get(stat)).copied()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
