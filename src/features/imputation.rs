// Gap filling for feature rows whose historical columns came up empty:
// rookies with no prior season, injury-limited prior seasons, and everything
// else.
//
// Every filled value is provenance-tagged `Imputed` with the rule that
// fired, and the row's quality flags record what happened, so downstream
// training can down-weight or drop filled rows instead of mistaking them
// for observations.

use std::collections::BTreeMap;

use tracing::debug;

use crate::features::cohort::{normalize_position, CohortAggregate, CohortIndex};
use crate::features::FeatureSpec;
use crate::record::{
    FeatureRow, ImputationRule, PlayerKey, Provenance, Role, UnifiedSeasonRecord,
};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Playing-time floors and cohort choices for the imputation pass.
#[derive(Debug, Clone)]
pub struct ImputationConfig {
    /// Minimum plate appearances for a batter season to count as full.
    pub batter_pa_floor: f64,
    /// Minimum innings pitched for a pitcher season to count as full.
    pub pitcher_ip_floor: f64,
    /// Aggregate used for rookie cohort fills.
    pub aggregate: CohortAggregate,
    /// Restrict the rookie cohort to the same normalized primary position
    /// (falls back to role-only when the position cohort is empty).
    pub position_cohort: bool,
}

impl Default for ImputationConfig {
    fn default() -> Self {
        ImputationConfig {
            batter_pa_floor: 100.0,
            pitcher_ip_floor: 20.0,
            aggregate: CohortAggregate::Median,
            position_cohort: false,
        }
    }
}

impl ImputationConfig {
    fn floor_for(&self, role: Role) -> f64 {
        match role {
            Role::Batter => self.batter_pa_floor,
            Role::Pitcher => self.pitcher_ip_floor,
        }
    }
}

/// Why a row's historical columns were missing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum GapClass {
    /// No unified record exists for this player-role before the row's year.
    Rookie,
    /// Prior records exist but the most recent one fell below the
    /// playing-time floor.
    LimitedPrior,
    /// Prior records exist and the latest was a full season; the column is
    /// missing for some other reason (e.g. a source lacked the stat).
    OtherMissing,
}

// ---------------------------------------------------------------------------
// Imputation pass
// ---------------------------------------------------------------------------

/// Fill missing expected historical columns on each row.
///
/// Rookie gaps fill from the peer cohort (seasons strictly before the row's
/// year only). Injury-limited gaps prefer the player's own most recent
/// season that met the playing-time floor, falling back to the cohort rule.
/// Other gaps stay unset and are only counted: downstream gradient-boosted
/// trainers accept missing values, and fabricating them would hide data
/// problems.
pub fn impute(
    rows: Vec<FeatureRow>,
    population: &[UnifiedSeasonRecord],
    spec: &FeatureSpec,
    config: &ImputationConfig,
) -> Vec<FeatureRow> {
    let cohorts = CohortIndex::build(population);

    // Per-player histories indexed by year, for classification and
    // prior-qualified-season lookups.
    let mut histories: BTreeMap<(PlayerKey, Role), BTreeMap<u16, &UnifiedSeasonRecord>> =
        BTreeMap::new();
    for record in population {
        histories
            .entry((record.key.clone(), record.role))
            .or_default()
            .insert(record.year, record);
    }

    let expected = spec.historical_columns();
    let mut filled_rows = 0usize;

    let rows: Vec<FeatureRow> = rows
        .into_iter()
        .map(|mut row| {
            let history = histories.get(&(row.key.clone(), row.role));
            let gap_class = classify(&row, history, config);

            row.flags.is_rookie = gap_class == GapClass::Rookie;
            row.flags.limited_prior = gap_class == GapClass::LimitedPrior;

            let mut missing = 0u16;
            for (column, base_stat) in &expected {
                if row.features.contains_key(column) {
                    continue;
                }
                let fill = match gap_class {
                    GapClass::Rookie => cohort_fill(&cohorts, &row, base_stat, config),
                    GapClass::LimitedPrior => {
                        prior_qualified_fill(history, &row, base_stat, config)
                            .or_else(|| cohort_fill(&cohorts, &row, base_stat, config))
                    }
                    GapClass::OtherMissing => None,
                };
                match fill {
                    Some((value, rule)) => {
                        row.features.insert(column.clone(), value);
                        row.provenance
                            .insert(column.clone(), Provenance::Imputed { rule });
                        row.flags.has_imputed = true;
                    }
                    None => missing += 1,
                }
            }
            row.flags.missing_features = missing;
            if row.flags.has_imputed {
                filled_rows += 1;
            }
            row
        })
        .collect();

    debug!(rows = rows.len(), filled_rows, "imputation pass complete");
    rows
}

/// Classify a row by what its history looks like before the row's year.
///
/// A most-recent prior season that lacks the playing-time stat entirely is
/// treated as below the floor: a season whose volume is unknown cannot be
/// trusted as a full one.
fn classify(
    row: &FeatureRow,
    history: Option<&BTreeMap<u16, &UnifiedSeasonRecord>>,
    config: &ImputationConfig,
) -> GapClass {
    let Some(history) = history else {
        return GapClass::Rookie;
    };
    let Some((_, most_recent)) = history.range(..row.year).next_back() else {
        return GapClass::Rookie;
    };

    let floor = config.floor_for(row.role);
    let pt_stat = row.role.playing_time_stat();
    let qualified = most_recent
        .stats
        .get(pt_stat)
        .is_some_and(|v| *v >= floor);

    if qualified {
        GapClass::OtherMissing
    } else {
        GapClass::LimitedPrior
    }
}

/// Rookie rule: aggregate the base stat over the peer cohort, strictly prior
/// years only. Position-restricted first when configured, role-only as the
/// fallback.
fn cohort_fill(
    cohorts: &CohortIndex,
    row: &FeatureRow,
    base_stat: &str,
    config: &ImputationConfig,
) -> Option<(f64, ImputationRule)> {
    if config.position_cohort {
        let position = row.position.as_deref().and_then(normalize_position);
        if let Some(position) = position {
            if let Some(value) = cohorts.aggregate(
                row.role,
                Some(&position),
                base_stat,
                row.year,
                config.aggregate,
            ) {
                return Some((value, ImputationRule::RookieCohort));
            }
        }
    }
    cohorts
        .aggregate(row.role, None, base_stat, row.year, config.aggregate)
        .map(|value| (value, ImputationRule::RookieCohort))
}

/// Injury rule: the player's own most recent season strictly before the
/// row's year that met the playing-time floor and carries the base stat.
fn prior_qualified_fill(
    history: Option<&BTreeMap<u16, &UnifiedSeasonRecord>>,
    row: &FeatureRow,
    base_stat: &str,
    config: &ImputationConfig,
) -> Option<(f64, ImputationRule)> {
    let history = history?;
    let floor = config.floor_for(row.role);
    let pt_stat = row.role.playing_time_stat();

    history
        .range(..row.year)
        .rev()
        .find(|(_, record)| {
            record
                .stats
                .get(pt_stat)
                .is_some_and(|v| *v >= floor)
        })
        .and_then(|(_, record)| record.stats.get(base_stat))
        .map(|value| (*value, ImputationRule::PriorQualifiedSeason))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
