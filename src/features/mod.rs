// Temporal feature construction and gap filling.

pub mod cohort;
pub mod imputation;
pub mod temporal;

use std::collections::BTreeSet;

// ---------------------------------------------------------------------------
// Feature specification
// ---------------------------------------------------------------------------

/// Which historical features to derive. BTreeSets keep the derived column
/// set and iteration order deterministic, which build idempotence depends on.
#[derive(Debug, Clone, Default)]
pub struct FeatureSpec {
    /// Stats to copy from prior seasons (lags) and to average over rolling
    /// windows.
    pub lag_stats: BTreeSet<String>,
    /// Lag depths in years; depth 1 means "exactly last season".
    pub lag_depths: BTreeSet<u8>,
    /// Rolling window widths in years, strictly preceding the target year.
    pub rolling_windows: BTreeSet<u8>,
    /// Stats to compute the year-over-year change for (value at Y-1 minus
    /// value at Y-2, exact years only).
    pub delta_stats: BTreeSet<String>,
}

impl FeatureSpec {
    /// Every historical column this spec produces, paired with the base stat
    /// it derives from. The imputation policy uses this closure to decide
    /// which absent columns count as missing.
    pub fn historical_columns(&self) -> Vec<(String, String)> {
        let mut columns = Vec::new();
        for stat in &self.lag_stats {
            for depth in &self.lag_depths {
                columns.push((lag_column(stat, *depth), stat.clone()));
            }
            for window in &self.rolling_windows {
                columns.push((rolling_column(stat, *window), stat.clone()));
            }
        }
        for stat in &self.delta_stats {
            columns.push((delta_column(stat), stat.clone()));
        }
        columns
    }
}

// ---------------------------------------------------------------------------
// Column naming
// ---------------------------------------------------------------------------

pub fn lag_column(stat: &str, depth: u8) -> String {
    format!("{stat}_lag{depth}")
}

pub fn rolling_column(stat: &str, window: u8) -> String {
    format!("{stat}_avg{window}")
}

pub fn delta_column(stat: &str) -> String {
    format!("{stat}_delta")
}
