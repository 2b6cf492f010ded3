// Core data model: identifier namespaces, season records, unified records,
// and the feature rows emitted at the end of the pipeline.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

// ---------------------------------------------------------------------------
// Identifier namespaces
// ---------------------------------------------------------------------------

/// One of the independent player-identifier systems the source tables key on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Namespace {
    Mlbam,
    Fangraphs,
    Bbref,
    Retro,
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self {
            Namespace::Mlbam => "mlbam",
            Namespace::Fangraphs => "fangraphs",
            Namespace::Bbref => "bbref",
            Namespace::Retro => "retro",
        };
        write!(f, "{tag}")
    }
}

#[derive(Debug, Error)]
#[error("unknown namespace tag: {0}")]
pub struct UnknownNamespace(pub String);

impl FromStr for Namespace {
    type Err = UnknownNamespace;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "mlbam" => Ok(Namespace::Mlbam),
            "fangraphs" => Ok(Namespace::Fangraphs),
            "bbref" => Ok(Namespace::Bbref),
            "retro" => Ok(Namespace::Retro),
            other => Err(UnknownNamespace(other.to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// Internal player key
// ---------------------------------------------------------------------------

/// The registry's stable surrogate identifier for a player, independent of
/// any external namespace. Values come from the crosswalk person key, or are
/// minted (`anon-N`) during initial registry construction.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlayerKey(pub String);

impl PlayerKey {
    pub fn new(key: impl Into<String>) -> Self {
        PlayerKey(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PlayerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Role
// ---------------------------------------------------------------------------

/// Whether a season record describes a player's work as a batter or a
/// pitcher. A player with meaningful seasons in both roles produces two
/// independent record streams; claiming both roles in one season is a
/// role-conflict input error handled by the joiner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Batter,
    Pitcher,
}

impl Role {
    /// The playing-time stat used to judge whether a season was a full one.
    pub fn playing_time_stat(&self) -> &'static str {
        match self {
            Role::Batter => "PA",
            Role::Pitcher => "IP",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self {
            Role::Batter => "batter",
            Role::Pitcher => "pitcher",
        };
        write!(f, "{tag}")
    }
}

#[derive(Debug, Error)]
#[error("unknown role tag: {0}")]
pub struct UnknownRole(pub String);

impl FromStr for Role {
    type Err = UnknownRole;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "batter" => Ok(Role::Batter),
            "pitcher" => Ok(Role::Pitcher),
            other => Err(UnknownRole(other.to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// Source classification
// ---------------------------------------------------------------------------

/// The class of table a season record came from. Classes form the conflict
/// precedence order: season aggregates outrank pitch-level-derived
/// aggregates, which outrank split-derived aggregates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceClass {
    SeasonAggregate,
    PitchLevel,
    Split,
}

impl SourceClass {
    /// Numeric precedence; higher wins a stat conflict.
    pub fn precedence(&self) -> u8 {
        match self {
            SourceClass::SeasonAggregate => 3,
            SourceClass::PitchLevel => 2,
            SourceClass::Split => 1,
        }
    }
}

/// Identifies which ingested table a record came from.
///
/// `ingest_seq` is a monotonic batch sequence assigned at ingestion; it is
/// the deterministic realization of "most recently ingested" used to break
/// precedence ties in the merge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceTag {
    pub name: String,
    pub class: SourceClass,
    pub ingest_seq: u64,
}

// ---------------------------------------------------------------------------
// Season records
// ---------------------------------------------------------------------------

/// One source table's view of a single player-season, still keyed by the
/// source's native identifier namespace. Constructed per ingestion, consumed
/// by the joiner, and discarded once unified.
///
/// Stats use a BTreeMap so iteration order is deterministic, which the merge
/// and build idempotence properties depend on.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeasonRecord {
    pub namespace: Namespace,
    pub external_id: String,
    pub year: u16,
    pub role: Role,
    /// Raw position string when the source carries one (used for cohort
    /// grouping during imputation, not for identity).
    pub position: Option<String>,
    pub stats: BTreeMap<String, f64>,
    pub source: SourceTag,
}

/// The merged, identity-resolved view of one (player, year, role): the union
/// of all contributing sources' stat columns under the conflict rule, keyed
/// by the registry's internal player key. This is the durable unit handed to
/// the feature builder.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnifiedSeasonRecord {
    pub key: PlayerKey,
    pub year: u16,
    pub role: Role,
    pub position: Option<String>,
    pub stats: BTreeMap<String, f64>,
    /// Which source won each stat column (conflict audit trail).
    pub stat_sources: BTreeMap<String, String>,
    /// All contributing source names, in overlay order.
    pub sources: Vec<String>,
}

// ---------------------------------------------------------------------------
// Feature provenance
// ---------------------------------------------------------------------------

/// Which imputation rule produced a filled value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImputationRule {
    /// Population aggregate over the peer cohort (same role, optionally same
    /// primary position), computed only from seasons strictly before the
    /// target year.
    RookieCohort,
    /// The player's own most recent season meeting the playing-time floor.
    PriorQualifiedSeason,
}

/// How a feature value was derived. This survives into every downstream
/// consumer so the modeling step can down-weight or flag imputed rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Provenance {
    /// Copied directly from the row's own unified season record.
    Observed,
    /// Copied from the record exactly `depth` years earlier.
    Lag { depth: u8 },
    /// Average over the `window` years strictly preceding the row's year.
    /// `seasons_used` is the true count of prior seasons that existed;
    /// downstream weighting can discount thin windows.
    Rolling { window: u8, seasons_used: u8 },
    /// Year-over-year change: value(Y - newer) - value(Y - older).
    Delta { newer: u8, older: u8 },
    /// Filled by the imputation policy.
    Imputed { rule: ImputationRule },
}

/// Per-row data-quality flags.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QualityFlags {
    /// No unified record exists for this player before the row's year.
    pub is_rookie: bool,
    /// A prior record exists, but the most recent one fell below the
    /// playing-time floor.
    pub limited_prior: bool,
    /// At least one feature on this row was imputed.
    pub has_imputed: bool,
    /// Expected historical columns that remained unset after imputation.
    pub missing_features: u16,
}

/// One output row per (player, year, role): the observed season stats plus
/// every derived historical feature, each tagged with its provenance.
///
/// Invariant: every lag/rolling/delta feature references only unified
/// records with year strictly less than this row's year.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureRow {
    pub key: PlayerKey,
    pub year: u16,
    pub role: Role,
    pub position: Option<String>,
    pub features: BTreeMap<String, f64>,
    pub provenance: BTreeMap<String, Provenance>,
    pub flags: QualityFlags,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
