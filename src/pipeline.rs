// Pipeline orchestration: crosswalk -> ingest -> merge -> features -> impute.

use std::path::Path;

use thiserror::Error;
use tracing::{info, warn};

use crate::config::Config;
use crate::features::imputation;
use crate::features::temporal;
use crate::identity::registry::{IdentityRegistry, RegistryError};
use crate::ingest::crosswalk::load_crosswalk;
use crate::ingest::tables::{load_season_table, load_split_table, load_statcast_table};
use crate::ingest::IngestError;
use crate::joiner::{self, RejectedRecord};
use crate::record::{FeatureRow, Role, SeasonRecord, SourceClass, SourceTag, UnifiedSeasonRecord};

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Ingest(#[from] IngestError),

    #[error(transparent)]
    Registry(#[from] RegistryError),
}

/// Per-stage counts for one pipeline invocation.
#[derive(Debug, Clone, Default)]
pub struct RunReport {
    pub crosswalk_rows: usize,
    pub crosswalk_rejected: usize,
    pub players_registered: usize,
    pub records_ingested: usize,
    pub records_unified: usize,
    pub records_rejected: usize,
    pub feature_rows: usize,
    pub rows_with_imputation: usize,
    pub missing_feature_cells: u64,
}

/// Everything a run produces. `unified` is kept alongside the feature rows
/// so callers can audit the merge without re-running it.
#[derive(Debug)]
pub struct PipelineOutput {
    pub features: Vec<FeatureRow>,
    pub unified: Vec<UnifiedSeasonRecord>,
    pub rejected: Vec<RejectedRecord>,
    pub report: RunReport,
}

/// Build the identity registry from the configured crosswalk file.
pub fn build_registry(config: &Config) -> Result<(IdentityRegistry, RunReport), PipelineError> {
    let mut report = RunReport::default();

    let rows = load_crosswalk(Path::new(&config.data.crosswalk))?;
    report.crosswalk_rows = rows.len();
    info!(rows = rows.len(), "loaded identity crosswalk");

    let mut registry = IdentityRegistry::with_fuzzy_threshold(config.fuzzy_threshold);
    let load = registry.load(&rows, config.max_reject_fraction)?;
    report.crosswalk_rejected = load.rejected.len();
    report.players_registered = registry.player_count();
    for rejection in &load.rejected {
        warn!(row = rejection.row_index, reason = ?rejection.reason, "crosswalk row rejected");
    }
    info!(
        players = registry.player_count(),
        rejected = load.rejected.len(),
        "identity registry built"
    );

    Ok((registry, report))
}

/// Load every configured source table into one record stream. Ingest order
/// follows the config: each source gets the next `ingest_seq`, which breaks
/// merge-precedence ties in favor of later sources.
pub fn ingest_sources(config: &Config) -> Result<Vec<SeasonRecord>, PipelineError> {
    let mut records = Vec::new();
    let mut ingest_seq = 0u64;

    let mut load = |path: &Option<String>,
                    name: &str,
                    class: SourceClass,
                    role: Role,
                    records: &mut Vec<SeasonRecord>|
     -> Result<(), PipelineError> {
        let Some(path) = path else {
            return Ok(());
        };
        let tag = SourceTag {
            name: name.to_string(),
            class,
            ingest_seq,
        };
        ingest_seq += 1;
        let mut loaded = match class {
            SourceClass::SeasonAggregate => load_season_table(Path::new(path), role, &tag)?,
            SourceClass::PitchLevel => load_statcast_table(Path::new(path), role, &tag)?,
            SourceClass::Split => load_split_table(Path::new(path), role, &tag)?,
        };
        let before = loaded.len();
        loaded.retain(|r| r.year >= config.first_year && r.year <= config.last_year);
        if loaded.len() < before {
            info!(
                source = name,
                dropped = before - loaded.len(),
                "dropped records outside configured season range"
            );
        }
        info!(source = name, records = loaded.len(), "ingested source table");
        records.append(&mut loaded);
        Ok(())
    };

    let data = &config.data;
    load(
        &data.season_batting,
        "fangraphs-batting",
        SourceClass::SeasonAggregate,
        Role::Batter,
        &mut records,
    )?;
    load(
        &data.season_pitching,
        "fangraphs-pitching",
        SourceClass::SeasonAggregate,
        Role::Pitcher,
        &mut records,
    )?;
    load(
        &data.statcast_batting,
        "statcast-batting",
        SourceClass::PitchLevel,
        Role::Batter,
        &mut records,
    )?;
    load(
        &data.statcast_pitching,
        "statcast-pitching",
        SourceClass::PitchLevel,
        Role::Pitcher,
        &mut records,
    )?;
    load(
        &data.splits_batting,
        "splits-batting-2h",
        SourceClass::Split,
        Role::Batter,
        &mut records,
    )?;
    load(
        &data.splits_pitching,
        "splits-pitching-2h",
        SourceClass::Split,
        Role::Pitcher,
        &mut records,
    )?;

    Ok(records)
}

/// Run the full pipeline against pre-loaded inputs. Split out from
/// [`run`] so tests can drive it without touching the filesystem.
pub fn run_with_records(
    records: Vec<SeasonRecord>,
    registry: &IdentityRegistry,
    config: &Config,
    mut report: RunReport,
) -> PipelineOutput {
    report.records_ingested = records.len();

    let outcome = joiner::merge(records, registry);
    report.records_unified = outcome.unified.len();
    report.records_rejected = outcome.rejected.len();
    info!(
        unified = outcome.unified.len(),
        rejected = outcome.rejected.len(),
        "merged source records"
    );

    let unified = outcome.unified;
    let rows = temporal::build(unified.clone(), &config.feature_spec);
    info!(rows = rows.len(), "built temporal features");

    let rows = imputation::impute(rows, &unified, &config.feature_spec, &config.imputation);
    report.feature_rows = rows.len();
    report.rows_with_imputation = rows.iter().filter(|r| r.flags.has_imputed).count();
    report.missing_feature_cells = rows
        .iter()
        .map(|r| u64::from(r.flags.missing_features))
        .sum();
    info!(
        rows = rows.len(),
        imputed = report.rows_with_imputation,
        missing_cells = report.missing_feature_cells,
        "applied imputation policy"
    );

    PipelineOutput {
        features: rows,
        unified,
        rejected: outcome.rejected,
        report,
    }
}

/// Run the full pipeline from configuration: registry, ingest, merge,
/// features, imputation.
pub fn run(config: &Config) -> Result<PipelineOutput, PipelineError> {
    let (registry, report) = build_registry(config)?;
    let records = ingest_sources(config)?;
    Ok(run_with_records(records, &registry, config, report))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
