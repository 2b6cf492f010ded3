// Feature pipeline entry point.
//
// Startup sequence:
// 1. Initialize tracing (stderr, env-filtered)
// 2. Load config (copying defaults on first run)
// 3. Build identity registry from the crosswalk
// 4. Ingest source tables
// 5. Run merge / feature / imputation stages
// 6. Persist run to the feature store
// 7. Export flat features CSV
// 8. Log run summary

use tablesetter::config;
use tablesetter::export;
use tablesetter::pipeline;
use tablesetter::store;

use anyhow::Context;
use tracing::{info, warn};

fn main() -> anyhow::Result<()> {
    // 1. Initialize tracing
    init_tracing()?;
    info!("tablesetter starting up");

    // 2. Load config
    let config = config::load_config().context("failed to load configuration")?;
    info!(
        "Config loaded: seasons {}-{}, {} lag stats",
        config.first_year,
        config.last_year,
        config.feature_spec.lag_stats.len()
    );

    // 3. Build identity registry
    let (registry, report) =
        pipeline::build_registry(&config).context("failed to build identity registry")?;

    // 4. Ingest source tables
    let records = pipeline::ingest_sources(&config).context("failed to ingest source tables")?;
    info!("Ingested {} season records", records.len());

    // 5. Merge, build features, impute
    let output = pipeline::run_with_records(records, &registry, &config, report);
    if !output.rejected.is_empty() {
        warn!(
            "{} records rejected during merge; see feature store for details",
            output.rejected.len()
        );
    }

    // 6. Persist run
    let store_path = config.store_path.to_string_lossy().into_owned();
    let store = store::FeatureStore::open(&store_path).context("failed to open feature store")?;
    let run_id = store::generate_run_id();
    store
        .begin_run(&run_id, config.first_year, config.last_year)
        .context("failed to register run")?;
    store
        .save_feature_rows(&run_id, &output.features)
        .context("failed to persist feature rows")?;
    store
        .save_rejected(&run_id, &output.rejected)
        .context("failed to persist rejected records")?;
    info!("Persisted run {run_id} to {store_path}");

    // 7. Export CSV
    export::write_features_csv(&config.features_csv, &output.features)
        .context("failed to export features CSV")?;
    info!("Exported features CSV to {}", config.features_csv.display());

    // 8. Summary
    let report = &output.report;
    info!(
        "Run {run_id} complete: {} players registered, {} records in, \
         {} unified, {} rejected, {} feature rows ({} with imputation, {} missing cells)",
        report.players_registered,
        report.records_ingested,
        report.records_unified,
        report.records_rejected,
        report.feature_rows,
        report.rows_with_imputation,
        report.missing_feature_cells,
    );

    Ok(())
}

fn init_tracing() -> anyhow::Result<()> {
    use tracing_subscriber::fmt;
    use tracing_subscriber::EnvFilter;

    let subscriber = fmt::Subscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("tablesetter=info,warn")),
        )
        .with_writer(std::io::stderr)
        .with_target(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .context("failed to set tracing subscriber")?;

    Ok(())
}
