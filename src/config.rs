// Configuration loading and parsing (pipeline.toml).

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

use crate::features::cohort::CohortAggregate;
use crate::features::FeatureSpec;
use crate::features::imputation::ImputationConfig;

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config file not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("failed to parse config file {path}: {source}")]
    ParseError {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("validation error for field `{field}`: {message}")]
    ValidationError { field: String, message: String },

    #[error("failed to initialize config from defaults: {message}")]
    DefaultsCopyError { message: String },
}

// ---------------------------------------------------------------------------
// pipeline.toml structs
// ---------------------------------------------------------------------------

/// Raw deserialization target for the entire pipeline.toml file.
#[derive(Debug, Clone, Deserialize)]
struct PipelineFile {
    seasons: SeasonsSection,
    identity: IdentitySection,
    features: FeaturesSection,
    imputation: ImputationSection,
    data: DataPaths,
    #[serde(default)]
    output: Option<OutputSection>,
}

#[derive(Debug, Clone, Deserialize)]
struct SeasonsSection {
    first_year: u16,
    last_year: u16,
}

#[derive(Debug, Clone, Deserialize)]
struct IdentitySection {
    max_reject_fraction: f64,
    fuzzy_threshold: f64,
}

#[derive(Debug, Clone, Deserialize)]
struct FeaturesSection {
    lag_stats: Vec<String>,
    lag_depths: Vec<u8>,
    rolling_windows: Vec<u8>,
    #[serde(default)]
    delta_stats: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct ImputationSection {
    batter_pa_floor: f64,
    pitcher_ip_floor: f64,
    cohort_aggregate: String,
    #[serde(default)]
    position_cohort: bool,
}

/// Source-table paths. Optional entries cover deployments that lack a
/// source; the pipeline simply skips absent tables.
#[derive(Debug, Clone, Deserialize)]
pub struct DataPaths {
    pub crosswalk: String,
    #[serde(default)]
    pub season_batting: Option<String>,
    #[serde(default)]
    pub season_pitching: Option<String>,
    #[serde(default)]
    pub statcast_batting: Option<String>,
    #[serde(default)]
    pub statcast_pitching: Option<String>,
    #[serde(default)]
    pub splits_batting: Option<String>,
    #[serde(default)]
    pub splits_pitching: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct OutputSection {
    #[serde(default)]
    store_path: Option<String>,
    #[serde(default)]
    features_csv: Option<String>,
}

// ---------------------------------------------------------------------------
// Assembled Config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct Config {
    pub first_year: u16,
    pub last_year: u16,
    pub max_reject_fraction: f64,
    pub fuzzy_threshold: f64,
    pub feature_spec: FeatureSpec,
    pub imputation: ImputationConfig,
    pub data: DataPaths,
    pub store_path: PathBuf,
    pub features_csv: PathBuf,
}

// ---------------------------------------------------------------------------
// Loading logic
// ---------------------------------------------------------------------------

/// Load and validate configuration from `config/pipeline.toml` relative to
/// the given `base_dir`.
///
/// This is the lower-level loading primitive that does not auto-copy
/// defaults. Prefer `load_config()` which handles default initialization.
pub(crate) fn load_config_from(base_dir: &Path) -> Result<Config, ConfigError> {
    let config_path = base_dir.join("config").join("pipeline.toml");
    let text = read_file(&config_path)?;
    let file: PipelineFile = toml::from_str(&text).map_err(|e| ConfigError::ParseError {
        path: config_path.clone(),
        source: e,
    })?;

    let aggregate: CohortAggregate = file
        .imputation
        .cohort_aggregate
        .parse()
        .map_err(|e| ConfigError::ValidationError {
            field: "imputation.cohort_aggregate".into(),
            message: format!("{e}"),
        })?;

    let feature_spec = FeatureSpec {
        lag_stats: file.features.lag_stats.iter().cloned().collect(),
        lag_depths: file.features.lag_depths.iter().copied().collect(),
        rolling_windows: file.features.rolling_windows.iter().copied().collect(),
        delta_stats: file.features.delta_stats.iter().cloned().collect(),
    };

    let imputation = ImputationConfig {
        batter_pa_floor: file.imputation.batter_pa_floor,
        pitcher_ip_floor: file.imputation.pitcher_ip_floor,
        aggregate,
        position_cohort: file.imputation.position_cohort,
    };

    let output = file.output.unwrap_or(OutputSection {
        store_path: None,
        features_csv: None,
    });
    let (store_path, features_csv) = resolve_output_paths(&output)?;

    let config = Config {
        first_year: file.seasons.first_year,
        last_year: file.seasons.last_year,
        max_reject_fraction: file.identity.max_reject_fraction,
        fuzzy_threshold: file.identity.fuzzy_threshold,
        feature_spec,
        imputation,
        data: file.data,
        store_path,
        features_csv,
    };

    validate(&config)?;

    Ok(config)
}

/// Fill output paths from the platform data directory when the config omits
/// them (e.g. `~/.local/share/tablesetter` on Linux).
fn resolve_output_paths(output: &OutputSection) -> Result<(PathBuf, PathBuf), ConfigError> {
    let default_root = || -> Result<PathBuf, ConfigError> {
        let dirs = directories::ProjectDirs::from("", "", "tablesetter").ok_or_else(|| {
            ConfigError::ValidationError {
                field: "output".into(),
                message: "no output paths configured and no home directory available".into(),
            }
        })?;
        Ok(dirs.data_dir().to_path_buf())
    };

    let store_path = match &output.store_path {
        Some(p) => PathBuf::from(p),
        None => default_root()?.join("tablesetter.db"),
    };
    let features_csv = match &output.features_csv {
        Some(p) => PathBuf::from(p),
        None => default_root()?.join("features.csv"),
    };
    Ok((store_path, features_csv))
}

/// Ensure all config files exist by copying missing ones from `defaults/`.
/// Returns the list of files that were copied. Skips `.example` files.
pub fn ensure_config_files(base_dir: &Path) -> Result<Vec<PathBuf>, ConfigError> {
    let defaults_dir = base_dir.join("defaults");
    let config_dir = base_dir.join("config");

    if !defaults_dir.exists() {
        if !config_dir.exists() {
            return Err(ConfigError::DefaultsCopyError {
                message: format!(
                    "neither defaults/ nor config/ directory found in {}; \
                     run from the project root or ensure defaults/ is present",
                    base_dir.display()
                ),
            });
        }
        return Ok(vec![]);
    }

    std::fs::create_dir_all(&config_dir).map_err(|e| ConfigError::DefaultsCopyError {
        message: format!("failed to create config directory: {e}"),
    })?;

    let mut copied = Vec::new();

    let entries = std::fs::read_dir(&defaults_dir).map_err(|e| ConfigError::DefaultsCopyError {
        message: format!("failed to read defaults directory: {e}"),
    })?;

    for entry in entries {
        let entry = entry.map_err(|e| ConfigError::DefaultsCopyError {
            message: format!("failed to read defaults entry: {e}"),
        })?;
        let path = entry.path();

        if !path.is_file() {
            continue;
        }
        let Some(file_name) = path.file_name() else {
            continue;
        };
        if file_name.to_str().is_some_and(|n| n.ends_with(".example")) {
            continue;
        }
        let target = config_dir.join(file_name);

        match std::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&target)
        {
            Ok(mut dest) => {
                let content = std::fs::read(&path).map_err(|e| ConfigError::DefaultsCopyError {
                    message: format!("failed to read {}: {e}", path.display()),
                })?;
                std::io::Write::write_all(&mut dest, &content).map_err(|e| {
                    ConfigError::DefaultsCopyError {
                        message: format!("failed to write {}: {e}", target.display()),
                    }
                })?;
                copied.push(target);
            }
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                // Already present in config/, leave it alone.
            }
            Err(e) => {
                return Err(ConfigError::DefaultsCopyError {
                    message: format!("failed to create {}: {e}", target.display()),
                });
            }
        }
    }

    Ok(copied)
}

/// Convenience wrapper: loads config relative to the current working
/// directory, copying defaults first.
pub fn load_config() -> Result<Config, ConfigError> {
    let cwd = std::env::current_dir().map_err(|_| ConfigError::FileNotFound {
        path: PathBuf::from("."),
    })?;
    ensure_config_files(&cwd)?;
    load_config_from(&cwd)
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn read_file(path: &Path) -> Result<String, ConfigError> {
    std::fs::read_to_string(path).map_err(|_| ConfigError::FileNotFound {
        path: path.to_path_buf(),
    })
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

fn validate(config: &Config) -> Result<(), ConfigError> {
    if config.first_year > config.last_year {
        return Err(ConfigError::ValidationError {
            field: "seasons.first_year".into(),
            message: format!(
                "must not exceed last_year ({} > {})",
                config.first_year, config.last_year
            ),
        });
    }

    let frac = config.max_reject_fraction;
    if !(0.0..=1.0).contains(&frac) {
        return Err(ConfigError::ValidationError {
            field: "identity.max_reject_fraction".into(),
            message: format!("must be between 0.0 and 1.0 inclusive, got {frac}"),
        });
    }

    let threshold = config.fuzzy_threshold;
    if !(0.0..=1.0).contains(&threshold) {
        return Err(ConfigError::ValidationError {
            field: "identity.fuzzy_threshold".into(),
            message: format!("must be between 0.0 and 1.0 inclusive, got {threshold}"),
        });
    }

    let spec = &config.feature_spec;
    if spec.lag_stats.is_empty() {
        return Err(ConfigError::ValidationError {
            field: "features.lag_stats".into(),
            message: "must name at least one stat".into(),
        });
    }
    if spec.lag_depths.is_empty() {
        return Err(ConfigError::ValidationError {
            field: "features.lag_depths".into(),
            message: "must contain at least one depth".into(),
        });
    }
    check_positive_set("features.lag_depths", &spec.lag_depths)?;
    check_positive_set("features.rolling_windows", &spec.rolling_windows)?;

    if config.imputation.batter_pa_floor < 0.0 {
        return Err(ConfigError::ValidationError {
            field: "imputation.batter_pa_floor".into(),
            message: format!("must be >= 0, got {}", config.imputation.batter_pa_floor),
        });
    }
    if config.imputation.pitcher_ip_floor < 0.0 {
        return Err(ConfigError::ValidationError {
            field: "imputation.pitcher_ip_floor".into(),
            message: format!("must be >= 0, got {}", config.imputation.pitcher_ip_floor),
        });
    }

    if config.data.crosswalk.trim().is_empty() {
        return Err(ConfigError::ValidationError {
            field: "data.crosswalk".into(),
            message: "must be a non-empty path".into(),
        });
    }

    Ok(())
}

fn check_positive_set(field: &str, values: &BTreeSet<u8>) -> Result<(), ConfigError> {
    if values.contains(&0) {
        return Err(ConfigError::ValidationError {
            field: field.to_string(),
            message: "entries must be >= 1".into(),
        });
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::path::PathBuf;

    /// Helper: returns the path to the project root (works whether
    /// `cargo test` runs from the crate root or a workspace root).
    fn project_root() -> PathBuf {
        let cwd = std::env::current_dir().unwrap();
        if cwd.join("defaults").exists() {
            cwd
        } else {
            panic!("Cannot locate defaults/ directory from CWD {:?}", cwd);
        }
    }

    /// Helper: a temp base dir seeded with the default pipeline.toml,
    /// optionally rewritten through `edit`.
    fn temp_config(name: &str, edit: impl Fn(String) -> String) -> PathBuf {
        let tmp = std::env::temp_dir().join(format!("tablesetter_config_{name}"));
        let config_dir = tmp.join("config");
        let _ = fs::remove_dir_all(&tmp);
        fs::create_dir_all(&config_dir).unwrap();

        let text =
            fs::read_to_string(project_root().join("defaults/pipeline.toml")).unwrap();
        fs::write(config_dir.join("pipeline.toml"), edit(text)).unwrap();
        tmp
    }

    #[test]
    fn load_valid_config_from_defaults() {
        let root = project_root();
        ensure_config_files(&root).expect("should copy default configs");
        let config = load_config_from(&root).expect("should load valid config");

        assert_eq!(config.first_year, 2015);
        assert_eq!(config.last_year, 2024);
        assert!((config.max_reject_fraction - 0.01).abs() < f64::EPSILON);
        assert!((config.fuzzy_threshold - 0.85).abs() < f64::EPSILON);

        assert!(config.feature_spec.lag_stats.contains("HR"));
        assert!(config.feature_spec.lag_depths.contains(&1));
        assert!(config.feature_spec.lag_depths.contains(&2));
        assert!(config.feature_spec.rolling_windows.contains(&2));
        assert!(config.feature_spec.rolling_windows.contains(&3));

        assert!((config.imputation.batter_pa_floor - 100.0).abs() < f64::EPSILON);
        assert!((config.imputation.pitcher_ip_floor - 20.0).abs() < f64::EPSILON);
        assert_eq!(config.imputation.aggregate, CohortAggregate::Median);
        assert!(!config.imputation.position_cohort);

        assert_eq!(config.data.crosswalk, "data/crosswalk.csv");
        assert!(config.data.season_batting.is_some());
        assert_eq!(config.store_path, PathBuf::from("data/out/tablesetter.db"));
        assert_eq!(config.features_csv, PathBuf::from("data/out/features.csv"));
    }

    #[test]
    fn rejects_inverted_year_range() {
        let tmp = temp_config("bad_years", |text| {
            text.replace("first_year = 2015", "first_year = 2030")
        });
        let err = load_config_from(&tmp).unwrap_err();
        match &err {
            ConfigError::ValidationError { field, .. } => {
                assert_eq!(field, "seasons.first_year");
            }
            other => panic!("expected ValidationError, got: {other}"),
        }
        let _ = fs::remove_dir_all(&tmp);
    }

    #[test]
    fn rejects_reject_fraction_out_of_range() {
        let tmp = temp_config("bad_fraction", |text| {
            text.replace("max_reject_fraction = 0.01", "max_reject_fraction = 1.5")
        });
        let err = load_config_from(&tmp).unwrap_err();
        match &err {
            ConfigError::ValidationError { field, .. } => {
                assert_eq!(field, "identity.max_reject_fraction");
            }
            other => panic!("expected ValidationError, got: {other}"),
        }
        let _ = fs::remove_dir_all(&tmp);
    }

    #[test]
    fn rejects_empty_lag_depths() {
        let tmp = temp_config("no_depths", |text| {
            text.replace("lag_depths = [1, 2]", "lag_depths = []")
        });
        let err = load_config_from(&tmp).unwrap_err();
        match &err {
            ConfigError::ValidationError { field, .. } => {
                assert_eq!(field, "features.lag_depths");
            }
            other => panic!("expected ValidationError, got: {other}"),
        }
        let _ = fs::remove_dir_all(&tmp);
    }

    #[test]
    fn rejects_zero_lag_depth() {
        let tmp = temp_config("zero_depth", |text| {
            text.replace("lag_depths = [1, 2]", "lag_depths = [0, 1]")
        });
        let err = load_config_from(&tmp).unwrap_err();
        match &err {
            ConfigError::ValidationError { field, .. } => {
                assert_eq!(field, "features.lag_depths");
            }
            other => panic!("expected ValidationError, got: {other}"),
        }
        let _ = fs::remove_dir_all(&tmp);
    }

    #[test]
    fn rejects_unknown_cohort_aggregate() {
        let tmp = temp_config("bad_aggregate", |text| {
            text.replace(
                "cohort_aggregate = \"median\"",
                "cohort_aggregate = \"mode\"",
            )
        });
        let err = load_config_from(&tmp).unwrap_err();
        match &err {
            ConfigError::ValidationError { field, .. } => {
                assert_eq!(field, "imputation.cohort_aggregate");
            }
            other => panic!("expected ValidationError, got: {other}"),
        }
        let _ = fs::remove_dir_all(&tmp);
    }

    #[test]
    fn rejects_negative_floor() {
        let tmp = temp_config("neg_floor", |text| {
            text.replace("batter_pa_floor = 100.0", "batter_pa_floor = -5.0")
        });
        let err = load_config_from(&tmp).unwrap_err();
        match &err {
            ConfigError::ValidationError { field, .. } => {
                assert_eq!(field, "imputation.batter_pa_floor");
            }
            other => panic!("expected ValidationError, got: {other}"),
        }
        let _ = fs::remove_dir_all(&tmp);
    }

    #[test]
    fn optional_data_sections_may_be_omitted() {
        let tmp = temp_config("no_splits", |text| {
            text.lines()
                .filter(|line| !line.starts_with("splits_"))
                .collect::<Vec<_>>()
                .join("\n")
        });
        let config = load_config_from(&tmp).expect("should load without split paths");
        assert!(config.data.splits_batting.is_none());
        assert!(config.data.splits_pitching.is_none());
        let _ = fs::remove_dir_all(&tmp);
    }

    #[test]
    fn file_not_found_for_missing_pipeline_toml() {
        let tmp = std::env::temp_dir().join("tablesetter_config_missing");
        let _ = fs::remove_dir_all(&tmp);
        fs::create_dir_all(tmp.join("config")).unwrap();

        let err = load_config_from(&tmp).unwrap_err();
        match &err {
            ConfigError::FileNotFound { path } => {
                assert!(path.ends_with("pipeline.toml"));
            }
            other => panic!("expected FileNotFound, got: {other}"),
        }
        let _ = fs::remove_dir_all(&tmp);
    }

    #[test]
    fn parse_error_for_invalid_toml() {
        let tmp = std::env::temp_dir().join("tablesetter_config_invalid");
        let config_dir = tmp.join("config");
        let _ = fs::remove_dir_all(&tmp);
        fs::create_dir_all(&config_dir).unwrap();
        fs::write(config_dir.join("pipeline.toml"), "this is not valid [[[ toml").unwrap();

        let err = load_config_from(&tmp).unwrap_err();
        match &err {
            ConfigError::ParseError { path, .. } => {
                assert!(path.ends_with("pipeline.toml"));
            }
            other => panic!("expected ParseError, got: {other}"),
        }
        let _ = fs::remove_dir_all(&tmp);
    }

    #[test]
    fn ensure_config_files_copies_missing_files() {
        let tmp = std::env::temp_dir().join("tablesetter_config_ensure");
        let _ = fs::remove_dir_all(&tmp);

        let defaults_dir = tmp.join("defaults");
        fs::create_dir_all(&defaults_dir).unwrap();
        fs::copy(
            project_root().join("defaults/pipeline.toml"),
            defaults_dir.join("pipeline.toml"),
        )
        .unwrap();
        fs::write(defaults_dir.join("pipeline.toml.example"), "# template\n").unwrap();

        assert!(!tmp.join("config").exists());
        let copied = ensure_config_files(&tmp).expect("should succeed");
        assert_eq!(copied.len(), 1);
        assert!(tmp.join("config/pipeline.toml").exists());
        assert!(!tmp.join("config/pipeline.toml.example").exists());

        let _ = fs::remove_dir_all(&tmp);
    }

    #[test]
    fn ensure_config_files_skips_existing() {
        let tmp = std::env::temp_dir().join("tablesetter_config_skip");
        let _ = fs::remove_dir_all(&tmp);

        let defaults_dir = tmp.join("defaults");
        let config_dir = tmp.join("config");
        fs::create_dir_all(&defaults_dir).unwrap();
        fs::create_dir_all(&config_dir).unwrap();
        fs::copy(
            project_root().join("defaults/pipeline.toml"),
            defaults_dir.join("pipeline.toml"),
        )
        .unwrap();
        fs::write(config_dir.join("pipeline.toml"), "# custom\n").unwrap();

        let copied = ensure_config_files(&tmp).expect("should succeed");
        assert!(copied.is_empty());
        let content = fs::read_to_string(config_dir.join("pipeline.toml")).unwrap();
        assert_eq!(content, "# custom\n");

        let _ = fs::remove_dir_all(&tmp);
    }

    #[test]
    fn ensure_config_files_errors_when_both_dirs_missing() {
        let tmp = std::env::temp_dir().join("tablesetter_config_both_missing");
        let _ = fs::remove_dir_all(&tmp);
        fs::create_dir_all(&tmp).unwrap();

        let err = ensure_config_files(&tmp).unwrap_err();
        match &err {
            ConfigError::DefaultsCopyError { message } => {
                assert!(message.contains("neither defaults/ nor config/"));
            }
            other => panic!("expected DefaultsCopyError, got: {other}"),
        }
        let _ = fs::remove_dir_all(&tmp);
    }
}
