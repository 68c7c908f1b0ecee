/*!
 * Configuration support for the rollup pipeline
 *
 * Every field has a default. Values are layered: built-in defaults, then an
 * optional TOML file, then `MEDROLLUP_*` environment variables.
 */

use std::path::{Path, PathBuf};

use config::{Config, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};

use crate::analytics::OutlierRule;
use crate::constants::*;
use crate::data_types::Month;
use crate::detail::SamplingStrategy;
use crate::selection::TopKSelector;
use crate::tables::TableBuilder;
use crate::{Result, RollupError};

/// Pipeline configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// First month of the late period for growth metrics
    pub cutoff_month: Month,

    /// Procedures that get detail aggregation (N)
    pub top_procedures: usize,
    /// Providers in the provider summary and cost-index detail (M)
    pub top_providers: usize,
    /// Providers that get month-level detail (P)
    pub monthly_providers: usize,

    /// Top procedures emitted in procedure-monthly
    pub procedure_monthly_limit: usize,
    /// Providers kept per procedure in provider-procedures
    pub providers_per_procedure: usize,
    pub outlier_limit: usize,

    /// Cost-per-claim values kept per procedure for the median
    pub sample_cap: usize,
    pub sampling: SamplingStrategy,
    /// Seed for reservoir sampling
    pub sample_seed: u64,

    pub outlier_min_claims: u64,
    pub outlier_min_paid: f64,
    pub high_cost_index: f64,
    pub low_cost_index: f64,

    pub show_progress: bool,
    /// Rows between progress log lines (0 disables)
    pub progress_interval: u64,
    pub validate_headers: bool,
    /// Skipped rows logged individually before going quiet
    pub max_row_warnings: u64,

    pub pretty_json: bool,
    pub output_dir: PathBuf,

    /// Provider directory files, highest priority first
    pub provider_directories: Vec<PathBuf>,
    /// Procedure description files, highest priority first
    pub procedure_descriptions: Vec<PathBuf>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            cutoff_month: DEFAULT_CUTOFF_MONTH,
            top_procedures: DEFAULT_TOP_PROCEDURES,
            top_providers: DEFAULT_TOP_PROVIDERS,
            monthly_providers: DEFAULT_MONTHLY_PROVIDERS,
            procedure_monthly_limit: DEFAULT_PROCEDURE_MONTHLY_LIMIT,
            providers_per_procedure: DEFAULT_PROVIDERS_PER_PROCEDURE,
            outlier_limit: DEFAULT_OUTLIER_LIMIT,
            sample_cap: DEFAULT_SAMPLE_CAP,
            sampling: SamplingStrategy::FirstN,
            sample_seed: 0,
            outlier_min_claims: 100,
            outlier_min_paid: 10_000.0,
            high_cost_index: 2.0,
            low_cost_index: 0.5,
            show_progress: true,
            progress_interval: DEFAULT_PROGRESS_INTERVAL,
            validate_headers: false,
            max_row_warnings: DEFAULT_MAX_ROW_WARNINGS,
            pretty_json: false,
            output_dir: PathBuf::from(DEFAULT_OUTPUT_DIR),
            provider_directories: Vec::new(),
            procedure_descriptions: Vec::new(),
        }
    }
}

impl PipelineConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load configuration from `MEDROLLUP_*` environment variables over defaults
    ///
    /// Keys are the field names in upper case, e.g. `MEDROLLUP_TOP_PROVIDERS=5000`
    /// or `MEDROLLUP_SAMPLING=reservoir`.
    pub fn from_env() -> Result<Self> {
        Self::layered(None)
    }

    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(RollupError::file_not_found_with_suggestion(path.to_path_buf()));
        }
        let contents = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let contents = toml::to_string_pretty(self)?;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, contents)?;
        Ok(())
    }

    /// Get the default configuration file path
    ///
    /// Returns `~/.config/medrollup/config.toml` on Unix-like systems
    /// or `%APPDATA%\medrollup\config.toml` on Windows
    pub fn default_config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("", "", "medrollup").map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// Load configuration from the default location and the environment
    ///
    /// Priority order:
    /// 1. Environment variables
    /// 2. Default config file (if it exists)
    /// 3. Built-in defaults
    pub fn load() -> Result<Self> {
        Self::layered(Self::default_config_path().as_deref())
    }

    /// Like [`load`](Self::load) with an explicit config file instead of the default one
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.is_file() {
            return Err(RollupError::file_not_found_with_suggestion(path.to_path_buf()));
        }
        Self::layered(Some(path))
    }

    fn layered(file: Option<&Path>) -> Result<Self> {
        let mut builder = Config::builder();
        if let Some(path) = file {
            builder = builder.add_source(File::from(path).format(FileFormat::Toml).required(false));
        }
        let config: Self = builder
            .add_source(Environment::with_prefix(ENV_PREFIX).try_parsing(true))
            .build()?
            .try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Check cross-field constraints
    pub fn validate(&self) -> Result<()> {
        let nonzero = [
            ("top_procedures", self.top_procedures),
            ("top_providers", self.top_providers),
            ("sample_cap", self.sample_cap),
        ];
        for (name, value) in nonzero {
            if value == 0 {
                return Err(RollupError::configuration(
                    format!("{name} must be greater than zero"),
                    None,
                ));
            }
        }
        if self.monthly_providers > self.top_providers {
            return Err(RollupError::configuration(
                format!(
                    "monthly_providers ({}) cannot exceed top_providers ({})",
                    self.monthly_providers, self.top_providers
                ),
                Some("Month-level providers are a subset of the top providers"),
            ));
        }
        if !(self.low_cost_index > 0.0 && self.low_cost_index < self.high_cost_index) {
            return Err(RollupError::configuration(
                format!(
                    "cost index thresholds must satisfy 0 < low ({}) < high ({})",
                    self.low_cost_index, self.high_cost_index
                ),
                None,
            ));
        }
        if self.outlier_min_paid.is_nan() || self.outlier_min_paid < 0.0 {
            return Err(RollupError::configuration("outlier_min_paid must be non-negative", None));
        }
        Ok(())
    }

    pub fn selector(&self) -> TopKSelector {
        TopKSelector::new(self.top_procedures, self.top_providers, self.monthly_providers)
    }

    pub fn outlier_rule(&self) -> OutlierRule {
        OutlierRule {
            min_claims: self.outlier_min_claims,
            min_paid: self.outlier_min_paid,
            high_index: self.high_cost_index,
            low_index: self.low_cost_index,
        }
    }

    pub fn table_builder(&self) -> TableBuilder {
        TableBuilder {
            procedure_monthly_limit: self.procedure_monthly_limit,
            providers_per_procedure: self.providers_per_procedure,
            outlier_limit: self.outlier_limit,
            outlier_rule: self.outlier_rule(),
        }
    }
}

/// Builder for customizing configuration
#[derive(Debug, Default)]
pub struct ConfigBuilder {
    config: PipelineConfig,
}

impl ConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cutoff_month(mut self, month: Month) -> Self {
        self.config.cutoff_month = month;
        self
    }

    /// Set the N / M / P selection thresholds
    pub fn top_k(mut self, procedures: usize, providers: usize, monthly_providers: usize) -> Self {
        self.config.top_procedures = procedures;
        self.config.top_providers = providers;
        self.config.monthly_providers = monthly_providers;
        self
    }

    pub fn procedure_monthly_limit(mut self, limit: usize) -> Self {
        self.config.procedure_monthly_limit = limit;
        self
    }

    pub fn providers_per_procedure(mut self, limit: usize) -> Self {
        self.config.providers_per_procedure = limit;
        self
    }

    pub fn outlier_limit(mut self, limit: usize) -> Self {
        self.config.outlier_limit = limit;
        self
    }

    pub fn sampling(mut self, strategy: SamplingStrategy, cap: usize, seed: u64) -> Self {
        self.config.sampling = strategy;
        self.config.sample_cap = cap;
        self.config.sample_seed = seed;
        self
    }

    pub fn outlier_rule(mut self, rule: OutlierRule) -> Self {
        self.config.outlier_min_claims = rule.min_claims;
        self.config.outlier_min_paid = rule.min_paid;
        self.config.high_cost_index = rule.high_index;
        self.config.low_cost_index = rule.low_index;
        self
    }

    pub fn progress(mut self, show: bool) -> Self {
        self.config.show_progress = show;
        self
    }

    pub fn progress_interval(mut self, rows: u64) -> Self {
        self.config.progress_interval = rows;
        self
    }

    pub fn validate_headers(mut self, validate: bool) -> Self {
        self.config.validate_headers = validate;
        self
    }

    pub fn pretty_json(mut self, pretty: bool) -> Self {
        self.config.pretty_json = pretty;
        self
    }

    pub fn output_dir<P: AsRef<Path>>(mut self, dir: P) -> Self {
        self.config.output_dir = dir.as_ref().to_path_buf();
        self
    }

    pub fn provider_directory<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.config.provider_directories.push(path.as_ref().to_path_buf());
        self
    }

    pub fn procedure_descriptions<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.config.procedure_descriptions.push(path.as_ref().to_path_buf());
        self
    }

    /// Build and validate the configuration
    pub fn build(self) -> Result<PipelineConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_config_defaults() {
        let config = PipelineConfig::default();
        assert_eq!(config.cutoff_month.to_string(), "2021-07");
        assert_eq!(config.top_procedures, 200);
        assert_eq!(config.top_providers, 10_000);
        assert_eq!(config.monthly_providers, 1_000);
        assert_eq!(config.outlier_limit, 5_000);
        assert_eq!(config.sample_cap, 10_000);
        assert_eq!(config.sampling, SamplingStrategy::FirstN);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_builder() {
        let config = ConfigBuilder::new()
            .top_k(10, 100, 5)
            .procedure_monthly_limit(20)
            .sampling(SamplingStrategy::Reservoir, 500, 42)
            .pretty_json(true)
            .output_dir("/tmp/tables")
            .build()
            .unwrap();

        assert_eq!(config.top_procedures, 10);
        assert_eq!(config.monthly_providers, 5);
        assert_eq!(config.sampling, SamplingStrategy::Reservoir);
        assert_eq!(config.sample_seed, 42);
        assert!(config.pretty_json);
        assert_eq!(config.output_dir, PathBuf::from("/tmp/tables"));
    }

    #[test]
    fn test_validation_rejects_inconsistent_thresholds() {
        assert!(ConfigBuilder::new().top_k(10, 100, 500).build().is_err());
        assert!(ConfigBuilder::new().top_k(0, 100, 5).build().is_err());

        let inverted = OutlierRule { high_index: 0.4, ..OutlierRule::default() };
        assert!(ConfigBuilder::new().outlier_rule(inverted).build().is_err());
    }

    #[test]
    fn test_save_and_load_roundtrip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("config.toml");
        let config = ConfigBuilder::new()
            .cutoff_month(Month::parse("2022-01").unwrap())
            .top_k(50, 500, 50)
            .provider_directory("data/npi-states.json")
            .build()
            .unwrap();

        config.save(&path).unwrap();
        let loaded = PipelineConfig::from_file(&path).unwrap();
        assert_eq!(loaded, config);

        let layered = PipelineConfig::load_from(&path).unwrap();
        assert_eq!(layered.top_procedures, 50);
        assert_eq!(layered.cutoff_month.to_string(), "2022-01");
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "top_providers = 2000\nsampling = \"reservoir\"\n").unwrap();

        let config = PipelineConfig::from_file(&path).unwrap();
        assert_eq!(config.top_providers, 2000);
        assert_eq!(config.top_procedures, 200);
        assert_eq!(config.sampling, SamplingStrategy::Reservoir);
        assert!(PipelineConfig::from_file(dir.path().join("missing.toml")).is_err());
    }
}
