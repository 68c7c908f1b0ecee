/*!
 * Two-pass pipeline orchestration
 *
 * Loads the optional enrichment files, runs Pass 1 over the claims input,
 * selects the top sets, runs Pass 2 restricted to them, builds the output
 * tables and writes them. Every aggregator is owned by a single run and
 * dropped when it ends.
 */

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use log::{info, warn};

use crate::category::ProcedureCategory;
use crate::config::PipelineConfig;
use crate::data_types::Totals;
use crate::detail::{DetailAggregates, DetailAggregator};
use crate::enrichment::{ProcedureDescriptions, ProviderDirectory};
use crate::export::{JsonTableWriter, WrittenTable};
use crate::reader::{ClaimsReader, ScanStats};
use crate::selection::{rank_providers, TopSets};
use crate::tables::{BuildInputs, OutputTables};
use crate::totals::{PassOneTotals, TotalsAggregator};
use crate::{Result, RollupError};

/// Procedures listed in the run report
const REPORT_TOP_PROCEDURES: usize = 10;

/// Builder for a pipeline run
///
/// # Example
/// ```no_run
/// # use medicaid_rollup::pipeline::PipelineBuilder;
/// let report = PipelineBuilder::new()
///     .input("data/medicaid-provider-spending.csv")
///     .provider_directory("data/npi-lookup-full.json")
///     .provider_directory("data/npi-states.json")
///     .procedure_descriptions("data/hcpcs-descriptions.json")
///     .output_dir("public/data")
///     .build()?
///     .run()?;
/// # Ok::<(), medicaid_rollup::RollupError>(())
/// ```
pub struct PipelineBuilder {
    inputs: Vec<PathBuf>,
    config: Option<PipelineConfig>,
    provider_directories: Vec<PathBuf>,
    procedure_descriptions: Vec<PathBuf>,
    output_dir: Option<PathBuf>,
    #[cfg(feature = "progress")]
    show_progress: Option<bool>,
}

impl Default for PipelineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl PipelineBuilder {
    pub fn new() -> Self {
        Self {
            inputs: Vec::new(),
            config: None,
            provider_directories: Vec::new(),
            procedure_descriptions: Vec::new(),
            output_dir: None,
            #[cfg(feature = "progress")]
            show_progress: None,
        }
    }

    /// Add a claims CSV. Several inputs are scanned in order as one source.
    pub fn input<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.inputs.push(path.as_ref().to_path_buf());
        self
    }

    pub fn inputs<I, P>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        self.inputs.extend(paths.into_iter().map(|p| p.as_ref().to_path_buf()));
        self
    }

    /// Use this configuration instead of the defaults
    pub fn config(mut self, config: PipelineConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Add a provider directory file. Files added here take priority over
    /// those named in the configuration, in the order added.
    pub fn provider_directory<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.provider_directories.push(path.as_ref().to_path_buf());
        self
    }

    /// Add a procedure description file, with the same priority rules as
    /// [`PipelineBuilder::provider_directory`]
    pub fn procedure_descriptions<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.procedure_descriptions.push(path.as_ref().to_path_buf());
        self
    }

    /// Directory the JSON tables are written to
    pub fn output_dir<P: AsRef<Path>>(mut self, dir: P) -> Self {
        self.output_dir = Some(dir.as_ref().to_path_buf());
        self
    }

    #[cfg(feature = "progress")]
    /// Enable or disable progress bars
    pub fn show_progress(mut self, show: bool) -> Self {
        self.show_progress = Some(show);
        self
    }

    /// Validate the settings and produce a runnable pipeline
    ///
    /// Input files are not opened here; a missing input is reported by
    /// the run before any work starts.
    pub fn build(self) -> Result<Pipeline> {
        if self.inputs.is_empty() {
            return Err(RollupError::Custom {
                message: "No claims input specified".to_string(),
                suggestion: Some("Use .input() to add the claims CSV".to_string()),
            });
        }

        let mut config = self.config.unwrap_or_default();
        config.provider_directories = prepend(self.provider_directories, config.provider_directories);
        config.procedure_descriptions = prepend(self.procedure_descriptions, config.procedure_descriptions);
        if let Some(dir) = self.output_dir {
            config.output_dir = dir;
        }
        #[cfg(feature = "progress")]
        if let Some(show) = self.show_progress {
            config.show_progress = show;
        }
        config.validate()?;

        Ok(Pipeline {
            inputs: self.inputs,
            config,
        })
    }
}

fn prepend(mut first: Vec<PathBuf>, rest: Vec<PathBuf>) -> Vec<PathBuf> {
    for path in rest {
        if !first.contains(&path) {
            first.push(path);
        }
    }
    first
}

/// A configured pipeline over one claims input
#[derive(Debug, Clone)]
pub struct Pipeline {
    inputs: Vec<PathBuf>,
    config: PipelineConfig,
}

impl Pipeline {
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn inputs(&self) -> &[PathBuf] {
        &self.inputs
    }

    fn reader(&self) -> ClaimsReader {
        ClaimsReader::from_paths(self.inputs.clone())
            .with_header_validation(self.config.validate_headers)
            .with_progress_bar(self.config.show_progress)
            .with_progress_interval(self.config.progress_interval)
            .with_max_row_warnings(self.config.max_row_warnings)
    }

    /// Load every configured enrichment file that exists
    pub fn load_enrichment(&self) -> Result<(Option<ProviderDirectory>, Option<ProcedureDescriptions>)> {
        let directory = ProviderDirectory::load_optional(&self.config.provider_directories)?;
        if directory.is_none() {
            warn!("No provider directory loaded; state tables will be empty");
        }
        let descriptions = ProcedureDescriptions::load_optional(&self.config.procedure_descriptions)?;
        Ok((directory, descriptions))
    }

    /// Run Pass 1 only
    pub fn totals_only(&self) -> Result<(PassOneTotals, ScanStats)> {
        let reader = self.reader();
        reader.check_sources()?;
        self.pass_one(&reader)
    }

    fn pass_one(&self, reader: &ClaimsReader) -> Result<(PassOneTotals, ScanStats)> {
        info!("Pass 1: totals (cutoff {})", self.config.cutoff_month);
        let mut aggregator = TotalsAggregator::new(self.config.cutoff_month);
        let stats = reader.scan("Pass 1", |record| aggregator.observe(record))?;
        let totals = aggregator.finish();
        info!(
            "Pass 1: {} procedures, {} providers, {} months",
            totals.procedures.len(),
            totals.providers.len(),
            totals.months.len()
        );
        if totals.rows == 0 {
            warn!("Pass 1: no valid rows; every table will be empty");
        }
        Ok((totals, stats))
    }

    fn pass_two(
        &self,
        reader: &ClaimsReader,
        sets: &TopSets,
        directory: Option<&ProviderDirectory>,
    ) -> Result<(DetailAggregates, ScanStats)> {
        info!("Pass 2: detail for top sets");
        let mut aggregator = DetailAggregator::new(
            sets,
            self.config.sample_cap,
            self.config.sampling,
            self.config.sample_seed,
        )
        .with_directory(directory);
        let stats = reader.scan("Pass 2", |record| aggregator.observe(record))?;
        let detail = aggregator.finish();
        info!(
            "Pass 2: {} rows matched, {} provider x procedure entries",
            detail.rows_matched,
            detail.provider_procedures.values().map(|m| m.len()).sum::<usize>()
        );
        Ok((detail, stats))
    }

    /// Run both passes and build the tables without writing anything
    pub fn compute(&self) -> Result<(OutputTables, PipelineReport)> {
        let start = Instant::now();
        let reader = self.reader();
        reader.check_sources()?;

        let (directory, descriptions) = self.load_enrichment()?;

        let (totals, pass_one) = self.pass_one(&reader)?;

        let sets = self.config.selector().select(&totals);
        info!(
            "Selected {} top procedures, {} top providers, {} monthly providers",
            sets.procedures.len(),
            sets.providers.len(),
            sets.monthly_providers.len()
        );

        let (detail, pass_two) = self.pass_two(&reader, &sets, directory.as_ref())?;

        let tables = self.config.table_builder().build(&BuildInputs {
            totals: &totals,
            sets: &sets,
            detail: &detail,
            directory: directory.as_ref(),
            descriptions: descriptions.as_ref(),
        });

        let report = PipelineReport {
            pass_one,
            pass_two,
            grand_total: totals.grand_total(),
            distinct_procedures: totals.procedures.len(),
            distinct_providers: totals.providers.len(),
            months: totals.months.len(),
            top_procedures: sets.procedures.len(),
            top_providers: sets.providers.len(),
            monthly_providers: sets.monthly_providers.len(),
            rows_matched: detail.rows_matched,
            directory_entries: directory.as_ref().map(ProviderDirectory::len),
            description_entries: descriptions.as_ref().map(ProcedureDescriptions::len),
            table_rows: tables.row_counts(),
            leading_procedures: leading_procedures(&totals, &sets),
            written: Vec::new(),
            elapsed: start.elapsed(),
        };

        Ok((tables, report))
    }

    /// Run the pipeline and write every table to the output directory
    pub fn run(&self) -> Result<PipelineReport> {
        let start = Instant::now();
        let (tables, mut report) = self.compute()?;

        let writer = JsonTableWriter::new().with_pretty_print(self.config.pretty_json);
        report.written = writer.write_all(&tables, &self.config.output_dir)?;
        report.elapsed = start.elapsed();

        info!(
            "Wrote {} tables to {} in {:.1}s",
            report.written.len(),
            self.config.output_dir.display(),
            report.elapsed.as_secs_f64()
        );
        Ok(report)
    }
}

fn leading_procedures(totals: &PassOneTotals, sets: &TopSets) -> Vec<LeadingProcedure> {
    sets.ranked_procedures
        .iter()
        .take(REPORT_TOP_PROCEDURES)
        .filter_map(|code| {
            totals.procedures.get(code).map(|entry| LeadingProcedure {
                code: code.clone(),
                category: ProcedureCategory::classify(code),
                totals: entry.totals,
            })
        })
        .collect()
}

/// Top providers by paid, for the CLI `totals` command
pub fn leading_providers(totals: &PassOneTotals, limit: usize) -> Vec<(String, Totals)> {
    rank_providers(&totals.providers)
        .into_iter()
        .take(limit)
        .filter_map(|npi| totals.providers.get(npi).map(|p| (npi.to_string(), p.totals)))
        .collect()
}

/// One line of the report's top procedures list
#[derive(Debug, Clone, PartialEq)]
pub struct LeadingProcedure {
    pub code: String,
    pub category: ProcedureCategory,
    pub totals: Totals,
}

/// Summary of a pipeline run
#[derive(Debug, Clone)]
pub struct PipelineReport {
    pub pass_one: ScanStats,
    pub pass_two: ScanStats,
    pub grand_total: Totals,
    pub distinct_procedures: usize,
    pub distinct_providers: usize,
    pub months: usize,
    pub top_procedures: usize,
    pub top_providers: usize,
    pub monthly_providers: usize,
    /// Pass 2 rows that fed at least one detail map
    pub rows_matched: u64,
    pub directory_entries: Option<usize>,
    pub description_entries: Option<usize>,
    pub table_rows: Vec<(&'static str, usize)>,
    pub leading_procedures: Vec<LeadingProcedure>,
    /// Files written by [`Pipeline::run`]; empty after [`Pipeline::compute`]
    pub written: Vec<WrittenTable>,
    pub elapsed: Duration,
}

impl PipelineReport {
    pub fn print_summary(&self) {
        println!("=== Medicaid Rollup Summary ===");
        println!(
            "Rows read: {} ({} valid, {} skipped)",
            self.pass_one.rows_read,
            self.pass_one.rows_valid,
            self.pass_one.rows_skipped()
        );
        for (reason, count) in &self.pass_one.skipped {
            println!("  {reason}: {count}");
        }
        println!("Total paid: ${:.2}", self.grand_total.paid);
        println!("Total claims: {}", self.grand_total.claims);
        println!(
            "Distinct procedures: {}, providers: {}, months: {}",
            self.distinct_procedures, self.distinct_providers, self.months
        );
        println!(
            "Top sets: {} procedures, {} providers, {} monthly providers",
            self.top_procedures, self.top_providers, self.monthly_providers
        );
        println!("Pass 2 rows matched: {}", self.rows_matched);
        match self.directory_entries {
            Some(n) => println!("Provider directory entries: {n}"),
            None => println!("Provider directory: not loaded"),
        }
        if let Some(n) = self.description_entries {
            println!("Procedure descriptions: {n}");
        }

        println!();
        println!("Tables:");
        for (table, rows) in &self.table_rows {
            println!("  {table:<22} {rows:>8} rows");
        }

        if !self.leading_procedures.is_empty() {
            println!();
            println!("Top procedures by paid:");
            for (i, entry) in self.leading_procedures.iter().enumerate() {
                println!(
                    "  {:>2}. {:<8} {:<22} ${:.2}",
                    i + 1,
                    entry.code,
                    entry.category.label(),
                    entry.totals.paid
                );
            }
        }

        if !self.written.is_empty() {
            println!();
            println!("Written:");
            for table in &self.written {
                println!("  {} ({} rows)", table.path.display(), table.rows);
            }
        }
        println!("Elapsed: {:.1}s", self.elapsed.as_secs_f64());
    }
}
