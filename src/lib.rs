/*!
 * # Medicaid Provider Spending Rollup
 *
 * A two-pass aggregation pipeline over Medicaid provider-level claims data.
 * It turns a very large row-oriented claims file (provider × procedure ×
 * month) into ten bounded summary tables for a read-only explorer.
 *
 * ## Features
 *
 * - **Bounded memory**: Pass 1 keeps flat totals only; Pass 2 keeps detail
 *   for the top-N procedures and top-M providers
 * - **Streaming input**: rows are read one at a time, the source is re-opened
 *   for each pass
 * - **Derived metrics**: approximate medians, cost indexes, growth rates and
 *   outlier flags
 * - **Optional enrichment**: provider directory and procedure description
 *   files add state, names and descriptions
 * - **Export**: JSON table files written atomically plus a SQL bulk-load script
 *
 * ## Quick Start
 *
 * ```no_run
 * use medicaid_rollup::prelude::*;
 *
 * # fn main() -> Result<()> {
 * let report = PipelineBuilder::new()
 *     .input("data/medicaid-provider-spending.csv")
 *     .provider_directory("data/npi-lookup-full.json")
 *     .procedure_descriptions("data/hcpcs-descriptions.json")
 *     .output_dir("public/data")
 *     .build()?
 *     .run()?;
 *
 * report.print_summary();
 * # Ok(())
 * # }
 * ```
 *
 * ## Configuration
 *
 * ```no_run
 * # use medicaid_rollup::prelude::*;
 * # fn main() -> Result<()> {
 * let config = ConfigBuilder::new()
 *     .top_k(100, 5_000, 500)
 *     .sampling(SamplingStrategy::Reservoir, 10_000, 42)
 *     .progress(false)
 *     .build()?;
 *
 * let (tables, _report) = PipelineBuilder::new()
 *     .input("claims.csv")
 *     .config(config)
 *     .build()?
 *     .compute()?;
 * println!("{} outliers", tables.outliers.len());
 * # Ok(())
 * # }
 * ```
 *
 * Settings can also come from a TOML file (see [`config::PipelineConfig::load`])
 * or `MEDROLLUP_*` environment variables.
 *
 * ## Input File
 *
 * CSV with a header row and at least seven columns:
 * `BILLING_PROVIDER_NPI_NUM, SERVICING_PROVIDER_NPI_NUM, HCPCS_CODE,
 * CLAIM_FROM_MONTH, TOTAL_UNIQUE_BENEFICIARIES, TOTAL_CLAIMS, TOTAL_PAID`.
 * Malformed rows are counted and skipped.
 */

// Re-export error types from root
pub use error::{ErrorContext, ExportFormat, Result, RollupError, RowError};

// Public modules
pub mod analytics;
pub mod category;
pub mod config;
pub mod data_types;
pub mod detail;
pub mod enrichment;
pub mod error;
pub mod export;
pub mod pipeline;
pub mod reader;
pub mod schema;
pub mod selection;
pub mod tables;
pub mod totals;

/// Prelude module for convenient imports
///
/// ```
/// use medicaid_rollup::prelude::*;
/// ```
pub mod prelude {
    pub use crate::analytics::{OutlierDirection, OutlierRule};
    pub use crate::category::ProcedureCategory;
    pub use crate::config::{ConfigBuilder, PipelineConfig};
    pub use crate::data_types::{ClaimRecord, Month, Totals};
    pub use crate::detail::SamplingStrategy;
    pub use crate::enrichment::{ProcedureDescriptions, ProviderDirectory};
    pub use crate::error::{Result, RollupError};
    pub use crate::export::{JsonTableWriter, SqlDialect, SqlExporter, TableExporter};
    pub use crate::pipeline::{Pipeline, PipelineBuilder, PipelineReport};
    pub use crate::reader::ClaimsReader;
    pub use crate::tables::OutputTables;
    pub use crate::ExportFormat;
}

/// Pipeline defaults
pub mod constants {
    use crate::data_types::Month;

    /// Rows before this month are "early", rows on or after it are "late"
    pub const DEFAULT_CUTOFF_MONTH: Month = Month::from_parts(2021, 7);

    /// Procedures kept for monthly trends and cost medians
    pub const DEFAULT_TOP_PROCEDURES: usize = 200;

    /// Providers kept for provider × procedure detail
    pub const DEFAULT_TOP_PROVIDERS: usize = 10_000;

    /// Providers kept at month granularity
    pub const DEFAULT_MONTHLY_PROVIDERS: usize = 1_000;

    /// Procedures written to the procedure-monthly table
    pub const DEFAULT_PROCEDURE_MONTHLY_LIMIT: usize = 100;

    /// Providers per procedure in the provider-procedures table
    pub const DEFAULT_PROVIDERS_PER_PROCEDURE: usize = 50;

    pub const DEFAULT_OUTLIER_LIMIT: usize = 5_000;

    /// Cost-per-claim samples kept per procedure
    pub const DEFAULT_SAMPLE_CAP: usize = 10_000;

    pub const DEFAULT_PROGRESS_INTERVAL: u64 = 10_000_000;
    pub const DEFAULT_MAX_ROW_WARNINGS: u64 = 10;

    pub const READ_BUFFER_SIZE: usize = 512 * 1024;

    /// Rows per multi-row INSERT in SQL scripts
    pub const SQL_BATCH_SIZE: usize = 100;

    pub const DEFAULT_OUTPUT_DIR: &str = "data";

    /// Environment variable prefix, e.g. `MEDROLLUP_TOP_PROCEDURES`
    pub const ENV_PREFIX: &str = "MEDROLLUP";
}
