use anyhow::Context;
use clap::{Args, Parser, Subcommand, ValueEnum};
use env_logger::Env;
use medicaid_rollup::pipeline::leading_providers;
use medicaid_rollup::prelude::*;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "medrollup")]
#[command(version, about = "Medicaid spending rollup - aggregate provider claims into summary tables", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run both passes and write the JSON tables
    Run(RunArgs),
    /// Run Pass 1 only and print the leading procedures and providers
    Totals(TotalsArgs),
    /// Write a SQL bulk-load script from a directory of JSON tables
    Load(LoadArgs),
    /// Print the category of procedure codes
    Classify(ClassifyArgs),
    /// Print or save the effective configuration
    Config(ConfigArgs),
}

#[derive(Args)]
struct ConfigSource {
    /// TOML configuration file (defaults to the user config directory)
    #[arg(short, long, env = "MEDROLLUP_CONFIG")]
    config: Option<PathBuf>,
}

#[derive(Args)]
struct RunArgs {
    /// Claims CSV files, scanned in order as one input
    #[arg(required = true)]
    inputs: Vec<PathBuf>,
    #[command(flatten)]
    source: ConfigSource,
    /// Output directory for the JSON tables
    #[arg(short, long)]
    output: Option<PathBuf>,
    /// Provider directory JSON (repeatable, earlier files win)
    #[arg(long = "directory")]
    directories: Vec<PathBuf>,
    /// Procedure description JSON (repeatable, earlier files win)
    #[arg(long = "descriptions")]
    descriptions: Vec<PathBuf>,
    /// Early/late cutoff month (YYYY-MM)
    #[arg(long)]
    cutoff: Option<String>,
    /// Pretty-print the JSON tables
    #[arg(long)]
    pretty: bool,
    /// Use seeded reservoir sampling for cost medians
    #[arg(long)]
    reservoir: bool,
    /// Seed for reservoir sampling
    #[arg(long)]
    seed: Option<u64>,
    /// Check the claims header before reading
    #[arg(long)]
    validate_headers: bool,
    /// Disable progress bars
    #[arg(long)]
    no_progress: bool,
}

#[derive(Args)]
struct TotalsArgs {
    /// Claims CSV files
    #[arg(required = true)]
    inputs: Vec<PathBuf>,
    #[command(flatten)]
    source: ConfigSource,
    /// Rows to print per list
    #[arg(long, default_value_t = 20)]
    limit: usize,
    /// Disable progress bars
    #[arg(long)]
    no_progress: bool,
}

#[derive(Args)]
struct LoadArgs {
    /// Directory containing the JSON tables
    #[arg(short, long, default_value = "data")]
    tables: PathBuf,
    /// Output SQL script
    #[arg(short, long)]
    output: PathBuf,
    /// SQL dialect
    #[arg(long, value_enum, default_value_t = DialectOpt::Sqlite)]
    dialect: DialectOpt,
    /// Rows per INSERT statement
    #[arg(long, default_value_t = medicaid_rollup::constants::SQL_BATCH_SIZE)]
    batch_size: usize,
}

#[derive(Args)]
struct ClassifyArgs {
    /// Procedure codes
    #[arg(required = true)]
    codes: Vec<String>,
}

#[derive(Args)]
struct ConfigArgs {
    #[command(flatten)]
    source: ConfigSource,
    /// Save the effective configuration to this file
    #[arg(long)]
    save: Option<PathBuf>,
    /// Save to the default config location
    #[arg(long, conflicts_with = "save")]
    save_default: bool,
}

#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, ValueEnum)]
enum DialectOpt {
    Sqlite,
    Postgres,
}

impl From<DialectOpt> for SqlDialect {
    fn from(opt: DialectOpt) -> Self {
        match opt {
            DialectOpt::Sqlite => SqlDialect::SQLite,
            DialectOpt::Postgres => SqlDialect::PostgreSQL,
        }
    }
}

fn main() {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let result = match cli.command {
        Commands::Run(args) => cmd_run(args),
        Commands::Totals(args) => cmd_totals(args),
        Commands::Load(args) => cmd_load(args),
        Commands::Classify(args) => cmd_classify(args),
        Commands::Config(args) => cmd_config(args),
    };

    if let Err(err) = result {
        match err.downcast_ref::<RollupError>() {
            Some(e) => eprintln!("Error: {}", e.user_message()),
            None => eprintln!("Error: {err:#}"),
        }
        std::process::exit(1);
    }
}

fn load_config(source: &ConfigSource) -> anyhow::Result<PipelineConfig> {
    let config = match &source.config {
        Some(path) => PipelineConfig::load_from(path)
            .with_context(|| format!("loading configuration from {}", path.display()))?,
        None => PipelineConfig::load()?,
    };
    Ok(config)
}

fn cmd_run(args: RunArgs) -> anyhow::Result<()> {
    let mut config = load_config(&args.source)?;
    if let Some(cutoff) = args.cutoff.as_deref() {
        config.cutoff_month = cutoff.parse::<Month>()?;
    }
    if args.pretty {
        config.pretty_json = true;
    }
    if args.reservoir {
        config.sampling = SamplingStrategy::Reservoir;
    }
    if let Some(seed) = args.seed {
        config.sample_seed = seed;
    }
    if args.validate_headers {
        config.validate_headers = true;
    }
    if args.no_progress {
        config.show_progress = false;
    }

    let mut builder = PipelineBuilder::new().inputs(&args.inputs).config(config);
    for path in &args.directories {
        builder = builder.provider_directory(path);
    }
    for path in &args.descriptions {
        builder = builder.procedure_descriptions(path);
    }
    if let Some(dir) = &args.output {
        builder = builder.output_dir(dir);
    }

    let report = builder.build()?.run()?;
    report.print_summary();
    Ok(())
}

fn cmd_totals(args: TotalsArgs) -> anyhow::Result<()> {
    let mut config = load_config(&args.source)?;
    if args.no_progress {
        config.show_progress = false;
    }
    let pipeline = PipelineBuilder::new().inputs(&args.inputs).config(config).build()?;
    let (totals, stats) = pipeline.totals_only()?;

    let grand = totals.grand_total();
    println!("=== Pass 1 Totals ===");
    println!(
        "Rows: {} valid, {} skipped",
        stats.rows_valid,
        stats.rows_skipped()
    );
    println!("Total paid: ${:.2}  claims: {}", grand.paid, grand.claims);
    println!(
        "Procedures: {}  providers: {}  months: {}",
        totals.procedures.len(),
        totals.providers.len(),
        totals.months.len()
    );

    println!("\nTop procedures by paid:");
    let selector = pipeline.config().selector();
    let sets = selector.select(&totals);
    for (i, code) in sets.ranked_procedures.iter().take(args.limit).enumerate() {
        if let Some(entry) = totals.procedures.get(code) {
            println!(
                "  {:>3}. {:<8} {:<22} ${:>16.2}  {:>12} claims",
                i + 1,
                code,
                ProcedureCategory::classify(code).label(),
                entry.totals.paid,
                entry.totals.claims
            );
        }
    }

    println!("\nTop providers by paid:");
    for (i, (npi, t)) in leading_providers(&totals, args.limit).iter().enumerate() {
        println!("  {:>3}. {:<12} ${:>16.2}  {:>12} claims", i + 1, npi, t.paid, t.claims);
    }
    Ok(())
}

fn cmd_load(args: LoadArgs) -> anyhow::Result<()> {
    let exporter = SqlExporter::new()
        .with_dialect(args.dialect.into())
        .with_batch_size(args.batch_size);
    let summary = exporter.export_dir(&args.tables, &args.output)?;

    for (table, rows) in &summary.tables {
        println!("  {table:<22} {rows:>8} rows");
    }
    for table in &summary.skipped {
        println!("  {table:<22} skipped (file not found)");
    }
    println!("SQL script written to {}", args.output.display());
    Ok(())
}

fn cmd_classify(args: ClassifyArgs) -> anyhow::Result<()> {
    for code in &args.codes {
        println!("{}\t{}", code, ProcedureCategory::classify(code.trim()));
    }
    Ok(())
}

fn cmd_config(args: ConfigArgs) -> anyhow::Result<()> {
    let config = load_config(&args.source)?;
    let target = match (args.save, args.save_default) {
        (Some(path), _) => Some(path),
        (None, true) => Some(
            PipelineConfig::default_config_path()
                .context("no user configuration directory available")?,
        ),
        (None, false) => None,
    };

    match target {
        Some(path) => {
            config.save(&path)?;
            println!("Configuration saved to {}", path.display());
        }
        None => print!("{}", toml::to_string_pretty(&config)?),
    }
    Ok(())
}
