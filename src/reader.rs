/*!
 * Streaming CSV reader for claims files
 *
 * Reads one record at a time into a reused buffer and hands each valid row
 * to a visitor closure. Nothing is materialised; every pass re-opens the
 * source files, so the reader can be scanned any number of times.
 */

use std::collections::BTreeMap;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use csv::{ReaderBuilder, StringRecord};
use log::{debug, info, warn};

#[cfg(feature = "progress")]
use indicatif::{ProgressBar, ProgressStyle};

use crate::{
    constants::*,
    data_types::{ClaimRecord, Month},
    schema::ClaimsSchema,
    ErrorContext, Result, RollupError, RowError,
};

/// Counters collected during one scan over the source files
#[derive(Debug, Clone, Default)]
pub struct ScanStats {
    /// Data rows read, excluding headers
    pub rows_read: u64,
    /// Rows handed to the visitor
    pub rows_valid: u64,
    /// Skipped rows by reason label
    pub skipped: BTreeMap<&'static str, u64>,
    pub bytes_read: u64,
    pub elapsed: Duration,
}

impl ScanStats {
    pub fn rows_skipped(&self) -> u64 {
        self.skipped.values().sum()
    }

    pub fn rows_per_second(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            self.rows_read as f64 / secs
        } else {
            0.0
        }
    }

    fn record_skip(&mut self, reason: RowError) {
        *self.skipped.entry(reason.label()).or_insert(0) += 1;
    }
}

/// Claims file reader over one or more CSV sources
#[derive(Debug, Clone)]
pub struct ClaimsReader {
    paths: Vec<PathBuf>,
    validate_headers: bool,
    show_progress_bar: bool,
    progress_interval: u64,
    max_row_warnings: u64,
}

impl ClaimsReader {
    /// Reader over a single claims file
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self::from_paths(vec![path.as_ref().to_path_buf()])
    }

    /// Reader over several files scanned in order as one logical input
    pub fn from_paths(paths: Vec<PathBuf>) -> Self {
        Self {
            paths,
            validate_headers: false,
            show_progress_bar: false,
            progress_interval: DEFAULT_PROGRESS_INTERVAL,
            max_row_warnings: DEFAULT_MAX_ROW_WARNINGS,
        }
    }

    pub fn with_header_validation(mut self, validate: bool) -> Self {
        self.validate_headers = validate;
        self
    }

    /// Only has an effect with the `progress` feature
    pub fn with_progress_bar(mut self, show: bool) -> Self {
        self.show_progress_bar = show;
        self
    }

    /// Log a row counter every `interval` rows (0 disables)
    pub fn with_progress_interval(mut self, interval: u64) -> Self {
        self.progress_interval = interval;
        self
    }

    pub fn with_max_row_warnings(mut self, max: u64) -> Self {
        self.max_row_warnings = max;
        self
    }

    pub fn paths(&self) -> &[PathBuf] {
        &self.paths
    }

    /// Fail fast if any source is missing
    pub fn check_sources(&self) -> Result<()> {
        if self.paths.is_empty() {
            return Err(RollupError::configuration(
                "no claims input files given",
                Some("Pass at least one claims CSV path"),
            ));
        }
        for path in &self.paths {
            if !path.is_file() {
                return Err(RollupError::file_not_found_with_suggestion(path.clone()));
            }
        }
        Ok(())
    }

    /// Total size of all sources in bytes
    pub fn total_bytes(&self) -> Result<u64> {
        let mut total = 0;
        for path in &self.paths {
            total += std::fs::metadata(path)?.len();
        }
        Ok(total)
    }

    /// Stream every valid row of every source through `visit`
    ///
    /// Malformed rows are counted in the returned stats and skipped. I/O
    /// failures abort the scan.
    pub fn scan<F>(&self, label: &str, mut visit: F) -> Result<ScanStats>
    where
        F: FnMut(&ClaimRecord<'_>),
    {
        self.check_sources()?;

        let start_time = Instant::now();
        let mut stats = ScanStats::default();
        let mut warnings_logged = 0u64;

        #[cfg(feature = "progress")]
        let progress_bar = self.progress_bar(label)?;

        for path in &self.paths {
            debug!("{}: reading {}", label, path.display());
            let file = File::open(path).map_err(|source| RollupError::Io {
                message: format!("failed to open {}: {}", path.display(), source),
                source,
                context: ErrorContext {
                    file_path: Some(path.clone()),
                    ..Default::default()
                },
            })?;

            let mut reader = ReaderBuilder::new()
                .has_headers(true)
                .flexible(true)
                .from_reader(BufReader::with_capacity(READ_BUFFER_SIZE, file));

            if self.validate_headers {
                let headers: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();
                ClaimsSchema::validate_headers(&headers)?;
            }

            let base_bytes = stats.bytes_read;
            let mut record = StringRecord::new();

            loop {
                let outcome = match reader.read_record(&mut record) {
                    Ok(false) => break,
                    Ok(true) => parse_claim(&record),
                    Err(err) => match err.kind() {
                        csv::ErrorKind::Io(_) => return Err(err.into()),
                        _ => Err(RowError::Undecodable),
                    },
                };

                stats.rows_read += 1;
                match outcome {
                    Ok(claim) => {
                        stats.rows_valid += 1;
                        visit(&claim);
                    }
                    Err(reason) => {
                        stats.record_skip(reason);
                        if warnings_logged < self.max_row_warnings {
                            warnings_logged += 1;
                            warn!(
                                "{}: skipping row {} of {}: {}",
                                label,
                                reader.position().line(),
                                path.display(),
                                reason
                            );
                        }
                    }
                }

                if self.progress_interval > 0 && stats.rows_read % self.progress_interval == 0 {
                    info!(
                        "{}: {}M rows ({:.0}s)",
                        label,
                        stats.rows_read / 1_000_000,
                        start_time.elapsed().as_secs_f64()
                    );
                }

                #[cfg(feature = "progress")]
                if let Some(ref pb) = progress_bar {
                    if stats.rows_read % 4096 == 0 {
                        pb.set_position(base_bytes + reader.position().byte());
                    }
                }
            }

            stats.bytes_read = base_bytes + reader.position().byte();
        }

        #[cfg(feature = "progress")]
        if let Some(pb) = progress_bar {
            pb.finish_with_message(format!("{label} complete"));
        }

        stats.elapsed = start_time.elapsed();

        let skipped = stats.rows_skipped();
        if skipped > 0 {
            warn!("{}: skipped {} malformed rows {:?}", label, skipped, stats.skipped);
        }
        info!(
            "{}: {} rows in {:.2}s ({:.0} rows/sec)",
            label,
            stats.rows_read,
            stats.elapsed.as_secs_f64(),
            stats.rows_per_second()
        );

        Ok(stats)
    }

    #[cfg(feature = "progress")]
    fn progress_bar(&self, label: &str) -> Result<Option<ProgressBar>> {
        if !self.show_progress_bar {
            return Ok(None);
        }
        let style = ProgressStyle::default_bar()
            .template("{msg} [{elapsed_precise}] [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({eta})")
            .map_err(|e| RollupError::Custom {
                message: format!("invalid progress template: {e}"),
                suggestion: None,
            })?
            .progress_chars("#>-");
        let pb = ProgressBar::new(self.total_bytes()?);
        pb.set_style(style);
        pb.set_message(label.to_string());
        Ok(Some(pb))
    }
}

/// Parse one CSV record into a claim row
///
/// Blank numeric fields count as zero. Text that is not a number, a month
/// that is neither `YYYY-MM` nor `YYYY-MM-DD`, and a negative paid amount
/// reject the row.
pub fn parse_claim(record: &StringRecord) -> std::result::Result<ClaimRecord<'_>, RowError> {
    let expected = ClaimsSchema::column_count();
    if record.len() < expected {
        return Err(RowError::TooFewFields { expected, found: record.len() });
    }

    let month = Month::parse(field(record, ClaimsSchema::MONTH)).ok_or(RowError::BadMonth)?;
    let beneficiaries = parse_count(field(record, ClaimsSchema::BENEFICIARIES), "beneficiaries")?;
    let claims = parse_count(field(record, ClaimsSchema::CLAIMS), "claims")?;
    let paid = parse_amount(field(record, ClaimsSchema::PAID))?;

    Ok(ClaimRecord {
        provider_id: field(record, ClaimsSchema::PROVIDER),
        procedure_code: field(record, ClaimsSchema::PROCEDURE),
        month,
        beneficiaries,
        claims,
        paid,
    })
}

fn field(record: &StringRecord, index: usize) -> &str {
    record.get(index).unwrap_or("").trim()
}

fn parse_count(raw: &str, field: &'static str) -> std::result::Result<u64, RowError> {
    if raw.is_empty() {
        return Ok(0);
    }
    raw.parse::<u64>().map_err(|_| RowError::BadNumber { field })
}

fn parse_amount(raw: &str) -> std::result::Result<f64, RowError> {
    if raw.is_empty() {
        return Ok(0.0);
    }
    let value = raw
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or(RowError::BadNumber { field: "paid" })?;
    if value < 0.0 {
        return Err(RowError::NegativeAmount);
    }
    Ok(value)
}
