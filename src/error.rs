/*!
 * Error handling for the claims rollup pipeline
 *
 * Fatal conditions (missing source, unwritable output, bad configuration) are
 * `RollupError`s. Per-row problems are `RowError`s: they are counted and the
 * row is skipped, they never abort a pass.
 */

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;
use serde::{Serialize, Deserialize};

/// Rollup library result type
pub type Result<T> = std::result::Result<T, RollupError>;

/// Fatal pipeline errors with context and suggestions
#[derive(Error, Debug)]
pub enum RollupError {
    /// File I/O errors with context
    #[error("I/O error: {message}")]
    Io {
        message: String,
        #[source]
        source: std::io::Error,
        context: ErrorContext,
    },

    /// CSV errors that are not attributable to a single skippable row
    #[error("CSV parsing error at line {line:?}: {message}")]
    CsvParse {
        message: String,
        line: Option<u64>,
        context: ErrorContext,
    },

    /// File not found with suggestions
    #[error("File not found: {path}")]
    FileNotFound {
        path: PathBuf,
        suggestion: String,
    },

    /// Header row does not match the claims file contract
    #[error("Schema mismatch: {message}")]
    SchemaMismatch {
        message: String,
        expected_columns: Option<usize>,
        found_columns: Option<usize>,
        mismatched_column: Option<(usize, String, String)>,
    },

    /// Month value that is neither `YYYY-MM` nor `YYYY-MM-DD`
    #[error("Invalid month '{value}'")]
    InvalidMonth {
        value: String,
        expected_format: String,
    },

    /// Configuration errors
    #[error("Configuration error: {message}")]
    Configuration {
        message: String,
        suggestion: Option<String>,
    },

    /// Enrichment side file present but unusable
    #[error("Enrichment error in {path}: {message}")]
    Enrichment {
        path: PathBuf,
        message: String,
    },

    /// Export errors
    #[error("Export error: {message}")]
    Export {
        message: String,
        format: ExportFormat,
        suggestion: Option<String>,
    },

    /// Generic errors with custom message
    #[error("{message}")]
    Custom {
        message: String,
        suggestion: Option<String>,
    },
}

/// Reasons a single claims row is skipped
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RowError {
    #[error("expected at least {expected} fields, found {found}")]
    TooFewFields { expected: usize, found: usize },

    #[error("field '{field}' is not a number")]
    BadNumber { field: &'static str },

    #[error("month is neither YYYY-MM nor YYYY-MM-DD")]
    BadMonth,

    #[error("paid amount is negative")]
    NegativeAmount,

    #[error("csv record could not be decoded")]
    Undecodable,
}

impl RowError {
    /// Stable label used in skip accounting
    pub fn label(&self) -> &'static str {
        match self {
            RowError::TooFewFields { .. } => "too_few_fields",
            RowError::BadNumber { .. } => "bad_number",
            RowError::BadMonth => "bad_month",
            RowError::NegativeAmount => "negative_amount",
            RowError::Undecodable => "undecodable",
        }
    }
}

/// Error context providing additional information
#[derive(Debug, Default, Clone)]
pub struct ErrorContext {
    pub file_path: Option<PathBuf>,
    pub line_number: Option<u64>,
    pub table: Option<String>,
}

/// Export format for error context
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
pub enum ExportFormat {
    #[default]
    Json,
    Sql,
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExportFormat::Json => write!(f, "JSON"),
            ExportFormat::Sql => write!(f, "SQL"),
        }
    }
}

impl RollupError {
    /// Create a file not found error with helpful suggestion
    pub fn file_not_found_with_suggestion(path: PathBuf) -> Self {
        let lossy = path.to_string_lossy();
        let suggestion = if lossy.contains("medicaid") || lossy.ends_with(".csv") {
            format!(
                "Check if the claims file exists at '{}'. The pipeline expects the provider spending CSV \
                with a header row and at least 7 columns (provider, servicing provider, HCPCS code, month, \
                beneficiaries, claims, paid).",
                path.display()
            )
        } else {
            format!(
                "Check if the file exists at '{}'. Make sure the path is correct and you have read permissions.",
                path.display()
            )
        };

        Self::FileNotFound { path, suggestion }
    }

    /// Create a schema mismatch error with detailed information
    pub fn schema_mismatch_detailed(
        expected_columns: usize,
        found_columns: usize,
        mismatched_column: Option<(usize, String, String)>,
    ) -> Self {
        let message = if let Some((index, expected, found)) = &mismatched_column {
            format!(
                "Column {} mismatch: expected '{}', found '{}'",
                index, expected, found
            )
        } else {
            format!(
                "Expected at least {} columns, found {}",
                expected_columns, found_columns
            )
        };

        Self::SchemaMismatch {
            message,
            expected_columns: Some(expected_columns),
            found_columns: Some(found_columns),
            mismatched_column,
        }
    }

    /// Create a month parsing error
    pub fn invalid_month(value: &str) -> Self {
        Self::InvalidMonth {
            value: value.to_string(),
            expected_format: "YYYY-MM or YYYY-MM-DD".to_string(),
        }
    }

    /// Create a configuration error with an optional suggestion
    pub fn configuration(message: impl Into<String>, suggestion: Option<&str>) -> Self {
        Self::Configuration {
            message: message.into(),
            suggestion: suggestion.map(str::to_string),
        }
    }

    /// Get a user-friendly error message with suggestions
    pub fn user_message(&self) -> String {
        match self {
            Self::FileNotFound { suggestion, .. } => {
                format!("{}\n\nSuggestion: {}", self, suggestion)
            }
            Self::InvalidMonth { expected_format, .. } => {
                format!("{}\n\nExpected format: {}", self, expected_format)
            }
            Self::Configuration { suggestion: Some(sug), .. }
            | Self::Export { suggestion: Some(sug), .. }
            | Self::Custom { suggestion: Some(sug), .. } => {
                format!("{}\n\nSuggestion: {}", self, sug)
            }
            _ => self.to_string(),
        }
    }
}

// Convenience conversions
impl From<std::io::Error> for RollupError {
    fn from(err: std::io::Error) -> Self {
        Self::Io {
            message: err.to_string(),
            source: err,
            context: ErrorContext::default(),
        }
    }
}

impl From<csv::Error> for RollupError {
    fn from(err: csv::Error) -> Self {
        let line = err.position().map(|pos| pos.line());

        Self::CsvParse {
            message: err.to_string(),
            line,
            context: ErrorContext::default(),
        }
    }
}

impl From<serde_json::Error> for RollupError {
    fn from(err: serde_json::Error) -> Self {
        RollupError::Export {
            message: err.to_string(),
            format: ExportFormat::Json,
            suggestion: Some("Check if the data is serializable to JSON.".to_string()),
        }
    }
}

impl From<tempfile::PersistError> for RollupError {
    fn from(err: tempfile::PersistError) -> Self {
        let path = err.file.path().to_path_buf();
        Self::Io {
            message: format!("failed to publish {}: {}", path.display(), err.error),
            source: err.error,
            context: ErrorContext {
                file_path: Some(path),
                ..Default::default()
            },
        }
    }
}

impl From<config::ConfigError> for RollupError {
    fn from(err: config::ConfigError) -> Self {
        Self::Configuration {
            message: err.to_string(),
            suggestion: Some("Check MEDROLLUP_* environment variables and the TOML config file".to_string()),
        }
    }
}

impl From<toml::de::Error> for RollupError {
    fn from(err: toml::de::Error) -> Self {
        Self::Configuration {
            message: format!("Failed to parse config file: {}", err),
            suggestion: Some("Check that the file is valid TOML format".to_string()),
        }
    }
}

impl From<toml::ser::Error> for RollupError {
    fn from(err: toml::ser::Error) -> Self {
        Self::Configuration {
            message: format!("Failed to serialize config: {}", err),
            suggestion: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_message_includes_suggestion() {
        let err = RollupError::file_not_found_with_suggestion(PathBuf::from("medicaid-provider-spending.csv"));
        let msg = err.user_message();
        assert!(msg.starts_with("File not found"));
        assert!(msg.contains("Suggestion:"));
        assert!(msg.contains("7 columns"));
    }

    #[test]
    fn test_row_error_labels_are_distinct() {
        let labels = [
            RowError::TooFewFields { expected: 7, found: 3 }.label(),
            RowError::BadNumber { field: "paid" }.label(),
            RowError::BadMonth.label(),
            RowError::NegativeAmount.label(),
            RowError::Undecodable.label(),
        ];
        let unique: std::collections::HashSet<_> = labels.iter().collect();
        assert_eq!(unique.len(), labels.len());
    }

    #[test]
    fn test_schema_mismatch_message() {
        let err = RollupError::schema_mismatch_detailed(7, 3, None);
        assert_eq!(err.to_string(), "Schema mismatch: Expected at least 7 columns, found 3");
    }
}
