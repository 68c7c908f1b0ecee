/*!
 * Export of the output tables
 *
 * `JsonTableWriter` publishes each table as one JSON array file. `SqlExporter`
 * turns a set of tables (in memory or a directory of table files) into a
 * self-contained bulk-load script. Every file is written to a temporary
 * sibling and renamed into place, so a failed run never leaves a truncated
 * file behind under the final name.
 */

use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use log::{debug, info, warn};
use serde::Serialize;
use serde_json::{Map, Value};
use tempfile::NamedTempFile;

use crate::schema::{self, ColumnType, TableSchema, OUTPUT_TABLES};
use crate::tables::OutputTables;
use crate::{ExportFormat, Result, RollupError};

/// Trait for table exporters
pub trait TableExporter {
    /// Export all tables to `path`
    fn export(&self, tables: &OutputTables, path: &Path) -> Result<()>;

    fn format(&self) -> ExportFormat;
}

/// Write a file through a temporary sibling, then rename it into place
pub fn write_atomic<F>(path: &Path, write: F) -> Result<()>
where
    F: FnOnce(&mut BufWriter<&mut NamedTempFile>) -> Result<()>,
{
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    fs::create_dir_all(parent)?;

    let mut temp = NamedTempFile::new_in(parent)?;
    {
        let mut writer = BufWriter::new(&mut temp);
        write(&mut writer)?;
        writer.flush()?;
    }
    temp.as_file().sync_all()?;
    temp.persist(path)?;
    Ok(())
}

/// A table file that was written
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WrittenTable {
    pub table: &'static str,
    pub path: PathBuf,
    pub rows: usize,
}

/// JSON table writer
#[derive(Debug, Clone, Default)]
pub struct JsonTableWriter {
    /// Whether to pretty-print the JSON
    pub pretty_print: bool,
}

impl JsonTableWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_pretty_print(mut self, pretty: bool) -> Self {
        self.pretty_print = pretty;
        self
    }

    /// Write one table as a JSON array to `dir/<file name>`
    pub fn write_table<T: Serialize>(&self, dir: &Path, table: &TableSchema, rows: &[T]) -> Result<WrittenTable> {
        let path = dir.join(table.file_name);
        write_atomic(&path, |writer| {
            if self.pretty_print {
                serde_json::to_writer_pretty(&mut *writer, rows)?;
            } else {
                serde_json::to_writer(&mut *writer, rows)?;
            }
            writer.write_all(b"\n")?;
            Ok(())
        })
        .map_err(|e| with_table_context(e, table, &path))?;

        debug!("Wrote {} rows to {}", rows.len(), path.display());
        Ok(WrittenTable {
            table: table.name,
            path,
            rows: rows.len(),
        })
    }

    /// Write all ten tables into `dir`
    pub fn write_all(&self, tables: &OutputTables, dir: &Path) -> Result<Vec<WrittenTable>> {
        fs::create_dir_all(dir)?;
        let written = vec![
            self.write_table(dir, &schema::MONTHLY_NATIONAL, &tables.monthly_national)?,
            self.write_table(dir, &schema::PROCEDURES, &tables.procedures)?,
            self.write_table(dir, &schema::PROVIDERS, &tables.providers)?,
            self.write_table(dir, &schema::STATES, &tables.states)?,
            self.write_table(dir, &schema::PROCEDURE_MONTHLY, &tables.procedure_monthly)?,
            self.write_table(dir, &schema::PROVIDER_PROCEDURES, &tables.provider_procedures)?,
            self.write_table(dir, &schema::PROVIDER_MONTHLY, &tables.provider_monthly)?,
            self.write_table(dir, &schema::STATE_MONTHLY, &tables.state_monthly)?,
            self.write_table(dir, &schema::STATE_PROCEDURES, &tables.state_procedures)?,
            self.write_table(dir, &schema::OUTLIERS, &tables.outliers)?,
        ];
        info!("Wrote {} tables to {}", written.len(), dir.display());
        Ok(written)
    }
}

impl TableExporter for JsonTableWriter {
    fn export(&self, tables: &OutputTables, path: &Path) -> Result<()> {
        self.write_all(tables, path).map(|_| ())
    }

    fn format(&self) -> ExportFormat {
        ExportFormat::Json
    }
}

fn with_table_context(err: RollupError, table: &TableSchema, path: &Path) -> RollupError {
    match err {
        RollupError::Io { message, source, mut context } => {
            context.table = Some(table.name.to_string());
            context.file_path.get_or_insert_with(|| path.to_path_buf());
            RollupError::Io { message, source, context }
        }
        other => other,
    }
}

/// SQL dialect of the generated load script
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SqlDialect {
    #[default]
    SQLite,
    PostgreSQL,
}

impl SqlDialect {
    fn column_type(&self, ty: ColumnType) -> &'static str {
        match (self, ty) {
            (_, ColumnType::Text) => "TEXT",
            (SqlDialect::SQLite, ColumnType::Integer) => "INTEGER",
            (SqlDialect::PostgreSQL, ColumnType::Integer) => "BIGINT",
            (SqlDialect::SQLite, ColumnType::Real) => "REAL",
            (SqlDialect::PostgreSQL, ColumnType::Real) => "DOUBLE PRECISION",
        }
    }

    fn surrogate_key(&self) -> &'static str {
        match self {
            SqlDialect::SQLite => "id INTEGER PRIMARY KEY AUTOINCREMENT",
            SqlDialect::PostgreSQL => "id BIGSERIAL PRIMARY KEY",
        }
    }
}

impl std::str::FromStr for SqlDialect {
    type Err = RollupError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "sqlite" => Ok(SqlDialect::SQLite),
            "postgres" | "postgresql" => Ok(SqlDialect::PostgreSQL),
            other => Err(RollupError::Export {
                message: format!("unknown SQL dialect '{other}'"),
                format: ExportFormat::Sql,
                suggestion: Some("Use 'sqlite' or 'postgres'".to_string()),
            }),
        }
    }
}

/// Rows of one table as loosely typed JSON objects
pub type JsonRows = Vec<Map<String, Value>>;

/// Outcome of a SQL export
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SqlExportSummary {
    /// (table, rows inserted)
    pub tables: Vec<(&'static str, usize)>,
    /// Tables whose file was missing
    pub skipped: Vec<&'static str>,
}

/// SQL bulk-load script exporter
#[derive(Debug, Clone)]
pub struct SqlExporter {
    pub dialect: SqlDialect,
    /// Rows per INSERT statement
    pub batch_size: usize,
    /// Whether to include DROP/CREATE TABLE statements
    pub include_schema: bool,
}

impl Default for SqlExporter {
    fn default() -> Self {
        Self {
            dialect: SqlDialect::SQLite,
            batch_size: crate::constants::SQL_BATCH_SIZE,
            include_schema: true,
        }
    }
}

impl SqlExporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_dialect(mut self, dialect: SqlDialect) -> Self {
        self.dialect = dialect;
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Read table files from `tables_dir` and write a load script to `output`
    ///
    /// Missing table files are skipped with a warning.
    pub fn export_dir(&self, tables_dir: &Path, output: &Path) -> Result<SqlExportSummary> {
        let mut loaded = Vec::new();
        let mut skipped = Vec::new();
        for table in OUTPUT_TABLES.iter() {
            let path = tables_dir.join(table.file_name);
            if !path.is_file() {
                warn!("{} not found, skipping table {}", path.display(), table.name);
                skipped.push(table.name);
                continue;
            }
            let file = File::open(&path)?;
            let rows: JsonRows = serde_json::from_reader(BufReader::new(file)).map_err(|e| RollupError::Export {
                message: format!("{} is not a JSON array of objects: {}", path.display(), e),
                format: ExportFormat::Json,
                suggestion: Some("Regenerate the tables with `medrollup run`".to_string()),
            })?;
            loaded.push((table, rows));
        }

        let mut summary = self.write_script(&loaded, output)?;
        summary.skipped = skipped;
        Ok(summary)
    }

    fn write_script(&self, tables: &[(&TableSchema, JsonRows)], output: &Path) -> Result<SqlExportSummary> {
        let mut summary = SqlExportSummary::default();
        write_atomic(output, |writer| {
            writeln!(writer, "-- Medicaid rollup bulk load ({:?})", self.dialect)?;
            writeln!(writer, "BEGIN;\n")?;
            for (table, rows) in tables {
                if self.include_schema {
                    self.write_schema(writer, table)?;
                }
                self.write_inserts(writer, table, rows)?;
                if self.include_schema {
                    self.write_indexes(writer, table)?;
                }
                summary.tables.push((table.name, rows.len()));
            }
            writeln!(writer, "COMMIT;")?;
            Ok(())
        })?;

        info!(
            "Wrote {} script for {} tables to {}",
            ExportFormat::Sql,
            summary.tables.len(),
            output.display()
        );
        Ok(summary)
    }

    fn write_schema(&self, writer: &mut dyn Write, table: &TableSchema) -> Result<()> {
        writeln!(writer, "DROP TABLE IF EXISTS {};", table.name)?;
        writeln!(writer, "CREATE TABLE {} (", table.name)?;

        let mut lines = Vec::with_capacity(table.columns.len() + 1);
        if table.surrogate_id {
            lines.push(format!("  {}", self.dialect.surrogate_key()));
        }
        for column in table.columns {
            let mut line = format!("  {} {}", column.name, self.dialect.column_type(column.sql_type));
            if column.primary_key {
                line.push_str(" PRIMARY KEY");
            } else if !column.nullable {
                line.push_str(" NOT NULL");
            }
            lines.push(line);
        }
        writeln!(writer, "{}", lines.join(",\n"))?;
        writeln!(writer, ");\n")?;
        Ok(())
    }

    fn write_indexes(&self, writer: &mut dyn Write, table: &TableSchema) -> Result<()> {
        for (name, columns) in table.indexes {
            writeln!(
                writer,
                "CREATE INDEX IF NOT EXISTS {} ON {}({});",
                name,
                table.name,
                columns.join(", ")
            )?;
        }
        if !table.indexes.is_empty() {
            writeln!(writer)?;
        }
        Ok(())
    }

    fn write_inserts(&self, writer: &mut dyn Write, table: &TableSchema, rows: &[Map<String, Value>]) -> Result<()> {
        let columns: Vec<&str> = table.columns.iter().map(|c| c.name).collect();

        for (batch_index, chunk) in rows.chunks(self.batch_size).enumerate() {
            writeln!(writer, "INSERT INTO {} ({}) VALUES", table.name, columns.join(", "))?;
            for (i, row) in chunk.iter().enumerate() {
                let line = batch_index * self.batch_size + i + 1;
                let values = self.row_values(table, row, line)?;
                let terminator = if i + 1 < chunk.len() { "," } else { ";" };
                writeln!(writer, "  ({}){}", values.join(", "), terminator)?;
            }
        }
        if !rows.is_empty() {
            writeln!(writer)?;
        }
        Ok(())
    }

    fn row_values(&self, table: &TableSchema, row: &Map<String, Value>, line: usize) -> Result<Vec<String>> {
        table
            .columns
            .iter()
            .map(|column| match row.get(column.json_key) {
                None | Some(Value::Null) if !column.nullable => Err(RollupError::Export {
                    message: format!(
                        "row {} of {} has no value for required column {}",
                        line, table.name, column.name
                    ),
                    format: ExportFormat::Sql,
                    suggestion: Some(format!("Check the '{}' field in {}", column.json_key, table.file_name)),
                }),
                None | Some(Value::Null) => Ok("NULL".to_string()),
                Some(value) => Ok(sql_literal(value)),
            })
            .collect()
    }
}

impl TableExporter for SqlExporter {
    fn export(&self, tables: &OutputTables, path: &Path) -> Result<()> {
        let value = serde_json::to_value(tables)?;
        let mut loaded = Vec::new();
        for (table, field) in OUTPUT_TABLES.iter().zip(TABLE_FIELDS) {
            let rows: JsonRows = serde_json::from_value(value.get(field).cloned().unwrap_or(Value::Array(Vec::new())))?;
            loaded.push((table, rows));
        }
        self.write_script(&loaded, path).map(|_| ())
    }

    fn format(&self) -> ExportFormat {
        ExportFormat::Sql
    }
}

/// `OutputTables` field names, in `OUTPUT_TABLES` order
const TABLE_FIELDS: [&str; 10] = [
    "monthly_national",
    "procedures",
    "providers",
    "states",
    "procedure_monthly",
    "provider_procedures",
    "provider_monthly",
    "state_monthly",
    "state_procedures",
    "outliers",
];

// SQL helper functions
fn sql_string(s: &str) -> String {
    format!("'{}'", s.replace('\'', "''"))
}

fn sql_literal(value: &Value) -> String {
    match value {
        Value::Null => "NULL".to_string(),
        Value::Bool(b) => if *b { "1" } else { "0" }.to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => sql_string(s),
        other => sql_string(&other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn rows(value: Value) -> JsonRows {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_write_atomic_replaces_and_leaves_no_temp() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out.json");
        fs::write(&path, "old").unwrap();

        write_atomic(&path, |w| {
            w.write_all(b"[]")?;
            Ok(())
        })
        .unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "[]");
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);

        let failed = write_atomic(&path, |_| Err(RollupError::Custom { message: "boom".into(), suggestion: None }));
        assert!(failed.is_err());
        assert_eq!(fs::read_to_string(&path).unwrap(), "[]");
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn test_json_writer_writes_every_table() {
        let dir = TempDir::new().unwrap();
        let written = JsonTableWriter::new().write_all(&OutputTables::default(), dir.path()).unwrap();
        assert_eq!(written.len(), 10);
        for table in OUTPUT_TABLES.iter() {
            let body = fs::read_to_string(dir.path().join(table.file_name)).unwrap();
            assert_eq!(body.trim(), "[]");
        }
    }

    #[test]
    fn test_sql_literals() {
        assert_eq!(sql_literal(&json!("O'Brien")), "'O''Brien'");
        assert_eq!(sql_literal(&json!(12.5)), "12.5");
        assert_eq!(sql_literal(&json!(null)), "NULL");
    }

    #[test]
    fn test_sql_script_batches_and_indexes() {
        let dir = TempDir::new().unwrap();
        let states = rows(json!([
            {"state": "CA", "totalPaid": 10.0, "totalClaims": 1, "totalBeneficiaries": 1,
             "providerCount": 1, "procedureCount": 1, "avgCostPerClaim": 10.0,
             "avgCostPerBeneficiary": null, "claimsPerBeneficiary": null},
            {"state": "NY", "totalPaid": 5.0, "totalClaims": 1, "totalBeneficiaries": 1,
             "providerCount": 1, "procedureCount": 1, "avgCostPerClaim": 5.0,
             "avgCostPerBeneficiary": null, "claimsPerBeneficiary": null},
            {"state": "TX", "totalPaid": 1.0, "totalClaims": 1, "totalBeneficiaries": 1,
             "providerCount": 1, "procedureCount": 1, "avgCostPerClaim": 1.0,
             "avgCostPerBeneficiary": null, "claimsPerBeneficiary": null}
        ]));
        let out = dir.path().join("load.sql");
        let exporter = SqlExporter::new().with_batch_size(2);
        let summary = exporter.write_script(&[(&schema::STATES, states)], &out).unwrap();
        assert_eq!(summary.tables, vec![("states", 3)]);

        let script = fs::read_to_string(&out).unwrap();
        assert!(script.starts_with("-- Medicaid rollup bulk load"));
        assert!(script.contains("DROP TABLE IF EXISTS states;"));
        assert!(script.contains("  state TEXT PRIMARY KEY"));
        assert!(script.contains("  total_paid REAL NOT NULL"));
        assert_eq!(script.matches("INSERT INTO states").count(), 2);
        assert!(script.trim_end().ends_with("COMMIT;"));
    }

    #[test]
    fn test_required_column_missing_is_an_error() {
        let dir = TempDir::new().unwrap();
        let broken = rows(json!([{"state": "CA"}]));
        let result = SqlExporter::new().write_script(&[(&schema::STATES, broken)], &dir.path().join("x.sql"));
        assert!(matches!(result, Err(RollupError::Export { .. })));
        assert!(!dir.path().join("x.sql").exists());
    }

    #[test]
    fn test_export_dir_skips_missing_tables() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("outliers.json"), "[]").unwrap();
        let out = dir.path().join("load.sql");
        let summary = SqlExporter::new()
            .with_dialect(SqlDialect::PostgreSQL)
            .export_dir(dir.path(), &out)
            .unwrap();
        assert_eq!(summary.tables, vec![("outliers", 0)]);
        assert_eq!(summary.skipped.len(), 9);
        let script = fs::read_to_string(&out).unwrap();
        assert!(script.contains("id BIGSERIAL PRIMARY KEY"));
        assert!(script.contains("CREATE INDEX IF NOT EXISTS idx_outliers_index ON outliers(cost_index);"));
    }
}
