//! `Engine` — the top-level handle: opens a base directory, discovers
//! existing tables, executes SQL text against them (spec.md §6), and rewrites
//! table metadata atomically.

mod csv_import;

use crate::error::{RelError, RelResult};
use crate::result::{
    project_row, DeleteResult, ImportResult, ImportRowOutcome, InsertResult, InsertRowOutcome, SelectResult,
    StatementResult,
};
use crate::schema::TableSchema;
use crate::sql::{self, ParsedWhere, StatementKind};
use crate::table::TableManager;
use crate::value::Value;
use std::collections::HashMap;
use std::fs;
use std::io::BufWriter;
use std::path::PathBuf;

const META_SUFFIX: &str = "_meta.json";

/// The only configuration the engine takes: where table data and index files
/// live (spec.md §6, "a base directory path is the only configuration").
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub base_dir: PathBuf,
}

impl EngineConfig {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self { base_dir: base_dir.into() }
    }
}

/// Tables whose name starts with this prefix are bookkeeping tables: they can
/// exist on disk and are loaded on open, but are invisible to SQL statements
/// (CREATE TABLE refuses the prefix; SELECT/INSERT/DELETE/IMPORT treat them
/// as unknown). Generalizes the original engine's hardcoded auth-table
/// blacklist to any reserved-prefix table.
const RESERVED_PREFIX: &str = "__";

pub struct Engine {
    base_dir: PathBuf,
    tables: HashMap<String, TableManager>,
}

impl Engine {
    /// Opens `config.base_dir`, creating it if absent, and discovers every
    /// existing table by scanning for `<name>_meta.json` files (grounded in
    /// `original_source/sql.py`'s `load_existing_tables`).
    pub fn open(config: EngineConfig) -> RelResult<Self> {
        fs::create_dir_all(&config.base_dir)?;
        let mut tables = HashMap::new();

        for entry in fs::read_dir(&config.base_dir)? {
            let entry = entry?;
            let file_name = entry.file_name();
            let Some(name) = file_name.to_str() else { continue };
            let Some(table_name) = name.strip_suffix(META_SUFFIX) else { continue };

            let meta_path = entry.path();
            let bytes = fs::read(&meta_path)?;
            let schema: TableSchema = serde_json::from_slice(&bytes)?;
            if schema.table_name != table_name {
                return Err(RelError::Corrupt(format!(
                    "metadata file '{name}' names table '{}', expected '{table_name}'",
                    schema.table_name
                )));
            }

            tracing::info!(table = %table_name, "discovered existing table");
            let manager = TableManager::open(&config.base_dir, schema)?;
            tables.insert(table_name.to_string(), manager);
        }

        Ok(Self { base_dir: config.base_dir, tables })
    }

    /// Table names visible to SQL callers — reserved-prefix bookkeeping
    /// tables are loaded but not listed.
    pub fn table_names(&self) -> impl Iterator<Item = &str> {
        self.tables.keys().map(String::as_str).filter(|n| !is_reserved(n))
    }

    fn meta_path(&self, table_name: &str) -> PathBuf {
        self.base_dir.join(format!("{table_name}{META_SUFFIX}"))
    }

    /// Writes the schema to `<name>_meta.json` by writing a temp file in the
    /// same directory and renaming it over the final path, so a crash never
    /// leaves a half-written schema (spec.md §5).
    fn persist_schema(&self, schema: &TableSchema) -> RelResult<()> {
        let tmp = tempfile::NamedTempFile::new_in(&self.base_dir)?;
        {
            let mut writer = BufWriter::new(&tmp);
            serde_json::to_writer_pretty(&mut writer, schema)?;
        }
        tmp.persist(self.meta_path(&schema.table_name)).map_err(|e| e.error)?;
        Ok(())
    }

    fn visible_table(&mut self, name: &str) -> RelResult<&mut TableManager> {
        if is_reserved(name) || !self.tables.contains_key(name) {
            return Err(RelError::Schema(format!("unknown table '{name}'")));
        }
        Ok(self.tables.get_mut(name).unwrap())
    }

    /// Cleans, splits, classifies, and executes every statement in `sql`
    /// text, returning one result per recognized statement. Unknown
    /// statement shapes are logged and skipped, not surfaced as an error
    /// (spec.md §4.7).
    pub fn execute_sql(&mut self, sql_text: &str) -> Vec<StatementResult> {
        let mut results = Vec::new();
        for stmt in sql::prepare(sql_text) {
            match sql::classify(&stmt) {
                Some(kind) => results.push(self.execute_one(kind, &stmt)),
                None => {
                    tracing::warn!(statement = %stmt, "unrecognized statement, skipping");
                }
            }
        }
        results
    }

    fn execute_one(&mut self, kind: StatementKind, stmt: &str) -> StatementResult {
        let outcome = match kind {
            StatementKind::CreateTable => self.execute_create_table(stmt),
            StatementKind::Insert => self.execute_insert(stmt),
            StatementKind::Select => self.execute_select(stmt),
            StatementKind::Delete => self.execute_delete(stmt),
            StatementKind::Import => self.execute_import(stmt),
        };
        match outcome {
            Ok(result) => result,
            Err(err) => {
                tracing::error!(error = %err, statement = %stmt, "statement failed");
                StatementResult::failure(err.to_string())
            }
        }
    }

    fn execute_create_table(&mut self, stmt: &str) -> RelResult<StatementResult> {
        let schema = sql::parse_create_table(stmt)?;
        if is_reserved(&schema.table_name) {
            return Err(RelError::Schema(format!(
                "table names starting with '{RESERVED_PREFIX}' are reserved"
            )));
        }
        if self.tables.contains_key(&schema.table_name) {
            return Err(RelError::Schema(format!("table '{}' already exists", schema.table_name)));
        }
        let manager = TableManager::open(&self.base_dir, schema.clone())?;
        self.persist_schema(&schema)?;
        self.tables.insert(schema.table_name.clone(), manager);
        tracing::info!(table = %schema.table_name, "table created");
        Ok(StatementResult::ok(format!("table '{}' created", schema.table_name)))
    }

    fn execute_insert(&mut self, stmt: &str) -> RelResult<StatementResult> {
        let parsed = sql::parse_insert(stmt)?;
        let manager = self.visible_table(&parsed.table)?;
        let schema = manager.schema.clone();

        let column_indices: Vec<usize> = match &parsed.columns {
            Some(cols) => {
                let mut indices = Vec::with_capacity(cols.len());
                for col in cols {
                    let idx = schema
                        .attribute_index(col)
                        .ok_or_else(|| RelError::Schema(format!("unknown attribute '{col}' in column list")))?;
                    indices.push(idx);
                }
                indices
            }
            None => (0..schema.attributes.len()).collect(),
        };

        let mut outcomes = Vec::with_capacity(parsed.rows.len());
        let mut inserted = 0usize;
        let mut failed = 0usize;

        for (row_index, raw_row) in parsed.rows.iter().enumerate() {
            if raw_row.len() > column_indices.len() {
                outcomes.push(InsertRowOutcome {
                    row_index,
                    error: true,
                    record_number: None,
                    message: Some(format!("row has {} values, expected at most {}", raw_row.len(), column_indices.len())),
                });
                failed += 1;
                continue;
            }

            let mut values: Vec<Option<Value>> = vec![None; schema.attributes.len()];
            let row_result: RelResult<()> = (|| {
                for (raw_value, &attr_idx) in raw_row.iter().zip(&column_indices) {
                    let data_type = schema.attributes[attr_idx].data_type;
                    values[attr_idx] = Some(Value::parse_as(raw_value, data_type)?);
                }
                Ok(())
            })();

            let row_result = row_result.and_then(|()| manager.insert(&values));
            match row_result {
                Ok(record_number) => {
                    outcomes.push(InsertRowOutcome { row_index, error: false, record_number: Some(record_number), message: None });
                    inserted += 1;
                }
                Err(err) => {
                    outcomes.push(InsertRowOutcome { row_index, error: true, record_number: None, message: Some(err.to_string()) });
                    failed += 1;
                }
            }
        }

        Ok(StatementResult::Insert(InsertResult { error: false, inserted, failed, results: outcomes }))
    }

    fn execute_select(&mut self, stmt: &str) -> RelResult<StatementResult> {
        let parsed = sql::parse_select(stmt)?;
        let manager = self.visible_table(&parsed.table)?;
        let schema = manager.schema.clone();

        let where_filters = match &parsed.where_clause {
            Some(clause) => sql::parse_where(clause, &schema)?,
            None => ParsedWhere::default(),
        };

        let rows = manager.select_rows(&where_filters.exact, &where_filters.ranges, &where_filters.spatial)?;
        let mut projected = Vec::with_capacity(rows.len());
        for (_, values) in rows {
            projected.push(project_row(&schema, &values, parsed.columns.as_deref())?);
        }

        Ok(StatementResult::Select(SelectResult { error: false, rows: projected }))
    }

    fn execute_delete(&mut self, stmt: &str) -> RelResult<StatementResult> {
        let parsed = sql::parse_delete(stmt)?;
        let manager = self.visible_table(&parsed.table)?;
        let schema = manager.schema.clone();
        let where_filters = sql::parse_where(&parsed.where_clause, &schema)?;
        let deleted = manager.delete(&where_filters.exact, &where_filters.ranges, &where_filters.spatial)?;
        let count = deleted.len();
        Ok(StatementResult::Delete(DeleteResult { error: false, deleted, count }))
    }

    fn execute_import(&mut self, stmt: &str) -> RelResult<StatementResult> {
        let parsed = sql::parse_import_csv(stmt)?;
        if let Some(encoding) = &parsed.encoding {
            if !encoding.eq_ignore_ascii_case("utf-8") && !encoding.eq_ignore_ascii_case("utf8") {
                tracing::warn!(encoding = %encoding, "only utf-8 CSV decoding is supported, ignoring requested encoding");
            }
        }

        let manager = self.visible_table(&parsed.table)?;
        let schema = manager.schema.clone();

        let delimiter = parsed.delimiter.map(|c| c as u8).unwrap_or(b',');
        let mut reader = csv::ReaderBuilder::new()
            .delimiter(delimiter)
            .has_headers(!parsed.no_header)
            .from_path(&parsed.path)?;

        let mapping: HashMap<usize, usize> = if parsed.no_header {
            (0..schema.attributes.len()).map(|i| (i, i)).collect()
        } else {
            let headers: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();
            csv_import::map_columns(&headers, &schema)
        };

        let pk_attr_idx = schema.primary_key.as_ref().and_then(|pk| schema.attribute_index(pk));

        let mut outcomes = Vec::new();
        let mut successes = 0usize;
        let mut failures = 0usize;

        for (row_index, record) in reader.records().enumerate() {
            let record = record?;
            let mut values: Vec<Option<Value>> = vec![None; schema.attributes.len()];
            for (header_idx, &attr_idx) in &mapping {
                let Some(raw) = record.get(*header_idx) else { continue };
                if csv_import::is_empty_cell(raw) {
                    continue;
                }
                let data_type = schema.attributes[attr_idx].data_type;
                values[attr_idx] = Some(csv_import::convert_cell(raw, data_type));
            }

            if let Some(pk_idx) = pk_attr_idx {
                let default = schema.attributes[pk_idx].data_type.default_value();
                let supplied = values[pk_idx].as_ref();
                if supplied.is_none() || supplied == Some(&default) {
                    outcomes.push(ImportRowOutcome {
                        row_index,
                        success: false,
                        message: Some("primary key missing or default after column mapping".to_string()),
                    });
                    failures += 1;
                    continue;
                }
            }

            match manager.insert(&values) {
                Ok(_) => {
                    outcomes.push(ImportRowOutcome { row_index, success: true, message: None });
                    successes += 1;
                }
                Err(err) => {
                    outcomes.push(ImportRowOutcome { row_index, success: false, message: Some(err.to_string()) });
                    failures += 1;
                }
            }
        }

        tracing::info!(table = %parsed.table, successes, failures, "CSV import complete");
        Ok(StatementResult::Import(ImportResult { error: false, successes, failures, rows: outcomes }))
    }
}

fn is_reserved(table_name: &str) -> bool {
    table_name.starts_with(RESERVED_PREFIX)
}
