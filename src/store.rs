//! In-memory relational store over the fixed CSV dataset.
//!
//! The dataset tables are provisioned once at startup: each CSV is read with
//! polars and bulk-inserted into an in-memory SQLite database. Query
//! execution is fail-soft. A generated statement that does not parse or run
//! yields an empty result set instead of an error, so one bad query never
//! takes down a whole turn.

use std::fmt;
use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;

use polars::prelude::*;
use rusqlite::types::Value as SqlValue;
use rusqlite::{params_from_iter, Connection};
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::{AssistantError, Result};
use crate::preprocess::preprocess_query;

/// One result row, keyed by column name in select order.
pub type ResultRow = serde_json::Map<String, Value>;

/// Rows returned by a query.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResultSet {
    pub rows: Vec<ResultRow>,
}

impl ResultSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }
}

/// Renders as a JSON array of row objects, the form the analysis capability
/// receives the results in.
impl fmt::Display for ResultSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rendered = serde_json::to_string(&self.rows).unwrap_or_else(|_| "[]".to_string());
        f.write_str(&rendered)
    }
}

/// Embedded SQLite store holding the dataset tables.
pub struct DataStore {
    conn: Mutex<Connection>,
}

impl DataStore {
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| AssistantError::DataLoad(format!("Failed to open store: {}", e)))?;
        conn.busy_timeout(Duration::from_secs(5))
            .map_err(|e| AssistantError::DataLoad(format!("Failed to configure store: {}", e)))?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Read a CSV with polars and materialize it as `table`, replacing any
    /// previous contents. Returns the number of rows loaded.
    pub fn load_csv_table(&self, table: &str, path: &Path) -> Result<usize> {
        let df = LazyCsvReader::new(path)
            .with_infer_schema_length(Some(1000))
            .finish()
            .map_err(|e| {
                AssistantError::DataLoad(format!("Failed to read CSV {}: {}", path.display(), e))
            })?
            .collect()
            .map_err(|e| {
                AssistantError::DataLoad(format!("Failed to collect {}: {}", path.display(), e))
            })?;

        let columns = df.get_columns();
        let mut conn = self
            .conn
            .lock()
            .map_err(|_| AssistantError::DataLoad("Store lock poisoned".to_string()))?;

        conn.execute(&format!("DROP TABLE IF EXISTS \"{}\"", table), [])
            .map_err(|e| AssistantError::DataLoad(format!("Failed to reset {}: {}", table, e)))?;

        let column_defs: Vec<String> = columns
            .iter()
            .map(|series| format!("\"{}\" {}", series.name(), sqlite_type(series.dtype())))
            .collect();
        conn.execute(
            &format!("CREATE TABLE \"{}\" ({})", table, column_defs.join(", ")),
            [],
        )
        .map_err(|e| AssistantError::DataLoad(format!("Failed to create {}: {}", table, e)))?;

        let column_list: Vec<String> = columns
            .iter()
            .map(|series| format!("\"{}\"", series.name()))
            .collect();
        let placeholders: Vec<String> = (1..=columns.len()).map(|i| format!("?{}", i)).collect();
        let insert_sql = format!(
            "INSERT INTO \"{}\" ({}) VALUES ({})",
            table,
            column_list.join(", "),
            placeholders.join(", ")
        );

        let tx = conn
            .transaction()
            .map_err(|e| AssistantError::DataLoad(format!("Failed to start load: {}", e)))?;
        {
            let mut stmt = tx.prepare(&insert_sql).map_err(|e| {
                AssistantError::DataLoad(format!("Failed to prepare load for {}: {}", table, e))
            })?;
            for row_idx in 0..df.height() {
                let values: Vec<SqlValue> = columns
                    .iter()
                    .map(|series| cell_to_sql(series, row_idx))
                    .collect();
                stmt.execute(params_from_iter(values.iter())).map_err(|e| {
                    AssistantError::DataLoad(format!(
                        "Failed to insert row {} into {}: {}",
                        row_idx, table, e
                    ))
                })?;
            }
        }
        tx.commit()
            .map_err(|e| AssistantError::DataLoad(format!("Failed to commit {}: {}", table, e)))?;

        debug!("Loaded {} rows into {}", df.height(), table);
        Ok(df.height())
    }

    /// Run one generated SQL statement. Blank statements and execution
    /// failures both yield an empty result set; failures are logged.
    pub fn execute(&self, sql: &str) -> ResultSet {
        if sql.trim().is_empty() {
            return ResultSet::new();
        }
        let sql = preprocess_query(sql);
        debug!("Running query: {}", sql);
        match self.try_execute(&sql) {
            Ok(result) => result,
            Err(e) => {
                warn!("Error running query: {}", e);
                ResultSet::new()
            }
        }
    }

    fn try_execute(&self, sql: &str) -> Result<ResultSet> {
        let conn = self
            .conn
            .lock()
            .map_err(|_| AssistantError::QueryExecution("Store lock poisoned".to_string()))?;
        let mut stmt = conn
            .prepare(sql)
            .map_err(|e| AssistantError::QueryExecution(e.to_string()))?;
        let columns: Vec<String> = stmt.column_names().iter().map(ToString::to_string).collect();
        let mut rows = stmt
            .query([])
            .map_err(|e| AssistantError::QueryExecution(e.to_string()))?;

        let mut result = ResultSet::new();
        while let Some(row) = rows
            .next()
            .map_err(|e| AssistantError::QueryExecution(e.to_string()))?
        {
            let mut record = ResultRow::new();
            for (idx, name) in columns.iter().enumerate() {
                let value: SqlValue = row
                    .get(idx)
                    .map_err(|e| AssistantError::QueryExecution(e.to_string()))?;
                record.insert(name.clone(), json_from_sql(value));
            }
            result.rows.push(record);
        }
        Ok(result)
    }
}

fn sqlite_type(dtype: &DataType) -> &'static str {
    match dtype {
        DataType::Int8
        | DataType::Int16
        | DataType::Int32
        | DataType::Int64
        | DataType::UInt8
        | DataType::UInt16
        | DataType::UInt32
        | DataType::UInt64
        | DataType::Boolean => "INTEGER",
        DataType::Float32 | DataType::Float64 => "REAL",
        _ => "TEXT",
    }
}

fn cell_to_sql(series: &Series, row_idx: usize) -> SqlValue {
    if series.is_null().get(row_idx).unwrap_or(false) {
        return SqlValue::Null;
    }
    let Ok(any_val) = series.get(row_idx) else {
        return SqlValue::Null;
    };
    match series.dtype() {
        DataType::Int8
        | DataType::Int16
        | DataType::Int32
        | DataType::Int64
        | DataType::UInt8
        | DataType::UInt16
        | DataType::UInt32
        | DataType::UInt64 => any_val
            .try_extract::<i64>()
            .map(SqlValue::Integer)
            .unwrap_or(SqlValue::Null),
        DataType::Float32 | DataType::Float64 => any_val
            .try_extract::<f64>()
            .map(SqlValue::Real)
            .unwrap_or(SqlValue::Null),
        DataType::Boolean => match any_val {
            AnyValue::Boolean(v) => SqlValue::Integer(v as i64),
            _ => SqlValue::Null,
        },
        DataType::String => match any_val.get_str() {
            Some(s) => SqlValue::Text(s.to_string()),
            None => SqlValue::Text(any_val.to_string()),
        },
        _ => SqlValue::Text(any_val.to_string()),
    }
}

fn json_from_sql(value: SqlValue) -> Value {
    match value {
        SqlValue::Null => Value::Null,
        SqlValue::Integer(v) => Value::Number(v.into()),
        SqlValue::Real(v) => serde_json::Number::from_f64(v)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        SqlValue::Text(v) => Value::String(v),
        SqlValue::Blob(bytes) => Value::String(bytes.iter().map(|b| format!("{:02x}", b)).collect()),
    }
}
