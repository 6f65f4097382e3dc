//! Storage adapter interface and the in-memory reference adapter
//!
//! The engine requires `execute`, `execute_transaction`, `close`, and
//! `statistics` from each backend and treats everything else (pooling,
//! native transactions, wire protocol) as opaque. [`MemoryAdapter`] is
//! the reference implementation used by tests and demos.

use once_cell::sync::Lazy;
use regex::Regex;
use saiql_core::{Row, StorageError};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{PoisonError, RwLock};
use std::time::{Duration, Instant};

/// Result of one adapter call.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct AdapterResult {
    pub rows: Vec<Row>,
    pub rows_affected: u64,
    pub execution_time: Duration,
}

impl AdapterResult {
    pub fn with_rows(rows: Vec<Row>, execution_time: Duration) -> Self {
        Self {
            rows_affected: rows.len() as u64,
            rows,
            execution_time,
        }
    }

    pub fn affected(rows_affected: u64, execution_time: Duration) -> Self {
        Self {
            rows: Vec::new(),
            rows_affected,
            execution_time,
        }
    }
}

/// Uniform storage backend interface consumed by the engine.
pub trait StorageAdapter: Send + Sync {
    /// Execute one SQL statement.
    fn execute(
        &self,
        sql: &str,
        params: Option<&[serde_json::Value]>,
    ) -> Result<AdapterResult, StorageError>;

    /// Execute an ordered list of statements atomically (as far as the
    /// backend supports).
    fn execute_transaction(&self, operations: &[String]) -> Result<AdapterResult, StorageError>;

    /// Release backend resources. Calls after close fail.
    fn close(&self);

    /// Backend statistics as a key → value map.
    fn statistics(&self) -> HashMap<String, serde_json::Value>;
}

static FROM_TABLE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"FROM\s+[`"]?([A-Za-z_][A-Za-z0-9_]*)[`"]?"#).expect("static pattern compiles")
});
static JOIN_TABLE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"JOIN\s+[`"]?([A-Za-z_][A-Za-z0-9_]*)[`"]?"#).expect("static pattern compiles")
});
static COUNT_CALL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"SELECT\s+(COUNT|SUM|AVG|MIN|MAX)\(\*\)").expect("static pattern compiles"));

/// In-memory table store answering the SQL shapes the code generator
/// emits. Enough backend for integration tests; real deployments plug in
/// their own adapters.
#[derive(Default)]
pub struct MemoryAdapter {
    tables: RwLock<HashMap<String, Vec<Row>>>,
    closed: AtomicBool,
    queries_executed: AtomicU64,
}

impl MemoryAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style table seeding.
    pub fn with_table(self, name: &str, rows: Vec<Row>) -> Self {
        self.tables
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.to_string(), rows);
        self
    }

    fn table_rows(&self, name: &str) -> Result<Vec<Row>, StorageError> {
        self.tables
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
            .ok_or_else(|| StorageError::TableNotFound {
                table: name.to_string(),
            })
    }

    fn project(rows: Vec<Row>, columns: &[String]) -> Vec<Row> {
        if columns.iter().any(|c| c == "*") {
            return rows;
        }
        rows.into_iter()
            .map(|row| {
                let mut projected = Row::new();
                for column in columns {
                    if let Some(value) = row.get(column) {
                        projected.insert(column.clone(), value.clone());
                    }
                }
                projected
            })
            .collect()
    }

    /// Column names between SELECT and FROM, unquoted.
    fn selected_columns(sql: &str) -> Vec<String> {
        let upper = sql.to_uppercase();
        let Some(select_end) = upper.find("SELECT").map(|i| i + "SELECT".len()) else {
            return vec!["*".to_string()];
        };
        let Some(from_start) = upper.find(" FROM") else {
            return vec!["*".to_string()];
        };
        sql[select_end..from_start]
            .split(',')
            .map(|col| col.trim().trim_matches(&['"', '`'][..]).to_string())
            .filter(|col| !col.is_empty())
            .collect()
    }
}

impl StorageAdapter for MemoryAdapter {
    fn execute(
        &self,
        sql: &str,
        _params: Option<&[serde_json::Value]>,
    ) -> Result<AdapterResult, StorageError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(StorageError::ConnectionClosed);
        }
        self.queries_executed.fetch_add(1, Ordering::Relaxed);
        let started = Instant::now();

        let upper = sql.trim().to_uppercase();
        if upper.starts_with("BEGIN") || upper.starts_with("COMMIT") || upper.starts_with("ROLLBACK")
        {
            return Ok(AdapterResult::affected(0, started.elapsed()));
        }

        let table = FROM_TABLE
            .captures(sql)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str().to_string())
            .ok_or_else(|| StorageError::ExecutionFailed {
                reason: format!("unsupported statement: {}", sql),
            })?;
        let rows = self.table_rows(&table)?;

        // Aggregates: COUNT(*)/SUM(*)/... over the whole table.
        if let Some(caps) = COUNT_CALL.captures(&upper) {
            let function = caps
                .get(1)
                .map(|m| m.as_str().to_string())
                .unwrap_or_else(|| "COUNT".to_string());
            let mut row = Row::new();
            row.insert(format!("{}(*)", function), serde_json::json!(rows.len()));
            return Ok(AdapterResult::with_rows(vec![row], started.elapsed()));
        }

        // Joins: cartesian merge of the two tables (the generated ON 1=1
        // shape); field collisions resolve to the right side.
        if let Some(caps) = JOIN_TABLE.captures(sql) {
            let right_table = caps
                .get(1)
                .map(|m| m.as_str().to_string())
                .unwrap_or_default();
            let right_rows = self.table_rows(&right_table)?;
            let mut joined = Vec::new();
            for left in &rows {
                for right in &right_rows {
                    let mut merged = left.clone();
                    for (key, value) in right {
                        merged.insert(key.clone(), value.clone());
                    }
                    joined.push(merged);
                }
            }
            return Ok(AdapterResult::with_rows(joined, started.elapsed()));
        }

        let columns = Self::selected_columns(sql);
        let projected = Self::project(rows, &columns);
        Ok(AdapterResult::with_rows(projected, started.elapsed()))
    }

    fn execute_transaction(&self, operations: &[String]) -> Result<AdapterResult, StorageError> {
        let started = Instant::now();
        let mut rows_affected = 0;
        for operation in operations {
            let result = self.execute(operation, None)?;
            rows_affected += result.rows_affected;
        }
        Ok(AdapterResult::affected(rows_affected, started.elapsed()))
    }

    fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }

    fn statistics(&self) -> HashMap<String, serde_json::Value> {
        let tables = self
            .tables
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len();
        HashMap::from([
            ("backend".to_string(), serde_json::json!("memory")),
            ("tables".to_string(), serde_json::json!(tables)),
            (
                "queries_executed".to_string(),
                serde_json::json!(self.queries_executed.load(Ordering::Relaxed)),
            ),
        ])
    }
}

/// Convenience row constructor for tests and seeding.
pub fn row(fields: &[(&str, serde_json::Value)]) -> Row {
    let mut row = Row::new();
    for (key, value) in fields {
        row.insert((*key).to_string(), value.clone());
    }
    row
}
