//! Embedded SQLite storage
//!
//! Every call opens its own connection on the blocking pool and drops it
//! before returning, so no connection or lock outlives a single statement.

use rusqlite::types::Value;
use rusqlite::{params_from_iter, Connection};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::application::errors::StorageError;

pub mod targets;

pub use targets::SqliteTargetStore;

/// Parameter and column value
pub type SqlValue = Value;

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

const IDEMPOTENT_DDL: [&str; 3] = [
    "CREATE TABLE IF NOT EXISTS ",
    "CREATE INDEX IF NOT EXISTS ",
    "CREATE UNIQUE INDEX IF NOT EXISTS ",
];

/// Result of a single mutating statement
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteOutcome {
    pub affected_rows: usize,
    pub last_insert_rowid: i64,
}

/// One fetched row, keyed by column name
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Record {
    columns: BTreeMap<String, Value>,
}

impl Record {
    pub fn get_i64(&self, column: &str) -> Result<i64, StorageError> {
        match self.require(column)? {
            Value::Integer(v) => Ok(*v),
            other => Err(type_mismatch(column, "integer", other)),
        }
    }

    pub fn get_str(&self, column: &str) -> Result<String, StorageError> {
        self.get_opt_str(column)?
            .ok_or_else(|| StorageError::Column(format!("`{}` is NULL", column)))
    }

    pub fn get_opt_str(&self, column: &str) -> Result<Option<String>, StorageError> {
        match self.require(column)? {
            Value::Null => Ok(None),
            Value::Text(s) => Ok(Some(s.clone())),
            other => Err(type_mismatch(column, "text", other)),
        }
    }

    fn require(&self, column: &str) -> Result<&Value, StorageError> {
        self.columns
            .get(column)
            .ok_or_else(|| StorageError::Column(format!("no column `{}`", column)))
    }
}

fn type_mismatch(column: &str, expected: &str, found: &Value) -> StorageError {
    StorageError::Column(format!(
        "`{}` expected {}, found {:?}",
        column,
        expected,
        found.data_type()
    ))
}

/// Handle to one SQLite file
#[derive(Debug, Clone)]
pub struct Database {
    path: PathBuf,
}

impl Database {
    /// Resolves `<data_dir>/<file_name>`, creating the directory if needed.
    /// The file itself is created on first connection.
    pub fn open(data_dir: impl AsRef<Path>, file_name: &str) -> Result<Self, StorageError> {
        let data_dir = data_dir.as_ref();
        std::fs::create_dir_all(data_dir)?;
        let data_dir = data_dir.canonicalize()?;
        let path = data_dir.join(file_name);
        tracing::debug!("Using database at {}", path.display());
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Apply one `CREATE ... IF NOT EXISTS` statement
    pub async fn create_table(&self, sql: impl Into<String>) -> Result<(), StorageError> {
        let sql = sql.into();
        let normalized = sql.split_whitespace().collect::<Vec<_>>().join(" ").to_ascii_uppercase();
        if !IDEMPOTENT_DDL.iter().any(|head| normalized.starts_with(head)) {
            return Err(StorageError::Schema(
                "statement must be CREATE ... IF NOT EXISTS".to_string(),
            ));
        }

        self.run(move |conn| {
            conn.execute(&sql, [])
                .map(|_| ())
                .map_err(|e| StorageError::Schema(e.to_string()))
        })
        .await
    }

    /// Apply one parameterized mutating statement atomically
    pub async fn execute_write(
        &self,
        sql: impl Into<String>,
        params: Vec<SqlValue>,
    ) -> Result<WriteOutcome, StorageError> {
        let sql = sql.into();
        self.run(move |conn| {
            let affected_rows = conn.execute(&sql, params_from_iter(params.iter()))?;
            Ok(WriteOutcome {
                affected_rows,
                last_insert_rowid: conn.last_insert_rowid(),
            })
        })
        .await
    }

    pub async fn fetch_all(
        &self,
        sql: impl Into<String>,
        params: Vec<SqlValue>,
    ) -> Result<Vec<Record>, StorageError> {
        let sql = sql.into();
        self.run(move |conn| query(conn, &sql, &params, None)).await
    }

    /// First row, or `None` when the query yields nothing
    pub async fn fetch_one(
        &self,
        sql: impl Into<String>,
        params: Vec<SqlValue>,
    ) -> Result<Option<Record>, StorageError> {
        let sql = sql.into();
        let rows = self.run(move |conn| query(conn, &sql, &params, Some(1))).await?;
        Ok(rows.into_iter().next())
    }

    async fn run<T, F>(&self, f: F) -> Result<T, StorageError>
    where
        F: FnOnce(&Connection) -> Result<T, StorageError> + Send + 'static,
        T: Send + 'static,
    {
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || {
            let conn = Connection::open(&path)?;
            conn.busy_timeout(BUSY_TIMEOUT)?;
            f(&conn)
        })
        .await
        .map_err(|e| StorageError::Task(e.to_string()))?
    }
}

fn query(
    conn: &Connection,
    sql: &str,
    params: &[SqlValue],
    limit: Option<usize>,
) -> Result<Vec<Record>, StorageError> {
    let mut stmt = conn.prepare(sql)?;
    let names: Vec<String> = stmt.column_names().iter().map(|s| s.to_string()).collect();
    let mut rows = stmt.query(params_from_iter(params.iter()))?;

    let mut records = Vec::new();
    while let Some(row) = rows.next()? {
        let mut columns = BTreeMap::new();
        for (i, name) in names.iter().enumerate() {
            columns.insert(name.clone(), row.get::<_, Value>(i)?);
        }
        records.push(Record { columns });
        if limit.is_some_and(|l| records.len() >= l) {
            break;
        }
    }
    Ok(records)
}
