//! Connection handling and statement builders.

use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use rusqlite::types::Value;
use rusqlite::{params_from_iter, Connection, ToSql};

use crate::observability::metrics;
use crate::sql::error::{DbError, DbResult};
use crate::sql::ident::{placeholders, Ident, Raw};
use crate::sql::result::{Params, QueryResult};

/// Connection options applied right after opening.
#[derive(Debug, Clone)]
pub struct ConnectOptions {
    /// Enforce foreign keys (needed for index-row cascades).
    pub foreign_keys: bool,
    /// `PRAGMA synchronous = OFF`.
    pub synchronous_off: bool,
    /// How long a locked database is retried before failing.
    pub busy_timeout: Option<Duration>,
}

impl Default for ConnectOptions {
    fn default() -> Self {
        Self {
            foreign_keys: true,
            synchronous_off: false,
            busy_timeout: Some(Duration::from_secs(5)),
        }
    }
}

/// Rows for [`Executor::insert`].
#[derive(Debug, Clone, PartialEq)]
pub enum Inserts {
    /// One row as column → value pairs.
    Single(Vec<(Ident, Value)>),
    /// A column list followed by any number of value tuples.
    Bulk {
        columns: Vec<Ident>,
        rows: Vec<Vec<Value>>,
    },
}

/// Row ordering for recency queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Order {
    Asc,
    #[default]
    Desc,
}

impl Order {
    pub fn as_sql(self) -> &'static str {
        match self {
            Order::Asc => "ASC",
            Order::Desc => "DESC",
        }
    }
}

/// Anything that can run a statement.
///
/// Builders are provided methods so they work the same on a [`Db`] (one
/// lock per statement) and on a [`Session`] (lock held for a whole
/// [`Db::atomic`] block).
///
/// Table names, column lists and where/extra clauses are pasted into the
/// statement text. Only values travel as bound parameters.
pub trait Executor {
    /// Prepare and execute `sql`.
    ///
    /// Returns `Ok(None)` when the statement cannot be prepared and
    /// `Err(DbError::Execution)` when it fails while executing.
    fn execute(&self, sql: &str, params: Params) -> DbResult<Option<QueryResult>>;

    /// `INSERT` (or `REPLACE` when `replace` is set) one or many rows.
    fn insert(
        &self,
        table: &Ident,
        inserts: &Inserts,
        replace: bool,
    ) -> DbResult<Option<QueryResult>> {
        let verb = if replace { "REPLACE" } else { "INSERT" };
        match inserts {
            Inserts::Single(fields) => {
                let cols = join_idents(fields.iter().map(|(c, _)| c));
                let values: Vec<Value> = fields.iter().map(|(_, v)| v.clone()).collect();
                let sql = format!(
                    "{verb} INTO {table} ({cols}) VALUES {}",
                    placeholders(values.len())
                );
                self.execute(&sql, Params::from(values))
            }
            Inserts::Bulk { columns, rows } => {
                let cols = join_idents(columns.iter());
                let tuple = placeholders(columns.len());
                let vals = vec![tuple.as_str(); rows.len()].join(", ");
                let values: Vec<Value> = rows.iter().flatten().cloned().collect();
                let sql = format!("{verb} INTO {table} ({cols}) VALUES {vals}");
                self.execute(&sql, Params::from(values))
            }
        }
    }

    /// `UPDATE table SET col = ?, ... [WHERE filter]`.
    ///
    /// Field values are bound before `params`.
    fn update(
        &self,
        table: &Ident,
        fields: &[(Ident, Value)],
        filter: Option<&Raw>,
        params: Vec<Value>,
    ) -> DbResult<Option<QueryResult>> {
        let sets = fields
            .iter()
            .map(|(c, _)| format!("{c} = ?"))
            .collect::<Vec<_>>()
            .join(", ");
        let mut values: Vec<Value> = fields.iter().map(|(_, v)| v.clone()).collect();
        values.extend(params);
        let sql = format!("UPDATE {table} SET {sets}{}", where_clause(filter));
        self.execute(&sql, Params::from(values))
    }

    /// `DELETE FROM table [WHERE filter]`.
    fn delete(
        &self,
        table: &Ident,
        filter: Option<&Raw>,
        params: Vec<Value>,
    ) -> DbResult<Option<QueryResult>> {
        let sql = format!("DELETE FROM {table}{}", where_clause(filter));
        self.execute(&sql, Params::from(params))
    }

    /// `SELECT columns FROM table [extra]`.
    fn select(
        &self,
        table: &Ident,
        columns: &Raw,
        extra: Option<&Raw>,
        params: Params,
    ) -> DbResult<Option<QueryResult>> {
        let extra = extra
            .filter(|e| !e.is_empty())
            .map(|e| format!(" {e}"))
            .unwrap_or_default();
        let sql = format!("SELECT {columns} FROM {table}{extra}");
        self.execute(&sql, params)
    }

    /// User table names from the catalog.
    fn tables(&self) -> DbResult<Vec<String>> {
        let result = self.execute(
            "SELECT name FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%'",
            Params::None,
        )?;
        Ok(result.map(|r| r.column_text(0)).unwrap_or_default())
    }

    /// Column names of `table` from the catalog.
    fn columns(&self, table: &Ident) -> DbResult<Vec<String>> {
        let result = self.execute(
            "SELECT name FROM pragma_table_info(?)",
            Params::from(Value::Text(table.as_str().to_string())),
        )?;
        Ok(result.map(|r| r.column_text(0)).unwrap_or_default())
    }

    /// True iff every name in `names` is an existing table.
    fn table_exists(&self, names: &[&str]) -> DbResult<bool> {
        let tables = self.tables()?;
        Ok(names.iter().all(|n| tables.iter().any(|t| t == n)))
    }

    /// True iff every name in `names` is a column of `table`.
    fn column_exists(&self, table: &Ident, names: &[&str]) -> DbResult<bool> {
        let columns = self.columns(table)?;
        Ok(names.iter().all(|n| columns.iter().any(|c| c == n)))
    }
}

fn join_idents<'a>(idents: impl Iterator<Item = &'a Ident>) -> String {
    idents.map(Ident::quoted).collect::<Vec<_>>().join(", ")
}

fn where_clause(filter: Option<&Raw>) -> String {
    match filter {
        Some(f) if !f.is_empty() => format!(" WHERE {f}"),
        _ => String::new(),
    }
}

/// A database connection shared between request handlers.
pub struct Db {
    conn: Mutex<Connection>,
    driver: String,
    database: String,
}

impl std::fmt::Debug for Db {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Db")
            .field("driver", &self.driver)
            .field("database", &self.database)
            .finish()
    }
}

impl Db {
    /// Open a connection from a DSN such as `sqlite:/var/lib/site.db`,
    /// `sqlite::memory:` or `sqlite::temp:`.
    ///
    /// SQLite ignores `username` and `password`.
    pub fn connect(
        dsn: &str,
        username: Option<&str>,
        password: Option<&str>,
        options: &ConnectOptions,
    ) -> DbResult<Self> {
        let connection_error = |reason: String| DbError::Connection {
            dsn: dsn.to_string(),
            reason,
        };

        let (driver, target) = dsn
            .split_once(':')
            .ok_or_else(|| connection_error("missing driver prefix".into()))?;
        let driver = driver.trim().to_lowercase();
        if driver != "sqlite" {
            return Err(connection_error(format!("unsupported driver {driver:?}")));
        }
        if username.is_some() || password.is_some() {
            tracing::debug!(driver = %driver, "Credentials are ignored by this driver");
        }

        let target = target.trim();
        let (conn, database) = match target {
            ":memory:" => (
                Connection::open_in_memory().map_err(|e| connection_error(e.to_string()))?,
                ":memory:".to_string(),
            ),
            "" => return Err(connection_error("missing database path".into())),
            path => {
                let path = if path == ":temp:" {
                    std::env::temp_dir().join("sitekit-temp-db.sqlite")
                } else {
                    PathBuf::from(path)
                };
                let conn = Connection::open(&path).map_err(|e| connection_error(e.to_string()))?;
                (conn, path.display().to_string())
            }
        };

        if options.foreign_keys {
            conn.execute_batch("PRAGMA foreign_keys = ON;")
                .map_err(|e| connection_error(e.to_string()))?;
        }
        if options.synchronous_off {
            conn.execute_batch("PRAGMA synchronous = OFF;")
                .map_err(|e| connection_error(e.to_string()))?;
        }
        if let Some(timeout) = options.busy_timeout {
            conn.busy_timeout(timeout)
                .map_err(|e| connection_error(e.to_string()))?;
        }

        tracing::info!(driver = %driver, database = %database, "Database connected");
        Ok(Self {
            conn: Mutex::new(conn),
            driver,
            database,
        })
    }

    /// In-memory database with default options.
    pub fn memory() -> DbResult<Self> {
        Self::connect("sqlite::memory:", None, None, &ConnectOptions::default())
    }

    /// Lowercase driver name from the DSN.
    pub fn driver(&self) -> &str {
        &self.driver
    }

    /// Database path (or `:memory:`).
    pub fn database(&self) -> &str {
        &self.database
    }

    fn lock(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Run `f` with the connection held and inside `BEGIN IMMEDIATE`.
    ///
    /// Commits when `f` succeeds and rolls back otherwise, including when
    /// the commit itself fails. Other callers of
    /// this `Db` block until the block finishes; other processes are held off
    /// by SQLite's write lock.
    pub fn atomic<T>(&self, f: impl FnOnce(&Session<'_>) -> DbResult<T>) -> DbResult<T> {
        let conn = self.lock();
        conn.execute_batch("BEGIN IMMEDIATE")?;
        let session = Session { conn: &*conn };
        let outcome = f(&session).and_then(|value| {
            conn.execute_batch("COMMIT")?;
            Ok(value)
        });
        // A failed COMMIT leaves the transaction open.
        if outcome.is_err() && !conn.is_autocommit() {
            if let Err(rollback) = conn.execute_batch("ROLLBACK") {
                tracing::error!(error = %rollback, "Rollback failed");
            }
        }
        outcome
    }
}

impl Executor for Db {
    fn execute(&self, sql: &str, params: Params) -> DbResult<Option<QueryResult>> {
        let conn = self.lock();
        run_statement(&conn, sql, params)
    }
}

/// A connection borrowed for the duration of [`Db::atomic`].
pub struct Session<'a> {
    conn: &'a Connection,
}

impl Executor for Session<'_> {
    fn execute(&self, sql: &str, params: Params) -> DbResult<Option<QueryResult>> {
        run_statement(self.conn, sql, params)
    }
}

fn run_statement(conn: &Connection, sql: &str, params: Params) -> DbResult<Option<QueryResult>> {
    tracing::trace!(sql = %sql, params = params.len(), "Executing statement");

    let mut stmt = match conn.prepare(sql) {
        Ok(stmt) => stmt,
        Err(e) => {
            tracing::warn!(error = %e, sql = %sql, "Statement prepare failed");
            metrics::record_statement("prepare_failed");
            return Ok(None);
        }
    };

    let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
    let width = columns.len();
    let mut result = QueryResult {
        columns,
        ..QueryResult::default()
    };

    let outcome = if width == 0 {
        match &params {
            Params::None => stmt.execute([]),
            Params::Positional(values) => stmt.execute(params_from_iter(values.iter())),
            Params::Named(named) => stmt.execute(named_refs(named).as_slice()),
        }
        .map(|affected| result.affected = affected)
    } else {
        fetch_rows(&mut stmt, &params, width).map(|rows| result.rows = rows)
    };

    if let Err(e) = outcome {
        metrics::record_statement("failed");
        return Err(DbError::Execution(e));
    }

    result.last_insert_id = conn.last_insert_rowid();
    metrics::record_statement("ok");
    Ok(Some(result))
}

fn fetch_rows(
    stmt: &mut rusqlite::Statement<'_>,
    params: &Params,
    width: usize,
) -> rusqlite::Result<Vec<Vec<Value>>> {
    let mut rows = match params {
        Params::None => stmt.query([])?,
        Params::Positional(values) => stmt.query(params_from_iter(values.iter()))?,
        Params::Named(named) => stmt.query(named_refs(named).as_slice())?,
    };

    let mut out = Vec::new();
    while let Some(row) = rows.next()? {
        let mut values = Vec::with_capacity(width);
        for i in 0..width {
            values.push(row.get::<_, Value>(i)?);
        }
        out.push(values);
    }
    Ok(out)
}

fn named_refs(named: &[(String, Value)]) -> Vec<(&str, &dyn ToSql)> {
    named
        .iter()
        .map(|(name, value)| (name.as_str(), value as &dyn ToSql))
        .collect()
}
