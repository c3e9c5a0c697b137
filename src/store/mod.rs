#![forbid(unsafe_code)]

//! Read-only SQLite store and bounded plan execution.
//!
//! The store owns a fixed pool of connections opened with
//! `SQLITE_OPEN_READ_ONLY` and `PRAGMA query_only`. Every plan runs under a
//! progress handler that interrupts the statement once its deadline passes,
//! so a timed-out query is cancelled inside the engine rather than left
//! running.

mod catalog;
mod demo;
mod error;
mod options;

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

use parking_lot::{Mutex, MutexGuard};
use rusqlite::{Connection, OpenFlags};
use tracing::{debug, warn};

use crate::query::{ExecError, ExecutionPlan, Value};

/// Schema inspection against the store.
pub use catalog::{
    quote_ident, sanitize_table_name, Catalog, ColumnDef, SqliteCatalog, TableSchema,
};

/// Deterministic demo dataset.
pub use demo::{seed_demo, SeedReport};

/// Error types for store operations.
pub use error::{Result, StoreError};

/// Configuration for [`Store::open`].
pub use options::StoreOptions;

/// Column as reported by the engine.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SourceColumn {
    /// Result column name, possibly repeated.
    pub name: String,
    /// Declared type of the underlying table column, when there is one.
    pub declared_type: Option<String>,
}

/// Rows produced by one plan.
#[derive(Clone, Debug, PartialEq)]
pub struct ResultSet {
    /// Columns in engine order.
    pub columns: Vec<SourceColumn>,
    /// At most `plan.row_cap()` rows.
    pub rows: Vec<Vec<Value>>,
    /// The look-ahead row was present.
    pub has_more: bool,
    /// Exact total, when derivable from the page or counted.
    pub total_rows: Option<u64>,
}

/// Pooled read-only connections to one database file.
pub struct Store {
    path: PathBuf,
    connections: Vec<Mutex<Connection>>,
    cursor: AtomicUsize,
    options: StoreOptions,
}

impl Store {
    /// Opens `path` read-only. The file must already exist.
    pub fn open(path: impl AsRef<Path>, options: StoreOptions) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(StoreError::missing_database(path));
        }
        if options.pool_size == 0 {
            return Err(StoreError::InvalidOption("pool_size must be at least 1".into()));
        }
        if options.timeout.is_zero() {
            return Err(StoreError::InvalidOption("timeout must be positive".into()));
        }

        let mut connections = Vec::with_capacity(options.pool_size);
        for _ in 0..options.pool_size {
            let conn = open_connection(path, &options)?;
            connections.push(Mutex::new(conn));
        }
        debug!(
            path = %path.display(),
            pool_size = options.pool_size,
            timeout_ms = options.timeout.as_millis() as u64,
            "store.open"
        );
        Ok(Self {
            path: path.to_path_buf(),
            connections,
            cursor: AtomicUsize::new(0),
            options,
        })
    }

    /// Database file backing this store.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Options the store was opened with.
    pub fn options(&self) -> &StoreOptions {
        &self.options
    }

    /// Runs a plan under the configured deadline.
    ///
    /// The count query, when the plan carries one and the page alone cannot
    /// tell the total, shares the same deadline as the main statement.
    pub fn execute(&self, plan: &ExecutionPlan) -> std::result::Result<ResultSet, ExecError> {
        let budget = self.options.timeout;
        let conn = self.acquire();

        let deadline = Instant::now() + budget;
        let fired = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&fired);
        conn.progress_handler(
            self.options.progress_interval,
            Some(move || {
                let expired = Instant::now() >= deadline;
                if expired {
                    flag.store(true, Ordering::Relaxed);
                }
                expired
            }),
        );

        let outcome = run_plan(&conn, plan);

        conn.progress_handler(0, None::<fn() -> bool>);
        release(&conn);
        drop(conn);

        outcome.map_err(|err| {
            let failure = ExecError::from_engine(err, fired.load(Ordering::Relaxed), budget);
            if let ExecError::Timeout { .. } = failure {
                warn!(budget_ms = budget.as_millis() as u64, "store.execute.timeout");
            }
            failure
        })
    }

    /// Cheap liveness check used by `/health`.
    pub fn ping(&self) -> Result<()> {
        let conn = self.acquire();
        conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0))?;
        Ok(())
    }

    /// Runs `f` against a pooled connection. Used for catalog lookups, which
    /// are trusted statements and do not go through the query core.
    pub(crate) fn with_connection<T>(
        &self,
        f: impl FnOnce(&Connection) -> rusqlite::Result<T>,
    ) -> Result<T> {
        let conn = self.acquire();
        let out = f(&conn);
        release(&conn);
        Ok(out?)
    }

    /// Picks the next connection round-robin, preferring one that is idle.
    fn acquire(&self) -> MutexGuard<'_, Connection> {
        let len = self.connections.len();
        let start = self.cursor.fetch_add(1, Ordering::Relaxed) % len;
        for step in 0..len {
            if let Some(guard) = self.connections[(start + step) % len].try_lock() {
                return guard;
            }
        }
        self.connections[start].lock()
    }
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("path", &self.path)
            .field("pool_size", &self.connections.len())
            .field("options", &self.options)
            .finish()
    }
}

fn open_connection(path: &Path, options: &StoreOptions) -> Result<Connection> {
    let flags = OpenFlags::SQLITE_OPEN_READ_ONLY
        | OpenFlags::SQLITE_OPEN_NO_MUTEX
        | OpenFlags::SQLITE_OPEN_URI;
    let conn = Connection::open_with_flags(path, flags)?;
    apply_pragmas(&conn, options)?;
    Ok(conn)
}

fn apply_pragmas(conn: &Connection, options: &StoreOptions) -> Result<()> {
    conn.busy_timeout(options.busy_timeout)?;
    conn.execute_batch("PRAGMA query_only = ON;")?;
    Ok(())
}

fn run_plan(conn: &Connection, plan: &ExecutionPlan) -> rusqlite::Result<ResultSet> {
    // A wrapping subquery renames repeated columns, so names and declared
    // types come from the statement as the user wrote it.
    let columns = describe(conn, plan.statement())?;
    let mut stmt = conn.prepare(plan.sql())?;
    let width = stmt.column_count();
    let cap = plan.row_cap();

    let mut rows = Vec::new();
    let mut overflow = false;
    let mut cursor = stmt.query([])?;
    while let Some(row) = cursor.next()? {
        if rows.len() == cap {
            overflow = true;
            break;
        }
        let mut values = Vec::with_capacity(width);
        for idx in 0..width {
            values.push(Value::from_sql(row.get_ref(idx)?));
        }
        rows.push(values);
    }
    drop(cursor);

    let has_more = overflow && plan.wants_lookahead();
    let total_rows = match plan.total_from_page(rows.len(), has_more) {
        Some(total) => Some(total),
        None => plan.count_sql().and_then(|sql| count_rows(conn, sql)),
    };

    Ok(ResultSet {
        columns,
        rows,
        has_more,
        total_rows,
    })
}

/// Exact totals are best effort. A count that fails or runs past the deadline
/// leaves the total unknown and the page already fetched stands.
fn count_rows(conn: &Connection, sql: &str) -> Option<u64> {
    match conn.query_row(sql, [], |row| row.get::<_, i64>(0)) {
        Ok(counted) => Some(u64::try_from(counted).unwrap_or(0)),
        Err(err) => {
            warn!(error = %err, "store.count.abandoned");
            None
        }
    }
}

fn describe(conn: &Connection, sql: &str) -> rusqlite::Result<Vec<SourceColumn>> {
    let stmt = conn.prepare(sql)?;
    let columns = stmt
        .columns()
        .iter()
        .map(|col| SourceColumn {
            name: col.name().to_string(),
            declared_type: col.decl_type().map(str::to_string),
        })
        .collect();
    Ok(columns)
}

/// Leaves the connection in autocommit mode before it returns to the pool.
fn release(conn: &Connection) {
    if !conn.is_autocommit() {
        if let Err(err) = conn.execute_batch("ROLLBACK") {
            warn!(error = %err, "store.release.rollback_failed");
        }
    }
}
