use std::path::{Path, PathBuf};

use thiserror::Error;

/// Errors raised while opening, inspecting or seeding a store.
///
/// Per-query failures are reported as [`crate::query::ExecError`] instead.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Database file not found at the specified path.
    #[error("database not found: {0}")]
    MissingDatabase(PathBuf),
    /// An option value cannot be used.
    #[error("invalid store option: {0}")]
    InvalidOption(String),
    /// Demo seeding found a table it would create.
    #[error("table '{table}' already exists in {}", .path.display())]
    AlreadySeeded {
        /// Existing table.
        table: &'static str,
        /// Database file.
        path: PathBuf,
    },
    /// A table name failed sanitisation or does not exist.
    #[error("unknown table '{0}'")]
    UnknownTable(String),
    /// Engine error.
    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),
    /// I/O error.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Result type alias for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

impl StoreError {
    pub(crate) fn missing_database(path: impl AsRef<Path>) -> Self {
        StoreError::MissingDatabase(path.as_ref().to_path_buf())
    }
}
