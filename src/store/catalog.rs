//! Read-only schema lookups.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::error::Result;
use super::Store;

/// Column definition as declared in the schema.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnDef {
    /// Column name.
    pub name: String,
    /// Declared type text, empty when the column has none.
    #[serde(rename = "type")]
    pub declared_type: String,
    /// NOT NULL constraint present.
    pub notnull: bool,
    /// Part of the primary key.
    pub pk: bool,
}

/// A table and its columns.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSchema {
    /// Table name.
    pub name: String,
    /// Columns in declaration order.
    pub columns: Vec<ColumnDef>,
}

/// Provides table and column metadata.
pub trait Catalog: Send + Sync {
    /// User table names, sorted.
    fn tables(&self) -> Result<Vec<String>>;
    /// Columns of `table`; empty when the table does not exist.
    fn columns(&self, table: &str) -> Result<Vec<ColumnDef>>;

    /// Exact-name existence check.
    fn table_exists(&self, table: &str) -> Result<bool> {
        Ok(self.tables()?.iter().any(|name| name == table))
    }

    /// True when an equi-join between two `(table, column)` pairs yields at
    /// least one row. Catalogs that cannot tell answer `true`.
    fn joinable(&self, _left: (&str, &str), _right: (&str, &str)) -> Result<bool> {
        Ok(true)
    }

    /// Every table with its columns.
    fn schema(&self) -> Result<Vec<TableSchema>> {
        self.tables()?
            .into_iter()
            .map(|name| {
                let columns = self.columns(&name)?;
                Ok(TableSchema { name, columns })
            })
            .collect()
    }
}

/// Catalog backed by `sqlite_master` and `pragma_table_info`.
#[derive(Clone, Debug)]
pub struct SqliteCatalog {
    store: Arc<Store>,
}

impl SqliteCatalog {
    /// Wraps a shared store.
    pub fn new(store: Arc<Store>) -> Self {
        Self { store }
    }
}

impl Catalog for SqliteCatalog {
    fn tables(&self) -> Result<Vec<String>> {
        self.store.with_connection(|conn| {
            let mut stmt = conn.prepare(
                "SELECT name FROM sqlite_master \
                 WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name",
            )?;
            let names = stmt
                .query_map([], |row| row.get::<_, String>(0))?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(names)
        })
    }

    fn columns(&self, table: &str) -> Result<Vec<ColumnDef>> {
        self.store.with_connection(|conn| {
            let mut stmt = conn.prepare(
                "SELECT name, type, \"notnull\", pk FROM pragma_table_info(?1) ORDER BY cid",
            )?;
            let columns = stmt
                .query_map([table], |row| {
                    Ok(ColumnDef {
                        name: row.get(0)?,
                        declared_type: row.get::<_, Option<String>>(1)?.unwrap_or_default(),
                        notnull: row.get::<_, i64>(2)? != 0,
                        pk: row.get::<_, i64>(3)? != 0,
                    })
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(columns)
        })
    }

    fn joinable(&self, left: (&str, &str), right: (&str, &str)) -> Result<bool> {
        let sql = format!(
            "SELECT EXISTS(SELECT 1 FROM {} AS l JOIN {} AS r ON l.{} = r.{})",
            quote_ident(left.0),
            quote_ident(right.0),
            quote_ident(left.1),
            quote_ident(right.1),
        );
        self.store
            .with_connection(|conn| conn.query_row(&sql, [], |row| row.get::<_, bool>(0)))
    }
}

/// Wraps an identifier in double quotes, doubling embedded quotes.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Strips everything but word characters and requires a leading letter or
/// underscore. Returns `None` when nothing usable remains.
pub fn sanitize_table_name(raw: &str) -> Option<String> {
    let cleaned: String = raw
        .chars()
        .filter(|c| c.is_alphanumeric() || *c == '_')
        .collect();
    let first = cleaned.chars().next()?;
    (first.is_ascii_alphabetic() || first == '_').then_some(cleaned)
}
