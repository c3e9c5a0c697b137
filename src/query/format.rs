//! Page envelope construction.

use std::collections::HashSet;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::query::plan::ExecutionPlan;
use crate::query::value::Value;
use crate::store::ResultSet;

/// Column metadata exposed to callers.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnInfo {
    /// Unique column name.
    pub name: String,
    /// Declared type, or the type of the first non-null value.
    pub data_type: String,
}

/// One page of results plus pagination metadata.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PageEnvelope {
    /// Result columns in engine order.
    pub columns: Vec<ColumnInfo>,
    /// Row values, one vector per row, aligned with `columns`.
    pub rows: Vec<Vec<Value>>,
    /// Number of rows in this page.
    pub row_count: usize,
    /// 1-based page number actually served.
    pub page: u32,
    /// Rows per page in effect.
    pub page_size: u32,
    /// Total rows across all pages, when known.
    pub total_rows: Option<u64>,
    /// Whether another page exists.
    pub has_more: bool,
    /// True when the user's own LIMIT ran without rewriting.
    pub user_limit_honored: bool,
    /// Wall-clock time spent in the store, in milliseconds.
    pub execution_time_ms: f64,
}

impl PageEnvelope {
    /// Looks up a column position by its (disambiguated) name.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }
}

/// Builds the caller-facing envelope for one executed plan.
pub fn format(result: ResultSet, plan: &ExecutionPlan, elapsed: Duration) -> PageEnvelope {
    let names = unique_names(result.columns.iter().map(|c| c.name.as_str()));
    let columns = names
        .into_iter()
        .zip(&result.columns)
        .enumerate()
        .map(|(idx, (name, source))| ColumnInfo {
            name,
            data_type: column_type(source.declared_type.as_deref(), &result.rows, idx),
        })
        .collect();

    let request = plan.request();
    PageEnvelope {
        columns,
        row_count: result.rows.len(),
        rows: result.rows,
        page: request.page,
        page_size: request.page_size.get(),
        total_rows: result.total_rows,
        has_more: result.has_more,
        user_limit_honored: plan.user_limit_honored(),
        execution_time_ms: elapsed.as_secs_f64() * 1000.0,
    }
}

/// Appends `_2`, `_3`, ... to repeated names, skipping any suffix that would
/// collide with a name already present in the result.
fn unique_names<'a>(names: impl Iterator<Item = &'a str> + Clone) -> Vec<String> {
    let originals: HashSet<&str> = names.clone().collect();
    let mut used: HashSet<String> = HashSet::new();
    let mut out = Vec::new();
    for name in names {
        let chosen = if used.contains(name) {
            (2usize..)
                .map(|n| format!("{name}_{n}"))
                .find(|candidate| {
                    !used.contains(candidate) && !originals.contains(candidate.as_str())
                })
                .unwrap_or_else(|| name.to_string())
        } else {
            name.to_string()
        };
        used.insert(chosen.clone());
        out.push(chosen);
    }
    out
}

fn column_type(declared: Option<&str>, rows: &[Vec<Value>], idx: usize) -> String {
    if let Some(declared) = declared.map(str::trim).filter(|d| !d.is_empty()) {
        return declared.to_string();
    }
    rows.iter()
        .filter_map(|row| row.get(idx))
        .find(|value| !value.is_null())
        .map_or("null", Value::type_name)
        .to_string()
}
