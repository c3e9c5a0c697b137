#![forbid(unsafe_code)]

//! Query core: validation, pagination planning, and result formatting.
//!
//! Candidate SQL flows through these modules in a fixed order: the validator
//! produces a [`ValidatedQuery`], the planner turns it into an
//! [`ExecutionPlan`], the store runs the plan, and the formatter wraps the rows
//! in a [`PageEnvelope`].

/// Error kinds surfaced by the query core.
///
/// Every error carries a stable code string that transports expose verbatim.
pub mod errors;

/// Caller-facing page envelope construction.
pub mod format;

/// Complexity scoring and performance hints.
pub mod insights;

/// Quote-, comment- and parenthesis-aware SQL scanner.
pub mod lexer;

/// Page size normalization and LIMIT-aware plan construction.
pub mod plan;

/// Static SELECT-only safety checks.
pub mod validate;

/// Transport-safe tagged cell values.
pub mod value;

pub use errors::{ExecError, QueryError, QueryErrorWithCode, Rejection};
pub use format::{format, ColumnInfo, PageEnvelope};
pub use insights::{analyze, PerformanceLevel, QueryInsights};
pub use plan::{
    plan, CountPolicy, ExecutionPlan, PageRequest, PageSize, PlanMode, HARD_ROW_CEILING,
};
pub use validate::{validate, ValidatedQuery, Verdict};
pub use value::Value;
