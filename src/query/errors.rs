#![forbid(unsafe_code)]

use std::fmt;
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;

/// Reasons a query is refused before it reaches the store.
///
/// Rejections are deterministic and cheap; they are reported to the caller
/// with a specific code and are never treated as system errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Rejection {
    /// Text was empty, whitespace, or only comments.
    #[error("query cannot be empty")]
    EmptyQuery,
    /// The statement does not start with SELECT.
    #[error("only SELECT statements are allowed")]
    MustBeSelect,
    /// A mutating or DDL keyword appeared as a bare word.
    #[error("prohibited operation '{0}' is not allowed")]
    ProhibitedKeyword(&'static str),
    /// More than one statement was submitted.
    #[error("only a single SQL statement may be submitted")]
    MultipleStatements,
    /// The user-authored LIMIT exceeds the hard row ceiling.
    #[error("LIMIT {limit} exceeds the maximum of {max} rows")]
    LimitTooLarge {
        /// Limit found in the query text.
        limit: u64,
        /// Hard ceiling enforced by the planner.
        max: u64,
    },
}

impl Rejection {
    /// Returns a machine-readable code for the rejection.
    pub fn code(&self) -> &'static str {
        match self {
            Rejection::EmptyQuery => "EmptyQuery",
            Rejection::MustBeSelect => "MustBeSelect",
            Rejection::ProhibitedKeyword(_) => "ProhibitedKeyword",
            Rejection::MultipleStatements => "MultipleStatements",
            Rejection::LimitTooLarge { .. } => "LimitTooLarge",
        }
    }
}

/// Failures reported while the store runs a plan.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ExecError {
    /// The statement exceeded its wall-clock budget and was interrupted.
    #[error("query exceeded the {after:?} time limit; try narrowing it with WHERE or LIMIT")]
    Timeout {
        /// Budget that was exceeded.
        after: Duration,
    },
    /// The engine rejected the SQL as malformed.
    #[error("{0}")]
    SyntaxError(String),
    /// Any other engine failure (missing table, type mismatch, ...).
    #[error("{0}")]
    RuntimeError(String),
}

impl ExecError {
    /// Returns a machine-readable code for the failure.
    pub fn code(&self) -> &'static str {
        match self {
            ExecError::Timeout { .. } => "Timeout",
            ExecError::SyntaxError(_) => "SyntaxError",
            ExecError::RuntimeError(_) => "RuntimeError",
        }
    }

    /// Classifies an engine error. `interrupted` reports whether the deadline
    /// fired while the statement was running.
    pub(crate) fn from_engine(err: rusqlite::Error, interrupted: bool, budget: Duration) -> Self {
        if interrupted
            && err.sqlite_error_code() == Some(rusqlite::ErrorCode::OperationInterrupted)
        {
            return ExecError::Timeout { after: budget };
        }
        let detail = err.to_string();
        if is_syntax_detail(&detail) {
            ExecError::SyntaxError(detail)
        } else {
            ExecError::RuntimeError(detail)
        }
    }
}

fn is_syntax_detail(detail: &str) -> bool {
    let lowered = detail.to_ascii_lowercase();
    ["syntax error", "incomplete input", "unrecognized token"]
        .iter()
        .any(|marker| lowered.contains(marker))
}

/// Any failure surfaced by [`crate::service::QueryService::run_query`].
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum QueryError {
    /// Refused by the validator or planner; the store was never touched.
    #[error(transparent)]
    Rejected(#[from] Rejection),
    /// The store failed to run the plan.
    #[error(transparent)]
    Failed(#[from] ExecError),
}

impl QueryError {
    /// Stable error kind string exposed to callers.
    pub fn code(&self) -> &'static str {
        match self {
            QueryError::Rejected(rejection) => rejection.code(),
            QueryError::Failed(failure) => failure.code(),
        }
    }

    /// True for validation and planning rejections.
    pub fn is_rejection(&self) -> bool {
        matches!(self, QueryError::Rejected(_))
    }

    /// Serializable `{error, message}` body for transports.
    pub fn payload(&self) -> ErrorPayload {
        ErrorPayload {
            error: self.code(),
            message: self.to_string(),
        }
    }
}

/// Wire shape of an error response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorPayload {
    /// Stable error kind.
    pub error: &'static str,
    /// Human-readable detail.
    pub message: String,
}

/// Convenience wrapper that formats query errors with their codes.
pub struct QueryErrorWithCode<'a>(pub &'a QueryError);

impl fmt::Display for QueryErrorWithCode<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.0.code(), self.0)
    }
}
