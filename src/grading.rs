#![forbid(unsafe_code)]

//! Compares a candidate query against a reference query.

use serde::Serialize;
use thiserror::Error;
use tracing::warn;

use crate::activity::SessionToken;
use crate::query::{PageEnvelope, PageSize, QueryError, Value};
use crate::service::{QueryRequest, QueryService};

/// Rows read from either query before grading gives up on it.
pub const MAX_GRADED_ROWS: usize = 50_000;

/// Verdict for one answer.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct AnswerCheck {
    /// Results matched.
    pub correct: bool,
    /// Message shown to the candidate.
    pub message: String,
    /// Rows returned by the candidate query, when it ran.
    pub candidate_rows: Option<usize>,
    /// Rows returned by the reference query, when it ran.
    pub expected_rows: Option<usize>,
}

/// Runs both queries through the query core, page by page, and compares the
/// complete results: column names and row values in order.
///
/// Only the candidate's attempts carry `session`; the reference query is
/// recorded without one.
pub fn check_answer(
    service: &QueryService,
    candidate: &str,
    expected: &str,
    session: Option<SessionToken>,
) -> AnswerCheck {
    let candidate_result = match collect(service, candidate, session) {
        Ok(result) => result,
        Err(err) => {
            return AnswerCheck {
                correct: false,
                message: format!("Query error: {err}"),
                candidate_rows: None,
                expected_rows: None,
            }
        }
    };

    let expected_result = match collect(service, expected, None) {
        Ok(result) => result,
        Err(err) => {
            warn!(error = %err, "grading.expected_query_failed");
            return AnswerCheck {
                correct: false,
                message: "System error with expected query".to_string(),
                candidate_rows: Some(candidate_result.rows.len()),
                expected_rows: None,
            };
        }
    };

    let correct = candidate_result == expected_result;
    let message = if correct {
        "Correct! Your query returned the expected results.".to_string()
    } else {
        format!(
            "Incorrect. Your query returned {} rows, expected {} rows.",
            candidate_result.rows.len(),
            expected_result.rows.len()
        )
    };
    AnswerCheck {
        correct,
        message,
        candidate_rows: Some(candidate_result.rows.len()),
        expected_rows: Some(expected_result.rows.len()),
    }
}

#[derive(Debug, PartialEq)]
struct FullResult {
    columns: Vec<String>,
    rows: Vec<Vec<Value>>,
}

#[derive(Debug, Error)]
enum CollectError {
    #[error(transparent)]
    Query(#[from] QueryError),
    #[error("result has more than {} rows; narrow the query before checking it", MAX_GRADED_ROWS)]
    TooLarge,
}

fn collect(
    service: &QueryService,
    sql: &str,
    session: Option<SessionToken>,
) -> Result<FullResult, CollectError> {
    let mut columns = None;
    let mut rows = Vec::new();
    let mut page = 1;
    loop {
        let mut request = QueryRequest::new(sql)
            .page(page)
            .page_size(PageSize::DEFAULT.get());
        request.session = session.clone();
        let envelope = service.run_query(&request)?;
        columns.get_or_insert_with(|| column_names(&envelope));
        rows.extend(envelope.rows);
        if rows.len() > MAX_GRADED_ROWS {
            return Err(CollectError::TooLarge);
        }
        if !envelope.has_more {
            break;
        }
        page += 1;
    }
    Ok(FullResult {
        columns: columns.unwrap_or_default(),
        rows,
    })
}

fn column_names(page: &PageEnvelope) -> Vec<String> {
    page.columns.iter().map(|c| c.name.clone()).collect()
}
