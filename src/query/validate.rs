//! Static safety checks applied to candidate SQL before anything else runs.

use crate::query::errors::Rejection;
use crate::query::lexer::{self, TokenKind};

/// Keywords that may never appear as bare words in a submitted query.
pub const PROHIBITED_KEYWORDS: &[&str] = &[
    "INSERT", "UPDATE", "DELETE", "DROP", "ALTER", "CREATE", "TRUNCATE", "ATTACH", "REPLACE",
    "GRANT", "MERGE", "REVOKE", "EXEC", "EXECUTE", "PRAGMA", "DETACH",
];

/// Outcome of [`validate`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Verdict {
    /// The query may be planned and executed.
    Accepted(ValidatedQuery),
    /// The query was refused.
    Rejected(Rejection),
}

impl Verdict {
    /// Converts the verdict into a `Result`.
    pub fn into_result(self) -> Result<ValidatedQuery, Rejection> {
        match self {
            Verdict::Accepted(query) => Ok(query),
            Verdict::Rejected(reason) => Err(reason),
        }
    }

    /// True for [`Verdict::Accepted`].
    pub fn is_accepted(&self) -> bool {
        matches!(self, Verdict::Accepted(_))
    }
}

/// A single SELECT statement that passed validation.
///
/// Only [`validate`] constructs this type, which is what keeps unvalidated
/// text away from the planner and the store.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ValidatedQuery {
    statement: String,
}

impl ValidatedQuery {
    /// Statement text with comments removed and trailing semicolons trimmed.
    ///
    /// This is the text that gets embedded into execution plans; removing line
    /// comments keeps a trailing `-- note` from swallowing a wrapper suffix.
    pub fn statement(&self) -> &str {
        &self.statement
    }
}

/// Inspects `sql` and decides whether it may run.
///
/// Checks run in order: empty text, leading SELECT, statement count, and the
/// keyword denylist. Only bare words are compared against the denylist, so
/// `updated_at`, `'please delete'` and `"drop"` are all fine.
pub fn validate(sql: &str) -> Verdict {
    match check(sql) {
        Ok(statement) => Verdict::Accepted(ValidatedQuery { statement }),
        Err(reason) => Verdict::Rejected(reason),
    }
}

fn check(sql: &str) -> Result<String, Rejection> {
    if sql.trim().is_empty() {
        return Err(Rejection::EmptyQuery);
    }

    let scanned = lexer::scan(sql);
    let tokens = &scanned.tokens;
    let first = tokens.first().ok_or(Rejection::EmptyQuery)?;
    if !first.is_word("SELECT") {
        return Err(Rejection::MustBeSelect);
    }

    if let Some(semi) = tokens.iter().position(|t| t.kind == TokenKind::Semicolon) {
        let trailing_statement = tokens[semi..]
            .iter()
            .any(|t| t.kind != TokenKind::Semicolon);
        if trailing_statement {
            return Err(Rejection::MultipleStatements);
        }
    }

    for token in tokens.iter().filter(|t| t.kind == TokenKind::Word) {
        if let Some(keyword) = PROHIBITED_KEYWORDS
            .iter()
            .copied()
            .find(|keyword| token.text.eq_ignore_ascii_case(keyword))
        {
            return Err(Rejection::ProhibitedKeyword(keyword));
        }
    }

    let stripped = lexer::strip_comments(sql);
    let statement = stripped
        .trim()
        .trim_end_matches(|c: char| c == ';' || c.is_whitespace())
        .to_string();
    Ok(statement)
}
