//! Pagination planning.
//!
//! Turns a validated statement plus a page request into the exact SQL sent to
//! the store. A user-authored top-level `LIMIT` that fits inside one page is
//! executed verbatim; everything else is wrapped in an outer bound that only
//! fetches the requested window plus one look-ahead row.
//!
//! Row order across pages is whatever the engine produces for the inner
//! statement. Without an `ORDER BY` (or with an `ORDER BY` that has ties) two
//! requests for adjacent pages may overlap or skip rows; that is a property of
//! the submitted query and is not corrected here.

use serde::{Deserialize, Serialize};

use crate::query::errors::Rejection;
use crate::query::lexer::{self, Token, TokenKind};
use crate::query::validate::ValidatedQuery;

/// Maximum number of rows ever returned to a caller for one request.
pub const HARD_ROW_CEILING: u64 = 5_000;

/// Page sizes a caller may request.
pub const ALLOWED_PAGE_SIZES: [u32; 4] = [100, 250, 500, 1_000];

/// Rows per page, always one of [`ALLOWED_PAGE_SIZES`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub struct PageSize(u32);

impl PageSize {
    /// Largest allowed size; also the default when nothing is configured.
    pub const DEFAULT: PageSize = PageSize(1_000);

    /// Returns the page size when `value` is exactly an allowed size.
    pub fn new(value: u32) -> Option<Self> {
        ALLOWED_PAGE_SIZES
            .contains(&value)
            .then_some(PageSize(value))
    }

    /// Snaps `requested` to the closest allowed size.
    ///
    /// Ties resolve to the smaller size, so 175 becomes 100 and 0 becomes 100.
    pub fn nearest(requested: u32) -> Self {
        let mut best = ALLOWED_PAGE_SIZES[0];
        for &candidate in &ALLOWED_PAGE_SIZES[1..] {
            if candidate.abs_diff(requested) < best.abs_diff(requested) {
                best = candidate;
            }
        }
        PageSize(best)
    }

    /// Raw row count.
    pub fn get(self) -> u32 {
        self.0
    }
}

impl Default for PageSize {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl TryFrom<u32> for PageSize {
    type Error = String;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        PageSize::new(value).ok_or_else(|| {
            format!("page size {value} is not one of {ALLOWED_PAGE_SIZES:?}")
        })
    }
}

impl From<PageSize> for u32 {
    fn from(value: PageSize) -> Self {
        value.0
    }
}

/// Which page of results the caller wants.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PageRequest {
    /// 1-based page number.
    pub page: u32,
    /// Rows per page.
    pub page_size: PageSize,
}

impl PageRequest {
    /// Normalizes caller input: missing or zero pages become page 1 and page
    /// sizes snap to the nearest allowed value.
    pub fn new(page: Option<u32>, page_size: Option<u32>, default_size: PageSize) -> Self {
        Self {
            page: page.unwrap_or(1).max(1),
            page_size: page_size.map_or(default_size, PageSize::nearest),
        }
    }

    /// Rows skipped before this page.
    pub fn offset(&self) -> u64 {
        u64::from(self.page - 1) * u64::from(self.page_size.get())
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        Self::new(None, None, PageSize::DEFAULT)
    }
}

/// Whether the planner asks the store for an exact total row count.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CountPolicy {
    /// Report totals only when they fall out of the page itself.
    #[default]
    Never,
    /// Run `COUNT(*)` over the statement when the page alone cannot tell.
    Exact,
}

/// What the scanner found after the outermost `LIMIT` keyword.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TopLevelLimit {
    /// No top-level LIMIT clause.
    Absent,
    /// `LIMIT n`, `LIMIT n OFFSET m` or `LIMIT m, n` with integer literals.
    Literal(u64),
    /// A LIMIT exists but its value is not a plain literal, or the text could
    /// not be scanned reliably.
    Opaque,
}

/// Finds the LIMIT clause that belongs to the outermost statement.
///
/// LIMITs inside parentheses (subqueries, CTE bodies) are ignored. Text with
/// unterminated quotes or unbalanced parentheses reports [`TopLevelLimit::Opaque`]
/// when it contains the word at all, which callers treat like an absent limit.
pub fn top_level_limit(statement: &str) -> TopLevelLimit {
    let scanned = lexer::scan(statement);
    if scanned.is_ambiguous() {
        return if statement.to_ascii_uppercase().contains("LIMIT") {
            TopLevelLimit::Opaque
        } else {
            TopLevelLimit::Absent
        };
    }
    let tokens = &scanned.tokens;
    let Some(idx) = tokens
        .iter()
        .rposition(|t| t.depth == 0 && t.is_word("LIMIT"))
    else {
        return TopLevelLimit::Absent;
    };

    let rest = &tokens[idx + 1..];
    let count = match rest {
        [n] if n.kind == TokenKind::Number => Some(n),
        [n, kw, m] if n.kind == TokenKind::Number
            && kw.is_word("OFFSET")
            && m.kind == TokenKind::Number =>
        {
            Some(n)
        }
        [m, comma, n] if m.kind == TokenKind::Number
            && comma.kind == TokenKind::Comma
            && n.kind == TokenKind::Number =>
        {
            Some(n)
        }
        _ => None,
    };
    count
        .and_then(integer_literal)
        .map_or(TopLevelLimit::Opaque, TopLevelLimit::Literal)
}

fn integer_literal(token: &Token<'_>) -> Option<u64> {
    let text = token.text;
    if let Some(hex) = text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        return u64::from_str_radix(hex, 16).ok();
    }
    if !text.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    // Out-of-range digit strings are still integers; they only need to fail
    // the ceiling check.
    Some(text.parse::<u64>().unwrap_or(u64::MAX))
}

/// Row window requested from the store.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct Window {
    /// Rows skipped.
    pub offset: u64,
    /// Rows the caller may receive.
    pub limit: u64,
}

/// How a plan relates to the user's own LIMIT.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PlanMode {
    /// The statement runs exactly as written.
    Verbatim {
        /// The user's LIMIT value.
        user_limit: u64,
    },
    /// The statement is wrapped in an outer window.
    Windowed {
        /// User LIMIT kept inside the wrapper, when one exists.
        user_limit: Option<u64>,
    },
}

/// Immutable description of one store round trip.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExecutionPlan {
    pub(crate) statement: String,
    pub(crate) sql: String,
    pub(crate) count_sql: Option<String>,
    pub(crate) window: Window,
    pub(crate) mode: PlanMode,
    pub(crate) request: PageRequest,
}

impl ExecutionPlan {
    /// The validated statement, before any wrapping.
    pub fn statement(&self) -> &str {
        &self.statement
    }

    /// SQL sent to the store.
    pub fn sql(&self) -> &str {
        &self.sql
    }

    /// Total-count query, when the count policy asked for one.
    pub fn count_sql(&self) -> Option<&str> {
        self.count_sql.as_deref()
    }

    /// Window parameters used to build [`Self::sql`].
    pub fn window(&self) -> Window {
        self.window
    }

    /// Verbatim or windowed.
    pub fn mode(&self) -> PlanMode {
        self.mode
    }

    /// Page request the plan was built for.
    pub fn request(&self) -> PageRequest {
        self.request
    }

    /// True when the user's LIMIT is executed without any rewriting.
    pub fn user_limit_honored(&self) -> bool {
        matches!(self.mode, PlanMode::Verbatim { .. })
    }

    /// Maximum rows the executor may hand back.
    pub fn row_cap(&self) -> usize {
        // The ceiling is far below usize::MAX on every supported target.
        self.window.limit.min(HARD_ROW_CEILING) as usize
    }

    /// Whether the executor should read one extra row to detect more pages.
    pub fn wants_lookahead(&self) -> bool {
        matches!(self.mode, PlanMode::Windowed { .. })
    }

    /// Total row count implied by the page itself, when there is one.
    ///
    /// A page with no further rows behind it ends the result, so the total is
    /// `offset + returned`. An empty page past the first says nothing about
    /// how many rows came before it.
    pub fn total_from_page(&self, returned: usize, has_more: bool) -> Option<u64> {
        if has_more {
            return None;
        }
        if returned == 0 && self.window.offset > 0 {
            return None;
        }
        Some(self.window.offset + returned as u64)
    }
}

/// Builds the execution plan for `query`.
pub fn plan(
    query: &ValidatedQuery,
    request: PageRequest,
    count_policy: CountPolicy,
) -> Result<ExecutionPlan, Rejection> {
    let statement = query.statement();
    let page_size = u64::from(request.page_size.get());

    let user_limit = match top_level_limit(statement) {
        TopLevelLimit::Literal(limit) if limit > HARD_ROW_CEILING => {
            return Err(Rejection::LimitTooLarge {
                limit,
                max: HARD_ROW_CEILING,
            });
        }
        TopLevelLimit::Literal(limit) if limit <= page_size => {
            return Ok(ExecutionPlan {
                statement: statement.to_string(),
                sql: statement.to_string(),
                count_sql: None,
                window: Window {
                    offset: 0,
                    limit,
                },
                mode: PlanMode::Verbatim { user_limit: limit },
                request: PageRequest {
                    page: 1,
                    page_size: request.page_size,
                },
            });
        }
        TopLevelLimit::Literal(limit) => Some(limit),
        TopLevelLimit::Absent | TopLevelLimit::Opaque => None,
    };

    let window = Window {
        offset: request.offset(),
        limit: page_size,
    };
    let sql = format!(
        "SELECT * FROM ({statement}) LIMIT {} OFFSET {}",
        window.limit + 1,
        window.offset
    );
    let count_sql = match count_policy {
        CountPolicy::Exact => Some(format!("SELECT COUNT(*) FROM ({statement})")),
        CountPolicy::Never => None,
    };

    Ok(ExecutionPlan {
        statement: statement.to_string(),
        sql,
        count_sql,
        window,
        mode: PlanMode::Windowed { user_limit },
        request,
    })
}
