//! Advisory query insights: a rough complexity score and performance hints.
//!
//! Insights never influence execution. They read the same token stream the
//! validator uses, so words inside literals and comments are never counted.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::query::lexer::{self, Token, TokenKind};

const AGGREGATES: &[&str] = &["COUNT", "SUM", "AVG", "MIN", "MAX", "GROUP_CONCAT"];
const WINDOW_FUNCTIONS: &[&str] = &["ROW_NUMBER", "RANK", "DENSE_RANK", "NTILE", "LAG", "LEAD"];
const DATE_FUNCTIONS: &[&str] = &["STRFTIME", "DATE", "DATETIME", "JULIANDAY", "TIME"];

/// Execution speed bucket.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PerformanceLevel {
    /// One second or less.
    Good,
    /// Up to five seconds.
    Fair,
    /// Over five seconds.
    Poor,
}

impl PerformanceLevel {
    /// Buckets an execution time.
    pub fn classify(elapsed: Duration) -> Self {
        let ms = elapsed.as_millis();
        if ms > 5_000 {
            PerformanceLevel::Poor
        } else if ms > 1_000 {
            PerformanceLevel::Fair
        } else {
            PerformanceLevel::Good
        }
    }
}

/// Insights attached to a successful query.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryInsights {
    /// Complexity score from 1 to 10.
    pub complexity: u8,
    /// Speed bucket.
    pub performance_level: PerformanceLevel,
    /// Human-readable optimization hints.
    pub suggestions: Vec<String>,
}

/// Computes insights for a query that ran for `elapsed`.
pub fn analyze(sql: &str, elapsed: Duration) -> QueryInsights {
    let scanned = lexer::scan(sql);
    let tokens = &scanned.tokens;
    let level = PerformanceLevel::classify(elapsed);

    let mut suggestions = Vec::new();
    match level {
        PerformanceLevel::Poor => suggestions
            .push("Query took over 5 seconds to execute. Consider optimizing.".to_string()),
        PerformanceLevel::Fair => suggestions.push(
            "Query took over 1 second. Could be optimized for better performance.".to_string(),
        ),
        PerformanceLevel::Good => {}
    }
    if has_select_star(tokens) {
        suggestions
            .push("Consider selecting specific columns instead of using SELECT *".to_string());
    }
    if has_leading_wildcard_like(tokens) {
        suggestions.push("LIKE patterns starting with % can be slow on large tables".to_string());
    }
    if count_words(tokens, "JOIN") > 3 {
        suggestions.push(
            "Multiple JOINs detected. Ensure proper indexing for optimal performance".to_string(),
        );
    }
    if has_pair(tokens, "ORDER", "BY") && !tokens.iter().any(|t| t.is_word("LIMIT")) {
        suggestions
            .push("ORDER BY without LIMIT may be inefficient on large result sets".to_string());
    }

    QueryInsights {
        complexity: complexity_score(tokens),
        performance_level: level,
        suggestions,
    }
}

/// Scores query complexity from 1 to 10.
pub fn complexity(sql: &str) -> u8 {
    complexity_score(&lexer::scan(sql).tokens)
}

fn complexity_score(tokens: &[Token<'_>]) -> u8 {
    let mut score = 1usize;
    let selects = count_words(tokens, "SELECT");
    if selects > 0 {
        score += 1;
    }
    score += count_words(tokens, "JOIN") * 2;
    score += selects.saturating_sub(1) * 2;
    score += AGGREGATES
        .iter()
        .filter(|name| has_call(tokens, name))
        .count();
    for (first, second) in [("GROUP", "BY"), ("ORDER", "BY")] {
        if has_pair(tokens, first, second) {
            score += 1;
        }
    }
    if tokens.iter().any(|t| t.is_word("HAVING")) {
        score += 1;
    }
    if tokens.iter().any(|t| t.is_word("OVER")) {
        score += 2;
    }
    if has_pair(tokens, "PARTITION", "BY") {
        score += 2;
    }
    score += WINDOW_FUNCTIONS
        .iter()
        .filter(|name| has_call(tokens, name))
        .count()
        * 2;
    if tokens.iter().any(|t| t.is_word("WITH")) {
        score += 2;
    }
    if has_pair(tokens, "CASE", "WHEN") {
        score += 1;
    }
    score += DATE_FUNCTIONS
        .iter()
        .filter(|name| has_call(tokens, name))
        .count();
    score.min(10) as u8
}

fn count_words(tokens: &[Token<'_>], word: &str) -> usize {
    tokens.iter().filter(|t| t.is_word(word)).count()
}

fn has_pair(tokens: &[Token<'_>], first: &str, second: &str) -> bool {
    tokens
        .windows(2)
        .any(|pair| pair[0].is_word(first) && pair[1].is_word(second))
}

fn has_call(tokens: &[Token<'_>], name: &str) -> bool {
    tokens
        .windows(2)
        .any(|pair| pair[0].is_word(name) && pair[1].kind == TokenKind::LParen)
}

fn has_select_star(tokens: &[Token<'_>]) -> bool {
    tokens
        .windows(2)
        .any(|pair| pair[0].is_word("SELECT") && pair[1].text == "*")
}

fn has_leading_wildcard_like(tokens: &[Token<'_>]) -> bool {
    tokens.windows(2).any(|pair| {
        pair[0].is_word("LIKE") && pair[1].kind == TokenKind::Str && pair[1].text.starts_with("'%")
    })
}
