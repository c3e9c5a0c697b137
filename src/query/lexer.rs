//! Grammar-lite SQL scanner.
//!
//! The scanner does not parse SQL. It splits text into tokens while tracking
//! the three pieces of state every other stage of the query core depends on:
//! whether the cursor sits inside a quoted region, inside a comment, and how
//! deeply parenthesised the current token is. Validation, LIMIT detection and
//! query insights all consume the same token stream so they can never disagree
//! about what is a keyword and what is data.

use std::ops::Range;

/// Classification of a scanned token.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TokenKind {
    /// Bare identifier or keyword (`SELECT`, `patients`, `updated_at`).
    Word,
    /// Numeric literal (`42`, `3.5`, `1e10`, `0x1F`).
    Number,
    /// Single-quoted string literal, quotes included.
    Str,
    /// `"..."`, `` `...` `` or `[...]` quoted identifier, quotes included.
    QuotedIdent,
    /// `(`
    LParen,
    /// `)`
    RParen,
    /// `,`
    Comma,
    /// `;`
    Semicolon,
    /// Any other operator or punctuation character run.
    Symbol,
}

/// A token borrowed from the scanned text.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Token<'a> {
    /// Token classification.
    pub kind: TokenKind,
    /// Exact source slice.
    pub text: &'a str,
    /// Byte offset of the first character.
    pub offset: usize,
    /// Parenthesis depth the token belongs to. Both parentheses of a pair
    /// report the depth of the surrounding text.
    pub depth: usize,
}

impl Token<'_> {
    /// Returns true when this is a bare word equal to `keyword`, ignoring case.
    pub fn is_word(&self, keyword: &str) -> bool {
        self.kind == TokenKind::Word && self.text.eq_ignore_ascii_case(keyword)
    }
}

/// Output of [`scan`].
#[derive(Clone, Debug, Default)]
pub struct Scan<'a> {
    /// Tokens in source order. Comments and whitespace are not tokens.
    pub tokens: Vec<Token<'a>>,
    /// Byte ranges of every comment, delimiters included.
    pub comments: Vec<Range<usize>>,
    /// A string literal or quoted identifier ran off the end of the text.
    pub unterminated_quote: bool,
    /// A block comment ran off the end of the text.
    pub unterminated_comment: bool,
    /// A `)` appeared without a matching `(`, or a `(` was never closed.
    pub unbalanced_parens: bool,
}

impl Scan<'_> {
    /// True when quote or parenthesis structure could not be tracked reliably.
    pub fn is_ambiguous(&self) -> bool {
        self.unterminated_quote || self.unbalanced_parens
    }
}

/// Scans `sql` into tokens.
pub fn scan(sql: &str) -> Scan<'_> {
    let bytes = sql.as_bytes();
    let mut out = Scan::default();
    let mut depth = 0usize;
    let mut pos = 0usize;

    while pos < bytes.len() {
        let b = bytes[pos];
        let start = pos;

        if b.is_ascii_whitespace() {
            pos += 1;
            continue;
        }

        if b == b'-' && bytes.get(pos + 1) == Some(&b'-') {
            pos = find_byte(bytes, pos + 2, b'\n').unwrap_or(bytes.len());
            out.comments.push(start..pos);
            continue;
        }

        if b == b'/' && bytes.get(pos + 1) == Some(&b'*') {
            match find_seq(bytes, pos + 2, b"*/") {
                Some(end) => pos = end + 2,
                None => {
                    pos = bytes.len();
                    out.unterminated_comment = true;
                }
            }
            out.comments.push(start..pos);
            continue;
        }

        let kind = match b {
            b'\'' => {
                pos = skip_quoted(bytes, pos, b'\'', &mut out.unterminated_quote);
                TokenKind::Str
            }
            b'"' | b'`' => {
                pos = skip_quoted(bytes, pos, b, &mut out.unterminated_quote);
                TokenKind::QuotedIdent
            }
            b'[' => {
                // No escape inside brackets: the first `]` closes.
                match find_byte(bytes, pos + 1, b']') {
                    Some(end) => pos = end + 1,
                    None => {
                        pos = bytes.len();
                        out.unterminated_quote = true;
                    }
                }
                TokenKind::QuotedIdent
            }
            b'(' => {
                pos += 1;
                out.tokens.push(Token {
                    kind: TokenKind::LParen,
                    text: &sql[start..pos],
                    offset: start,
                    depth,
                });
                depth += 1;
                continue;
            }
            b')' => {
                pos += 1;
                if depth == 0 {
                    out.unbalanced_parens = true;
                } else {
                    depth -= 1;
                }
                TokenKind::RParen
            }
            b',' => {
                pos += 1;
                TokenKind::Comma
            }
            b';' => {
                pos += 1;
                TokenKind::Semicolon
            }
            b'0'..=b'9' => {
                pos = skip_number(bytes, pos);
                TokenKind::Number
            }
            b'.' if bytes.get(pos + 1).is_some_and(u8::is_ascii_digit) => {
                pos = skip_number(bytes, pos);
                TokenKind::Number
            }
            _ if is_word_start(b) => {
                pos += 1;
                while pos < bytes.len() && is_word_continue(bytes[pos]) {
                    pos += 1;
                }
                TokenKind::Word
            }
            _ => {
                pos += 1;
                while pos < bytes.len() && is_symbol_continue(bytes[pos]) {
                    pos += 1;
                }
                TokenKind::Symbol
            }
        };

        out.tokens.push(Token {
            kind,
            text: &sql[start..pos],
            offset: start,
            depth,
        });
    }

    if depth != 0 {
        out.unbalanced_parens = true;
    }
    out
}

/// Returns `sql` with every comment replaced by a single space.
///
/// Quoted text is preserved byte for byte, so `'--'` inside a literal survives.
pub fn strip_comments(sql: &str) -> String {
    let scanned = scan(sql);
    let mut out = String::with_capacity(sql.len());
    let mut cursor = 0;
    for range in &scanned.comments {
        out.push_str(&sql[cursor..range.start]);
        out.push(' ');
        cursor = range.end;
    }
    out.push_str(&sql[cursor..]);
    out
}

fn skip_quoted(bytes: &[u8], open: usize, quote: u8, unterminated: &mut bool) -> usize {
    let mut pos = open + 1;
    while pos < bytes.len() {
        if bytes[pos] == quote {
            // A doubled quote is an escaped quote character.
            if bytes.get(pos + 1) == Some(&quote) {
                pos += 2;
                continue;
            }
            return pos + 1;
        }
        pos += 1;
    }
    *unterminated = true;
    bytes.len()
}

fn skip_number(bytes: &[u8], mut pos: usize) -> usize {
    while pos < bytes.len() {
        let b = bytes[pos];
        if b.is_ascii_alphanumeric() || b == b'.' || b == b'_' {
            pos += 1;
        } else if (b == b'+' || b == b'-') && matches!(bytes[pos - 1], b'e' | b'E') {
            pos += 1;
        } else {
            break;
        }
    }
    pos
}

fn find_byte(bytes: &[u8], from: usize, needle: u8) -> Option<usize> {
    bytes
        .get(from..)?
        .iter()
        .position(|&b| b == needle)
        .map(|idx| from + idx)
}

fn find_seq(bytes: &[u8], from: usize, needle: &[u8]) -> Option<usize> {
    bytes
        .get(from..)?
        .windows(needle.len())
        .position(|window| window == needle)
        .map(|idx| from + idx)
}

fn is_word_start(b: u8) -> bool {
    b.is_ascii_alphabetic() || b == b'_' || b >= 0x80
}

fn is_word_continue(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_' || b == b'$' || b >= 0x80
}

fn is_symbol_continue(b: u8) -> bool {
    matches!(
        b,
        b'<' | b'>' | b'=' | b'!' | b'|' | b'&' | b'+' | b'*' | b'%' | b'~'
    )
}
