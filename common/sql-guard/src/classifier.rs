//! SQL statement classifier
//!
//! Labels a statement READ or WRITE from its tokens alone - no planning, no
//! catalog access. The classifier is deliberately one-sided: anything it
//! cannot show to be a plain read is labelled WRITE, so a read-only policy
//! may block an unusual read but never lets a write through.

use std::fmt;

use serde::Serialize;

use crate::lexer::{tokenize, Token, TokenKind};

/// Leading keywords that always modify data, schema, or server state
const WRITE_KEYWORDS: &[&str] = &[
    "INSERT", "UPDATE", "DELETE", "DROP", "ALTER", "CREATE", "TRUNCATE", "GRANT", "REVOKE",
    "MERGE", "COPY", "COMMENT", "REINDEX", "VACUUM", "CLUSTER", "REFRESH", "LOCK", "SECURITY",
    "IMPORT", "CALL", "DO",
];

/// Keywords that may end a WITH clause and start its terminal statement
const TERMINAL_KEYWORDS: &[&str] = &[
    "SELECT", "VALUES", "TABLE", "INSERT", "UPDATE", "DELETE", "MERGE",
];

/// READ or WRITE
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Classification {
    Read,
    Write,
}

/// Why a statement was classified WRITE
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteReason {
    /// Leading keyword is on the write list
    Keyword(String),
    /// More than one statement in the payload
    MultipleStatements(usize),
    /// A WITH clause wraps INSERT/UPDATE/DELETE/...
    DataModifyingCte(String),
    /// `SELECT ... INTO` creates a table
    SelectInto,
    /// `EXPLAIN ANALYZE` runs the explained write
    ExplainAnalyze,
    /// `FOR UPDATE` / `FOR SHARE` with strict locking enabled
    LockingRead,
    /// Leading keyword the classifier cannot vouch for
    Unrecognized(String),
    /// Text the tokenizer rejects, such as an unterminated string
    Untokenizable(String),
}

impl fmt::Display for WriteReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WriteReason::Keyword(keyword) => write!(f, "{} statements modify the database", keyword),
            WriteReason::MultipleStatements(count) => {
                write!(f, "payload contains {} statements", count)
            }
            WriteReason::DataModifyingCte(keyword) => {
                write!(f, "WITH clause contains a data-modifying {}", keyword)
            }
            WriteReason::SelectInto => write!(f, "SELECT INTO creates a table"),
            WriteReason::ExplainAnalyze => {
                write!(f, "EXPLAIN ANALYZE would execute a write statement")
            }
            WriteReason::LockingRead => write!(f, "locking reads are treated as writes"),
            WriteReason::Unrecognized(keyword) => {
                write!(f, "{} statements cannot be verified as read-only", keyword)
            }
            WriteReason::Untokenizable(error) => {
                write!(f, "statement cannot be verified as read-only: {}", error)
            }
        }
    }
}

/// Tunables for the classifier
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ClassifierOptions {
    /// Treat `SELECT ... FOR UPDATE/SHARE` as WRITE. Off by default: locking
    /// reads classify by their leading keyword.
    pub locking_reads_are_writes: bool,
}

/// Everything the guard needs to know about a statement
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatementAnalysis {
    pub classification: Classification,
    pub write_reason: Option<WriteReason>,
    /// Uppercased leading keyword of the first statement
    pub keyword: Option<String>,
    /// Non-empty statements in the payload
    pub statement_count: usize,
    /// A top-level `LIMIT` or `FETCH` clause is present
    pub has_row_limit: bool,
    /// A `LIMIT` clause may be appended (SELECT-like reads only)
    pub accepts_row_limit: bool,
    /// Byte offset just past the last significant token, before any
    /// trailing semicolons or comments
    pub body_end: usize,
}

impl StatementAnalysis {
    pub fn is_write(&self) -> bool {
        self.classification == Classification::Write
    }

    /// No statement at all (blank or comment-only text)
    pub fn is_empty(&self) -> bool {
        self.statement_count == 0
    }
}

/// Classify with default options
pub fn classify(sql: &str) -> Classification {
    analyze(sql, &ClassifierOptions::default()).classification
}

/// Full lexical analysis of a SQL payload
pub fn analyze(sql: &str, options: &ClassifierOptions) -> StatementAnalysis {
    let tokens = match tokenize(sql) {
        Ok(tokens) => tokens,
        Err(err) => {
            return StatementAnalysis {
                classification: Classification::Write,
                write_reason: Some(WriteReason::Untokenizable(err.to_string())),
                keyword: None,
                statement_count: 1,
                has_row_limit: false,
                accepts_row_limit: false,
                body_end: sql.len(),
            }
        }
    };
    let statements: Vec<&[Token]> = tokens
        .split(|t| t.kind == TokenKind::Semicolon)
        .filter(|s| !s.is_empty())
        .collect();

    let keyword = statements
        .first()
        .and_then(|s| s.iter().find(|t| t.kind != TokenKind::OpenParen))
        .and_then(Token::keyword);
    let body_end = statements
        .last()
        .and_then(|s| s.last())
        .map_or(0, |t| t.end);

    match statements.as_slice() {
        [] => StatementAnalysis {
            classification: Classification::Read,
            write_reason: None,
            keyword: None,
            statement_count: 0,
            has_row_limit: false,
            accepts_row_limit: false,
            body_end: 0,
        },
        [statement] => {
            let verdict = classify_statement(statement, options);
            StatementAnalysis {
                classification: verdict.classification(),
                accepts_row_limit: verdict.accepts_row_limit,
                write_reason: verdict.write_reason,
                keyword,
                statement_count: 1,
                has_row_limit: has_top_level_limit(statement),
                body_end,
            }
        }
        many => StatementAnalysis {
            classification: Classification::Write,
            write_reason: Some(WriteReason::MultipleStatements(many.len())),
            keyword,
            statement_count: many.len(),
            has_row_limit: false,
            accepts_row_limit: false,
            body_end,
        },
    }
}

struct Verdict {
    write_reason: Option<WriteReason>,
    accepts_row_limit: bool,
}

impl Verdict {
    fn read(accepts_row_limit: bool) -> Self {
        Self {
            write_reason: None,
            accepts_row_limit,
        }
    }

    fn write(reason: WriteReason) -> Self {
        Self {
            write_reason: Some(reason),
            accepts_row_limit: false,
        }
    }

    fn classification(&self) -> Classification {
        if self.write_reason.is_some() {
            Classification::Write
        } else {
            Classification::Read
        }
    }
}

fn is_write_keyword(keyword: &str) -> bool {
    WRITE_KEYWORDS.contains(&keyword)
}

fn classify_statement(tokens: &[Token], options: &ClassifierOptions) -> Verdict {
    let Some(start) = tokens.iter().position(|t| t.kind != TokenKind::OpenParen) else {
        return Verdict::write(WriteReason::Unrecognized("(".to_string()));
    };
    let first = &tokens[start];
    let Some(keyword) = first.keyword() else {
        return Verdict::write(WriteReason::Unrecognized(first.text.to_string()));
    };
    let rest = &tokens[start + 1..];

    match keyword.as_str() {
        k if is_write_keyword(k) => Verdict::write(WriteReason::Keyword(k.to_string())),
        "SELECT" => classify_select(rest, options),
        "WITH" => classify_with(rest, options),
        "EXPLAIN" => classify_explain(rest, options),
        "VALUES" | "TABLE" => Verdict::read(true),
        "SHOW" => Verdict::read(false),
        other => Verdict::write(WriteReason::Unrecognized(other.to_string())),
    }
}

fn classify_select(tokens: &[Token], options: &ClassifierOptions) -> Verdict {
    if tokens.iter().any(|t| t.is_keyword("INTO")) {
        return Verdict::write(WriteReason::SelectInto);
    }
    if options.locking_reads_are_writes && is_locking_read(tokens) {
        return Verdict::write(WriteReason::LockingRead);
    }
    Verdict::read(true)
}

fn is_locking_read(tokens: &[Token]) -> bool {
    tokens.windows(2).any(|pair| {
        pair[0].is_keyword("FOR")
            && ["UPDATE", "SHARE", "NO", "KEY"]
                .iter()
                .any(|k| pair[1].is_keyword(k))
    })
}

fn classify_with(tokens: &[Token], options: &ClassifierOptions) -> Verdict {
    // `( INSERT ...` anywhere means a data-modifying CTE
    for pair in tokens.windows(2) {
        if pair[0].kind == TokenKind::OpenParen {
            if let Some(keyword) = pair[1].keyword().filter(|k| is_write_keyword(k)) {
                return Verdict::write(WriteReason::DataModifyingCte(keyword));
            }
        }
    }

    let mut depth = 0i32;
    let mut terminal = None;
    for (idx, token) in tokens.iter().enumerate() {
        match token.kind {
            TokenKind::OpenParen => depth += 1,
            TokenKind::CloseParen => depth -= 1,
            TokenKind::Word if depth == 0 => {
                if let Some(keyword) = token.keyword().filter(|k| TERMINAL_KEYWORDS.contains(&k.as_str())) {
                    terminal = Some((idx, keyword));
                    break;
                }
            }
            _ => {}
        }
    }

    match terminal {
        None => Verdict::write(WriteReason::Unrecognized("WITH".to_string())),
        Some((idx, keyword)) => match keyword.as_str() {
            "SELECT" => classify_select(&tokens[idx + 1..], options),
            "VALUES" | "TABLE" => Verdict::read(true),
            other => Verdict::write(WriteReason::Keyword(other.to_string())),
        },
    }
}

fn classify_explain(tokens: &[Token], options: &ClassifierOptions) -> Verdict {
    let mut analyze = false;
    let mut idx = 0;

    if tokens.first().map(|t| t.kind) == Some(TokenKind::OpenParen) {
        let close = matching_paren(tokens, 0).unwrap_or(tokens.len());
        analyze = option_list_requests_analyze(&tokens[1..close]);
        idx = close + 1;
    } else {
        while let Some(token) = tokens.get(idx) {
            if token.is_keyword("ANALYZE") || token.is_keyword("ANALYSE") {
                analyze = true;
            } else if !token.is_keyword("VERBOSE") {
                break;
            }
            idx += 1;
        }
    }

    let explained = tokens.get(idx..).unwrap_or(&[]);
    if analyze && !explained.is_empty() && classify_statement(explained, options).write_reason.is_some() {
        return Verdict::write(WriteReason::ExplainAnalyze);
    }
    Verdict::read(false)
}

/// `ANALYZE`, `ANALYZE TRUE`, `ANALYZE on` enable it; `ANALYZE false/off/0` do not
fn option_list_requests_analyze(options: &[Token]) -> bool {
    options.iter().enumerate().any(|(idx, token)| {
        if !(token.is_keyword("ANALYZE") || token.is_keyword("ANALYSE")) {
            return false;
        }
        let disabled = options.get(idx + 1).is_some_and(|value| {
            let value = value.text.trim_matches('\'');
            ["false", "off", "0"]
                .iter()
                .any(|v| value.eq_ignore_ascii_case(v))
        });
        !disabled
    })
}

fn matching_paren(tokens: &[Token], open: usize) -> Option<usize> {
    let mut depth = 0usize;
    for (idx, token) in tokens.iter().enumerate().skip(open) {
        match token.kind {
            TokenKind::OpenParen => depth += 1,
            TokenKind::CloseParen => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return Some(idx);
                }
            }
            _ => {}
        }
    }
    None
}

/// `LIMIT` or `FETCH` clause outside any parentheses
fn has_top_level_limit(tokens: &[Token]) -> bool {
    let mut depth = 0i32;
    tokens.iter().enumerate().any(|(idx, token)| {
        match token.kind {
            TokenKind::OpenParen => depth += 1,
            TokenKind::CloseParen => depth -= 1,
            _ => {}
        }
        depth == 0 && (is_limit_clause(tokens, idx) || is_fetch_clause(tokens, idx))
    })
}

/// `LIMIT` followed by a count. `AS limit` names a column.
fn is_limit_clause(tokens: &[Token], idx: usize) -> bool {
    if !tokens[idx].is_keyword("LIMIT") {
        return false;
    }
    if idx > 0 && tokens[idx - 1].is_keyword("AS") {
        return false;
    }
    tokens.get(idx + 1).is_some_and(|next| {
        matches!(
            next.kind,
            TokenKind::Number | TokenKind::Param | TokenKind::OpenParen
        ) || next.is_keyword("ALL")
            || next.is_keyword("NULL")
    })
}

/// `FETCH FIRST` / `FETCH NEXT`; a bare `fetch` is an identifier
fn is_fetch_clause(tokens: &[Token], idx: usize) -> bool {
    tokens[idx].is_keyword("FETCH")
        && tokens
            .get(idx + 1)
            .is_some_and(|next| next.is_keyword("FIRST") || next.is_keyword("NEXT"))
}
