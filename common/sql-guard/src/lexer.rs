//! Significant tokens for statement classification
//!
//! Wraps the sqlparser PostgreSQL tokenizer. Whitespace and comments are
//! dropped, string literals of every quoting style collapse into one kind,
//! and each token carries its byte span in the source so the guard can cut
//! trailing semicolons and comments before appending a `LIMIT`.

use sqlparser::dialect::PostgreSqlDialect;
use sqlparser::tokenizer::{Location, Token as SqlToken, Tokenizer, TokenizerError};

/// Kind of a significant token
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    /// Keyword or unquoted identifier
    Word,
    /// `"quoted identifier"`
    QuotedIdent,
    /// String literal of any quoting style
    Literal,
    Number,
    /// Positional parameter (`$1`)
    Param,
    OpenParen,
    CloseParen,
    Semicolon,
    /// Any other operator or punctuation
    Symbol,
}

/// A significant token with its byte span in the source text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    /// Word or literal value; punctuation as written
    pub text: String,
    pub start: usize,
    pub end: usize,
}

impl Token {
    /// Case-insensitive keyword match. Quoted identifiers never match.
    pub fn is_keyword(&self, keyword: &str) -> bool {
        self.kind == TokenKind::Word && self.text.eq_ignore_ascii_case(keyword)
    }

    /// Uppercased text of a bare word
    pub fn keyword(&self) -> Option<String> {
        (self.kind == TokenKind::Word).then(|| self.text.to_ascii_uppercase())
    }
}

/// Split SQL text into significant tokens.
///
/// Unterminated strings, quoted identifiers and comments are errors.
pub fn tokenize(sql: &str) -> Result<Vec<Token>, TokenizerError> {
    let dialect = PostgreSqlDialect {};
    let spanned = Tokenizer::new(&dialect, sql).tokenize_with_location()?;
    let offsets = Offsets::new(sql);

    Ok(spanned
        .into_iter()
        .filter_map(|spanned| {
            let (kind, text) = significant(spanned.token)?;
            Some(Token {
                kind,
                text,
                start: offsets.byte(spanned.span.start),
                end: offsets.byte(spanned.span.end),
            })
        })
        .collect())
}

fn significant(token: SqlToken) -> Option<(TokenKind, String)> {
    let mapped = match token {
        SqlToken::EOF | SqlToken::Whitespace(_) => return None,
        SqlToken::Word(word) if word.quote_style.is_some() => (TokenKind::QuotedIdent, word.value),
        SqlToken::Word(word) => (TokenKind::Word, word.value),
        SqlToken::Number(number, _) => (TokenKind::Number, number),
        SqlToken::Placeholder(param) => (TokenKind::Param, param),
        SqlToken::SingleQuotedString(s)
        | SqlToken::EscapedStringLiteral(s)
        | SqlToken::NationalStringLiteral(s)
        | SqlToken::HexStringLiteral(s) => (TokenKind::Literal, s),
        SqlToken::DollarQuotedString(s) => (TokenKind::Literal, s.value),
        SqlToken::LParen => (TokenKind::OpenParen, "(".to_string()),
        SqlToken::RParen => (TokenKind::CloseParen, ")".to_string()),
        SqlToken::SemiColon => (TokenKind::Semicolon, ";".to_string()),
        other => (TokenKind::Symbol, other.to_string()),
    };
    Some(mapped)
}

/// Tokenizer locations are 1-based line and character columns
struct Offsets<'a> {
    sql: &'a str,
    line_starts: Vec<usize>,
}

impl<'a> Offsets<'a> {
    fn new(sql: &'a str) -> Self {
        let line_starts = std::iter::once(0)
            .chain(sql.match_indices('\n').map(|(idx, _)| idx + 1))
            .collect();
        Self { sql, line_starts }
    }

    fn byte(&self, location: Location) -> usize {
        let line = (location.line as usize).saturating_sub(1);
        let Some(&line_start) = self.line_starts.get(line) else {
            return self.sql.len();
        };
        let column = (location.column as usize).saturating_sub(1);
        self.sql[line_start..]
            .char_indices()
            .nth(column)
            .map_or(self.sql.len(), |(idx, _)| line_start + idx)
    }
}
