//! Decomposition of compiled query text.
//!
//! Join-based statements embed a compiled SELECT as a derived table and
//! inline single-column projections as SET expressions. Both need a little
//! structure recovered from the text:
//!
//! - the leading run of `SET name = value;` session settings ([`split_prelude`]),
//! - the source alias of the FROM clause ([`DerivedQuery::parse`]),
//! - the projected expression of a single-column SELECT ([`decompose_projection`]),
//!   rewritten onto another alias ([`Projection::realias`]).
//!
//! Scanning is token based: string literals, quoted identifiers, comments and
//! parenthesized subqueries are never mistaken for clause keywords.

use crate::error::{BulkError, BulkResult};
use regex::Regex;
use std::sync::OnceLock;

fn set_statement_regex() -> &'static Regex {
    static SET_RE: OnceLock<Regex> = OnceLock::new();
    SET_RE.get_or_init(|| {
        Regex::new(r"(?i)^\s*SET\s+([@\w.]+)\s*(?:=|TO)\s*('(?:[^']|'')*'|[^;'\s]+)\s*;")
            .expect("invalid built-in session setting regex")
    })
}

/// Keywords that end a FROM item (and so are never an implicit alias).
const SOURCE_TAIL_KEYWORDS: &[&str] = &[
    "where", "group", "having", "window", "order", "limit", "offset", "fetch", "for", "union",
    "intersect", "except", "join", "inner", "left", "right", "full", "cross", "natural", "on",
    "using", "tablesample",
];

/// Keywords that mean the FROM clause names more than one source.
const JOIN_KEYWORDS: &[&str] = &["join", "inner", "left", "right", "full", "cross", "natural"];

// ─── Lexer ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TokenKind {
    Word,
    QuotedIdent,
    Str,
    Number,
    Param,
    OpenParen,
    CloseParen,
    Comma,
    Dot,
    Semicolon,
    Symbol,
}

#[derive(Debug, Clone, Copy)]
struct Token {
    kind: TokenKind,
    start: usize,
    end: usize,
    /// Parenthesis depth outside this token (matching parens share a depth).
    depth: usize,
}

impl Token {
    fn text<'a>(&self, sql: &'a str) -> &'a str {
        &sql[self.start..self.end]
    }

    fn is_keyword(&self, sql: &str, keyword: &str) -> bool {
        self.kind == TokenKind::Word && self.text(sql).eq_ignore_ascii_case(keyword)
    }

    fn is_name(&self) -> bool {
        matches!(self.kind, TokenKind::Word | TokenKind::QuotedIdent)
    }

    /// Identifier as Postgres resolves it: bare words fold to lower case,
    /// quoted identifiers lose their quotes.
    fn normalized(&self, sql: &str) -> String {
        let text = self.text(sql);
        match self.kind {
            TokenKind::QuotedIdent => text[1..text.len() - 1].replace("\"\"", "\""),
            _ => text.to_ascii_lowercase(),
        }
    }
}

fn is_word_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_' || b == b'$' || b >= 0x80
}

fn tokenize(sql: &str) -> BulkResult<Vec<Token>> {
    let bytes = sql.as_bytes();
    let mut tokens = Vec::new();
    let mut depth = 0usize;
    let mut i = 0;

    while i < bytes.len() {
        let b = bytes[i];
        let start = i;

        if b.is_ascii_whitespace() {
            i += 1;
            continue;
        }
        if b == b'-' && bytes.get(i + 1) == Some(&b'-') {
            while i < bytes.len() && bytes[i] != b'\n' {
                i += 1;
            }
            continue;
        }
        if b == b'/' && bytes.get(i + 1) == Some(&b'*') {
            i = skip_block_comment(bytes, i)?;
            continue;
        }

        let kind = match b {
            b'\'' => {
                i = skip_quoted(bytes, i, b'\'', false)?;
                TokenKind::Str
            }
            b'e' | b'E' if bytes.get(i + 1) == Some(&b'\'') => {
                i = skip_quoted(bytes, i + 1, b'\'', true)?;
                TokenKind::Str
            }
            b'"' => {
                i = skip_quoted(bytes, i, b'"', false)?;
                TokenKind::QuotedIdent
            }
            b'$' if bytes.get(i + 1).is_some_and(u8::is_ascii_digit) => {
                i += 1;
                while i < bytes.len() && bytes[i].is_ascii_digit() {
                    i += 1;
                }
                TokenKind::Param
            }
            b'$' => {
                i = skip_dollar_quoted(sql, i)?;
                TokenKind::Str
            }
            b'(' => {
                i += 1;
                depth += 1;
                tokens.push(Token {
                    kind: TokenKind::OpenParen,
                    start,
                    end: i,
                    depth: depth - 1,
                });
                continue;
            }
            b')' => {
                i += 1;
                depth = depth
                    .checked_sub(1)
                    .ok_or_else(|| BulkError::unsupported("unbalanced ')' in query text"))?;
                TokenKind::CloseParen
            }
            b',' => {
                i += 1;
                TokenKind::Comma
            }
            b';' => {
                i += 1;
                TokenKind::Semicolon
            }
            b'.' if !bytes.get(i + 1).is_some_and(u8::is_ascii_digit) => {
                i += 1;
                TokenKind::Dot
            }
            b'0'..=b'9' | b'.' => {
                i += 1;
                while i < bytes.len() && (bytes[i].is_ascii_alphanumeric() || bytes[i] == b'.') {
                    i += 1;
                }
                TokenKind::Number
            }
            _ if is_word_byte(b) => {
                while i < bytes.len() && is_word_byte(bytes[i]) {
                    i += 1;
                }
                TokenKind::Word
            }
            _ => {
                i += 1;
                TokenKind::Symbol
            }
        };
        tokens.push(Token {
            kind,
            start,
            end: i,
            depth,
        });
    }

    if depth != 0 {
        return Err(BulkError::unsupported("unbalanced '(' in query text"));
    }
    Ok(tokens)
}

/// Index just past the closing quote. A doubled quote is an escaped quote;
/// with `backslash` set, `\x` escapes any byte.
fn skip_quoted(bytes: &[u8], open: usize, quote: u8, backslash: bool) -> BulkResult<usize> {
    let mut i = open + 1;
    while i < bytes.len() {
        let b = bytes[i];
        if backslash && b == b'\\' {
            i += 2;
            continue;
        }
        if b == quote {
            if bytes.get(i + 1) == Some(&quote) {
                i += 2;
                continue;
            }
            return Ok(i + 1);
        }
        i += 1;
    }
    Err(BulkError::unsupported("unterminated quoted text in query"))
}

fn skip_block_comment(bytes: &[u8], open: usize) -> BulkResult<usize> {
    let mut nesting = 0usize;
    let mut i = open;
    while i + 1 < bytes.len() {
        match (bytes[i], bytes[i + 1]) {
            (b'/', b'*') => {
                nesting += 1;
                i += 2;
            }
            (b'*', b'/') => {
                nesting -= 1;
                i += 2;
                if nesting == 0 {
                    return Ok(i);
                }
            }
            _ => i += 1,
        }
    }
    Err(BulkError::unsupported("unterminated comment in query"))
}

fn skip_dollar_quoted(sql: &str, open: usize) -> BulkResult<usize> {
    let rest = &sql[open + 1..];
    let tag_len = rest
        .find('$')
        .filter(|&n| rest[..n].bytes().all(|b| b.is_ascii_alphanumeric() || b == b'_'))
        .ok_or_else(|| BulkError::unsupported("stray '$' in query text"))?;
    let delimiter = &sql[open..open + tag_len + 2];
    let body_start = open + delimiter.len();
    sql[body_start..]
        .find(delimiter)
        .map(|n| body_start + n + delimiter.len())
        .ok_or_else(|| BulkError::unsupported("unterminated dollar-quoted text in query"))
}

// ─── Prelude ────────────────────────────────────────────────────────────────

/// One `SET name = value;` statement preceding a compiled SELECT.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSetting {
    /// Variable name, lower-cased.
    pub name: String,
    /// Value exactly as written (quoted literal or single token).
    pub value: String,
    /// The full statement text, terminated by `;`.
    pub statement: String,
}

/// Split leading session settings off compiled query text.
///
/// Settings only count as a prelude when a SELECT follows them; otherwise the
/// whole text is returned as the body.
pub fn split_prelude(sql: &str) -> (Vec<SessionSetting>, &str) {
    let re = set_statement_regex();
    let mut settings = Vec::new();
    let mut rest = sql;
    while let Some(caps) = re.captures(rest) {
        let (Some(whole), Some(name), Some(value)) = (caps.get(0), caps.get(1), caps.get(2)) else {
            break;
        };
        settings.push(SessionSetting {
            name: name.as_str().to_ascii_lowercase(),
            value: value.as_str().to_string(),
            statement: whole.as_str().trim().to_string(),
        });
        rest = &rest[whole.end()..];
    }

    let body = rest.trim_start();
    let starts_with_select = body
        .get(..6)
        .is_some_and(|head| head.eq_ignore_ascii_case("select"))
        && !body[6..].bytes().next().is_some_and(is_word_byte);
    if settings.is_empty() || !starts_with_select {
        return (Vec::new(), sql);
    }
    (settings, body)
}

/// Append `incoming` settings to `merged`, keeping identical ones once.
///
/// The same variable set to two different values cannot share one
/// statement scope.
pub fn merge_prelude(
    merged: &mut Vec<SessionSetting>,
    incoming: impl IntoIterator<Item = SessionSetting>,
) -> BulkResult<()> {
    for setting in incoming {
        match merged.iter().find(|s| s.name == setting.name) {
            Some(existing) if existing.value == setting.value => {}
            Some(existing) => {
                return Err(BulkError::unsupported(format!(
                    "session variable '{}' is set to both {} and {}",
                    setting.name, existing.value, setting.value
                )));
            }
            None => merged.push(setting),
        }
    }
    Ok(())
}

// ─── FROM sources ───────────────────────────────────────────────────────────

struct Source {
    start: usize,
    end: usize,
    /// Alias as written.
    alias: Option<String>,
    /// Name that qualifies columns of this source.
    reference: Option<String>,
}

fn find_top_level(sql: &str, tokens: &[Token], keyword: &str) -> Option<usize> {
    tokens
        .iter()
        .position(|t| t.depth == 0 && t.is_keyword(sql, keyword))
}

fn parse_source(sql: &str, tokens: &[Token], from: usize) -> BulkResult<Source> {
    let mut i = from + 1;
    let first = tokens
        .get(i)
        .ok_or_else(|| BulkError::unsupported("FROM without a source"))?;

    let (start, end, table) = match first.kind {
        TokenKind::OpenParen => {
            let close = tokens[i + 1..]
                .iter()
                .position(|t| t.kind == TokenKind::CloseParen && t.depth == first.depth)
                .map(|n| i + 1 + n)
                .ok_or_else(|| BulkError::unsupported("unbalanced subquery in FROM"))?;
            i = close + 1;
            (first.start, tokens[close].end, None)
        }
        _ if first.is_name() => {
            let mut last = i;
            while tokens.get(last + 1).is_some_and(|t| t.kind == TokenKind::Dot)
                && tokens.get(last + 2).is_some_and(Token::is_name)
            {
                last += 2;
            }
            i = last + 1;
            (first.start, tokens[last].end, Some(tokens[last].normalized(sql)))
        }
        _ => {
            return Err(BulkError::unsupported(format!(
                "unexpected '{}' after FROM",
                first.text(sql)
            )));
        }
    };

    let mut alias_token = None;
    if let Some(t) = tokens.get(i) {
        if t.is_keyword(sql, "as") {
            let named = tokens
                .get(i + 1)
                .filter(|t| t.is_name())
                .ok_or_else(|| BulkError::unsupported("AS without an alias in FROM"))?;
            alias_token = Some(*named);
            i += 2;
        } else if t.kind == TokenKind::QuotedIdent
            || (t.kind == TokenKind::Word
                && !SOURCE_TAIL_KEYWORDS
                    .iter()
                    .any(|k| t.text(sql).eq_ignore_ascii_case(k)))
        {
            alias_token = Some(*t);
            i += 1;
        }
    }

    if let Some(t) = tokens.get(i).filter(|t| t.depth == 0) {
        let joins = t.kind == TokenKind::Comma
            || JOIN_KEYWORDS
                .iter()
                .any(|k| t.is_keyword(sql, k));
        if joins {
            return Err(BulkError::unsupported(
                "query reads from more than one source",
            ));
        }
    }

    Ok(Source {
        start,
        end,
        alias: alias_token.map(|t| t.text(sql).to_string()),
        reference: alias_token.map(|t| t.normalized(sql)).or(table),
    })
}

fn check_select(sql: &str, tokens: &[Token]) -> BulkResult<()> {
    match tokens.first() {
        Some(t) if t.is_keyword(sql, "select") => {}
        _ => {
            return Err(BulkError::unsupported(format!(
                "expected a SELECT statement, got: {}",
                sql.trim()
            )));
        }
    }
    if let Some(semi) = tokens.iter().position(|t| t.kind == TokenKind::Semicolon)
        && semi + 1 < tokens.len()
    {
        return Err(BulkError::unsupported(
            "query text contains more than one statement",
        ));
    }
    Ok(())
}

/// Body text without a trailing top-level `;`.
fn strip_terminator<'a>(sql: &'a str, tokens: &mut Vec<Token>) -> &'a str {
    match tokens.last().copied() {
        Some(semi) if semi.kind == TokenKind::Semicolon => {
            tokens.pop();
            sql[..semi.start].trim_end()
        }
        _ => sql.trim_end(),
    }
}

// ─── Derived tables ─────────────────────────────────────────────────────────

/// A compiled query ready to be embedded as a derived table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DerivedQuery {
    pub prelude: Vec<SessionSetting>,
    /// The SELECT statement without prelude or terminator.
    pub body: String,
    /// Alias of the FROM source inside the body.
    pub source_alias: Option<String>,
}

impl DerivedQuery {
    pub fn parse(sql: &str) -> BulkResult<Self> {
        let (prelude, body) = split_prelude(sql);
        let body = body.trim_start();
        let mut tokens = tokenize(body)?;
        check_select(body, &tokens)?;
        let body = strip_terminator(body, &mut tokens);
        let from = find_top_level(body, &tokens, "from")
            .ok_or_else(|| BulkError::unsupported("query has no FROM clause"))?;
        let source = parse_source(body, &tokens, from)?;
        Ok(Self {
            prelude,
            body: body.to_string(),
            source_alias: source.alias,
        })
    }
}

// ─── Single projections ─────────────────────────────────────────────────────

/// Parts of a single-column `SELECT <expr> [AS <alias>] FROM <source> ...`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Projection {
    pub prelude: Vec<SessionSetting>,
    pub expression: String,
    pub column_alias: Option<String>,
    pub source: String,
    pub source_alias: Option<String>,
    reference: Option<String>,
}

/// Recover the projected expression of a single-column SELECT.
pub fn decompose_projection(sql: &str) -> BulkResult<Projection> {
    let (prelude, body) = split_prelude(sql);
    let body = body.trim_start();
    let mut tokens = tokenize(body)?;
    check_select(body, &tokens)?;
    let body = strip_terminator(body, &mut tokens);

    let from = find_top_level(body, &tokens, "from")
        .ok_or_else(|| BulkError::unsupported("projection has no FROM clause"))?;
    let select = &tokens[1..from];
    if select.is_empty() {
        return Err(BulkError::unsupported("projection selects nothing"));
    }
    if select[0].is_keyword(body, "distinct") || select[0].is_keyword(body, "all") {
        return Err(BulkError::unsupported(
            "projection with a set quantifier cannot be inlined",
        ));
    }
    if select
        .iter()
        .any(|t| t.depth == 0 && t.kind == TokenKind::Comma)
    {
        return Err(BulkError::unsupported(
            "projection selects more than one column",
        ));
    }

    let mut expr_tokens = select;
    let mut column_alias = None;
    if let [head @ .., as_kw, alias] = select
        && as_kw.depth == 0
        && as_kw.is_keyword(body, "as")
        && alias.is_name()
        && !head.is_empty()
    {
        column_alias = Some(alias.text(body).to_string());
        expr_tokens = head;
    }
    let (Some(first), Some(last)) = (expr_tokens.first(), expr_tokens.last()) else {
        return Err(BulkError::unsupported("projection selects nothing"));
    };
    let expression = body[first.start..last.end].to_string();

    let source = parse_source(body, &tokens, from)?;
    Ok(Projection {
        prelude,
        expression,
        column_alias,
        source: body[source.start..source.end].to_string(),
        source_alias: source.alias,
        reference: source.reference,
    })
}

impl Projection {
    /// The expression with references to its source rewritten onto `target`.
    pub fn realias(&self, target: &str) -> BulkResult<String> {
        match &self.reference {
            Some(reference) => rewrite_reference(&self.expression, reference, target),
            None => Ok(self.expression.clone()),
        }
    }
}

/// Rewrite standalone occurrences of the identifier `from` to `to`.
///
/// Occurrences inside literals or quoted text, after a `.` (a qualified
/// member), after `::` (a type name) or before `(` (a function name) are
/// left alone. `from` is an identifier as written in SQL: bare names fold
/// to lower case, quoted names match exactly.
pub fn replace_alias(expr: &str, from: &str, to: &str) -> BulkResult<String> {
    let reference = match tokenize(from)?.as_slice() {
        [tok] if tok.is_name() => tok.normalized(from),
        _ => {
            return Err(BulkError::unsupported(format!(
                "'{from}' is not a single identifier"
            )));
        }
    };
    rewrite_reference(expr, &reference, to)
}

/// `reference` is already normalized.
fn rewrite_reference(expr: &str, reference: &str, to: &str) -> BulkResult<String> {
    let tokens = tokenize(expr)?;
    let mut out = String::with_capacity(expr.len());
    let mut copied = 0;

    for (idx, tok) in tokens.iter().enumerate() {
        if !tok.is_name() || tok.normalized(expr) != reference {
            continue;
        }
        let prev = idx.checked_sub(1).map(|p| &tokens[p]);
        let after_dot = prev.is_some_and(|p| p.kind == TokenKind::Dot);
        let after_cast = prev.is_some_and(|p| p.kind == TokenKind::Symbol && p.text(expr) == ":");
        let before_call = tokens
            .get(idx + 1)
            .is_some_and(|n| n.kind == TokenKind::OpenParen);
        if after_dot || after_cast || before_call {
            continue;
        }
        out.push_str(&expr[copied..tok.start]);
        out.push_str(to);
        copied = tok.end;
    }
    out.push_str(&expr[copied..]);
    Ok(out)
}
