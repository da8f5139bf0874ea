//! The expression language used in `{{ }}` templates, directive keys and
//! `!expr` values.
//!
//! Precedence, loosest first:
//!
//! | Level | Operators |
//! |-------|-----------|
//! | conditional | `a if c else b` |
//! | boolean | `or`, `and`, `not` |
//! | comparison | `==` `!=` `<` `<=` `>` `>=` `in` `not in` |
//! | bitwise | `\|`, `^`, `&`, `<<` `>>` |
//! | arithmetic | `+` `-`, `*` `/` `//` `%` |
//! | unary | `-` `+` `~` |
//! | power | `**` (right associative) |
//! | postfix | `.name`, `[index]` |
//!
//! Every parsed node is anchored to its substring of the enclosing scalar.

use crate::error::{Error, Result};
use strata_graph::ops::{BinaryOp, UnaryOp};
use strata_graph::syntax::{Expr, ExprKind, TemplatePart};
use strata_source_map::SourceInfo;

const KEYWORDS: &[&str] = &["and", "or", "not", "in", "if", "else"];

const PUNCTUATION: &[&str] = &[
    "**", "//", "==", "!=", "<=", ">=", "<<", ">>", "+", "-", "*", "/", "%", "<", ">", "|", "^",
    "&", "~", "(", ")", "[", "]", "{", "}", ",", ":", ".",
];

/// Left-associative binary levels below comparison, loosest first.
const LEVELS: &[&[(&str, BinaryOp)]] = &[
    &[("|", BinaryOp::BitOr)],
    &[("^", BinaryOp::BitXor)],
    &[("&", BinaryOp::BitAnd)],
    &[("<<", BinaryOp::Shl), (">>", BinaryOp::Shr)],
    &[("+", BinaryOp::Add), ("-", BinaryOp::Sub)],
    &[
        ("*", BinaryOp::Mul),
        ("/", BinaryOp::Div),
        ("//", BinaryOp::FloorDiv),
        ("%", BinaryOp::Mod),
    ],
];

const COMPARISONS: &[(&str, BinaryOp)] = &[
    ("==", BinaryOp::Eq),
    ("!=", BinaryOp::Ne),
    ("<", BinaryOp::Lt),
    ("<=", BinaryOp::Le),
    (">", BinaryOp::Gt),
    (">=", BinaryOp::Ge),
];

/// Parse `text`, a whole expression, read from `source_info`.
pub fn parse_expression(text: &str, source_info: &SourceInfo) -> Result<Expr> {
    parse_expression_at(text, source_info, 0)
}

/// Parse an expression found `offset` bytes into `source_info`'s text.
pub(crate) fn parse_expression_at(text: &str, source_info: &SourceInfo, offset: usize) -> Result<Expr> {
    let mut parser = ExprParser::new(text, source_info, offset)?;
    let expr = parser.expression()?;
    parser.finish()?;
    Ok(expr)
}

/// `target in iterable [if filter]`, the part of a `for` key after `for`.
pub(crate) fn parse_for_header(
    text: &str,
    source_info: &SourceInfo,
    offset: usize,
) -> Result<(String, Expr, Option<Expr>)> {
    let mut parser = ExprParser::new(text, source_info, offset)?;
    let target = match parser.advance() {
        Some(Token {
            kind: TokenKind::Name(name),
            ..
        }) if !KEYWORDS.contains(&name.as_str()) => name,
        _ => {
            return Err(Error::expression(
                "a loop needs a variable name",
                parser.span(0, text.len()),
            ));
        }
    };
    parser.expect_keyword("in")?;
    let iterable = parser.or_expr()?;
    let filter = if parser.eat_keyword("if") {
        Some(parser.expression()?)
    } else {
        None
    };
    parser.finish()?;
    Ok((target, iterable, filter))
}

/// Whether `text` holds at least one `{{ }}` interpolation.
pub fn is_template(text: &str) -> bool {
    text.contains("{{")
}

/// Split `text` into literal text and `{{ expression }}` parts.
pub fn parse_template(text: &str, source_info: &SourceInfo) -> Result<Vec<TemplatePart>> {
    parse_template_at(text, source_info, 0)
}

pub(crate) fn parse_template_at(
    text: &str,
    source_info: &SourceInfo,
    offset: usize,
) -> Result<Vec<TemplatePart>> {
    let mut parts = Vec::new();
    let mut rest = 0;
    while let Some(open) = text[rest..].find("{{").map(|i| rest + i) {
        if open > rest {
            parts.push(TemplatePart::Text(text[rest..open].to_string()));
        }
        let inner = open + 2;
        let Some(close) = text[inner..].find("}}").map(|i| inner + i) else {
            return Err(Error::expression(
                "unterminated `{{`",
                SourceInfo::substring(source_info.clone(), offset + open, offset + text.len()),
            ));
        };
        let expr = parse_expression_at(&text[inner..close], source_info, offset + inner)?;
        parts.push(TemplatePart::Expr(expr));
        rest = close + 2;
    }
    if rest < text.len() {
        parts.push(TemplatePart::Text(text[rest..].to_string()));
    }
    Ok(parts)
}

/// A bare identifier usable as a name, a macro or a binding.
pub fn is_identifier(text: &str) -> bool {
    let mut chars = text.chars();
    chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        && !KEYWORDS.contains(&text)
}

#[derive(Debug, Clone, PartialEq)]
enum TokenKind {
    Int(i64),
    Float(f64),
    Str(String),
    Name(String),
    Punct(&'static str),
}

#[derive(Debug, Clone, PartialEq)]
struct Token {
    kind: TokenKind,
    start: usize,
    end: usize,
}

fn tokenize(text: &str, mut error: impl FnMut(&str, usize, usize) -> Error) -> Result<Vec<Token>> {
    let bytes = text.as_bytes();
    let mut tokens: Vec<Token> = Vec::new();
    let mut pos = 0;
    while pos < bytes.len() {
        let c = bytes[pos];
        if c.is_ascii_whitespace() {
            pos += 1;
            continue;
        }
        let start = pos;
        let kind = if c.is_ascii_digit() {
            while pos < bytes.len() && bytes[pos].is_ascii_digit() {
                pos += 1;
            }
            // `a.0.1` is two subscripts, not a float
            let after_dot = matches!(
                tokens.last(),
                Some(Token {
                    kind: TokenKind::Punct("."),
                    ..
                })
            );
            let mut float = false;
            if !after_dot
                && pos + 1 < bytes.len()
                && bytes[pos] == b'.'
                && bytes[pos + 1].is_ascii_digit()
            {
                float = true;
                pos += 1;
                while pos < bytes.len() && bytes[pos].is_ascii_digit() {
                    pos += 1;
                }
            }
            if !after_dot && pos < bytes.len() && matches!(bytes[pos], b'e' | b'E') {
                let mut exponent = pos + 1;
                if exponent < bytes.len() && matches!(bytes[exponent], b'+' | b'-') {
                    exponent += 1;
                }
                if exponent < bytes.len() && bytes[exponent].is_ascii_digit() {
                    float = true;
                    pos = exponent;
                    while pos < bytes.len() && bytes[pos].is_ascii_digit() {
                        pos += 1;
                    }
                }
            }
            let literal = &text[start..pos];
            if float {
                let value = literal
                    .parse::<f64>()
                    .map_err(|_| error("invalid number", start, pos))?;
                TokenKind::Float(value)
            } else {
                let value = literal
                    .parse::<i64>()
                    .map_err(|_| error("integer literal out of range", start, pos))?;
                TokenKind::Int(value)
            }
        } else if c == b'"' || c == b'\'' {
            let (value, end) = scan_string(text, start).ok_or_else(|| {
                error("unterminated string literal", start, text.len())
            })?;
            pos = end;
            TokenKind::Str(value)
        } else if c.is_ascii_alphabetic() || c == b'_' {
            while pos < bytes.len() && (bytes[pos].is_ascii_alphanumeric() || bytes[pos] == b'_') {
                pos += 1;
            }
            TokenKind::Name(text[start..pos].to_string())
        } else if let Some(punct) = PUNCTUATION.iter().find(|p| text[pos..].starts_with(**p)) {
            pos += punct.len();
            TokenKind::Punct(*punct)
        } else {
            let width = text[pos..].chars().next().map_or(1, char::len_utf8);
            return Err(error(
                &format!("unexpected character `{}`", &text[pos..pos + width]),
                pos,
                pos + width,
            ));
        };
        tokens.push(Token {
            kind,
            start,
            end: pos,
        });
    }
    Ok(tokens)
}

/// A quoted string starting at `start`. Returns the unescaped value and the
/// offset just past the closing quote.
fn scan_string(text: &str, start: usize) -> Option<(String, usize)> {
    let mut chars = text[start..].char_indices();
    let (_, quote) = chars.next()?;
    let mut value = String::new();
    while let Some((i, c)) = chars.next() {
        match c {
            '\\' => {
                let (_, escaped) = chars.next()?;
                value.push(match escaped {
                    'n' => '\n',
                    't' => '\t',
                    'r' => '\r',
                    '0' => '\0',
                    other => other,
                });
            }
            c if c == quote => return Some((value, start + i + 1)),
            c => value.push(c),
        }
    }
    None
}

/// Recursive descent over a token list.
struct ExprParser<'a> {
    tokens: Vec<Token>,
    pos: usize,
    len: usize,
    source_info: &'a SourceInfo,
    offset: usize,
}

impl<'a> ExprParser<'a> {
    fn new(text: &str, source_info: &'a SourceInfo, offset: usize) -> Result<Self> {
        let tokens = tokenize(text, |message, start, end| {
            Error::expression(
                message,
                SourceInfo::substring(source_info.clone(), offset + start, offset + end),
            )
        })?;
        Ok(ExprParser {
            tokens,
            pos: 0,
            len: text.len(),
            source_info,
            offset,
        })
    }

    fn span(&self, start: usize, end: usize) -> SourceInfo {
        SourceInfo::substring(self.source_info.clone(), self.offset + start, self.offset + end)
    }

    /// Span from `start` to the end of the last consumed token.
    fn span_from(&self, start: usize) -> SourceInfo {
        let end = self
            .pos
            .checked_sub(1)
            .and_then(|i| self.tokens.get(i))
            .map_or(start, |token| token.end);
        self.span(start, end)
    }

    fn start(&self) -> usize {
        self.peek().map_or(self.len, |token| token.start)
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn peek_punct(&self, punct: &str) -> bool {
        matches!(self.peek(), Some(Token { kind: TokenKind::Punct(p), .. }) if *p == punct)
    }

    fn peek_keyword(&self, keyword: &str) -> bool {
        matches!(self.peek(), Some(Token { kind: TokenKind::Name(name), .. }) if name == keyword)
    }

    fn eat_punct(&mut self, punct: &str) -> bool {
        let found = self.peek_punct(punct);
        if found {
            self.pos += 1;
        }
        found
    }

    fn eat_keyword(&mut self, keyword: &str) -> bool {
        let found = self.peek_keyword(keyword);
        if found {
            self.pos += 1;
        }
        found
    }

    fn expect_punct(&mut self, punct: &str) -> Result<()> {
        if self.eat_punct(punct) {
            Ok(())
        } else {
            Err(self.unexpected(&format!("expected `{punct}`")))
        }
    }

    fn expect_keyword(&mut self, keyword: &str) -> Result<()> {
        if self.eat_keyword(keyword) {
            Ok(())
        } else {
            Err(self.unexpected(&format!("expected `{keyword}`")))
        }
    }

    fn unexpected(&self, message: &str) -> Error {
        match self.peek() {
            Some(token) => Error::expression(
                format!("{message}, found `{}`", describe(&token.kind)),
                self.span(token.start, token.end),
            ),
            None => Error::expression(
                format!("{message}, found the end of the expression"),
                self.span(self.len, self.len),
            ),
        }
    }

    fn finish(&self) -> Result<()> {
        if self.peek().is_some() {
            return Err(self.unexpected("expected the end of the expression"));
        }
        Ok(())
    }

    fn expression(&mut self) -> Result<Expr> {
        let start = self.start();
        let then = self.or_expr()?;
        if !self.eat_keyword("if") {
            return Ok(then);
        }
        let condition = self.or_expr()?;
        self.expect_keyword("else")?;
        let otherwise = self.expression()?;
        Ok(Expr::conditional(then, condition, otherwise).at(self.span_from(start)))
    }

    fn or_expr(&mut self) -> Result<Expr> {
        let start = self.start();
        let mut left = self.and_expr()?;
        while self.eat_keyword("or") {
            let right = self.and_expr()?;
            left = Expr::binary(BinaryOp::Or, left, right).at(self.span_from(start));
        }
        Ok(left)
    }

    fn and_expr(&mut self) -> Result<Expr> {
        let start = self.start();
        let mut left = self.not_expr()?;
        while self.eat_keyword("and") {
            let right = self.not_expr()?;
            left = Expr::binary(BinaryOp::And, left, right).at(self.span_from(start));
        }
        Ok(left)
    }

    fn not_expr(&mut self) -> Result<Expr> {
        let start = self.start();
        if self.eat_keyword("not") {
            let operand = self.not_expr()?;
            return Ok(Expr::unary(UnaryOp::Not, operand).at(self.span_from(start)));
        }
        self.comparison()
    }

    fn comparison(&mut self) -> Result<Expr> {
        let start = self.start();
        let mut left = self.binary(0)?;
        loop {
            let op = if self.eat_keyword("in") {
                BinaryOp::In
            } else if self.peek_keyword("not") {
                self.pos += 1;
                self.expect_keyword("in")?;
                BinaryOp::NotIn
            } else if let Some(op) = self.eat_operator(COMPARISONS) {
                op
            } else {
                break;
            };
            let right = self.binary(0)?;
            left = Expr::binary(op, left, right).at(self.span_from(start));
        }
        Ok(left)
    }

    fn eat_operator(&mut self, table: &[(&str, BinaryOp)]) -> Option<BinaryOp> {
        let op = table
            .iter()
            .find(|(symbol, _)| self.peek_punct(symbol))
            .map(|(_, op)| *op)?;
        self.pos += 1;
        Some(op)
    }

    fn binary(&mut self, level: usize) -> Result<Expr> {
        let Some(table) = LEVELS.get(level) else {
            return self.unary();
        };
        let start = self.start();
        let mut left = self.binary(level + 1)?;
        while let Some(op) = self.eat_operator(table) {
            let right = self.binary(level + 1)?;
            left = Expr::binary(op, left, right).at(self.span_from(start));
        }
        Ok(left)
    }

    fn unary(&mut self) -> Result<Expr> {
        let start = self.start();
        let op = if self.eat_punct("-") {
            UnaryOp::Neg
        } else if self.eat_punct("+") {
            UnaryOp::Pos
        } else if self.eat_punct("~") {
            UnaryOp::Invert
        } else {
            return self.power();
        };
        let operand = self.unary()?;
        Ok(Expr::unary(op, operand).at(self.span_from(start)))
    }

    fn power(&mut self) -> Result<Expr> {
        let start = self.start();
        let base = self.postfix()?;
        if !self.eat_punct("**") {
            return Ok(base);
        }
        // `2 ** -1` and `2 ** 3 ** 2` both bind to the right
        let exponent = self.unary()?;
        Ok(Expr::binary(BinaryOp::Pow, base, exponent).at(self.span_from(start)))
    }

    fn postfix(&mut self) -> Result<Expr> {
        let start = self.start();
        let mut expr = self.primary()?;
        loop {
            if self.eat_punct(".") {
                let segment = self.peek().cloned();
                expr = match segment {
                    Some(Token {
                        kind: TokenKind::Name(name),
                        ..
                    }) => expr.attr(name),
                    Some(Token {
                        kind: TokenKind::Int(index),
                        start,
                        end,
                    }) => expr.index(Expr::int(index).at(self.span(start, end))),
                    _ => return Err(self.unexpected("expected a name after `.`")),
                };
                self.pos += 1;
            } else if self.eat_punct("[") {
                let index = self.expression()?;
                self.expect_punct("]")?;
                expr = expr.index(index);
            } else {
                break;
            }
            expr = expr.at(self.span_from(start));
        }
        Ok(expr)
    }

    fn primary(&mut self) -> Result<Expr> {
        let Some(token) = self.advance() else {
            return Err(self.unexpected("expected a value"));
        };
        let span = self.span(token.start, token.end);
        let expr = match token.kind {
            TokenKind::Int(i) => Expr::int(i),
            TokenKind::Float(x) => Expr::float(x),
            TokenKind::Str(s) => Expr::string(s),
            TokenKind::Name(name) => {
                if KEYWORDS.contains(&name.as_str()) {
                    self.pos -= 1;
                    return Err(self.unexpected("expected a value"));
                }
                match name.as_str() {
                    "true" | "True" => Expr::bool(true),
                    "false" | "False" => Expr::bool(false),
                    "null" | "None" => Expr::null(),
                    _ => Expr::name(name),
                }
            }
            TokenKind::Punct("(") => {
                let inner = self.expression()?;
                self.expect_punct(")")?;
                return Ok(inner);
            }
            TokenKind::Punct("[") => {
                let mut items = Vec::new();
                while !self.eat_punct("]") {
                    items.push(self.expression()?);
                    if !self.eat_punct(",") {
                        self.expect_punct("]")?;
                        break;
                    }
                }
                return Ok(Expr::list(items).at(self.span_from(token.start)));
            }
            TokenKind::Punct("{") => {
                let mut entries = Vec::new();
                while !self.eat_punct("}") {
                    let key = match self.peek().map(|token| &token.kind) {
                        Some(TokenKind::Name(key) | TokenKind::Str(key)) => key.clone(),
                        _ => return Err(self.unexpected("expected a key")),
                    };
                    self.pos += 1;
                    self.expect_punct(":")?;
                    entries.push((key, self.expression()?));
                    if !self.eat_punct(",") {
                        self.expect_punct("}")?;
                        break;
                    }
                }
                return Ok(Expr::new(ExprKind::Dict(entries)).at(self.span_from(token.start)));
            }
            TokenKind::Punct(_) => {
                self.pos -= 1;
                return Err(self.unexpected("expected a value"));
            }
        };
        Ok(expr.at(span))
    }
}

fn describe(kind: &TokenKind) -> String {
    match kind {
        TokenKind::Int(i) => i.to_string(),
        TokenKind::Float(x) => x.to_string(),
        TokenKind::Str(s) => format!("{s:?}"),
        TokenKind::Name(name) => name.clone(),
        TokenKind::Punct(p) => (*p).to_string(),
    }
}
