//! Sandboxed rubric expressions.
//!
//! A rubric maps round telemetry to a scalar reward. Rubrics are written by
//! operators, so the grammar is the sandbox: the parser only knows numeric
//! literals, telemetry variables, `+ - * / ^` (with `**` as an alias for
//! `^`), unary `+ -`, and parentheses. Everything else is rejected when the
//! expression is constructed, never at evaluation time.
//!
//! ```text
//! expr    := term (('+' | '-') term)*
//! term    := unary (('*' | '/') unary)*
//! unary   := ('+' | '-') unary | power
//! power   := primary ('^' unary)?
//! primary := NUMBER | IDENT | '(' expr ')'
//! ```
//!
//! Exponentiation binds tighter than unary minus and is right-associative,
//! so `-2^2` is `-4` and `2^3^2` is `512`.

use crate::error::{EvaluationError, RubricError};
use crate::types::Telemetry;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use tracing::{debug, warn};

/// Built-in scoring formula used whenever the configured rubric is unusable.
pub const FALLBACK_RUBRIC: &str = "2*pass - 0.1*time - 0.1*cost - 0.05*mdl";

const RESERVED_WORDS: &[&str] = &[
    "and", "as", "assert", "await", "def", "del", "else", "for", "from", "if", "import", "in",
    "is", "lambda", "not", "or", "return", "while", "with", "yield", "None", "True", "False",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Pow,
}

impl fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let symbol = match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Pow => "^",
        };
        f.write_str(symbol)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Plus,
    Neg,
}

/// Closed set of node kinds a rubric can contain
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(f64),
    Variable(String),
    Unary(UnaryOp, Box<Expr>),
    Binary(BinaryOp, Box<Expr>, Box<Expr>),
}

impl Expr {
    fn eval(&self, telemetry: &Telemetry) -> Result<f64, EvaluationError> {
        match self {
            Expr::Literal(v) => Ok(*v),
            Expr::Variable(name) => Ok(telemetry.get(name).copied().unwrap_or(0.0)),
            Expr::Unary(op, operand) => {
                let v = operand.eval(telemetry)?;
                Ok(match op {
                    UnaryOp::Plus => v,
                    UnaryOp::Neg => -v,
                })
            }
            Expr::Binary(op, lhs, rhs) => {
                let l = lhs.eval(telemetry)?;
                let r = rhs.eval(telemetry)?;
                match op {
                    BinaryOp::Add => Ok(l + r),
                    BinaryOp::Sub => Ok(l - r),
                    BinaryOp::Mul => Ok(l * r),
                    BinaryOp::Div => {
                        if r == 0.0 {
                            return Err(EvaluationError::DivisionByZero);
                        }
                        Ok(l / r)
                    }
                    BinaryOp::Pow => {
                        if l == 0.0 && r < 0.0 {
                            return Err(EvaluationError::DivisionByZero);
                        }
                        let v = l.powf(r);
                        if !v.is_finite() {
                            return Err(EvaluationError::NonFinite(v));
                        }
                        Ok(v)
                    }
                }
            }
        }
    }

    fn collect_variables<'a>(&'a self, out: &mut BTreeSet<&'a str>) {
        match self {
            Expr::Literal(_) => {}
            Expr::Variable(name) => {
                out.insert(name);
            }
            Expr::Unary(_, operand) => operand.collect_variables(out),
            Expr::Binary(_, lhs, rhs) => {
                lhs.collect_variables(out);
                rhs.collect_variables(out);
            }
        }
    }
}

/// A validated, immutable rubric
#[derive(Debug, Clone, PartialEq)]
pub struct RubricExpression {
    source: String,
    root: Expr,
}

impl RubricExpression {
    /// Parse `expression` and check every variable against `allowed`.
    ///
    /// An empty expression scores every round as `0`.
    pub fn validate<I, S>(expression: &str, allowed: I) -> Result<Self, RubricError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let allowed: BTreeSet<String> = allowed
            .into_iter()
            .map(|s| s.as_ref().to_string())
            .collect();

        if expression.trim().is_empty() {
            return Ok(Self {
                source: String::new(),
                root: Expr::Literal(0.0),
            });
        }

        let tokens = tokenize(expression)?;
        let mut parser = Parser {
            tokens: &tokens,
            pos: 0,
            allowed: &allowed,
        };
        let root = parser.parse_expr()?;
        if let Some(tok) = parser.peek() {
            return Err(parser.unexpected(tok));
        }

        Ok(Self {
            source: expression.to_string(),
            root,
        })
    }

    /// Reduce the tree against runtime telemetry; missing variables read as `0.0`.
    pub fn evaluate(&self, telemetry: &Telemetry) -> Result<f64, EvaluationError> {
        let v = self.root.eval(telemetry)?;
        if !v.is_finite() {
            return Err(EvaluationError::NonFinite(v));
        }
        Ok(v)
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn root(&self) -> &Expr {
        &self.root
    }

    /// Variables the expression actually reads
    pub fn variables(&self) -> BTreeSet<&str> {
        let mut out = BTreeSet::new();
        self.root.collect_variables(&mut out);
        out
    }
}

/// The built-in formula, evaluated directly so it cannot fail.
///
/// Always finite: non-finite inputs read as `0.0`, and a result that
/// overflows scores `0.0`.
pub fn fallback_score(telemetry: &Telemetry) -> f64 {
    let get = |k: &str| {
        telemetry
            .get(k)
            .copied()
            .filter(|v| v.is_finite())
            .unwrap_or(0.0)
    };
    let v = 2.0 * get("pass") - 0.1 * get("time") - 0.1 * get("cost") - 0.05 * get("mdl");
    if v.is_finite() {
        v
    } else {
        0.0
    }
}

/// Where a round's score came from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ScoreSource {
    Rubric,
    Fallback { reason: String },
}

/// A round's reward and its provenance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Score {
    pub value: f64,
    pub source: ScoreSource,
}

/// Scores telemetry with the configured rubric, falling back when needed.
///
/// Constructed once per configuration. A rubric rejected at construction
/// means every round uses [`fallback_score`]; an evaluation error only
/// affects the round that raised it.
#[derive(Debug, Clone)]
pub struct Scorer {
    rubric: Option<RubricExpression>,
    rejected: Option<RubricError>,
}

impl Scorer {
    pub fn new<I, S>(expression: &str, telemetry_keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        match RubricExpression::validate(expression, telemetry_keys) {
            Ok(rubric) => {
                debug!("Rubric accepted: {}", rubric.source());
                Self {
                    rubric: Some(rubric),
                    rejected: None,
                }
            }
            Err(e) => {
                warn!(
                    "Rubric '{}' rejected ({}); using fallback '{}'",
                    expression, e, FALLBACK_RUBRIC
                );
                Self {
                    rubric: None,
                    rejected: Some(e),
                }
            }
        }
    }

    pub fn rubric(&self) -> Option<&RubricExpression> {
        self.rubric.as_ref()
    }

    pub fn rejection(&self) -> Option<&RubricError> {
        self.rejected.as_ref()
    }

    pub fn score(&self, telemetry: &Telemetry) -> Score {
        let reason = match (&self.rubric, &self.rejected) {
            (Some(rubric), _) => match rubric.evaluate(telemetry) {
                Ok(value) => {
                    return Score {
                        value,
                        source: ScoreSource::Rubric,
                    }
                }
                Err(e) => {
                    warn!("Rubric evaluation failed ({}); using fallback for this round", e);
                    e.to_string()
                }
            },
            (None, Some(e)) => e.to_string(),
            (None, None) => "no rubric configured".to_string(),
        };

        Score {
            value: fallback_score(telemetry),
            source: ScoreSource::Fallback { reason },
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(f64),
    Ident(String),
    Op(BinaryOp),
    LParen,
    RParen,
    Dot,
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Number(v) => write!(f, "{}", v),
            Token::Ident(name) => write!(f, "{}", name),
            Token::Op(op) => write!(f, "{}", op),
            Token::LParen => f.write_str("("),
            Token::RParen => f.write_str(")"),
            Token::Dot => f.write_str("."),
        }
    }
}

fn tokenize(src: &str) -> Result<Vec<Token>, RubricError> {
    let chars: Vec<char> = src.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match c {
            c if c.is_whitespace() => i += 1,
            '0'..='9' => {
                let (value, next) = lex_number(&chars, i)?;
                tokens.push(Token::Number(value));
                i = next;
            }
            '.' if chars.get(i + 1).map_or(false, char::is_ascii_digit) => {
                let (value, next) = lex_number(&chars, i)?;
                tokens.push(Token::Number(value));
                i = next;
            }
            '.' => {
                tokens.push(Token::Dot);
                i += 1;
            }
            c if c.is_alphabetic() || c == '_' => {
                let start = i;
                while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_') {
                    i += 1;
                }
                tokens.push(Token::Ident(chars[start..i].iter().collect()));
            }
            '+' => {
                tokens.push(Token::Op(BinaryOp::Add));
                i += 1;
            }
            '-' => {
                tokens.push(Token::Op(BinaryOp::Sub));
                i += 1;
            }
            '*' if chars.get(i + 1) == Some(&'*') => {
                tokens.push(Token::Op(BinaryOp::Pow));
                i += 2;
            }
            '*' => {
                tokens.push(Token::Op(BinaryOp::Mul));
                i += 1;
            }
            '/' if chars.get(i + 1) == Some(&'/') => {
                return Err(RubricError::UnsupportedConstruct(
                    "floor division '//'".to_string(),
                ));
            }
            '/' => {
                tokens.push(Token::Op(BinaryOp::Div));
                i += 1;
            }
            '^' => {
                tokens.push(Token::Op(BinaryOp::Pow));
                i += 1;
            }
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            '"' | '\'' => {
                return Err(RubricError::UnsupportedConstruct(
                    "string literal".to_string(),
                ))
            }
            '[' | ']' => {
                return Err(RubricError::UnsupportedConstruct(
                    "subscript or list".to_string(),
                ))
            }
            '{' | '}' => {
                return Err(RubricError::UnsupportedConstruct(
                    "set or dict literal".to_string(),
                ))
            }
            ',' => return Err(RubricError::UnsupportedConstruct("tuple".to_string())),
            '<' | '>' | '=' | '!' => {
                return Err(RubricError::UnsupportedConstruct(format!(
                    "comparison or assignment '{}'",
                    c
                )))
            }
            other => {
                return Err(RubricError::UnsupportedConstruct(format!(
                    "operator '{}'",
                    other
                )))
            }
        }
    }

    Ok(tokens)
}

fn lex_number(chars: &[char], start: usize) -> Result<(f64, usize), RubricError> {
    let mut i = start;
    while i < chars.len() && chars[i].is_ascii_digit() {
        i += 1;
    }
    if i < chars.len() && chars[i] == '.' {
        i += 1;
        while i < chars.len() && chars[i].is_ascii_digit() {
            i += 1;
        }
    }
    if i < chars.len() && (chars[i] == 'e' || chars[i] == 'E') {
        let mut j = i + 1;
        if j < chars.len() && (chars[j] == '+' || chars[j] == '-') {
            j += 1;
        }
        if j < chars.len() && chars[j].is_ascii_digit() {
            while j < chars.len() && chars[j].is_ascii_digit() {
                j += 1;
            }
            i = j;
        }
    }

    let text: String = chars[start..i].iter().collect();
    text.parse::<f64>()
        .map(|v| (v, i))
        .map_err(|_| RubricError::Syntax(format!("invalid number '{}'", text)))
}

struct Parser<'a> {
    tokens: &'a [Token],
    pos: usize,
    allowed: &'a BTreeSet<String>,
}

impl<'a> Parser<'a> {
    fn peek(&self) -> Option<&'a Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<&'a Token> {
        let tok = self.tokens.get(self.pos);
        if tok.is_some() {
            self.pos += 1;
        }
        tok
    }

    fn unexpected(&self, tok: &Token) -> RubricError {
        match tok {
            Token::Dot => RubricError::UnsupportedConstruct("attribute access".to_string()),
            Token::LParen => RubricError::UnsupportedConstruct("call expression".to_string()),
            Token::Ident(name) if RESERVED_WORDS.contains(&name.as_str()) => {
                RubricError::UnsupportedConstruct(format!("keyword '{}'", name))
            }
            other => RubricError::Syntax(format!("unexpected token '{}'", other)),
        }
    }

    fn parse_expr(&mut self) -> Result<Expr, RubricError> {
        let mut lhs = self.parse_term()?;
        while let Some(Token::Op(op @ (BinaryOp::Add | BinaryOp::Sub))) = self.peek() {
            self.pos += 1;
            let rhs = self.parse_term()?;
            lhs = Expr::Binary(*op, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_term(&mut self) -> Result<Expr, RubricError> {
        let mut lhs = self.parse_unary()?;
        while let Some(Token::Op(op @ (BinaryOp::Mul | BinaryOp::Div))) = self.peek() {
            self.pos += 1;
            let rhs = self.parse_unary()?;
            lhs = Expr::Binary(*op, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_unary(&mut self) -> Result<Expr, RubricError> {
        match self.peek() {
            Some(Token::Op(BinaryOp::Add)) => {
                self.pos += 1;
                Ok(Expr::Unary(UnaryOp::Plus, Box::new(self.parse_unary()?)))
            }
            Some(Token::Op(BinaryOp::Sub)) => {
                self.pos += 1;
                Ok(Expr::Unary(UnaryOp::Neg, Box::new(self.parse_unary()?)))
            }
            _ => self.parse_power(),
        }
    }

    fn parse_power(&mut self) -> Result<Expr, RubricError> {
        let base = self.parse_primary()?;
        if let Some(Token::Op(BinaryOp::Pow)) = self.peek() {
            self.pos += 1;
            let exponent = self.parse_unary()?;
            return Ok(Expr::Binary(BinaryOp::Pow, Box::new(base), Box::new(exponent)));
        }
        Ok(base)
    }

    fn parse_primary(&mut self) -> Result<Expr, RubricError> {
        let expr = match self.next() {
            Some(Token::Number(v)) => Expr::Literal(*v),
            Some(Token::Ident(name)) => {
                match self.peek() {
                    Some(Token::LParen) => {
                        return Err(RubricError::UnsupportedConstruct(format!(
                            "function call '{}(...)'",
                            name
                        )))
                    }
                    Some(Token::Dot) => {
                        return Err(RubricError::UnsupportedConstruct(format!(
                            "attribute access on '{}'",
                            name
                        )))
                    }
                    _ => {}
                }
                if RESERVED_WORDS.contains(&name.as_str()) {
                    return Err(RubricError::UnsupportedConstruct(format!(
                        "keyword '{}'",
                        name
                    )));
                }
                if !self.allowed.contains(name) {
                    return Err(RubricError::UnknownVariable(name.clone()));
                }
                Expr::Variable(name.clone())
            }
            Some(Token::LParen) => {
                let inner = self.parse_expr()?;
                match self.next() {
                    Some(Token::RParen) => inner,
                    Some(tok) => return Err(self.unexpected(tok)),
                    None => return Err(RubricError::Syntax("unclosed '('".to_string())),
                }
            }
            Some(tok) => return Err(self.unexpected(tok)),
            None => {
                return Err(RubricError::Syntax(
                    "unexpected end of expression".to_string(),
                ))
            }
        };

        // `(a + b).real`, `pass(1)` style postfix forms
        match self.peek() {
            Some(Token::Dot) => Err(RubricError::UnsupportedConstruct(
                "attribute access".to_string(),
            )),
            Some(Token::LParen) => Err(RubricError::UnsupportedConstruct(
                "call expression".to_string(),
            )),
            _ => Ok(expr),
        }
    }
}
