//! A small, pure assertion language evaluated against an agent output.
//!
//! The syntax follows the Python subset that eval authors write in practice:
//!
//! ```text
//! len(output) > 10 and "fn" in output.lower()
//! not output.strip().startswith("Error")
//! output.count("\n") >= 2
//! ```
//!
//! Names and method signatures are checked at parse time, so a typo fails
//! when the spec loads. Type mismatches surface as [`ExprError::Type`] at
//! evaluation time and count as a failed assertion.

use std::fmt;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ExprError {
    #[error("syntax error at offset {pos}: {msg}")]
    Syntax { pos: usize, msg: String },
    #[error("type error: {0}")]
    Type(String),
}

fn syntax<T>(pos: usize, msg: impl Into<String>) -> Result<T, ExprError> {
    Err(ExprError::Syntax {
        pos,
        msg: msg.into(),
    })
}

// ============================================================================
// VALUES
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Str(String),
    Num(f64),
    Bool(bool),
    None,
}

impl Value {
    pub fn truthy(&self) -> bool {
        match self {
            Value::Str(s) => !s.is_empty(),
            Value::Num(n) => *n != 0.0,
            Value::Bool(b) => *b,
            Value::None => false,
        }
    }

    fn type_name(&self) -> &'static str {
        match self {
            Value::Str(_) => "str",
            Value::Num(_) => "number",
            Value::Bool(_) => "bool",
            Value::None => "None",
        }
    }

    fn as_number(&self) -> Option<f64> {
        match self {
            Value::Num(n) => Some(*n),
            Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            _ => None,
        }
    }

    fn as_str(&self) -> Result<&str, ExprError> {
        match self {
            Value::Str(s) => Ok(s),
            other => Err(ExprError::Type(format!(
                "expected str, got {}",
                other.type_name()
            ))),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Str(s) => write!(f, "{s}"),
            Value::Num(n) if n.fract() == 0.0 && n.abs() < 1e15 => write!(f, "{}", *n as i64),
            Value::Num(n) => write!(f, "{n}"),
            Value::Bool(true) => write!(f, "True"),
            Value::Bool(false) => write!(f, "False"),
            Value::None => write!(f, "None"),
        }
    }
}

// ============================================================================
// TOKENS
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
enum Tok {
    Str(String),
    Num(f64),
    Ident(String),
    LParen,
    RParen,
    Comma,
    Dot,
    Minus,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

fn tokenize(src: &str) -> Result<Vec<(usize, Tok)>, ExprError> {
    let chars: Vec<(usize, char)> = src.char_indices().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let (pos, c) = chars[i];
        match c {
            c if c.is_whitespace() => i += 1,
            '(' => {
                tokens.push((pos, Tok::LParen));
                i += 1;
            }
            ')' => {
                tokens.push((pos, Tok::RParen));
                i += 1;
            }
            ',' => {
                tokens.push((pos, Tok::Comma));
                i += 1;
            }
            '.' if !chars.get(i + 1).is_some_and(|(_, n)| n.is_ascii_digit()) => {
                tokens.push((pos, Tok::Dot));
                i += 1;
            }
            '-' => {
                tokens.push((pos, Tok::Minus));
                i += 1;
            }
            '=' | '!' | '<' | '>' => {
                let next_is_eq = chars.get(i + 1).is_some_and(|(_, n)| *n == '=');
                let tok = match (c, next_is_eq) {
                    ('=', true) => Tok::Eq,
                    ('!', true) => Tok::Ne,
                    ('<', true) => Tok::Le,
                    ('>', true) => Tok::Ge,
                    ('<', false) => Tok::Lt,
                    ('>', false) => Tok::Gt,
                    _ => return syntax(pos, format!("unexpected character '{c}'")),
                };
                tokens.push((pos, tok));
                i += if next_is_eq { 2 } else { 1 };
            }
            '"' | '\'' => {
                let quote = c;
                let mut text = String::new();
                i += 1;
                loop {
                    let Some(&(_, ch)) = chars.get(i) else {
                        return syntax(pos, "unterminated string literal");
                    };
                    i += 1;
                    match ch {
                        ch if ch == quote => break,
                        '\\' => {
                            let Some(&(_, esc)) = chars.get(i) else {
                                return syntax(pos, "unterminated string literal");
                            };
                            i += 1;
                            text.push(match esc {
                                'n' => '\n',
                                't' => '\t',
                                'r' => '\r',
                                '0' => '\0',
                                other => other,
                            });
                        }
                        other => text.push(other),
                    }
                }
                tokens.push((pos, Tok::Str(text)));
            }
            c if c.is_ascii_digit() || c == '.' => {
                let start = i;
                while i < chars.len() && (chars[i].1.is_ascii_digit() || chars[i].1 == '.') {
                    i += 1;
                }
                let literal: String = chars[start..i].iter().map(|(_, ch)| ch).collect();
                let num = literal
                    .parse::<f64>()
                    .or_else(|_| syntax(pos, format!("invalid number '{literal}'")))?;
                tokens.push((pos, Tok::Num(num)));
            }
            c if c.is_alphabetic() || c == '_' => {
                let start = i;
                while i < chars.len() && (chars[i].1.is_alphanumeric() || chars[i].1 == '_') {
                    i += 1;
                }
                let ident: String = chars[start..i].iter().map(|(_, ch)| ch).collect();
                tokens.push((pos, Tok::Ident(ident)));
            }
            other => return syntax(pos, format!("unexpected character '{other}'")),
        }
    }
    Ok(tokens)
}

// ============================================================================
// AST
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq)]
enum CmpOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    In,
    NotIn,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Builtin {
    Len,
    Str,
    Int,
    Float,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Method {
    Lower,
    Upper,
    Strip,
    StartsWith,
    EndsWith,
    Count,
    Find,
}

impl Method {
    fn lookup(name: &str) -> Option<(Method, usize)> {
        Some(match name {
            "lower" => (Method::Lower, 0),
            "upper" => (Method::Upper, 0),
            "strip" => (Method::Strip, 0),
            "startswith" => (Method::StartsWith, 1),
            "endswith" => (Method::EndsWith, 1),
            "count" => (Method::Count, 1),
            "find" => (Method::Find, 1),
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Expr {
    Literal(Value),
    Output,
    Not(Box<Expr>),
    Neg(Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Compare(Box<Expr>, Vec<(CmpOp, Expr)>),
    Call(Builtin, Box<Expr>),
    Method(Box<Expr>, Method, Vec<Expr>),
}

// ============================================================================
// PARSER
// ============================================================================

struct Parser {
    tokens: Vec<(usize, Tok)>,
    idx: usize,
    end: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Tok> {
        self.tokens.get(self.idx).map(|(_, t)| t)
    }

    fn pos(&self) -> usize {
        self.tokens.get(self.idx).map(|(p, _)| *p).unwrap_or(self.end)
    }

    fn bump(&mut self) -> Option<Tok> {
        let tok = self.tokens.get(self.idx).map(|(_, t)| t.clone());
        self.idx += 1;
        tok
    }

    fn peek_keyword(&self, kw: &str) -> bool {
        matches!(self.peek(), Some(Tok::Ident(id)) if id == kw)
    }

    fn expect(&mut self, want: Tok, what: &str) -> Result<(), ExprError> {
        let pos = self.pos();
        match self.bump() {
            Some(tok) if tok == want => Ok(()),
            _ => syntax(pos, format!("expected {what}")),
        }
    }

    fn or_expr(&mut self) -> Result<Expr, ExprError> {
        let mut lhs = self.and_expr()?;
        while self.peek_keyword("or") {
            self.bump();
            let rhs = self.and_expr()?;
            lhs = Expr::Or(Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn and_expr(&mut self) -> Result<Expr, ExprError> {
        let mut lhs = self.not_expr()?;
        while self.peek_keyword("and") {
            self.bump();
            let rhs = self.not_expr()?;
            lhs = Expr::And(Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn not_expr(&mut self) -> Result<Expr, ExprError> {
        if self.peek_keyword("not") {
            self.bump();
            return Ok(Expr::Not(Box::new(self.not_expr()?)));
        }
        self.comparison()
    }

    fn comparison(&mut self) -> Result<Expr, ExprError> {
        let first = self.unary()?;
        let mut rest = Vec::new();
        loop {
            let op = match self.peek() {
                Some(Tok::Eq) => CmpOp::Eq,
                Some(Tok::Ne) => CmpOp::Ne,
                Some(Tok::Lt) => CmpOp::Lt,
                Some(Tok::Le) => CmpOp::Le,
                Some(Tok::Gt) => CmpOp::Gt,
                Some(Tok::Ge) => CmpOp::Ge,
                Some(Tok::Ident(id)) if id == "in" => CmpOp::In,
                Some(Tok::Ident(id)) if id == "not" => {
                    let followed_by_in = matches!(
                        self.tokens.get(self.idx + 1),
                        Some((_, Tok::Ident(next))) if next == "in"
                    );
                    if !followed_by_in {
                        break;
                    }
                    self.bump();
                    CmpOp::NotIn
                }
                _ => break,
            };
            self.bump();
            rest.push((op, self.unary()?));
        }
        if rest.is_empty() {
            Ok(first)
        } else {
            Ok(Expr::Compare(Box::new(first), rest))
        }
    }

    fn unary(&mut self) -> Result<Expr, ExprError> {
        if matches!(self.peek(), Some(Tok::Minus)) {
            self.bump();
            return Ok(Expr::Neg(Box::new(self.unary()?)));
        }
        self.postfix()
    }

    fn postfix(&mut self) -> Result<Expr, ExprError> {
        let mut expr = self.primary()?;
        while matches!(self.peek(), Some(Tok::Dot)) {
            self.bump();
            let pos = self.pos();
            let name = match self.bump() {
                Some(Tok::Ident(name)) => name,
                _ => return syntax(pos, "expected method name after '.'"),
            };
            let Some((method, arity)) = Method::lookup(&name) else {
                return syntax(pos, format!("unknown method '{name}'"));
            };
            let args = self.call_args()?;
            if args.len() != arity {
                return syntax(
                    pos,
                    format!("{name}() takes {arity} argument(s), got {}", args.len()),
                );
            }
            expr = Expr::Method(Box::new(expr), method, args);
        }
        Ok(expr)
    }

    fn call_args(&mut self) -> Result<Vec<Expr>, ExprError> {
        self.expect(Tok::LParen, "'('")?;
        let mut args = Vec::new();
        if matches!(self.peek(), Some(Tok::RParen)) {
            self.bump();
            return Ok(args);
        }
        loop {
            args.push(self.or_expr()?);
            let pos = self.pos();
            match self.bump() {
                Some(Tok::Comma) => continue,
                Some(Tok::RParen) => break,
                _ => return syntax(pos, "expected ',' or ')'"),
            }
        }
        Ok(args)
    }

    fn primary(&mut self) -> Result<Expr, ExprError> {
        let pos = self.pos();
        match self.bump() {
            Some(Tok::Str(s)) => Ok(Expr::Literal(Value::Str(s))),
            Some(Tok::Num(n)) => Ok(Expr::Literal(Value::Num(n))),
            Some(Tok::LParen) => {
                let inner = self.or_expr()?;
                self.expect(Tok::RParen, "')'")?;
                Ok(inner)
            }
            Some(Tok::Ident(id)) => match id.as_str() {
                "True" => Ok(Expr::Literal(Value::Bool(true))),
                "False" => Ok(Expr::Literal(Value::Bool(false))),
                "None" => Ok(Expr::Literal(Value::None)),
                "output" => Ok(Expr::Output),
                "len" | "str" | "int" | "float" => {
                    let builtin = match id.as_str() {
                        "len" => Builtin::Len,
                        "str" => Builtin::Str,
                        "int" => Builtin::Int,
                        _ => Builtin::Float,
                    };
                    let mut args = self.call_args()?;
                    if args.len() != 1 {
                        return syntax(pos, format!("{id}() takes exactly one argument"));
                    }
                    Ok(Expr::Call(builtin, Box::new(args.remove(0))))
                }
                other => syntax(pos, format!("unknown name '{other}'")),
            },
            Some(_) => syntax(pos, "unexpected token"),
            None => syntax(pos, "unexpected end of expression"),
        }
    }
}

// ============================================================================
// EVALUATION
// ============================================================================

fn compare(op: CmpOp, lhs: &Value, rhs: &Value) -> Result<bool, ExprError> {
    use std::cmp::Ordering;

    let ordering = match (lhs, rhs) {
        (Value::Str(a), Value::Str(b)) => Some(a.cmp(b)),
        (Value::None, Value::None) => Some(Ordering::Equal),
        _ => match (lhs.as_number(), rhs.as_number()) {
            (Some(a), Some(b)) => a.partial_cmp(&b),
            _ => None,
        },
    };

    match op {
        CmpOp::In => Ok(rhs.as_str()?.contains(lhs.as_str()?)),
        CmpOp::NotIn => Ok(!rhs.as_str()?.contains(lhs.as_str()?)),
        CmpOp::Eq => Ok(ordering == Some(Ordering::Equal)),
        CmpOp::Ne => Ok(ordering != Some(Ordering::Equal)),
        CmpOp::Lt | CmpOp::Le | CmpOp::Gt | CmpOp::Ge => {
            let o = ordering.ok_or_else(|| {
                ExprError::Type(format!(
                    "cannot order {} and {}",
                    lhs.type_name(),
                    rhs.type_name()
                ))
            })?;
            Ok(match op {
                CmpOp::Lt => o == Ordering::Less,
                CmpOp::Le => o != Ordering::Greater,
                CmpOp::Gt => o == Ordering::Greater,
                _ => o != Ordering::Less,
            })
        }
    }
}

fn eval(expr: &Expr, output: &str) -> Result<Value, ExprError> {
    Ok(match expr {
        Expr::Literal(v) => v.clone(),
        Expr::Output => Value::Str(output.to_string()),
        Expr::Not(inner) => Value::Bool(!eval(inner, output)?.truthy()),
        Expr::Neg(inner) => {
            let v = eval(inner, output)?;
            let n = v
                .as_number()
                .ok_or_else(|| ExprError::Type(format!("cannot negate {}", v.type_name())))?;
            Value::Num(-n)
        }
        Expr::And(lhs, rhs) => {
            let l = eval(lhs, output)?;
            if !l.truthy() {
                l
            } else {
                eval(rhs, output)?
            }
        }
        Expr::Or(lhs, rhs) => {
            let l = eval(lhs, output)?;
            if l.truthy() {
                l
            } else {
                eval(rhs, output)?
            }
        }
        Expr::Compare(first, rest) => {
            let mut lhs = eval(first, output)?;
            for (op, rhs_expr) in rest {
                let rhs = eval(rhs_expr, output)?;
                if !compare(*op, &lhs, &rhs)? {
                    return Ok(Value::Bool(false));
                }
                lhs = rhs;
            }
            Value::Bool(true)
        }
        Expr::Call(builtin, arg) => {
            let v = eval(arg, output)?;
            match builtin {
                Builtin::Len => Value::Num(v.as_str()?.chars().count() as f64),
                Builtin::Str => Value::Str(v.to_string()),
                Builtin::Int | Builtin::Float => {
                    let n = match &v {
                        Value::Str(s) => s.trim().parse::<f64>().map_err(|_| {
                            ExprError::Type(format!("cannot convert '{s}' to a number"))
                        })?,
                        other => other.as_number().ok_or_else(|| {
                            ExprError::Type(format!("cannot convert {} to a number", other.type_name()))
                        })?,
                    };
                    if *builtin == Builtin::Int {
                        Value::Num(n.trunc())
                    } else {
                        Value::Num(n)
                    }
                }
            }
        }
        Expr::Method(recv, method, args) => {
            let recv = eval(recv, output)?;
            let s = recv.as_str()?;
            let arg = match args.first() {
                Some(a) => Some(eval(a, output)?),
                None => None,
            };
            let needle = match &arg {
                Some(v) => v.as_str()?,
                None => "",
            };
            match method {
                Method::Lower => Value::Str(s.to_lowercase()),
                Method::Upper => Value::Str(s.to_uppercase()),
                Method::Strip => Value::Str(s.trim().to_string()),
                Method::StartsWith => Value::Bool(s.starts_with(needle)),
                Method::EndsWith => Value::Bool(s.ends_with(needle)),
                Method::Count => {
                    if needle.is_empty() {
                        Value::Num((s.chars().count() + 1) as f64)
                    } else {
                        Value::Num(s.matches(needle).count() as f64)
                    }
                }
                Method::Find => {
                    match s.find(needle) {
                        Some(byte_idx) => Value::Num(s[..byte_idx].chars().count() as f64),
                        None => Value::Num(-1.0),
                    }
                }
            }
        }
    })
}

/// A parsed assertion, ready to evaluate against any number of outputs.
#[derive(Debug, Clone, PartialEq)]
pub struct Expression {
    source: String,
    ast: Expr,
}

impl Expression {
    pub fn parse(source: &str) -> Result<Self, ExprError> {
        let tokens = tokenize(source)?;
        if tokens.is_empty() {
            return syntax(0, "empty expression");
        }
        let mut parser = Parser {
            tokens,
            idx: 0,
            end: source.len(),
        };
        let ast = parser.or_expr()?;
        if parser.idx < parser.tokens.len() {
            return syntax(parser.pos(), "unexpected trailing input");
        }
        Ok(Self {
            source: source.to_string(),
            ast,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn evaluate(&self, output: &str) -> Result<Value, ExprError> {
        eval(&self.ast, output)
    }

    /// Evaluate and collapse to a truth value.
    pub fn holds(&self, output: &str) -> Result<bool, ExprError> {
        self.evaluate(output).map(|v| v.truthy())
    }
}
