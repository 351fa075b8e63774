//! Recursive-descent parser.
//!
//! Precedence, loosest first: `|`, `or`, `and`, `==`/`!=`, `+`, postfix paths.
//! Expressions nest at most [`MAX_DEPTH`] levels, which also bounds evaluation.

use serde_json::Value;

use super::QueryError;
use super::ast::{CmpOp, Expr, Func, StrPart};
use super::lexer::{RawPart, Spanned, Token, tokenize};

pub const MAX_DEPTH: usize = 128;

pub fn parse(src: &str) -> Result<Expr, QueryError> {
  parse_at(src, 0, 0)
}

/// Parse `src`, reporting positions shifted by `base` (for interpolations).
fn parse_at(src: &str, base: usize, depth: usize) -> Result<Expr, QueryError> {
  let tokens = tokenize(src).map_err(|e| e.shifted(base))?;
  let mut parser = Parser {
    tokens,
    pos: 0,
    end: src.len(),
    base,
    depth,
  };
  if parser.tokens.is_empty() {
    return Err(QueryError::parse(base, "empty query"));
  }
  let expr = parser.pipe()?;
  if let Some((token, offset)) = parser.tokens.get(parser.pos) {
    return Err(QueryError::parse(base + offset, format!("unexpected {:?}", token)));
  }
  Ok(expr)
}

struct Parser {
  tokens: Vec<Spanned>,
  pos: usize,
  end: usize,
  base: usize,
  depth: usize,
}

impl Parser {
  fn peek(&self) -> Option<&Token> {
    self.tokens.get(self.pos).map(|(t, _)| t)
  }

  fn peek_at(&self, ahead: usize) -> Option<&Token> {
    self.tokens.get(self.pos + ahead).map(|(t, _)| t)
  }

  fn offset(&self) -> usize {
    self.base + self.tokens.get(self.pos).map(|(_, o)| *o).unwrap_or(self.end)
  }

  fn next(&mut self) -> Option<Token> {
    let token = self.tokens.get(self.pos).map(|(t, _)| t.clone());
    self.pos += 1;
    token
  }

  fn eat(&mut self, expected: &Token) -> bool {
    if self.peek() == Some(expected) {
      self.pos += 1;
      true
    } else {
      false
    }
  }

  fn expect(&mut self, expected: Token, what: &str) -> Result<(), QueryError> {
    if self.eat(&expected) {
      Ok(())
    } else {
      Err(QueryError::parse(self.offset(), format!("expected {}", what)))
    }
  }

  /// One level deeper; fails once the expression would exceed [`MAX_DEPTH`].
  fn nest(&mut self) -> Result<(), QueryError> {
    self.depth += 1;
    if self.depth > MAX_DEPTH {
      return Err(QueryError::parse(
        self.offset(),
        format!("expression nested deeper than {} levels", MAX_DEPTH),
      ));
    }
    Ok(())
  }

  fn eat_keyword(&mut self, word: &str) -> bool {
    if matches!(self.peek(), Some(Token::Ident(w)) if w == word) {
      self.pos += 1;
      true
    } else {
      false
    }
  }

  fn pipe(&mut self) -> Result<Expr, QueryError> {
    let saved = self.depth;
    let mut left = self.or()?;
    while self.eat(&Token::Pipe) {
      self.nest()?;
      let right = self.or()?;
      left = Expr::Pipe(Box::new(left), Box::new(right));
    }
    self.depth = saved;
    Ok(left)
  }

  fn or(&mut self) -> Result<Expr, QueryError> {
    let saved = self.depth;
    let mut left = self.and()?;
    while self.eat_keyword("or") {
      self.nest()?;
      let right = self.and()?;
      left = Expr::Or(Box::new(left), Box::new(right));
    }
    self.depth = saved;
    Ok(left)
  }

  fn and(&mut self) -> Result<Expr, QueryError> {
    let saved = self.depth;
    let mut left = self.compare()?;
    while self.eat_keyword("and") {
      self.nest()?;
      let right = self.compare()?;
      left = Expr::And(Box::new(left), Box::new(right));
    }
    self.depth = saved;
    Ok(left)
  }

  fn compare(&mut self) -> Result<Expr, QueryError> {
    let left = self.additive()?;
    let op = if self.eat(&Token::EqEq) {
      CmpOp::Eq
    } else if self.eat(&Token::NotEq) {
      CmpOp::Ne
    } else {
      return Ok(left);
    };
    let saved = self.depth;
    self.nest()?;
    let right = self.additive()?;
    self.depth = saved;
    Ok(Expr::Compare(Box::new(left), op, Box::new(right)))
  }

  fn additive(&mut self) -> Result<Expr, QueryError> {
    let saved = self.depth;
    let mut left = self.postfix()?;
    while self.eat(&Token::Plus) {
      self.nest()?;
      let right = self.postfix()?;
      left = Expr::Add(Box::new(left), Box::new(right));
    }
    self.depth = saved;
    Ok(left)
  }

  fn postfix(&mut self) -> Result<Expr, QueryError> {
    let saved = self.depth;
    let mut expr = self.primary()?;
    loop {
      if matches!(self.peek(), Some(Token::Dot | Token::LBracket)) {
        self.nest()?;
      }
      match (self.peek(), self.peek_at(1)) {
        (Some(Token::Dot), Some(Token::Ident(_) | Token::Str(_))) => {
          self.pos += 1;
          expr = self.field(expr)?;
        }
        (Some(Token::Dot), Some(Token::LBracket)) => {
          self.pos += 2;
          expr = self.bracket(expr)?;
        }
        (Some(Token::LBracket), _) => {
          self.pos += 1;
          expr = self.bracket(expr)?;
        }
        _ => {
          self.depth = saved;
          return Ok(expr);
        }
      }
    }
  }

  /// After a `.`: an identifier or quoted field name.
  fn field(&mut self, target: Expr) -> Result<Expr, QueryError> {
    let offset = self.offset();
    match self.next() {
      Some(Token::Ident(name)) => Ok(Expr::Field(Box::new(target), name)),
      Some(Token::Str(parts)) => Ok(Expr::Field(Box::new(target), literal_only(parts, offset)?)),
      _ => Err(QueryError::parse(offset, "expected field name")),
    }
  }

  /// After a `[`: `]`, `N]` or `"name"]`.
  fn bracket(&mut self, target: Expr) -> Result<Expr, QueryError> {
    let offset = self.offset();
    let expr = match self.next() {
      Some(Token::RBracket) => return Ok(Expr::Iterate(Box::new(target))),
      Some(Token::Number(n)) if n.fract() == 0.0 => Expr::Index(Box::new(target), n as i64),
      Some(Token::Str(parts)) => Expr::Field(Box::new(target), literal_only(parts, offset)?),
      _ => return Err(QueryError::parse(offset, "expected index, field name or ']'")),
    };
    self.expect(Token::RBracket, "']'")?;
    Ok(expr)
  }

  fn primary(&mut self) -> Result<Expr, QueryError> {
    let offset = self.offset();
    match self.next() {
      Some(Token::Dot) => match self.peek() {
        Some(Token::Ident(_) | Token::Str(_)) => self.field(Expr::Identity),
        Some(Token::LBracket) => {
          self.pos += 1;
          self.bracket(Expr::Identity)
        }
        _ => Ok(Expr::Identity),
      },
      Some(Token::Str(parts)) => self.string(parts),
      Some(Token::Number(n)) => Ok(Expr::Literal(number(n))),
      Some(Token::Variable(name)) if name == "version" => Ok(Expr::Version),
      Some(Token::Variable(name)) => Err(QueryError::parse(offset, format!("unknown variable ${}", name))),
      Some(Token::LParen) => {
        self.nest()?;
        let inner = self.pipe()?;
        self.depth -= 1;
        self.expect(Token::RParen, "')'")?;
        Ok(inner)
      }
      Some(Token::LBracket) => {
        if self.eat(&Token::RBracket) {
          return Ok(Expr::Array(None));
        }
        self.nest()?;
        let inner = self.pipe()?;
        self.depth -= 1;
        self.expect(Token::RBracket, "']'")?;
        Ok(Expr::Array(Some(Box::new(inner))))
      }
      Some(Token::Ident(name)) => self.word(name, offset),
      Some(token) => Err(QueryError::parse(offset, format!("unexpected {:?}", token))),
      None => Err(QueryError::parse(offset, "unexpected end of query")),
    }
  }

  fn word(&mut self, name: String, offset: usize) -> Result<Expr, QueryError> {
    match name.as_str() {
      "true" => return Ok(Expr::Literal(Value::Bool(true))),
      "false" => return Ok(Expr::Literal(Value::Bool(false))),
      "null" => return Ok(Expr::Literal(Value::Null)),
      _ => {}
    }

    let mut args = Vec::new();
    if self.eat(&Token::LParen) {
      self.nest()?;
      loop {
        args.push(self.pipe()?);
        if self.eat(&Token::Semicolon) {
          continue;
        }
        self.expect(Token::RParen, "')' or ';'")?;
        break;
      }
      self.depth -= 1;
    }
    let func = Func::resolve(&name, args.len()).ok_or_else(|| {
      QueryError::parse(offset, format!("unknown function {}/{}", name, args.len()))
    })?;
    Ok(Expr::Call(func, args))
  }

  fn string(&mut self, parts: Vec<RawPart>) -> Result<Expr, QueryError> {
    let mut out = Vec::with_capacity(parts.len());
    for part in parts {
      match part {
        RawPart::Lit(text) => out.push(StrPart::Lit(text)),
        RawPart::Interp { source, offset } => {
          out.push(StrPart::Interp(parse_at(&source, self.base + offset, self.depth + 1)?))
        }
      }
    }
    Ok(match out.as_slice() {
      [] => Expr::Literal(Value::String(String::new())),
      [StrPart::Lit(text)] => Expr::Literal(Value::String(text.clone())),
      _ => Expr::Str(out),
    })
  }
}

fn literal_only(parts: Vec<RawPart>, offset: usize) -> Result<String, QueryError> {
  let mut out = String::new();
  for part in parts {
    match part {
      RawPart::Lit(text) => out.push_str(&text),
      RawPart::Interp { .. } => return Err(QueryError::parse(offset, "interpolation is not allowed in field names")),
    }
  }
  Ok(out)
}

fn number(n: f64) -> Value {
  if n.fract() == 0.0 && n.abs() < i64::MAX as f64 {
    Value::from(n as i64)
  } else {
    serde_json::Number::from_f64(n).map(Value::Number).unwrap_or(Value::Null)
  }
}
