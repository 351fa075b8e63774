//! Query tokenizer.

use super::QueryError;

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
  Dot,
  Ident(String),
  /// String literal split into literal text and raw `\(...)` sources.
  Str(Vec<RawPart>),
  Number(f64),
  Variable(String),
  LBracket,
  RBracket,
  LParen,
  RParen,
  Pipe,
  Semicolon,
  Plus,
  EqEq,
  NotEq,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RawPart {
  Lit(String),
  Interp { source: String, offset: usize },
}

/// A token and its byte offset in the source.
pub type Spanned = (Token, usize);

pub fn tokenize(src: &str) -> Result<Vec<Spanned>, QueryError> {
  let bytes = src.as_bytes();
  let mut tokens = Vec::new();
  let mut i = 0;

  while i < bytes.len() {
    let c = bytes[i];
    let start = i;
    match c {
      b' ' | b'\t' | b'\n' | b'\r' => {
        i += 1;
        continue;
      }
      b'.' => {
        tokens.push((Token::Dot, start));
        i += 1;
      }
      b'[' => {
        tokens.push((Token::LBracket, start));
        i += 1;
      }
      b']' => {
        tokens.push((Token::RBracket, start));
        i += 1;
      }
      b'(' => {
        tokens.push((Token::LParen, start));
        i += 1;
      }
      b')' => {
        tokens.push((Token::RParen, start));
        i += 1;
      }
      b'|' => {
        tokens.push((Token::Pipe, start));
        i += 1;
      }
      b';' => {
        tokens.push((Token::Semicolon, start));
        i += 1;
      }
      b'+' => {
        tokens.push((Token::Plus, start));
        i += 1;
      }
      b'=' if bytes.get(i + 1) == Some(&b'=') => {
        tokens.push((Token::EqEq, start));
        i += 2;
      }
      b'!' if bytes.get(i + 1) == Some(&b'=') => {
        tokens.push((Token::NotEq, start));
        i += 2;
      }
      b'"' => {
        let (parts, end) = lex_string(src, i)?;
        tokens.push((Token::Str(parts), start));
        i = end;
      }
      b'$' => {
        i += 1;
        let end = ident_end(bytes, i);
        if end == i {
          return Err(QueryError::parse(start, "expected variable name after '$'"));
        }
        tokens.push((Token::Variable(src[i..end].to_string()), start));
        i = end;
      }
      b'-' | b'0'..=b'9' => {
        let mut end = i + 1;
        while end < bytes.len() && (bytes[end].is_ascii_digit() || bytes[end] == b'.') {
          end += 1;
        }
        let text = &src[i..end];
        let value = text
          .parse::<f64>()
          .map_err(|_| QueryError::parse(start, format!("invalid number '{}'", text)))?;
        tokens.push((Token::Number(value), start));
        i = end;
      }
      c if c.is_ascii_alphabetic() || c == b'_' => {
        let end = ident_end(bytes, i);
        tokens.push((Token::Ident(src[i..end].to_string()), start));
        i = end;
      }
      _ => {
        let ch = src[i..].chars().next().unwrap_or('?');
        return Err(QueryError::parse(start, format!("unexpected character '{}'", ch)));
      }
    }
  }

  Ok(tokens)
}

fn ident_end(bytes: &[u8], mut i: usize) -> usize {
  while i < bytes.len() && (bytes[i].is_ascii_alphanumeric() || bytes[i] == b'_') {
    i += 1;
  }
  i
}

/// Lex a string literal starting at the opening quote; returns parts and the offset past the closing quote.
fn lex_string(src: &str, open: usize) -> Result<(Vec<RawPart>, usize), QueryError> {
  let mut parts = Vec::new();
  let mut lit = String::new();
  let mut chars = src[open + 1..].char_indices().map(|(k, c)| (k + open + 1, c)).peekable();

  while let Some((pos, c)) = chars.next() {
    match c {
      '"' => {
        if !lit.is_empty() {
          parts.push(RawPart::Lit(lit));
        }
        return Ok((parts, pos + 1));
      }
      '\\' => {
        let Some((esc_pos, esc)) = chars.next() else {
          break;
        };
        match esc {
          '"' => lit.push('"'),
          '\\' => lit.push('\\'),
          '/' => lit.push('/'),
          'n' => lit.push('\n'),
          't' => lit.push('\t'),
          'r' => lit.push('\r'),
          '(' => {
            if !lit.is_empty() {
              parts.push(RawPart::Lit(std::mem::take(&mut lit)));
            }
            let body_start = esc_pos + 1;
            let mut depth = 1;
            let mut in_str = false;
            let mut end = None;
            while let Some((p, ch)) = chars.next() {
              match ch {
                '\\' if in_str => {
                  chars.next();
                }
                '"' => in_str = !in_str,
                '(' if !in_str => depth += 1,
                ')' if !in_str => {
                  depth -= 1;
                  if depth == 0 {
                    end = Some(p);
                    break;
                  }
                }
                _ => {}
              }
            }
            let end = end.ok_or_else(|| QueryError::parse(esc_pos, "unterminated interpolation"))?;
            parts.push(RawPart::Interp {
              source: src[body_start..end].to_string(),
              offset: body_start,
            });
          }
          other => return Err(QueryError::parse(esc_pos, format!("invalid escape '\\{}'", other))),
        }
      }
      _ => lit.push(c),
    }
  }

  Err(QueryError::parse(open, "unterminated string"))
}

#[cfg(test)]
mod tests {
  use super::*;

  fn kinds(src: &str) -> Vec<Token> {
    tokenize(src).unwrap().into_iter().map(|(t, _)| t).collect()
  }

  #[test]
  fn tokenizes_paths_and_operators() {
    assert_eq!(
      kinds(".assets[0] | .name == \"x\""),
      vec![
        Token::Dot,
        Token::Ident("assets".to_string()),
        Token::LBracket,
        Token::Number(0.0),
        Token::RBracket,
        Token::Pipe,
        Token::Dot,
        Token::Ident("name".to_string()),
        Token::EqEq,
        Token::Str(vec![RawPart::Lit("x".to_string())]),
      ]
    );
  }

  #[test]
  fn tokenizes_variables() {
    assert_eq!(kinds("$version"), vec![Token::Variable("version".to_string())]);
  }

  #[test]
  fn string_interpolation_keeps_nested_source() {
    let tokens = kinds(r#""v\($version | ltrimstr("(")).tar""#);
    let Token::Str(parts) = &tokens[0] else {
      panic!("expected string token");
    };
    assert_eq!(parts[0], RawPart::Lit("v".to_string()));
    assert!(matches!(&parts[1], RawPart::Interp { source, .. } if source == r#"$version | ltrimstr("(")"#));
    assert_eq!(parts[2], RawPart::Lit(".tar".to_string()));
  }

  #[test]
  fn reports_position_of_bad_character() {
    assert_eq!(tokenize(".a & .b").unwrap_err(), QueryError::parse(3, "unexpected character '&'"));
  }

  #[test]
  fn unterminated_string_is_error() {
    assert!(tokenize("\"abc").is_err());
  }
}
