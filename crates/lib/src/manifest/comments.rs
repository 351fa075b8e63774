//! Comment stripping for JSON manifests.
//!
//! Manifests may carry `// line` and `/* block */` comments. They are removed
//! before structural parsing; string literals are left untouched, including
//! escaped quotes and URL-like `//` sequences inside them. Newlines inside
//! removed comments are preserved so parser line numbers stay accurate.

/// Remove comments from JSON text.
pub fn strip_comments(input: &str) -> String {
  let mut out = String::with_capacity(input.len());
  let mut chars = input.chars().peekable();
  let mut in_string = false;

  while let Some(c) = chars.next() {
    if in_string {
      out.push(c);
      match c {
        '\\' => {
          if let Some(escaped) = chars.next() {
            out.push(escaped);
          }
        }
        '"' => in_string = false,
        _ => {}
      }
      continue;
    }

    match (c, chars.peek()) {
      ('"', _) => {
        in_string = true;
        out.push(c);
      }
      ('/', Some('/')) => {
        for next in chars.by_ref() {
          if next == '\n' {
            out.push('\n');
            break;
          }
        }
      }
      ('/', Some('*')) => {
        chars.next();
        let mut prev = '\0';
        for next in chars.by_ref() {
          if prev == '*' && next == '/' {
            break;
          }
          if next == '\n' {
            out.push('\n');
          }
          prev = next;
        }
      }
      _ => out.push(c),
    }
  }

  out
}
