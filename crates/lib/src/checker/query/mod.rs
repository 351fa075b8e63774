//! A small, closed subset of jq used by version checkers.
//!
//! Supported: paths (`.a.b`, `.[0]`, `.[]`), pipes, `==`/`!=`, `and`/`or`,
//! `+`, array construction, string interpolation, `$version` and the
//! functions listed on [`ast::Func`]. There is no I/O, no environment access
//! and no user-defined functions, so a query can only transform its input.

mod ast;
mod eval;
mod lexer;
mod parser;

use serde_json::Value;
use thiserror::Error;

pub use eval::Env;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum QueryError {
  #[error("parse error at offset {pos}: {message}")]
  Parse { pos: usize, message: String },

  #[error("{0}")]
  Eval(String),
}

impl QueryError {
  pub(crate) fn parse(pos: usize, message: impl Into<String>) -> Self {
    Self::Parse {
      pos,
      message: message.into(),
    }
  }

  pub(crate) fn eval(message: impl Into<String>) -> Self {
    Self::Eval(message.into())
  }

  /// Move a parse position by `base` bytes; evaluation errors are unchanged.
  pub(crate) fn shifted(self, base: usize) -> Self {
    match self {
      Self::Parse { pos, message } => Self::Parse {
        pos: pos + base,
        message,
      },
      other => other,
    }
  }
}

/// A parsed query, ready to run against any number of documents.
#[derive(Debug, Clone)]
pub struct Query {
  source: String,
  expr: ast::Expr,
}

impl Query {
  pub fn parse(source: &str) -> Result<Self, QueryError> {
    Ok(Self {
      source: source.to_string(),
      expr: parser::parse(source)?,
    })
  }

  pub fn source(&self) -> &str {
    &self.source
  }

  /// Run the query, returning every output.
  pub fn eval(&self, input: &Value, version: Option<&str>) -> Result<Vec<Value>, QueryError> {
    eval::eval(&self.expr, input, &Env { version })
  }

  /// Run the query and require its first output to be a non-empty string.
  ///
  /// Numbers are accepted and rendered the way `tostring` would; `null`, an
  /// empty stream and empty strings count as "no result".
  pub fn eval_string(&self, input: &Value, version: Option<&str>) -> Result<String, QueryError> {
    let outputs = self.eval(input, version)?;
    match outputs.into_iter().next() {
      Some(Value::String(s)) if !s.is_empty() => Ok(s),
      Some(value @ Value::Number(_)) => Ok(eval::to_text(&value)),
      Some(Value::Null) | None => Err(QueryError::eval(format!("query '{}' produced no result", self.source))),
      Some(Value::String(_)) => Err(QueryError::eval(format!("query '{}' produced an empty string", self.source))),
      Some(other) => Err(QueryError::eval(format!(
        "query '{}' produced {} instead of a string",
        self.source, other
      ))),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  fn run(query: &str, input: Value) -> Vec<Value> {
    Query::parse(query).unwrap().eval(&input, None).unwrap()
  }

  fn release_listing() -> Value {
    json!([
      {"tag_name": "v1.3.0-rc1", "prerelease": true, "assets": []},
      {"tag_name": "v1.2.0", "prerelease": false, "assets": [
        {"name": "app-1.2.0-linux-x86_64.tar.gz", "browser_download_url": "https://example.com/1.2.0/x86_64.tar.gz"},
        {"name": "app-1.2.0-linux-aarch64.tar.gz", "browser_download_url": "https://example.com/1.2.0/aarch64.tar.gz"}
      ]},
      {"tag_name": "v1.1.0", "prerelease": false, "assets": []}
    ])
  }

  #[test]
  fn field_access_on_missing_and_null() {
    assert_eq!(run(".a.b", json!({})), vec![Value::Null]);
    assert_eq!(run(".a", Value::Null), vec![Value::Null]);
    assert!(Query::parse(".a").unwrap().eval(&json!([1]), None).is_err());
  }

  #[test]
  fn negative_and_out_of_range_indexes() {
    assert_eq!(run(".[-1]", json!([1, 2, 3])), vec![json!(3)]);
    assert_eq!(run(".[5]", json!([1, 2, 3])), vec![Value::Null]);
  }

  #[test]
  fn select_first_stable_release() {
    let query = "first(.[] | select(.prerelease == false)) | .tag_name | ltrimstr(\"v\")";
    assert_eq!(run(query, release_listing()), vec![json!("1.2.0")]);
  }

  #[test]
  fn pick_asset_url_by_name() {
    let query = ".[1].assets[] | select(.name | test(\"aarch64\")) | .browser_download_url";
    assert_eq!(
      run(query, release_listing()),
      vec![json!("https://example.com/1.2.0/aarch64.tar.gz")]
    );
  }

  #[test]
  fn map_sort_and_last() {
    let input = json!([{"v": 3}, {"v": 1}, {"v": 2}]);
    assert_eq!(run("sort_by(.v) | map(.v)", input.clone()), vec![json!([1, 2, 3])]);
    assert_eq!(run("sort_by(.v) | last | .v", input.clone()), vec![json!(3)]);
    assert_eq!(run("map(.v) | reverse | first", input.clone()), vec![json!(2)]);
    assert_eq!(run("length", input), vec![json!(3)]);
  }

  #[test]
  fn string_functions() {
    assert_eq!(run("sub(\"^v\"; \"\")", json!("v1.2")), vec![json!("1.2")]);
    assert_eq!(run("gsub(\"_\"; \".\")", json!("1_2_3")), vec![json!("1.2.3")]);
    assert_eq!(
      run("sub(\"release-(\\\\d+)\"; \"$1\")", json!("release-42")),
      vec![json!("42")]
    );
    assert_eq!(run("split(\".\") | join(\"-\")", json!("1.2.3")), vec![json!("1-2-3")]);
    assert_eq!(run("rtrimstr(\".tar.gz\")", json!("app.tar.gz")), vec![json!("app")]);
    assert_eq!(run(".n | tostring", json!({"n": 7})), vec![json!("7")]);
  }

  #[test]
  fn boolean_operators() {
    assert_eq!(run(".a and .b", json!({"a": true, "b": null})), vec![json!(false)]);
    assert_eq!(run(".a or .b", json!({"a": false, "b": 1})), vec![json!(true)]);
    assert_eq!(run(".a | not", json!({"a": null})), vec![json!(true)]);
    assert_eq!(run(".a != \"x\"", json!({"a": "y"})), vec![json!(true)]);
  }

  #[test]
  fn addition_and_arrays() {
    assert_eq!(run(".a + \"-\" + .b", json!({"a": "x", "b": "y"})), vec![json!("x-y")]);
    assert_eq!(run("1 + 2", Value::Null), vec![json!(3)]);
    assert_eq!(run("[.[] | .n]", json!([{"n": 1}, {"n": 2}])), vec![json!([1, 2])]);
    assert_eq!(run("[]", Value::Null), vec![json!([])]);
  }

  #[test]
  fn interpolation_uses_version_binding() {
    let query = Query::parse("\"https://example.com/\\($version)/app-\\($version).zip\"").unwrap();
    assert_eq!(
      query.eval_string(&Value::Null, Some("2.0")).unwrap(),
      "https://example.com/2.0/app-2.0.zip"
    );
    assert!(query.eval_string(&Value::Null, None).is_err());
  }

  #[test]
  fn eval_string_rejects_empty_results() {
    let query = Query::parse(".missing").unwrap();
    assert!(matches!(query.eval_string(&json!({}), None), Err(QueryError::Eval(_))));
    let query = Query::parse(".tag").unwrap();
    assert_eq!(query.eval_string(&json!({"tag": 12}), None).unwrap(), "12");
  }

  #[test]
  fn shifted_only_moves_parse_errors() {
    assert_eq!(QueryError::parse(2, "x").shifted(3), QueryError::parse(5, "x"));
    assert_eq!(QueryError::eval("x").shifted(3), QueryError::eval("x"));
  }
}
