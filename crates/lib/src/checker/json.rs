//! `json` checkers: queries over a parsed JSON document.

use serde_json::Value;

use super::CheckError;
use super::query::Query;

/// Parse an untrusted endpoint body. Anything but a JSON document is rejected before a query sees it.
pub fn parse_body(url: &str, body: &[u8]) -> Result<Value, CheckError> {
  serde_json::from_slice(body).map_err(|e| CheckError::InvalidResponse {
    url: url.to_string(),
    message: format!("body is not JSON: {}", e),
  })
}

/// Evaluate `version-query` to the candidate version.
pub fn evaluate_version(document: &Value, version_query: &str) -> Result<String, CheckError> {
  Ok(Query::parse(version_query)?.eval_string(document, None)?)
}

/// Evaluate `url-query` with `$version` bound to the candidate.
pub fn evaluate_url(document: &Value, url_query: &str, version: &str) -> Result<String, CheckError> {
  Ok(Query::parse(url_query)?.eval_string(document, Some(version))?)
}
