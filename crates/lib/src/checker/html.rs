//! `html` checkers: a regex over the page body.

use regex::Regex;

use super::CheckError;
use crate::consts::VERSION_PLACEHOLDER;

/// Find the candidate version in `body`.
///
/// The named group `version` is used when the pattern has one, otherwise
/// capture group 1, otherwise the whole match. The first match in the page wins.
pub fn extract_version(body: &str, pattern: &str) -> Result<String, CheckError> {
  let re = Regex::new(pattern).map_err(|e| CheckError::InvalidPattern {
    pattern: pattern.to_string(),
    message: e.to_string(),
  })?;

  let captures = re.captures(body).ok_or_else(|| CheckError::NoMatch {
    what: format!("version pattern '{}'", pattern),
  })?;
  let version = captures
    .name("version")
    .or_else(|| captures.get(1))
    .or_else(|| captures.get(0))
    .map(|m| m.as_str().trim().to_string())
    .unwrap_or_default();

  if version.is_empty() {
    return Err(CheckError::NoMatch {
      what: format!("version pattern '{}'", pattern),
    });
  }
  Ok(version)
}

/// Substitute the version into a `url-template`.
pub fn render_template(template: &str, version: &str) -> String {
  template.replace(VERSION_PLACEHOLDER, version)
}

/// Decode an untrusted page body.
pub fn decode_body(url: &str, body: Vec<u8>) -> Result<String, CheckError> {
  String::from_utf8(body).map_err(|e| CheckError::InvalidResponse {
    url: url.to_string(),
    message: format!("body is not UTF-8: {}", e.utf8_error()),
  })
}
