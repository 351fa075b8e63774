//! Fetching checker endpoints with bounded retry.

use std::time::Duration;

use tracing::{debug, warn};

use super::CheckError;

/// Exponential backoff: `initial`, `2 * initial`, `4 * initial`, ... capped at `max`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
  pub initial: Duration,
  pub max: Duration,
}

impl Default for Backoff {
  fn default() -> Self {
    Self {
      initial: Duration::from_millis(500),
      max: Duration::from_secs(10),
    }
  }
}

impl Backoff {
  /// Delay before retry number `attempt` (0-based).
  pub fn delay(&self, attempt: u32) -> Duration {
    let factor = 2u32.saturating_pow(attempt.min(16));
    self.initial.saturating_mul(factor).min(self.max)
  }
}

/// Largest checker response body accepted.
pub const MAX_BODY_BYTES: usize = 8 * 1024 * 1024;

/// Issue one GET and return the body.
///
/// Timeouts, connection failures and 5xx responses are [`CheckError::Transient`];
/// any other non-success status is a plain fetch error.
pub async fn get_once(client: &reqwest::Client, url: &str) -> Result<Vec<u8>, CheckError> {
  get_limited(client, url, MAX_BODY_BYTES).await
}

async fn get_limited(client: &reqwest::Client, url: &str, limit: usize) -> Result<Vec<u8>, CheckError> {
  let mut response = client.get(url).send().await.map_err(|e| classify(url, e))?;
  let status = response.status();
  if status.is_server_error() {
    return Err(CheckError::Transient {
      url: url.to_string(),
      message: format!("HTTP {}", status),
    });
  }
  if !status.is_success() {
    return Err(CheckError::Fetch {
      url: url.to_string(),
      message: format!("HTTP {}", status),
    });
  }
  if response.content_length().is_some_and(|length| length > limit as u64) {
    return Err(too_large(url, limit));
  }

  let mut body = Vec::new();
  while let Some(chunk) = response.chunk().await.map_err(|e| classify(url, e))? {
    if body.len() + chunk.len() > limit {
      return Err(too_large(url, limit));
    }
    body.extend_from_slice(&chunk);
  }
  Ok(body)
}

fn too_large(url: &str, limit: usize) -> CheckError {
  CheckError::InvalidResponse {
    url: url.to_string(),
    message: format!("body exceeds {} bytes", limit),
  }
}

/// GET `url`, retrying transient failures up to `retries` times.
pub async fn get_with_retry(
  client: &reqwest::Client,
  url: &str,
  retries: u32,
  backoff: Backoff,
) -> Result<Vec<u8>, CheckError> {
  let mut attempt = 0;
  loop {
    match get_once(client, url).await {
      Ok(body) => {
        debug!(url, bytes = body.len(), attempt, "fetched checker endpoint");
        return Ok(body);
      }
      Err(err @ CheckError::Transient { .. }) if attempt < retries => {
        let delay = backoff.delay(attempt);
        warn!(url, attempt, delay = %humantime::format_duration(delay), error = %err, "transient fetch failure, retrying");
        tokio::time::sleep(delay).await;
        attempt += 1;
      }
      Err(err) => return Err(err),
    }
  }
}

fn classify(url: &str, err: reqwest::Error) -> CheckError {
  if err.is_timeout() || err.is_connect() || err.is_request() {
    CheckError::Transient {
      url: url.to_string(),
      message: err.to_string(),
    }
  } else {
    CheckError::Fetch {
      url: url.to_string(),
      message: err.to_string(),
    }
  }
}
