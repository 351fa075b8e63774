//! Upstream version checking.
//!
//! Runs out of band, against a loaded manifest, never during a build. Every
//! archive source carrying `x-checker-data` becomes one check task; tasks run
//! concurrently, bounded by [`CheckConfig::jobs`], and each writes only its
//! own result slot. A failed check is reported as `unknown` for that source
//! and does not affect the others.
//!
//! A newer candidate comes with a replacement URL but never a checksum: the
//! pinned checksum stays untouched until an explicit re-pin fetches and
//! hashes the new content.

pub mod html;
pub mod http;
pub mod json;
pub mod query;
pub mod version;

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

pub use http::Backoff;
pub use query::{Query, QueryError};
pub use version::{compare_versions, is_newer, version_from_url};

use crate::error::ErrorKind;
use crate::manifest::{CheckerData, Manifest, Source};
use crate::sequence::declared_modules;
use crate::util::hash::Checksum;

#[derive(Debug, Error)]
pub enum CheckError {
  /// Timeout, connection failure or 5xx; retried before being surfaced.
  #[error("transient failure fetching '{url}': {message}")]
  Transient { url: String, message: String },

  #[error("failed to fetch '{url}': {message}")]
  Fetch { url: String, message: String },

  #[error("invalid response from '{url}': {message}")]
  InvalidResponse { url: String, message: String },

  #[error("invalid version pattern '{pattern}': {message}")]
  InvalidPattern { pattern: String, message: String },

  #[error("no match for {what}")]
  NoMatch { what: String },

  #[error("cannot determine the current version from '{url}'")]
  NoCurrentVersion { url: String },

  #[error("query failed: {0}")]
  Query(#[from] QueryError),
}

/// Settings for a check run.
#[derive(Debug, Clone)]
pub struct CheckConfig {
  /// Maximum number of concurrent checks.
  pub jobs: usize,
  /// Retries after the first attempt, for transient failures only.
  pub retries: u32,
  pub timeout: Duration,
  pub backoff: Backoff,
}

impl Default for CheckConfig {
  fn default() -> Self {
    Self {
      jobs: 4,
      retries: 3,
      timeout: Duration::from_secs(30),
      backoff: Backoff::default(),
    }
  }
}

/// What a check found for one source.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "kebab-case")]
pub enum CheckOutcome {
  /// The candidate sorts strictly after the pinned version.
  Newer {
    candidate: String,
    /// Replacement URL; absent for html checkers without a `url-template`.
    url: Option<String>,
  },
  UpToDate { candidate: String },
  Unknown { kind: ErrorKind, reason: String },
}

impl CheckOutcome {
  pub fn is_newer(&self) -> bool {
    matches!(self, Self::Newer { .. })
  }

  pub fn candidate(&self) -> Option<&str> {
    match self {
      Self::Newer { candidate, .. } | Self::UpToDate { candidate } => Some(candidate),
      Self::Unknown { .. } => None,
    }
  }
}

/// Result for one checked source.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct CheckResult {
  pub module: String,
  pub source_index: usize,
  pub current_url: String,
  pub current_version: Option<String>,
  #[serde(flatten)]
  pub outcome: CheckOutcome,
}

/// Results of a check run, in manifest order.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CheckReport {
  pub results: Vec<CheckResult>,
}

impl CheckReport {
  pub fn newer(&self) -> impl Iterator<Item = &CheckResult> {
    self.results.iter().filter(|r| r.outcome.is_newer())
  }

  pub fn unknown_count(&self) -> usize {
    self
      .results
      .iter()
      .filter(|r| matches!(r.outcome, CheckOutcome::Unknown { .. }))
      .count()
  }
}

/// One archive source with checker data.
#[derive(Debug, Clone)]
struct CheckTarget {
  module: String,
  source_index: usize,
  url: String,
  checksum: Checksum,
  checker: CheckerData,
}

fn targets(manifest: &Manifest) -> Vec<CheckTarget> {
  let mut out = Vec::new();
  for module in declared_modules(manifest) {
    for (source_index, source) in module.sources.iter().enumerate() {
      if let Source::Archive(archive) = source
        && let Some(checker) = &archive.checker
      {
        out.push(CheckTarget {
          module: module.name.clone(),
          source_index,
          url: archive.url.clone(),
          checksum: archive.checksum.clone(),
          checker: checker.clone(),
        });
      }
    }
  }
  out
}

/// Check every archive source that declares `x-checker-data`.
pub async fn check_updates(manifest: &Manifest, config: &CheckConfig) -> Result<CheckReport, CheckError> {
  let client = reqwest::Client::builder()
    .timeout(config.timeout)
    .user_agent(concat!("flatbuild/", env!("CARGO_PKG_VERSION")))
    .build()
    .map_err(|e| CheckError::Fetch {
      url: String::new(),
      message: format!("failed to create HTTP client: {}", e),
    })?;

  let targets = targets(manifest);
  info!(count = targets.len(), jobs = config.jobs, "checking for upstream updates");

  let semaphore = Arc::new(Semaphore::new(config.jobs.max(1)));
  let mut handles = Vec::with_capacity(targets.len());
  for target in &targets {
    let semaphore = Arc::clone(&semaphore);
    let client = client.clone();
    let config = config.clone();
    let target = target.clone();
    handles.push(tokio::spawn(async move {
      let _permit = semaphore.acquire_owned().await.map_err(|e| CheckError::Fetch {
        url: target.checker.url().to_string(),
        message: e.to_string(),
      })?;
      check_one(&client, &target, &config).await
    }));
  }

  let mut results = Vec::with_capacity(targets.len());
  for (target, handle) in targets.into_iter().zip(handles) {
    let outcome = match handle.await {
      Ok(Ok(outcome)) => outcome,
      Ok(Err(err)) => {
        warn!(module = %target.module, source = target.source_index, error = %err, "check failed");
        CheckOutcome::Unknown {
          kind: err.kind(),
          reason: err.to_string(),
        }
      }
      Err(join) => CheckOutcome::Unknown {
        kind: ErrorKind::IoError,
        reason: format!("check task failed: {}", join),
      },
    };
    debug!(module = %target.module, source = target.source_index, outcome = ?outcome, "check finished");
    results.push(CheckResult {
      current_version: version_from_url(&target.url),
      module: target.module,
      source_index: target.source_index,
      current_url: target.url,
      outcome,
    });
  }

  Ok(CheckReport { results })
}

async fn check_one(client: &reqwest::Client, target: &CheckTarget, config: &CheckConfig) -> Result<CheckOutcome, CheckError> {
  let current = version_from_url(&target.url).ok_or_else(|| CheckError::NoCurrentVersion {
    url: target.url.clone(),
  })?;
  let endpoint = target.checker.url();
  let body = http::get_with_retry(client, endpoint, config.retries, config.backoff).await?;

  match &target.checker {
    CheckerData::Html {
      version_pattern,
      url_template,
      ..
    } => {
      let text = html::decode_body(endpoint, body)?;
      let candidate = html::extract_version(&text, version_pattern)?;
      if !is_newer(&candidate, &current) {
        return Ok(CheckOutcome::UpToDate { candidate });
      }
      let url = url_template.as_deref().map(|t| html::render_template(t, &candidate));
      Ok(CheckOutcome::Newer { candidate, url })
    }
    CheckerData::Json {
      version_query,
      url_query,
      ..
    } => {
      let document = json::parse_body(endpoint, &body)?;
      let candidate = json::evaluate_version(&document, version_query)?;
      if !is_newer(&candidate, &current) {
        return Ok(CheckOutcome::UpToDate { candidate });
      }
      let url = json::evaluate_url(&document, url_query, &candidate)?;
      info!(module = %target.module, current = %current, candidate = %candidate, checksum = %target.checksum, "newer version available");
      Ok(CheckOutcome::Newer {
        candidate,
        url: Some(url),
      })
    }
  }
}
