//! Explicit re-pinning of archive sources to newer upstream releases.
//!
//! The checker only proposes URLs. Re-pinning is the separate step that
//! downloads each proposed URL, hashes what actually arrived and produces an
//! updated manifest value with the new URL and checksum. The input manifest is
//! never modified; callers decide whether to write the result anywhere.

use serde::Serialize;
use thiserror::Error;
use tracing::{info, warn};

use crate::checker::{CheckOutcome, CheckReport};
use crate::manifest::{Manifest, Module, Source};
use crate::source::{Fetcher, SourceError};
use crate::util::hash::Checksum;

#[derive(Debug, Error)]
pub enum RepinError {
  #[error("module '{module}' not found in manifest")]
  ModuleNotFound { module: String },

  #[error("module '{module}' source {source_index} is not an archive source")]
  NotArchive { module: String, source_index: usize },

  #[error("failed to fetch replacement for module '{module}': {error}")]
  Fetch {
    module: String,
    #[source]
    error: SourceError,
  },
}

/// One re-pinned source.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct RepinChange {
  pub module: String,
  pub source_index: usize,
  pub version: String,
  pub old_url: String,
  pub new_url: String,
  pub old_checksum: String,
  pub new_checksum: String,
}

/// A newer candidate that could not be re-pinned automatically.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct RepinSkip {
  pub module: String,
  pub source_index: usize,
  pub reason: String,
}

#[derive(Debug, Clone)]
pub struct Repinned {
  pub manifest: Manifest,
  pub changes: Vec<RepinChange>,
  pub skipped: Vec<RepinSkip>,
}

/// Fetch and hash every newer candidate in `report` and return the re-pinned manifest.
///
/// The replacement keeps the source's digest algorithm. Any fetch failure aborts the whole re-pin.
pub async fn repin(manifest: &Manifest, report: &CheckReport, fetcher: &Fetcher) -> Result<Repinned, RepinError> {
  let mut updated = manifest.clone();
  let mut changes = Vec::new();
  let mut skipped = Vec::new();

  for result in report.newer() {
    let CheckOutcome::Newer { candidate, url } = &result.outcome else {
      continue;
    };
    let Some(new_url) = url else {
      warn!(module = %result.module, candidate = %candidate, "no replacement URL, skipping");
      skipped.push(RepinSkip {
        module: result.module.clone(),
        source_index: result.source_index,
        reason: format!("no url-template to build a URL for {}", candidate),
      });
      continue;
    };

    let module = find_module_mut(&mut updated.modules, &result.module).ok_or_else(|| RepinError::ModuleNotFound {
      module: result.module.clone(),
    })?;
    let Some(Source::Archive(archive)) = module.sources.get_mut(result.source_index) else {
      return Err(RepinError::NotArchive {
        module: result.module.clone(),
        source_index: result.source_index,
      });
    };

    info!(module = %result.module, url = %new_url, "fetching replacement source");
    let algorithm = archive.checksum.algorithm;
    let hash = fetcher
      .fetch_and_hash(new_url, algorithm)
      .await
      .map_err(|error| RepinError::Fetch {
        module: result.module.clone(),
        error,
      })?;
    let new_checksum = Checksum {
      algorithm,
      hex: hash.0,
    };

    changes.push(RepinChange {
      module: result.module.clone(),
      source_index: result.source_index,
      version: candidate.clone(),
      old_url: std::mem::replace(&mut archive.url, new_url.clone()),
      new_url: new_url.clone(),
      old_checksum: archive.checksum.to_string(),
      new_checksum: new_checksum.to_string(),
    });
    archive.checksum = new_checksum;
  }

  Ok(Repinned {
    manifest: updated,
    changes,
    skipped,
  })
}

fn find_module_mut<'a>(modules: &'a mut [Module], name: &str) -> Option<&'a mut Module> {
  for module in modules.iter_mut() {
    if module.name == name {
      return Some(module);
    }
    if let Some(found) = find_module_mut(&mut module.modules, name) {
      return Some(found);
    }
  }
  None
}
