//! Source application.
//!
//! A module's sources are applied strictly in declaration order inside its
//! working directory: later shell fixups and patches operate on the tree the
//! earlier sources left behind. The first failure stops the module and is
//! reported together with the index of the failing source. Fetches are never
//! retried here.

pub mod archive;
pub mod extract;
pub mod file;
pub mod git;
pub mod patch;
pub mod shell;

use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::info;

pub use archive::{Fetcher, url_to_filename};
pub use extract::{ArchiveFormat, ExtractError, extract_archive};
pub use git::GitError;

use crate::build::{BuildContext, CmdError, CommandRunner};
use crate::manifest::{Module, Source};
use crate::util::hash::{Checksum, ContentHash};

#[derive(Debug, Error)]
pub enum SourceError {
  #[error("failed to fetch '{url}': {message}")]
  Fetch { url: String, message: String },

  #[error("checksum mismatch for '{url}': expected {expected}, computed {}:{actual}", expected.algorithm)]
  Integrity {
    url: String,
    expected: Checksum,
    actual: ContentHash,
  },

  #[error(transparent)]
  Git(#[from] GitError),

  #[error("failed to extract archive: {0}")]
  Extract(#[from] ExtractError),

  #[error("failed to apply patch '{}': {details}", path.display())]
  Patch { path: PathBuf, details: String },

  #[error(transparent)]
  Command(#[from] CmdError),

  #[error("I/O error: {0}")]
  Io(#[from] std::io::Error),
}

/// A source failed; `index` is its position in the module's `sources`.
#[derive(Debug, Error)]
#[error("source {index} ({kind}) failed: {error}")]
pub struct SourceFailure {
  pub index: usize,
  pub kind: &'static str,
  #[source]
  pub error: SourceError,
}

/// Apply every source of `module` into its build context, in order.
///
/// `base_dir` is the manifest directory that relative paths resolve against.
pub async fn apply_sources(
  module: &Module,
  ctx: &BuildContext,
  fetcher: &Fetcher,
  runner: &CommandRunner,
  base_dir: &Path,
) -> Result<(), SourceFailure> {
  for (index, source) in module.sources.iter().enumerate() {
    info!(
      module = %module.name,
      index,
      kind = source.kind(),
      source = %source.describe(),
      "applying source"
    );
    apply_source(source, ctx, fetcher, runner, base_dir)
      .await
      .map_err(|error| SourceFailure {
        index,
        kind: source.kind(),
        error,
      })?;
  }
  Ok(())
}

async fn apply_source(
  source: &Source,
  ctx: &BuildContext,
  fetcher: &Fetcher,
  runner: &CommandRunner,
  base_dir: &Path,
) -> Result<(), SourceError> {
  match source {
    Source::Archive(s) => archive::apply_archive(s, ctx, fetcher).await,
    Source::Git(s) => git::apply_git(s, ctx, fetcher, runner, base_dir).await,
    Source::Shell(s) => shell::apply_shell(s, ctx, runner).await,
    Source::Patch(s) => patch::apply_patch(s, ctx, runner, base_dir).await,
    Source::File(s) => file::apply_file(s, ctx, fetcher, base_dir).await,
  }
}
