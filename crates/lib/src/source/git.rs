//! Git sources.
//!
//! Remote repositories are mirrored into the git cache with gix (clone on
//! first use, fetch afterwards) and the pinned reference is resolved to a
//! commit there. The commit's tree is then exported with `git archive` and
//! unpacked into the module tree, so the working tree never carries a `.git`
//! directory and the cache is only read.
//!
//! A local `path` without a pinned reference is copied verbatim.

use std::fs;
use std::path::{Path, PathBuf};

use gix::remote::Direction;
use thiserror::Error;
use tracing::{debug, info};

use super::SourceError;
use super::archive::{Fetcher, url_to_filename};
use super::extract::extract_archive;
use crate::build::{BuildContext, CommandRunner, Invocation};
use crate::manifest::{GitSource, Location};
use crate::util::hash::{DigestAlgorithm, hash_bytes};

#[derive(Debug, Error)]
pub enum GitError {
  #[error("failed to create cache directory '{0}': {1}")]
  CreateCacheDir(PathBuf, #[source] std::io::Error),

  #[error("failed to clone repository '{url}': {source}")]
  Clone {
    url: String,
    #[source]
    source: Box<dyn std::error::Error + Send + Sync>,
  },

  #[error("failed to open repository at '{path}': {source}")]
  Open {
    path: PathBuf,
    #[source]
    source: Box<gix::open::Error>,
  },

  #[error("failed to fetch from '{url}': {source}")]
  Fetch {
    url: String,
    #[source]
    source: Box<dyn std::error::Error + Send + Sync>,
  },

  #[error("no remote configured for repository")]
  NoRemote,

  #[error("revision '{rev}' not found in repository")]
  RevisionNotFound { rev: String },

  #[error("failed to resolve HEAD: {0}")]
  ResolveHead(String),

  #[error("path does not exist: {0}")]
  PathNotFound(PathBuf),
}

/// What a pinned reference names; branches are looked up on the remote first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RefKind {
  Commit,
  Tag,
  Branch,
}

/// Apply a git source into the module tree.
pub async fn apply_git(
  source: &GitSource,
  ctx: &BuildContext,
  fetcher: &Fetcher,
  runner: &CommandRunner,
  base_dir: &Path,
) -> Result<(), SourceError> {
  let dest = ctx.source_dir(source.dest.as_deref());
  let pinned = pinned(source);

  let repo_dir = match &source.location {
    Location::Path(path) => {
      let path = base_dir.join(path);
      if !path.exists() {
        return Err(GitError::PathNotFound(path).into());
      }
      if pinned.is_none() {
        info!(path = %path.display(), "copying local tree");
        let dest = dest.clone();
        tokio::task::spawn_blocking(move || copy_tree(&path, &dest))
          .await
          .map_err(|e| std::io::Error::other(e.to_string()))??;
        return Ok(());
      }
      path
    }
    Location::Url(url) => {
      let url = url.clone();
      let mirror = fetcher.git_cache_dir().join(cache_key(&url));
      tokio::task::spawn_blocking(move || mirror_repo(&url, &mirror).map(|_| mirror))
        .await
        .map_err(|e| std::io::Error::other(e.to_string()))??
    }
  };

  let lookup_dir = repo_dir.clone();
  let (git_dir, commit) = tokio::task::spawn_blocking(move || {
    let repo = open_repo(&lookup_dir)?;
    let commit = resolve_revision(&repo, pinned)?;
    Ok::<_, GitError>((repo.git_dir().to_path_buf(), commit))
  })
  .await
  .map_err(|e| std::io::Error::other(e.to_string()))??;
  info!(repo = %source.location, commit = %commit, "resolved git source");

  export_commit(&git_dir, &commit, &dest, ctx, runner).await
}

fn pinned(source: &GitSource) -> Option<(RefKind, String)> {
  if let Some(commit) = &source.commit {
    Some((RefKind::Commit, commit.clone()))
  } else if let Some(tag) = &source.tag {
    Some((RefKind::Tag, tag.clone()))
  } else {
    source.branch.as_ref().map(|b| (RefKind::Branch, b.clone()))
  }
}

/// Cache directory name for a remote: readable stem plus a digest of the full URL.
fn cache_key(url: &str) -> String {
  let stem = url_to_filename(url);
  let stem = stem.trim_end_matches(".git");
  let digest = hash_bytes(url.as_bytes(), DigestAlgorithm::Sha256);
  format!("{}-{}", stem, &digest.0[..12])
}

/// Clone or update the cached mirror of `url`.
fn mirror_repo(url: &str, mirror: &Path) -> Result<(), GitError> {
  if let Some(parent) = mirror.parent() {
    fs::create_dir_all(parent).map_err(|e| GitError::CreateCacheDir(parent.to_path_buf(), e))?;
  }

  if mirror.join(".git").exists() {
    debug!(url, path = %mirror.display(), "updating cached repository");
    let repo = open_repo(mirror)?;
    fetch_updates(&repo, url)
  } else {
    if mirror.exists() {
      fs::remove_dir_all(mirror).map_err(|e| GitError::CreateCacheDir(mirror.to_path_buf(), e))?;
    }
    info!(url, path = %mirror.display(), "cloning repository");
    clone_repo(url, mirror)
  }
}

/// Committer used for mirror ref updates when the host has no git identity.
const COMMITTER_FALLBACK: [&str; 2] = [
  "gitoxide.committer.nameFallback=flatbuild",
  "gitoxide.committer.emailFallback=flatbuild@localhost",
];

fn open_options() -> gix::open::Options {
  gix::open::Options::default().config_overrides(COMMITTER_FALLBACK)
}

fn open_repo(path: &Path) -> Result<gix::Repository, GitError> {
  gix::open_opts(path, open_options()).map_err(|e| GitError::Open {
    path: path.to_path_buf(),
    source: Box::new(e),
  })
}

fn clone_repo(url: &str, dest: &Path) -> Result<(), GitError> {
  let clone_err = |e: Box<dyn std::error::Error + Send + Sync>| GitError::Clone {
    url: url.to_string(),
    source: e,
  };
  let mut prepared = gix::clone::PrepareFetch::new(
    url,
    dest,
    gix::create::Kind::WithWorktree,
    gix::create::Options::default(),
    open_options(),
  )
  .map_err(|e| clone_err(Box::new(e)))?;
  let (mut checkout, _outcome) = prepared
    .fetch_then_checkout(gix::progress::Discard, &gix::interrupt::IS_INTERRUPTED)
    .map_err(|e| clone_err(Box::new(e)))?;
  checkout
    .main_worktree(gix::progress::Discard, &gix::interrupt::IS_INTERRUPTED)
    .map_err(|e| clone_err(Box::new(e)))?;
  Ok(())
}

fn fetch_updates(repo: &gix::Repository, url: &str) -> Result<(), GitError> {
  let fetch_err = |e: Box<dyn std::error::Error + Send + Sync>| GitError::Fetch {
    url: url.to_string(),
    source: e,
  };
  let remote = repo
    .find_default_remote(Direction::Fetch)
    .ok_or(GitError::NoRemote)?
    .map_err(|e| fetch_err(Box::new(e)))?;
  remote
    .connect(Direction::Fetch)
    .map_err(|e| fetch_err(Box::new(e)))?
    .prepare_fetch(gix::progress::Discard, Default::default())
    .map_err(|e| fetch_err(Box::new(e)))?
    .receive(gix::progress::Discard, &gix::interrupt::IS_INTERRUPTED)
    .map_err(|e| fetch_err(Box::new(e)))?;
  Ok(())
}

/// Resolve a pinned reference to a commit hash; `None` means the default branch tip.
fn resolve_revision(repo: &gix::Repository, pinned: Option<(RefKind, String)>) -> Result<String, GitError> {
  let Some((kind, rev)) = pinned else {
    return resolve_default_branch(repo);
  };

  let candidates = match kind {
    RefKind::Commit => vec![rev.clone()],
    RefKind::Tag => vec![format!("refs/tags/{}", rev), rev.clone()],
    RefKind::Branch => vec![format!("refs/remotes/origin/{}", rev), format!("refs/heads/{}", rev)],
  };

  for candidate in &candidates {
    let spec = format!("{}^{{commit}}", candidate);
    if let Ok(id) = repo.rev_parse_single(spec.as_str()) {
      return Ok(id.to_string());
    }
  }
  Err(GitError::RevisionNotFound { rev })
}

/// Tip of the remote-tracking branch behind the local HEAD.
///
/// Fetches move `refs/remotes/origin/*` but never the mirror's own HEAD, so the
/// local HEAD is only used when no remote-tracking ref exists.
fn resolve_default_branch(repo: &gix::Repository) -> Result<String, GitError> {
  let mut head = repo.head().map_err(|e| GitError::ResolveHead(e.to_string()))?;
  let branch = head.referent_name().map(|name| name.shorten().to_string());

  let candidates = branch
    .iter()
    .map(|b| format!("refs/remotes/origin/{}", b))
    .chain(std::iter::once("refs/remotes/origin/HEAD".to_string()));
  for candidate in candidates {
    let spec = format!("{}^{{commit}}", candidate);
    if let Ok(id) = repo.rev_parse_single(spec.as_str()) {
      debug!(reference = %candidate, "resolved default branch");
      return Ok(id.to_string());
    }
  }

  let commit = head.peel_to_commit().map_err(|e| GitError::ResolveHead(e.to_string()))?;
  Ok(commit.id.to_string())
}

/// Export `commit` from `git_dir` into `dest` through a tar stream.
async fn export_commit(
  git_dir: &Path,
  commit: &str,
  dest: &Path,
  ctx: &BuildContext,
  runner: &CommandRunner,
) -> Result<(), SourceError> {
  let tarball = tempfile::Builder::new()
    .prefix("git-export-")
    .suffix(".tar")
    .tempfile_in(ctx.work_dir().join(".tmp"))?;
  let output = tarball.path().display().to_string();

  runner
    .run(
      ctx,
      ctx.work_dir(),
      &Invocation::argv([
        "git".to_string(),
        format!("--git-dir={}", git_dir.display()),
        "archive".to_string(),
        "--format=tar".to_string(),
        format!("--output={}", output),
        commit.to_string(),
      ]),
    )
    .await
    .map_err(|e| SourceError::Fetch {
      url: git_dir.display().to_string(),
      message: format!("git archive failed: {}", e.diagnostics()),
    })?;

  let archive = tarball.path().to_path_buf();
  let dest = dest.to_path_buf();
  tokio::task::spawn_blocking(move || extract_archive(&archive, "export.tar", &dest, 0))
    .await
    .map_err(|e| std::io::Error::other(e.to_string()))??;
  Ok(())
}

/// Copy a directory tree, leaving out `.git`.
fn copy_tree(src: &Path, dest: &Path) -> std::io::Result<()> {
  fs::create_dir_all(dest)?;
  let walker = walkdir::WalkDir::new(src)
    .min_depth(1)
    .into_iter()
    .filter_entry(|e| e.file_name() != ".git");
  for entry in walker {
    let entry = entry.map_err(std::io::Error::other)?;
    let relative = entry.path().strip_prefix(src).map_err(std::io::Error::other)?;
    let target = dest.join(relative);
    let file_type = entry.file_type();
    if file_type.is_dir() {
      fs::create_dir_all(&target)?;
    } else if file_type.is_symlink() {
      #[cfg(unix)]
      std::os::unix::fs::symlink(fs::read_link(entry.path())?, &target)?;
    } else {
      fs::copy(entry.path(), &target)?;
    }
  }
  Ok(())
}
