//! Cleanup rules and pruning of the install prefix.
//!
//! A rule is a glob, or a `!`-prefixed negated glob:
//! - `/share/man`, `/lib/*.la`: anchored at the prefix root, matched against the relative path
//! - `*.la`, `keep.a`: matched against the file name at any depth
//! - `lib/debug`: matched against the relative path at any depth
//!
//! A path is removed iff it matches at least one positive rule and no negated
//! rule, whatever order the rules were declared in. Everything below a removed
//! directory goes with it, unless a negated rule keeps something inside; the
//! directory is then descended into instead. Pruning an already pruned tree
//! removes nothing.

use std::path::{Path, PathBuf};

use globset::{GlobBuilder, GlobSet, GlobSetBuilder};
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum CleanupError {
  #[error("invalid cleanup rule '{pattern}': {message}")]
  Pattern { pattern: String, message: String },

  #[error("failed to prune '{}': {source}", path.display())]
  Io {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },
}

/// Paths removed by a prune pass, relative to the pruned root.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PruneReport {
  pub removed: Vec<PathBuf>,
}

impl PruneReport {
  pub fn is_empty(&self) -> bool {
    self.removed.is_empty()
  }
}

/// One side (positive or negated) of a rule set.
#[derive(Debug)]
struct Matcher {
  by_path: GlobSet,
  by_name: GlobSet,
  empty: bool,
}

impl Matcher {
  fn compile(patterns: &[&str]) -> Result<Self, CleanupError> {
    let mut by_path = GlobSetBuilder::new();
    let mut by_name = GlobSetBuilder::new();

    for &pattern in patterns {
      let (glob, on_path) = if let Some(anchored) = pattern.strip_prefix('/') {
        (anchored.trim_end_matches('/').to_string(), true)
      } else if pattern.contains('/') {
        (format!("**/{}", pattern.trim_end_matches('/')), true)
      } else {
        (pattern.to_string(), false)
      };
      let glob = GlobBuilder::new(&glob)
        .literal_separator(true)
        .build()
        .map_err(|e| CleanupError::Pattern {
          pattern: pattern.to_string(),
          message: e.kind().to_string(),
        })?;
      if on_path {
        by_path.add(glob);
      } else {
        by_name.add(glob);
      }
    }

    let build = |builder: GlobSetBuilder| {
      builder.build().map_err(|e| CleanupError::Pattern {
        pattern: patterns.join(", "),
        message: e.to_string(),
      })
    };
    Ok(Self {
      by_path: build(by_path)?,
      by_name: build(by_name)?,
      empty: patterns.is_empty(),
    })
  }

  fn is_match(&self, relative: &Path) -> bool {
    if self.empty {
      return false;
    }
    self.by_path.is_match(relative) || relative.file_name().is_some_and(|name| self.by_name.is_match(name))
  }
}

/// A compiled set of cleanup rules.
#[derive(Debug)]
pub struct CleanupRules {
  positive: Matcher,
  negative: Matcher,
}

impl CleanupRules {
  pub fn compile<S: AsRef<str>>(rules: &[S]) -> Result<Self, CleanupError> {
    let mut positive = Vec::new();
    let mut negative = Vec::new();
    for rule in rules {
      let rule = rule.as_ref().trim();
      if rule.is_empty() {
        continue;
      }
      match rule.strip_prefix('!') {
        Some(negated) => negative.push(negated),
        None => positive.push(rule),
      }
    }

    Ok(Self {
      positive: Matcher::compile(&positive)?,
      negative: Matcher::compile(&negative)?,
    })
  }

  pub fn is_empty(&self) -> bool {
    self.positive.empty
  }

  /// Whether `relative` is removed by these rules on its own merits.
  pub fn removes(&self, relative: &Path) -> bool {
    self.positive.is_match(relative) && !self.negative.is_match(relative)
  }

  /// Remove every matching path under `root`.
  pub fn prune(&self, root: &Path) -> Result<PruneReport, CleanupError> {
    let mut report = PruneReport::default();
    if self.is_empty() || !root.exists() {
      return Ok(report);
    }
    self.prune_dir(root, root, false, &mut report)?;
    report.removed.sort();
    info!(root = %root.display(), removed = report.removed.len(), "pruned");
    Ok(report)
  }

  fn prune_dir(&self, root: &Path, dir: &Path, inherited: bool, report: &mut PruneReport) -> Result<(), CleanupError> {
    let io_err = |path: &Path| {
      let path = path.to_path_buf();
      move |source| CleanupError::Io { path, source }
    };

    let mut entries: Vec<_> = std::fs::read_dir(dir)
      .map_err(io_err(dir))?
      .collect::<Result<_, _>>()
      .map_err(io_err(dir))?;
    entries.sort_by_key(|e| e.file_name());

    for entry in entries {
      let path = entry.path();
      let relative = path.strip_prefix(root).unwrap_or(&path).to_path_buf();
      let negated = self.negative.is_match(&relative);
      let remove = (inherited || self.positive.is_match(&relative)) && !negated;
      let file_type = entry.file_type().map_err(io_err(&path))?;

      if file_type.is_dir() {
        if remove && !self.keeps_descendant(root, &path) {
          debug!(path = %relative.display(), "removing directory");
          std::fs::remove_dir_all(&path).map_err(io_err(&path))?;
          report.removed.push(relative);
        } else {
          self.prune_dir(root, &path, remove, report)?;
        }
      } else if remove {
        debug!(path = %relative.display(), "removing file");
        std::fs::remove_file(&path).map_err(io_err(&path))?;
        report.removed.push(relative);
      }
    }
    Ok(())
  }

  fn keeps_descendant(&self, root: &Path, dir: &Path) -> bool {
    if self.negative.empty {
      return false;
    }
    walkdir::WalkDir::new(dir)
      .min_depth(1)
      .into_iter()
      .filter_map(Result::ok)
      .any(|entry| {
        let relative = entry.path().strip_prefix(root).unwrap_or(entry.path());
        self.negative.is_match(relative)
      })
  }
}
