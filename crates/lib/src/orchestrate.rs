//! Build run control flow.
//!
//! ```text
//! load -> sequence -> for each module: context -> sources -> build -> cleanup
//!                  -> global cleanup -> cleanup-commands -> finish-args -> bundle
//! ```
//!
//! Modules run strictly one after another because later modules build against
//! what earlier ones installed into the shared prefix. The first failure aborts
//! the run: modules before it stay installed and cleaned, nothing after it is
//! touched. Cancellation is only observed between modules, so the prefix is
//! always left at a module boundary.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use thiserror::Error;
use tracing::{info, warn};

use crate::build::{BuildContext, BuildError, CmdError, CommandRunner, Invocation, Sandbox, build_module};
use crate::cleanup::{CleanupError, CleanupRules};
use crate::error::ErrorKind;
use crate::finish::{BundleFiles, collect_finish_args, write_bundle};
use crate::manifest::{Manifest, Module};
use crate::platform::{current_arch_name, paths};
use crate::sequence::{DuplicateModuleError, sequence_modules};
use crate::source::{Fetcher, SourceError, apply_sources};

/// Settings for one build run.
#[derive(Debug, Clone)]
pub struct BuildConfig {
  /// Holds per-module build directories and, by default, the bundle.
  pub state_dir: PathBuf,
  /// Install prefix; defaults to `<state>/app/files`.
  pub prefix: Option<PathBuf>,
  pub downloads_dir: PathBuf,
  pub git_cache_dir: PathBuf,
  pub sandbox: Sandbox,
  pub keep_build_dirs: bool,
  /// Per-request timeout for source downloads. Timeouts are fatal.
  pub fetch_timeout: Duration,
  pub arch: String,
}

impl Default for BuildConfig {
  fn default() -> Self {
    Self {
      state_dir: paths::state_dir(),
      prefix: None,
      downloads_dir: paths::downloads_dir(),
      git_cache_dir: paths::git_cache_dir(),
      sandbox: Sandbox::default(),
      keep_build_dirs: false,
      fetch_timeout: Duration::from_secs(300),
      arch: current_arch_name().to_string(),
    }
  }
}

impl BuildConfig {
  /// Configuration rooted at `state_dir`, with caches in their default locations.
  pub fn with_state_dir(state_dir: impl Into<PathBuf>) -> Self {
    Self {
      state_dir: state_dir.into(),
      ..Self::default()
    }
  }

  pub fn build_root(&self) -> PathBuf {
    self.state_dir.join("build")
  }

  /// Directory receiving `metadata` and `bundle.json`.
  pub fn bundle_dir(&self) -> PathBuf {
    self.state_dir.join("app")
  }

  pub fn prefix(&self) -> PathBuf {
    self.prefix.clone().unwrap_or_else(|| self.bundle_dir().join("files"))
  }
}

/// Cooperative cancellation flag, checked between modules.
#[derive(Debug, Clone, Default)]
pub struct Cancellation(Arc<AtomicBool>);

impl Cancellation {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn cancel(&self) {
    self.0.store(true, Ordering::SeqCst);
  }

  pub fn is_cancelled(&self) -> bool {
    self.0.load(Ordering::SeqCst)
  }
}

/// Why a module failed.
#[derive(Debug, Error)]
pub enum ModuleError {
  #[error(transparent)]
  Source(SourceError),

  #[error(transparent)]
  Build(#[from] BuildError),

  #[error(transparent)]
  Cleanup(#[from] CleanupError),

  #[error("I/O error: {0}")]
  Io(#[from] std::io::Error),
}

impl ModuleError {
  pub fn kind(&self) -> ErrorKind {
    match self {
      Self::Source(e) => e.kind(),
      Self::Build(e) => e.kind(),
      Self::Cleanup(e) => e.kind(),
      Self::Io(_) => ErrorKind::IoError,
    }
  }
}

/// The user-visible report of a failed module.
#[derive(Debug, Error)]
#[error("module '{module}' failed{}: {error}", source_index.map(|i| format!(" at source {}", i)).unwrap_or_default())]
pub struct ModuleFailure {
  pub module: String,
  /// Index into the module's `sources` when a source failed.
  pub source_index: Option<usize>,
  pub source_kind: Option<&'static str>,
  #[source]
  pub error: ModuleError,
  /// Modules fully installed before the failure.
  pub completed: Vec<String>,
}

impl ModuleFailure {
  pub fn kind(&self) -> ErrorKind {
    self.error.kind()
  }
}

#[derive(Debug, Error)]
pub enum OrchestrateError {
  #[error(transparent)]
  Duplicate(#[from] DuplicateModuleError),

  #[error(transparent)]
  Module(Box<ModuleFailure>),

  #[error("global cleanup failed: {0}")]
  Cleanup(#[source] CleanupError),

  #[error("cleanup command failed: {0}")]
  CleanupCommand(#[source] CmdError),

  #[error("build cancelled after {} completed module(s)", completed.len())]
  Cancelled { completed: Vec<String> },

  #[error("failed to set up fetcher: {0}")]
  Setup(#[source] SourceError),

  #[error("I/O error: {0}")]
  Io(#[from] std::io::Error),
}

impl OrchestrateError {
  pub fn kind(&self) -> ErrorKind {
    match self {
      Self::Duplicate(e) => e.kind(),
      Self::Module(f) => f.kind(),
      Self::Cleanup(e) => e.kind(),
      Self::CleanupCommand(e) => e.kind(),
      Self::Cancelled { .. } => ErrorKind::Cancelled,
      Self::Setup(e) => e.kind(),
      Self::Io(_) => ErrorKind::IoError,
    }
  }

  /// The failing module, when the run stopped inside one.
  pub fn module_failure(&self) -> Option<&ModuleFailure> {
    match self {
      Self::Module(f) => Some(f),
      _ => None,
    }
  }
}

/// Outcome of a successful run.
#[derive(Debug, Clone)]
pub struct BuildReport {
  /// Modules built, in order.
  pub modules: Vec<String>,
  pub prefix: PathBuf,
  /// Paths removed by global cleanup, relative to the prefix.
  pub pruned: Vec<PathBuf>,
  pub bundle: BundleFiles,
}

/// Build every module of `manifest` into the configured prefix and write the bundle metadata.
pub async fn run_build(
  manifest: &Manifest,
  config: &BuildConfig,
  cancel: &Cancellation,
) -> Result<BuildReport, OrchestrateError> {
  let modules = sequence_modules(manifest, &config.arch)?;

  // Broken rules are a manifest problem; surface them before fetching anything.
  let global_rules = CleanupRules::compile(&manifest.cleanup).map_err(OrchestrateError::Cleanup)?;
  let mut module_rules = Vec::with_capacity(modules.len());
  for (position, module) in modules.iter().enumerate() {
    let rules = CleanupRules::compile(&module.cleanup).map_err(|e| {
      OrchestrateError::Module(Box::new(ModuleFailure {
        module: module.name.clone(),
        source_index: None,
        source_kind: None,
        error: ModuleError::Cleanup(e),
        completed: modules[..position].iter().map(|m| m.name.clone()).collect(),
      }))
    })?;
    module_rules.push(rules);
  }

  let fetcher = Fetcher::new(
    config.downloads_dir.clone(),
    config.git_cache_dir.clone(),
    config.fetch_timeout,
  )
  .map_err(OrchestrateError::Setup)?;
  let runner = CommandRunner::new(config.sandbox);
  let build_root = config.build_root();
  let prefix = config.prefix();
  std::fs::create_dir_all(&prefix)?;

  info!(
    app_id = %manifest.app_id,
    modules = modules.len(),
    prefix = %prefix.display(),
    sandbox = %config.sandbox,
    "starting build"
  );

  let mut completed: Vec<String> = Vec::with_capacity(modules.len());
  for (module, rules) in modules.iter().zip(&module_rules) {
    if cancel.is_cancelled() {
      warn!(completed = completed.len(), "build cancelled");
      return Err(OrchestrateError::Cancelled { completed });
    }

    let run = ModuleRun {
      manifest,
      module,
      rules,
      build_root: &build_root,
      prefix: &prefix,
      fetcher: &fetcher,
      runner: &runner,
      keep: config.keep_build_dirs,
    };
    if let Err((source_index, source_kind, error)) = run.execute().await {
      warn!(module = %module.name, kind = %error.kind(), error = %error, "module failed");
      return Err(OrchestrateError::Module(Box::new(ModuleFailure {
        module: module.name.clone(),
        source_index,
        source_kind,
        error,
        completed,
      })));
    }
    info!(module = %module.name, "module installed");
    completed.push(module.name.clone());
  }

  let pruned = global_rules.prune(&prefix).map_err(OrchestrateError::Cleanup)?.removed;
  run_cleanup_commands(manifest, &build_root, &prefix, &runner).await?;

  let finish = collect_finish_args(manifest);
  let bundle = write_bundle(&config.bundle_dir(), manifest, &finish, &completed, &config.arch)?;

  info!(modules = completed.len(), pruned = pruned.len(), "build finished");
  Ok(BuildReport {
    modules: completed,
    prefix,
    pruned,
    bundle,
  })
}

type StageError = (Option<usize>, Option<&'static str>, ModuleError);

/// Everything one module's stages need.
struct ModuleRun<'a> {
  manifest: &'a Manifest,
  module: &'a Module,
  rules: &'a CleanupRules,
  build_root: &'a Path,
  prefix: &'a Path,
  fetcher: &'a Fetcher,
  runner: &'a CommandRunner,
  keep: bool,
}

impl ModuleRun<'_> {
  async fn execute(&self) -> Result<(), StageError> {
    let ctx = BuildContext::create(self.build_root, self.prefix, &self.manifest.app_id, self.module)
      .map_err(|e| (None, None, ModuleError::Io(e)))?;

    let result = self.stages(&ctx).await;
    if let Err(e) = ctx.finish(self.keep || result.is_err()) {
      warn!(module = %self.module.name, error = %e, "failed to remove build directory");
    }
    result
  }

  async fn stages(&self, ctx: &BuildContext) -> Result<(), StageError> {
    apply_sources(self.module, ctx, self.fetcher, self.runner, &self.manifest.base_dir)
      .await
      .map_err(|f| (Some(f.index), Some(f.kind), ModuleError::Source(f.error)))?;

    build_module(self.module, ctx, self.runner)
      .await
      .map_err(|e| (None, None, ModuleError::Build(e)))?;

    let report = self
      .rules
      .prune(self.prefix)
      .map_err(|e| (None, None, ModuleError::Cleanup(e)))?;
    if !report.is_empty() {
      info!(module = %self.module.name, removed = report.removed.len(), "module cleanup");
    }
    Ok(())
  }
}

async fn run_cleanup_commands(
  manifest: &Manifest,
  build_root: &Path,
  prefix: &Path,
  runner: &CommandRunner,
) -> Result<(), OrchestrateError> {
  if manifest.cleanup_commands.is_empty() {
    return Ok(());
  }
  let ctx = BuildContext::create(build_root, prefix, &manifest.app_id, &Module::named("cleanup-commands"))?;
  for cmd in &manifest.cleanup_commands {
    runner
      .run(&ctx, prefix, &Invocation::Shell(cmd.clone()))
      .await
      .map_err(OrchestrateError::CleanupCommand)?;
  }
  ctx.finish(false)?;
  Ok(())
}
