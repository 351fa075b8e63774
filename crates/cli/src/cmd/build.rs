//! Implementation of the `flatbuild build` command.
//!
//! Builds every module of the manifest in order into the shared prefix, then
//! writes the bundle metadata. Ctrl-C stops the run at the next module boundary.

use std::path::PathBuf;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use tracing::debug;

use flatbuild_lib::build::Sandbox;
use flatbuild_lib::orchestrate::{BuildConfig, Cancellation, ModuleError, OrchestrateError, run_build};
use flatbuild_lib::source::SourceError;

use crate::output::{format_duration, print_error_stat, print_stat, print_success, print_warning};

pub struct BuildArgs {
  pub manifest: PathBuf,
  pub state_dir: Option<PathBuf>,
  pub prefix: Option<PathBuf>,
  pub sandbox: Sandbox,
  pub keep_build_dirs: bool,
  pub timeout: Duration,
}

/// Execute the build command.
///
/// On failure the failing module, the failing source (when a source failed)
/// and the error kind are printed before the error itself; integrity errors
/// also print the expected and computed digests.
pub fn cmd_build(args: BuildArgs) -> Result<()> {
  let start = Instant::now();
  let manifest = super::load(&args.manifest)?;

  let mut config = match args.state_dir {
    Some(dir) => BuildConfig::with_state_dir(dir),
    None => BuildConfig::default(),
  };
  config.prefix = args.prefix;
  config.sandbox = args.sandbox;
  config.keep_build_dirs = args.keep_build_dirs;
  config.fetch_timeout = args.timeout;
  debug!(
    state_dir = %config.state_dir.display(),
    prefix = %config.prefix().display(),
    sandbox = ?config.sandbox,
    "resolved build config"
  );

  let rt = tokio::runtime::Runtime::new().context("Failed to create async runtime")?;
  let cancel = Cancellation::new();
  let result = rt.block_on(async {
    let watcher = cancel.clone();
    tokio::spawn(async move {
      if tokio::signal::ctrl_c().await.is_ok() {
        print_warning("Interrupted, stopping after the current module");
        watcher.cancel();
      }
    });
    run_build(&manifest, &config, &cancel).await
  });

  match result {
    Ok(report) => {
      println!();
      print_success(&format!("Built {}", manifest.app_id));
      print_stat("Modules", &report.modules.len().to_string());
      print_stat("Prefix", &report.prefix.display().to_string());
      print_stat("Pruned", &report.pruned.len().to_string());
      print_stat("Metadata", &report.bundle.metadata.display().to_string());
      print_stat("Duration", &format_duration(start.elapsed()));
      Ok(())
    }
    Err(err) => {
      report_failure(&err);
      Err(err).context("Build failed")
    }
  }
}

fn report_failure(err: &OrchestrateError) {
  eprintln!();
  if let Some(failure) = err.module_failure() {
    print_error_stat("Module", &failure.module);
    if let (Some(index), Some(kind)) = (failure.source_index, failure.source_kind) {
      print_error_stat("Source", &format!("{} ({})", index, kind));
    }
    print_error_stat("Kind", err.kind().as_str());
    if let ModuleError::Source(SourceError::Integrity { expected, actual, .. }) = &failure.error {
      print_error_stat("Expected", &expected.to_string());
      print_error_stat("Computed", &format!("{}:{}", expected.algorithm, actual));
    }
    if !failure.completed.is_empty() {
      print_error_stat("Completed", &failure.completed.join(", "));
    }
    return;
  }

  print_error_stat("Kind", err.kind().as_str());
  if let OrchestrateError::Cancelled { completed } = err {
    print_error_stat("Completed", &completed.join(", "));
  }
}
