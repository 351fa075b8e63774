//! Implementation of the `flatbuild check-updates` command.

use std::path::Path;

use anyhow::{Context, Result};
use owo_colors::{OwoColorize, Stream};

use flatbuild_lib::checker::{CheckConfig, CheckOutcome, CheckReport, check_updates};

use crate::output::{OutputFormat, print_info, print_json, print_success, print_warning, symbols};

/// Execute the check-updates command.
///
/// Checks never modify the manifest. Per-source failures show up as
/// `unknown` rows; only a manifest that fails to load is an error.
pub fn cmd_check_updates(manifest_path: &Path, config: &CheckConfig, format: OutputFormat) -> Result<()> {
  let manifest = super::load(manifest_path)?;
  let report = run_check(&manifest, config)?;

  if format.is_json() {
    return print_json(&report);
  }
  print_report(&report);
  Ok(())
}

pub(super) fn run_check(manifest: &flatbuild_lib::manifest::Manifest, config: &CheckConfig) -> Result<CheckReport> {
  let rt = tokio::runtime::Runtime::new().context("Failed to create async runtime")?;
  rt.block_on(check_updates(manifest, config))
    .context("Failed to check for updates")
}

fn print_report(report: &CheckReport) {
  if report.results.is_empty() {
    print_info("No sources declare an update checker");
    return;
  }

  for result in &report.results {
    let current = result.current_version.as_deref().unwrap_or("?");
    match &result.outcome {
      CheckOutcome::Newer { candidate, .. } => println!(
        "{} {} [{}] {} {} {}",
        symbols::MODIFY.if_supports_color(Stream::Stdout, |s| s.yellow()),
        result.module,
        result.source_index,
        current,
        symbols::ARROW,
        candidate.if_supports_color(Stream::Stdout, |s| s.green())
      ),
      CheckOutcome::UpToDate { candidate } => println!(
        "{} {} [{}] {} {} {}",
        symbols::SUCCESS.if_supports_color(Stream::Stdout, |s| s.green()),
        result.module,
        result.source_index,
        current,
        symbols::ARROW,
        candidate.if_supports_color(Stream::Stdout, |s| s.dimmed())
      ),
      CheckOutcome::Unknown { kind, reason } => println!(
        "{} {} [{}] {} {} unknown ({}: {})",
        symbols::WARNING.if_supports_color(Stream::Stdout, |s| s.yellow()),
        result.module,
        result.source_index,
        current,
        symbols::ARROW,
        kind,
        reason
      ),
    }
  }

  println!();
  let newer = report.newer().count();
  if newer == 0 {
    print_success("Everything is up to date");
  } else {
    print_info(&format!("{} source(s) have newer versions", newer));
  }
  if report.unknown_count() > 0 {
    print_warning(&format!("{} source(s) could not be checked", report.unknown_count()));
  }
}
