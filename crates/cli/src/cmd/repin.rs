//! Implementation of the `flatbuild repin` command.
//!
//! Runs the update checkers, then downloads every newer candidate, hashes it
//! and rewrites the archive source's `url` and checksum. The manifest on disk
//! is never touched; the re-pinned manifest is written only to `--output`.

use std::path::Path;

use anyhow::{Context, Result};
use serde::Serialize;

use flatbuild_lib::checker::CheckConfig;
use flatbuild_lib::manifest::Manifest;
use flatbuild_lib::repin::{RepinChange, RepinSkip, repin};
use flatbuild_lib::source::Fetcher;

use crate::output::{OutputFormat, print_info, print_json, print_stat, print_success, print_warning, truncate_hash};

#[derive(Serialize)]
#[serde(rename_all = "kebab-case")]
struct RepinOutput<'a> {
  changes: &'a [RepinChange],
  skipped: &'a [RepinSkip],
  written: Option<&'a Path>,
}

/// Execute the repin command.
pub fn cmd_repin(manifest_path: &Path, output: Option<&Path>, config: &CheckConfig, format: OutputFormat) -> Result<()> {
  let manifest = super::load(manifest_path)?;
  let report = super::check_updates::run_check(&manifest, config)?;

  let fetcher = Fetcher::from_env(config.timeout).context("Failed to set up fetcher")?;
  let rt = tokio::runtime::Runtime::new().context("Failed to create async runtime")?;
  let repinned = rt
    .block_on(repin(&manifest, &report, &fetcher))
    .context("Failed to re-pin sources")?;

  let written = match output {
    Some(path) if !repinned.changes.is_empty() => {
      write_manifest(&repinned.manifest, path)?;
      Some(path)
    }
    _ => None,
  };

  if format.is_json() {
    return print_json(&RepinOutput {
      changes: &repinned.changes,
      skipped: &repinned.skipped,
      written,
    });
  }

  if repinned.changes.is_empty() {
    print_success("Nothing to re-pin");
  }
  for change in &repinned.changes {
    print_info(&format!("{} [{}] {}", change.module, change.source_index, change.version));
    print_stat("url", &format!("{} -> {}", change.old_url, change.new_url));
    print_stat(
      "checksum",
      &format!("{} -> {}", truncate_hash(&change.old_checksum), truncate_hash(&change.new_checksum)),
    );
  }
  for skip in &repinned.skipped {
    print_warning(&format!("{} [{}] skipped: {}", skip.module, skip.source_index, skip.reason));
  }

  match (written, output) {
    (Some(path), _) => print_success(&format!("Wrote {}", path.display())),
    (None, None) if !repinned.changes.is_empty() => print_info("Pass --output to write the re-pinned manifest"),
    _ => {}
  }
  Ok(())
}

/// Serialize by extension: `.yaml`/`.yml` as YAML, anything else as JSON.
fn write_manifest(manifest: &Manifest, path: &Path) -> Result<()> {
  let is_yaml = matches!(path.extension().and_then(|e| e.to_str()), Some("yaml" | "yml"));
  let text = if is_yaml {
    serde_yaml::to_string(manifest).context("Failed to serialize manifest")?
  } else {
    let mut json = serde_json::to_string_pretty(manifest).context("Failed to serialize manifest")?;
    json.push('\n');
    json
  };
  std::fs::write(path, text).with_context(|| format!("Failed to write {}", path.display()))
}
