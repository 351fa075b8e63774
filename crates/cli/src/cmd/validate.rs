//! Implementation of the `flatbuild validate` command.

use std::path::Path;

use anyhow::{Context, Result};
use serde::Serialize;

use flatbuild_lib::platform::current_arch_name;
use flatbuild_lib::sequence::sequence_modules;

use crate::output::{OutputFormat, print_json, print_stat, print_success};

#[derive(Serialize)]
#[serde(rename_all = "kebab-case")]
struct ValidateOutput<'a> {
  app_id: &'a str,
  arch: &'a str,
  modules: Vec<ModuleEntry<'a>>,
}

#[derive(Serialize)]
struct ModuleEntry<'a> {
  name: &'a str,
  buildsystem: flatbuild_lib::manifest::BuildSystem,
  sources: usize,
}

/// Execute the validate command: load the manifest and print the build order.
pub fn cmd_validate(manifest_path: &Path, arch: Option<&str>, format: OutputFormat) -> Result<()> {
  let manifest = super::load(manifest_path)?;
  let arch = arch.unwrap_or_else(|| current_arch_name());
  let order = sequence_modules(&manifest, arch).context("Invalid module list")?;

  if format.is_json() {
    return print_json(&ValidateOutput {
      app_id: &manifest.app_id,
      arch,
      modules: order
        .iter()
        .map(|m| ModuleEntry {
          name: &m.name,
          buildsystem: m.buildsystem,
          sources: m.sources.len(),
        })
        .collect(),
    });
  }

  print_success(&format!("{} is valid", manifest.app_id));
  print_stat("Runtime", &manifest.runtime);
  print_stat("Arch", arch);
  println!();
  for (i, module) in order.iter().enumerate() {
    println!("  {:>3}. {} ({} source(s))", i + 1, module.name, module.sources.len());
  }
  Ok(())
}
