//! Implementation of the `flatbuild info` command.

use anyhow::Result;

use flatbuild_lib::platform::{current_arch_name, paths};

use crate::output::print_stat;

/// Print the version and the directories a build would use.
pub fn cmd_info() -> Result<()> {
  println!("flatbuild {}", env!("CARGO_PKG_VERSION"));
  println!();
  print_stat("Arch", current_arch_name());
  print_stat("State", &paths::state_dir().display().to_string());
  print_stat("Cache", &paths::cache_dir().display().to_string());
  print_stat("Downloads", &paths::downloads_dir().display().to_string());
  print_stat("Git mirrors", &paths::git_cache_dir().display().to_string());
  Ok(())
}
