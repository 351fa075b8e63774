mod build;
mod check_updates;
mod info;
mod repin;
mod validate;

pub use build::{BuildArgs, cmd_build};
pub use check_updates::cmd_check_updates;
pub use info::cmd_info;
pub use repin::cmd_repin;
pub use validate::cmd_validate;

use std::path::Path;

use anyhow::{Context, Result};

use flatbuild_lib::manifest::{Manifest, load_manifest};

/// Load a manifest, attaching the path to any error.
fn load(path: &Path) -> Result<Manifest> {
  load_manifest(path).with_context(|| format!("Failed to load manifest: {}", path.display()))
}
