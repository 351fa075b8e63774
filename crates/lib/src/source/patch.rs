//! Patch sources, applied with the `patch` tool.

use std::path::Path;

use super::SourceError;
use crate::build::{BuildContext, CommandRunner, Invocation};
use crate::manifest::PatchSource;

/// Apply a patch file (relative to the manifest directory) to the module tree.
pub async fn apply_patch(
  source: &PatchSource,
  ctx: &BuildContext,
  runner: &CommandRunner,
  base_dir: &Path,
) -> Result<(), SourceError> {
  let file = base_dir.join(&source.path);
  if !file.is_file() {
    return Err(SourceError::Patch {
      path: file,
      details: "patch file not found".to_string(),
    });
  }

  let mut args = vec![
    "patch".to_string(),
    format!("-p{}", source.strip_components),
    "--batch".to_string(),
    "--forward".to_string(),
  ];
  args.extend(source.options.iter().cloned());
  args.push("-i".to_string());
  args.push(file.display().to_string());

  runner
    .run(ctx, ctx.work_dir(), &Invocation::Argv(args))
    .await
    .map_err(|e| SourceError::Patch {
      path: file.clone(),
      details: e.diagnostics(),
    })?;
  Ok(())
}
