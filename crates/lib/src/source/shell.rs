//! Shell sources: inline commands run against the tree assembled so far.

use tracing::debug;

use super::SourceError;
use crate::build::{BuildContext, CommandRunner, Invocation};
use crate::manifest::ShellSource;

pub async fn apply_shell(source: &ShellSource, ctx: &BuildContext, runner: &CommandRunner) -> Result<(), SourceError> {
  for command in &source.commands {
    debug!(module = %ctx.module(), command, "shell source");
    runner
      .run(ctx, ctx.work_dir(), &Invocation::Shell(command.clone()))
      .await?;
  }
  Ok(())
}
