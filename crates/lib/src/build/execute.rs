//! Build protocols.
//!
//! A module's build turns into an ordered list of [`BuildStep`]s, planned from
//! its build system and the state of its populated working directory, then run
//! one by one through the [`CommandRunner`]. The first failing step aborts the
//! module; nothing is retried.

use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::info;

use super::cmd::{CmdError, CommandRunner, Invocation};
use super::context::BuildContext;
use crate::consts::BUILD_SUBDIR;
use crate::manifest::{BuildSystem, Module};

#[derive(Debug, Error)]
pub enum BuildError {
  #[error(transparent)]
  Command(#[from] CmdError),

  #[error("I/O error: {0}")]
  Io(#[from] std::io::Error),
}

/// One command of a build protocol.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildStep {
  pub cwd: PathBuf,
  pub invocation: Invocation,
}

impl BuildStep {
  fn argv<I, S>(cwd: &Path, args: I) -> Self
  where
    I: IntoIterator<Item = S>,
    S: Into<String>,
  {
    Self {
      cwd: cwd.to_path_buf(),
      invocation: Invocation::argv(args),
    }
  }

  fn shell(cwd: &Path, cmd: &str) -> Self {
    Self {
      cwd: cwd.to_path_buf(),
      invocation: Invocation::Shell(cmd.to_string()),
    }
  }
}

/// Number of parallel jobs handed to make and ninja.
pub fn default_jobs() -> usize {
  std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1)
}

/// Plan the configure, build and install steps of a module, followed by its post-install commands.
pub fn plan_steps(module: &Module, ctx: &BuildContext, jobs: usize) -> Vec<BuildStep> {
  let src = ctx.work_dir();
  let build = src.join(BUILD_SUBDIR);
  let prefix = ctx.prefix().display().to_string();
  let jobs_arg = format!("-j{}", jobs.max(1));

  let mut steps = Vec::new();
  match module.buildsystem {
    BuildSystem::Simple => {
      steps.extend(module.build_commands.iter().map(|cmd| BuildStep::shell(src, cmd)));
    }
    BuildSystem::Meson => {
      let mut setup = vec!["meson".to_string(), "setup".to_string(), format!("--prefix={}", prefix)];
      setup.extend(module.config_opts.iter().cloned());
      setup.push(BUILD_SUBDIR.to_string());
      steps.push(BuildStep::argv(src, setup));
      steps.push(BuildStep::argv(src, ["ninja", "-C", BUILD_SUBDIR, jobs_arg.as_str()]));
      steps.push(BuildStep::argv(src, ["ninja", "-C", BUILD_SUBDIR, "install"]));
    }
    BuildSystem::Cmake | BuildSystem::CmakeNinja => {
      let ninja = module.buildsystem == BuildSystem::CmakeNinja;
      let mut configure = vec!["cmake".to_string(), format!("-DCMAKE_INSTALL_PREFIX={}", prefix)];
      if ninja {
        configure.extend(["-G".to_string(), "Ninja".to_string()]);
      }
      configure.extend(module.config_opts.iter().cloned());
      configure.push("..".to_string());
      steps.push(BuildStep::argv(&build, configure));
      let tool = if ninja { "ninja" } else { "make" };
      steps.push(BuildStep::argv(&build, [tool, jobs_arg.as_str()]));
      steps.push(BuildStep::argv(&build, [tool, "install"]));
    }
    BuildSystem::Autotools => {
      if !src.join("configure").exists() && src.join("autogen.sh").exists() {
        steps.push(BuildStep::shell(src, "NOCONFIGURE=1 ./autogen.sh"));
      }
      let (dir, script) = if module.builddir {
        (build.clone(), "../configure")
      } else {
        (src.to_path_buf(), "./configure")
      };
      let mut configure = vec![script.to_string(), format!("--prefix={}", prefix)];
      configure.extend(module.config_opts.iter().cloned());
      steps.push(BuildStep::argv(&dir, configure));
      steps.push(BuildStep::argv(&dir, ["make", jobs_arg.as_str()]));
      steps.push(BuildStep::argv(&dir, ["make", "install"]));
    }
  }

  steps.extend(module.post_install.iter().map(|cmd| BuildStep::shell(src, cmd)));
  steps
}

/// Build and install one module into the shared prefix.
pub async fn build_module(module: &Module, ctx: &BuildContext, runner: &CommandRunner) -> Result<(), BuildError> {
  let steps = plan_steps(module, ctx, default_jobs());
  info!(
    module = %module.name,
    buildsystem = module.buildsystem.as_str(),
    steps = steps.len(),
    "building module"
  );

  for step in &steps {
    tokio::fs::create_dir_all(&step.cwd).await?;
    runner.run(ctx, &step.cwd, &step.invocation).await?;
  }
  Ok(())
}
