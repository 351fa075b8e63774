mod cmd;
mod output;

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;

use flatbuild_lib::build::Sandbox;

use crate::output::{OutputFormat, print_error};

/// flatbuild - manifest-driven bundle builder
#[derive(Parser)]
#[command(name = "flatbuild")]
#[command(author, version, about, long_about = None)]
struct Cli {
  /// Increase log verbosity (-v info, -vv debug)
  #[arg(short, long, global = true, action = clap::ArgAction::Count)]
  verbose: u8,

  /// Log level or filter directive; RUST_LOG takes precedence
  #[arg(long, global = true)]
  log_level: Option<String>,

  #[command(subcommand)]
  command: Commands,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum SandboxArg {
  None,
  Bwrap,
}

impl From<SandboxArg> for Sandbox {
  fn from(arg: SandboxArg) -> Self {
    match arg {
      SandboxArg::None => Sandbox::None,
      SandboxArg::Bwrap => Sandbox::Bwrap,
    }
  }
}

#[derive(Subcommand)]
enum Commands {
  /// Build every module of a manifest into the install prefix
  Build {
    manifest: PathBuf,

    /// State directory (build dirs, default prefix, bundle metadata)
    #[arg(long)]
    state_dir: Option<PathBuf>,

    /// Install prefix shared by all modules
    #[arg(long)]
    prefix: Option<PathBuf>,

    #[arg(long, value_enum, default_value = "none")]
    sandbox: SandboxArg,

    /// Keep per-module build directories after success
    #[arg(long)]
    keep_build_dirs: bool,

    /// Download timeout, e.g. "5m"
    #[arg(long, value_parser = humantime::parse_duration, default_value = "5m")]
    timeout: Duration,
  },

  /// Check upstream for newer versions of archive sources
  CheckUpdates {
    manifest: PathBuf,

    #[command(flatten)]
    check: CheckArgs,

    #[arg(long, value_enum, default_value = "text")]
    format: OutputFormat,
  },

  /// Re-pin archive sources to newer upstream versions after fetching and hashing them
  Repin {
    manifest: PathBuf,

    /// Write the re-pinned manifest here; without it changes are only printed
    #[arg(short, long)]
    output: Option<PathBuf>,

    #[command(flatten)]
    check: CheckArgs,

    #[arg(long, value_enum, default_value = "text")]
    format: OutputFormat,
  },

  /// Load a manifest and print the module build order
  Validate {
    manifest: PathBuf,

    /// Architecture used for only-arches / skip-arches
    #[arg(long)]
    arch: Option<String>,

    #[arg(long, value_enum, default_value = "text")]
    format: OutputFormat,
  },

  /// Show version and resolved directories
  Info,
}

#[derive(clap::Args, Debug, Clone)]
struct CheckArgs {
  /// Concurrent checks
  #[arg(long, default_value_t = 4)]
  jobs: usize,

  /// Retries for transient fetch failures
  #[arg(long, default_value_t = 3)]
  retries: u32,

  /// Per-request timeout, e.g. "30s"
  #[arg(long, value_parser = humantime::parse_duration, default_value = "30s")]
  timeout: Duration,
}

impl CheckArgs {
  fn config(&self) -> flatbuild_lib::checker::CheckConfig {
    flatbuild_lib::checker::CheckConfig {
      jobs: self.jobs,
      retries: self.retries,
      timeout: self.timeout,
      ..Default::default()
    }
  }
}

fn init_logging(verbose: u8, log_level: Option<&str>) {
  let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
    let level = log_level.unwrap_or(match verbose {
      0 => "warn",
      1 => "info",
      _ => "debug",
    });
    EnvFilter::new(level)
  });

  tracing_subscriber::fmt()
    .with_env_filter(filter)
    .with_writer(std::io::stderr)
    .without_time()
    .init();
}

fn main() {
  let cli = Cli::parse();
  init_logging(cli.verbose, cli.log_level.as_deref());

  let result = match cli.command {
    Commands::Build {
      manifest,
      state_dir,
      prefix,
      sandbox,
      keep_build_dirs,
      timeout,
    } => cmd::cmd_build(cmd::BuildArgs {
      manifest,
      state_dir,
      prefix,
      sandbox: sandbox.into(),
      keep_build_dirs,
      timeout,
    }),
    Commands::CheckUpdates {
      manifest,
      check,
      format,
    } => cmd::cmd_check_updates(&manifest, &check.config(), format),
    Commands::Repin {
      manifest,
      output,
      check,
      format,
    } => cmd::cmd_repin(&manifest, output.as_deref(), &check.config(), format),
    Commands::Validate { manifest, arch, format } => cmd::cmd_validate(&manifest, arch.as_deref(), format),
    Commands::Info => cmd::cmd_info(),
  };

  if let Err(err) = result {
    print_error(&format!("{:#}", err));
    std::process::exit(1);
  }
}
