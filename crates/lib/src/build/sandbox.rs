//! Sandbox launchers.
//!
//! The sandbox technology is consumed, not implemented: a launcher only
//! rewrites a program invocation so that it runs under the chosen tool.

use std::path::Path;
use std::str::FromStr;

use serde::Serialize;

use super::context::BuildContext;

/// Host top-level entries that may be `/usr` symlinks (merged-usr) or real directories.
const HOST_LIB_DIRS: [&str; 5] = ["/bin", "/sbin", "/lib", "/lib32", "/lib64"];

/// How build commands are isolated beyond the cleared environment.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Sandbox {
  /// Environment isolation and a private process group only.
  #[default]
  None,
  /// bubblewrap: read-only host `/usr`, writable working directory and prefix, no network unless granted.
  Bwrap,
}

impl Sandbox {
  pub fn as_str(self) -> &'static str {
    match self {
      Self::None => "none",
      Self::Bwrap => "bwrap",
    }
  }

  /// Rewrite `program args...` to run under this sandbox.
  pub fn wrap(self, program: &str, args: &[String], ctx: &BuildContext, cwd: &Path) -> (String, Vec<String>) {
    match self {
      Self::None => (program.to_string(), args.to_vec()),
      Self::Bwrap => {
        let work = ctx.work_dir().display().to_string();
        let prefix = ctx.prefix().display().to_string();
        let mut wrapped: Vec<String> = ["--ro-bind", "/usr", "/usr"].iter().map(|s| s.to_string()).collect();
        for dir in HOST_LIB_DIRS {
          wrapped.extend(["--ro-bind-try".to_string(), dir.to_string(), dir.to_string()]);
        }
        wrapped.extend(
          ["--dev", "/dev", "--proc", "/proc", "--tmpfs", "/tmp"]
            .iter()
            .map(|s| s.to_string()),
        );
        wrapped.extend(["--bind".to_string(), work.clone(), work]);
        wrapped.extend(["--bind".to_string(), prefix.clone(), prefix]);
        wrapped.push("--unshare-all".to_string());
        if ctx.network_allowed() {
          wrapped.push("--share-net".to_string());
        }
        wrapped.push("--die-with-parent".to_string());
        wrapped.extend(["--chdir".to_string(), cwd.display().to_string()]);
        wrapped.push("--".to_string());
        wrapped.push(program.to_string());
        wrapped.extend(args.iter().cloned());
        ("bwrap".to_string(), wrapped)
      }
    }
  }
}

impl FromStr for Sandbox {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s {
      "none" => Ok(Self::None),
      "bwrap" => Ok(Self::Bwrap),
      other => Err(format!("unknown sandbox '{}' (expected none or bwrap)", other)),
    }
  }
}

impl std::fmt::Display for Sandbox {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.write_str(self.as_str())
  }
}
