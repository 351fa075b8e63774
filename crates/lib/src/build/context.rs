//! Per-module build context.
//!
//! A [`BuildContext`] owns everything one module's stages need: its private
//! working directory, the shared install prefix, and the isolated environment
//! handed to every subprocess. It is created right before the module's first
//! source is applied and finished after its cleanup pass, so it never outlives
//! its module.

use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::consts::SOURCE_DATE_EPOCH;
use crate::manifest::Module;

#[derive(Debug)]
pub struct BuildContext {
  module: String,
  work_dir: PathBuf,
  prefix: PathBuf,
  env: BTreeMap<String, String>,
  network: bool,
}

impl BuildContext {
  /// Create a fresh working directory `<build_root>/<module>` and the module's environment.
  ///
  /// Any leftover directory from a previous run is removed first.
  pub fn create(build_root: &Path, prefix: &Path, app_id: &str, module: &Module) -> io::Result<Self> {
    let work_dir = build_root.join(sanitize_dir_name(&module.name));
    if work_dir.exists() {
      std::fs::remove_dir_all(&work_dir)?;
    }
    std::fs::create_dir_all(&work_dir)?;
    std::fs::create_dir_all(prefix)?;

    let tmp_dir = work_dir.join(".tmp");
    std::fs::create_dir_all(&tmp_dir)?;

    let mut env = base_env(prefix, &tmp_dir, app_id);
    let options = &module.build_options;
    for (key, value) in &options.env {
      env.insert(key.clone(), value.clone());
    }
    let mut path = env.get("PATH").cloned().unwrap_or_default();
    if let Some(prepend) = &options.prepend_path {
      path = format!("{}:{}", prepend, path);
    }
    if let Some(append) = &options.append_path {
      path = format!("{}:{}", path, append);
    }
    env.insert("PATH".to_string(), path);

    debug!(module = %module.name, work_dir = %work_dir.display(), "created build context");

    Ok(Self {
      module: module.name.clone(),
      work_dir,
      prefix: prefix.to_path_buf(),
      env,
      network: options.network_allowed(),
    })
  }

  pub fn module(&self) -> &str {
    &self.module
  }

  /// Root of the module's source tree.
  pub fn work_dir(&self) -> &Path {
    &self.work_dir
  }

  /// Shared install prefix.
  pub fn prefix(&self) -> &Path {
    &self.prefix
  }

  pub fn env(&self) -> &BTreeMap<String, String> {
    &self.env
  }

  pub fn network_allowed(&self) -> bool {
    self.network
  }

  /// Directory a source with the given `dest` is applied in.
  pub fn source_dir(&self, dest: Option<&str>) -> PathBuf {
    match dest {
      Some(dest) => self.work_dir.join(dest),
      None => self.work_dir.clone(),
    }
  }

  /// Drop the context, removing the working directory unless `keep` is set.
  pub fn finish(self, keep: bool) -> io::Result<()> {
    if keep {
      debug!(module = %self.module, work_dir = %self.work_dir.display(), "keeping build directory");
      return Ok(());
    }
    std::fs::remove_dir_all(&self.work_dir)
  }
}

/// The fixed environment every build command starts from.
///
/// Nothing is inherited from the calling process.
fn base_env(prefix: &Path, tmp_dir: &Path, app_id: &str) -> BTreeMap<String, String> {
  let p = prefix.display().to_string();
  let tmp = tmp_dir.display().to_string();

  let mut env = BTreeMap::new();
  env.insert("PATH".to_string(), format!("{}/bin:/usr/bin:/bin", p));
  env.insert("HOME".to_string(), "/homeless-shelter".to_string());
  for key in ["TMPDIR", "TMP", "TEMP", "TEMPDIR"] {
    env.insert(key.to_string(), tmp.clone());
  }
  env.insert("LANG".to_string(), "C".to_string());
  env.insert("LC_ALL".to_string(), "C".to_string());
  env.insert("SOURCE_DATE_EPOCH".to_string(), SOURCE_DATE_EPOCH.to_string());
  env.insert("PREFIX".to_string(), p.clone());
  env.insert("APP_ID".to_string(), app_id.to_string());
  env.insert("CPPFLAGS".to_string(), format!("-I{}/include", p));
  env.insert("LDFLAGS".to_string(), format!("-L{}/lib -Wl,-rpath,{}/lib", p, p));
  env.insert("LD_LIBRARY_PATH".to_string(), format!("{}/lib", p));
  env.insert(
    "PKG_CONFIG_PATH".to_string(),
    format!("{}/lib/pkgconfig:{}/share/pkgconfig", p, p),
  );
  env
}

/// Module names may contain characters that are awkward in paths.
/// Directory name for a module; never `.`, `..` or a path with separators.
fn sanitize_dir_name(name: &str) -> String {
  if name.is_empty() || name.chars().all(|c| c == '.') {
    return format!("module-{}", "_".repeat(name.len()));
  }
  name
    .chars()
    .map(|c| {
      if c.is_alphanumeric() || c == '-' || c == '_' || c == '.' {
        c
      } else {
        '_'
      }
    })
    .collect()
}
