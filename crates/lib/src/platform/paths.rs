//! Directory resolution for state and cache.
//!
//! Explicit overrides (`FLATBUILD_STATE_DIR`, `FLATBUILD_CACHE_DIR`) win, then
//! the XDG base directories, then the conventional locations under `$HOME`.

use std::path::PathBuf;

use crate::consts::{APP_NAME, CACHE_DIR_ENV, STATE_DIR_ENV};

/// Returns the user's home directory.
///
/// Falls back to the current directory when `HOME` is unset (e.g. inside a minimal container).
pub fn home_dir() -> PathBuf {
  std::env::var_os("HOME")
    .map(PathBuf::from)
    .unwrap_or_else(|| PathBuf::from("."))
}

/// Returns the directory for persistent data files for the application.
pub fn data_dir() -> PathBuf {
  let data_home = std::env::var("XDG_DATA_HOME")
    .map(PathBuf::from)
    .unwrap_or_else(|_| home_dir().join(".local").join("share"));
  data_home.join(APP_NAME)
}

/// Returns the directory for cache files for the application.
pub fn cache_dir() -> PathBuf {
  if let Ok(path) = std::env::var(CACHE_DIR_ENV) {
    return PathBuf::from(path);
  }
  let cache_home = std::env::var("XDG_CACHE_HOME")
    .map(PathBuf::from)
    .unwrap_or_else(|_| home_dir().join(".cache"));
  cache_home.join(APP_NAME)
}

/// Returns the state directory holding build directories, prefixes and bundle output.
pub fn state_dir() -> PathBuf {
  if let Ok(path) = std::env::var(STATE_DIR_ENV) {
    return PathBuf::from(path);
  }
  data_dir().join("state")
}

/// Verified downloads, keyed by checksum.
pub fn downloads_dir() -> PathBuf {
  cache_dir().join("downloads")
}

/// Bare mirrors of git sources.
pub fn git_cache_dir() -> PathBuf {
  cache_dir().join("git")
}
