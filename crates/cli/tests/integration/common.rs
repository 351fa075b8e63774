//! Shared test helpers for CLI integration tests.

use std::fs::File;
use std::path::{Path, PathBuf};

use assert_cmd::Command;
use assert_cmd::cargo::cargo_bin_cmd;
use flate2::Compression;
use flate2::write::GzEncoder;
use sha2::{Digest, Sha256};
use tempfile::TempDir;

pub const WRONG_SHA256: &str = "0000000000000000000000000000000000000000000000000000000000000000";

/// Isolated test environment.
///
/// Each test gets its own temporary directory holding the manifest, the
/// archives it points at, and isolated state and cache directories.
pub struct TestEnv {
  pub temp: TempDir,
  pub manifest_path: PathBuf,
}

impl TestEnv {
  pub fn new() -> Self {
    let temp = TempDir::new().unwrap();
    let manifest_path = temp.path().join("org.example.App.json");
    Self { temp, manifest_path }
  }

  fn dir(&self, name: &str) -> PathBuf {
    let p = self.temp.path().join(name);
    std::fs::create_dir_all(&p).unwrap();
    dunce::canonicalize(&p).unwrap_or(p)
  }

  pub fn state_path(&self) -> PathBuf {
    self.dir("state")
  }

  pub fn cache_path(&self) -> PathBuf {
    self.dir("cache")
  }

  /// Default install prefix under the isolated state directory.
  pub fn prefix(&self) -> PathBuf {
    self.state_path().join("app").join("files")
  }

  /// Write `<name>-<version>.tar.gz` holding `<name>-<version>/README` and return its path.
  pub fn tarball(&self, name: &str, version: &str) -> PathBuf {
    let path = self.dir("archives").join(format!("{}-{}.tar.gz", name, version));
    let encoder = GzEncoder::new(File::create(&path).unwrap(), Compression::default());
    let mut builder = tar::Builder::new(encoder);
    let data = name.as_bytes();
    let mut header = tar::Header::new_gnu();
    header.set_size(data.len() as u64);
    header.set_mode(0o644);
    header.set_cksum();
    builder
      .append_data(&mut header, format!("{}-{}/README", name, version), data)
      .unwrap();
    builder.into_inner().unwrap().finish().unwrap();
    path
  }

  /// A simple module that copies its README into `share/<name>/`.
  pub fn module(&self, name: &str, sha256: Option<&str>) -> serde_json::Value {
    let tarball = self.tarball(name, "1.0");
    let sha = sha256.map(str::to_string).unwrap_or_else(|| sha256_of(&tarball));
    serde_json::json!({
      "name": name,
      "buildsystem": "simple",
      "build-commands": [format!(
        "mkdir -p \"$PREFIX/share/{0}\" && cp README \"$PREFIX/share/{0}/README\"",
        name
      )],
      "sources": [{"type": "archive", "url": file_url(&tarball), "sha256": sha}]
    })
  }

  /// Write the manifest with the given modules to `manifest_path`.
  pub fn write_manifest(&self, modules: Vec<serde_json::Value>) {
    let manifest = serde_json::json!({
      "app-id": "org.example.App",
      "runtime": "org.example.Platform",
      "runtime-version": "1.0",
      "command": "app",
      "finish-args": ["--share=network"],
      "modules": modules,
    });
    std::fs::write(&self.manifest_path, serde_json::to_string_pretty(&manifest).unwrap()).unwrap();
  }

  /// Get a pre-configured Command for the flatbuild binary.
  ///
  /// Sets `FLATBUILD_STATE_DIR` and `FLATBUILD_CACHE_DIR` to isolated paths.
  pub fn flatbuild_cmd(&self) -> Command {
    let mut cmd: Command = cargo_bin_cmd!("flatbuild");
    cmd.env("FLATBUILD_STATE_DIR", self.state_path());
    cmd.env("FLATBUILD_CACHE_DIR", self.cache_path());
    cmd.env_remove("RUST_LOG");
    cmd
  }
}

pub fn sha256_of(path: &Path) -> String {
  hex::encode(Sha256::digest(std::fs::read(path).unwrap()))
}

pub fn file_url(path: &Path) -> String {
  format!("file://{}", path.display())
}
