//! Test utilities for flatbuild-lib.
//!
//! Helpers for building small archives on disk and pointing sources at them
//! through `file://` URLs, so fetch tests never touch the network.

use std::fs::File;
use std::path::{Path, PathBuf};

use flate2::Compression;
use flate2::write::GzEncoder;

use crate::util::hash::{DigestAlgorithm, hash_bytes};

/// Write a `.tar.gz` at `dest` whose entries live under a single `top/` directory.
///
/// `files` are `(relative path, contents)` pairs; the top directory mirrors the
/// layout of release tarballs so `strip-components = 1` yields the bare tree.
pub fn write_tar_gz(dest: &Path, top: &str, files: &[(&str, &str)]) -> PathBuf {
  let file = File::create(dest).unwrap();
  let encoder = GzEncoder::new(file, Compression::default());
  let mut builder = tar::Builder::new(encoder);

  for (name, contents) in files {
    let mut header = tar::Header::new_gnu();
    header.set_size(contents.len() as u64);
    header.set_mode(0o755);
    header.set_cksum();
    builder
      .append_data(&mut header, format!("{}/{}", top, name), contents.as_bytes())
      .unwrap();
  }

  builder.into_inner().unwrap().finish().unwrap();
  dest.to_path_buf()
}

/// `file://` URL for a local path.
pub fn file_url(path: &Path) -> String {
  format!("file://{}", path.display())
}

/// SHA-256 of a file on disk as lowercase hex.
pub fn sha256_of(path: &Path) -> String {
  hash_bytes(&std::fs::read(path).unwrap(), DigestAlgorithm::Sha256).0
}

/// A syntactically valid checksum that matches nothing used in tests.
pub const WRONG_SHA256: &str = "0000000000000000000000000000000000000000000000000000000000000000";

/// Returns the shell command printing an environment variable.
pub fn echo_env(var: &str) -> String {
  format!("echo \"${}\"", var)
}
