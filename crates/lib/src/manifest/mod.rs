//! Manifest loading.
//!
//! A manifest is read once per run, comments stripped, parsed into a value
//! tree, then validated into typed records. Loading has no side effects
//! beyond reading the file.

mod comments;
mod types;
mod validate;

use std::path::Path;

use tracing::debug;

pub use comments::strip_comments;
pub use types::*;
pub use validate::SchemaError;

/// Text format of a manifest file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManifestFormat {
  Json,
  Yaml,
}

impl ManifestFormat {
  /// Pick the format from a file extension; anything but `.yaml`/`.yml` is JSON.
  pub fn from_path(path: &Path) -> Self {
    match path.extension().and_then(|e| e.to_str()) {
      Some("yaml") | Some("yml") => Self::Yaml,
      _ => Self::Json,
    }
  }

  fn name(self) -> &'static str {
    match self {
      Self::Json => "JSON",
      Self::Yaml => "YAML",
    }
  }
}

/// Parse and validate manifest text.
///
/// `base_dir` is recorded on the manifest and used later to resolve relative
/// `path` entries of git, patch and file sources.
pub fn parse_manifest(text: &str, format: ManifestFormat, base_dir: &Path) -> Result<Manifest, SchemaError> {
  let syntax = |message: String| SchemaError::Syntax {
    format: format.name(),
    message,
  };
  let value: serde_json::Value = match format {
    ManifestFormat::Json => serde_json::from_str(&strip_comments(text)).map_err(|e| syntax(e.to_string()))?,
    ManifestFormat::Yaml => serde_yaml::from_str(text).map_err(|e| syntax(e.to_string()))?,
  };

  validate::validate(&value, base_dir)
}

/// Read, parse and validate a manifest file.
pub fn load_manifest(path: &Path) -> Result<Manifest, SchemaError> {
  let text = std::fs::read_to_string(path).map_err(|source| SchemaError::Read {
    path: path.to_path_buf(),
    source,
  })?;

  let base_dir = path
    .parent()
    .filter(|p| !p.as_os_str().is_empty())
    .map(|p| dunce::canonicalize(p).unwrap_or_else(|_| p.to_path_buf()))
    .unwrap_or_else(|| std::env::current_dir().unwrap_or_else(|_| ".".into()));

  let manifest = parse_manifest(&text, ManifestFormat::from_path(path), &base_dir)?;
  debug!(
    app_id = %manifest.app_id,
    modules = manifest.modules.len(),
    path = %path.display(),
    "loaded manifest"
  );
  Ok(manifest)
}
