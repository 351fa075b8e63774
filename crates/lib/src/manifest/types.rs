//! Manifest types for flatbuild.
//!
//! The manifest is the central data structure of a build run. It's produced by
//! [`parse_manifest`](super::parse_manifest) and is immutable afterwards: every
//! later stage reads borrowed views of its modules and sources.
//!
//! # Structure
//!
//! - [`Manifest`]: application identity, runtime, entrypoint, finish-args and global cleanup
//! - [`Module`]: one buildable unit, with ordered [`Source`]s and its own cleanup rules
//! - [`Source`]: closed set of source kinds, applied in declaration order
//! - [`CheckerData`]: optional upstream version checker attached to an archive source
//!
//! # Serialization
//!
//! Types serialize back to the manifest's own kebab-case JSON layout, which is
//! how a re-pinned manifest is written out.

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::Serialize;

use crate::util::hash::Checksum;

/// A loaded bundle manifest.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct Manifest {
  pub app_id: String,
  pub runtime: String,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub runtime_version: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub sdk: Option<String>,
  pub command: String,
  #[serde(skip_serializing_if = "Vec::is_empty")]
  pub finish_args: Vec<String>,
  #[serde(skip_serializing_if = "Vec::is_empty")]
  pub cleanup: Vec<String>,
  #[serde(skip_serializing_if = "Vec::is_empty")]
  pub cleanup_commands: Vec<String>,
  pub modules: Vec<Module>,
  /// Directory relative `path` entries are resolved against.
  #[serde(skip)]
  pub base_dir: PathBuf,
}

/// Build system protocol used to configure, build and install a module.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum BuildSystem {
  #[default]
  Autotools,
  Simple,
  Meson,
  Cmake,
  CmakeNinja,
}

impl BuildSystem {
  pub fn parse(name: &str) -> Option<Self> {
    match name {
      "autotools" => Some(Self::Autotools),
      "simple" => Some(Self::Simple),
      "meson" => Some(Self::Meson),
      "cmake" => Some(Self::Cmake),
      "cmake-ninja" => Some(Self::CmakeNinja),
      _ => None,
    }
  }

  pub fn as_str(self) -> &'static str {
    match self {
      Self::Autotools => "autotools",
      Self::Simple => "simple",
      Self::Meson => "meson",
      Self::Cmake => "cmake",
      Self::CmakeNinja => "cmake-ninja",
    }
  }
}

/// Per-module environment and sandbox options.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct BuildOptions {
  #[serde(skip_serializing_if = "BTreeMap::is_empty")]
  pub env: BTreeMap<String, String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub append_path: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub prepend_path: Option<String>,
  /// Sandbox arguments; `--share=network` grants network access to the build.
  #[serde(skip_serializing_if = "Vec::is_empty")]
  pub build_args: Vec<String>,
}

impl BuildOptions {
  pub fn network_allowed(&self) -> bool {
    self.build_args.iter().any(|arg| arg == "--share=network")
  }

  pub fn is_empty(&self) -> bool {
    self == &Self::default()
  }
}

/// One buildable unit.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct Module {
  pub name: String,
  pub buildsystem: BuildSystem,
  #[serde(skip_serializing_if = "Vec::is_empty")]
  pub config_opts: Vec<String>,
  #[serde(skip_serializing_if = "Vec::is_empty")]
  pub build_commands: Vec<String>,
  #[serde(skip_serializing_if = "Vec::is_empty")]
  pub post_install: Vec<String>,
  pub sources: Vec<Source>,
  #[serde(skip_serializing_if = "Vec::is_empty")]
  pub cleanup: Vec<String>,
  #[serde(skip_serializing_if = "std::ops::Not::not")]
  pub builddir: bool,
  #[serde(skip_serializing_if = "BuildOptions::is_empty")]
  pub build_options: BuildOptions,
  #[serde(skip_serializing_if = "std::ops::Not::not")]
  pub disabled: bool,
  #[serde(skip_serializing_if = "Vec::is_empty")]
  pub only_arches: Vec<String>,
  #[serde(skip_serializing_if = "Vec::is_empty")]
  pub skip_arches: Vec<String>,
  /// Nested modules, built before this one.
  #[serde(skip_serializing_if = "Vec::is_empty")]
  pub modules: Vec<Module>,
}

impl Module {
  /// A module with the given name and every other field defaulted.
  pub fn named(name: impl Into<String>) -> Self {
    Self {
      name: name.into(),
      buildsystem: BuildSystem::default(),
      config_opts: Vec::new(),
      build_commands: Vec::new(),
      post_install: Vec::new(),
      sources: Vec::new(),
      cleanup: Vec::new(),
      builddir: false,
      build_options: BuildOptions::default(),
      disabled: false,
      only_arches: Vec::new(),
      skip_arches: Vec::new(),
      modules: Vec::new(),
    }
  }

  /// Whether the module should be built on the given architecture.
  pub fn enabled_for_arch(&self, arch: &str) -> bool {
    if self.disabled {
      return false;
    }
    if !self.only_arches.is_empty() && !self.only_arches.iter().any(|a| a == arch) {
      return false;
    }
    !self.skip_arches.iter().any(|a| a == arch)
  }
}

/// One input consumed while assembling a module's working tree.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum Source {
  Archive(ArchiveSource),
  Git(GitSource),
  Shell(ShellSource),
  Patch(PatchSource),
  File(FileSource),
}

impl Source {
  pub fn kind(&self) -> &'static str {
    match self {
      Self::Archive(_) => "archive",
      Self::Git(_) => "git",
      Self::Shell(_) => "shell",
      Self::Patch(_) => "patch",
      Self::File(_) => "file",
    }
  }

  /// A short human label: URL, path, or first command.
  pub fn describe(&self) -> String {
    match self {
      Self::Archive(a) => a.url.clone(),
      Self::Git(g) => g.location.to_string(),
      Self::Shell(s) => s.commands.first().cloned().unwrap_or_default(),
      Self::Patch(p) => p.path.display().to_string(),
      Self::File(f) => f.location.to_string(),
    }
  }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct ArchiveSource {
  pub url: String,
  #[serde(flatten)]
  pub checksum: Checksum,
  pub strip_components: usize,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub dest: Option<String>,
  #[serde(rename = "x-checker-data", skip_serializing_if = "Option::is_none")]
  pub checker: Option<CheckerData>,
}

/// Where a git or file source comes from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Location {
  Url(String),
  Path(PathBuf),
}

impl std::fmt::Display for Location {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      Self::Url(url) => f.write_str(url),
      Self::Path(path) => write!(f, "{}", path.display()),
    }
  }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct GitSource {
  #[serde(flatten)]
  pub location: Location,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub commit: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub tag: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub branch: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub dest: Option<String>,
}

impl GitSource {
  /// The pinned reference, most specific first.
  pub fn pinned_ref(&self) -> Option<&str> {
    self
      .commit
      .as_deref()
      .or(self.tag.as_deref())
      .or(self.branch.as_deref())
  }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ShellSource {
  pub commands: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct PatchSource {
  pub path: PathBuf,
  pub strip_components: usize,
  #[serde(skip_serializing_if = "Vec::is_empty")]
  pub options: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct FileSource {
  #[serde(flatten)]
  pub location: Location,
  #[serde(flatten)]
  pub checksum: Checksum,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub dest_filename: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub dest: Option<String>,
}

/// Upstream version checker attached to an archive source (`x-checker-data`).
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum CheckerData {
  Html {
    url: String,
    #[serde(rename = "version-pattern")]
    version_pattern: String,
    #[serde(rename = "url-template", skip_serializing_if = "Option::is_none")]
    url_template: Option<String>,
  },
  Json {
    url: String,
    #[serde(rename = "version-query")]
    version_query: String,
    #[serde(rename = "url-query")]
    url_query: String,
  },
}

impl CheckerData {
  pub fn url(&self) -> &str {
    match self {
      Self::Html { url, .. } | Self::Json { url, .. } => url,
    }
  }

  pub fn kind(&self) -> &'static str {
    match self {
      Self::Html { .. } => "html",
      Self::Json { .. } => "json",
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::util::hash::DigestAlgorithm;

  fn sample_archive() -> ArchiveSource {
    ArchiveSource {
      url: "https://example.com/foo-1.0.tar.gz".to_string(),
      checksum: Checksum::parse(DigestAlgorithm::Sha256, &"a".repeat(64)).unwrap(),
      strip_components: 1,
      dest: None,
      checker: None,
    }
  }

  #[test]
  fn archive_serializes_with_type_tag_and_checksum_field() {
    let value = serde_json::to_value(Source::Archive(sample_archive())).unwrap();
    assert_eq!(value["type"], "archive");
    assert_eq!(value["sha256"], "a".repeat(64));
    assert_eq!(value["strip-components"], 1);
    assert!(value.get("x-checker-data").is_none());
  }

  #[test]
  fn git_location_flattens_to_url_or_path() {
    let git = GitSource {
      location: Location::Path(PathBuf::from(".")),
      commit: None,
      tag: Some("v1".to_string()),
      branch: None,
      dest: None,
    };
    let value = serde_json::to_value(Source::Git(git)).unwrap();
    assert_eq!(value["path"], ".");
    assert_eq!(value["tag"], "v1");
  }

  #[test]
  fn pinned_ref_prefers_commit() {
    let git = GitSource {
      location: Location::Url("https://example.com/r.git".to_string()),
      commit: Some("abc".to_string()),
      tag: Some("v1".to_string()),
      branch: Some("main".to_string()),
      dest: None,
    };
    assert_eq!(git.pinned_ref(), Some("abc"));
  }

  #[test]
  fn arch_filters() {
    let mut module = Module::named("m");
    assert!(module.enabled_for_arch("x86_64"));

    module.only_arches = vec!["aarch64".to_string()];
    assert!(!module.enabled_for_arch("x86_64"));
    assert!(module.enabled_for_arch("aarch64"));

    module.only_arches.clear();
    module.skip_arches = vec!["aarch64".to_string()];
    assert!(!module.enabled_for_arch("aarch64"));

    module.skip_arches.clear();
    module.disabled = true;
    assert!(!module.enabled_for_arch("x86_64"));
  }

  #[test]
  fn network_requires_share_network_arg() {
    let mut options = BuildOptions::default();
    assert!(!options.network_allowed());
    options.build_args.push("--share=network".to_string());
    assert!(options.network_allowed());
  }
}
