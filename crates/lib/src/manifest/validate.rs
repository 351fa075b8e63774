//! Schema validation from a parsed value tree into typed manifest records.
//!
//! Every error names the offending field by its path from the document root,
//! e.g. `modules[1].sources[0].sha256`.

use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};

use serde_json::{Map, Value};
use thiserror::Error;

use crate::consts::DEFAULT_STRIP_COMPONENTS;
use crate::util::hash::{Checksum, DigestAlgorithm};

use super::types::{
  ArchiveSource, BuildOptions, BuildSystem, CheckerData, FileSource, GitSource, Location, Manifest, Module,
  PatchSource, ShellSource, Source,
};

/// A malformed manifest. Non-retryable; reported before any fetch starts.
#[derive(Debug, Error)]
pub enum SchemaError {
  /// The manifest file could not be read.
  #[error("failed to read manifest {path}: {source}")]
  Read {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  /// The text is not structurally valid JSON/YAML.
  #[error("manifest is not valid {format}: {message}")]
  Syntax { format: &'static str, message: String },

  /// A field is missing, has the wrong type, or holds an invalid value.
  #[error("{path}: {message}")]
  Field { path: String, message: String },
}

impl SchemaError {
  /// Path of the offending field, when the error is about one.
  pub fn field_path(&self) -> Option<&str> {
    match self {
      Self::Field { path, .. } => Some(path),
      _ => None,
    }
  }

  fn field(path: impl Into<String>, message: impl Into<String>) -> Self {
    Self::Field {
      path: path.into(),
      message: message.into(),
    }
  }
}

type Result<T> = std::result::Result<T, SchemaError>;

/// Borrowed view of one JSON object together with its path.
struct Obj<'a> {
  path: String,
  map: &'a Map<String, Value>,
}

impl<'a> Obj<'a> {
  fn new(path: impl Into<String>, value: &'a Value) -> Result<Self> {
    let path = path.into();
    match value.as_object() {
      Some(map) => Ok(Self { path, map }),
      None => Err(SchemaError::field(display_path(&path), "expected an object")),
    }
  }

  fn child(&self, key: &str) -> String {
    if self.path.is_empty() {
      key.to_string()
    } else {
      format!("{}.{}", self.path, key)
    }
  }

  fn get(&self, key: &str) -> Option<&'a Value> {
    self.map.get(key).filter(|v| !v.is_null())
  }

  fn opt_str(&self, key: &str) -> Result<Option<String>> {
    match self.get(key) {
      None => Ok(None),
      Some(Value::String(s)) => Ok(Some(s.clone())),
      Some(_) => Err(SchemaError::field(self.child(key), "expected a string")),
    }
  }

  /// An optional path that must stay inside the module's working tree.
  fn opt_rel_path(&self, key: &str) -> Result<Option<String>> {
    let Some(value) = self.opt_str(key)? else {
      return Ok(None);
    };
    let escapes = Path::new(&value)
      .components()
      .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
    if escapes {
      return Err(SchemaError::field(self.child(key), "must be a relative path without '..'"));
    }
    Ok(Some(value))
  }

  fn req_str(&self, key: &str) -> Result<String> {
    match self.opt_str(key)? {
      Some(s) if !s.trim().is_empty() => Ok(s),
      Some(_) => Err(SchemaError::field(self.child(key), "must not be empty")),
      None => Err(SchemaError::field(self.child(key), "required field is missing")),
    }
  }

  fn opt_bool(&self, key: &str) -> Result<bool> {
    match self.get(key) {
      None => Ok(false),
      Some(Value::Bool(b)) => Ok(*b),
      Some(_) => Err(SchemaError::field(self.child(key), "expected a boolean")),
    }
  }

  fn opt_usize(&self, key: &str, default: usize) -> Result<usize> {
    match self.get(key) {
      None => Ok(default),
      Some(v) => v
        .as_u64()
        .map(|n| n as usize)
        .ok_or_else(|| SchemaError::field(self.child(key), "expected a non-negative integer")),
    }
  }

  fn str_list(&self, key: &str) -> Result<Vec<String>> {
    let Some(value) = self.get(key) else {
      return Ok(Vec::new());
    };
    let items = value
      .as_array()
      .ok_or_else(|| SchemaError::field(self.child(key), "expected an array of strings"))?;
    items
      .iter()
      .enumerate()
      .map(|(i, item)| {
        item
          .as_str()
          .map(str::to_string)
          .ok_or_else(|| SchemaError::field(format!("{}[{}]", self.child(key), i), "expected a string"))
      })
      .collect()
  }

  fn array(&self, key: &str) -> Result<&'a [Value]> {
    match self.get(key) {
      None => Ok(&[]),
      Some(Value::Array(items)) => Ok(items),
      Some(_) => Err(SchemaError::field(self.child(key), "expected an array")),
    }
  }
}

fn display_path(path: &str) -> String {
  if path.is_empty() { "<root>".to_string() } else { path.to_string() }
}

/// Validate a parsed document into a [`Manifest`].
pub fn validate(root: &Value, base_dir: &Path) -> Result<Manifest> {
  let obj = Obj::new("", root)?;

  let app_id = match obj.opt_str("app-id")? {
    Some(id) => id,
    None => obj
      .opt_str("id")?
      .ok_or_else(|| SchemaError::field("app-id", "required field is missing"))?,
  };
  if app_id.trim().is_empty() {
    return Err(SchemaError::field("app-id", "must not be empty"));
  }

  let mut modules = Vec::new();
  for (i, item) in obj.array("modules")?.iter().enumerate() {
    modules.push(validate_module(&format!("modules[{}]", i), item)?);
  }

  Ok(Manifest {
    app_id,
    runtime: obj.req_str("runtime")?,
    runtime_version: obj.opt_str("runtime-version")?,
    sdk: obj.opt_str("sdk")?,
    command: obj.req_str("command")?,
    finish_args: obj.str_list("finish-args")?,
    cleanup: obj.str_list("cleanup")?,
    cleanup_commands: obj.str_list("cleanup-commands")?,
    modules,
    base_dir: base_dir.to_path_buf(),
  })
}

fn validate_module(path: &str, value: &Value) -> Result<Module> {
  if value.is_string() {
    return Err(SchemaError::field(path, "module file references are not supported; inline the module"));
  }
  let obj = Obj::new(path, value)?;
  let name = obj.req_str("name")?;
  if name == "." || name == ".." || name.contains(['/', '\\']) {
    return Err(SchemaError::field(
      obj.child("name"),
      "must not be '.' or '..' or contain path separators",
    ));
  }

  let buildsystem = match obj.opt_str("buildsystem")? {
    None => BuildSystem::default(),
    Some(name) => BuildSystem::parse(&name).ok_or_else(|| {
      SchemaError::field(
        obj.child("buildsystem"),
        format!("unknown build system {:?} (expected simple, meson, autotools, cmake, cmake-ninja)", name),
      )
    })?,
  };

  let mut sources = Vec::new();
  for (i, item) in obj.array("sources")?.iter().enumerate() {
    sources.push(validate_source(&format!("{}[{}]", obj.child("sources"), i), item)?);
  }

  let mut modules = Vec::new();
  for (i, item) in obj.array("modules")?.iter().enumerate() {
    modules.push(validate_module(&format!("{}[{}]", obj.child("modules"), i), item)?);
  }

  let build_options = match obj.get("build-options") {
    None => BuildOptions::default(),
    Some(v) => validate_build_options(&obj.child("build-options"), v)?,
  };

  let module = Module {
    name,
    buildsystem,
    config_opts: obj.str_list("config-opts")?,
    build_commands: obj.str_list("build-commands")?,
    post_install: obj.str_list("post-install")?,
    sources,
    cleanup: obj.str_list("cleanup")?,
    builddir: obj.opt_bool("builddir")?,
    build_options,
    disabled: obj.opt_bool("disabled")?,
    only_arches: obj.str_list("only-arches")?,
    skip_arches: obj.str_list("skip-arches")?,
    modules,
  };

  if module.buildsystem != BuildSystem::Simple && !module.build_commands.is_empty() {
    return Err(SchemaError::field(
      obj.child("build-commands"),
      "only allowed with buildsystem \"simple\"",
    ));
  }

  Ok(module)
}

fn validate_build_options(path: &str, value: &Value) -> Result<BuildOptions> {
  let obj = Obj::new(path, value)?;

  let mut env = BTreeMap::new();
  if let Some(env_value) = obj.get("env") {
    let env_obj = Obj::new(obj.child("env"), env_value)?;
    for key in env_obj.map.keys() {
      env.insert(key.clone(), env_obj.opt_str(key)?.unwrap_or_default());
    }
  }

  Ok(BuildOptions {
    env,
    append_path: obj.opt_str("append-path")?,
    prepend_path: obj.opt_str("prepend-path")?,
    build_args: obj.str_list("build-args")?,
  })
}

fn validate_source(path: &str, value: &Value) -> Result<Source> {
  let obj = Obj::new(path, value)?;
  let kind = obj.req_str("type")?;

  if kind != "archive" && obj.get("x-checker-data").is_some() {
    return Err(SchemaError::field(
      obj.child("x-checker-data"),
      "checker data is only supported on archive sources",
    ));
  }

  let source = match kind.as_str() {
    "archive" => Source::Archive(ArchiveSource {
      url: obj.req_str("url")?,
      checksum: validate_checksum(&obj)?,
      strip_components: obj.opt_usize("strip-components", DEFAULT_STRIP_COMPONENTS)?,
      dest: obj.opt_rel_path("dest")?,
      checker: match obj.get("x-checker-data") {
        None => None,
        Some(v) => Some(validate_checker(&obj.child("x-checker-data"), v)?),
      },
    }),
    "git" => Source::Git(GitSource {
      location: validate_location(&obj)?,
      commit: obj.opt_str("commit")?,
      tag: obj.opt_str("tag")?,
      branch: obj.opt_str("branch")?,
      dest: obj.opt_rel_path("dest")?,
    }),
    "shell" => {
      let commands = obj.str_list("commands")?;
      if commands.is_empty() {
        return Err(SchemaError::field(obj.child("commands"), "shell source needs at least one command"));
      }
      Source::Shell(ShellSource { commands })
    }
    "patch" => Source::Patch(PatchSource {
      path: PathBuf::from(obj.req_str("path")?),
      strip_components: obj.opt_usize("strip-components", DEFAULT_STRIP_COMPONENTS)?,
      options: obj.str_list("options")?,
    }),
    "file" => Source::File(FileSource {
      location: validate_location(&obj)?,
      checksum: validate_checksum(&obj)?,
      dest_filename: obj.opt_rel_path("dest-filename")?,
      dest: obj.opt_rel_path("dest")?,
    }),
    other => {
      return Err(SchemaError::field(
        obj.child("type"),
        format!("unknown source type {:?} (expected archive, git, shell, patch, file)", other),
      ));
    }
  };

  Ok(source)
}

fn validate_location(obj: &Obj<'_>) -> Result<Location> {
  match (obj.opt_str("url")?, obj.opt_str("path")?) {
    (Some(_), Some(_)) => Err(SchemaError::field(obj.child("path"), "give either url or path, not both")),
    (Some(url), None) => Ok(Location::Url(url)),
    (None, Some(path)) => Ok(Location::Path(PathBuf::from(path))),
    (None, None) => Err(SchemaError::field(obj.child("url"), "required field is missing (url or path)")),
  }
}

fn validate_checksum(obj: &Obj<'_>) -> Result<Checksum> {
  for algorithm in [DigestAlgorithm::Sha256, DigestAlgorithm::Sha512] {
    if let Some(hex) = obj.opt_str(algorithm.field())? {
      return Checksum::parse(algorithm, &hex)
        .map_err(|e| SchemaError::field(obj.child(algorithm.field()), e.to_string()));
    }
  }
  Err(SchemaError::field(
    obj.child("sha256"),
    "required field is missing; sources must carry a checksum",
  ))
}

fn validate_checker(path: &str, value: &Value) -> Result<CheckerData> {
  let obj = Obj::new(path, value)?;
  let kind = obj.req_str("type")?;
  let url = obj.req_str("url")?;

  match kind.as_str() {
    "html" => {
      let version_pattern = obj.req_str("version-pattern")?;
      regex::Regex::new(&version_pattern)
        .map_err(|e| SchemaError::field(obj.child("version-pattern"), format!("invalid regex: {}", e)))?;
      Ok(CheckerData::Html {
        url,
        version_pattern,
        url_template: obj.opt_str("url-template")?,
      })
    }
    "json" => Ok(CheckerData::Json {
      url,
      version_query: obj.req_str("version-query")?,
      url_query: obj.req_str("url-query")?,
    }),
    other => Err(SchemaError::field(
      obj.child("type"),
      format!("unknown checker type {:?} (expected html or json)", other),
    )),
  }
}
