//! Finish-args aggregation and bundle metadata.
//!
//! Finish-args are permission tokens of the form `--kind=payload`. They are
//! collected in declaration order, exact duplicates dropped, and written out
//! unchanged: nothing here decides what a permission means at runtime.
//!
//! Two files describe the finished bundle:
//! - `metadata`: a keyfile with `[Application]`, `[Context]` and bus policy groups
//! - `bundle.json`: a machine-readable summary of the run

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use serde::Serialize;
use tracing::info;

use crate::manifest::Manifest;

/// Permission token kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum FinishKind {
  Share,
  Socket,
  Device,
  Filesystem,
  Persist,
  Env,
  TalkName,
  OwnName,
  SystemTalkName,
  SystemOwnName,
  Metadata,
  Other,
}

impl FinishKind {
  fn parse(name: &str) -> Self {
    match name {
      "share" => Self::Share,
      "socket" => Self::Socket,
      "device" => Self::Device,
      "filesystem" => Self::Filesystem,
      "persist" => Self::Persist,
      "env" => Self::Env,
      "talk-name" => Self::TalkName,
      "own-name" => Self::OwnName,
      "system-talk-name" => Self::SystemTalkName,
      "system-own-name" => Self::SystemOwnName,
      "metadata" => Self::Metadata,
      _ => Self::Other,
    }
  }
}

/// One finish-arg as declared.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FinishArg {
  pub kind: FinishKind,
  pub payload: String,
  pub raw: String,
}

impl FinishArg {
  pub fn parse(raw: &str) -> Self {
    let body = raw.trim().trim_start_matches("--");
    let (name, payload) = body.split_once('=').unwrap_or((body, ""));
    Self {
      kind: FinishKind::parse(name),
      payload: payload.to_string(),
      raw: raw.trim().to_string(),
    }
  }
}

/// Aggregated finish-args of a manifest.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FinishArgs {
  pub args: Vec<FinishArg>,
}

impl FinishArgs {
  fn payloads(&self, kind: FinishKind) -> impl Iterator<Item = &str> {
    self.args.iter().filter(move |a| a.kind == kind).map(|a| a.payload.as_str())
  }

  /// Render the `metadata` keyfile.
  pub fn render_metadata(&self, manifest: &Manifest, arch: &str) -> String {
    let versioned = |name: &str| match &manifest.runtime_version {
      Some(version) => format!("{}/{}/{}", name, arch, version),
      None => format!("{}/{}", name, arch),
    };

    let mut out = String::new();
    let _ = writeln!(out, "[Application]");
    let _ = writeln!(out, "name={}", manifest.app_id);
    let _ = writeln!(out, "runtime={}", versioned(&manifest.runtime));
    if let Some(sdk) = &manifest.sdk {
      let _ = writeln!(out, "sdk={}", versioned(sdk));
    }
    let _ = writeln!(out, "command={}", manifest.command);

    let context: Vec<(&str, FinishKind)> = vec![
      ("shared", FinishKind::Share),
      ("sockets", FinishKind::Socket),
      ("devices", FinishKind::Device),
      ("filesystems", FinishKind::Filesystem),
      ("persistent", FinishKind::Persist),
    ];
    let context_lines: Vec<String> = context
      .into_iter()
      .filter_map(|(key, kind)| {
        let values: Vec<&str> = self.payloads(kind).collect();
        (!values.is_empty()).then(|| format!("{}={};", key, values.join(";")))
      })
      .collect();
    write_group(&mut out, "Context", &context_lines);

    let session: Vec<String> = self
      .payloads(FinishKind::TalkName)
      .map(|n| format!("{}=talk", n))
      .chain(self.payloads(FinishKind::OwnName).map(|n| format!("{}=own", n)))
      .collect();
    write_group(&mut out, "Session Bus Policy", &session);

    let system: Vec<String> = self
      .payloads(FinishKind::SystemTalkName)
      .map(|n| format!("{}=talk", n))
      .chain(self.payloads(FinishKind::SystemOwnName).map(|n| format!("{}=own", n)))
      .collect();
    write_group(&mut out, "System Bus Policy", &system);

    let env: Vec<String> = self.payloads(FinishKind::Env).map(String::from).collect();
    write_group(&mut out, "Environment", &env);

    // --metadata=GROUP=KEY[=VALUE]
    let mut extra: BTreeMap<&str, Vec<String>> = BTreeMap::new();
    for payload in self.payloads(FinishKind::Metadata) {
      if let Some((group, entry)) = payload.split_once('=') {
        let line = if entry.contains('=') {
          entry.to_string()
        } else {
          format!("{}=true", entry)
        };
        extra.entry(group).or_default().push(line);
      }
    }
    for (group, lines) in extra {
      write_group(&mut out, group, &lines);
    }
    out
  }
}

fn write_group(out: &mut String, name: &str, lines: &[String]) {
  if lines.is_empty() {
    return;
  }
  let _ = writeln!(out, "\n[{}]", name);
  for line in lines {
    let _ = writeln!(out, "{}", line);
  }
}

/// Collect the manifest's finish-args in order, dropping exact duplicates.
pub fn collect_finish_args(manifest: &Manifest) -> FinishArgs {
  let mut args: Vec<FinishArg> = Vec::new();
  for raw in &manifest.finish_args {
    let arg = FinishArg::parse(raw);
    if arg.raw.is_empty() || args.iter().any(|a| a.raw == arg.raw) {
      continue;
    }
    args.push(arg);
  }
  FinishArgs { args }
}

/// Machine-readable summary written as `bundle.json`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct BundleSummary<'a> {
  pub app_id: &'a str,
  pub runtime: &'a str,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub runtime_version: Option<&'a str>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub sdk: Option<&'a str>,
  pub command: &'a str,
  pub arch: &'a str,
  pub modules: &'a [String],
  pub finish_args: Vec<&'a str>,
  pub created: String,
}

/// Files written for a finished bundle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BundleFiles {
  pub metadata: PathBuf,
  pub summary: PathBuf,
}

/// Write `metadata` and `bundle.json` into `dir`.
pub fn write_bundle(
  dir: &Path,
  manifest: &Manifest,
  finish: &FinishArgs,
  modules: &[String],
  arch: &str,
) -> std::io::Result<BundleFiles> {
  std::fs::create_dir_all(dir)?;

  let metadata = dir.join("metadata");
  std::fs::write(&metadata, finish.render_metadata(manifest, arch))?;

  let summary = BundleSummary {
    app_id: &manifest.app_id,
    runtime: &manifest.runtime,
    runtime_version: manifest.runtime_version.as_deref(),
    sdk: manifest.sdk.as_deref(),
    command: &manifest.command,
    arch,
    modules,
    finish_args: finish.args.iter().map(|a| a.raw.as_str()).collect(),
    created: humantime::format_rfc3339_seconds(SystemTime::now()).to_string(),
  };
  let summary_path = dir.join("bundle.json");
  let json = serde_json::to_string_pretty(&summary).map_err(std::io::Error::other)?;
  std::fs::write(&summary_path, json + "\n")?;

  info!(dir = %dir.display(), args = finish.args.len(), "wrote bundle metadata");
  Ok(BundleFiles {
    metadata,
    summary: summary_path,
  })
}

#[cfg(test)]
mod tests {
  use super::*;
  use tempfile::TempDir;

  fn manifest(finish_args: &[&str]) -> Manifest {
    Manifest {
      app_id: "org.example.App".to_string(),
      runtime: "org.example.Platform".to_string(),
      runtime_version: Some("22.08".to_string()),
      sdk: Some("org.example.Sdk".to_string()),
      command: "app".to_string(),
      finish_args: finish_args.iter().map(|s| s.to_string()).collect(),
      cleanup: vec![],
      cleanup_commands: vec![],
      modules: vec![],
      base_dir: PathBuf::from("."),
    }
  }

  #[test]
  fn parses_kinds_and_payloads() {
    let arg = FinishArg::parse("--talk-name=org.freedesktop.Notifications");
    assert_eq!(arg.kind, FinishKind::TalkName);
    assert_eq!(arg.payload, "org.freedesktop.Notifications");

    let arg = FinishArg::parse("--require-version=1.0");
    assert_eq!(arg.kind, FinishKind::Other);
    assert_eq!(arg.raw, "--require-version=1.0");
  }

  #[test]
  fn collect_keeps_order_and_drops_duplicates() {
    let m = manifest(&["--share=network", "--socket=x11", "--share=network", "--share=ipc"]);
    let raws: Vec<String> = collect_finish_args(&m).args.into_iter().map(|a| a.raw).collect();
    assert_eq!(raws, vec!["--share=network", "--socket=x11", "--share=ipc"]);
  }

  #[test]
  fn metadata_keyfile_groups() {
    let m = manifest(&[
      "--share=network",
      "--share=ipc",
      "--socket=wayland",
      "--filesystem=xdg-download:ro",
      "--talk-name=org.freedesktop.Notifications",
      "--own-name=org.example.App.Helper",
      "--env=GTK_THEME=Adwaita",
      "--metadata=X-DConf=migrate-path=/org/example/app/",
    ]);
    let text = collect_finish_args(&m).render_metadata(&m, "x86_64");

    assert!(text.starts_with("[Application]\nname=org.example.App\n"));
    assert!(text.contains("runtime=org.example.Platform/x86_64/22.08\n"));
    assert!(text.contains("sdk=org.example.Sdk/x86_64/22.08\n"));
    assert!(text.contains("[Context]\nshared=network;ipc;\nsockets=wayland;\nfilesystems=xdg-download:ro;\n"));
    assert!(text.contains(
      "[Session Bus Policy]\norg.freedesktop.Notifications=talk\norg.example.App.Helper=own\n"
    ));
    assert!(text.contains("[Environment]\nGTK_THEME=Adwaita\n"));
    assert!(text.contains("[X-DConf]\nmigrate-path=/org/example/app/\n"));
    assert!(!text.contains("[System Bus Policy]"));
  }

  #[test]
  fn write_bundle_creates_both_files() {
    let temp = TempDir::new().unwrap();
    let m = manifest(&["--socket=x11"]);
    let finish = collect_finish_args(&m);
    let modules = vec!["zlib".to_string(), "app".to_string()];

    let files = write_bundle(&temp.path().join("bundle"), &m, &finish, &modules, "aarch64").unwrap();
    assert!(std::fs::read_to_string(&files.metadata).unwrap().contains("sockets=x11;"));

    let summary: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(&files.summary).unwrap()).unwrap();
    assert_eq!(summary["app-id"], "org.example.App");
    assert_eq!(summary["arch"], "aarch64");
    assert_eq!(summary["modules"], serde_json::json!(["zlib", "app"]));
    assert_eq!(summary["finish-args"], serde_json::json!(["--socket=x11"]));
    assert!(humantime::parse_rfc3339(summary["created"].as_str().unwrap()).is_ok());
  }
}
