#![cfg(unix)]

use predicates::prelude::*;

use super::common::{TestEnv, WRONG_SHA256};

#[test]
fn build_installs_modules_and_writes_metadata() {
  let env = TestEnv::new();
  env.write_manifest(vec![env.module("libfoo", None), env.module("app", None)]);

  env
    .flatbuild_cmd()
    .arg("build")
    .arg(&env.manifest_path)
    .assert()
    .success()
    .stdout(predicate::str::contains("Built org.example.App"))
    .stdout(predicate::str::contains("Modules: 2"));

  let prefix = env.prefix();
  assert!(prefix.join("share/libfoo/README").exists());
  assert!(prefix.join("share/app/README").exists());

  let metadata = std::fs::read_to_string(env.state_path().join("app/metadata")).unwrap();
  assert!(metadata.contains("name=org.example.App"));
  assert!(metadata.contains("shared=network;"));
}

#[test]
fn build_with_explicit_prefix() {
  let env = TestEnv::new();
  env.write_manifest(vec![env.module("app", None)]);
  let prefix = env.temp.path().join("custom-prefix");

  env
    .flatbuild_cmd()
    .arg("build")
    .arg(&env.manifest_path)
    .arg("--prefix")
    .arg(&prefix)
    .assert()
    .success();

  assert!(prefix.join("share/app/README").exists());
}

#[test]
fn build_reports_integrity_failure() {
  let env = TestEnv::new();
  env.write_manifest(vec![env.module("libfoo", Some(WRONG_SHA256)), env.module("app", None)]);

  env
    .flatbuild_cmd()
    .arg("build")
    .arg(&env.manifest_path)
    .assert()
    .failure()
    .stderr(predicate::str::contains("Module: libfoo"))
    .stderr(predicate::str::contains("Source: 0 (archive)"))
    .stderr(predicate::str::contains("IntegrityError"))
    .stderr(predicate::str::contains(format!("sha256:{}", WRONG_SHA256)));

  assert!(!env.prefix().join("share/app/README").exists());
  assert!(!env.state_path().join("app/metadata").exists());
}

#[test]
fn build_reports_failing_command() {
  let env = TestEnv::new();
  let mut module = env.module("app", None);
  module["build-commands"] = serde_json::json!(["echo broken >&2; exit 4"]);
  env.write_manifest(vec![module]);

  env
    .flatbuild_cmd()
    .arg("build")
    .arg(&env.manifest_path)
    .assert()
    .failure()
    .stderr(predicate::str::contains("Module: app"))
    .stderr(predicate::str::contains("BuildCommandError"));
}

#[test]
fn build_missing_manifest_fails() {
  let env = TestEnv::new();

  env
    .flatbuild_cmd()
    .arg("build")
    .arg(env.temp.path().join("missing.json"))
    .assert()
    .failure()
    .stderr(predicate::str::contains("Failed to load manifest"));
}
