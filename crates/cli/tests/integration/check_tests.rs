use predicates::prelude::*;

use super::common::TestEnv;

fn with_checker(env: &TestEnv, checker: serde_json::Value) -> serde_json::Value {
  let mut module = env.module("app", None);
  module["sources"][0]["x-checker-data"] = checker;
  module
}

#[test]
fn check_updates_without_checkers_succeeds() {
  let env = TestEnv::new();
  env.write_manifest(vec![env.module("app", None)]);

  env
    .flatbuild_cmd()
    .arg("check-updates")
    .arg(&env.manifest_path)
    .assert()
    .success()
    .stdout(predicate::str::contains("No sources declare an update checker"));
}

#[test]
fn check_updates_reports_newer_version_as_json() {
  let mut server = mockito::Server::new();
  let _mock = server
    .mock("GET", "/latest")
    .with_body(r#"{"tag_name": "2.0"}"#)
    .create();

  let env = TestEnv::new();
  env.write_manifest(vec![with_checker(
    &env,
    serde_json::json!({
      "type": "json",
      "url": format!("{}/latest", server.url()),
      "version-query": ".tag_name",
      "url-query": "\"https://example.com/app-\" + $version + \".tar.gz\""
    }),
  )]);
  let before = std::fs::read_to_string(&env.manifest_path).unwrap();

  let output = env
    .flatbuild_cmd()
    .arg("check-updates")
    .arg(&env.manifest_path)
    .args(["--format", "json"])
    .output()
    .unwrap();
  assert!(output.status.success());

  let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
  let result = &report["results"][0];
  assert_eq!(result["module"], "app");
  assert_eq!(result["current-version"], "1.0");
  assert_eq!(result["status"], "newer");
  assert_eq!(result["candidate"], "2.0");
  assert_eq!(result["url"], "https://example.com/app-2.0.tar.gz");

  assert_eq!(std::fs::read_to_string(&env.manifest_path).unwrap(), before);
}

#[test]
fn check_updates_failure_is_reported_as_unknown() {
  let mut server = mockito::Server::new();
  let _mock = server.mock("GET", "/gone").with_status(404).create();

  let env = TestEnv::new();
  env.write_manifest(vec![with_checker(
    &env,
    serde_json::json!({
      "type": "html",
      "url": format!("{}/gone", server.url()),
      "version-pattern": r"app-([\d.]+)\.tar\.gz"
    }),
  )]);

  env
    .flatbuild_cmd()
    .arg("check-updates")
    .arg(&env.manifest_path)
    .args(["--retries", "0"])
    .assert()
    .success()
    .stdout(predicate::str::contains("unknown (SourceFetchError"))
    .stderr(predicate::str::contains("could not be checked"));
}

#[test]
fn check_updates_shows_candidate_for_up_to_date_source() {
  let mut server = mockito::Server::new();
  let _mock = server
    .mock("GET", "/latest")
    .with_body(r#"{"tag_name": "1.0"}"#)
    .create();

  let env = TestEnv::new();
  env.write_manifest(vec![with_checker(
    &env,
    serde_json::json!({
      "type": "json",
      "url": format!("{}/latest", server.url()),
      "version-query": ".tag_name",
      "url-query": "\"https://example.com/app-\" + $version + \".tar.gz\""
    }),
  )]);

  env
    .flatbuild_cmd()
    .arg("check-updates")
    .arg(&env.manifest_path)
    .assert()
    .success()
    .stdout(predicate::str::contains("app [0] 1.0 → 1.0"))
    .stdout(predicate::str::contains("Everything is up to date"));
}
