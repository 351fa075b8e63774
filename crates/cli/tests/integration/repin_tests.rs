use predicates::prelude::*;

use super::common::{TestEnv, file_url, sha256_of};

/// Manifest pinned to app 1.0 whose checker points at a local 2.0 tarball.
fn setup(server: &mut mockito::Server) -> (TestEnv, mockito::Mock, String, String) {
  let env = TestEnv::new();
  let newer = env.tarball("app", "2.0");
  let newer_url = file_url(&newer);
  let newer_sha = sha256_of(&newer);

  let mock = server
    .mock("GET", "/latest")
    .with_body(serde_json::json!({ "tag_name": "2.0", "tarball": newer_url }).to_string())
    .create();

  let mut module = env.module("app", None);
  module["sources"][0]["x-checker-data"] = serde_json::json!({
    "type": "json",
    "url": format!("{}/latest", server.url()),
    "version-query": ".tag_name",
    "url-query": ".tarball"
  });
  env.write_manifest(vec![module]);
  (env, mock, newer_url, newer_sha)
}

#[test]
fn repin_without_output_only_prints_changes() {
  let mut server = mockito::Server::new();
  let (env, _mock, newer_url, _) = setup(&mut server);
  let before = std::fs::read_to_string(&env.manifest_path).unwrap();

  env
    .flatbuild_cmd()
    .arg("repin")
    .arg(&env.manifest_path)
    .assert()
    .success()
    .stdout(predicate::str::contains("app [0] 2.0"))
    .stdout(predicate::str::contains(newer_url))
    .stdout(predicate::str::contains("--output"));

  assert_eq!(std::fs::read_to_string(&env.manifest_path).unwrap(), before);
}

#[test]
fn repin_writes_rehashed_manifest_to_output() {
  let mut server = mockito::Server::new();
  let (env, _mock, newer_url, newer_sha) = setup(&mut server);
  let output = env.temp.path().join("repinned.json");

  env
    .flatbuild_cmd()
    .arg("repin")
    .arg(&env.manifest_path)
    .arg("--output")
    .arg(&output)
    .assert()
    .success();

  let repinned: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(&output).unwrap()).unwrap();
  let source = &repinned["modules"][0]["sources"][0];
  assert_eq!(source["url"], newer_url);
  assert_eq!(source["sha256"], newer_sha);
  assert_eq!(source["x-checker-data"]["url-query"], ".tarball");

  env
    .flatbuild_cmd()
    .arg("validate")
    .arg(&output)
    .assert()
    .success()
    .stdout(predicate::str::contains("1. app"));
}
