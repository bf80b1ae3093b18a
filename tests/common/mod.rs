//! Common test utilities for pulserun integration tests
//!
//! - Definition fixtures written into a temp dir
//! - A scripted in-process transport
//! - CLI invocation helpers

#![allow(dead_code)]

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;

use assert_cmd::Command;
use pulserun::errors::Result;
use pulserun::template::RenderedRequest;
use pulserun::transport::{RawResponse, Transport};
use tempfile::TempDir;

/// Setup S1 logs in, T1 reads orders with the captured token, teardown D1
/// closes the session.
pub fn orders_yaml(base_url: &str) -> String {
    format!(
        r#"
endpoints:
  - name: api
    url: {base_url}

tests:
  - tcid: S1
    suite: auth
    name: Login
    endpoint: api
    method: POST
    path: /login
    body: '{{"user":"demo","nonce":"@{{__uuid}}"}}'
    checks:
      - type: STATUS
        expect: "200"
      - type: JSON_PATH
        expression: $.token
        operator: NOT_NULL
        save_as: token

  - tcid: T1
    suite: orders
    name: List orders
    endpoint: api
    path: /orders
    conditions: "[Setup]S1;[Teardown]D1"
    headers:
      Authorization: "Bearer ${{T1.token}}"
    checks:
      - type: STATUS
        expect: "200"
      - type: JSON_PATH
        expression: $.count
        operator: GREATER_THAN
        expect: "0"

  - tcid: D1
    suite: auth
    name: Logout
    endpoint: api
    method: DELETE
    path: /session
    checks:
      - type: STATUS
        expect: "200"

scenarios:
  - name: smoke
    steps:
      - tcid: T1
    profile:
      type: standard
      num_threads: 2
      loops: 3
"#
    )
}

/// Write a definitions file into `dir`
pub fn write_defs(dir: &TempDir, yaml: &str) -> PathBuf {
    let path = dir.path().join("definitions.yaml");
    std::fs::write(&path, yaml).unwrap();
    path
}

/// Write an empty config file so the user's own config never leaks in
pub fn write_config(dir: &TempDir, toml: &str) -> PathBuf {
    let path = dir.path().join("pulserun.toml");
    std::fs::write(&path, toml).unwrap();
    path
}

/// The pulserun binary with an isolated config
pub fn pulserun(dir: &TempDir) -> Command {
    let config = write_config(dir, "");
    let mut cmd = Command::cargo_bin("pulserun").unwrap();
    cmd.env("PULSERUN_CONFIG", config)
        .env_remove("PULSERUN_DEFS")
        .env_remove("RUST_LOG")
        .env("NO_COLOR", "1");
    cmd
}

// ============================================================================
// Scripted transport
// ============================================================================

/// Answers by path suffix and records everything it sends
#[derive(Default)]
pub struct ScriptedTransport {
    routes: HashMap<String, RawResponse>,
    sent: Mutex<Vec<RenderedRequest>>,
}

impl ScriptedTransport {
    pub fn route(mut self, path: &str, response: RawResponse) -> Self {
        self.routes.insert(path.to_string(), response);
        self
    }

    pub fn sent(&self) -> Vec<RenderedRequest> {
        self.sent.lock().unwrap().clone()
    }

    pub fn sent_paths(&self) -> Vec<String> {
        self.sent()
            .into_iter()
            .map(|r| {
                let url = url::Url::parse(&r.url).unwrap();
                url.path().to_string()
            })
            .collect()
    }
}

impl Transport for ScriptedTransport {
    async fn send(&self, request: &RenderedRequest) -> Result<RawResponse> {
        self.sent.lock().unwrap().push(request.clone());
        let path = url::Url::parse(&request.url)
            .map(|u| u.path().to_string())
            .unwrap_or_default();
        Ok(self
            .routes
            .get(&path)
            .cloned()
            .unwrap_or_else(|| RawResponse::new(404, "")))
    }
}

/// Transport answering the orders fixture
pub fn orders_transport() -> ScriptedTransport {
    ScriptedTransport::default()
        .route("/login", RawResponse::new(200, r#"{"token":"tok-42"}"#))
        .route("/orders", RawResponse::new(200, r#"{"count":3}"#))
        .route("/session", RawResponse::new(200, ""))
}
