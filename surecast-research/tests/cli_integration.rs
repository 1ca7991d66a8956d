//! CLI integration tests for surecast-research

use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::{json, Value};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn write_config(temp_dir: &TempDir, base_url: &str) -> PathBuf {
    let data_dir = temp_dir.path().join("data");
    let config_path = temp_dir.path().join("config.toml");
    let config = format!(
        r#"
[storage]
data_dir = "{}"

[retry]
max_attempts = 1

[research]
firecrawl_api_key = "fc_test"
base_url = "{}"
sources = ["https://one.example", "https://two.example"]
pacing_secs = 0
"#,
        data_dir.to_string_lossy().replace('\\', "\\\\"),
        base_url
    );
    fs::write(&config_path, config).unwrap();
    config_path
}

fn command(config_path: &Path) -> Command {
    let mut cmd = Command::cargo_bin("surecast-research").unwrap();
    cmd.env_remove("SURECAST_CONFIG")
        .env("SURECAST_LOG_LEVEL", "error")
        .arg("--config")
        .arg(config_path);
    cmd
}

async fn run(mut cmd: Command) -> assert_cmd::assert::Assert {
    tokio::task::spawn_blocking(move || cmd.assert())
        .await
        .unwrap()
}

#[test]
fn test_help_flag_output() {
    Command::cargo_bin("surecast-research")
        .unwrap()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("--force-refresh"))
        .stdout(predicate::str::contains("--cached"));
}

#[test]
fn test_cached_with_empty_cache_fails() {
    let temp_dir = TempDir::new().unwrap();
    let config_path = write_config(&temp_dir, "http://127.0.0.1:9");

    command(&config_path)
        .arg("--cached")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("No research cached for today"));
}

#[test]
fn test_missing_research_section_fails() {
    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("config.toml");
    fs::write(&config_path, "").unwrap();

    command(&config_path)
        .assert()
        .failure()
        .stderr(predicate::str::contains("research"));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_second_run_is_served_from_cache() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/scrape"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": true,
            "data": {"markdown": "Trending today", "metadata": {"title": "Trending"}}
        })))
        .expect(2)
        .mount(&server)
        .await;

    let temp_dir = TempDir::new().unwrap();
    let config_path = write_config(&temp_dir, &server.uri());

    for _ in 0..2 {
        let mut cmd = command(&config_path);
        cmd.args(["--format", "json"]);
        let output = run(cmd).await.success().get_output().stdout.clone();
        let entry: Value = serde_json::from_slice(&output).unwrap();
        assert_eq!(entry["results"].as_array().unwrap().len(), 2);
        assert_eq!(entry["results"][0]["title"], "Trending");
    }

    let mut cached = command(&config_path);
    cached.arg("--cached");
    run(cached)
        .await
        .success()
        .stdout(predicate::str::contains("https://two.example: Trending"));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_rate_limit_stops_batch() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/scrape"))
        .respond_with(ResponseTemplate::new(429).set_body_json(json!({
            "success": false,
            "error": "Rate limit exceeded"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let temp_dir = TempDir::new().unwrap();
    let config_path = write_config(&temp_dir, &server.uri());

    let mut cmd = command(&config_path);
    cmd.args(["--format", "json"]);
    let output = run(cmd).await.success().get_output().stdout.clone();
    let entry: Value = serde_json::from_slice(&output).unwrap();

    let results = entry["results"].as_array().unwrap();
    assert_eq!(results.len(), 1);
    assert!(results[0]["error"].as_str().unwrap().contains("Rate limit"));
}
