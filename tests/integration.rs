use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn assetctl_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // remove test binary name
    path.pop(); // remove deps/
    path.push("assetctl");
    path
}

fn write_model(root: &Path, service: &str, version: &str, body: &str) {
    let dir = root.join(service).join(version);
    fs::create_dir_all(&dir).unwrap();
    fs::write(dir.join("service-2.json"), body).unwrap();
}

fn setup_test_env() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();

    let models = root.join("models");
    write_model(
        &models,
        "s3",
        "2006-03-01",
        r#"{
            "metadata": {"apiVersion": "2006-03-01", "endpointPrefix": "s3", "protocol": "rest-xml", "serviceFullName": "Amazon Simple Storage Service"},
            "operations": {
                "GetObject": {"name": "GetObject", "http": {"method": "GET", "requestUri": "/{Bucket}/{Key+}"}},
                "ListBuckets": {"name": "ListBuckets", "http": {"method": "GET", "requestUri": "/"}},
                "PutObject": {"name": "PutObject", "http": {"method": "PUT", "requestUri": "/{Bucket}/{Key+}"}}
            }
        }"#,
    );
    write_model(
        &models,
        "sqs",
        "2012-11-05",
        r#"{
            "metadata": {"apiVersion": "2012-11-05", "endpointPrefix": "sqs", "protocol": "query", "serviceFullName": "Amazon Simple Queue Service"},
            "operations": {
                "SendMessage": {"name": "SendMessage", "http": {"method": "POST", "requestUri": "/"}}
            }
        }"#,
    );

    let config_content = format!(
        r#"store:
  url: "sqlite://{root}/data/assets.sqlite"
  min_pool_size: 1
  max_pool_size: 2
retry:
  max_retries: 2
  cooldown_secs: 0
catalog:
  models_dir: "{root}/models"
"#,
        root = root.display()
    );

    let config_path = config_dir.join("assetctl.yaml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn run_assetctl(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = assetctl_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(args)
        .env("RUST_LOG", "warn")
        .output()
        .unwrap_or_else(|e| panic!("Failed to run assetctl binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let success = output.status.success();
    (stdout, stderr, success)
}

#[test]
fn test_init_creates_indexes() {
    let (_tmp, config_path) = setup_test_env();

    let (stdout, stderr, success) = run_assetctl(&config_path, &["init"]);
    assert!(success, "init failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("indexed: asset.aws.product"));
    assert!(stdout.contains("indexed: asset.aws.product_action"));
    assert!(stdout.contains("ok"));
}

#[test]
fn test_init_idempotent() {
    let (_tmp, config_path) = setup_test_env();

    let (_, _, success1) = run_assetctl(&config_path, &["init"]);
    assert!(success1, "First init failed");

    let (_, _, success2) = run_assetctl(&config_path, &["init"]);
    assert!(success2, "Second init failed (not idempotent)");
}

#[test]
fn test_services_lists_model_repository() {
    let (_tmp, config_path) = setup_test_env();

    let (stdout, stderr, success) = run_assetctl(&config_path, &["services"]);
    assert!(success, "services failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("Amazon Simple Storage Service"));
    assert!(stdout.contains("2012-11-05"));
    assert!(stdout.contains("2 services"));
}

#[test]
fn test_ingest_reports_counts() {
    let (_tmp, config_path) = setup_test_env();

    let (stdout, stderr, success) = run_assetctl(&config_path, &["ingest"]);
    assert!(success, "ingest failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("services saved: 2/2"));
    assert!(stdout.contains("operations saved: 4/4"));
    assert!(stdout.contains("failures: 0"));
    assert!(stdout.contains("ok"));
}

#[test]
fn test_ingest_idempotent_no_duplicates() {
    let (_tmp, config_path) = setup_test_env();

    run_assetctl(&config_path, &["ingest"]);
    let (stdout, _, success) = run_assetctl(&config_path, &["ingest"]);
    assert!(success);
    assert!(stdout.contains("new assets: 0"));

    let (stdout, _, _) = run_assetctl(&config_path, &["list", "aws.product_action"]);
    let page: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(page["total"], 4);
}

#[test]
fn test_ingest_dry_run() {
    let (tmp, config_path) = setup_test_env();

    let (stdout, _, success) = run_assetctl(&config_path, &["ingest", "--dry-run"]);
    assert!(success);
    assert!(stdout.contains("(dry-run)"));
    assert!(stdout.contains("operations found: 4"));
    assert!(!tmp.path().join("data").exists());
}

#[test]
fn test_get_prints_asset() {
    let (_tmp, config_path) = setup_test_env();
    run_assetctl(&config_path, &["ingest"]);

    let (stdout, stderr, success) = run_assetctl(&config_path, &["get", "aws.product_action", "s3.PutObject"]);
    assert!(success, "get failed: stdout={}, stderr={}", stdout, stderr);
    let doc: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(doc["asset_name"], "PutObject");
    assert_eq!(doc["raw"]["http"]["method"], "PUT");
    assert_eq!(doc["_expired"], false);

    let (stdout, _, success) = run_assetctl(
        &config_path,
        &["get", "aws.product", "s3_2006-03-01", "--field", "asset_name"],
    );
    assert!(success);
    let doc: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(
        doc,
        serde_json::json!({"asset_name": "Amazon Simple Storage Service"})
    );
}

#[test]
fn test_get_missing_asset_fails() {
    let (_tmp, config_path) = setup_test_env();
    run_assetctl(&config_path, &["init"]);

    let (_, stderr, success) = run_assetctl(&config_path, &["get", "aws.product", "nope"]);
    assert!(!success);
    assert!(stderr.contains("asset not found"));
}

#[test]
fn test_list_pages() {
    let (_tmp, config_path) = setup_test_env();
    run_assetctl(&config_path, &["ingest"]);

    let (stdout, _, success) = run_assetctl(
        &config_path,
        &["list", "aws.product_action", "--page", "2", "--page-size", "3", "--field", "asset_id"],
    );
    assert!(success);
    let page: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(page["total"], 4);
    assert_eq!(page["items"].as_array().unwrap().len(), 1);
    assert!(page["items"][0]["_id"].is_i64());
}

#[test]
fn test_invalid_page_fails() {
    let (_tmp, config_path) = setup_test_env();

    let (_, _, success) = run_assetctl(&config_path, &["list", "aws.product", "--page", "0"]);
    assert!(!success);
}

#[test]
fn test_missing_config_uses_defaults_with_env_override() {
    let tmp = TempDir::new().unwrap();
    let models = tmp.path().join("models");
    write_model(&models, "sts", "2011-06-15", r#"{"operations": {}}"#);

    let output = Command::new(assetctl_binary())
        .arg("--config")
        .arg(tmp.path().join("absent.yaml"))
        .arg("services")
        .env("ASSET_CATALOG_CATALOG_MODELS_DIR", &models)
        .output()
        .unwrap();
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(output.status.success());
    assert!(stdout.contains("sts"));
}

#[test]
fn test_malformed_config_fails() {
    let tmp = TempDir::new().unwrap();
    let config_path = tmp.path().join("bad.yaml");
    fs::write(&config_path, "store: [not, a, map").unwrap();

    let (_, stderr, success) = run_assetctl(&config_path, &["services"]);
    assert!(!success);
    assert!(stderr.contains("Failed to parse config file"));
}
