use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

const RELAY_ENV: &[&str] = &[
    "OPENAI_API_KEY",
    "EMBEDDING_API_KEY",
    "HELPDESK_API_TOKEN",
    "CHATWOOT_API_TOKEN",
    "RAG_CHUNK_SIZE",
    "RAG_CHUNK_OVERLAP",
    "RAG_STORE_PATH",
    "TOOLS_CONFIG_PATH",
    "TOOLS_ENABLED",
];

fn setup_test_env() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();

    let files_dir = root.join("files");
    fs::create_dir_all(files_dir.join("faq")).unwrap();
    fs::write(
        files_dir.join("faq").join("hours.md"),
        "# Support hours\n\nWeekdays 9:00-18:00 JST. Closed on public holidays.",
    )
    .unwrap();
    fs::write(
        files_dir.join("pricing.txt"),
        "Standard plan: 5,000 JPY per month.",
    )
    .unwrap();
    fs::write(files_dir.join("logo.png"), "fake image bytes").unwrap();

    fs::write(
        root.join("tools.json"),
        r#"{"tools": [{"name": "now", "handler": "get_current_time", "description": "Current UTC time"}]}"#,
    )
    .unwrap();

    let config_content = format!(
        r#"[rag]
store_path = "{root}/data/rag_store.jsonl"
chunk_size = 40
chunk_overlap = 10

[tools]
enabled = true
config_path = "{root}/tools.json"

[logging]
level = "warn"
"#,
        root = root.display()
    );
    let config_path = config_dir.join("relay.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn run_relay(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = env!("CARGO_BIN_EXE_relay");
    let mut command = Command::new(binary);
    for key in RELAY_ENV {
        command.env_remove(key);
    }
    let output = command
        .env_remove("RUST_LOG")
        .arg("--config")
        .arg(config_path)
        .args(args)
        .output()
        .unwrap_or_else(|e| panic!("Failed to run relay binary at {}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    (stdout, stderr, output.status.success())
}

#[test]
fn test_ingest_dry_run_counts() {
    let (tmp, config_path) = setup_test_env();
    let files = tmp.path().join("files");

    let (stdout, stderr, success) =
        run_relay(&config_path, &["ingest", files.to_str().unwrap(), "--dry-run"]);
    assert!(success, "ingest failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("(dry-run)"));
    assert!(stdout.contains("files read: 2"));
    assert!(stdout.contains("files skipped: 1"));
    assert!(!tmp.path().join("data").join("rag_store.jsonl").exists());
}

#[test]
fn test_ingest_empty_tree() {
    let (tmp, config_path) = setup_test_env();
    let empty = tmp.path().join("empty");
    fs::create_dir_all(&empty).unwrap();

    let (stdout, _, success) = run_relay(&config_path, &["ingest", empty.to_str().unwrap()]);
    assert!(success);
    assert!(stdout.contains("No text found to ingest"));
}

#[test]
fn test_ingest_requires_api_key() {
    let (tmp, config_path) = setup_test_env();
    let files = tmp.path().join("files");

    let (_, stderr, success) = run_relay(&config_path, &["ingest", files.to_str().unwrap()]);
    assert!(!success);
    assert!(stderr.contains("OPENAI_API_KEY"));
}

#[test]
fn test_serve_requires_helpdesk_token() {
    let (_tmp, config_path) = setup_test_env();
    let (_, stderr, success) = run_relay(&config_path, &["serve"]);
    assert!(!success);
    assert!(stderr.contains("HELPDESK_API_TOKEN"));
}

#[test]
fn test_tools_list_applies_override() {
    let (_tmp, config_path) = setup_test_env();
    let (stdout, stderr, success) = run_relay(&config_path, &["tools", "list"]);
    assert!(success, "tools list failed: {}", stderr);
    assert!(stdout.contains("now - Current UTC time"));
    assert!(!stdout.contains("get_current_time"));
}

#[test]
fn test_invalid_config_rejected() {
    let tmp = TempDir::new().unwrap();
    let config_path = tmp.path().join("relay.toml");
    fs::write(&config_path, "[rag]\nchunk_size = 10\nchunk_overlap = 10\n").unwrap();

    let (_, stderr, success) = run_relay(&config_path, &["tools", "list"]);
    assert!(!success);
    assert!(stderr.contains("chunk_overlap"));
}
