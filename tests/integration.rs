use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn grounded_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // remove test binary name
    path.pop(); // remove deps/
    path.push("grounded");
    path
}

const GUIDE_MD: &str = "# Guide\n\n\
Grounded answers questions from your own documents. It indexes Markdown and JSON files \
from a single data directory and keeps the file name of every passage.\n\n\
## Install\n\n\
Build the binary with cargo and copy the example configuration next to it. The local \
embedding model is downloaded on first use and cached for later runs.\n";

const FAQ_JSON: &str = r#"[
  {"title": "Reset", "content": "To reset your password open the account page, choose security, and follow the emailed link within one hour."},
  {"title": "Export", "content": "Exports are produced nightly as compressed archives and kept for thirty days before they are deleted."}
]"#;

fn setup_test_env(extra_config: &str) -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();

    let docs = root.join("docs");
    fs::create_dir_all(docs.join("faq")).unwrap();
    fs::write(docs.join("guide.md"), GUIDE_MD).unwrap();
    fs::write(docs.join("faq").join("account.json"), FAQ_JSON).unwrap();
    fs::write(docs.join("notes.txt"), "not indexed").unwrap();

    let config_content = format!(
        r#"[db]
path = "{root}/data/grounded.sqlite"

[ingest]
data_dir = "{root}/docs"
min_chars = 20
json_leaf_passages = false

{extra}
"#,
        root = root.display(),
        extra = extra_config
    );

    let config_path = config_dir.join("grounded.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn run_grounded(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = grounded_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(args)
        .output()
        .unwrap_or_else(|e| panic!("Failed to run grounded binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    (stdout, stderr, output.status.success())
}

#[test]
fn test_init_creates_database() {
    let (tmp, config_path) = setup_test_env("");

    let (stdout, stderr, success) = run_grounded(&config_path, &["init"]);
    assert!(success, "init failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("initialized"));
    assert!(tmp.path().join("data").join("grounded.sqlite").exists());
}

#[test]
fn test_init_idempotent() {
    let (_tmp, config_path) = setup_test_env("");

    let (_, _, success1) = run_grounded(&config_path, &["init"]);
    assert!(success1, "First init failed");

    let (_, _, success2) = run_grounded(&config_path, &["init"]);
    assert!(success2, "Second init failed (not idempotent)");
}

#[test]
fn test_ingest_dry_run_counts() {
    let (tmp, config_path) = setup_test_env("");

    let (stdout, stderr, success) = run_grounded(&config_path, &["ingest", "--dry-run"]);
    assert!(success, "dry run failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("dry-run"));
    assert!(stdout.contains("files: 2"), "stdout={}", stdout);
    // Two markdown sections plus two JSON objects
    assert!(stdout.contains("passages: 4"), "stdout={}", stdout);
    assert!(stdout.contains(" :: "));
    // Nothing is written
    assert!(!tmp.path().join("data").join("grounded.sqlite").exists());
}

#[test]
fn test_ingest_requires_embedding_provider() {
    let (_tmp, config_path) = setup_test_env("");

    let (_, stderr, success) = run_grounded(&config_path, &["ingest"]);
    assert!(!success);
    assert!(stderr.contains("embedding provider"), "stderr={}", stderr);
}

#[test]
fn test_ask_requires_embedding_provider() {
    let (_tmp, config_path) = setup_test_env("");

    let (_, stderr, success) = run_grounded(&config_path, &["ask", "how do I reset?"]);
    assert!(!success);
    assert!(stderr.contains("embedding provider"), "stderr={}", stderr);
}

#[test]
fn test_stats_on_empty_index() {
    let (_tmp, config_path) = setup_test_env("");

    run_grounded(&config_path, &["init"]);
    let (stdout, stderr, success) = run_grounded(&config_path, &["stats"]);
    assert!(success, "stats failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("Chunks:      0"));
    assert!(stdout.contains("Last ingest: never"));
}

#[test]
fn test_missing_config_file_errors() {
    let tmp = TempDir::new().unwrap();
    let (_, stderr, success) = run_grounded(&tmp.path().join("nope.toml"), &["init"]);
    assert!(!success);
    assert!(stderr.contains("Failed to read config file"), "stderr={}", stderr);
}

#[test]
fn test_unknown_llm_provider_errors() {
    let (_tmp, config_path) = setup_test_env("[llm]\nprovider = \"mystery\"\n");

    let (_, stderr, success) = run_grounded(&config_path, &["init"]);
    assert!(!success);
    assert!(stderr.contains("Unknown llm provider"), "stderr={}", stderr);
}

#[test]
fn test_invalid_retrieval_params_error() {
    let (_tmp, config_path) = setup_test_env("[retrieval]\ntop_k = 10\nfetch_k = 5\n");

    let (_, stderr, success) = run_grounded(&config_path, &["stats"]);
    assert!(!success);
    assert!(stderr.contains("fetch_k"), "stderr={}", stderr);
}
