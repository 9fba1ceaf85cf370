use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn deskbot_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // remove test binary name
    path.pop(); // remove deps/
    path.push("deskbot");
    path
}

fn setup_test_env() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();

    let config_content = format!(
        r#"[db]
path = "{}/data/deskbot.sqlite"

[server]
bind = "127.0.0.1:7341"

[completion]
provider = "disabled"
"#,
        root.display()
    );

    let config_path = config_dir.join("deskbot.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn run_deskbot(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = deskbot_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(args)
        .env_remove("DESKBOT_DB_PATH")
        .output()
        .unwrap_or_else(|e| panic!("Failed to run deskbot binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    (stdout, stderr, output.status.success())
}

#[test]
fn test_init_creates_database() {
    let (tmp, config_path) = setup_test_env();

    let (stdout, stderr, success) = run_deskbot(&config_path, &["init"]);
    assert!(success, "init failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("initialized"));
    assert!(tmp.path().join("data").join("deskbot.sqlite").exists());
}

#[test]
fn test_init_idempotent() {
    let (_tmp, config_path) = setup_test_env();

    let (_, _, success1) = run_deskbot(&config_path, &["init"]);
    assert!(success1, "First init failed");

    let (_, _, success2) = run_deskbot(&config_path, &["init"]);
    assert!(success2, "Second init failed (not idempotent)");
}

#[test]
fn test_settings_set_and_get() {
    let (_tmp, config_path) = setup_test_env();

    let (stdout, stderr, success) = run_deskbot(
        &config_path,
        &[
            "settings",
            "set",
            "acme",
            "--business-name",
            "Acme Tools",
            "--knowledge",
            "Open 9-5 Mon-Fri",
        ],
    );
    assert!(success, "set failed: stdout={}, stderr={}", stdout, stderr);

    let (stdout, _, success) = run_deskbot(&config_path, &["settings", "get", "acme"]);
    assert!(success);
    let record: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(record["ownerId"], "acme");
    assert_eq!(record["businessName"], "Acme Tools");
    assert_eq!(record["knowledge"], "Open 9-5 Mon-Fri");
    assert!(record["supportEmail"].is_null());
}

#[test]
fn test_settings_set_replaces_all_fields() {
    let (_tmp, config_path) = setup_test_env();

    run_deskbot(
        &config_path,
        &["settings", "set", "acme", "--business-name", "Acme"],
    );
    run_deskbot(
        &config_path,
        &["settings", "set", "acme", "--support-email", "help@acme.test"],
    );

    let (stdout, _, success) = run_deskbot(&config_path, &["settings", "get", "acme"]);
    assert!(success);
    let record: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert!(record["businessName"].is_null());
    assert_eq!(record["supportEmail"], "help@acme.test");
}

#[test]
fn test_settings_knowledge_file() {
    let (tmp, config_path) = setup_test_env();
    let knowledge_path = tmp.path().join("faq.txt");
    fs::write(&knowledge_path, "Free shipping over $50.\nReturns within 30 days.").unwrap();

    let (_, stderr, success) = run_deskbot(
        &config_path,
        &[
            "settings",
            "set",
            "acme",
            "--knowledge-file",
            knowledge_path.to_str().unwrap(),
        ],
    );
    assert!(success, "set failed: {}", stderr);

    let (stdout, _, _) = run_deskbot(&config_path, &["settings", "get", "acme"]);
    let record: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(
        record["knowledge"],
        "Free shipping over $50.\nReturns within 30 days."
    );
}

#[test]
fn test_settings_get_unknown_owner() {
    let (_tmp, config_path) = setup_test_env();

    let (stdout, _, success) = run_deskbot(&config_path, &["settings", "get", "ghost"]);
    assert!(success);
    assert_eq!(stdout.trim(), "null");
}

#[test]
fn test_prompt_preview() {
    let (_tmp, config_path) = setup_test_env();

    run_deskbot(
        &config_path,
        &[
            "settings",
            "set",
            "acme",
            "--business-name",
            "Acme Tools",
            "--knowledge",
            "Open 9-5 Mon-Fri",
        ],
    );

    let (stdout, stderr, success) =
        run_deskbot(&config_path, &["prompt", "acme", "what are your hours?"]);
    assert!(success, "prompt failed: {}", stderr);
    assert!(stdout.contains("business name - Acme Tools"));
    assert!(stdout.contains("support email - not provided"));
    assert!(stdout.contains("knowledge - Open 9-5 Mon-Fri"));

    let question_at = stdout.find("what are your hours?").unwrap();
    let knowledge_at = stdout.find("Open 9-5 Mon-Fri").unwrap();
    assert!(knowledge_at < question_at);
}

#[test]
fn test_prompt_unconfigured_owner_fails() {
    let (_tmp, config_path) = setup_test_env();

    let (_, stderr, success) = run_deskbot(&config_path, &["prompt", "ghost", "hi"]);
    assert!(!success);
    assert!(stderr.contains("Chat Bot is not configured yet."));
}

#[test]
fn test_invalid_provider_rejected() {
    let (tmp, _) = setup_test_env();
    let config_path = tmp.path().join("config").join("bad.toml");
    fs::write(
        &config_path,
        "[db]\npath = \"./x.sqlite\"\n\n[completion]\nprovider = \"palm\"\n",
    )
    .unwrap();

    let (_, stderr, success) = run_deskbot(&config_path, &["init"]);
    assert!(!success);
    assert!(stderr.contains("Unknown completion provider"));
}
