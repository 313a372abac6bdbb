//! CLI integration tests for cyberx
//!
//! Runs the binary offline end-to-end using assert_cmd.

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

/// Offline command isolated from the user's config and keys
#[allow(deprecated)]
fn cyberx_cmd(temp_dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("cyberx").unwrap();
    cmd.current_dir(temp_dir.path())
        .env("CYBERX_CONFIG_DIR", temp_dir.path().join("config"))
        .env("RUST_LOG", "cyberx=warn")
        .env_remove("COLLECTION_API_KEY")
        .env_remove("EXTRACTION_API_KEY");
    cmd
}

#[test]
fn test_offline_run_writes_first_artifact() {
    let temp_dir = TempDir::new().unwrap();
    let out = temp_dir.path().join("logs");

    cyberx_cmd(&temp_dir)
        .args(["--offline", "--max-reports", "5", "--output-dir"])
        .arg(&out)
        .write_stdin("exit\n")
        .assert()
        .success()
        .stdout(predicate::str::contains("Loaded intelligence entries (5)"))
        .stdout(predicate::str::contains("Which threat actors are China-nexus?"))
        .stdout(predicate::str::contains("Execution log saved"));

    assert!(out.join("CyberX #1.json").exists());
}

#[test]
fn test_second_run_gets_next_version() {
    let temp_dir = TempDir::new().unwrap();
    let out = temp_dir.path().join("logs");

    for _ in 0..2 {
        cyberx_cmd(&temp_dir)
            .args(["--offline", "--quiet", "--output-dir"])
            .arg(&out)
            .write_stdin("exit\n")
            .assert()
            .success();
    }

    assert!(out.join("CyberX #1.json").exists());
    assert!(out.join("CyberX #2.json").exists());
}

#[test]
fn test_canned_and_insufficient_answers() {
    let temp_dir = TempDir::new().unwrap();

    cyberx_cmd(&temp_dir)
        .args(["--offline", "--quiet", "--max-reports", "3", "--output-dir"])
        .arg(temp_dir.path())
        .write_stdin("Which threat actors are China-nexus?\n\nhow do I bake bread\nquit\n")
        .assert()
        .success()
        .stdout(predicate::str::contains("People's Republic of China"))
        .stdout(predicate::str::contains("Insufficient data."));

    let log = std::fs::read_to_string(temp_dir.path().join("CyberX #1.json")).unwrap();
    let log: serde_json::Value = serde_json::from_str(&log).unwrap();
    assert_eq!(log["queries"].as_array().unwrap().len(), 2);
    assert_eq!(log["queries"][0]["answered_via"], "fallback");
    assert_eq!(log["queries"][1]["answered_via"], "insufficient");
}

#[test]
fn test_end_of_input_closes_session() {
    let temp_dir = TempDir::new().unwrap();

    cyberx_cmd(&temp_dir)
        .args(["--offline", "--quiet", "--output-dir"])
        .arg(temp_dir.path())
        .write_stdin("")
        .assert()
        .success();

    assert!(temp_dir.path().join("CyberX #1.json").exists());
}

#[test]
fn test_undecodable_input_still_writes_artifact() {
    let temp_dir = TempDir::new().unwrap();
    let out = temp_dir.path().join("out");
    let mut stdin = b"Which threat actors are China-nexus?\n".to_vec();
    stdin.extend_from_slice(b"\xff\xfe bad\nexit\n");

    cyberx_cmd(&temp_dir)
        .args(["--offline", "--quiet", "--output-dir"])
        .arg(&out)
        .write_stdin(stdin)
        .assert()
        .success()
        .stdout(predicate::str::contains("People's Republic of China"));

    let log = std::fs::read_to_string(out.join("CyberX #1.json")).unwrap();
    let log: serde_json::Value = serde_json::from_str(&log).unwrap();
    let queries = log["queries"].as_array().unwrap();
    assert_eq!(queries.len(), 2);
    assert!(queries[1]["query_text"].as_str().unwrap().ends_with("bad"));
}

#[test]
fn test_rust_log_controls_stderr() {
    let temp_dir = TempDir::new().unwrap();

    cyberx_cmd(&temp_dir)
        .args(["--offline", "--output-dir"])
        .arg(temp_dir.path())
        .write_stdin("exit\n")
        .assert()
        .success()
        .stderr(predicate::str::contains("INFO").not());
}

#[test]
fn test_config_file_with_key_is_rejected() {
    let temp_dir = TempDir::new().unwrap();
    let config = temp_dir.path().join("cyberx.toml");
    std::fs::write(&config, "[collection]\napi_key = \"inline\"\n").unwrap();

    cyberx_cmd(&temp_dir)
        .args(["--offline", "--config"])
        .arg(&config)
        .write_stdin("exit\n")
        .assert()
        .failure()
        .stderr(predicate::str::contains("environment variables"));
}

#[test]
fn test_custom_product_name_from_config() {
    let temp_dir = TempDir::new().unwrap();
    let config = temp_dir.path().join("cyberx.toml");
    std::fs::write(
        &config,
        "[collection]\ntopics = [\"https://news.example/apt31\"]\n\n[audit]\nproduct = \"Recon\"\n",
    )
    .unwrap();

    cyberx_cmd(&temp_dir)
        .args(["--offline", "--config"])
        .arg(&config)
        .args(["--output-dir"])
        .arg(temp_dir.path())
        .write_stdin("exit\n")
        .assert()
        .success()
        .stdout(predicate::str::contains("APT31"));

    assert!(temp_dir.path().join("Recon #1.json").exists());
}
