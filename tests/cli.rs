use std::fs;
use std::path::PathBuf;
use std::process::Command;
use tempfile::TempDir;

fn lens_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // remove test binary name
    path.pop(); // remove deps/
    path.push("lens");
    path
}

fn run_lens(args: &[&str]) -> (String, String, Option<i32>) {
    let binary = lens_binary();
    let output = Command::new(&binary)
        .args(args)
        .env_remove("RUST_LOG")
        .output()
        .unwrap_or_else(|e| panic!("Failed to run lens binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    (stdout, stderr, output.status.code())
}

#[test]
fn test_missing_repo_url_prints_usage() {
    let (stdout, stderr, code) = run_lens(&[]);
    assert_eq!(code, Some(1));
    assert!(stdout.is_empty());
    assert!(stderr.contains("Usage:"), "stderr: {}", stderr);
    assert!(stderr.contains("lens"));
}

#[test]
fn test_help_lists_options() {
    let (stdout, _, code) = run_lens(&["--help"]);
    assert_eq!(code, Some(0));
    assert!(stdout.contains("--config"));
    assert!(stdout.contains("--branch"));
    assert!(stdout.contains("REPO_URL"));
}

#[test]
fn test_missing_config_file_fails() {
    let (_, stderr, code) = run_lens(&["--config", "/nonexistent/lens.toml", "octo/demo"]);
    assert_eq!(code, Some(1));
    assert!(stderr.contains("Failed to read config file"), "stderr: {}", stderr);
}

#[test]
fn test_invalid_config_fails_before_network() {
    let tmp = TempDir::new().unwrap();
    let config_path = tmp.path().join("lens.toml");
    fs::write(
        &config_path,
        "[llm]\nprovider = \"disabled\"\n\n[fetch]\nconcurrency = 0\n",
    )
    .unwrap();

    let (_, stderr, code) = run_lens(&["--config", config_path.to_str().unwrap(), "octo/demo"]);
    assert_eq!(code, Some(1));
    assert!(stderr.contains("fetch.concurrency must be >= 1"), "stderr: {}", stderr);
}
