use std::fs;

use assert_cmd::Command;
use tempfile::tempdir;

fn termnote() -> Command {
    Command::cargo_bin("termnote").unwrap()
}

#[test]
fn help_lists_flags() {
    let output = termnote().arg("--help").output().unwrap();
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("--print-config"));
    assert!(stdout.contains("--inspect"));
    assert!(stdout.contains("--config"));
}

#[test]
fn print_config_shows_defaults() {
    let dir = tempdir().unwrap();
    let missing = dir.path().join("absent.toml");
    let output = termnote()
        .arg("--config")
        .arg(&missing)
        .arg("--print-config")
        .output()
        .unwrap();
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("[viewer]"));
    assert!(stdout.contains("max_scale = 3.0"));
    assert!(stdout.contains("default_text = \"Edit text\""));
}

#[test]
fn print_config_merges_file_over_defaults() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("config.toml");
    fs::write(&path, "[viewer]\nmax_scale = 2.5\n\n[overlay]\ndefault_text = \"Note\"\n").unwrap();

    let output = termnote()
        .arg("--config")
        .arg(&path)
        .arg("--print-config")
        .output()
        .unwrap();
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("max_scale = 2.5"));
    assert!(stdout.contains("min_scale = 0.5"));
    assert!(stdout.contains("default_text = \"Note\""));
}

#[test]
fn invalid_config_is_rejected() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("config.toml");
    fs::write(&path, "[viewer]\nmin_scale = 4.0\nmax_scale = 2.0\n").unwrap();

    let output = termnote()
        .arg("--config")
        .arg(&path)
        .arg("--print-config")
        .output()
        .unwrap();
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("failed to load configuration"));
}

#[test]
fn inspect_requires_a_file() {
    let output = termnote().arg("--inspect").output().unwrap();
    assert!(!output.status.success());
}
