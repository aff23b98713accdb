//! Command line behavior of the built binary that needs no terminal

use std::process::{Command, Output};

fn pixcat(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_pixcat"))
        .args(args)
        .env("PIXCAT_CONFIG", "/nonexistent/pixcat.toml")
        .env("RUST_LOG", "off")
        .output()
        .expect("failed to run pixcat")
}

#[test]
fn test_version() {
    let out = pixcat(&["--version"]);
    assert!(out.status.success());
    let stdout = String::from_utf8_lossy(&out.stdout);
    assert!(stdout.starts_with("pixcat "), "{}", stdout);
}

#[test]
fn test_invalid_place() {
    let out = pixcat(&["--place", "10x10", "a.png"]);
    assert_eq!(out.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&out.stderr);
    assert!(
        stderr.contains("Invalid --place specification: 10x10"),
        "{}",
        stderr
    );
}

#[test]
fn test_invalid_transfer_mode() {
    let out = pixcat(&["--transfer-mode", "pigeon", "a.png"]);
    assert_eq!(out.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&out.stderr);
    assert!(
        stderr.contains("Invalid value for --transfer-mode: pigeon"),
        "{}",
        stderr
    );
}

#[test]
fn test_invalid_mirror() {
    let out = pixcat(&["--mirror", "diagonal", "a.png"]);
    assert_eq!(out.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&out.stderr).contains("--mirror"));
}

#[test]
fn test_missing_input() {
    let out = pixcat(&["/nonexistent/image.png"]);
    assert_eq!(out.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&out.stderr).contains("/nonexistent/image.png"));
}
