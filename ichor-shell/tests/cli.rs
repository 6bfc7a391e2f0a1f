//! Command-line tests for the `ichor` binary.

use std::fs;
use std::io::Write;
use std::process::{Command, Output, Stdio};

fn ichor(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_ichor"))
        .args(args)
        .env_remove("RUST_LOG")
        .env_remove("ICHOR_SEED")
        .output()
        .unwrap()
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

#[test]
fn test_generate_is_reproducible() {
    let first = ichor(&["generate", "--seed", "5", "--turns", "12", "-q"]);
    let second = ichor(&["generate", "--seed", "5", "--turns", "12", "-q"]);
    assert!(first.status.success());
    assert!(stdout(&first).starts_with("var o = [];\n"));
    assert_eq!(first.stdout, second.stdout);

    let other = ichor(&["generate", "--seed", "6", "--turns", "12", "-q"]);
    assert_ne!(first.stdout, other.stdout);
}

#[test]
fn test_generate_writes_output_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("case.js");
    let output = ichor(&[
        "generate",
        "--seed",
        "1",
        "--output",
        path.to_str().unwrap(),
        "-q",
    ]);
    assert!(output.status.success());
    assert!(output.stdout.is_empty());
    assert!(fs::read_to_string(&path).unwrap().contains("o[0] = window"));
}

#[test]
fn test_classify_stdin() {
    let mut child = Command::new(env!("CARGO_BIN_EXE_ichor"))
        .args(["classify", "-", "-q"])
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .spawn()
        .unwrap();
    child
        .stdin
        .take()
        .unwrap()
        .write_all(b"setTimeout(f, 0);")
        .unwrap();
    let output = child.wait_with_output().unwrap();
    assert!(output.status.success());
    let text = stdout(&output);
    assert!(text.contains("timers"), "{}", text);
    assert!(text.starts_with("flags: PARSE | EXECUTE | CONSISTENT_CONFIGS"), "{}", text);
}

#[test]
fn test_rules_lists_table() {
    let output = ichor(&["rules"]);
    assert!(output.status.success());
    let text = stdout(&output);
    assert!(text.contains("infinite-loop"));
    assert!(text.contains("nul-byte"));
}

#[test]
fn test_invalid_config_is_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("ichor.toml");
    fs::write(&path, "[driver]\nturns_per_iteration = 0\n").unwrap();
    let output = ichor(&["generate", "--config", path.to_str().unwrap()]);
    assert_eq!(output.status.code(), Some(2));
    assert!(String::from_utf8_lossy(&output.stderr).contains("turns_per_iteration"));
}

#[test]
fn test_run_without_engine_fails() {
    let output = ichor(&["run", "--seed", "1", "-q"]);
    assert_eq!(output.status.code(), Some(2));
    assert!(String::from_utf8_lossy(&output.stderr).contains("no engine configured"));
}
