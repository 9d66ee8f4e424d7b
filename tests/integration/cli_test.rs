//! End-to-end tests that drive the cmdtree binary.

use pretty_assertions::assert_eq;
use std::io::Write;
use std::process::{Command, Stdio};
use tempfile::TempDir;

/// Runs the binary with an isolated config and returns (exit code, stdout, stderr).
fn run_cli(dir: &TempDir, args: &[&str], stdin: &str) -> (i32, String, String) {
    let config = dir.path().join("config.toml");
    let mut child = Command::new(env!("CARGO_BIN_EXE_cmdtree"))
        .arg("--config")
        .arg(&config)
        .arg("--quiet")
        .args(args)
        .env_remove("CMDTREE_CONFIG")
        .env_remove("RUST_LOG")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("failed to start cmdtree");

    child
        .stdin
        .take()
        .unwrap()
        .write_all(stdin.as_bytes())
        .unwrap();
    let output = child.wait_with_output().unwrap();
    (
        output.status.code().unwrap_or(-1),
        String::from_utf8_lossy(&output.stdout).into_owned(),
        String::from_utf8_lossy(&output.stderr).into_owned(),
    )
}

#[test]
fn test_one_shot_command() {
    let dir = TempDir::new().unwrap();
    let (code, stdout, _) = run_cli(&dir, &["add", "1", "2"], "");
    assert_eq!(code, 0);
    assert_eq!(stdout, "3\n");

    let (code, stdout, _) = run_cli(&dir, &["math.sum", "1", "2", "3.5"], "");
    assert_eq!(code, 0);
    assert_eq!(stdout, "6.5\n");
}

#[test]
fn test_one_shot_json() {
    let dir = TempDir::new().unwrap();
    let (code, stdout, _) = run_cli(&dir, &["--output", "json", "add", "2", "40"], "");
    assert_eq!(code, 0);

    let line: serde_json::Value = serde_json::from_str(stdout.trim()).unwrap();
    assert_eq!(line["kind"], "result");
    assert_eq!(line["command"], "add");
    assert_eq!(line["data"], 42);
}

#[test]
fn test_failing_command_exits_with_error() {
    let dir = TempDir::new().unwrap();
    let (code, stdout, stderr) = run_cli(&dir, &["add", "1", "two"], "");
    assert_eq!(code, 1);
    assert!(stdout.is_empty());
    assert!(stderr.contains("two"), "{stderr}");
}

#[test]
fn test_script_file() {
    let dir = TempDir::new().unwrap();
    let script = dir.path().join("setup.txt");
    std::fs::write(&script, "kv set color blue\nkv.get color\nnope\nhex 255\n").unwrap();

    let (code, stdout, stderr) = run_cli(&dir, &["--script", script.to_str().unwrap()], "");
    assert_eq!(code, 1);
    assert_eq!(stdout, "blue\n0xFF\n");
    assert!(stderr.contains("nope"), "{stderr}");
}

#[test]
fn test_fail_fast_stops_script() {
    let dir = TempDir::new().unwrap();
    let (code, stdout, _) = run_cli(
        &dir,
        &["--script", "-", "--fail-fast"],
        "add 1 1\nadd x 1\nadd 2 2\n",
    );
    assert_eq!(code, 1);
    assert_eq!(stdout, "2\n");
}

#[test]
fn test_stdin_script_succeeds() {
    let dir = TempDir::new().unwrap();
    let (code, stdout, _) = run_cli(&dir, &["--script", "-"], "math\nclamp 150\nback\necho done\n");
    assert_eq!(code, 0);
    assert_eq!(stdout, "100\ndone\n");
}

#[test]
fn test_config_init_and_types() {
    let dir = TempDir::new().unwrap();
    let types = dir.path().join("types.toml");
    std::fs::write(
        &types,
        r#"
[types.level]
base = "string"
choices = ["low", "high"]
"#,
    )
    .unwrap();
    std::fs::write(
        dir.path().join("config.toml"),
        format!(
            r#"
[types]
sources = [{types:?}]

[init]
"root" = ["kv set preset on"]
"#,
            types = types.to_str().unwrap()
        ),
    )
    .unwrap();

    let (code, stdout, _) = run_cli(&dir, &["kv.get", "preset"], "");
    assert_eq!(code, 0);
    assert_eq!(stdout, "on\n");

    let (code, stdout, _) = run_cli(&dir, &["convert", "level", "high"], "");
    assert_eq!(code, 0);
    assert_eq!(stdout, "high\n");

    let (code, _, stderr) = run_cli(&dir, &["convert", "level", "medium"], "");
    assert_eq!(code, 1);
    assert!(stderr.contains("choice"), "{stderr}");
}

#[test]
fn test_script_conflicts_with_command() {
    let dir = TempDir::new().unwrap();
    let (code, stdout, stderr) = run_cli(&dir, &["--script", "-", "add", "1", "2"], "");
    assert_eq!(code, 1);
    assert!(stdout.is_empty());
    assert!(stderr.contains("--script cannot be combined"), "{stderr}");
}
