//! CLI tests that spawn the `swarm` binary.
//!
//! None of these reach the oracle: they cover the graph command and the
//! input and configuration errors that stop a run before the first request.

use std::fs;
use std::path::Path;
use std::process::{Command, Output};

use swarm::exit_codes;

fn swarm(cwd: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_swarm"))
        .current_dir(cwd)
        .args(args)
        .env_remove("HF_TOKEN")
        .env_remove("HF_MODEL")
        .env_remove("RUST_LOG")
        .output()
        .expect("spawn swarm")
}

fn write(root: &Path, rel: &str, content: &str) {
    let path = root.join(rel);
    fs::create_dir_all(path.parent().expect("parent")).expect("mkdir");
    fs::write(path, content).expect("write");
}

#[test]
fn graph_prints_dependencies_and_fix_order() {
    let temp = tempfile::tempdir().expect("tempdir");
    write(temp.path(), "project/util.py", "VALUE = 1\n");
    write(
        temp.path(),
        "project/main.py",
        "import util\nfrom helpers import shout\n\nprint(shout(util.VALUE))\n",
    );
    write(temp.path(), "project/helpers.py", "def shout(x):\n    return x\n");
    write(temp.path(), "project/__pycache__/util.cpython-312.py", "junk\n");

    let output = swarm(temp.path(), &["graph", "--dir", "project"]);
    assert_eq!(output.status.code(), Some(exit_codes::OK));
    let stdout = String::from_utf8(output.stdout).expect("utf8");
    assert!(stdout.contains("main.py -> util.py, helpers.py"), "{stdout}");
    assert!(stdout.contains("util.py -> None"), "{stdout}");
    assert!(!stdout.contains("__pycache__"), "{stdout}");

    let order: Vec<&str> = stdout
        .lines()
        .skip_while(|line| *line != "Fix order:")
        .skip(1)
        .collect();
    assert_eq!(order, vec!["1. helpers.py", "2. util.py", "3. main.py"]);
}

#[test]
fn graph_honours_ignore() {
    let temp = tempfile::tempdir().expect("tempdir");
    write(temp.path(), "project/app.py", "import vendored\n");
    write(temp.path(), "project/vendored.py", "X = 1\n");

    let output = swarm(
        temp.path(),
        &["graph", "--dir", "project", "--ignore", "vendored.py"],
    );
    assert_eq!(output.status.code(), Some(exit_codes::OK));
    let stdout = String::from_utf8(output.stdout).expect("utf8");
    assert!(stdout.contains("app.py -> None"), "{stdout}");
    assert!(!stdout.contains("vendored.py ->"), "{stdout}");
}

#[test]
fn run_on_missing_directory_is_invalid() {
    let temp = tempfile::tempdir().expect("tempdir");
    let output = swarm(temp.path(), &["run", "--dir", "nope"]);
    assert_eq!(output.status.code(), Some(exit_codes::INVALID));
    let stderr = String::from_utf8(output.stderr).expect("utf8");
    assert!(stderr.contains("target directory does not exist"), "{stderr}");
}

#[test]
fn run_requires_exactly_one_target() {
    let temp = tempfile::tempdir().expect("tempdir");
    write(temp.path(), "project/app.py", "x = 1\n");
    let output = swarm(
        temp.path(),
        &["run", "--dir", "project", "--file", "project/app.py"],
    );
    assert!(!output.status.success());
    let output = swarm(temp.path(), &["run"]);
    assert!(!output.status.success());
}

#[test]
fn run_without_api_key_is_a_configuration_error() {
    let temp = tempfile::tempdir().expect("tempdir");
    write(temp.path(), "project/app.py", "x = 1\n");
    let output = swarm(temp.path(), &["run", "--dir", "project"]);
    assert_eq!(output.status.code(), Some(exit_codes::INVALID));
    let stderr = String::from_utf8(output.stderr).expect("utf8");
    assert!(stderr.contains("HF_TOKEN"), "{stderr}");
    assert_eq!(fs::read_to_string(temp.path().join("project/app.py")).expect("read"), "x = 1\n");
}

#[test]
fn oversized_file_exits_with_dedicated_code() {
    let temp = tempfile::tempdir().expect("tempdir");
    write(temp.path(), "project/big.py", &"x = 1\n".repeat(20));
    let output = Command::new(env!("CARGO_BIN_EXE_swarm"))
        .current_dir(temp.path())
        .args(["run", "--dir", "project", "--max-size", "16"])
        .env("HF_TOKEN", "test-token")
        .env("HF_MODEL", "test-model")
        .output()
        .expect("spawn swarm");
    assert_eq!(output.status.code(), Some(exit_codes::TOO_LARGE));
    let stderr = String::from_utf8(output.stderr).expect("utf8");
    assert!(stderr.contains("big.py"), "{stderr}");
}

#[test]
fn sandbox_outside_target_is_rejected() {
    let temp = tempfile::tempdir().expect("tempdir");
    write(temp.path(), "project/app.py", "x = 1\n");
    fs::create_dir_all(temp.path().join("elsewhere")).expect("mkdir");
    let output = swarm(
        temp.path(),
        &["run", "--dir", "project", "--sandbox", "elsewhere"],
    );
    assert_eq!(output.status.code(), Some(exit_codes::INVALID));
    let stderr = String::from_utf8(output.stderr).expect("utf8");
    assert!(stderr.contains("SECURITY VIOLATION"), "{stderr}");
}

#[test]
fn explicit_missing_config_is_invalid() {
    let temp = tempfile::tempdir().expect("tempdir");
    write(temp.path(), "project/app.py", "x = 1\n");
    let output = swarm(
        temp.path(),
        &["graph", "--dir", "project", "--config", "missing.toml"],
    );
    assert_eq!(output.status.code(), Some(exit_codes::INVALID));
}

#[test]
fn invalid_config_values_are_rejected() {
    let temp = tempfile::tempdir().expect("tempdir");
    write(temp.path(), "project/app.py", "x = 1\n");
    write(temp.path(), "swarm.toml", "max_iterations = 0\n");
    let output = swarm(temp.path(), &["graph", "--dir", "project"]);
    assert_eq!(output.status.code(), Some(exit_codes::INVALID));
}
