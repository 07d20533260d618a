//! Integration tests for the `fake` binary.
//!
//! Each test writes a small project, runs the binary in it and checks the
//! exit status and output.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use std::time::{SystemTime, UNIX_EPOCH};

fn unique_name(prefix: &str) -> String {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    format!("{prefix}-{}-{nanos}", std::process::id())
}

fn test_project_dir(name: &str) -> PathBuf {
    std::env::current_dir()
        .unwrap_or_else(|_| PathBuf::from("."))
        .join(".tmp_test_projects")
        .join(name)
}

fn create_project(prefix: &str, fakefile: &str) -> PathBuf {
    let dir = test_project_dir(&unique_name(prefix));
    if dir.exists() {
        fs::remove_dir_all(&dir).ok();
    }
    fs::create_dir_all(&dir).expect("Failed to create test project dir");
    fs::write(dir.join("Fakefile"), fakefile).expect("Failed to write Fakefile");
    dir
}

fn run_fake(project_dir: &Path, args: &[&str]) -> Output {
    let fake = PathBuf::from(env!("CARGO_BIN_EXE_fake"));
    Command::new(fake)
        .args(args)
        .current_dir(project_dir)
        .env("FAKE_OFFLINE", "1")
        .output()
        .expect("Failed to run fake")
}

fn output_text(output: &Output) -> String {
    format!(
        "{}\n{}",
        String::from_utf8_lossy(&output.stdout),
        String::from_utf8_lossy(&output.stderr)
    )
}

#[test]
fn dependency_map_lists_who_needs_what() {
    let dir = create_project("depmap", "all <- a b\na <- b\nb <-\n");

    let output = run_fake(&dir, &["dependency-map"]);
    let text = output_text(&output);
    assert!(output.status.success(), "dependency-map failed.\n{}", text);
    assert!(text.contains("b needed by a all"), "{}", text);
    assert!(text.contains("a needed by all"), "{}", text);

    fs::remove_dir_all(&dir).ok();
}

#[test]
fn cycle_fails_with_the_chain() {
    let dir = create_project("cycle", "x <- y\ny <- x\n");

    let output = run_fake(&dir, &[]);
    let text = output_text(&output);
    assert!(!output.status.success(), "a cycle must fail.\n{}", text);
    assert!(text.contains("x -> y -> x"), "{}", text);

    fs::remove_dir_all(&dir).ok();
}

#[test]
fn check_names_what_a_sub_build_would_make() {
    let dir = create_project("subcheck", "sub <- child/\n");
    fs::create_dir_all(dir.join("child")).expect("Failed to create child project");
    fs::write(dir.join("child/Fakefile"), "all <-\n").expect("Failed to write child Fakefile");

    let output = run_fake(&dir, &["--check"]);
    let text = output_text(&output);
    assert!(output.status.success(), "check failed.\n{}", text);
    assert!(text.contains("would make 'sub'"), "{}", text);
    assert!(!dir.join("sub").exists());

    fs::remove_dir_all(&dir).ok();
}

#[test]
fn unknown_target_fails() {
    let dir = create_project("unknown", "all <-\n");

    let output = run_fake(&dir, &["nope"]);
    let text = output_text(&output);
    assert!(!output.status.success(), "{}", text);
    assert!(text.contains("unknown target: 'nope'"), "{}", text);

    fs::remove_dir_all(&dir).ok();
}

#[cfg(unix)]
#[test]
fn program_rule_builds_once() {
    let dir = create_project("program", "out.txt[cp in.txt out.txt] <- in.txt\n");
    fs::write(dir.join("in.txt"), "hello").unwrap();

    let output = run_fake(&dir, &[]);
    let text = output_text(&output);
    assert!(output.status.success(), "build failed.\n{}", text);
    assert_eq!(fs::read_to_string(dir.join("out.txt")).unwrap(), "hello");

    let output = run_fake(&dir, &["--json"]);
    let text = output_text(&output);
    assert!(output.status.success(), "{}", text);
    assert!(text.contains("\"actions\": 0"), "{}", text);

    fs::remove_dir_all(&dir).ok();
}

#[test]
fn completion_script_is_generated() {
    let dir = create_project("completion", "all <-\n");

    let output = run_fake(&dir, &["completion", "bash"]);
    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).contains("fake"));

    fs::remove_dir_all(&dir).ok();
}
