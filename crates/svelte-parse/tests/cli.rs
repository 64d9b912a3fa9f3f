//! End-to-end runs of the `svelte-parse` binary.

use std::path::PathBuf;
use std::process::Command;

use pretty_assertions::assert_eq;

fn fixture(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests/fixtures")
        .join(name)
}

fn svelte_parse(args: &[&str]) -> std::process::Output {
    Command::new(env!("CARGO_BIN_EXE_svelte-parse"))
        .args(args)
        .env_remove("RUST_LOG")
        .output()
        .expect("failed to run svelte-parse")
}

#[test]
fn test_clean_file_exits_zero() {
    let path = fixture("Counter.svelte");
    let output = svelte_parse(&["--fail-on-errors", path.to_str().unwrap()]);
    assert!(output.status.success());
    assert_eq!(String::from_utf8_lossy(&output.stdout), "");
    assert_eq!(
        String::from_utf8_lossy(&output.stderr).trim(),
        "svelte-parse parsed 1 file with no errors"
    );
}

#[test]
fn test_errors_fail_only_when_requested() {
    let path = fixture("Broken.svelte");
    let path = path.to_str().unwrap();

    let output = svelte_parse(&[path]);
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("unclosed tag: <p>"), "{stdout}");

    let output = svelte_parse(&["--fail-on-errors", path]);
    assert_eq!(output.status.code(), Some(1));
}

#[test]
fn test_json_output_for_directory() {
    let dir = fixture("");
    let output = svelte_parse(&["--output", "json", dir.to_str().unwrap()]);
    assert!(output.status.success());

    let value: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let files = value.as_array().unwrap();
    assert_eq!(files.len(), 2);
    assert!(files[0]["filename"]
        .as_str()
        .unwrap()
        .ends_with("Broken.svelte"));
    assert_eq!(files[0]["errors"][0]["code"], "unclosed_tag");
    assert_eq!(files[1]["errors"], serde_json::json!([]));
    assert!(files[1]["document"]["instance_script"].is_object());
}

#[test]
fn test_missing_path_is_reported() {
    let output = svelte_parse(&[fixture("nope.svelte").to_str().unwrap()]);
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("path not found"));
}
