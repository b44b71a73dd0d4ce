//! End-to-end tests of the `bitblock` binary.

use assert_cmd::Command;
use predicates::prelude::*;
use std::io::Write;
use tempfile::NamedTempFile;

fn bitblock() -> Command {
    Command::cargo_bin("bitblock").unwrap()
}

#[test]
fn test_names_lists_every_tier() {
    bitblock()
        .arg("names")
        .assert()
        .success()
        .stdout(predicate::str::contains("BASE_512"))
        .stdout(predicate::str::contains("AVX2_128"))
        .stdout(predicate::str::contains("AVX512F"));
}

#[test]
fn test_info_json() {
    let output = bitblock().args(["info", "--json"]).output().unwrap();
    assert!(output.status.success());
    let value: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert!(value["unique_name"].is_string());
    assert_eq!(value["block_width"], 256);
    assert_eq!(value["word_width"], 64);
}

#[test]
fn test_info_with_config() {
    let mut file = NamedTempFile::new().unwrap();
    write!(
        file,
        r#"{{"block_width": 128, "stride": 128, "tiers": {{"enable_avx": false, "enable_avx2": false, "enable_avx512f": false}}}}"#
    )
    .unwrap();
    bitblock()
        .arg("--config")
        .arg(file.path())
        .arg("info")
        .assert()
        .success()
        .stdout(predicate::str::contains("Unique name: BASE"))
        .stdout(predicate::str::contains("Block width: 128"));
}

#[test]
fn test_selftest_passes() {
    bitblock()
        .args(["--quiet", "selftest", "--width", "128", "--rounds", "1", "--json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"primitive\": \"bitblock_indexed_advance\""));
}

#[test]
fn test_selftest_summary() {
    bitblock()
        .args(["selftest", "-w", "256", "-r", "1", "-j", "2"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Result: passed"));
}

#[test]
fn test_selftest_rejects_bad_width() {
    bitblock()
        .args(["selftest", "--width", "64"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("unsupported block width 64"));
}

#[test]
fn test_missing_config_fails() {
    bitblock()
        .args(["--config", "/nonexistent/bitblock.json", "info"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to load configuration"));
}

#[test]
fn test_invalid_config_fails() {
    let mut file = NamedTempFile::new().unwrap();
    write!(file, r#"{{"block_width": 256, "stride": 100}}"#).unwrap();
    bitblock()
        .arg("--config")
        .arg(file.path())
        .arg("names")
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid configuration"));
}
