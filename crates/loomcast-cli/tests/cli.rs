// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! End-to-end coverage of the `loom` binary against a minimal patch.

use assert_cmd::Command;
use predicates::prelude::*;

const MINIMAL_PATCH: &str = r#"{
    "blocks": [
        {
            "id": "time",
            "type_tag": "InfiniteTimeRoot",
            "params": {},
            "inputs": [],
            "outputs": [],
            "role": "User"
        }
    ],
    "edges": [],
    "buses": [],
    "settings": {
        "seed": 0,
        "adapter_cost_budget": 4,
        "param_chain_max_depth": 16,
        "trace_enabled": false
    }
}"#;

fn write_patch(dir: &tempfile::TempDir) -> std::path::PathBuf {
    let path = dir.path().join("patch.json");
    std::fs::write(&path, MINIMAL_PATCH).unwrap();
    path
}

#[test]
fn compile_reports_a_successful_build() {
    let dir = tempfile::tempdir().unwrap();
    let patch = write_patch(&dir);

    Command::cargo_bin("loom")
        .unwrap()
        .arg("compile")
        .arg(&patch)
        .assert()
        .success()
        .stdout(predicate::str::contains("compiled"));
}

#[test]
fn inspect_prints_the_type_table() {
    let dir = tempfile::tempdir().unwrap();
    let patch = write_patch(&dir);

    Command::cargo_bin("loom")
        .unwrap()
        .arg("inspect")
        .arg(&patch)
        .assert()
        .success()
        .stdout(predicate::str::contains("slot"));
}

#[test]
fn run_produces_one_row_per_frame() {
    let dir = tempfile::tempdir().unwrap();
    let patch = write_patch(&dir);

    Command::cargo_bin("loom")
        .unwrap()
        .arg("run")
        .arg(&patch)
        .arg("--from-ms")
        .arg("0")
        .arg("--to-ms")
        .arg("32")
        .arg("--step-ms")
        .arg("16")
        .assert()
        .success()
        .stdout(predicate::str::contains("frame"));
}

#[test]
fn nonexistent_patch_file_fails_with_a_clear_error() {
    Command::cargo_bin("loom")
        .unwrap()
        .arg("compile")
        .arg("/nonexistent/patch.json")
        .assert()
        .failure();
}
