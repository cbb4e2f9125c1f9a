// SPDX-FileCopyrightText: 2026 Convsync Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Command-line tests for the `convsync` binary.

use std::io::Write;

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::NamedTempFile;

fn config_file(contents: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file
}

fn convsync() -> Command {
    let mut cmd = Command::cargo_bin("convsync").unwrap();
    cmd.env_remove("RUST_LOG");
    cmd
}

#[test]
fn help_lists_subcommands() {
    convsync()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("watch"))
        .stdout(predicate::str::contains("history"))
        .stdout(predicate::str::contains("config"));
}

#[test]
fn config_prints_effective_values() {
    let file = config_file(
        r#"
[backend]
base_url = "https://support.example.com"
api_key = "anon-key"

[sync]
page_size = 40
"#,
    );

    convsync()
        .arg("--config")
        .arg(file.path())
        .arg("config")
        .assert()
        .success()
        .stdout(predicate::str::contains("base_url = \"https://support.example.com\""))
        .stdout(predicate::str::contains("page_size = 40"))
        .stdout(predicate::str::contains("anon-key").not());
}

#[test]
fn config_typo_fails_with_suggestion() {
    let file = config_file(
        r#"
[sync]
page_sise = 40
"#,
    );

    convsync()
        .arg("--config")
        .arg(file.path())
        .arg("config")
        .assert()
        .failure()
        .stderr(predicate::str::contains("page_size"));
}

#[test]
fn history_requires_a_contact() {
    convsync()
        .args(["history", "--platform", "whatsapp"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("--contact"));
}

#[test]
fn watch_without_realtime_url_fails() {
    let file = config_file(
        r#"
[backend]
base_url = "http://127.0.0.1:9"
"#,
    );

    convsync()
        .arg("--config")
        .arg(file.path())
        .args(["watch", "--platform", "whatsapp", "--contact", "+34600111222"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("realtime.url"));
}
