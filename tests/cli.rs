use assert_cmd::Command;
use predicates::prelude::*;
use serial_test::serial;
use std::fs::write;
use tempfile::tempdir;

/// A valid config pointing at a temp root; the page itself is never reached
/// in these tests because credential resolution fails first.
fn write_config(dir: &std::path::Path) -> std::path::PathBuf {
    let config_path = dir.join("sources.yaml");
    let root = dir.join("mirror");
    write(
        &config_path,
        format!(
            "root_dir: {}\npages:\n  - name: handbook\n    page_id: \"12345\"\n    access: read-write\n",
            root.display()
        ),
    )
    .expect("Writing temp config failed");
    config_path
}

fn confsync() -> Command {
    let mut cmd = Command::cargo_bin("confsync").expect("Binary exists");
    cmd.env_remove("CONFLUENCE_BASE_URL")
        .env_remove("CONFLUENCE_API_EMAIL")
        .env_remove("CONFLUENCE_API_TOKEN");
    cmd
}

#[test]
fn help_lists_both_subcommands() {
    confsync()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("sync").and(predicate::str::contains("push")));
}

#[test]
#[serial]
fn sync_fails_cleanly_on_missing_config_file() {
    let dir = tempdir().unwrap();
    confsync()
        .current_dir(dir.path())
        .args(["sync", "--config", "no-such-file.yaml"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("read config file"));
}

#[test]
#[serial]
fn sync_without_credentials_names_the_missing_variables() {
    let dir = tempdir().unwrap();
    let config = write_config(dir.path());

    confsync()
        .current_dir(dir.path())
        .args(["sync", "--config"])
        .arg(&config)
        .assert()
        .failure()
        .stderr(predicate::str::contains("CONFLUENCE_BASE_URL"));
}

#[test]
#[serial]
fn push_refuses_empty_stdin_before_touching_the_network() {
    let dir = tempdir().unwrap();
    let config = write_config(dir.path());

    confsync()
        .current_dir(dir.path())
        .args(["push", "--config"])
        .arg(&config)
        .args(["--doc", "handbook"])
        .write_stdin("")
        .assert()
        .failure()
        .stderr(predicate::str::contains("empty content"));
}

#[test]
#[serial]
fn push_reads_content_before_resolving_credentials() {
    let dir = tempdir().unwrap();
    let config = write_config(dir.path());

    // Credentials are checked after content is read but before any push
    // logic, so a missing-env failure proves the content was accepted.
    confsync()
        .current_dir(dir.path())
        .args(["push", "--config"])
        .arg(&config)
        .args(["--doc", "handbook"])
        .write_stdin("# A real edit\n")
        .assert()
        .failure()
        .stderr(predicate::str::contains("CONFLUENCE_BASE_URL"));
}
