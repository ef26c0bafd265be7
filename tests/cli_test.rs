use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use tempfile::TempDir;

/// The binary run from an empty directory with nothing but the given variables set
fn relay(dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("merge-relay").unwrap();
    cmd.env_clear().current_dir(dir.path());
    if let Ok(path) = std::env::var("PATH") {
        cmd.env("PATH", path);
    }
    cmd
}

fn with_required(cmd: &mut Command, dir: &TempDir) {
    cmd.env("TARGET_REPO_URL", "https://github.com/acme/target.git")
        .env("SOURCE_REPO_URL", "https://github.com/acme/source.git")
        .env("TARGET_BRANCH", "main")
        .env("SOURCE_BRANCH", "develop")
        .env("GITHUB_TOKEN", "ghp_do_not_print")
        .env("TARGET_REPO_PATH", dir.path().join("target_repo"));
}

#[test]
fn test_help_lists_subcommands() {
    let dir = TempDir::new().unwrap();
    relay(&dir)
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("check-config"))
        .stdout(predicate::str::contains("run"));
}

#[test]
fn test_missing_configuration_exits_with_code_2_and_touches_nothing() {
    let dir = TempDir::new().unwrap();
    relay(&dir)
        .env("TARGET_REPO_PATH", dir.path().join("target_repo"))
        .env("TARGET_REPO_URL", "https://github.com/acme/target.git")
        .assert()
        .code(2)
        .stderr(predicate::str::contains("missing required configuration"))
        .stderr(predicate::str::contains("GITHUB_TOKEN"))
        .stderr(predicate::str::contains("TARGET_REPO_URL").not());

    assert!(!dir.path().join("target_repo").exists());
    assert!(!dir.path().join("target_repo.lock").exists());
}

#[test]
fn test_invalid_value_exits_with_code_2() {
    let dir = TempDir::new().unwrap();
    let mut cmd = relay(&dir);
    with_required(&mut cmd, &dir);
    cmd.env("EXISTING_CONFLICT_POLICY", "sometimes")
        .arg("run")
        .assert()
        .code(2)
        .stderr(predicate::str::contains("EXISTING_CONFLICT_POLICY"));
}

#[test]
fn test_check_config_prints_settings_without_token() {
    let dir = TempDir::new().unwrap();
    let mut cmd = relay(&dir);
    with_required(&mut cmd, &dir);
    cmd.arg("check-config")
        .assert()
        .success()
        .stdout(predicate::str::contains("target_branch = \"main\""))
        .stdout(predicate::str::contains("source_remote_name = \"source_repo\""))
        .stdout(predicate::str::contains("ghp_do_not_print").not());
}

#[test]
fn test_config_file_and_dotenv_are_layered() {
    let dir = TempDir::new().unwrap();
    let config = dir.path().join("relay.toml");
    fs::write(
        &config,
        r#"
target_repo_url = "https://github.com/acme/target.git"
source_repo_url = "https://github.com/acme/source.git"
target_branch = "release"
source_branch = "develop"
"#,
    )
    .unwrap();
    fs::write(dir.path().join(".env"), "GITHUB_TOKEN=from-dotenv\nTARGET_BRANCH=main\n").unwrap();

    relay(&dir)
        .arg("--config")
        .arg(&config)
        .arg("check-config")
        .assert()
        .success()
        .stdout(predicate::str::contains("target_branch = \"main\""))
        .stdout(predicate::str::contains("from-dotenv").not());
}

#[test]
fn test_unreadable_config_file_exits_with_code_2() {
    let dir = TempDir::new().unwrap();
    relay(&dir)
        .arg("--config")
        .arg(dir.path().join("missing.toml"))
        .arg("check-config")
        .assert()
        .code(2)
        .stderr(predicate::str::contains("configuration"));
}
