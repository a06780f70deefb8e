use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use tempfile::TempDir;

/// Binary pointed at `config` with no AGENTGATE_* overrides leaking in
fn agentgate(config: &std::path::Path) -> Command {
    let mut cmd = Command::cargo_bin("agentgate").unwrap();
    for var in [
        "AGENTGATE_LOG_LEVEL",
        "AGENTGATE_LOG_FORMAT",
        "AGENTGATE_RATE_CAPACITY",
        "AGENTGATE_RATE_REFILL",
        "AGENTGATE_MAX_BUCKETS",
        "RUST_LOG",
    ] {
        cmd.env_remove(var);
    }
    cmd.arg("--config").arg(config);
    cmd
}

fn write_config(dir: &TempDir, body: &str) -> std::path::PathBuf {
    let path = dir.path().join("config.toml");
    fs::write(&path, body).unwrap();
    path
}

#[test]
fn test_cli_version() {
    let mut cmd = Command::cargo_bin("agentgate").unwrap();
    cmd.arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("agentgate 0.1.0"));
}

#[test]
fn test_cli_help() {
    let mut cmd = Command::cargo_bin("agentgate").unwrap();
    cmd.arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains(
            "Gate agent actions behind rate limits and permission policy",
        ));
}

#[test]
fn test_cli_check_missing_actions() {
    let dir = TempDir::new().unwrap();
    agentgate(&dir.path().join("missing.toml"))
        .arg("check")
        .assert()
        .failure()
        .stderr(predicate::str::contains(
            "required arguments were not provided",
        ));
}

#[test]
fn test_cli_check_denies_without_policy() {
    let dir = TempDir::new().unwrap();
    agentgate(&dir.path().join("missing.toml"))
        .args(["check", "post"])
        .assert()
        .success()
        .stdout(predicate::str::contains(
            "DENIED post: Action 'post' has no permission rule",
        ));
}

#[test]
fn test_cli_check_applies_identity_policy() {
    let dir = TempDir::new().unwrap();
    let path = write_config(
        &dir,
        r#"
[identity.permissions]
learn = true
direct_message = false
post = { max_per_hour = 1 }
"#,
    );

    agentgate(&path)
        .args(["check", "learn", "direct_message", "post", "post"])
        .assert()
        .success()
        .stdout(predicate::str::contains("ALLOWED learn"))
        .stdout(predicate::str::contains(
            "DENIED direct_message: Action 'direct_message' is explicitly denied",
        ))
        .stdout(predicate::str::contains("ALLOWED post"))
        .stdout(predicate::str::contains(
            "DENIED post: Rate limited: 'post' used 1/1 times in the last hour",
        ));
}

#[test]
fn test_cli_check_with_approval_and_stats() {
    let dir = TempDir::new().unwrap();
    let path = write_config(
        &dir,
        r#"
[identity.permissions]
comment = { requires_approval = true }
"#,
    );

    agentgate(&path)
        .args(["check", "--approve", "comment", "--stats", "comment", "comment"])
        .assert()
        .success()
        .stdout(predicate::str::contains("ALLOWED comment"))
        .stdout(predicate::str::contains(
            "DENIED comment: Action 'comment' requires human approval",
        ))
        .stdout(predicate::str::contains("\"actions_this_hour\": 1"));
}

#[test]
fn test_cli_rejects_malformed_rule() {
    let dir = TempDir::new().unwrap();
    let path = write_config(
        &dir,
        r#"
[identity.permissions]
post = "sometimes"
"#,
    );

    agentgate(&path)
        .args(["check", "post"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to load configuration"));
}

#[test]
fn test_cli_limit_exhausts_bucket() {
    let dir = TempDir::new().unwrap();
    let path = write_config(
        &dir,
        r#"
[rate_limit]
capacity = 2.0
refill_rate = 0.001
max_buckets = 4
"#,
    );

    agentgate(&path)
        .args(["limit", "--key", "agent-1", "--attempts", "3"])
        .assert()
        .success()
        .stdout(predicate::str::contains("1 allowed (remaining 1)"))
        .stdout(predicate::str::contains("2 allowed (remaining 0)"))
        .stdout(predicate::str::contains("3 denied"))
        .stdout(predicate::str::contains("\"live_keys\": 1"));
}

#[test]
fn test_cli_show_config_defaults() {
    let dir = TempDir::new().unwrap();
    agentgate(&dir.path().join("missing.toml"))
        .arg("show-config")
        .assert()
        .success()
        .stdout(predicate::str::contains("[rate_limit]"))
        .stdout(predicate::str::contains("max_buckets = 10000"))
        .stdout(predicate::str::contains("comments_per_day = 50"));
}
