use assert_cmd::Command;
use predicates::prelude::*;

fn cli(dir: &std::path::Path) -> Command {
    let mut cmd = Command::cargo_bin("issue-digest").unwrap();
    cmd.env("XDG_CONFIG_HOME", dir.join("config"))
        .env("CACHE_DB_PATH", dir.join("cache.db"))
        .env_remove("RUST_LOG")
        .env_remove("OPENAI_API_KEY");
    cmd
}

#[test]
fn test_cli_help() {
    let dir = tempfile::tempdir().unwrap();
    cli(dir.path())
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("summarize"))
        .stdout(predicate::str::contains("cache"));
}

#[test]
fn test_invalid_repo_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    cli(dir.path())
        .args(["summarize", "not-a-repo", "--no-llm"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("expected owner/repo"));
}

#[test]
fn test_zero_concurrency_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    cli(dir.path())
        .args(["summarize", "owner/repo", "--concurrency", "0"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("--concurrency"));
}

#[test]
fn test_cache_stats_on_fresh_cache() {
    let dir = tempfile::tempdir().unwrap();
    cli(dir.path())
        .args(["cache", "stats"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Memory entries: 0"))
        .stdout(predicate::str::contains("Durable entries: 0"));
}

#[test]
fn test_cache_clear_and_cleanup() {
    let dir = tempfile::tempdir().unwrap();
    cli(dir.path())
        .args(["cache", "clear"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Cache cleared"));
    cli(dir.path())
        .args(["cache", "cleanup"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Removed 0 expired entries"));
}

#[test]
fn test_cache_commands_report_unavailable_durable_tier() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("cache.db"), b"not a database ".repeat(512)).unwrap();

    cli(dir.path())
        .args(["cache", "clear"])
        .assert()
        .success()
        .stdout(predicate::str::contains("durable tier unavailable"))
        .stdout(predicate::str::contains("Cache cleared").not());
    cli(dir.path())
        .args(["cache", "cleanup"])
        .assert()
        .success()
        .stdout(predicate::str::contains("durable tier unavailable"));
    cli(dir.path())
        .args(["cache", "stats"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Durable entries: unavailable"));
}
