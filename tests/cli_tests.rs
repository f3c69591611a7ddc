use std::io::Write;

use assert_cmd::Command;
use predicates::prelude::*;

const STREAM_VARS: [&str; 3] = ["S2_ACCESS_TOKEN", "S2_BASIN", "S2_STREAM"];

fn pkgstream() -> Command {
    let mut cmd = Command::cargo_bin("pkgstream").expect("binary");
    for name in STREAM_VARS {
        cmd.env_remove(name);
    }
    cmd.env_remove("RUST_LOG");
    cmd
}

#[test]
fn help_lists_subcommands() {
    pkgstream()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("serve"))
        .stdout(predicate::str::contains("tail"))
        .stdout(predicate::str::contains("check"));
}

#[test]
fn check_env_fails_without_credentials() {
    pkgstream()
        .args(["--color", "never", "check", "env"])
        .assert()
        .failure()
        .stdout(predicate::str::contains("S2_ACCESS_TOKEN"))
        .stdout(predicate::str::contains("missing"));
}

#[test]
fn check_env_reports_partial_as_json() {
    pkgstream()
        .env("S2_BASIN", "packages")
        .args(["--json", "check", "env"])
        .assert()
        .failure()
        .stdout(predicate::str::contains(r#""readiness":"partial""#));
}

#[test]
fn check_env_passes_with_credentials() {
    pkgstream()
        .env("S2_ACCESS_TOKEN", "token")
        .env("S2_BASIN", "packages")
        .env("S2_STREAM", "npm")
        .args(["--color", "never", "check", "env"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Reading from S2 StreamStore"));
}

#[test]
fn invalid_config_exits_nonzero() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(b"[relay]\nbind = \"nowhere\"\n").unwrap();

    pkgstream()
        .args(["check", "config", "--config"])
        .arg(file.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("relay.bind"));
}

#[test]
fn check_health_without_credentials_fails() {
    pkgstream()
        .args(["--color", "never", "check", "health"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Stream source not configured"));
}
