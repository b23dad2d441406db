use assert_cmd::Command;
use predicates::prelude::*;

const SEED: &str = "9d61b19deffd5a60ba844af492ec2cc44449c5697b326919703bac031cae7f60";

fn gatekeeper() -> Command {
    let mut cmd = Command::cargo_bin("gatekeeper").unwrap();
    cmd.env_remove("GATEKEEPER_SIGNING_KEY")
        .env_remove("GATEKEEPER_LOG_LEVEL")
        .env_remove("GATEKEEPER_LOG_FORMAT")
        .args(["--config", "/nonexistent/gatekeeper.toml"]);
    cmd
}

#[test]
fn test_cli_version() {
    gatekeeper()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("gatekeeper 0.1.0"));
}

#[test]
fn test_cli_help() {
    gatekeeper()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains(
            "Token authentication and per-route quotas for an API gateway",
        ));
}

#[test]
fn test_cli_keygen() {
    gatekeeper()
        .arg("keygen")
        .assert()
        .success()
        .stdout(predicate::str::is_match("^[0-9a-f]{64}\n$").unwrap());
}

#[test]
fn test_cli_token_with_configured_key() {
    let output = gatekeeper()
        .env("GATEKEEPER_SIGNING_KEY", SEED)
        .arg("token")
        .output()
        .unwrap();
    assert!(output.status.success());

    let token = String::from_utf8(output.stdout).unwrap();
    let service = gatekeeper::TokenService::from_hex_seed(SEED).unwrap();
    assert!(service.verify(token.trim()).is_ok());
}

#[test]
fn test_cli_token_requires_key() {
    gatekeeper()
        .arg("token")
        .assert()
        .failure()
        .stderr(predicate::str::contains("No signing key configured"));
}

#[test]
fn test_cli_rejects_bad_signing_key() {
    gatekeeper()
        .env("GATEKEEPER_SIGNING_KEY", "not-hex")
        .arg("serve")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid signing key"));
}
