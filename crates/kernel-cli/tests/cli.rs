use assert_cmd::Command;
use predicates::prelude::*;

#[test]
fn runs_demo_plugins_and_sums_default_args() -> Result<(), Box<dyn std::error::Error>> {
    let mut cmd = Command::cargo_bin("kernel-cli")?;

    cmd.assert()
        .success()
        .stdout(predicate::str::contains("kernel started: math, logger loaded"))
        .stdout(predicate::str::contains("math.add -> 15"))
        .stdout(predicate::str::contains("kernel shut down"));

    Ok(())
}

#[test]
fn sums_custom_add_argument() -> Result<(), Box<dyn std::error::Error>> {
    let mut cmd = Command::cargo_bin("kernel-cli")?;
    cmd.args(["--add", "1.0,1.0"]);

    // logger's proxy doubles each arg before summing, then adds 1 after: (1*2 + 1*2) + 1 = 5.
    cmd.assert().success().stdout(predicate::str::contains("math.add -> 5"));

    Ok(())
}

#[test]
fn rejects_unreadable_config_file() -> Result<(), Box<dyn std::error::Error>> {
    let mut cmd = Command::cargo_bin("kernel-cli")?;
    cmd.args(["--config", "/nonexistent/kernel.toml"]);

    cmd.assert().failure().stderr(predicate::str::contains("config error"));

    Ok(())
}
