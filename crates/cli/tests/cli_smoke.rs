// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Binary-level checks that need no browser.

use std::process::Command;

fn brokerflow() -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_brokerflow"));
    for var in ["BOUNDARY_URL", "KEYCLOAK_URL", "TEST_USER", "BROKERFLOW_TARGETS", "BROKERFLOW_LOG_FORMAT"] {
        cmd.env_remove(var);
    }
    cmd
}

#[test]
fn help_lists_flow_options() -> anyhow::Result<()> {
    let out = brokerflow().arg("--help").output()?;
    assert!(out.status.success());
    let stdout = String::from_utf8_lossy(&out.stdout);
    assert!(stdout.contains("--broker-url"));
    assert!(stdout.contains("BOUNDARY_URL"));
    assert!(stdout.contains("--probe-sentinel"));
    Ok(())
}

#[yare::parameterized(
    bad_url        = { &["--broker-url", "not a url"], "--broker-url is not a valid URL" },
    no_targets     = { &["--targets", " , "], "--targets must name at least one target" },
    bad_log_format = { &["--log-format", "yaml"], "invalid log format: yaml" },
)]
fn invalid_configuration_exits_2(args: &[&str], message: &str) {
    let out = match brokerflow().args(args).output() {
        Ok(out) => out,
        Err(e) => panic!("failed to launch brokerflow: {e}"),
    };
    assert_eq!(out.status.code(), Some(2));
    assert!(String::from_utf8_lossy(&out.stderr).contains(message));
}

#[test]
fn unreachable_webdriver_fails_with_exit_1() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let summary = dir.path().join("verdict.json");
    let out = brokerflow()
        .args(["--webdriver-url", "http://127.0.0.1:9", "--log-level", "error"])
        .arg("--summary-json")
        .arg(&summary)
        .output()?;

    assert_eq!(out.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&out.stdout).starts_with("FAIL [UnclassifiedException]"));

    let json: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(&summary)?)?;
    assert_eq!(json["passed"], false);
    assert_eq!(json["final_state"], "init");
    Ok(())
}
