// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::time::Duration;

use super::*;
use crate::token::SessionToken;

fn sh(script: &str) -> CommandSpec {
    CommandSpec::new("sh").arg("-c").arg(script)
}

#[tokio::test]
async fn captures_stdout_and_exit_code() -> anyhow::Result<()> {
    let spec = sh("echo hello; echo oops >&2; exit 3");
    let out = ProcessRunner.run(&spec, Duration::from_secs(5)).await?;
    assert_eq!(out.code, Some(3));
    assert_eq!(out.stdout.trim(), "hello");
    assert_eq!(out.stderr.trim(), "oops");
    assert!(!out.success());
    Ok(())
}

#[tokio::test]
async fn env_is_scoped_to_the_child() -> anyhow::Result<()> {
    let spec = sh("printf %s \"$BROKERFLOW_CHILD_ONLY\"").env("BROKERFLOW_CHILD_ONLY", "visible");
    let out = ProcessRunner.run(&spec, Duration::from_secs(5)).await?;
    assert_eq!(out.stdout, "visible");
    assert!(std::env::var("BROKERFLOW_CHILD_ONLY").is_err());
    Ok(())
}

#[tokio::test]
async fn timeout_is_reported_not_waited_out() {
    let started = std::time::Instant::now();
    let result = ProcessRunner.run(&sh("sleep 10"), Duration::from_millis(100)).await;
    assert_eq!(result, Err(RunError::TimedOut(Duration::from_millis(100))));
    assert!(started.elapsed() < Duration::from_secs(5));
}

#[tokio::test]
async fn missing_program_is_a_spawn_error() {
    let spec = CommandSpec::new("brokerflow-definitely-not-installed");
    let result = ProcessRunner.run(&spec, Duration::from_secs(1)).await;
    assert!(matches!(result, Err(RunError::Spawn(ref msg)) if msg.contains("not in PATH")));
}

#[test]
fn detail_prefers_stderr() {
    let out = CommandOutput { code: Some(1), stdout: "out".into(), stderr: " err \n".into() };
    assert_eq!(out.detail(), "err");
    let out = CommandOutput { code: Some(1), stdout: "".into(), stderr: "".into() };
    assert_eq!(out.detail(), "no output");
}

#[test]
fn broker_cli_passes_token_through_env_only() {
    let cli = BrokerCli::new("boundary", "https://boundary.test", true);
    let token = SessionToken::new("at_secret_value");
    let spec = cli.command(["targets", "list"], &token);

    assert_eq!(spec.program, "boundary");
    assert_eq!(spec.args, vec!["targets", "list", "-token", "env://BOUNDARY_TOKEN"]);
    assert!(!spec.display().contains("at_secret_value"));
    assert!(spec.env.contains(&("BOUNDARY_TOKEN".into(), "at_secret_value".into())));
    assert!(spec.env.contains(&("BOUNDARY_ADDR".into(), "https://boundary.test".into())));
    assert!(spec.env.contains(&("BOUNDARY_TLS_INSECURE".into(), "true".into())));
}

#[test]
fn broker_cli_omits_insecure_flag_when_verifying() {
    let cli = BrokerCli::new("boundary", "https://boundary.test", false);
    let spec = cli.command(["scopes", "list"], &SessionToken::new("at_x"));
    assert!(!spec.env.iter().any(|(k, _)| k == "BOUNDARY_TLS_INSECURE"));
}
