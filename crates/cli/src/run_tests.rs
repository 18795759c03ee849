// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::path::PathBuf;

use super::*;
use crate::error::FailureKind;

#[test]
fn summary_round_trips_through_disk() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("verdict.json");
    let verdict = Verdict::fail(
        FlowError::new(FailureKind::BrokerUnavailable, "authorize-session timed out after 30000ms"),
        FlowState::Authenticated,
        vec![PathBuf::from("/tmp/ssh-oidc-test-05-error.png")],
    );

    write_summary(&path, &verdict)?;
    let json: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(&path)?)?;
    assert_eq!(json["passed"], false);
    assert_eq!(json["failure"], "BrokerUnavailable");
    assert_eq!(json["final_state"], "authenticated");
    assert_eq!(json["artifacts"][0], "/tmp/ssh-oidc-test-05-error.png");
    Ok(())
}

#[test]
fn summary_to_missing_directory_fails() {
    let verdict = Verdict::pass("ok", None, vec![]);
    crate::assert_err_contains!(
        write_summary(Path::new("/nonexistent/dir/verdict.json"), &verdict),
        "failed to write summary"
    );
}

#[test]
fn init_tracing_is_idempotent() {
    let mut config = Config::test();
    init_tracing(&config);
    config.log_format = "json".into();
    init_tracing(&config);
}
