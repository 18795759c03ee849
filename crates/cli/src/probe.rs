// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Remote command over a brokered SSH connection.
//!
//! Success is either signal: exit status zero, or the sentinel in the last
//! meaningful output line. The connect proxy can exit non-zero after the
//! remote command already succeeded.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::{info, warn};

use crate::command::{BrokerCli, CommandRunner, CommandSpec, RunError};
use crate::error::{FailureKind, FlowError};
use crate::materialize::MaterializedKey;
use crate::token::SessionToken;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ProbeResult {
    pub succeeded: bool,
    /// Captured stdout, or the launch error when the command never ran.
    pub raw_output: String,
    pub stderr: String,
    pub exit_status: Option<i32>,
    pub timed_out: bool,
}

impl ProbeResult {
    pub fn classify(exit_status: Option<i32>, stdout: String, stderr: String, sentinel: &str) -> Self {
        let succeeded = probe_succeeded(exit_status, &stdout, sentinel);
        Self { succeeded, raw_output: stdout, stderr, exit_status, timed_out: false }
    }

    /// Last meaningful stdout line, usually the remote hostname.
    pub fn host(&self) -> Option<&str> {
        meaningful_last_line(&self.raw_output)
    }

    pub fn failure(&self) -> Option<FlowError> {
        if self.succeeded {
            return None;
        }
        if self.timed_out {
            return Some(FlowError::new(FailureKind::ProbeTimeout, "remote probe timed out"));
        }
        let output = if self.stderr.trim().is_empty() { &self.raw_output } else { &self.stderr };
        let output: String = output.trim().chars().take(300).collect();
        let detail = match self.exit_status {
            Some(code) => format!("remote probe exited {code}: {output}"),
            None => format!("remote probe did not exit cleanly: {output}"),
        };
        Some(FlowError::new(FailureKind::ProbeFailed, detail))
    }
}

/// Proxy banners and `key: value` chatter printed around the remote output.
pub fn is_noise(line: &str) -> bool {
    line.starts_with("Proxy") || line.starts_with(char::is_whitespace) || line.contains(':')
}

pub fn meaningful_last_line(stdout: &str) -> Option<&str> {
    stdout.trim().lines().filter(|l| !l.is_empty() && !is_noise(l)).last()
}

pub fn probe_succeeded(exit_status: Option<i32>, stdout: &str, sentinel: &str) -> bool {
    if exit_status == Some(0) {
        return true;
    }
    let sentinel = sentinel.to_lowercase();
    meaningful_last_line(stdout).is_some_and(|line| line.to_lowercase().contains(&sentinel))
}

pub struct RemoteProbe {
    cli: BrokerCli,
    runner: Arc<dyn CommandRunner>,
    command: String,
    sentinel: String,
    timeout: Duration,
}

impl RemoteProbe {
    pub fn new(
        cli: BrokerCli,
        runner: Arc<dyn CommandRunner>,
        command: impl Into<String>,
        sentinel: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        Self { cli, runner, command: command.into(), sentinel: sentinel.into(), timeout }
    }

    /// `connect -exec ssh` with the materialized key; the proxy fills in
    /// `{{boundary.ip}}` and `{{boundary.port}}`.
    pub fn connect_command(
        &self,
        target_id: &str,
        key: &MaterializedKey,
        token: &SessionToken,
    ) -> CommandSpec {
        self.cli
            .command(["connect", "-target-id", target_id], token)
            .args(["-exec", "ssh", "--", "-i"])
            .arg(key.key_path().to_string_lossy())
            .args([
                "-o",
                "StrictHostKeyChecking=no",
                "-o",
                "UserKnownHostsFile=/dev/null",
                "-o",
                "LogLevel=ERROR",
                "-l",
                key.username(),
                "-p",
                "{{boundary.port}}",
                "{{boundary.ip}}",
            ])
            .args(self.command.split_whitespace())
    }

    pub async fn run(&self, target_id: &str, key: &MaterializedKey, token: &SessionToken) -> ProbeResult {
        let spec = self.connect_command(target_id, key, token);
        match self.runner.run(&spec, self.timeout).await {
            Ok(output) => {
                let result =
                    ProbeResult::classify(output.code, output.stdout, output.stderr, &self.sentinel);
                if result.succeeded {
                    info!(host = result.host().unwrap_or("?"), code = ?result.exit_status, "probe succeeded");
                } else {
                    warn!(code = ?result.exit_status, "probe failed");
                }
                result
            }
            Err(RunError::TimedOut(after)) => {
                warn!(timeout_ms = after.as_millis() as u64, "probe timed out");
                ProbeResult { timed_out: true, ..ProbeResult::default() }
            }
            Err(e @ RunError::Spawn(_)) => {
                warn!("probe {e}");
                ProbeResult { raw_output: e.to_string(), ..ProbeResult::default() }
            }
        }
    }
}

#[cfg(test)]
#[path = "probe_tests.rs"]
mod tests;
