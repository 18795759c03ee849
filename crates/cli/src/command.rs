// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! External command execution with bounded timeouts.
//!
//! Every broker CLI call (target lookup, session authorization, connect) goes
//! through a [`CommandRunner`]. Calls are never retried: a timeout or spawn
//! failure is terminal for the phase that issued it.

use std::future::Future;
use std::pin::Pin;
use std::process::Stdio;
use std::time::Duration;

use tracing::debug;

use crate::token::SessionToken;

/// Environment variable the broker CLI reads the session token from.
pub const TOKEN_ENV: &str = "BOUNDARY_TOKEN";

/// A fully-specified process invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    /// Extra environment for this invocation only.
    pub env: Vec<(String, String)>,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self { program: program.into(), args: Vec::new(), env: Vec::new() }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    /// Program plus arguments, for logs. Environment values are omitted.
    pub fn display(&self) -> String {
        let mut out = self.program.clone();
        for arg in &self.args {
            out.push(' ');
            out.push_str(arg);
        }
        out
    }
}

/// Captured output of a process that ran to completion.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// Exit code; `None` when the process was killed by a signal.
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }

    /// Stderr if present, else stdout, else a placeholder; truncated for logs.
    pub fn detail(&self) -> String {
        let stderr = self.stderr.trim();
        let stdout = self.stdout.trim();
        let text = if !stderr.is_empty() {
            stderr
        } else if !stdout.is_empty() {
            stdout
        } else {
            "no output"
        };
        text.chars().take(300).collect()
    }
}

/// Why a command produced no [`CommandOutput`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunError {
    TimedOut(Duration),
    Spawn(String),
}

impl std::fmt::Display for RunError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::TimedOut(d) => write!(f, "timed out after {}ms", d.as_millis()),
            Self::Spawn(e) => write!(f, "failed to launch: {e}"),
        }
    }
}

impl std::error::Error for RunError {}

/// Runs external commands. Object-safe for use as `Arc<dyn CommandRunner>`.
pub trait CommandRunner: Send + Sync {
    fn run<'a>(
        &'a self,
        spec: &'a CommandSpec,
        timeout: Duration,
    ) -> Pin<Box<dyn Future<Output = Result<CommandOutput, RunError>> + Send + 'a>>;
}

/// [`CommandRunner`] backed by `tokio::process`.
///
/// The child is killed when the timeout elapses.
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessRunner;

impl CommandRunner for ProcessRunner {
    fn run<'a>(
        &'a self,
        spec: &'a CommandSpec,
        timeout: Duration,
    ) -> Pin<Box<dyn Future<Output = Result<CommandOutput, RunError>> + Send + 'a>> {
        Box::pin(async move {
            let mut cmd = tokio::process::Command::new(&spec.program);
            cmd.args(&spec.args)
                .envs(spec.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
                .stdin(Stdio::null())
                .stdout(Stdio::piped())
                .stderr(Stdio::piped())
                .kill_on_drop(true);

            debug!(command = %spec.display(), timeout_ms = timeout.as_millis() as u64, "running");

            let output = match tokio::time::timeout(timeout, cmd.output()).await {
                Err(_) => return Err(RunError::TimedOut(timeout)),
                Ok(Err(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                    let msg = format!("{} is not installed or not in PATH", spec.program);
                    return Err(RunError::Spawn(msg));
                }
                Ok(Err(e)) => return Err(RunError::Spawn(e.to_string())),
                Ok(Ok(output)) => output,
            };

            Ok(CommandOutput {
                code: output.status.code(),
                stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            })
        })
    }
}

/// Builds broker CLI invocations.
///
/// Connection parameters and the session token travel in the child's
/// environment; the parent process environment is never touched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerCli {
    pub program: String,
    pub addr: String,
    pub tls_insecure: bool,
}

impl BrokerCli {
    pub fn new(program: impl Into<String>, addr: impl Into<String>, tls_insecure: bool) -> Self {
        Self { program: program.into(), addr: addr.into(), tls_insecure }
    }

    /// A CLI invocation authenticated with `token`.
    ///
    /// `-token env://BOUNDARY_TOKEN` is appended after `args`; callers append
    /// anything that must come last (e.g. `-exec` payloads) afterwards.
    pub fn command<I, S>(&self, args: I, token: &SessionToken) -> CommandSpec
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut spec = CommandSpec::new(&self.program)
            .args(args)
            .arg("-token")
            .arg(format!("env://{TOKEN_ENV}"))
            .env("BOUNDARY_ADDR", &self.addr)
            .env(TOKEN_ENV, token.expose());
        if self.tls_insecure {
            spec = spec.env("BOUNDARY_TLS_INSECURE", "true");
        }
        spec
    }
}

#[cfg(test)]
#[path = "command_tests.rs"]
mod tests;
