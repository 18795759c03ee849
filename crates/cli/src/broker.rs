// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Session authorization and brokered-secret canonicalization.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use crate::command::{BrokerCli, CommandRunner, RunError};
use crate::error::{FailureKind, FlowError};
use crate::token::SessionToken;

/// SSH key material issued for one target session.
///
/// Never holds an empty private key; see [`BrokeredCredential::new`].
#[derive(Clone, PartialEq, Eq)]
pub struct BrokeredCredential {
    private_key: String,
    certificate: Option<String>,
    username: String,
}

impl BrokeredCredential {
    /// `None` when `private_key` is blank. A blank certificate counts as absent.
    pub fn new(
        private_key: impl Into<String>,
        certificate: Option<String>,
        username: impl Into<String>,
    ) -> Option<Self> {
        let private_key = private_key.into();
        if private_key.trim().is_empty() {
            return None;
        }
        let certificate = certificate.filter(|c| !c.trim().is_empty());
        Some(Self { private_key, certificate, username: username.into() })
    }

    pub fn private_key(&self) -> &str {
        &self.private_key
    }

    pub fn certificate(&self) -> Option<&str> {
        self.certificate.as_deref()
    }

    pub fn username(&self) -> &str {
        &self.username
    }
}

impl fmt::Debug for BrokeredCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BrokeredCredential")
            .field("private_key", &format_args!("<{} bytes>", self.private_key.len()))
            .field("certificate", &self.certificate.is_some())
            .field("username", &self.username)
            .finish()
    }
}

/// A secret envelope matcher: returns the data map when the shape applies.
pub type ShapeMatcher = fn(&Value) -> Option<&Map<String, Value>>;

fn decoded_data(secret: &Value) -> Option<&Map<String, Value>> {
    secret.get("decoded")?.get("data")?.as_object().filter(|m| !m.is_empty())
}

fn decoded(secret: &Value) -> Option<&Map<String, Value>> {
    secret.get("decoded")?.as_object()
}

fn data_data(secret: &Value) -> Option<&Map<String, Value>> {
    secret.get("data")?.get("data")?.as_object()
}

fn data(secret: &Value) -> Option<&Map<String, Value>> {
    secret.get("data")?.as_object()
}

fn bare(secret: &Value) -> Option<&Map<String, Value>> {
    secret.as_object()
}

/// Envelope shapes in match priority order.
pub const SECRET_SHAPES: [(&str, ShapeMatcher); 5] = [
    ("decoded.data", decoded_data),
    ("decoded", decoded),
    ("data.data", data_data),
    ("data", data),
    ("secret", bare),
];

fn string_field(map: &Map<String, Value>, key: &str) -> Option<String> {
    map.get(key).and_then(Value::as_str).filter(|s| !s.trim().is_empty()).map(str::to_owned)
}

/// Normalize a raw secret into a credential.
///
/// Stops at the first structurally matching shape; if that shape has no
/// private key the result is [`FailureKind::NoCredentials`].
pub fn canonicalize(secret: &Value, default_user: &str) -> Result<BrokeredCredential, FlowError> {
    let Some((shape, map)) =
        SECRET_SHAPES.iter().find_map(|(name, matcher)| matcher(secret).map(|m| (*name, m)))
    else {
        return Err(FlowError::new(FailureKind::NoCredentials, "secret is not an object"));
    };
    debug!(shape, keys = ?map.keys().collect::<Vec<_>>(), "secret shape matched");

    let username = string_field(map, "username").unwrap_or_else(|| default_user.to_owned());
    let private_key = string_field(map, "private_key").unwrap_or_default();
    BrokeredCredential::new(private_key, string_field(map, "certificate"), username).ok_or_else(
        || FlowError::new(FailureKind::NoCredentials, format!("no private key in {shape} secret")),
    )
}

#[derive(Debug, Deserialize)]
struct AuthorizeResponse {
    item: AuthorizeItem,
}

#[derive(Debug, Deserialize)]
struct AuthorizeItem {
    #[serde(default)]
    session_id: String,
    #[serde(default)]
    credentials: Option<Vec<CredentialEntry>>,
}

#[derive(Debug, Deserialize)]
struct CredentialEntry {
    #[serde(default)]
    secret: Value,
}

/// A successful authorization: the broker session and its credential.
#[derive(Debug, Clone)]
pub struct BrokeredSession {
    pub session_id: String,
    pub credential: BrokeredCredential,
}

/// Parse `targets authorize-session -format=json` output.
///
/// The first credential entry that canonicalizes with a private key wins.
pub fn parse_authorization(stdout: &str, default_user: &str) -> Result<BrokeredSession, FlowError> {
    let response: AuthorizeResponse = serde_json::from_str(stdout.trim()).map_err(|e| {
        FlowError::new(FailureKind::BrokerUnavailable, format!("unparsable authorization: {e}"))
    })?;
    let AuthorizeItem { session_id, credentials } = response.item;
    let entries = credentials.unwrap_or_default();
    info!(session_id = %session_id, credentials = entries.len(), "session authorized");

    let mut last = FlowError::new(FailureKind::NoCredentials, "no credentials returned");
    for entry in &entries {
        match canonicalize(&entry.secret, default_user) {
            Ok(credential) => return Ok(BrokeredSession { session_id, credential }),
            Err(e) => last = e,
        }
    }
    Err(last)
}

/// Exchanges a session token for target credentials via the broker CLI.
pub struct CredentialBroker {
    cli: BrokerCli,
    runner: Arc<dyn CommandRunner>,
    timeout: Duration,
    default_user: String,
}

impl CredentialBroker {
    pub fn new(
        cli: BrokerCli,
        runner: Arc<dyn CommandRunner>,
        timeout: Duration,
        default_user: impl Into<String>,
    ) -> Self {
        Self { cli, runner, timeout, default_user: default_user.into() }
    }

    /// Authorize a session against `target_id`. Called once; never retried.
    pub async fn authorize(
        &self,
        target_id: &str,
        token: &SessionToken,
    ) -> Result<BrokeredSession, FlowError> {
        let spec = self.cli.command(
            ["targets", "authorize-session", "-id", target_id, "-format=json"],
            token,
        );
        let output = self.runner.run(&spec, self.timeout).await.map_err(|e| {
            let detail = match e {
                RunError::TimedOut(_) => format!("authorize-session {e}"),
                RunError::Spawn(_) => e.to_string(),
            };
            warn!(target_id, "{detail}");
            FlowError::new(FailureKind::BrokerUnavailable, detail)
        })?;

        if !output.success() {
            let detail = format!("authorize-session failed: {}", output.detail());
            warn!(target_id, code = ?output.code, "{detail}");
            return Err(FlowError::new(FailureKind::BrokerUnavailable, detail));
        }
        parse_authorization(&output.stdout, &self.default_user)
    }
}

#[cfg(test)]
#[path = "broker_tests.rs"]
mod tests;
