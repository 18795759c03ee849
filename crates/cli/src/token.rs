// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Session token extraction from client-side storage.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::browser::BrowsingContext;

/// Local-storage keys checked before the cookie string, in priority order.
pub const STORAGE_KEYS: [&str; 2] = ["ember_simple_auth-session", "boundary-token"];

/// Attribute path of the token inside the session JSON.
const TOKEN_PATH: [&str; 3] = ["authenticated", "attributes", "token"];

/// Shape of a bare broker token (`at_<id>_<secret>`), accepted verbatim.
static BARE_TOKEN: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^at_[A-Za-z0-9]+_[A-Za-z0-9+/=_-]+$").ok());

fn is_bare_token(raw: &str) -> bool {
    BARE_TOKEN.as_ref().is_some_and(|re| re.is_match(raw))
}

/// Opaque bearer capability. Formatting never reveals more than a prefix.
#[derive(Clone, PartialEq, Eq)]
pub struct SessionToken(String);

impl SessionToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// The full token, for handing to the broker CLI environment.
    pub fn expose(&self) -> &str {
        &self.0
    }

    fn redacted(&self) -> String {
        let prefix: String = self.0.chars().take(6).collect();
        format!("{prefix}…")
    }
}

impl fmt::Debug for SessionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SessionToken({})", self.redacted())
    }
}

impl fmt::Display for SessionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.redacted())
    }
}

/// Raw values read from a page's client-side storage.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageSnapshot {
    /// Values for [`STORAGE_KEYS`], same order; `None` when unset.
    #[serde(default)]
    pub local: Vec<Option<String>>,
    /// `document.cookie`.
    #[serde(default)]
    pub cookie: Option<String>,
}

impl StorageSnapshot {
    /// First non-empty candidate: storage keys in order, then the cookie string.
    pub fn first_non_empty(&self) -> Option<&str> {
        self.local
            .iter()
            .flatten()
            .chain(self.cookie.iter())
            .map(|v| v.trim())
            .find(|v| !v.is_empty())
    }
}

/// Decode a token from a raw storage value.
///
/// JSON values must carry the token at `authenticated.attributes.token`.
/// Non-JSON values are accepted verbatim only when they look like a bare
/// broker token; anything else yields `None`.
pub fn decode_token(raw: &str) -> Option<SessionToken> {
    let raw = raw.trim();
    match serde_json::from_str::<serde_json::Value>(raw) {
        Ok(value) => {
            let mut node = &value;
            for key in TOKEN_PATH {
                node = node.get(key)?;
            }
            let token = node.as_str()?.trim();
            (!token.is_empty()).then(|| SessionToken::new(token))
        }
        Err(_) if is_bare_token(raw) => Some(SessionToken::new(raw)),
        Err(_) => None,
    }
}

/// Pure half of extraction: pick the first candidate and decode it.
pub fn token_from_snapshot(snapshot: &StorageSnapshot) -> Option<SessionToken> {
    let raw = snapshot.first_non_empty()?;
    let token = decode_token(raw);
    if token.is_none() {
        debug!(len = raw.len(), "session storage present but held no decodable token");
    }
    token
}

/// Read storage from the current page and extract a token.
///
/// Never fails: a storage read error is logged and treated as "no token".
pub async fn extract(browser: &mut dyn BrowsingContext) -> Option<SessionToken> {
    match browser.read_storage(&STORAGE_KEYS).await {
        Ok(snapshot) => token_from_snapshot(&snapshot),
        Err(e) => {
            warn!("could not read client storage: {e}");
            None
        }
    }
}

#[cfg(test)]
#[path = "token_tests.rs"]
mod tests;
