// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Heuristic page-state predicates.
//!
//! Precedence for the post-callback page, first match wins:
//! 1. error marker in the URL → [`CallbackClass::Failed`]
//! 2. `pending` in the page content → [`CallbackClass::Pending`]
//! 3. a success marker ([`success_marker`]) → [`CallbackClass::Succeeded`]
//! 4. otherwise → [`CallbackClass::Inconclusive`]
//!
//! The re-check after the bounded re-wait ([`classify_recheck`]) drops rule 2:
//! a signed-in page may legitimately list pending sessions.

use serde::Serialize;
use url::Url;

/// Code reported when the URL signals an error without naming one.
pub const GENERIC_ERROR: &str = "unknown_error";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SuccessMarker {
    /// A scopes page that is not the authenticate page.
    ScopesListing,
    /// A targets or sessions page.
    ResourceListing,
    /// A sign-out/logout affordance in the page.
    SignOut,
}

impl SuccessMarker {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ScopesListing => "scopes_listing",
            Self::ResourceListing => "resource_listing",
            Self::SignOut => "sign_out",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallbackClass {
    Failed { code: String },
    Pending,
    Succeeded { marker: SuccessMarker },
    Inconclusive,
}

pub fn has_error_marker(url: &str) -> bool {
    url.to_lowercase().contains("error")
}

/// The `error` parameter from the query or the (hash-routed) fragment.
///
/// Falls back to `authentication-error` when that path marker is present,
/// else [`GENERIC_ERROR`].
pub fn error_code(url: &str) -> String {
    if let Ok(parsed) = Url::parse(url) {
        let from_query = parsed.query_pairs().find(|(k, _)| k == "error").map(|(_, v)| v);
        if let Some(code) = from_query.filter(|v| !v.is_empty()) {
            return code.into_owned();
        }
        if let Some(fragment) = parsed.fragment() {
            let params = fragment.split_once('?').map_or(fragment, |(_, q)| q);
            let from_fragment = url::form_urlencoded::parse(params.as_bytes())
                .find(|(k, _)| k == "error")
                .map(|(_, v)| v.into_owned());
            if let Some(code) = from_fragment.filter(|v| !v.is_empty()) {
                return code;
            }
        }
    }
    if url.contains("authentication-error") {
        "authentication-error".to_owned()
    } else {
        GENERIC_ERROR.to_owned()
    }
}

/// `content` must already be lowercased.
pub fn is_pending(content: &str) -> bool {
    content.contains("pending")
}

/// `content` must already be lowercased.
pub fn success_marker(url: &str, content: &str) -> Option<SuccessMarker> {
    if url.contains("scopes") && !url.contains("authenticate") {
        return Some(SuccessMarker::ScopesListing);
    }
    if url.contains("targets") || url.contains("sessions") {
        return Some(SuccessMarker::ResourceListing);
    }
    if content.contains("sign out") || content.contains("logout") {
        return Some(SuccessMarker::SignOut);
    }
    None
}

/// Classify the main page after the identity-provider callback.
pub fn classify_callback(url: &str, content: &str) -> CallbackClass {
    let content = content.to_lowercase();
    if has_error_marker(url) {
        CallbackClass::Failed { code: error_code(url) }
    } else if is_pending(&content) {
        CallbackClass::Pending
    } else if let Some(marker) = success_marker(url, &content) {
        CallbackClass::Succeeded { marker }
    } else {
        CallbackClass::Inconclusive
    }
}

/// Classify the main page on the single re-check. `pending` is no longer
/// consulted, so this never returns [`CallbackClass::Pending`].
pub fn classify_recheck(url: &str, content: &str) -> CallbackClass {
    let content = content.to_lowercase();
    if has_error_marker(url) {
        CallbackClass::Failed { code: error_code(url) }
    } else if let Some(marker) = success_marker(url, &content) {
        CallbackClass::Succeeded { marker }
    } else {
        CallbackClass::Inconclusive
    }
}

/// Whether a pop-up URL is the identity provider's login page.
pub fn is_idp_login_url(url: &str, idp_host: Option<&str>) -> bool {
    let lower = url.to_lowercase();
    if let Some(host) = idp_host.filter(|h| !h.is_empty()) {
        let popup_host = Url::parse(url).ok().and_then(|u| u.host_str().map(str::to_lowercase));
        if popup_host.as_deref() == Some(host) {
            return true;
        }
    }
    lower.contains("keycloak") || url.contains("realms")
}

#[cfg(test)]
#[path = "classify_tests.rs"]
mod tests;
