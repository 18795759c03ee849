// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use serde::{Deserialize, Serialize};
use std::fmt;

/// Failure codes a flow run can terminate with.
///
/// `ElementNotFound` only surfaces for mandatory affordances; optional ones
/// are reported as absent and never become failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FailureKind {
    NavigationTimeout,
    ElementNotFound,
    AuthFailed,
    AmbiguousAuthState,
    NoSessionToken,
    BrokerUnavailable,
    NoCredentials,
    MaterializeFailed,
    ProbeTimeout,
    ProbeFailed,
    UnclassifiedException,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NavigationTimeout => "NavigationTimeout",
            Self::ElementNotFound => "ElementNotFound",
            Self::AuthFailed => "AuthFailed",
            Self::AmbiguousAuthState => "AmbiguousAuthState",
            Self::NoSessionToken => "NoSessionToken",
            Self::BrokerUnavailable => "BrokerUnavailable",
            Self::NoCredentials => "NoCredentials",
            Self::MaterializeFailed => "MaterializeFailed",
            Self::ProbeTimeout => "ProbeTimeout",
            Self::ProbeFailed => "ProbeFailed",
            Self::UnclassifiedException => "UnclassifiedException",
        }
    }

    /// Whether the failure came from a timeout, which warrants a
    /// `timeout`-labelled screenshot instead of an `error` one.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::NavigationTimeout | Self::ProbeTimeout)
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A classified failure with a human-readable detail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlowError {
    pub kind: FailureKind,
    pub detail: String,
}

impl FlowError {
    pub fn new(kind: FailureKind, detail: impl Into<String>) -> Self {
        Self { kind, detail: detail.into() }
    }

    pub fn unclassified(err: impl fmt::Display) -> Self {
        Self::new(FailureKind::UnclassifiedException, err.to_string())
    }
}

impl fmt::Display for FlowError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.detail.is_empty() {
            write!(f, "{}", self.kind)
        } else {
            write!(f, "{}: {}", self.kind, self.detail)
        }
    }
}

impl std::error::Error for FlowError {}

impl From<anyhow::Error> for FlowError {
    fn from(err: anyhow::Error) -> Self {
        match err.downcast::<FlowError>() {
            Ok(flow) => flow,
            Err(other) => Self::new(FailureKind::UnclassifiedException, format!("{other:#}")),
        }
    }
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
