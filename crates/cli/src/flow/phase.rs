// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Authentication phase table: `(FlowState, Observed) → FlowState`.

use std::fmt;

use serde::Serialize;

use super::classify::CallbackClass;
use crate::browser::Presence;
use crate::error::{FailureKind, FlowError};

/// Authentication progress. Moves forward only, except that an unsettled
/// callback is observed a second time from `CallbackObserved`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowState {
    Init,
    ScopeSelected,
    AuthMethodSelected,
    PopupOpened,
    CredentialsSubmitted,
    CallbackObserved,
    Authenticated,
    AuthFailed,
}

impl FlowState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Init => "init",
            Self::ScopeSelected => "scope_selected",
            Self::AuthMethodSelected => "auth_method_selected",
            Self::PopupOpened => "popup_opened",
            Self::CredentialsSubmitted => "credentials_submitted",
            Self::CallbackObserved => "callback_observed",
            Self::Authenticated => "authenticated",
            Self::AuthFailed => "auth_failed",
        }
    }
}

impl fmt::Display for FlowState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What the orchestrator saw at a phase boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Observed {
    /// Scope picker looked for; absence skips the phase.
    ScopePicker(Presence),
    /// Auth-method tab looked for; absence skips the phase.
    AuthMethod(Presence),
    PopupOpened,
    /// The pop-up is not the identity provider's login page.
    ForeignPopup(String),
    LoginSubmitted,
    Callback(CallbackClass),
}

/// Apply one observation. Hard failures come back as `Err`.
pub fn step(state: FlowState, observed: &Observed) -> Result<FlowState, FlowError> {
    use FlowState::*;

    match (state, observed) {
        (Init, Observed::ScopePicker(_)) => Ok(ScopeSelected),
        (ScopeSelected, Observed::AuthMethod(_)) => Ok(AuthMethodSelected),
        (AuthMethodSelected, Observed::PopupOpened) => Ok(PopupOpened),
        (PopupOpened, Observed::ForeignPopup(url)) => Err(FlowError::new(
            FailureKind::AuthFailed,
            format!("pop-up is not the identity provider login page: {url}"),
        )),
        (PopupOpened, Observed::LoginSubmitted) => Ok(CredentialsSubmitted),

        (CredentialsSubmitted | CallbackObserved, Observed::Callback(class)) => match class {
            CallbackClass::Failed { code } => {
                Err(FlowError::new(FailureKind::AuthFailed, code.clone()))
            }
            CallbackClass::Succeeded { .. } => Ok(Authenticated),
            CallbackClass::Pending | CallbackClass::Inconclusive if state == CredentialsSubmitted => {
                Ok(CallbackObserved)
            }
            CallbackClass::Pending => Err(FlowError::new(
                FailureKind::AmbiguousAuthState,
                "authentication still pending after re-check",
            )),
            CallbackClass::Inconclusive => Err(FlowError::new(
                FailureKind::AmbiguousAuthState,
                "no success marker after re-check",
            )),
        },

        (state, observed) => Err(FlowError::unclassified(format!(
            "unexpected {observed:?} in state {state}"
        ))),
    }
}

#[cfg(test)]
#[path = "phase_tests.rs"]
mod tests;
