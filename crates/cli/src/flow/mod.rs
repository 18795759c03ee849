// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The end-to-end flow: authenticate through the pop-up, then (when a
//! target is configured) broker a credential and probe the target.

pub mod classify;
pub mod phase;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::{error, info, warn};

use crate::broker::CredentialBroker;
use crate::browser::artifacts::ArtifactLog;
use crate::browser::{BrowsingContext, Presence, Selector};
use crate::command::{BrokerCli, CommandRunner};
use crate::config::Config;
use crate::error::{FailureKind, FlowError};
use crate::materialize::SecretMaterializer;
use crate::probe::RemoteProbe;
use crate::target::{LookupPlan, TargetResolver};
use crate::token::{self, SessionToken};

pub use classify::{CallbackClass, SuccessMarker};
pub use phase::{FlowState, Observed};

pub const SCOPE_PICKER: &str = "Choose a different scope";
pub const SIGN_IN: &str = "Sign In";
pub const USERNAME: &str = r#"input[name="username"], #username"#;
pub const PASSWORD: &str = r#"input[name="password"], #password"#;
pub const SUBMIT: &str = r#"input[type="submit"], button[type="submit"], #kc-login"#;

/// Terminal result of one run.
#[derive(Debug, Clone, Serialize)]
pub struct Verdict {
    pub passed: bool,
    pub reason: String,
    pub failure: Option<FailureKind>,
    pub final_state: FlowState,
    /// Target ID the SSH probe ran against, if any.
    pub target: Option<String>,
    pub artifacts: Vec<PathBuf>,
}

impl Verdict {
    pub fn pass(reason: impl Into<String>, target: Option<String>, artifacts: Vec<PathBuf>) -> Self {
        Self {
            passed: true,
            reason: reason.into(),
            failure: None,
            final_state: FlowState::Authenticated,
            target,
            artifacts,
        }
    }

    pub fn fail(err: FlowError, final_state: FlowState, artifacts: Vec<PathBuf>) -> Self {
        let reason = if err.detail.is_empty() { err.kind.to_string() } else { err.detail };
        Self { passed: false, reason, failure: Some(err.kind), final_state, target: None, artifacts }
    }

    /// The single user-facing result line.
    pub fn summary_line(&self) -> String {
        match self.failure {
            None => format!("PASS: {}", self.reason),
            Some(kind) => format!("FAIL [{kind}]: {}", self.reason),
        }
    }

    pub fn exit_code(&self) -> i32 {
        if self.passed {
            0
        } else {
            1
        }
    }
}

/// Bounded waits used by the browser phases.
#[derive(Debug, Clone)]
pub struct FlowTimeouts {
    pub navigation: Duration,
    pub idle: Duration,
    pub scope_picker: Duration,
    pub scope_option: Duration,
    pub auth_tab: Duration,
    pub popup: Duration,
    pub login_form: Duration,
    pub submit_settle: Duration,
    pub callback_delay: Duration,
    pub pending_rewait: Duration,
    pub ui_settle: Duration,
}

impl FlowTimeouts {
    pub fn from_config(config: &Config) -> Self {
        Self {
            navigation: config.navigation_timeout(),
            idle: config.idle_timeout(),
            scope_picker: config.scope_picker_timeout(),
            scope_option: config.scope_option_timeout(),
            auth_tab: config.auth_tab_timeout(),
            popup: config.popup_timeout(),
            login_form: config.login_form_timeout(),
            submit_settle: config.submit_settle(),
            callback_delay: config.callback_delay(),
            pending_rewait: config.pending_rewait(),
            ui_settle: config.ui_settle(),
        }
    }
}

/// What the browser phases need from configuration.
#[derive(Debug, Clone)]
pub struct FlowSettings {
    pub broker_url: String,
    pub idp_host: Option<String>,
    pub username: String,
    pub password: String,
    pub scope: String,
    pub auth_method_id: Option<String>,
    pub auth_method_name: String,
    pub targets: Vec<String>,
    pub artifact_dir: PathBuf,
    pub artifact_prefix: String,
    pub timeouts: FlowTimeouts,
}

impl FlowSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            broker_url: config.broker_url.clone(),
            idp_host: config.idp_host(),
            username: config.username.clone(),
            password: config.password.clone(),
            scope: config.scope.clone(),
            auth_method_id: config.auth_method_id.clone().filter(|id| !id.trim().is_empty()),
            auth_method_name: config.auth_method_name.clone(),
            targets: config.target_names(),
            artifact_dir: config.artifact_dir.clone(),
            artifact_prefix: config.artifact_prefix.clone(),
            timeouts: FlowTimeouts::from_config(config),
        }
    }

    /// Auth-method tab candidates, most specific first.
    fn auth_method_selectors(&self) -> Vec<Selector> {
        let mut selectors = Vec::new();
        if let Some(id) = &self.auth_method_id {
            selectors.push(Selector::css(format!(r#"a[href*="{id}"]"#)));
        }
        selectors.push(Selector::text(&self.auth_method_name));
        selectors
    }
}

/// Outcome of a run, before it becomes a [`Verdict`].
enum SshOutcome {
    Verified { target: String, host: Option<String> },
    NoTarget,
    /// `target` is set when the failure came after a target was resolved.
    Failed { target: Option<String>, error: FlowError },
}

/// Sequences authentication, target resolution, brokering, and probing.
pub struct FlowOrchestrator {
    settings: FlowSettings,
    resolver: TargetResolver,
    broker: CredentialBroker,
    materializer: SecretMaterializer,
    probe: RemoteProbe,
}

impl FlowOrchestrator {
    pub fn new(config: &Config, runner: Arc<dyn CommandRunner>) -> Self {
        let cli = BrokerCli::new(&config.cli, &config.broker_url, config.tls_insecure);
        let resolver = TargetResolver::new(
            &config.registry,
            cli.clone(),
            Arc::clone(&runner),
            LookupPlan { scope: config.scope.clone(), project: config.project.clone() },
            config.lookup_timeout(),
        );
        let broker = CredentialBroker::new(
            cli.clone(),
            Arc::clone(&runner),
            config.broker_timeout(),
            &config.ssh_user,
        );
        let probe = RemoteProbe::new(
            cli,
            runner,
            &config.probe_command,
            &config.probe_sentinel,
            config.probe_timeout(),
        );
        Self {
            settings: FlowSettings::from_config(config),
            resolver,
            broker,
            materializer: SecretMaterializer::new(),
            probe,
        }
    }

    /// Scoped key directories go under `materializer`'s location.
    pub fn with_materializer(mut self, materializer: SecretMaterializer) -> Self {
        self.materializer = materializer;
        self
    }

    /// Run the flow to a verdict. The browser is closed on every path.
    pub async fn run(mut self, browser: &mut dyn BrowsingContext) -> Verdict {
        let mut artifacts =
            ArtifactLog::new(&self.settings.artifact_dir, &self.settings.artifact_prefix);
        let mut state = FlowState::Init;

        let outcome = match self.authenticate(browser, &mut artifacts, &mut state).await {
            Ok(token) => self.verify_ssh(&token).await,
            Err(error) => {
                state = FlowState::AuthFailed;
                SshOutcome::Failed { target: None, error }
            }
        };

        let verdict = match outcome {
            SshOutcome::Verified { target, host } => {
                artifacts.capture(browser, "final-success").await;
                let host = host.as_deref().unwrap_or("unknown host");
                let reason = format!("authenticated; SSH verified on {target} ({host})");
                Verdict::pass(reason, Some(target), artifacts.into_paths())
            }
            SshOutcome::NoTarget => {
                artifacts.capture(browser, "final").await;
                let reason = "authenticated; no target resolvable, SSH verification skipped";
                Verdict::pass(reason, None, artifacts.into_paths())
            }
            SshOutcome::Failed { target, error } => {
                let label = if error.kind.is_timeout() { "timeout" } else { "error" };
                error!(kind = %error.kind, state = %state, target_id = ?target, "flow failed: {}", error.detail);
                artifacts.capture(browser, label).await;
                let mut verdict = Verdict::fail(error, state, artifacts.into_paths());
                verdict.target = target;
                verdict
            }
        };

        if let Err(e) = browser.close().await {
            warn!("browser close failed: {e}");
        }
        verdict
    }

    async fn authenticate(
        &self,
        browser: &mut dyn BrowsingContext,
        artifacts: &mut ArtifactLog,
        state: &mut FlowState,
    ) -> Result<SessionToken, FlowError> {
        let t = &self.settings.timeouts;

        info!(url = %self.settings.broker_url, "opening broker UI");
        browser.navigate(&self.settings.broker_url, t.navigation).await?;

        // Scope selection (optional).
        let picker_selector = Selector::text(SCOPE_PICKER);
        let picker = browser.wait_for_optional_element(&picker_selector, t.scope_picker).await;
        if picker.is_present() && click_soft(browser, &picker_selector).await {
            tokio::time::sleep(t.ui_settle / 2).await;
            let option = Selector::text(&self.settings.scope);
            if browser.wait_for_optional_element(&option, t.scope_option).await.is_present()
                && click_soft(browser, &option).await
            {
                info!(scope = %self.settings.scope, "scope selected");
                settle(browser, t.idle).await;
            }
        }
        advance(state, Observed::ScopePicker(picker))?;
        tokio::time::sleep(t.ui_settle).await;

        // Auth-method selection (optional).
        let mut method = Presence::Absent;
        for selector in self.settings.auth_method_selectors() {
            method = click_optional(browser, &selector, t.auth_tab).await;
            if method.is_present() {
                info!(%selector, "auth method selected");
                settle(browser, t.idle).await;
                break;
            }
        }
        advance(state, Observed::AuthMethod(method))?;
        artifacts.capture(browser, "ready").await;

        // Sign-in trigger and pop-up capture (mandatory).
        let main = browser.current_page();
        browser.await_new_page(&Selector::button(SIGN_IN), t.popup).await?;
        advance(state, Observed::PopupOpened)?;
        browser.wait_for_idle(t.popup).await?;
        let popup_url = browser.current_url().await?;
        info!(url = %popup_url, "pop-up opened");
        artifacts.capture(browser, "popup").await;

        if !classify::is_idp_login_url(&popup_url, self.settings.idp_host.as_deref()) {
            advance(state, Observed::ForeignPopup(popup_url))?;
        }

        // Credential entry (mandatory once the pop-up is recognized).
        browser.wait_for_element(&Selector::css(USERNAME), t.login_form).await?;
        browser.fill(&Selector::css(USERNAME), &self.settings.username).await?;
        browser.fill(&Selector::css(PASSWORD), &self.settings.password).await?;
        artifacts.capture(browser, "login").await;
        browser.click(&Selector::css(SUBMIT)).await?;
        advance(state, Observed::LoginSubmitted)?;

        // The pop-up usually closes itself after the callback.
        settle(browser, t.submit_settle).await;
        browser.switch_to(main).await?;
        tokio::time::sleep(t.callback_delay).await;
        browser.wait_for_idle(t.idle).await?;

        let class =
            self.observe_callback(browser, artifacts, "callback", classify::classify_callback).await?;
        advance(state, Observed::Callback(class))?;
        if *state == FlowState::CallbackObserved {
            warn!(wait_ms = t.pending_rewait.as_millis() as u64, "callback unsettled; re-checking once");
            tokio::time::sleep(t.pending_rewait).await;
            browser.wait_for_idle(t.idle).await?;
            let class = self
                .observe_callback(browser, artifacts, "recheck", classify::classify_recheck)
                .await?;
            advance(state, Observed::Callback(class))?;
        }
        info!("authentication succeeded");

        let token = token::extract(browser).await.ok_or_else(|| {
            FlowError::new(FailureKind::NoSessionToken, "no session token in client storage")
        })?;
        info!(token = %token, "session token extracted");
        artifacts.capture(browser, "authenticated").await;
        Ok(token)
    }

    async fn observe_callback(
        &self,
        browser: &mut dyn BrowsingContext,
        artifacts: &mut ArtifactLog,
        label: &str,
        classifier: fn(&str, &str) -> CallbackClass,
    ) -> Result<CallbackClass, FlowError> {
        let url = browser.current_url().await?;
        let content = browser.content().await?;
        artifacts.capture(browser, label).await;
        let class = classifier(&url, &content);
        info!(%url, class = ?class, "callback observed");
        Ok(class)
    }

    async fn verify_ssh(&mut self, token: &SessionToken) -> SshOutcome {
        let Some(target) = self.resolver.resolve_first(&self.settings.targets, Some(token)).await
        else {
            warn!(targets = ?self.settings.targets, "no target resolvable; skipping SSH verification");
            return SshOutcome::NoTarget;
        };
        let Some(target_id) = target.resolved_id else {
            return SshOutcome::NoTarget;
        };
        info!(target_name = %target.symbolic_name, id = %target_id, "verifying SSH");

        match self.verify_target(&target_id, token).await {
            Ok(host) => SshOutcome::Verified { target: target_id, host },
            Err(error) => SshOutcome::Failed { target: Some(target_id), error },
        }
    }

    /// Broker, materialize, and probe one resolved target. Returns the host
    /// the probe reported.
    async fn verify_target(
        &self,
        target_id: &str,
        token: &SessionToken,
    ) -> Result<Option<String>, FlowError> {
        let session = self.broker.authorize(target_id, token).await?;
        let key = self.materializer.materialize(session.credential)?;
        let result = self.probe.run(target_id, &key, token).await;
        if let Err(e) = key.cleanup() {
            warn!("failed to remove key directory: {e}");
        }

        match result.failure() {
            Some(err) => Err(err),
            None => Ok(result.host().map(str::to_owned)),
        }
    }
}

fn advance(state: &mut FlowState, observed: Observed) -> Result<(), FlowError> {
    let next = phase::step(*state, &observed)?;
    info!(from = %state, to = %next, "phase transition");
    *state = next;
    Ok(())
}

/// Look for an optional element and click it when visible. A failed click
/// downgrades to [`Presence::Unknown`].
pub async fn click_optional(
    browser: &mut dyn BrowsingContext,
    selector: &Selector,
    timeout: Duration,
) -> Presence {
    match browser.wait_for_optional_element(selector, timeout).await {
        Presence::Present if click_soft(browser, selector).await => Presence::Present,
        Presence::Present => Presence::Unknown,
        other => other,
    }
}

async fn click_soft(browser: &mut dyn BrowsingContext, selector: &Selector) -> bool {
    match browser.click(selector).await {
        Ok(()) => true,
        Err(e) => {
            warn!(%selector, "optional click failed: {e}");
            false
        }
    }
}

/// Network-idle wait whose timeout is not a failure.
async fn settle(browser: &mut dyn BrowsingContext, timeout: Duration) {
    if let Err(e) = browser.wait_for_idle(timeout).await {
        warn!("page did not settle: {e}");
    }
}

#[cfg(test)]
#[path = "flow_tests.rs"]
mod tests;
