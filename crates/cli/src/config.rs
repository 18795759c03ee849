// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

/// End-to-end check: OIDC pop-up login to the access broker, then brokered SSH.
#[derive(Debug, Parser)]
#[command(name = "brokerflow", version, about)]
pub struct Config {
    /// Access broker base URL.
    #[arg(long, env = "BOUNDARY_URL", default_value = "https://boundary.hashicorp.lab")]
    pub broker_url: String,

    /// Identity provider base URL.
    #[arg(long, env = "KEYCLOAK_URL", default_value = "https://keycloak.hashicorp.lab")]
    pub idp_url: String,

    /// Username entered on the identity provider login page.
    #[arg(long, env = "TEST_USER", default_value = "developer@example.com")]
    pub username: String,

    /// Password entered on the identity provider login page.
    #[arg(long, env = "TEST_PASSWORD", default_value = "Developer123", hide_env_values = true)]
    pub password: String,

    /// Scope to pick in the broker UI (and to match during target lookup).
    #[arg(long, env = "TARGET_SCOPE", default_value = "DevOps")]
    pub scope: String,

    /// Project to match during dynamic target lookup.
    #[arg(long, env = "TARGET_PROJECT", default_value = "Agent-Sandbox")]
    pub project: String,

    /// Auth method ID to pre-select (matched against tab links).
    #[arg(long, env = "OIDC_AUTH_METHOD_ID")]
    pub auth_method_id: Option<String>,

    /// Visible label of the OIDC auth method tab.
    #[arg(long, env = "OIDC_AUTH_METHOD_NAME", default_value = "keycloak")]
    pub auth_method_name: String,

    /// Symbolic target names, tried in order.
    #[arg(long, env = "BROKERFLOW_TARGETS", default_value = "claude,gemini", value_delimiter = ',')]
    pub targets: Vec<String>,

    /// Registry file mapping `<name>-ssh:` markers to target IDs.
    #[arg(
        long,
        env = "BROKERFLOW_REGISTRY",
        default_value = "platform/boundary/scripts/boundary-credentials.txt"
    )]
    pub registry: PathBuf,

    /// Login name used when the brokered secret carries none.
    #[arg(long, env = "SSH_USER", default_value = "node")]
    pub ssh_user: String,

    /// Broker CLI program.
    #[arg(long, env = "BROKERFLOW_CLI", default_value = "boundary")]
    pub cli: String,

    /// Skip TLS verification in the broker CLI (lab certificates).
    #[arg(
        long,
        env = "BROKERFLOW_TLS_INSECURE",
        default_value_t = true,
        action = clap::ArgAction::Set
    )]
    pub tls_insecure: bool,

    /// Remote command run over SSH.
    #[arg(long, env = "BROKERFLOW_PROBE_COMMAND", default_value = "hostname")]
    pub probe_command: String,

    /// Substring whose presence in the probe output counts as success.
    #[arg(long, env = "BROKERFLOW_PROBE_SENTINEL", default_value = "sandbox")]
    pub probe_sentinel: String,

    /// WebDriver (chromedriver) endpoint.
    #[arg(long, env = "WEBDRIVER_URL", default_value = "http://localhost:4444")]
    pub webdriver_url: String,

    /// Show the browser window instead of running headless.
    #[arg(long)]
    pub headed: bool,

    /// Directory receiving diagnostic screenshots.
    #[arg(long, env = "BROKERFLOW_ARTIFACT_DIR", default_value = "/tmp")]
    pub artifact_dir: PathBuf,

    /// File-name prefix for diagnostic screenshots.
    #[arg(long, env = "BROKERFLOW_ARTIFACT_PREFIX", default_value = "ssh-oidc-test")]
    pub artifact_prefix: String,

    /// Write the verdict as JSON to this path.
    #[arg(long, env = "BROKERFLOW_SUMMARY_JSON")]
    pub summary_json: Option<PathBuf>,

    /// Log format (json or text).
    #[arg(long, env = "BROKERFLOW_LOG_FORMAT", default_value = "text")]
    pub log_format: String,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, env = "BROKERFLOW_LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    // -- Duration overrides (skip from CLI; set in Config::test()) --------
    #[clap(skip)]
    pub navigation_timeout_ms: Option<u64>,
    #[clap(skip)]
    pub idle_timeout_ms: Option<u64>,
    #[clap(skip)]
    pub scope_picker_timeout_ms: Option<u64>,
    #[clap(skip)]
    pub scope_option_timeout_ms: Option<u64>,
    #[clap(skip)]
    pub auth_tab_timeout_ms: Option<u64>,
    #[clap(skip)]
    pub popup_timeout_ms: Option<u64>,
    #[clap(skip)]
    pub login_form_timeout_ms: Option<u64>,
    #[clap(skip)]
    pub submit_settle_ms: Option<u64>,
    #[clap(skip)]
    pub callback_delay_ms: Option<u64>,
    #[clap(skip)]
    pub pending_rewait_ms: Option<u64>,
    #[clap(skip)]
    pub ui_settle_ms: Option<u64>,
    #[clap(skip)]
    pub broker_timeout_ms: Option<u64>,
    #[clap(skip)]
    pub lookup_timeout_ms: Option<u64>,
    #[clap(skip)]
    pub probe_timeout_ms: Option<u64>,
}

fn env_duration_ms(var: &str, default: u64) -> Duration {
    let ms = std::env::var(var).ok().and_then(|v| v.parse().ok()).unwrap_or(default);
    Duration::from_millis(ms)
}

macro_rules! duration_field {
    ($method:ident, $field:ident, $env:literal, $default:expr) => {
        pub fn $method(&self) -> Duration {
            match self.$field {
                Some(ms) => Duration::from_millis(ms),
                None => env_duration_ms($env, $default),
            }
        }
    };
}

impl Config {
    /// Validate the configuration after parsing.
    pub fn validate(&self) -> anyhow::Result<()> {
        for (flag, value) in [("--broker-url", &self.broker_url), ("--idp-url", &self.idp_url)] {
            if value.trim().is_empty() {
                anyhow::bail!("{flag} cannot be empty");
            }
            url::Url::parse(value)
                .map_err(|e| anyhow::anyhow!("{flag} is not a valid URL ({value}): {e}"))?;
        }

        if self.target_names().is_empty() {
            anyhow::bail!("--targets must name at least one target");
        }
        if self.username.trim().is_empty() {
            anyhow::bail!("--username cannot be empty");
        }
        if self.probe_sentinel.trim().is_empty() {
            anyhow::bail!("--probe-sentinel cannot be empty");
        }
        if self.cli.trim().is_empty() {
            anyhow::bail!("--cli cannot be empty");
        }

        match self.log_format.as_str() {
            "json" | "text" => {}
            other => anyhow::bail!("invalid log format: {other}"),
        }

        Ok(())
    }

    /// Configured target names with blanks removed, in priority order.
    pub fn target_names(&self) -> Vec<String> {
        self.targets.iter().map(|t| t.trim()).filter(|t| !t.is_empty()).map(str::to_owned).collect()
    }

    /// Host part of the identity provider URL, lowercased.
    pub fn idp_host(&self) -> Option<String> {
        url::Url::parse(&self.idp_url).ok()?.host_str().map(str::to_lowercase)
    }

    // -- Tuning knobs (field override → env var → compiled default) --------

    duration_field!(navigation_timeout, navigation_timeout_ms, "BROKERFLOW_NAVIGATION_TIMEOUT_MS", 30_000);
    duration_field!(idle_timeout, idle_timeout_ms, "BROKERFLOW_IDLE_TIMEOUT_MS", 15_000);
    duration_field!(
        scope_picker_timeout,
        scope_picker_timeout_ms,
        "BROKERFLOW_SCOPE_PICKER_TIMEOUT_MS",
        5_000
    );
    duration_field!(
        scope_option_timeout,
        scope_option_timeout_ms,
        "BROKERFLOW_SCOPE_OPTION_TIMEOUT_MS",
        3_000
    );
    duration_field!(auth_tab_timeout, auth_tab_timeout_ms, "BROKERFLOW_AUTH_TAB_TIMEOUT_MS", 2_000);
    duration_field!(popup_timeout, popup_timeout_ms, "BROKERFLOW_POPUP_TIMEOUT_MS", 15_000);
    duration_field!(
        login_form_timeout,
        login_form_timeout_ms,
        "BROKERFLOW_LOGIN_FORM_TIMEOUT_MS",
        10_000
    );
    duration_field!(submit_settle, submit_settle_ms, "BROKERFLOW_SUBMIT_SETTLE_MS", 10_000);
    duration_field!(callback_delay, callback_delay_ms, "BROKERFLOW_CALLBACK_DELAY_MS", 3_000);
    duration_field!(pending_rewait, pending_rewait_ms, "BROKERFLOW_PENDING_REWAIT_MS", 5_000);
    duration_field!(ui_settle, ui_settle_ms, "BROKERFLOW_UI_SETTLE_MS", 1_000);
    duration_field!(broker_timeout, broker_timeout_ms, "BROKERFLOW_BROKER_TIMEOUT_MS", 30_000);
    duration_field!(lookup_timeout, lookup_timeout_ms, "BROKERFLOW_LOOKUP_TIMEOUT_MS", 30_000);
    duration_field!(probe_timeout, probe_timeout_ms, "BROKERFLOW_PROBE_TIMEOUT_MS", 60_000);

    /// Build a minimal `Config` for tests (local URLs, millisecond timings).
    #[doc(hidden)]
    pub fn test() -> Self {
        Self {
            broker_url: "https://boundary.test".into(),
            idp_url: "https://keycloak.test".into(),
            username: "developer@example.com".into(),
            password: "Developer123".into(),
            scope: "DevOps".into(),
            project: "Agent-Sandbox".into(),
            auth_method_id: None,
            auth_method_name: "keycloak".into(),
            targets: vec!["claude".into(), "gemini".into()],
            registry: PathBuf::from("/nonexistent/boundary-credentials.txt"),
            ssh_user: "node".into(),
            cli: "boundary".into(),
            tls_insecure: true,
            probe_command: "hostname".into(),
            probe_sentinel: "sandbox".into(),
            webdriver_url: "http://127.0.0.1:4444".into(),
            headed: false,
            artifact_dir: std::env::temp_dir(),
            artifact_prefix: "brokerflow-test".into(),
            summary_json: None,
            log_format: "text".into(),
            log_level: "debug".into(),
            navigation_timeout_ms: Some(200),
            idle_timeout_ms: Some(200),
            scope_picker_timeout_ms: Some(20),
            scope_option_timeout_ms: Some(20),
            auth_tab_timeout_ms: Some(20),
            popup_timeout_ms: Some(200),
            login_form_timeout_ms: Some(100),
            submit_settle_ms: Some(20),
            callback_delay_ms: Some(0),
            pending_rewait_ms: Some(0),
            ui_settle_ms: Some(0),
            broker_timeout_ms: Some(1_000),
            lookup_timeout_ms: Some(1_000),
            probe_timeout_ms: Some(1_000),
        }
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
