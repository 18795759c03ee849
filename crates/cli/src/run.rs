// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Top-level runner, shared by `main` and integration tests.

use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::browser::webdriver::{WebDriverContext, WebDriverOptions};
use crate::browser::BrowsingContext;
use crate::command::{CommandRunner, ProcessRunner};
use crate::config::Config;
use crate::error::FlowError;
use crate::flow::{FlowOrchestrator, FlowState, Verdict};

/// Initialize tracing/logging from config.
///
/// Uses `try_init` so it's safe to call multiple times (e.g. from tests).
pub fn init_tracing(config: &Config) {
    use tracing_subscriber::fmt;

    let filter = EnvFilter::try_new(&config.log_level).unwrap_or_else(|_| EnvFilter::new("info"));

    let result = match config.log_format.as_str() {
        "json" => fmt::fmt().with_env_filter(filter).json().with_writer(std::io::stderr).try_init(),
        _ => fmt::fmt().with_env_filter(filter).with_writer(std::io::stderr).try_init(),
    };
    drop(result);
}

/// Run the full flow against a live WebDriver session and the real broker CLI.
pub async fn run(config: &Config) -> Verdict {
    let opts = WebDriverOptions::new(&config.webdriver_url, !config.headed);
    let verdict = match WebDriverContext::connect(&opts).await {
        Ok(mut browser) => execute(config, &mut browser, Arc::new(ProcessRunner)).await,
        Err(e) => {
            error!("browser unavailable: {e:#}");
            Verdict::fail(FlowError::unclassified(format!("{e:#}")), FlowState::Init, vec![])
        }
    };

    if let Some(path) = &config.summary_json {
        match write_summary(path, &verdict) {
            Ok(()) => info!(path = %path.display(), "summary written"),
            Err(e) => warn!("{e:#}"),
        }
    }
    verdict
}

/// Run the flow with injected collaborators.
pub async fn execute(
    config: &Config,
    browser: &mut dyn BrowsingContext,
    runner: Arc<dyn CommandRunner>,
) -> Verdict {
    info!(
        broker = %config.broker_url,
        idp = %config.idp_url,
        user = %config.username,
        targets = ?config.target_names(),
        "starting flow"
    );
    let verdict = FlowOrchestrator::new(config, runner).run(browser).await;
    info!(passed = verdict.passed, state = %verdict.final_state, "flow finished");
    verdict
}

/// Write the verdict as pretty JSON.
pub fn write_summary(path: &Path, verdict: &Verdict) -> anyhow::Result<()> {
    let json = serde_json::to_string_pretty(verdict)?;
    std::fs::write(path, json + "\n")
        .with_context(|| format!("failed to write summary to {}", path.display()))
}

#[cfg(test)]
#[path = "run_tests.rs"]
mod tests;
