// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::test_support::{FakeBrowser, FakePage};

#[test]
fn failed_verdict_reason_is_detail() {
    let err = FlowError::new(FailureKind::AuthFailed, "access_denied");
    let verdict = Verdict::fail(err, FlowState::AuthFailed, vec![]);
    assert!(!verdict.passed);
    assert_eq!(verdict.reason, "access_denied");
    assert_eq!(verdict.exit_code(), 1);
    assert_eq!(verdict.summary_line(), "FAIL [AuthFailed]: access_denied");
}

#[test]
fn empty_detail_falls_back_to_kind() {
    let verdict = Verdict::fail(
        FlowError::new(FailureKind::BrokerUnavailable, ""),
        FlowState::Authenticated,
        vec![],
    );
    assert_eq!(verdict.reason, "BrokerUnavailable");
}

#[test]
fn passed_verdict_serializes() -> anyhow::Result<()> {
    let verdict = Verdict::pass("ok", Some("t_abc".into()), vec![PathBuf::from("/tmp/a.png")]);
    assert_eq!(verdict.exit_code(), 0);
    assert_eq!(verdict.summary_line(), "PASS: ok");

    let json = serde_json::to_value(&verdict)?;
    assert_eq!(json["passed"], true);
    assert_eq!(json["failure"], serde_json::Value::Null);
    assert_eq!(json["final_state"], "authenticated");
    assert_eq!(json["target"], "t_abc");
    assert_eq!(json["artifacts"][0], "/tmp/a.png");
    Ok(())
}

#[test]
fn settings_from_config() {
    let mut config = Config::test();
    config.targets = vec![" claude ".into(), String::new()];
    config.auth_method_id = Some("amoidc_123".into());

    let settings = FlowSettings::from_config(&config);
    assert_eq!(settings.targets, vec!["claude".to_owned()]);
    assert_eq!(settings.idp_host.as_deref(), Some("keycloak.test"));
    assert_eq!(
        settings.auth_method_selectors(),
        vec![Selector::css(r#"a[href*="amoidc_123"]"#), Selector::text("keycloak")]
    );
}

#[test]
fn blank_auth_method_id_is_ignored() {
    let mut config = Config::test();
    config.auth_method_id = Some("  ".into());
    let settings = FlowSettings::from_config(&config);
    assert_eq!(settings.auth_method_selectors(), vec![Selector::text("keycloak")]);
}

#[tokio::test]
async fn click_optional_reports_presence() {
    let tab = Selector::text("keycloak");
    let mut browser = FakeBrowser::new(FakePage::new("https://boundary.test/").show(tab.clone()));

    let present = click_optional(&mut browser, &tab, Duration::ZERO).await;
    let absent = click_optional(&mut browser, &Selector::text("other"), Duration::ZERO).await;

    assert_eq!(present, Presence::Present);
    assert_eq!(absent, Presence::Absent);
    assert_eq!(browser.actions(), ["click text=keycloak"]);
}
