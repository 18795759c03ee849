// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::Arc;
use std::time::Duration;

use proptest::prelude::*;
use serde_json::json;

use super::*;
use crate::test_support::ScriptedRunner;

fn resolver(registry: impl Into<PathBuf>, runner: &Arc<ScriptedRunner>) -> TargetResolver {
    TargetResolver::new(
        registry,
        BrokerCli::new("boundary", "https://boundary.test", true),
        runner.clone(),
        LookupPlan { scope: "DevOps".into(), project: "Agent-Sandbox".into() },
        Duration::from_secs(1),
    )
}

fn list(items: &[(&str, &str)]) -> String {
    let items: Vec<_> = items.iter().map(|(id, name)| json!({ "id": id, "name": name })).collect();
    json!({ "items": items }).to_string()
}

fn token() -> SessionToken {
    SessionToken::new("at_test_token")
}

#[test]
fn registry_marker_yields_first_trailing_token() {
    assert_eq!(parse_registry("claude-ssh: t_abc123 extra\n", "claude"), Some("t_abc123".into()));
}

#[yare::parameterized(
    second_line   = { "# targets\ngemini-ssh: t_gem\nclaude-ssh:   t_cla  # note\n", "claude", Some("t_cla") },
    first_wins    = { "claude-ssh: t_one\nclaude-ssh: t_two\n", "claude", Some("t_one") },
    embedded      = { "export claude-ssh:t_tight", "claude", Some("t_tight") },
    marker_only   = { "claude-ssh:\n", "claude", None },
    other_name    = { "gemini-ssh: t_gem\n", "claude", None },
    empty         = { "", "claude", None },
)]
fn registry_lines(contents: &str, name: &str, expected: Option<&str>) {
    assert_eq!(parse_registry(contents, name).as_deref(), expected);
}

#[test]
fn missing_registry_is_unresolved() {
    assert_eq!(lookup_registry(Path::new("/nonexistent/registry.txt"), "claude"), None);
}

#[test]
fn registry_file_lookup() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("boundary-credentials.txt");
    std::fs::write(&path, "claude-ssh: t_abc123 extra\n")?;
    assert_eq!(lookup_registry(&path, "claude"), Some("t_abc123".into()));
    Ok(())
}

fn case_error(e: impl std::fmt::Display) -> TestCaseError {
    TestCaseError::fail(e.to_string())
}

proptest! {
    #[test]
    fn registry_resolution_is_idempotent(
        id in "t_[A-Za-z0-9]{1,12}",
        noise in "[a-z ]{0,20}",
    ) {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(case_error)?;
        let dir = tempfile::tempdir().map_err(case_error)?;
        let path = dir.path().join("boundary-credentials.txt");
        std::fs::write(&path, format!("{noise}\nclaude-ssh: {id} trailing\n")).map_err(case_error)?;
        let runner = Arc::new(ScriptedRunner::new());

        let (first, repeat, fresh) = rt.block_on(async {
            let mut resolver_a = resolver(&path, &runner);
            let first = resolver_a.resolve("claude", Some(&token())).await;
            let repeat = resolver_a.resolve("claude", Some(&token())).await;
            let mut resolver_b = resolver(&path, &runner);
            let fresh = resolver_b.resolve("claude", Some(&token())).await;
            (first, repeat, fresh)
        });

        prop_assert_eq!(&first, &repeat);
        prop_assert_eq!(&first, &fresh);
        prop_assert_eq!(first.resolved_id, Some(id));
        prop_assert!(runner.calls().is_empty());
    }
}

#[yare::parameterized(
    items_null    = { r#"{"items": null}"#, 0 },
    items_missing = { "{}", 0 },
    two_items     = { r#"{"items": [{"id": "o_1", "name": "DevOps"}, {"id": "o_2"}]}"#, 2 },
)]
fn list_responses(stdout: &str, expected: usize) {
    assert_eq!(parse_list(stdout).map(|items| items.len()).ok(), Some(expected));
}

#[test]
fn list_rejects_garbage() {
    assert!(parse_list("Error: not authenticated").is_err());
}

#[test]
fn name_match_ignores_case() {
    let items = vec![
        ListItem { id: "p_1".into(), name: "other".into() },
        ListItem { id: "p_2".into(), name: "agent-sandbox".into() },
    ];
    assert_eq!(find_by_name(&items, &["Agent-Sandbox"]).map(|i| i.id.as_str()), Some("p_2"));
    assert!(find_by_name(&items, &["missing"]).is_none());
}

#[tokio::test]
async fn static_lookup_skips_the_cli() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("registry.txt");
    std::fs::write(&path, "claude-ssh: t_abc123 extra\n")?;
    let runner = Arc::new(ScriptedRunner::new());
    let mut resolver = resolver(&path, &runner);

    let target = resolver.resolve("claude", Some(&token())).await;
    assert_eq!(target.resolved_id.as_deref(), Some("t_abc123"));
    assert!(runner.calls().is_empty());
    Ok(())
}

#[tokio::test]
async fn dynamic_lookup_descends_scope_project_target() {
    let runner = Arc::new(
        ScriptedRunner::new()
            .then_ok(list(&[("o_other", "Research"), ("o_dev", "DevOps")]))
            .then_ok(list(&[("p_sand", "Agent-Sandbox")]))
            .then_ok(list(&[("t_gem", "gemini-ssh"), ("t_cla", "claude-ssh")])),
    );
    let mut resolver = resolver("/nonexistent/registry.txt", &runner);

    let target = resolver.resolve("claude", Some(&token())).await;
    assert_eq!(target.resolved_id.as_deref(), Some("t_cla"));

    let calls = runner.calls();
    assert_eq!(calls.len(), 3);
    assert_eq!(&calls[0].args[..4], ["scopes", "list", "-scope-id", "global"]);
    assert!(calls[1].args.contains(&"o_dev".to_owned()));
    assert_eq!(&calls[2].args[..2], ["targets", "list"]);
    assert!(calls[2].args.contains(&"p_sand".to_owned()));
    assert!(calls.iter().all(|c| c.args.contains(&"-format=json".to_owned())));
}

#[tokio::test]
async fn dynamic_lookup_stops_when_scope_is_missing() {
    let runner = Arc::new(ScriptedRunner::new().then_ok(list(&[("o_other", "Research")])));
    let mut resolver = resolver("/nonexistent/registry.txt", &runner);

    let target = resolver.resolve("claude", Some(&token())).await;
    assert!(!target.is_resolved());
    assert_eq!(runner.calls().len(), 1);
}

#[tokio::test]
async fn failing_cli_leaves_target_unresolved() {
    let runner = Arc::new(ScriptedRunner::new().then_exit(1, "Error: unauthenticated"));
    let mut resolver = resolver("/nonexistent/registry.txt", &runner);
    assert!(!resolver.resolve("claude", Some(&token())).await.is_resolved());
}

#[tokio::test]
async fn no_token_means_static_lookup_only() {
    let runner = Arc::new(ScriptedRunner::new());
    let mut resolver = resolver("/nonexistent/registry.txt", &runner);
    assert_eq!(resolver.resolve("claude", None).await, TargetRef::unresolved("claude"));
    assert!(runner.calls().is_empty());
}

#[tokio::test]
async fn resolution_is_memoized() {
    let runner = Arc::new(
        ScriptedRunner::new()
            .then_ok(list(&[("o_dev", "DevOps")]))
            .then_ok(list(&[("p_sand", "Agent-Sandbox")]))
            .then_ok(list(&[("t_cla", "claude")])),
    );
    let mut resolver = resolver("/nonexistent/registry.txt", &runner);

    let first = resolver.resolve("claude", Some(&token())).await;
    let second = resolver.resolve("claude", Some(&token())).await;
    assert_eq!(first, second);
    assert_eq!(runner.calls().len(), 3);
}

#[tokio::test]
async fn resolve_first_falls_through_names_and_reuses_project() {
    let runner = Arc::new(
        ScriptedRunner::new()
            .then_ok(list(&[("o_dev", "DevOps")]))
            .then_ok(list(&[("p_sand", "Agent-Sandbox")]))
            .then_ok(list(&[("t_gem", "gemini-ssh")]))
            .then_ok(list(&[("t_gem", "gemini-ssh")])),
    );
    let mut resolver = resolver("/nonexistent/registry.txt", &runner);

    let names = vec!["claude".to_owned(), "gemini".to_owned()];
    let target = resolver.resolve_first(&names, Some(&token())).await;
    assert_eq!(target.and_then(|t| t.resolved_id).as_deref(), Some("t_gem"));
    // Scopes and projects are listed once; targets once per name.
    assert_eq!(runner.calls().len(), 4);
}

#[tokio::test]
async fn registry_entry_for_later_name_beats_lookup_of_earlier_name() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("registry.txt");
    std::fs::write(&path, "gemini-ssh: t_gem\n")?;
    let runner = Arc::new(
        ScriptedRunner::new()
            .then_ok(list(&[("o_dev", "DevOps")]))
            .then_ok(list(&[("p_sand", "Agent-Sandbox")]))
            .then_ok(list(&[("t_dyn", "claude-ssh")])),
    );
    let mut resolver = resolver(&path, &runner);

    let names = vec!["claude".to_owned(), "gemini".to_owned()];
    let target = resolver.resolve_first(&names, Some(&token())).await;
    assert_eq!(
        target,
        Some(TargetRef { symbolic_name: "gemini".into(), resolved_id: Some("t_gem".into()) })
    );
    assert!(runner.calls().is_empty());
    Ok(())
}
