// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Symbolic target name → broker target ID.
//!
//! The registry file is consulted first, for every candidate name; only when
//! it has no usable entry do we walk scopes → projects → targets through the
//! broker CLI.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::command::{BrokerCli, CommandRunner};
use crate::token::SessionToken;

/// A target as named in configuration, plus its ID once resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetRef {
    pub symbolic_name: String,
    pub resolved_id: Option<String>,
}

impl TargetRef {
    pub fn unresolved(name: impl Into<String>) -> Self {
        Self { symbolic_name: name.into(), resolved_id: None }
    }

    pub fn is_resolved(&self) -> bool {
        self.resolved_id.is_some()
    }
}

/// Registry marker for a symbolic name.
pub fn registry_marker(name: &str) -> String {
    format!("{name}-ssh:")
}

/// Find the ID recorded for `name`: first whitespace-delimited token after
/// the `<name>-ssh:` marker on the first line that has one.
pub fn parse_registry(contents: &str, name: &str) -> Option<String> {
    let marker = registry_marker(name);
    contents.lines().find_map(|line| {
        let (_, rest) = line.split_once(&marker)?;
        rest.split_whitespace().next().map(str::to_owned)
    })
}

/// Read the registry file and look up `name`. Missing or unreadable files
/// resolve to `None`.
pub fn lookup_registry(path: &Path, name: &str) -> Option<String> {
    match std::fs::read_to_string(path) {
        Ok(contents) => parse_registry(&contents, name),
        Err(e) => {
            debug!(path = %path.display(), "registry unavailable: {e}");
            None
        }
    }
}

/// One row of a broker CLI `list` response.
#[derive(Debug, Clone, Deserialize)]
pub struct ListItem {
    pub id: String,
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Deserialize)]
struct ListResponse {
    #[serde(default)]
    items: Option<Vec<ListItem>>,
}

/// Parse `... list -format=json` output. `items` may be absent or null when empty.
pub fn parse_list(stdout: &str) -> anyhow::Result<Vec<ListItem>> {
    let response: ListResponse = serde_json::from_str(stdout.trim())?;
    Ok(response.items.unwrap_or_default())
}

/// First item whose name equals any of `names`, ignoring case.
pub fn find_by_name<'a>(items: &'a [ListItem], names: &[&str]) -> Option<&'a ListItem> {
    items.iter().find(|item| names.iter().any(|n| item.name.eq_ignore_ascii_case(n)))
}

/// Where dynamic lookup descends: scope name, then project name.
#[derive(Debug, Clone)]
pub struct LookupPlan {
    pub scope: String,
    pub project: String,
}

pub struct TargetResolver {
    registry: PathBuf,
    cli: BrokerCli,
    runner: Arc<dyn CommandRunner>,
    plan: LookupPlan,
    timeout: Duration,
    resolved: HashMap<String, Option<String>>,
    project_id: Option<Option<String>>,
}

impl TargetResolver {
    pub fn new(
        registry: impl Into<PathBuf>,
        cli: BrokerCli,
        runner: Arc<dyn CommandRunner>,
        plan: LookupPlan,
        timeout: Duration,
    ) -> Self {
        Self {
            registry: registry.into(),
            cli,
            runner,
            plan,
            timeout,
            resolved: HashMap::new(),
            project_id: None,
        }
    }

    /// Resolve `name`. Results are memoized for the lifetime of the resolver.
    pub async fn resolve(&mut self, name: &str, token: Option<&SessionToken>) -> TargetRef {
        if let Some(id) = self.resolved.get(name) {
            return TargetRef { symbolic_name: name.to_owned(), resolved_id: id.clone() };
        }

        let id = match self.resolve_static(name) {
            Some(id) => Some(id),
            None => match token {
                Some(token) => self.lookup(name, token).await,
                None => None,
            },
        };

        self.resolved.insert(name.to_owned(), id.clone());
        TargetRef { symbolic_name: name.to_owned(), resolved_id: id }
    }

    /// Resolve names in order and return the first that resolves.
    ///
    /// Every name is checked against the registry before any dynamic lookup
    /// runs, so a registry entry for a later name beats a CLI match for an
    /// earlier one.
    pub async fn resolve_first(
        &mut self,
        names: &[String],
        token: Option<&SessionToken>,
    ) -> Option<TargetRef> {
        for name in names {
            if let Some(id) = self.resolve_static(name) {
                return Some(TargetRef { symbolic_name: name.clone(), resolved_id: Some(id) });
            }
        }
        for name in names {
            let target = self.resolve(name, token).await;
            if target.is_resolved() {
                return Some(target);
            }
            debug!(target_name = %name, "target unresolved");
        }
        None
    }

    /// Memoized or registry ID for `name`; never touches the CLI.
    fn resolve_static(&mut self, name: &str) -> Option<String> {
        if let Some(Some(id)) = self.resolved.get(name) {
            return Some(id.clone());
        }
        let id = lookup_registry(&self.registry, name)?;
        info!(target_name = name, id = %id, "target resolved from registry");
        self.resolved.insert(name.to_owned(), Some(id.clone()));
        Some(id)
    }

    async fn lookup(&mut self, name: &str, token: &SessionToken) -> Option<String> {
        let project_id = match self.project_id.clone() {
            Some(cached) => cached,
            None => {
                let found = self.lookup_project(token).await;
                self.project_id = Some(found.clone());
                found
            }
        }?;

        let targets = self.list(&["targets", "list", "-scope-id", project_id.as_str()], token).await?;
        let ssh_name = registry_marker(name);
        let ssh_name = ssh_name.trim_end_matches(':');
        match find_by_name(&targets, &[ssh_name, name]) {
            Some(target) => {
                info!(target_name = name, id = %target.id, "target resolved by lookup");
                Some(target.id.clone())
            }
            None => {
                debug!(target_name = name, project = %project_id, "no target with a matching name");
                None
            }
        }
    }

    async fn lookup_project(&self, token: &SessionToken) -> Option<String> {
        let orgs = self.list(&["scopes", "list", "-scope-id", "global"], token).await?;
        let Some(org) = find_by_name(&orgs, &[self.plan.scope.as_str()]) else {
            debug!(scope = %self.plan.scope, "scope not found");
            return None;
        };
        let projects = self.list(&["scopes", "list", "-scope-id", org.id.as_str()], token).await?;
        let Some(project) = find_by_name(&projects, &[self.plan.project.as_str()]) else {
            debug!(project = %self.plan.project, "project not found");
            return None;
        };
        Some(project.id.clone())
    }

    async fn list(&self, args: &[&str], token: &SessionToken) -> Option<Vec<ListItem>> {
        let mut full: Vec<&str> = args.to_vec();
        full.push("-format=json");
        let spec = self.cli.command(full, token);
        let output = match self.runner.run(&spec, self.timeout).await {
            Ok(output) => output,
            Err(e) => {
                warn!(command = %spec.display(), "lookup {e}");
                return None;
            }
        };
        if !output.success() {
            warn!(command = %spec.display(), "lookup failed: {}", output.detail());
            return None;
        }
        match parse_list(&output.stdout) {
            Ok(items) => Some(items),
            Err(e) => {
                warn!(command = %spec.display(), "unparsable lookup output: {e}");
                None
            }
        }
    }
}

#[cfg(test)]
#[path = "target_tests.rs"]
mod tests;
