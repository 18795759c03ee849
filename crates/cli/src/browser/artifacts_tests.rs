// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::test_support::{FakeBrowser, FakePage};

#[test]
fn names_are_phase_numbered() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let mut log = ArtifactLog::new(dir.path(), "ssh-oidc-test");
    log.record("ready", b"png");
    log.record("Final Success", b"png");

    let names: Vec<String> = log
        .paths()
        .iter()
        .filter_map(|p| p.file_name())
        .map(|n| n.to_string_lossy().into_owned())
        .collect();
    assert_eq!(names, vec!["ssh-oidc-test-01-ready.png", "ssh-oidc-test-02-final-success.png"]);
    assert_eq!(std::fs::read(&log.paths()[0])?, b"png");
    Ok(())
}

#[test]
fn unwritable_directory_is_skipped() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let blocker = dir.path().join("file");
    std::fs::write(&blocker, b"x")?;
    let mut log = ArtifactLog::new(blocker.join("sub"), "p");
    log.record("ready", b"png");
    assert!(log.paths().is_empty());
    assert!(log.next_path("ready").ends_with("p-01-ready.png"));
    Ok(())
}

#[tokio::test]
async fn capture_failure_does_not_advance_sequence() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let mut log = ArtifactLog::new(dir.path(), "p");
    let mut browser = FakeBrowser::new(FakePage::new("https://boundary.test/"));

    log.capture(&mut browser, "one").await;
    browser.fail_screenshots();
    log.capture(&mut browser, "two").await;

    assert_eq!(log.paths().len(), 1);
    assert!(log.next_path("three").ends_with("p-02-three.png"));
    Ok(())
}
