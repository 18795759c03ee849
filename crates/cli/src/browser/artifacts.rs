// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Phase-numbered diagnostic screenshots.

use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use super::BrowsingContext;

/// Collects screenshots in capture order.
///
/// Capturing is best-effort: a failed screenshot is logged and skipped.
#[derive(Debug)]
pub struct ArtifactLog {
    dir: PathBuf,
    prefix: String,
    seq: u32,
    paths: Vec<PathBuf>,
}

impl ArtifactLog {
    pub fn new(dir: impl Into<PathBuf>, prefix: impl Into<String>) -> Self {
        Self { dir: dir.into(), prefix: prefix.into(), seq: 0, paths: Vec::new() }
    }

    /// Path the next capture with `label` would be written to.
    pub fn next_path(&self, label: &str) -> PathBuf {
        self.dir.join(format!("{}-{:02}-{}.png", self.prefix, self.seq + 1, sanitize(label)))
    }

    /// Screenshot the browser's current page.
    pub async fn capture(&mut self, browser: &mut dyn BrowsingContext, label: &str) {
        match browser.screenshot().await {
            Ok(png) => self.record(label, &png),
            Err(e) => warn!(label, "screenshot failed: {e}"),
        }
    }

    /// Write already-captured PNG bytes.
    pub fn record(&mut self, label: &str, png: &[u8]) {
        let path = self.next_path(label);
        match write_png(&path, png) {
            Ok(()) => {
                debug!(path = %path.display(), "captured");
                self.seq += 1;
                self.paths.push(path);
            }
            Err(e) => warn!(path = %path.display(), "could not write screenshot: {e:#}"),
        }
    }

    pub fn paths(&self) -> &[PathBuf] {
        &self.paths
    }

    pub fn into_paths(self) -> Vec<PathBuf> {
        self.paths
    }
}

fn write_png(path: &Path, png: &[u8]) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, png)?;
    Ok(())
}

fn sanitize(label: &str) -> String {
    label
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c.to_ascii_lowercase() } else { '-' })
        .collect()
}

#[cfg(test)]
#[path = "artifacts_tests.rs"]
mod tests;
