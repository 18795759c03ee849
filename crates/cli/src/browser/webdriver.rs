// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! [`BrowsingContext`] over W3C WebDriver (chromedriver) via `fantoccini`.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use anyhow::Context;
use fantoccini::elements::Element;
use fantoccini::wd::WindowHandle;
use fantoccini::{Client, ClientBuilder, Locator};
use serde_json::{json, Map, Value};
use tokio::time::Instant;
use tracing::{debug, warn};

use super::{BrowserError, BrowserFuture, BrowsingContext, PageId, Presence, Selector};
use crate::token::StorageSnapshot;

/// Interval between element and readiness polls.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// How long the resource count must stay flat to count as network-idle.
const IDLE_QUIET: Duration = Duration::from_millis(500);

const READINESS_JS: &str =
    "return [document.readyState, performance.getEntriesByType('resource').length];";

const READ_STORAGE_JS: &str = r#"
    const keys = arguments[0];
    return {
        local: keys.map((k) => window.localStorage.getItem(k)),
        cookie: document.cookie,
    };
"#;

/// Connection settings for the WebDriver session.
#[derive(Debug, Clone)]
pub struct WebDriverOptions {
    pub url: String,
    pub headless: bool,
    pub width: u32,
    pub height: u32,
}

impl WebDriverOptions {
    pub fn new(url: impl Into<String>, headless: bool) -> Self {
        Self { url: url.into(), headless, width: 1280, height: 720 }
    }
}

/// Session capabilities: Chrome, lab certificates accepted, fixed viewport.
pub fn capabilities(opts: &WebDriverOptions) -> Map<String, Value> {
    let mut args = vec![
        "--ignore-certificate-errors".to_owned(),
        format!("--window-size={},{}", opts.width, opts.height),
        "--no-sandbox".to_owned(),
        "--disable-dev-shm-usage".to_owned(),
    ];
    if opts.headless {
        args.push("--headless=new".to_owned());
    }
    let caps = json!({
        "browserName": "chrome",
        "acceptInsecureCerts": true,
        "goog:chromeOptions": { "args": args },
    });
    caps.as_object().cloned().unwrap_or_default()
}

/// Quote a string as an XPath 1.0 literal.
pub fn xpath_literal(s: &str) -> String {
    if !s.contains('\'') {
        format!("'{s}'")
    } else if !s.contains('"') {
        format!("\"{s}\"")
    } else {
        let parts: Vec<String> = s.split('\'').map(|p| format!("'{p}'")).collect();
        format!("concat({})", parts.join(", \"'\", "))
    }
}

fn lowered_text(node: &str) -> String {
    format!(
        "translate(normalize-space({node}), 'ABCDEFGHIJKLMNOPQRSTUVWXYZ', 'abcdefghijklmnopqrstuvwxyz')"
    )
}

/// XPath for the innermost elements whose text contains `needle` (any case).
pub fn xpath_contains_text(needle: &str) -> String {
    let lit = xpath_literal(&needle.to_lowercase());
    let text = lowered_text(".");
    format!("//*[contains({text}, {lit}) and not(.//*[contains({text}, {lit})])]")
}

/// XPath for `<button>` elements whose text contains `needle` (any case).
pub fn xpath_button_text(needle: &str) -> String {
    let lit = xpath_literal(&needle.to_lowercase());
    format!("//button[contains({}, {lit})]", lowered_text("."))
}

/// Owned form of a `fantoccini` locator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OwnedLocator {
    Css(String),
    XPath(String),
}

impl OwnedLocator {
    pub fn as_locator(&self) -> Locator<'_> {
        match self {
            Self::Css(s) => Locator::Css(s),
            Self::XPath(s) => Locator::XPath(s),
        }
    }
}

impl From<&Selector> for OwnedLocator {
    fn from(selector: &Selector) -> Self {
        match selector {
            Selector::Css(s) => Self::Css(s.clone()),
            Selector::Text(t) => Self::XPath(xpath_contains_text(t)),
            Selector::ButtonText(t) => Self::XPath(xpath_button_text(t)),
        }
    }
}

/// Whether a readiness sample means the document finished loading.
fn document_complete(sample: &Value) -> Option<(bool, u64)> {
    let state = sample.get(0)?.as_str()?;
    let resources = sample.get(1)?.as_u64()?;
    Some((state == "complete", resources))
}

/// Report a failed clear before typing; `send_keys` would append to whatever
/// the field already held. Returns whether the field was cleared.
fn cleared<E: std::fmt::Display>(selector: &Selector, result: Result<(), E>) -> bool {
    match result {
        Ok(()) => true,
        Err(e) => {
            warn!(%selector, "could not clear field before typing; value may be appended: {e}");
            false
        }
    }
}

/// A live WebDriver session.
pub struct WebDriverContext {
    client: Client,
    pages: Vec<WindowHandle>,
    current: usize,
    closed: bool,
}

impl WebDriverContext {
    /// Open a new WebDriver session.
    pub async fn connect(opts: &WebDriverOptions) -> anyhow::Result<Self> {
        let mut builder = ClientBuilder::rustls().context("failed to create rustls connector")?;
        builder.capabilities(capabilities(opts));
        let url = opts.url.trim_end_matches('/');
        let client = builder
            .connect(url)
            .await
            .with_context(|| format!("failed to connect to WebDriver at {url}"))?;
        let main = client.window().await.context("failed to read initial window handle")?;
        Ok(Self { client, pages: vec![main], current: 0, closed: false })
    }

    async fn first_visible(&self, locator: &OwnedLocator) -> Result<Option<Element>, BrowserError> {
        let elements =
            self.client.find_all(locator.as_locator()).await.map_err(BrowserError::driver)?;
        for element in elements {
            if element.is_displayed().await.unwrap_or(false) {
                return Ok(Some(element));
            }
        }
        Ok(None)
    }

    async fn poll_visible(
        &self,
        selector: &Selector,
        timeout: Duration,
    ) -> Result<Option<Element>, BrowserError> {
        let locator = OwnedLocator::from(selector);
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(element) = self.first_visible(&locator).await? {
                return Ok(Some(element));
            }
            if Instant::now() >= deadline {
                return Ok(None);
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }

    async fn require(&self, selector: &Selector) -> Result<Element, BrowserError> {
        self.first_visible(&OwnedLocator::from(selector))
            .await?
            .ok_or_else(|| BrowserError::NotFound { selector: selector.to_string() })
    }

    async fn idle(&self, timeout: Duration) -> Result<(), BrowserError> {
        let deadline = Instant::now() + timeout;
        let mut last_count: Option<u64> = None;
        let mut quiet_since = Instant::now();
        loop {
            let sample =
                self.client.execute(READINESS_JS, vec![]).await.map_err(BrowserError::driver)?;
            if let Some((complete, count)) = document_complete(&sample) {
                if last_count != Some(count) {
                    last_count = Some(count);
                    quiet_since = Instant::now();
                } else if complete && quiet_since.elapsed() >= IDLE_QUIET {
                    return Ok(());
                }
            }
            if Instant::now() >= deadline {
                return Err(BrowserError::Timeout { what: "network idle".to_owned(), after: timeout });
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }
}

impl BrowsingContext for WebDriverContext {
    fn navigate<'a>(&'a mut self, url: &'a str, timeout: Duration) -> BrowserFuture<'a, ()> {
        Box::pin(async move {
            let started = Instant::now();
            match tokio::time::timeout(timeout, self.client.goto(url)).await {
                Err(_) => {
                    return Err(BrowserError::Timeout {
                        what: format!("navigation to {url}"),
                        after: timeout,
                    })
                }
                Ok(result) => result.map_err(BrowserError::driver)?,
            }
            self.idle(timeout.saturating_sub(started.elapsed())).await
        })
    }

    fn wait_for_idle(&mut self, timeout: Duration) -> BrowserFuture<'_, ()> {
        Box::pin(async move { self.idle(timeout).await })
    }

    fn wait_for_optional_element<'a>(
        &'a mut self,
        selector: &'a Selector,
        timeout: Duration,
    ) -> Pin<Box<dyn Future<Output = Presence> + Send + 'a>> {
        Box::pin(async move {
            match self.poll_visible(selector, timeout).await {
                Ok(Some(_)) => Presence::Present,
                Ok(None) => Presence::Absent,
                Err(e) => {
                    debug!(%selector, "presence unknown: {e}");
                    Presence::Unknown
                }
            }
        })
    }

    fn wait_for_element<'a>(
        &'a mut self,
        selector: &'a Selector,
        timeout: Duration,
    ) -> BrowserFuture<'a, ()> {
        Box::pin(async move {
            match self.poll_visible(selector, timeout).await? {
                Some(_) => Ok(()),
                None => Err(BrowserError::NotFound { selector: selector.to_string() }),
            }
        })
    }

    fn click<'a>(&'a mut self, selector: &'a Selector) -> BrowserFuture<'a, ()> {
        Box::pin(async move {
            self.require(selector).await?.click().await.map_err(BrowserError::driver)
        })
    }

    fn fill<'a>(&'a mut self, selector: &'a Selector, value: &'a str) -> BrowserFuture<'a, ()> {
        Box::pin(async move {
            let element = self.require(selector).await?;
            cleared(selector, element.clear().await);
            element.send_keys(value).await.map_err(BrowserError::driver)
        })
    }

    fn await_new_page<'a>(
        &'a mut self,
        trigger: &'a Selector,
        timeout: Duration,
    ) -> BrowserFuture<'a, PageId> {
        Box::pin(async move {
            let before = self.client.windows().await.map_err(BrowserError::driver)?;
            self.click(trigger).await?;

            let deadline = Instant::now() + timeout;
            loop {
                let now = self.client.windows().await.map_err(BrowserError::driver)?;
                if let Some(handle) = now.into_iter().find(|h| !before.contains(h)) {
                    self.client
                        .switch_to_window(handle.clone())
                        .await
                        .map_err(BrowserError::driver)?;
                    self.pages.push(handle);
                    self.current = self.pages.len() - 1;
                    return Ok(PageId(self.current));
                }
                if Instant::now() >= deadline {
                    return Err(BrowserError::Timeout {
                        what: "pop-up window".to_owned(),
                        after: timeout,
                    });
                }
                tokio::time::sleep(POLL_INTERVAL).await;
            }
        })
    }

    fn current_page(&self) -> PageId {
        PageId(self.current)
    }

    fn switch_to(&mut self, page: PageId) -> BrowserFuture<'_, ()> {
        Box::pin(async move {
            let handle = self
                .pages
                .get(page.0)
                .cloned()
                .ok_or_else(|| BrowserError::Driver(format!("unknown page {}", page.0)))?;
            self.client.switch_to_window(handle).await.map_err(BrowserError::driver)?;
            self.current = page.0;
            Ok(())
        })
    }

    fn current_url(&mut self) -> BrowserFuture<'_, String> {
        Box::pin(async move {
            let url = self.client.current_url().await.map_err(BrowserError::driver)?;
            Ok(url.to_string())
        })
    }

    fn content(&mut self) -> BrowserFuture<'_, String> {
        Box::pin(async move { self.client.source().await.map_err(BrowserError::driver) })
    }

    fn read_storage<'a>(&'a mut self, keys: &'a [&'a str]) -> BrowserFuture<'a, StorageSnapshot> {
        Box::pin(async move {
            let value = self
                .client
                .execute(READ_STORAGE_JS, vec![json!(keys)])
                .await
                .map_err(BrowserError::driver)?;
            serde_json::from_value(value).map_err(BrowserError::driver)
        })
    }

    fn screenshot(&mut self) -> BrowserFuture<'_, Vec<u8>> {
        Box::pin(async move { self.client.screenshot().await.map_err(BrowserError::driver) })
    }

    fn close(&mut self) -> BrowserFuture<'_, ()> {
        Box::pin(async move {
            if self.closed {
                return Ok(());
            }
            self.closed = true;
            self.client.clone().close().await.map_err(BrowserError::driver)
        })
    }
}

#[cfg(test)]
#[path = "webdriver_tests.rs"]
mod tests;
