// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Browser surface driven by the flow.
//!
//! The flow only ever touches one page at a time: it switches to a page,
//! drives it to completion, then switches back.

pub mod artifacts;
pub mod webdriver;

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use crate::error::{FailureKind, FlowError};
use crate::token::StorageSnapshot;

/// Boxed future returned by [`BrowsingContext`] methods.
pub type BrowserFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, BrowserError>> + Send + 'a>>;

/// Element locator.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Selector {
    /// CSS selector (comma groups allowed).
    Css(String),
    /// Any element whose visible text contains the needle, case-insensitively.
    Text(String),
    /// A `<button>` whose text contains the needle.
    ButtonText(String),
}

impl Selector {
    pub fn css(s: impl Into<String>) -> Self {
        Self::Css(s.into())
    }

    pub fn text(s: impl Into<String>) -> Self {
        Self::Text(s.into())
    }

    pub fn button(s: impl Into<String>) -> Self {
        Self::ButtonText(s.into())
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Css(s) => write!(f, "css={s}"),
            Self::Text(s) => write!(f, "text={s}"),
            Self::ButtonText(s) => write!(f, "button:has-text({s:?})"),
        }
    }
}

/// Outcome of looking for an optional affordance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Presence {
    Present,
    /// The page answered and the element never became visible in time.
    Absent,
    /// The driver could not answer (session or script error).
    Unknown,
}

impl Presence {
    pub fn is_present(self) -> bool {
        self == Self::Present
    }
}

/// Handle to a page (top-level browsing context) owned by a [`BrowsingContext`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PageId(pub usize);

/// Browser-level failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BrowserError {
    /// A bounded wait elapsed.
    Timeout { what: String, after: Duration },
    /// A mandatory element never appeared.
    NotFound { selector: String },
    /// Anything the driver reported that isn't one of the above.
    Driver(String),
}

impl BrowserError {
    pub fn driver(err: impl fmt::Display) -> Self {
        Self::Driver(err.to_string())
    }
}

impl fmt::Display for BrowserError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Timeout { what, after } => {
                write!(f, "timed out after {}ms waiting for {what}", after.as_millis())
            }
            Self::NotFound { selector } => write!(f, "element not found: {selector}"),
            Self::Driver(msg) => write!(f, "browser driver error: {msg}"),
        }
    }
}

impl std::error::Error for BrowserError {}

impl From<BrowserError> for FlowError {
    fn from(err: BrowserError) -> Self {
        let kind = match err {
            BrowserError::Timeout { .. } => FailureKind::NavigationTimeout,
            BrowserError::NotFound { .. } => FailureKind::ElementNotFound,
            BrowserError::Driver(_) => FailureKind::UnclassifiedException,
        };
        FlowError::new(kind, err.to_string())
    }
}

/// A headless browser with one or more pages; all calls act on the current page.
///
/// Object-safe for use as `Box<dyn BrowsingContext>`.
pub trait BrowsingContext: Send {
    /// Navigate and wait until the page is network-idle.
    fn navigate<'a>(&'a mut self, url: &'a str, timeout: Duration) -> BrowserFuture<'a, ()>;

    /// Wait for the current page to become network-idle.
    fn wait_for_idle(&mut self, timeout: Duration) -> BrowserFuture<'_, ()>;

    /// Look for a visible element without raising.
    fn wait_for_optional_element<'a>(
        &'a mut self,
        selector: &'a Selector,
        timeout: Duration,
    ) -> Pin<Box<dyn Future<Output = Presence> + Send + 'a>>;

    /// Wait for a mandatory element; [`BrowserError::NotFound`] when it never appears.
    fn wait_for_element<'a>(
        &'a mut self,
        selector: &'a Selector,
        timeout: Duration,
    ) -> BrowserFuture<'a, ()>;

    fn click<'a>(&'a mut self, selector: &'a Selector) -> BrowserFuture<'a, ()>;

    fn fill<'a>(&'a mut self, selector: &'a Selector, value: &'a str) -> BrowserFuture<'a, ()>;

    /// Click `trigger` and return the page it opens, switching to it.
    ///
    /// The set of known pages is captured before the click, so a pop-up that
    /// opens instantly is still observed.
    fn await_new_page<'a>(
        &'a mut self,
        trigger: &'a Selector,
        timeout: Duration,
    ) -> BrowserFuture<'a, PageId>;

    fn current_page(&self) -> PageId;

    fn switch_to(&mut self, page: PageId) -> BrowserFuture<'_, ()>;

    fn current_url(&mut self) -> BrowserFuture<'_, String>;

    /// Serialized DOM of the current page.
    fn content(&mut self) -> BrowserFuture<'_, String>;

    /// Read the given local-storage keys and the cookie string.
    fn read_storage<'a>(&'a mut self, keys: &'a [&'a str]) -> BrowserFuture<'a, StorageSnapshot>;

    /// PNG screenshot of the current page.
    fn screenshot(&mut self) -> BrowserFuture<'_, Vec<u8>>;

    /// End the browser session. Further calls fail.
    fn close(&mut self) -> BrowserFuture<'_, ()>;
}
