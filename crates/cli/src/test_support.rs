// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared test infrastructure: a scripted browser, a scripted command
//! runner, and assertion helpers.

use std::collections::{HashSet, VecDeque};
use std::future::Future;
use std::pin::Pin;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use crate::browser::{BrowserError, BrowserFuture, BrowsingContext, PageId, Presence, Selector};
use crate::command::{CommandOutput, CommandRunner, CommandSpec, RunError};
use crate::token::StorageSnapshot;

/// One page of a [`FakeBrowser`].
#[derive(Debug, Clone, Default)]
pub struct FakePage {
    pub url: String,
    pub content: String,
    pub visible: HashSet<Selector>,
    /// Page opened by [`BrowsingContext::await_new_page`] from this page.
    pub popup: Option<Box<FakePage>>,
}

impl FakePage {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into(), ..Self::default() }
    }

    pub fn content(mut self, content: impl Into<String>) -> Self {
        self.content = content.into();
        self
    }

    pub fn show(mut self, selector: Selector) -> Self {
        self.visible.insert(selector);
        self
    }

    pub fn popup(mut self, page: FakePage) -> Self {
        self.popup = Some(Box::new(page));
        self
    }
}

/// Scripted [`BrowsingContext`].
///
/// Page 0 is the main page. Once anything is clicked on another page (the
/// login submit), each `wait_for_idle` on page 0 applies the next queued
/// callback state to it.
#[derive(Debug, Default)]
pub struct FakeBrowser {
    pages: Vec<FakePage>,
    current: usize,
    callbacks: VecDeque<(String, String)>,
    submitted: bool,
    navigation_timeout: bool,
    storage: StorageSnapshot,
    storage_fails: bool,
    screenshot_fails: bool,
    filled: Vec<(Selector, String)>,
    actions: Vec<String>,
    closed: bool,
}

impl FakeBrowser {
    pub fn new(main: FakePage) -> Self {
        Self { pages: vec![main], ..Self::default() }
    }

    /// Queue a `(url, content)` state for the main page after submit.
    pub fn then_callback(mut self, url: impl Into<String>, content: impl Into<String>) -> Self {
        self.callbacks.push_back((url.into(), content.into()));
        self
    }

    pub fn fail_navigation(&mut self) {
        self.navigation_timeout = true;
    }

    pub fn set_storage(&mut self, snapshot: StorageSnapshot) {
        self.storage = snapshot;
    }

    pub fn fail_storage_reads(&mut self) {
        self.storage_fails = true;
    }

    pub fn fail_screenshots(&mut self) {
        self.screenshot_fails = true;
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn actions(&self) -> &[String] {
        &self.actions
    }

    /// Value typed into `selector`, if any.
    pub fn filled(&self, selector: &Selector) -> Option<&str> {
        self.filled.iter().find(|(s, _)| s == selector).map(|(_, v)| v.as_str())
    }

    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    fn page(&self) -> Result<&FakePage, BrowserError> {
        if self.closed {
            return Err(BrowserError::Driver("session closed".into()));
        }
        self.pages.get(self.current).ok_or_else(|| BrowserError::Driver("no page".into()))
    }

    fn is_visible(&self, selector: &Selector) -> Result<bool, BrowserError> {
        Ok(self.page()?.visible.contains(selector))
    }

    fn require(&self, selector: &Selector) -> Result<(), BrowserError> {
        if self.is_visible(selector)? {
            Ok(())
        } else {
            Err(BrowserError::NotFound { selector: selector.to_string() })
        }
    }
}

impl BrowsingContext for FakeBrowser {
    fn navigate<'a>(&'a mut self, url: &'a str, timeout: Duration) -> BrowserFuture<'a, ()> {
        Box::pin(async move {
            self.page()?;
            self.actions.push(format!("navigate {url}"));
            if self.navigation_timeout {
                return Err(BrowserError::Timeout { what: format!("navigation to {url}"), after: timeout });
            }
            Ok(())
        })
    }

    fn wait_for_idle(&mut self, _timeout: Duration) -> BrowserFuture<'_, ()> {
        Box::pin(async move {
            self.page()?;
            if self.current == 0 && self.submitted {
                if let (Some((url, content)), Some(main)) =
                    (self.callbacks.pop_front(), self.pages.first_mut())
                {
                    main.url = url;
                    main.content = content;
                }
            }
            Ok(())
        })
    }

    fn wait_for_optional_element<'a>(
        &'a mut self,
        selector: &'a Selector,
        _timeout: Duration,
    ) -> Pin<Box<dyn Future<Output = Presence> + Send + 'a>> {
        Box::pin(async move {
            match self.is_visible(selector) {
                Ok(true) => Presence::Present,
                Ok(false) => Presence::Absent,
                Err(_) => Presence::Unknown,
            }
        })
    }

    fn wait_for_element<'a>(
        &'a mut self,
        selector: &'a Selector,
        _timeout: Duration,
    ) -> BrowserFuture<'a, ()> {
        Box::pin(async move { self.require(selector) })
    }

    fn click<'a>(&'a mut self, selector: &'a Selector) -> BrowserFuture<'a, ()> {
        Box::pin(async move {
            self.require(selector)?;
            self.actions.push(format!("click {selector}"));
            if self.current != 0 {
                self.submitted = true;
            }
            Ok(())
        })
    }

    fn fill<'a>(&'a mut self, selector: &'a Selector, value: &'a str) -> BrowserFuture<'a, ()> {
        Box::pin(async move {
            self.require(selector)?;
            self.actions.push(format!("fill {selector}"));
            self.filled.push((selector.clone(), value.to_owned()));
            Ok(())
        })
    }

    fn await_new_page<'a>(
        &'a mut self,
        trigger: &'a Selector,
        timeout: Duration,
    ) -> BrowserFuture<'a, PageId> {
        Box::pin(async move {
            self.require(trigger)?;
            self.actions.push(format!("click {trigger}"));
            let popup = self.page()?.popup.clone().ok_or_else(|| BrowserError::Timeout {
                what: "pop-up window".into(),
                after: timeout,
            })?;
            self.pages.push(*popup);
            self.current = self.pages.len() - 1;
            Ok(PageId(self.current))
        })
    }

    fn current_page(&self) -> PageId {
        PageId(self.current)
    }

    fn switch_to(&mut self, page: PageId) -> BrowserFuture<'_, ()> {
        Box::pin(async move {
            if page.0 >= self.pages.len() {
                return Err(BrowserError::Driver(format!("unknown page {}", page.0)));
            }
            self.current = page.0;
            Ok(())
        })
    }

    fn current_url(&mut self) -> BrowserFuture<'_, String> {
        Box::pin(async move { Ok(self.page()?.url.clone()) })
    }

    fn content(&mut self) -> BrowserFuture<'_, String> {
        Box::pin(async move { Ok(self.page()?.content.clone()) })
    }

    fn read_storage<'a>(&'a mut self, _keys: &'a [&'a str]) -> BrowserFuture<'a, StorageSnapshot> {
        Box::pin(async move {
            self.page()?;
            if self.storage_fails {
                return Err(BrowserError::Driver("javascript error".into()));
            }
            Ok(self.storage.clone())
        })
    }

    fn screenshot(&mut self) -> BrowserFuture<'_, Vec<u8>> {
        Box::pin(async move {
            let page = self.page()?;
            if self.screenshot_fails {
                return Err(BrowserError::Driver("screenshot unavailable".into()));
            }
            Ok(format!("png:{}", page.url).into_bytes())
        })
    }

    fn close(&mut self) -> BrowserFuture<'_, ()> {
        Box::pin(async move {
            self.actions.push("close".into());
            self.closed = true;
            Ok(())
        })
    }
}

/// [`CommandRunner`] answering from a queue of canned results.
///
/// An exhausted queue answers with a launch failure.
#[derive(Debug, Default)]
pub struct ScriptedRunner {
    responses: Mutex<VecDeque<Result<CommandOutput, RunError>>>,
    calls: Mutex<Vec<CommandSpec>>,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

impl ScriptedRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn then(self, response: Result<CommandOutput, RunError>) -> Self {
        lock(&self.responses).push_back(response);
        self
    }

    pub fn then_output(self, code: Option<i32>, stdout: &str, stderr: &str) -> Self {
        self.then(Ok(CommandOutput { code, stdout: stdout.to_owned(), stderr: stderr.to_owned() }))
    }

    pub fn then_ok(self, stdout: impl Into<String>) -> Self {
        self.then(Ok(CommandOutput { code: Some(0), stdout: stdout.into(), stderr: String::new() }))
    }

    pub fn then_exit(self, code: i32, stderr: &str) -> Self {
        self.then_output(Some(code), "", stderr)
    }

    pub fn then_timeout(self) -> Self {
        self.then(Err(RunError::TimedOut(Duration::ZERO)))
    }

    /// Every invocation so far, in order.
    pub fn calls(&self) -> Vec<CommandSpec> {
        lock(&self.calls).clone()
    }
}

impl CommandRunner for ScriptedRunner {
    fn run<'a>(
        &'a self,
        spec: &'a CommandSpec,
        timeout: Duration,
    ) -> Pin<Box<dyn Future<Output = Result<CommandOutput, RunError>> + Send + 'a>> {
        Box::pin(async move {
            lock(&self.calls).push(spec.clone());
            match lock(&self.responses).pop_front() {
                Some(Err(RunError::TimedOut(_))) => Err(RunError::TimedOut(timeout)),
                Some(response) => response,
                None => Err(RunError::Spawn(format!("no scripted response for {}", spec.display()))),
            }
        })
    }
}

/// Assert that an expression evaluates to `Err` whose Display output
/// contains the given substring.
#[macro_export]
macro_rules! assert_err_contains {
    ($expr:expr, $substr:expr) => {{
        let result = $expr;
        let err = result.expect_err(concat!("expected Err for: ", stringify!($expr)));
        let msg = err.to_string();
        assert!(msg.contains($substr), "expected error containing {:?}, got: {msg:?}", $substr);
    }};
}
