//! Browser capability layer.
//!
//! Runners talk to a [`BrowserDriver`] and [`PageSession`], never to
//! chromiumoxide directly, so the whole engine keeps working in HTTP-only
//! mode with the [`NoopBrowser`] standing in. Strategies that genuinely need
//! a rendered page (scroll, interception) fail inside their runner and the
//! engine degrades the run to a partial outcome.

mod chromium;

pub use chromium::ChromiumBrowser;

use std::path::PathBuf;

use anyhow::{bail, Result};
use async_trait::async_trait;
use serde_json::Value;

/// Outcome of one navigation.
#[derive(Debug, Clone)]
pub struct PageVisit {
    /// URL after redirects and client-side routing.
    pub final_url: String,
    /// Rendered HTML.
    pub content: String,
}

/// A background request observed while a page was loading.
#[derive(Debug, Clone)]
pub struct CapturedRequest {
    pub url: String,
    pub method: String,
}

/// A launched browser able to hand out page sessions.
#[async_trait]
pub trait BrowserDriver: Send + Sync {
    fn name(&self) -> &'static str;

    fn is_available(&self) -> bool;

    async fn open_page(&self) -> Result<Box<dyn PageSession>>;

    async fn shutdown(&self) -> Result<()>;
}

/// One live page. Sessions are owned by a single run and never shared.
#[async_trait]
pub trait PageSession: Send {
    /// Navigate and wait for the page to settle, bounded by `timeout_ms`.
    async fn navigate(&mut self, url: &str, timeout_ms: u64) -> Result<PageVisit>;

    /// Evaluate a JS expression, returning its JSON value.
    async fn execute_js(&mut self, js: &str) -> Result<Value>;

    /// Current rendered HTML, re-read after scripted interaction.
    async fn content(&mut self) -> Result<String>;

    async fn current_url(&self) -> Result<String>;

    /// Start recording outbound requests the page makes. Idempotent.
    async fn begin_request_capture(&mut self) -> Result<()>;

    /// Requests recorded since capture began.
    async fn captured_requests(&self) -> Result<Vec<CapturedRequest>>;

    async fn close(self: Box<Self>) -> Result<()>;
}

impl std::fmt::Debug for dyn PageSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("<dyn PageSession>")
    }
}

/// Stand-in driver for HTTP-only mode: reports unavailable and refuses to
/// open pages.
pub struct NoopBrowser;

#[async_trait]
impl BrowserDriver for NoopBrowser {
    fn name(&self) -> &'static str {
        "noop"
    }

    fn is_available(&self) -> bool {
        false
    }

    async fn open_page(&self) -> Result<Box<dyn PageSession>> {
        bail!("browser not available: running in HTTP-only mode")
    }

    async fn shutdown(&self) -> Result<()> {
        Ok(())
    }
}

/// Locate a Chromium-family executable: `HARVEST_CHROMIUM_PATH` override
/// first, then `$PATH`, then the usual install locations.
pub fn find_browser_executable() -> Option<PathBuf> {
    if let Ok(path) = std::env::var("HARVEST_CHROMIUM_PATH") {
        let path = PathBuf::from(path);
        if path.exists() {
            return Some(path);
        }
    }

    for name in [
        "chromium",
        "chromium-browser",
        "google-chrome",
        "google-chrome-stable",
        "chrome",
    ] {
        if let Ok(path) = which::which(name) {
            return Some(path);
        }
    }

    for fixed in [
        "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
        "/Applications/Chromium.app/Contents/MacOS/Chromium",
        "/usr/bin/chromium",
        "/usr/bin/google-chrome",
    ] {
        let path = PathBuf::from(fixed);
        if path.exists() {
            return Some(path);
        }
    }

    None
}
