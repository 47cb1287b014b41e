//! Chromium-backed driver using chromiumoxide.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::network::EventRequestWillBeSent;
use chromiumoxide::page::Page;
use futures::StreamExt;
use serde_json::Value;

use super::{find_browser_executable, BrowserDriver, CapturedRequest, PageSession, PageVisit};

/// Headless Chromium shared by all runs; each run opens its own page.
pub struct ChromiumBrowser {
    browser: Browser,
    active_pages: Arc<AtomicUsize>,
}

impl ChromiumBrowser {
    /// Launch a headless instance, discovering the executable via
    /// `HARVEST_CHROMIUM_PATH`, `$PATH`, or the usual install locations.
    pub async fn launch() -> Result<Self> {
        let executable = find_browser_executable()
            .context("Chromium not found; set HARVEST_CHROMIUM_PATH or install Chrome")?;

        let config = BrowserConfig::builder()
            .chrome_executable(executable)
            .arg("--headless=new")
            .arg("--disable-gpu")
            .arg("--no-sandbox")
            .arg("--disable-dev-shm-usage")
            .arg("--disable-extensions")
            .arg("--disable-background-networking")
            .build()
            .map_err(|e| anyhow::anyhow!("failed to build browser config: {e}"))?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .context("failed to launch Chromium")?;

        tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                let _ = event;
            }
        });

        Ok(Self {
            browser,
            active_pages: Arc::new(AtomicUsize::new(0)),
        })
    }

    pub fn active_pages(&self) -> usize {
        self.active_pages.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl BrowserDriver for ChromiumBrowser {
    fn name(&self) -> &'static str {
        "chromium"
    }

    fn is_available(&self) -> bool {
        true
    }

    async fn open_page(&self) -> Result<Box<dyn PageSession>> {
        let page = self
            .browser
            .new_page("about:blank")
            .await
            .context("failed to create new page")?;

        self.active_pages.fetch_add(1, Ordering::Relaxed);

        Ok(Box::new(ChromiumSession {
            page,
            active_pages: Arc::clone(&self.active_pages),
            captured: Arc::new(Mutex::new(Vec::new())),
            capturing: false,
        }))
    }

    async fn shutdown(&self) -> Result<()> {
        // The launched process exits when the Browser handle is dropped.
        Ok(())
    }
}

/// One Chromium page owned by a single run.
pub struct ChromiumSession {
    page: Page,
    active_pages: Arc<AtomicUsize>,
    captured: Arc<Mutex<Vec<CapturedRequest>>>,
    capturing: bool,
}

#[async_trait]
impl PageSession for ChromiumSession {
    async fn navigate(&mut self, url: &str, timeout_ms: u64) -> Result<PageVisit> {
        let result = tokio::time::timeout(
            Duration::from_millis(timeout_ms),
            self.page.goto(url),
        )
        .await;

        match result {
            Ok(Ok(_response)) => {
                let _ = self.page.wait_for_navigation().await;

                let final_url = self
                    .page
                    .url()
                    .await
                    .unwrap_or_default()
                    .map(|u| u.to_string())
                    .unwrap_or_else(|| url.to_string());
                let content = read_html(&self.page).await.unwrap_or_default();

                Ok(PageVisit { final_url, content })
            }
            Ok(Err(e)) => bail!("navigation failed: {e}"),
            Err(_) => bail!("navigation timed out after {timeout_ms}ms"),
        }
    }

    async fn execute_js(&mut self, js: &str) -> Result<Value> {
        let result = self.page.evaluate(js).await.context("JS execution failed")?;
        result
            .into_value()
            .map_err(|e| anyhow::anyhow!("failed to convert JS result: {e:?}"))
    }

    async fn content(&mut self) -> Result<String> {
        read_html(&self.page).await
    }

    async fn current_url(&self) -> Result<String> {
        let url = self
            .page
            .url()
            .await
            .context("failed to get URL")?
            .map(|u| u.to_string())
            .unwrap_or_default();
        Ok(url)
    }

    async fn begin_request_capture(&mut self) -> Result<()> {
        if self.capturing {
            return Ok(());
        }

        let mut events = self
            .page
            .event_listener::<EventRequestWillBeSent>()
            .await
            .context("failed to attach network listener")?;
        let sink = Arc::clone(&self.captured);

        // Listener runs until the page closes and its stream ends.
        tokio::spawn(async move {
            while let Some(event) = events.next().await {
                let request = CapturedRequest {
                    url: event.request.url.clone(),
                    method: event.request.method.clone(),
                };
                if let Ok(mut sink) = sink.lock() {
                    sink.push(request);
                }
            }
        });

        self.capturing = true;
        Ok(())
    }

    async fn captured_requests(&self) -> Result<Vec<CapturedRequest>> {
        let captured = self
            .captured
            .lock()
            .map_err(|_| anyhow::anyhow!("capture buffer poisoned"))?;
        Ok(captured.clone())
    }

    async fn close(self: Box<Self>) -> Result<()> {
        self.active_pages.fetch_sub(1, Ordering::Relaxed);
        let _ = self.page.close().await;
        Ok(())
    }
}

async fn read_html(page: &Page) -> Result<String> {
    let result = page
        .evaluate("document.documentElement.outerHTML")
        .await
        .context("failed to get HTML")?;
    result
        .into_value()
        .map_err(|e| anyhow::anyhow!("failed to convert HTML result: {e:?}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    #[ignore] // Requires Chromium to be installed
    async fn navigate_evaluate_and_close() {
        let driver = ChromiumBrowser::launch().await.expect("failed to launch");
        let mut session = driver.open_page().await.expect("failed to open page");

        let visit = session
            .navigate("data:text/html,<h1>Hello</h1><ul><li>a</li><li>b</li></ul>", 10_000)
            .await
            .expect("navigation failed");
        assert!(visit.content.contains("<h1>Hello</h1>"));

        let items = session
            .execute_js("document.querySelectorAll('li').length")
            .await
            .expect("JS execution failed");
        assert_eq!(items.as_u64(), Some(2));

        session.close().await.expect("close failed");
        assert_eq!(driver.active_pages(), 0);
        driver.shutdown().await.expect("shutdown failed");
    }
}
