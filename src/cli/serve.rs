//! Start the harvest HTTP service.

use std::sync::Arc;

use anyhow::Result;
use tracing::{info, warn};

use crate::agents::{self, AgentDeps};
use crate::audit::{self, AuditLogger};
use crate::browser::{BrowserDriver, ChromiumBrowser, NoopBrowser};
use crate::engine::Engine;
use crate::events::EventBus;
use crate::llm;
use crate::registry::Registry;
use crate::rest::{self, AppState};

/// Default service port.
pub const DEFAULT_PORT: u16 = 5009;

/// Per-request timeout for plain HTTP fetches.
const HTTP_TIMEOUT_MS: u64 = 30_000;

/// Everything a command needs to execute agents.
pub struct RuntimeParts {
    pub registry: Arc<Registry>,
    pub engine: Engine,
    pub events: EventBus,
    pub browser: Arc<dyn BrowserDriver>,
}

/// Bring up the browser and model backends, register the built-in agents,
/// and attach the audit log. Missing backends degrade, never abort: without
/// a browser the service runs HTTP-only, without a model key exploratory
/// agents fall back to structural extraction.
pub async fn build_runtime(http_only: bool) -> Result<RuntimeParts> {
    let browser: Arc<dyn BrowserDriver> = if http_only {
        info!("browser startup skipped (--http-only)");
        Arc::new(NoopBrowser)
    } else {
        match ChromiumBrowser::launch().await {
            Ok(browser) => {
                info!("Chromium browser launched");
                Arc::new(browser)
            }
            Err(err) => {
                warn!("Chromium unavailable ({err:#}); running in HTTP-only mode");
                Arc::new(NoopBrowser)
            }
        }
    };

    let llm = llm::from_env();
    if llm.is_available() {
        info!("completion backend: {}", llm.name());
    } else {
        warn!("no completion backend configured; exploratory agents use structural extraction only");
    }

    let deps = AgentDeps::new(
        crate::acquisition::HttpClient::new(HTTP_TIMEOUT_MS),
        Arc::clone(&browser),
        llm,
    );
    let mut registry = Registry::new();
    agents::register_builtin(&mut registry, &deps)?;
    let registry = Arc::new(registry);

    let events = EventBus::new();
    match AuditLogger::open_default() {
        Ok(logger) => {
            audit::attach(&events, logger);
        }
        Err(err) => warn!("audit log disabled: {err:#}"),
    }

    let engine = Engine::new(Arc::clone(&registry), events.clone());
    Ok(RuntimeParts {
        registry,
        engine,
        events,
        browser,
    })
}

/// `harvest serve`: run the HTTP service until ctrl-c.
pub async fn run(port: u16, http_only: bool) -> Result<()> {
    let parts = build_runtime(http_only).await?;
    info!(
        "harvest v{} starting with {} agents",
        env!("CARGO_PKG_VERSION"),
        parts.registry.len()
    );

    let state = Arc::new(AppState::new(
        parts.engine,
        Arc::clone(&parts.registry),
        parts.events.clone(),
    ));
    let result = rest::serve(port, state).await;

    if let Err(err) = parts.browser.shutdown().await {
        warn!("browser shutdown: {err:#}");
    }
    result
}
