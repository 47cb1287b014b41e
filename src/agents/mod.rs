//! Built-in extraction agents.
//!
//! Every agent is an [`AgentRunner`] plus a descriptor built in its module's
//! `descriptor()` (AppSumo contributes two descriptors over one runner).
//! Runners share the plumbing here: page acquisition with HTTP fallback,
//! model-assisted record extraction, and URL normalization.

pub mod airtable;
pub mod appsumo;
pub mod betalist;
pub mod futuretools;
pub mod product_hunt;
pub mod product_research;
pub mod startup_listing;
pub mod stationf;
pub mod universal_startups;
pub mod zone_secure;

use std::sync::Arc;

use anyhow::{bail, Result};

use crate::acquisition::{
    extract_json_block, parse_markdown_records, records_from_json, HttpClient, MarkdownRecord,
};
use crate::browser::BrowserDriver;
use crate::engine::RunContext;
use crate::error::EngineError;
use crate::llm::LlmClient;
use crate::navigation::scroll_to_bottom;
use crate::registry::Registry;
use crate::schema::FieldSpec;
use crate::strategy::ScrollRule;

/// Capabilities handed to every runner. Cloning is cheap; the browser and
/// model backends are shared.
#[derive(Clone)]
pub struct AgentDeps {
    pub http: HttpClient,
    pub browser: Arc<dyn BrowserDriver>,
    pub llm: Arc<dyn LlmClient>,
}

impl AgentDeps {
    pub fn new(
        http: HttpClient,
        browser: Arc<dyn BrowserDriver>,
        llm: Arc<dyn LlmClient>,
    ) -> Self {
        Self { http, browser, llm }
    }
}

/// Register every built-in agent. Called once at startup; any error here is
/// a configuration bug and aborts service start.
pub fn register_builtin(registry: &mut Registry, deps: &AgentDeps) -> Result<(), EngineError> {
    registry.register(product_research::descriptor(deps.clone()))?;
    registry.register(startup_listing::descriptor(deps.clone()))?;
    registry.register(universal_startups::descriptor(deps.clone()))?;
    registry.register(product_hunt::descriptor(deps.clone()))?;
    registry.register(futuretools::descriptor(deps.clone()))?;
    registry.register(appsumo::hot_descriptor(deps.clone()))?;
    registry.register(appsumo::new_descriptor(deps.clone()))?;
    registry.register(betalist::descriptor(deps.clone()))?;
    registry.register(stationf::descriptor(deps.clone()))?;
    registry.register(zone_secure::descriptor(deps.clone()))?;
    registry.register(airtable::descriptor(deps.clone()))?;
    Ok(())
}

/// A page obtained for extraction, rendered when a browser was available.
pub(crate) struct PageCapture {
    pub final_url: String,
    pub html: String,
    pub rendered: bool,
}

/// Fetch `url`, preferring the browser (with an optional scroll pass) and
/// falling back to plain HTTP when no browser is available or navigation
/// fails. Listing pages still parse over HTTP, just with fewer items.
pub(crate) async fn acquire_page(
    deps: &AgentDeps,
    url: &str,
    ctx: &RunContext,
    scroll: Option<&ScrollRule>,
) -> Result<PageCapture> {
    let step_ms = ctx.step_timeout().as_millis() as u64;

    match deps.browser.open_page().await {
        Ok(mut session) => {
            match session.navigate(url, step_ms).await {
                Ok(visit) => {
                    if let Some(rule) = scroll {
                        if let Err(err) = scroll_to_bottom(session.as_mut(), rule, ctx).await {
                            tracing::debug!("scroll pass on {url} stopped early: {err:#}");
                        }
                    }
                    let html = match session.content().await {
                        Ok(html) => html,
                        Err(_) => visit.content,
                    };
                    let final_url = session
                        .current_url()
                        .await
                        .unwrap_or_else(|_| visit.final_url.clone());
                    let _ = session.close().await;
                    return Ok(PageCapture {
                        final_url,
                        html,
                        rendered: true,
                    });
                }
                Err(err) => {
                    tracing::warn!("navigation to {url} failed ({err:#}), retrying over HTTP");
                    let _ = session.close().await;
                }
            }
        }
        Err(err) => {
            tracing::debug!("no browser for {url} ({err:#}), fetching over HTTP");
        }
    }

    let response = deps.http.get(url, step_ms).await?;
    if !response.is_success() {
        bail!("{url} answered {}", response.status);
    }
    Ok(PageCapture {
        final_url: response.final_url,
        html: response.body,
        rendered: false,
    })
}

/// Ask the completion backend to restructure page content into records.
/// Unavailable or failing backends yield no records; callers treat model
/// output as a supplement to structural extraction, never a requirement.
pub(crate) async fn model_records(
    deps: &AgentDeps,
    ctx: &RunContext,
    prompt: &str,
) -> Vec<MarkdownRecord> {
    if !deps.llm.is_available() || ctx.expired() {
        return Vec::new();
    }
    let timeout_ms = ctx.model_timeout().as_millis() as u64;
    let answer = match deps.llm.complete(prompt, timeout_ms).await {
        Ok(answer) => answer,
        Err(err) => {
            tracing::warn!("completion backend failed, continuing without it: {err:#}");
            return Vec::new();
        }
    };

    if let Some(value) = extract_json_block(&answer) {
        let records = records_from_json(&value);
        if !records.is_empty() {
            return records;
        }
    }
    parse_markdown_records(&answer)
}

/// A LinkedIn profile URL, or nothing. Model output and scraped hrefs both
/// pass through here so reports never carry a made-up LinkedIn link.
pub(crate) fn normalize_linkedin(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    let candidate = if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
        trimmed.to_string()
    } else if trimmed.starts_with("linkedin.com") || trimmed.starts_with("www.linkedin.com") {
        format!("https://{trimmed}")
    } else {
        return None;
    };

    let parsed = url::Url::parse(&candidate).ok()?;
    let host = parsed.host_str()?;
    if host == "linkedin.com" || host.ends_with(".linkedin.com") {
        Some(candidate)
    } else {
        None
    }
}

/// Input field accepted by every agent: where to persist the report.
pub(crate) fn output_path_field() -> FieldSpec {
    FieldSpec::text("output_path").describe("Filesystem path to write the report JSON to")
}

/// Truncate page text for a model prompt without splitting a char.
pub(crate) fn prompt_excerpt(text: &str, max_chars: usize) -> String {
    crate::acquisition::structured::truncate(text, max_chars)
}

#[cfg(test)]
pub(crate) fn test_deps() -> AgentDeps {
    AgentDeps::new(
        HttpClient::new(5_000),
        Arc::new(crate::browser::NoopBrowser),
        Arc::new(crate::llm::NoopLlm),
    )
}
