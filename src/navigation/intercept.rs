//! Request capture for pages that load their data through background calls.
//!
//! The page is navigated with capture enabled, left alone while it issues
//! its XHR traffic, and the observed requests are then sieved for the data
//! endpoint. Marker matching comes first; when the rule carries no markers,
//! a generic API-shape heuristic applies.

use std::time::Duration;

use anyhow::Result;

use crate::browser::{CapturedRequest, PageSession};
use crate::engine::RunContext;
use crate::strategy::InterceptRule;

/// Navigate `url` with request capture on and return the observed requests
/// that look like the page's data endpoint, in observation order.
pub async fn capture_api_requests(
    session: &mut dyn PageSession,
    url: &str,
    rule: &InterceptRule,
    ctx: &RunContext,
) -> Result<Vec<CapturedRequest>> {
    session.begin_request_capture().await?;
    session.navigate(url, ctx.step_timeout().as_millis() as u64).await?;

    let settle = Duration::from_millis(rule.settle_ms).min(ctx.remaining());
    tokio::time::sleep(settle).await;

    let requests = session.captured_requests().await?;
    let matched: Vec<CapturedRequest> = requests
        .into_iter()
        .filter(|r| {
            if rule.url_markers.is_empty() {
                looks_like_api(&r.url)
            } else {
                matches_markers(&r.url, &rule.url_markers)
            }
        })
        .collect();

    tracing::debug!("request capture on {url} kept {} candidates", matched.len());
    Ok(matched)
}

/// Substring match against the rule's markers.
pub fn matches_markers(url: &str, markers: &[String]) -> bool {
    markers.iter().any(|m| url.contains(m.as_str()))
}

/// Generic data-endpoint shapes: JSON paths, `/api/` segments, GraphQL.
pub fn looks_like_api(url: &str) -> bool {
    let lower = url.to_lowercase();
    let path = lower.split('?').next().unwrap_or(&lower);
    path.contains("/api/")
        || path.contains("/graphql")
        || path.ends_with(".json")
        || path.contains("/v1/")
        || path.contains("/v2/")
        || path.contains("/v0.3/")
}
