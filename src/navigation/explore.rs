//! Bounded link exploration for open-ended research against a single site.

use std::collections::HashSet;

use anyhow::{anyhow, Result};
use scraper::{Html, Selector};
use url::Url;

use crate::acquisition::structured::{clean_text, resolve_href};
use crate::acquisition::HttpClient;
use crate::engine::RunContext;
use crate::strategy::ExploreRule;

const MAX_CANDIDATES: usize = 25;

/// Same-host links ranked by keyword affinity. A keyword in the path scores
/// higher than one in the link text; unrelated links are dropped.
pub fn candidate_links(html: &str, base_url: &str, keywords: &[&str]) -> Vec<String> {
    let document = Html::parse_document(html);
    let sel = Selector::parse("a[href]").unwrap();

    let mut scored: Vec<(u32, String)> = Vec::new();
    let mut seen = HashSet::new();
    for element in document.select(&sel) {
        let Some(href) = element.value().attr("href") else {
            continue;
        };
        let Some(resolved) = resolve_href(base_url, href) else {
            continue;
        };
        if !same_host(base_url, &resolved) || !seen.insert(resolved.clone()) {
            continue;
        }

        let text = clean_text(&element.text().collect::<Vec<_>>().join(" ")).to_lowercase();
        let path = resolved.to_lowercase();
        let mut score = 0u32;
        for keyword in keywords {
            if path.contains(keyword) {
                score += 2;
            }
            if text.contains(keyword) {
                score += 1;
            }
        }
        if score > 0 {
            scored.push((score, resolved));
        }
    }

    scored.sort_by(|a, b| b.0.cmp(&a.0));
    scored
        .into_iter()
        .take(MAX_CANDIDATES)
        .map(|(_, url)| url)
        .collect()
}

/// Walk outward from `start_url`, visiting the most promising same-host
/// links until the page cap, iteration cap, progress stall, or run budget
/// stops it. Returns `(url, body)` for every fetched page, the entry page
/// first.
pub async fn explore_site(
    http: &HttpClient,
    start_url: &str,
    rule: &ExploreRule,
    keywords: &[&str],
    ctx: &RunContext,
) -> Result<Vec<(String, String)>> {
    let step_ms = ctx.step_timeout().as_millis() as u64;
    let entry = http
        .get(start_url, step_ms)
        .await
        .map_err(|e| anyhow!("entry page fetch failed: {e}"))?;
    if !entry.is_success() {
        return Err(anyhow!("entry page {start_url} answered {}", entry.status));
    }

    let mut frontier = candidate_links(&entry.body, &entry.final_url, keywords);
    let mut visited: HashSet<String> = HashSet::from([start_url.to_string(), entry.final_url.clone()]);
    let mut pages = vec![(entry.final_url.clone(), entry.body)];
    let mut stalled = 0u32;

    for _ in 0..rule.max_iterations {
        if ctx.expired() || pages.len() >= rule.max_pages as usize {
            break;
        }
        let Some(next) = frontier.iter().find(|u| !visited.contains(*u)).cloned() else {
            break;
        };
        visited.insert(next.clone());

        let page = match http.get(&next, ctx.step_timeout().as_millis() as u64).await {
            Ok(page) if page.is_success() => page,
            _ => {
                stalled += 1;
                if stalled >= rule.no_progress_limit {
                    break;
                }
                continue;
            }
        };

        let body_lower = page.body.to_lowercase();
        if keywords.iter().any(|k| body_lower.contains(k)) {
            stalled = 0;
        } else {
            stalled += 1;
        }

        let more = candidate_links(&page.body, &page.final_url, keywords);
        pages.push((page.final_url, page.body));
        for link in more {
            if !visited.contains(&link) && !frontier.contains(&link) {
                frontier.push(link);
            }
        }

        if stalled >= rule.no_progress_limit {
            break;
        }
    }

    tracing::debug!("explored {} pages from {start_url}", pages.len());
    Ok(pages)
}

fn same_host(base_url: &str, candidate: &str) -> bool {
    let host = |u: &str| {
        Url::parse(u)
            .ok()
            .and_then(|p| p.host_str().map(|h| h.trim_start_matches("www.").to_string()))
    };
    match (host(base_url), host(candidate)) {
        (Some(a), Some(b)) => a == b,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn links_are_ranked_by_keyword_affinity_and_host_filtered() {
        let html = r#"
            <a href="/pricing">Pricing</a>
            <a href="/blog/post-1">Latest pricing news</a>
            <a href="https://other-site.com/pricing">Partner pricing</a>
            <a href="/legal">Legal</a>"#;
        let links = candidate_links(html, "https://www.acme.dev/", &["pricing"]);
        assert_eq!(
            links,
            vec![
                "https://www.acme.dev/pricing".to_string(),
                "https://www.acme.dev/blog/post-1".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn walk_visits_promising_links_and_respects_the_page_cap() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"<a href="/about">About the team</a> <a href="/products">Products</a>"#,
            ))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/about"))
            .respond_with(
                ResponseTemplate::new(200).set_body_string("<p>Our team builds products</p>"),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/products"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<p>Product catalog</p>"))
            .mount(&server)
            .await;

        let http = HttpClient::new(5_000);
        let ctx = RunContext::new("explore-test", Duration::from_secs(10));
        let rule = ExploreRule {
            max_iterations: 8,
            no_progress_limit: 3,
            max_pages: 2,
        };
        let pages = explore_site(&http, &server.uri(), &rule, &["team", "product"], &ctx)
            .await
            .unwrap();

        assert_eq!(pages.len(), 2);
        assert!(pages[0].0.ends_with('/'));
        assert!(pages[1].0.ends_with("/about") || pages[1].0.ends_with("/products"));
    }
}
