//! Structural extraction from fetched or rendered HTML.
//!
//! Listing pages almost always render their records as repeated sibling
//! structures (cards, rows, list items). [`extract_listing_items`] finds the
//! densest repeated structure and lifts one record per element, which is
//! enough for strategies that must keep working when no model is available.

use scraper::{ElementRef, Html, Selector};
use serde_json::Value;
use url::Url;

/// One record lifted from a repeated page structure.
#[derive(Debug, Clone, PartialEq)]
pub struct ListingItem {
    pub name: String,
    pub url: Option<String>,
    pub description: Option<String>,
}

/// Page-level facts from meta tags, OpenGraph, and JSON-LD.
#[derive(Debug, Clone, Default)]
pub struct MetaSummary {
    pub title: Option<String>,
    pub site_name: Option<String>,
    pub description: Option<String>,
    pub image: Option<String>,
    pub canonical: Option<String>,
    /// Organization name from JSON-LD, when declared.
    pub organization: Option<String>,
    pub logo: Option<String>,
    /// `sameAs` profile links from JSON-LD (social profiles and the like).
    pub same_as: Vec<String>,
}

impl MetaSummary {
    /// First `sameAs` link hosted on linkedin.com, if any.
    pub fn linkedin(&self) -> Option<&str> {
        self.same_as
            .iter()
            .find(|u| {
                Url::parse(u)
                    .ok()
                    .and_then(|p| p.host_str().map(|h| h.ends_with("linkedin.com")))
                    .unwrap_or(false)
            })
            .map(|s| s.as_str())
    }
}

const CONTAINER_SELECTORS: &[&str] = &[
    "article",
    "li",
    "div[class*='card']",
    "div[class*='item']",
    "div[class*='tool']",
    "tr",
];

/// Minimum repeated elements before a structure counts as a listing.
const MIN_REPEAT: usize = 3;

/// Find the densest repeated structure and lift one item per element.
/// Items are deduplicated by case-folded name, first occurrence wins.
pub fn extract_listing_items(html: &str, base_url: &str) -> Vec<ListingItem> {
    let document = Html::parse_document(html);

    let mut best: Vec<ListingItem> = Vec::new();
    for selector in CONTAINER_SELECTORS {
        let Ok(sel) = Selector::parse(selector) else {
            continue;
        };
        let mut items = Vec::new();
        for element in document.select(&sel) {
            if let Some(item) = lift_item(element, base_url) {
                items.push(item);
            }
        }
        let items = dedup_by_name(items);
        if items.len() > best.len() {
            best = items;
        }
    }

    if best.len() >= MIN_REPEAT {
        return best;
    }

    // Sparse page: fall back to named links.
    let link_sel = Selector::parse("a[href]").unwrap();
    let mut items = Vec::new();
    for element in document.select(&link_sel) {
        let name = clean_text(&text_of(element));
        if !plausible_name(&name) {
            continue;
        }
        let url = element
            .value()
            .attr("href")
            .and_then(|href| resolve_href(base_url, href));
        items.push(ListingItem {
            name,
            url,
            description: None,
        });
    }
    dedup_by_name(items)
}

fn lift_item(element: ElementRef, base_url: &str) -> Option<ListingItem> {
    let name_sel = Selector::parse("h1, h2, h3, h4, strong, a").unwrap();
    let name = element
        .select(&name_sel)
        .map(|el| clean_text(&text_of(el)))
        .find(|text| plausible_name(text))?;

    let link_sel = Selector::parse("a[href]").unwrap();
    let url = element
        .select(&link_sel)
        .filter_map(|el| el.value().attr("href"))
        .find_map(|href| resolve_href(base_url, href));

    let mut description = None;
    if let Ok(sel) = Selector::parse("p") {
        description = element
            .select(&sel)
            .map(|el| clean_text(&text_of(el)))
            .find(|text| text.len() > 10)
            .map(|text| truncate(&text, 500));
    }

    Some(ListingItem {
        name,
        url,
        description,
    })
}

/// Title, meta description, OpenGraph, canonical link, and any JSON-LD
/// Organization facts on the page.
pub fn extract_meta_summary(html: &str) -> MetaSummary {
    let document = Html::parse_document(html);
    let mut summary = MetaSummary::default();

    if let Ok(sel) = Selector::parse("title") {
        summary.title = document
            .select(&sel)
            .next()
            .map(|el| clean_text(&text_of(el)))
            .filter(|t| !t.is_empty());
    }
    if let Ok(sel) = Selector::parse(r#"meta[name="description"]"#) {
        summary.description = document
            .select(&sel)
            .next()
            .and_then(|el| el.value().attr("content"))
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());
    }
    if let Ok(sel) = Selector::parse(r#"link[rel="canonical"]"#) {
        summary.canonical = document
            .select(&sel)
            .next()
            .and_then(|el| el.value().attr("href"))
            .map(|s| s.to_string());
    }

    let og_sel = Selector::parse(r#"meta[property^="og:"]"#).unwrap();
    for element in document.select(&og_sel) {
        let property = element.value().attr("property").unwrap_or("");
        let content = element.value().attr("content").unwrap_or("").trim();
        if content.is_empty() {
            continue;
        }
        match property {
            "og:site_name" => summary.site_name = Some(content.to_string()),
            "og:title" if summary.title.is_none() => summary.title = Some(content.to_string()),
            "og:description" if summary.description.is_none() => {
                summary.description = Some(content.to_string())
            }
            "og:image" => summary.image = Some(content.to_string()),
            _ => {}
        }
    }

    for value in extract_json_ld(&document) {
        apply_organization(&value, &mut summary);
    }

    summary
}

fn extract_json_ld(document: &Html) -> Vec<Value> {
    let sel = Selector::parse(r#"script[type="application/ld+json"]"#).unwrap();
    let mut values = Vec::new();
    for element in document.select(&sel) {
        let text: String = element.text().collect();
        if let Ok(value) = serde_json::from_str::<Value>(&text) {
            match value {
                Value::Array(items) => values.extend(items),
                other => values.push(other),
            }
        }
    }
    values
}

fn apply_organization(value: &Value, summary: &mut MetaSummary) {
    if let Some(graph) = value.get("@graph").and_then(|g| g.as_array()) {
        for node in graph {
            apply_organization(node, summary);
        }
        return;
    }

    let ld_type = value.get("@type").and_then(|t| t.as_str()).unwrap_or("");
    if ld_type != "Organization" && ld_type != "Corporation" {
        return;
    }

    if summary.organization.is_none() {
        summary.organization = value
            .get("name")
            .and_then(|n| n.as_str())
            .map(|s| s.to_string());
    }
    if summary.logo.is_none() {
        summary.logo = match value.get("logo") {
            Some(Value::String(s)) => Some(s.clone()),
            Some(Value::Object(o)) => o.get("url").and_then(|u| u.as_str()).map(String::from),
            _ => None,
        };
    }
    if let Some(links) = value.get("sameAs").and_then(|s| s.as_array()) {
        for link in links.iter().filter_map(|l| l.as_str()) {
            if !summary.same_as.iter().any(|u| u == link) {
                summary.same_as.push(link.to_string());
            }
        }
    }
}

/// Resolve an href against the page URL, dropping non-navigable schemes.
pub fn resolve_href(base_url: &str, href: &str) -> Option<String> {
    let href = href.trim();
    if href.is_empty()
        || href.starts_with('#')
        || href.starts_with("javascript:")
        || href.starts_with("mailto:")
    {
        return None;
    }
    let base = Url::parse(base_url).ok()?;
    let joined = base.join(href).ok()?;
    match joined.scheme() {
        "http" | "https" => Some(joined.to_string()),
        _ => None,
    }
}

fn dedup_by_name(items: Vec<ListingItem>) -> Vec<ListingItem> {
    let mut seen = std::collections::HashSet::new();
    items
        .into_iter()
        .filter(|item| seen.insert(item.name.to_lowercase()))
        .collect()
}

fn plausible_name(text: &str) -> bool {
    let len = text.chars().count();
    (2..=120).contains(&len) && text.chars().any(|c| c.is_alphanumeric())
}

fn text_of(element: ElementRef) -> String {
    element.text().collect::<Vec<_>>().join(" ")
}

/// Collapse runs of whitespace into single spaces.
pub fn clean_text(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

pub fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    text.chars().take(max_chars).collect()
}
