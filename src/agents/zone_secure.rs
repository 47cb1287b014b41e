//! Zone Secure flipbook agent.
//!
//! The source is a paginated document viewer addressed by `#page=N`
//! fragments. Each page is fetched separately; traversal stops on the page
//! cap, the startup cap, a repeating page body, or two empty pages in a
//! row. Flipbook chrome (nav labels, section titles) is filtered out by a
//! name blocklist and a short-name heuristic.

use std::collections::HashSet;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use scraper::{ElementRef, Html, Selector};
use serde_json::{Map, Value};

use crate::acquisition::structured::clean_text;
use crate::agents::{acquire_page, output_path_field, AgentDeps};
use crate::engine::RunContext;
use crate::navigation::{page_url, RepeatDetector};
use crate::registry::{AgentDescriptor, AgentRunner};
use crate::report::Report;
use crate::schema::{FieldSpec, Schema, ValidatedInput};
use crate::strategy::{CursorStyle, PaginationRule, StrategyPolicy};

const DEFAULT_URL: &str = "https://fr.zone-secure.net/20412/2540033/#page=1";

const CARD_SELECTORS: [&str; 6] = [
    "article",
    "div[class*='startup']",
    "div[class*='company']",
    "div[class*='card']",
    "div[class*='listing']",
    "li[class*='item']",
];

// Viewer chrome and section headings seen in the document, all French.
const EXCLUDED_NAMES: [&str; 22] = [
    "forum",
    "remerciements",
    "plan",
    "sommaire",
    "rechercher",
    "partager",
    "télécharger",
    "plein écran",
    "onglets",
    "retour au document",
    "toutes les pages",
    "conseil audit",
    "construction & transport",
    "energie environnement",
    "finance banque assurance",
    "formation",
    "it digital",
    "public",
    "production supply chain",
    "santé biotech",
    "start-up",
    "startup",
];

fn pagination_rule() -> PaginationRule {
    PaginationRule {
        cursor: CursorStyle::Fragment {
            name: "page".to_string(),
        },
        max_pages: 80,
    }
}

pub fn descriptor(deps: AgentDeps) -> AgentDescriptor {
    AgentDescriptor {
        name: "zone_secure_startups".to_string(),
        description: "Extract startups from a Zone Secure flipbook document".to_string(),
        input_schema: Schema::of(vec![
            FieldSpec::url("url")
                .default_value(DEFAULT_URL)
                .describe("Zone Secure document to extract from"),
            FieldSpec::integer("max_startups")
                .default_value(10_000)
                .bounds(1, 50_000)
                .describe("Maximum number of startups to capture"),
            output_path_field(),
        ]),
        output_schema: Schema::of(vec![
            FieldSpec::text("source_url").required(),
            FieldSpec::object_list(
                "startups",
                Schema::of(vec![
                    FieldSpec::text("name").required(),
                    FieldSpec::text("description"),
                    FieldSpec::url("website"),
                ]),
            )
            .required(),
            FieldSpec::integer("pages_visited").required(),
        ]),
        strategy: StrategyPolicy::Paginated(pagination_rule()),
        runner: Arc::new(ZoneSecureRunner { deps }),
    }
}

struct ZoneSecureRunner {
    deps: AgentDeps,
}

#[async_trait]
impl AgentRunner for ZoneSecureRunner {
    async fn run(&self, input: &ValidatedInput, ctx: &RunContext) -> Result<Report> {
        let base_url = input.require_str("url")?;
        let cap = input.require_i64("max_startups")? as usize;
        let rule = pagination_rule();

        let mut startups: Vec<Value> = Vec::new();
        let mut seen = HashSet::new();
        let mut detector = RepeatDetector::new();
        let mut pages_visited: i64 = 0;
        let mut empty_streak = 0u32;

        for page_no in 1..=u64::from(rule.max_pages) {
            if ctx.expired() || startups.len() >= cap {
                break;
            }
            let url = page_url(base_url, &rule.cursor, page_no)?;
            let page = match acquire_page(&self.deps, &url, ctx, None).await {
                Ok(page) => page,
                Err(err) => {
                    tracing::warn!("flipbook page {page_no} failed: {err:#}");
                    break;
                }
            };
            if !detector.insert(&page.html) {
                tracing::debug!("flipbook page {page_no} repeats an earlier body, stopping");
                break;
            }
            pages_visited += 1;

            let mut found = 0;
            for startup in parse_page(&page.html, &page.final_url) {
                if startups.len() >= cap {
                    break;
                }
                let key = startup["name"].as_str().unwrap_or_default().to_lowercase();
                if !key.is_empty() && seen.insert(key) {
                    startups.push(startup);
                    found += 1;
                }
            }
            if found == 0 {
                empty_streak += 1;
                if empty_streak >= 2 {
                    break;
                }
            } else {
                empty_streak = 0;
            }
        }

        tracing::info!(
            "zone secure walked {pages_visited} pages, {} startups",
            startups.len()
        );
        let mut out = Map::new();
        out.insert("source_url".to_string(), Value::String(base_url.to_string()));
        out.insert("startups".to_string(), Value::Array(startups));
        out.insert("pages_visited".to_string(), Value::from(pages_visited));
        Ok(Report::new(out))
    }
}

fn parse_page(html: &str, base_url: &str) -> Vec<Value> {
    let doc = Html::parse_document(html);

    for selector in CARD_SELECTORS {
        let sel = Selector::parse(selector).unwrap();
        let cards: Vec<ElementRef<'_>> = doc.select(&sel).collect();
        if cards.is_empty() {
            continue;
        }
        let startups: Vec<Value> = cards
            .into_iter()
            .filter_map(|card| parse_card(card, base_url))
            .collect();
        if !startups.is_empty() {
            return startups;
        }
    }

    // No card markup at all; fall back to headings as name candidates.
    let heading_sel = Selector::parse("h1, h2, h3, h4, h5, h6").unwrap();
    doc.select(&heading_sel)
        .filter_map(|h| {
            let name = clean_text(&h.text().collect::<Vec<_>>().join(" "));
            if name.len() > 1 && !is_navigation_name(&name, false) {
                let mut startup = Map::new();
                startup.insert("name".to_string(), Value::String(name));
                Some(Value::Object(startup))
            } else {
                None
            }
        })
        .collect()
}

fn parse_card(card: ElementRef<'_>, _base_url: &str) -> Option<Value> {
    let name = card_name(card)?;

    let description = card_description(card, &name);
    let website = card_website(card);
    let has_info = description.is_some() || website.is_some();
    if is_navigation_name(&name, has_info) {
        return None;
    }

    let mut startup = Map::new();
    startup.insert("name".to_string(), Value::String(name));
    if let Some(description) = description {
        startup.insert("description".to_string(), Value::String(description));
    }
    if let Some(website) = website {
        startup.insert("website".to_string(), Value::String(website));
    }
    Some(Value::Object(startup))
}

fn card_name(card: ElementRef<'_>) -> Option<String> {
    for selector in [
        "h1, h2, h3, h4, h5, h6",
        "[class*='name']",
        "[class*='title']",
        "[class*='heading']",
        "a",
    ] {
        let sel = Selector::parse(selector).unwrap();
        for el in card.select(&sel) {
            let text = clean_text(&el.text().collect::<Vec<_>>().join(" "));
            if text.len() > 1 {
                return Some(crate::acquisition::structured::truncate(&text, 100));
            }
        }
    }
    None
}

fn card_description(card: ElementRef<'_>, name: &str) -> Option<String> {
    for selector in [
        "[class*='description']",
        "[class*='tagline']",
        "[class*='summary']",
        "p",
    ] {
        let sel = Selector::parse(selector).unwrap();
        for el in card.select(&sel) {
            let text = clean_text(&el.text().collect::<Vec<_>>().join(" "));
            if text.len() > 3 && text != name {
                return Some(text);
            }
        }
    }
    None
}

fn card_website(card: ElementRef<'_>) -> Option<String> {
    let sel = Selector::parse("a[href^='http']").unwrap();
    for a in card.select(&sel) {
        let href = a.value().attr("href").unwrap_or("");
        let lower = href.to_lowercase();
        if ["zone-secure.net", "facebook.com", "twitter.com", "linkedin.com"]
            .iter()
            .all(|domain| !lower.contains(domain))
        {
            return Some(href.to_string());
        }
    }
    None
}

/// Viewer chrome comes through as plausible cards; a blocklist plus a
/// short-lowercase-name heuristic separates it from real startups.
fn is_navigation_name(name: &str, has_info: bool) -> bool {
    let lower = name.to_lowercase();
    let lower = lower.trim();
    if EXCLUDED_NAMES.contains(&lower) {
        return true;
    }
    if EXCLUDED_NAMES.iter().any(|excluded| lower.contains(excluded)) {
        return true;
    }
    if !has_info && lower.len() < 15 {
        let words: Vec<&str> = lower.split_whitespace().collect();
        if words.len() == 1 && name.chars().all(|c| !c.is_uppercase()) {
            return true;
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"
        <html><body>
          <article>
            <h3>NeoVolt</h3>
            <p>Batteries structurelles pour l'aviation légère</p>
            <a href="https://neovolt.example">Site</a>
            <a href="https://www.linkedin.com/company/neovolt">LinkedIn</a>
          </article>
          <article><h3>Sommaire</h3></article>
          <article><h3>widget</h3></article>
        </body></html>"#;

    #[test]
    fn cards_parse_and_chrome_is_filtered() {
        let startups = parse_page(PAGE, "https://fr.zone-secure.net/20412/2540033/");
        assert_eq!(startups.len(), 1);

        let s = startups[0].as_object().unwrap();
        assert_eq!(s["name"], "NeoVolt");
        assert_eq!(
            s["description"],
            "Batteries structurelles pour l'aviation légère"
        );
        assert_eq!(s["website"], "https://neovolt.example");
    }

    #[test]
    fn navigation_names_are_recognized() {
        assert!(is_navigation_name("Sommaire", false));
        assert!(is_navigation_name("Retour au document", true));
        assert!(is_navigation_name("widget", false));
        assert!(!is_navigation_name("NeoVolt", true));
        assert!(!is_navigation_name("Blue Ocean Robotics", false));
    }

    #[test]
    fn headings_back_up_missing_card_markup() {
        let html = "<html><body><h2>Quantix</h2><h2>Sommaire</h2></body></html>";
        let startups = parse_page(html, "https://fr.zone-secure.net/20412/2540033/");
        assert_eq!(startups.len(), 1);
        assert_eq!(startups[0]["name"], "Quantix");
    }
}
