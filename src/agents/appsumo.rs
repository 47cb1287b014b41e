//! AppSumo collection agents.
//!
//! "What's hot" and "New arrivals" are the same page shape with different
//! collection URLs, so both descriptors share one runner. Deal cards repeat
//! the `deal-price` id family per card; parsing is scoped to each card so
//! the duplicate ids stay harmless.

use std::collections::HashSet;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use serde_json::{Map, Value};

use crate::acquisition::structured::{clean_text, resolve_href};
use crate::agents::{acquire_page, output_path_field, AgentDeps};
use crate::engine::RunContext;
use crate::registry::{AgentDescriptor, AgentRunner};
use crate::report::Report;
use crate::schema::{FieldSpec, Schema, ValidatedInput};
use crate::strategy::{ScrollRule, StrategyPolicy};

const HOT_URL: &str = "https://appsumo.com/collections/whats-hot/";
const NEW_URL: &str = "https://appsumo.com/collections/new/";

fn scroll_rule() -> ScrollRule {
    ScrollRule {
        max_rounds: 40,
        no_growth_limit: 3,
        settle_ms: 1_200,
    }
}

pub fn hot_descriptor(deps: AgentDeps) -> AgentDescriptor {
    build_descriptor(
        deps,
        "appsumo_hot",
        "Extract deal cards from the AppSumo what's-hot collection",
        HOT_URL,
    )
}

pub fn new_descriptor(deps: AgentDeps) -> AgentDescriptor {
    build_descriptor(
        deps,
        "appsumo_new",
        "Extract deal cards from the AppSumo new-arrivals collection",
        NEW_URL,
    )
}

fn build_descriptor(
    deps: AgentDeps,
    name: &str,
    description: &str,
    default_url: &str,
) -> AgentDescriptor {
    AgentDescriptor {
        name: name.to_string(),
        description: description.to_string(),
        input_schema: Schema::of(vec![
            FieldSpec::url("url")
                .default_value(default_url)
                .describe("AppSumo collection page to extract from"),
            FieldSpec::integer("max_products")
                .default_value(200)
                .bounds(1, 2_000)
                .describe("Maximum number of product cards to capture"),
            output_path_field(),
        ]),
        output_schema: Schema::of(vec![
            FieldSpec::text("source_url").required(),
            FieldSpec::object_list(
                "products",
                Schema::of(vec![
                    FieldSpec::text("name").required(),
                    FieldSpec::url("product_url"),
                    FieldSpec::text("category"),
                    FieldSpec::url("category_url"),
                    FieldSpec::text("description"),
                    FieldSpec::text("price"),
                    FieldSpec::text("price_suffix"),
                    FieldSpec::text("original_price"),
                    FieldSpec::integer("reviews_count"),
                    FieldSpec::float("rating_value"),
                    FieldSpec::text("rating_text"),
                    FieldSpec::url("image_url"),
                    FieldSpec::text_list("badges"),
                    FieldSpec::boolean("appsumo_select"),
                ]),
            )
            .required(),
        ]),
        strategy: StrategyPolicy::InfiniteScroll(scroll_rule()),
        runner: Arc::new(AppSumoRunner { deps }),
    }
}

struct AppSumoRunner {
    deps: AgentDeps,
}

#[async_trait]
impl AgentRunner for AppSumoRunner {
    async fn run(&self, input: &ValidatedInput, ctx: &RunContext) -> Result<Report> {
        let url = input.require_str("url")?;
        let cap = input.require_i64("max_products")? as usize;

        let rule = scroll_rule();
        let page = acquire_page(&self.deps, url, ctx, Some(&rule)).await?;
        let products = parse_products(&page.html, &page.final_url, cap);
        tracing::info!("appsumo captured {} products from {url}", products.len());

        let mut out = Map::new();
        out.insert("source_url".to_string(), Value::String(page.final_url));
        out.insert("products".to_string(), Value::Array(products));
        Ok(Report::new(out))
    }
}

fn parse_products(html: &str, base_url: &str, cap: usize) -> Vec<Value> {
    let doc = Html::parse_document(html);
    let card_sel = Selector::parse("div.relative.h-full").unwrap();
    let link_sel = Selector::parse("a[href^='/products/']").unwrap();

    let mut products = Vec::new();
    let mut seen = HashSet::new();
    for card in doc.select(&card_sel) {
        if products.len() >= cap {
            break;
        }
        if card.select(&link_sel).next().is_none() {
            continue;
        }
        push_card(card, base_url, &mut products, &mut seen);
    }

    // Markup drifts; when the card class changes, fall back to walking up
    // from the product links themselves.
    if products.is_empty() {
        for link in doc.select(&link_sel) {
            if products.len() >= cap {
                break;
            }
            if let Some(card) = enclosing_block(link) {
                push_card(card, base_url, &mut products, &mut seen);
            }
        }
    }
    products
}

fn push_card(
    card: ElementRef<'_>,
    base_url: &str,
    products: &mut Vec<Value>,
    seen: &mut HashSet<String>,
) {
    if let Some(product) = parse_card(card, base_url) {
        let key = product["name"].as_str().unwrap_or_default().to_lowercase();
        if !key.is_empty() && seen.insert(key) {
            products.push(product);
        }
    }
}

fn enclosing_block(link: ElementRef<'_>) -> Option<ElementRef<'_>> {
    let mut node = link.parent();
    while let Some(n) = node {
        if let Some(el) = ElementRef::wrap(n) {
            match el.value().name() {
                "div" | "li" | "article" => return Some(el),
                "body" | "html" => break,
                _ => {}
            }
        }
        node = n.parent();
    }
    None
}

fn parse_card(card: ElementRef<'_>, base_url: &str) -> Option<Value> {
    let name = card_name(card)?;

    let mut product = Map::new();
    product.insert("name".to_string(), Value::String(name.clone()));

    let link_sel = Selector::parse("a[href^='/products/']").unwrap();
    if let Some(href) = card.select(&link_sel).next().and_then(|a| a.value().attr("href")) {
        if let Some(product_url) = resolve_href(base_url, href) {
            product.insert("product_url".to_string(), Value::String(product_url));
        }
    }

    let category_sel = Selector::parse(
        "span a[href*='/software/'], span a[href*='/courses/'], span a[href*='/creative/']",
    )
    .unwrap();
    if let Some(cat) = card.select(&category_sel).next() {
        let text = clean_text(&cat.text().collect::<Vec<_>>().join(" "));
        if !text.is_empty() {
            product.insert("category".to_string(), Value::String(text));
        }
        if let Some(href) = cat.value().attr("href") {
            if let Some(category_url) = resolve_href(base_url, href) {
                product.insert("category_url".to_string(), Value::String(category_url));
            }
        }
    }

    let description_sel = Selector::parse("div[class*='line-clamp']").unwrap();
    if let Some(el) = card.select(&description_sel).next() {
        let text = clean_text(&el.text().collect::<Vec<_>>().join(" "));
        if !text.is_empty() {
            product.insert("description".to_string(), Value::String(text));
        }
    }

    for (field, selector) in [
        ("price", "#deal-price"),
        ("price_suffix", "#deal-price-suffix"),
        ("original_price", "#deal-price-original"),
    ] {
        let sel = Selector::parse(selector).unwrap();
        if let Some(el) = card.select(&sel).next() {
            let text = clean_text(&el.text().collect::<Vec<_>>().join(" "));
            if !text.is_empty() {
                product.insert(field.to_string(), Value::String(text));
            }
        }
    }

    let reviews_sel = Selector::parse("a[href*='#reviews'] span, a[href*='#reviews']").unwrap();
    if let Some(el) = card.select(&reviews_sel).next() {
        let text = clean_text(&el.text().collect::<Vec<_>>().join(" "));
        if let Some(count) = parse_reviews_count(&text) {
            product.insert("reviews_count".to_string(), Value::from(count));
        }
    }

    if let Some((value, text)) = rating_info(card) {
        if let Some(value) = value {
            product.insert("rating_value".to_string(), Value::from(value));
        }
        product.insert("rating_text".to_string(), Value::String(text));
    }

    if let Some(image_url) = card_image(card, base_url) {
        product.insert("image_url".to_string(), Value::String(image_url));
    }

    let select_sel = Selector::parse("img[alt='AppSumo Select']").unwrap();
    product.insert(
        "appsumo_select".to_string(),
        Value::Bool(card.select(&select_sel).next().is_some()),
    );

    let badges = card_badges(card);
    if !badges.is_empty() {
        product.insert(
            "badges".to_string(),
            Value::Array(badges.into_iter().map(Value::String).collect()),
        );
    }

    Some(Value::Object(product))
}

fn card_name(card: ElementRef<'_>) -> Option<String> {
    for selector in ["span.sr-only", "span.font-bold", "a[aria-label]"] {
        let sel = Selector::parse(selector).unwrap();
        if let Some(el) = card.select(&sel).next() {
            let text = clean_text(&el.text().collect::<Vec<_>>().join(" "));
            if !text.is_empty() {
                return Some(text);
            }
        }
    }
    None
}

fn parse_reviews_count(text: &str) -> Option<i64> {
    let re = Regex::new(r"(\d[\d,]*)").expect("reviews count regex is valid");
    let digits = re.captures(text)?.get(1)?.as_str().replace(',', "");
    digits.parse().ok()
}

fn parse_rating_value(text: &str) -> Option<f64> {
    let re = Regex::new(r"([0-9]+(?:\.[0-9]+)?)").expect("rating value regex is valid");
    re.captures(text)?.get(1)?.as_str().parse().ok()
}

/// Rating comes from the stars image alt text, with a span text fallback
/// for cards that render the rating inline.
fn rating_info(card: ElementRef<'_>) -> Option<(Option<f64>, String)> {
    let img_sel = Selector::parse("img[alt]").unwrap();
    for img in card.select(&img_sel) {
        let alt = img.value().attr("alt").unwrap_or("");
        if alt.to_lowercase().contains("star") {
            let text = clean_text(alt);
            return Some((parse_rating_value(&text), text));
        }
    }

    let span_sel = Selector::parse("span").unwrap();
    for span in card.select(&span_sel) {
        let text = clean_text(&span.text().collect::<Vec<_>>().join(" "));
        let lower = text.to_lowercase();
        if lower.contains("star") && parse_rating_value(&text).is_some() {
            return Some((parse_rating_value(&text), text));
        }
    }
    None
}

fn card_image(card: ElementRef<'_>, base_url: &str) -> Option<String> {
    for selector in [
        "img.aspect-sku-card",
        "img.rounded-t",
        "img[decoding='async']",
        "img[src^='http']",
    ] {
        let sel = Selector::parse(selector).unwrap();
        if let Some(src) = card.select(&sel).next().and_then(|img| img.value().attr("src")) {
            if let Some(url) = resolve_href(base_url, src) {
                return Some(url);
            }
        }
    }
    None
}

fn card_badges(card: ElementRef<'_>) -> Vec<String> {
    let sel = Selector::parse("div span").unwrap();
    let mut badges = Vec::new();
    for span in card.select(&sel) {
        let text = clean_text(&span.text().collect::<Vec<_>>().join(" "));
        if text.is_empty() {
            continue;
        }
        let lower = text.to_lowercase();
        if ["price", "black friday", "ending soon"]
            .iter()
            .any(|keyword| lower.contains(keyword))
            && !badges.contains(&text)
        {
            badges.push(text);
        }
    }
    badges
}
