//! FutureTools directory agent.
//!
//! Tool cards on futuretools.io load in as the page scrolls, so the runner
//! asks for a scroll pass before parsing. Cards are anchored on links into
//! `/tools/`; category filter links also contain `tags` in the href and are
//! skipped.

use std::collections::HashSet;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use scraper::{ElementRef, Html, Selector};
use serde_json::{Map, Value};

use crate::acquisition::structured::{clean_text, resolve_href};
use crate::agents::{acquire_page, model_records, output_path_field, prompt_excerpt, AgentDeps};
use crate::engine::RunContext;
use crate::registry::{AgentDescriptor, AgentRunner};
use crate::report::Report;
use crate::schema::{FieldSpec, Schema, ValidatedInput};
use crate::strategy::{ScrollRule, StrategyPolicy};

const DEFAULT_URL: &str = "https://www.futuretools.io/newly-added";

const SKIP_NAMES: [&str; 8] = [
    "home",
    "about",
    "contact",
    "submit",
    "login",
    "sign up",
    "read more",
    "learn more",
];

fn scroll_rule() -> ScrollRule {
    ScrollRule {
        max_rounds: 30,
        no_growth_limit: 3,
        settle_ms: 1_200,
    }
}

pub fn descriptor(deps: AgentDeps) -> AgentDescriptor {
    AgentDescriptor {
        name: "futuretools".to_string(),
        description: "Extract AI tool cards from a FutureTools listing page".to_string(),
        input_schema: Schema::of(vec![
            FieldSpec::url("url")
                .default_value(DEFAULT_URL)
                .describe("FutureTools listing page to extract from"),
            FieldSpec::integer("max_tools")
                .default_value(1_000)
                .bounds(1, 10_000)
                .describe("Maximum number of tools to capture"),
            output_path_field(),
        ]),
        output_schema: Schema::of(vec![
            FieldSpec::text("source_url").required(),
            FieldSpec::object_list(
                "tools",
                Schema::of(vec![
                    FieldSpec::text("name").required(),
                    FieldSpec::url("tool_url"),
                    FieldSpec::text("category"),
                    FieldSpec::text("description"),
                ]),
            )
            .required(),
        ]),
        strategy: StrategyPolicy::InfiniteScroll(scroll_rule()),
        runner: Arc::new(FutureToolsRunner { deps }),
    }
}

struct FutureToolsRunner {
    deps: AgentDeps,
}

#[async_trait]
impl AgentRunner for FutureToolsRunner {
    async fn run(&self, input: &ValidatedInput, ctx: &RunContext) -> Result<Report> {
        let url = input.require_str("url")?;
        let cap = input.require_i64("max_tools")? as usize;

        let rule = scroll_rule();
        let page = acquire_page(&self.deps, url, ctx, Some(&rule)).await?;
        let mut tools = parse_tools(&page.html, &page.final_url, cap);

        if tools.is_empty() {
            tracing::info!("no tool cards in markup of {url}, asking the model");
            let prompt = format!(
                "List every AI tool on this FutureTools page as JSON objects with \
                 keys name, tool_url, category, description. Page content:\n\n{}",
                prompt_excerpt(&page.html, 60_000)
            );
            for record in model_records(&self.deps, ctx, &prompt).await {
                if tools.len() >= cap {
                    break;
                }
                let mut tool = Map::new();
                tool.insert("name".to_string(), Value::String(record.name.clone()));
                if let Some(u) = record.url() {
                    tool.insert("tool_url".to_string(), Value::String(u.to_string()));
                }
                if let Some(c) = record.field("category") {
                    tool.insert("category".to_string(), Value::String(c.to_string()));
                }
                if let Some(d) = record.description() {
                    tool.insert("description".to_string(), Value::String(d.to_string()));
                }
                tools.push(Value::Object(tool));
            }
        }

        tracing::info!("futuretools captured {} tools from {url}", tools.len());
        let mut out = Map::new();
        out.insert("source_url".to_string(), Value::String(page.final_url));
        out.insert("tools".to_string(), Value::Array(tools));
        Ok(Report::new(out))
    }
}

fn parse_tools(html: &str, base_url: &str, cap: usize) -> Vec<Value> {
    let doc = Html::parse_document(html);
    let link_sel = Selector::parse("a[href*='/tools/']").unwrap();

    let mut tools = Vec::new();
    let mut seen = HashSet::new();
    for link in doc.select(&link_sel) {
        if tools.len() >= cap {
            break;
        }
        let href = link.value().attr("href").unwrap_or("");
        if href.contains("?tags") || href.contains("tags=") {
            continue;
        }
        let name = clean_text(&link.text().collect::<Vec<_>>().join(" "));
        if name.len() < 2 || name.len() > 200 {
            continue;
        }
        let lower = name.to_lowercase();
        if SKIP_NAMES.iter().any(|skip| lower.contains(skip)) {
            continue;
        }
        if !seen.insert(lower) {
            continue;
        }

        let mut tool = Map::new();
        tool.insert("name".to_string(), Value::String(name.clone()));
        if let Some(tool_url) = resolve_href(base_url, href) {
            tool.insert("tool_url".to_string(), Value::String(tool_url));
        }
        if let Some(card) = enclosing_card(link) {
            if let Some(category) = card_category(card) {
                tool.insert("category".to_string(), Value::String(category));
            }
            if let Some(description) = card_description(card, &name) {
                tool.insert("description".to_string(), Value::String(description));
            }
        }
        tools.push(Value::Object(tool));
    }
    tools
}

/// Nearest `li` ancestor of the tool link, or the nearest `div` when the
/// page renders cards without list items.
fn enclosing_card(link: ElementRef<'_>) -> Option<ElementRef<'_>> {
    let mut node = link.parent();
    let mut fallback = None;
    while let Some(n) = node {
        if let Some(el) = ElementRef::wrap(n) {
            match el.value().name() {
                "li" => return Some(el),
                "div" if fallback.is_none() => fallback = Some(el),
                "body" | "html" => break,
                _ => {}
            }
        }
        node = n.parent();
    }
    fallback
}

fn card_category(card: ElementRef<'_>) -> Option<String> {
    let sel = Selector::parse("a[href*='tags']").unwrap();
    for el in card.select(&sel) {
        let text = clean_text(&el.text().collect::<Vec<_>>().join(" "));
        if text.len() > 2 && text.len() < 100 {
            let lower = text.to_lowercase();
            if !SKIP_NAMES.iter().any(|skip| lower.contains(skip)) {
                return Some(text);
            }
        }
    }
    None
}

/// Card blurbs on FutureTools read like "A tool that ...", which separates
/// them from nav text and pricing labels sharing the card markup.
fn card_description(card: ElementRef<'_>, name: &str) -> Option<String> {
    let sel = Selector::parse("div, span, p").unwrap();
    let name_lower = name.to_lowercase();
    for el in card.select(&sel) {
        let text = clean_text(&el.text().collect::<Vec<_>>().join(" "));
        if text.len() > name.len() + 10 && text.len() < 500 {
            let lower = text.to_lowercase();
            if lower != name_lower
                && !lower.starts_with(&name_lower)
                && (lower.starts_with("a ")
                    || lower.starts_with("an ")
                    || lower.starts_with("the ")
                    || lower.starts_with("tool"))
            {
                return Some(text);
            }
        }
    }
    None
}
