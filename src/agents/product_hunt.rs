//! Product Hunt daily leaderboard agent.
//!
//! The leaderboard lives at a date-stamped URL whose `/all` suffix serves
//! the whole day in one page. Cards are `section` elements with a
//! `post-item` data-test marker; rank is the position on the page.

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
use crate::schema::{parse_date, FieldSpec, Schema, ValidatedInput};
use crate::strategy::{ScrollRule, StrategyPolicy};

// Comment icon path fragments, the only stable handle on the comments
// button in the current markup.
const COMMENT_ICON_PATHS: [&str; 2] = ["M12.25 6.708", "M5.833 1.75"];

fn scroll_rule() -> ScrollRule {
    ScrollRule {
        max_rounds: 10,
        no_growth_limit: 2,
        settle_ms: 1_000,
    }
}

pub fn descriptor(deps: AgentDeps) -> AgentDescriptor {
    AgentDescriptor {
        name: "product_hunt_leaderboard".to_string(),
        description: "Extract a day's Product Hunt leaderboard".to_string(),
        input_schema: Schema::of(vec![
            FieldSpec::date("date")
                .required()
                .describe("Leaderboard day, YYYY-MM-DD or YYYY/MM/DD"),
            FieldSpec::integer("max_products")
                .default_value(1_000)
                .bounds(1, 10_000)
                .describe("Maximum number of products to capture"),
            output_path_field(),
        ]),
        output_schema: Schema::of(vec![
            FieldSpec::text("source_url").required(),
            FieldSpec::text("date").required(),
            FieldSpec::object_list(
                "products",
                Schema::of(vec![
                    FieldSpec::text("name").required(),
                    FieldSpec::url("producthunt_url"),
                    FieldSpec::integer("rank"),
                    FieldSpec::text("description"),
                    FieldSpec::text("maker"),
                    FieldSpec::integer("upvotes"),
                    FieldSpec::integer("comments_count"),
                    FieldSpec::text_list("tags"),
                ]),
            )
            .required(),
        ]),
        strategy: StrategyPolicy::SinglePage,
        runner: Arc::new(ProductHuntRunner { deps }),
    }
}

struct ProductHuntRunner {
    deps: AgentDeps,
}

#[async_trait]
impl AgentRunner for ProductHuntRunner {
    async fn run(&self, input: &ValidatedInput, ctx: &RunContext) -> Result<Report> {
        let raw_date = input.require_str("date")?;
        let date = parse_date(raw_date)
            .ok_or_else(|| anyhow::anyhow!("unparseable leaderboard date {raw_date:?}"))?;
        let cap = input.require_i64("max_products")? as usize;

        let url = leaderboard_url(date);
        let rule = scroll_rule();
        let page = acquire_page(&self.deps, &url, ctx, Some(&rule)).await?;
        let products = parse_leaderboard(&page.html, &page.final_url, cap);
        tracing::info!("product hunt leaderboard for {date}: {} products", products.len());

        let mut out = Map::new();
        out.insert("source_url".to_string(), Value::String(url));
        out.insert("date".to_string(), Value::String(date.to_string()));
        out.insert("products".to_string(), Value::Array(products));
        Ok(Report::new(out))
    }
}

fn leaderboard_url(date: chrono::NaiveDate) -> String {
    format!(
        "https://www.producthunt.com/leaderboard/daily/{}/all",
        date.format("%Y/%m/%d")
    )
}

fn parse_leaderboard(html: &str, base_url: &str, cap: usize) -> Vec<Value> {
    let doc = Html::parse_document(html);
    let section_sel = Selector::parse("section[data-test^='post-item-']").unwrap();

    let mut products = Vec::new();
    for section in doc.select(&section_sel) {
        if products.len() >= cap {
            break;
        }
        if let Some(product) = parse_section(section, base_url, products.len() + 1) {
            products.push(product);
        }
    }
    products
}

fn parse_section(section: ElementRef<'_>, base_url: &str, rank: usize) -> Option<Value> {
    let name_sel = Selector::parse("a[href^='/products/']").unwrap();
    let name_link = section.select(&name_sel).next()?;
    let name = clean_text(&name_link.text().collect::<Vec<_>>().join(" "));
    if name.is_empty() {
        return None;
    }

    let mut product = Map::new();
    product.insert("name".to_string(), Value::String(name));
    product.insert("rank".to_string(), Value::from(rank as i64));
    if let Some(href) = name_link.value().attr("href") {
        if let Some(url) = resolve_href(base_url, href) {
            product.insert("producthunt_url".to_string(), Value::String(url));
        }
    }

    let desc_sel = Selector::parse("div.text-secondary").unwrap();
    if let Some(el) = section.select(&desc_sel).next() {
        let text = clean_text(&el.text().collect::<Vec<_>>().join(" "));
        if !text.is_empty() {
            product.insert("description".to_string(), Value::String(text));
        }
    }

    let topics_sel = Selector::parse("a[href^='/topics/']").unwrap();
    let tags: Vec<Value> = section
        .select(&topics_sel)
        .map(|a| clean_text(&a.text().collect::<Vec<_>>().join(" ")))
        .filter(|t| !t.is_empty())
        .map(Value::String)
        .collect();
    if !tags.is_empty() {
        product.insert("tags".to_string(), Value::Array(tags));
    }

    let vote_sel = Selector::parse("button[data-test='vote-button']").unwrap();
    if let Some(button) = section.select(&vote_sel).next() {
        let text = clean_text(&button.text().collect::<Vec<_>>().join(" "));
        if let Some(upvotes) = first_number(&text) {
            product.insert("upvotes".to_string(), Value::from(upvotes));
        }
    }

    if let Some(comments) = comments_count(section) {
        product.insert("comments_count".to_string(), Value::from(comments));
    }

    Some(Value::Object(product))
}

/// The comments button has no test id; it is recognized by its icon path.
fn comments_count(section: ElementRef<'_>) -> Option<i64> {
    let button_sel = Selector::parse("button").unwrap();
    let path_sel = Selector::parse("svg path").unwrap();
    for button in section.select(&button_sel) {
        let has_icon = button.select(&path_sel).any(|path| {
            let d = path.value().attr("d").unwrap_or("");
            COMMENT_ICON_PATHS.iter().any(|marker| d.contains(marker))
        });
        if has_icon {
            let text = clean_text(&button.text().collect::<Vec<_>>().join(" "));
            if let Some(count) = first_number(&text) {
                return Some(count);
            }
        }
    }
    None
}

fn first_number(text: &str) -> Option<i64> {
    let re = Regex::new(r"(\d[\d,]*)").expect("count regex is valid");
    re.captures(text)?.get(1)?.as_str().replace(',', "").parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    const PAGE: &str = r#"
        <html><body>
          <section data-test="post-item-1039459">
            <a href="/products/flowdesk">FlowDesk</a>
            <div class="text-secondary">A shared inbox for product teams</div>
            <a href="/topics/productivity">Productivity</a>
            <a href="/topics/saas">SaaS</a>
            <button data-test="vote-button">412</button>
            <button><svg><path d="M12.25 6.708c0 2.9"/></svg>37</button>
          </section>
          <section data-test="post-item-1039460">
            <a href="/products/nullity">Nullity</a>
            <button data-test="vote-button">prelaunch</button>
          </section>
        </body></html>"#;

    #[test]
    fn leaderboard_url_uses_slash_date_and_all_suffix() {
        let date = NaiveDate::from_ymd_opt(2025, 11, 20).unwrap();
        assert_eq!(
            leaderboard_url(date),
            "https://www.producthunt.com/leaderboard/daily/2025/11/20/all"
        );
    }

    #[test]
    fn sections_become_ranked_products() {
        let products = parse_leaderboard(PAGE, "https://www.producthunt.com/leaderboard", 10);
        assert_eq!(products.len(), 2);

        let first = products[0].as_object().unwrap();
        assert_eq!(first["name"], "FlowDesk");
        assert_eq!(first["rank"], 1);
        assert_eq!(
            first["producthunt_url"],
            "https://www.producthunt.com/products/flowdesk"
        );
        assert_eq!(first["description"], "A shared inbox for product teams");
        assert_eq!(first["tags"][0], "Productivity");
        assert_eq!(first["tags"][1], "SaaS");
        assert_eq!(first["upvotes"], 412);
        assert_eq!(first["comments_count"], 37);

        let second = products[1].as_object().unwrap();
        assert_eq!(second["rank"], 2);
        assert!(second.get("upvotes").is_none());
    }

    #[test]
    fn counts_ignore_thousands_separators() {
        assert_eq!(first_number("1,024 points"), Some(1_024));
        assert_eq!(first_number("soon"), None);
    }
}
