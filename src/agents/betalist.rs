//! Betalist recent-startups agent.
//!
//! Betalist groups cards under day wrappers whose element id encodes the day
//! as epoch seconds (`day_1763596800`), with a human label as fallback. The
//! runner keeps only startups featured within the requested window.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{Datelike, Days, NaiveDate, Utc};
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

const DEFAULT_URL: &str = "https://betalist.com/";

fn scroll_rule() -> ScrollRule {
    ScrollRule {
        max_rounds: 20,
        no_growth_limit: 2,
        settle_ms: 1_000,
    }
}

pub fn descriptor(deps: AgentDeps) -> AgentDescriptor {
    AgentDescriptor {
        name: "betalist".to_string(),
        description: "Extract startups featured on Betalist within the last days".to_string(),
        input_schema: Schema::of(vec![
            FieldSpec::url("url")
                .default_value(DEFAULT_URL)
                .describe("Betalist page to extract from"),
            FieldSpec::integer("last_days")
                .default_value(3)
                .bounds(1, 30)
                .describe("How many days back to keep startups from"),
            FieldSpec::integer("max_startups")
                .default_value(200)
                .bounds(1, 2_000)
                .describe("Maximum number of startups to capture"),
            output_path_field(),
        ]),
        output_schema: Schema::of(vec![
            FieldSpec::text("source_url").required(),
            FieldSpec::object_list(
                "startups",
                Schema::of(vec![
                    FieldSpec::text("name").required(),
                    FieldSpec::url("listing_url"),
                    FieldSpec::url("website"),
                    FieldSpec::text("description"),
                    FieldSpec::date("first_seen"),
                ]),
            )
            .required(),
        ]),
        strategy: StrategyPolicy::InfiniteScroll(scroll_rule()),
        runner: Arc::new(BetalistRunner { deps }),
    }
}

struct BetalistRunner {
    deps: AgentDeps,
}

#[async_trait]
impl AgentRunner for BetalistRunner {
    async fn run(&self, input: &ValidatedInput, ctx: &RunContext) -> Result<Report> {
        let url = input.require_str("url")?;
        let last_days = input.require_i64("last_days")?;
        let cap = input.require_i64("max_startups")? as usize;

        let rule = scroll_rule();
        let page = acquire_page(&self.deps, url, ctx, Some(&rule)).await?;

        let today = Utc::now().date_naive();
        let cutoff = today - Days::new(last_days as u64);
        let startups = parse_startups(&page.html, &page.final_url, today, cutoff, cap);
        tracing::info!(
            "betalist kept {} startups since {cutoff} from {url}",
            startups.len()
        );

        let mut out = Map::new();
        out.insert("source_url".to_string(), Value::String(page.final_url));
        out.insert("startups".to_string(), Value::Array(startups));
        Ok(Report::new(out))
    }
}

/// Walk day wrappers and startup cards in document order, tagging each card
/// with the day it appeared under. Days run newest first, so once a day
/// older than the cutoff shows up the rest of the page is out of window.
fn parse_startups(
    html: &str,
    base_url: &str,
    today: NaiveDate,
    cutoff: NaiveDate,
    cap: usize,
) -> Vec<Value> {
    let doc = Html::parse_document(html);
    let sel = Selector::parse("div[id^='day_'], div[id^='startup-']").unwrap();

    let mut startups = Vec::new();
    let mut current_day: Option<NaiveDate> = None;
    for el in doc.select(&sel) {
        if startups.len() >= cap {
            break;
        }
        let id = el.value().attr("id").unwrap_or("");
        if id.starts_with("day_") {
            current_day = day_from_id(id).or_else(|| parse_day_label(&element_text(el), today));
            if let Some(day) = current_day {
                if day < cutoff {
                    break;
                }
            }
            continue;
        }
        if let Some(day) = current_day {
            if day < cutoff {
                continue;
            }
        }
        if let Some(startup) = parse_card(el, base_url, current_day) {
            startups.push(startup);
        }
    }
    startups
}

fn parse_card(card: ElementRef<'_>, base_url: &str, day: Option<NaiveDate>) -> Option<Value> {
    let listing_sel = Selector::parse("a[href^='/startups/']").unwrap();

    let mut name = None;
    let mut tagline = None;
    let mut listing_href = None;
    for a in card.select(&listing_sel) {
        if listing_href.is_none() {
            listing_href = a.value().attr("href").map(str::to_string);
        }
        let text = clean_text(&a.text().collect::<Vec<_>>().join(" "));
        if text.is_empty() {
            continue;
        }
        if name.is_none() {
            name = Some(text);
        } else if tagline.is_none() {
            tagline = Some(text);
            break;
        }
    }
    let name = name?;

    let mut startup = Map::new();
    startup.insert("name".to_string(), Value::String(name));
    if let Some(href) = listing_href {
        if let Some(listing_url) = resolve_href(base_url, &href) {
            startup.insert("listing_url".to_string(), Value::String(listing_url));
        }
    }
    if let Some(description) = tagline {
        startup.insert("description".to_string(), Value::String(description));
    }
    if let Some(website) = card_website(card) {
        startup.insert("website".to_string(), Value::String(website));
    }
    if let Some(day) = day {
        startup.insert("first_seen".to_string(), Value::String(day.to_string()));
    }
    Some(Value::Object(startup))
}

/// The "Visit website" call to action carries the startup's own domain.
fn card_website(card: ElementRef<'_>) -> Option<String> {
    let cta_sel = Selector::parse("a.cta[href^='http']").unwrap();
    if let Some(href) = card.select(&cta_sel).next().and_then(|a| a.value().attr("href")) {
        return Some(href.to_string());
    }
    let external_sel = Selector::parse("a[target='_blank'][href^='http']").unwrap();
    for a in card.select(&external_sel) {
        let href = a.value().attr("href").unwrap_or("");
        if !href.contains("betalist.com") {
            return Some(href.to_string());
        }
    }
    None
}

fn day_from_id(id: &str) -> Option<NaiveDate> {
    let epoch: i64 = id.strip_prefix("day_")?.parse().ok()?;
    Some(chrono::DateTime::from_timestamp(epoch, 0)?.date_naive())
}

/// Day headings read "Today November 20th" or just the month and day; the
/// year is inferred from today with a rollover guard around January.
fn parse_day_label(label: &str, today: NaiveDate) -> Option<NaiveDate> {
    let lower = label.to_lowercase();
    if lower.contains("today") {
        return Some(today);
    }
    if lower.contains("yesterday") {
        return today.checked_sub_days(Days::new(1));
    }

    let re = Regex::new(r"([A-Za-z]+)\s+(\d{1,2})(?:st|nd|rd|th)?").expect("day label regex is valid");
    let caps = re.captures(label)?;
    let month = caps.get(1)?.as_str();
    let day = caps.get(2)?.as_str();
    let date = NaiveDate::parse_from_str(
        &format!("{month} {day} {}", today.year()),
        "%B %e %Y",
    )
    .ok()?;
    if date > today.checked_add_days(Days::new(2))? {
        date.with_year(today.year() - 1)
    } else {
        Some(date)
    }
}

fn element_text(el: ElementRef<'_>) -> String {
    clean_text(&el.text().collect::<Vec<_>>().join(" "))
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"
        <html><body>
          <div id="day_1763596800"><h2>Today November 20th</h2>
            <div id="startup-138993" class="block">
              <a href="/startups/simcardo"><img src="/simcardo.jpg"></a>
              <a class="font-medium" href="/startups/simcardo">Simcardo</a>
              <a class="text-gray-500" href="/startups/simcardo">Instant mobile data worldwide</a>
              <a class="cta" href="https://simcardo.com" target="_blank">Visit website</a>
            </div>
          </div>
          <div id="day_1704067200"><h2>January 1st</h2>
            <div id="startup-1">
              <a href="/startups/oldtimer">Oldtimer</a>
            </div>
          </div>
        </body></html>"#;

    #[test]
    fn day_ids_decode_to_dates() {
        assert_eq!(
            day_from_id("day_1763596800"),
            NaiveDate::from_ymd_opt(2025, 11, 20)
        );
        assert_eq!(day_from_id("day_notanumber"), None);
    }

    #[test]
    fn day_labels_resolve_relative_to_today() {
        let today = NaiveDate::from_ymd_opt(2025, 11, 20).unwrap();
        assert_eq!(parse_day_label("Today November 20th", today), Some(today));
        assert_eq!(
            parse_day_label("November 18th", today),
            NaiveDate::from_ymd_opt(2025, 11, 18)
        );
        assert_eq!(
            parse_day_label("December 30th", today),
            NaiveDate::from_ymd_opt(2024, 12, 30)
        );
    }

    #[test]
    fn keeps_only_startups_inside_the_window() {
        let today = NaiveDate::from_ymd_opt(2025, 11, 20).unwrap();
        let cutoff = today - Days::new(3);
        let startups = parse_startups(PAGE, "https://betalist.com/", today, cutoff, 50);
        assert_eq!(startups.len(), 1);

        let s = startups[0].as_object().unwrap();
        assert_eq!(s["name"], "Simcardo");
        assert_eq!(s["listing_url"], "https://betalist.com/startups/simcardo");
        assert_eq!(s["description"], "Instant mobile data worldwide");
        assert_eq!(s["website"], "https://simcardo.com");
        assert_eq!(s["first_seen"], "2025-11-20");
    }
}
