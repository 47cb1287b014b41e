//! Universal startup-directory agent.
//!
//! No assumptions about the site: the runner walks listing-shaped links
//! from the entry page, lifts repeated entries out of each visited page,
//! and lets the model restructure the entry page when the markup gives
//! structure nothing to work with. The report keeps the trail: every URL
//! visited and notes on how extraction went.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::acquisition::extract_listing_items;
use crate::acquisition::structured::resolve_href;
use crate::acquisition::MarkdownRecord;
use crate::agents::{model_records, output_path_field, prompt_excerpt, AgentDeps};
use crate::engine::RunContext;
use crate::navigation::explore_site;
use crate::registry::{AgentDescriptor, AgentRunner};
use crate::report::Report;
use crate::schema::{FieldSpec, Schema, ValidatedInput};
use crate::strategy::{ExploreRule, StrategyPolicy};

const NAV_KEYWORDS: [&str; 10] = [
    "startup",
    "startups",
    "company",
    "companies",
    "directory",
    "portfolio",
    "showcase",
    "marketplace",
    "listing",
    "listings",
];

// Keys the schema models explicitly; everything else a record carries goes
// into additional_info.
const KNOWN_KEYS: [&str; 22] = [
    "name",
    "startup_url",
    "url",
    "link",
    "website",
    "site",
    "sector",
    "industry",
    "category",
    "location",
    "founded_year",
    "founded",
    "employees",
    "funding_stage",
    "funding",
    "logo_url",
    "logo",
    "description",
    "summary",
    "notes",
    "about",
    "tags",
];

fn explore_rule() -> ExploreRule {
    ExploreRule {
        max_iterations: 12,
        no_progress_limit: 3,
        max_pages: 10,
    }
}

pub fn descriptor(deps: AgentDeps) -> AgentDescriptor {
    AgentDescriptor {
        name: "universal_startups".to_string(),
        description: "Exhaustively extract startups from an arbitrary directory site".to_string(),
        input_schema: Schema::of(vec![
            FieldSpec::url("url")
                .required()
                .describe("Entry page of the startup directory"),
            FieldSpec::integer("max_startups")
                .default_value(100_000)
                .bounds(1, 1_000_000)
                .describe("Maximum number of startups to capture"),
            output_path_field(),
        ]),
        output_schema: Schema::of(vec![
            FieldSpec::text("source_url").required(),
            FieldSpec::object_list(
                "startups",
                Schema::of(vec![
                    FieldSpec::text("name").required(),
                    FieldSpec::url("startup_url"),
                    FieldSpec::text("description"),
                    FieldSpec::url("website"),
                    FieldSpec::text("sector"),
                    FieldSpec::text("location"),
                    FieldSpec::integer("founded_year"),
                    FieldSpec::text("employees"),
                    FieldSpec::text("funding_stage"),
                    FieldSpec::url("logo_url"),
                    FieldSpec::text_list("tags"),
                    FieldSpec::free_map("additional_info"),
                ]),
            )
            .required(),
            FieldSpec::text_list("pages_visited").required(),
            FieldSpec::text_list("extraction_notes").required(),
        ]),
        strategy: StrategyPolicy::Exploratory(explore_rule()),
        runner: Arc::new(UniversalStartupsRunner { deps }),
    }
}

struct UniversalStartupsRunner {
    deps: AgentDeps,
}

#[async_trait]
impl AgentRunner for UniversalStartupsRunner {
    async fn run(&self, input: &ValidatedInput, ctx: &RunContext) -> Result<Report> {
        let url = input.require_str("url")?;
        let cap = input.require_i64("max_startups")? as usize;
        let rule = explore_rule();

        let pages = explore_site(&self.deps.http, url, &rule, &NAV_KEYWORDS, ctx).await?;
        let mut notes = vec![format!("visited {} pages starting from {url}", pages.len())];

        let mut startups: Vec<Value> = Vec::new();
        let mut by_name: HashMap<String, usize> = HashMap::new();
        for (page_url, html) in &pages {
            if startups.len() >= cap {
                break;
            }
            let before = startups.len();
            for item in extract_listing_items(html, page_url) {
                if startups.len() >= cap {
                    break;
                }
                let key = item.name.to_lowercase();
                if by_name.contains_key(&key) {
                    continue;
                }
                let mut startup = Map::new();
                startup.insert("name".to_string(), Value::String(item.name));
                if let Some(startup_url) = item.url {
                    startup.insert("startup_url".to_string(), Value::String(startup_url));
                }
                if let Some(description) = item.description {
                    startup.insert("description".to_string(), Value::String(description));
                }
                by_name.insert(key, startups.len());
                startups.push(Value::Object(startup));
            }
            if startups.len() > before {
                notes.push(format!(
                    "{}: {} entries from markup",
                    page_url,
                    startups.len() - before
                ));
            }
        }

        if startups.is_empty() {
            if let Some((entry_url, entry_html)) = pages.first() {
                notes.push("markup gave no entries, model pass on entry page".to_string());
                let prompt = format!(
                    "Extract every startup or company listed on this page as a JSON \
                     array of objects with keys name, startup_url, description, \
                     website, sector, location, founded_year, employees, \
                     funding_stage, tags. Page content:\n\n{}",
                    prompt_excerpt(entry_html, 60_000)
                );
                for record in model_records(&self.deps, ctx, &prompt).await {
                    if startups.len() >= cap {
                        break;
                    }
                    let key = record.name.to_lowercase();
                    if by_name.contains_key(&key) {
                        continue;
                    }
                    by_name.insert(key, startups.len());
                    startups.push(startup_from_record(&record, entry_url));
                }
            }
        }

        tracing::info!(
            "universal extraction: {} startups over {} pages from {url}",
            startups.len(),
            pages.len()
        );
        let mut out = Map::new();
        out.insert("source_url".to_string(), Value::String(url.to_string()));
        out.insert("startups".to_string(), Value::Array(startups));
        out.insert(
            "pages_visited".to_string(),
            Value::Array(
                pages
                    .iter()
                    .map(|(page_url, _)| Value::String(page_url.clone()))
                    .collect(),
            ),
        );
        out.insert(
            "extraction_notes".to_string(),
            Value::Array(notes.into_iter().map(Value::String).collect()),
        );
        Ok(Report::new(out))
    }
}

fn startup_from_record(record: &MarkdownRecord, base_url: &str) -> Value {
    let mut startup = Map::new();
    startup.insert("name".to_string(), Value::String(record.name.clone()));

    if let Some(raw) = record.field("startup_url").or_else(|| record.url()) {
        if let Some(startup_url) = resolve_href(base_url, raw) {
            startup.insert("startup_url".to_string(), Value::String(startup_url));
        }
    }
    if let Some(site) = record.field("website").or_else(|| record.field("site")) {
        if site.starts_with("http") {
            startup.insert("website".to_string(), Value::String(site.to_string()));
        }
    }
    for (field, keys) in [
        ("sector", ["sector", "industry", "category"].as_slice()),
        ("location", ["location"].as_slice()),
        ("employees", ["employees"].as_slice()),
        ("funding_stage", ["funding_stage", "funding"].as_slice()),
    ] {
        if let Some(value) = keys.iter().find_map(|key| record.field(key)) {
            startup.insert(field.to_string(), Value::String(value.to_string()));
        }
    }
    if let Some(raw) = record.field("founded_year").or_else(|| record.field("founded")) {
        if let Ok(year) = raw.trim().parse::<i64>() {
            startup.insert("founded_year".to_string(), Value::from(year));
        }
    }
    if let Some(logo) = record.field("logo_url").or_else(|| record.field("logo")) {
        if logo.starts_with("http") {
            startup.insert("logo_url".to_string(), Value::String(logo.to_string()));
        }
    }
    if let Some(description) = record.description() {
        startup.insert("description".to_string(), Value::String(description.to_string()));
    }
    if let Some(tags) = record.field("tags") {
        let tags: Vec<Value> = tags
            .split(", ")
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(|t| Value::String(t.to_string()))
            .collect();
        if !tags.is_empty() {
            startup.insert("tags".to_string(), Value::Array(tags));
        }
    }

    let extra: Map<String, Value> = record
        .fields
        .iter()
        .filter(|(key, _)| !KNOWN_KEYS.contains(&key.as_str()))
        .map(|(key, value)| (key.clone(), Value::String(value.clone())))
        .collect();
    if !extra.is_empty() {
        startup.insert("additional_info".to_string(), Value::Object(extra));
    }

    Value::Object(startup)
}
