//! Curated startup-listing agent.
//!
//! Works on any listing page (Product Hunt, BetaList, FutureTools and the
//! like): a structural pass lifts the repeated entries out of the markup,
//! then a bounded model loop fills in what structure alone cannot see,
//! LinkedIn profiles in particular. Every LinkedIn URL is normalized or
//! dropped so reports never carry an invented profile link.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::acquisition::extract_listing_items;
use crate::acquisition::structured::resolve_href;
use crate::acquisition::MarkdownRecord;
use crate::agents::{
    acquire_page, model_records, normalize_linkedin, output_path_field, prompt_excerpt, AgentDeps,
};
use crate::engine::RunContext;
use crate::registry::{AgentDescriptor, AgentRunner};
use crate::report::Report;
use crate::schema::{FieldSpec, Schema, ValidatedInput};
use crate::strategy::{ExploreRule, StrategyPolicy};

fn explore_rule() -> ExploreRule {
    ExploreRule {
        max_iterations: 3,
        no_progress_limit: 1,
        max_pages: 1,
    }
}

pub fn descriptor(deps: AgentDeps) -> AgentDescriptor {
    AgentDescriptor {
        name: "startup_listing".to_string(),
        description: "Extract startup profiles from any curated listing page".to_string(),
        input_schema: Schema::of(vec![
            FieldSpec::url("url")
                .required()
                .describe("Listing page to extract from"),
            FieldSpec::integer("max_startups")
                .default_value(12)
                .bounds(1, 1_000)
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
                    FieldSpec::url("linkedin_url"),
                    FieldSpec::text("description"),
                    FieldSpec::text_list("short_notes"),
                ]),
            )
            .required(),
        ]),
        strategy: StrategyPolicy::Exploratory(explore_rule()),
        runner: Arc::new(StartupListingRunner { deps }),
    }
}

struct StartupListingRunner {
    deps: AgentDeps,
}

#[async_trait]
impl AgentRunner for StartupListingRunner {
    async fn run(&self, input: &ValidatedInput, ctx: &RunContext) -> Result<Report> {
        let url = input.require_str("url")?;
        let cap = input.require_i64("max_startups")? as usize;

        let page = acquire_page(&self.deps, url, ctx, None).await?;

        let mut startups: Vec<Value> = Vec::new();
        let mut by_name: HashMap<String, usize> = HashMap::new();
        for item in extract_listing_items(&page.html, &page.final_url) {
            if startups.len() >= cap {
                break;
            }
            let key = item.name.to_lowercase();
            if by_name.contains_key(&key) {
                continue;
            }
            let mut startup = Map::new();
            startup.insert("name".to_string(), Value::String(item.name));
            if let Some(listing_url) = item.url {
                startup.insert("listing_url".to_string(), Value::String(listing_url));
            }
            if let Some(description) = item.description {
                startup.insert("description".to_string(), Value::String(description));
            }
            by_name.insert(key, startups.len());
            startups.push(Value::Object(startup));
        }

        // Model loop: each pass may enrich known entries or surface ones the
        // structural pass missed, and stops on the cap or lack of progress.
        let rule = explore_rule();
        let excerpt = prompt_excerpt(&page.html, 60_000);
        let mut stalled = 0u32;
        for _ in 0..rule.max_iterations {
            if startups.len() >= cap || ctx.expired() || !self.deps.llm.is_available() {
                break;
            }
            let known: Vec<&str> = startups
                .iter()
                .filter_map(|s| s["name"].as_str())
                .collect();
            let prompt = format!(
                "Extract startups from this listing page as a JSON array of objects \
                 with keys name, listing_url, linkedin_url, description, short_notes \
                 (short_notes is a list of tags). Only include startups actually on \
                 the page. Already captured, do not repeat: [{}]. Page content:\n\n{excerpt}",
                known.join(", ")
            );
            let mut progressed = false;
            for record in model_records(&self.deps, ctx, &prompt).await {
                let key = record.name.to_lowercase();
                if let Some(&i) = by_name.get(&key) {
                    if enrich(&mut startups[i], &record, &page.final_url) {
                        progressed = true;
                    }
                } else if startups.len() < cap {
                    by_name.insert(key, startups.len());
                    startups.push(startup_from_record(&record, &page.final_url));
                    progressed = true;
                }
            }
            if progressed {
                stalled = 0;
            } else {
                stalled += 1;
                if stalled >= rule.no_progress_limit {
                    break;
                }
            }
        }

        tracing::info!("startup listing captured {} startups from {url}", startups.len());
        let mut out = Map::new();
        out.insert("source_url".to_string(), Value::String(page.final_url));
        out.insert("startups".to_string(), Value::Array(startups));
        Ok(Report::new(out))
    }
}

fn startup_from_record(record: &MarkdownRecord, base_url: &str) -> Value {
    let mut startup = Map::new();
    startup.insert("name".to_string(), Value::String(record.name.clone()));
    for (field, value) in record_fields(record, base_url) {
        startup.insert(field, value);
    }
    Value::Object(startup)
}

/// Merge model output into an entry the structural pass already produced.
/// Existing values win; returns whether anything new landed.
fn enrich(startup: &mut Value, record: &MarkdownRecord, base_url: &str) -> bool {
    let Some(obj) = startup.as_object_mut() else {
        return false;
    };
    let mut changed = false;
    for (field, value) in record_fields(record, base_url) {
        if !obj.contains_key(&field) {
            obj.insert(field, value);
            changed = true;
        }
    }
    changed
}

fn record_fields(record: &MarkdownRecord, base_url: &str) -> Vec<(String, Value)> {
    let mut fields = Vec::new();
    if let Some(raw) = record.field("listing_url").or_else(|| record.url()) {
        if let Some(listing_url) = resolve_href(base_url, raw) {
            fields.push(("listing_url".to_string(), Value::String(listing_url)));
        }
    }
    if let Some(raw) = record.field("linkedin_url").or_else(|| record.field("linkedin")) {
        if let Some(linkedin_url) = normalize_linkedin(raw) {
            fields.push(("linkedin_url".to_string(), Value::String(linkedin_url)));
        }
    }
    if let Some(description) = record.description() {
        fields.push(("description".to_string(), Value::String(description.to_string())));
    }
    if let Some(notes) = record.field("short_notes").or_else(|| record.field("tags")) {
        let notes: Vec<Value> = notes
            .split(", ")
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .map(|n| Value::String(n.to_string()))
            .collect();
        if !notes.is_empty() {
            fields.push(("short_notes".to_string(), Value::Array(notes)));
        }
    }
    fields
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn record(pairs: &[(&str, &str)]) -> MarkdownRecord {
        MarkdownRecord {
            name: "Acme".to_string(),
            fields: pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect::<BTreeMap<_, _>>(),
        }
    }

    #[test]
    fn record_fields_normalize_urls_and_split_notes() {
        let record = record(&[
            ("listing_url", "/startups/acme"),
            ("linkedin_url", "linkedin.com/company/acme"),
            ("short_notes", "b2b, seed, climate"),
        ]);
        let fields = record_fields(&record, "https://listing.example/all");
        let map: Map<String, Value> = fields.into_iter().collect();
        assert_eq!(map["listing_url"], "https://listing.example/startups/acme");
        assert_eq!(map["linkedin_url"], "https://linkedin.com/company/acme");
        assert_eq!(map["short_notes"][2], "climate");
    }

    #[test]
    fn enrich_never_overwrites_structural_values() {
        let mut startup = serde_json::json!({
            "name": "Acme",
            "description": "From the markup"
        });
        let record = record(&[
            ("description", "From the model"),
            ("linkedin", "https://www.linkedin.com/company/acme"),
        ]);
        assert!(enrich(&mut startup, &record, "https://listing.example/"));
        assert_eq!(startup["description"], "From the markup");
        assert_eq!(startup["linkedin_url"], "https://www.linkedin.com/company/acme");
    }

    #[test]
    fn bogus_linkedin_hosts_are_dropped() {
        let record = record(&[("linkedin_url", "https://example.com/not-linkedin")]);
        let fields = record_fields(&record, "https://listing.example/");
        assert!(fields.iter().all(|(name, _)| name != "linkedin_url"));
    }
}
