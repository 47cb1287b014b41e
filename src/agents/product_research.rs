//! Company and product research agent.
//!
//! Given any company or listing URL, builds a company profile from the
//! page's own metadata (OpenGraph, JSON-LD organization data) and asks the
//! model to name the products behind it, following product-shaped links
//! when the entry page is thin. The company name and description plus at
//! least one product are the bar for a complete report.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use scraper::{Html, Selector};
use serde_json::{Map, Value};

use crate::acquisition::extract_meta_summary;
use crate::acquisition::structured::clean_text;
use crate::agents::{
    acquire_page, model_records, normalize_linkedin, output_path_field, prompt_excerpt, AgentDeps,
};
use crate::engine::RunContext;
use crate::navigation::candidate_links;
use crate::registry::{AgentDescriptor, AgentRunner};
use crate::report::Report;
use crate::schema::{FieldSpec, Schema, ValidatedInput};
use crate::strategy::{ExploreRule, StrategyPolicy};

const PRODUCT_KEYWORDS: [&str; 7] = [
    "product",
    "products",
    "features",
    "solutions",
    "platform",
    "pricing",
    "plans",
];

fn explore_rule() -> ExploreRule {
    ExploreRule {
        max_iterations: 4,
        no_progress_limit: 2,
        max_pages: 3,
    }
}

pub fn descriptor(deps: AgentDeps) -> AgentDescriptor {
    AgentDescriptor {
        name: "product_research".to_string(),
        description: "Research a company and its products from a single URL".to_string(),
        input_schema: Schema::of(vec![
            FieldSpec::url("url")
                .required()
                .describe("Company homepage or listing entry to research"),
            FieldSpec::integer("max_products")
                .default_value(3)
                .bounds(1, 10)
                .describe("Maximum number of products to describe"),
            output_path_field(),
        ]),
        output_schema: Schema::of(vec![
            FieldSpec::object(
                "company",
                Schema::of(vec![
                    FieldSpec::text("name").required(),
                    FieldSpec::text("description").required(),
                    FieldSpec::url("logo_url"),
                    FieldSpec::url("official_website"),
                    FieldSpec::url("linkedin_page"),
                    FieldSpec::text_list("other_facts"),
                ]),
            )
            .required(),
            FieldSpec::object_list(
                "products",
                Schema::of(vec![
                    FieldSpec::text("product_name").required(),
                    FieldSpec::text("what_it_does").required(),
                    FieldSpec::text("go_to_market"),
                    FieldSpec::text("target_audience"),
                    FieldSpec::text("description"),
                ]),
            )
            .required()
            .at_least(1),
        ]),
        strategy: StrategyPolicy::Exploratory(explore_rule()),
        runner: Arc::new(ProductResearchRunner { deps }),
    }
}

struct ProductResearchRunner {
    deps: AgentDeps,
}

#[async_trait]
impl AgentRunner for ProductResearchRunner {
    async fn run(&self, input: &ValidatedInput, ctx: &RunContext) -> Result<Report> {
        let url = input.require_str("url")?;
        let cap = input.require_i64("max_products")? as usize;
        let rule = explore_rule();

        let page = acquire_page(&self.deps, url, ctx, None).await?;
        let meta = extract_meta_summary(&page.html);

        let name = meta
            .organization
            .clone()
            .or_else(|| meta.site_name.clone())
            .or_else(|| meta.title.clone());
        let description = meta
            .description
            .clone()
            .or_else(|| first_paragraph(&page.html));

        // Pull in a couple of product-shaped pages so the model sees more
        // than the landing copy.
        let mut corpus = prompt_excerpt(&page.html, 40_000);
        let mut visited = vec![page.final_url.clone()];
        let step_ms = ctx.step_timeout().as_millis() as u64;
        for link in candidate_links(&page.html, &page.final_url, &PRODUCT_KEYWORDS)
            .into_iter()
            .take(rule.max_pages as usize - 1)
        {
            if ctx.expired() {
                break;
            }
            match self.deps.http.get(&link, step_ms).await {
                Ok(response) if response.is_success() => {
                    corpus.push_str("\n\n");
                    corpus.push_str(&prompt_excerpt(&response.body, 20_000));
                    visited.push(link);
                }
                Ok(_) | Err(_) => {}
            }
        }

        let prompt = format!(
            "From this company's pages, list up to {cap} distinct products or plans \
             as a JSON array of objects with keys name, what_it_does (one sentence \
             on the core value), go_to_market, target_audience, description. Focus \
             on the core value and business model. Pages:\n\n{corpus}"
        );
        let mut products = Vec::new();
        for record in model_records(&self.deps, ctx, &prompt).await {
            if products.len() >= cap {
                break;
            }
            let Some(what_it_does) = record
                .field("what_it_does")
                .or_else(|| record.description())
            else {
                continue;
            };
            let mut product = Map::new();
            product.insert("product_name".to_string(), Value::String(record.name.clone()));
            product.insert(
                "what_it_does".to_string(),
                Value::String(what_it_does.to_string()),
            );
            for field in ["go_to_market", "target_audience", "description"] {
                if let Some(value) = record.field(field) {
                    product.insert(field.to_string(), Value::String(value.to_string()));
                }
            }
            products.push(Value::Object(product));
        }

        // Without a model the company's own positioning is the one product
        // we can still vouch for.
        if products.is_empty() {
            if let (Some(name), Some(description)) = (&name, &description) {
                let mut product = Map::new();
                product.insert("product_name".to_string(), Value::String(name.clone()));
                product.insert("what_it_does".to_string(), Value::String(description.clone()));
                products.push(Value::Object(product));
            }
        }

        let mut company = Map::new();
        if let Some(name) = name {
            company.insert("name".to_string(), Value::String(name));
        }
        if let Some(description) = description {
            company.insert("description".to_string(), Value::String(description));
        }
        if let Some(logo) = meta.logo.clone().or_else(|| meta.image.clone()) {
            company.insert("logo_url".to_string(), Value::String(logo));
        }
        let website = meta.canonical.clone().unwrap_or_else(|| page.final_url.clone());
        company.insert("official_website".to_string(), Value::String(website));
        if let Some(linkedin) = meta.linkedin().and_then(|l| normalize_linkedin(l)) {
            company.insert("linkedin_page".to_string(), Value::String(linkedin));
        }
        let facts = company_facts(&meta, &visited);
        if !facts.is_empty() {
            company.insert(
                "other_facts".to_string(),
                Value::Array(facts.into_iter().map(Value::String).collect()),
            );
        }

        tracing::info!(
            "product research on {url}: {} products, {} pages read",
            products.len(),
            visited.len()
        );
        let mut out = Map::new();
        out.insert("company".to_string(), Value::Object(company));
        out.insert("products".to_string(), Value::Array(products));
        Ok(Report::new(out))
    }
}

fn company_facts(meta: &crate::acquisition::MetaSummary, visited: &[String]) -> Vec<String> {
    let mut facts: Vec<String> = meta
        .same_as
        .iter()
        .map(|link| format!("profile: {link}"))
        .collect();
    if visited.len() > 1 {
        facts.push(format!("read {} pages of the site", visited.len()));
    }
    facts
}

/// First substantial paragraph of the page, as a description of last resort.
fn first_paragraph(html: &str) -> Option<String> {
    let doc = Html::parse_document(html);
    let sel = Selector::parse("p").unwrap();
    for p in doc.select(&sel) {
        let text = clean_text(&p.text().collect::<Vec<_>>().join(" "));
        if text.len() > 40 {
            return Some(crate::acquisition::structured::truncate(&text, 500));
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_paragraph_skips_short_boilerplate() {
        let html = r#"<html><body>
            <p>Menu</p>
            <p>We build battery analytics software that predicts cell degradation years ahead.</p>
        </body></html>"#;
        assert_eq!(
            first_paragraph(html).as_deref(),
            Some("We build battery analytics software that predicts cell degradation years ahead.")
        );
        assert_eq!(first_paragraph("<html><body><p>Hi</p></body></html>"), None);
    }

    #[test]
    fn facts_carry_social_profiles() {
        let meta = crate::acquisition::MetaSummary {
            same_as: vec!["https://x.com/acme".to_string()],
            ..Default::default()
        };
        let facts = company_facts(&meta, &["https://acme.example/".to_string()]);
        assert_eq!(facts, vec!["profile: https://x.com/acme".to_string()]);
    }
}
