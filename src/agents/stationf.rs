//! Station F companies directory agent.
//!
//! The directory sits behind a login wall but degrades to a public teaser.
//! With credentials the runner logs in over HTTP and carries the session
//! cookies; without them it fetches whatever the public page shows and
//! reports `authenticated: false`.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use scraper::{ElementRef, Html, Selector};
use serde_json::{Map, Value};
use url::Url;

use crate::acquisition::structured::{clean_text, resolve_href};
use crate::agents::{acquire_page, output_path_field, AgentDeps};
use crate::engine::RunContext;
use crate::navigation::{login, AuthOutcome, Credentials};
use crate::registry::{AgentDescriptor, AgentRunner};
use crate::report::Report;
use crate::schema::{FieldSpec, Schema, ValidatedInput};
use crate::strategy::{AuthRule, StrategyPolicy};

const DEFAULT_URL: &str = "https://hal2.stationf.co/companies";

fn auth_rule() -> AuthRule {
    AuthRule {
        identity_field: "email".to_string(),
        secret_field: "password".to_string(),
        login_url: None,
        public_fallback: true,
    }
}

pub fn descriptor(deps: AgentDeps) -> AgentDescriptor {
    AgentDescriptor {
        name: "stationf_companies".to_string(),
        description: "Extract companies from the Station F directory".to_string(),
        input_schema: Schema::of(vec![
            FieldSpec::url("url")
                .default_value(DEFAULT_URL)
                .describe("Station F companies page to extract from"),
            FieldSpec::integer("max_companies")
                .default_value(1_000)
                .bounds(1, 10_000)
                .describe("Maximum number of companies to capture"),
            FieldSpec::text("email").describe("Directory account email"),
            FieldSpec::text("password").describe("Directory account password"),
            output_path_field(),
        ]),
        output_schema: Schema::of(vec![
            FieldSpec::text("source_url").required(),
            FieldSpec::object_list(
                "companies",
                Schema::of(vec![
                    FieldSpec::text("name").required(),
                    FieldSpec::url("company_url"),
                    FieldSpec::url("website"),
                    FieldSpec::text("sector"),
                    FieldSpec::text("description"),
                ]),
            )
            .required(),
            FieldSpec::boolean("authenticated").required(),
        ]),
        strategy: StrategyPolicy::Authenticated(auth_rule()),
        runner: Arc::new(StationFRunner { deps }),
    }
}

struct StationFRunner {
    deps: AgentDeps,
}

#[async_trait]
impl AgentRunner for StationFRunner {
    async fn run(&self, input: &ValidatedInput, ctx: &RunContext) -> Result<Report> {
        let url = input.require_str("url")?;
        let cap = input.require_i64("max_companies")? as usize;
        let credentials = match (input.str("email"), input.str("password")) {
            (Some(email), Some(password)) => Some(Credentials {
                identity: email.to_string(),
                secret: password.to_string(),
            }),
            _ => None,
        };

        let rule = auth_rule();
        let step_ms = ctx.step_timeout().as_millis() as u64;
        let outcome = login(
            &self.deps.http,
            &rule,
            &login_url_for(url)?,
            credentials.as_ref(),
            step_ms,
        )
        .await?;

        let (html, final_url) = match &outcome {
            AuthOutcome::Authenticated { cookies } => {
                let headers = vec![("cookie".to_string(), cookies.join("; "))];
                let response = self.deps.http.get_with_headers(url, &headers, step_ms).await?;
                if !response.is_success() {
                    anyhow::bail!("directory answered {} after login", response.status);
                }
                (response.body, response.final_url)
            }
            AuthOutcome::PublicFallback { reason } => {
                tracing::warn!("extracting station f directory unauthenticated: {reason}");
                let page = acquire_page(&self.deps, url, ctx, None).await?;
                (page.html, page.final_url)
            }
        };

        let companies = parse_companies(&html, &final_url, cap);
        tracing::info!(
            "station f captured {} companies (authenticated={})",
            companies.len(),
            outcome.is_authenticated()
        );

        let mut out = Map::new();
        out.insert("source_url".to_string(), Value::String(url.to_string()));
        out.insert("companies".to_string(), Value::Array(companies));
        out.insert(
            "authenticated".to_string(),
            Value::Bool(outcome.is_authenticated()),
        );
        Ok(Report::new(out))
    }
}

/// The login form lives at `/login` on the directory host.
fn login_url_for(directory_url: &str) -> Result<String> {
    let mut parsed = Url::parse(directory_url)?;
    parsed.set_path("/login");
    parsed.set_query(None);
    parsed.set_fragment(None);
    Ok(parsed.to_string())
}

fn parse_companies(html: &str, base_url: &str, cap: usize) -> Vec<Value> {
    let doc = Html::parse_document(html);

    for selector in [
        "article",
        "div[class*='company']",
        "div[class*='card']",
        "div[class*='item']",
    ] {
        let sel = Selector::parse(selector).unwrap();
        let companies: Vec<Value> = doc
            .select(&sel)
            .filter_map(|card| parse_card(card, base_url))
            .take(cap)
            .collect();
        if !companies.is_empty() {
            return companies;
        }
    }

    // No recognizable cards; at least pick up the company links themselves.
    let link_sel = Selector::parse("a[href*='/companies/']").unwrap();
    let mut companies = Vec::new();
    let mut seen = std::collections::HashSet::new();
    for a in doc.select(&link_sel) {
        if companies.len() >= cap {
            break;
        }
        let name = clean_text(&a.text().collect::<Vec<_>>().join(" "));
        if name.len() < 2 || !seen.insert(name.to_lowercase()) {
            continue;
        }
        let mut company = Map::new();
        company.insert("name".to_string(), Value::String(name));
        if let Some(href) = a.value().attr("href") {
            if let Some(company_url) = resolve_href(base_url, href) {
                company.insert("company_url".to_string(), Value::String(company_url));
            }
        }
        companies.push(Value::Object(company));
    }
    companies
}

fn parse_card(card: ElementRef<'_>, base_url: &str) -> Option<Value> {
    let name = card_text(
        card,
        &[
            "[data-slot='item-title'] h5",
            "[data-slot='item-title']",
            "h1, h2, h3",
            "[class*='name']",
            "[class*='title']",
        ],
        2,
    )?;

    let mut company = Map::new();
    company.insert("name".to_string(), Value::String(name.clone()));

    let link_sel = Selector::parse("a[href*='/companies/']").unwrap();
    if let Some(href) = card.select(&link_sel).next().and_then(|a| a.value().attr("href")) {
        if let Some(company_url) = resolve_href(base_url, href) {
            company.insert("company_url".to_string(), Value::String(company_url));
        }
    }

    if let Some(description) = card_text(
        card,
        &[
            "[data-slot='item-description']",
            "[class*='description']",
            "[class*='tagline']",
            "p",
        ],
        4,
    ) {
        if description != name {
            company.insert("description".to_string(), Value::String(description));
        }
    }

    let website_sel = Selector::parse("a[href^='http']").unwrap();
    for a in card.select(&website_sel) {
        let href = a.value().attr("href").unwrap_or("");
        if !href.to_lowercase().contains("stationf.co") {
            company.insert("website".to_string(), Value::String(href.to_string()));
            break;
        }
    }

    if let Some(sector) = card_text(
        card,
        &["[class*='tag']", "[class*='badge']", "[class*='category']"],
        2,
    ) {
        company.insert("sector".to_string(), Value::String(sector));
    }

    Some(Value::Object(company))
}

fn card_text(card: ElementRef<'_>, selectors: &[&str], min_len: usize) -> Option<String> {
    for selector in selectors {
        let sel = Selector::parse(selector).unwrap();
        for el in card.select(&sel) {
            let text = clean_text(&el.text().collect::<Vec<_>>().join(" "));
            if text.len() >= min_len {
                return Some(text);
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"
        <html><body>
          <article>
            <div data-slot="item-title"><h5>Heliotrope</h5></div>
            <div data-slot="item-description">Solar forecasting for grid operators</div>
            <a href="/companies/heliotrope">Profile</a>
            <a href="https://heliotrope.example">Website</a>
            <span class="tag">Energy</span>
          </article>
          <article><p>Footer teaser without a name slot</p></article>
        </body></html>"#;

    #[test]
    fn cards_map_to_companies() {
        let companies = parse_companies(PAGE, "https://hal2.stationf.co/companies", 10);
        assert_eq!(companies.len(), 1);

        let c = companies[0].as_object().unwrap();
        assert_eq!(c["name"], "Heliotrope");
        assert_eq!(c["company_url"], "https://hal2.stationf.co/companies/heliotrope");
        assert_eq!(c["description"], "Solar forecasting for grid operators");
        assert_eq!(c["website"], "https://heliotrope.example");
        assert_eq!(c["sector"], "Energy");
    }

    #[test]
    fn bare_links_back_up_missing_cards() {
        let html = r#"<div><a href="/companies/acme">Acme Robotics</a></div>"#;
        let companies = parse_companies(html, "https://hal2.stationf.co/companies", 10);
        assert_eq!(companies.len(), 1);
        assert_eq!(companies[0]["name"], "Acme Robotics");
        assert_eq!(
            companies[0]["company_url"],
            "https://hal2.stationf.co/companies/acme"
        );
    }

    #[test]
    fn login_url_is_derived_from_the_directory_host() {
        assert_eq!(
            login_url_for("https://hal2.stationf.co/companies?view=all").unwrap(),
            "https://hal2.stationf.co/login"
        );
    }
}
