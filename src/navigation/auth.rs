//! Form login for sources that gate their listings behind an account.

use anyhow::{bail, Result};
use scraper::{Html, Selector};

use crate::acquisition::HttpClient;
use crate::strategy::AuthRule;

#[derive(Debug, Clone)]
pub struct Credentials {
    pub identity: String,
    pub secret: String,
}

/// What a login attempt produced. `PublicFallback` carries the reason so the
/// runner can record it on the report instead of failing the run.
#[derive(Debug)]
pub enum AuthOutcome {
    Authenticated { cookies: Vec<String> },
    PublicFallback { reason: String },
}

impl AuthOutcome {
    pub fn is_authenticated(&self) -> bool {
        matches!(self, AuthOutcome::Authenticated { .. })
    }
}

/// Submit the login form and judge the outcome by the session cookies the
/// server hands back. A refusal only errors when the rule forbids public
/// fallback.
pub async fn login(
    http: &HttpClient,
    rule: &AuthRule,
    login_url: &str,
    credentials: Option<&Credentials>,
    timeout_ms: u64,
) -> Result<AuthOutcome> {
    let Some(credentials) = credentials else {
        return fall_back(rule, "no credentials supplied".to_string());
    };

    // Login forms routinely carry hidden CSRF fields that must be echoed.
    let mut fields: Vec<(String, String)> = match http.get(login_url, timeout_ms).await {
        Ok(page) if page.is_success() => hidden_form_fields(&page.body),
        _ => Vec::new(),
    };
    fields.push((rule.identity_field.clone(), credentials.identity.clone()));
    fields.push((rule.secret_field.clone(), credentials.secret.clone()));

    let response = match http.post_form(login_url, &fields, &[], timeout_ms).await {
        Ok(response) => response,
        Err(err) => return fall_back(rule, format!("login request failed: {err}")),
    };

    let cookies: Vec<String> = response
        .set_cookies()
        .iter()
        .map(|c| c.to_string())
        .collect();
    if response.status < 400 && !cookies.is_empty() {
        tracing::info!("authenticated against {login_url}, {} cookies", cookies.len());
        return Ok(AuthOutcome::Authenticated { cookies });
    }

    fall_back(
        rule,
        format!(
            "login rejected with status {} ({} cookies set)",
            response.status,
            cookies.len()
        ),
    )
}

fn fall_back(rule: &AuthRule, reason: String) -> Result<AuthOutcome> {
    if !rule.public_fallback {
        bail!("authentication required: {reason}");
    }
    tracing::warn!("continuing without authentication: {reason}");
    Ok(AuthOutcome::PublicFallback { reason })
}

/// Name/value pairs of `<input type="hidden">` fields in the first form.
pub fn hidden_form_fields(html: &str) -> Vec<(String, String)> {
    let document = Html::parse_document(html);
    let sel = Selector::parse(r#"form input[type="hidden"]"#).unwrap();
    document
        .select(&sel)
        .filter_map(|el| {
            let name = el.value().attr("name")?;
            let value = el.value().attr("value").unwrap_or("");
            Some((name.to_string(), value.to_string()))
        })
        .collect()
}
