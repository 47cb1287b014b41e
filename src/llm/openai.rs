//! OpenAI-compatible chat completions backend.
//!
//! Works against api.openai.com and against LiteLLM-style gateways; set
//! `OPENAI_API_URL` to point at a gateway.

use std::time::Duration;

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

use super::LlmClient;

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

pub struct OpenAiClient {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    model: String,
}

impl OpenAiClient {
    pub fn new(api_key: Option<String>, model: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key,
            model: model.into(),
        }
    }

    pub fn from_env() -> Self {
        let mut client = Self::new(
            std::env::var("OPENAI_API_KEY").ok(),
            std::env::var("HARVEST_LLM_MODEL").unwrap_or_else(|_| super::DEFAULT_MODEL.to_string()),
        );
        if let Ok(base_url) = std::env::var("OPENAI_API_URL") {
            client.base_url = base_url;
        }
        client
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

#[async_trait]
impl LlmClient for OpenAiClient {
    fn name(&self) -> &str {
        "openai"
    }

    fn is_available(&self) -> bool {
        self.api_key.as_deref().is_some_and(|k| !k.trim().is_empty())
    }

    async fn complete(&self, prompt: &str, timeout_ms: u64) -> Result<String> {
        let api_key = self
            .api_key
            .as_deref()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| anyhow!("OPENAI_API_KEY is not set"))?;

        let url = format!("{}/chat/completions", self.base_url.trim_end_matches('/'));
        let body = json!({
            "model": self.model,
            "messages": [{ "role": "user", "content": prompt }],
            "temperature": 0,
        });

        let response = self
            .client
            .post(&url)
            .bearer_auth(api_key)
            .json(&body)
            .timeout(Duration::from_millis(timeout_ms))
            .send()
            .await
            .map_err(|e| anyhow!("chat completion request failed: {e}"))?;

        let status = response.status();
        let text = response.text().await.unwrap_or_default();
        if !status.is_success() {
            bail!(
                "chat completion returned {}: {}",
                status,
                text.chars().take(300).collect::<String>()
            );
        }
        parse_completion(&text)
    }
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Deserialize)]
struct ChatMessage {
    content: Option<String>,
}

fn parse_completion(raw: &str) -> Result<String> {
    let response: ChatResponse = serde_json::from_str(raw)
        .map_err(|e| anyhow!("failed to parse chat completion response: {e}"))?;
    let first = response
        .choices
        .first()
        .ok_or_else(|| anyhow!("chat completion contained no choices"))?;
    Ok(first.message.content.clone().unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn completion_text_is_lifted_from_the_first_choice() {
        let raw = r#"{"choices":[{"message":{"role":"assistant","content":"hello"}}]}"#;
        assert_eq!(parse_completion(raw).unwrap(), "hello");

        let empty = r#"{"choices":[]}"#;
        assert!(parse_completion(empty).is_err());
    }

    #[tokio::test]
    async fn complete_sends_the_prompt_and_bearer_token() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(header("authorization", "Bearer test-key"))
            .and(body_partial_json(serde_json::json!({
                "messages": [{ "role": "user", "content": "list the startups" }]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "choices": [{ "message": { "role": "assistant", "content": "1. Acme" } }]
            })))
            .mount(&server)
            .await;

        let client = OpenAiClient::new(Some("test-key".to_string()), "test-model")
            .with_base_url(format!("{}/v1", server.uri()));
        let answer = client.complete("list the startups", 5_000).await.unwrap();
        assert_eq!(answer, "1. Acme");
    }

    #[tokio::test]
    async fn missing_key_is_an_error_before_any_request() {
        let client = OpenAiClient::new(None, "test-model");
        assert!(!client.is_available());
        let err = client.complete("hi", 1_000).await.unwrap_err();
        assert!(err.to_string().contains("OPENAI_API_KEY"));
    }
}
