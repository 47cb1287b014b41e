//! Completion backends for strategies that summarize or restructure page
//! content. Backends are optional: every runner must keep producing reports
//! when [`NoopLlm`] is configured.

pub mod gemini;
pub mod openai;

pub use gemini::GeminiClient;
pub use openai::OpenAiClient;

use std::sync::Arc;

use anyhow::{bail, Result};
use async_trait::async_trait;

/// Deployments proxy through an OpenAI-compatible gateway, so the same model
/// name is the default for both backends.
pub const DEFAULT_MODEL: &str = "gemini-2.5-flash-lite-preview-09-2025";

/// A text-in, text-out completion backend.
#[async_trait]
pub trait LlmClient: Send + Sync {
    fn name(&self) -> &str;

    /// Whether the backend is configured well enough to attempt a call.
    fn is_available(&self) -> bool {
        true
    }

    async fn complete(&self, prompt: &str, timeout_ms: u64) -> Result<String>;
}

/// Backend used when no API key is configured. Always errors, so callers
/// fall through to their structural extraction path.
pub struct NoopLlm;

#[async_trait]
impl LlmClient for NoopLlm {
    fn name(&self) -> &str {
        "none"
    }

    fn is_available(&self) -> bool {
        false
    }

    async fn complete(&self, _prompt: &str, _timeout_ms: u64) -> Result<String> {
        bail!("no completion backend configured");
    }
}

/// Pick a backend from the environment.
///
/// `HARVEST_LLM_BACKEND` (`openai`, `gemini`, `none`) forces a choice.
/// When unset, the first backend with an API key wins: `OPENAI_API_KEY`
/// then `GOOGLE_API_KEY`. With neither key present this returns [`NoopLlm`].
pub fn from_env() -> Arc<dyn LlmClient> {
    match std::env::var("HARVEST_LLM_BACKEND").ok().as_deref() {
        Some("openai") => Arc::new(OpenAiClient::from_env()),
        Some("gemini") => Arc::new(GeminiClient::from_env()),
        Some("none") => Arc::new(NoopLlm),
        Some(other) => {
            tracing::warn!("unknown completion backend '{other}', disabling");
            Arc::new(NoopLlm)
        }
        None => {
            if std::env::var("OPENAI_API_KEY").is_ok() {
                Arc::new(OpenAiClient::from_env())
            } else if std::env::var("GOOGLE_API_KEY").is_ok() {
                Arc::new(GeminiClient::from_env())
            } else {
                Arc::new(NoopLlm)
            }
        }
    }
}
