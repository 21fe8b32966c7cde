mod client;
pub(crate) mod types;

use async_trait::async_trait;

use crate::error::ProviderError;
use crate::traits::{Completion, ProviderClient};
use client::PerplexityClient;
use types::*;

const DEFAULT_MODEL: &str = "sonar";

// =============================================================================
// Perplexity Agent
// =============================================================================

/// Perplexity speaks the OpenAI chat-completions dialect but cites sources
/// inline, which makes it the richest provider for citation mining.
#[derive(Clone)]
pub struct PerplexityAgent {
    api_key: String,
    model: String,
    base_url: Option<String>,
}

impl PerplexityAgent {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model: DEFAULT_MODEL.to_string(),
            base_url: None,
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    fn client(&self) -> PerplexityClient {
        let client = PerplexityClient::new(&self.api_key);
        match self.base_url {
            Some(ref url) => client.with_base_url(url),
            None => client,
        }
    }
}

#[async_trait]
impl ProviderClient for PerplexityAgent {
    fn name(&self) -> &'static str {
        "perplexity"
    }

    async fn execute(&self, prompt: &str) -> Result<Completion, ProviderError> {
        let request = ChatRequest {
            model: self.model.clone(),
            messages: vec![ChatMessage {
                role: "user".to_string(),
                content: prompt.to_string(),
            }],
        };

        let response = self.client().chat(&request).await?;

        let text = response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| ProviderError::Malformed {
                provider: "perplexity",
                detail: "no choices in response".to_string(),
            })?;

        let usage = response.usage.unwrap_or_default();
        Ok(Completion {
            text,
            token_in: usage.prompt_tokens,
            token_out: usage.completion_tokens,
        })
    }
}
