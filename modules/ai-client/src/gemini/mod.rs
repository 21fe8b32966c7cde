mod client;
pub(crate) mod types;

use async_trait::async_trait;

use crate::error::ProviderError;
use crate::traits::{Completion, ProviderClient};
use client::GeminiClient;
use types::*;

const DEFAULT_MODEL: &str = "gemini-2.0-flash";

// =============================================================================
// Gemini Agent
// =============================================================================

#[derive(Clone)]
pub struct GeminiAgent {
    api_key: String,
    model: String,
    base_url: Option<String>,
}

impl GeminiAgent {
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

    fn client(&self) -> GeminiClient {
        let client = GeminiClient::new(&self.api_key);
        match self.base_url {
            Some(ref url) => client.with_base_url(url),
            None => client,
        }
    }
}

#[async_trait]
impl ProviderClient for GeminiAgent {
    fn name(&self) -> &'static str {
        "gemini"
    }

    async fn execute(&self, prompt: &str) -> Result<Completion, ProviderError> {
        let request = GenerateRequest {
            contents: vec![Content {
                parts: vec![Part {
                    text: prompt.to_string(),
                }],
            }],
        };

        let response = self.client().generate(&self.model, &request).await?;

        // Gemini splits an answer across parts; concatenate them.
        let text: String = response
            .candidates
            .into_iter()
            .next()
            .map(|c| {
                c.content
                    .parts
                    .into_iter()
                    .map(|p| p.text)
                    .collect::<Vec<_>>()
                    .join("")
            })
            .ok_or_else(|| ProviderError::Malformed {
                provider: "gemini",
                detail: "no candidates in response".to_string(),
            })?;

        let usage = response.usage_metadata.unwrap_or_default();
        Ok(Completion {
            text,
            token_in: usage.prompt_token_count,
            token_out: usage.candidates_token_count,
        })
    }
}
