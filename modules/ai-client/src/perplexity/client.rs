use std::time::Duration;

use tracing::debug;

use super::types::*;
use crate::error::ProviderError;

const PERPLEXITY_API_URL: &str = "https://api.perplexity.ai";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

const PROVIDER: &str = "perplexity";

pub(crate) struct PerplexityClient {
    api_key: String,
    http: reqwest::Client,
    base_url: String,
}

impl PerplexityClient {
    pub fn new(api_key: &str) -> Self {
        Self {
            api_key: api_key.to_string(),
            http: reqwest::Client::new(),
            base_url: PERPLEXITY_API_URL.to_string(),
        }
    }

    pub fn with_base_url(mut self, url: &str) -> Self {
        self.base_url = url.to_string();
        self
    }

    pub async fn chat(&self, request: &ChatRequest) -> Result<ChatResponse, ProviderError> {
        let url = format!("{}/chat/completions", self.base_url);

        debug!(model = %request.model, "Perplexity chat request");

        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(request)
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await
            .map_err(|e| ProviderError::from_transport(PROVIDER, e))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::from_status(PROVIDER, status, body));
        }

        response
            .json()
            .await
            .map_err(|e| ProviderError::Malformed {
                provider: PROVIDER,
                detail: e.to_string(),
            })
    }
}
