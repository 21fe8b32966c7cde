//! The set of answer-engine clients available to this deployment.

use std::collections::HashMap;
use std::sync::Arc;

use ai_client::{GeminiAgent, OpenAiAgent, PerplexityAgent, ProviderClient};
use echowatch_common::{Config, Org, ProviderKind};

/// Configured provider clients keyed by kind. A provider is "enabled" for an
/// org when a credentialed client exists AND the org's tier allows it.
#[derive(Clone, Default)]
pub struct ProviderSet {
    clients: HashMap<ProviderKind, Arc<dyn ProviderClient>>,
}

impl ProviderSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build clients for every provider with a configured credential.
    pub fn from_config(config: &Config) -> Self {
        let mut set = Self::new();
        if !config.openai_api_key.is_empty() {
            set.insert(
                ProviderKind::OpenAi,
                Arc::new(OpenAiAgent::new(&config.openai_api_key)),
            );
        }
        if !config.gemini_api_key.is_empty() {
            set.insert(
                ProviderKind::Gemini,
                Arc::new(GeminiAgent::new(&config.gemini_api_key)),
            );
        }
        if !config.perplexity_api_key.is_empty() {
            set.insert(
                ProviderKind::Perplexity,
                Arc::new(PerplexityAgent::new(&config.perplexity_api_key)),
            );
        }
        set
    }

    pub fn insert(&mut self, kind: ProviderKind, client: Arc<dyn ProviderClient>) {
        self.clients.insert(kind, client);
    }

    pub fn get(&self, kind: ProviderKind) -> Option<Arc<dyn ProviderClient>> {
        self.clients.get(&kind).cloned()
    }

    /// Providers with credentials, in stable order.
    pub fn configured(&self) -> Vec<ProviderKind> {
        let mut kinds: Vec<ProviderKind> = self.clients.keys().copied().collect();
        kinds.sort();
        kinds
    }

    /// Providers this org may scan: credentialed and tier-allowed.
    pub fn enabled_for(&self, org: &Org) -> Vec<ProviderKind> {
        self.configured()
            .into_iter()
            .filter(|p| org.tier >= p.min_tier())
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}
