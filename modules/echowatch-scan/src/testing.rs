//! Test fixtures: scripted provider clients and domain-object builders.
//! Compiled for tests only (`test-support` feature).

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use uuid::Uuid;

use ai_client::{Completion, ProviderClient, ProviderError};
use echowatch_common::{Org, Prompt, ProviderKind, SubscriptionTier};

use crate::providers::ProviderSet;

// ---------------------------------------------------------------------------
// MockProvider
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub enum MockBehavior {
    /// Always return this response text.
    Succeed(String),
    /// Always fail with a retryable 503.
    FailTransient,
    /// Always fail with a fatal 401.
    FailAuth,
    /// Fail `failures` times with a 503, then return the text.
    FlakyThenSucceed { failures: u32, text: String },
}

pub struct MockProvider {
    name: &'static str,
    behavior: MockBehavior,
    calls: AtomicU32,
}

impl MockProvider {
    pub fn new(name: &'static str, behavior: MockBehavior) -> Self {
        Self {
            name,
            behavior,
            calls: AtomicU32::new(0),
        }
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ProviderClient for MockProvider {
    fn name(&self) -> &'static str {
        self.name
    }

    async fn execute(&self, _prompt: &str) -> Result<Completion, ProviderError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.behavior {
            MockBehavior::Succeed(text) => Ok(completion(text)),
            MockBehavior::FailTransient => Err(ProviderError::Api {
                provider: self.name,
                status: 503,
                body: "overloaded".to_string(),
            }),
            MockBehavior::FailAuth => Err(ProviderError::Auth {
                provider: self.name,
                status: 401,
            }),
            MockBehavior::FlakyThenSucceed { failures, text } => {
                if call < *failures {
                    Err(ProviderError::Api {
                        provider: self.name,
                        status: 503,
                        body: "overloaded".to_string(),
                    })
                } else {
                    Ok(completion(text))
                }
            }
        }
    }
}

fn completion(text: &str) -> Completion {
    Completion {
        text: text.to_string(),
        token_in: 20,
        token_out: text.len() as i64,
    }
}

// ---------------------------------------------------------------------------
// Builders
// ---------------------------------------------------------------------------

pub fn make_org(brand: &str, tier: SubscriptionTier) -> Org {
    Org {
        id: Uuid::new_v4(),
        name: brand.to_string(),
        domain: format!("{}.com", brand.to_lowercase()),
        brand_names: vec![brand.to_string()],
        tier,
        utc_offset_minutes: 0,
    }
}

pub fn make_prompt(org_id: Uuid, text: &str) -> Prompt {
    Prompt {
        id: Uuid::new_v4(),
        org_id,
        text: text.to_string(),
        active: true,
    }
}

/// A provider set where every given kind shares one scripted behavior.
pub fn mock_provider_set(kinds: &[ProviderKind], behavior: MockBehavior) -> ProviderSet {
    let mut set = ProviderSet::new();
    for &kind in kinds {
        set.insert(
            kind,
            Arc::new(MockProvider::new(kind.as_str(), behavior.clone())),
        );
    }
    set
}
