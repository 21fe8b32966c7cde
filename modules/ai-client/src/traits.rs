use async_trait::async_trait;

use crate::error::ProviderError;

// =============================================================================
// Completion
// =============================================================================

/// The raw output of one answer-engine call.
#[derive(Debug, Clone)]
pub struct Completion {
    pub text: String,
    pub token_in: i64,
    pub token_out: i64,
}

// =============================================================================
// ProviderClient Trait
// =============================================================================

/// One external answer engine. Implementations are stateless: every call is
/// parameterized only by the prompt text, so clients can be shared freely
/// across concurrent scan units.
#[async_trait]
pub trait ProviderClient: Send + Sync {
    /// Wire name ("openai", "gemini", "perplexity") used in logs and run rows.
    fn name(&self) -> &'static str;

    /// Execute a single prompt and return the response text plus token counts.
    /// No retry here; wrap calls with [`crate::retry::with_retry`].
    async fn execute(&self, prompt: &str) -> Result<Completion, ProviderError>;
}
