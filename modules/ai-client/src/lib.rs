pub mod error;
pub mod retry;
pub mod traits;

pub mod gemini;
pub mod openai;
pub mod perplexity;

pub use error::ProviderError;
pub use gemini::GeminiAgent;
pub use openai::OpenAiAgent;
pub use perplexity::PerplexityAgent;
pub use retry::{with_retry, RetryPolicy};
pub use traits::{Completion, ProviderClient};
