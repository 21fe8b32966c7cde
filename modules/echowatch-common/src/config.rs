use std::env;

use tracing::info;

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    // Postgres
    pub database_url: String,

    // Answer-engine providers
    pub openai_api_key: String,
    pub gemini_api_key: String,
    pub perplexity_api_key: String,

    // Web server
    pub web_host: String,
    pub web_port: u16,
}

impl Config {
    /// Load the full config for the scan pipeline.
    /// Panics with a clear message if required vars are missing.
    pub fn scan_from_env() -> Self {
        Self {
            database_url: required_env("DATABASE_URL"),
            openai_api_key: env::var("OPENAI_API_KEY").unwrap_or_default(),
            gemini_api_key: env::var("GEMINI_API_KEY").unwrap_or_default(),
            perplexity_api_key: env::var("PERPLEXITY_API_KEY").unwrap_or_default(),
            web_host: env::var("WEB_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            web_port: env::var("WEB_PORT")
                .unwrap_or_else(|_| "3000".to_string())
                .parse()
                .expect("WEB_PORT must be a number"),
        }
    }

    /// Load a minimal config for the API server. Provider keys are needed
    /// here too because the trigger endpoint runs scans inline.
    pub fn api_from_env() -> Self {
        Self::scan_from_env()
    }

    /// Log which secrets are configured without printing their values.
    pub fn log_redacted(&self) {
        info!(
            openai = !self.openai_api_key.is_empty(),
            gemini = !self.gemini_api_key.is_empty(),
            perplexity = !self.perplexity_api_key.is_empty(),
            "Provider credentials loaded"
        );
    }
}

fn required_env(key: &str) -> String {
    env::var(key).unwrap_or_else(|_| panic!("{key} environment variable is required"))
}
