use thiserror::Error;

/// Typed failure of one provider call. The `retryable` split drives the
/// retry combinator: auth and malformed-request failures are fatal for the
/// call; transport-level failures and server errors are worth retrying.
#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("{provider}: authentication rejected ({status})")]
    Auth { provider: &'static str, status: u16 },

    #[error("{provider}: request rejected ({status}): {body}")]
    BadRequest {
        provider: &'static str,
        status: u16,
        body: String,
    },

    #[error("{provider}: API error ({status}): {body}")]
    Api {
        provider: &'static str,
        status: u16,
        body: String,
    },

    #[error("{provider}: request timed out")]
    Timeout { provider: &'static str },

    #[error("{provider}: network error: {source}")]
    Network {
        provider: &'static str,
        #[source]
        source: reqwest::Error,
    },

    #[error("{provider}: malformed response: {detail}")]
    Malformed {
        provider: &'static str,
        detail: String,
    },
}

impl ProviderError {
    /// Whether the retry combinator should attempt this call again.
    pub fn retryable(&self) -> bool {
        match self {
            ProviderError::Auth { .. } => false,
            ProviderError::BadRequest { .. } => false,
            ProviderError::Malformed { .. } => false,
            ProviderError::Api { .. } => true,
            ProviderError::Timeout { .. } => true,
            ProviderError::Network { .. } => true,
        }
    }

    /// Classify a non-2xx HTTP response.
    pub(crate) fn from_status(provider: &'static str, status: u16, body: String) -> Self {
        match status {
            401 | 403 => ProviderError::Auth { provider, status },
            400 => ProviderError::BadRequest {
                provider,
                status,
                body,
            },
            _ => ProviderError::Api {
                provider,
                status,
                body,
            },
        }
    }

    /// Classify a reqwest transport error.
    pub(crate) fn from_transport(provider: &'static str, source: reqwest::Error) -> Self {
        if source.is_timeout() {
            ProviderError::Timeout { provider }
        } else {
            ProviderError::Network { provider, source }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auth_and_bad_request_are_fatal() {
        assert!(!ProviderError::from_status("openai", 401, String::new()).retryable());
        assert!(!ProviderError::from_status("openai", 403, String::new()).retryable());
        assert!(!ProviderError::from_status("openai", 400, "bad".into()).retryable());
    }

    #[test]
    fn server_errors_are_retryable() {
        assert!(ProviderError::from_status("gemini", 500, String::new()).retryable());
        assert!(ProviderError::from_status("gemini", 503, String::new()).retryable());
        assert!(ProviderError::from_status("gemini", 429, String::new()).retryable());
    }
}
