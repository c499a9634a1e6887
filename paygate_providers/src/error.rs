use paygate_engine::traits::{ProviderError, WebhookError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProviderApiError {
    #[error("Could not initialize client: {0}")]
    Initialization(String),
    #[error("Could not reach the provider: {0}")]
    Network(String),
    #[error("The provider did not respond in time: {0}")]
    Timeout(String),
    #[error("Request failed. Error {status}. {message}")]
    QueryError { status: u16, message: String },
    #[error("Could not deserialize JSON: {0}")]
    JsonError(String),
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
    #[error("The provider declined the request: {0}")]
    Declined(String),
    #[error("Could not obtain an access token: {0}")]
    TokenError(String),
}

impl ProviderApiError {
    /// Whether the failure is worth retrying. Timeouts, connection failures, rate limiting and 5xx responses are.
    pub fn is_transient(&self) -> bool {
        match self {
            ProviderApiError::Network(_) | ProviderApiError::Timeout(_) => true,
            ProviderApiError::QueryError { status, .. } => *status >= 500 || *status == 429,
            _ => false,
        }
    }
}

impl From<reqwest::Error> for ProviderApiError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            ProviderApiError::Timeout(e.to_string())
        } else if e.is_decode() {
            ProviderApiError::JsonError(e.to_string())
        } else if e.is_builder() {
            ProviderApiError::InvalidRequest(e.to_string())
        } else {
            ProviderApiError::Network(e.to_string())
        }
    }
}

impl From<ProviderApiError> for ProviderError {
    fn from(e: ProviderApiError) -> Self {
        if e.is_transient() {
            return ProviderError::Transient(e.to_string());
        }
        match e {
            ProviderApiError::InvalidRequest(s) => ProviderError::Validation(s),
            e => ProviderError::Rejected(e.to_string()),
        }
    }
}

/// Webhook bodies that pass signature checks but cannot be read.
pub(crate) fn payload_error<E: std::fmt::Display>(e: E) -> WebhookError {
    WebhookError::Payload(e.to_string())
}
