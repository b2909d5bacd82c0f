use crate::resilience::retry::RetryableError;
use thiserror::Error;

/// Failure of a single HTTP attempt
#[derive(Error, Debug)]
pub enum AttemptError {
    #[error("Network error: {0}")]
    Network(#[source] reqwest::Error),

    #[error("Status was {0}")]
    Status(u16),

    #[error("Unreadable response body: {0}")]
    Body(#[source] reqwest::Error),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

impl RetryableError for AttemptError {
    fn is_retryable(&self) -> bool {
        match self {
            AttemptError::Network(_) => true,
            AttemptError::Status(_) => true,
            AttemptError::Body(_) => true,
            // Retrying cannot fix a malformed URL or header
            AttemptError::InvalidRequest(_) => false,
        }
    }
}

impl AttemptError {
    /// True when the downstream host could not be reached at all (DNS or connect failure)
    pub fn is_unreachable(&self) -> bool {
        match self {
            AttemptError::Network(e) => e.is_connect() || e.is_builder(),
            AttemptError::InvalidRequest(_) => true,
            AttemptError::Status(_) | AttemptError::Body(_) => false,
        }
    }

    pub(crate) fn from_send(err: reqwest::Error) -> Self {
        if err.is_builder() {
            AttemptError::InvalidRequest(err.to_string())
        } else {
            AttemptError::Network(err)
        }
    }
}
