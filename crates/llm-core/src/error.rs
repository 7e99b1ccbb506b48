//! Model backend error types

use std::time::Duration;
use thiserror::Error;

/// Errors that can occur while talking to a model backend
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("Rate limited, retry after {retry_after:?}")]
    RateLimited { retry_after: Duration },

    #[error("API error {status}: {message}")]
    ApiError { status: u16, message: String },

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Timeout after {0:?}")]
    Timeout(Duration),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("API key not set (expected in ${0})")]
    MissingApiKey(String),
}

impl LlmError {
    /// Check if this is a rate limit error
    pub fn is_rate_limit(&self) -> bool {
        matches!(self, LlmError::RateLimited { .. })
    }

    /// Check if this error is worth retrying
    pub fn is_retryable(&self) -> bool {
        match self {
            LlmError::RateLimited { .. } => true,
            LlmError::ApiError { status, .. } => *status >= 500,
            LlmError::Network(_) => true,
            LlmError::Timeout(_) => true,
            LlmError::InvalidResponse(_) => false,
            LlmError::Json(_) => false,
            LlmError::MissingApiKey(_) => false,
        }
    }

    /// Get the retry duration if this is a rate limit error
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            LlmError::RateLimited { retry_after } => Some(*retry_after),
            _ => None,
        }
    }

    /// Map an HTTP status and body to an error
    pub fn from_status(status: u16, body: String, retry_after: Option<Duration>) -> Self {
        if status == 429 {
            LlmError::RateLimited {
                retry_after: retry_after.unwrap_or(Duration::from_secs(10)),
            }
        } else {
            LlmError::ApiError { status, message: body }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_rate_limit() {
        let err = LlmError::RateLimited {
            retry_after: Duration::from_secs(60),
        };
        assert!(err.is_rate_limit());

        let err = LlmError::ApiError {
            status: 500,
            message: "Server error".to_string(),
        };
        assert!(!err.is_rate_limit());
    }

    #[test]
    fn test_is_retryable() {
        assert!(LlmError::Timeout(Duration::from_secs(1)).is_retryable());
        assert!(LlmError::ApiError {
            status: 503,
            message: String::new()
        }
        .is_retryable());
        assert!(!LlmError::ApiError {
            status: 401,
            message: "unauthorized".to_string()
        }
        .is_retryable());
        assert!(!LlmError::MissingApiKey("OPENROUTER_API_KEY".to_string()).is_retryable());
    }

    #[test]
    fn test_from_status() {
        let err = LlmError::from_status(429, "slow down".to_string(), None);
        assert_eq!(err.retry_after(), Some(Duration::from_secs(10)));

        let err = LlmError::from_status(401, "bad key".to_string(), None);
        assert!(matches!(err, LlmError::ApiError { status: 401, .. }));
        assert!(err.to_string().contains("bad key"));
    }
}
