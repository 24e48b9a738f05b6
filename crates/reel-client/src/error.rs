//! Client error types.

use reqwest::StatusCode;
use thiserror::Error;

pub type ClientResult<T> = Result<T, ClientError>;

/// Longest response body kept in an error message.
const MAX_ERROR_BODY: usize = 512;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("Request rejected ({status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Timeout after {0} seconds")]
    Timeout(u64),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ClientError {
    /// Map a non-success HTTP status. 5xx and 429 are transient, every
    /// other status is a rejection of the request itself.
    pub fn from_status(status: StatusCode, body: &str) -> Self {
        let mut message = body.trim().to_string();
        if message.len() > MAX_ERROR_BODY {
            let mut cut = MAX_ERROR_BODY;
            while !message.is_char_boundary(cut) {
                cut -= 1;
            }
            message.truncate(cut);
        }

        if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
            ClientError::ServiceUnavailable(format!("HTTP {}: {}", status.as_u16(), message))
        } else {
            ClientError::Rejected {
                status: status.as_u16(),
                message,
            }
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ClientError::ServiceUnavailable(_) | ClientError::Timeout(_) | ClientError::Network(_)
        )
    }

    pub fn is_rejection(&self) -> bool {
        matches!(self, ClientError::Rejected { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_classification() {
        assert!(ClientError::from_status(StatusCode::SERVICE_UNAVAILABLE, "").is_retryable());
        assert!(ClientError::from_status(StatusCode::TOO_MANY_REQUESTS, "slow down").is_retryable());

        let rejected = ClientError::from_status(StatusCode::UNPROCESSABLE_ENTITY, "bad plan");
        assert!(rejected.is_rejection());
        assert!(!rejected.is_retryable());
        assert_eq!(rejected.to_string(), "Request rejected (422): bad plan");
    }

    #[test]
    fn test_long_body_truncated() {
        let body = "x".repeat(2000);
        match ClientError::from_status(StatusCode::BAD_REQUEST, &body) {
            ClientError::Rejected { message, .. } => assert_eq!(message.len(), MAX_ERROR_BODY),
            other => panic!("unexpected {other:?}"),
        }
    }
}
