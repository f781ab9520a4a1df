use std::time::Duration;

use thiserror::Error;

/// Every way an RPC call can fail. Nothing else escapes the dispatcher.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RpcError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Request timed out after {}s", .0.as_secs())]
    Timeout(Duration),

    #[error("Invalid response: {snippet}")]
    Protocol { snippet: String },

    #[error("Unauthorized: {0}")]
    Auth(String),

    #[error("{message}")]
    Application {
        message: String,
        body: serde_json::Value,
    },
}

/// Maximum length for error response bodies in error messages
const MAX_ERROR_BODY_LENGTH: usize = 500;

impl RpcError {
    /// Truncate a response body to avoid logging excessive data
    pub(crate) fn truncate_body(body: &str) -> String {
        if body.len() <= MAX_ERROR_BODY_LENGTH {
            body.to_string()
        } else {
            let mut end = MAX_ERROR_BODY_LENGTH;
            while !body.is_char_boundary(end) {
                end -= 1;
            }
            format!("{}... (truncated, {} total bytes)", &body[..end], body.len())
        }
    }

    pub fn protocol(body: &str) -> Self {
        RpcError::Protocol {
            snippet: Self::truncate_body(body),
        }
    }

    pub fn application(message: impl Into<String>) -> Self {
        RpcError::Application {
            message: message.into(),
            body: serde_json::Value::Null,
        }
    }

    /// Transient failures the user can simply try again.
    pub fn is_retryable(&self) -> bool {
        matches!(self, RpcError::Network(_) | RpcError::Timeout(_))
    }

    pub fn is_auth(&self) -> bool {
        matches!(self, RpcError::Auth(_))
    }

    /// Short message suitable for a toast or alert.
    pub fn user_message(&self) -> String {
        match self {
            RpcError::Configuration(detail) => format!(
                "The application is not configured and cannot work until it is fixed: {}",
                detail
            ),
            RpcError::Network(_) => {
                "Could not reach the server. Check your connection and try again.".to_string()
            }
            RpcError::Timeout(_) => {
                "The server took too long to respond. Please try again.".to_string()
            }
            RpcError::Protocol { .. } => {
                "The server sent an unexpected response. Please try again later.".to_string()
            }
            RpcError::Auth(_) => "Your session has ended. Please sign in again.".to_string(),
            RpcError::Application { message, .. } => message.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_body() {
        assert_eq!(RpcError::truncate_body("short"), "short");

        let long = "x".repeat(600);
        let truncated = RpcError::truncate_body(&long);
        assert!(truncated.starts_with(&"x".repeat(500)));
        assert!(truncated.ends_with("(truncated, 600 total bytes)"));

        // Multi-byte characters straddling the limit must not panic
        let arabic = "ع".repeat(400);
        assert!(RpcError::truncate_body(&arabic).contains("truncated"));
    }

    #[test]
    fn test_retryable_kinds() {
        assert!(RpcError::Network("refused".into()).is_retryable());
        assert!(RpcError::Timeout(Duration::from_secs(20)).is_retryable());
        assert!(!RpcError::Auth("expired".into()).is_retryable());
        assert!(!RpcError::application("bad qty").is_retryable());
        assert!(!RpcError::protocol("<html>").is_retryable());
    }

    #[test]
    fn test_application_message_is_verbatim() {
        let err = RpcError::application("Quantity must be positive");
        assert_eq!(err.to_string(), "Quantity must be positive");
        assert_eq!(err.user_message(), "Quantity must be positive");
        assert!(RpcError::Configuration("no endpoint".into())
            .user_message()
            .contains("not configured"));
    }
}
