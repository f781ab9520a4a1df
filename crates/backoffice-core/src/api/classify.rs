//! Response classification.
//!
//! A raw HTTP reply is turned into a `Reply` in one step; nothing downstream
//! looks at raw response fields again to decide whether a call failed.

use serde_json::Value;

use super::RpcError;

/// Action that exchanges credentials for a session
pub const LOGIN_ACTION: &str = "login";

/// Login outcome statuses. A `login` reply carrying one of these is a
/// well-formed answer even when it reports a negative outcome.
const LOGIN_STATUSES: &[&str] = &["APPROVED", "PENDING", "BLOCKED", "REJECTED"];

const FALLBACK_FAILURE_MESSAGE: &str = "Request failed";

/// Case-insensitive substring matcher for "your token is no good" messages.
#[derive(Debug, Clone)]
pub struct AuthRejectionMatcher {
    patterns: Vec<String>,
}

impl AuthRejectionMatcher {
    pub fn new<I, S>(patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let patterns = patterns
            .into_iter()
            .map(|p| p.as_ref().trim().to_lowercase())
            .filter(|p| !p.is_empty())
            .collect();
        Self { patterns }
    }

    pub fn matches(&self, message: &str) -> bool {
        let lower = message.to_lowercase();
        self.patterns.iter().any(|p| lower.contains(p.as_str()))
    }
}

impl Default for AuthRejectionMatcher {
    fn default() -> Self {
        Self::new(crate::config::DEFAULT_AUTH_REJECTION_PATTERNS)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    Protocol,
    Auth,
    Application,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    Success {
        body: Value,
    },
    Failure {
        kind: FailureKind,
        message: String,
        raw: Value,
    },
}

impl Reply {
    /// Classify the HTTP reply (`status`, body text) to `action`.
    pub fn classify(action: &str, status: u16, text: &str, matcher: &AuthRejectionMatcher) -> Reply {
        let body: Value = match serde_json::from_str(text) {
            Ok(body) => body,
            Err(_) if status == 401 || status == 403 => {
                return Reply::Failure {
                    kind: FailureKind::Auth,
                    message: format!("HTTP {}", status),
                    raw: Value::String(RpcError::truncate_body(text)),
                };
            }
            Err(_) => {
                return Reply::Failure {
                    kind: FailureKind::Protocol,
                    message: "response is not valid JSON".to_string(),
                    raw: Value::String(RpcError::truncate_body(text)),
                };
            }
        };

        let Some(obj) = body.as_object() else {
            return Reply::Failure {
                kind: FailureKind::Protocol,
                message: "response is not a JSON object".to_string(),
                raw: Value::String(RpcError::truncate_body(text)),
            };
        };

        if action == LOGIN_ACTION
            && obj
                .get("status")
                .and_then(Value::as_str)
                .is_some_and(|s| LOGIN_STATUSES.contains(&s.to_ascii_uppercase().as_str()))
        {
            return Reply::Success { body };
        }

        let flag = obj
            .get("ok")
            .and_then(Value::as_bool)
            .or_else(|| obj.get("success").and_then(Value::as_bool));
        let has_error = obj.get("error").is_some_and(|e| !e.is_null() && e != &Value::Bool(false));
        let http_failed = !(200..300).contains(&status);

        let failed = match flag {
            Some(ok) => !ok,
            // Legacy actions omit the flag; they only fail by sending `error`
            None => has_error || http_failed,
        };
        if !failed {
            return Reply::Success { body };
        }

        let message = failure_message(&body).unwrap_or_else(|| {
            if http_failed {
                format!("HTTP {}", status)
            } else {
                FALLBACK_FAILURE_MESSAGE.to_string()
            }
        });
        let kind = if status == 401 || matcher.matches(&message) {
            FailureKind::Auth
        } else {
            FailureKind::Application
        };

        Reply::Failure {
            kind,
            message,
            raw: body,
        }
    }
}

/// Text of an `error` / `message` field: a non-blank string, or the
/// `message` of a nested error object.
pub fn message_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
        Value::Object(inner) => inner.get("message").and_then(message_text),
        _ => None,
    }
}

/// Human-readable failure text from `error` / `message`.
fn failure_message(body: &Value) -> Option<String> {
    body.get("error")
        .and_then(message_text)
        .or_else(|| body.get("message").and_then(message_text))
}
