//! Authenticated RPC dispatcher.
//!
//! Every backend operation is a named action POSTed to one endpoint. The
//! dispatcher attaches credentials, enforces the deadline, classifies the
//! reply and signs the user out when the backend rejects their token.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use tracing::{debug, error, warn};

use super::classify::{AuthRejectionMatcher, FailureKind, Reply};
use super::transport::{Transport, TransportError};
use super::RpcError;
use crate::auth::SessionManager;
use crate::config::Config;

pub struct RpcClient {
    transport: Arc<dyn Transport>,
    sessions: Arc<SessionManager>,
    endpoint_url: Option<String>,
    app_key: Option<String>,
    timeout: Duration,
    matcher: AuthRejectionMatcher,
}

impl RpcClient {
    pub fn new(config: &Config, transport: Arc<dyn Transport>, sessions: Arc<SessionManager>) -> Self {
        Self {
            transport,
            sessions,
            endpoint_url: config.endpoint().ok().map(str::to_string),
            app_key: config.app_key.clone().filter(|k| !k.is_empty()),
            timeout: config.timeout(),
            matcher: AuthRejectionMatcher::new(&config.auth_rejection_patterns),
        }
    }

    pub fn sessions(&self) -> &Arc<SessionManager> {
        &self.sessions
    }

    /// Send `action` with `payload` (a JSON object, or null for none).
    ///
    /// Exactly one request is made; callers decide whether to retry.
    pub async fn call(&self, action: &str, payload: Value) -> Result<Value, RpcError> {
        let action = action.trim();
        if action.is_empty() {
            return Err(RpcError::application("empty action"));
        }
        let url = self.endpoint_url.as_deref().ok_or_else(|| {
            RpcError::Configuration("endpoint URL is not configured".to_string())
        })?;
        let payload = match payload {
            Value::Object(map) => map,
            Value::Null => Map::new(),
            other => {
                return Err(RpcError::application(format!(
                    "payload for {} must be a JSON object, got {}",
                    action, other
                )))
            }
        };

        // Token is read at send time; a later logout does not affect this request
        let token = match self.sessions.get_session() {
            Ok(session) => session.map(|s| s.token),
            Err(e) => {
                warn!(action, error = %e, "Could not read session, sending unauthenticated");
                None
            }
        };
        let envelope = self.envelope(action, payload, token);

        let started = Instant::now();
        let sent = tokio::time::timeout(self.timeout, self.transport.post_json(url, &envelope)).await;
        let elapsed_ms = started.elapsed().as_millis() as u64;

        let raw = match sent {
            Err(_) | Ok(Err(TransportError::TimedOut)) => {
                warn!(action, elapsed_ms, timeout_secs = self.timeout.as_secs(), "RPC timed out");
                return Err(RpcError::Timeout(self.timeout));
            }
            Ok(Err(TransportError::Failed(reason))) => {
                warn!(action, elapsed_ms, error = %reason, "RPC transport failure");
                return Err(RpcError::Network(reason));
            }
            Ok(Ok(raw)) => raw,
        };

        match Reply::classify(action, raw.status, &raw.body, &self.matcher) {
            Reply::Success { body } => {
                debug!(action, elapsed_ms, status = raw.status, "RPC succeeded");
                Ok(body)
            }
            Reply::Failure {
                kind: FailureKind::Protocol,
                raw: snippet,
                ..
            } => {
                warn!(action, elapsed_ms, status = raw.status, "RPC returned an unparseable body");
                Err(RpcError::Protocol {
                    snippet: snippet.as_str().map(str::to_string).unwrap_or_else(|| snippet.to_string()),
                })
            }
            Reply::Failure {
                kind: FailureKind::Auth,
                message,
                ..
            } => {
                warn!(action, elapsed_ms, "Backend rejected credentials, signing out");
                if let Err(e) = self.sessions.clear_session() {
                    error!(action, error = %e, "Failed to clear rejected session");
                }
                Err(RpcError::Auth(message))
            }
            Reply::Failure {
                kind: FailureKind::Application,
                message,
                raw: body,
            } => {
                debug!(action, elapsed_ms, message = %message, "RPC failed");
                Err(RpcError::Application { message, body })
            }
        }
    }

    /// `call` and decode the successful body into `T`.
    pub async fn call_as<T: DeserializeOwned>(&self, action: &str, payload: Value) -> Result<T, RpcError> {
        let body = self.call(action, payload).await?;
        serde_json::from_value(body.clone()).map_err(|e| {
            warn!(action, error = %e, "RPC body did not match expected shape");
            RpcError::protocol(&body.to_string())
        })
    }

    fn envelope(&self, action: &str, mut payload: Map<String, Value>, token: Option<String>) -> Value {
        payload.insert("action".to_string(), Value::String(action.to_string()));
        payload.insert(
            "token".to_string(),
            token.map(Value::String).unwrap_or(Value::Null),
        );
        if let Some(ref key) = self.app_key {
            payload.insert("appKey".to_string(), Value::String(key.clone()));
        }
        Value::Object(payload)
    }
}


#[cfg(test)]
mod tests {
    use chrono::{Duration as ChronoDuration, Utc};
    use serde_json::json;

    use super::testing::{FakeTransport, Scripted};
    use super::*;
    use crate::auth::{MemoryStore, Session};
    use crate::guard::Role;

    fn config() -> Config {
        Config {
            endpoint_url: Some("https://rpc.example.test/exec".to_string()),
            ..Config::default()
        }
    }

    fn client_with(config: &Config, transport: Arc<FakeTransport>) -> RpcClient {
        let sessions = Arc::new(SessionManager::new(Arc::new(MemoryStore::new())));
        RpcClient::new(config, transport, sessions)
    }

    fn signed_in(client: &RpcClient) {
        let session = Session::new("tok-1", "a@b.com", Role::Sales, Utc::now() + ChronoDuration::hours(1));
        client.sessions().set_session(&session).unwrap();
    }

    #[tokio::test]
    async fn test_envelope_carries_action_token_and_payload() {
        let transport = FakeTransport::new();
        transport.push_json(json!({"ok": true, "id": 7}));
        let config = Config {
            app_key: Some("shared".to_string()),
            ..config()
        };
        let client = client_with(&config, transport.clone());
        signed_in(&client);

        let body = client
            .call("addProduct", json!({"name": "Tea", "qty": 3, "action": "spoofed"}))
            .await
            .unwrap();
        assert_eq!(body["id"], 7);

        let sent = transport.last_sent().unwrap();
        assert_eq!(sent["action"], "addProduct");
        assert_eq!(sent["token"], "tok-1");
        assert_eq!(sent["appKey"], "shared");
        assert_eq!(sent["name"], "Tea");
        assert_eq!(sent["qty"], 3);
    }

    #[tokio::test]
    async fn test_unauthenticated_call_sends_null_token() {
        let transport = FakeTransport::new();
        transport.push_json(json!({"ok": true}));
        let client = client_with(&config(), transport.clone());

        client.call("ping", Value::Null).await.unwrap();
        let sent = transport.last_sent().unwrap();
        assert!(sent["token"].is_null());
        assert!(sent.get("appKey").is_none());
    }

    #[tokio::test]
    async fn test_missing_endpoint_fails_without_network() {
        let transport = FakeTransport::new();
        let client = client_with(&Config::default(), transport.clone());

        let err = client.call("listProducts", Value::Null).await.unwrap_err();
        assert!(matches!(err, RpcError::Configuration(_)));
        assert_eq!(transport.attempts(), 0);
    }

    #[tokio::test]
    async fn test_rejected_payload_and_action() {
        let transport = FakeTransport::new();
        let client = client_with(&config(), transport.clone());

        assert!(matches!(
            client.call("  ", Value::Null).await,
            Err(RpcError::Application { .. })
        ));
        assert!(matches!(
            client.call("addSale", json!([1, 2])).await,
            Err(RpcError::Application { .. })
        ));
        assert_eq!(transport.attempts(), 0);
    }

    #[tokio::test]
    async fn test_auth_rejection_signs_out() {
        let transport = FakeTransport::new();
        transport.push_json(json!({"ok": false, "error": "Invalid token"}));
        let client = client_with(&config(), transport.clone());
        signed_in(&client);
        assert!(client.sessions().is_authenticated());

        let err = client.call("listSales", Value::Null).await.unwrap_err();
        assert_eq!(err, RpcError::Auth("Invalid token".to_string()));
        assert!(!client.sessions().is_authenticated());
    }

    #[tokio::test]
    async fn test_login_status_on_domain_action_does_not_mask_rejection() {
        let transport = FakeTransport::new();
        transport.push_json(json!({"ok": false, "status": "REJECTED", "error": "Unauthorized"}));
        let client = client_with(&config(), transport.clone());
        signed_in(&client);

        let err = client
            .call("approvePurchase", json!({"id": 12}))
            .await
            .unwrap_err();
        assert_eq!(err, RpcError::Auth("Unauthorized".to_string()));
        assert!(!client.sessions().is_authenticated());
    }

    #[tokio::test]
    async fn test_application_error_keeps_session() {
        let transport = FakeTransport::new();
        transport.push_json(json!({"ok": false, "error": "Quantity must be positive"}));
        let client = client_with(&config(), transport.clone());
        signed_in(&client);

        match client.call("addPurchase", json!({"qty": -1})).await {
            Err(RpcError::Application { message, body }) => {
                assert_eq!(message, "Quantity must be positive");
                assert_eq!(body["ok"], false);
            }
            other => panic!("unexpected {:?}", other),
        }
        assert!(client.sessions().is_authenticated());
    }

    #[tokio::test]
    async fn test_network_failure_is_attempted_once() {
        let transport = FakeTransport::new();
        transport.push(Scripted::Fail("connection refused".to_string()));
        transport.push_json(json!({"ok": true}));
        let client = client_with(&config(), transport.clone());

        let err = client.call("listExpenses", Value::Null).await.unwrap_err();
        assert_eq!(err, RpcError::Network("connection refused".to_string()));
        assert!(err.is_retryable());
        assert_eq!(transport.attempts(), 1);
    }

    #[tokio::test]
    async fn test_protocol_error_keeps_snippet() {
        let transport = FakeTransport::new();
        transport.push(Scripted::Reply(200, "<!DOCTYPE html><p>Script error</p>".to_string()));
        let client = client_with(&config(), transport.clone());

        match client.call("report", Value::Null).await {
            Err(RpcError::Protocol { snippet }) => assert!(snippet.contains("Script error")),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_hung_request_times_out() {
        let transport = FakeTransport::new();
        transport.push(Scripted::Hang);
        let config = Config {
            timeout_secs: 20,
            ..config()
        };
        let client = client_with(&config, transport.clone());

        let err = client.call("inventory", Value::Null).await.unwrap_err();
        assert_eq!(err, RpcError::Timeout(Duration::from_secs(20)));
        assert!(!matches!(err, RpcError::Network(_)));
        assert_eq!(transport.attempts(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_calls_are_not_coalesced() {
        let transport = FakeTransport::new();
        transport.push_json(json!({"ok": true}));
        transport.push_json(json!({"ok": true}));
        let client = client_with(&config(), transport.clone());

        let (a, b) = futures::future::join(
            client.call("listProducts", Value::Null),
            client.call("listProducts", Value::Null),
        )
        .await;
        assert!(a.is_ok() && b.is_ok());
        assert_eq!(transport.attempts(), 2);
    }

    #[derive(Debug, serde::Deserialize)]
    struct Count {
        count: u32,
    }

    #[tokio::test]
    async fn test_call_as_decodes_or_reports_protocol() {
        let transport = FakeTransport::new();
        transport.push_json(json!({"ok": true, "count": 4}));
        transport.push_json(json!({"ok": true, "count": "four"}));
        let client = client_with(&config(), transport.clone());

        let count: Count = client.call_as("countProducts", Value::Null).await.unwrap();
        assert_eq!(count.count, 4);
        let bad = client.call_as::<Count>("countProducts", Value::Null).await;
        assert!(matches!(bad, Err(RpcError::Protocol { .. })));
    }
}
