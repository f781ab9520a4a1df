//! Wire transport for RPC envelopes.

use futures::future::BoxFuture;
use reqwest::{header, Client};
use serde_json::Value;

/// Raw reply before classification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawResponse {
    pub status: u16,
    pub body: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// The transport gave up waiting on its own.
    TimedOut,
    Failed(String),
}

/// Sends one JSON envelope and returns the raw reply.
///
/// Implementations make exactly one attempt. Dropping the returned future
/// cancels the request.
pub trait Transport: Send + Sync {
    fn post_json<'a>(
        &'a self,
        url: &'a str,
        envelope: &'a Value,
    ) -> BoxFuture<'a, Result<RawResponse, TransportError>>;
}

/// HTTP transport over reqwest.
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone)]
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    pub fn new() -> anyhow::Result<Self> {
        // No client-level timeout: the dispatcher owns the deadline
        let client = Client::builder().build()?;
        Ok(Self { client })
    }

    pub fn with_client(client: Client) -> Self {
        Self { client }
    }
}

impl Transport for HttpTransport {
    fn post_json<'a>(
        &'a self,
        url: &'a str,
        envelope: &'a Value,
    ) -> BoxFuture<'a, Result<RawResponse, TransportError>> {
        Box::pin(async move {
            let response = self
                .client
                .post(url)
                .header(header::ACCEPT, "application/json")
                .json(envelope)
                .send()
                .await
                .map_err(from_reqwest)?;

            let status = response.status().as_u16();
            let body = response.text().await.map_err(from_reqwest)?;
            Ok(RawResponse { status, body })
        })
    }
}

fn from_reqwest(e: reqwest::Error) -> TransportError {
    if e.is_timeout() {
        TransportError::TimedOut
    } else {
        TransportError::Failed(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{routing::post, Json, Router};
    use serde_json::json;

    async fn spawn_server(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{}/rpc", addr)
    }

    #[tokio::test]
    async fn test_posts_envelope_and_returns_raw_body() {
        let router = Router::new().route(
            "/rpc",
            post(|Json(body): Json<Value>| async move {
                Json(json!({"ok": true, "echo": body["action"]}))
            }),
        );
        let url = spawn_server(router).await;

        let transport = HttpTransport::new().unwrap();
        let envelope = json!({"action": "listProducts", "token": null});
        let reply = transport.post_json(&url, &envelope).await.unwrap();

        assert_eq!(reply.status, 200);
        let body: Value = serde_json::from_str(&reply.body).unwrap();
        assert_eq!(body["echo"], "listProducts");
    }

    #[tokio::test]
    async fn test_connection_refused_is_failure() {
        // Bind then drop to get a port nothing listens on
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let transport = HttpTransport::new().unwrap();
        let result = transport
            .post_json(&format!("http://{}/rpc", addr), &json!({"action": "me"}))
            .await;
        assert!(matches!(result, Err(TransportError::Failed(_))));
    }
}
