//! Backoffice core - session lifecycle, authenticated RPC dispatch and
//! role-gated UI for an administrative client whose data lives behind a
//! remote RPC endpoint.
//!
//! Domain operations (products, purchases, sales, expenses, inventory,
//! reports) are plain named actions sent through [`api::RpcClient::call`].

pub mod api;
pub mod auth;
pub mod config;
pub mod guard;
pub mod nav;

use std::sync::Arc;

use anyhow::Result;

pub use api::{RpcClient, RpcError};
pub use auth::{AuthFacade, CredentialStore, Session, SessionManager};
pub use config::Config;
pub use guard::{Capability, Role, RoleGuard};
pub use nav::{Destination, Navigator, Notice};

/// Fully wired client: one session manager shared by the dispatcher, the
/// auth facade and the role guard.
pub struct Backoffice {
    pub auth: Arc<AuthFacade>,
    pub guard: RoleGuard,
}

impl Backoffice {
    /// Wire the components over the reqwest transport.
    pub fn new(
        config: &Config,
        store: Arc<dyn CredentialStore>,
        legacy: Option<Arc<dyn CredentialStore>>,
        navigator: Arc<dyn Navigator>,
    ) -> Result<Self> {
        let transport = Arc::new(api::HttpTransport::new()?);
        Ok(Self::with_transport(config, store, legacy, navigator, transport))
    }

    pub fn with_transport(
        config: &Config,
        store: Arc<dyn CredentialStore>,
        legacy: Option<Arc<dyn CredentialStore>>,
        navigator: Arc<dyn Navigator>,
        transport: Arc<dyn api::Transport>,
    ) -> Self {
        let mut sessions = SessionManager::new(store);
        if let Some(legacy) = legacy {
            sessions = sessions.with_legacy_mirror(legacy);
        }
        let sessions = Arc::new(sessions);

        let rpc = Arc::new(RpcClient::new(config, transport, sessions.clone()));
        let auth = Arc::new(AuthFacade::new(config, rpc, navigator.clone()));
        let guard = RoleGuard::new(sessions, navigator);
        Self { auth, guard }
    }

    pub fn sessions(&self) -> &Arc<SessionManager> {
        self.auth.sessions()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::api::testing::FakeTransport;
    use crate::auth::{Credentials, MemoryStore, LEGACY_FLAG_KEY};
    use crate::nav::testing::RecordingNavigator;

    #[tokio::test]
    async fn test_login_then_rejection_flows_through_all_components() {
        let config = Config {
            endpoint_url: Some("https://rpc.example.test/exec".to_string()),
            ..Config::default()
        };
        let transport = FakeTransport::new();
        let legacy = Arc::new(MemoryStore::new());
        let navigator = Arc::new(RecordingNavigator::default());
        let app = Backoffice::with_transport(
            &config,
            Arc::new(MemoryStore::new()),
            Some(legacy.clone() as Arc<dyn CredentialStore>),
            navigator.clone(),
            transport.clone(),
        );

        transport.push_json(json!({
            "status": "APPROVED", "session_token": "s1", "email": "sam@shop.test",
            "role": "sales", "expires_in": 600
        }));
        app.auth
            .login(Credentials::IdToken { id_token: "idt".to_string() })
            .await
            .unwrap();
        assert!(app.guard.can(Capability::Create));
        assert!(!app.guard.can(Capability::ManageUsers));
        assert_eq!(legacy.get(LEGACY_FLAG_KEY).unwrap().as_deref(), Some("1"));

        transport.push_json(json!({"ok": false, "error": "Unauthorized"}));
        let err = app.auth.call("listSales", json!({"month": "2026-10"})).await.unwrap_err();
        assert!(err.is_auth());
        assert_eq!(transport.last_sent().unwrap()["token"], "s1");
        assert!(!app.auth.is_authenticated());
        assert_eq!(app.guard.current_role(), Role::Viewer);
        assert!(legacy.get(LEGACY_FLAG_KEY).unwrap().is_none());
    }
}
