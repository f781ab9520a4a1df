//! Login, logout, identity refresh and page gatekeeping.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{json, Value};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::password::{random_token, OfflinePasswordGate};
use super::{Session, SessionManager};
use crate::api::{message_text, RpcClient, RpcError, LOGIN_ACTION};
use crate::config::Config;
use crate::guard::Role;
use crate::nav::{Destination, Navigator, Notice, RETURN_PARAM};

/// Principal used for offline logins that do not name a user
const LOCAL_PRINCIPAL: &str = "local";

#[derive(Debug, Clone)]
pub enum Credentials {
    Password {
        username: Option<String>,
        password: String,
    },
    /// Token issued by the external identity provider.
    IdToken { id_token: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS))]
#[cfg_attr(feature = "ts", ts(export))]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LoginStatus {
    Approved,
    Pending,
    Blocked,
    Rejected,
}

impl LoginStatus {
    fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "APPROVED" => Some(LoginStatus::Approved),
            "PENDING" => Some(LoginStatus::Pending),
            "BLOCKED" => Some(LoginStatus::Blocked),
            "REJECTED" => Some(LoginStatus::Rejected),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoginOutcome {
    Approved(Session),
    /// Waiting on server-side approval; no session yet.
    Pending { message: Option<String> },
    Blocked { message: Option<String> },
    Rejected { message: Option<String> },
}

impl LoginOutcome {
    pub fn status(&self) -> LoginStatus {
        match self {
            LoginOutcome::Approved(_) => LoginStatus::Approved,
            LoginOutcome::Pending { .. } => LoginStatus::Pending,
            LoginOutcome::Blocked { .. } => LoginStatus::Blocked,
            LoginOutcome::Rejected { .. } => LoginStatus::Rejected,
        }
    }
}

#[derive(Debug, Deserialize)]
struct LoginResponse {
    status: Option<String>,
    session_token: Option<String>,
    token: Option<String>,
    email: Option<String>,
    username: Option<String>,
    role: Option<String>,
    #[serde(default, deserialize_with = "lenient_seconds")]
    expires_in: Option<u64>,
    message: Option<Value>,
    error: Option<Value>,
}

impl LoginResponse {
    fn message(&self) -> Option<String> {
        self.message
            .as_ref()
            .and_then(message_text)
            .or_else(|| self.error.as_ref().and_then(message_text))
    }
}

/// Accept whole or fractional seconds, as a number or a numeric string.
/// Anything else (negative, non-numeric) is treated as absent.
fn lenient_seconds<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    let from_float = |f: f64| (f.is_finite() && f >= 0.0).then(|| f as u64);
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::Number(n)) => n.as_u64().or_else(|| n.as_f64().and_then(from_float)),
        Some(Value::String(s)) => {
            let s = s.trim();
            s.parse::<u64>()
                .ok()
                .or_else(|| s.parse::<f64>().ok().and_then(from_float))
        }
        _ => None,
    })
}

/// Current principal as reported by the `me` action.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct Profile {
    pub email: Option<String>,
    pub username: Option<String>,
    pub name: Option<String>,
    pub role: Option<Role>,
}

impl Profile {
    pub fn principal_id(&self) -> Option<&str> {
        self.email
            .as_deref()
            .or(self.username.as_deref())
            .filter(|p| !p.is_empty())
    }
}

/// Result of gatekeeping a protected page.
#[derive(Debug)]
pub enum Admission {
    /// Page may render. `refresh` is the background identity check, if one was started.
    Granted { refresh: Option<JoinHandle<()>> },
    Redirected(Destination),
}

impl Admission {
    pub fn is_granted(&self) -> bool {
        matches!(self, Admission::Granted { .. })
    }
}

pub struct AuthFacade {
    rpc: Arc<RpcClient>,
    navigator: Arc<dyn Navigator>,
    offline: Option<OfflinePasswordGate>,
    offline_role: Role,
    client_id: Option<String>,
    session_ttl: Duration,
    entry_point: String,
    default_page: String,
    refresh_on_guard: bool,
}

impl AuthFacade {
    pub fn new(config: &Config, rpc: Arc<RpcClient>, navigator: Arc<dyn Navigator>) -> Self {
        Self {
            rpc,
            navigator,
            offline: OfflinePasswordGate::from_hashes(&config.offline_password_hashes),
            offline_role: config.offline_role,
            client_id: config.client_id.clone().filter(|c| !c.is_empty()),
            session_ttl: config.session_ttl(),
            entry_point: config.entry_point.clone(),
            default_page: config.default_page.clone(),
            refresh_on_guard: config.refresh_on_guard,
        }
    }

    pub fn sessions(&self) -> &Arc<SessionManager> {
        self.rpc.sessions()
    }

    pub fn rpc(&self) -> &Arc<RpcClient> {
        &self.rpc
    }

    pub fn is_authenticated(&self) -> bool {
        self.sessions().is_authenticated()
    }

    /// Generic authenticated call for domain actions.
    pub async fn call(&self, action: &str, payload: Value) -> Result<Value, RpcError> {
        self.rpc.call(action, payload).await
    }

    /// Exchange credentials for a session.
    pub async fn login(&self, credentials: Credentials) -> Result<LoginOutcome, RpcError> {
        let (payload, username) = match credentials {
            Credentials::Password { username, password } => {
                if password.trim().is_empty() {
                    return Ok(LoginOutcome::Rejected {
                        message: Some("Password is required".to_string()),
                    });
                }
                if let Some(ref gate) = self.offline {
                    return self.login_offline(gate, username, &password);
                }
                (json!({ "username": username, "password": password }), username)
            }
            Credentials::IdToken { id_token } => {
                if id_token.trim().is_empty() {
                    return Ok(LoginOutcome::Rejected {
                        message: Some("Identity token is missing".to_string()),
                    });
                }
                let mut payload = json!({ "idToken": id_token });
                if let Some(ref client_id) = self.client_id {
                    payload["clientId"] = Value::String(client_id.clone());
                }
                (payload, None)
            }
        };

        let response: LoginResponse = self.rpc.call_as(LOGIN_ACTION, payload).await?;
        let token = response
            .session_token
            .clone()
            .or_else(|| response.token.clone())
            .filter(|t| !t.is_empty());

        let status = match response.status.as_deref() {
            Some(raw) => LoginStatus::parse(raw)
                .ok_or_else(|| RpcError::protocol(&format!("unknown login status {:?}", raw)))?,
            // Legacy backends answer with just a token
            None if token.is_some() => LoginStatus::Approved,
            None => return Err(RpcError::protocol("login response carries neither status nor token")),
        };

        let outcome = match status {
            LoginStatus::Approved => {
                let token = token
                    .ok_or_else(|| RpcError::protocol("approved login response has no session token"))?;
                let principal = response
                    .email
                    .clone()
                    .or_else(|| response.username.clone())
                    .or(username)
                    .unwrap_or_default();
                let role = response.role.as_deref().map(Role::parse).unwrap_or_default();
                let ttl = response
                    .expires_in
                    .map(Duration::from_secs)
                    .unwrap_or(self.session_ttl);

                let session = Session::with_ttl(token, principal, role, ttl)
                    .filter(Session::is_valid)
                    .ok_or_else(|| {
                        RpcError::protocol(&format!(
                            "login expiry out of range: {} seconds",
                            ttl.as_secs()
                        ))
                    })?;
                self.store_session(&session)?;
                info!(principal = %session.principal_id, role = %session.role, "Login approved");
                LoginOutcome::Approved(session)
            }
            LoginStatus::Pending => {
                info!("Login pending remote approval");
                LoginOutcome::Pending { message: response.message() }
            }
            LoginStatus::Blocked => LoginOutcome::Blocked { message: response.message() },
            LoginStatus::Rejected => LoginOutcome::Rejected { message: response.message() },
        };
        Ok(outcome)
    }

    fn login_offline(
        &self,
        gate: &OfflinePasswordGate,
        username: Option<String>,
        password: &str,
    ) -> Result<LoginOutcome, RpcError> {
        if !gate.verify(password) {
            warn!("Offline password check failed");
            return Ok(LoginOutcome::Rejected {
                message: Some("Incorrect password".to_string()),
            });
        }
        let principal = username
            .filter(|u| !u.trim().is_empty())
            .unwrap_or_else(|| LOCAL_PRINCIPAL.to_string());
        let session = Session::with_ttl(random_token(), principal, self.offline_role, self.session_ttl)
            .filter(Session::is_valid)
            .ok_or_else(|| {
                RpcError::Configuration(format!(
                    "session TTL of {} seconds is out of range",
                    self.session_ttl.as_secs()
                ))
            })?;
        self.store_session(&session)?;
        info!(principal = %session.principal_id, "Offline login approved");
        Ok(LoginOutcome::Approved(session))
    }

    fn store_session(&self, session: &Session) -> Result<(), RpcError> {
        self.sessions().set_session(session).map_err(|e| {
            error!(error = %e, "Failed to persist session");
            RpcError::Configuration(format!("session storage is unavailable: {:#}", e))
        })
    }

    /// Clear the session and go to the entry point. Navigation happens even
    /// if the store could not be cleared; that failure is returned.
    pub fn logout(&self) -> anyhow::Result<()> {
        let cleared = self.sessions().clear_session();
        if let Err(ref e) = cleared {
            error!(error = %e, "Failed to clear session on logout");
        }
        info!("Logged out");
        self.navigator.navigate(&Destination::new(self.entry_point.as_str()));
        cleared
    }

    /// Entry point carrying `page` as the return target.
    pub fn entry_destination(&self, page: &str) -> Destination {
        let page = page.trim();
        let target = if page.is_empty() { self.default_page.as_str() } else { page };
        Destination::new(self.entry_point.as_str()).with_param(RETURN_PARAM, target)
    }

    /// Gatekeep a protected page.
    ///
    /// Without a valid session the host is sent to the entry point with `page`
    /// as the return target. With one, a background `me` refresh may be
    /// started; it never delays the page and only acts on auth rejection.
    pub fn require_authenticated(self: &Arc<Self>, page: &str) -> Admission {
        if !self.is_authenticated() {
            let destination = self.entry_destination(page);
            debug!(page, "No session, redirecting to entry point");
            self.navigator.navigate(&destination);
            return Admission::Redirected(destination);
        }

        if !self.refresh_on_guard {
            return Admission::Granted { refresh: None };
        }
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            debug!("No async runtime, skipping background identity refresh");
            return Admission::Granted { refresh: None };
        };

        let facade = Arc::clone(self);
        let page = page.to_string();
        let refresh = runtime.spawn(async move {
            match facade.me().await {
                Ok(_) => debug!("Background identity refresh succeeded"),
                Err(e @ RpcError::Auth(_)) => {
                    // The dispatcher has already cleared the session
                    info!(error = %e, "Session rejected during refresh");
                    facade.report_error(&e, &page);
                }
                Err(e) => warn!(error = %e, "Background identity refresh failed"),
            }
        });
        Admission::Granted {
            refresh: Some(refresh),
        }
    }

    /// Show `err` to the user. Auth failures also return them to the entry
    /// point, since the session is already gone.
    pub fn report_error(&self, err: &RpcError, page: &str) {
        self.navigator.notify(&Notice::Error(err.user_message()));
        if err.is_auth() {
            self.navigator.navigate(&self.entry_destination(page));
        }
    }

    /// Fetch the current principal and refresh cached profile fields.
    /// Token and expiry are left untouched.
    pub async fn me(&self) -> Result<Profile, RpcError> {
        let profile: Profile = self.rpc.call_as("me", Value::Null).await?;
        if let Err(e) = self
            .sessions()
            .refresh_profile(profile.principal_id(), profile.role)
        {
            warn!(error = %e, "Failed to update cached profile");
        }
        Ok(profile)
    }
}
