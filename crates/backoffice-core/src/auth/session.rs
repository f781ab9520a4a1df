use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::CredentialStore;
use crate::guard::Role;

/// Store key holding the serialized session
pub const SESSION_KEY: &str = "backoffice_auth_v1";

/// Legacy "logged in" flag mirrored into the short-lived store
pub const LEGACY_FLAG_KEY: &str = "BO_OK";

/// Longest lifetime a new session may be given (about a century)
pub const MAX_SESSION_TTL: std::time::Duration = std::time::Duration::from_secs(100 * 365 * 24 * 60 * 60);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS))]
#[cfg_attr(feature = "ts", ts(export))]
pub struct Session {
    pub token: String,
    pub principal_id: String,
    pub role: Role,
    #[cfg_attr(feature = "ts", ts(type = "string"))]
    pub expires_at: DateTime<Utc>,
}

impl Session {
    pub fn new(
        token: impl Into<String>,
        principal_id: impl Into<String>,
        role: Role,
        expires_at: DateTime<Utc>,
    ) -> Self {
        Self {
            token: token.into(),
            principal_id: principal_id.into(),
            role,
            expires_at,
        }
    }

    /// Session expiring `ttl` from now. `None` when `ttl` exceeds
    /// [`MAX_SESSION_TTL`].
    pub fn with_ttl(
        token: impl Into<String>,
        principal_id: impl Into<String>,
        role: Role,
        ttl: std::time::Duration,
    ) -> Option<Self> {
        if ttl > MAX_SESSION_TTL {
            return None;
        }
        let ttl = Duration::from_std(ttl).ok()?;
        let expires_at = Utc::now().checked_add_signed(ttl)?;
        Some(Self::new(token, principal_id, role, expires_at))
    }

    pub fn is_expired(&self) -> bool {
        Utc::now() >= self.expires_at
    }

    pub fn is_valid(&self) -> bool {
        !self.token.is_empty() && !self.is_expired()
    }

    pub fn time_until_expiry(&self) -> Duration {
        self.expires_at - Utc::now()
    }

    /// Get minutes remaining until expiry (for display)
    pub fn minutes_until_expiry(&self) -> i64 {
        self.time_until_expiry().num_minutes().max(0)
    }
}

/// Owns the stored session. The only component that writes the credential store.
pub struct SessionManager {
    store: Arc<dyn CredentialStore>,
    legacy: Option<Arc<dyn CredentialStore>>,
}

impl SessionManager {
    pub fn new(store: Arc<dyn CredentialStore>) -> Self {
        Self {
            store,
            legacy: None,
        }
    }

    /// Also mirror the legacy boolean flag into `legacy`.
    pub fn with_legacy_mirror(mut self, legacy: Arc<dyn CredentialStore>) -> Self {
        self.legacy = Some(legacy);
        self
    }

    /// Current valid session. Expired or unreadable records are purged.
    pub fn get_session(&self) -> Result<Option<Session>> {
        let raw = match self
            .store
            .get(SESSION_KEY)
            .context("Failed to read session from credential store")?
        {
            Some(raw) => raw,
            None => return Ok(None),
        };

        match serde_json::from_str::<Session>(&raw) {
            Ok(session) if session.is_valid() => {
                self.mirror_legacy_flag(true);
                Ok(Some(session))
            }
            Ok(session) => {
                debug!(principal = %session.principal_id, expires_at = %session.expires_at, "Stored session expired, purging");
                self.clear_session()?;
                Ok(None)
            }
            Err(e) => {
                warn!(error = %e, "Stored session is malformed, purging");
                self.clear_session()?;
                Ok(None)
            }
        }
    }

    /// Replace the stored session wholesale.
    pub fn set_session(&self, session: &Session) -> Result<()> {
        let contents = serde_json::to_string(session)?;
        self.store
            .set(SESSION_KEY, &contents)
            .context("Failed to write session to credential store")?;
        self.mirror_legacy_flag(true);
        debug!(principal = %session.principal_id, role = %session.role, "Session stored");
        Ok(())
    }

    /// Remove the stored session. Safe to call when there is none.
    pub fn clear_session(&self) -> Result<()> {
        self.store
            .remove(SESSION_KEY)
            .context("Failed to remove session from credential store")?;
        self.mirror_legacy_flag(false);
        Ok(())
    }

    pub fn is_authenticated(&self) -> bool {
        match self.get_session() {
            Ok(session) => session.is_some(),
            Err(e) => {
                warn!(error = %e, "Could not read session, treating as signed out");
                false
            }
        }
    }

    /// Swap profile fields, keeping the token and expiry of the current session.
    /// Returns `false` when there is no session to update.
    pub fn refresh_profile(&self, principal_id: Option<&str>, role: Option<Role>) -> Result<bool> {
        let Some(current) = self.get_session()? else {
            return Ok(false);
        };
        let updated = Session {
            principal_id: principal_id
                .map(str::to_string)
                .unwrap_or(current.principal_id.clone()),
            role: role.unwrap_or(current.role),
            ..current
        };
        self.set_session(&updated)?;
        Ok(true)
    }

    fn mirror_legacy_flag(&self, authenticated: bool) {
        let Some(legacy) = &self.legacy else {
            return;
        };
        let result = if authenticated {
            legacy.set(LEGACY_FLAG_KEY, "1")
        } else {
            legacy.remove(LEGACY_FLAG_KEY)
        };
        if let Err(e) = result {
            warn!(error = %e, "Failed to mirror legacy session flag");
        }
    }
}
