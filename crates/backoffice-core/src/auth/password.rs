use anyhow::Result;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use rand::rngs::OsRng;
use rand::RngCore;
use tracing::warn;

/// Local password check against a fixed set of Argon2 PHC hashes.
///
/// Only front-door protection: the backend still has to accept the session
/// token for any data to flow.
#[derive(Debug, Clone)]
pub struct OfflinePasswordGate {
    hashes: Vec<String>,
}

impl OfflinePasswordGate {
    /// `None` when no usable hash is configured.
    pub fn from_hashes(hashes: &[String]) -> Option<Self> {
        let hashes: Vec<String> = hashes
            .iter()
            .filter(|h| match PasswordHash::new(h.as_str()) {
                Ok(_) => true,
                Err(e) => {
                    warn!(error = %e, "Ignoring malformed offline password hash");
                    false
                }
            })
            .cloned()
            .collect();
        (!hashes.is_empty()).then_some(Self { hashes })
    }

    pub fn verify(&self, password: &str) -> bool {
        let password = password.trim();
        if password.is_empty() {
            return false;
        }
        let argon2 = Argon2::default();
        self.hashes.iter().any(|h| {
            PasswordHash::new(h)
                .map(|parsed| argon2.verify_password(password.as_bytes(), &parsed).is_ok())
                .unwrap_or(false)
        })
    }
}

/// Produce a PHC hash string for use in `offline_password_hashes`.
pub fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(password.trim().as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!("Failed to hash password: {}", e))?;
    Ok(hash.to_string())
}

/// Random 256-bit token, hex encoded, for locally minted sessions.
pub fn random_token() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}
