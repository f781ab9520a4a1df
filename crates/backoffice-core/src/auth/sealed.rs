//! Encrypting wrapper around another credential store.
//!
//! Values are sealed with ChaCha20-Poly1305 under a key derived from a
//! passphrase with Argon2. The per-store salt lives in the inner store under
//! `SALT_KEY`; keys themselves are stored in the clear.

use anyhow::{Context, Result};
use argon2::Argon2;
use base64::{engine::general_purpose, Engine as _};
use chacha20poly1305::{aead::Aead, aead::KeyInit, ChaCha20Poly1305, Key, Nonce};
use rand::RngCore;

use super::CredentialStore;

const SALT_KEY: &str = "__sealed_salt";
const SALT_LEN: usize = 16;
const NONCE_LEN: usize = 12;

pub struct SealedStore<S> {
    inner: S,
    cipher: ChaCha20Poly1305,
}

impl<S: CredentialStore> SealedStore<S> {
    /// Wrap `inner`, creating the salt on first use.
    pub fn new(inner: S, passphrase: &str) -> Result<Self> {
        if passphrase.is_empty() {
            anyhow::bail!("Store passphrase must not be empty");
        }

        let salt = match inner.get(SALT_KEY)? {
            Some(encoded) => general_purpose::STANDARD
                .decode(encoded)
                .context("Stored salt is not valid base64")?,
            None => {
                let mut salt = [0u8; SALT_LEN];
                rand::thread_rng().fill_bytes(&mut salt);
                inner.set(SALT_KEY, &general_purpose::STANDARD.encode(salt))?;
                salt.to_vec()
            }
        };

        let mut key = [0u8; 32];
        Argon2::default()
            .hash_password_into(passphrase.as_bytes(), &salt, &mut key)
            .map_err(|e| anyhow::anyhow!("Failed to derive store key: {}", e))?;

        Ok(Self {
            inner,
            cipher: ChaCha20Poly1305::new(Key::from_slice(&key)),
        })
    }

    fn seal(&self, plaintext: &str) -> Result<String> {
        let mut nonce_bytes = [0u8; NONCE_LEN];
        rand::thread_rng().fill_bytes(&mut nonce_bytes);

        let ciphertext = self
            .cipher
            .encrypt(Nonce::from_slice(&nonce_bytes), plaintext.as_bytes())
            .map_err(|_| anyhow::anyhow!("encryption failed"))?;

        let mut payload = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        payload.extend_from_slice(&nonce_bytes);
        payload.extend_from_slice(&ciphertext);
        Ok(general_purpose::URL_SAFE_NO_PAD.encode(payload))
    }

    fn open(&self, encoded: &str) -> Result<String> {
        let payload = general_purpose::URL_SAFE_NO_PAD
            .decode(encoded)
            .map_err(|_| anyhow::anyhow!("invalid ciphertext"))?;
        if payload.len() <= NONCE_LEN {
            anyhow::bail!("invalid ciphertext");
        }

        let (nonce_bytes, ciphertext) = payload.split_at(NONCE_LEN);
        let plaintext = self
            .cipher
            .decrypt(Nonce::from_slice(nonce_bytes), ciphertext)
            .map_err(|_| anyhow::anyhow!("decryption failed (wrong passphrase?)"))?;
        Ok(String::from_utf8(plaintext)?)
    }
}

impl<S: CredentialStore> CredentialStore for SealedStore<S> {
    fn get(&self, key: &str) -> Result<Option<String>> {
        match self.inner.get(key)? {
            Some(sealed) => self.open(&sealed).map(Some),
            None => Ok(None),
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let sealed = self.seal(value)?;
        self.inner.set(key, &sealed)
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.inner.remove(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{FileStore, MemoryStore};

    #[test]
    fn test_values_are_not_stored_in_clear() {
        let dir = tempfile::tempdir().unwrap();
        let sealed = SealedStore::new(FileStore::in_dir(dir.path().to_path_buf()), "pass").unwrap();
        sealed.set("session", "secret-token").unwrap();

        let raw = FileStore::in_dir(dir.path().to_path_buf());
        let stored = raw.get("session").unwrap().unwrap();
        assert!(!stored.contains("secret-token"));

        let reopened = SealedStore::new(raw, "pass").unwrap();
        assert_eq!(reopened.get("session").unwrap().as_deref(), Some("secret-token"));
    }

    #[test]
    fn test_wrong_passphrase_fails_to_open() {
        let dir = tempfile::tempdir().unwrap();
        let sealed = SealedStore::new(FileStore::in_dir(dir.path().to_path_buf()), "right").unwrap();
        sealed.set("session", "value").unwrap();

        let wrong = SealedStore::new(FileStore::in_dir(dir.path().to_path_buf()), "wrong").unwrap();
        assert!(wrong.get("session").is_err());
        assert!(wrong.get("missing").unwrap().is_none());
    }

    #[test]
    fn test_empty_passphrase_rejected() {
        assert!(SealedStore::new(MemoryStore::new(), "").is_err());
    }
}
