//! Authentication module for managing user sessions and credentials.
//!
//! This module provides:
//! - `CredentialStore`: durable key-value storage (memory, file, sealed, OS keychain)
//! - `SessionManager`: the only writer of the stored session, with lazy expiry
//! - `AuthFacade`: login, logout, identity refresh and page gatekeeping
//!
//! Sessions are replaced wholesale and purged as soon as they are read expired.

pub mod facade;
pub mod keychain;
pub mod password;
pub mod sealed;
pub mod session;
pub mod store;

pub use facade::{Admission, AuthFacade, Credentials, LoginOutcome, LoginStatus, Profile};
pub use keychain::KeyringStore;
pub use password::{hash_password, OfflinePasswordGate};
pub use sealed::SealedStore;
pub use session::{Session, SessionManager, LEGACY_FLAG_KEY, SESSION_KEY};
pub use store::{CredentialStore, FileStore, MemoryStore};
