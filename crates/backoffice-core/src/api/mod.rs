//! RPC client module for the backoffice endpoint.
//!
//! This module provides the `RpcClient` for sending named actions to the
//! single backend endpoint. Every request carries the session token; every
//! reply is classified into success or one `RpcError` kind.

pub mod classify;
pub mod client;
pub mod error;
pub mod transport;

pub use classify::{message_text, AuthRejectionMatcher, FailureKind, Reply, LOGIN_ACTION};
pub use client::RpcClient;
pub use error::RpcError;
pub use transport::{HttpTransport, RawResponse, Transport, TransportError};

#[cfg(test)]
pub(crate) use client::testing;
