//! Provider integration module.
//!
//! This module provides the request/response capability used to talk to the aggregator (Salt
//! Edge) and the ledger (Firefly III). Both providers speak JSON over HTTPS; the differences are
//! confined to authentication headers and are resolved when the client is constructed.

/// HTTP client and the `ProviderClient` capability
mod client;
/// Response and error types
mod types;

pub use client::{HttpProviderClient, ProviderClient};
pub use types::*;
