//! eBay OAuth 2.0 user tokens
//!
//! Implements the authorization code grant against eBay's identity API:
//!
//! - Authorization URL construction
//! - Code exchange and refresh (HTTP Basic client credentials)
//! - Single-record token storage
//! - Lazy refresh on read with a 5 minute safety buffer

mod client;
mod storage;

pub use client::{ConnectionStatus, TokenManager, build_authorization_url};
pub use storage::{
    FileTokenStore, MemoryTokenStore, REFRESH_BUFFER_SECS, TokenRecord, TokenState, TokenStore,
};
