//! eBay connection service
//!
//! Connects a secondhand-listing app to an eBay seller account.
//!
//! # Features
//!
//! - **OAuth**: authorization code grant, single stored token pair, lazy
//!   refresh with a 5 minute buffer
//! - **REST client**: bearer injection, `Retry-After` aware rate-limit
//!   retries, exponential backoff on network failures
//! - **Errors**: one enum of failure kinds, each with a user-facing message
//! - **Listings**: inventory item → offer → publish
//! - **HTTP surface**: connect/callback/status/disconnect/post routes

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod api;
pub mod cli;
pub mod config;
pub mod error;
pub mod failsafe;
pub mod oauth;
pub mod server;
pub mod services;

pub use error::{Error, Result};

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Setup tracing/logging
///
/// # Errors
///
/// Returns an error if a global subscriber is already installed.
pub fn setup_tracing(level: &str, format: Option<&str>) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let subscriber = tracing_subscriber::registry().with(filter);

    match format {
        Some("json") => subscriber
            .with(fmt::layer().json())
            .try_init()
            .map_err(|e| Error::Internal(format!("Failed to setup tracing: {e}"))),
        _ => subscriber
            .with(fmt::layer())
            .try_init()
            .map_err(|e| Error::Internal(format!("Failed to setup tracing: {e}"))),
    }
}
