//! Wiring of the token manager and REST client

use std::sync::Arc;
use std::time::Duration;

use reqwest::Client;

use crate::api::EbayClient;
use crate::config::{Config, EbayConfig};
use crate::failsafe::RetryPolicy;
use crate::oauth::{TokenManager, TokenStore};
use crate::{Error, Result};

/// Per-request timeout for calls to eBay
const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Token manager and REST client sharing one store and HTTP client
#[derive(Clone)]
pub struct Services {
    /// Token lifecycle
    pub tokens: Arc<TokenManager>,
    /// Authenticated REST client
    pub client: Arc<EbayClient>,
}

impl Services {
    /// Build services for `ebay` on top of `store`
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn new(config: &Config, ebay: EbayConfig, store: Arc<dyn TokenStore>) -> Result<Self> {
        let http_client = Client::builder()
            .timeout(HTTP_TIMEOUT)
            .user_agent(concat!("ebay-connect/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| Error::Internal(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self::with_http_client(http_client, config, ebay, store))
    }

    /// Build services with a caller-supplied HTTP client
    #[must_use]
    pub fn with_http_client(
        http_client: Client,
        config: &Config,
        ebay: EbayConfig,
        store: Arc<dyn TokenStore>,
    ) -> Self {
        let tokens = Arc::new(TokenManager::new(http_client.clone(), ebay, store));
        let client = Arc::new(EbayClient::new(
            http_client,
            Arc::clone(&tokens),
            RetryPolicy::new(&config.retry),
        ));
        Self { tokens, client }
    }
}
