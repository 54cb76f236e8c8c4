//! Token lifecycle
//!
//! Obtains, refreshes and validates eBay user access tokens. Every call
//! re-reads the stored record; nothing is cached in memory between calls.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use reqwest::{Client, Response, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};
use url::Url;

use super::storage::{TokenRecord, TokenState, TokenStore};
use crate::config::EbayConfig;
use crate::error::parse_api_error;
use crate::{Error, Result};

/// OAuth token endpoint response
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[allow(dead_code)]
    #[serde(default)]
    token_type: Option<String>,
    expires_in: u64,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    refresh_token_expires_in: Option<u64>,
}

/// Read-only view of the connection
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionStatus {
    /// A token record exists
    pub connected: bool,
    /// Access token expiry, when connected
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    /// The user has to run the authorization flow (again)
    pub needs_reauth: bool,
}

/// Build the browser authorization URL for `config`
///
/// # Errors
///
/// Returns an error if the configured auth base URL is not a valid URL.
pub fn build_authorization_url(config: &EbayConfig) -> Result<Url> {
    let mut url = Url::parse(&format!("{}/oauth2/authorize", config.auth_base_url))
        .map_err(|e| Error::Config(format!("Invalid auth base URL: {e}")))?;

    url.query_pairs_mut()
        .append_pair("client_id", &config.client_id)
        .append_pair("response_type", "code")
        .append_pair("redirect_uri", &config.ru_name)
        .append_pair("scope", &config.scope_param());

    Ok(url)
}

/// eBay token lifecycle manager
pub struct TokenManager {
    /// HTTP client for token requests
    http_client: Client,

    /// Resolved credentials and endpoints
    config: EbayConfig,

    /// The single token record
    storage: Arc<dyn TokenStore>,
}

impl TokenManager {
    /// Create a token manager
    #[must_use]
    pub fn new(http_client: Client, config: EbayConfig, storage: Arc<dyn TokenStore>) -> Self {
        Self {
            http_client,
            config,
            storage,
        }
    }

    /// Resolved configuration
    #[must_use]
    pub fn config(&self) -> &EbayConfig {
        &self.config
    }

    /// Authorization URL the user's browser is sent to
    ///
    /// # Errors
    ///
    /// Returns an error if the configured auth base URL is invalid.
    pub fn authorization_url(&self) -> Result<Url> {
        build_authorization_url(&self.config)
    }

    /// Exchange an authorization code for a fresh token record
    ///
    /// # Errors
    ///
    /// Returns [`Error::Api`] for a non-2xx token response, or a network or
    /// storage error.
    pub async fn exchange_code(&self, code: &str) -> Result<TokenRecord> {
        debug!("Exchanging authorization code");

        let response = self
            .post_token_form(&[
                ("grant_type", "authorization_code"),
                ("code", code),
                ("redirect_uri", &self.config.ru_name),
            ])
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = error_body(response).await;
            warn!(status = %status, "Authorization code exchange failed");
            return Err(parse_api_error(&body, status.as_u16()));
        }

        let received_at = Utc::now();
        let token: TokenResponse = serde_json::from_slice(&response.bytes().await?)?;

        let refresh_token = token.refresh_token.ok_or_else(|| {
            Error::Internal("Token response is missing refresh_token".to_string())
        })?;
        let refresh_expires_in = token.refresh_token_expires_in.ok_or_else(|| {
            Error::Internal("Token response is missing refresh_token_expires_in".to_string())
        })?;

        let record = TokenRecord::from_response(
            token.access_token,
            refresh_token,
            token.expires_in,
            refresh_expires_in,
            self.config.scopes.clone(),
            received_at,
        );

        self.storage.replace(&record).await?;
        info!(expires_at = %record.access_expires_at, "eBay account connected");
        Ok(record)
    }

    /// Mint a new access token from `refresh_token` and store it
    ///
    /// # Errors
    ///
    /// Returns [`Error::TokenExpired`] when eBay rejects the refresh token
    /// (HTTP 400/401), [`Error::Api`] for other non-2xx responses.
    pub async fn refresh(&self, refresh_token: &str) -> Result<TokenRecord> {
        let previous = self.storage.get().await?;
        self.refresh_from(refresh_token, previous.as_ref()).await
    }

    /// Refresh, carrying the refresh-token fields of `previous` when the
    /// response omits them (eBay's refresh grant normally does)
    async fn refresh_from(
        &self,
        refresh_token: &str,
        previous: Option<&TokenRecord>,
    ) -> Result<TokenRecord> {
        debug!("Refreshing eBay access token");

        let scope = self.config.scope_param();
        let response = self
            .post_token_form(&[
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_token),
                ("scope", &scope),
            ])
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = error_body(response).await;
            if status == StatusCode::BAD_REQUEST || status == StatusCode::UNAUTHORIZED {
                warn!(status = %status, "Refresh token rejected, reauthorization required");
                return Err(Error::TokenExpired);
            }
            warn!(status = %status, "Token refresh failed");
            return Err(parse_api_error(&body, status.as_u16()));
        }

        let received_at = Utc::now();
        let token: TokenResponse = serde_json::from_slice(&response.bytes().await?)?;

        let mut record = TokenRecord::from_response(
            token.access_token,
            token
                .refresh_token
                .unwrap_or_else(|| refresh_token.to_string()),
            token.expires_in,
            token.refresh_token_expires_in.unwrap_or(0),
            self.config.scopes.clone(),
            received_at,
        );

        if token.refresh_token_expires_in.is_none() {
            record.refresh_expires_at = previous
                .filter(|p| p.refresh_token == refresh_token)
                .map(|p| p.refresh_expires_at)
                .ok_or_else(|| {
                    Error::Internal(
                        "Refresh response has no refresh token lifetime and no prior record"
                            .to_string(),
                    )
                })?;
        }

        self.storage.replace(&record).await?;
        info!(expires_at = %record.access_expires_at, "Token refreshed successfully");
        Ok(record)
    }

    /// Stored record, if any
    ///
    /// # Errors
    ///
    /// Returns a storage error if the record cannot be read.
    pub async fn stored_token(&self) -> Result<Option<TokenRecord>> {
        self.storage.get().await
    }

    /// Get an access token that is good for at least the refresh buffer,
    /// refreshing first when needed
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotConnected`] without a record and
    /// [`Error::TokenExpired`] once the refresh token has expired.
    pub async fn valid_access_token(&self) -> Result<String> {
        let record = self.storage.get().await?;

        match TokenState::of(record.as_ref(), Utc::now()) {
            TokenState::Absent => Err(Error::NotConnected),
            TokenState::RefreshExpired => Err(Error::TokenExpired),
            TokenState::Valid => Ok(record.map(|r| r.access_token).unwrap_or_default()),
            TokenState::AccessExpiring => {
                let Some(current) = record else {
                    return Err(Error::NotConnected);
                };
                let refreshed = self
                    .refresh_from(&current.refresh_token, Some(&current))
                    .await?;
                Ok(refreshed.access_token)
            }
        }
    }

    /// Connection state for display; never refreshes
    ///
    /// # Errors
    ///
    /// Returns a storage error if the record cannot be read.
    pub async fn connection_status(&self) -> Result<ConnectionStatus> {
        let status = match self.storage.get().await? {
            None => ConnectionStatus {
                connected: false,
                expires_at: None,
                needs_reauth: true,
            },
            Some(record) => ConnectionStatus {
                connected: true,
                expires_at: Some(record.access_expires_at),
                needs_reauth: record.refresh_expired_at(Utc::now()),
            },
        };
        Ok(status)
    }

    /// Forget the stored tokens. Safe to call when not connected.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the record exists but cannot be removed.
    pub async fn disconnect(&self) -> Result<()> {
        self.storage.delete().await?;
        info!("eBay account disconnected");
        Ok(())
    }

    async fn post_token_form(&self, form: &[(&str, &str)]) -> Result<Response> {
        let response = self
            .http_client
            .post(self.config.token_url())
            .basic_auth(&self.config.client_id, Some(&self.config.client_secret))
            .form(form)
            .send()
            .await?;
        Ok(response)
    }
}

/// Error bodies that are not JSON parse as `null` and map to the
/// unknown-error fallback
async fn error_body(response: Response) -> Value {
    response.json().await.unwrap_or(Value::Null)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oauth::MemoryTokenStore;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;

    fn config() -> EbayConfig {
        let env: HashMap<&str, &str> = [
            ("EBAY_CLIENT_ID", "My-App-PRD"),
            ("EBAY_CLIENT_SECRET", "secret"),
            ("EBAY_DEV_ID", "dev"),
            ("EBAY_RU_NAME", "My_Name-MyApp-PRD-abc"),
        ]
        .into_iter()
        .collect();
        EbayConfig::from_lookup(|k| env.get(k).map(ToString::to_string)).unwrap()
    }

    #[test]
    fn authorization_url_carries_client_and_scopes() {
        let config = config();
        let url = build_authorization_url(&config).unwrap();

        assert_eq!(url.host_str(), Some("auth.sandbox.ebay.com"));
        assert_eq!(url.path(), "/oauth2/authorize");

        let params: HashMap<_, _> = url.query_pairs().into_owned().collect();
        assert_eq!(params["client_id"], "My-App-PRD");
        assert_eq!(params["response_type"], "code");
        assert_eq!(params["redirect_uri"], "My_Name-MyApp-PRD-abc");
        assert_eq!(params["scope"], config.scopes.join(" "));
    }

    #[test]
    fn authorization_url_is_pure() {
        let config = config();
        assert_eq!(
            build_authorization_url(&config).unwrap(),
            build_authorization_url(&config).unwrap()
        );
    }

    #[tokio::test]
    async fn status_without_record_needs_reauth() {
        let manager = TokenManager::new(
            Client::new(),
            config(),
            Arc::new(MemoryTokenStore::new()),
        );
        let status = manager.connection_status().await.unwrap();
        assert_eq!(
            status,
            ConnectionStatus {
                connected: false,
                expires_at: None,
                needs_reauth: true,
            }
        );
        assert_eq!(
            serde_json::to_value(&status).unwrap(),
            serde_json::json!({"connected": false, "needsReauth": true})
        );
    }

    #[tokio::test]
    async fn missing_record_is_not_connected() {
        let manager = TokenManager::new(
            Client::new(),
            config(),
            Arc::new(MemoryTokenStore::new()),
        );
        assert!(matches!(
            manager.valid_access_token().await,
            Err(Error::NotConnected)
        ));
    }
}
