//! Error types for the eBay connection service

use std::io;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Result type alias for the eBay connection service
pub type Result<T> = std::result::Result<T, Error>;

/// eBay connection errors
#[derive(Error, Debug)]
pub enum Error {
    /// Missing or invalid credentials / settings
    #[error("Configuration error: {0}")]
    Config(String),

    /// No token record exists; the account was never connected
    #[error("eBay account not connected. Please connect your eBay account in Settings.")]
    NotConnected,

    /// Refresh token expired or rejected; the user must reauthorize
    #[error("eBay session expired. Please reconnect your eBay account.")]
    TokenExpired,

    /// Non-2xx response from an eBay endpoint
    #[error("eBay API error {status} ({error_id}): {message}")]
    Api {
        /// HTTP status code
        status: u16,
        /// eBay error id (or OAuth error code)
        error_id: String,
        /// Primary error message
        message: String,
        /// Structured sub-errors from the response body
        errors: Vec<ErrorDetail>,
    },

    /// HTTP 429 after the retry budget ran out
    #[error("Rate limited. Retry after {retry_after} seconds")]
    RateLimited {
        /// Seconds the caller should wait
        retry_after: u64,
    },

    /// No response received from eBay
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Token store failure
    #[error("Token storage error: {0}")]
    Storage(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

/// One entry of the `errors` array in an eBay REST error body
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorDetail {
    /// Numeric eBay error id
    #[serde(default)]
    pub error_id: u64,
    /// Error domain (e.g. `API_INVENTORY`)
    #[serde(default)]
    pub domain: String,
    /// Subdomain
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subdomain: Option<String>,
    /// Category (`REQUEST`, `APPLICATION`, ...)
    #[serde(default)]
    pub category: String,
    /// Short message
    #[serde(default)]
    pub message: String,
    /// Long message
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub long_message: Option<String>,
    /// Offending parameters
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub parameters: Vec<ErrorParameter>,
}

/// Name/value pair attached to an [`ErrorDetail`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorParameter {
    /// Parameter name
    pub name: String,
    /// Parameter value
    #[serde(default)]
    pub value: String,
}

const UNKNOWN_MESSAGE: &str = "Unknown eBay API error";
const UNKNOWN_ID: &str = "unknown";

/// Parse an eBay error response body into [`Error::Api`].
///
/// Understands the REST `{"errors": [...]}` shape (first entry is primary)
/// and the OAuth `{"error", "error_description"}` shape.
#[must_use]
pub fn parse_api_error(body: &Value, status: u16) -> Error {
    if let Some(entries) = body.get("errors").and_then(Value::as_array) {
        let errors: Vec<ErrorDetail> = entries
            .iter()
            .filter_map(|e| serde_json::from_value(e.clone()).ok())
            .collect();

        let primary = errors.first();
        let message = primary
            .map(|e| e.message.clone())
            .filter(|m| !m.is_empty())
            .unwrap_or_else(|| UNKNOWN_MESSAGE.to_string());
        let error_id = primary
            .map(|e| e.error_id)
            .filter(|id| *id != 0)
            .map_or_else(|| UNKNOWN_ID.to_string(), |id| id.to_string());

        return Error::Api {
            status,
            error_id,
            message,
            errors,
        };
    }

    if let Some(code) = body.get("error") {
        let code = value_to_string(code);
        let message = body
            .get("error_description")
            .map(value_to_string)
            .filter(|d| !d.is_empty())
            .unwrap_or_else(|| code.clone());

        return Error::Api {
            status,
            error_id: code,
            message,
            errors: Vec::new(),
        };
    }

    Error::Api {
        status,
        error_id: UNKNOWN_ID.to_string(),
        message: UNKNOWN_MESSAGE.to_string(),
        errors: Vec::new(),
    }
}

fn value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

impl Error {
    /// Human-readable message suitable for showing to the end user
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::NotConnected => {
                "Please connect your eBay account in Settings to post listings.".to_string()
            }
            Self::TokenExpired => {
                "Your eBay session has expired. Please reconnect your account.".to_string()
            }
            Self::RateLimited { retry_after } => format!(
                "eBay is temporarily limiting requests. Please wait {retry_after} seconds and try again."
            ),
            Self::Api {
                error_id, message, ..
            } => match error_id.as_str() {
                "25002" => "This item is already listed on eBay.".to_string(),
                "25014" => "Please select a valid eBay category.".to_string(),
                "25710" => "eBay requires at least one image for listings.".to_string(),
                _ => message.clone(),
            },
            other => other.to_string(),
        }
    }

    /// HTTP status used when this error is returned by the HTTP surface
    #[must_use]
    pub fn status_code(&self) -> u16 {
        match self {
            Self::NotConnected | Self::TokenExpired => 401,
            Self::RateLimited { .. } => 429,
            Self::Api { status, .. } if (400..600).contains(status) => *status,
            Self::Network(_) => 502,
            _ => 500,
        }
    }

    /// Whether the user has to run the authorization flow again
    #[must_use]
    pub fn needs_reauth(&self) -> bool {
        matches!(self, Self::NotConnected | Self::TokenExpired)
    }
}
