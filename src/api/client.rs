//! Authenticated eBay REST client
//!
//! Every attempt fetches a valid access token first, so a refresh that
//! happens between retries is invisible to the caller.

use std::sync::Arc;

use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue, RETRY_AFTER};
use reqwest::{Client, Method, StatusCode};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::config::EBAY_MARKETPLACE_ID;
use crate::error::parse_api_error;
use crate::failsafe::{Attempt, RetryPolicy, with_retry};
use crate::oauth::TokenManager;
use crate::{Error, Result};

/// Marketplace header sent with every call
pub const MARKETPLACE_HEADER: &str = "X-EBAY-C-MARKETPLACE-ID";

/// Per-request options
#[derive(Debug, Clone)]
pub struct RequestOptions {
    /// HTTP method
    pub method: Method,
    /// JSON body
    pub body: Option<Value>,
    /// Query parameters
    pub query: Vec<(String, String)>,
    /// Extra headers; these override the defaults
    pub headers: HeaderMap,
}

impl Default for RequestOptions {
    fn default() -> Self {
        Self::new(Method::GET)
    }
}

impl RequestOptions {
    /// Options for `method` with no body
    #[must_use]
    pub fn new(method: Method) -> Self {
        Self {
            method,
            body: None,
            query: Vec::new(),
            headers: HeaderMap::new(),
        }
    }

    /// Attach a JSON body
    #[must_use]
    pub fn json(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    /// Add a header, replacing any default of the same name
    #[must_use]
    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }
}

/// eBay REST client with bearer injection and retries
pub struct EbayClient {
    http_client: Client,
    tokens: Arc<TokenManager>,
    retry: RetryPolicy,
}

impl EbayClient {
    /// Create a client
    #[must_use]
    pub fn new(http_client: Client, tokens: Arc<TokenManager>, retry: RetryPolicy) -> Self {
        Self {
            http_client,
            tokens,
            retry,
        }
    }

    /// Full URL for `endpoint`: absolute URLs pass through, paths are joined
    /// to the API base URL
    #[must_use]
    pub fn resolve_url(&self, endpoint: &str) -> String {
        if endpoint.starts_with("http") {
            endpoint.to_string()
        } else {
            format!("{}{endpoint}", self.tokens.config().api_base_url)
        }
    }

    /// Send a request with the configured attempt budget
    ///
    /// # Errors
    ///
    /// See [`EbayClient::request_with_retries`].
    pub async fn request<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        options: RequestOptions,
    ) -> Result<T> {
        self.request_with_retries(endpoint, options, self.retry.max_attempts)
            .await
    }

    /// Send a request, making at most `max_retries` attempts.
    ///
    /// - 429: wait `Retry-After` seconds (default 60) and retry; the last
    ///   attempt fails with [`Error::RateLimited`]
    /// - other non-2xx: [`Error::Api`], never retried
    /// - no response: retry after `2^attempt` seconds; the last attempt
    ///   fails with [`Error::Network`]
    /// - 204: empty payload
    ///
    /// # Errors
    ///
    /// Returns the errors above, plus any error from obtaining a token.
    pub async fn request_with_retries<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        options: RequestOptions,
        max_retries: u32,
    ) -> Result<T> {
        let url = self.resolve_url(endpoint);
        let policy = self.retry.with_max_attempts(max_retries);
        let name = format!("{} {endpoint}", options.method);

        let value = with_retry(&policy, &name, |attempt| {
            self.attempt(&url, &options, &policy, attempt, max_retries)
        })
        .await?;

        decode(value)
    }

    async fn attempt(
        &self,
        url: &str,
        options: &RequestOptions,
        policy: &RetryPolicy,
        attempt: u32,
        max_retries: u32,
    ) -> Attempt<Value> {
        let access_token = match self.tokens.valid_access_token().await {
            Ok(token) => token,
            Err(e) => return Attempt::Fatal(e),
        };

        let headers = match default_headers(&access_token) {
            Ok(mut headers) => {
                headers.extend(options.headers.clone());
                headers
            }
            Err(e) => return Attempt::Fatal(e),
        };

        let mut request = self
            .http_client
            .request(options.method.clone(), url)
            .headers(headers);
        if !options.query.is_empty() {
            request = request.query(&options.query);
        }
        if let Some(ref body) = options.body {
            request = request.body(body.to_string());
        }

        debug!(method = %options.method, url = %url, attempt, "eBay request");

        let response = match request.send().await {
            Ok(response) => response,
            Err(e) => {
                warn!(url = %url, attempt, error = %e, "eBay request failed without response");
                return Attempt::Backoff(Error::Network(e));
            }
        };

        let status = response.status();

        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after = retry_after_secs(response.headers(), policy.default_retry_after);
            warn!(url = %url, attempt, max_retries, retry_after, "eBay rate limit hit");
            return Attempt::RetryAfter(
                policy.retry_after_delay(retry_after),
                Error::RateLimited { retry_after },
            );
        }

        if status == StatusCode::NO_CONTENT {
            return Attempt::Done(Value::Null);
        }

        let bytes = match response.bytes().await {
            Ok(bytes) => bytes,
            Err(e) => return Attempt::Backoff(Error::Network(e)),
        };

        if !status.is_success() {
            let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
            let error = parse_api_error(&body, status.as_u16());
            warn!(url = %url, status = %status, error = %error, "eBay API error");
            return Attempt::Fatal(error);
        }

        if bytes.is_empty() {
            return Attempt::Done(Value::Null);
        }

        match serde_json::from_slice(&bytes) {
            Ok(value) => Attempt::Done(value),
            Err(e) => Attempt::Fatal(Error::Json(e)),
        }
    }

    /// GET with optional query parameters
    ///
    /// # Errors
    ///
    /// See [`EbayClient::request_with_retries`].
    pub async fn get<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        query: &[(&str, &str)],
    ) -> Result<T> {
        let mut options = RequestOptions::new(Method::GET);
        options.query = query
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        self.request(endpoint, options).await
    }

    /// POST with an optional JSON body
    ///
    /// # Errors
    ///
    /// See [`EbayClient::request_with_retries`].
    pub async fn post<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        endpoint: &str,
        body: Option<&B>,
    ) -> Result<T> {
        self.request(endpoint, with_body(Method::POST, body)?).await
    }

    /// PUT with an optional JSON body
    ///
    /// # Errors
    ///
    /// See [`EbayClient::request_with_retries`].
    pub async fn put<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        endpoint: &str,
        body: Option<&B>,
    ) -> Result<T> {
        self.request(endpoint, with_body(Method::PUT, body)?).await
    }

    /// DELETE
    ///
    /// # Errors
    ///
    /// See [`EbayClient::request_with_retries`].
    pub async fn delete<T: DeserializeOwned>(&self, endpoint: &str) -> Result<T> {
        self.request(endpoint, RequestOptions::new(Method::DELETE))
            .await
    }
}

fn with_body<B: Serialize + ?Sized>(method: Method, body: Option<&B>) -> Result<RequestOptions> {
    let mut options = RequestOptions::new(method);
    if let Some(body) = body {
        options.body = Some(serde_json::to_value(body)?);
    }
    Ok(options)
}

fn default_headers(access_token: &str) -> Result<HeaderMap> {
    let mut headers = HeaderMap::new();
    let bearer = HeaderValue::from_str(&format!("Bearer {access_token}"))
        .map_err(|e| Error::Internal(format!("Invalid access token header: {e}")))?;
    headers.insert(AUTHORIZATION, bearer);
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    headers.insert(
        HeaderName::from_static("x-ebay-c-marketplace-id"),
        HeaderValue::from_static(EBAY_MARKETPLACE_ID),
    );
    Ok(headers)
}

/// Longest `Retry-After` honored, in seconds
const MAX_RETRY_AFTER_SECS: u64 = 300;

/// Seconds from the leading integer of `Retry-After` (`"1.5"` is 1),
/// `default` when absent or non-numeric, capped at [`MAX_RETRY_AFTER_SECS`]
fn retry_after_secs(headers: &HeaderMap, default: u64) -> u64 {
    headers
        .get(RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| {
            let v = v.trim_start();
            let end = v.find(|c: char| !c.is_ascii_digit()).unwrap_or(v.len());
            let digits = &v[..end];
            digits
                .parse::<u64>()
                .ok()
                .or_else(|| (!digits.is_empty()).then_some(u64::MAX))
        })
        .unwrap_or(default)
        .min(MAX_RETRY_AFTER_SECS)
}

/// Decode a payload; an empty payload (204, empty body) becomes `{}` or
/// `null`, whichever `T` accepts
fn decode<T: DeserializeOwned>(value: Value) -> Result<T> {
    if value.is_null() {
        if let Ok(empty) = serde_json::from_value(Value::Object(Map::new())) {
            return Ok(empty);
        }
    }
    Ok(serde_json::from_value(value)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde::Deserialize;

    #[test]
    fn default_headers_carry_bearer_and_marketplace() {
        let headers = default_headers("abc").unwrap();
        assert_eq!(headers[AUTHORIZATION], "Bearer abc");
        assert_eq!(headers[CONTENT_TYPE], "application/json");
        assert_eq!(headers[MARKETPLACE_HEADER], "EBAY_US");
    }

    #[test]
    fn caller_headers_override_defaults() {
        let mut headers = default_headers("abc").unwrap();
        let options = RequestOptions::new(Method::GET).header(
            HeaderName::from_static("x-ebay-c-marketplace-id"),
            HeaderValue::from_static("EBAY_GB"),
        );
        headers.extend(options.headers);
        assert_eq!(headers[MARKETPLACE_HEADER], "EBAY_GB");
        assert_eq!(headers.get_all(MARKETPLACE_HEADER).iter().count(), 1);
    }

    fn retry_after(value: Option<&'static str>) -> u64 {
        let mut headers = HeaderMap::new();
        if let Some(value) = value {
            headers.insert(RETRY_AFTER, HeaderValue::from_static(value));
        }
        retry_after_secs(&headers, 60)
    }

    #[test]
    fn retry_after_parsing() {
        assert_eq!(retry_after(Some("1")), 1);
        assert_eq!(retry_after(Some(" 12 ")), 12);
        assert_eq!(retry_after(Some("1.5")), 1);
        assert_eq!(retry_after(Some("soon")), 60);
        assert_eq!(retry_after(None), 60);
        assert_eq!(retry_after(Some("86400")), MAX_RETRY_AFTER_SECS);
        assert_eq!(
            retry_after(Some("99999999999999999999999")),
            MAX_RETRY_AFTER_SECS
        );
    }

    #[test]
    fn empty_payload_decodes_as_empty_object_or_unit() {
        let value: Value = decode(Value::Null).unwrap();
        assert_eq!(value, serde_json::json!({}));

        decode::<()>(Value::Null).unwrap();

        #[derive(Debug, Deserialize, Default, PartialEq)]
        struct Offer {
            #[serde(default)]
            offer_id: Option<String>,
        }
        assert_eq!(decode::<Offer>(Value::Null).unwrap(), Offer::default());
    }
}
