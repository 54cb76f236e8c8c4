//! eBay REST client tests against a mock API
//!
//! Covers bearer injection, rate-limit retries, API error mapping, empty
//! responses, header overrides and the listing publication flow.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{TimeDelta, Utc};
use ebay_connect::Error;
use ebay_connect::api::{ListingParams, RequestOptions, create_and_publish};
use ebay_connect::config::{Config, EbayConfig};
use ebay_connect::oauth::{MemoryTokenStore, TokenRecord, TokenStore};
use ebay_connect::services::Services;
use pretty_assertions::assert_eq;
use reqwest::header::{CONTENT_TYPE, HeaderName, HeaderValue};
use reqwest::{Client, Method};
use serde_json::{Value, json};
use wiremock::matchers::{body_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn ebay_config(api_base_url: &str) -> EbayConfig {
    let env: HashMap<&str, &str> = [
        ("EBAY_CLIENT_ID", "client-id"),
        ("EBAY_CLIENT_SECRET", "client-secret"),
        ("EBAY_DEV_ID", "dev-id"),
        ("EBAY_RU_NAME", "Seller-RuName"),
    ]
    .into_iter()
    .collect();
    EbayConfig::from_lookup(|k| env.get(k).map(ToString::to_string))
        .unwrap()
        .with_base_urls(api_base_url, api_base_url)
}

fn record(access_in: i64) -> TokenRecord {
    let now = Utc::now();
    TokenRecord {
        access_token: "access-ok".to_string(),
        refresh_token: "refresh-ok".to_string(),
        access_expires_at: now + TimeDelta::seconds(access_in),
        refresh_expires_at: now + TimeDelta::days(30),
        scopes: Vec::new(),
        updated_at: now,
    }
}

/// Services with a millisecond backoff unit so retries finish quickly
fn services(api_base_url: &str, store: Arc<dyn TokenStore>) -> Services {
    let mut config = Config::default();
    config.retry.backoff_unit = Duration::from_millis(5);
    Services::with_http_client(Client::new(), &config, ebay_config(api_base_url), store)
}

fn connected(server: &MockServer) -> Services {
    services(
        &server.uri(),
        Arc::new(MemoryTokenStore::with_record(record(3600))),
    )
}

fn listing() -> ListingParams {
    serde_json::from_value(json!({
        "sku": "ITEM-7-1700000000",
        "title": "Brass desk lamp",
        "description": "Brass desk lamp\nWorks great.",
        "condition": "USED_GOOD",
        "price": 35,
        "categoryId": "112581",
        "images": ["https://img.example/1.jpg"],
        "format": "FIXED_PRICE"
    }))
    .unwrap()
}

#[tokio::test]
async fn get_sends_bearer_and_marketplace() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/sell/inventory/v1/offer"))
        .and(header("authorization", "Bearer access-ok"))
        .and(header("x-ebay-c-marketplace-id", "EBAY_US"))
        .and(header("content-type", "application/json"))
        .and(query_param("sku", "ITEM-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"offers": []})))
        .expect(1)
        .mount(&server)
        .await;

    let svc = connected(&server);
    let body: Value = svc
        .client
        .get("/sell/inventory/v1/offer", &[("sku", "ITEM-1")])
        .await
        .unwrap();

    assert_eq!(body, json!({"offers": []}));
}

#[tokio::test]
async fn absolute_urls_pass_through() {
    let server = MockServer::start().await;
    let svc = services(
        "https://api.sandbox.ebay.com",
        Arc::new(MemoryTokenStore::with_record(record(3600))),
    );

    assert_eq!(
        svc.client.resolve_url("/sell/account/v1/privilege"),
        "https://api.sandbox.ebay.com/sell/account/v1/privilege"
    );
    let absolute = format!("{}/commerce/taxonomy/v1/category_tree/0", server.uri());
    assert_eq!(svc.client.resolve_url(&absolute), absolute);
}

/// Every attempt gets 429, so the budget runs out and the last
/// Retry-After is reported
#[tokio::test]
async fn rate_limit_exhausts_attempts() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/sell/inventory/v1/inventory_item"))
        .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "1"))
        .expect(3)
        .mount(&server)
        .await;

    let svc = connected(&server);
    let result: Result<Value, _> = svc
        .client
        .request_with_retries(
            "/sell/inventory/v1/inventory_item",
            RequestOptions::new(Method::GET),
            3,
        )
        .await;

    match result {
        Err(Error::RateLimited { retry_after }) => assert_eq!(retry_after, 1),
        other => panic!("expected RateLimited, got {other:?}"),
    }
}

#[tokio::test]
async fn rate_limit_then_success() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/sell/account/v1/privilege"))
        .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "2"))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/sell/account/v1/privilege"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"sellerRegistrationCompleted": true})))
        .expect(1)
        .mount(&server)
        .await;

    let svc = connected(&server);
    let body: Value = svc
        .client
        .get("/sell/account/v1/privilege", &[])
        .await
        .unwrap();

    assert_eq!(body["sellerRegistrationCompleted"], true);
}

/// Missing Retry-After falls back to the configured default
#[tokio::test]
async fn rate_limit_without_header_uses_default() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/sell/account/v1/privilege"))
        .respond_with(ResponseTemplate::new(429))
        .expect(1)
        .mount(&server)
        .await;

    let svc = connected(&server);
    let result: Result<Value, _> = svc
        .client
        .request_with_retries(
            "/sell/account/v1/privilege",
            RequestOptions::new(Method::GET),
            1,
        )
        .await;

    assert!(matches!(result, Err(Error::RateLimited { retry_after: 60 })));
}

/// Fractional Retry-After keeps its integer part
#[tokio::test]
async fn fractional_retry_after_is_truncated() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/sell/account/v1/privilege"))
        .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "1.5"))
        .expect(2)
        .mount(&server)
        .await;

    let svc = connected(&server);
    let result: Result<Value, _> = svc
        .client
        .request_with_retries(
            "/sell/account/v1/privilege",
            RequestOptions::new(Method::GET),
            2,
        )
        .await;

    assert!(matches!(result, Err(Error::RateLimited { retry_after: 1 })));
}

/// Non-429 errors are not retried
#[tokio::test]
async fn api_error_is_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/sell/inventory/v1/offer"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "errors": [{
                "errorId": 25002,
                "domain": "API_INVENTORY",
                "category": "REQUEST",
                "message": "A user error has occurred. Offer entity already exists.",
                "parameters": [{"name": "offerId", "value": "9000"}]
            }]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let svc = connected(&server);
    let err = svc
        .client
        .post::<Value, _>("/sell/inventory/v1/offer", Some(&json!({"sku": "A"})))
        .await
        .unwrap_err();

    assert_eq!(err.user_message(), "This item is already listed on eBay.");
    assert_eq!(err.status_code(), 400);
    match err {
        Error::Api {
            error_id, errors, ..
        } => {
            assert_eq!(error_id, "25002");
            assert_eq!(errors.len(), 1);
            assert_eq!(errors[0].parameters[0].value, "9000");
        }
        other => panic!("expected Api error, got {other:?}"),
    }
}

#[tokio::test]
async fn no_content_is_empty_object() {
    let server = MockServer::start().await;
    Mock::given(method("DELETE"))
        .and(path("/sell/inventory/v1/offer/42"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let svc = connected(&server);
    let body: Value = svc
        .client
        .delete("/sell/inventory/v1/offer/42")
        .await
        .unwrap();

    assert_eq!(body, json!({}));
}

#[tokio::test]
async fn caller_headers_override_defaults() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/sell/account/v1/privilege"))
        .and(header("x-ebay-c-marketplace-id", "EBAY_GB"))
        .and(header("content-type", "application/xml"))
        .and(header("authorization", "Bearer access-ok"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(1)
        .mount(&server)
        .await;

    let svc = connected(&server);
    let options = RequestOptions::new(Method::GET)
        .header(CONTENT_TYPE, HeaderValue::from_static("application/xml"))
        .header(
            HeaderName::from_static("x-ebay-c-marketplace-id"),
            HeaderValue::from_static("EBAY_GB"),
        );
    let _: Value = svc
        .client
        .request("/sell/account/v1/privilege", options)
        .await
        .unwrap();
}

#[tokio::test]
async fn json_body_is_sent() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path("/sell/inventory/v1/inventory_item/A-1"))
        .and(body_json(json!({"availability": {"quantity": 2}})))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let svc = connected(&server);
    let _: Value = svc
        .client
        .put(
            "/sell/inventory/v1/inventory_item/A-1",
            Some(&json!({"availability": {"quantity": 2}})),
        )
        .await
        .unwrap();
}

/// Nothing listens on port 1, so every attempt fails without a response
#[tokio::test]
async fn network_failure_exhausts_backoff() {
    let svc = services(
        "http://127.0.0.1:1",
        Arc::new(MemoryTokenStore::with_record(record(3600))),
    );

    let result: Result<Value, _> = svc
        .client
        .request_with_retries(
            "/sell/account/v1/privilege",
            RequestOptions::new(Method::GET),
            2,
        )
        .await;

    let err = result.unwrap_err();
    assert!(matches!(err, Error::Network(_)));
    assert_eq!(err.status_code(), 502);
}

#[tokio::test]
async fn not_connected_fails_before_any_call() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let svc = services(&server.uri(), Arc::new(MemoryTokenStore::new()));
    let result: Result<Value, _> = svc.client.get("/sell/account/v1/privilege", &[]).await;

    assert!(matches!(result, Err(Error::NotConnected)));
}

/// An expiring token is refreshed before the request goes out
#[tokio::test]
async fn expiring_token_refreshed_before_request() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/identity/v1/oauth2/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "access-fresh",
            "expires_in": 7200
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/sell/account/v1/privilege"))
        .and(header("authorization", "Bearer access-fresh"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(1)
        .mount(&server)
        .await;

    let svc = services(
        &server.uri(),
        Arc::new(MemoryTokenStore::with_record(record(10))),
    );
    let _: Value = svc
        .client
        .get("/sell/account/v1/privilege", &[])
        .await
        .unwrap();
}

#[tokio::test]
async fn create_and_publish_runs_three_steps() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path("/sell/inventory/v1/inventory_item/ITEM-7-1700000000"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/sell/inventory/v1/offer"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({"offerId": "5000123"})))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/sell/inventory/v1/offer/5000123/publish"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"listingId": "110553"})))
        .expect(1)
        .mount(&server)
        .await;

    let svc = connected(&server);
    let published = create_and_publish(&svc.client, &listing()).await.unwrap();

    assert_eq!(published.offer_id, "5000123");
    assert_eq!(published.listing_id, "110553");
}

/// A failing step stops the flow; later steps are never attempted
#[tokio::test]
async fn create_and_publish_stops_at_first_failure() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path("/sell/inventory/v1/inventory_item/ITEM-7-1700000000"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/sell/inventory/v1/offer"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "errors": [{"errorId": 25014, "message": "Invalid category"}]
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/sell/inventory/v1/offer/5000123/publish"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let svc = connected(&server);
    let err = create_and_publish(&svc.client, &listing())
        .await
        .unwrap_err();

    assert_eq!(err.user_message(), "Please select a valid eBay category.");
}
