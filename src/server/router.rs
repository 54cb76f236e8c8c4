//! HTTP router and handlers

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
    routing::{get, post},
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::{Value, json};
use tower_http::{catch_panic::CatchPanicLayer, trace::TraceLayer};
use tracing::{error, info, warn};

use crate::Error;
use crate::api::{
    ItemCondition, ListingDuration, ListingFormat, ListingParams, create_and_publish,
};
use crate::oauth::TokenStore;
use crate::services::Services;

const NOT_CONFIGURED: &str =
    "eBay integration is not configured. Please add eBay credentials to environment variables.";

/// Shared application state
pub struct AppState {
    /// eBay services; `None` when credentials are missing
    pub services: Option<Services>,
    /// Token store, reachable even without credentials so disconnect works
    pub store: Arc<dyn TokenStore>,
    /// Where the OAuth callback redirects the browser
    pub settings_url: String,
}

/// Create the router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/api/ebay/auth", get(auth_handler))
        .route("/api/ebay/callback", get(callback_handler))
        .route("/api/ebay/status", get(status_handler))
        .route("/api/ebay/disconnect", post(disconnect_handler))
        .route("/api/ebay/listings", post(post_listing_handler))
        .layer(CatchPanicLayer::new())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Error as a JSON response with a status derived from its kind
fn error_response(error: &Error) -> Response {
    let status =
        StatusCode::from_u16(error.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

    let mut body = json!({ "error": error.user_message() });
    if let Error::Api {
        error_id, errors, ..
    } = error
    {
        body["errorId"] = json!(error_id);
        body["errors"] = json!(errors);
    }
    if error.needs_reauth() {
        body["needsReauth"] = json!(true);
    }

    (status, Json(body)).into_response()
}

fn not_configured() -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({ "error": NOT_CONFIGURED })),
    )
        .into_response()
}

/// GET /health
async fn health_handler() -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// GET /api/ebay/auth - send the browser to eBay's consent page
async fn auth_handler(State(state): State<Arc<AppState>>) -> Response {
    let Some(ref services) = state.services else {
        return not_configured();
    };

    match services.tokens.authorization_url() {
        Ok(url) => Redirect::temporary(url.as_str()).into_response(),
        Err(e) => {
            error!(error = %e, "Failed to build eBay authorization URL");
            error_response(&e)
        }
    }
}

/// OAuth callback query parameters
#[derive(Debug, Deserialize)]
struct CallbackParams {
    code: Option<String>,
    error: Option<String>,
    error_description: Option<String>,
}

/// GET /api/ebay/callback - exchange the code, then back to settings
async fn callback_handler(
    State(state): State<Arc<AppState>>,
    Query(params): Query<CallbackParams>,
) -> Redirect {
    if let Some(ref error) = params.error {
        warn!(error = %error, description = ?params.error_description, "eBay OAuth error");
        let message = params.error_description.as_deref().unwrap_or(error);
        return settings_redirect(&state.settings_url, &[("ebay", "error"), ("message", message)]);
    }

    let Some(code) = params.code.as_deref().filter(|c| !c.is_empty()) else {
        return settings_redirect(
            &state.settings_url,
            &[("ebay", "error"), ("message", "No authorization code received")],
        );
    };

    let Some(ref services) = state.services else {
        return settings_redirect(
            &state.settings_url,
            &[("ebay", "error"), ("message", NOT_CONFIGURED)],
        );
    };

    match services.tokens.exchange_code(code).await {
        Ok(_) => settings_redirect(&state.settings_url, &[("ebay", "connected")]),
        Err(e) => {
            error!(error = %e, "eBay token exchange failed");
            let message = e.user_message();
            settings_redirect(&state.settings_url, &[("ebay", "error"), ("message", &message)])
        }
    }
}

fn settings_redirect(settings_url: &str, params: &[(&str, &str)]) -> Redirect {
    let query = url::form_urlencoded::Serializer::new(String::new())
        .extend_pairs(params)
        .finish();
    let sep = if settings_url.contains('?') { '&' } else { '?' };
    Redirect::temporary(&format!("{settings_url}{sep}{query}"))
}

/// GET /api/ebay/status
async fn status_handler(State(state): State<Arc<AppState>>) -> Response {
    let Some(ref services) = state.services else {
        return Json(json!({
            "configured": false,
            "connected": false,
            "needsReauth": false,
            "message": "eBay integration is not configured",
        }))
        .into_response();
    };

    match services.tokens.connection_status().await {
        Ok(status) => {
            let mut body = serde_json::to_value(&status).unwrap_or_else(|_| json!({}));
            if let Value::Object(ref mut map) = body {
                map.insert("configured".to_string(), Value::Bool(true));
            }
            Json(body).into_response()
        }
        Err(e) => {
            error!(error = %e, "eBay status check failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({
                    "configured": true,
                    "connected": false,
                    "needsReauth": true,
                    "error": e.user_message(),
                })),
            )
                .into_response()
        }
    }
}

/// POST /api/ebay/disconnect
async fn disconnect_handler(State(state): State<Arc<AppState>>) -> Response {
    let result = match state.services {
        Some(ref services) => services.tokens.disconnect().await,
        None => state.store.delete().await,
    };

    match result {
        Ok(()) => Json(json!({ "success": true })).into_response(),
        Err(e) => {
            error!(error = %e, "eBay disconnect failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": e.user_message() })),
            )
                .into_response()
        }
    }
}

/// Listing request from the app: an item plus the seller's eBay choices
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PostListingRequest {
    item_id: String,
    /// Generated description; its first line becomes the title
    description: String,
    condition: ItemCondition,
    price: f64,
    category_id: String,
    #[serde(default)]
    images: Vec<String>,
    format: ListingFormat,
    duration: Option<ListingDuration>,
    starting_bid: Option<f64>,
}

impl PostListingRequest {
    fn missing_fields(&self) -> Vec<&'static str> {
        [
            ("itemId", self.item_id.as_str()),
            ("description", self.description.as_str()),
            ("categoryId", self.category_id.as_str()),
        ]
        .into_iter()
        .filter(|(_, v)| v.trim().is_empty())
        .map(|(k, _)| k)
        .collect()
    }

    /// eBay parameters; the SKU is unique per post attempt
    fn into_params(self, posted_at_millis: i64) -> ListingParams {
        let title = self.description.lines().next().unwrap_or_default().trim().to_string();
        ListingParams {
            sku: format!("ITEM-{}-{posted_at_millis}", self.item_id),
            title,
            description: self.description,
            condition: self.condition.to_ebay(),
            price: self.price,
            quantity: 1,
            category_id: self.category_id,
            images: self.images,
            format: self.format,
            duration: self.duration,
            starting_bid: self.starting_bid,
        }
    }
}

/// POST /api/ebay/listings - create and publish one listing
async fn post_listing_handler(
    State(state): State<Arc<AppState>>,
    Json(request): Json<PostListingRequest>,
) -> Response {
    let missing = request.missing_fields();
    if !missing.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({
                "error": format!("Missing required fields: {}", missing.join(", "))
            })),
        )
            .into_response();
    }

    let Some(ref services) = state.services else {
        return not_configured();
    };

    let params = request.into_params(Utc::now().timestamp_millis());

    match create_and_publish(&services.client, &params).await {
        Ok(published) => {
            info!(sku = %params.sku, listing_id = %published.listing_id, "Posted listing to eBay");
            Json(json!({
                "success": true,
                "sku": params.sku,
                "ebayListingId": published.listing_id,
                "offerId": published.offer_id,
                "message": "Successfully posted to eBay",
            }))
            .into_response()
        }
        Err(e) => {
            error!(sku = %params.sku, error = %e, "eBay post listing failed");
            error_response(&e)
        }
    }
}
