//! Inventory API helpers for creating and publishing listings
//!
//! A listing goes up in three calls: create (or overwrite) the inventory
//! item, create an offer for it, publish the offer.

use serde::{Deserialize, Serialize};
use tracing::info;

use super::client::EbayClient;
use crate::Result;
use crate::config::EBAY_MARKETPLACE_ID;

/// eBay accepts at most this many images per inventory item
pub const MAX_IMAGES: usize = 12;

/// eBay rejects titles longer than this many characters
pub const MAX_TITLE_CHARS: usize = 80;

const CURRENCY: &str = "USD";

/// eBay condition enum values
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ListingCondition {
    /// Brand new
    New,
    /// Like new
    LikeNew,
    /// Used, excellent
    UsedExcellent,
    /// Used, good
    UsedGood,
    /// Used, acceptable
    UsedAcceptable,
}

/// Condition as recorded on an item in the app
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemCondition {
    /// New with tags
    NewWithTags,
    /// Like new
    LikeNew,
    /// Good
    Good,
    /// Fair
    Fair,
}

impl ItemCondition {
    /// eBay condition for this item condition
    #[must_use]
    pub fn to_ebay(self) -> ListingCondition {
        match self {
            Self::NewWithTags => ListingCondition::New,
            Self::LikeNew => ListingCondition::LikeNew,
            Self::Good => ListingCondition::UsedGood,
            Self::Fair => ListingCondition::UsedAcceptable,
        }
    }
}

/// Listing format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ListingFormat {
    /// Buy It Now
    FixedPrice,
    /// Auction
    Auction,
}

/// Listing duration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ListingDuration {
    /// 3 days
    #[serde(rename = "DAYS_3")]
    Days3,
    /// 5 days
    #[serde(rename = "DAYS_5")]
    Days5,
    /// 7 days
    #[serde(rename = "DAYS_7")]
    Days7,
    /// 10 days
    #[serde(rename = "DAYS_10")]
    Days10,
    /// Good 'Til Cancelled
    #[serde(rename = "GTC")]
    Gtc,
}

/// Everything needed to put one item up on eBay
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListingParams {
    /// Seller-defined SKU
    pub sku: String,
    /// Title (eBay caps at 80 characters)
    pub title: String,
    /// Description
    pub description: String,
    /// Condition
    pub condition: ListingCondition,
    /// Buy It Now price, or reserve reference for auctions
    pub price: f64,
    /// Quantity available
    #[serde(default = "default_quantity")]
    pub quantity: u32,
    /// Leaf category id
    pub category_id: String,
    /// Public image URLs
    #[serde(default)]
    pub images: Vec<String>,
    /// Format
    pub format: ListingFormat,
    /// Auction duration (fixed-price listings are always GTC)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<ListingDuration>,
    /// Auction starting bid
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub starting_bid: Option<f64>,
}

fn default_quantity() -> u32 {
    1
}

/// Ids returned by a successful publish
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublishedListing {
    /// Offer id
    pub offer_id: String,
    /// Live listing id
    pub listing_id: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct InventoryItem<'a> {
    sku: &'a str,
    product: Product<'a>,
    condition: ListingCondition,
    availability: Availability,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Product<'a> {
    title: &'a str,
    description: &'a str,
    image_urls: &'a [String],
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Availability {
    ship_to_location_availability: ShipToLocationAvailability,
}

#[derive(Debug, Serialize)]
struct ShipToLocationAvailability {
    quantity: u32,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Offer<'a> {
    sku: &'a str,
    marketplace_id: &'a str,
    format: ListingFormat,
    available_quantity: u32,
    category_id: &'a str,
    listing_description: &'a str,
    listing_duration: ListingDuration,
    /// Empty: eBay falls back to the seller's default business policies
    listing_policies: ListingPolicies,
    pricing_summary: PricingSummary,
    #[serde(skip_serializing_if = "Option::is_none")]
    bid_price: Option<Amount>,
}

#[derive(Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
struct ListingPolicies {
    #[serde(skip_serializing_if = "Option::is_none")]
    fulfillment_policy_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    payment_policy_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    return_policy_id: Option<String>,
}

#[derive(Debug, Serialize)]
struct PricingSummary {
    price: Amount,
}

#[derive(Debug, Serialize)]
struct Amount {
    value: String,
    currency: &'static str,
}

impl Amount {
    fn usd(value: f64) -> Self {
        Self {
            value: format!("{value:.2}"),
            currency: CURRENCY,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OfferResponse {
    offer_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PublishResponse {
    listing_id: String,
}

/// Inventory item body for `params`
fn inventory_item(params: &ListingParams) -> InventoryItem<'_> {
    let images = &params.images[..params.images.len().min(MAX_IMAGES)];
    InventoryItem {
        sku: &params.sku,
        product: Product {
            title: truncate_chars(&params.title, MAX_TITLE_CHARS),
            description: &params.description,
            image_urls: images,
        },
        condition: params.condition,
        availability: Availability {
            ship_to_location_availability: ShipToLocationAvailability {
                quantity: params.quantity,
            },
        },
    }
}

fn truncate_chars(s: &str, max: usize) -> &str {
    s.char_indices().nth(max).map_or(s, |(i, _)| &s[..i])
}

/// Offer body for `params`
fn offer(params: &ListingParams) -> Offer<'_> {
    let (listing_duration, bid_price) = match params.format {
        ListingFormat::FixedPrice => (ListingDuration::Gtc, None),
        ListingFormat::Auction => (
            params.duration.unwrap_or(ListingDuration::Days7),
            params
                .starting_bid
                .filter(|bid| *bid > 0.0)
                .map(Amount::usd),
        ),
    };

    Offer {
        sku: &params.sku,
        marketplace_id: EBAY_MARKETPLACE_ID,
        format: params.format,
        available_quantity: params.quantity,
        category_id: &params.category_id,
        listing_description: &params.description,
        listing_duration,
        listing_policies: ListingPolicies::default(),
        pricing_summary: PricingSummary {
            price: Amount::usd(params.price),
        },
        bid_price,
    }
}

/// Create or overwrite the inventory item for `params.sku`
///
/// # Errors
///
/// Returns any error from the eBay client.
pub async fn create_inventory_item(client: &EbayClient, params: &ListingParams) -> Result<()> {
    let endpoint = format!(
        "/sell/inventory/v1/inventory_item/{}",
        urlencoding::encode(&params.sku)
    );
    client
        .put::<serde_json::Value, _>(&endpoint, Some(&inventory_item(params)))
        .await?;
    Ok(())
}

/// Create an offer for an existing inventory item, returning its id
///
/// # Errors
///
/// Returns any error from the eBay client.
pub async fn create_offer(client: &EbayClient, params: &ListingParams) -> Result<String> {
    let response: OfferResponse = client
        .post("/sell/inventory/v1/offer", Some(&offer(params)))
        .await?;
    Ok(response.offer_id)
}

/// Publish an offer, returning the live listing id
///
/// # Errors
///
/// Returns any error from the eBay client.
pub async fn publish_offer(client: &EbayClient, offer_id: &str) -> Result<String> {
    let endpoint = format!(
        "/sell/inventory/v1/offer/{}/publish",
        urlencoding::encode(offer_id)
    );
    let response: PublishResponse = client
        .post::<_, serde_json::Value>(&endpoint, None)
        .await?;
    Ok(response.listing_id)
}

/// Create the inventory item, create the offer, publish it
///
/// # Errors
///
/// Returns the first failing step's error; earlier steps are not rolled back.
pub async fn create_and_publish(
    client: &EbayClient,
    params: &ListingParams,
) -> Result<PublishedListing> {
    create_inventory_item(client, params).await?;
    let offer_id = create_offer(client, params).await?;
    let listing_id = publish_offer(client, &offer_id).await?;

    info!(sku = %params.sku, offer_id = %offer_id, listing_id = %listing_id, "Listing published");
    Ok(PublishedListing {
        offer_id,
        listing_id,
    })
}
