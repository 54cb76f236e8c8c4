//! eBay REST API access

mod client;
pub mod listing;

pub use client::{EbayClient, MARKETPLACE_HEADER, RequestOptions};
pub use listing::{
    ItemCondition, ListingCondition, ListingDuration, ListingFormat, ListingParams,
    PublishedListing, create_and_publish,
};
