//! Ozon API payloads and normalized records

use chrono::{DateTime, Utc};
use serde::Deserialize;

/// Fulfilment scheme discriminator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scheme {
    /// Fulfilment by Ozon
    Fbo,
    /// Fulfilment by seller
    Fbs,
}

impl Scheme {
    pub fn as_str(&self) -> &'static str {
        match self {
            Scheme::Fbo => "FBO",
            Scheme::Fbs => "FBS",
        }
    }
}

/// Posting list response envelope
#[derive(Debug, Clone, Deserialize)]
pub struct PostingsResponse {
    #[serde(default)]
    pub result: Option<PostingsResult>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PostingsResult {
    #[serde(default)]
    pub postings: Vec<Posting>,
    /// Reported by the FBO endpoint only.
    #[serde(default)]
    pub total: Option<u64>,
    /// Reported by the FBS endpoint only.
    #[serde(default)]
    pub has_next: Option<bool>,
}

/// One posting (order) from either scheme
#[derive(Debug, Clone, Deserialize)]
pub struct Posting {
    pub posting_number: String,
    #[serde(default)]
    pub order_id: Option<i64>,
    #[serde(default)]
    pub order_number: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub delivery_method: Option<DeliveryMethod>,
    #[serde(default)]
    pub tpl_integration_type: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub in_process_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub shipment_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub delivering_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub products: serde_json::Value,
    #[serde(default)]
    pub analytics_data: serde_json::Value,
    #[serde(default)]
    pub financial_data: serde_json::Value,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DeliveryMethod {
    #[serde(default)]
    pub id: Option<i64>,
}

/// Product list response envelope (`/v3/product/list`)
#[derive(Debug, Clone, Deserialize)]
pub struct ProductListResponse {
    #[serde(default)]
    pub result: Option<ProductListResult>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProductListResult {
    #[serde(default)]
    pub items: Vec<ProductItem>,
    #[serde(default)]
    pub last_id: Option<String>,
    #[serde(default)]
    pub total: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProductItem {
    pub product_id: i64,
    #[serde(default)]
    pub offer_id: Option<String>,
    #[serde(default)]
    pub has_fbo_stocks: bool,
}

/// Normalized stock line keyed by `sku`
#[derive(Debug, Clone, PartialEq)]
pub struct OzonStock {
    pub sku: i64,
    pub product_id: i64,
    pub item_code: String,
    pub fbo_visible_amount: i32,
    pub fbo_present_amount: i32,
}

impl OzonStock {
    /// The product list carries availability flags rather than quantities;
    /// they land as 0/1 until a richer stocks feed is wired in.
    pub fn from_item(item: &ProductItem) -> Self {
        let amount = i32::from(item.has_fbo_stocks);
        Self {
            sku: item.product_id,
            product_id: item.product_id,
            item_code: item.offer_id.clone().unwrap_or_default(),
            fbo_visible_amount: amount,
            fbo_present_amount: amount,
        }
    }
}
