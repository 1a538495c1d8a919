//! Catalog product.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;

use tradepost_core::{Money, ProductId, ProductSnapshot};

/// A product as stored in the catalog.
#[derive(Debug, Clone, Serialize)]
pub struct Product {
    pub id: ProductId,
    pub title: String,
    /// Unit price in minor units.
    pub price: Money,
    pub description: String,
    pub category: String,
    /// Image URL or static path.
    pub image: String,
    /// Average review score, if any reviews exist.
    pub rating: Option<Decimal>,
    /// Live stock count.
    pub stock: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Product {
    #[must_use]
    pub const fn in_stock(&self) -> bool {
        self.stock > 0
    }

    /// The fields copied onto a cart line when this product is added.
    #[must_use]
    pub fn snapshot(&self) -> ProductSnapshot {
        ProductSnapshot {
            id: self.id,
            title: self.title.clone(),
            image: self.image.clone(),
            price: self.price,
        }
    }

    /// Price formatted for display, e.g. `$19.99`.
    #[must_use]
    pub fn price_display(&self) -> String {
        self.price.to_string()
    }

    /// Rating formatted to one decimal place, or empty when unrated.
    #[must_use]
    pub fn rating_display(&self) -> String {
        self.rating
            .map(|r| format!("{:.1}", r.round_dp(1)))
            .unwrap_or_default()
    }
}
