//! Checkout attempts.

use chrono::{DateTime, Utc};

use tradepost_core::{
    CartId, CheckoutId, CheckoutStatus, GoodsId, Money, ProductId, Quantity, SettlementLine,
    UserId,
};

/// One attempt to pay for a cart.
#[derive(Debug, Clone)]
pub struct Checkout {
    pub id: CheckoutId,
    pub user_id: UserId,
    pub cart_id: CartId,
    pub status: CheckoutStatus,
    /// Provider session id, set once the provider has answered.
    pub provider_session_id: Option<String>,
    /// Where the shopper was sent to pay.
    pub redirect_url: Option<String>,
    pub amount_total: Money,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub settled_at: Option<DateTime<Utc>>,
}

/// A cart line as it was when the checkout began.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutLine {
    pub goods_id: GoodsId,
    pub product_id: ProductId,
    pub name: String,
    pub quantity: Quantity,
    pub unit_price: Money,
}

impl CheckoutLine {
    #[must_use]
    pub const fn settlement_line(&self) -> SettlementLine {
        SettlementLine {
            goods_id: self.goods_id,
            product_id: self.product_id,
            quantity: self.quantity,
        }
    }
}
