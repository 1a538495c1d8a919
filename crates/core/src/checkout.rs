//! Checkout lifecycle and settlement planning.
//!
//! ```text
//! Pending ──> AwaitingPayment ──> Settled
//!    │               │
//!    └───────────────┴──────────> Abandoned
//! ```
//!
//! `Settled` and `Abandoned` are terminal.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::types::{GoodsId, ProductId, Quantity};

/// Status of one checkout attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "postgres", derive(sqlx::Type))]
#[cfg_attr(
    feature = "postgres",
    sqlx(type_name = "storefront.checkout_status", rename_all = "snake_case")
)]
#[serde(rename_all = "snake_case")]
pub enum CheckoutStatus {
    /// Recorded locally, no provider session yet.
    Pending,
    /// The shopper has been sent to the provider.
    AwaitingPayment,
    /// Paid; stock decremented and cart cleared.
    Settled,
    /// Cancelled, expired, or the provider call failed.
    Abandoned,
}

/// A status change that the lifecycle does not allow.
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("checkout cannot move from {from} to {to}")]
pub struct TransitionError {
    pub from: CheckoutStatus,
    pub to: CheckoutStatus,
}

impl CheckoutStatus {
    /// Whether no further transitions are possible.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Settled | Self::Abandoned)
    }

    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::AwaitingPayment | Self::Abandoned)
                | (Self::AwaitingPayment, Self::Settled | Self::Abandoned)
        )
    }

    /// Validate a transition.
    ///
    /// # Errors
    ///
    /// Returns [`TransitionError`] if `next` is not reachable from `self`.
    pub const fn transition(self, next: Self) -> Result<Self, TransitionError> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(TransitionError {
                from: self,
                to: next,
            })
        }
    }
}

impl std::fmt::Display for CheckoutStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::AwaitingPayment => write!(f, "awaiting_payment"),
            Self::Settled => write!(f, "settled"),
            Self::Abandoned => write!(f, "abandoned"),
        }
    }
}

impl std::str::FromStr for CheckoutStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "awaiting_payment" => Ok(Self::AwaitingPayment),
            "settled" => Ok(Self::Settled),
            "abandoned" => Ok(Self::Abandoned),
            _ => Err(format!("invalid checkout status: {s}")),
        }
    }
}

/// One paid line, as snapshotted when the checkout began.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SettlementLine {
    pub goods_id: GoodsId,
    pub product_id: ProductId,
    pub quantity: Quantity,
}

/// The stock change settlement will apply to one product.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StockDecrement {
    pub product_id: ProductId,
    pub quantity: u32,
    pub remaining: u32,
}

/// Why a paid checkout cannot be settled.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum SettlementError {
    #[error("product {0} no longer exists")]
    UnknownProduct(ProductId),

    #[error("product {product_id} has {available} in stock, {requested} were paid for")]
    InsufficientStock {
        product_id: ProductId,
        requested: u64,
        available: u32,
    },
}

/// Work out the stock decrements for a paid checkout.
///
/// Lines for the same product are combined. The result is ordered by product
/// id, which is also the order the storefront locks product rows in.
///
/// # Errors
///
/// Fails without a partial plan if any product is missing or short.
pub fn plan_settlement(
    lines: &[SettlementLine],
    stock: &BTreeMap<ProductId, u32>,
) -> Result<Vec<StockDecrement>, SettlementError> {
    let mut wanted: BTreeMap<ProductId, u64> = BTreeMap::new();
    for line in lines {
        *wanted.entry(line.product_id).or_default() += u64::from(line.quantity.get());
    }

    wanted
        .into_iter()
        .map(|(product_id, requested)| {
            let available = *stock
                .get(&product_id)
                .ok_or(SettlementError::UnknownProduct(product_id))?;
            let insufficient = SettlementError::InsufficientStock {
                product_id,
                requested,
                available,
            };
            let quantity = u32::try_from(requested).map_err(|_| insufficient.clone())?;
            let remaining = available.checked_sub(quantity).ok_or(insufficient)?;
            Ok(StockDecrement {
                product_id,
                quantity,
                remaining,
            })
        })
        .collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn settle_line(goods: i32, product: i32, quantity: u32) -> SettlementLine {
        SettlementLine {
            goods_id: GoodsId::new(goods),
            product_id: ProductId::new(product),
            quantity: Quantity::new(quantity).unwrap(),
        }
    }

    #[test]
    fn test_happy_path_transitions() {
        let status = CheckoutStatus::Pending
            .transition(CheckoutStatus::AwaitingPayment)
            .unwrap()
            .transition(CheckoutStatus::Settled)
            .unwrap();
        assert!(status.is_terminal());
    }

    #[test]
    fn test_abandon_from_pending_or_awaiting() {
        assert!(CheckoutStatus::Pending.can_transition_to(CheckoutStatus::Abandoned));
        assert!(CheckoutStatus::AwaitingPayment.can_transition_to(CheckoutStatus::Abandoned));
    }

    #[test]
    fn test_terminal_states_are_final() {
        for next in [
            CheckoutStatus::Pending,
            CheckoutStatus::AwaitingPayment,
            CheckoutStatus::Settled,
            CheckoutStatus::Abandoned,
        ] {
            assert!(!CheckoutStatus::Settled.can_transition_to(next));
            assert!(!CheckoutStatus::Abandoned.can_transition_to(next));
        }
    }

    #[test]
    fn test_cannot_settle_without_payment_session() {
        let err = CheckoutStatus::Pending
            .transition(CheckoutStatus::Settled)
            .unwrap_err();
        assert_eq!(err.to_string(), "checkout cannot move from pending to settled");
    }

    #[test]
    fn test_status_round_trips_through_text() {
        for status in [
            CheckoutStatus::Pending,
            CheckoutStatus::AwaitingPayment,
            CheckoutStatus::Settled,
            CheckoutStatus::Abandoned,
        ] {
            assert_eq!(status.to_string().parse::<CheckoutStatus>().unwrap(), status);
        }
        assert!("paid".parse::<CheckoutStatus>().is_err());
    }

    #[test]
    fn test_settlement_decrements_stock() {
        let stock = BTreeMap::from([(ProductId::new(1), 10)]);
        let plan = plan_settlement(&[settle_line(1, 1, 3)], &stock).unwrap();
        assert_eq!(
            plan,
            vec![StockDecrement {
                product_id: ProductId::new(1),
                quantity: 3,
                remaining: 7,
            }]
        );
    }

    #[test]
    fn test_settlement_combines_lines_per_product_in_id_order() {
        let stock = BTreeMap::from([(ProductId::new(2), 5), (ProductId::new(9), 4)]);
        let lines = [settle_line(1, 9, 1), settle_line(2, 2, 2), settle_line(3, 9, 3)];
        let plan = plan_settlement(&lines, &stock).unwrap();
        assert_eq!(plan.len(), 2);
        assert_eq!(plan.first().unwrap().product_id, ProductId::new(2));
        assert_eq!(plan.last().unwrap().remaining, 0);
    }

    #[test]
    fn test_settlement_refuses_oversold_product() {
        let stock = BTreeMap::from([(ProductId::new(1), 2), (ProductId::new(2), 10)]);
        let lines = [settle_line(1, 2, 1), settle_line(2, 1, 3)];
        assert_eq!(
            plan_settlement(&lines, &stock),
            Err(SettlementError::InsufficientStock {
                product_id: ProductId::new(1),
                requested: 3,
                available: 2,
            })
        );
    }

    #[test]
    fn test_settlement_refuses_missing_product() {
        let err = plan_settlement(&[settle_line(1, 4, 1)], &BTreeMap::new()).unwrap_err();
        assert_eq!(err, SettlementError::UnknownProduct(ProductId::new(4)));
    }
}
