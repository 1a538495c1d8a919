//! Tradepost Core - Shared domain types and cart rules.
//!
//! This crate provides the pieces of the storefront that do not need I/O:
//! - typed ids, validated emails, money and quantities
//! - the cart consistency rules (stock bounds, positivity, totals)
//! - the checkout state machine and settlement planning
//!
//! # Architecture
//!
//! The core crate contains only types and pure functions - no database access,
//! no HTTP clients. The storefront applies these rules inside its database
//! transactions, so the decision logic can be tested without a database.
//!
//! # Modules
//!
//! - [`types`] - Newtype wrappers for ids, emails, money and quantities
//! - [`cart`] - Line items and the stock/positivity rules
//! - [`checkout`] - Checkout status transitions and settlement plans

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod cart;
pub mod checkout;
pub mod types;

pub use cart::{CartLines, CartRuleError, LineChange, LineItem, NewLine, ProductSnapshot};
pub use checkout::{
    CheckoutStatus, SettlementError, SettlementLine, StockDecrement, TransitionError,
    plan_settlement,
};
pub use types::*;
