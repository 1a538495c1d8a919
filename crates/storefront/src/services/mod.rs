//! Business logic services for the storefront.
//!
//! # Services
//!
//! - `auth` - Registration and password login
//! - `catalog` - Product browsing and title search
//! - `cart` - Stock-checked cart mutations
//! - `checkout` - Hosted checkout and settlement
//!
//! Services borrow the pool for the duration of a request and take the
//! acting user explicitly.

pub mod auth;
pub mod cart;
pub mod catalog;
pub mod checkout;
