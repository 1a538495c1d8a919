//! Domain models for the storefront.
//!
//! These are validated domain objects; database row types stay private to
//! the repositories in [`crate::db`].

pub mod checkout;
pub mod product;
pub mod session;
pub mod user;

pub use checkout::{Checkout, CheckoutLine};
pub use product::Product;
pub use session::CurrentUser;
pub use user::User;
