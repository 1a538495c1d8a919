//! User domain types.

use chrono::{DateTime, Utc};

use tradepost_core::{CartId, Email, UserId};

/// A registered shopper.
#[derive(Debug, Clone)]
pub struct User {
    /// Unique user ID.
    pub id: UserId,
    /// Normalized email address.
    pub email: Email,
    /// Display name.
    pub name: String,
    /// The user's one cart, created with the account.
    pub cart_id: CartId,
    /// When the user registered.
    pub created_at: DateTime<Utc>,
}
