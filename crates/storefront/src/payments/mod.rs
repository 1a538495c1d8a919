//! Hosted checkout payment provider.
//!
//! # Architecture
//!
//! - Stripe-compatible REST API over `reqwest` (form-encoded requests, JSON responses)
//! - Provider prices are looked up by product name and cached via `moka` (5 minute TTL)
//! - The provider is never trusted on its word: sessions are re-fetched before
//!   settlement and webhooks must carry a valid signature
//!
//! [`PaymentGateway`] is the seam the checkout service talks to, so the
//! orchestration can be exercised without the network.

mod client;
pub mod types;
pub mod webhook;

use std::future::Future;

use thiserror::Error;

pub use client::PaymentsClient;
pub use types::{CheckoutSession, LineItemRequest, SessionRequest, WebhookEvent};

/// Errors that can occur when talking to the payment provider.
#[derive(Debug, Error)]
pub enum PaymentError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Request(#[from] reqwest::Error),

    /// The provider answered with something we could not parse.
    #[error("unexpected provider response: {0}")]
    Response(String),

    /// The provider rejected the request.
    #[error("provider error ({status}): {message}")]
    Api { status: u16, message: String },

    /// No active product with a default price matches the name.
    #[error("no active price for product '{0}'")]
    PriceNotFound(String),

    /// Webhook signature missing, stale or wrong.
    #[error("invalid webhook signature: {0}")]
    InvalidSignature(String),

    /// Webhook body is not a valid event.
    #[error("invalid webhook payload: {0}")]
    InvalidPayload(#[from] serde_json::Error),
}

/// Operations the checkout flow needs from the provider.
pub trait PaymentGateway: Send + Sync {
    /// The provider price id for a product, looked up by exact name.
    fn price_for(&self, product_name: &str)
    -> impl Future<Output = Result<String, PaymentError>> + Send;

    /// Create a hosted checkout session.
    fn create_session(
        &self,
        request: &SessionRequest,
    ) -> impl Future<Output = Result<CheckoutSession, PaymentError>> + Send;

    /// Fetch a session's current state.
    fn retrieve_session(
        &self,
        session_id: &str,
    ) -> impl Future<Output = Result<CheckoutSession, PaymentError>> + Send;
}
