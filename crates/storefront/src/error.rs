//! Unified error handling with Sentry integration.
//!
//! Route handlers return `Result<T, AppError>`. Validation failures that the
//! shopper can fix are normally turned into flash messages by the handler;
//! whatever reaches `AppError` becomes a plain status page, and server-side
//! failures are captured to Sentry first.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

use crate::db::RepositoryError;
use crate::payments::PaymentError;
use crate::services::auth::AuthError;
use crate::services::cart::CartError;
use crate::services::checkout::CheckoutError;

/// Application-level error type for the storefront.
#[derive(Debug, Error)]
pub enum AppError {
    /// Database operation failed.
    #[error("Database error: {0}")]
    Database(#[from] RepositoryError),

    /// Authentication operation failed.
    #[error("Auth error: {0}")]
    Auth(#[from] AuthError),

    /// Cart operation failed.
    #[error("Cart error: {0}")]
    Cart(#[from] CartError),

    /// Checkout operation failed.
    #[error("Checkout error: {0}")]
    Checkout(#[from] CheckoutError),

    /// Payment provider call or webhook failed.
    #[error("Payment error: {0}")]
    Payment(#[from] PaymentError),

    /// Session store failed.
    #[error("Session error: {0}")]
    Session(#[from] tower_sessions::session::Error),

    /// Template rendering failed.
    #[error("Template error: {0}")]
    Template(#[from] askama::Error),

    /// Resource not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Bad request from client.
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Internal server error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// HTTP status for this error.
    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Database(RepositoryError::NotFound) | Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Database(_) | Self::Session(_) | Self::Template(_) | Self::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Auth(err) => match err {
                AuthError::InvalidCredentials => StatusCode::UNAUTHORIZED,
                AuthError::UserAlreadyExists => StatusCode::CONFLICT,
                AuthError::InvalidEmail(_)
                | AuthError::InvalidName(_)
                | AuthError::WeakPassword(_) => StatusCode::BAD_REQUEST,
                AuthError::PasswordHash | AuthError::Repository(_) => {
                    StatusCode::INTERNAL_SERVER_ERROR
                }
            },
            Self::Cart(err) => match err {
                CartError::NotFound => StatusCode::NOT_FOUND,
                CartError::OutOfStock { .. } | CartError::InsufficientStock { .. } => {
                    StatusCode::CONFLICT
                }
                CartError::InvalidQuantity(_) => StatusCode::BAD_REQUEST,
                CartError::Repository(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            Self::Checkout(err) => match err {
                CheckoutError::EmptyCart => StatusCode::BAD_REQUEST,
                CheckoutError::NotFound => StatusCode::NOT_FOUND,
                CheckoutError::NotPaid => StatusCode::PAYMENT_REQUIRED,
                CheckoutError::InvalidTransition(_) | CheckoutError::InsufficientStock { .. } => {
                    StatusCode::CONFLICT
                }
                CheckoutError::Provider(e) => payment_status(e),
                CheckoutError::Repository(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            Self::Payment(err) => payment_status(err),
        }
    }

    /// Message safe to show the client.
    #[must_use]
    pub fn public_message(&self) -> String {
        match self.status() {
            StatusCode::INTERNAL_SERVER_ERROR => "Internal server error".to_string(),
            StatusCode::BAD_GATEWAY => "Payment service unavailable, please try again".to_string(),
            _ => match self {
                Self::Auth(err) => err.to_string(),
                Self::Cart(err) => err.to_string(),
                Self::Checkout(err) => err.to_string(),
                Self::Payment(_) => "Invalid payment notification".to_string(),
                Self::Database(_) => "Not found".to_string(),
                other => other.to_string(),
            },
        }
    }
}

const fn payment_status(err: &PaymentError) -> StatusCode {
    match err {
        PaymentError::InvalidSignature(_) | PaymentError::InvalidPayload(_) => {
            StatusCode::BAD_REQUEST
        }
        PaymentError::Request(_)
        | PaymentError::Response(_)
        | PaymentError::Api { .. }
        | PaymentError::PriceNotFound(_) => StatusCode::BAD_GATEWAY,
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();

        if status.is_server_error() {
            let event_id = sentry::capture_error(&self);
            tracing::error!(
                error = %self,
                sentry_event_id = %event_id,
                "Request error"
            );
        } else {
            tracing::debug!(error = %self, status = %status, "Request rejected");
        }

        (status, self.public_message()).into_response()
    }
}

/// Result type alias for `AppError`.
pub type Result<T> = std::result::Result<T, AppError>;

/// Set the Sentry user context.
///
/// Call this after login so errors are associated with the user.
pub fn set_sentry_user(user_id: &impl ToString, email: Option<&str>) {
    sentry::configure_scope(|scope| {
        scope.set_user(Some(sentry::User {
            id: Some(user_id.to_string()),
            email: email.map(String::from),
            ..Default::default()
        }));
    });
}

/// Clear the Sentry user context on logout.
pub fn clear_sentry_user() {
    sentry::configure_scope(|scope| {
        scope.set_user(None);
    });
}

/// Add a breadcrumb for a shopper action.
///
/// # Example
///
/// ```rust,ignore
/// add_breadcrumb("cart", "Added product", Some(&[("product_id", "123")]));
/// ```
pub fn add_breadcrumb(category: &str, message: &str, data: Option<&[(&str, &str)]>) {
    let mut breadcrumb = sentry::Breadcrumb {
        category: Some(category.to_string()),
        message: Some(message.to_string()),
        level: sentry::Level::Info,
        ..Default::default()
    };

    if let Some(pairs) = data {
        for (key, value) in pairs {
            breadcrumb.data.insert(
                (*key).to_string(),
                serde_json::Value::String((*value).to_string()),
            );
        }
    }

    sentry::add_breadcrumb(breadcrumb);
}

#[cfg(test)]
mod tests {
    use tradepost_core::{CheckoutStatus, TransitionError};

    use super::*;

    fn get_status(err: AppError) -> StatusCode {
        err.into_response().status()
    }

    #[test]
    fn test_app_error_display() {
        let err = AppError::NotFound("product 123".to_string());
        assert_eq!(err.to_string(), "Not found: product 123");
    }

    #[test]
    fn test_auth_status_codes() {
        assert_eq!(
            get_status(AuthError::InvalidCredentials.into()),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            get_status(AuthError::UserAlreadyExists.into()),
            StatusCode::CONFLICT
        );
        assert_eq!(
            get_status(AuthError::WeakPassword("short".into()).into()),
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn test_cart_status_codes() {
        assert_eq!(get_status(CartError::NotFound.into()), StatusCode::NOT_FOUND);
        assert_eq!(
            get_status(
                CartError::InsufficientStock {
                    name: "Mug".into(),
                    available: 2
                }
                .into()
            ),
            StatusCode::CONFLICT
        );
    }

    #[test]
    fn test_checkout_status_codes() {
        assert_eq!(
            get_status(CheckoutError::EmptyCart.into()),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            get_status(
                CheckoutError::InvalidTransition(TransitionError {
                    from: CheckoutStatus::Abandoned,
                    to: CheckoutStatus::Settled,
                })
                .into()
            ),
            StatusCode::CONFLICT
        );
        assert_eq!(
            get_status(CheckoutError::Provider(PaymentError::PriceNotFound("Mug".into())).into()),
            StatusCode::BAD_GATEWAY
        );
    }

    #[test]
    fn test_bad_signature_is_client_error() {
        assert_eq!(
            get_status(PaymentError::InvalidSignature("signature mismatch".into()).into()),
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn test_internal_details_hidden() {
        let err = AppError::Internal("connection refused at 10.0.0.5".to_string());
        assert_eq!(err.public_message(), "Internal server error");

        let err = AppError::from(CartError::InsufficientStock {
            name: "Mug".into(),
            available: 1,
        });
        assert_eq!(
            err.public_message(),
            "We don't have enough quantity of 'Mug': 1 is available"
        );
    }
}
