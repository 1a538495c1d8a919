//! Checkout route handlers.
//!
//! Payment happens on the provider's hosted page. The success redirect is
//! only a hint: the session is confirmed with the provider before anything
//! is settled.

use askama::Template;
use askama_web::WebTemplate;
use axum::{
    extract::{Query, State},
    response::{IntoResponse, Redirect, Response},
};
use serde::Deserialize;
use tower_sessions::Session;
use tracing::instrument;

use super::PageContext;
use crate::db::CheckoutRepository;
use crate::error::{AppError, Result};
use crate::middleware::{RequireAuth, push_flash};
use crate::models::Checkout;
use crate::models::session::Flash;
use crate::services::checkout::{CheckoutError, CheckoutService, SettleOutcome};
use crate::state::AppState;

const CART_PAGE: &str = "/cart";

/// Query parameters the provider appends to the return URLs.
#[derive(Debug, Deserialize)]
pub struct ReturnQuery {
    pub session_id: Option<String>,
}

impl ReturnQuery {
    fn session_id(&self) -> Result<&str> {
        self.session_id
            .as_deref()
            .filter(|id| !id.is_empty())
            .ok_or_else(|| AppError::BadRequest("missing session_id".to_string()))
    }
}

/// Payment confirmed page template.
#[derive(Template, WebTemplate)]
#[template(path = "checkout/success.html")]
pub struct CheckoutSuccessTemplate {
    pub page: PageContext,
    pub checkout: Checkout,
}

/// Checkout cancelled page template.
#[derive(Template, WebTemplate)]
#[template(path = "checkout/cancelled.html")]
pub struct CheckoutCancelledTemplate {
    pub page: PageContext,
}

/// Open a hosted checkout for the cart and send the shopper to it (303).
#[instrument(skip_all, fields(user_id = %user.id))]
pub async fn begin(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    session: Session,
) -> Result<Response> {
    let service = CheckoutService::new(state.pool(), state.payments(), &state.config().base_url);

    match service.begin_checkout(user.id, &user.email).await {
        Ok(url) => Ok(Redirect::to(&url).into_response()),
        Err(CheckoutError::EmptyCart) => {
            push_flash(&session, Flash::error("Your cart is empty")).await;
            Ok(Redirect::to(CART_PAGE).into_response())
        }
        Err(e) => Err(e.into()),
    }
}

/// Provider success redirect: confirm payment, then settle.
#[instrument(skip_all, fields(user_id = %user.id))]
pub async fn success(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    session: Session,
    Query(query): Query<ReturnQuery>,
) -> Result<Response> {
    let session_id = query.session_id()?;
    let service = CheckoutService::new(state.pool(), state.payments(), &state.config().base_url);

    let checkout_id = match service.confirm_session(user.id, session_id).await {
        Ok(SettleOutcome::Settled(id) | SettleOutcome::AlreadySettled(id)) => id,
        Err(e @ (CheckoutError::NotPaid | CheckoutError::InsufficientStock { .. })) => {
            tracing::warn!(error = %e, "Checkout not settled");
            push_flash(&session, Flash::error(e.to_string())).await;
            return Ok(Redirect::to(CART_PAGE).into_response());
        }
        Err(e) => return Err(e.into()),
    };

    let checkout = CheckoutRepository::new(state.pool())
        .get(checkout_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("checkout {checkout_id}")))?;

    Ok(CheckoutSuccessTemplate {
        page: PageContext::load(&session).await,
        checkout,
    }
    .into_response())
}

/// Provider cancel redirect. The cart is left as it was.
#[instrument(skip_all, fields(user_id = %user.id))]
pub async fn cancel(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    page: PageContext,
    Query(query): Query<ReturnQuery>,
) -> Result<impl IntoResponse> {
    let session_id = query.session_id()?;
    CheckoutService::new(state.pool(), state.payments(), &state.config().base_url)
        .abandon(user.id, session_id)
        .await?;

    Ok(CheckoutCancelledTemplate { page })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_session_id_is_bad_request() {
        let query = ReturnQuery { session_id: None };
        assert!(matches!(query.session_id(), Err(AppError::BadRequest(_))));

        let query = ReturnQuery {
            session_id: Some(String::new()),
        };
        assert!(query.session_id().is_err());

        let query = ReturnQuery {
            session_id: Some("cs_test_a1".to_string()),
        };
        assert!(matches!(query.session_id(), Ok("cs_test_a1")));
    }
}
