//! Payment provider webhook.

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use tracing::instrument;

use crate::error::{AppError, Result};
use crate::payments::PaymentError;
use crate::payments::webhook::SIGNATURE_HEADER;
use crate::services::checkout::{CheckoutService, EventOutcome};
use crate::state::AppState;

/// Receive a signed payment event.
///
/// Returns 404 when no webhook secret is configured, 400 for a bad
/// signature or payload, and 200 once the event is applied or known.
#[instrument(skip_all)]
pub async fn payments(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: String,
) -> Result<Response> {
    let Some(secret) = state.config().payments.webhook_secret.as_ref() else {
        return Ok(StatusCode::NOT_FOUND.into_response());
    };

    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| {
            AppError::Payment(PaymentError::InvalidSignature(format!(
                "missing {SIGNATURE_HEADER} header"
            )))
        })?;

    let outcome = CheckoutService::new(state.pool(), state.payments(), &state.config().base_url)
        .handle_event(&body, signature, secret)
        .await?;

    match outcome {
        EventOutcome::Duplicate => tracing::debug!("Webhook event already processed"),
        EventOutcome::Settled(settled) => tracing::info!(?settled, "Webhook settled checkout"),
        EventOutcome::Abandoned => tracing::info!("Webhook abandoned checkout"),
        EventOutcome::Ignored => tracing::debug!("Webhook event ignored"),
    }

    Ok(StatusCode::OK.into_response())
}
