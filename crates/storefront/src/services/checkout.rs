//! Checkout orchestration.
//!
//! ```text
//! begin_checkout ──> provider session ──> success redirect ─┐
//!                                    └──> signed webhook ───┴──> settle
//! ```
//!
//! A checkout snapshots the cart lines it sent to the provider. Settlement
//! works from that snapshot in one transaction: lock the checkout, the cart
//! and then every product in id order, decrement stock, take the paid units
//! off their cart lines and mark the checkout settled. A checkout settles at most once no
//! matter how many confirmations arrive.

use secrecy::SecretString;
use sqlx::{PgConnection, PgPool};
use thiserror::Error;
use tracing::instrument;

use tradepost_core::{
    CartLines, CheckoutId, CheckoutStatus, Email, ProductId, SettlementError, SettlementLine,
    TransitionError, UserId, plan_settlement,
};

use crate::db::{CartRepository, CheckoutRepository, ProductRepository, RepositoryError};
use crate::models::{Checkout, CheckoutLine};
use crate::payments::types::EventKind;
use crate::payments::{
    CheckoutSession, LineItemRequest, PaymentError, PaymentGateway, SessionRequest, webhook,
};

/// Placeholder the provider replaces with the session id in redirect URLs.
const SESSION_ID_TEMPLATE: &str = "{CHECKOUT_SESSION_ID}";

/// Errors from checkout operations.
#[derive(Debug, Error)]
pub enum CheckoutError {
    /// Nothing to pay for.
    #[error("your cart is empty")]
    EmptyCart,

    /// Unknown checkout, or one that belongs to someone else.
    #[error("checkout not found")]
    NotFound,

    /// The provider does not report the session as paid.
    #[error("payment has not been completed")]
    NotPaid,

    /// The checkout is in a state that does not allow this step.
    #[error(transparent)]
    InvalidTransition(#[from] TransitionError),

    /// Stock ran out between checkout and settlement.
    #[error("We don't have enough quantity of '{name}': {available} is available")]
    InsufficientStock { name: String, available: u32 },

    /// Payment provider failure.
    #[error("payment provider error: {0}")]
    Provider(#[from] PaymentError),

    /// Repository/database error.
    #[error("database error: {0}")]
    Repository(RepositoryError),
}

impl From<RepositoryError> for CheckoutError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::NotFound => Self::NotFound,
            other => Self::Repository(other),
        }
    }
}

impl From<sqlx::Error> for CheckoutError {
    fn from(err: sqlx::Error) -> Self {
        Self::Repository(RepositoryError::Database(err))
    }
}

/// Result of a settlement attempt that did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettleOutcome {
    /// Stock was decremented and the cart cleared by this call.
    Settled(CheckoutId),
    /// An earlier confirmation already settled the checkout.
    AlreadySettled(CheckoutId),
}

/// What a webhook delivery did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventOutcome {
    /// The event id was seen before.
    Duplicate,
    Settled(SettleOutcome),
    Abandoned,
    /// Not an event the storefront acts on, or an unpaid completion.
    Ignored,
}

/// Checkout orchestration for one request.
pub struct CheckoutService<'a, G> {
    pool: &'a PgPool,
    gateway: &'a G,
    base_url: &'a str,
}

impl<'a, G: PaymentGateway> CheckoutService<'a, G> {
    #[must_use]
    pub const fn new(pool: &'a PgPool, gateway: &'a G, base_url: &'a str) -> Self {
        Self {
            pool,
            gateway,
            base_url,
        }
    }

    /// Start a hosted checkout for the user's cart and return the payment page URL.
    ///
    /// The cart is not modified. If the provider fails, the checkout is
    /// recorded as abandoned.
    ///
    /// # Errors
    ///
    /// Returns `CheckoutError::EmptyCart` if the cart has no lines.
    /// Returns `CheckoutError::Provider` if a price lookup or the session creation fails.
    #[instrument(skip_all, fields(user_id = %user_id, checkout_id = tracing::field::Empty))]
    pub async fn begin_checkout(
        &self,
        user_id: UserId,
        email: &Email,
    ) -> Result<String, CheckoutError> {
        let carts = CartRepository::new(self.pool);
        let cart_id = carts.cart_for(user_id).await?;
        let lines = carts.lines(cart_id).await?;
        if lines.is_empty() {
            return Err(CheckoutError::EmptyCart);
        }

        let checkouts = CheckoutRepository::new(self.pool);
        let checkout_id = checkouts
            .create_pending(user_id, cart_id, lines.lines(), lines.total())
            .await?;
        tracing::Span::current().record("checkout_id", tracing::field::display(checkout_id));

        match self.open_session(checkout_id, &lines, email).await {
            Ok((session_id, url)) => {
                checkouts.attach_session(checkout_id, &session_id, &url).await?;
                tracing::info!(%checkout_id, %session_id, "Checkout session opened");
                Ok(url)
            }
            Err(e) => {
                tracing::warn!(%checkout_id, error = %e, "Checkout session failed");
                if let Err(mark) = checkouts
                    .set_status(checkout_id, CheckoutStatus::Pending, CheckoutStatus::Abandoned)
                    .await
                {
                    tracing::error!(%checkout_id, error = %mark, "Failed to abandon checkout");
                }
                Err(e)
            }
        }
    }

    async fn open_session(
        &self,
        checkout_id: CheckoutId,
        lines: &CartLines,
        email: &Email,
    ) -> Result<(String, String), CheckoutError> {
        let request =
            build_session_request(self.gateway, self.base_url, checkout_id, lines, email).await?;
        let session = self.gateway.create_session(&request).await?;
        let url = session.url.ok_or_else(|| {
            PaymentError::Response(format!("session {} has no payment url", session.id))
        })?;
        Ok((session.id, url))
    }

    /// Handle the success redirect: confirm payment with the provider, then settle.
    ///
    /// # Errors
    ///
    /// Returns `CheckoutError::NotFound` if the session is not the user's.
    /// Returns `CheckoutError::NotPaid` if the provider does not report payment.
    /// Returns `CheckoutError::InsufficientStock` if stock ran out; nothing changes.
    #[instrument(skip(self, user_id), fields(user_id = %user_id))]
    pub async fn confirm_session(
        &self,
        user_id: UserId,
        session_id: &str,
    ) -> Result<SettleOutcome, CheckoutError> {
        let checkout = CheckoutRepository::new(self.pool)
            .get_by_session(session_id)
            .await?
            .filter(|c| c.user_id == user_id)
            .ok_or(CheckoutError::NotFound)?;

        if checkout.status == CheckoutStatus::Settled {
            return Ok(SettleOutcome::AlreadySettled(checkout.id));
        }

        let session = self.gateway.retrieve_session(session_id).await?;
        if !confirms_payment(&session, checkout.id) {
            return Err(CheckoutError::NotPaid);
        }

        self.settle(session_id).await
    }

    /// Handle the cancel redirect. The cart is left as it was.
    ///
    /// # Errors
    ///
    /// Returns `CheckoutError::NotFound` if the session is not the user's.
    /// Returns `CheckoutError::InvalidTransition` if the checkout already settled.
    #[instrument(skip(self, user_id), fields(user_id = %user_id))]
    pub async fn abandon(&self, user_id: UserId, session_id: &str) -> Result<(), CheckoutError> {
        let checkouts = CheckoutRepository::new(self.pool);
        let checkout = checkouts
            .get_by_session(session_id)
            .await?
            .filter(|c| c.user_id == user_id)
            .ok_or(CheckoutError::NotFound)?;

        if checkout.status == CheckoutStatus::Abandoned {
            return Ok(());
        }
        checkout.status.transition(CheckoutStatus::Abandoned)?;
        checkouts
            .set_status(checkout.id, checkout.status, CheckoutStatus::Abandoned)
            .await?;
        tracing::info!(checkout_id = %checkout.id, "Checkout abandoned");
        Ok(())
    }

    /// Settle a paid checkout by provider session id.
    ///
    /// # Errors
    ///
    /// Returns `CheckoutError::InsufficientStock` if any product is short;
    /// the whole settlement is rolled back.
    pub async fn settle(&self, session_id: &str) -> Result<SettleOutcome, CheckoutError> {
        let mut tx = self.pool.begin().await?;
        let outcome = settle_in(&mut tx, session_id).await?;
        tx.commit().await?;
        Ok(outcome)
    }

    /// Verify and apply a webhook delivery.
    ///
    /// The event id is recorded in the same transaction as its effect, so a
    /// redelivered event is a no-op and a failed one can be retried.
    ///
    /// # Errors
    ///
    /// Returns `CheckoutError::Provider` for bad signatures or payloads.
    #[instrument(skip_all)]
    pub async fn handle_event(
        &self,
        body: &str,
        signature: &str,
        secret: &SecretString,
    ) -> Result<EventOutcome, CheckoutError> {
        let event = webhook::parse_event(body, signature, secret, webhook::unix_now()?)?;
        let kind = event.kind().map_err(PaymentError::from)?;
        tracing::info!(event_id = %event.id, event_type = %event.event_type, "Webhook received");

        let mut tx = self.pool.begin().await?;
        if !CheckoutRepository::record_event(&mut tx, &event.id, &event.event_type).await? {
            return Ok(EventOutcome::Duplicate);
        }

        // Events for sessions without a usable checkout are recorded and ignored.
        let outcome = match kind {
            EventKind::SessionCompleted(session) if session.is_paid() => {
                match CheckoutRepository::lock_by_session(&mut tx, &session.id).await? {
                    None => {
                        tracing::warn!(session_id = %session.id, "Paid session has no checkout");
                        EventOutcome::Ignored
                    }
                    Some(checkout) if checkout.status == CheckoutStatus::Abandoned => {
                        tracing::error!(
                            checkout_id = %checkout.id,
                            session_id = %session.id,
                            "Payment received for an abandoned checkout; refund or settle by hand"
                        );
                        EventOutcome::Ignored
                    }
                    Some(checkout) => EventOutcome::Settled(settle_locked(&mut tx, checkout).await?),
                }
            }
            EventKind::SessionExpired(session) => {
                match CheckoutRepository::lock_by_session(&mut tx, &session.id).await? {
                    None => {
                        tracing::warn!(session_id = %session.id, "Expired session has no checkout");
                        EventOutcome::Ignored
                    }
                    Some(checkout) => {
                        if abandon_locked(&mut tx, &checkout).await? {
                            EventOutcome::Abandoned
                        } else {
                            EventOutcome::Ignored
                        }
                    }
                }
            }
            EventKind::SessionCompleted(_) | EventKind::Other => EventOutcome::Ignored,
        };

        tx.commit().await?;
        Ok(outcome)
    }
}

/// Build the provider request for a cart, resolving each line's price.
///
/// # Errors
///
/// Returns the first price lookup failure.
pub(crate) async fn build_session_request<G: PaymentGateway>(
    gateway: &G,
    base_url: &str,
    checkout_id: CheckoutId,
    lines: &CartLines,
    email: &Email,
) -> Result<SessionRequest, PaymentError> {
    let mut line_items = Vec::with_capacity(lines.lines().len());
    for line in lines.lines() {
        line_items.push(LineItemRequest {
            price: gateway.price_for(&line.name).await?,
            quantity: line.quantity.get(),
        });
    }

    Ok(SessionRequest {
        success_url: format!("{base_url}/checkout/success?session_id={SESSION_ID_TEMPLATE}"),
        cancel_url: format!("{base_url}/checkout/cancel?session_id={SESSION_ID_TEMPLATE}"),
        client_reference_id: checkout_id.to_string(),
        customer_email: Some(email.as_str().to_owned()),
        line_items,
    })
}

/// Whether a provider session pays for this checkout.
fn confirms_payment(session: &CheckoutSession, checkout_id: CheckoutId) -> bool {
    session.is_paid()
        && session
            .client_reference_id
            .as_deref()
            .is_some_and(|r| r == checkout_id.to_string())
}

async fn settle_in(
    conn: &mut PgConnection,
    session_id: &str,
) -> Result<SettleOutcome, CheckoutError> {
    let checkout = CheckoutRepository::lock_by_session(conn, session_id)
        .await?
        .ok_or(CheckoutError::NotFound)?;
    settle_locked(conn, checkout).await
}

/// Settle a checkout whose row is already locked.
async fn settle_locked(
    conn: &mut PgConnection,
    checkout: Checkout,
) -> Result<SettleOutcome, CheckoutError> {
    if checkout.status == CheckoutStatus::Settled {
        tracing::debug!(checkout_id = %checkout.id, "Checkout already settled");
        return Ok(SettleOutcome::AlreadySettled(checkout.id));
    }
    checkout.status.transition(CheckoutStatus::Settled)?;

    CartRepository::lock(conn, checkout.cart_id).await?;
    let lines = CheckoutRepository::lines(conn, checkout.id).await?;
    let settlement: Vec<SettlementLine> = lines.iter().map(CheckoutLine::settlement_line).collect();

    let mut product_ids: Vec<ProductId> = lines.iter().map(|l| l.product_id).collect();
    product_ids.sort_unstable();
    product_ids.dedup();
    let stock = ProductRepository::lock_stock(conn, &product_ids).await?;

    let plan = plan_settlement(&settlement, &stock).map_err(|e| settlement_error(e, &lines))?;
    for decrement in &plan {
        ProductRepository::write_locked_stock(conn, decrement.product_id, decrement.remaining)
            .await?;
    }

    // Units added to a line after checkout began stay in the cart.
    let mut removed = 0_u64;
    for line in &lines {
        if CartRepository::take_units(conn, checkout.cart_id, line.goods_id, line.quantity).await? {
            removed += 1;
        }
    }
    CheckoutRepository::transition(conn, checkout.id, checkout.status, CheckoutStatus::Settled)
        .await?;

    tracing::info!(
        checkout_id = %checkout.id,
        products = plan.len(),
        lines_removed = removed,
        "Checkout settled"
    );
    Ok(SettleOutcome::Settled(checkout.id))
}

/// Abandon a locked, unpaid checkout. Returns `false` if it was already terminal.
async fn abandon_locked(conn: &mut PgConnection, checkout: &Checkout) -> Result<bool, CheckoutError> {
    if checkout.status.is_terminal() {
        return Ok(false);
    }
    CheckoutRepository::transition(conn, checkout.id, checkout.status, CheckoutStatus::Abandoned)
        .await?;
    Ok(true)
}

fn settlement_error(err: SettlementError, lines: &[CheckoutLine]) -> CheckoutError {
    match err {
        SettlementError::UnknownProduct(_) => CheckoutError::NotFound,
        SettlementError::InsufficientStock {
            product_id,
            available,
            ..
        } => CheckoutError::InsufficientStock {
            name: lines
                .iter()
                .find(|l| l.product_id == product_id)
                .map_or_else(|| product_id.to_string(), |l| l.name.clone()),
            available,
        },
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Mutex;

    use tradepost_core::{GoodsId, LineItem, Money, Quantity};

    use super::*;

    #[derive(Default)]
    struct FakeGateway {
        prices: HashMap<String, String>,
        lookups: Mutex<Vec<String>>,
    }

    impl PaymentGateway for FakeGateway {
        async fn price_for(&self, product_name: &str) -> Result<String, PaymentError> {
            self.lookups.lock().unwrap().push(product_name.to_owned());
            self.prices
                .get(product_name)
                .cloned()
                .ok_or_else(|| PaymentError::PriceNotFound(product_name.to_owned()))
        }

        async fn create_session(
            &self,
            request: &SessionRequest,
        ) -> Result<CheckoutSession, PaymentError> {
            Ok(CheckoutSession {
                id: "cs_test_1".to_owned(),
                url: Some("https://pay.test/cs_test_1".to_owned()),
                payment_status: "unpaid".to_owned(),
                status: Some("open".to_owned()),
                client_reference_id: Some(request.client_reference_id.clone()),
                amount_total: None,
            })
        }

        async fn retrieve_session(&self, session_id: &str) -> Result<CheckoutSession, PaymentError> {
            Err(PaymentError::Response(format!("unknown session {session_id}")))
        }
    }

    fn line(goods: i32, product: i32, name: &str, quantity: u32) -> LineItem {
        LineItem {
            goods_id: GoodsId::new(goods),
            product_id: ProductId::new(product),
            name: name.to_owned(),
            image: String::new(),
            unit_price: Money::from_minor(500),
            quantity: Quantity::new(quantity).unwrap(),
        }
    }

    fn gateway() -> FakeGateway {
        FakeGateway {
            prices: HashMap::from([
                ("Mug".to_owned(), "price_mug".to_owned()),
                ("Tote".to_owned(), "price_tote".to_owned()),
            ]),
            ..FakeGateway::default()
        }
    }

    #[tokio::test]
    async fn test_session_request_uses_provider_prices() {
        let gateway = gateway();
        let lines = CartLines::new(vec![line(1, 1, "Mug", 2), line(2, 2, "Tote", 1)]);
        let email = Email::parse("shopper@example.com").unwrap();

        let request = build_session_request(
            &gateway,
            "https://shop.test",
            CheckoutId::new(9),
            &lines,
            &email,
        )
        .await
        .unwrap();

        assert_eq!(
            request.line_items,
            vec![
                LineItemRequest {
                    price: "price_mug".to_owned(),
                    quantity: 2
                },
                LineItemRequest {
                    price: "price_tote".to_owned(),
                    quantity: 1
                },
            ]
        );
        assert_eq!(request.client_reference_id, "9");
        assert_eq!(
            request.success_url,
            "https://shop.test/checkout/success?session_id={CHECKOUT_SESSION_ID}"
        );
        assert_eq!(request.customer_email.as_deref(), Some("shopper@example.com"));
    }

    #[tokio::test]
    async fn test_missing_price_fails_whole_request() {
        let gateway = gateway();
        let lines = CartLines::new(vec![line(1, 1, "Lamp", 1), line(2, 2, "Mug", 1)]);
        let email = Email::parse("shopper@example.com").unwrap();

        let err = build_session_request(&gateway, "https://shop.test", CheckoutId::new(1), &lines, &email)
            .await
            .unwrap_err();

        assert!(matches!(err, PaymentError::PriceNotFound(name) if name == "Lamp"));
        assert_eq!(*gateway.lookups.lock().unwrap(), ["Lamp"]);
    }

    #[test]
    fn test_settlement_error_names_product() {
        let lines = [CheckoutLine {
            goods_id: GoodsId::new(4),
            product_id: ProductId::new(7),
            name: "Mug".to_owned(),
            quantity: Quantity::new(3).unwrap(),
            unit_price: Money::from_minor(500),
        }];
        let err = settlement_error(
            SettlementError::InsufficientStock {
                product_id: ProductId::new(7),
                requested: 3,
                available: 1,
            },
            &lines,
        );
        assert_eq!(
            err.to_string(),
            "We don't have enough quantity of 'Mug': 1 is available"
        );
    }

    #[test]
    fn test_payment_needs_matching_reference() {
        let paid = |reference: Option<&str>| CheckoutSession {
            id: "cs_test_9".to_owned(),
            url: None,
            payment_status: "paid".to_owned(),
            status: Some("complete".to_owned()),
            client_reference_id: reference.map(str::to_owned),
            amount_total: Some(1000),
        };
        let checkout = CheckoutId::new(9);

        assert!(confirms_payment(&paid(Some("9")), checkout));
        assert!(!confirms_payment(&paid(Some("10")), checkout));
        assert!(!confirms_payment(&paid(None), checkout));

        let unpaid = CheckoutSession {
            payment_status: "unpaid".to_owned(),
            ..paid(Some("9"))
        };
        assert!(!confirms_payment(&unpaid, checkout));
    }

    #[test]
    fn test_repository_not_found_maps_to_not_found() {
        assert!(matches!(
            CheckoutError::from(RepositoryError::NotFound),
            CheckoutError::NotFound
        ));
    }
}
