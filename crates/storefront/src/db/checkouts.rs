//! Checkout repository.
//!
//! Status changes are compare-and-set on the current status, so two callers
//! racing on the same checkout cannot both move it.

use chrono::{DateTime, Utc};
use sqlx::{PgConnection, PgPool};

use tradepost_core::{
    CartId, CheckoutId, CheckoutStatus, GoodsId, LineItem, Money, ProductId, Quantity, UserId,
};

use super::RepositoryError;
use super::carts::price_column;
use crate::models::{Checkout, CheckoutLine};

#[derive(sqlx::FromRow)]
struct CheckoutRow {
    id: i32,
    user_id: i32,
    cart_id: i32,
    status: CheckoutStatus,
    provider_session_id: Option<String>,
    redirect_url: Option<String>,
    amount_total: i64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    settled_at: Option<DateTime<Utc>>,
}

impl From<CheckoutRow> for Checkout {
    fn from(row: CheckoutRow) -> Self {
        Self {
            id: CheckoutId::new(row.id),
            user_id: UserId::new(row.user_id),
            cart_id: CartId::new(row.cart_id),
            status: row.status,
            provider_session_id: row.provider_session_id,
            redirect_url: row.redirect_url,
            amount_total: Money::from_minor(row.amount_total),
            created_at: row.created_at,
            updated_at: row.updated_at,
            settled_at: row.settled_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct LineRow {
    goods_id: i32,
    product_id: i32,
    name: String,
    quantity: i32,
    price: i32,
}

impl TryFrom<LineRow> for CheckoutLine {
    type Error = RepositoryError;

    fn try_from(row: LineRow) -> Result<Self, Self::Error> {
        let quantity = Quantity::try_from(row.quantity).map_err(|_| {
            RepositoryError::DataCorruption(format!(
                "checkout line for goods {} has quantity {}",
                row.goods_id, row.quantity
            ))
        })?;
        Ok(Self {
            goods_id: GoodsId::new(row.goods_id),
            product_id: ProductId::new(row.product_id),
            name: row.name,
            quantity,
            unit_price: Money::from(row.price),
        })
    }
}

const SELECT_CHECKOUT: &str = r"
    SELECT id, user_id, cart_id, status, provider_session_id, redirect_url,
           amount_total, created_at, updated_at, settled_at
    FROM storefront.checkout
";

/// Repository for checkout attempts and processed webhook events.
pub struct CheckoutRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> CheckoutRepository<'a> {
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Record a pending checkout and the lines it covers.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if any insert fails; nothing is written.
    pub async fn create_pending(
        &self,
        user_id: UserId,
        cart_id: CartId,
        lines: &[LineItem],
        amount_total: Money,
    ) -> Result<CheckoutId, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let id: i32 = sqlx::query_scalar(
            r"
            INSERT INTO storefront.checkout (user_id, cart_id, amount_total)
            VALUES ($1, $2, $3)
            RETURNING id
            ",
        )
        .bind(user_id)
        .bind(cart_id)
        .bind(amount_total.minor())
        .fetch_one(&mut *tx)
        .await?;

        for line in lines {
            sqlx::query(
                r"
                INSERT INTO storefront.checkout_line
                    (checkout_id, goods_id, product_id, name, quantity, price)
                VALUES ($1, $2, $3, $4, $5, $6)
                ",
            )
            .bind(id)
            .bind(line.goods_id)
            .bind(line.product_id)
            .bind(&line.name)
            .bind(line.quantity.as_i32())
            .bind(price_column(line.unit_price)?)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(CheckoutId::new(id))
    }

    /// Get a checkout by ID.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get(&self, id: CheckoutId) -> Result<Option<Checkout>, RepositoryError> {
        let row: Option<CheckoutRow> = sqlx::query_as(&format!("{SELECT_CHECKOUT} WHERE id = $1"))
            .bind(id)
            .fetch_optional(self.pool)
            .await?;
        Ok(row.map(Checkout::from))
    }

    /// Get a checkout by its provider session id.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get_by_session(
        &self,
        session_id: &str,
    ) -> Result<Option<Checkout>, RepositoryError> {
        let row: Option<CheckoutRow> =
            sqlx::query_as(&format!("{SELECT_CHECKOUT} WHERE provider_session_id = $1"))
                .bind(session_id)
                .fetch_optional(self.pool)
                .await?;
        Ok(row.map(Checkout::from))
    }

    /// Attach the provider session and move `pending -> awaiting_payment`.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Conflict` if the checkout is no longer pending.
    pub async fn attach_session(
        &self,
        id: CheckoutId,
        session_id: &str,
        redirect_url: &str,
    ) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            r"
            UPDATE storefront.checkout
            SET status = $4, provider_session_id = $2, redirect_url = $3, updated_at = NOW()
            WHERE id = $1 AND status = $5
            ",
        )
        .bind(id)
        .bind(session_id)
        .bind(redirect_url)
        .bind(CheckoutStatus::AwaitingPayment)
        .bind(CheckoutStatus::Pending)
        .execute(self.pool)
        .await
        .map_err(|e| RepositoryError::from_unique(e, "provider session"))?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::Conflict(format!(
                "checkout {id} is no longer pending"
            )));
        }
        Ok(())
    }

    /// Move a checkout from `from` to `to` outside a settlement transaction.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Conflict` if the status was no longer `from`.
    pub async fn set_status(
        &self,
        id: CheckoutId,
        from: CheckoutStatus,
        to: CheckoutStatus,
    ) -> Result<(), RepositoryError> {
        let mut conn = self.pool.acquire().await?;
        Self::transition(&mut conn, id, from, to).await
    }

    /// Lock a checkout by provider session id.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn lock_by_session(
        conn: &mut PgConnection,
        session_id: &str,
    ) -> Result<Option<Checkout>, RepositoryError> {
        let row: Option<CheckoutRow> = sqlx::query_as(&format!(
            "{SELECT_CHECKOUT} WHERE provider_session_id = $1 FOR UPDATE"
        ))
        .bind(session_id)
        .fetch_optional(conn)
        .await?;
        Ok(row.map(Checkout::from))
    }

    /// The line snapshot of a checkout.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::DataCorruption` if a stored quantity is not positive.
    pub async fn lines(
        conn: &mut PgConnection,
        id: CheckoutId,
    ) -> Result<Vec<CheckoutLine>, RepositoryError> {
        let rows: Vec<LineRow> = sqlx::query_as(
            r"
            SELECT goods_id, product_id, name, quantity, price
            FROM storefront.checkout_line
            WHERE checkout_id = $1
            ORDER BY id
            ",
        )
        .bind(id)
        .fetch_all(conn)
        .await?;
        rows.into_iter().map(CheckoutLine::try_from).collect()
    }

    /// Compare-and-set the status. Stamps `settled_at` when moving to settled.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Conflict` if the status was no longer `from`.
    pub async fn transition(
        conn: &mut PgConnection,
        id: CheckoutId,
        from: CheckoutStatus,
        to: CheckoutStatus,
    ) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            r"
            UPDATE storefront.checkout
            SET status = $3,
                updated_at = NOW(),
                settled_at = CASE WHEN $3 = 'settled'::storefront.checkout_status
                                  THEN NOW() ELSE settled_at END
            WHERE id = $1 AND status = $2
            ",
        )
        .bind(id)
        .bind(from)
        .bind(to)
        .execute(conn)
        .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::Conflict(format!(
                "checkout {id} is no longer {from}"
            )));
        }
        Ok(())
    }

    /// Record a webhook event id. Returns `false` if it was already recorded.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the insert fails.
    pub async fn record_event(
        conn: &mut PgConnection,
        event_id: &str,
        event_type: &str,
    ) -> Result<bool, RepositoryError> {
        let result = sqlx::query(
            r"
            INSERT INTO storefront.processed_event (event_id, event_type)
            VALUES ($1, $2)
            ON CONFLICT (event_id) DO NOTHING
            ",
        )
        .bind(event_id)
        .bind(event_type)
        .execute(conn)
        .await?;
        Ok(result.rows_affected() == 1)
    }
}
