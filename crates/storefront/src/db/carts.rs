//! Cart repository.
//!
//! Cart mutations run on a transaction the service opens. The cart row is
//! locked first, then the product row, so concurrent requests for the same
//! cart or product queue up instead of racing past the stock check.

use sqlx::{PgConnection, PgPool};

use tradepost_core::{CartId, CartLines, GoodsId, LineItem, Money, NewLine, ProductId, Quantity, UserId};

use super::RepositoryError;

#[derive(sqlx::FromRow)]
struct GoodsRow {
    id: i32,
    product_id: i32,
    name: String,
    image: String,
    price: i32,
    quantity: i32,
}

impl TryFrom<GoodsRow> for LineItem {
    type Error = RepositoryError;

    fn try_from(row: GoodsRow) -> Result<Self, Self::Error> {
        let quantity = Quantity::try_from(row.quantity).map_err(|_| {
            RepositoryError::DataCorruption(format!(
                "goods {} has quantity {}",
                row.id, row.quantity
            ))
        })?;

        Ok(Self {
            goods_id: GoodsId::new(row.id),
            product_id: ProductId::new(row.product_id),
            name: row.name,
            image: row.image,
            unit_price: Money::from(row.price),
            quantity,
        })
    }
}

const SELECT_GOODS: &str = r"
    SELECT id, product_id, name, image, price, quantity
    FROM storefront.goods
    WHERE cart_id = $1
    ORDER BY created_at, id
";

/// Repository for cart and line item operations.
pub struct CartRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> CartRepository<'a> {
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// The cart owned by `user_id`.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the user has no cart.
    pub async fn cart_for(&self, user_id: UserId) -> Result<CartId, RepositoryError> {
        let id: Option<i32> =
            sqlx::query_scalar("SELECT id FROM storefront.cart WHERE user_id = $1")
                .bind(user_id)
                .fetch_optional(self.pool)
                .await?;
        id.map(CartId::new).ok_or(RepositoryError::NotFound)
    }

    /// All lines of a cart, oldest first.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn lines(&self, cart_id: CartId) -> Result<CartLines, RepositoryError> {
        let rows: Vec<GoodsRow> = sqlx::query_as(SELECT_GOODS)
            .bind(cart_id)
            .fetch_all(self.pool)
            .await?;
        to_lines(rows)
    }

    /// Lock the cart owned by `user_id` for the rest of the transaction.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the user has no cart.
    pub async fn lock_for_user(
        conn: &mut PgConnection,
        user_id: UserId,
    ) -> Result<CartId, RepositoryError> {
        let id: Option<i32> =
            sqlx::query_scalar("SELECT id FROM storefront.cart WHERE user_id = $1 FOR UPDATE")
                .bind(user_id)
                .fetch_optional(conn)
                .await?;
        id.map(CartId::new).ok_or(RepositoryError::NotFound)
    }

    /// Lock a cart by id.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the cart does not exist.
    pub async fn lock(conn: &mut PgConnection, cart_id: CartId) -> Result<(), RepositoryError> {
        let id: Option<i32> =
            sqlx::query_scalar("SELECT id FROM storefront.cart WHERE id = $1 FOR UPDATE")
                .bind(cart_id)
                .fetch_optional(conn)
                .await?;
        id.map(|_| ()).ok_or(RepositoryError::NotFound)
    }

    /// All lines of a cart, read inside a transaction.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn lines_in(
        conn: &mut PgConnection,
        cart_id: CartId,
    ) -> Result<CartLines, RepositoryError> {
        let rows: Vec<GoodsRow> = sqlx::query_as(SELECT_GOODS)
            .bind(cart_id)
            .fetch_all(conn)
            .await?;
        to_lines(rows)
    }

    /// Insert a new line item.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the insert fails.
    pub async fn insert_line(
        conn: &mut PgConnection,
        cart_id: CartId,
        line: &NewLine,
    ) -> Result<LineItem, RepositoryError> {
        let row: GoodsRow = sqlx::query_as(
            r"
            INSERT INTO storefront.goods (cart_id, product_id, quantity, name, image, price)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING id, product_id, name, image, price, quantity
            ",
        )
        .bind(cart_id)
        .bind(line.product_id)
        .bind(line.quantity.as_i32())
        .bind(&line.name)
        .bind(&line.image)
        .bind(price_column(line.unit_price)?)
        .fetch_one(conn)
        .await?;
        LineItem::try_from(row)
    }

    /// Write a line's quantity.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the line is not in the cart.
    pub async fn update_quantity(
        conn: &mut PgConnection,
        cart_id: CartId,
        goods_id: GoodsId,
        quantity: Quantity,
    ) -> Result<(), RepositoryError> {
        let result =
            sqlx::query("UPDATE storefront.goods SET quantity = $3 WHERE id = $2 AND cart_id = $1")
                .bind(cart_id)
                .bind(goods_id)
                .bind(quantity.as_i32())
                .execute(conn)
                .await?;
        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    /// Delete one line.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the line is not in the cart.
    pub async fn delete_line(
        conn: &mut PgConnection,
        cart_id: CartId,
        goods_id: GoodsId,
    ) -> Result<(), RepositoryError> {
        let result = sqlx::query("DELETE FROM storefront.goods WHERE id = $2 AND cart_id = $1")
            .bind(cart_id)
            .bind(goods_id)
            .execute(conn)
            .await?;
        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    /// Take settled units off a line, deleting it once none remain.
    ///
    /// Returns `true` if the line was deleted. A line already gone is ignored.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if a write fails.
    pub async fn take_units(
        conn: &mut PgConnection,
        cart_id: CartId,
        goods_id: GoodsId,
        quantity: Quantity,
    ) -> Result<bool, RepositoryError> {
        let deleted = sqlx::query(
            "DELETE FROM storefront.goods WHERE id = $2 AND cart_id = $1 AND quantity <= $3",
        )
        .bind(cart_id)
        .bind(goods_id)
        .bind(quantity.as_i32())
        .execute(&mut *conn)
        .await?;
        if deleted.rows_affected() > 0 {
            return Ok(true);
        }

        sqlx::query(
            "UPDATE storefront.goods SET quantity = quantity - $3 WHERE id = $2 AND cart_id = $1",
        )
        .bind(cart_id)
        .bind(goods_id)
        .bind(quantity.as_i32())
        .execute(conn)
        .await?;
        Ok(false)
    }
}

fn to_lines(rows: Vec<GoodsRow>) -> Result<CartLines, RepositoryError> {
    rows.into_iter()
        .map(LineItem::try_from)
        .collect::<Result<Vec<_>, _>>()
        .map(CartLines::new)
}

/// Unit prices are stored as `INTEGER` cents.
pub(crate) fn price_column(price: Money) -> Result<i32, RepositoryError> {
    i32::try_from(price.minor())
        .map_err(|_| RepositoryError::DataCorruption(format!("price {price} out of range")))
}
