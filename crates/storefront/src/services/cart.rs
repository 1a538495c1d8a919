//! Cart operations.
//!
//! Every mutation runs in one transaction: lock the user's cart, lock the
//! product row when stock matters, read the cart's lines, let
//! [`CartLines`] decide, then write. Nothing is committed when a rule refuses.

use sqlx::PgPool;
use thiserror::Error;
use tracing::instrument;

use tradepost_core::{
    CartLines, CartRuleError, GoodsId, LineChange, LineItem, Money, ProductId, Quantity,
    QuantityError, UserId,
};

use crate::db::{CartRepository, ProductRepository, RepositoryError};

/// Errors from cart operations.
#[derive(Debug, Error)]
pub enum CartError {
    /// The product, line or cart does not exist for this user.
    #[error("not found")]
    NotFound,

    /// No unreserved stock is left.
    #[error("'{name}' is out of stock")]
    OutOfStock { name: String },

    /// The requested quantity exceeds live stock.
    #[error("We don't have enough quantity of '{name}': {available} is available")]
    InsufficientStock { name: String, available: u32 },

    /// The submitted quantity is not a positive whole number.
    #[error("invalid quantity: {0}")]
    InvalidQuantity(#[from] QuantityError),

    /// Repository/database error.
    #[error("database error: {0}")]
    Repository(RepositoryError),
}

impl From<RepositoryError> for CartError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::NotFound => Self::NotFound,
            other => Self::Repository(other),
        }
    }
}

impl CartError {
    /// Whether the shopper can fix this by changing the request.
    #[must_use]
    pub const fn is_user_error(&self) -> bool {
        matches!(
            self,
            Self::OutOfStock { .. } | Self::InsufficientStock { .. } | Self::InvalidQuantity(_)
        )
    }

    fn from_rule(err: CartRuleError, name: &str) -> Self {
        match err {
            CartRuleError::LineNotFound(_) => Self::NotFound,
            CartRuleError::OutOfStock => Self::OutOfStock {
                name: name.to_owned(),
            },
            CartRuleError::InsufficientStock { available } => Self::InsufficientStock {
                name: name.to_owned(),
                available,
            },
        }
    }
}

/// A cart ready for rendering.
#[derive(Debug, Clone, Default)]
pub struct CartView {
    pub lines: Vec<LineItem>,
    pub total: Money,
    pub item_count: u64,
}

impl From<CartLines> for CartView {
    fn from(lines: CartLines) -> Self {
        Self {
            total: lines.total(),
            item_count: lines.item_count(),
            lines: lines.into_lines(),
        }
    }
}

/// Cart service for one request.
pub struct CartService<'a> {
    pool: &'a PgPool,
}

impl<'a> CartService<'a> {
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// The user's cart lines and total.
    ///
    /// # Errors
    ///
    /// Returns `CartError::NotFound` if the user has no cart.
    pub async fn view(&self, user_id: UserId) -> Result<CartView, CartError> {
        let carts = CartRepository::new(self.pool);
        let cart_id = carts.cart_for(user_id).await?;
        Ok(carts.lines(cart_id).await?.into())
    }

    /// Sum of quantity times snapshot price.
    ///
    /// # Errors
    ///
    /// Returns `CartError::NotFound` if the user has no cart.
    pub async fn total_for(&self, user_id: UserId) -> Result<Money, CartError> {
        Ok(self.view(user_id).await?.total)
    }

    /// Add one unit of a product as a new line.
    ///
    /// # Errors
    ///
    /// Returns `CartError::NotFound` if the product does not exist.
    /// Returns `CartError::OutOfStock` if no unit is left to reserve.
    #[instrument(skip_all, fields(user_id = %user_id, product_id = %product_id))]
    pub async fn add_item(
        &self,
        user_id: UserId,
        product_id: ProductId,
    ) -> Result<LineItem, CartError> {
        let mut tx = self.pool.begin().await.map_err(RepositoryError::from)?;

        let cart_id = CartRepository::lock_for_user(&mut tx, user_id).await?;
        let product = ProductRepository::lock(&mut tx, product_id)
            .await?
            .ok_or(CartError::NotFound)?;
        let lines = CartRepository::lines_in(&mut tx, cart_id).await?;

        let new_line = lines
            .plan_add(&product.snapshot(), product.stock)
            .map_err(|e| CartError::from_rule(e, &product.title))?;
        let line = CartRepository::insert_line(&mut tx, cart_id, &new_line).await?;

        tx.commit().await.map_err(RepositoryError::from)?;
        tracing::info!(goods_id = %line.goods_id, "Added to cart");
        Ok(line)
    }

    /// Add one unit to a line if stock allows; otherwise leave it unchanged.
    ///
    /// # Errors
    ///
    /// Returns `CartError::NotFound` if the line is not in the user's cart.
    #[instrument(skip_all, fields(user_id = %user_id, goods_id = %goods_id))]
    pub async fn increase(&self, user_id: UserId, goods_id: GoodsId) -> Result<LineChange, CartError> {
        let mut tx = self.pool.begin().await.map_err(RepositoryError::from)?;

        let cart_id = CartRepository::lock_for_user(&mut tx, user_id).await?;
        let mut lines = CartRepository::lines_in(&mut tx, cart_id).await?;
        let product_id = lines.get(goods_id).ok_or(CartError::NotFound)?.product_id;
        let product = ProductRepository::lock(&mut tx, product_id)
            .await?
            .ok_or(CartError::NotFound)?;

        let change = lines
            .increase(goods_id, product.stock)
            .map_err(|e| CartError::from_rule(e, &product.title))?;
        write_change(&mut tx, cart_id, change).await?;

        tx.commit().await.map_err(RepositoryError::from)?;
        if change == LineChange::Unchanged {
            tracing::debug!(stock = product.stock, "Increase refused by stock bound");
        }
        Ok(change)
    }

    /// Remove one unit from a line, stopping at one.
    ///
    /// # Errors
    ///
    /// Returns `CartError::NotFound` if the line is not in the user's cart.
    #[instrument(skip_all, fields(user_id = %user_id, goods_id = %goods_id))]
    pub async fn decrease(&self, user_id: UserId, goods_id: GoodsId) -> Result<LineChange, CartError> {
        let mut tx = self.pool.begin().await.map_err(RepositoryError::from)?;

        let cart_id = CartRepository::lock_for_user(&mut tx, user_id).await?;
        let mut lines = CartRepository::lines_in(&mut tx, cart_id).await?;
        let change = lines
            .decrease(goods_id)
            .map_err(|e| CartError::from_rule(e, ""))?;
        write_change(&mut tx, cart_id, change).await?;

        tx.commit().await.map_err(RepositoryError::from)?;
        Ok(change)
    }

    /// Set a line to the quantity typed into the cart form.
    ///
    /// # Errors
    ///
    /// Returns `CartError::InvalidQuantity` if `raw` is not a positive whole number.
    /// Returns `CartError::InsufficientStock` if the product does not have that many.
    /// Returns `CartError::NotFound` if the line is not in the user's cart.
    #[instrument(skip_all, fields(user_id = %user_id, goods_id = %goods_id))]
    pub async fn set_quantity(
        &self,
        user_id: UserId,
        goods_id: GoodsId,
        raw: &str,
    ) -> Result<LineChange, CartError> {
        let requested = Quantity::parse(raw)?;

        let mut tx = self.pool.begin().await.map_err(RepositoryError::from)?;

        let cart_id = CartRepository::lock_for_user(&mut tx, user_id).await?;
        let mut lines = CartRepository::lines_in(&mut tx, cart_id).await?;
        let product_id = lines.get(goods_id).ok_or(CartError::NotFound)?.product_id;
        let product = ProductRepository::lock(&mut tx, product_id)
            .await?
            .ok_or(CartError::NotFound)?;

        let change = lines
            .set_quantity(goods_id, requested, product.stock)
            .map_err(|e| CartError::from_rule(e, &product.title))?;
        write_change(&mut tx, cart_id, change).await?;

        tx.commit().await.map_err(RepositoryError::from)?;
        Ok(change)
    }

    /// Delete a line.
    ///
    /// # Errors
    ///
    /// Returns `CartError::NotFound` if the line is not in the user's cart.
    #[instrument(skip_all, fields(user_id = %user_id, goods_id = %goods_id))]
    pub async fn remove_item(&self, user_id: UserId, goods_id: GoodsId) -> Result<(), CartError> {
        let mut tx = self.pool.begin().await.map_err(RepositoryError::from)?;

        let cart_id = CartRepository::lock_for_user(&mut tx, user_id).await?;
        CartRepository::delete_line(&mut tx, cart_id, goods_id).await?;

        tx.commit().await.map_err(RepositoryError::from)?;
        Ok(())
    }
}

async fn write_change(
    conn: &mut sqlx::PgConnection,
    cart_id: tradepost_core::CartId,
    change: LineChange,
) -> Result<(), RepositoryError> {
    match change {
        LineChange::Updated { goods_id, quantity } => {
            CartRepository::update_quantity(conn, cart_id, goods_id, quantity).await
        }
        LineChange::Unchanged => Ok(()),
    }
}
