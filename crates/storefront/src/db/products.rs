//! Product repository for catalog reads and stock changes.
//!
//! Stock is only written by settlement and by catalog administration. Any
//! write that depends on the current stock takes the row lock first with one
//! of the `lock_*` functions on an open transaction.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use sqlx::{PgConnection, PgPool};

use tradepost_core::{Money, ProductId};

use super::{RepositoryError, non_negative};
use crate::models::Product;

#[derive(sqlx::FromRow)]
struct ProductRow {
    id: i32,
    title: String,
    price: i32,
    description: String,
    category: String,
    image: String,
    rating: Option<Decimal>,
    stock: i32,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<ProductRow> for Product {
    type Error = RepositoryError;

    fn try_from(row: ProductRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: ProductId::new(row.id),
            title: row.title,
            price: Money::from(row.price),
            description: row.description,
            category: row.category,
            image: row.image,
            rating: row.rating,
            stock: non_negative(row.stock, "stock")?,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

const SELECT_PRODUCT: &str = r"
    SELECT id, title, price, description, category, image, rating, stock,
           created_at, updated_at
    FROM storefront.product
";

/// A catalog entry as supplied by the seed file.
#[derive(Debug, Clone, Deserialize)]
pub struct NewProduct {
    pub title: String,
    /// Price in minor units.
    pub price: i32,
    #[serde(default)]
    pub description: String,
    pub category: String,
    #[serde(default)]
    pub image: String,
    #[serde(default)]
    pub rating: Option<Decimal>,
    #[serde(default)]
    pub stock: i32,
}

/// Result of an upsert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Upserted {
    Inserted(ProductId),
    Updated(ProductId),
}

/// Escape `%`, `_` and `\` so user input matches literally inside `ILIKE`.
#[must_use]
pub fn like_pattern(term: &str) -> String {
    let mut escaped = String::with_capacity(term.len() + 2);
    escaped.push('%');
    for c in term.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped.push('%');
    escaped
}

/// Repository for product database operations.
pub struct ProductRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> ProductRepository<'a> {
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// All products ordered by title.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list_all(&self) -> Result<Vec<Product>, RepositoryError> {
        let rows: Vec<ProductRow> = sqlx::query_as(&format!("{SELECT_PRODUCT} ORDER BY title"))
            .fetch_all(self.pool)
            .await?;
        rows.into_iter().map(Product::try_from).collect()
    }

    /// Distinct categories with their product counts, ordered by name.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn categories(&self) -> Result<Vec<(String, i64)>, RepositoryError> {
        let rows = sqlx::query_as(
            r"
            SELECT category, COUNT(*) AS products
            FROM storefront.product
            GROUP BY category
            ORDER BY category
            ",
        )
        .fetch_all(self.pool)
        .await?;
        Ok(rows)
    }

    /// Products in one category ordered by title. Empty if the category is unknown.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list_by_category(&self, category: &str) -> Result<Vec<Product>, RepositoryError> {
        let rows: Vec<ProductRow> =
            sqlx::query_as(&format!("{SELECT_PRODUCT} WHERE category = $1 ORDER BY title"))
                .bind(category)
                .fetch_all(self.pool)
                .await?;
        rows.into_iter().map(Product::try_from).collect()
    }

    /// Get a product by ID.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get(&self, id: ProductId) -> Result<Option<Product>, RepositoryError> {
        let row: Option<ProductRow> = sqlx::query_as(&format!("{SELECT_PRODUCT} WHERE id = $1"))
            .bind(id)
            .fetch_optional(self.pool)
            .await?;
        row.map(Product::try_from).transpose()
    }

    /// Case-insensitive substring match on title.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn search_title(&self, term: &str) -> Result<Vec<Product>, RepositoryError> {
        let rows: Vec<ProductRow> = sqlx::query_as(&format!(
            r"{SELECT_PRODUCT} WHERE title ILIKE $1 ESCAPE '\' ORDER BY title"
        ))
        .bind(like_pattern(term))
        .fetch_all(self.pool)
        .await?;
        rows.into_iter().map(Product::try_from).collect()
    }

    /// Insert a product, or update the existing one with the same title.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails (including
    /// check constraint violations for negative price or stock).
    pub async fn upsert(&self, product: &NewProduct) -> Result<Upserted, RepositoryError> {
        let (id, inserted): (i32, bool) = sqlx::query_as(
            r"
            INSERT INTO storefront.product
                (title, price, description, category, image, rating, stock)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (title) DO UPDATE SET
                price = EXCLUDED.price,
                description = EXCLUDED.description,
                category = EXCLUDED.category,
                image = EXCLUDED.image,
                rating = EXCLUDED.rating,
                stock = EXCLUDED.stock,
                updated_at = NOW()
            RETURNING id, (xmax = 0) AS inserted
            ",
        )
        .bind(&product.title)
        .bind(product.price)
        .bind(&product.description)
        .bind(&product.category)
        .bind(&product.image)
        .bind(product.rating)
        .bind(product.stock)
        .fetch_one(self.pool)
        .await?;

        let id = ProductId::new(id);
        Ok(if inserted {
            Upserted::Inserted(id)
        } else {
            Upserted::Updated(id)
        })
    }

    /// Overwrite a product's stock count.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the product does not exist.
    pub async fn set_stock(&self, id: ProductId, stock: u32) -> Result<(), RepositoryError> {
        let stock = i32::try_from(stock)
            .map_err(|_| RepositoryError::Conflict(format!("stock {stock} is too large")))?;
        let result = sqlx::query(
            "UPDATE storefront.product SET stock = $2, updated_at = NOW() WHERE id = $1",
        )
        .bind(id)
        .bind(stock)
        .execute(self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    /// Lock one product row for the rest of the transaction and return it.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn lock(
        conn: &mut PgConnection,
        id: ProductId,
    ) -> Result<Option<Product>, RepositoryError> {
        let row: Option<ProductRow> =
            sqlx::query_as(&format!("{SELECT_PRODUCT} WHERE id = $1 FOR UPDATE"))
                .bind(id)
                .fetch_optional(conn)
                .await?;
        row.map(Product::try_from).transpose()
    }

    /// Lock several product rows in ascending id order and return their stock.
    ///
    /// Products that no longer exist are absent from the map.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn lock_stock(
        conn: &mut PgConnection,
        ids: &[ProductId],
    ) -> Result<BTreeMap<ProductId, u32>, RepositoryError> {
        let ids: Vec<i32> = ids.iter().map(ProductId::as_i32).collect();
        let rows: Vec<(i32, i32)> = sqlx::query_as(
            r"
            SELECT id, stock FROM storefront.product
            WHERE id = ANY($1)
            ORDER BY id
            FOR UPDATE
            ",
        )
        .bind(&ids)
        .fetch_all(conn)
        .await?;

        rows.into_iter()
            .map(|(id, stock)| Ok((ProductId::new(id), non_negative(stock, "stock")?)))
            .collect()
    }

    /// Write a new stock count for a product locked by this transaction.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn write_locked_stock(
        conn: &mut PgConnection,
        id: ProductId,
        stock: u32,
    ) -> Result<(), RepositoryError> {
        let stock = i32::try_from(stock)
            .map_err(|_| RepositoryError::DataCorruption(format!("stock {stock} out of range")))?;
        sqlx::query("UPDATE storefront.product SET stock = $2, updated_at = NOW() WHERE id = $1")
            .bind(id)
            .bind(stock)
            .execute(conn)
            .await?;
        Ok(())
    }
}
