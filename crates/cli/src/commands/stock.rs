//! Stock maintenance command.

use tradepost_core::ProductId;
use tradepost_storefront::db::{ProductRepository, RepositoryError};

use super::{CommandError, connect};

/// Overwrite a product's stock count.
///
/// # Errors
///
/// Returns `CommandError::ProductNotFound` if no product has this id.
pub async fn set(product_id: i32, count: u32) -> Result<(), CommandError> {
    let pool = connect().await?;

    match ProductRepository::new(&pool)
        .set_stock(ProductId::new(product_id), count)
        .await
    {
        Ok(()) => {
            tracing::info!(product_id, count, "Stock updated");
            Ok(())
        }
        Err(RepositoryError::NotFound) => Err(CommandError::ProductNotFound(product_id)),
        Err(e) => Err(e.into()),
    }
}
