//! Product route handlers.

use askama::Template;
use askama_web::WebTemplate;
use axum::{
    extract::{Path, State},
    response::IntoResponse,
};
use tracing::instrument;

use tradepost_core::ProductId;

use super::PageContext;
use crate::error::Result;
use crate::models::Product;
use crate::services::catalog::CatalogService;
use crate::state::AppState;

/// Product listing page template.
#[derive(Template, WebTemplate)]
#[template(path = "products/index.html")]
pub struct ProductsIndexTemplate {
    pub page: PageContext,
    pub products: Vec<Product>,
}

/// Product detail page template.
#[derive(Template, WebTemplate)]
#[template(path = "products/show.html")]
pub struct ProductShowTemplate {
    pub page: PageContext,
    pub product: Product,
}

/// Display every product.
#[instrument(skip_all)]
pub async fn index(State(state): State<AppState>, page: PageContext) -> Result<impl IntoResponse> {
    let products = CatalogService::new(state.pool()).list_all().await?;
    Ok(ProductsIndexTemplate { page, products })
}

/// Display one product.
///
/// Unknown ids render 404.
#[instrument(skip(state, page))]
pub async fn show(
    State(state): State<AppState>,
    Path(id): Path<i32>,
    page: PageContext,
) -> Result<impl IntoResponse> {
    let product = CatalogService::new(state.pool())
        .get(ProductId::new(id))
        .await?;
    Ok(ProductShowTemplate { page, product })
}
