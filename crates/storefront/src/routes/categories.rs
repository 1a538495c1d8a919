//! Category route handler.

use askama::Template;
use askama_web::WebTemplate;
use axum::{
    extract::{Path, State},
    response::IntoResponse,
};
use tracing::instrument;

use super::PageContext;
use crate::error::Result;
use crate::models::Product;
use crate::services::catalog::CatalogService;
use crate::state::AppState;

/// Category page template.
#[derive(Template, WebTemplate)]
#[template(path = "categories/show.html")]
pub struct CategoryTemplate {
    pub page: PageContext,
    pub name: String,
    pub products: Vec<Product>,
}

/// Display the products in one category.
///
/// An unknown category renders an empty list rather than 404.
#[instrument(skip(state, page))]
pub async fn show(
    State(state): State<AppState>,
    Path(name): Path<String>,
    page: PageContext,
) -> Result<impl IntoResponse> {
    let products = CatalogService::new(state.pool())
        .list_by_category(&name)
        .await?;
    Ok(CategoryTemplate {
        page,
        name,
        products,
    })
}
