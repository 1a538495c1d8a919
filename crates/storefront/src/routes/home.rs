//! Home page route handler.

use askama::Template;
use askama_web::WebTemplate;
use axum::{extract::State, response::IntoResponse};
use tracing::instrument;

use super::PageContext;
use crate::error::Result;
use crate::models::Product;
use crate::services::catalog::{CatalogService, Category};
use crate::state::AppState;

/// Home page template.
#[derive(Template, WebTemplate)]
#[template(path = "home.html")]
pub struct HomeTemplate {
    pub page: PageContext,
    /// Category navigation with product counts.
    pub categories: Vec<Category>,
    /// Every product, one section per category.
    pub groups: Vec<(String, Vec<Product>)>,
}

/// Display the home page.
#[instrument(skip_all)]
pub async fn home(State(state): State<AppState>, page: PageContext) -> Result<impl IntoResponse> {
    let catalog = CatalogService::new(state.pool());
    let categories = catalog.categories().await?;
    let groups = catalog.grouped_by_category().await?;

    Ok(HomeTemplate {
        page,
        categories,
        groups,
    })
}
