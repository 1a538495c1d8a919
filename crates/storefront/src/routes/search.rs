//! Search route handlers.

use askama::Template;
use askama_web::WebTemplate;
use axum::{
    Form,
    extract::{Query, State},
    response::{IntoResponse, Redirect, Response},
};
use serde::Deserialize;
use tower_sessions::Session;
use tracing::instrument;

use super::PageContext;
use crate::error::Result;
use crate::middleware::push_flash;
use crate::models::Product;
use crate::models::session::Flash;
use crate::services::catalog::{CatalogService, SearchOutcome};
use crate::state::AppState;

/// Search parameters, from the query string or the header form.
#[derive(Debug, Default, Deserialize)]
pub struct SearchQuery {
    #[serde(default)]
    pub q: Option<String>,
}

/// Search results page template.
#[derive(Template, WebTemplate)]
#[template(path = "search.html")]
pub struct SearchTemplate {
    pub page: PageContext,
    pub query: String,
    pub products: Vec<Product>,
}

/// `GET /search?q=`
pub async fn search(
    State(state): State<AppState>,
    session: Session,
    Query(query): Query<SearchQuery>,
) -> Result<Response> {
    run_search(&state, &session, query).await
}

/// `POST /search` with form field `q`.
pub async fn search_form(
    State(state): State<AppState>,
    session: Session,
    Form(query): Form<SearchQuery>,
) -> Result<Response> {
    run_search(&state, &session, query).await
}

/// Render matches, or send the shopper back to the full listing when there
/// are none.
#[instrument(skip(state, session))]
async fn run_search(state: &AppState, session: &Session, query: SearchQuery) -> Result<Response> {
    let outcome = CatalogService::new(state.pool())
        .search(query.q.as_deref())
        .await?;

    match outcome {
        SearchOutcome::NoQuery => Ok(Redirect::to("/products").into_response()),
        SearchOutcome::Results { products, .. } if products.is_empty() => {
            push_flash(session, Flash::error("Unfortunately nothing was found")).await;
            Ok(Redirect::to("/products").into_response())
        }
        SearchOutcome::Results { query, products } => Ok(SearchTemplate {
            page: PageContext::load(session).await,
            query,
            products,
        }
        .into_response()),
    }
}
