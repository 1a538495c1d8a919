//! Cart route handlers.
//!
//! Every cart route requires a logged-in user. Changes are plain form posts
//! that redirect back to a page; refused changes leave a flash message and
//! commit nothing.

use askama::Template;
use askama_web::WebTemplate;
use axum::{
    Form,
    extract::{Path, State},
    response::{IntoResponse, Redirect, Response},
};
use serde::Deserialize;
use tower_sessions::Session;
use tracing::instrument;

use tradepost_core::{GoodsId, LineChange, ProductId};

use super::PageContext;
use crate::error::{Result, add_breadcrumb};
use crate::middleware::{RequireAuth, push_flash};
use crate::models::session::Flash;
use crate::services::cart::{CartError, CartService, CartView};
use crate::state::AppState;

const CART_PAGE: &str = "/cart";

/// Change quantity form data.
///
/// Kept as text so a malformed value becomes a flash message rather than a
/// rejected form.
#[derive(Debug, Deserialize)]
pub struct ChangeQuantityForm {
    #[serde(default)]
    pub quantity: String,
}

/// Cart page template.
#[derive(Template, WebTemplate)]
#[template(path = "cart/show.html")]
pub struct CartShowTemplate {
    pub page: PageContext,
    pub cart: CartView,
}

/// Display the cart page.
#[instrument(skip_all, fields(user_id = %user.id))]
pub async fn show(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    page: PageContext,
) -> Result<impl IntoResponse> {
    let cart = CartService::new(state.pool()).view(user.id).await?;
    Ok(CartShowTemplate { page, cart })
}

/// Add one unit of a product and go back to its page.
#[instrument(skip_all, fields(user_id = %user.id, product_id = product_id))]
pub async fn add(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    session: Session,
    Path(product_id): Path<i32>,
) -> Result<Response> {
    let product_id = ProductId::new(product_id);

    match CartService::new(state.pool())
        .add_item(user.id, product_id)
        .await
    {
        Ok(_) => {
            add_breadcrumb(
                "cart",
                "Added product",
                Some(&[("product_id", &product_id.to_string())]),
            );
            push_flash(&session, Flash::info("Added to cart")).await;
        }
        Err(CartError::OutOfStock { .. }) => {
            push_flash(
                &session,
                Flash::error("Unfortunately the product is out of stock now"),
            )
            .await;
        }
        Err(e) => refused(&session, e).await?,
    }

    Ok(Redirect::to(&format!("/products/{product_id}")).into_response())
}

/// Add one unit to a line, if stock allows.
#[instrument(skip_all, fields(user_id = %user.id, goods_id = goods_id))]
pub async fn increase(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    session: Session,
    Path(goods_id): Path<i32>,
) -> Result<Response> {
    let goods_id = GoodsId::new(goods_id);

    match CartService::new(state.pool())
        .increase(user.id, goods_id)
        .await
    {
        Ok(LineChange::Unchanged) => {
            push_flash(
                &session,
                Flash::error("No more units of this product are available"),
            )
            .await;
        }
        Ok(LineChange::Updated { .. }) => {}
        Err(e) => refused(&session, e).await?,
    }

    Ok(Redirect::to(CART_PAGE).into_response())
}

/// Remove one unit from a line, stopping at one.
#[instrument(skip_all, fields(user_id = %user.id, goods_id = goods_id))]
pub async fn decrease(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    session: Session,
    Path(goods_id): Path<i32>,
) -> Result<Response> {
    if let Err(e) = CartService::new(state.pool())
        .decrease(user.id, GoodsId::new(goods_id))
        .await
    {
        refused(&session, e).await?;
    }

    Ok(Redirect::to(CART_PAGE).into_response())
}

/// Delete a line.
#[instrument(skip_all, fields(user_id = %user.id, goods_id = goods_id))]
pub async fn remove(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    Path(goods_id): Path<i32>,
) -> Result<Response> {
    CartService::new(state.pool())
        .remove_item(user.id, GoodsId::new(goods_id))
        .await?;

    Ok(Redirect::to(CART_PAGE).into_response())
}

/// Set a line's quantity from the cart form.
#[instrument(skip_all, fields(user_id = %user.id, goods_id = goods_id))]
pub async fn change(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    session: Session,
    Path(goods_id): Path<i32>,
    Form(form): Form<ChangeQuantityForm>,
) -> Result<Response> {
    if let Err(e) = CartService::new(state.pool())
        .set_quantity(user.id, GoodsId::new(goods_id), &form.quantity)
        .await
    {
        refused(&session, e).await?;
    }

    Ok(Redirect::to(CART_PAGE).into_response())
}

/// Show a refused change as a flash message; anything else is an error page.
async fn refused(session: &Session, err: CartError) -> Result<()> {
    if err.is_user_error() {
        tracing::debug!(error = %err, "Cart change refused");
        push_flash(session, Flash::error(err.to_string())).await;
        Ok(())
    } else {
        Err(err.into())
    }
}
