//! HTTP route handlers for storefront.
//!
//! # Route Structure
//!
//! ```text
//! GET  /                          - Home page (products and categories)
//! GET  /health                    - Liveness check
//! GET  /health/ready              - Readiness check (database)
//!
//! # Catalog
//! GET  /products                  - All products by title
//! GET  /products/{id}             - Product detail
//! GET  /categories/{name}         - Products in one category
//! GET  /search?q=                 - Title search
//! POST /search                    - Title search from the header form
//!
//! # Auth (rate limited)
//! GET  /auth/login                - Login page
//! POST /auth/login                - Login action
//! GET  /auth/register             - Register page
//! POST /auth/register             - Register action
//! POST /auth/logout               - Logout action
//!
//! # Cart (requires auth)
//! GET  /cart                      - Cart page
//! POST /cart/add/{product_id}     - Add one unit as a new line
//! POST /cart/increase/{goods_id}  - One more unit, bounded by stock
//! POST /cart/decrease/{goods_id}  - One less unit, never below one
//! POST /cart/remove/{goods_id}    - Delete the line
//! POST /cart/change/{goods_id}    - Set quantity from form field `quantity`
//!
//! # Checkout (requires auth)
//! POST /checkout                  - Open a hosted payment page (303)
//! GET  /checkout/success          - Confirm payment and settle
//! GET  /checkout/cancel           - Abandon the attempt
//!
//! # Provider callbacks
//! POST /webhooks/payments         - Signed payment events
//! ```

pub mod auth;
pub mod cart;
pub mod categories;
pub mod checkout;
pub mod health;
pub mod home;
pub mod products;
pub mod search;
pub mod webhooks;

use axum::{
    Router,
    extract::FromRequestParts,
    http::request::Parts,
    routing::{get, post},
};
use tower_sessions::Session;

use crate::middleware::{auth_rate_limiter, take_flashes};
use crate::models::session::{CurrentUser, Flash, keys};
use crate::state::AppState;

/// Per-request data every page layout needs.
///
/// Extracting this consumes the pending flash messages, so only handlers
/// that render a page should take it.
#[derive(Debug, Clone, Default)]
pub struct PageContext {
    pub user: Option<CurrentUser>,
    pub flashes: Vec<Flash>,
}

impl<S> FromRequestParts<S> for PageContext
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(match parts.extensions.get::<Session>() {
            Some(session) => Self::load(session).await,
            None => Self::default(),
        })
    }
}

impl PageContext {
    /// Read the current user and take the pending flashes.
    pub async fn load(session: &Session) -> Self {
        let user = session
            .get::<CurrentUser>(keys::CURRENT_USER)
            .await
            .ok()
            .flatten();
        let flashes = take_flashes(session).await;

        Self { user, flashes }
    }
}

/// Create the auth routes router.
pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/login", get(auth::login_page).post(auth::login))
        .route("/register", get(auth::register_page).post(auth::register))
        .layer(auth_rate_limiter())
        .route("/logout", post(auth::logout))
}

/// Create the product routes router.
pub fn product_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(products::index))
        .route("/{id}", get(products::show))
}

/// Create the cart routes router.
pub fn cart_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(cart::show))
        .route("/add/{product_id}", post(cart::add))
        .route("/increase/{goods_id}", post(cart::increase))
        .route("/decrease/{goods_id}", post(cart::decrease))
        .route("/remove/{goods_id}", post(cart::remove))
        .route("/change/{goods_id}", post(cart::change))
}

/// Create the checkout routes router.
pub fn checkout_routes() -> Router<AppState> {
    Router::new()
        .route("/", post(checkout::begin))
        .route("/success", get(checkout::success))
        .route("/cancel", get(checkout::cancel))
}

/// Create all routes for the storefront.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(home::home))
        .route("/health", get(health::health))
        .route("/health/ready", get(health::readiness))
        .nest("/products", product_routes())
        .route("/categories/{name}", get(categories::show))
        .route("/search", get(search::search).post(search::search_form))
        .nest("/auth", auth_routes())
        .nest("/cart", cart_routes())
        .nest("/checkout", checkout_routes())
        .route("/webhooks/payments", post(webhooks::payments))
}
