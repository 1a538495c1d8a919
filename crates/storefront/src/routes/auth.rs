//! Authentication route handlers.
//!
//! Handles registration, login and logout against the local user table.
//! Validation failures are shown as flash messages on the form page.

use askama::Template;
use askama_web::WebTemplate;
use axum::{
    Form,
    extract::State,
    response::{IntoResponse, Redirect, Response},
};
use serde::Deserialize;
use tower_sessions::Session;
use tracing::instrument;

use super::PageContext;
use crate::error::{Result, clear_sentry_user, set_sentry_user};
use crate::middleware::auth::LOGIN_PATH;
use crate::middleware::{clear_current_user, push_flash, set_current_user};
use crate::models::User;
use crate::models::session::{CurrentUser, Flash};
use crate::services::auth::{AuthError, AuthService};
use crate::state::AppState;

const REGISTER_PAGE: &str = "/auth/register";

// =============================================================================
// Form Types
// =============================================================================

/// Login form data.
#[derive(Debug, Deserialize)]
pub struct LoginForm {
    pub email: String,
    pub password: String,
}

/// Registration form data.
#[derive(Debug, Deserialize)]
pub struct RegisterForm {
    pub email: String,
    pub name: String,
    pub password: String,
}

// =============================================================================
// Templates
// =============================================================================

/// Login page template.
#[derive(Template, WebTemplate)]
#[template(path = "auth/login.html")]
pub struct LoginTemplate {
    pub page: PageContext,
}

/// Register page template.
#[derive(Template, WebTemplate)]
#[template(path = "auth/register.html")]
pub struct RegisterTemplate {
    pub page: PageContext,
}

// =============================================================================
// Routes
// =============================================================================

/// Display the login page.
pub async fn login_page(page: PageContext) -> impl IntoResponse {
    LoginTemplate { page }
}

/// Handle login form submission.
#[instrument(skip_all)]
pub async fn login(
    State(state): State<AppState>,
    session: Session,
    Form(form): Form<LoginForm>,
) -> Result<Response> {
    match AuthService::new(state.pool())
        .authenticate(&form.email, &form.password)
        .await
    {
        Ok(user) => {
            start_session(&session, &user).await?;
            tracing::info!(user_id = %user.id, "User logged in");
            Ok(Redirect::to("/").into_response())
        }
        Err(e) if e.is_user_error() => {
            tracing::debug!(error = %e, "Login refused");
            push_flash(&session, Flash::error(e.to_string())).await;
            Ok(Redirect::to(LOGIN_PATH).into_response())
        }
        Err(e) => Err(e.into()),
    }
}

/// Display the registration page.
pub async fn register_page(page: PageContext) -> impl IntoResponse {
    RegisterTemplate { page }
}

/// Handle registration form submission.
///
/// A new account is logged in straight away. An email that is already
/// registered is sent to the login page instead.
#[instrument(skip_all)]
pub async fn register(
    State(state): State<AppState>,
    session: Session,
    Form(form): Form<RegisterForm>,
) -> Result<Response> {
    match AuthService::new(state.pool())
        .register(&form.email, &form.name, &form.password)
        .await
    {
        Ok(user) => {
            start_session(&session, &user).await?;
            tracing::info!(user_id = %user.id, "User registered");
            Ok(Redirect::to("/").into_response())
        }
        Err(AuthError::UserAlreadyExists) => {
            push_flash(
                &session,
                Flash::error("You've already signed up with that email, log in instead!"),
            )
            .await;
            Ok(Redirect::to(LOGIN_PATH).into_response())
        }
        Err(e) if e.is_user_error() => {
            push_flash(&session, Flash::error(e.to_string())).await;
            Ok(Redirect::to(REGISTER_PAGE).into_response())
        }
        Err(e) => Err(e.into()),
    }
}

/// Log out and return to the home page.
pub async fn logout(session: Session) -> Response {
    if let Err(e) = clear_current_user(&session).await {
        tracing::error!(error = %e, "Failed to clear session");
    }
    clear_sentry_user();

    Redirect::to("/").into_response()
}

async fn start_session(session: &Session, user: &User) -> Result<()> {
    set_current_user(session, &CurrentUser::from(user)).await?;
    set_sentry_user(&user.id, Some(user.email.as_str()));
    Ok(())
}
