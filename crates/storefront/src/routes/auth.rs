//! Authentication route handlers.
//!
//! Password sign-in for customers who set a password during guest checkout.

use axum::{Json, extract::State, http::StatusCode};
use serde::Deserialize;
use tower_sessions::Session;
use tracing::instrument;

use crate::error::{Result, add_breadcrumb, clear_sentry_user, set_sentry_user};
use crate::middleware::{clear_current_customer, set_current_customer};
use crate::models::CurrentCustomer;
use crate::state::AppState;

/// Login request.
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// Sign in with email and password.
#[instrument(skip_all)]
pub async fn login(
    State(state): State<AppState>,
    session: Session,
    Json(request): Json<LoginRequest>,
) -> Result<Json<CurrentCustomer>> {
    let customer = state
        .auth()
        .login_with_password(&request.email, &request.password)
        .await?;
    let binding = customer.session_binding();

    // New session ID on privilege change.
    session.cycle_id().await?;
    set_current_customer(&session, &binding).await?;

    set_sentry_user(&binding.id, Some(binding.email.as_str()));
    add_breadcrumb("auth", "Customer signed in", None);
    tracing::info!(customer_id = %binding.id, "Customer signed in");

    Ok(Json(binding))
}

/// Sign out. The cart stays with the session.
pub async fn logout(session: Session) -> Result<StatusCode> {
    clear_current_customer(&session).await?;
    clear_sentry_user();
    Ok(StatusCode::NO_CONTENT)
}
