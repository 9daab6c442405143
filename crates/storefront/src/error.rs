//! Unified error handling with Sentry integration.
//!
//! Provides a unified `AppError` type that captures errors to Sentry before
//! responding to the client. All route handlers should return `Result<T, AppError>`.
//!
//! Responses are JSON objects with an `error` message. Internal details are
//! logged and reported, never sent to the client.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

use crate::db::RepositoryError;
use crate::pricing::PricingError;
use crate::services::auth::AuthError;
use crate::services::checkout::CheckoutError;
use crate::services::tracking::TrackingError;

/// Application-level error type for the storefront.
#[derive(Debug, Error)]
pub enum AppError {
    /// Database operation failed.
    #[error("Database error: {0}")]
    Database(#[from] RepositoryError),

    /// Checkout attempt failed.
    #[error("Checkout error: {0}")]
    Checkout(#[from] CheckoutError),

    /// Order lookup or status change failed.
    #[error("Tracking error: {0}")]
    Tracking(#[from] TrackingError),

    /// Pricing failed.
    #[error("Pricing error: {0}")]
    Pricing(#[from] PricingError),

    /// Authentication operation failed.
    #[error("Auth error: {0}")]
    Auth(#[from] AuthError),

    /// Session could not be read or written.
    #[error("Session error: {0}")]
    Session(#[from] tower_sessions::session::Error),

    /// Resource not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Bad request from client.
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Internal server error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    const fn is_server_error(&self) -> bool {
        match self {
            Self::Database(_) | Self::Session(_) | Self::Internal(_) => true,
            Self::Checkout(err) => err.is_retryable(),
            Self::Tracking(TrackingError::Repository(_)) => true,
            Self::Auth(AuthError::Repository(_) | AuthError::PasswordHash) => true,
            _ => false,
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            Self::Database(err) if err.is_transient() => StatusCode::SERVICE_UNAVAILABLE,
            Self::Database(_) | Self::Session(_) | Self::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            Self::Checkout(err) => match err {
                CheckoutError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
                CheckoutError::DuplicateAccount { .. } => StatusCode::CONFLICT,
                CheckoutError::EmptyCart => StatusCode::BAD_REQUEST,
                CheckoutError::TotalTooLarge(_) => StatusCode::UNPROCESSABLE_ENTITY,
                CheckoutError::AttemptMismatch { .. } => StatusCode::CONFLICT,
                CheckoutError::Persistence(_) | CheckoutError::Network(_) => {
                    StatusCode::SERVICE_UNAVAILABLE
                }
            },
            Self::Tracking(err) => match err {
                TrackingError::NotFound => StatusCode::NOT_FOUND,
                TrackingError::InvalidTransition(_) => StatusCode::CONFLICT,
                TrackingError::Repository(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            Self::Pricing(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::Auth(err) => match err {
                AuthError::InvalidCredentials => StatusCode::UNAUTHORIZED,
                AuthError::WeakPassword(_) | AuthError::InvalidEmail(_) => StatusCode::BAD_REQUEST,
                AuthError::Repository(_) | AuthError::PasswordHash => {
                    StatusCode::INTERNAL_SERVER_ERROR
                }
            },
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
        }
    }

    fn body(&self) -> serde_json::Value {
        match self {
            Self::Database(_) | Self::Session(_) | Self::Internal(_) => {
                json!({ "error": "Internal server error" })
            }
            Self::Checkout(err) => match err {
                CheckoutError::Validation(errors) => {
                    json!({ "error": "Please correct the highlighted fields", "fields": errors })
                }
                CheckoutError::DuplicateAccount { .. } => json!({
                    "error": "An account with this email already exists. Please sign in.",
                    "redirect": err.sign_in_redirect(),
                }),
                CheckoutError::EmptyCart => json!({ "error": "Your cart is empty" }),
                CheckoutError::TotalTooLarge(_) => json!({
                    "error": "Your order total is too large. Please split it into smaller orders.",
                }),
                CheckoutError::AttemptMismatch { order_number } => json!({
                    "error": "This checkout was already placed with different items. \
                              Your cart is saved, please review it and submit again.",
                    "order_number": order_number,
                }),
                CheckoutError::Persistence(_) | CheckoutError::Network(_) => json!({
                    "error": "We could not place your order. Your cart is saved, please try again.",
                    "retryable": true,
                }),
            },
            Self::Tracking(err) => match err {
                TrackingError::NotFound => json!({ "error": "Order not found" }),
                TrackingError::InvalidTransition(e) => json!({ "error": e.to_string() }),
                TrackingError::Repository(_) => json!({ "error": "Internal server error" }),
            },
            Self::Pricing(err @ PricingError::UnknownRegion(_)) => {
                json!({ "error": err.to_string(), "field": "region" })
            }
            Self::Pricing(err @ PricingError::TotalTooLarge(_)) => json!({ "error": err.to_string() }),
            Self::Auth(err) => match err {
                AuthError::InvalidCredentials => json!({ "error": "Invalid credentials" }),
                AuthError::WeakPassword(msg) => json!({ "error": msg }),
                AuthError::InvalidEmail(_) => json!({ "error": "Invalid email address" }),
                AuthError::Repository(_) | AuthError::PasswordHash => {
                    json!({ "error": "Authentication error" })
                }
            },
            Self::NotFound(_) | Self::BadRequest(_) => {
                json!({ "error": self.to_string() })
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        // Capture server errors to Sentry
        if self.is_server_error() {
            let event_id = sentry::capture_error(&self);
            tracing::error!(
                error = %self,
                sentry_event_id = %event_id,
                "Request error"
            );
        }

        (self.status(), Json(self.body())).into_response()
    }
}

/// Result type alias for `AppError`.
pub type Result<T> = std::result::Result<T, AppError>;

/// Set the Sentry user context from a customer ID.
///
/// Call this after sign-in or guest provisioning to associate errors with
/// customers.
pub fn set_sentry_user(customer_id: &impl ToString, email: Option<&str>) {
    sentry::configure_scope(|scope| {
        scope.set_user(Some(sentry::User {
            id: Some(customer_id.to_string()),
            email: email.map(String::from),
            ..Default::default()
        }));
    });
}

/// Clear the Sentry user context.
///
/// Call this on logout to stop associating errors with the customer.
pub fn clear_sentry_user() {
    sentry::configure_scope(|scope| {
        scope.set_user(None);
    });
}

/// Add a breadcrumb for customer actions.
///
/// Breadcrumbs appear in Sentry error reports to show the trail of actions
/// leading up to an error.
pub fn add_breadcrumb(category: &str, message: &str, data: Option<&[(&str, &str)]>) {
    let mut breadcrumb = sentry::Breadcrumb {
        category: Some(category.to_string()),
        message: Some(message.to_string()),
        level: sentry::Level::Info,
        ..Default::default()
    };

    if let Some(pairs) = data {
        for (key, value) in pairs {
            breadcrumb.data.insert(
                (*key).to_string(),
                serde_json::Value::String((*value).to_string()),
            );
        }
    }

    sentry::add_breadcrumb(breadcrumb);
}
