//! HTTP route handlers for the storefront.
//!
//! All handlers speak JSON. Cart and identity live in the session.
//!
//! # Route Structure
//!
//! ```text
//! GET  /health                      - Liveness
//! GET  /health/ready                - Readiness (order store reachable)
//!
//! # Cart
//! GET  /cart                        - Cart contents
//! POST /cart/add                    - Add a product (triggers cart-updated)
//! POST /cart/update                 - Set a line quantity (triggers cart-updated)
//! POST /cart/remove                 - Remove a line (triggers cart-updated)
//! GET  /cart/count                  - Badge count
//!
//! # Checkout
//! POST /checkout/quote              - Price the cart for a region
//! POST /checkout                    - Place the order
//!
//! # Auth
//! POST /auth/login                  - Password sign-in
//! POST /auth/logout                 - Sign out
//!
//! # Orders
//! GET  /account/orders              - Order history (requires auth)
//! GET  /orders/{reference}/track    - Tracker view by order number (or own order ID)
//! ```

pub mod account;
pub mod auth;
pub mod cart;
pub mod checkout;
pub mod orders;

use axum::{
    Router,
    extract::State,
    http::StatusCode,
    routing::{get, post},
};

use crate::state::AppState;

/// Create the cart routes router.
pub fn cart_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(cart::show))
        .route("/add", post(cart::add))
        .route("/update", post(cart::update))
        .route("/remove", post(cart::remove))
        .route("/count", get(cart::count))
}

/// Create the checkout routes router.
pub fn checkout_routes() -> Router<AppState> {
    Router::new()
        .route("/", post(checkout::submit))
        .route("/quote", post(checkout::quote))
}

/// Create the auth routes router.
pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/login", post(auth::login))
        .route("/logout", post(auth::logout))
}

/// Create all routes for the storefront.
///
/// The caller supplies the session layer and state.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/health/ready", get(readiness))
        .nest("/cart", cart_routes())
        .nest("/checkout", checkout_routes())
        .nest("/auth", auth_routes())
        .route("/account/orders", get(account::orders))
        .route("/orders/{reference}/track", get(orders::track))
}

/// Liveness health check endpoint.
///
/// Returns "ok" if the server is running. Does not check dependencies.
async fn health() -> &'static str {
    "ok"
}

/// Readiness health check endpoint.
///
/// Returns 503 Service Unavailable if the order store is not reachable.
async fn readiness(State(state): State<AppState>) -> StatusCode {
    match state.orders().ping().await {
        Ok(()) => StatusCode::OK,
        Err(e) => {
            tracing::warn!(error = %e, "Readiness check failed");
            StatusCode::SERVICE_UNAVAILABLE
        }
    }
}
