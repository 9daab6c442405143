//! Checkout route handlers.

use axum::{
    Json,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
};
use serde::{Deserialize, Serialize};
use tower_sessions::Session;
use tracing::instrument;
use uuid::Uuid;

use souq_core::CurrencyCode;

use crate::error::{AppError, Result, add_breadcrumb, set_sentry_user};
use crate::middleware::{SessionCart, auth::current_customer, set_current_customer};
use crate::models::{ShippingDestination, session_keys};
use crate::pricing::Totals;
use crate::services::{CheckoutAttempt, CheckoutError, CheckoutForm};
use crate::state::AppState;

/// Client-supplied idempotency key header.
pub const IDEMPOTENCY_KEY_HEADER: &str = "idempotency-key";

/// Quote request.
#[derive(Debug, Deserialize)]
pub struct QuoteRequest {
    pub region: String,
}

/// Quote response.
#[derive(Debug, Serialize)]
pub struct QuoteResponse {
    #[serde(flatten)]
    pub totals: Totals,
    pub currency: CurrencyCode,
}

/// Price the session cart for delivery to a region.
#[instrument(skip(state, cart), fields(region = %request.region))]
pub async fn quote(
    State(state): State<AppState>,
    cart: SessionCart,
    Json(request): Json<QuoteRequest>,
) -> Result<Json<QuoteResponse>> {
    let destination = ShippingDestination {
        region: request.region,
        city: String::new(),
        address: String::new(),
    };
    let totals = state.checkout().quote(cart.store.cart(), &destination)?;

    Ok(Json(QuoteResponse {
        totals,
        currency: state.checkout().settings().currency,
    }))
}

/// Place an order for the session cart.
///
/// The attempt key comes from the `Idempotency-Key` header when present.
/// Otherwise one is kept in the session until the order is placed or the cart
/// changes, so resubmitting after a failure cannot create a second order.
/// When the session's attempt turns out to belong to a different cart, the
/// key is dropped and the next submission starts over.
#[instrument(skip_all)]
pub async fn submit(
    State(state): State<AppState>,
    headers: HeaderMap,
    mut cart: SessionCart,
    Json(form): Json<CheckoutForm>,
) -> Result<impl IntoResponse> {
    let attempt = resolve_attempt(&headers, &cart.session).await?;
    let mut identity = current_customer(&cart.session).await;
    let was_guest = identity.is_none();

    add_breadcrumb(
        "checkout",
        "Checkout submitted",
        Some(&[("guest", if was_guest { "true" } else { "false" })]),
    );

    let outcome = state
        .checkout()
        .submit(&mut cart.store, &mut identity, &form, &attempt)
        .await;

    // A provisioned guest stays bound to the session even if the order failed.
    if was_guest && let Some(customer) = &identity {
        set_current_customer(&cart.session, customer).await?;
        set_sentry_user(&customer.id, Some(customer.email.as_str()));
    }

    if matches!(outcome, Err(CheckoutError::AttemptMismatch { .. })) {
        cart.session
            .remove_value(session_keys::CHECKOUT_ATTEMPT)
            .await?;
    }
    let receipt = outcome?;

    // Saving the emptied cart also ends the attempt.
    cart.save().await?;

    tracing::info!(
        order_id = %receipt.order_id,
        order_number = %receipt.order_number,
        "Order placed"
    );

    Ok((StatusCode::CREATED, Json(receipt)))
}

async fn resolve_attempt(headers: &HeaderMap, session: &Session) -> Result<CheckoutAttempt> {
    if let Some(value) = headers.get(IDEMPOTENCY_KEY_HEADER) {
        let key = value
            .to_str()
            .ok()
            .and_then(|v| Uuid::parse_str(v.trim()).ok())
            .ok_or_else(|| AppError::BadRequest("Idempotency-Key must be a UUID".to_string()))?;
        return Ok(CheckoutAttempt::from_key(key));
    }

    if let Some(attempt) = session
        .get::<CheckoutAttempt>(session_keys::CHECKOUT_ATTEMPT)
        .await?
    {
        return Ok(attempt);
    }

    let attempt = CheckoutAttempt::new();
    session
        .insert(session_keys::CHECKOUT_ATTEMPT, attempt)
        .await?;
    Ok(attempt)
}
