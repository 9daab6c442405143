//! Order tracking handlers.

use axum::{
    Json,
    extract::{Path, State},
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::instrument;

use souq_core::{CurrencyCode, OrderId, OrderStatus, PaymentMethod, Price};

use crate::error::Result;
use crate::middleware::OptionalAuth;
use crate::models::{LineItem, Order, OrderNumber};
use crate::services::TrackerView;
use crate::state::AppState;

/// Order as returned to the client. Contact details are left out.
#[derive(Debug, Serialize)]
pub struct OrderSummary {
    pub id: OrderId,
    pub number: OrderNumber,
    pub status: OrderStatus,
    pub line_items: Vec<LineItem>,
    pub subtotal: Price,
    pub shipping_cost: Price,
    pub total: Price,
    pub currency: CurrencyCode,
    pub payment_method: PaymentMethod,
    pub created_at: DateTime<Utc>,
}

impl From<Order> for OrderSummary {
    fn from(order: Order) -> Self {
        Self {
            id: order.id,
            number: order.number,
            status: order.status,
            line_items: order.line_items,
            subtotal: order.subtotal,
            shipping_cost: order.shipping_cost,
            total: order.total,
            currency: order.currency,
            payment_method: order.payment_method,
            created_at: order.created_at,
        }
    }
}

/// Tracking response.
#[derive(Debug, Serialize)]
pub struct TrackResponse {
    pub order: OrderSummary,
    pub tracker: TrackerView,
}

/// Track an order.
///
/// Anyone may track by order number. Numeric IDs are only answered for the
/// signed-in customer who placed the order.
#[instrument(skip(state, viewer))]
pub async fn track(
    State(state): State<AppState>,
    OptionalAuth(viewer): OptionalAuth,
    Path(reference): Path<String>,
) -> Result<Json<TrackResponse>> {
    let (order, tracker) = state
        .tracker()
        .track_for(&reference, viewer.map(|customer| customer.id))
        .await?;
    Ok(Json(TrackResponse {
        order: order.into(),
        tracker,
    }))
}
