//! Account route handlers.

use axum::{Json, extract::State};
use tracing::instrument;

use crate::error::Result;
use crate::middleware::RequireAuth;
use crate::routes::orders::OrderSummary;
use crate::state::AppState;

/// Order history of the signed-in customer, newest first.
#[instrument(skip_all, fields(customer_id = %customer.id))]
pub async fn orders(
    State(state): State<AppState>,
    RequireAuth(customer): RequireAuth,
) -> Result<Json<Vec<OrderSummary>>> {
    let orders = state.orders().list_orders(customer.id).await?;
    Ok(Json(orders.into_iter().map(OrderSummary::from).collect()))
}
