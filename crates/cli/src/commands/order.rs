//! Order commands.
//!
//! Status changes go through the same lifecycle checks as the storefront,
//! so an order cannot move backwards or leave a terminal status.

use std::sync::Arc;

use souq_core::OrderStatus;
use souq_storefront::db::PgOrderRepository;
use souq_storefront::services::{OrderLifecycle, OrderStatusTracker, StepState, TrackerView};

use super::{CommandError, connect};

/// Print an order and its progress.
pub async fn show(reference: &str) -> Result<(), CommandError> {
    let orders = Arc::new(PgOrderRepository::new(connect().await?));
    let (order, view) = OrderStatusTracker::new(orders).track_order(reference).await?;

    #[allow(clippy::print_stdout)]
    {
        println!(
            "{} (#{}) {} {} total {}",
            order.number, order.id, order.status, order.currency.code(), order.total
        );
        print_tracker(&view);
    }

    Ok(())
}

/// Move an order to `status`.
pub async fn set_status(reference: &str, status: OrderStatus) -> Result<(), CommandError> {
    let orders = Arc::new(PgOrderRepository::new(connect().await?));
    let order = OrderLifecycle::new(orders).transition(reference, status).await?;

    tracing::info!(order_number = %order.number, status = %order.status, "Order updated");
    Ok(())
}

#[allow(clippy::print_stdout)]
fn print_tracker(view: &TrackerView) {
    for step in &view.steps {
        let marker = match step.state {
            StepState::Completed => "x",
            StepState::Current => ">",
            StepState::Pending => " ",
        };
        match step.reached_at {
            Some(at) => println!("  [{marker}] {} ({})", step.status, at.to_rfc3339()),
            None => println!("  [{marker}] {}", step.status),
        }
    }
}
