//! Order progress tracking and status changes.
//!
//! [`track`] projects an order's status and history onto the five fulfilment
//! steps. It is pure; [`OrderStatusTracker`] adds the repository lookup.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use tracing::{info, instrument};

use souq_core::{CustomerId, OrderStatus, StatusTransitionError};

use crate::db::{OrderRepository, RepositoryError};
use crate::models::{Order, OrderLookup, OrderNumber};

/// Errors from order lookups and status changes.
#[derive(Debug, Error)]
pub enum TrackingError {
    /// No order matches the reference.
    #[error("order not found")]
    NotFound,

    /// The lifecycle does not allow the requested change.
    #[error(transparent)]
    InvalidTransition(#[from] StatusTransitionError),

    /// Repository/database error.
    #[error("database error: {0}")]
    Repository(RepositoryError),
}

impl From<RepositoryError> for TrackingError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::NotFound => Self::NotFound,
            RepositoryError::InvalidTransition(e) => Self::InvalidTransition(e),
            other => Self::Repository(other),
        }
    }
}

/// Display state of one step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StepState {
    Completed,
    Current,
    Pending,
}

/// One step of the progress view.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TrackerStep {
    /// Status the step stands for.
    pub status: OrderStatus,
    /// How to display it.
    pub state: StepState,
    /// When the order first entered this status, if it did.
    pub reached_at: Option<DateTime<Utc>>,
}

/// Progress view of an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TrackerView {
    /// Order reference.
    pub order_number: OrderNumber,
    /// Current status.
    pub status: OrderStatus,
    /// Fulfilment steps, plus a trailing `cancelled` step for cancelled orders.
    pub steps: Vec<TrackerStep>,
}

/// Project an order onto the fulfilment steps.
///
/// - Delivered: all five steps completed.
/// - Cancelled: steps up to the furthest status reached before cancelling are
///   completed, the rest pending, and a `cancelled` step is appended as
///   current.
/// - Otherwise: earlier steps completed, the current status current, later
///   steps pending. Exactly one step is current.
#[must_use]
pub fn track(order: &Order) -> TrackerView {
    let reached_at = |status: OrderStatus| {
        order
            .status_history
            .iter()
            .find(|change| change.status == status)
            .map(|change| change.changed_at)
    };

    let step = |status: OrderStatus, state: StepState| TrackerStep {
        status,
        state,
        reached_at: reached_at(status),
    };

    let mut steps: Vec<TrackerStep> = match order.status.step_index() {
        Some(current) => OrderStatus::PROGRESSION
            .iter()
            .enumerate()
            .map(|(index, &status)| {
                let state = if index < current || order.status == OrderStatus::Delivered {
                    StepState::Completed
                } else if index == current {
                    StepState::Current
                } else {
                    StepState::Pending
                };
                step(status, state)
            })
            .collect(),
        None => {
            let furthest = order
                .status_history
                .iter()
                .filter_map(|change| change.status.step_index())
                .max()
                .unwrap_or(0);
            OrderStatus::PROGRESSION
                .iter()
                .enumerate()
                .map(|(index, &status)| {
                    let state = if index <= furthest {
                        StepState::Completed
                    } else {
                        StepState::Pending
                    };
                    step(status, state)
                })
                .collect()
        }
    };

    if order.status == OrderStatus::Cancelled {
        steps.push(step(OrderStatus::Cancelled, StepState::Current));
    }

    TrackerView {
        order_number: order.number.clone(),
        status: order.status,
        steps,
    }
}

/// Looks up orders for tracking pages.
#[derive(Clone)]
pub struct OrderStatusTracker {
    orders: Arc<dyn OrderRepository>,
}

impl OrderStatusTracker {
    /// Create a tracker.
    #[must_use]
    pub fn new(orders: Arc<dyn OrderRepository>) -> Self {
        Self { orders }
    }

    /// Find an order by ID or order number and project its progress.
    ///
    /// # Errors
    ///
    /// Returns `TrackingError::NotFound` for blank or unknown references.
    #[instrument(skip(self))]
    pub async fn track_order(&self, reference: &str) -> Result<(Order, TrackerView), TrackingError> {
        let lookup = OrderLookup::parse(reference).ok_or(TrackingError::NotFound)?;
        let order = self.orders.get_order(&lookup).await?;
        let view = track(&order);
        Ok((order, view))
    }

    /// Like [`Self::track_order`], on behalf of a storefront visitor.
    ///
    /// Order numbers are open to anyone. A numeric ID only finds the order
    /// when `viewer` is the customer who placed it; every other case reports
    /// `NotFound`, so IDs cannot be walked.
    ///
    /// # Errors
    ///
    /// Returns `TrackingError::NotFound` for blank or unknown references and
    /// for IDs of orders the viewer does not own.
    #[instrument(skip(self))]
    pub async fn track_for(
        &self,
        reference: &str,
        viewer: Option<CustomerId>,
    ) -> Result<(Order, TrackerView), TrackingError> {
        let lookup = OrderLookup::parse(reference).ok_or(TrackingError::NotFound)?;
        if matches!(lookup, OrderLookup::Id(_)) && viewer.is_none() {
            return Err(TrackingError::NotFound);
        }
        let order = self.orders.get_order(&lookup).await?;
        if matches!(lookup, OrderLookup::Id(_)) && viewer != Some(order.customer_id) {
            return Err(TrackingError::NotFound);
        }
        let view = track(&order);
        Ok((order, view))
    }
}

/// Applies status changes to stored orders.
#[derive(Clone)]
pub struct OrderLifecycle {
    orders: Arc<dyn OrderRepository>,
}

impl OrderLifecycle {
    /// Create a lifecycle service.
    #[must_use]
    pub fn new(orders: Arc<dyn OrderRepository>) -> Self {
        Self { orders }
    }

    /// Move an order to `status` and return it as stored afterwards.
    ///
    /// # Errors
    ///
    /// Returns `TrackingError::NotFound` for unknown orders and
    /// `TrackingError::InvalidTransition` if the lifecycle forbids the change.
    #[instrument(skip(self), fields(status = %status))]
    pub async fn transition(
        &self,
        reference: &str,
        status: OrderStatus,
    ) -> Result<Order, TrackingError> {
        let lookup = OrderLookup::parse(reference).ok_or(TrackingError::NotFound)?;
        let order = self.orders.get_order(&lookup).await?;
        self.orders.update_order_status(order.id, status).await?;
        info!(order_id = %order.id, from = %order.status, to = %status, "Order status updated");
        Ok(self.orders.get_order(&OrderLookup::Id(order.id)).await?)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::Duration;
    use uuid::Uuid;

    use souq_core::{CurrencyCode, CustomerId, OrderId, PaymentMethod, PhoneFormat, PhoneNumber, Price};

    use super::*;
    use crate::db::MemoryOrderRepository;
    use crate::models::{DeliveryContact, NewOrder, ShippingDestination, StatusChange};

    fn order_with(history: &[OrderStatus]) -> Order {
        let start = Utc::now();
        let status_history: Vec<StatusChange> = history
            .iter()
            .zip(0i64..)
            .map(|(&status, minutes)| StatusChange {
                status,
                changed_at: start + Duration::minutes(minutes),
            })
            .collect();
        Order {
            id: OrderId::new(1),
            number: OrderNumber::from_stored("ORD-0000BEEF".to_owned()),
            customer_id: CustomerId::new(1),
            line_items: Vec::new(),
            subtotal: Price::from_units(500),
            shipping_cost: Price::from_units(50),
            total: Price::from_units(550),
            currency: CurrencyCode::EGP,
            payment_method: PaymentMethod::CashOnDelivery,
            contact: DeliveryContact {
                name: "Nour".to_owned(),
                phone: PhoneNumber::parse("01234567890", &PhoneFormat::default()).unwrap(),
                destination: ShippingDestination {
                    region: "Giza".to_owned(),
                    city: "Dokki".to_owned(),
                    address: "5 Mesaha Sq".to_owned(),
                },
            },
            status: history.last().copied().unwrap_or_default(),
            created_at: start,
            status_history,
        }
    }

    fn states(view: &TrackerView) -> Vec<(OrderStatus, StepState)> {
        view.steps.iter().map(|s| (s.status, s.state)).collect()
    }

    #[test]
    fn test_shipped_order() {
        let view = track(&order_with(&[
            OrderStatus::Pending,
            OrderStatus::Processing,
            OrderStatus::Confirmed,
            OrderStatus::Shipped,
        ]));
        assert_eq!(
            states(&view),
            [
                (OrderStatus::Pending, StepState::Completed),
                (OrderStatus::Processing, StepState::Completed),
                (OrderStatus::Confirmed, StepState::Completed),
                (OrderStatus::Shipped, StepState::Current),
                (OrderStatus::Delivered, StepState::Pending),
            ]
        );
        assert!(view.steps[3].reached_at.is_some());
        assert!(view.steps[4].reached_at.is_none());
    }

    #[test]
    fn test_exactly_one_current_while_in_progress() {
        for (index, status) in OrderStatus::PROGRESSION.iter().enumerate().take(4) {
            let history = &OrderStatus::PROGRESSION[..=index];
            let view = track(&order_with(history));
            let current: Vec<_> = view
                .steps
                .iter()
                .filter(|s| s.state == StepState::Current)
                .collect();
            assert_eq!(current.len(), 1, "{status}");
            assert_eq!(current[0].status, *status);
            assert_eq!(view.steps.len(), 5);
        }
    }

    #[test]
    fn test_delivered_all_completed() {
        let view = track(&order_with(&OrderStatus::PROGRESSION));
        assert_eq!(view.steps.len(), 5);
        assert!(view.steps.iter().all(|s| s.state == StepState::Completed));
    }

    #[test]
    fn test_skipped_steps_complete_without_timestamp() {
        let view = track(&order_with(&[OrderStatus::Pending, OrderStatus::Shipped]));
        assert_eq!(view.steps[1].state, StepState::Completed);
        assert!(view.steps[1].reached_at.is_none());
        assert_eq!(view.steps[3].state, StepState::Current);
    }

    #[test]
    fn test_cancelled_appends_marker() {
        let view = track(&order_with(&[
            OrderStatus::Pending,
            OrderStatus::Processing,
            OrderStatus::Cancelled,
        ]));
        assert_eq!(
            states(&view),
            [
                (OrderStatus::Pending, StepState::Completed),
                (OrderStatus::Processing, StepState::Completed),
                (OrderStatus::Confirmed, StepState::Pending),
                (OrderStatus::Shipped, StepState::Pending),
                (OrderStatus::Delivered, StepState::Pending),
                (OrderStatus::Cancelled, StepState::Current),
            ]
        );
    }

    #[test]
    fn test_cancelled_without_history() {
        let mut order = order_with(&[]);
        order.status = OrderStatus::Cancelled;
        let view = track(&order);
        assert_eq!(view.steps.len(), 6);
        assert_eq!(view.steps[0].state, StepState::Completed);
        assert_eq!(view.steps[5].state, StepState::Current);
    }

    async fn stored_order(repo: &MemoryOrderRepository) -> Order {
        let key = Uuid::new_v4();
        let template = order_with(&[]);
        let id = repo
            .create_order(NewOrder {
                idempotency_key: key,
                number: OrderNumber::generate(),
                customer_id: template.customer_id,
                line_items: template.line_items,
                subtotal: template.subtotal,
                shipping_cost: template.shipping_cost,
                total: template.total,
                currency: template.currency,
                payment_method: template.payment_method,
                contact: template.contact,
            })
            .await
            .unwrap();
        repo.get_order(&OrderLookup::Id(id)).await.unwrap()
    }

    #[tokio::test]
    async fn test_track_order_by_number_and_id() {
        let repo = MemoryOrderRepository::new();
        let order = stored_order(&repo).await;
        let tracker = OrderStatusTracker::new(Arc::new(repo));

        let (found, view) = tracker
            .track_order(&order.number.as_str().to_lowercase())
            .await
            .unwrap();
        assert_eq!(found.id, order.id);
        assert_eq!(view.steps[0].state, StepState::Current);

        let (found, _) = tracker.track_order(&order.id.to_string()).await.unwrap();
        assert_eq!(found.number, order.number);
    }

    #[tokio::test]
    async fn test_unknown_reference_not_found() {
        let tracker = OrderStatusTracker::new(Arc::new(MemoryOrderRepository::new()));
        for reference in ["ORD-NOPE", "999", "  "] {
            assert!(matches!(
                tracker.track_order(reference).await,
                Err(TrackingError::NotFound)
            ));
        }
    }

    #[tokio::test]
    async fn test_visitor_tracking_by_id_needs_owner() {
        let repo = MemoryOrderRepository::new();
        let order = stored_order(&repo).await;
        let tracker = OrderStatusTracker::new(Arc::new(repo));
        let id = order.id.to_string();

        let (found, _) = tracker.track_for(order.number.as_str(), None).await.unwrap();
        assert_eq!(found.id, order.id);

        for viewer in [None, Some(CustomerId::new(2))] {
            assert!(matches!(
                tracker.track_for(&id, viewer).await,
                Err(TrackingError::NotFound)
            ));
        }

        let (found, _) = tracker
            .track_for(&id, Some(order.customer_id))
            .await
            .unwrap();
        assert_eq!(found.number, order.number);
    }

    #[tokio::test]
    async fn test_lifecycle_transitions() {
        let repo = MemoryOrderRepository::new();
        let order = stored_order(&repo).await;
        let lifecycle = OrderLifecycle::new(Arc::new(repo));
        let reference = order.number.as_str();

        let shipped = lifecycle.transition(reference, OrderStatus::Shipped).await.unwrap();
        assert_eq!(shipped.status, OrderStatus::Shipped);
        assert_eq!(shipped.status_history.len(), 2);

        assert!(matches!(
            lifecycle.transition(reference, OrderStatus::Processing).await,
            Err(TrackingError::InvalidTransition(_))
        ));

        let cancelled = lifecycle.transition(reference, OrderStatus::Cancelled).await.unwrap();
        let view = track(&cancelled);
        assert_eq!(view.steps[3].state, StepState::Completed);
        assert_eq!(view.steps.last().unwrap().status, OrderStatus::Cancelled);
    }
}
