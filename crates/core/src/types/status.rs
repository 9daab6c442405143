//! Status enums for orders.

use serde::{Deserialize, Serialize};

/// Error returned when an order status change breaks the lifecycle rules.
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusTransitionError {
    /// The order already reached `delivered` or `cancelled`.
    #[error("order is {from} and can no longer change")]
    Terminal {
        /// Current (terminal) status.
        from: OrderStatus,
    },
    /// The new status lies before the current one in the fulfilment sequence.
    #[error("order cannot move back from {from} to {to}")]
    Backwards {
        /// Current status.
        from: OrderStatus,
        /// Requested status.
        to: OrderStatus,
    },
}

/// Order lifecycle status.
///
/// The fulfilment sequence is `pending → processing → confirmed → shipped →
/// delivered`. Status only ever moves forward along it (steps may be
/// skipped), except that any non-terminal order may be cancelled.
/// `delivered` and `cancelled` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[cfg_attr(feature = "postgres", derive(sqlx::Type))]
#[cfg_attr(
    feature = "postgres",
    sqlx(type_name = "storefront.order_status", rename_all = "snake_case")
)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    #[default]
    Pending,
    Processing,
    Confirmed,
    Shipped,
    Delivered,
    Cancelled,
}

impl OrderStatus {
    /// The fulfilment sequence, in order. `Cancelled` is not part of it.
    pub const PROGRESSION: [Self; 5] = [
        Self::Pending,
        Self::Processing,
        Self::Confirmed,
        Self::Shipped,
        Self::Delivered,
    ];

    /// Position in [`Self::PROGRESSION`], `None` for `Cancelled`.
    #[must_use]
    pub const fn step_index(self) -> Option<usize> {
        match self {
            Self::Pending => Some(0),
            Self::Processing => Some(1),
            Self::Confirmed => Some(2),
            Self::Shipped => Some(3),
            Self::Delivered => Some(4),
            Self::Cancelled => None,
        }
    }

    /// Whether no further transition is possible.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Delivered | Self::Cancelled)
    }

    /// Check that moving from `self` to `next` respects the lifecycle.
    ///
    /// Re-applying the current status is accepted as a no-op.
    ///
    /// # Errors
    ///
    /// Returns `StatusTransitionError::Terminal` if `self` is terminal, or
    /// `StatusTransitionError::Backwards` if `next` precedes `self`.
    pub fn check_transition(self, next: Self) -> Result<(), StatusTransitionError> {
        if self == next {
            return Ok(());
        }
        if self.is_terminal() {
            return Err(StatusTransitionError::Terminal { from: self });
        }
        match (self.step_index(), next.step_index()) {
            (_, None) => Ok(()),
            (Some(from), Some(to)) if to > from => Ok(()),
            _ => Err(StatusTransitionError::Backwards {
                from: self,
                to: next,
            }),
        }
    }

    /// The `snake_case` wire name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Confirmed => "confirmed",
            Self::Shipped => "shipped",
            Self::Delivered => "delivered",
            Self::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for OrderStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "processing" => Ok(Self::Processing),
            "confirmed" => Ok(Self::Confirmed),
            "shipped" => Ok(Self::Shipped),
            "delivered" => Ok(Self::Delivered),
            "cancelled" => Ok(Self::Cancelled),
            _ => Err(format!("invalid order status: {s}")),
        }
    }
}

/// How the buyer pays. Collection itself happens outside this system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[cfg_attr(feature = "postgres", derive(sqlx::Type))]
#[cfg_attr(
    feature = "postgres",
    sqlx(type_name = "storefront.payment_method", rename_all = "snake_case")
)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    /// Cash handed to the courier.
    #[default]
    CashOnDelivery,
    /// Card payment on the courier's terminal.
    CardOnDelivery,
    /// Bank or wallet transfer before dispatch.
    BankTransfer,
}

impl std::fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::CashOnDelivery => write!(f, "cash_on_delivery"),
            Self::CardOnDelivery => write!(f, "card_on_delivery"),
            Self::BankTransfer => write!(f, "bank_transfer"),
        }
    }
}
