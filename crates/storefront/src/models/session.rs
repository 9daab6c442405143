//! Session-related types.
//!
//! Types stored in the session for identity and checkout state.

use serde::{Deserialize, Serialize};

use souq_core::{CustomerId, Email};

/// Session-stored customer identity.
///
/// Minimal data stored in the session to identify the buyer, whether they
/// signed in or were provisioned during guest checkout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurrentCustomer {
    /// Customer's database ID.
    pub id: CustomerId,
    /// Customer's email address.
    pub email: Email,
    /// Customer's display name.
    pub name: String,
}

/// Session keys.
pub mod keys {
    /// Key for storing the current customer.
    pub const CURRENT_CUSTOMER: &str = "current_customer";

    /// Key for storing the cart.
    pub const CART: &str = "cart";

    /// Key for the idempotency key of the checkout attempt in progress.
    pub const CHECKOUT_ATTEMPT: &str = "checkout_attempt";
}
