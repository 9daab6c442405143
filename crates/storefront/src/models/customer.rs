//! Customer domain types.

use chrono::{DateTime, Utc};

use souq_core::{CustomerId, Email, PhoneNumber};

use super::session::CurrentCustomer;

/// A customer record.
///
/// Created either by the external identity provider or by guest checkout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Customer {
    /// Unique customer ID.
    pub id: CustomerId,
    /// Email address (unique, case-insensitive).
    pub email: Email,
    /// Display name.
    pub name: String,
    /// Contact phone, if known.
    pub phone: Option<PhoneNumber>,
    /// When the customer was created.
    pub created_at: DateTime<Utc>,
}

impl Customer {
    /// The minimal identity kept in the session for this customer.
    #[must_use]
    pub fn session_binding(&self) -> CurrentCustomer {
        CurrentCustomer {
            id: self.id,
            email: self.email.clone(),
            name: self.name.clone(),
        }
    }
}

/// Input for creating a customer.
#[derive(Debug, Clone)]
pub struct NewCustomer {
    /// Email address.
    pub email: Email,
    /// Display name.
    pub name: String,
    /// Contact phone.
    pub phone: Option<PhoneNumber>,
    /// Argon2 PHC string, when the customer chose a password.
    pub password_hash: Option<String>,
}
