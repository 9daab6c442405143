//! Guest account provisioning.
//!
//! Buyers who check out without signing in get a customer record created on
//! the fly. An email that already belongs to a customer is never reused or
//! overwritten; the buyer is sent to sign in instead.

use std::sync::Arc;

use thiserror::Error;
use tracing::{info, instrument};

use souq_core::{Email, PhoneNumber};

use super::auth::{self, AuthError};
use crate::db::{CustomerRepository, RepositoryError};
use crate::models::{Customer, NewCustomer};

/// Errors from [`GuestAccountProvisioner::provision`].
#[derive(Debug, Error)]
pub enum ProvisionError {
    /// A customer with this email already exists.
    #[error("an account already exists for {email}")]
    DuplicateAccount {
        /// The email that is taken.
        email: Email,
    },

    /// The optional password does not meet requirements.
    #[error("{0}")]
    WeakPassword(String),

    /// The password could not be hashed.
    #[error("password hashing error")]
    PasswordHash,

    /// Repository/database error.
    #[error("database error: {0}")]
    Repository(#[from] RepositoryError),
}

impl From<AuthError> for ProvisionError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::WeakPassword(message) => Self::WeakPassword(message),
            AuthError::Repository(e) => Self::Repository(e),
            AuthError::InvalidEmail(_) | AuthError::InvalidCredentials | AuthError::PasswordHash => {
                Self::PasswordHash
            }
        }
    }
}

/// Details collected from a guest at checkout.
#[derive(Debug, Clone)]
pub struct GuestDetails {
    /// Email to create the account under.
    pub email: Email,
    /// Display name.
    pub name: String,
    /// Contact phone.
    pub phone: Option<PhoneNumber>,
    /// Optional password for signing in later.
    pub password: Option<String>,
}

/// Creates customer records for unauthenticated buyers.
#[derive(Clone)]
pub struct GuestAccountProvisioner {
    customers: Arc<dyn CustomerRepository>,
}

impl GuestAccountProvisioner {
    /// Create a provisioner over a customer repository.
    #[must_use]
    pub fn new(customers: Arc<dyn CustomerRepository>) -> Self {
        Self { customers }
    }

    /// Whether a customer already uses `email` (case-insensitive).
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError` if the lookup fails.
    pub async fn email_exists(&self, email: &Email) -> Result<bool, RepositoryError> {
        Ok(self.customers.find_by_email(email).await?.is_some())
    }

    /// Create a customer for a guest.
    ///
    /// # Errors
    ///
    /// Returns `ProvisionError::DuplicateAccount` if the email is taken, also
    /// when another request claims it between the check and the insert.
    /// Returns `ProvisionError::WeakPassword` if a password was given but is
    /// too short.
    #[instrument(skip(self, details), fields(email = %details.email))]
    pub async fn provision(&self, details: GuestDetails) -> Result<Customer, ProvisionError> {
        if self.email_exists(&details.email).await? {
            return Err(ProvisionError::DuplicateAccount {
                email: details.email,
            });
        }

        let password_hash = match details.password.as_deref() {
            Some(password) => {
                auth::validate_password(password)?;
                Some(auth::hash_password(password)?)
            }
            None => None,
        };

        let email = details.email.clone();
        let customer = self
            .customers
            .create_customer(NewCustomer {
                email: details.email,
                name: details.name,
                phone: details.phone,
                password_hash,
            })
            .await
            .map_err(|e| match e {
                RepositoryError::Conflict(_) => ProvisionError::DuplicateAccount { email },
                other => ProvisionError::Repository(other),
            })?;

        info!(customer_id = %customer.id, "Guest account provisioned");
        Ok(customer)
    }
}
