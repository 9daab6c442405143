//! Persistence for the storefront.
//!
//! # Database: `souq_storefront`
//!
//! ## Tables (schema `storefront`)
//!
//! - `customer` / `customer_password` - Buyers and optional password hashes
//! - `product` - Catalog, read-only from this service
//! - `customer_order` - Orders with their delivery contact
//! - `order_line_item` - Price-and-quantity snapshots
//! - `order_status_history` - Append-only status transitions
//! - `tower_sessions.session` - Session storage (carts live here)
//!
//! Business code talks to the collaborator traits below; the `PostgreSQL`
//! implementations live in the submodules and [`memory`] provides in-process
//! implementations for tests and local runs.
//!
//! # Migrations
//!
//! Migrations are stored in `crates/storefront/migrations/` and run via:
//! ```bash
//! cargo run -p souq-cli -- migrate
//! ```

pub mod customers;
pub mod memory;
pub mod orders;
pub mod products;

use std::time::Duration;

use async_trait::async_trait;
use secrecy::ExposeSecret;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use thiserror::Error;

use souq_core::{CustomerId, Email, OrderId, OrderStatus, ProductId, StatusTransitionError};

use crate::models::{Customer, NewCustomer, NewOrder, Order, OrderLookup, Product};

pub use customers::PgCustomerRepository;
pub use memory::{MemoryCatalog, MemoryCustomerRepository, MemoryOrderRepository};
pub use orders::PgOrderRepository;
pub use products::PgProductCatalog;

/// Errors from repository operations.
#[derive(Debug, Error)]
pub enum RepositoryError {
    /// Database error from sqlx.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Data in the database is corrupted or invalid.
    #[error("data corruption: {0}")]
    DataCorruption(String),

    /// Requested entity was not found.
    #[error("not found")]
    NotFound,

    /// Constraint violation (e.g., unique email).
    #[error("constraint violation: {0}")]
    Conflict(String),

    /// Status change rejected by the order lifecycle.
    #[error("invalid status change: {0}")]
    InvalidTransition(#[from] StatusTransitionError),

    /// Backend could not be reached.
    #[error("backend unavailable: {0}")]
    Unavailable(String),
}

impl RepositoryError {
    /// Whether the failure is about reaching the store rather than the data.
    ///
    /// Transient failures are worth retrying; everything else will fail the
    /// same way again.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Database(err) => matches!(
                err,
                sqlx::Error::Io(_)
                    | sqlx::Error::Tls(_)
                    | sqlx::Error::PoolTimedOut
                    | sqlx::Error::PoolClosed
                    | sqlx::Error::WorkerCrashed
            ),
            Self::Unavailable(_) => true,
            Self::DataCorruption(_)
            | Self::NotFound
            | Self::Conflict(_)
            | Self::InvalidTransition(_) => false,
        }
    }

    /// Map a unique-constraint violation to `Conflict`.
    pub(crate) fn from_insert(err: sqlx::Error, what: &str) -> Self {
        if let sqlx::Error::Database(ref db_err) = err
            && db_err.is_unique_violation()
        {
            return Self::Conflict(format!("{what} already exists"));
        }
        Self::Database(err)
    }
}

/// Persists and retrieves orders and their status history.
#[async_trait]
pub trait OrderRepository: Send + Sync {
    /// Persist a new order with its line items and an initial `pending`
    /// history entry.
    ///
    /// Submitting an order whose idempotency key was already used returns the
    /// existing order's ID and writes nothing.
    async fn create_order(&self, order: NewOrder) -> Result<OrderId, RepositoryError>;

    /// Fetch an order with its full status history.
    ///
    /// Returns `RepositoryError::NotFound` when no order matches.
    async fn get_order(&self, lookup: &OrderLookup) -> Result<Order, RepositoryError>;

    /// Move an order to `status`, appending to its history.
    ///
    /// Returns `RepositoryError::InvalidTransition` if the lifecycle forbids
    /// the change. Re-applying the current status writes nothing.
    async fn update_order_status(
        &self,
        id: OrderId,
        status: OrderStatus,
    ) -> Result<(), RepositoryError>;

    /// All orders of a customer, newest first.
    async fn list_orders(&self, customer_id: CustomerId) -> Result<Vec<Order>, RepositoryError>;

    /// Check that the backend is reachable.
    async fn ping(&self) -> Result<(), RepositoryError> {
        Ok(())
    }
}

/// Looks up and creates customers.
#[async_trait]
pub trait CustomerRepository: Send + Sync {
    /// Find a customer by email (case-insensitive).
    async fn find_by_email(&self, email: &Email) -> Result<Option<Customer>, RepositoryError>;

    /// Create a customer.
    ///
    /// Returns `RepositoryError::Conflict` if the email is already taken.
    async fn create_customer(&self, customer: NewCustomer) -> Result<Customer, RepositoryError>;

    /// A customer together with their password hash, if they set a password.
    async fn password_hash(
        &self,
        email: &Email,
    ) -> Result<Option<(Customer, String)>, RepositoryError>;
}

/// Read-only product catalog.
#[async_trait]
pub trait ProductCatalog: Send + Sync {
    /// Find a product by ID.
    async fn find_product(&self, id: &ProductId) -> Result<Option<Product>, RepositoryError>;
}

/// Create a `PostgreSQL` connection pool with sensible defaults.
///
/// # Arguments
///
/// * `database_url` - `PostgreSQL` connection string (wrapped in `SecretString`)
///
/// # Errors
///
/// Returns `sqlx::Error` if the connection cannot be established.
pub async fn create_pool(database_url: &secrecy::SecretString) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(10)
        .min_connections(2)
        .acquire_timeout(Duration::from_secs(10))
        .connect(database_url.expose_secret())
        .await
}
