//! Shared fixtures for Souq integration tests.
//!
//! # Running Tests
//!
//! ```bash
//! # In-process tests (no external services)
//! cargo test -p souq-integration-tests
//!
//! # Including the PostgreSQL tests
//! STOREFRONT_DATABASE_URL=postgres://... cargo test -p souq-integration-tests -- --include-ignored
//! ```
//!
//! # Test Categories
//!
//! - `checkout_flow` - Checkout, pricing and tracking through the library API
//! - `http_api` - The JSON router driven in-process with a memory session store
//! - `postgres_orders` - Order repository against a real database (ignored by default)

use std::net::{IpAddr, Ipv4Addr};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use axum::Router;
use secrecy::SecretString;
use tower_sessions::MemoryStore;

use souq_core::{CustomerId, OrderId, OrderStatus, Price, ProductId};
use souq_storefront::config::{CheckoutConfig, SentryConfig, StorefrontConfig};
use souq_storefront::db::{
    MemoryCatalog, MemoryCustomerRepository, MemoryOrderRepository, OrderRepository,
    RepositoryError,
};
use souq_storefront::middleware::session;
use souq_storefront::models::{NewOrder, Order, OrderLookup, Product};
use souq_storefront::pricing::ShippingRateTable;
use souq_storefront::routes;
use souq_storefront::services::CheckoutForm;
use souq_storefront::state::{AppState, Repositories};

/// Rates used throughout the tests.
pub const RATES_YAML: &str = "\
Cairo:
  base_rate: 50
  free_shipping_threshold: 1000
Alexandria:
  base_rate: 65
  free_shipping_threshold: 1500
";

/// A storefront wired to in-memory collaborators.
pub struct TestStore {
    pub state: AppState,
    pub orders: Arc<MemoryOrderRepository>,
    pub customers: Arc<MemoryCustomerRepository>,
    pub catalog: Arc<MemoryCatalog>,
}

impl TestStore {
    /// Store with the default catalog: `r1` at 300 and `r2` at 200.
    ///
    /// # Panics
    ///
    /// Panics if the built-in rate table does not parse.
    #[must_use]
    pub fn new() -> Self {
        Self::with_products([product("r1", 300), product("r2", 200)])
    }

    /// Store with the given catalog.
    ///
    /// # Panics
    ///
    /// Panics if the built-in rate table does not parse.
    #[must_use]
    pub fn with_products(products: impl IntoIterator<Item = Product>) -> Self {
        Self::with_order_store(products, |orders| orders as Arc<dyn OrderRepository>)
    }

    /// Store whose order repository is `front`, built over the memory
    /// repository that [`Self::orders`] exposes.
    ///
    /// # Panics
    ///
    /// Panics if the built-in rate table does not parse.
    #[must_use]
    pub fn with_order_store(
        products: impl IntoIterator<Item = Product>,
        front: impl FnOnce(Arc<MemoryOrderRepository>) -> Arc<dyn OrderRepository>,
    ) -> Self {
        let orders = Arc::new(MemoryOrderRepository::new());
        let customers = Arc::new(MemoryCustomerRepository::new());
        let catalog = Arc::new(MemoryCatalog::with_products(products));
        let repositories = Repositories {
            orders: front(orders.clone()),
            customers: customers.clone(),
            catalog: catalog.clone(),
        };
        let state = AppState::with_repositories(config(), repositories, rates());

        Self {
            state,
            orders,
            customers,
            catalog,
        }
    }

    /// The storefront router with a memory session store.
    #[must_use]
    pub fn app(&self) -> Router {
        routes::routes()
            .layer(session::configure(MemoryStore::default(), false))
            .with_state(self.state.clone())
    }
}

impl Default for TestStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Order repository whose `create_order` can be made to fail.
#[derive(Debug, Default)]
pub struct FlakyOrders {
    inner: Arc<MemoryOrderRepository>,
    down: AtomicBool,
    lose_replies: AtomicBool,
}

impl FlakyOrders {
    /// A healthy store over `inner`.
    #[must_use]
    pub fn new(inner: Arc<MemoryOrderRepository>) -> Self {
        Self {
            inner,
            down: AtomicBool::new(false),
            lose_replies: AtomicBool::new(false),
        }
    }

    /// Fail every create before anything is written.
    pub fn set_down(&self, down: bool) {
        self.down.store(down, Ordering::SeqCst);
    }

    /// Write every create, then fail as if the reply never arrived.
    pub fn set_lose_replies(&self, lose: bool) {
        self.lose_replies.store(lose, Ordering::SeqCst);
    }
}

#[async_trait]
impl OrderRepository for FlakyOrders {
    async fn create_order(&self, order: NewOrder) -> Result<OrderId, RepositoryError> {
        if self.down.load(Ordering::SeqCst) {
            return Err(RepositoryError::Unavailable("connection refused".to_string()));
        }
        let id = self.inner.create_order(order).await?;
        if self.lose_replies.load(Ordering::SeqCst) {
            return Err(RepositoryError::Unavailable("connection reset".to_string()));
        }
        Ok(id)
    }

    async fn get_order(&self, lookup: &OrderLookup) -> Result<Order, RepositoryError> {
        self.inner.get_order(lookup).await
    }

    async fn update_order_status(
        &self,
        id: OrderId,
        status: OrderStatus,
    ) -> Result<(), RepositoryError> {
        self.inner.update_order_status(id, status).await
    }

    async fn list_orders(&self, customer_id: CustomerId) -> Result<Vec<Order>, RepositoryError> {
        self.inner.list_orders(customer_id).await
    }
}

/// The test rate table.
///
/// # Panics
///
/// Panics if [`RATES_YAML`] does not parse.
#[must_use]
#[allow(clippy::unwrap_used)]
pub fn rates() -> ShippingRateTable {
    ShippingRateTable::from_yaml_str(RATES_YAML).unwrap()
}

/// Configuration with fast retries so failure tests stay quick.
#[must_use]
pub fn config() -> StorefrontConfig {
    StorefrontConfig {
        database_url: SecretString::from("postgres://unused"),
        host: IpAddr::V4(Ipv4Addr::LOCALHOST),
        port: 3000,
        base_url: "http://localhost:3000".to_string(),
        session_secret: SecretString::from("test-secret-test-secret-test-secret"),
        shipping_rates_path: PathBuf::from("unused.yaml"),
        checkout: CheckoutConfig {
            retry_backoff: std::time::Duration::from_millis(1),
            ..CheckoutConfig::default()
        },
        sentry: SentryConfig::default(),
    }
}

/// An available product.
#[must_use]
pub fn product(id: &str, price: u32) -> Product {
    Product {
        id: ProductId::from(id),
        name: format!("Product {id}"),
        price: Price::from_units(price),
        image: Some(format!("/images/{id}.jpg")),
        available: true,
    }
}

/// A valid checkout form for Cairo.
#[must_use]
pub fn checkout_form(email: &str) -> CheckoutForm {
    CheckoutForm {
        name: "Mona Adel".to_string(),
        email: email.to_string(),
        phone: "01012345678".to_string(),
        address: "12 Tahrir St".to_string(),
        city: "Cairo".to_string(),
        region: "Cairo".to_string(),
        ..CheckoutForm::default()
    }
}
