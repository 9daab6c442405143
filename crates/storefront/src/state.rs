//! Application state shared across handlers.

use std::sync::Arc;

use sqlx::PgPool;

use crate::config::StorefrontConfig;
use crate::db::{
    CustomerRepository, OrderRepository, PgCustomerRepository, PgOrderRepository,
    PgProductCatalog, ProductCatalog,
};
use crate::pricing::ShippingRateTable;
use crate::services::{AuthService, CheckoutOrchestrator, OrderStatusTracker};

/// Collaborators the storefront reads and writes through.
#[derive(Clone)]
pub struct Repositories {
    /// Order store.
    pub orders: Arc<dyn OrderRepository>,
    /// Customer store.
    pub customers: Arc<dyn CustomerRepository>,
    /// Product catalog.
    pub catalog: Arc<dyn ProductCatalog>,
}

impl Repositories {
    /// `PostgreSQL`-backed repositories sharing one pool.
    #[must_use]
    pub fn postgres(pool: &PgPool) -> Self {
        Self {
            orders: Arc::new(PgOrderRepository::new(pool.clone())),
            customers: Arc::new(PgCustomerRepository::new(pool.clone())),
            catalog: Arc::new(PgProductCatalog::new(pool.clone())),
        }
    }
}

/// Application state shared across all handlers.
///
/// This struct is cheaply cloneable via `Arc` and provides access to
/// shared resources like repositories, services and configuration.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: StorefrontConfig,
    repositories: Repositories,
    checkout: CheckoutOrchestrator,
    tracker: OrderStatusTracker,
    auth: AuthService,
}

impl AppState {
    /// Create application state backed by `PostgreSQL`.
    ///
    /// # Arguments
    ///
    /// * `config` - Storefront configuration
    /// * `pool` - `PostgreSQL` connection pool
    /// * `rates` - Shipping rate table
    #[must_use]
    pub fn new(config: StorefrontConfig, pool: &PgPool, rates: ShippingRateTable) -> Self {
        Self::with_repositories(config, Repositories::postgres(pool), rates)
    }

    /// Create application state over arbitrary repositories.
    #[must_use]
    pub fn with_repositories(
        config: StorefrontConfig,
        repositories: Repositories,
        rates: ShippingRateTable,
    ) -> Self {
        let checkout = CheckoutOrchestrator::new(
            Arc::clone(&repositories.orders),
            Arc::clone(&repositories.customers),
            Arc::new(rates),
            config.checkout.settings(),
        );
        let tracker = OrderStatusTracker::new(Arc::clone(&repositories.orders));
        let auth = AuthService::new(Arc::clone(&repositories.customers));

        Self {
            inner: Arc::new(AppStateInner {
                config,
                repositories,
                checkout,
                tracker,
                auth,
            }),
        }
    }

    /// Get a reference to the storefront configuration.
    #[must_use]
    pub fn config(&self) -> &StorefrontConfig {
        &self.inner.config
    }

    /// Get a reference to the order repository.
    #[must_use]
    pub fn orders(&self) -> &dyn OrderRepository {
        self.inner.repositories.orders.as_ref()
    }

    /// Get a reference to the product catalog.
    #[must_use]
    pub fn catalog(&self) -> &dyn ProductCatalog {
        self.inner.repositories.catalog.as_ref()
    }

    /// Get a reference to the checkout orchestrator.
    #[must_use]
    pub fn checkout(&self) -> &CheckoutOrchestrator {
        &self.inner.checkout
    }

    /// Get a reference to the order tracker.
    #[must_use]
    pub fn tracker(&self) -> &OrderStatusTracker {
        &self.inner.tracker
    }

    /// Get a reference to the authentication service.
    #[must_use]
    pub fn auth(&self) -> &AuthService {
        &self.inner.auth
    }
}
