//! Checkout orchestration.
//!
//! One checkout attempt runs strictly in sequence:
//!
//! 1. **Validate** the buyer and delivery fields.
//! 2. **Resolve identity**: use the signed-in customer, or provision a guest.
//! 3. **Price** the cart for the destination.
//! 4. **Submit** a snapshot of the cart as a new order.
//! 5. **Finalize**: clear the cart.
//!
//! The cart is cleared only after the order is persisted. Any failure leaves
//! it untouched so the buyer can resubmit.
//!
//! Every attempt carries an idempotency key. Resubmitting the same attempt,
//! whether from a double click or a retry after a timeout, returns the order
//! that was already created instead of creating a second one. The receipt is
//! always built from the stored order. A resubmission whose cart no longer
//! matches that order is rejected and the cart is kept.

mod retry;
mod validation;

pub use retry::{BackoffStrategy, Retryable, StepFailure, StepPolicy, run_step};
pub use validation::{
    CheckoutForm, Field, ValidatedCheckout, ValidationError, ValidationMode, validate,
};

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use souq_core::{CurrencyCode, Email, OrderId, PhoneFormat, Price};

use super::guest::{GuestAccountProvisioner, GuestDetails, ProvisionError};
use crate::cart::{Cart, CartStore};
use crate::db::{CustomerRepository, OrderRepository, RepositoryError};
use crate::models::{
    CurrentCustomer, DeliveryContact, LineItem, NewOrder, Order, OrderLookup, OrderNumber,
    ShippingDestination,
};
use crate::pricing::{self, PricingError, ShippingRateTable, Totals};

/// Errors from [`CheckoutOrchestrator::submit`].
#[derive(Debug, Error)]
pub enum CheckoutError {
    /// The form has fields to correct.
    #[error("invalid checkout details")]
    Validation(Vec<ValidationError>),

    /// The email belongs to an existing account; the buyer must sign in.
    #[error("an account already exists for {email}")]
    DuplicateAccount {
        /// The email that is taken.
        email: Email,
    },

    /// There is nothing to check out.
    #[error("cart is empty")]
    EmptyCart,

    /// The order total is past the largest amount the store records.
    #[error("order total {0} is too large")]
    TotalTooLarge(Price),

    /// The attempt already placed an order with different contents.
    #[error("attempt already placed order {order_number} for a different cart")]
    AttemptMismatch {
        /// Order the attempt placed earlier.
        order_number: OrderNumber,
    },

    /// The store rejected or failed to record the order.
    #[error("failed to save order: {0}")]
    Persistence(String),

    /// The store could not be reached in time.
    #[error("order service unavailable: {0}")]
    Network(String),
}

impl CheckoutError {
    /// Whether resubmitting the same attempt may succeed.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Persistence(_) | Self::Network(_))
    }

    /// Sign-in URL for buyers whose email already has an account.
    #[must_use]
    pub fn sign_in_redirect(&self) -> Option<String> {
        match self {
            Self::DuplicateAccount { email } => Some(format!(
                "/auth/login?email={}",
                urlencoding::encode(email.as_str())
            )),
            _ => None,
        }
    }

    fn field(field: Field, message: impl Into<String>) -> Self {
        Self::Validation(vec![ValidationError::new(field, message)])
    }
}

impl From<StepFailure<RepositoryError>> for CheckoutError {
    fn from(failure: StepFailure<RepositoryError>) -> Self {
        match failure {
            StepFailure::TimedOut(limit) => Self::Network(format!("timed out after {limit:?}")),
            StepFailure::Failed(e) if e.is_transient() => Self::Network(e.to_string()),
            StepFailure::Failed(e) => Self::Persistence(e.to_string()),
        }
    }
}

impl From<StepFailure<ProvisionError>> for CheckoutError {
    fn from(failure: StepFailure<ProvisionError>) -> Self {
        match failure {
            StepFailure::TimedOut(limit) => Self::Network(format!("timed out after {limit:?}")),
            StepFailure::Failed(ProvisionError::DuplicateAccount { email }) => {
                Self::DuplicateAccount { email }
            }
            StepFailure::Failed(ProvisionError::WeakPassword(message)) => {
                Self::field(Field::Password, message)
            }
            StepFailure::Failed(ProvisionError::Repository(e)) => {
                StepFailure::Failed(e).into()
            }
            StepFailure::Failed(e @ ProvisionError::PasswordHash) => {
                Self::Persistence(e.to_string())
            }
        }
    }
}

impl From<PricingError> for CheckoutError {
    fn from(err: PricingError) -> Self {
        match err {
            PricingError::UnknownRegion(region) => {
                Self::field(Field::Region, format!("we do not deliver to {region}"))
            }
            PricingError::TotalTooLarge(total) => Self::TotalTooLarge(total),
        }
    }
}

/// Store-wide checkout settings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CheckoutSettings {
    /// Currency orders are recorded in.
    pub currency: CurrencyCode,
    /// Local phone numbering plan.
    pub phone_format: PhoneFormat,
    /// Whether validation stops at the first bad field.
    pub validation_mode: ValidationMode,
    /// Timeout and retry budget for each remote step.
    pub step_policy: StepPolicy,
}

/// One checkout attempt, identified by its idempotency key.
///
/// Keep the same attempt across resubmissions of the same cart; start a new
/// one after an order is placed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckoutAttempt {
    /// Client- or session-generated key.
    pub idempotency_key: Uuid,
}

impl CheckoutAttempt {
    /// Start a fresh attempt.
    #[must_use]
    pub fn new() -> Self {
        Self::from_key(Uuid::new_v4())
    }

    /// Resume an attempt with a known key.
    #[must_use]
    pub const fn from_key(idempotency_key: Uuid) -> Self {
        Self { idempotency_key }
    }
}

impl Default for CheckoutAttempt {
    fn default() -> Self {
        Self::new()
    }
}

/// Outcome of a successful checkout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CheckoutReceipt {
    /// New order.
    pub order_id: OrderId,
    /// Human-facing order reference.
    pub order_number: OrderNumber,
    /// Amounts charged.
    pub totals: Totals,
    /// Currency of the amounts.
    pub currency: CurrencyCode,
    /// Buyer the order belongs to.
    pub customer: CurrentCustomer,
    /// Whether a guest account was created for this checkout.
    pub provisioned_account: bool,
}

/// Order numbers drawn per submission before a collision is reported.
const ORDER_NUMBER_DRAWS: u32 = 3;

/// Drives a checkout attempt from form to persisted order.
#[derive(Clone)]
pub struct CheckoutOrchestrator {
    orders: Arc<dyn OrderRepository>,
    guests: GuestAccountProvisioner,
    rates: Arc<ShippingRateTable>,
    settings: CheckoutSettings,
}

impl CheckoutOrchestrator {
    /// Create an orchestrator.
    #[must_use]
    pub fn new(
        orders: Arc<dyn OrderRepository>,
        customers: Arc<dyn CustomerRepository>,
        rates: Arc<ShippingRateTable>,
        settings: CheckoutSettings,
    ) -> Self {
        Self {
            orders,
            guests: GuestAccountProvisioner::new(customers),
            rates,
            settings,
        }
    }

    /// Settings in effect.
    #[must_use]
    pub const fn settings(&self) -> &CheckoutSettings {
        &self.settings
    }

    /// Price a cart without submitting anything.
    ///
    /// # Errors
    ///
    /// Returns `PricingError::UnknownRegion` for regions without a rate.
    pub fn quote(
        &self,
        cart: &Cart,
        destination: &ShippingDestination,
    ) -> Result<Totals, PricingError> {
        pricing::compute_totals(cart, destination, &self.rates)
    }

    /// Run a checkout attempt.
    ///
    /// `identity` is the session's current customer. When it is `None`, a
    /// guest account is provisioned and written back into it, so that a later
    /// failure followed by a resubmission does not try to provision again.
    ///
    /// On success the cart is cleared. On any error the cart is unchanged.
    ///
    /// The receipt describes the stored order. When the attempt was already
    /// placed, that is the earlier order, provided it matches the cart.
    ///
    /// # Errors
    ///
    /// - `CheckoutError::EmptyCart` if the cart has no lines.
    /// - `CheckoutError::Validation` for fields the buyer must correct.
    /// - `CheckoutError::DuplicateAccount` if a guest's email is taken.
    /// - `CheckoutError::TotalTooLarge` if the total cannot be stored.
    /// - `CheckoutError::AttemptMismatch` if the attempt already placed an
    ///   order for a different cart or buyer.
    /// - `CheckoutError::Persistence` / `CheckoutError::Network` for
    ///   retryable storage failures.
    #[instrument(
        skip_all,
        fields(attempt = %attempt.idempotency_key, guest = identity.is_none())
    )]
    pub async fn submit(
        &self,
        cart: &mut CartStore,
        identity: &mut Option<CurrentCustomer>,
        form: &CheckoutForm,
        attempt: &CheckoutAttempt,
    ) -> Result<CheckoutReceipt, CheckoutError> {
        if cart.cart().is_empty() {
            return Err(CheckoutError::EmptyCart);
        }

        // 1. Validate
        let checkout = validate(
            form,
            &self.settings.phone_format,
            &self.rates,
            self.settings.validation_mode,
        )
        .map_err(CheckoutError::Validation)?;

        // 2. Resolve identity
        let (customer, provisioned_account) = match identity {
            Some(customer) => (customer.clone(), false),
            None => {
                let customer = self.provision_guest(&checkout).await?;
                *identity = Some(customer.clone());
                (customer, true)
            }
        };

        // 3. Price
        let totals = pricing::compute_totals(cart.cart(), &checkout.destination, &self.rates)?;

        // 4. Submit
        let order = NewOrder {
            idempotency_key: attempt.idempotency_key,
            number: OrderNumber::generate(),
            customer_id: customer.id,
            line_items: cart.cart().items().iter().map(LineItem::from).collect(),
            subtotal: totals.subtotal,
            shipping_cost: totals.shipping_cost,
            total: totals.total,
            currency: self.settings.currency,
            payment_method: checkout.payment_method,
            contact: DeliveryContact {
                name: checkout.name,
                phone: checkout.phone,
                destination: checkout.destination,
            },
        };
        let stored = self.place_order(order.clone()).await?;
        if !stored.matches(&order) {
            warn!(
                order_number = %stored.number,
                "Attempt already placed an order for a different cart, cart kept"
            );
            return Err(CheckoutError::AttemptMismatch {
                order_number: stored.number,
            });
        }

        // 5. Finalize
        cart.clear();

        info!(
            order_id = %stored.id,
            order_number = %stored.number,
            customer_id = %customer.id,
            total = %stored.total,
            "Order placed"
        );

        Ok(CheckoutReceipt {
            order_id: stored.id,
            order_number: stored.number,
            totals: Totals {
                subtotal: stored.subtotal,
                shipping_cost: stored.shipping_cost,
                total: stored.total,
            },
            currency: stored.currency,
            customer,
            provisioned_account,
        })
    }

    /// Create the order and read back what the store holds for the attempt.
    ///
    /// A taken order number is replaced with a fresh one and the insert is
    /// repeated, up to [`ORDER_NUMBER_DRAWS`] numbers in total.
    async fn place_order(&self, mut order: NewOrder) -> Result<Order, CheckoutError> {
        let policy = self.settings.step_policy;
        let mut draws = 1;
        let order_id = loop {
            let outcome = run_step("create_order", &policy, || {
                self.orders.create_order(order.clone())
            })
            .await;
            match outcome {
                Ok(id) => break id,
                Err(StepFailure::Failed(RepositoryError::Conflict(reason)))
                    if draws < ORDER_NUMBER_DRAWS =>
                {
                    warn!(order_number = %order.number, %reason, "Order number taken, drawing another");
                    order.number = OrderNumber::generate();
                    draws += 1;
                }
                Err(failure) => {
                    warn!(error = %failure, "Order submission failed, cart kept");
                    return Err(failure.into());
                }
            }
        };

        let lookup = OrderLookup::Id(order_id);
        run_step("load_order", &policy, || self.orders.get_order(&lookup))
            .await
            .map_err(|failure| {
                warn!(error = %failure, order_id = %order_id, "Placed order could not be read back, cart kept");
                CheckoutError::from(failure)
            })
    }

    async fn provision_guest(
        &self,
        checkout: &ValidatedCheckout,
    ) -> Result<CurrentCustomer, CheckoutError> {
        let policy = self.settings.step_policy;

        let exists = run_step("email_exists", &policy, || {
            self.guests.email_exists(&checkout.email)
        })
        .await?;
        if exists {
            info!(email = %checkout.email, "Guest email has an account, redirecting to sign-in");
            return Err(CheckoutError::DuplicateAccount {
                email: checkout.email.clone(),
            });
        }

        // Account creation is not idempotent: one try only.
        let details = GuestDetails {
            email: checkout.email.clone(),
            name: checkout.name.clone(),
            phone: Some(checkout.phone.clone()),
            password: checkout.password.clone(),
        };
        let customer = run_step("provision_guest", &policy.single_try(), || {
            self.guests.provision(details.clone())
        })
        .await?;

        Ok(customer.session_binding())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;

    use souq_core::{CustomerId, OrderStatus, ProductId};

    use super::*;
    use crate::db::{MemoryCustomerRepository, MemoryOrderRepository};
    use crate::models::{NewCustomer, Product};
    use crate::pricing::ShippingRate;

    fn rates() -> Arc<ShippingRateTable> {
        Arc::new(
            ShippingRateTable::new([(
                "Cairo".to_owned(),
                ShippingRate {
                    base_rate: Price::from_units(50),
                    free_shipping_threshold: Price::from_units(1000),
                },
            )])
            .unwrap(),
        )
    }

    fn settings() -> CheckoutSettings {
        CheckoutSettings {
            step_policy: StepPolicy::new(Duration::from_millis(200), 2, BackoffStrategy::None),
            ..CheckoutSettings::default()
        }
    }

    fn product(id: &str, price: u32) -> Product {
        Product {
            id: ProductId::from(id),
            name: format!("Item {id}"),
            price: Price::from_units(price),
            image: None,
            available: true,
        }
    }

    fn cart_with(lines: &[(&str, u32, u32)]) -> CartStore {
        let mut store = CartStore::new();
        for (id, price, quantity) in lines {
            store.add_item(&product(id, *price), *quantity);
        }
        store
    }

    fn form(email: &str) -> CheckoutForm {
        CheckoutForm {
            name: "Omar Samir".to_owned(),
            email: email.to_owned(),
            phone: "01112223334".to_owned(),
            address: "3 Corniche El Nil".to_owned(),
            city: "Garden City".to_owned(),
            region: "Cairo".to_owned(),
            payment_method: souq_core::PaymentMethod::CashOnDelivery,
            password: None,
        }
    }

    struct Fixture {
        orders: MemoryOrderRepository,
        customers: MemoryCustomerRepository,
        checkout: CheckoutOrchestrator,
    }

    fn fixture() -> Fixture {
        let orders = MemoryOrderRepository::new();
        let customers = MemoryCustomerRepository::new();
        let checkout = CheckoutOrchestrator::new(
            Arc::new(orders.clone()),
            Arc::new(customers.clone()),
            rates(),
            settings(),
        );
        Fixture {
            orders,
            customers,
            checkout,
        }
    }

    /// Fails the first `failures` creates with a transient error, then
    /// delegates.
    struct FlakyOrders {
        inner: MemoryOrderRepository,
        failures: AtomicU32,
    }

    #[async_trait]
    impl OrderRepository for FlakyOrders {
        async fn create_order(&self, order: NewOrder) -> Result<OrderId, RepositoryError> {
            let remaining = self.failures.load(Ordering::SeqCst);
            if remaining > 0 {
                self.failures.store(remaining - 1, Ordering::SeqCst);
                return Err(RepositoryError::Unavailable("connection reset".to_owned()));
            }
            self.inner.create_order(order).await
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

        async fn list_orders(
            &self,
            customer_id: CustomerId,
        ) -> Result<Vec<Order>, RepositoryError> {
            self.inner.list_orders(customer_id).await
        }
    }

    /// Reports the first `collisions` order numbers as taken, then delegates.
    struct TakenNumbers {
        inner: MemoryOrderRepository,
        collisions: AtomicU32,
        rejected: Mutex<Vec<OrderNumber>>,
    }

    impl TakenNumbers {
        fn new(collisions: u32) -> Self {
            Self {
                inner: MemoryOrderRepository::new(),
                collisions: AtomicU32::new(collisions),
                rejected: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl OrderRepository for TakenNumbers {
        async fn create_order(&self, order: NewOrder) -> Result<OrderId, RepositoryError> {
            let remaining = self.collisions.load(Ordering::SeqCst);
            if remaining > 0 {
                self.collisions.store(remaining - 1, Ordering::SeqCst);
                self.rejected.lock().unwrap().push(order.number);
                return Err(RepositoryError::Conflict(
                    "order number already exists".to_owned(),
                ));
            }
            self.inner.create_order(order).await
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

        async fn list_orders(
            &self,
            customer_id: CustomerId,
        ) -> Result<Vec<Order>, RepositoryError> {
            self.inner.list_orders(customer_id).await
        }
    }

    fn member(id: i32) -> Option<CurrentCustomer> {
        Some(CurrentCustomer {
            id: CustomerId::new(id),
            email: Email::parse(&format!("member{id}@example.com")).unwrap(),
            name: "Member".to_owned(),
        })
    }

    #[tokio::test]
    async fn test_guest_checkout_places_order_and_clears_cart() {
        let fx = fixture();
        let mut cart = cart_with(&[("r1", 120, 2), ("b3", 500, 1)]);
        let mut identity = None;

        let receipt = fx
            .checkout
            .submit(&mut cart, &mut identity, &form("omar@example.com"), &CheckoutAttempt::new())
            .await
            .unwrap();

        assert!(cart.cart().is_empty());
        assert!(receipt.provisioned_account);
        assert_eq!(identity.as_ref(), Some(&receipt.customer));
        assert_eq!(receipt.totals.subtotal, Price::from_units(740));
        assert_eq!(receipt.totals.shipping_cost, Price::from_units(50));

        let order = fx
            .orders
            .get_order(&OrderLookup::Id(receipt.order_id))
            .await
            .unwrap();
        assert_eq!(order.status, OrderStatus::Pending);
        assert!(order.status_history.len() <= 1);
        assert_eq!(order.line_items.len(), 2);
        assert_eq!(order.customer_id, receipt.customer.id);
    }

    #[tokio::test]
    async fn test_line_items_are_snapshots() {
        let fx = fixture();
        let mut cart = cart_with(&[("r1", 24500, 1)]);
        let receipt = fx
            .checkout
            .submit(&mut cart, &mut None, &form("snap@example.com"), &CheckoutAttempt::new())
            .await
            .unwrap();

        let order = fx
            .orders
            .get_order(&OrderLookup::Id(receipt.order_id))
            .await
            .unwrap();
        assert_eq!(order.line_items[0].unit_price, Price::from_units(24500));
        assert_eq!(order.total, Price::from_units(24500));
    }

    #[tokio::test]
    async fn test_existing_email_redirects_to_sign_in() {
        let fx = fixture();
        fx.customers
            .create_customer(NewCustomer {
                email: Email::parse("a@x.com").unwrap(),
                name: "Existing".to_owned(),
                phone: None,
                password_hash: None,
            })
            .await
            .unwrap();
        let mut cart = cart_with(&[("b3", 500, 1)]);
        let before = cart.cart().clone();
        let mut identity = None;

        let err = fx
            .checkout
            .submit(&mut cart, &mut identity, &form("a@x.com"), &CheckoutAttempt::new())
            .await
            .unwrap_err();

        assert!(matches!(err, CheckoutError::DuplicateAccount { .. }));
        assert!(!err.is_retryable());
        assert_eq!(err.sign_in_redirect().as_deref(), Some("/auth/login?email=a%40x.com"));
        assert_eq!(cart.cart(), &before);
        assert!(identity.is_none());
        assert_eq!(fx.orders.count().await, 0);
        assert_eq!(fx.customers.count().await, 1);
    }

    #[tokio::test]
    async fn test_signed_in_customer_skips_provisioning() {
        let fx = fixture();
        let mut identity = Some(CurrentCustomer {
            id: CustomerId::new(41),
            email: Email::parse("member@example.com").unwrap(),
            name: "Member".to_owned(),
        });
        let mut cart = cart_with(&[("b3", 500, 1)]);

        let receipt = fx
            .checkout
            .submit(&mut cart, &mut identity, &form("member@example.com"), &CheckoutAttempt::new())
            .await
            .unwrap();

        assert!(!receipt.provisioned_account);
        assert_eq!(receipt.customer.id, CustomerId::new(41));
        assert_eq!(fx.customers.count().await, 0);
    }

    #[tokio::test]
    async fn test_validation_failure_keeps_cart_and_creates_nothing() {
        let fx = fixture();
        let mut cart = cart_with(&[("b3", 500, 1)]);
        let mut bad = form("omar@example.com");
        bad.phone = "12345".to_owned();

        let err = fx
            .checkout
            .submit(&mut cart, &mut None, &bad, &CheckoutAttempt::new())
            .await
            .unwrap_err();

        let CheckoutError::Validation(errors) = err else {
            panic!("expected validation error");
        };
        assert_eq!(errors[0].field, Field::Phone);
        assert_eq!(cart.cart().items().len(), 1);
        assert_eq!(fx.customers.count().await, 0);
    }

    #[tokio::test]
    async fn test_empty_cart_rejected() {
        let fx = fixture();
        let err = fx
            .checkout
            .submit(&mut CartStore::new(), &mut None, &form("e@example.com"), &CheckoutAttempt::new())
            .await
            .unwrap_err();
        assert!(matches!(err, CheckoutError::EmptyCart));
    }

    #[tokio::test]
    async fn test_resubmitting_an_attempt_creates_one_order() {
        let fx = fixture();
        let attempt = CheckoutAttempt::new();
        let mut identity = None;

        let first = fx
            .checkout
            .submit(&mut cart_with(&[("b3", 500, 1)]), &mut identity, &form("twice@example.com"), &attempt)
            .await
            .unwrap();
        let second = fx
            .checkout
            .submit(&mut cart_with(&[("b3", 500, 1)]), &mut identity, &form("twice@example.com"), &attempt)
            .await
            .unwrap();

        assert_eq!(first.order_id, second.order_id);
        assert_eq!(first.order_number, second.order_number);
        assert_eq!(fx.orders.count().await, 1);
        assert_eq!(fx.customers.count().await, 1);
    }

    #[tokio::test]
    async fn test_transient_failure_is_retried_within_budget() {
        let inner = MemoryOrderRepository::new();
        let checkout = CheckoutOrchestrator::new(
            Arc::new(FlakyOrders {
                inner: inner.clone(),
                failures: AtomicU32::new(2),
            }),
            Arc::new(MemoryCustomerRepository::new()),
            rates(),
            settings(),
        );
        let mut cart = cart_with(&[("b3", 500, 1)]);

        checkout
            .submit(&mut cart, &mut None, &form("flaky@example.com"), &CheckoutAttempt::new())
            .await
            .unwrap();
        assert!(cart.cart().is_empty());
        assert_eq!(inner.count().await, 1);
    }

    #[tokio::test]
    async fn test_exhausted_retries_keep_cart_and_identity() {
        let inner = MemoryOrderRepository::new();
        let customers = MemoryCustomerRepository::new();
        let checkout = CheckoutOrchestrator::new(
            Arc::new(FlakyOrders {
                inner: inner.clone(),
                failures: AtomicU32::new(10),
            }),
            Arc::new(customers.clone()),
            rates(),
            settings(),
        );
        let mut cart = cart_with(&[("b3", 500, 1)]);
        let mut identity = None;
        let attempt = CheckoutAttempt::new();

        let err = checkout
            .submit(&mut cart, &mut identity, &form("retry@example.com"), &attempt)
            .await
            .unwrap_err();
        assert!(err.is_retryable());
        assert!(matches!(err, CheckoutError::Network(_)));
        assert_eq!(cart.cart().items().len(), 1);
        assert_eq!(inner.count().await, 0);

        // The guest was provisioned once; a resubmission reuses the binding
        assert!(identity.is_some());
        let err = checkout
            .submit(&mut cart, &mut identity, &form("retry@example.com"), &attempt)
            .await
            .unwrap_err();
        assert!(err.is_retryable());
        assert_eq!(customers.count().await, 1);
    }

    #[tokio::test]
    async fn test_keys_sharing_a_prefix_place_separate_orders() {
        let fx = fixture();
        let keys = [
            "deadbeef-0000-4000-8000-000000000000",
            "deadbeef-1111-4111-8111-111111111111",
        ];
        let mut numbers = Vec::new();
        for key in keys {
            let attempt = CheckoutAttempt::from_key(Uuid::parse_str(key).unwrap());
            let receipt = fx
                .checkout
                .submit(&mut cart_with(&[("b3", 500, 1)]), &mut member(41), &form("member41@example.com"), &attempt)
                .await
                .unwrap();
            numbers.push(receipt.order_number);
        }

        assert_ne!(numbers[0], numbers[1]);
        assert_eq!(fx.orders.count().await, 2);
    }

    #[tokio::test]
    async fn test_taken_order_number_is_redrawn() {
        let orders = Arc::new(TakenNumbers::new(2));
        let checkout = CheckoutOrchestrator::new(
            orders.clone(),
            Arc::new(MemoryCustomerRepository::new()),
            rates(),
            settings(),
        );
        let mut cart = cart_with(&[("b3", 500, 1)]);

        let receipt = checkout
            .submit(&mut cart, &mut member(41), &form("member41@example.com"), &CheckoutAttempt::new())
            .await
            .unwrap();

        let rejected = orders.rejected.lock().unwrap().clone();
        assert_eq!(rejected.len(), 2);
        assert!(!rejected.contains(&receipt.order_number));
        assert!(cart.cart().is_empty());
        assert_eq!(orders.inner.count().await, 1);
    }

    #[tokio::test]
    async fn test_order_number_draws_are_bounded() {
        let orders = Arc::new(TakenNumbers::new(u32::MAX));
        let checkout = CheckoutOrchestrator::new(
            orders.clone(),
            Arc::new(MemoryCustomerRepository::new()),
            rates(),
            settings(),
        );
        let mut cart = cart_with(&[("b3", 500, 1)]);

        let err = checkout
            .submit(&mut cart, &mut member(41), &form("member41@example.com"), &CheckoutAttempt::new())
            .await
            .unwrap_err();

        assert!(matches!(err, CheckoutError::Persistence(_)));
        assert_eq!(orders.rejected.lock().unwrap().len(), 3);
        assert_eq!(cart.cart().items().len(), 1);
        assert_eq!(orders.inner.count().await, 0);
    }

    #[tokio::test]
    async fn test_replayed_attempt_with_changed_cart_is_rejected() {
        let fx = fixture();
        let attempt = CheckoutAttempt::new();
        let mut identity = member(41);

        let first = fx
            .checkout
            .submit(&mut cart_with(&[("b3", 500, 1)]), &mut identity, &form("member41@example.com"), &attempt)
            .await
            .unwrap();

        let mut edited = cart_with(&[("b3", 500, 1), ("r1", 24500, 2)]);
        let before = edited.cart().clone();
        let err = fx
            .checkout
            .submit(&mut edited, &mut identity, &form("member41@example.com"), &attempt)
            .await
            .unwrap_err();

        let CheckoutError::AttemptMismatch { order_number } = err else {
            panic!("expected attempt mismatch");
        };
        assert_eq!(order_number, first.order_number);
        assert_eq!(edited.cart(), &before);
        assert_eq!(fx.orders.count().await, 1);

        let stored = fx.orders.get_order(&OrderLookup::Id(first.order_id)).await.unwrap();
        assert_eq!(stored.total, Price::from_units(550));
        assert_eq!(stored.line_items.len(), 1);
    }

    #[tokio::test]
    async fn test_replayed_attempt_for_another_buyer_is_rejected() {
        let fx = fixture();
        let attempt = CheckoutAttempt::new();
        fx.checkout
            .submit(&mut cart_with(&[("b3", 500, 1)]), &mut member(41), &form("member41@example.com"), &attempt)
            .await
            .unwrap();

        let mut cart = cart_with(&[("b3", 500, 1)]);
        let err = fx
            .checkout
            .submit(&mut cart, &mut member(42), &form("member42@example.com"), &attempt)
            .await
            .unwrap_err();

        assert!(matches!(err, CheckoutError::AttemptMismatch { .. }));
        assert!(!err.is_retryable());
        assert_eq!(cart.cart().items().len(), 1);
    }

    #[tokio::test]
    async fn test_replay_receipt_comes_from_stored_order() {
        let fx = fixture();
        let attempt = CheckoutAttempt::new();
        let first = fx
            .checkout
            .submit(&mut cart_with(&[("r1", 120, 3)]), &mut member(41), &form("member41@example.com"), &attempt)
            .await
            .unwrap();

        let mut again = cart_with(&[("r1", 120, 3)]);
        let replay = fx
            .checkout
            .submit(&mut again, &mut member(41), &form("member41@example.com"), &attempt)
            .await
            .unwrap();

        assert_eq!(replay.order_id, first.order_id);
        assert_eq!(replay.order_number, first.order_number);
        assert_eq!(replay.totals, first.totals);
        assert!(again.cart().is_empty());
    }

    #[test]
    fn test_total_past_storable_amount_is_not_retryable() {
        let err = CheckoutError::from(PricingError::TotalTooLarge(Price::from_units(1)));
        assert!(matches!(err, CheckoutError::TotalTooLarge(_)));
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_quote_unknown_region() {
        let fx = fixture();
        let destination = ShippingDestination {
            region: "Atlantis".to_owned(),
            city: "Nowhere".to_owned(),
            address: "1 Sea St".to_owned(),
        };
        assert!(matches!(
            fx.checkout.quote(cart_with(&[("b3", 500, 1)]).cart(), &destination),
            Err(PricingError::UnknownRegion(_))
        ));
    }
}
