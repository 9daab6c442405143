//! In-process repositories.
//!
//! Same contracts as the `PostgreSQL` repositories, held in memory behind a
//! `tokio` lock. Clones share state. Used by tests and by local runs without a
//! database.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use uuid::Uuid;

use souq_core::{CustomerId, Email, OrderId, OrderStatus, ProductId};

use super::{CustomerRepository, OrderRepository, ProductCatalog, RepositoryError};
use crate::models::{Customer, NewCustomer, NewOrder, Order, OrderLookup, Product, StatusChange};

// =============================================================================
// Orders
// =============================================================================

#[derive(Debug, Default)]
struct OrderTable {
    orders: Vec<Order>,
    by_key: HashMap<Uuid, OrderId>,
}

impl OrderTable {
    fn find(&self, lookup: &OrderLookup) -> Option<&Order> {
        self.orders.iter().find(|order| match lookup {
            OrderLookup::Id(id) => order.id == *id,
            OrderLookup::Number(number) => order.number.as_str() == number,
        })
    }
}

/// In-memory [`OrderRepository`].
#[derive(Debug, Clone, Default)]
pub struct MemoryOrderRepository {
    table: Arc<RwLock<OrderTable>>,
}

impl MemoryOrderRepository {
    /// Create an empty repository.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored orders.
    pub async fn count(&self) -> usize {
        self.table.read().await.orders.len()
    }
}

#[async_trait]
impl OrderRepository for MemoryOrderRepository {
    async fn create_order(&self, order: NewOrder) -> Result<OrderId, RepositoryError> {
        let mut table = self.table.write().await;

        if let Some(existing) = table.by_key.get(&order.idempotency_key) {
            return Ok(*existing);
        }
        if table.orders.iter().any(|o| o.number == order.number) {
            return Err(RepositoryError::Conflict(
                "order number already exists".to_owned(),
            ));
        }

        let next = i32::try_from(table.orders.len() + 1)
            .map_err(|_| RepositoryError::Conflict("order table full".to_owned()))?;
        let id = OrderId::new(next);
        let now = Utc::now();

        table.by_key.insert(order.idempotency_key, id);
        table.orders.push(Order {
            id,
            number: order.number,
            customer_id: order.customer_id,
            line_items: order.line_items,
            subtotal: order.subtotal,
            shipping_cost: order.shipping_cost,
            total: order.total,
            currency: order.currency,
            payment_method: order.payment_method,
            contact: order.contact,
            status: OrderStatus::Pending,
            created_at: now,
            status_history: vec![StatusChange {
                status: OrderStatus::Pending,
                changed_at: now,
            }],
        });

        Ok(id)
    }

    async fn get_order(&self, lookup: &OrderLookup) -> Result<Order, RepositoryError> {
        let table = self.table.read().await;
        table.find(lookup).cloned().ok_or(RepositoryError::NotFound)
    }

    async fn update_order_status(
        &self,
        id: OrderId,
        status: OrderStatus,
    ) -> Result<(), RepositoryError> {
        let mut table = self.table.write().await;
        let order = table
            .orders
            .iter_mut()
            .find(|order| order.id == id)
            .ok_or(RepositoryError::NotFound)?;

        order.status.check_transition(status)?;
        if order.status != status {
            order.status = status;
            order.status_history.push(StatusChange {
                status,
                changed_at: Utc::now(),
            });
        }
        Ok(())
    }

    async fn list_orders(&self, customer_id: CustomerId) -> Result<Vec<Order>, RepositoryError> {
        let table = self.table.read().await;
        Ok(table
            .orders
            .iter()
            .rev()
            .filter(|order| order.customer_id == customer_id)
            .cloned()
            .collect())
    }
}

// =============================================================================
// Customers
// =============================================================================

#[derive(Debug, Clone)]
struct CustomerEntry {
    customer: Customer,
    password_hash: Option<String>,
}

/// In-memory [`CustomerRepository`].
///
/// Emails are unique ignoring case.
#[derive(Debug, Clone, Default)]
pub struct MemoryCustomerRepository {
    customers: Arc<RwLock<HashMap<String, CustomerEntry>>>,
}

impl MemoryCustomerRepository {
    /// Create an empty repository.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored customers.
    pub async fn count(&self) -> usize {
        self.customers.read().await.len()
    }
}

#[async_trait]
impl CustomerRepository for MemoryCustomerRepository {
    async fn find_by_email(&self, email: &Email) -> Result<Option<Customer>, RepositoryError> {
        let customers = self.customers.read().await;
        Ok(customers
            .get(&email.normalized())
            .map(|entry| entry.customer.clone()))
    }

    async fn create_customer(&self, customer: NewCustomer) -> Result<Customer, RepositoryError> {
        let mut customers = self.customers.write().await;
        let key = customer.email.normalized();
        if customers.contains_key(&key) {
            return Err(RepositoryError::Conflict("email already exists".to_owned()));
        }

        let next = i32::try_from(customers.len() + 1)
            .map_err(|_| RepositoryError::Conflict("customer table full".to_owned()))?;
        let created = Customer {
            id: CustomerId::new(next),
            email: customer.email,
            name: customer.name,
            phone: customer.phone,
            created_at: Utc::now(),
        };
        customers.insert(
            key,
            CustomerEntry {
                customer: created.clone(),
                password_hash: customer.password_hash,
            },
        );
        Ok(created)
    }

    async fn password_hash(
        &self,
        email: &Email,
    ) -> Result<Option<(Customer, String)>, RepositoryError> {
        let customers = self.customers.read().await;
        Ok(customers.get(&email.normalized()).and_then(|entry| {
            entry
                .password_hash
                .clone()
                .map(|hash| (entry.customer.clone(), hash))
        }))
    }
}

// =============================================================================
// Catalog
// =============================================================================

/// In-memory [`ProductCatalog`].
#[derive(Debug, Clone, Default)]
pub struct MemoryCatalog {
    products: Arc<RwLock<HashMap<ProductId, Product>>>,
}

impl MemoryCatalog {
    /// Create a catalog holding `products`.
    #[must_use]
    pub fn with_products(products: impl IntoIterator<Item = Product>) -> Self {
        let products = products
            .into_iter()
            .map(|product| (product.id.clone(), product))
            .collect();
        Self {
            products: Arc::new(RwLock::new(products)),
        }
    }

    /// Add or replace a product.
    pub async fn insert(&self, product: Product) {
        self.products
            .write()
            .await
            .insert(product.id.clone(), product);
    }
}

#[async_trait]
impl ProductCatalog for MemoryCatalog {
    async fn find_product(&self, id: &ProductId) -> Result<Option<Product>, RepositoryError> {
        Ok(self.products.read().await.get(id).cloned())
    }
}
