//! Order repository for `PostgreSQL`.
//!
//! Orders, their line-item snapshots and their status history are written in
//! a single transaction. The `idempotency_key` unique constraint makes order
//! creation safe to repeat.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tracing::{debug, info, instrument};

use souq_core::{
    CurrencyCode, CustomerId, OrderId, OrderStatus, PaymentMethod, PhoneNumber, Price, ProductId,
};

use super::{OrderRepository, RepositoryError};
use crate::models::{
    DeliveryContact, LineItem, NewOrder, Order, OrderLookup, OrderNumber, ShippingDestination,
    StatusChange,
};

// =============================================================================
// Internal Row Types
// =============================================================================

const ORDER_COLUMNS: &str = r"
    id, number, customer_id, subtotal, shipping_cost, total, currency,
    payment_method, status, contact_name, contact_phone,
    ship_region, ship_city, ship_address, created_at
";

#[derive(Debug, sqlx::FromRow)]
struct OrderRow {
    id: i32,
    number: String,
    customer_id: i32,
    subtotal: Price,
    shipping_cost: Price,
    total: Price,
    currency: String,
    payment_method: PaymentMethod,
    status: OrderStatus,
    contact_name: String,
    contact_phone: PhoneNumber,
    ship_region: String,
    ship_city: String,
    ship_address: String,
    created_at: DateTime<Utc>,
}

#[derive(Debug, sqlx::FromRow)]
struct LineItemRow {
    order_id: i32,
    product_id: ProductId,
    name: String,
    image: Option<String>,
    unit_price: Price,
    quantity: i32,
    line_total: Price,
}

impl TryFrom<LineItemRow> for LineItem {
    type Error = RepositoryError;

    fn try_from(row: LineItemRow) -> Result<Self, Self::Error> {
        let quantity = u32::try_from(row.quantity).map_err(|_| {
            RepositoryError::DataCorruption(format!("negative quantity {}", row.quantity))
        })?;
        Ok(Self {
            product_id: row.product_id,
            name: row.name,
            image: row.image,
            unit_price: row.unit_price,
            quantity,
            line_total: row.line_total,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct StatusChangeRow {
    order_id: i32,
    status: OrderStatus,
    changed_at: DateTime<Utc>,
}

fn assemble(
    row: OrderRow,
    line_items: Vec<LineItem>,
    status_history: Vec<StatusChange>,
) -> Result<Order, RepositoryError> {
    let currency = row.currency.trim().parse::<CurrencyCode>().map_err(|e| {
        RepositoryError::DataCorruption(format!("order {}: {e}", row.id))
    })?;

    Ok(Order {
        id: OrderId::new(row.id),
        number: OrderNumber::from_stored(row.number),
        customer_id: CustomerId::new(row.customer_id),
        line_items,
        subtotal: row.subtotal,
        shipping_cost: row.shipping_cost,
        total: row.total,
        currency,
        payment_method: row.payment_method,
        contact: DeliveryContact {
            name: row.contact_name,
            phone: row.contact_phone,
            destination: ShippingDestination {
                region: row.ship_region,
                city: row.ship_city,
                address: row.ship_address,
            },
        },
        status: row.status,
        created_at: row.created_at,
        status_history,
    })
}

// =============================================================================
// Repository
// =============================================================================

/// `PostgreSQL`-backed [`OrderRepository`].
#[derive(Clone)]
pub struct PgOrderRepository {
    pool: PgPool,
}

impl PgOrderRepository {
    /// Create a new order repository.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Load line items and history for a set of orders, keyed by order ID.
    async fn load_details(
        &self,
        order_ids: &[i32],
    ) -> Result<(HashMap<i32, Vec<LineItem>>, HashMap<i32, Vec<StatusChange>>), RepositoryError>
    {
        let item_rows = sqlx::query_as::<_, LineItemRow>(
            r"
            SELECT order_id, product_id, name, image, unit_price, quantity, line_total
            FROM storefront.order_line_item
            WHERE order_id = ANY($1)
            ORDER BY order_id, position
            ",
        )
        .bind(order_ids)
        .fetch_all(&self.pool)
        .await?;

        let history_rows = sqlx::query_as::<_, StatusChangeRow>(
            r"
            SELECT order_id, status, changed_at
            FROM storefront.order_status_history
            WHERE order_id = ANY($1)
            ORDER BY order_id, id
            ",
        )
        .bind(order_ids)
        .fetch_all(&self.pool)
        .await?;

        let mut items: HashMap<i32, Vec<LineItem>> = HashMap::new();
        for row in item_rows {
            let order_id = row.order_id;
            items.entry(order_id).or_default().push(LineItem::try_from(row)?);
        }

        let mut history: HashMap<i32, Vec<StatusChange>> = HashMap::new();
        for row in history_rows {
            history.entry(row.order_id).or_default().push(StatusChange {
                status: row.status,
                changed_at: row.changed_at,
            });
        }

        Ok((items, history))
    }
}

#[async_trait]
impl OrderRepository for PgOrderRepository {
    #[instrument(skip(self, order), fields(order_number = %order.number, customer_id = %order.customer_id))]
    async fn create_order(&self, order: NewOrder) -> Result<OrderId, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let inserted: Option<i32> = sqlx::query_scalar(
            r"
            INSERT INTO storefront.customer_order (
                number, idempotency_key, customer_id, subtotal, shipping_cost, total,
                currency, payment_method, contact_name, contact_phone,
                ship_region, ship_city, ship_address
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            ON CONFLICT (idempotency_key) DO NOTHING
            RETURNING id
            ",
        )
        .bind(order.number.as_str())
        .bind(order.idempotency_key)
        .bind(order.customer_id)
        .bind(order.subtotal)
        .bind(order.shipping_cost)
        .bind(order.total)
        .bind(order.currency.code())
        .bind(order.payment_method)
        .bind(&order.contact.name)
        .bind(&order.contact.phone)
        .bind(&order.contact.destination.region)
        .bind(&order.contact.destination.city)
        .bind(&order.contact.destination.address)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| RepositoryError::from_insert(e, "order number"))?;

        let Some(id) = inserted else {
            let existing: i32 = sqlx::query_scalar(
                "SELECT id FROM storefront.customer_order WHERE idempotency_key = $1",
            )
            .bind(order.idempotency_key)
            .fetch_one(&mut *tx)
            .await?;
            tx.commit().await?;
            debug!(order_id = existing, "Idempotent replay of order submission");
            return Ok(OrderId::new(existing));
        };

        for (position, item) in order.line_items.iter().enumerate() {
            let position = i32::try_from(position)
                .map_err(|_| RepositoryError::Conflict("too many line items".to_owned()))?;
            let quantity = i32::try_from(item.quantity).map_err(|_| {
                RepositoryError::Conflict(format!("quantity {} out of range", item.quantity))
            })?;
            sqlx::query(
                r"
                INSERT INTO storefront.order_line_item (
                    order_id, position, product_id, name, image, unit_price, quantity, line_total
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                ",
            )
            .bind(id)
            .bind(position)
            .bind(&item.product_id)
            .bind(&item.name)
            .bind(item.image.as_deref())
            .bind(item.unit_price)
            .bind(quantity)
            .bind(item.line_total)
            .execute(&mut *tx)
            .await?;
        }

        sqlx::query(
            r"
            INSERT INTO storefront.order_status_history (order_id, status)
            VALUES ($1, $2)
            ",
        )
        .bind(id)
        .bind(OrderStatus::Pending)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        info!(order_id = id, "Order created");
        Ok(OrderId::new(id))
    }

    #[instrument(skip(self), fields(lookup = %lookup))]
    async fn get_order(&self, lookup: &OrderLookup) -> Result<Order, RepositoryError> {
        let row = match lookup {
            OrderLookup::Id(id) => {
                sqlx::query_as::<_, OrderRow>(&format!(
                    "SELECT {ORDER_COLUMNS} FROM storefront.customer_order WHERE id = $1"
                ))
                .bind(*id)
                .fetch_optional(&self.pool)
                .await?
            }
            OrderLookup::Number(number) => {
                sqlx::query_as::<_, OrderRow>(&format!(
                    "SELECT {ORDER_COLUMNS} FROM storefront.customer_order WHERE number = $1"
                ))
                .bind(number)
                .fetch_optional(&self.pool)
                .await?
            }
        };

        let row = row.ok_or(RepositoryError::NotFound)?;
        let (mut items, mut history) = self.load_details(&[row.id]).await?;
        let id = row.id;
        assemble(
            row,
            items.remove(&id).unwrap_or_default(),
            history.remove(&id).unwrap_or_default(),
        )
    }

    #[instrument(skip(self), fields(order_id = %id, status = %status))]
    async fn update_order_status(
        &self,
        id: OrderId,
        status: OrderStatus,
    ) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let current: OrderStatus = sqlx::query_scalar(
            "SELECT status FROM storefront.customer_order WHERE id = $1 FOR UPDATE",
        )
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(RepositoryError::NotFound)?;

        current.check_transition(status)?;
        if current == status {
            tx.commit().await?;
            return Ok(());
        }

        sqlx::query("UPDATE storefront.customer_order SET status = $2 WHERE id = $1")
            .bind(id)
            .bind(status)
            .execute(&mut *tx)
            .await?;

        sqlx::query(
            r"
            INSERT INTO storefront.order_status_history (order_id, status)
            VALUES ($1, $2)
            ",
        )
        .bind(id)
        .bind(status)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        info!(from = %current, "Order status changed");
        Ok(())
    }

    #[instrument(skip(self), fields(customer_id = %customer_id))]
    async fn list_orders(&self, customer_id: CustomerId) -> Result<Vec<Order>, RepositoryError> {
        let rows = sqlx::query_as::<_, OrderRow>(&format!(
            "SELECT {ORDER_COLUMNS} FROM storefront.customer_order \
             WHERE customer_id = $1 ORDER BY created_at DESC, id DESC"
        ))
        .bind(customer_id)
        .fetch_all(&self.pool)
        .await?;

        if rows.is_empty() {
            return Ok(Vec::new());
        }

        let ids: Vec<i32> = rows.iter().map(|row| row.id).collect();
        let (mut items, mut history) = self.load_details(&ids).await?;

        rows.into_iter()
            .map(|row| {
                let id = row.id;
                assemble(
                    row,
                    items.remove(&id).unwrap_or_default(),
                    history.remove(&id).unwrap_or_default(),
                )
            })
            .collect()
    }

    async fn ping(&self) -> Result<(), RepositoryError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}
