//! Order domain types.

use core::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use souq_core::{
    CurrencyCode, CustomerId, OrderId, OrderStatus, PaymentMethod, PhoneNumber, Price, ProductId,
};

use crate::cart::CartItem;

/// Where an order is delivered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShippingDestination {
    /// Shipping region (governorate); keys the shipping rate table.
    pub region: String,
    /// City within the region.
    pub city: String,
    /// Street address.
    pub address: String,
}

/// Delivery contact recorded on an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryContact {
    /// Recipient name.
    pub name: String,
    /// Recipient phone.
    pub phone: PhoneNumber,
    /// Delivery address.
    pub destination: ShippingDestination,
}

/// Price-and-quantity snapshot of one cart line at submission time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineItem {
    /// Product the line was bought from.
    pub product_id: ProductId,
    /// Product name at submission time.
    pub name: String,
    /// Product image at submission time.
    pub image: Option<String>,
    /// Unit price at submission time.
    pub unit_price: Price,
    /// Units bought.
    pub quantity: u32,
    /// `unit_price × quantity`.
    pub line_total: Price,
}

impl From<&CartItem> for LineItem {
    fn from(item: &CartItem) -> Self {
        Self {
            product_id: item.id.clone(),
            name: item.name.clone(),
            image: item.image.clone(),
            unit_price: item.unit_price,
            quantity: item.quantity,
            line_total: item.line_total(),
        }
    }
}

/// Human-facing order reference, e.g. `ORD-3F9A12C4B07E`.
///
/// Numbers are random and unrelated to the database ID or the checkout
/// attempt, so they can be shown to anyone holding the reference.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrderNumber(String);

impl OrderNumber {
    /// Prefix of every order number.
    pub const PREFIX: &'static str = "ORD-";

    /// Hex digits after the prefix.
    pub const DIGITS: usize = 12;

    /// Draw a fresh random order number.
    ///
    /// Numbers can collide; the store rejects a duplicate and the caller
    /// draws again.
    #[must_use]
    pub fn generate() -> Self {
        let hex = Uuid::new_v4().simple().to_string().to_uppercase();
        Self(format!(
            "{}{}",
            Self::PREFIX,
            hex.get(..Self::DIGITS).unwrap_or(&hex)
        ))
    }

    /// Wrap a stored order number.
    #[must_use]
    pub fn from_stored(number: String) -> Self {
        Self(number)
    }

    /// Returns the number as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OrderNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One entry of an order's append-only status history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusChange {
    /// Status entered.
    pub status: OrderStatus,
    /// When it was entered.
    pub changed_at: DateTime<Utc>,
}

/// Everything needed to persist a new order.
#[derive(Debug, Clone)]
pub struct NewOrder {
    /// Idempotency key of the checkout attempt.
    pub idempotency_key: Uuid,
    /// Human-facing reference.
    pub number: OrderNumber,
    /// Buyer.
    pub customer_id: CustomerId,
    /// Line snapshots.
    pub line_items: Vec<LineItem>,
    /// Sum of line totals.
    pub subtotal: Price,
    /// Shipping charge.
    pub shipping_cost: Price,
    /// `subtotal + shipping_cost`.
    pub total: Price,
    /// Store currency.
    pub currency: CurrencyCode,
    /// Chosen payment method.
    pub payment_method: PaymentMethod,
    /// Delivery contact.
    pub contact: DeliveryContact,
}

/// A persisted order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Order {
    /// Database ID.
    pub id: OrderId,
    /// Human-facing reference.
    pub number: OrderNumber,
    /// Buyer.
    pub customer_id: CustomerId,
    /// Line snapshots.
    pub line_items: Vec<LineItem>,
    /// Sum of line totals.
    pub subtotal: Price,
    /// Shipping charge.
    pub shipping_cost: Price,
    /// `subtotal + shipping_cost`.
    pub total: Price,
    /// Store currency.
    pub currency: CurrencyCode,
    /// Chosen payment method.
    pub payment_method: PaymentMethod,
    /// Delivery contact.
    pub contact: DeliveryContact,
    /// Current status.
    pub status: OrderStatus,
    /// When the order was created.
    pub created_at: DateTime<Utc>,
    /// Status transitions, oldest first.
    pub status_history: Vec<StatusChange>,
}

impl Order {
    /// Whether this order records the same purchase as `new`: same buyer,
    /// lines and amounts. The order number is not compared.
    #[must_use]
    pub fn matches(&self, new: &NewOrder) -> bool {
        self.customer_id == new.customer_id
            && self.line_items == new.line_items
            && self.subtotal == new.subtotal
            && self.shipping_cost == new.shipping_cost
            && self.total == new.total
            && self.currency == new.currency
    }
}

/// How a caller refers to an order: by database ID or by order number.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OrderLookup {
    /// Numeric database ID.
    Id(OrderId),
    /// Order number, upper-cased.
    Number(String),
}

impl OrderLookup {
    /// Interpret a free-form reference.
    ///
    /// All-digit input is an ID; anything else is an order number. Returns
    /// `None` for blank input.
    #[must_use]
    pub fn parse(reference: &str) -> Option<Self> {
        let reference = reference.trim();
        if reference.is_empty() {
            return None;
        }
        if reference.chars().all(|c| c.is_ascii_digit()) {
            return reference.parse::<i32>().ok().map(|id| Self::Id(OrderId::new(id)));
        }
        Some(Self::Number(reference.to_uppercase()))
    }
}

impl fmt::Display for OrderLookup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Id(id) => write!(f, "#{id}"),
            Self::Number(number) => f.write_str(number),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_numbers_are_fresh() {
        let first = OrderNumber::generate();
        assert_ne!(first, OrderNumber::generate());
        assert!(first.as_str().starts_with("ORD-"));
        assert_eq!(first.as_str().len(), OrderNumber::PREFIX.len() + OrderNumber::DIGITS);
        let digits = first.as_str().strip_prefix(OrderNumber::PREFIX).unwrap_or_default();
        assert!(digits.chars().all(|c| c.is_ascii_digit() || ('A'..='F').contains(&c)));
    }

    #[test]
    fn test_lookup_parse() {
        assert_eq!(OrderLookup::parse("42"), Some(OrderLookup::Id(OrderId::new(42))));
        assert_eq!(
            OrderLookup::parse(" ord-3f9a12c4 "),
            Some(OrderLookup::Number("ORD-3F9A12C4".to_owned()))
        );
        assert_eq!(OrderLookup::parse("  "), None);
        // Too large for an ID: cannot exist
        assert_eq!(OrderLookup::parse("99999999999"), None);
    }
}
