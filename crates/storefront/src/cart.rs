//! Session-owned shopping cart.
//!
//! [`Cart`] is the plain, serializable state kept in the session. [`CartStore`]
//! owns a cart for the duration of a request (or a test), applies mutations
//! synchronously and publishes a [`CartSummary`] to subscribers after each one.
//!
//! Invariant: every line has `quantity >= 1`. Setting a quantity below one
//! removes the line.

use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use souq_core::{Price, ProductId};

use crate::models::Product;

/// One cart line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartItem {
    /// Product identifier.
    pub id: ProductId,
    /// Display name.
    pub name: String,
    /// Unit price taken from the catalog when the line was added.
    pub unit_price: Price,
    /// Image reference.
    pub image: Option<String>,
    /// Units, always at least one.
    pub quantity: u32,
}

impl CartItem {
    /// `unit_price × quantity`.
    #[must_use]
    pub fn line_total(&self) -> Price {
        self.unit_price.times(self.quantity)
    }
}

/// Cart contents in insertion order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cart {
    items: Vec<CartItem>,
}

impl Cart {
    /// Lines in the order they were first added.
    #[must_use]
    pub fn items(&self) -> &[CartItem] {
        &self.items
    }

    /// Look up a line by product.
    #[must_use]
    pub fn get(&self, id: &ProductId) -> Option<&CartItem> {
        self.items.iter().find(|item| &item.id == id)
    }

    /// Whether the cart has no lines.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Total units across all lines.
    #[must_use]
    pub fn item_count(&self) -> u32 {
        self.items
            .iter()
            .fold(0u32, |count, item| count.saturating_add(item.quantity))
    }

    /// Σ(unit price × quantity) over present lines.
    #[must_use]
    pub fn subtotal(&self) -> Price {
        self.items.iter().map(CartItem::line_total).sum()
    }

    /// Summary published to subscribers.
    #[must_use]
    pub fn summary(&self) -> CartSummary {
        CartSummary {
            item_count: self.item_count(),
            subtotal: self.subtotal(),
        }
    }

    fn position(&self, id: &ProductId) -> Option<usize> {
        self.items.iter().position(|item| &item.id == id)
    }
}

/// Badge-counter view of a cart.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartSummary {
    /// Total units.
    pub item_count: u32,
    /// Cart subtotal.
    pub subtotal: Price,
}

/// Owner of one session's cart.
///
/// Every store is independent; there is no process-wide cart.
#[derive(Debug)]
pub struct CartStore {
    cart: Cart,
    summary: watch::Sender<CartSummary>,
}

impl CartStore {
    /// Create a store with an empty cart.
    #[must_use]
    pub fn new() -> Self {
        Self::from_cart(Cart::default())
    }

    /// Take ownership of an existing cart (e.g. one loaded from the session).
    #[must_use]
    pub fn from_cart(cart: Cart) -> Self {
        let (summary, _) = watch::channel(cart.summary());
        Self { cart, summary }
    }

    /// Current cart contents.
    #[must_use]
    pub const fn cart(&self) -> &Cart {
        &self.cart
    }

    /// Give the cart back, e.g. to write it to the session.
    #[must_use]
    pub fn into_cart(self) -> Cart {
        self.cart
    }

    /// Receive a fresh [`CartSummary`] after every mutation.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<CartSummary> {
        self.summary.subscribe()
    }

    /// Current subtotal.
    #[must_use]
    pub fn subtotal(&self) -> Price {
        self.cart.subtotal()
    }

    /// Add `quantity` units of `product`.
    ///
    /// A product already in the cart keeps its line (and position) and has
    /// its quantity increased. A zero quantity changes nothing.
    pub fn add_item(&mut self, product: &Product, quantity: u32) {
        if quantity == 0 {
            return;
        }
        match self.cart.position(&product.id) {
            Some(index) => {
                if let Some(item) = self.cart.items.get_mut(index) {
                    item.quantity = item.quantity.saturating_add(quantity);
                }
            }
            None => self.cart.items.push(CartItem {
                id: product.id.clone(),
                name: product.name.clone(),
                unit_price: product.price,
                image: product.image.clone(),
                quantity,
            }),
        }
        self.publish();
    }

    /// Set the absolute quantity of a line.
    ///
    /// `quantity <= 0` removes the line, exactly like [`Self::remove_item`].
    /// Unknown products are ignored. Returns whether the cart changed.
    pub fn update_quantity(&mut self, id: &ProductId, quantity: i64) -> bool {
        if quantity <= 0 {
            return self.remove_item(id);
        }
        let quantity = u32::try_from(quantity).unwrap_or(u32::MAX);
        let Some(item) = self.cart.items.iter_mut().find(|item| &item.id == id) else {
            return false;
        };
        if item.quantity == quantity {
            return false;
        }
        item.quantity = quantity;
        self.publish();
        true
    }

    /// Remove a line. Returns whether it was present.
    pub fn remove_item(&mut self, id: &ProductId) -> bool {
        let Some(index) = self.cart.position(id) else {
            return false;
        };
        self.cart.items.remove(index);
        self.publish();
        true
    }

    /// Empty the cart.
    pub fn clear(&mut self) {
        self.cart.items.clear();
        self.publish();
    }

    fn publish(&self) {
        self.summary.send_replace(self.cart.summary());
    }
}

impl Default for CartStore {
    fn default() -> Self {
        Self::new()
    }
}
