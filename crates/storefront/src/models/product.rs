//! Catalog product.

use serde::{Deserialize, Serialize};

use souq_core::{Price, ProductId};

/// A sellable product.
///
/// This is the one product shape the cart and checkout work with. Catalog
/// sources with other layouts are adapted to it where they are read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    /// Catalog identifier.
    pub id: ProductId,
    /// Display name.
    pub name: String,
    /// Current unit price.
    pub price: Price,
    /// Image URL or path, if the product has one.
    pub image: Option<String>,
    /// Whether the product can currently be added to a cart.
    pub available: bool,
}
