//! Domain models for the storefront.
//!
//! These types represent validated domain objects, separate from database row
//! types and from HTTP request/response shapes.

pub mod customer;
pub mod order;
pub mod product;
pub mod session;

pub use customer::{Customer, NewCustomer};
pub use order::{
    DeliveryContact, LineItem, NewOrder, Order, OrderLookup, OrderNumber, ShippingDestination,
    StatusChange,
};
pub use product::Product;
pub use session::{CurrentCustomer, keys as session_keys};
