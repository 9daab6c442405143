//! HTTP middleware stack for the storefront.
//!
//! # Middleware Order (bottom to top in Router)
//!
//! 1. Sentry layer (capture errors)
//! 2. `TraceLayer` (request tracing)
//! 3. Session layer (tower-sessions with `PostgreSQL` store)
//!
//! The session carries the buyer identity and the cart. Both are read and
//! written through the helpers in [`auth`] and [`cart`].

pub mod auth;
pub mod cart;
pub mod session;

pub use auth::{OptionalAuth, RequireAuth, clear_current_customer, set_current_customer};
pub use cart::SessionCart;
pub use session::create_session_layer;
