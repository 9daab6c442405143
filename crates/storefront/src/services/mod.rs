//! Business logic services for the storefront.
//!
//! # Services
//!
//! - `auth` - Password sign-in for returning customers
//! - `guest` - On-the-fly customer records for guest checkout
//! - `checkout` - Validate, resolve identity, price, submit, finalize
//! - `tracking` - Order progress views and status changes

pub mod auth;
pub mod checkout;
pub mod guest;
pub mod tracking;

pub use auth::{AuthError, AuthService};
pub use checkout::{
    CheckoutAttempt, CheckoutError, CheckoutForm, CheckoutOrchestrator, CheckoutReceipt,
    CheckoutSettings,
};
pub use guest::{GuestAccountProvisioner, GuestDetails, ProvisionError};
pub use tracking::{OrderLifecycle, OrderStatusTracker, StepState, TrackerView, TrackingError, track};
