//! Session-scoped cart extractor.

use axum::{extract::FromRequestParts, http::request::Parts};
use tower_sessions::Session;

use crate::cart::{Cart, CartStore};
use crate::error::AppError;
use crate::models::session_keys;

/// The cart owned by the requesting session.
///
/// Handlers mutate `store` and call [`SessionCart::save`] to write the result
/// back. A missing or unreadable cart entry starts an empty cart.
///
/// Saving a changed cart ends the session's pending checkout attempt, so the
/// next submission is a new attempt for the new contents.
pub struct SessionCart {
    /// Session the cart was loaded from.
    pub session: Session,
    /// Cart for this request.
    pub store: CartStore,
}

impl SessionCart {
    /// Write the cart back to the session and drop any pending checkout
    /// attempt.
    ///
    /// # Errors
    ///
    /// Returns an error if the session cannot be modified.
    pub async fn save(&self) -> Result<(), tower_sessions::session::Error> {
        self.session
            .insert(session_keys::CART, self.store.cart())
            .await?;
        self.session
            .remove_value(session_keys::CHECKOUT_ATTEMPT)
            .await?;
        Ok(())
    }
}

impl<S> FromRequestParts<S> for SessionCart
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let session = parts
            .extensions
            .get::<Session>()
            .cloned()
            .ok_or_else(|| AppError::Internal("session layer missing".to_string()))?;

        let cart = match session.get::<Cart>(session_keys::CART).await {
            Ok(cart) => cart.unwrap_or_default(),
            Err(e) => {
                tracing::warn!(error = %e, "Discarding unreadable cart");
                Cart::default()
            }
        };

        Ok(Self {
            session,
            store: CartStore::from_cart(cart),
        })
    }
}
