//! Cart route handlers.
//!
//! The cart lives in the session. Every mutation answers with the current
//! cart and an `HX-Trigger: cart-updated` header so badge counters refresh.

use axum::{
    Json,
    extract::State,
    response::{AppendHeaders, IntoResponse},
};
use serde::{Deserialize, Serialize};
use tracing::instrument;

use souq_core::{CurrencyCode, Price, ProductId};

use crate::cart::{Cart, CartItem};
use crate::error::{AppError, Result};
use crate::middleware::SessionCart;
use crate::state::AppState;

/// Header telling the client the cart changed.
const CART_UPDATED: (&str, &str) = ("HX-Trigger", "cart-updated");

/// Cart as returned to the client.
#[derive(Debug, Serialize)]
pub struct CartView {
    pub items: Vec<CartLineView>,
    pub item_count: u32,
    pub subtotal: Price,
    pub currency: CurrencyCode,
}

/// One cart line as returned to the client.
#[derive(Debug, Serialize)]
pub struct CartLineView {
    pub product_id: ProductId,
    pub name: String,
    pub image: Option<String>,
    pub unit_price: Price,
    pub quantity: u32,
    pub line_total: Price,
}

impl From<&CartItem> for CartLineView {
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

impl CartView {
    fn new(cart: &Cart, currency: CurrencyCode) -> Self {
        Self {
            items: cart.items().iter().map(CartLineView::from).collect(),
            item_count: cart.item_count(),
            subtotal: cart.subtotal(),
            currency,
        }
    }
}

/// Add to cart request.
#[derive(Debug, Deserialize)]
pub struct AddToCartRequest {
    pub product_id: ProductId,
    pub quantity: Option<u32>,
}

/// Update quantity request. Zero or negative removes the line.
#[derive(Debug, Deserialize)]
pub struct UpdateCartRequest {
    pub product_id: ProductId,
    pub quantity: i64,
}

/// Remove line request.
#[derive(Debug, Deserialize)]
pub struct RemoveFromCartRequest {
    pub product_id: ProductId,
}

/// Badge count response.
#[derive(Debug, Serialize)]
pub struct CartCount {
    pub count: u32,
}

/// Show the cart.
#[instrument(skip_all)]
pub async fn show(State(state): State<AppState>, cart: SessionCart) -> Json<CartView> {
    Json(CartView::new(cart.store.cart(), state.config().checkout.currency))
}

/// Add a product to the cart.
///
/// Name, price and image come from the catalog.
#[instrument(skip(state, cart), fields(product_id = %request.product_id))]
pub async fn add(
    State(state): State<AppState>,
    mut cart: SessionCart,
    Json(request): Json<AddToCartRequest>,
) -> Result<impl IntoResponse> {
    let product = state
        .catalog()
        .find_product(&request.product_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("product {}", request.product_id)))?;

    if !product.available {
        return Err(AppError::BadRequest(format!(
            "{} is not available",
            product.name
        )));
    }

    cart.store.add_item(&product, request.quantity.unwrap_or(1));
    cart.save().await?;

    Ok((
        AppendHeaders([CART_UPDATED]),
        Json(CartView::new(cart.store.cart(), state.config().checkout.currency)),
    ))
}

/// Set the quantity of a line.
#[instrument(skip(state, cart), fields(product_id = %request.product_id))]
pub async fn update(
    State(state): State<AppState>,
    mut cart: SessionCart,
    Json(request): Json<UpdateCartRequest>,
) -> Result<impl IntoResponse> {
    if cart.store.update_quantity(&request.product_id, request.quantity) {
        cart.save().await?;
    }

    Ok((
        AppendHeaders([CART_UPDATED]),
        Json(CartView::new(cart.store.cart(), state.config().checkout.currency)),
    ))
}

/// Remove a line from the cart.
#[instrument(skip(state, cart), fields(product_id = %request.product_id))]
pub async fn remove(
    State(state): State<AppState>,
    mut cart: SessionCart,
    Json(request): Json<RemoveFromCartRequest>,
) -> Result<impl IntoResponse> {
    if cart.store.remove_item(&request.product_id) {
        cart.save().await?;
    }

    Ok((
        AppendHeaders([CART_UPDATED]),
        Json(CartView::new(cart.store.cart(), state.config().checkout.currency)),
    ))
}

/// Badge count.
pub async fn count(cart: SessionCart) -> Json<CartCount> {
    Json(CartCount {
        count: cart.store.cart().item_count(),
    })
}
