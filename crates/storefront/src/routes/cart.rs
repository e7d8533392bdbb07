//! Cart route handlers.
//!
//! Each request opens the shopper's [`CartStore`] from their storage
//! partition, applies one operation and answers with the resulting cart.
//! Product data for new lines comes from the catalog, never from the client.

use axum::{Json, extract::State};
use serde::{Deserialize, Serialize};
use tower_sessions::Session;
use tracing::instrument;

use loomline_core::ProductId;

use crate::error::{AppError, Result, add_breadcrumb};
use crate::middleware::ShopperStorage;
use crate::models::{Product, session_keys};
use crate::state::AppState;
use crate::store::{CartLine, CartStore, CartSummary};

/// Largest quantity a single line may hold.
pub const MAX_LINE_QUANTITY: u32 = 99;

/// Cart contents with derived values.
#[derive(Debug, Serialize)]
pub struct CartResponse {
    pub items: Vec<CartLine>,
    pub summary: CartSummary,
}

impl From<&CartStore> for CartResponse {
    fn from(cart: &CartStore) -> Self {
        Self {
            items: cart.items().to_vec(),
            summary: cart.summary(),
        }
    }
}

/// Add-to-cart request body.
#[derive(Debug, Deserialize)]
pub struct AddItemRequest {
    pub product_id: ProductId,
    #[serde(default)]
    pub size: String,
    #[serde(default)]
    pub color: String,
    #[serde(default = "default_quantity")]
    pub quantity: u32,
}

const fn default_quantity() -> u32 {
    1
}

/// Quantity update request body. A quantity of 0 removes the line.
#[derive(Debug, Deserialize)]
pub struct UpdateItemRequest {
    pub product_id: ProductId,
    #[serde(default)]
    pub size: String,
    #[serde(default)]
    pub color: String,
    pub quantity: u32,
}

/// Line removal request body.
#[derive(Debug, Deserialize)]
pub struct RemoveItemRequest {
    pub product_id: ProductId,
    #[serde(default)]
    pub size: String,
    #[serde(default)]
    pub color: String,
}

/// Cart count badge.
#[derive(Debug, Serialize)]
pub struct CartCount {
    pub count: u64,
}

/// Open the shopper's cart with the drawer flag restored from the session.
pub(crate) async fn open_cart(
    state: &AppState,
    storage: ShopperStorage,
    session: &Session,
) -> CartStore {
    let mut cart = CartStore::open(storage.0, state.config().currency);
    let drawer_open = session
        .get::<bool>(session_keys::CART_OPEN)
        .await
        .ok()
        .flatten()
        .unwrap_or(false);
    if drawer_open {
        cart.toggle_cart();
    }
    cart
}

/// Check a requested size or color against the product's options.
///
/// Products without options accept only the empty string.
fn validate_option(kind: &str, value: &str, options: &[String]) -> Result<()> {
    let valid = if options.is_empty() {
        value.is_empty()
    } else {
        options.iter().any(|o| o == value)
    };
    if valid {
        Ok(())
    } else {
        Err(AppError::BadRequest(format!("invalid {kind}: '{value}'")))
    }
}

fn validate_quantity(quantity: u32) -> Result<()> {
    if quantity == 0 || quantity > MAX_LINE_QUANTITY {
        return Err(AppError::BadRequest(format!(
            "quantity must be between 1 and {MAX_LINE_QUANTITY}"
        )));
    }
    Ok(())
}

fn validate_addable(product: &Product, request: &AddItemRequest) -> Result<()> {
    if !product.is_purchasable() {
        return Err(AppError::BadRequest(format!(
            "product {} is not available",
            product.slug
        )));
    }
    if product.stock <= 0 {
        return Err(AppError::BadRequest(format!(
            "product {} is out of stock",
            product.slug
        )));
    }
    validate_option("size", &request.size, &product.sizes)?;
    validate_option("color", &request.color, &product.colors)
}

/// Show the cart.
#[instrument(skip(state, storage, session))]
pub async fn show(
    State(state): State<AppState>,
    storage: ShopperStorage,
    session: Session,
) -> Json<CartResponse> {
    let cart = open_cart(&state, storage, &session).await;
    Json(CartResponse::from(&cart))
}

/// Add a product configuration to the cart.
#[instrument(skip(state, storage, session), fields(product_id = %request.product_id))]
pub async fn add(
    State(state): State<AppState>,
    storage: ShopperStorage,
    session: Session,
    Json(request): Json<AddItemRequest>,
) -> Result<Json<CartResponse>> {
    validate_quantity(request.quantity)?;

    let product = state
        .catalog()
        .get_by_id(request.product_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("product {}", request.product_id)))?;
    validate_addable(&product, &request)?;

    let mut cart = open_cart(&state, storage, &session).await;
    let merged_quantity = cart
        .items()
        .iter()
        .find(|line| {
            line.product.id == product.id && line.size == request.size && line.color == request.color
        })
        .map_or(0, |line| line.quantity)
        .saturating_add(request.quantity);
    if merged_quantity > MAX_LINE_QUANTITY {
        return Err(AppError::BadRequest(format!(
            "a line may hold at most {MAX_LINE_QUANTITY}"
        )));
    }

    cart.add_item(
        product.to_cart_product(),
        request.size,
        request.color,
        request.quantity,
    );

    let product_id = product.id.to_string();
    add_breadcrumb("cart", "Added to cart", Some(&[("product_id", &product_id)]));
    tracing::info!(item_count = cart.item_count(), "Cart updated");

    Ok(Json(CartResponse::from(&cart)))
}

/// Change a line's quantity; 0 removes the line.
#[instrument(skip(state, storage, session), fields(product_id = %request.product_id))]
pub async fn update(
    State(state): State<AppState>,
    storage: ShopperStorage,
    session: Session,
    Json(request): Json<UpdateItemRequest>,
) -> Result<Json<CartResponse>> {
    if request.quantity > MAX_LINE_QUANTITY {
        return Err(AppError::BadRequest(format!(
            "quantity must be at most {MAX_LINE_QUANTITY}"
        )));
    }

    let mut cart = open_cart(&state, storage, &session).await;
    let exists = cart.items().iter().any(|line| {
        line.product.id == request.product_id
            && line.size == request.size
            && line.color == request.color
    });
    if !exists {
        return Err(AppError::NotFound("cart line".to_string()));
    }

    if request.quantity == 0 {
        cart.remove_item(request.product_id, &request.size, &request.color);
    } else {
        cart.update_quantity(
            request.product_id,
            &request.size,
            &request.color,
            request.quantity,
        );
    }

    Ok(Json(CartResponse::from(&cart)))
}

/// Remove a line. Removing an absent line is not an error.
#[instrument(skip(state, storage, session), fields(product_id = %request.product_id))]
pub async fn remove(
    State(state): State<AppState>,
    storage: ShopperStorage,
    session: Session,
    Json(request): Json<RemoveItemRequest>,
) -> Json<CartResponse> {
    let mut cart = open_cart(&state, storage, &session).await;
    cart.remove_item(request.product_id, &request.size, &request.color);
    Json(CartResponse::from(&cart))
}

/// Empty the cart.
#[instrument(skip(state, storage, session))]
pub async fn clear(
    State(state): State<AppState>,
    storage: ShopperStorage,
    session: Session,
) -> Json<CartResponse> {
    let mut cart = open_cart(&state, storage, &session).await;
    cart.clear_cart();
    Json(CartResponse::from(&cart))
}

/// Flip the cart drawer. The flag lives in the session, not in storage.
#[instrument(skip(state, storage, session))]
pub async fn toggle(
    State(state): State<AppState>,
    storage: ShopperStorage,
    session: Session,
) -> Result<Json<CartSummary>> {
    let mut cart = open_cart(&state, storage, &session).await;
    cart.toggle_cart();
    session
        .insert(session_keys::CART_OPEN, cart.is_open())
        .await
        .map_err(|e| AppError::Internal(format!("session: {e}")))?;
    Ok(Json(cart.summary()))
}

/// Item count for the header badge.
#[instrument(skip(state, storage, session))]
pub async fn count(
    State(state): State<AppState>,
    storage: ShopperStorage,
    session: Session,
) -> Json<CartCount> {
    let cart = open_cart(&state, storage, &session).await;
    Json(CartCount {
        count: cart.item_count(),
    })
}
