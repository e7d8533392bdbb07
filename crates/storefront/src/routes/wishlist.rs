//! Wishlist route handlers.

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use serde::{Deserialize, Serialize};
use tracing::instrument;

use loomline_core::ProductId;

use crate::error::{AppError, Result, add_breadcrumb};
use crate::middleware::ShopperStorage;
use crate::state::AppState;
use crate::store::{WishlistEntry, WishlistStore};

/// Saved entries, newest first.
#[derive(Debug, Serialize)]
pub struct WishlistResponse {
    pub items: Vec<WishlistEntry>,
    pub count: usize,
}

impl From<&WishlistStore> for WishlistResponse {
    fn from(wishlist: &WishlistStore) -> Self {
        Self {
            items: wishlist.items().to_vec(),
            count: wishlist.item_count(),
        }
    }
}

/// Save request body.
#[derive(Debug, Deserialize)]
pub struct AddToWishlistRequest {
    pub product_id: ProductId,
}

/// Result of a save.
#[derive(Debug, Serialize)]
pub struct AddToWishlistResponse {
    /// False when the product was already saved.
    pub added: bool,
    pub count: usize,
}

/// Membership check result.
#[derive(Debug, Serialize)]
pub struct Membership {
    pub in_wishlist: bool,
}

/// Show the wishlist.
#[instrument(skip(storage))]
pub async fn show(storage: ShopperStorage) -> Json<WishlistResponse> {
    let wishlist = WishlistStore::open(storage.0);
    Json(WishlistResponse::from(&wishlist))
}

/// Save a product. Saving twice keeps the original entry.
#[instrument(skip(state, storage), fields(product_id = %request.product_id))]
pub async fn add(
    State(state): State<AppState>,
    storage: ShopperStorage,
    Json(request): Json<AddToWishlistRequest>,
) -> Result<(StatusCode, Json<AddToWishlistResponse>)> {
    let product = state
        .catalog()
        .get_by_id(request.product_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("product {}", request.product_id)))?;
    if !product.is_purchasable() {
        return Err(AppError::BadRequest(format!(
            "product {} is not available",
            product.slug
        )));
    }

    let mut wishlist = WishlistStore::open(storage.0);
    let added = wishlist.add_item(product.to_wishlist_entry());
    if added {
        let product_id = product.id.to_string();
        add_breadcrumb(
            "wishlist",
            "Saved to wishlist",
            Some(&[("product_id", &product_id)]),
        );
    }

    let status = if added {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    Ok((
        status,
        Json(AddToWishlistResponse {
            added,
            count: wishlist.item_count(),
        }),
    ))
}

/// Remove a saved product. Removing an unsaved product is not an error.
#[instrument(skip(storage))]
pub async fn remove(storage: ShopperStorage, Path(id): Path<ProductId>) -> Json<WishlistResponse> {
    let mut wishlist = WishlistStore::open(storage.0);
    wishlist.remove_item(id);
    Json(WishlistResponse::from(&wishlist))
}

/// Whether a product is saved.
#[instrument(skip(storage))]
pub async fn contains(storage: ShopperStorage, Path(id): Path<ProductId>) -> Json<Membership> {
    let wishlist = WishlistStore::open(storage.0);
    Json(Membership {
        in_wishlist: wishlist.is_in_wishlist(id),
    })
}

/// Remove every saved product.
#[instrument(skip(storage))]
pub async fn clear(storage: ShopperStorage) -> Json<WishlistResponse> {
    let mut wishlist = WishlistStore::open(storage.0);
    wishlist.clear_wishlist();
    Json(WishlistResponse::from(&wishlist))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use axum::http::Method;
    use serde_json::json;

    use super::*;
    use crate::models::product::tests::sample_product;
    use crate::routes::test_support::TestApp;

    #[tokio::test]
    async fn test_add_is_idempotent_and_newest_first() {
        let app = TestApp::new();
        let jacket = sample_product("rain-jacket", "120.00");
        let scarf = sample_product("silk-scarf", "30.00");
        app.stock(&jacket).await;
        app.stock(&scarf).await;

        let (status, body) = app
            .send(Method::POST, "/wishlist/items", Some(json!({"product_id": jacket.id})))
            .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["added"], true);

        let (status, body) = app
            .send(Method::POST, "/wishlist/items", Some(json!({"product_id": jacket.id})))
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["added"], false);
        assert_eq!(body["count"], 1);

        app.send(Method::POST, "/wishlist/items", Some(json!({"product_id": scarf.id})))
            .await;

        let (_, list) = app.send(Method::GET, "/wishlist", None).await;
        assert_eq!(list["count"], 2);
        assert_eq!(list["items"][0]["slug"], "silk-scarf");
        assert_eq!(list["items"][1]["slug"], "rain-jacket");
        assert_eq!(list["items"][1]["category"], "Tops");
    }

    #[tokio::test]
    async fn test_membership_and_remove() {
        let app = TestApp::new();
        let jacket = sample_product("rain-jacket", "120.00");
        app.stock(&jacket).await;
        app.send(Method::POST, "/wishlist/items", Some(json!({"product_id": jacket.id})))
            .await;

        let uri = format!("/wishlist/items/{}", jacket.id);
        let (_, membership) = app.send(Method::GET, &uri, None).await;
        assert_eq!(membership["in_wishlist"], true);

        let (status, list) = app.send(Method::DELETE, &uri, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(list["count"], 0);

        let (_, membership) = app.send(Method::GET, &uri, None).await;
        assert_eq!(membership["in_wishlist"], false);

        let (status, _) = app.send(Method::DELETE, &uri, None).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_clear() {
        let app = TestApp::new();
        let jacket = sample_product("rain-jacket", "120.00");
        app.stock(&jacket).await;
        app.send(Method::POST, "/wishlist/items", Some(json!({"product_id": jacket.id})))
            .await;

        let (_, list) = app.send(Method::DELETE, "/wishlist", None).await;
        assert_eq!(list["count"], 0);
        assert!(list["items"].as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_archived_product_rejected() {
        let app = TestApp::new();
        let mut old = sample_product("old-coat", "80.00");
        old.status = loomline_core::ProductStatus::Archived;
        app.stock(&old).await;

        let (status, _) = app
            .send(Method::POST, "/wishlist/items", Some(json!({"product_id": old.id})))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }
}
