//! Account route handlers.
//!
//! These routes require authentication.

use axum::{Json, extract::State};
use serde::Serialize;
use tower_sessions::Session;
use tracing::instrument;

use loomline_core::{Email, UserId};

use crate::error::set_sentry_user;
use crate::middleware::{RequireAuth, ShopperStorage};
use crate::state::AppState;
use crate::store::WishlistStore;

use super::cart::open_cart;

/// Signed-in user overview.
#[derive(Debug, Serialize)]
pub struct AccountResponse {
    pub id: UserId,
    pub email: Email,
    pub is_admin: bool,
    pub cart_item_count: u64,
    pub wishlist_count: usize,
}

/// Show the signed-in user.
#[instrument(skip(state, user, storage, session))]
pub async fn index(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    storage: ShopperStorage,
    session: Session,
) -> Json<AccountResponse> {
    set_sentry_user(&user.id, Some(user.email.as_str()));

    let wishlist = WishlistStore::open(storage.0.clone());
    let cart = open_cart(&state, storage, &session).await;

    Json(AccountResponse {
        is_admin: state.config().is_admin(&user.email),
        cart_item_count: cart.item_count(),
        wishlist_count: wishlist.item_count(),
        id: user.id,
        email: user.email,
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use axum::http::{Method, StatusCode};

    use crate::routes::test_support::TestApp;

    #[tokio::test]
    async fn test_anonymous_is_unauthorized() {
        let app = TestApp::new();
        let (status, _) = app.send(Method::GET, "/account", None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_signed_in_user() {
        let app = TestApp::new();
        app.sign_in("Shopper@Loomline.shop").await;

        let (status, body) = app.send(Method::GET, "/account", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["email"], "shopper@loomline.shop");
        assert_eq!(body["is_admin"], false);
        assert_eq!(body["cart_item_count"], 0);
    }
}
