//! HTTP route handlers for storefront.
//!
//! All routes speak JSON. Errors are `{"error": "<message>"}`.
//!
//! # Route Structure
//!
//! ```text
//! # Products
//! GET    /products                       - Active products, paginated
//! GET    /products/{slug}                - Product by slug
//! GET    /products/id/{id}               - Product by id
//!
//! # Cart
//! GET    /cart                           - Lines and summary
//! DELETE /cart                           - Clear
//! POST   /cart/items                     - Add {product_id, size, color, quantity}
//! PATCH  /cart/items                     - Set quantity (0 removes)
//! DELETE /cart/items                     - Remove {product_id, size, color}
//! POST   /cart/toggle                    - Flip drawer visibility
//! GET    /cart/count                     - Header badge count
//!
//! # Wishlist
//! GET    /wishlist                       - Saved entries, newest first
//! DELETE /wishlist                       - Clear
//! POST   /wishlist/items                 - Save {product_id}
//! GET    /wishlist/items/{id}            - Membership check
//! DELETE /wishlist/items/{id}            - Remove
//!
//! # Session
//! POST   /auth/session                   - Sign in {access_token}
//! DELETE /auth/session                   - Sign out
//!
//! # Checkout
//! POST   /checkout/payment-intent        - Create intent for cart total
//! GET    /checkout/payment-intent/{id}   - Status of this session's intent;
//!                                          clears cart once paid
//!
//! # Account (requires auth)
//! GET    /account                        - Signed-in user overview
//!
//! # Admin (requires admin)
//! POST   /admin/media                    - Upload image (multipart)
//! GET    /admin/media?folder=            - List images
//! DELETE /admin/media                    - Delete {paths}
//! POST   /admin/catalog/refresh?slug=    - Drop cached products
//! ```

pub mod account;
pub mod admin;
pub mod auth;
pub mod cart;
pub mod checkout;
pub mod products;
pub mod wishlist;

use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{get, post},
};

use crate::media::MAX_UPLOAD_BYTES;
use crate::state::AppState;

/// Create the product routes router.
pub fn product_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(products::index))
        .route("/{slug}", get(products::show))
        .route("/id/{id}", get(products::show_by_id))
}

/// Create the cart routes router.
pub fn cart_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(cart::show).delete(cart::clear))
        .route(
            "/items",
            post(cart::add).patch(cart::update).delete(cart::remove),
        )
        .route("/toggle", post(cart::toggle))
        .route("/count", get(cart::count))
}

/// Create the wishlist routes router.
pub fn wishlist_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(wishlist::show).delete(wishlist::clear))
        .route("/items", post(wishlist::add))
        .route(
            "/items/{id}",
            get(wishlist::contains).delete(wishlist::remove),
        )
}

/// Create the checkout routes router.
pub fn checkout_routes() -> Router<AppState> {
    Router::new()
        .route("/payment-intent", post(checkout::create_payment_intent))
        .route(
            "/payment-intent/{id}",
            get(checkout::payment_intent_status),
        )
}

/// Create the session routes router.
pub fn auth_routes() -> Router<AppState> {
    Router::new().route("/session", post(auth::sign_in).delete(auth::sign_out))
}

/// Create the admin routes router.
pub fn admin_routes() -> Router<AppState> {
    Router::new()
        .route("/catalog/refresh", post(admin::refresh_catalog))
        .route(
            "/media",
            get(admin::list).post(admin::upload).delete(admin::delete),
        )
        .layer(DefaultBodyLimit::max(
            MAX_UPLOAD_BYTES + admin::MULTIPART_OVERHEAD_BYTES,
        ))
}

/// Create all routes for the storefront.
pub fn routes() -> Router<AppState> {
    Router::new()
        .nest("/products", product_routes())
        .nest("/cart", cart_routes())
        .nest("/wishlist", wishlist_routes())
        .nest("/auth", auth_routes())
        .nest("/checkout", checkout_routes())
        .route("/account", get(account::index))
        .nest("/admin", admin_routes())
}
