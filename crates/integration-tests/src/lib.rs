//! Integration tests for Loomline.
//!
//! # Running Tests
//!
//! ```bash
//! # In-process tests (no database or network needed)
//! cargo test -p loomline-integration-tests
//!
//! # Against a running storefront (requires PostgreSQL and seeded catalog)
//! STOREFRONT_BASE_URL=http://localhost:3000 \
//!     cargo test -p loomline-integration-tests -- --ignored
//! ```
//!
//! # Test Categories
//!
//! - `storage_persistence` - cart and wishlist survive a storage restart
//! - `cross_context_sync` - wishlist views follow writes from other contexts
//! - `cart_flow` - cart and wishlist over HTTP, in process
//! - `storefront_live` - smoke tests against a deployed storefront
//!
//! This crate's helpers build a storefront whose database pool never
//! connects. Products are stocked directly into the catalog cache.

#![cfg_attr(not(test), forbid(unsafe_code))]

use std::sync::Arc;

use axum::{
    Router,
    body::Body,
    http::{Method, Request, StatusCode, header},
};
use chrono::Utc;
use http_body_util::BodyExt;
use parking_lot::Mutex;
use rust_decimal::Decimal;
use secrecy::SecretString;
use sqlx::postgres::PgPoolOptions;
use tower::ServiceExt;
use tower_sessions::MemoryStore;

use loomline_core::{CurrencyCode, Price, ProductId, ProductStatus};
use loomline_storefront::app::build_router;
use loomline_storefront::config::{IdentityConfig, MediaConfig, PaymentConfig, StorefrontConfig};
use loomline_storefront::models::Product;
use loomline_storefront::state::AppState;
use loomline_storefront::storage::StorageService;

/// Base URL of a running storefront for live tests.
#[must_use]
pub fn storefront_base_url() -> String {
    std::env::var("STOREFRONT_BASE_URL").unwrap_or_else(|_| "http://localhost:3000".to_string())
}

/// Configuration with unreachable upstreams.
///
/// # Panics
///
/// Never in practice; the literals are valid.
#[must_use]
pub fn test_config() -> StorefrontConfig {
    StorefrontConfig {
        database_url: SecretString::from("postgres://127.0.0.1:9/loomline_test"),
        host: "127.0.0.1".parse().expect("valid ip"),
        port: 3000,
        base_url: "http://localhost:3000".to_string(),
        storage_dir: None,
        currency: CurrencyCode::USD,
        payments: PaymentConfig {
            api_base: "http://127.0.0.1:9".to_string(),
            secret_key: SecretString::from("sk_test_integration"),
        },
        media: MediaConfig {
            base_url: "http://127.0.0.1:9".to_string(),
            bucket: "product-images".to_string(),
            service_key: SecretString::from("service_key_integration"),
        },
        identity: IdentityConfig {
            base_url: "http://127.0.0.1:9".to_string(),
            api_key: SecretString::from("anon_key_integration"),
        },
        admin_emails: vec!["owner@loomline.shop".parse().expect("valid email")],
        sentry_dsn: None,
        sentry_environment: None,
        sentry_sample_rate: 1.0,
        sentry_traces_sample_rate: 0.0,
    }
}

/// An active USD product with sizes S/M/L in Black and Natural.
///
/// # Panics
///
/// Panics if `price` is not a decimal.
#[must_use]
pub fn product(slug: &str, price: &str) -> Product {
    let now = Utc::now();
    let amount: Decimal = price.parse().expect("decimal price");
    Product {
        id: ProductId::generate(),
        name: slug.replace('-', " "),
        slug: slug.to_string(),
        description: None,
        price: Price::new(amount, CurrencyCode::USD),
        compare_at_price: None,
        images: vec![format!("https://media.loomline.shop/{slug}.jpg")],
        sizes: vec!["S".into(), "M".into(), "L".into()],
        colors: vec!["Black".into(), "Natural".into()],
        stock: 20,
        status: ProductStatus::Active,
        category: Some("Tops".into()),
        created_at: now,
        updated_at: now,
    }
}

/// A full storefront router running in process.
#[derive(Clone)]
pub struct TestStorefront {
    state: AppState,
    router: Router,
}

impl TestStorefront {
    /// Storefront over the given storage with in-memory sessions.
    ///
    /// # Panics
    ///
    /// Panics if the lazy pool or state cannot be built.
    #[must_use]
    pub fn new(storage: StorageService) -> Self {
        let pool = PgPoolOptions::new()
            .acquire_timeout(std::time::Duration::from_millis(200))
            .connect_lazy("postgres://127.0.0.1:9/loomline_test")
            .expect("lazy pool");
        let state = AppState::with_storage(test_config(), pool, storage).expect("app state");
        let router = build_router(state.clone(), MemoryStore::default());
        Self { state, router }
    }

    /// Application state shared by every shopper.
    #[must_use]
    pub const fn state(&self) -> &AppState {
        &self.state
    }

    /// Make `product` visible to catalog lookups.
    pub async fn stock(&self, product: &Product) {
        self.state.catalog().cache_product(product).await;
    }

    /// A new shopper with an empty cookie jar.
    #[must_use]
    pub fn shopper(&self) -> Shopper {
        Shopper {
            router: self.router.clone(),
            cookie: Arc::new(Mutex::new(None)),
        }
    }
}

/// One shopper's session against a [`TestStorefront`].
#[derive(Clone)]
pub struct Shopper {
    router: Router,
    cookie: Arc<Mutex<Option<String>>>,
}

impl Shopper {
    /// Session cookie (`name=value`) once the server has set one.
    #[must_use]
    pub fn cookie(&self) -> Option<String> {
        self.cookie.lock().clone()
    }

    /// Send a request with an optional JSON body.
    ///
    /// # Panics
    ///
    /// Panics if the request cannot be built or the router fails.
    pub async fn send(
        &self,
        method: Method,
        uri: &str,
        body: Option<serde_json::Value>,
    ) -> (StatusCode, serde_json::Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if body.is_some() {
            builder = builder.header(header::CONTENT_TYPE, "application/json");
        }
        if let Some(cookie) = self.cookie() {
            builder = builder.header(header::COOKIE, cookie);
        }
        let body = body.map_or_else(Body::empty, |b| Body::from(b.to_string()));

        let response = self
            .router
            .clone()
            .oneshot(builder.body(body).expect("request"))
            .await
            .expect("router is infallible");

        if let Some(pair) = response
            .headers()
            .get(header::SET_COOKIE)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(';').next())
        {
            *self.cookie.lock() = Some(pair.to_string());
        }

        let status = response.status();
        let bytes = response
            .into_body()
            .collect()
            .await
            .expect("body")
            .to_bytes();
        let json = serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);
        (status, json)
    }
}
