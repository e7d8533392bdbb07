//! Read-through product catalog.
//!
//! Wraps [`ProductRepository`] with an in-memory `moka` cache (5 minute TTL).
//! A product fetched by slug is cached under its id too, so the add-to-cart
//! lookup that follows a product page view is served from memory.
//! Misses are not cached.

use std::sync::Arc;
use std::time::Duration;

use moka::future::Cache;
use sqlx::PgPool;
use tracing::{debug, instrument};

use loomline_core::{CurrencyCode, ProductId};

use crate::db::{ProductRepository, RepositoryError};
use crate::models::Product;

const CACHE_CAPACITY: u64 = 1000;
const CACHE_TTL: Duration = Duration::from_secs(300);

/// Cache key for product lookups.
#[derive(Debug, Clone, Hash, PartialEq, Eq)]
enum CacheKey {
    Id(ProductId),
    Slug(String),
}

/// Cached product catalog.
///
/// Cheaply cloneable via `Arc`.
#[derive(Clone)]
pub struct CatalogClient {
    inner: Arc<CatalogClientInner>,
}

struct CatalogClientInner {
    pool: PgPool,
    currency: CurrencyCode,
    cache: Cache<CacheKey, Arc<Product>>,
}

impl CatalogClient {
    /// Create a catalog over `pool`, labelling prices with `currency`.
    #[must_use]
    pub fn new(pool: PgPool, currency: CurrencyCode) -> Self {
        let cache = Cache::builder()
            .max_capacity(CACHE_CAPACITY)
            .time_to_live(CACHE_TTL)
            .build();

        Self {
            inner: Arc::new(CatalogClientInner {
                pool,
                currency,
                cache,
            }),
        }
    }

    fn repository(&self) -> ProductRepository<'_> {
        ProductRepository::new(&self.inner.pool, self.inner.currency)
    }

    /// Get a product by ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the database lookup fails.
    #[instrument(skip(self))]
    pub async fn get_by_id(&self, id: ProductId) -> Result<Option<Product>, RepositoryError> {
        if let Some(product) = self.inner.cache.get(&CacheKey::Id(id)).await {
            debug!("catalog cache hit");
            return Ok(Some(Product::clone(&product)));
        }

        let product = self.repository().get_by_id(id).await?;
        if let Some(product) = &product {
            self.cache_product(product).await;
        }
        Ok(product)
    }

    /// Get a product by slug.
    ///
    /// # Errors
    ///
    /// Returns an error if the database lookup fails.
    #[instrument(skip(self))]
    pub async fn get_by_slug(&self, slug: &str) -> Result<Option<Product>, RepositoryError> {
        let key = CacheKey::Slug(slug.to_owned());
        if let Some(product) = self.inner.cache.get(&key).await {
            debug!("catalog cache hit");
            return Ok(Some(Product::clone(&product)));
        }

        let product = self.repository().get_by_slug(slug).await?;
        if let Some(product) = &product {
            self.cache_product(product).await;
        }
        Ok(product)
    }

    /// List active products, newest first. Not cached.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn list_active(
        &self,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Product>, RepositoryError> {
        self.repository().list_active(limit, offset).await
    }

    /// Store a product under both its id and slug.
    pub async fn cache_product(&self, product: &Product) {
        let shared = Arc::new(product.clone());
        self.inner
            .cache
            .insert(CacheKey::Id(product.id), Arc::clone(&shared))
            .await;
        self.inner
            .cache
            .insert(CacheKey::Slug(product.slug.clone()), shared)
            .await;
    }

    /// Drop a cached product.
    async fn invalidate_product(&self, product: &Product) {
        self.inner.cache.invalidate(&CacheKey::Id(product.id)).await;
        self.inner
            .cache
            .invalidate(&CacheKey::Slug(product.slug.clone()))
            .await;
    }

    /// Drop the cached product with `slug`, if any, under both keys.
    ///
    /// Returns whether anything was cached.
    pub async fn invalidate_slug(&self, slug: &str) -> bool {
        let key = CacheKey::Slug(slug.to_owned());
        match self.inner.cache.get(&key).await {
            Some(product) => {
                self.invalidate_product(&product).await;
                true
            }
            None => false,
        }
    }

    /// Drop all cached products.
    pub async fn invalidate_all(&self) {
        self.inner.cache.invalidate_all();
        self.inner.cache.run_pending_tasks().await;
    }

    #[cfg(test)]
    pub(crate) async fn is_cached(&self, id: ProductId) -> bool {
        self.inner.cache.get(&CacheKey::Id(id)).await.is_some()
    }
}
