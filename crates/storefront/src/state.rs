//! Application state shared across handlers.

use std::sync::Arc;

use sqlx::PgPool;

use crate::catalog::CatalogClient;
use crate::config::StorefrontConfig;
use crate::identity::{IdentityClient, IdentityError};
use crate::media::{MediaClient, MediaError};
use crate::payments::{PaymentClient, PaymentError};
use crate::storage::{FileBackend, StorageError, StorageService};

/// Error building application state.
#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error("storage: {0}")]
    Storage(#[from] StorageError),
    #[error("payment client: {0}")]
    Payment(#[from] PaymentError),
    #[error("media client: {0}")]
    Media(#[from] MediaError),
    #[error("identity client: {0}")]
    Identity(#[from] IdentityError),
}

/// Application state shared across all handlers.
///
/// This struct is cheaply cloneable via `Arc` and provides access to
/// shared resources like database connections and configuration.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: StorefrontConfig,
    pool: PgPool,
    catalog: CatalogClient,
    storage: StorageService,
    payments: PaymentClient,
    media: MediaClient,
    identity: IdentityClient,
}

impl AppState {
    /// Create a new application state.
    ///
    /// Shopper storage is file-backed when `storage_dir` is configured and
    /// in-memory otherwise.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage directory cannot be created or an
    /// HTTP client fails to build.
    pub fn new(config: StorefrontConfig, pool: PgPool) -> Result<Self, StateError> {
        let storage = match &config.storage_dir {
            Some(dir) => {
                let backend = FileBackend::open(dir)?;
                tracing::info!(dir = %dir.display(), "Using file storage backend");
                StorageService::new(Arc::new(backend))
            }
            None => {
                tracing::warn!("STOREFRONT_STORAGE_DIR not set; carts and wishlists are in-memory");
                StorageService::in_memory()
            }
        };

        Self::with_storage(config, pool, storage)
    }

    /// Create application state around an existing storage service.
    ///
    /// # Errors
    ///
    /// Returns an error if an HTTP client fails to build.
    pub fn with_storage(
        config: StorefrontConfig,
        pool: PgPool,
        storage: StorageService,
    ) -> Result<Self, StateError> {
        let catalog = CatalogClient::new(pool.clone(), config.currency);
        let payments = PaymentClient::new(&config.payments)?;
        let media = MediaClient::new(&config.media)?;
        let identity = IdentityClient::new(&config.identity)?;

        Ok(Self {
            inner: Arc::new(AppStateInner {
                config,
                pool,
                catalog,
                storage,
                payments,
                media,
                identity,
            }),
        })
    }

    /// Get a reference to the storefront configuration.
    #[must_use]
    pub fn config(&self) -> &StorefrontConfig {
        &self.inner.config
    }

    /// Get a reference to the database connection pool.
    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.inner.pool
    }

    /// Get a reference to the cached product catalog.
    #[must_use]
    pub fn catalog(&self) -> &CatalogClient {
        &self.inner.catalog
    }

    /// Get a reference to shopper storage.
    #[must_use]
    pub fn storage(&self) -> &StorageService {
        &self.inner.storage
    }

    /// Get a reference to the payment client.
    #[must_use]
    pub fn payments(&self) -> &PaymentClient {
        &self.inner.payments
    }

    /// Get a reference to the media client.
    #[must_use]
    pub fn media(&self) -> &MediaClient {
        &self.inner.media
    }

    /// Get a reference to the identity provider client.
    #[must_use]
    pub fn identity(&self) -> &IdentityClient {
        &self.inner.identity
    }
}
