//! Product repository.
//!
//! Runtime-checked `query_as` queries over `storefront.product`, joined with
//! the category label. Rows are converted into [`Product`] domain values.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::PgPool;
use uuid::Uuid;

use loomline_core::{CurrencyCode, Price, ProductId, ProductStatus};

use super::RepositoryError;
use crate::models::Product;

const PRODUCT_COLUMNS: &str = r"
    p.id, p.name, p.slug, p.description, p.price, p.compare_at_price,
    p.images, p.sizes, p.colors, p.stock, p.status,
    c.name AS category,
    p.created_at, p.updated_at
";

#[derive(Debug, sqlx::FromRow)]
struct ProductRow {
    id: Uuid,
    name: String,
    slug: String,
    description: Option<String>,
    price: Decimal,
    compare_at_price: Option<Decimal>,
    images: Vec<String>,
    sizes: Vec<String>,
    colors: Vec<String>,
    stock: i32,
    status: String,
    category: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl ProductRow {
    fn into_product(self, currency: CurrencyCode) -> Result<Product, RepositoryError> {
        let status = self.status.parse::<ProductStatus>().map_err(|e| {
            RepositoryError::DataCorruption(format!("product {}: {e}", self.id))
        })?;

        Ok(Product {
            id: ProductId::new(self.id),
            name: self.name,
            slug: self.slug,
            description: self.description,
            price: Price::new(self.price, currency),
            compare_at_price: self.compare_at_price.map(|p| Price::new(p, currency)),
            images: self.images,
            sizes: self.sizes,
            colors: self.colors,
            stock: self.stock,
            status,
            category: self.category,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

/// Fields for creating or replacing a product (keyed by slug).
#[derive(Debug, Clone, PartialEq, Eq, serde::Deserialize)]
pub struct NewProduct {
    pub name: String,
    pub slug: String,
    #[serde(default)]
    pub description: Option<String>,
    pub price: Decimal,
    #[serde(default)]
    pub compare_at_price: Option<Decimal>,
    #[serde(default)]
    pub images: Vec<String>,
    #[serde(default)]
    pub sizes: Vec<String>,
    #[serde(default)]
    pub colors: Vec<String>,
    #[serde(default)]
    pub stock: i32,
    #[serde(default)]
    pub status: ProductStatus,
    #[serde(default)]
    pub category: Option<String>,
}

/// Repository for catalog product queries.
pub struct ProductRepository<'a> {
    pool: &'a PgPool,
    currency: CurrencyCode,
}

impl<'a> ProductRepository<'a> {
    /// Create a new product repository. Prices are labelled with `currency`.
    #[must_use]
    pub const fn new(pool: &'a PgPool, currency: CurrencyCode) -> Self {
        Self { pool, currency }
    }

    /// Get a product by ID.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    /// Returns `RepositoryError::DataCorruption` if the stored status is invalid.
    pub async fn get_by_id(&self, id: ProductId) -> Result<Option<Product>, RepositoryError> {
        let row = sqlx::query_as::<_, ProductRow>(&format!(
            "SELECT {PRODUCT_COLUMNS}
             FROM storefront.product p
             LEFT JOIN storefront.category c ON c.id = p.category_id
             WHERE p.id = $1"
        ))
        .bind(id)
        .fetch_optional(self.pool)
        .await?;

        row.map(|r| r.into_product(self.currency)).transpose()
    }

    /// Get a product by its URL slug.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    /// Returns `RepositoryError::DataCorruption` if the stored status is invalid.
    pub async fn get_by_slug(&self, slug: &str) -> Result<Option<Product>, RepositoryError> {
        let row = sqlx::query_as::<_, ProductRow>(&format!(
            "SELECT {PRODUCT_COLUMNS}
             FROM storefront.product p
             LEFT JOIN storefront.category c ON c.id = p.category_id
             WHERE p.slug = $1"
        ))
        .bind(slug)
        .fetch_optional(self.pool)
        .await?;

        row.map(|r| r.into_product(self.currency)).transpose()
    }

    /// List active products, newest first.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list_active(
        &self,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Product>, RepositoryError> {
        let rows = sqlx::query_as::<_, ProductRow>(&format!(
            "SELECT {PRODUCT_COLUMNS}
             FROM storefront.product p
             LEFT JOIN storefront.category c ON c.id = p.category_id
             WHERE p.status = 'active'
             ORDER BY p.created_at DESC
             LIMIT $1 OFFSET $2"
        ))
        .bind(limit)
        .bind(offset)
        .fetch_all(self.pool)
        .await?;

        rows.into_iter()
            .map(|r| r.into_product(self.currency))
            .collect()
    }

    /// Insert a product, or replace the one with the same slug.
    ///
    /// The category is created on first use.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Conflict` on constraint violations.
    /// Returns `RepositoryError::Database` for other database errors.
    pub async fn upsert(&self, product: &NewProduct) -> Result<ProductId, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let category_id: Option<Uuid> = match &product.category {
            Some(name) => Some(
                sqlx::query_scalar(
                    r"
                    INSERT INTO storefront.category (name, slug)
                    VALUES ($1, $2)
                    ON CONFLICT (name) DO UPDATE SET name = EXCLUDED.name
                    RETURNING id
                    ",
                )
                .bind(name)
                .bind(slugify(name))
                .fetch_one(&mut *tx)
                .await?,
            ),
            None => None,
        };

        let id: Uuid = sqlx::query_scalar(
            r"
            INSERT INTO storefront.product
                (name, slug, description, price, compare_at_price, images, sizes,
                 colors, stock, status, category_id)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            ON CONFLICT (slug) DO UPDATE SET
                name = EXCLUDED.name,
                description = EXCLUDED.description,
                price = EXCLUDED.price,
                compare_at_price = EXCLUDED.compare_at_price,
                images = EXCLUDED.images,
                sizes = EXCLUDED.sizes,
                colors = EXCLUDED.colors,
                stock = EXCLUDED.stock,
                status = EXCLUDED.status,
                category_id = EXCLUDED.category_id,
                updated_at = NOW()
            RETURNING id
            ",
        )
        .bind(&product.name)
        .bind(&product.slug)
        .bind(&product.description)
        .bind(product.price)
        .bind(product.compare_at_price)
        .bind(&product.images)
        .bind(&product.sizes)
        .bind(&product.colors)
        .bind(product.stock)
        .bind(product.status.as_str())
        .bind(category_id)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| {
            if let sqlx::Error::Database(ref db_err) = e
                && db_err.is_check_violation()
            {
                return RepositoryError::Conflict(format!("product {}: {db_err}", product.slug));
            }
            RepositoryError::Database(e)
        })?;

        tx.commit().await?;
        Ok(ProductId::new(id))
    }
}

/// Lower-case, hyphen-separated slug for a display name.
#[must_use]
pub fn slugify(name: &str) -> String {
    name.split(|c: char| !c.is_alphanumeric())
        .filter(|part| !part.is_empty())
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join("-")
}
