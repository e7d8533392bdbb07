//! Seed the catalog from a YAML file.
//!
//! ```yaml
//! products:
//!   - name: Linen Shirt
//!     slug: linen-shirt
//!     price: "45.00"
//!     compare_at_price: "60.00"
//!     images: ["https://media.loomline.shop/.../linen-shirt.jpg"]
//!     sizes: [S, M, L]
//!     colors: [Natural, Black]
//!     stock: 12
//!     status: active
//!     category: Tops
//! ```
//!
//! Products are upserted by slug, so the same file can be applied repeatedly.
//! The whole file is validated before the database is touched.

use std::collections::HashSet;
use std::path::Path;

use rust_decimal::Decimal;
use serde::Deserialize;
use tracing::{error, info};

use loomline_core::CurrencyCode;
use loomline_storefront::db::{self, NewProduct, ProductRepository, products::slugify};

use super::{CommandError, database_url};

/// Top-level catalog file.
#[derive(Debug, Deserialize)]
pub struct CatalogFile {
    pub products: Vec<NewProduct>,
}

/// Validate a catalog, returning every problem found.
#[must_use]
pub fn validate_catalog(catalog: &CatalogFile) -> Vec<String> {
    let mut errors = Vec::new();
    let mut slugs = HashSet::new();

    for (index, product) in catalog.products.iter().enumerate() {
        let label = format!("products[{index}] ({})", product.slug);

        if product.name.trim().is_empty() {
            errors.push(format!("{label}: name is empty"));
        }
        if product.slug.is_empty() || slugify(&product.slug) != product.slug {
            errors.push(format!(
                "{label}: slug must be lowercase words joined by '-'"
            ));
        }
        if !slugs.insert(product.slug.as_str()) {
            errors.push(format!("{label}: duplicate slug"));
        }
        if product.price < Decimal::ZERO {
            errors.push(format!("{label}: price is negative"));
        }
        if product.price.scale() > 2 {
            errors.push(format!("{label}: price has more than 2 decimal places"));
        }
        if let Some(compare) = product.compare_at_price
            && compare <= product.price
        {
            errors.push(format!(
                "{label}: compare_at_price must exceed price"
            ));
        }
        if product.stock < 0 {
            errors.push(format!("{label}: stock is negative"));
        }
    }

    errors
}

/// Upsert the products in `file_path`.
///
/// # Errors
///
/// Returns an error if the file cannot be read or parsed, validation fails,
/// or a database operation fails.
pub async fn catalog(file_path: &str, dry_run: bool) -> Result<(), CommandError> {
    let path = Path::new(file_path);
    info!(path = %file_path, "Loading catalog from file");

    let content = tokio::fs::read_to_string(path).await?;
    let catalog: CatalogFile = serde_yaml::from_str(&content)?;
    info!(products = catalog.products.len(), "Parsed catalog");

    let errors = validate_catalog(&catalog);
    if !errors.is_empty() {
        error!("Catalog validation failed:");
        for err in &errors {
            error!("  - {err}");
        }
        return Err(CommandError::Validation(errors.len()));
    }
    info!("Catalog validated successfully");

    if dry_run {
        info!("Dry run, nothing written");
        return Ok(());
    }

    // Loads .env, so it must run before reading STORE_CURRENCY
    let database_url = database_url()?;
    let currency = match std::env::var("STORE_CURRENCY") {
        Ok(value) => value
            .parse::<CurrencyCode>()
            .map_err(|e| CommandError::InvalidEnvVar("STORE_CURRENCY", e))?,
        Err(_) => CurrencyCode::USD,
    };

    let pool = db::create_pool(&database_url).await?;
    info!("Connected to database");

    let repo = ProductRepository::new(&pool, currency);
    for product in &catalog.products {
        let id = repo.upsert(product).await?;
        info!(slug = %product.slug, %id, "Upserted product");
    }

    info!(count = catalog.products.len(), "Seeding complete");
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use loomline_core::ProductStatus;

    use super::*;

    const CATALOG: &str = r#"
products:
  - name: Linen Shirt
    slug: linen-shirt
    price: "45.00"
    compare_at_price: "60.00"
    sizes: [S, M, L]
    colors: [Natural]
    stock: 12
    status: active
    category: Tops
  - name: Gift Card
    slug: gift-card
    price: "25.00"
"#;

    #[test]
    fn test_parse_catalog() {
        let catalog: CatalogFile = serde_yaml::from_str(CATALOG).unwrap();
        assert_eq!(catalog.products.len(), 2);

        let shirt = &catalog.products[0];
        assert_eq!(shirt.status, ProductStatus::Active);
        assert_eq!(shirt.sizes, vec!["S", "M", "L"]);
        assert_eq!(shirt.category.as_deref(), Some("Tops"));

        let card = &catalog.products[1];
        assert_eq!(card.status, ProductStatus::Draft);
        assert!(card.colors.is_empty());

        assert!(validate_catalog(&catalog).is_empty());
    }

    #[test]
    fn test_validation_collects_all_errors() {
        let catalog: CatalogFile = serde_yaml::from_str(
            r#"
products:
  - name: ""
    slug: Linen Shirt
    price: "-1.00"
    stock: -2
  - name: Cap
    slug: cap
    price: "15.00"
    compare_at_price: "10.00"
  - name: Cap Again
    slug: cap
    price: "15.001"
"#,
        )
        .unwrap();

        let errors = validate_catalog(&catalog);
        assert!(errors.iter().any(|e| e.contains("name is empty")));
        assert!(errors.iter().any(|e| e.contains("slug must be")));
        assert!(errors.iter().any(|e| e.contains("price is negative")));
        assert!(errors.iter().any(|e| e.contains("stock is negative")));
        assert!(errors.iter().any(|e| e.contains("compare_at_price")));
        assert!(errors.iter().any(|e| e.contains("duplicate slug")));
        assert!(errors.iter().any(|e| e.contains("decimal places")));
    }
}
