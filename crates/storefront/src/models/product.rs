//! Catalog product domain type.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use loomline_core::{Price, ProductId, ProductStatus};

use crate::store::{CartProduct, NewWishlistEntry};

/// Label used for products without a category.
pub const UNCATEGORIZED: &str = "Uncategorized";

/// A catalog product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub name: String,
    pub slug: String,
    pub description: Option<String>,
    pub price: Price,
    /// Original price when the product is discounted.
    pub compare_at_price: Option<Price>,
    pub images: Vec<String>,
    pub sizes: Vec<String>,
    pub colors: Vec<String>,
    pub stock: i32,
    pub status: ProductStatus,
    pub category: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Product {
    /// Whether shoppers may add this product to a cart or wishlist.
    #[must_use]
    pub fn is_purchasable(&self) -> bool {
        self.status == ProductStatus::Active && self.price.is_positive()
    }

    /// Whether a higher compare-at price is shown next to the price.
    #[must_use]
    pub fn is_on_sale(&self) -> bool {
        self.compare_at_price
            .is_some_and(|compare| compare.amount > self.price.amount)
    }

    /// First image, used as the thumbnail.
    #[must_use]
    pub fn primary_image(&self) -> Option<&str> {
        self.images.first().map(String::as_str)
    }

    /// Snapshot captured on a cart line.
    #[must_use]
    pub fn to_cart_product(&self) -> CartProduct {
        CartProduct {
            id: self.id,
            name: self.name.clone(),
            slug: self.slug.clone(),
            price: self.price,
            image: self.primary_image().map(str::to_owned),
        }
    }

    /// Entry saved to the wishlist.
    #[must_use]
    pub fn to_wishlist_entry(&self) -> NewWishlistEntry {
        NewWishlistEntry {
            id: self.id,
            slug: self.slug.clone(),
            name: self.name.clone(),
            price: self.price,
            compare_at_price: self.compare_at_price,
            images: self.images.clone(),
            category: self
                .category
                .clone()
                .unwrap_or_else(|| UNCATEGORIZED.to_string()),
            on_sale: self.is_on_sale(),
        }
    }
}
