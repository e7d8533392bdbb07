//! Product route handlers.
//!
//! Draft and archived products are hidden from shoppers (404).

use axum::{
    Json,
    extract::{Path, Query, State},
};
use serde::{Deserialize, Serialize};
use tracing::instrument;

use loomline_core::{ProductId, ProductStatus};

use crate::error::{AppError, Result};
use crate::models::Product;
use crate::state::AppState;

const DEFAULT_PER_PAGE: u32 = 24;
const MAX_PER_PAGE: u32 = 100;

/// Pagination query parameters.
#[derive(Debug, Deserialize)]
pub struct PaginationQuery {
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

impl PaginationQuery {
    /// `(limit, offset)` for the repository, with `page` starting at 1.
    fn limit_offset(&self) -> (i64, i64) {
        let per_page = self
            .per_page
            .unwrap_or(DEFAULT_PER_PAGE)
            .clamp(1, MAX_PER_PAGE);
        let page = self.page.unwrap_or(1).max(1);
        let offset = i64::from(page - 1) * i64::from(per_page);
        (i64::from(per_page), offset)
    }
}

/// A page of products.
#[derive(Debug, Serialize)]
pub struct ProductPage {
    pub products: Vec<Product>,
    pub page: u32,
    pub has_more: bool,
}

fn visible(product: Option<Product>, what: impl FnOnce() -> String) -> Result<Product> {
    product
        .filter(|p| p.status == ProductStatus::Active)
        .ok_or_else(|| AppError::NotFound(what()))
}

/// List active products, newest first.
#[instrument(skip(state))]
pub async fn index(
    State(state): State<AppState>,
    Query(query): Query<PaginationQuery>,
) -> Result<Json<ProductPage>> {
    let (limit, offset) = query.limit_offset();
    // One extra row tells us whether another page exists
    let mut products = state.catalog().list_active(limit + 1, offset).await?;
    let has_more = i64::try_from(products.len()).unwrap_or(i64::MAX) > limit;
    products.truncate(usize::try_from(limit).unwrap_or(usize::MAX));

    Ok(Json(ProductPage {
        products,
        page: query.page.unwrap_or(1).max(1),
        has_more,
    }))
}

/// Product by URL slug.
#[instrument(skip(state))]
pub async fn show(State(state): State<AppState>, Path(slug): Path<String>) -> Result<Json<Product>> {
    let product = state.catalog().get_by_slug(&slug).await?;
    visible(product, || format!("product {slug}")).map(Json)
}

/// Product by ID.
#[instrument(skip(state))]
pub async fn show_by_id(
    State(state): State<AppState>,
    Path(id): Path<ProductId>,
) -> Result<Json<Product>> {
    let product = state.catalog().get_by_id(id).await?;
    visible(product, || format!("product {id}")).map(Json)
}
