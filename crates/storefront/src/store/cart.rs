//! Shopper cart store.
//!
//! Holds the shopper's line items and derives counts and money totals.
//! A line is identified by `(product id, size, color)`; adding the same
//! configuration again merges into the existing line.
//!
//! Inputs are taken as given. Validation (positive quantities, active
//! products, stock) belongs to the caller.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use loomline_core::{CurrencyCode, Price, ProductId};

use super::persist::PersistentSlot;
use crate::storage::StorageArea;

/// Storage key for the persisted cart.
pub const CART_STORAGE_KEY: &str = "cart-storage";

/// Product data captured on a cart line at add time.
///
/// The price is not refreshed afterwards; totals always use this snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartProduct {
    pub id: ProductId,
    pub name: String,
    pub slug: String,
    pub price: Price,
    #[serde(default)]
    pub image: Option<String>,
}

/// One distinct purchasable configuration in the cart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartLine {
    pub product: CartProduct,
    pub size: String,
    pub color: String,
    pub quantity: u32,
}

impl CartLine {
    fn matches(&self, product_id: ProductId, size: &str, color: &str) -> bool {
        self.product.id == product_id && self.size == size && self.color == color
    }

    /// Captured unit price times quantity.
    #[must_use]
    pub fn line_total(&self) -> Price {
        self.product.price.times(self.quantity)
    }
}

/// Persisted cart state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartState {
    pub items: Vec<CartLine>,
}

/// Derived cart values published to subscribers after every mutation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CartSummary {
    /// Sum of line quantities.
    pub item_count: u64,
    /// Number of distinct lines.
    pub line_count: usize,
    pub subtotal: Price,
    pub total: Price,
    pub is_open: bool,
}

/// Cart state container with write-through persistence.
#[derive(Debug)]
pub struct CartStore {
    state: CartState,
    is_open: bool,
    currency: CurrencyCode,
    slot: PersistentSlot<CartState>,
    summary: watch::Sender<CartSummary>,
}

impl CartStore {
    /// Rehydrate the cart persisted in `area`, or start empty.
    ///
    /// `currency` labels totals; lines are assumed to share it.
    #[must_use]
    pub fn open(area: StorageArea, currency: CurrencyCode) -> Self {
        let slot = PersistentSlot::new(area, CART_STORAGE_KEY);
        let state = slot.load();
        let initial = summarize(&state, false, currency);
        let (summary, _) = watch::channel(initial);
        Self {
            state,
            is_open: false,
            currency,
            slot,
            summary,
        }
    }

    /// Current lines, in insertion order.
    #[must_use]
    pub fn items(&self) -> &[CartLine] {
        &self.state.items
    }

    /// Whether the cart drawer is shown. Transient, never persisted.
    #[must_use]
    pub const fn is_open(&self) -> bool {
        self.is_open
    }

    /// Add `quantity` of a product configuration.
    ///
    /// Merges into an existing line with the same key, otherwise appends.
    pub fn add_item(
        &mut self,
        product: CartProduct,
        size: impl Into<String>,
        color: impl Into<String>,
        quantity: u32,
    ) {
        let size = size.into();
        let color = color.into();

        if let Some(line) = self
            .state
            .items
            .iter_mut()
            .find(|line| line.matches(product.id, &size, &color))
        {
            line.quantity = line.quantity.saturating_add(quantity);
            tracing::debug!(product_id = %product.id, %size, %color, quantity = line.quantity, "merged cart line");
        } else {
            tracing::debug!(product_id = %product.id, %size, %color, quantity, "appended cart line");
            self.state.items.push(CartLine {
                product,
                size,
                color,
                quantity,
            });
        }

        self.commit();
    }

    /// Remove the line with the exact key. Absent keys are ignored.
    pub fn remove_item(&mut self, product_id: ProductId, size: &str, color: &str) {
        let before = self.state.items.len();
        self.state
            .items
            .retain(|line| !line.matches(product_id, size, color));

        if self.state.items.len() != before {
            self.commit();
        }
    }

    /// Set a line's quantity verbatim. Absent keys are ignored.
    ///
    /// A quantity of 0 is stored as-is; the line is not removed.
    pub fn update_quantity(
        &mut self,
        product_id: ProductId,
        size: &str,
        color: &str,
        quantity: u32,
    ) {
        let Some(line) = self
            .state
            .items
            .iter_mut()
            .find(|line| line.matches(product_id, size, color))
        else {
            return;
        };

        line.quantity = quantity;
        self.commit();
    }

    /// Remove every line.
    pub fn clear_cart(&mut self) {
        self.state.items.clear();
        self.commit();
    }

    /// Flip the drawer visibility flag.
    pub fn toggle_cart(&mut self) {
        self.is_open = !self.is_open;
        self.publish();
    }

    /// Sum of quantities across all lines.
    #[must_use]
    pub fn item_count(&self) -> u64 {
        item_count(&self.state)
    }

    /// Sum of captured unit price times quantity.
    #[must_use]
    pub fn subtotal(&self) -> Price {
        subtotal(&self.state, self.currency)
    }

    /// Amount due. Shipping, tax and discounts would compose here.
    #[must_use]
    pub fn total(&self) -> Price {
        self.subtotal()
    }

    /// Derived values for the current state.
    #[must_use]
    pub fn summary(&self) -> CartSummary {
        summarize(&self.state, self.is_open, self.currency)
    }

    /// Receive the summary after every change.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<CartSummary> {
        self.summary.subscribe()
    }

    fn commit(&self) {
        self.slot.save(&self.state);
        self.publish();
    }

    fn publish(&self) {
        self.summary.send_replace(self.summary());
    }
}

fn item_count(state: &CartState) -> u64 {
    state
        .items
        .iter()
        .map(|line| u64::from(line.quantity))
        .sum()
}

/// Saturates at `Decimal::MAX` when the sum does not fit.
fn subtotal(state: &CartState, currency: CurrencyCode) -> Price {
    let amount = state.items.iter().try_fold(Decimal::ZERO, |sum, line| {
        line.product
            .price
            .checked_times(line.quantity)
            .and_then(|line_total| sum.checked_add(line_total.amount))
    });

    amount.map_or_else(
        || {
            tracing::warn!(
                lines = state.items.len(),
                "cart subtotal overflowed; saturating"
            );
            Price::new(Decimal::MAX, currency)
        },
        |amount| Price::new(amount, currency),
    )
}

fn summarize(state: &CartState, is_open: bool, currency: CurrencyCode) -> CartSummary {
    let subtotal = subtotal(state, currency);
    CartSummary {
        item_count: item_count(state),
        line_count: state.items.len(),
        subtotal,
        total: subtotal,
        is_open,
    }
}
