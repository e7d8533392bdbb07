//! Shopper wishlist store.
//!
//! A deduplicated list of saved products, newest first. Re-adding a saved
//! product is ignored, so the original `added_at` survives.
//!
//! The store also watches its storage slot: when another browsing context
//! rewrites `wishlist-storage`, [`WishlistStore::sync_external_changes`]
//! reloads the in-memory view. There is no merge; the last full write wins.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use loomline_core::{Price, ProductId};

use super::persist::PersistentSlot;
use crate::storage::{StorageArea, StorageSubscription};

/// Storage key for the persisted wishlist.
pub const WISHLIST_STORAGE_KEY: &str = "wishlist-storage";

/// A product about to be saved. `added_at` is stamped on insertion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewWishlistEntry {
    pub id: ProductId,
    pub slug: String,
    pub name: String,
    pub price: Price,
    pub compare_at_price: Option<Price>,
    pub images: Vec<String>,
    pub category: String,
    pub on_sale: bool,
}

impl NewWishlistEntry {
    fn stamped(self, added_at: DateTime<Utc>) -> WishlistEntry {
        WishlistEntry {
            id: self.id,
            slug: self.slug,
            name: self.name,
            price: self.price,
            compare_at_price: self.compare_at_price,
            images: self.images,
            category: self.category,
            on_sale: self.on_sale,
            added_at,
        }
    }
}

/// A saved product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WishlistEntry {
    pub id: ProductId,
    pub slug: String,
    pub name: String,
    pub price: Price,
    #[serde(default)]
    pub compare_at_price: Option<Price>,
    #[serde(default)]
    pub images: Vec<String>,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub on_sale: bool,
    pub added_at: DateTime<Utc>,
}

/// Persisted wishlist state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WishlistState {
    pub items: Vec<WishlistEntry>,
}

/// Derived wishlist values published to subscribers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct WishlistSummary {
    pub item_count: usize,
    /// Saved ids, newest first. Lets UI toggle saved/unsaved affordances.
    pub product_ids: Vec<ProductId>,
}

/// Wishlist state container with write-through persistence.
pub struct WishlistStore {
    state: WishlistState,
    slot: PersistentSlot<WishlistState>,
    changes: StorageSubscription,
    summary: watch::Sender<WishlistSummary>,
}

impl std::fmt::Debug for WishlistStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WishlistStore")
            .field("state", &self.state)
            .field("slot", &self.slot)
            .finish_non_exhaustive()
    }
}

impl WishlistStore {
    /// Rehydrate the wishlist persisted in `area`, or start empty.
    #[must_use]
    pub fn open(area: StorageArea) -> Self {
        let changes = area.subscribe();
        let slot = PersistentSlot::new(area, WISHLIST_STORAGE_KEY);
        let state = slot.load();
        let (summary, _) = watch::channel(summarize(&state));
        Self {
            state,
            slot,
            changes,
            summary,
        }
    }

    /// Saved entries, newest first.
    #[must_use]
    pub fn items(&self) -> &[WishlistEntry] {
        &self.state.items
    }

    /// Save a product, stamped with the current time.
    ///
    /// Returns `false` if it was already saved.
    pub fn add_item(&mut self, entry: NewWishlistEntry) -> bool {
        self.add_item_at(entry, Utc::now())
    }

    /// Save a product with an explicit insertion timestamp.
    ///
    /// Returns `false` (and changes nothing) if it was already saved.
    pub fn add_item_at(&mut self, entry: NewWishlistEntry, added_at: DateTime<Utc>) -> bool {
        if self.is_in_wishlist(entry.id) {
            return false;
        }
        tracing::debug!(product_id = %entry.id, "saved to wishlist");
        self.state.items.insert(0, entry.stamped(added_at));
        self.commit();
        true
    }

    /// Remove a saved product. Absent ids are ignored.
    pub fn remove_item(&mut self, id: ProductId) {
        let before = self.state.items.len();
        self.state.items.retain(|entry| entry.id != id);
        if self.state.items.len() != before {
            self.commit();
        }
    }

    /// Whether `id` is saved.
    #[must_use]
    pub fn is_in_wishlist(&self, id: ProductId) -> bool {
        self.state.items.iter().any(|entry| entry.id == id)
    }

    /// Remove every entry.
    pub fn clear_wishlist(&mut self) {
        self.state.items.clear();
        self.commit();
    }

    /// Number of saved products.
    #[must_use]
    pub fn item_count(&self) -> usize {
        self.state.items.len()
    }

    /// Receive the summary after every change, local or external.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<WishlistSummary> {
        self.summary.subscribe()
    }

    /// Reload if another context rewrote the wishlist since the last call.
    ///
    /// Returns whether the in-memory view was reloaded.
    pub fn sync_external_changes(&mut self) -> bool {
        let mut stale = false;
        while let Some(event) = self.changes.try_next() {
            stale |= event.key == WISHLIST_STORAGE_KEY;
        }
        stale |= self.changes.take_missed();

        if stale {
            self.reload();
        }
        stale
    }

    /// Wait until another context rewrites the wishlist, then reload.
    ///
    /// Returns `false` once the storage service has shut down.
    pub async fn next_external_change(&mut self) -> bool {
        loop {
            let Some(event) = self.changes.next().await else {
                return false;
            };
            if event.key == WISHLIST_STORAGE_KEY || self.changes.take_missed() {
                self.reload();
                return true;
            }
        }
    }

    fn reload(&mut self) {
        self.state = self.slot.load();
        tracing::debug!(
            partition = self.slot.area().partition(),
            items = self.state.items.len(),
            "wishlist reloaded after external change"
        );
        self.publish();
    }

    fn commit(&self) {
        self.slot.save(&self.state);
        self.publish();
    }

    fn publish(&self) {
        self.summary.send_replace(summarize(&self.state));
    }
}

fn summarize(state: &WishlistState) -> WishlistSummary {
    WishlistSummary {
        item_count: state.items.len(),
        product_ids: state.items.iter().map(|entry| entry.id).collect(),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::TimeZone;

    use super::*;
    use crate::storage::{EVENT_CAPACITY, StorageService};
    use loomline_core::CurrencyCode;

    fn entry(name: &str) -> NewWishlistEntry {
        NewWishlistEntry {
            id: ProductId::generate(),
            slug: name.to_lowercase(),
            name: name.to_string(),
            price: Price::new("25.00".parse().unwrap(), CurrencyCode::USD),
            compare_at_price: Some(Price::new("40.00".parse().unwrap(), CurrencyCode::USD)),
            images: vec![format!("https://cdn.example.com/{name}.jpg")],
            category: "Outerwear".to_string(),
            on_sale: true,
        }
    }

    fn at(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, hour, 0, 0).unwrap()
    }

    #[test]
    fn test_duplicate_add_keeps_first_timestamp() {
        let service = StorageService::in_memory();
        let mut wishlist = WishlistStore::open(service.area("shopper"));
        let jacket = entry("Jacket");

        assert!(wishlist.add_item_at(jacket.clone(), at(9)));
        assert!(!wishlist.add_item_at(jacket, at(17)));

        assert_eq!(wishlist.item_count(), 1);
        assert_eq!(wishlist.items()[0].added_at, at(9));
    }

    #[test]
    fn test_newest_first() {
        let service = StorageService::in_memory();
        let mut wishlist = WishlistStore::open(service.area("shopper"));
        let first = entry("First");
        let second = entry("Second");

        wishlist.add_item_at(first.clone(), at(1));
        wishlist.add_item_at(second.clone(), at(2));

        let ids: Vec<_> = wishlist.items().iter().map(|e| e.id).collect();
        assert_eq!(ids, vec![second.id, first.id]);
    }

    #[test]
    fn test_membership_and_remove() {
        let service = StorageService::in_memory();
        let mut wishlist = WishlistStore::open(service.area("shopper"));
        let scarf = entry("Scarf");

        assert!(!wishlist.is_in_wishlist(scarf.id));
        wishlist.add_item(scarf.clone());
        assert!(wishlist.is_in_wishlist(scarf.id));

        wishlist.remove_item(scarf.id);
        wishlist.remove_item(scarf.id);
        assert!(!wishlist.is_in_wishlist(scarf.id));
        assert_eq!(wishlist.item_count(), 0);
    }

    #[test]
    fn test_clear_wishlist() {
        let service = StorageService::in_memory();
        let mut wishlist = WishlistStore::open(service.area("shopper"));
        wishlist.add_item(entry("A"));
        wishlist.add_item(entry("B"));

        wishlist.clear_wishlist();

        assert_eq!(wishlist.item_count(), 0);
        assert_eq!(WishlistStore::open(service.area("shopper")).item_count(), 0);
    }

    #[test]
    fn test_rehydrates_equal_state() {
        let service = StorageService::in_memory();
        let mut wishlist = WishlistStore::open(service.area("shopper"));
        wishlist.add_item_at(entry("A"), at(3));
        wishlist.add_item_at(entry("B"), at(4));
        let expected = wishlist.items().to_vec();
        drop(wishlist);

        let rehydrated = WishlistStore::open(service.area("shopper"));
        assert_eq!(rehydrated.items(), expected.as_slice());
    }

    #[test]
    fn test_sync_picks_up_other_context() {
        let service = StorageService::in_memory();
        let mut tab_a = WishlistStore::open(service.area("shopper"));
        let mut tab_b = WishlistStore::open(service.area("shopper"));
        let boots = entry("Boots");

        tab_a.add_item(boots.clone());
        assert!(!tab_b.is_in_wishlist(boots.id));

        assert!(tab_b.sync_external_changes());
        assert!(tab_b.is_in_wishlist(boots.id));

        // Own writes do not trigger a reload
        assert!(!tab_a.sync_external_changes());
        assert!(!tab_b.sync_external_changes());
    }

    #[test]
    fn test_sync_ignores_other_keys() {
        let service = StorageService::in_memory();
        let mut wishlist = WishlistStore::open(service.area("shopper"));
        service.area("shopper").set("cart-storage", "{}").unwrap();
        assert!(!wishlist.sync_external_changes());
    }

    #[test]
    fn test_sync_reloads_after_missing_events() {
        let service = StorageService::in_memory();
        let mut tab_a = WishlistStore::open(service.area("shopper"));
        let mut tab_b = WishlistStore::open(service.area("shopper"));
        let cart_tab = service.area("shopper");
        let boots = entry("Boots");

        tab_a.add_item(boots.clone());
        // Push the wishlist event out of tab_b's buffer
        for i in 0..=EVENT_CAPACITY {
            cart_tab.set("cart-storage", &i.to_string()).unwrap();
        }

        assert!(tab_b.sync_external_changes());
        assert!(tab_b.is_in_wishlist(boots.id));
        assert_eq!(
            tab_b.items(),
            WishlistStore::open(service.area("shopper")).items()
        );
        assert!(!tab_b.sync_external_changes());
    }

    #[tokio::test]
    async fn test_next_external_change_reloads_after_missing_events() {
        let service = StorageService::in_memory();
        let mut tab_a = WishlistStore::open(service.area("shopper"));
        let mut tab_b = WishlistStore::open(service.area("shopper"));
        let cart_tab = service.area("shopper");
        let coat = entry("Coat");

        tab_a.add_item(coat.clone());
        for i in 0..=EVENT_CAPACITY {
            cart_tab.set("cart-storage", &i.to_string()).unwrap();
        }

        assert!(tab_b.next_external_change().await);
        assert!(tab_b.is_in_wishlist(coat.id));
    }

    #[test]
    fn test_stale_tab_clobbers_other_tab() {
        let service = StorageService::in_memory();
        let mut tab_a = WishlistStore::open(service.area("shopper"));
        let mut tab_b = WishlistStore::open(service.area("shopper"));
        let hat = entry("Hat");
        let belt = entry("Belt");

        tab_a.add_item(hat.clone());
        // tab_b never synced, so its write replaces tab_a's
        tab_b.add_item(belt.clone());

        let fresh = WishlistStore::open(service.area("shopper"));
        assert!(fresh.is_in_wishlist(belt.id));
        assert!(!fresh.is_in_wishlist(hat.id));
    }

    #[test]
    fn test_subscribers_notified_on_external_reload() {
        let service = StorageService::in_memory();
        let mut tab_a = WishlistStore::open(service.area("shopper"));
        let mut tab_b = WishlistStore::open(service.area("shopper"));
        let mut rx = tab_b.subscribe();

        tab_a.add_item(entry("Gloves"));
        tab_b.sync_external_changes();

        assert!(rx.has_changed().unwrap());
        assert_eq!(rx.borrow_and_update().item_count, 1);
    }

    #[tokio::test]
    async fn test_next_external_change() {
        let service = StorageService::in_memory();
        let mut tab_a = WishlistStore::open(service.area("shopper"));
        let mut tab_b = WishlistStore::open(service.area("shopper"));
        let coat = entry("Coat");

        tab_a.add_item(coat.clone());

        assert!(tab_b.next_external_change().await);
        assert!(tab_b.is_in_wishlist(coat.id));
    }
}
