//! Cart and wishlist state survives a storage restart.
//!
//! Each test opens a file-backed storage service, mutates a store, drops
//! every handle, then reopens the same directory through a fresh service.

#![allow(clippy::unwrap_used)]

use std::sync::Arc;

use loomline_core::CurrencyCode;
use loomline_integration_tests::product;
use loomline_storefront::storage::{FileBackend, StorageService};
use loomline_storefront::store::{CART_STORAGE_KEY, CartStore, WISHLIST_STORAGE_KEY, WishlistStore};

fn file_service(dir: &tempfile::TempDir) -> StorageService {
    StorageService::new(Arc::new(FileBackend::open(dir.path()).unwrap()))
}

#[test]
fn test_cart_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let shirt = product("linen-shirt", "45.00");
    let cap = product("canvas-cap", "15.50");

    {
        let service = file_service(&dir);
        let mut cart = CartStore::open(service.area("shopper-1"), CurrencyCode::USD);
        cart.add_item(shirt.to_cart_product(), "M", "Black", 2);
        cart.add_item(cap.to_cart_product(), "L", "Natural", 1);
        cart.toggle_cart();
        assert!(cart.is_open());
    }

    let service = file_service(&dir);
    let cart = CartStore::open(service.area("shopper-1"), CurrencyCode::USD);

    assert_eq!(cart.items().len(), 2);
    assert_eq!(cart.items()[0].product.id, shirt.id);
    assert_eq!(cart.items()[0].quantity, 2);
    assert_eq!(cart.item_count(), 3);
    assert_eq!(cart.total().amount, "105.50".parse().unwrap());
    // Drawer visibility is not persisted
    assert!(!cart.is_open());
}

#[test]
fn test_persisted_envelope_shape() {
    let dir = tempfile::tempdir().unwrap();
    let service = file_service(&dir);
    let area = service.area("shopper-1");

    let mut wishlist = WishlistStore::open(area.clone());
    wishlist.add_item(product("linen-shirt", "45.00").to_wishlist_entry());

    let raw = area.get(WISHLIST_STORAGE_KEY).unwrap().unwrap();
    let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
    assert_eq!(value["version"], 0);
    assert_eq!(value["state"]["items"].as_array().unwrap().len(), 1);
    assert_eq!(value["state"]["items"][0]["slug"], "linen-shirt");
    assert!(value["state"]["items"][0]["added_at"].is_string());
}

#[test]
fn test_wishlist_survives_restart_newest_first() {
    let dir = tempfile::tempdir().unwrap();
    let older = product("linen-shirt", "45.00");
    let newer = product("canvas-cap", "15.00");

    {
        let service = file_service(&dir);
        let mut wishlist = WishlistStore::open(service.area("shopper-1"));
        assert!(wishlist.add_item(older.to_wishlist_entry()));
        assert!(wishlist.add_item(newer.to_wishlist_entry()));
        assert!(!wishlist.add_item(older.to_wishlist_entry()));
    }

    let service = file_service(&dir);
    let wishlist = WishlistStore::open(service.area("shopper-1"));
    let ids: Vec<_> = wishlist.items().iter().map(|e| e.id).collect();
    assert_eq!(ids, vec![newer.id, older.id]);
}

#[test]
fn test_partitions_are_isolated_on_disk() {
    let dir = tempfile::tempdir().unwrap();
    let service = file_service(&dir);

    let mut first = CartStore::open(service.area("shopper-1"), CurrencyCode::USD);
    first.add_item(product("linen-shirt", "45.00").to_cart_product(), "S", "Black", 1);

    let second = CartStore::open(service.area("shopper-2"), CurrencyCode::USD);
    assert!(second.items().is_empty());
}

#[test]
fn test_corrupt_state_starts_empty() {
    let dir = tempfile::tempdir().unwrap();
    let service = file_service(&dir);
    let area = service.area("shopper-1");
    area.set(CART_STORAGE_KEY, "{not json").unwrap();

    let mut cart = CartStore::open(area.clone(), CurrencyCode::USD);
    assert!(cart.items().is_empty());

    // The next write replaces the unreadable value
    cart.add_item(product("linen-shirt", "45.00").to_cart_product(), "S", "Black", 1);
    let reopened = CartStore::open(service.area("shopper-1"), CurrencyCode::USD);
    assert_eq!(reopened.item_count(), 1);
}

#[test]
fn test_future_version_is_ignored() {
    let dir = tempfile::tempdir().unwrap();
    let service = file_service(&dir);
    let area = service.area("shopper-1");
    area.set(
        WISHLIST_STORAGE_KEY,
        r#"{"state":{"items":[]},"version":7}"#,
    )
    .unwrap();

    let wishlist = WishlistStore::open(area);
    assert_eq!(wishlist.item_count(), 0);
}
