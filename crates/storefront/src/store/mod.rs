//! Shopper state containers: cart and wishlist.
//!
//! Both stores follow the same pattern:
//!
//! 1. `open(area)` rehydrates from a fixed key in durable storage
//!    (empty on absent or corrupt data).
//! 2. Mutation methods change the in-memory state, write the full state back
//!    through a [`persist::PersistentSlot`], and publish a summary.
//! 3. Consumers `subscribe()` to a `tokio::sync::watch` channel and re-read
//!    derived values (counts, totals) when it changes.
//!
//! Stores are constructed explicitly by whoever owns the browsing context
//! (in the server: once per request, from the session's storage partition).
//! Mutations are synchronous and never return errors.

pub mod cart;
pub mod persist;
pub mod wishlist;

pub use cart::{CART_STORAGE_KEY, CartLine, CartProduct, CartState, CartStore, CartSummary};
pub use wishlist::{
    NewWishlistEntry, WISHLIST_STORAGE_KEY, WishlistEntry, WishlistState, WishlistStore,
    WishlistSummary,
};
