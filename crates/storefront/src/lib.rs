//! Loomline storefront library.
//!
//! Shopper-facing JSON API: catalog lookups, a persistent cart and wishlist
//! per shopper, checkout through a payment provider and admin image
//! management. The binary in `main.rs` wires this up; tests drive it
//! in-process.

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod app;
pub mod catalog;
pub mod config;
pub mod db;
pub mod error;
pub mod identity;
pub mod media;
pub mod middleware;
pub mod models;
pub mod payments;
pub mod routes;
pub mod state;
pub mod storage;
pub mod store;
