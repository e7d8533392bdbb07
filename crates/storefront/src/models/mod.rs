//! Domain models for the storefront.
//!
//! These are validated domain types, separate from database row types.

pub mod product;
pub mod session;

pub use product::Product;
pub use session::{CurrentUser, keys as session_keys};
