//! Session-related types.
//!
//! Values stored in the `tower-sessions` session for each shopper.

use serde::{Deserialize, Serialize};

use loomline_core::{Email, UserId};

/// Session-stored user identity, as handed over by the identity provider.
///
/// Absence means the shopper is browsing anonymously.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurrentUser {
    /// Identity provider user ID.
    pub id: UserId,
    /// User's email address.
    pub email: Email,
}

/// Session keys.
pub mod keys {
    /// Key for storing the current logged-in user.
    pub const CURRENT_USER: &str = "current_user";

    /// Key for the shopper's durable storage partition (cart and wishlist).
    pub const STORAGE_PARTITION: &str = "storage_partition";

    /// Key for the cart drawer visibility flag.
    pub const CART_OPEN: &str = "cart_open";

    /// Key for the payment intent created by this session's last checkout.
    pub const CHECKOUT_INTENT: &str = "checkout_intent";

    /// Key for the payment intent whose success already emptied the cart.
    pub const COMPLETED_INTENT: &str = "completed_intent";
}
