//! Status enums for catalog and payment records.

use core::fmt;
use core::str::FromStr;

use serde::{Deserialize, Serialize};

/// Publication status of a catalog product.
///
/// Only `Active` products can be added to a cart or wishlist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ProductStatus {
    #[default]
    Draft,
    Active,
    Archived,
}

impl ProductStatus {
    /// Database / wire representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Active => "active",
            Self::Archived => "archived",
        }
    }
}

impl fmt::Display for ProductStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProductStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "draft" => Ok(Self::Draft),
            "active" => Ok(Self::Active),
            "archived" => Ok(Self::Archived),
            other => Err(format!("unknown product status: {other}")),
        }
    }
}

/// Lifecycle status of a payment intent, as reported by the gateway.
///
/// The gateway owns this state machine; we only read it back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    RequiresPaymentMethod,
    RequiresConfirmation,
    RequiresAction,
    Processing,
    RequiresCapture,
    Canceled,
    Succeeded,
    /// A status this build does not know about yet.
    #[serde(other)]
    Unknown,
}

impl PaymentStatus {
    /// Whether the charge has completed successfully.
    #[must_use]
    pub const fn is_paid(&self) -> bool {
        matches!(self, Self::Succeeded)
    }

    /// Whether the gateway will not move this intent any further.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Canceled)
    }
}
