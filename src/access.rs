//! Read authorization for tracking queries.

use serde::{Deserialize, Serialize};
use tracking_core::{Booking, Result, forbidden};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Admin,
    Customer,
}

/// The authenticated caller, as resolved by the adapter in front of the
/// service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Requester {
    pub user_id: String,
    pub role: Role,
}

impl Requester {
    #[must_use]
    pub fn admin(user_id: impl Into<String>) -> Self {
        Self { user_id: user_id.into(), role: Role::Admin }
    }

    #[must_use]
    pub fn customer(user_id: impl Into<String>) -> Self {
        Self { user_id: user_id.into(), role: Role::Customer }
    }

    #[must_use]
    pub const fn is_admin(&self) -> bool {
        matches!(self.role, Role::Admin)
    }

    /// Admins see every shipment, customers only their own.
    ///
    /// # Errors
    ///
    /// Returns `Forbidden` when a customer asks for someone else's shipment.
    pub fn authorize_shipment(&self, booking: &Booking) -> Result<()> {
        if self.is_admin() || booking.customer_id == self.user_id {
            return Ok(());
        }
        Err(forbidden!("user {} may not track shipment {}", self.user_id, booking.id))
    }

    /// # Errors
    ///
    /// Returns `Forbidden` unless the requester is an admin.
    pub fn require_admin(&self, action: &str) -> Result<()> {
        if self.is_admin() {
            return Ok(());
        }
        Err(forbidden!("user {} may not {action}", self.user_id))
    }
}
