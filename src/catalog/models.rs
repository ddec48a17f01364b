//! Data models for the catalog

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::core_types::{ProductId, SaleId, UserId};

/// User role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "lowercase")]
#[repr(i16)]
pub enum Role {
    User = 0,
    Admin = 1,
}

impl Role {
    pub fn id(&self) -> i16 {
        *self as i16
    }

    pub fn from_id(id: i16) -> Self {
        match id {
            1 => Role::Admin,
            _ => Role::User,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Admin => "admin",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// User account, auto-registered on first observed email.
#[derive(Debug, Clone)]
pub struct User {
    pub user_id: UserId,
    pub email: String,
    pub role: Role,
    pub created_at: DateTime<Utc>,
}

/// Product on sale. Price is fixed-point with 2 decimals.
#[derive(Debug, Clone)]
pub struct Product {
    pub product_id: ProductId,
    pub name: String,
    pub description: String,
    pub price: Decimal,
    pub image_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Flash sale lifecycle states
///
/// State IDs are designed for Postgres storage as SMALLINT. Transitions
/// are monotonic: upcoming -> active -> ended; `ended` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "lowercase")]
#[repr(i16)]
pub enum SaleStatus {
    Upcoming = 0,
    Active = 1,
    Ended = 2,
}

impl SaleStatus {
    #[inline]
    pub fn id(&self) -> i16 {
        *self as i16
    }

    pub fn from_id(id: i16) -> Option<Self> {
        match id {
            0 => Some(SaleStatus::Upcoming),
            1 => Some(SaleStatus::Active),
            2 => Some(SaleStatus::Ended),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SaleStatus::Upcoming => "upcoming",
            SaleStatus::Active => "active",
            SaleStatus::Ended => "ended",
        }
    }
}

impl fmt::Display for SaleStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A time-bounded selling window over one product.
#[derive(Debug, Clone)]
pub struct FlashSale {
    pub sale_id: SaleId,
    pub product_id: ProductId,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    /// Best-effort stored status; readers derive the real one from the
    /// wall clock via [`FlashSale::status_at`].
    pub status: SaleStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl FlashSale {
    /// Clock-derived status. The stored column lags the wall clock by up
    /// to one ticker interval and is never trusted for admission checks.
    pub fn status_at(&self, now: DateTime<Utc>) -> SaleStatus {
        if now < self.start_time {
            SaleStatus::Upcoming
        } else if now > self.end_time {
            SaleStatus::Ended
        } else {
            SaleStatus::Active
        }
    }

    pub fn is_active_at(&self, now: DateTime<Utc>) -> bool {
        self.status_at(now) == SaleStatus::Active
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use uuid::Uuid;

    fn sale(start: DateTime<Utc>, end: DateTime<Utc>) -> FlashSale {
        FlashSale {
            sale_id: Uuid::new_v4(),
            product_id: Uuid::new_v4(),
            start_time: start,
            end_time: end,
            status: SaleStatus::Upcoming,
            created_at: start,
            updated_at: start,
        }
    }

    #[test]
    fn test_status_ids_roundtrip() {
        for status in [SaleStatus::Upcoming, SaleStatus::Active, SaleStatus::Ended] {
            assert_eq!(SaleStatus::from_id(status.id()), Some(status));
        }
        assert!(SaleStatus::from_id(99).is_none());
    }

    #[test]
    fn test_clock_derived_status() {
        let start = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2026, 3, 1, 13, 0, 0).unwrap();
        let sale = sale(start, end);

        assert_eq!(
            sale.status_at(start - chrono::Duration::seconds(1)),
            SaleStatus::Upcoming
        );
        assert_eq!(sale.status_at(start), SaleStatus::Active);
        assert_eq!(
            sale.status_at(start + chrono::Duration::minutes(30)),
            SaleStatus::Active
        );
        assert_eq!(sale.status_at(end), SaleStatus::Active);
        assert_eq!(
            sale.status_at(end + chrono::Duration::seconds(1)),
            SaleStatus::Ended
        );
    }

    #[test]
    fn test_stored_status_not_trusted() {
        let start = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2026, 3, 1, 13, 0, 0).unwrap();
        let mut sale = sale(start, end);
        sale.status = SaleStatus::Active; // stale column

        let after_end = end + chrono::Duration::minutes(5);
        assert_eq!(sale.status_at(after_end), SaleStatus::Ended);
        assert!(!sale.is_active_at(after_end));
    }

    #[test]
    fn test_role_serde_names() {
        assert_eq!(serde_json::to_string(&Role::Admin).unwrap(), "\"admin\"");
        assert_eq!(Role::from_id(Role::Admin.id()), Role::Admin);
        assert_eq!(Role::from_id(7), Role::User);
    }
}
