/// ENFORCED STOCK LEVEL TYPE
///
/// This is the SINGLE source of truth for stock arithmetic.
/// ALL in-process stock mutations MUST go through these methods; the SQL
/// path in `StockManager` mirrors the same transitions with conditional
/// updates.
use serde::{Deserialize, Serialize};

/// Stock level for a single product
///
/// # Invariants (ENFORCED by private fields):
/// - available >= 0 and reserved >= 0
/// - available + reserved <= total (the remainder is sold units)
/// - total is the pre-sale snapshot and never changes after creation
///
/// # Usage:
/// ```ignore
/// let mut level = StockLevel::new(5);
/// level.reserve(1)?;   // available = 4, reserved = 1
/// level.confirm(1)?;   // available = 4, reserved = 0, sold = 1
/// ```
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct StockLevel {
    total: i64,     // PRIVATE - written once at creation
    available: i64, // PRIVATE - ONLY modified through reserve/release
    reserved: i64,  // PRIVATE - ONLY modified through reserve/release/confirm
}

impl StockLevel {
    /// Fresh stock: everything available, nothing reserved or sold.
    pub fn new(total: i64) -> Self {
        Self {
            total,
            available: total,
            reserved: 0,
        }
    }

    /// Rehydrate from storage, validating the invariants.
    pub fn from_parts(total: i64, available: i64, reserved: i64) -> Result<Self, &'static str> {
        if available < 0 || reserved < 0 {
            return Err("Negative stock quantity");
        }
        if available + reserved > total {
            return Err("available + reserved exceeds total");
        }
        Ok(Self {
            total,
            available,
            reserved,
        })
    }

    #[inline(always)]
    pub const fn total(&self) -> i64 {
        self.total
    }

    #[inline(always)]
    pub const fn available(&self) -> i64 {
        self.available
    }

    #[inline(always)]
    pub const fn reserved(&self) -> i64 {
        self.reserved
    }

    /// Finalized units: total - available - reserved.
    #[inline(always)]
    pub const fn sold(&self) -> i64 {
        self.total - self.available - self.reserved
    }

    /// Claim units: move from available to reserved.
    ///
    /// # Errors
    /// - "Out of stock" if available < qty
    pub fn reserve(&mut self, qty: i64) -> Result<(), &'static str> {
        if self.available < qty {
            return Err("Out of stock");
        }
        self.available -= qty;
        self.reserved += qty;
        Ok(())
    }

    /// Undo a reservation: move units back from reserved to available.
    ///
    /// # Errors
    /// - "Release exceeds reservation" if reserved < qty
    pub fn release(&mut self, qty: i64) -> Result<(), &'static str> {
        if self.reserved < qty {
            return Err("Release exceeds reservation");
        }
        self.reserved -= qty;
        self.available += qty;
        Ok(())
    }

    /// Finalize a reservation: reserved units become sold.
    ///
    /// # Errors
    /// - "Confirm exceeds reservation" if reserved < qty
    pub fn confirm(&mut self, qty: i64) -> Result<(), &'static str> {
        if self.reserved < qty {
            return Err("Confirm exceeds reservation");
        }
        self.reserved -= qty;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fresh_stock() {
        let level = StockLevel::new(5);
        assert_eq!(level.total(), 5);
        assert_eq!(level.available(), 5);
        assert_eq!(level.reserved(), 0);
        assert_eq!(level.sold(), 0);
    }

    #[test]
    fn test_reserve_confirm_sells_one() {
        let mut level = StockLevel::new(5);
        level.reserve(1).unwrap();
        assert_eq!(level.available(), 4);
        assert_eq!(level.reserved(), 1);
        level.confirm(1).unwrap();
        assert_eq!(level.available(), 4);
        assert_eq!(level.reserved(), 0);
        assert_eq!(level.sold(), 1);
        assert_eq!(level.total(), 5);
    }

    #[test]
    fn test_release_restores_available() {
        let mut level = StockLevel::new(5);
        level.reserve(2).unwrap();
        level.release(2).unwrap();
        assert_eq!(level.available(), 5);
        assert_eq!(level.reserved(), 0);
        assert_eq!(level.sold(), 0);
    }

    #[test]
    fn test_reserve_beyond_available_fails() {
        let mut level = StockLevel::new(1);
        level.reserve(1).unwrap();
        assert!(level.reserve(1).is_err());
        // Failed reserve must not mutate
        assert_eq!(level.available(), 0);
        assert_eq!(level.reserved(), 1);
    }

    #[test]
    fn test_confirm_without_reservation_fails() {
        let mut level = StockLevel::new(5);
        assert!(level.confirm(1).is_err());
        assert!(level.release(1).is_err());
    }

    #[test]
    fn test_sellout_drains_to_zero() {
        let mut level = StockLevel::new(3);
        for _ in 0..3 {
            level.reserve(1).unwrap();
            level.confirm(1).unwrap();
        }
        assert_eq!(level.available(), 0);
        assert_eq!(level.reserved(), 0);
        assert_eq!(level.sold(), 3);
        assert!(level.reserve(1).is_err());
    }

    #[test]
    fn test_from_parts_validation() {
        assert!(StockLevel::from_parts(5, 3, 1).is_ok());
        assert!(StockLevel::from_parts(5, 3, 3).is_err());
        assert!(StockLevel::from_parts(5, -1, 0).is_err());
        assert!(StockLevel::from_parts(5, 0, -1).is_err());
    }
}
