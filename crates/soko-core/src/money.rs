//! # Money Module
//!
//! Provides the `Money` type for handling monetary values safely.
//!
//! ## Why Integer Money?
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  THE FLOATING POINT PROBLEM                                             │
//! │                                                                         │
//! │  In JavaScript/floating point:                                          │
//! │    24.99 * 0.18 = 4.498200000000001  ❌ WRONG!                          │
//! │    Σ of 200 line totals drifts by fractions of a cent                  │
//! │                                                                         │
//! │  OUR SOLUTION: Integer Minor Units                                      │
//! │    2499 * 1800 bps = 4_498_200 → (x + 5000) / 10000 = 450              │
//! │    Rounding happens exactly once, at a known place                     │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust
//! use soko_core::money::Money;
//!
//! let price = Money::from_minor(2499); // 24.99
//! let line = price * 3;                // 74.97
//! assert_eq!(line.to_string(), "74.97");
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign, Mul, Sub, SubAssign};
use ts_rs::TS;

use crate::types::TaxRate;
use crate::MINOR_UNITS_PER_MAJOR;

/// Basis points in 100%.
const BPS_SCALE: i128 = 10_000;

// =============================================================================
// Money Type
// =============================================================================

/// A monetary value in the smallest currency unit.
///
/// ## Design Decisions
/// - **i64 (signed)**: change and refunds can be expressed without a second type
/// - **Single field tuple struct**: zero-cost abstraction over i64
/// - **Serialized as the raw minor-unit integer**, never as a float
///
/// ## Where Money Flows
/// ```text
/// Product.price ──► LineItem.unit_price ──► subtotal ──► discount ──► tax
///                                                                     │
///            PaymentAttempt.amount_due ◄── total ◄────────────────────┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Money(i64);

impl Money {
    /// Creates a Money value from minor units (cents, piasters, ...).
    ///
    /// ```rust
    /// use soko_core::money::Money;
    ///
    /// assert_eq!(Money::from_minor(1099).minor(), 1099);
    /// ```
    #[inline]
    pub const fn from_minor(minor: i64) -> Self {
        Money(minor)
    }

    /// Creates a Money value from whole major units.
    #[inline]
    pub const fn from_major(major: i64) -> Self {
        Money(major * MINOR_UNITS_PER_MAJOR)
    }

    /// Returns the value in minor units.
    #[inline]
    pub const fn minor(&self) -> i64 {
        self.0
    }

    /// Returns the whole major-unit portion (truncated toward zero).
    #[inline]
    pub const fn major(&self) -> i64 {
        self.0 / MINOR_UNITS_PER_MAJOR
    }

    /// Returns the minor-unit portion (always 0-99).
    #[inline]
    pub const fn minor_part(&self) -> i64 {
        (self.0 % MINOR_UNITS_PER_MAJOR).abs()
    }

    /// Returns zero money value.
    #[inline]
    pub const fn zero() -> Self {
        Money(0)
    }

    /// Checks if the value is zero.
    #[inline]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// Checks if the value is positive (greater than zero).
    #[inline]
    pub const fn is_positive(&self) -> bool {
        self.0 > 0
    }

    /// Checks if the value is negative (less than zero).
    #[inline]
    pub const fn is_negative(&self) -> bool {
        self.0 < 0
    }

    /// Calculates tax on this amount, rounded half-up to the minor unit.
    ///
    /// ## Implementation
    /// Integer math in i128: `(amount * bps ± 5000) / 10000`.
    ///
    /// ```rust
    /// use soko_core::money::Money;
    /// use soko_core::types::TaxRate;
    ///
    /// // 90.00 at 15% = 13.50
    /// let tax = Money::from_minor(9000).calculate_tax(TaxRate::from_bps(1500));
    /// assert_eq!(tax.minor(), 1350);
    /// ```
    pub fn calculate_tax(&self, rate: TaxRate) -> Money {
        Money::from_minor(scale_bps(self.0, rate.bps()))
    }

    /// Returns `bps / 10000` of this amount, rounded half-up.
    ///
    /// Used for percentage discounts: 12.5% is 1250 bps.
    pub fn percentage(&self, bps: u32) -> Money {
        Money::from_minor(scale_bps(self.0, bps))
    }

    /// Multiplies money by a quantity.
    #[inline]
    pub const fn multiply_quantity(&self, qty: i64) -> Self {
        Money(self.0 * qty)
    }

    /// Renders the amount as a plain decimal string, e.g. `"29.49"`.
    ///
    /// This is the form sent to the backend and shown on receipts.
    pub fn to_major_string(&self) -> String {
        self.to_string()
    }
}

/// Multiplies by basis points and rounds half away from zero.
fn scale_bps(amount: i64, bps: u32) -> i64 {
    let product = amount as i128 * bps as i128;
    let half = BPS_SCALE / 2;
    let rounded = if product >= 0 {
        (product + half) / BPS_SCALE
    } else {
        (product - half) / BPS_SCALE
    };
    rounded as i64
}

// =============================================================================
// Trait Implementations
// =============================================================================

/// Shows money as a plain decimal (currency code is rendered by the caller).
impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        write!(f, "{}{}.{:02}", sign, self.major().abs(), self.minor_part())
    }
}

impl Default for Money {
    fn default() -> Self {
        Money::zero()
    }
}

impl Add for Money {
    type Output = Self;

    #[inline]
    fn add(self, other: Self) -> Self {
        Money(self.0 + other.0)
    }
}

impl AddAssign for Money {
    #[inline]
    fn add_assign(&mut self, other: Self) {
        self.0 += other.0;
    }
}

impl Sub for Money {
    type Output = Self;

    #[inline]
    fn sub(self, other: Self) -> Self {
        Money(self.0 - other.0)
    }
}

impl SubAssign for Money {
    #[inline]
    fn sub_assign(&mut self, other: Self) {
        self.0 -= other.0;
    }
}

impl Mul<i64> for Money {
    type Output = Self;

    #[inline]
    fn mul(self, qty: i64) -> Self {
        Money(self.0 * qty)
    }
}

impl Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Self {
        iter.fold(Money::zero(), |acc, m| acc + m)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_minor() {
        let money = Money::from_minor(1099);
        assert_eq!(money.minor(), 1099);
        assert_eq!(money.major(), 10);
        assert_eq!(money.minor_part(), 99);
        assert_eq!(Money::from_major(25).minor(), 2500);
    }

    #[test]
    fn test_display() {
        assert_eq!(Money::from_minor(2949).to_string(), "29.49");
        assert_eq!(Money::from_minor(500).to_string(), "5.00");
        assert_eq!(Money::from_minor(-550).to_string(), "-5.50");
        assert_eq!(Money::from_minor(7).to_string(), "0.07");
        assert_eq!(Money::zero().to_major_string(), "0.00");
    }

    #[test]
    fn test_arithmetic_and_sum() {
        let a = Money::from_minor(1000);
        let b = Money::from_minor(500);

        assert_eq!((a + b).minor(), 1500);
        assert_eq!((a - b).minor(), 500);
        assert_eq!((a * 3).minor(), 3000);

        let total: Money = vec![a, b, b].into_iter().sum();
        assert_eq!(total.minor(), 2000);
    }

    #[test]
    fn test_tax_rounds_half_up() {
        // 24.99 at 18% = 4.4982 → 4.50
        let tax = Money::from_minor(2499).calculate_tax(TaxRate::from_bps(1800));
        assert_eq!(tax.minor(), 450);

        // 10.00 at 8.25% = 0.825 → 0.83
        let tax = Money::from_minor(1000).calculate_tax(TaxRate::from_bps(825));
        assert_eq!(tax.minor(), 83);
    }

    #[test]
    fn test_percentage_of_amount() {
        assert_eq!(Money::from_minor(10000).percentage(1000).minor(), 1000);
        assert_eq!(Money::from_minor(999).percentage(5000).minor(), 500); // 4.995 → 5.00
        assert_eq!(Money::from_minor(999).percentage(0).minor(), 0);
        assert_eq!(Money::from_minor(999).percentage(10_000).minor(), 999);
    }

    #[test]
    fn test_negative_rounding_is_symmetric() {
        assert_eq!(Money::from_minor(-1000).calculate_tax(TaxRate::from_bps(825)).minor(), -83);
    }

    #[test]
    fn test_serializes_as_minor_units() {
        let json = serde_json::to_string(&Money::from_minor(2949)).unwrap();
        assert_eq!(json, "2949");
    }

    /// Many small lines summed in integer space never drift.
    #[test]
    fn test_no_accumulated_drift() {
        let total: Money = (0..1000).map(|_| Money::from_minor(10)).sum();
        assert_eq!(total, Money::from_major(100));
    }
}
