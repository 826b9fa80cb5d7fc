//! # Domain Types
//!
//! Core domain types used throughout Soko POS checkout.
//!
//! ## Type Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐       │
//! │  │    Product      │   │    LineItem     │   │    Customer     │       │
//! │  │  ─────────────  │   │  ─────────────  │   │  ─────────────  │       │
//! │  │  id             │──►│  product_id     │   │  id (or walk-in)│       │
//! │  │  price          │   │  unit_price     │   │  phone          │       │
//! │  │  stock          │   │  stock_snapshot │   │  country        │       │
//! │  └─────────────────┘   └─────────────────┘   └─────────────────┘       │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐       │
//! │  │    TaxRate      │   │    Discount     │   │ PaymentMethod   │       │
//! │  │  ─────────────  │   │  ─────────────  │   │  ─────────────  │       │
//! │  │  bps (u32)      │   │  Percentage     │   │  Cash  Card     │       │
//! │  │  1800 = 18%     │   │  Fixed          │   │  MobileMoney Qr │       │
//! │  └─────────────────┘   └─────────────────┘   └─────────────────┘       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use ts_rs::TS;

use crate::error::ValidationError;
use crate::money::Money;

// =============================================================================
// Tax Rate
// =============================================================================

/// Tax rate represented in basis points (bps).
///
/// ## Why Basis Points?
/// 1 basis point = 0.01% = 1/10000
/// 1800 bps = 18% (South Sudan), 750 bps = 7.5% (Nigeria)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct TaxRate(u32);

impl TaxRate {
    /// Creates a tax rate from basis points.
    #[inline]
    pub const fn from_bps(bps: u32) -> Self {
        TaxRate(bps)
    }

    /// Returns the rate in basis points.
    #[inline]
    pub const fn bps(&self) -> u32 {
        self.0
    }

    /// Returns the rate as a percentage (for display only).
    #[inline]
    pub fn percentage(&self) -> f64 {
        self.0 as f64 / 100.0
    }

    /// Zero tax rate.
    #[inline]
    pub const fn zero() -> Self {
        TaxRate(0)
    }

    #[inline]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }
}

impl Default for TaxRate {
    fn default() -> Self {
        TaxRate::zero()
    }
}

/// Jurisdiction tax descriptor: the `{rate, name}` pair applied to an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct TaxDescriptor {
    pub rate: TaxRate,
    /// Label printed on receipts, e.g. "VAT".
    pub name: String,
}

impl TaxDescriptor {
    pub fn new(rate: TaxRate, name: impl Into<String>) -> Self {
        TaxDescriptor {
            rate,
            name: name.into(),
        }
    }

    /// The descriptor used when no jurisdiction matches.
    pub fn no_tax() -> Self {
        TaxDescriptor::new(TaxRate::zero(), "No Tax")
    }
}

// =============================================================================
// Currency
// =============================================================================

/// Three-letter currency code (ISO-4217 style, upper case).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[serde(try_from = "String", into = "String")]
#[ts(export)]
pub struct Currency(String);

impl Currency {
    /// Parses and normalizes a currency code.
    pub fn new(code: &str) -> Result<Self, ValidationError> {
        let code = code.trim();
        if code.is_empty() {
            return Err(ValidationError::required("currency"));
        }
        if code.len() != 3 || !code.chars().all(|c| c.is_ascii_alphabetic()) {
            return Err(ValidationError::invalid(
                "currency",
                "must be a 3-letter code",
            ));
        }
        Ok(Currency(code.to_ascii_uppercase()))
    }

    pub fn code(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for Currency {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Currency::new(&value)
    }
}

impl From<Currency> for String {
    fn from(value: Currency) -> Self {
        value.0
    }
}

// =============================================================================
// Product
// =============================================================================

/// A product as listed on the POS grid.
///
/// `stock` is the level known at the time the product was loaded; the cart
/// snapshots it on every add.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Product {
    pub id: String,
    pub name: String,
    pub price: Money,
    pub currency: Currency,
    pub stock: i64,
    pub category: Option<String>,
}

impl Product {
    /// Checks whether `quantity` units can be sold from the current stock.
    pub fn can_sell(&self, quantity: i64) -> bool {
        self.stock >= quantity
    }
}

// =============================================================================
// Customer
// =============================================================================

/// The customer an order is rung up for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Customer {
    /// `None` for the anonymous walk-in customer.
    pub id: Option<String>,
    pub name: String,
    pub phone: Option<String>,
    /// Two-letter country code used for tax jurisdiction.
    pub country: Option<String>,
}

impl Customer {
    /// The anonymous default customer.
    pub fn walk_in() -> Self {
        Customer {
            id: None,
            name: "Walk-in Customer".to_string(),
            phone: None,
            country: None,
        }
    }

    pub fn is_walk_in(&self) -> bool {
        self.id.is_none()
    }
}

impl Default for Customer {
    fn default() -> Self {
        Customer::walk_in()
    }
}

// =============================================================================
// Line Item
// =============================================================================

/// One product line in an order.
///
/// `stock_snapshot` is the product's stock at the last stock check
/// (the most recent add); quantity never exceeds it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct LineItem {
    pub product_id: String,
    pub name: String,
    pub unit_price: Money,
    pub currency: Currency,
    pub quantity: i64,
    pub stock_snapshot: i64,
    pub category: Option<String>,
}

impl LineItem {
    /// Builds a fresh line (quantity 1) from a product.
    pub fn from_product(product: &Product) -> Self {
        LineItem {
            product_id: product.id.clone(),
            name: product.name.clone(),
            unit_price: product.price,
            currency: product.currency.clone(),
            quantity: 1,
            stock_snapshot: product.stock,
            category: product.category.clone(),
        }
    }

    /// unit_price × quantity
    #[inline]
    pub fn line_total(&self) -> Money {
        self.unit_price.multiply_quantity(self.quantity)
    }
}

// =============================================================================
// Discount
// =============================================================================

/// Order-level discount descriptor.
///
/// ```text
/// { "type": "percentage", "value": 1000 }   → 10% of subtotal
/// { "type": "fixed",      "value": 500 }    → 5.00 off, capped at subtotal
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
#[ts(export)]
pub enum Discount {
    /// Percentage of the subtotal in basis points (0..=10000).
    Percentage(u32),
    /// Fixed amount off the subtotal.
    Fixed(Money),
}

impl Discount {
    pub const fn none() -> Self {
        Discount::Fixed(Money::zero())
    }

    /// The discount amount for a given subtotal, never above the subtotal
    /// and never negative.
    pub fn amount_for(&self, subtotal: Money) -> Money {
        let raw = match self {
            Discount::Percentage(bps) => subtotal.percentage(*bps),
            Discount::Fixed(value) => *value,
        };
        if raw.is_negative() || !subtotal.is_positive() {
            return Money::zero();
        }
        raw.min(subtotal)
    }
}

impl Default for Discount {
    fn default() -> Self {
        Discount::none()
    }
}

// =============================================================================
// Payment Method
// =============================================================================

/// How the customer settles an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    Cash,
    Card,
    MobileMoney,
    Qr,
}

impl PaymentMethod {
    /// Methods that leave the device and wait on the customer's phone.
    pub const fn requires_polling(&self) -> bool {
        matches!(self, PaymentMethod::MobileMoney | PaymentMethod::Qr)
    }
}

impl fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PaymentMethod::Cash => "cash",
            PaymentMethod::Card => "card",
            PaymentMethod::MobileMoney => "mobile_money",
            PaymentMethod::Qr => "qr",
        };
        f.write_str(s)
    }
}

// =============================================================================
// Provenance
// =============================================================================

/// Whether a finalized transaction has been acknowledged by the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum Provenance {
    /// Accepted by the backend.
    Synced,
    /// Queued locally, not yet synced.
    Pending,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn product(stock: i64) -> Product {
        Product {
            id: "p-1".into(),
            name: "Coke 330ml".into(),
            price: Money::from_minor(150),
            currency: Currency::new("SSP").unwrap(),
            stock,
            category: Some("Drinks".into()),
        }
    }

    #[test]
    fn test_currency_normalizes_and_validates() {
        assert_eq!(Currency::new(" kes ").unwrap().code(), "KES");
        assert!(Currency::new("").is_err());
        assert!(Currency::new("KE").is_err());
        assert!(Currency::new("K3S").is_err());
    }

    #[test]
    fn test_currency_rejects_bad_code_on_deserialize() {
        assert!(serde_json::from_str::<Currency>("\"USD\"").is_ok());
        assert!(serde_json::from_str::<Currency>("\"DOLLARS\"").is_err());
    }

    #[test]
    fn test_line_item_from_product() {
        let item = LineItem::from_product(&product(12));
        assert_eq!(item.quantity, 1);
        assert_eq!(item.stock_snapshot, 12);
        assert_eq!(item.line_total(), Money::from_minor(150));
    }

    #[test]
    fn test_fixed_discount_is_capped_at_subtotal() {
        let subtotal = Money::from_minor(1000);
        assert_eq!(Discount::Fixed(Money::from_minor(300)).amount_for(subtotal).minor(), 300);
        assert_eq!(Discount::Fixed(Money::from_minor(5000)).amount_for(subtotal), subtotal);
        assert_eq!(Discount::none().amount_for(subtotal), Money::zero());
    }

    #[test]
    fn test_percentage_discount() {
        let subtotal = Money::from_minor(2499);
        assert_eq!(Discount::Percentage(1000).amount_for(subtotal).minor(), 250);
        assert_eq!(Discount::Percentage(10_000).amount_for(subtotal), subtotal);
    }

    #[test]
    fn test_discount_wire_shape() {
        let json = serde_json::to_value(Discount::Percentage(1250)).unwrap();
        assert_eq!(json, serde_json::json!({ "type": "percentage", "value": 1250 }));
    }

    #[test]
    fn test_walk_in_customer() {
        let c = Customer::default();
        assert!(c.is_walk_in());
        assert!(c.country.is_none());
    }

    #[test]
    fn test_payment_method_display() {
        assert_eq!(PaymentMethod::MobileMoney.to_string(), "mobile_money");
        assert!(PaymentMethod::Qr.requires_polling());
        assert!(!PaymentMethod::Card.requires_polling());
    }
}
