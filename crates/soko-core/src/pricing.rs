//! # Pricing Engine
//!
//! Pure `(line items, discount, tax rate) → totals` computation.
//!
//! ```text
//!   subtotal = Σ(unit_price × quantity)
//!   discount = percentage: subtotal × bps / 10000   (half-up)
//!              fixed:      min(value, subtotal)
//!   tax      = (subtotal − discount) × rate         (half-up)
//!   total    = subtotal − discount + tax
//! ```
//!
//! Tax is always charged on the post-discount base.

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::money::Money;
use crate::types::{Discount, LineItem, TaxRate};

/// The four figures shown on the cart footer and the receipt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct OrderTotals {
    pub subtotal: Money,
    pub discount: Money,
    pub tax: Money,
    pub total: Money,
}

impl OrderTotals {
    /// The amount tax is charged on.
    pub fn taxable_base(&self) -> Money {
        self.subtotal - self.discount
    }
}

/// Computes order totals.
///
/// ## Example
/// ```rust
/// use soko_core::pricing::compute_totals;
/// use soko_core::types::{Discount, TaxRate};
///
/// let totals = compute_totals(&[], &Discount::none(), TaxRate::from_bps(1800));
/// assert!(totals.total.is_zero());
/// ```
pub fn compute_totals(items: &[LineItem], discount: &Discount, rate: TaxRate) -> OrderTotals {
    let subtotal: Money = items.iter().map(LineItem::line_total).sum();
    let discount = discount.amount_for(subtotal);
    let tax = (subtotal - discount).calculate_tax(rate);

    OrderTotals {
        subtotal,
        discount,
        tax,
        total: subtotal - discount + tax,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Currency;

    fn line(price: i64, qty: i64) -> LineItem {
        LineItem {
            product_id: format!("p-{price}"),
            name: "Item".into(),
            unit_price: Money::from_minor(price),
            currency: Currency::new("SSP").unwrap(),
            quantity: qty,
            stock_snapshot: 100,
            category: None,
        }
    }

    #[test]
    fn test_south_sudan_example() {
        let totals = compute_totals(&[line(2499, 1)], &Discount::none(), TaxRate::from_bps(1800));
        assert_eq!(totals.subtotal.minor(), 2499);
        assert_eq!(totals.tax.minor(), 450);
        assert_eq!(totals.total.minor(), 2949);
    }

    #[test]
    fn test_tax_on_post_discount_base() {
        let totals = compute_totals(
            &[line(10000, 1)],
            &Discount::Fixed(Money::from_minor(1000)),
            TaxRate::from_bps(1500),
        );
        assert_eq!(totals.discount.minor(), 1000);
        assert_eq!(totals.taxable_base().minor(), 9000);
        assert_eq!(totals.tax.minor(), 1350);
        assert_eq!(totals.total.minor(), 10350);
    }

    #[test]
    fn test_fixed_discount_above_subtotal_floors_at_zero() {
        for over in [5000, 5001, 1_000_000] {
            let totals = compute_totals(
                &[line(2500, 2)],
                &Discount::Fixed(Money::from_minor(over)),
                TaxRate::from_bps(1800),
            );
            assert_eq!(totals.discount, totals.subtotal);
            assert_eq!(totals.total, totals.tax);
            assert!(totals.total.is_zero());
        }
    }

    #[test]
    fn test_percentage_discount_range() {
        let items = [line(1999, 3)];
        for pct in [0u32, 1, 10, 33, 50, 99, 100] {
            let totals = compute_totals(&items, &Discount::Percentage(pct * 100), TaxRate::zero());
            let expected = (5997 * pct as i64 * 100 + 5000) / 10000;
            assert_eq!(totals.discount.minor(), expected, "pct {pct}");
            assert!(totals.total >= Money::zero());
        }
    }

    #[test]
    fn test_quantities_multiply() {
        let totals = compute_totals(&[line(150, 4), line(1000, 2)], &Discount::none(), TaxRate::zero());
        assert_eq!(totals.subtotal.minor(), 2600);
        assert_eq!(totals.total.minor(), 2600);
    }
}
