//! # Cart / Order Aggregate
//!
//! The in-progress order for one sale, with stock-bound quantity mutation.
//!
//! ## Cart Operations Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Cart Operations                                      │
//! │                                                                         │
//! │  Operator Action          Operation              Side Effect            │
//! │  ───────────────          ─────────              ───────────            │
//! │                                                                         │
//! │  Tap Product ────────────► add_item() ─────────► recompute totals      │
//! │                                                                         │
//! │  Change Quantity ────────► set_quantity() ─────► recompute totals      │
//! │                                                                         │
//! │  Swipe Remove ───────────► remove_item() ──────► recompute totals      │
//! │                                                                         │
//! │  Enter Discount ─────────► apply_discount() ───► recompute totals      │
//! │                                                                         │
//! │  Pick Customer ──────────► select_customer() ──► re-resolve tax,       │
//! │                                                  recompute totals      │
//! │                                                                         │
//! │  Pay ────────────────────► snapshot() ─────────► frozen OrderSnapshot  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Invariants
//! - Lines are unique by `product_id` (adding the same product increments)
//! - A line's quantity never exceeds its `stock_snapshot`
//! - Totals are recomputed inside every successful mutation; a failed
//!   mutation leaves items and totals untouched
//! - Every line is priced in the order's currency

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;
use uuid::Uuid;

use crate::error::{CoreError, CoreResult};
use crate::pricing::{compute_totals, OrderTotals};
use crate::tax::TaxPolicy;
use crate::types::{Currency, Customer, Discount, LineItem, Product, TaxDescriptor};
use crate::validation::validate_discount;
use crate::MAX_CART_ITEMS;

// =============================================================================
// Order Snapshot
// =============================================================================

/// A frozen copy of the order, taken when payment starts.
///
/// The payment attempt, the finalized transaction and the receipt are all
/// built from this value, never from the live cart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct OrderSnapshot {
    pub order_id: String,
    pub items: Vec<LineItem>,
    pub customer: Customer,
    pub discount: Discount,
    pub note: Option<String>,
    pub tax: TaxDescriptor,
    pub currency: Currency,
    pub totals: OrderTotals,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

impl OrderSnapshot {
    /// Total units across all lines.
    pub fn unit_count(&self) -> i64 {
        self.items.iter().map(|i| i.quantity).sum()
    }
}

// =============================================================================
// Cart
// =============================================================================

/// The order being rung up.
#[derive(Debug, Clone)]
pub struct Cart {
    order_id: String,
    items: Vec<LineItem>,
    customer: Customer,
    discount: Discount,
    note: Option<String>,
    tax: TaxDescriptor,
    currency: Currency,
    policy: Arc<TaxPolicy>,
    totals: OrderTotals,
    created_at: DateTime<Utc>,
}

impl Cart {
    /// Creates an empty cart for a walk-in customer.
    pub fn new(currency: Currency, policy: Arc<TaxPolicy>) -> Self {
        let customer = Customer::walk_in();
        let tax = policy.resolve(&customer);
        Cart {
            order_id: Uuid::new_v4().to_string(),
            items: Vec::new(),
            customer,
            discount: Discount::none(),
            note: None,
            tax,
            currency,
            policy,
            totals: OrderTotals::default(),
            created_at: Utc::now(),
        }
    }

    // -------------------------------------------------------------------------
    // Accessors
    // -------------------------------------------------------------------------

    pub fn order_id(&self) -> &str {
        &self.order_id
    }

    pub fn items(&self) -> &[LineItem] {
        &self.items
    }

    pub fn customer(&self) -> &Customer {
        &self.customer
    }

    pub fn discount(&self) -> &Discount {
        &self.discount
    }

    pub fn note(&self) -> Option<&str> {
        self.note.as_deref()
    }

    pub fn tax(&self) -> &TaxDescriptor {
        &self.tax
    }

    pub fn currency(&self) -> &Currency {
        &self.currency
    }

    /// Current totals. Always consistent with the current items.
    pub fn totals(&self) -> OrderTotals {
        self.totals
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn line_count(&self) -> usize {
        self.items.len()
    }

    pub fn get_item(&self, product_id: &str) -> Option<&LineItem> {
        self.items.iter().find(|i| i.product_id == product_id)
    }

    // -------------------------------------------------------------------------
    // Mutations
    // -------------------------------------------------------------------------

    /// Adds one unit of a product.
    ///
    /// ## Behavior
    /// - `product.stock <= 0` → `OutOfStock`
    /// - already in cart → quantity + 1, `StockLimit` if that exceeds stock
    /// - new product → appended with quantity 1
    ///
    /// The line's stock snapshot is refreshed from `product` on success.
    pub fn add_item(&mut self, product: &Product) -> CoreResult<()> {
        if product.currency != self.currency {
            return Err(CoreError::CurrencyMismatch {
                order_currency: self.currency.to_string(),
                product_currency: product.currency.to_string(),
            });
        }

        if product.stock <= 0 {
            return Err(CoreError::OutOfStock {
                name: product.name.clone(),
            });
        }

        if let Some(item) = self.items.iter_mut().find(|i| i.product_id == product.id) {
            let requested = item.quantity + 1;
            if !product.can_sell(requested) {
                return Err(CoreError::stock_limit(&product.name, product.stock, requested));
            }
            item.quantity = requested;
            item.stock_snapshot = product.stock;
        } else {
            if self.items.len() >= MAX_CART_ITEMS {
                return Err(CoreError::CartTooLarge { max: MAX_CART_ITEMS });
            }
            self.items.push(LineItem::from_product(product));
        }

        self.recalculate();
        Ok(())
    }

    /// Sets the quantity of a line.
    ///
    /// `qty <= 0` removes the line. A quantity above the line's stock
    /// snapshot fails with `StockLimit` and leaves the line unchanged.
    pub fn set_quantity(&mut self, product_id: &str, qty: i64) -> CoreResult<()> {
        if qty <= 0 {
            return self.remove_item(product_id).map(|_| ());
        }

        let item = self
            .items
            .iter_mut()
            .find(|i| i.product_id == product_id)
            .ok_or_else(|| CoreError::ItemNotFound(product_id.to_string()))?;

        if qty > item.stock_snapshot {
            return Err(CoreError::stock_limit(&item.name, item.stock_snapshot, qty));
        }

        item.quantity = qty;
        self.recalculate();
        Ok(())
    }

    /// Removes a line entirely.
    pub fn remove_item(&mut self, product_id: &str) -> CoreResult<LineItem> {
        let pos = self
            .items
            .iter()
            .position(|i| i.product_id == product_id)
            .ok_or_else(|| CoreError::ItemNotFound(product_id.to_string()))?;

        let removed = self.items.remove(pos);
        self.recalculate();
        Ok(removed)
    }

    /// Replaces the order discount.
    pub fn apply_discount(&mut self, discount: Discount) -> CoreResult<()> {
        validate_discount(&discount)?;
        self.discount = discount;
        self.recalculate();
        Ok(())
    }

    /// Selects a customer (`None` reverts to walk-in) and re-resolves tax.
    pub fn select_customer(&mut self, customer: Option<Customer>) {
        self.customer = customer.unwrap_or_default();
        self.tax = self.policy.resolve(&self.customer);
        self.recalculate();
    }

    pub fn set_note(&mut self, note: Option<String>) {
        self.note = note.filter(|n| !n.trim().is_empty());
    }

    /// Empties the cart and starts a new order id.
    pub fn clear(&mut self) {
        self.order_id = Uuid::new_v4().to_string();
        self.items.clear();
        self.customer = Customer::walk_in();
        self.discount = Discount::none();
        self.note = None;
        self.tax = self.policy.resolve(&self.customer);
        self.created_at = Utc::now();
        self.recalculate();
    }

    /// Freezes the order for payment.
    pub fn snapshot(&self) -> OrderSnapshot {
        OrderSnapshot {
            order_id: self.order_id.clone(),
            items: self.items.clone(),
            customer: self.customer.clone(),
            discount: self.discount,
            note: self.note.clone(),
            tax: self.tax.clone(),
            currency: self.currency.clone(),
            totals: self.totals,
            created_at: self.created_at,
        }
    }

    fn recalculate(&mut self) {
        self.totals = compute_totals(&self.items, &self.discount, self.tax.rate);
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::money::Money;
    use crate::tax::{TaxPrecedence, TaxTable};

    fn ssp() -> Currency {
        Currency::new("SSP").unwrap()
    }

    fn cart() -> Cart {
        let policy = TaxPolicy::new(TaxTable::default(), "SS", TaxPrecedence::CustomerCountry);
        Cart::new(ssp(), Arc::new(policy))
    }

    fn product(id: &str, price: i64, stock: i64) -> Product {
        Product {
            id: id.into(),
            name: format!("Product {id}"),
            price: Money::from_minor(price),
            currency: ssp(),
            stock,
            category: None,
        }
    }

    #[test]
    fn test_add_item_recomputes_totals() {
        let mut cart = cart();
        cart.add_item(&product("a", 2499, 5)).unwrap();

        let totals = cart.totals();
        assert_eq!(totals.subtotal.minor(), 2499);
        assert_eq!(totals.tax.minor(), 450);
        assert_eq!(totals.total.minor(), 2949);
    }

    #[test]
    fn test_add_out_of_stock() {
        let mut cart = cart();
        let err = cart.add_item(&product("a", 100, 0)).unwrap_err();
        assert!(matches!(err, CoreError::OutOfStock { .. }));
        assert!(cart.is_empty());
    }

    #[test]
    fn test_add_existing_increments_until_stock_limit() {
        let mut cart = cart();
        let p = product("a", 100, 2);
        cart.add_item(&p).unwrap();
        cart.add_item(&p).unwrap();
        assert_eq!(cart.get_item("a").unwrap().quantity, 2);

        let err = cart.add_item(&p).unwrap_err();
        assert_eq!(err, CoreError::stock_limit("Product a", 2, 3));
        assert_eq!(cart.get_item("a").unwrap().quantity, 2);
        assert_eq!(cart.totals().subtotal.minor(), 200);
    }

    #[test]
    fn test_add_currency_mismatch() {
        let mut cart = cart();
        let mut p = product("a", 100, 2);
        p.currency = Currency::new("KES").unwrap();
        assert!(matches!(cart.add_item(&p), Err(CoreError::CurrencyMismatch { .. })));
    }

    #[test]
    fn test_set_quantity_above_snapshot_leaves_line_unchanged() {
        let mut cart = cart();
        cart.add_item(&product("a", 100, 3)).unwrap();
        cart.set_quantity("a", 3).unwrap();

        let before = cart.totals();
        let err = cart.set_quantity("a", 4).unwrap_err();
        assert!(matches!(err, CoreError::StockLimit { available: 3, requested: 4, .. }));
        assert_eq!(cart.get_item("a").unwrap().quantity, 3);
        assert_eq!(cart.totals(), before);
    }

    #[test]
    fn test_set_quantity_zero_removes() {
        let mut cart = cart();
        cart.add_item(&product("a", 100, 3)).unwrap();
        cart.set_quantity("a", 0).unwrap();
        assert!(cart.is_empty());
        assert!(cart.totals().total.is_zero());
    }

    #[test]
    fn test_set_quantity_unknown_item() {
        let mut cart = cart();
        assert!(matches!(cart.set_quantity("nope", 2), Err(CoreError::ItemNotFound(_))));
    }

    #[test]
    fn test_remove_item() {
        let mut cart = cart();
        cart.add_item(&product("a", 100, 3)).unwrap();
        cart.add_item(&product("b", 200, 3)).unwrap();
        let removed = cart.remove_item("a").unwrap();
        assert_eq!(removed.product_id, "a");
        assert_eq!(cart.totals().subtotal.minor(), 200);
    }

    #[test]
    fn test_apply_discount_rejects_over_100_percent() {
        let mut cart = cart();
        cart.add_item(&product("a", 10000, 3)).unwrap();
        assert!(cart.apply_discount(Discount::Percentage(10_001)).is_err());
        assert!(cart.totals().discount.is_zero());

        cart.apply_discount(Discount::Fixed(Money::from_minor(1000))).unwrap();
        assert_eq!(cart.totals().tax.minor(), 1620); // 90.00 × 18%
    }

    #[test]
    fn test_select_customer_re_resolves_tax() {
        let mut cart = cart();
        cart.add_item(&product("a", 10000, 3)).unwrap();
        assert_eq!(cart.tax().rate.bps(), 1800);

        cart.select_customer(Some(Customer {
            id: Some("c-1".into()),
            name: "Wanjiru".into(),
            phone: None,
            country: Some("KE".into()),
        }));
        assert_eq!(cart.tax().rate.bps(), 1600);
        assert_eq!(cart.totals().tax.minor(), 1600);

        cart.select_customer(None);
        assert!(cart.customer().is_walk_in());
        assert_eq!(cart.totals().tax.minor(), 1800);
    }

    #[test]
    fn test_snapshot_is_detached_from_cart() {
        let mut cart = cart();
        cart.add_item(&product("a", 2499, 3)).unwrap();
        let snapshot = cart.snapshot();

        cart.add_item(&product("a", 2499, 3)).unwrap();
        assert_eq!(snapshot.totals.total.minor(), 2949);
        assert_eq!(snapshot.unit_count(), 1);
        assert_ne!(cart.totals(), snapshot.totals);
    }

    #[test]
    fn test_clear_starts_new_order() {
        let mut cart = cart();
        cart.add_item(&product("a", 100, 3)).unwrap();
        cart.set_note(Some("no ice".into()));
        let old_id = cart.order_id().to_string();

        cart.clear();
        assert!(cart.is_empty());
        assert!(cart.note().is_none());
        assert_ne!(cart.order_id(), old_id);
    }
}
