//! # Receipts
//!
//! Builds the receipt value for a finalized transaction and renders the
//! plain-text body used on screen and in the SMS receipt.
//!
//! ## Receipt Number Format
//! ```text
//!   RCP-261019-143052-0417
//!       ──┬─── ──┬─── ─┬──
//!         │      │     └── 4 digits from the sub-second clock
//!         │      └──────── HHMMSS (UTC)
//!         └─────────────── YYMMDD (UTC)
//! ```

use std::fmt::Write as _;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::money::Money;
use crate::payment::PaymentPayload;
use crate::transaction::Transaction;
use crate::types::{Currency, PaymentMethod, Provenance};

/// Merchant details printed in the receipt header.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct BusinessIdentity {
    pub id: String,
    pub name: String,
    pub phone: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct ReceiptLine {
    pub name: String,
    pub quantity: i64,
    pub unit_price: Money,
    pub line_total: Money,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Receipt {
    pub receipt_number: String,
    pub business: BusinessIdentity,
    pub transaction_id: String,
    pub provenance: Provenance,
    pub customer_name: String,
    pub items: Vec<ReceiptLine>,
    pub currency: Currency,
    pub subtotal: Money,
    pub discount: Money,
    pub tax_name: String,
    pub tax: Money,
    pub total: Money,
    pub method: PaymentMethod,
    /// Masked card number or the paying phone number, when relevant.
    pub payment_reference: Option<String>,
    pub change: Money,
    #[ts(as = "String")]
    pub issued_at: DateTime<Utc>,
}

impl Receipt {
    /// Builds the receipt for a transaction.
    pub fn build(business: BusinessIdentity, tx: &Transaction, issued_at: DateTime<Utc>) -> Self {
        let order = &tx.order;
        let items = order
            .items
            .iter()
            .map(|item| ReceiptLine {
                name: item.name.clone(),
                quantity: item.quantity,
                unit_price: item.unit_price,
                line_total: item.line_total(),
            })
            .collect();

        let payment_reference = match &tx.attempt.payload {
            PaymentPayload::Card(card) => Some(card.masked()),
            PaymentPayload::MobileMoney { phone_number } => Some(phone_number.clone()),
            PaymentPayload::Qr { .. } => tx.attempt.gateway_ref.clone(),
            PaymentPayload::Cash { .. } => None,
        };

        Receipt {
            receipt_number: generate_receipt_number(issued_at),
            business,
            transaction_id: tx.id.clone(),
            provenance: tx.provenance,
            customer_name: order.customer.name.clone(),
            items,
            currency: order.currency.clone(),
            subtotal: order.totals.subtotal,
            discount: order.totals.discount,
            tax_name: order.tax.name.clone(),
            tax: order.totals.tax,
            total: order.totals.total,
            method: tx.attempt.method,
            payment_reference,
            change: tx.attempt.change.unwrap_or_default(),
            issued_at,
        }
    }

    /// Plain-text rendering for display and SMS.
    pub fn render_text(&self) -> String {
        let cur = self.currency.code();
        let mut out = String::new();

        let _ = writeln!(out, "{}", self.business.name);
        if let Some(phone) = &self.business.phone {
            let _ = writeln!(out, "Tel: {phone}");
        }
        let _ = writeln!(out, "Receipt: {}", self.receipt_number);
        let _ = writeln!(out, "Date: {}", self.issued_at.format("%Y-%m-%d %H:%M"));
        let _ = writeln!(out, "Customer: {}", self.customer_name);
        let _ = writeln!(out, "--------------------------------");

        for line in &self.items {
            let _ = writeln!(
                out,
                "{} x{} @ {} = {} {}",
                line.name, line.quantity, line.unit_price, cur, line.line_total
            );
        }

        let _ = writeln!(out, "--------------------------------");
        let _ = writeln!(out, "Subtotal: {cur} {}", self.subtotal);
        if self.discount.is_positive() {
            let _ = writeln!(out, "Discount: -{cur} {}", self.discount);
        }
        let _ = writeln!(out, "{}: {cur} {}", self.tax_name, self.tax);
        let _ = writeln!(out, "TOTAL: {cur} {}", self.total);
        match &self.payment_reference {
            Some(reference) => {
                let _ = writeln!(out, "Paid by: {} ({reference})", self.method);
            }
            None => {
                let _ = writeln!(out, "Paid by: {}", self.method);
            }
        }
        if self.change.is_positive() {
            let _ = writeln!(out, "Change: {cur} {}", self.change);
        }
        let _ = write!(out, "Thank you for shopping with us!");
        out
    }
}

/// Generates a receipt number: `RCP-YYMMDD-HHMMSS-NNNN`.
pub fn generate_receipt_number(now: DateTime<Utc>) -> String {
    let suffix = now.timestamp_subsec_nanos() % 10_000;
    format!("RCP-{}-{:04}", now.format("%y%m%d-%H%M%S"), suffix)
}
