//! # Wire Protocol
//!
//! JSON bodies for the payments and sales endpoints.
//!
//! ## Endpoints
//! ```text
//! ┌──────────────────────────────────────┬───────────────────────────────────┐
//! │ POST /payments/qr/create             │ QrCreateRequest → QrCreateResponse│
//! │ GET  /payments/qr/status/{id}        │ → StatusReport                    │
//! │ POST /payments/pos/process-card      │ CardPaymentRequest → CardResponse │
//! │ POST /payments/pos/process-mobile-   │ MobileMoneyRequest                │
//! │      money                           │   → MobileMoneyResponse           │
//! │ GET  /payments/mobile-money/status/  │ → StatusReport                    │
//! │      {id}                            │                                   │
//! │ POST /sales/pos/complete-transaction │ CompleteTransactionRequest        │
//! │                                      │   → CompleteTransactionResponse   │
//! │ POST /sales/pos/send-receipt         │ SendReceiptRequest → Ack          │
//! └──────────────────────────────────────┴───────────────────────────────────┘
//! ```
//!
//! ## Amounts
//! Amounts travel twice: `amount` as a decimal string (`"29.49"`) for
//! backends that read major units, and `amount_minor` as an integer.
//! Nothing on this side parses a decimal back into `Money`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use soko_core::{
    CardDetails, Customer, LineItem, Money, OrderSnapshot, PaymentAttempt, PaymentMethod,
    PaymentPayload, Transaction,
};

// =============================================================================
// Shared Pieces
// =============================================================================

/// Correlation ids attached to every payment request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentMetadata {
    pub business_id: String,
    pub order_id: String,
    pub attempt_id: String,
}

impl PaymentMetadata {
    pub fn for_attempt(business_id: &str, attempt: &PaymentAttempt) -> Self {
        PaymentMetadata {
            business_id: business_id.to_string(),
            order_id: attempt.order_id.clone(),
            attempt_id: attempt.id.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireLine {
    pub product_id: String,
    pub name: String,
    pub quantity: i64,
    pub unit_price: String,
    pub unit_price_minor: i64,
    pub line_total: String,
}

impl From<&LineItem> for WireLine {
    fn from(item: &LineItem) -> Self {
        WireLine {
            product_id: item.product_id.clone(),
            name: item.name.clone(),
            quantity: item.quantity,
            unit_price: item.unit_price.to_major_string(),
            unit_price_minor: item.unit_price.minor(),
            line_total: item.line_total().to_major_string(),
        }
    }
}

/// Remote payment state as reported by a status endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GatewayStatus {
    Pending,
    Completed,
    Failed,
    Cancelled,
    /// Any status string this client does not know; treated as pending.
    #[serde(other)]
    Unknown,
}

impl GatewayStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            GatewayStatus::Completed | GatewayStatus::Failed | GatewayStatus::Cancelled
        )
    }
}

/// Body of both status endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusReport {
    pub status: GatewayStatus,
    #[serde(default)]
    pub message: Option<String>,
}

impl StatusReport {
    pub fn new(status: GatewayStatus) -> Self {
        StatusReport {
            status,
            message: None,
        }
    }

    /// Operator-facing reason for a failed or cancelled payment.
    pub fn failure_message(&self) -> String {
        match (&self.message, self.status) {
            (Some(message), _) if !message.trim().is_empty() => message.clone(),
            (_, GatewayStatus::Cancelled) => "Payment was cancelled by the customer".to_string(),
            _ => "Payment failed".to_string(),
        }
    }
}

/// Generic `{ success, message }` acknowledgement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ack {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub message: Option<String>,
}

// =============================================================================
// Card
// =============================================================================

/// Card payload as sent to the gateway. Unlike [`CardDetails`]'s own
/// serialization this carries the full PAN and CVC; it is only ever
/// written to the gateway request body.
#[derive(Clone, PartialEq, Eq, Serialize)]
pub struct WireCard {
    pub number: String,
    pub expiry_month: u32,
    pub expiry_year: i32,
    pub cvc: String,
    pub holder_name: String,
}

impl std::fmt::Debug for WireCard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let last4: String = self
            .number
            .chars()
            .rev()
            .take(4)
            .collect::<Vec<_>>()
            .into_iter()
            .rev()
            .collect();
        f.debug_struct("WireCard")
            .field("number", &format!("**** {last4}"))
            .field("holder_name", &self.holder_name)
            .finish_non_exhaustive()
    }
}

impl From<&CardDetails> for WireCard {
    fn from(card: &CardDetails) -> Self {
        WireCard {
            number: card.number_digits(),
            expiry_month: card.expiry_month,
            expiry_year: card.expiry_year,
            cvc: card.cvc.clone(),
            holder_name: card.holder_name.trim().to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CardPaymentRequest {
    pub amount: String,
    pub amount_minor: i64,
    pub currency: String,
    pub card: WireCard,
    pub metadata: PaymentMetadata,
}

impl CardPaymentRequest {
    pub fn new(attempt: &PaymentAttempt, card: &CardDetails, business_id: &str) -> Self {
        CardPaymentRequest {
            amount: attempt.amount_due.to_major_string(),
            amount_minor: attempt.amount_due.minor(),
            currency: attempt.currency.code().to_string(),
            card: WireCard::from(card),
            metadata: PaymentMetadata::for_attempt(business_id, attempt),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CardPaymentResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub payment_id: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

// =============================================================================
// Mobile Money
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MobileMoneyRequest {
    pub amount: String,
    pub amount_minor: i64,
    pub currency: String,
    pub phone_number: String,
    pub metadata: PaymentMetadata,
}

impl MobileMoneyRequest {
    pub fn new(attempt: &PaymentAttempt, phone_number: &str, business_id: &str) -> Self {
        MobileMoneyRequest {
            amount: attempt.amount_due.to_major_string(),
            amount_minor: attempt.amount_due.minor(),
            currency: attempt.currency.code().to_string(),
            phone_number: phone_number.to_string(),
            metadata: PaymentMetadata::for_attempt(business_id, attempt),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MobileMoneyResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub transaction_id: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

// =============================================================================
// Dynamic QR
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QrCreateRequest {
    pub transaction_id: String,
    pub business_id: String,
    pub amount: String,
    pub amount_minor: i64,
    pub currency: String,
    pub items: Vec<WireLine>,
}

impl QrCreateRequest {
    pub fn new(order: &OrderSnapshot, attempt: &PaymentAttempt, business_id: &str) -> Self {
        let transaction_id = match &attempt.payload {
            PaymentPayload::Qr { transaction_id } => transaction_id.clone(),
            _ => attempt.id.clone(),
        };
        QrCreateRequest {
            transaction_id,
            business_id: business_id.to_string(),
            amount: attempt.amount_due.to_major_string(),
            amount_minor: attempt.amount_due.minor(),
            currency: attempt.currency.code().to_string(),
            items: order.items.iter().map(WireLine::from).collect(),
        }
    }

    /// Locally synthesized QR content, used when the backend cannot create
    /// one. Encodes the same fields the backend would.
    pub fn synthesize_payload(&self) -> String {
        serde_json::json!({
            "type": "soko_pay",
            "transaction_id": self.transaction_id,
            "business_id": self.business_id,
            "amount": self.amount,
            "currency": self.currency,
            "items": self
                .items
                .iter()
                .map(|line| serde_json::json!({ "name": line.name, "quantity": line.quantity }))
                .collect::<Vec<_>>(),
        })
        .to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QrCreateResponse {
    #[serde(default)]
    pub success: Option<bool>,
    #[serde(default)]
    pub qr_data: Option<String>,
    #[serde(default)]
    pub transaction_id: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

/// A QR code the gateway is ready to be paid against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QrCreated {
    pub qr_data: String,
    /// Id to poll; the gateway may echo ours or assign its own.
    pub transaction_id: String,
}

// =============================================================================
// Sales
// =============================================================================

/// Full transaction payload for `complete-transaction`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompleteTransactionRequest {
    /// Idempotency key.
    pub local_id: String,
    pub business_id: String,
    pub order_id: String,
    pub customer: Customer,
    pub items: Vec<WireLine>,
    pub note: Option<String>,
    pub currency: String,
    pub subtotal: String,
    pub discount: String,
    pub tax_name: String,
    pub tax_rate_bps: u32,
    pub tax: String,
    pub total: String,
    pub total_minor: i64,
    pub payment_method: PaymentMethod,
    /// Gateway payment or transaction id, absent for cash.
    pub payment_reference: Option<String>,
    pub amount_received: Option<String>,
    pub change: Option<String>,
    pub settled_at: DateTime<Utc>,
}

impl CompleteTransactionRequest {
    pub fn new(tx: &Transaction, business_id: &str) -> Self {
        let order = &tx.order;
        let attempt = &tx.attempt;
        let amount_received = match &attempt.payload {
            PaymentPayload::Cash { received } => Some(received.to_major_string()),
            _ => None,
        };

        CompleteTransactionRequest {
            local_id: tx.local_id.clone(),
            business_id: business_id.to_string(),
            order_id: order.order_id.clone(),
            customer: order.customer.clone(),
            items: order.items.iter().map(WireLine::from).collect(),
            note: order.note.clone(),
            currency: order.currency.code().to_string(),
            subtotal: order.totals.subtotal.to_major_string(),
            discount: order.totals.discount.to_major_string(),
            tax_name: order.tax.name.clone(),
            tax_rate_bps: order.tax.rate.bps(),
            tax: order.totals.tax.to_major_string(),
            total: order.totals.total.to_major_string(),
            total_minor: order.totals.total.minor(),
            payment_method: attempt.method,
            payment_reference: attempt.gateway_ref.clone(),
            amount_received,
            change: attempt.change.as_ref().map(Money::to_major_string),
            settled_at: tx.settled_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompleteTransactionResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub transaction_id: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendReceiptRequest {
    pub transaction_id: String,
    pub phone_number: String,
    pub receipt_number: String,
    /// Rendered receipt, for backends that send the body as-is.
    pub message: String,
}
