//! # Payment Attempt
//!
//! One try at settling an order with one payment method.
//!
//! ## State Machine
//! ```text
//!                    ┌──────────┐
//!                    │ Created  │──────────────────────────────┐
//!                    └────┬─────┘                              │
//!                         ▼                                    │
//!                    ┌──────────┐   card/cash                  │
//!                    │Submitting│────────────► Completed       │
//!                    └────┬─────┘────────────► Failed          │
//!          mobile money/QR│                                    │
//!                         ▼                                    ▼
//!            ┌────────────────────────┐                   Cancelled
//!            │ AwaitingExternalAction │────► Failed / Expired  ▲
//!            └───────────┬────────────┘                        │
//!                        ▼                                     │
//!                   ┌─────────┐──► Completed                  │
//!                   │ Polling │──► Failed                     │
//!                   └─────────┘──► Expired                    │
//!                        └─────────────────────────────────────┘
//! ```
//!
//! Terminal states (`Completed`, `Failed`, `Expired`, `Cancelled`) accept no
//! further transitions. The amount due is copied from the order snapshot
//! when the attempt is created and never changes afterwards.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, Serializer};
use ts_rs::TS;
use uuid::Uuid;

use crate::cart::OrderSnapshot;
use crate::error::{CoreError, CoreResult};
use crate::money::Money;
use crate::types::{Currency, PaymentMethod};

// =============================================================================
// Attempt State
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum AttemptState {
    Created,
    Submitting,
    /// Waiting for the customer to approve on their phone.
    AwaitingExternalAction,
    Polling,
    Completed,
    Failed,
    Expired,
    Cancelled,
}

impl AttemptState {
    pub const fn is_terminal(&self) -> bool {
        matches!(
            self,
            AttemptState::Completed
                | AttemptState::Failed
                | AttemptState::Expired
                | AttemptState::Cancelled
        )
    }

    /// Legal edges of the attempt state machine.
    pub fn can_transition_to(&self, to: AttemptState) -> bool {
        use AttemptState::*;

        match self {
            Created => matches!(to, Submitting | Failed | Cancelled),
            Submitting => matches!(to, Completed | Failed | AwaitingExternalAction | Cancelled),
            AwaitingExternalAction => matches!(to, Polling | Failed | Expired | Cancelled),
            Polling => matches!(to, Completed | Failed | Expired | Cancelled),
            Completed | Failed | Expired | Cancelled => false,
        }
    }
}

impl fmt::Display for AttemptState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AttemptState::Created => "created",
            AttemptState::Submitting => "submitting",
            AttemptState::AwaitingExternalAction => "awaiting_external_action",
            AttemptState::Polling => "polling",
            AttemptState::Completed => "completed",
            AttemptState::Failed => "failed",
            AttemptState::Expired => "expired",
            AttemptState::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

// =============================================================================
// Card Details
// =============================================================================

/// Card payload entered on the payment dialog.
///
/// The PAN is masked and the CVC dropped whenever this value is serialized
/// (the offline queue, the UI bridge). The raw values only leave the process
/// through the gateway request, which reads the fields directly.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct CardDetails {
    #[serde(serialize_with = "serialize_masked_pan")]
    pub number: String,
    pub expiry_month: u32,
    pub expiry_year: i32,
    #[serde(skip_serializing, default)]
    pub cvc: String,
    pub holder_name: String,
}

impl CardDetails {
    /// The PAN with spaces and dashes removed.
    pub fn number_digits(&self) -> String {
        self.number
            .chars()
            .filter(|c| !matches!(c, ' ' | '-'))
            .collect()
    }

    /// Last four digits, for logs and receipts.
    pub fn last4(&self) -> String {
        let digits: Vec<char> = self.number.chars().filter(|c| c.is_ascii_digit()).collect();
        let start = digits.len().saturating_sub(4);
        digits[start..].iter().collect()
    }

    pub fn masked(&self) -> String {
        format!("**** {}", self.last4())
    }
}

impl fmt::Debug for CardDetails {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CardDetails")
            .field("number", &self.masked())
            .field("expiry_month", &self.expiry_month)
            .field("expiry_year", &self.expiry_year)
            .field("cvc", &"***")
            .field("holder_name", &self.holder_name)
            .finish()
    }
}

fn serialize_masked_pan<S: Serializer>(number: &str, serializer: S) -> Result<S::Ok, S::Error> {
    let digits: Vec<char> = number.chars().filter(|c| c.is_ascii_digit()).collect();
    let start = digits.len().saturating_sub(4);
    let last4: String = digits[start..].iter().collect();
    serializer.serialize_str(&format!("**** {last4}"))
}

// =============================================================================
// Payload
// =============================================================================

/// Method-specific data for an attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum PaymentPayload {
    Cash { received: Money },
    Card(CardDetails),
    MobileMoney { phone_number: String },
    Qr { transaction_id: String },
}

impl PaymentPayload {
    pub fn method(&self) -> PaymentMethod {
        match self {
            PaymentPayload::Cash { .. } => PaymentMethod::Cash,
            PaymentPayload::Card(_) => PaymentMethod::Card,
            PaymentPayload::MobileMoney { .. } => PaymentMethod::MobileMoney,
            PaymentPayload::Qr { .. } => PaymentMethod::Qr,
        }
    }
}

/// QR payload shown to the customer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct QrDisplay {
    pub data: String,
    /// `true` when the backend could not create the QR and the payload was
    /// synthesized on the device.
    pub simulated: bool,
}

// =============================================================================
// Payment Attempt
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct PaymentAttempt {
    pub id: String,
    pub order_id: String,
    pub method: PaymentMethod,
    pub amount_due: Money,
    pub currency: Currency,
    pub payload: PaymentPayload,
    pub state: AttemptState,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
    /// Gateway correlation id, once the gateway assigns one.
    pub gateway_ref: Option<String>,
    /// Operator-facing reason for `Failed`, verbatim from the gateway.
    pub failure: Option<String>,
    /// Change due (cash only).
    pub change: Option<Money>,
    pub qr: Option<QrDisplay>,
    /// Status checks issued so far.
    pub polls: u32,
}

impl PaymentAttempt {
    /// Creates an attempt for the frozen order.
    pub fn new(order: &OrderSnapshot, payload: PaymentPayload) -> Self {
        let now = Utc::now();
        PaymentAttempt {
            id: Uuid::new_v4().to_string(),
            order_id: order.order_id.clone(),
            method: payload.method(),
            amount_due: order.totals.total,
            currency: order.currency.clone(),
            payload,
            state: AttemptState::Created,
            created_at: now,
            updated_at: now,
            gateway_ref: None,
            failure: None,
            change: None,
            qr: None,
            polls: 0,
        }
    }

    /// Moves to `to` if the edge is legal.
    pub fn transition(&mut self, to: AttemptState) -> CoreResult<()> {
        if !self.state.can_transition_to(to) {
            return Err(CoreError::InvalidTransition {
                from: self.state,
                to,
            });
        }
        self.state = to;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Moves to `Failed`, recording the operator-facing reason.
    pub fn fail(&mut self, reason: impl Into<String>) -> CoreResult<()> {
        self.transition(AttemptState::Failed)?;
        self.failure = Some(reason.into());
        Ok(())
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    pub fn is_completed(&self) -> bool {
        self.state == AttemptState::Completed
    }
}

/// Computes change for a cash payment.
///
/// ## Example
/// ```rust
/// use soko_core::money::Money;
/// use soko_core::payment::settle_cash;
///
/// let change = settle_cash(Money::from_minor(5000), Money::from_minor(2949)).unwrap();
/// assert_eq!(change.minor(), 2051);
/// ```
pub fn settle_cash(received: Money, due: Money) -> CoreResult<Money> {
    if received < due {
        return Err(CoreError::InsufficientPayment { received, due });
    }
    Ok(received - due)
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pricing::OrderTotals;
    use crate::types::{Customer, Discount, TaxDescriptor};

    fn order(total: i64) -> OrderSnapshot {
        OrderSnapshot {
            order_id: "order-1".into(),
            items: vec![],
            customer: Customer::walk_in(),
            discount: Discount::none(),
            note: None,
            tax: TaxDescriptor::no_tax(),
            currency: Currency::new("SSP").unwrap(),
            totals: OrderTotals {
                subtotal: Money::from_minor(total),
                discount: Money::zero(),
                tax: Money::zero(),
                total: Money::from_minor(total),
            },
            created_at: Utc::now(),
        }
    }

    fn card() -> CardDetails {
        CardDetails {
            number: "4242 4242 4242 4242".into(),
            expiry_month: 12,
            expiry_year: 2030,
            cvc: "123".into(),
            holder_name: "Nyandeng Ajak".into(),
        }
    }

    #[test]
    fn test_mobile_money_path() {
        let mut attempt = PaymentAttempt::new(
            &order(1000),
            PaymentPayload::MobileMoney {
                phone_number: "+211912345678".into(),
            },
        );
        assert_eq!(attempt.method, PaymentMethod::MobileMoney);
        attempt.transition(AttemptState::Submitting).unwrap();
        attempt.transition(AttemptState::AwaitingExternalAction).unwrap();
        attempt.transition(AttemptState::Polling).unwrap();
        attempt.transition(AttemptState::Expired).unwrap();
        assert!(attempt.is_terminal());
    }

    #[test]
    fn test_terminal_states_are_final() {
        for terminal in [
            AttemptState::Completed,
            AttemptState::Failed,
            AttemptState::Expired,
            AttemptState::Cancelled,
        ] {
            assert!(terminal.is_terminal());
            assert!(!terminal.can_transition_to(AttemptState::Polling));
            assert!(!terminal.can_transition_to(AttemptState::Cancelled));
        }
    }

    #[test]
    fn test_illegal_transition_is_rejected() {
        let mut attempt = PaymentAttempt::new(&order(1000), PaymentPayload::Card(card()));
        let err = attempt.transition(AttemptState::Polling).unwrap_err();
        assert!(matches!(err, CoreError::InvalidTransition { .. }));
        assert_eq!(attempt.state, AttemptState::Created);
    }

    #[test]
    fn test_fail_records_reason() {
        let mut attempt = PaymentAttempt::new(&order(1000), PaymentPayload::Card(card()));
        attempt.transition(AttemptState::Submitting).unwrap();
        attempt.fail("Insufficient funds").unwrap();
        assert_eq!(attempt.state, AttemptState::Failed);
        assert_eq!(attempt.failure.as_deref(), Some("Insufficient funds"));
    }

    #[test]
    fn test_amount_due_is_snapshot_total() {
        let attempt = PaymentAttempt::new(&order(2949), PaymentPayload::Qr { transaction_id: "t".into() });
        assert_eq!(attempt.amount_due.minor(), 2949);
    }

    #[test]
    fn test_settle_cash() {
        let due = Money::from_minor(2949);
        assert!(matches!(
            settle_cash(Money::from_minor(2948), due),
            Err(CoreError::InsufficientPayment { .. })
        ));
        assert_eq!(settle_cash(due, due).unwrap(), Money::zero());
        assert_eq!(settle_cash(Money::from_minor(3000), due).unwrap().minor(), 51);
    }

    #[test]
    fn test_card_never_leaks_pan_or_cvc() {
        let card = card();
        assert_eq!(card.last4(), "4242");

        let debug = format!("{:?}", card);
        assert!(!debug.contains("4242 4242"));
        assert!(!debug.contains("123"));

        let json = serde_json::to_string(&PaymentPayload::Card(card)).unwrap();
        assert!(json.contains("**** 4242"));
        assert!(!json.contains("4242 4242"));
        assert!(!json.contains("cvc"));
    }
}
