//! # Checkout Events
//!
//! What the UI layer gets told while a checkout runs. The mobile shell
//! implements [`CheckoutEventEmitter`] and forwards each event to its
//! webview; everything else uses [`NoOpEmitter`].

use serde::Serialize;

use soko_core::{AttemptState, PaymentMethod, Provenance, QrDisplay};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CheckoutEvent {
    AttemptStateChanged {
        attempt_id: String,
        method: PaymentMethod,
        from: AttemptState,
        to: AttemptState,
    },

    /// A QR payload is ready to be drawn.
    QrReady {
        attempt_id: String,
        qr: QrDisplay,
    },

    /// Once per second while a QR code is on screen.
    CountdownTick {
        attempt_id: String,
        remaining_secs: u64,
    },

    SaleFinalized {
        transaction_id: String,
        receipt_number: String,
        provenance: Provenance,
    },

    ReceiptDispatchFailed {
        transaction_id: String,
        message: String,
    },

    SyncProgress {
        synced: usize,
        remaining: usize,
    },
}

/// Trait for emitting checkout events (implemented by the UI bridge).
pub trait CheckoutEventEmitter: Send + Sync {
    fn emit(&self, event: &CheckoutEvent);
}

/// No-op event emitter.
pub struct NoOpEmitter;

impl CheckoutEventEmitter for NoOpEmitter {
    fn emit(&self, _event: &CheckoutEvent) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_wire_shape() {
        let event = CheckoutEvent::AttemptStateChanged {
            attempt_id: "a1".into(),
            method: PaymentMethod::MobileMoney,
            from: AttemptState::AwaitingExternalAction,
            to: AttemptState::Polling,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "attempt_state_changed");
        assert_eq!(json["method"], "mobile_money");
        assert_eq!(json["to"], "polling");
    }
}
