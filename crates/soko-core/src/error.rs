//! # Error Types
//!
//! Domain-specific error types for soko-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  soko-core errors (this file)                                          │
//! │  ├── CoreError        - Cart, stock and payment-amount guards          │
//! │  └── ValidationError  - Input validation failures                      │
//! │                                                                         │
//! │  soko-db errors                                                        │
//! │  └── DbError          - Local store failures                           │
//! │                                                                         │
//! │  soko-checkout errors                                                  │
//! │  └── CheckoutError    - Gateway, network, expiry, cancellation         │
//! │                                                                         │
//! │  Flow: ValidationError → CoreError → CheckoutError → Operator message  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every guard in this file is recovered locally: the operator sees the
//! message, the order is left untouched and the action may be retried.

use thiserror::Error;

use crate::money::Money;
use crate::payment::AttemptState;

// =============================================================================
// Core Error
// =============================================================================

/// Core business logic errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoreError {
    /// The product has no stock left at all.
    #[error("{name} is out of stock")]
    OutOfStock { name: String },

    /// The requested quantity is above the stock snapshot.
    ///
    /// ## User Workflow
    /// ```text
    /// Tap "+" on Coke (qty 3, stock 3)
    ///      │
    ///      ▼
    /// StockLimit { name: "Coke", available: 3, requested: 4 }
    ///      │
    ///      ▼
    /// UI shows: "Only 3 Coke in stock" (quantity stays at 3)
    /// ```
    #[error("Only {available} {name} in stock (requested {requested})")]
    StockLimit {
        name: String,
        available: i64,
        requested: i64,
    },

    /// Cash tendered is below the amount due.
    #[error("Insufficient payment: received {received}, due {due}")]
    InsufficientPayment { received: Money, due: Money },

    /// Line item is not in the cart.
    #[error("Item {0} is not in the cart")]
    ItemNotFound(String),

    /// Product is priced in a different currency than the order.
    #[error("Cannot add {product_currency} item to a {order_currency} order")]
    CurrencyMismatch {
        order_currency: String,
        product_currency: String,
    },

    /// Cart has exceeded maximum allowed lines.
    #[error("Cart cannot have more than {max} items")]
    CartTooLarge { max: usize },

    /// Payment attempt state machine rejected a transition.
    #[error("Payment attempt cannot move from {from} to {to}")]
    InvalidTransition { from: AttemptState, to: AttemptState },

    /// Transaction provenance can only move pending → synced.
    #[error("Transaction {0} is already synced")]
    AlreadySynced(String),

    /// Validation error (wraps ValidationError).
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

impl CoreError {
    /// Creates a StockLimit error for the given line.
    pub fn stock_limit(name: impl Into<String>, available: i64, requested: i64) -> Self {
        CoreError::StockLimit {
            name: name.into(),
            available,
            requested,
        }
    }
}

// =============================================================================
// Validation Error
// =============================================================================

/// Input validation errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// A required field is missing or empty.
    #[error("{field} is required")]
    Required { field: String },

    /// Numeric value is out of range.
    #[error("{field} must be between {min} and {max}")]
    OutOfRange { field: String, min: i64, max: i64 },

    /// Value must not be negative.
    #[error("{field} must not be negative")]
    Negative { field: String },

    /// Invalid format (phone number, card number, currency code, ...).
    #[error("{field} has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },
}

impl ValidationError {
    pub(crate) fn required(field: &str) -> Self {
        ValidationError::Required {
            field: field.to_string(),
        }
    }

    pub(crate) fn invalid(field: &str, reason: &str) -> Self {
        ValidationError::InvalidFormat {
            field: field.to_string(),
            reason: reason.to_string(),
        }
    }
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// Convenience type alias for Results with CoreError.
pub type CoreResult<T> = Result<T, CoreError>;

// =============================================================================
// Unit Tests
// =============================================================================
