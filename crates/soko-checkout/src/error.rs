//! # Checkout Error Types
//!
//! ## Error Categories
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Checkout Error Categories                         │
//! │                                                                         │
//! │  ┌─────────────────┐  ┌─────────────────┐  ┌─────────────────────────┐ │
//! │  │  Local guards   │  │   Gateway       │  │     Attempt outcome     │ │
//! │  │                 │  │                 │  │                         │ │
//! │  │  Core(..)       │  │  GatewayRejected│  │  Expired                │ │
//! │  │  EmptyCart      │  │  GatewayTimeout │  │  Cancelled              │ │
//! │  │  AttemptIn-     │  │  Network-       │  │                         │ │
//! │  │   Progress      │  │   Unavailable   │  │                         │ │
//! │  └─────────────────┘  └─────────────────┘  └─────────────────────────┘ │
//! │                                                                         │
//! │  ┌─────────────────┐  ┌─────────────────┐                              │
//! │  │  Configuration  │  │   Storage       │                              │
//! │  │  Config         │  │   Storage       │                              │
//! │  └─────────────────┘  └─────────────────┘                              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Propagation Policy
//! - Local guards: shown to the operator, order unchanged, retry allowed
//! - Gateway rejection: message shown verbatim, operator may pick another method
//! - Network failure while finalizing: never an error, the sale is queued
//! - Expired / Cancelled: end the attempt, the cart survives

use soko_core::CoreError;
use soko_db::DbError;
use thiserror::Error;

/// Result type alias for checkout operations.
pub type CheckoutResult<T> = Result<T, CheckoutError>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CheckoutError {
    // =========================================================================
    // Local Guards
    // =========================================================================
    /// Cart, stock or payment-amount guard.
    #[error(transparent)]
    Core(#[from] CoreError),

    #[error("Cart is empty")]
    EmptyCart,

    /// A second attempt was started while one is still live.
    #[error("A payment is already in progress for this order")]
    AttemptInProgress,

    #[error("No payment is in progress")]
    NoActiveAttempt,

    // =========================================================================
    // Gateway / Backend
    // =========================================================================
    /// The gateway said no. The message is the gateway's own.
    #[error("{0}")]
    GatewayRejected(String),

    #[error("Payment gateway timed out: {0}")]
    GatewayTimeout(String),

    #[error("Network unavailable: {0}")]
    NetworkUnavailable(String),

    /// The backend answered with a body we could not understand.
    #[error("Unexpected response from server: {0}")]
    InvalidResponse(String),

    // =========================================================================
    // Attempt Outcome
    // =========================================================================
    #[error("Payment expired before it was approved")]
    Expired,

    #[error("Payment was cancelled")]
    Cancelled,

    // =========================================================================
    // Configuration / Storage
    // =========================================================================
    #[error("Invalid checkout configuration: {0}")]
    Config(String),

    #[error("Local storage error: {0}")]
    Storage(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

// =============================================================================
// Error Conversions
// =============================================================================

impl From<DbError> for CheckoutError {
    fn from(err: DbError) -> Self {
        CheckoutError::Storage(err.to_string())
    }
}

impl From<soko_core::ValidationError> for CheckoutError {
    fn from(err: soko_core::ValidationError) -> Self {
        CheckoutError::Core(CoreError::Validation(err))
    }
}

impl From<url::ParseError> for CheckoutError {
    fn from(err: url::ParseError) -> Self {
        CheckoutError::Config(format!("invalid URL: {err}"))
    }
}

impl From<std::io::Error> for CheckoutError {
    fn from(err: std::io::Error) -> Self {
        CheckoutError::Config(err.to_string())
    }
}

impl From<toml::de::Error> for CheckoutError {
    fn from(err: toml::de::Error) -> Self {
        CheckoutError::Config(err.to_string())
    }
}

impl From<toml::ser::Error> for CheckoutError {
    fn from(err: toml::ser::Error) -> Self {
        CheckoutError::Config(err.to_string())
    }
}

/// Transport failures: timeouts first, then anything that never got an
/// HTTP answer or got a 5xx.
impl From<reqwest::Error> for CheckoutError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            CheckoutError::GatewayTimeout(err.to_string())
        } else if err.is_decode() {
            CheckoutError::InvalidResponse(err.to_string())
        } else {
            CheckoutError::NetworkUnavailable(err.to_string())
        }
    }
}

// =============================================================================
// Error Categorization
// =============================================================================

impl CheckoutError {
    /// Returns true if the request never reached a definitive answer.
    ///
    /// These are the failures the finalizer absorbs by queueing.
    pub fn is_network(&self) -> bool {
        matches!(
            self,
            CheckoutError::NetworkUnavailable(_) | CheckoutError::GatewayTimeout(_)
        )
    }

    /// Returns true if the operator can simply retry or choose again.
    pub fn is_recoverable_locally(&self) -> bool {
        !matches!(
            self,
            CheckoutError::Config(_) | CheckoutError::Storage(_) | CheckoutError::Internal(_)
        )
    }

    /// Returns true if the attempt ended without the customer paying.
    pub fn ends_attempt(&self) -> bool {
        matches!(
            self,
            CheckoutError::GatewayRejected(_)
                | CheckoutError::GatewayTimeout(_)
                | CheckoutError::NetworkUnavailable(_)
                | CheckoutError::InvalidResponse(_)
                | CheckoutError::Expired
                | CheckoutError::Cancelled
        )
    }
}
