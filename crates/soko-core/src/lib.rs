//! # soko-core: Pure Checkout Logic for Soko POS
//!
//! This crate is the **heart** of the mobile POS checkout. It contains the
//! pricing engine, the cart aggregate and the payment-attempt state rules as
//! pure functions with zero I/O dependencies.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Soko POS Checkout                                │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                    Mobile UI                                    │   │
//! │  │    Product Grid ──► Cart ──► Payment Dialog ──► Receipt        │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │               soko-checkout (orchestration, network)            │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │               ★ soko-core (THIS CRATE) ★                        │   │
//! │  │                                                                 │   │
//! │  │   ┌─────────┐ ┌─────────┐ ┌─────────┐ ┌─────────┐ ┌─────────┐  │   │
//! │  │   │  money  │ │ pricing │ │  cart   │ │   tax   │ │ payment │  │   │
//! │  │   └─────────┘ └─────────┘ └─────────┘ └─────────┘ └─────────┘  │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO DATABASE • NO NETWORK • PURE FUNCTIONS           │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`money`] - Money type with integer minor-unit arithmetic
//! - [`types`] - Domain types (Product, Customer, LineItem, Discount, ...)
//! - [`tax`] - Country tax jurisdiction table and precedence rule
//! - [`pricing`] - Subtotal / discount / tax / total computation
//! - [`cart`] - The order aggregate and its stock-bound mutations
//! - [`payment`] - Payment attempt state machine
//! - [`transaction`] - Finalized transactions and pending queue entries
//! - [`receipt`] - Receipt building
//! - [`validation`] - Input validation rules
//! - [`error`] - Domain error types
//!
//! ## Example Usage
//!
//! ```rust
//! use soko_core::money::Money;
//! use soko_core::types::TaxRate;
//!
//! let price = Money::from_minor(2499); // 24.99
//! let tax = price.calculate_tax(TaxRate::from_bps(1800)); // 18%
//! assert_eq!(tax.minor(), 450);
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod cart;
pub mod error;
pub mod money;
pub mod payment;
pub mod pricing;
pub mod receipt;
pub mod tax;
pub mod transaction;
pub mod types;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use cart::{Cart, OrderSnapshot};
pub use error::{CoreError, CoreResult, ValidationError};
pub use money::Money;
pub use payment::{AttemptState, CardDetails, PaymentAttempt, PaymentPayload, QrDisplay};
pub use pricing::{compute_totals, OrderTotals};
pub use receipt::{BusinessIdentity, Receipt};
pub use tax::{TaxPolicy, TaxPrecedence, TaxTable};
pub use transaction::{PendingQueueEntry, Transaction};
pub use types::*;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Maximum distinct lines allowed in a single cart.
pub const MAX_CART_ITEMS: usize = 100;

/// Number of minor units in one major unit for every supported currency.
///
/// All markets served today price in hundredths; currencies without a
/// minor unit are still carried with two implied decimals.
pub const MINOR_UNITS_PER_MAJOR: i64 = 100;
