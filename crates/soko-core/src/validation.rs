//! # Validation Module
//!
//! Input validation for everything the operator types at checkout.
//!
//! ## Validation Strategy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Validation Layers                                  │
//! │                                                                         │
//! │  Layer 1: Mobile UI                                                    │
//! │  ├── Basic format checks (empty, length)                               │
//! │  └── Immediate operator feedback                                       │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 2: THIS MODULE                                                  │
//! │  ├── Phone numbers, card payloads, discounts, currency codes           │
//! │  └── Runs before any gateway call is made                              │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 3: Payment gateway                                              │
//! │  └── Final word (declines are surfaced verbatim)                       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust
//! use soko_core::validation::{validate_phone_number, validate_tax_rate_bps};
//!
//! assert!(validate_phone_number("+211 912 345 678").is_ok());
//! assert!(validate_tax_rate_bps(1800).is_ok());
//! ```

use chrono::{DateTime, Datelike, Utc};

use crate::error::ValidationError;
use crate::money::Money;
use crate::payment::CardDetails;
use crate::types::{Currency, Discount};

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

// =============================================================================
// Contact
// =============================================================================

/// Validates a mobile number for mobile money or SMS receipts.
///
/// ## Rules
/// - Optional leading `+`
/// - Spaces and dashes are ignored
/// - 9 to 15 digits
///
/// Returns the normalized number (`+` and digits only).
pub fn validate_phone_number(phone: &str) -> ValidationResult<String> {
    let phone = phone.trim();
    if phone.is_empty() {
        return Err(ValidationError::required("phone_number"));
    }

    let (plus, rest) = match phone.strip_prefix('+') {
        Some(rest) => ("+", rest),
        None => ("", phone),
    };

    let mut digits = String::with_capacity(rest.len());
    for c in rest.chars() {
        match c {
            '0'..='9' => digits.push(c),
            ' ' | '-' => {}
            _ => return Err(ValidationError::invalid("phone_number", "contains invalid characters")),
        }
    }

    if !(9..=15).contains(&digits.len()) {
        return Err(ValidationError::invalid("phone_number", "must have 9 to 15 digits"));
    }

    Ok(format!("{plus}{digits}"))
}

// =============================================================================
// Card
// =============================================================================

/// Validates a card payload before it is sent to the gateway.
///
/// ## Rules
/// - PAN: 12-19 digits passing the Luhn check
/// - Expiry: month 1-12, not before the current month
/// - CVC: 3 or 4 digits
/// - Cardholder name: non-empty
pub fn validate_card(card: &CardDetails, now: DateTime<Utc>) -> ValidationResult<()> {
    let pan = card.number_digits();
    if pan.is_empty() {
        return Err(ValidationError::required("card_number"));
    }
    if !(12..=19).contains(&pan.len()) || !pan.chars().all(|c| c.is_ascii_digit()) {
        return Err(ValidationError::invalid("card_number", "must be 12 to 19 digits"));
    }
    if !luhn_valid(&pan) {
        return Err(ValidationError::invalid("card_number", "failed checksum"));
    }

    if !(1..=12).contains(&card.expiry_month) {
        return Err(ValidationError::OutOfRange {
            field: "expiry_month".to_string(),
            min: 1,
            max: 12,
        });
    }
    let expiry_year = normalize_year(card.expiry_year);
    let current = (now.year(), now.month());
    if (expiry_year, card.expiry_month) < current {
        return Err(ValidationError::invalid("expiry", "card has expired"));
    }

    let cvc = card.cvc.trim();
    if !(3..=4).contains(&cvc.len()) || !cvc.chars().all(|c| c.is_ascii_digit()) {
        return Err(ValidationError::invalid("cvc", "must be 3 or 4 digits"));
    }

    if card.holder_name.trim().is_empty() {
        return Err(ValidationError::required("holder_name"));
    }

    Ok(())
}

/// Two-digit years are taken as 20YY.
fn normalize_year(year: i32) -> i32 {
    if (0..100).contains(&year) {
        2000 + year
    } else {
        year
    }
}

fn luhn_valid(digits: &str) -> bool {
    let sum: u32 = digits
        .chars()
        .rev()
        .filter_map(|c| c.to_digit(10))
        .enumerate()
        .map(|(i, d)| {
            if i % 2 == 1 {
                let doubled = d * 2;
                if doubled > 9 {
                    doubled - 9
                } else {
                    doubled
                }
            } else {
                d
            }
        })
        .sum();
    sum % 10 == 0
}

// =============================================================================
// Numeric Validators
// =============================================================================

/// Validates a discount descriptor.
///
/// Percentages are 0..=10000 bps; fixed amounts must not be negative.
pub fn validate_discount(discount: &Discount) -> ValidationResult<()> {
    match discount {
        Discount::Percentage(bps) if *bps > 10_000 => Err(ValidationError::OutOfRange {
            field: "discount".to_string(),
            min: 0,
            max: 10_000,
        }),
        Discount::Fixed(amount) if amount.is_negative() => Err(ValidationError::Negative {
            field: "discount".to_string(),
        }),
        _ => Ok(()),
    }
}

/// Validates a tax rate in basis points (0% - 100%).
pub fn validate_tax_rate_bps(bps: u32) -> ValidationResult<()> {
    if bps > 10_000 {
        return Err(ValidationError::OutOfRange {
            field: "tax_rate".to_string(),
            min: 0,
            max: 10_000,
        });
    }
    Ok(())
}

/// Validates a tendered or charged amount.
pub fn validate_payment_amount(amount: Money) -> ValidationResult<()> {
    if amount.is_negative() {
        return Err(ValidationError::Negative {
            field: "amount".to_string(),
        });
    }
    Ok(())
}

/// Validates a currency code, returning the normalized form.
pub fn validate_currency_code(code: &str) -> ValidationResult<Currency> {
    Currency::new(code)
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn card(number: &str, month: u32, year: i32, cvc: &str) -> CardDetails {
        CardDetails {
            number: number.to_string(),
            expiry_month: month,
            expiry_year: year,
            cvc: cvc.to_string(),
            holder_name: "Deng Garang".to_string(),
        }
    }

    fn march_2026() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 15, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_phone_number() {
        assert_eq!(validate_phone_number("+211 912-345-678").unwrap(), "+211912345678");
        assert_eq!(validate_phone_number("0712345678").unwrap(), "0712345678");
        assert!(validate_phone_number("").is_err());
        assert!(validate_phone_number("12345").is_err());
        assert!(validate_phone_number("+211abc45678").is_err());
    }

    #[test]
    fn test_card_valid() {
        assert!(validate_card(&card("4242 4242 4242 4242", 12, 2027, "123"), march_2026()).is_ok());
        // Current month is still valid, two-digit year accepted
        assert!(validate_card(&card("4242424242424242", 3, 26, "1234"), march_2026()).is_ok());
    }

    #[test]
    fn test_card_invalid() {
        let now = march_2026();
        assert!(validate_card(&card("4242424242424241", 12, 2027, "123"), now).is_err());
        assert!(validate_card(&card("4242424242424242", 2, 2026, "123"), now).is_err());
        assert!(validate_card(&card("4242424242424242", 13, 2027, "123"), now).is_err());
        assert!(validate_card(&card("4242424242424242", 12, 2027, "12"), now).is_err());
        assert!(validate_card(&card("", 12, 2027, "123"), now).is_err());
    }

    #[test]
    fn test_discount() {
        assert!(validate_discount(&Discount::Percentage(10_000)).is_ok());
        assert!(validate_discount(&Discount::Percentage(10_001)).is_err());
        assert!(validate_discount(&Discount::Fixed(Money::from_minor(-1))).is_err());
        assert!(validate_discount(&Discount::none()).is_ok());
    }

    #[test]
    fn test_tax_rate_and_amount() {
        assert!(validate_tax_rate_bps(0).is_ok());
        assert!(validate_tax_rate_bps(10_001).is_err());
        assert!(validate_payment_amount(Money::from_minor(-5)).is_err());
        assert_eq!(validate_currency_code("ugx").unwrap().code(), "UGX");
    }
}
