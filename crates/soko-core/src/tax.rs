//! # Tax Jurisdictions
//!
//! Country → `{rate, name}` lookup and the rule that picks which country
//! an order is taxed in.
//!
//! ## Resolution
//! ```text
//!   precedence = CustomerCountry (default)
//!   ─────────────────────────────────────
//!   customer.country = Some("KE")  ──►  KE 16% VAT
//!   customer.country = None        ──►  business country
//!
//!   precedence = BusinessCountry
//!   ─────────────────────────────────────
//!   always                         ──►  business country
//!
//!   unknown country                ──►  table default (0% "No Tax")
//! ```

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::str::FromStr;
use ts_rs::TS;

use crate::error::ValidationError;
use crate::types::{Customer, TaxDescriptor, TaxRate};

/// Built-in rates for the markets Soko currently serves.
const BUILTIN_RATES: &[(&str, u32, &str)] = &[
    ("SS", 1800, "Sales Tax"),
    ("KE", 1600, "VAT"),
    ("UG", 1800, "VAT"),
    ("TZ", 1800, "VAT"),
    ("RW", 1800, "VAT"),
    ("NG", 750, "VAT"),
    ("GH", 1500, "VAT"),
    ("ZA", 1500, "VAT"),
    ("ET", 1500, "VAT"),
    ("EG", 1400, "VAT"),
    ("CD", 1600, "VAT"),
    ("ZM", 1600, "VAT"),
];

// =============================================================================
// Tax Table
// =============================================================================

/// Country code → tax descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaxTable {
    rates: HashMap<String, TaxDescriptor>,
    default: TaxDescriptor,
}

impl TaxTable {
    /// An empty table that resolves everything to `default`.
    pub fn empty(default: TaxDescriptor) -> Self {
        TaxTable {
            rates: HashMap::new(),
            default,
        }
    }

    /// Adds or replaces the rate for a country.
    pub fn with_rate(mut self, country: &str, descriptor: TaxDescriptor) -> Self {
        self.rates
            .insert(country.trim().to_ascii_uppercase(), descriptor);
        self
    }

    /// Replaces the fallback descriptor.
    pub fn with_default(mut self, default: TaxDescriptor) -> Self {
        self.default = default;
        self
    }

    /// Case-insensitive lookup; unknown countries get the default.
    pub fn lookup(&self, country: &str) -> &TaxDescriptor {
        self.rates
            .get(&country.trim().to_ascii_uppercase())
            .unwrap_or(&self.default)
    }

    pub fn contains(&self, country: &str) -> bool {
        self.rates
            .contains_key(&country.trim().to_ascii_uppercase())
    }
}

impl Default for TaxTable {
    fn default() -> Self {
        BUILTIN_RATES.iter().fold(
            TaxTable::empty(TaxDescriptor::no_tax()),
            |table, (country, bps, name)| {
                table.with_rate(country, TaxDescriptor::new(TaxRate::from_bps(*bps), *name))
            },
        )
    }
}

// =============================================================================
// Precedence
// =============================================================================

/// Which country wins when the customer and the business differ.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum TaxPrecedence {
    /// A selected customer's country overrides the business country.
    #[default]
    CustomerCountry,
    /// Always tax in the business country.
    BusinessCountry,
}

impl FromStr for TaxPrecedence {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "customer_country" | "customer" => Ok(TaxPrecedence::CustomerCountry),
            "business_country" | "business" => Ok(TaxPrecedence::BusinessCountry),
            _ => Err(ValidationError::invalid(
                "tax.precedence",
                "expected customer_country or business_country",
            )),
        }
    }
}

// =============================================================================
// Policy
// =============================================================================

/// Table + business country + precedence: everything needed to resolve
/// the tax descriptor for a customer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaxPolicy {
    pub table: TaxTable,
    pub business_country: String,
    pub precedence: TaxPrecedence,
}

impl TaxPolicy {
    pub fn new(table: TaxTable, business_country: impl Into<String>, precedence: TaxPrecedence) -> Self {
        TaxPolicy {
            table,
            business_country: business_country.into(),
            precedence,
        }
    }

    /// Resolves the jurisdiction for the given customer.
    pub fn resolve(&self, customer: &Customer) -> TaxDescriptor {
        let country = match (self.precedence, customer.country.as_deref()) {
            (TaxPrecedence::CustomerCountry, Some(c)) if !c.trim().is_empty() => c,
            _ => self.business_country.as_str(),
        };
        self.table.lookup(country).clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn customer_in(country: Option<&str>) -> Customer {
        Customer {
            id: Some("c-1".into()),
            name: "Achieng".into(),
            phone: Some("+254700000001".into()),
            country: country.map(String::from),
        }
    }

    #[test]
    fn test_builtin_rates() {
        let table = TaxTable::default();
        assert_eq!(table.lookup("SS").rate.bps(), 1800);
        assert_eq!(table.lookup("ng").rate.bps(), 750);
        assert_eq!(table.lookup("KE").name, "VAT");
    }

    #[test]
    fn test_unknown_country_uses_default() {
        let table = TaxTable::default();
        assert_eq!(table.lookup("FR"), &TaxDescriptor::no_tax());

        let table = table.with_default(TaxDescriptor::new(TaxRate::from_bps(500), "Levy"));
        assert_eq!(table.lookup("FR").rate.bps(), 500);
    }

    #[test]
    fn test_with_rate_overrides() {
        let table = TaxTable::default().with_rate("ke", TaxDescriptor::new(TaxRate::from_bps(800), "Reduced VAT"));
        assert_eq!(table.lookup("KE").rate.bps(), 800);
    }

    #[test]
    fn test_customer_country_overrides_business_by_default() {
        let policy = TaxPolicy::new(TaxTable::default(), "SS", TaxPrecedence::default());

        assert_eq!(policy.resolve(&Customer::walk_in()).rate.bps(), 1800);
        assert_eq!(policy.resolve(&customer_in(Some("KE"))).rate.bps(), 1600);
        assert_eq!(policy.resolve(&customer_in(None)).rate.bps(), 1800);
    }

    #[test]
    fn test_business_precedence_ignores_customer() {
        let policy = TaxPolicy::new(TaxTable::default(), "SS", TaxPrecedence::BusinessCountry);
        assert_eq!(policy.resolve(&customer_in(Some("NG"))).rate.bps(), 1800);
    }

    #[test]
    fn test_precedence_parse() {
        assert_eq!("business_country".parse::<TaxPrecedence>().unwrap(), TaxPrecedence::BusinessCountry);
        assert_eq!("Customer".parse::<TaxPrecedence>().unwrap(), TaxPrecedence::CustomerCountry);
        assert!("nearest".parse::<TaxPrecedence>().is_err());
    }
}
