//! # Checkout Configuration
//!
//! ## Configuration Sources
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Configuration Priority                               │
//! │                                                                         │
//! │  1. Environment Variables (highest priority)                           │
//! │     SOKO_BACKEND_URL=https://api.example.com/api/v1                    │
//! │     SOKO_COUNTRY=KE                                                    │
//! │                                                                         │
//! │  2. TOML Config File                                                   │
//! │     ~/.config/soko-pos/checkout.toml (Linux)                           │
//! │     ~/Library/Application Support/com.soko.pos/checkout.toml (macOS)   │
//! │                                                                         │
//! │  3. Default Values (lowest priority)                                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration File Format
//! ```toml
//! [business]
//! id = "biz-001"
//! name = "Juba Corner Shop"
//! country = "SS"
//! currency = "SSP"
//!
//! [backend]
//! base_url = "https://api.example.com/api/v1"
//! request_timeout_secs = 15
//!
//! [payments]
//! poll_interval_secs = 5
//! mobile_money_max_polls = 30
//! qr_max_polls = 60
//! qr_countdown_secs = 300
//!
//! [tax]
//! precedence = "customer_country"   # or "business_country"
//! default_rate_bps = 0
//!
//! [[tax.overrides]]
//! country = "KE"
//! rate_bps = 800
//! name = "Reduced VAT"
//! ```

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

use soko_core::validation::validate_tax_rate_bps;
use soko_core::{
    BusinessIdentity, Currency, TaxDescriptor, TaxPolicy, TaxPrecedence, TaxRate, TaxTable,
};

use crate::error::{CheckoutError, CheckoutResult};
use crate::poller::PollingPolicy;

// =============================================================================
// Business
// =============================================================================

/// The merchant this device sells for.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BusinessSettings {
    pub id: String,

    #[serde(default = "default_business_name")]
    pub name: String,

    /// Two-letter country code; drives the default tax jurisdiction.
    #[serde(default = "default_country")]
    pub country: String,

    /// Currency every product and order is priced in.
    #[serde(default = "default_currency")]
    pub currency: String,

    #[serde(default)]
    pub phone: Option<String>,
}

fn default_business_name() -> String {
    "Soko Shop".to_string()
}

fn default_country() -> String {
    "SS".to_string()
}

fn default_currency() -> String {
    "SSP".to_string()
}

impl Default for BusinessSettings {
    fn default() -> Self {
        BusinessSettings {
            id: "default-business".to_string(),
            name: default_business_name(),
            country: default_country(),
            currency: default_currency(),
            phone: None,
        }
    }
}

// =============================================================================
// Backend
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendSettings {
    /// Base URL the endpoint paths are joined onto,
    /// e.g. `https://api.example.com/api/v1`.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Optional bearer token.
    #[serde(default)]
    pub auth_token: Option<String>,
}

fn default_base_url() -> String {
    "http://localhost:8000/api/v1".to_string()
}

fn default_request_timeout() -> u64 {
    15
}

impl Default for BackendSettings {
    fn default() -> Self {
        BackendSettings {
            base_url: default_base_url(),
            request_timeout_secs: default_request_timeout(),
            auth_token: None,
        }
    }
}

// =============================================================================
// Payments
// =============================================================================

/// Polling budgets for methods that wait on the customer's phone.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentSettings {
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,

    /// 30 × 5 s ≈ 2.5 minutes.
    #[serde(default = "default_mobile_money_max_polls")]
    pub mobile_money_max_polls: u32,

    /// 60 × 5 s = 5 minutes.
    #[serde(default = "default_qr_max_polls")]
    pub qr_max_polls: u32,

    /// On-screen QR countdown; expires the attempt independently of polls.
    #[serde(default = "default_qr_countdown")]
    pub qr_countdown_secs: u64,

    /// Delay before a locally synthesized QR reports completion.
    #[serde(default = "default_qr_fallback_completion")]
    pub qr_fallback_completion_secs: u64,
}

fn default_poll_interval() -> u64 {
    5
}

fn default_mobile_money_max_polls() -> u32 {
    30
}

fn default_qr_max_polls() -> u32 {
    60
}

fn default_qr_countdown() -> u64 {
    300
}

fn default_qr_fallback_completion() -> u64 {
    10
}

impl Default for PaymentSettings {
    fn default() -> Self {
        PaymentSettings {
            poll_interval_secs: default_poll_interval(),
            mobile_money_max_polls: default_mobile_money_max_polls(),
            qr_max_polls: default_qr_max_polls(),
            qr_countdown_secs: default_qr_countdown(),
            qr_fallback_completion_secs: default_qr_fallback_completion(),
        }
    }
}

// =============================================================================
// Tax
// =============================================================================

/// A per-country rate that replaces the built-in table entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaxOverride {
    pub country: String,
    pub rate_bps: u32,
    #[serde(default = "default_tax_name")]
    pub name: String,
}

fn default_tax_name() -> String {
    "VAT".to_string()
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaxSettings {
    #[serde(default)]
    pub precedence: TaxPrecedence,

    /// Rate for countries missing from the table.
    #[serde(default)]
    pub default_rate_bps: u32,

    #[serde(default)]
    pub overrides: Vec<TaxOverride>,
}

// =============================================================================
// Storage
// =============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageSettings {
    /// SQLite file; defaults to the platform data directory.
    #[serde(default)]
    pub database_path: Option<PathBuf>,
}

// =============================================================================
// Checkout Config
// =============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CheckoutConfig {
    #[serde(default)]
    pub business: BusinessSettings,

    #[serde(default)]
    pub backend: BackendSettings,

    #[serde(default)]
    pub payments: PaymentSettings,

    #[serde(default)]
    pub tax: TaxSettings,

    #[serde(default)]
    pub storage: StorageSettings,
}

impl CheckoutConfig {
    /// Loads configuration: defaults → TOML file → environment → validate.
    pub fn load(config_path: Option<PathBuf>) -> CheckoutResult<Self> {
        let mut config = Self::default();

        if let Some(path) = config_path.or_else(Self::default_config_path) {
            if path.exists() {
                info!(?path, "Loading checkout config from file");
                let contents = std::fs::read_to_string(&path)?;
                config = toml::from_str(&contents)?;
            } else {
                debug!(?path, "Config file not found, using defaults");
            }
        }

        config.apply_env_overrides();
        config.validate()?;

        Ok(config)
    }

    /// Loads config or returns default if load fails.
    pub fn load_or_default(config_path: Option<PathBuf>) -> Self {
        Self::load(config_path).unwrap_or_else(|e| {
            warn!("Failed to load checkout config: {}. Using defaults.", e);
            Self::default()
        })
    }

    /// Saves configuration to file.
    pub fn save(&self, config_path: Option<PathBuf>) -> CheckoutResult<()> {
        let path = config_path
            .or_else(Self::default_config_path)
            .ok_or_else(|| CheckoutError::Config("No config path available".into()))?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let contents = toml::to_string_pretty(self)?;
        std::fs::write(&path, contents)?;

        info!(?path, "Checkout config saved");
        Ok(())
    }

    /// Validates the configuration.
    pub fn validate(&self) -> CheckoutResult<()> {
        if self.business.id.trim().is_empty() {
            return Err(CheckoutError::Config("business.id is required".into()));
        }

        Currency::new(&self.business.currency)
            .map_err(|e| CheckoutError::Config(format!("business.currency: {e}")))?;

        let url = Url::parse(&self.backend.base_url)?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(CheckoutError::Config(format!(
                "backend.base_url must start with http:// or https://, got: {}",
                self.backend.base_url
            )));
        }

        if self.backend.request_timeout_secs == 0 {
            return Err(CheckoutError::Config(
                "backend.request_timeout_secs must be greater than 0".into(),
            ));
        }

        let p = &self.payments;
        if p.poll_interval_secs == 0 {
            return Err(CheckoutError::Config(
                "payments.poll_interval_secs must be greater than 0".into(),
            ));
        }
        if p.mobile_money_max_polls == 0 || p.qr_max_polls == 0 {
            return Err(CheckoutError::Config(
                "payment poll budgets must be greater than 0".into(),
            ));
        }
        if p.qr_countdown_secs == 0 {
            return Err(CheckoutError::Config(
                "payments.qr_countdown_secs must be greater than 0".into(),
            ));
        }

        validate_tax_rate_bps(self.tax.default_rate_bps)
            .map_err(|e| CheckoutError::Config(e.to_string()))?;
        for o in &self.tax.overrides {
            validate_tax_rate_bps(o.rate_bps)
                .map_err(|e| CheckoutError::Config(format!("tax override {}: {e}", o.country)))?;
        }

        Ok(())
    }

    /// Applies environment variable overrides.
    fn apply_env_overrides(&mut self) {
        if let Ok(url) = std::env::var("SOKO_BACKEND_URL") {
            debug!(url = %url, "Overriding backend URL from environment");
            self.backend.base_url = url;
        }

        if let Ok(token) = std::env::var("SOKO_AUTH_TOKEN") {
            debug!("Overriding auth token from environment");
            self.backend.auth_token = Some(token);
        }

        if let Ok(id) = std::env::var("SOKO_BUSINESS_ID") {
            self.business.id = id;
        }

        if let Ok(country) = std::env::var("SOKO_COUNTRY") {
            debug!(country = %country, "Overriding business country from environment");
            self.business.country = country;
        }

        if let Ok(currency) = std::env::var("SOKO_CURRENCY") {
            self.business.currency = currency;
        }

        if let Ok(precedence) = std::env::var("SOKO_TAX_PRECEDENCE") {
            match precedence.parse::<TaxPrecedence>() {
                Ok(p) => self.tax.precedence = p,
                Err(_) => warn!(value = %precedence, "Unknown tax precedence in environment"),
            }
        }

        if let Ok(path) = std::env::var("SOKO_DATABASE_PATH") {
            self.storage.database_path = Some(PathBuf::from(path));
        }
    }

    fn default_config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("com", "soko", "pos")
            .map(|dirs| dirs.config_dir().join("checkout.toml"))
    }

    // =========================================================================
    // Derived Values
    // =========================================================================

    pub fn business_identity(&self) -> BusinessIdentity {
        BusinessIdentity {
            id: self.business.id.clone(),
            name: self.business.name.clone(),
            phone: self.business.phone.clone(),
        }
    }

    pub fn currency(&self) -> CheckoutResult<Currency> {
        Ok(Currency::new(&self.business.currency)?)
    }

    /// Built-in table + configured default + overrides.
    pub fn tax_policy(&self) -> TaxPolicy {
        let default = if self.tax.default_rate_bps == 0 {
            TaxDescriptor::no_tax()
        } else {
            TaxDescriptor::new(TaxRate::from_bps(self.tax.default_rate_bps), default_tax_name())
        };

        let table = self.tax.overrides.iter().fold(
            TaxTable::default().with_default(default),
            |table, o| {
                table.with_rate(
                    &o.country,
                    TaxDescriptor::new(TaxRate::from_bps(o.rate_bps), o.name.clone()),
                )
            },
        );

        TaxPolicy::new(table, self.business.country.clone(), self.tax.precedence)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.backend.request_timeout_secs)
    }

    pub fn mobile_money_polling(&self) -> PollingPolicy {
        PollingPolicy {
            interval: Duration::from_secs(self.payments.poll_interval_secs),
            max_polls: self.payments.mobile_money_max_polls,
            countdown: None,
        }
    }

    pub fn qr_polling(&self) -> PollingPolicy {
        PollingPolicy {
            interval: Duration::from_secs(self.payments.poll_interval_secs),
            max_polls: self.payments.qr_max_polls,
            countdown: Some(Duration::from_secs(self.payments.qr_countdown_secs)),
        }
    }

    pub fn qr_fallback_completion(&self) -> Duration {
        Duration::from_secs(self.payments.qr_fallback_completion_secs)
    }

    /// Configured path, else `<data dir>/soko.db`, else `./soko.db`.
    pub fn database_path(&self) -> PathBuf {
        self.storage.database_path.clone().unwrap_or_else(|| {
            directories::ProjectDirs::from("com", "soko", "pos")
                .map(|dirs| dirs.data_dir().join("soko.db"))
                .unwrap_or_else(|| PathBuf::from("soko.db"))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = CheckoutConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.payments.poll_interval_secs, 5);
        assert_eq!(config.payments.mobile_money_max_polls, 30);
        assert_eq!(config.payments.qr_max_polls, 60);
        assert_eq!(config.payments.qr_countdown_secs, 300);
        assert_eq!(config.tax.precedence, TaxPrecedence::CustomerCountry);
    }

    #[test]
    fn test_config_validation() {
        let mut config = CheckoutConfig::default();

        config.backend.base_url = "ftp://example.com".into();
        assert!(config.validate().is_err());

        config.backend.base_url = "not a url".into();
        assert!(config.validate().is_err());

        config.backend.base_url = "https://api.example.com/api/v1".into();
        config.payments.poll_interval_secs = 0;
        assert!(config.validate().is_err());

        config.payments.poll_interval_secs = 5;
        config.business.currency = "SHILLINGS".into();
        assert!(config.validate().is_err());

        config.business.currency = "KES".into();
        config.tax.default_rate_bps = 20_000;
        assert!(config.validate().is_err());

        config.tax.default_rate_bps = 0;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_toml_parsing() {
        let toml_str = r#"
            [business]
            id = "biz-001"
            name = "Kampala Mart"
            country = "UG"
            currency = "UGX"

            [payments]
            qr_countdown_secs = 120

            [tax]
            precedence = "business_country"

            [[tax.overrides]]
            country = "UG"
            rate_bps = 1000
        "#;

        let config: CheckoutConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.business.name, "Kampala Mart");
        assert_eq!(config.payments.poll_interval_secs, 5);
        assert_eq!(config.qr_polling().countdown, Some(Duration::from_secs(120)));
        assert_eq!(config.tax.precedence, TaxPrecedence::BusinessCountry);

        let policy = config.tax_policy();
        let descriptor = policy.resolve(&soko_core::Customer::walk_in());
        assert_eq!(descriptor.rate.bps(), 1000);
        assert_eq!(descriptor.name, "VAT");
    }

    #[test]
    fn test_save_and_load_round_trip_file() {
        let path = std::env::temp_dir().join(format!("soko-{}.toml", uuid::Uuid::new_v4()));
        let mut config = CheckoutConfig::default();
        config.business.name = "Kigali Kiosk".into();
        config.save(Some(path.clone())).unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        let loaded: CheckoutConfig = toml::from_str(&contents).unwrap();
        assert_eq!(loaded.business.name, "Kigali Kiosk");

        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn test_polling_policies() {
        let config = CheckoutConfig::default();
        let momo = config.mobile_money_polling();
        assert_eq!(momo.max_polls, 30);
        assert!(momo.countdown.is_none());
        assert_eq!(config.qr_polling().max_polls, 60);
    }
}
