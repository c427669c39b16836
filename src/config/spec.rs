//! Configuration specification types for the billing catalog.
//!
//! This module defines the structs that map to the `billing.yaml` file. The
//! product and price definitions describe desired state only; they carry no
//! behavior beyond (de)serialization.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Free-form key/value metadata attached to products and prices.
pub type Metadata = BTreeMap<String, String>;

/// The root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct BillingConfig {
    /// Billing provider settings.
    #[serde(default)]
    pub provider: ProviderSettings,
    /// Local catalog store settings.
    #[serde(default)]
    pub store: StoreSettings,
    /// Post-deploy code generation settings.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub codegen: Option<CodegenSettings>,
    /// Desired products keyed by business key.
    #[serde(default)]
    pub products: BTreeMap<String, ProductDefinition>,
}

/// Billing provider settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProviderSettings {
    /// Provider name, resolved through the provider registry.
    #[serde(default = "default_provider_name")]
    pub name: String,
    /// Environment variable holding the API key.
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    /// Overrides the provider API base URL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_base: Option<String>,
    /// Request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Retries per provider call after a retryable failure.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Fixed delay between attempts in milliseconds.
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
}

/// Local catalog store settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StoreSettings {
    /// Path of the catalog document, relative to the config file.
    #[serde(default = "default_store_path")]
    pub path: String,
}

/// Post-deploy code generation settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CodegenSettings {
    /// Where the active key manifest is written.
    pub manifest_path: String,
}

/// Desired state for one product.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ProductDefinition {
    /// Display name.
    pub name: String,
    /// Optional description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Optional metadata.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Metadata>,
    /// Stripe-specific product attributes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stripe: Option<StripeProductFeatures>,
    /// Prices keyed by price type key.
    #[serde(default)]
    pub prices: BTreeMap<String, PriceDefinition>,
}

/// Desired state for one price under a product.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PriceDefinition {
    /// Amount in minor currency units.
    pub amount: i64,
    /// Three-letter ISO currency code.
    #[serde(default = "default_currency")]
    pub currency: String,
    /// Recurring interval; absent for one-off prices.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recurring: Option<Recurring>,
    /// Optional nickname.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nickname: Option<String>,
    /// Optional metadata.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Metadata>,
    /// Trial period length in days.
    #[serde(default, alias = "trial_period_days", skip_serializing_if = "Option::is_none")]
    pub trial_period_days: Option<u32>,
    /// Stripe-specific price attributes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stripe: Option<StripePriceFeatures>,
}

/// Recurring billing interval.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Recurring {
    /// Interval unit.
    pub interval: Interval,
    /// Number of units between bills.
    #[serde(default = "default_interval_count", alias = "interval_count")]
    pub interval_count: u32,
}

/// Recurring interval unit.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum Interval {
    /// Daily.
    Day,
    /// Weekly.
    Week,
    /// Monthly.
    Month,
    /// Yearly.
    Year,
}

/// Stripe tax behavior for a price.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TaxBehavior {
    /// Tax is added on top of the amount.
    Exclusive,
    /// Tax is included in the amount.
    Inclusive,
    /// Not yet decided.
    Unspecified,
}

/// Stripe-only product attributes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct StripeProductFeatures {
    /// Stripe tax code, e.g. `txcd_10000000`.
    #[serde(default, alias = "tax_code", skip_serializing_if = "Option::is_none")]
    pub tax_code: Option<String>,
    /// Statement descriptor shown on card statements.
    #[serde(default, alias = "statement_descriptor", skip_serializing_if = "Option::is_none")]
    pub statement_descriptor: Option<String>,
}

/// Stripe-only price attributes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct StripePriceFeatures {
    /// Tax behavior.
    #[serde(default, alias = "tax_behavior", skip_serializing_if = "Option::is_none")]
    pub tax_behavior: Option<TaxBehavior>,
    /// Lookup key for retrieving the price by name.
    #[serde(default, alias = "lookup_key", skip_serializing_if = "Option::is_none")]
    pub lookup_key: Option<String>,
}

impl StripeProductFeatures {
    /// Returns true when no attribute is set.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.tax_code.is_none() && self.statement_descriptor.is_none()
    }
}

impl StripePriceFeatures {
    /// Returns true when no attribute is set.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.tax_behavior.is_none() && self.lookup_key.is_none()
    }
}

impl Interval {
    /// Returns the wire name of the interval.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Day => "day",
            Self::Week => "week",
            Self::Month => "month",
            Self::Year => "year",
        }
    }
}

impl TaxBehavior {
    /// Returns the wire name of the tax behavior.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Exclusive => "exclusive",
            Self::Inclusive => "inclusive",
            Self::Unspecified => "unspecified",
        }
    }
}

impl std::str::FromStr for Interval {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "day" => Ok(Self::Day),
            "week" => Ok(Self::Week),
            "month" => Ok(Self::Month),
            "year" => Ok(Self::Year),
            other => Err(format!("unknown interval '{other}'")),
        }
    }
}

impl std::str::FromStr for TaxBehavior {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "exclusive" => Ok(Self::Exclusive),
            "inclusive" => Ok(Self::Inclusive),
            "unspecified" => Ok(Self::Unspecified),
            other => Err(format!("unknown tax behavior '{other}'")),
        }
    }
}

impl Default for ProviderSettings {
    fn default() -> Self {
        Self {
            name: default_provider_name(),
            api_key_env: default_api_key_env(),
            api_base: None,
            timeout_secs: default_timeout_secs(),
            max_retries: default_max_retries(),
            retry_delay_ms: default_retry_delay_ms(),
        }
    }
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            path: default_store_path(),
        }
    }
}

impl BillingConfig {
    /// Returns the number of configured prices across all products.
    #[must_use]
    pub fn total_prices(&self) -> usize {
        self.products.values().map(|p| p.prices.len()).sum()
    }
}

fn default_provider_name() -> String {
    String::from("stripe")
}

fn default_api_key_env() -> String {
    String::from("STRIPE_SECRET")
}

const fn default_timeout_secs() -> u64 {
    30
}

const fn default_max_retries() -> u32 {
    3
}

const fn default_retry_delay_ms() -> u64 {
    1000
}

fn default_store_path() -> String {
    String::from(".billing/catalog.json")
}

fn default_currency() -> String {
    String::from("eur")
}

const fn default_interval_count() -> u32 {
    1
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_price_defaults() {
        let price: PriceDefinition = serde_yaml::from_str("amount: 999").unwrap();
        assert_eq!(price.currency, "eur");
        assert!(price.recurring.is_none());

        let recurring: Recurring = serde_yaml::from_str("interval: month").unwrap();
        assert_eq!(recurring.interval_count, 1);
    }

    #[test]
    fn test_snake_case_aliases() {
        let yaml = r"
amount: 1500
recurring:
  interval: year
  interval_count: 2
trial_period_days: 14
stripe:
  tax_behavior: exclusive
  lookup_key: pro_yearly
";
        let price: PriceDefinition = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(price.trial_period_days, Some(14));
        assert_eq!(price.recurring.unwrap().interval_count, 2);
        let stripe = price.stripe.unwrap();
        assert_eq!(stripe.tax_behavior, Some(TaxBehavior::Exclusive));
        assert_eq!(stripe.lookup_key.as_deref(), Some("pro_yearly"));
    }
}
