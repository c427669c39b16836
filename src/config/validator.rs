//! Configuration validation for billing catalogs.
//!
//! Collects every problem in one pass so the operator sees the whole list,
//! then fails on the first error.

use crate::error::{BillingError, ConfigError, Result};
use tracing::debug;

use super::spec::{BillingConfig, PriceDefinition, ProductDefinition};

/// Longest trial period Stripe accepts, in days.
const MAX_TRIAL_DAYS: u32 = 730;

/// Longest statement descriptor Stripe accepts.
const MAX_STATEMENT_DESCRIPTOR_LEN: usize = 22;

/// Validator for billing configurations.
#[derive(Debug, Default)]
pub struct ConfigValidator;

/// Validation result containing all errors found.
#[derive(Debug, Default)]
pub struct ValidationResult {
    /// List of validation errors.
    pub errors: Vec<ValidationError>,
    /// List of warnings (non-fatal issues).
    pub warnings: Vec<String>,
}

/// A single validation error.
#[derive(Debug)]
pub struct ValidationError {
    /// The field path that failed validation.
    pub field: String,
    /// The error message.
    pub message: String,
}

impl ConfigValidator {
    /// Creates a new validator.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Validates a billing configuration.
    ///
    /// # Errors
    ///
    /// Returns the first validation error if any were found.
    pub fn validate(&self, config: &BillingConfig) -> Result<ValidationResult> {
        let mut result = ValidationResult::default();

        if config.products.is_empty() {
            result
                .warnings
                .push(String::from("No products defined; every active product would be archived"));
        }

        for (key, product) in &config.products {
            Self::validate_product(key, product, &mut result);
        }

        if result.errors.is_empty() {
            debug!("Configuration validation passed");
            Ok(result)
        } else {
            let first_error = &result.errors[0];
            Err(BillingError::Config(ConfigError::validation(
                first_error.message.clone(),
                first_error.field.clone(),
            )))
        }
    }

    fn validate_product(key: &str, product: &ProductDefinition, result: &mut ValidationResult) {
        let prefix = format!("products.{key}");

        if !is_valid_key(key) {
            result.push(
                &prefix,
                format!("Product key '{key}' is invalid. Use lowercase letters, digits, '_' or '-'."),
            );
        }

        if product.name.trim().is_empty() {
            result.push(format!("{prefix}.name"), String::from("Product name cannot be empty"));
        }

        if let Some(descriptor) = product
            .stripe
            .as_ref()
            .and_then(|s| s.statement_descriptor.as_deref())
            && descriptor.len() > MAX_STATEMENT_DESCRIPTOR_LEN
        {
            result.push(
                format!("{prefix}.stripe.statementDescriptor"),
                format!("Statement descriptor exceeds {MAX_STATEMENT_DESCRIPTOR_LEN} characters"),
            );
        }

        if product.prices.is_empty() {
            result
                .warnings
                .push(format!("Product '{key}' has no prices; its active prices would be archived"));
        }

        for (price_key, price) in &product.prices {
            Self::validate_price(&format!("{prefix}.prices.{price_key}"), price_key, price, result);
        }
    }

    fn validate_price(
        prefix: &str,
        price_key: &str,
        price: &PriceDefinition,
        result: &mut ValidationResult,
    ) {
        if !is_valid_key(price_key) {
            result.push(
                prefix,
                format!("Price key '{price_key}' is invalid. Use lowercase letters, digits, '_' or '-'."),
            );
        }

        if price.amount < 0 {
            result.push(
                format!("{prefix}.amount"),
                format!("Amount must not be negative, got {}", price.amount),
            );
        }

        if price.currency.len() != 3 || !price.currency.chars().all(|c| c.is_ascii_alphabetic()) {
            result.push(
                format!("{prefix}.currency"),
                format!("Currency '{}' is not a three-letter ISO code", price.currency),
            );
        }

        if let Some(recurring) = &price.recurring
            && recurring.interval_count == 0
        {
            result.push(
                format!("{prefix}.recurring.intervalCount"),
                String::from("Interval count must be at least 1"),
            );
        }

        if let Some(days) = price.trial_period_days {
            if price.recurring.is_none() {
                result.push(
                    format!("{prefix}.trialPeriodDays"),
                    String::from("Trial periods are only allowed on recurring prices"),
                );
            } else if days > MAX_TRIAL_DAYS {
                result.push(
                    format!("{prefix}.trialPeriodDays"),
                    format!("Trial period cannot exceed {MAX_TRIAL_DAYS} days"),
                );
            }
        }
    }
}

impl ValidationResult {
    /// Returns true if no errors were found.
    #[must_use]
    pub const fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    fn push(&mut self, field: impl Into<String>, message: String) {
        self.errors.push(ValidationError {
            field: field.into(),
            message,
        });
    }
}

/// Checks if a business key is valid.
fn is_valid_key(key: &str) -> bool {
    !key.is_empty()
        && key
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' || c == '-')
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigParser;

    fn parse(yaml: &str) -> BillingConfig {
        ConfigParser::new().parse_yaml(yaml, None).unwrap()
    }

    #[test]
    fn test_valid_config() {
        let config = parse(
            r"
products:
  pro:
    name: Pro
    prices:
      monthly:
        amount: 999
        recurring: { interval: month }
        trialPeriodDays: 7
",
        );
        let result = ConfigValidator::new().validate(&config).unwrap();
        assert!(result.is_valid());
        assert!(result.warnings.is_empty());
    }

    #[test]
    fn test_rejects_bad_currency() {
        let config = parse(
            r"
products:
  pro:
    name: Pro
    prices:
      monthly: { amount: 999, currency: euro }
",
        );
        let err = ConfigValidator::new().validate(&config).unwrap_err();
        assert!(err.to_string().contains("three-letter"));
    }

    #[test]
    fn test_rejects_trial_on_one_off_price() {
        let config = parse(
            r"
products:
  setup:
    name: Setup fee
    prices:
      default: { amount: 5000, trialPeriodDays: 3 }
",
        );
        assert!(ConfigValidator::new().validate(&config).is_err());
    }

    #[test]
    fn test_rejects_invalid_keys_and_amounts() {
        let config = parse(
            r"
products:
  Pro Plan:
    name: Pro
    prices:
      monthly: { amount: -1 }
",
        );
        let mut result = ValidationResult::default();
        ConfigValidator::validate_product("Pro Plan", &config.products["Pro Plan"], &mut result);
        assert_eq!(result.errors.len(), 2);
    }

    #[test]
    fn test_empty_catalog_warns() {
        let result = ConfigValidator::new()
            .validate(&BillingConfig::default())
            .unwrap();
        assert_eq!(result.warnings.len(), 1);
    }
}
