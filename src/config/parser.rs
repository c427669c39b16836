//! Configuration parser for loading the billing catalog file.
//!
//! This module handles loading configuration from YAML files and environment
//! variables, with proper precedence and error handling.

use crate::error::{BillingError, ConfigError, Result};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use super::spec::BillingConfig;

/// Configuration parser for loading billing configuration.
#[derive(Debug, Default)]
pub struct ConfigParser {
    /// Base path for resolving relative paths.
    base_path: Option<PathBuf>,
}

impl ConfigParser {
    /// Creates a new configuration parser.
    #[must_use]
    pub const fn new() -> Self {
        Self { base_path: None }
    }

    /// Sets the base path for resolving relative paths.
    #[must_use]
    pub fn with_base_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.base_path = Some(path.into());
        self
    }

    /// Resolves a configured path against the base path.
    #[must_use]
    pub fn resolve(&self, path: &str) -> PathBuf {
        let path = Path::new(path);
        match &self.base_path {
            Some(base) if path.is_relative() => base.join(path),
            _ => path.to_path_buf(),
        }
    }

    /// Loads configuration from a YAML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load_file(&self, path: impl AsRef<Path>) -> Result<BillingConfig> {
        let path = path.as_ref();
        info!("Loading configuration from: {}", path.display());

        if !path.exists() {
            return Err(BillingError::Config(ConfigError::FileNotFound {
                path: path.to_path_buf(),
            }));
        }

        let content = std::fs::read_to_string(path).map_err(|e| {
            BillingError::Config(ConfigError::ParseError {
                message: format!("Failed to read file: {e}"),
                location: Some(path.display().to_string()),
            })
        })?;

        self.parse_yaml(&content, Some(path))
    }

    /// Parses configuration from a YAML string.
    ///
    /// Currency codes are normalized to lowercase.
    ///
    /// # Errors
    ///
    /// Returns an error if the YAML is invalid.
    pub fn parse_yaml(&self, content: &str, source: Option<&Path>) -> Result<BillingConfig> {
        debug!("Parsing YAML configuration");

        let mut config: BillingConfig = serde_yaml::from_str(content).map_err(|e| {
            let location = source.map(|p| p.display().to_string());
            BillingError::Config(ConfigError::ParseError {
                message: format!("YAML parse error: {e}"),
                location,
            })
        })?;

        for product in config.products.values_mut() {
            for price in product.prices.values_mut() {
                price.currency = price.currency.to_ascii_lowercase();
            }
        }

        debug!(
            "Parsed {} products with {} prices",
            config.products.len(),
            config.total_prices()
        );
        Ok(config)
    }

    /// Loads configuration with environment variable overrides.
    ///
    /// Recognized variables: `BILLING_PROVIDER`, `BILLING_STORE_PATH`,
    /// `BILLING_MANIFEST_PATH`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load_with_env(&self, path: impl AsRef<Path>) -> Result<BillingConfig> {
        let mut config = self.load_file(path)?;
        Self::apply_env_overrides(&mut config);
        Ok(config)
    }

    /// Applies environment variable overrides to the configuration.
    fn apply_env_overrides(config: &mut BillingConfig) {
        if let Ok(provider) = std::env::var("BILLING_PROVIDER") {
            debug!("Overriding provider.name from environment");
            config.provider.name = provider;
        }

        if let Ok(path) = std::env::var("BILLING_STORE_PATH") {
            debug!("Overriding store.path from environment");
            config.store.path = path;
        }

        if let Ok(path) = std::env::var("BILLING_MANIFEST_PATH") {
            debug!("Overriding codegen.manifest_path from environment");
            config.codegen = Some(super::spec::CodegenSettings {
                manifest_path: path,
            });
        }
    }

    /// Loads the .env file if present.
    ///
    /// # Errors
    ///
    /// Returns an error if the .env file exists but cannot be loaded.
    pub fn load_dotenv(&self) -> Result<()> {
        let env_path = self
            .base_path
            .as_ref()
            .map_or_else(|| PathBuf::from(".env"), |p| p.join(".env"));

        if env_path.exists() {
            info!("Loading environment from: {}", env_path.display());
            dotenvy::from_path(&env_path).map_err(|e| {
                BillingError::Config(ConfigError::ParseError {
                    message: format!("Failed to load .env file: {e}"),
                    location: Some(env_path.display().to_string()),
                })
            })?;
        } else {
            debug!(".env file not found at: {}", env_path.display());
        }

        Ok(())
    }

    /// Reads the provider API key from the named environment variable.
    ///
    /// # Errors
    ///
    /// Returns an error if the variable is unset or empty.
    pub fn api_key(var: &str) -> Result<String> {
        match std::env::var(var) {
            Ok(key) if !key.trim().is_empty() => Ok(key),
            _ => Err(BillingError::Config(ConfigError::MissingEnvVar {
                name: var.to_string(),
            })),
        }
    }
}

/// Default configuration file names to search for.
pub const DEFAULT_CONFIG_FILES: &[&str] = &["billing.yaml", "billing.yml"];

/// Finds the configuration file in the current directory or parent directories.
///
/// # Errors
///
/// Returns an error if no configuration file is found.
pub fn find_config_file(start_dir: impl AsRef<Path>) -> Result<PathBuf> {
    let start = start_dir.as_ref();
    let mut current = start.to_path_buf();

    loop {
        for filename in DEFAULT_CONFIG_FILES {
            let config_path = current.join(filename);
            if config_path.exists() {
                info!("Found configuration file: {}", config_path.display());
                return Ok(config_path);
            }
        }

        if !current.pop() {
            break;
        }
    }

    Err(BillingError::Config(ConfigError::FileNotFound {
        path: start.join(DEFAULT_CONFIG_FILES[0]),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_minimal_config() {
        let yaml = r"
products:
  nif:
    name: NIF Portugal
    prices:
      default:
        amount: 12000
";
        let parser = ConfigParser::new();
        let config = parser.parse_yaml(yaml, None).unwrap();

        assert_eq!(config.provider.name, "stripe");
        assert_eq!(config.provider.api_key_env, "STRIPE_SECRET");
        assert_eq!(config.store.path, ".billing/catalog.json");
        let nif = &config.products["nif"];
        assert_eq!(nif.name, "NIF Portugal");
        assert_eq!(nif.prices["default"].amount, 12000);
        assert_eq!(nif.prices["default"].currency, "eur");
    }

    #[test]
    fn test_parse_full_config() {
        let yaml = r#"
provider:
  name: stripe
  api_key_env: STRIPE_TEST_SECRET
  max_retries: 5
  retry_delay_ms: 250
store:
  path: state/catalog.json
codegen:
  manifest_path: generated/billing-keys.json
products:
  pro:
    name: Pro plan
    description: Everything included
    metadata:
      tier: "2"
    stripe:
      taxCode: txcd_10000000
      statementDescriptor: PRO PLAN
    prices:
      monthly:
        amount: 999
        currency: EUR
        recurring:
          interval: month
        nickname: Pro monthly
        trialPeriodDays: 14
      yearly:
        amount: 9990
        recurring:
          interval: year
          intervalCount: 1
        stripe:
          taxBehavior: inclusive
          lookupKey: pro_yearly
"#;
        let parser = ConfigParser::new();
        let config = parser.parse_yaml(yaml, None).unwrap();

        assert_eq!(config.provider.max_retries, 5);
        assert_eq!(config.total_prices(), 2);
        let pro = &config.products["pro"];
        assert_eq!(pro.metadata.as_ref().unwrap()["tier"], "2");
        assert_eq!(
            pro.stripe.as_ref().unwrap().tax_code.as_deref(),
            Some("txcd_10000000")
        );
        assert_eq!(pro.prices["monthly"].currency, "eur");
        assert_eq!(pro.prices["monthly"].trial_period_days, Some(14));
        assert_eq!(
            config.codegen.unwrap().manifest_path,
            "generated/billing-keys.json"
        );
    }

    #[test]
    fn test_parse_invalid_yaml() {
        let parser = ConfigParser::new();
        let result = parser.parse_yaml("products: [", None);
        assert!(matches!(
            result,
            Err(BillingError::Config(ConfigError::ParseError { .. }))
        ));
    }

    #[test]
    fn test_resolve_relative_to_base() {
        let parser = ConfigParser::new().with_base_path("/srv/billing");
        assert_eq!(
            parser.resolve(".billing/catalog.json"),
            PathBuf::from("/srv/billing/.billing/catalog.json")
        );
        assert_eq!(parser.resolve("/tmp/x.json"), PathBuf::from("/tmp/x.json"));
    }

    #[test]
    fn test_find_config_file_walks_up() {
        let temp = tempfile::TempDir::new().unwrap();
        let nested = temp.path().join("a/b");
        std::fs::create_dir_all(&nested).unwrap();
        std::fs::write(temp.path().join("billing.yaml"), "products: {}\n").unwrap();

        let found = find_config_file(&nested).unwrap();
        assert_eq!(found, temp.path().join("billing.yaml"));
    }
}
