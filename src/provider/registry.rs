//! Closed registry of supported billing providers.

use std::fmt;
use std::str::FromStr;
use tracing::debug;

use crate::config::{ConfigParser, ProviderSettings};
use crate::error::{BillingError, ConfigError, Result};
use crate::planner::ImmutableFields;

use super::client::StripeClient;
use super::resource::ProviderClient;

/// A supported billing provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderKind {
    /// Stripe.
    Stripe,
}

impl ProviderKind {
    /// Every registered provider.
    pub const ALL: &'static [Self] = &[Self::Stripe];

    /// Name used in configuration.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Stripe => "stripe",
        }
    }

    /// Key of the provider feature satellite in definitions and records.
    #[must_use]
    pub const fn feature_key(self) -> &'static str {
        match self {
            Self::Stripe => "stripe",
        }
    }

    /// Price fields this provider cannot change in place.
    #[must_use]
    pub const fn price_immutable_fields(self) -> ImmutableFields {
        match self {
            Self::Stripe => ImmutableFields::STRIPE_PRICE,
        }
    }

    /// Product fields this provider cannot change in place.
    #[must_use]
    pub const fn product_immutable_fields(self) -> ImmutableFields {
        match self {
            Self::Stripe => ImmutableFields::STRIPE_PRODUCT,
        }
    }

    fn supported() -> String {
        Self::ALL
            .iter()
            .map(|kind| kind.name())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ProviderKind {
    type Err = BillingError;

    fn from_str(s: &str) -> Result<Self> {
        let wanted = s.trim().to_lowercase();
        Self::ALL
            .iter()
            .copied()
            .find(|kind| kind.name() == wanted)
            .ok_or_else(|| {
                ConfigError::UnknownProvider {
                    name: s.to_string(),
                    supported: Self::supported(),
                }
                .into()
            })
    }
}

/// Builds the provider client named by the settings.
///
/// The API key is read from the environment variable the settings name.
///
/// # Errors
///
/// Returns an error if the provider is unknown, the key is missing, or the
/// HTTP client cannot be created.
pub fn build_provider(settings: &ProviderSettings) -> Result<Box<dyn ProviderClient>> {
    let kind: ProviderKind = settings.name.parse()?;
    let api_key = ConfigParser::api_key(&settings.api_key_env)?;
    debug!("Building {kind} provider client");

    match kind {
        ProviderKind::Stripe => {
            let mut client = StripeClient::with_timeout(&api_key, settings.timeout_secs)?;
            if let Some(base) = &settings.api_base {
                client = client.with_base_url(base.clone());
            }
            Ok(Box::new(client))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_known_provider() {
        assert_eq!("stripe".parse::<ProviderKind>().unwrap(), ProviderKind::Stripe);
        assert_eq!(" Stripe ".parse::<ProviderKind>().unwrap(), ProviderKind::Stripe);
    }

    #[test]
    fn test_unknown_provider_lists_supported() {
        let err = "paddle".parse::<ProviderKind>().unwrap_err();
        match err {
            BillingError::Config(ConfigError::UnknownProvider { name, supported }) => {
                assert_eq!(name, "paddle");
                assert_eq!(supported, "stripe");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_stripe_price_fields() {
        let fields = ProviderKind::Stripe.price_immutable_fields();
        assert!(fields.is_immutable("amount"));
        assert!(!fields.is_immutable("nickname"));
        assert!(ProviderKind::Stripe.product_immutable_fields().all().is_empty());
    }

    #[test]
    fn test_build_provider_requires_key() {
        let settings = ProviderSettings {
            api_key_env: String::from("BILLING_TEST_KEY_THAT_IS_NEVER_SET"),
            ..ProviderSettings::default()
        };
        let err = build_provider(&settings).err().unwrap();
        assert!(matches!(
            err,
            BillingError::Config(ConfigError::MissingEnvVar { .. })
        ));
    }
}
