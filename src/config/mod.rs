//! Configuration module for the billing deployment system.
//!
//! This module handles all configuration-related functionality:
//! - Parsing and deserializing `billing.yaml`
//! - Validation of product and price definitions
//! - Computing catalog fingerprints

mod spec;
mod parser;
mod validator;
mod hash;

pub use spec::{
    BillingConfig, CodegenSettings, Interval, Metadata, PriceDefinition, ProductDefinition,
    ProviderSettings, Recurring, StoreSettings, StripePriceFeatures, StripeProductFeatures,
    TaxBehavior,
};
pub use parser::{ConfigParser, find_config_file};
pub use validator::{ConfigValidator, ValidationResult};
pub use hash::ConfigHasher;
