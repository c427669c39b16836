//! Persisted catalog records.
//!
//! These types mirror the local relational cache of provider objects. Rows
//! are never deleted: removal from the configuration flips `active` off.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use uuid::Uuid;

use crate::config::{
    Metadata, PriceDefinition, ProductDefinition, Recurring, StripePriceFeatures,
    StripeProductFeatures,
};

/// Current version of the catalog document format.
pub const CATALOG_VERSION: &str = "1.0";

/// Active price keys per active product key.
pub type ActiveKeys = BTreeMap<String, BTreeSet<String>>;

/// A product mirrored from the billing provider.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BillingProduct {
    /// Local identifier.
    pub id: Uuid,
    /// Business key from configuration.
    pub key: String,
    /// Provider-assigned identifier.
    pub provider_id: String,
    /// Display name.
    pub name: String,
    /// Optional description.
    pub description: Option<String>,
    /// Metadata as last synchronized.
    #[serde(default)]
    pub metadata: Metadata,
    /// Whether the product is live.
    pub active: bool,
    /// Stripe feature satellite, absent when no attribute is set.
    #[serde(default)]
    pub stripe: Option<StripeProductFeatures>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last modification time.
    pub updated_at: DateTime<Utc>,
}

/// A price mirrored from the billing provider.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BillingPrice {
    /// Local identifier.
    pub id: Uuid,
    /// Owning product.
    pub product_id: Uuid,
    /// Price type key, unique per product among active prices.
    pub key: String,
    /// Configured price type this row was duplicated from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duplicate_of: Option<String>,
    /// Provider-assigned identifier.
    pub provider_id: String,
    /// Amount in minor units.
    pub amount: i64,
    /// Lowercase currency code.
    pub currency: String,
    /// Recurring interval.
    #[serde(default)]
    pub recurring: Option<Recurring>,
    /// Optional nickname.
    #[serde(default)]
    pub nickname: Option<String>,
    /// Metadata as last synchronized.
    #[serde(default)]
    pub metadata: Metadata,
    /// Trial period length in days.
    #[serde(default)]
    pub trial_period_days: Option<u32>,
    /// Whether the price is live.
    pub active: bool,
    /// Stripe feature satellite, absent when no attribute is set.
    #[serde(default)]
    pub stripe: Option<StripePriceFeatures>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last modification time.
    pub updated_at: DateTime<Utc>,
}

/// The complete catalog document.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CatalogSnapshot {
    /// Document format version.
    pub version: String,
    /// All products, active or not.
    pub products: Vec<BillingProduct>,
    /// All prices, active or not.
    pub prices: Vec<BillingPrice>,
    /// Last modification time.
    pub last_updated: DateTime<Utc>,
}

impl BillingProduct {
    /// Builds a new active product row for a freshly created provider object.
    #[must_use]
    pub fn new(key: &str, provider_id: &str, definition: &ProductDefinition) -> Self {
        let now = Utc::now();
        let mut product = Self {
            id: Uuid::new_v4(),
            key: key.to_string(),
            provider_id: provider_id.to_string(),
            name: String::new(),
            description: None,
            metadata: Metadata::new(),
            active: true,
            stripe: None,
            created_at: now,
            updated_at: now,
        };
        product.apply(definition);
        product
    }

    /// Copies every definition field onto this row.
    pub fn apply(&mut self, definition: &ProductDefinition) {
        self.name.clone_from(&definition.name);
        self.description.clone_from(&definition.description);
        self.metadata = definition.metadata.clone().unwrap_or_default();
        self.stripe = definition.stripe.clone().filter(|s| !s.is_empty());
    }
}

impl BillingPrice {
    /// Builds a new active price row for a freshly created provider object.
    #[must_use]
    pub fn new(
        product_id: Uuid,
        key: &str,
        provider_id: &str,
        definition: &PriceDefinition,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            product_id,
            key: key.to_string(),
            duplicate_of: None,
            provider_id: provider_id.to_string(),
            amount: definition.amount,
            currency: definition.currency.clone(),
            recurring: definition.recurring.clone(),
            nickname: definition.nickname.clone(),
            metadata: definition.metadata.clone().unwrap_or_default(),
            trial_period_days: definition.trial_period_days,
            active: true,
            stripe: definition.stripe.clone().filter(|s| !s.is_empty()),
            created_at: now,
            updated_at: now,
        }
    }

    /// Marks this row as a duplicate of the configured price type `origin`.
    #[must_use]
    pub fn duplicating(mut self, origin: &str) -> Self {
        self.duplicate_of = Some(origin.to_string());
        self
    }

    /// Returns true if this row currently stands for the price type `key`.
    #[must_use]
    pub fn realizes(&self, key: &str) -> bool {
        self.key == key || self.duplicate_of.as_deref() == Some(key)
    }

    /// Copies the fields a provider allows to change in place.
    pub fn apply_mutable(&mut self, definition: &PriceDefinition) {
        self.nickname.clone_from(&definition.nickname);
        self.metadata = definition.metadata.clone().unwrap_or_default();
        self.stripe = definition.stripe.clone().filter(|s| !s.is_empty());
    }
}

impl CatalogSnapshot {
    /// Creates an empty catalog.
    #[must_use]
    pub fn new() -> Self {
        Self {
            version: String::from(CATALOG_VERSION),
            products: Vec::new(),
            prices: Vec::new(),
            last_updated: Utc::now(),
        }
    }

    /// Number of active products.
    #[must_use]
    pub fn active_product_count(&self) -> usize {
        self.products.iter().filter(|p| p.active).count()
    }

    /// Number of active prices.
    #[must_use]
    pub fn active_price_count(&self) -> usize {
        self.prices.iter().filter(|p| p.active).count()
    }

    /// Active price keys grouped by active product key.
    #[must_use]
    pub fn active_keys(&self) -> ActiveKeys {
        self.products
            .iter()
            .filter(|p| p.active)
            .map(|product| {
                let keys = self
                    .prices
                    .iter()
                    .filter(|price| price.active && price.product_id == product.id)
                    .map(|price| price.key.clone())
                    .collect();
                (product.key.clone(), keys)
            })
            .collect()
    }
}

impl Default for CatalogSnapshot {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn definition() -> PriceDefinition {
        PriceDefinition {
            amount: 999,
            currency: String::from("eur"),
            recurring: None,
            nickname: Some(String::from("Monthly")),
            metadata: None,
            trial_period_days: None,
            stripe: Some(StripePriceFeatures::default()),
        }
    }

    #[test]
    fn test_new_price_drops_empty_features() {
        let price = BillingPrice::new(Uuid::new_v4(), "monthly", "price_1", &definition());
        assert!(price.active);
        assert!(price.stripe.is_none());
        assert!(price.metadata.is_empty());
    }

    #[test]
    fn test_active_keys() {
        let product_def = ProductDefinition {
            name: String::from("Pro"),
            description: None,
            metadata: None,
            stripe: None,
            prices: BTreeMap::new(),
        };
        let product = BillingProduct::new("pro", "prod_1", &product_def);
        let monthly = BillingPrice::new(product.id, "monthly", "price_1", &definition());
        let mut yearly = BillingPrice::new(product.id, "yearly", "price_2", &definition());
        yearly.active = false;

        let mut snapshot = CatalogSnapshot::new();
        snapshot.products.push(product);
        snapshot.prices.extend([monthly, yearly]);

        let keys = snapshot.active_keys();
        assert_eq!(keys["pro"].len(), 1);
        assert!(keys["pro"].contains("monthly"));
        assert_eq!(snapshot.active_price_count(), 1);
    }
}
