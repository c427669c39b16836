//! Mutable state threaded through the pipeline stages.

use std::collections::{BTreeMap, BTreeSet};

use crate::config::{BillingConfig, ConfigHasher, ProductDefinition};

use super::changes::{ChangeSet, PriceChange, ProductChange};

/// State of one deployment run.
#[derive(Debug, Clone)]
pub struct DeployContext {
    /// Preview only; process stages are skipped.
    pub dry_run: bool,
    /// Desired products keyed by business key.
    pub definitions: BTreeMap<String, ProductDefinition>,
    /// Product changes in detection order.
    pub products: Vec<ProductChange>,
    /// Price changes in detection order.
    pub prices: Vec<PriceChange>,
    /// Active duplicate price keys from earlier runs, by product key.
    pub duplicates: BTreeMap<String, BTreeSet<String>>,
    /// Fingerprint of the configuration.
    pub config_hash: String,
}

impl DeployContext {
    /// Starts a run for `config`.
    #[must_use]
    pub fn new(config: &BillingConfig, dry_run: bool) -> Self {
        Self {
            dry_run,
            definitions: config.products.clone(),
            products: Vec::new(),
            prices: Vec::new(),
            duplicates: BTreeMap::new(),
            config_hash: ConfigHasher::new().hash_catalog(config),
        }
    }

    /// Every configured product key.
    #[must_use]
    pub fn product_keys(&self) -> BTreeSet<String> {
        self.definitions.keys().cloned().collect()
    }

    /// Price keys that stay active for a product: the configured ones plus
    /// the duplicates created for them, in earlier runs or this one.
    #[must_use]
    pub fn retained_price_keys(&self, product_key: &str) -> BTreeSet<String> {
        let mut keys: BTreeSet<String> = self
            .definitions
            .get(product_key)
            .map(|d| d.prices.keys().cloned().collect())
            .unwrap_or_default();
        if let Some(duplicates) = self.duplicates.get(product_key) {
            keys.extend(duplicates.iter().cloned());
        }
        keys.extend(
            self.prices
                .iter()
                .filter(|c| c.product_key == product_key)
                .filter_map(|c| c.duplicate_key.clone()),
        );
        keys
    }

    /// Looks up a product change by key.
    #[must_use]
    pub fn product_change(&self, key: &str) -> Option<&ProductChange> {
        self.products.iter().find(|c| c.key == key)
    }

    /// Freezes the run into a change set.
    #[must_use]
    pub fn into_change_set(self) -> ChangeSet {
        ChangeSet::new(self.products, self.prices, self.dry_run, self.config_hash)
    }
}
