//! Catalog fingerprinting.
//!
//! Produces deterministic SHA-256 fingerprints of the desired catalog so a
//! change set can be tied to the exact configuration it was computed from.

use sha2::{Digest, Sha256};

use super::spec::{BillingConfig, ProductDefinition};

/// Hasher for computing configuration fingerprints.
#[derive(Debug, Default)]
pub struct ConfigHasher;

impl ConfigHasher {
    /// Creates a new configuration hasher.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Computes a fingerprint of the whole product catalog.
    ///
    /// Provider, store and codegen settings do not participate.
    #[must_use]
    pub fn hash_catalog(&self, config: &BillingConfig) -> String {
        let mut hasher = Sha256::new();

        // BTreeMap iteration keeps this stable
        for (key, product) in &config.products {
            hasher.update(key.as_bytes());
            hasher.update([0]);
            hasher.update(self.hash_product(product).as_bytes());
        }

        hex::encode(hasher.finalize())
    }

    /// Computes a fingerprint for a single product definition, prices included.
    #[must_use]
    pub fn hash_product(&self, product: &ProductDefinition) -> String {
        let mut hasher = Sha256::new();
        // Serialization of plain data into a Vec cannot fail
        let canonical = serde_json::to_vec(product).unwrap_or_default();
        hasher.update(&canonical);
        hex::encode(hasher.finalize())
    }

    /// Returns the short form of a fingerprint for display.
    #[must_use]
    pub fn short(hash: &str) -> &str {
        &hash[..8.min(hash.len())]
    }
}
