//! Catalog repository trait definition.
//!
//! This module defines the repository-style queries the reconciliation core
//! runs against the local cache.

use async_trait::async_trait;
use std::collections::BTreeSet;
use uuid::Uuid;

use crate::error::Result;
use super::types::{ActiveKeys, BillingPrice, BillingProduct, CatalogSnapshot};

/// Trait for catalog storage backends.
#[async_trait]
pub trait CatalogStore: Send + Sync {
    /// Finds a product by business key, active or not.
    async fn find_product(&self, key: &str) -> Result<Option<BillingProduct>>;

    /// Lists active products whose key is not in `keys`.
    async fn active_products_excluding(&self, keys: &BTreeSet<String>) -> Result<Vec<BillingProduct>>;

    /// Inserts a new product.
    async fn create_product(&self, product: BillingProduct) -> Result<BillingProduct>;

    /// Replaces an existing product row.
    async fn update_product(&self, product: &BillingProduct) -> Result<BillingProduct>;

    /// Marks a product inactive.
    async fn deactivate_product(&self, id: Uuid) -> Result<BillingProduct>;

    /// Finds the active price of a type for a product.
    async fn find_active_price(&self, product_id: Uuid, key: &str) -> Result<Option<BillingPrice>>;

    /// Lists active prices of a product whose key is not in `keys`.
    async fn active_prices_excluding(
        &self,
        product_id: Uuid,
        keys: &BTreeSet<String>,
    ) -> Result<Vec<BillingPrice>>;

    /// Inserts a new price.
    async fn create_price(&self, price: BillingPrice) -> Result<BillingPrice>;

    /// Replaces an existing price row.
    async fn update_price(&self, price: &BillingPrice) -> Result<BillingPrice>;

    /// Marks a price inactive.
    async fn deactivate_price(&self, id: Uuid) -> Result<BillingPrice>;

    /// Returns a copy of the whole catalog.
    async fn snapshot(&self) -> Result<CatalogSnapshot>;

    /// Gets the backend type name.
    fn backend_type(&self) -> &'static str;

    /// Lists all active prices of a product.
    async fn active_prices(&self, product_id: Uuid) -> Result<Vec<BillingPrice>> {
        self.active_prices_excluding(product_id, &BTreeSet::new()).await
    }

    /// Active price keys grouped by active product key.
    async fn active_keys(&self) -> Result<ActiveKeys> {
        Ok(self.snapshot().await?.active_keys())
    }
}
