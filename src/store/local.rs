//! Local file-based catalog store.
//!
//! Keeps the whole catalog in memory and writes it through to a JSON
//! document after every mutation. A store opened without a path never
//! touches the filesystem.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::{BillingError, Result, StoreError};

use super::repository::CatalogStore;
use super::types::{BillingPrice, BillingProduct, CatalogSnapshot};

/// Local file-based catalog store.
#[derive(Debug)]
pub struct LocalCatalogStore {
    /// Path to the catalog document, if persisted.
    path: Option<PathBuf>,
    /// In-memory catalog.
    data: Mutex<CatalogSnapshot>,
}

impl LocalCatalogStore {
    /// Opens the catalog document at `path`, starting empty if it does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the document exists but cannot be read or parsed.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let data = if path.exists() {
            info!("Loading catalog from: {}", path.display());
            let content = fs::read_to_string(&path).await.map_err(|e| {
                BillingError::Store(StoreError::Corrupted {
                    message: format!("Failed to read catalog file: {e}"),
                })
            })?;
            serde_json::from_str(&content).map_err(|e| {
                BillingError::Store(StoreError::Corrupted {
                    message: format!("Failed to parse catalog file: {e}"),
                })
            })?
        } else {
            debug!("Catalog file does not exist yet: {}", path.display());
            CatalogSnapshot::new()
        };

        Ok(Self {
            path: Some(path),
            data: Mutex::new(data),
        })
    }

    /// Creates a store that lives only in memory.
    #[must_use]
    pub fn in_memory() -> Self {
        Self {
            path: None,
            data: Mutex::new(CatalogSnapshot::new()),
        }
    }

    /// Returns the document path, if persisted.
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Applies `change` to a copy of the catalog, persists it, then swaps it in.
    async fn mutate<T: Send>(
        &self,
        change: impl FnOnce(&mut CatalogSnapshot) -> Result<T> + Send,
    ) -> Result<T> {
        let mut data = self.data.lock().await;
        let mut next = data.clone();
        let value = change(&mut next)?;
        next.last_updated = Utc::now();
        self.persist(&next).await?;
        *data = next;
        Ok(value)
    }

    /// Writes the catalog atomically.
    async fn persist(&self, snapshot: &CatalogSnapshot) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            debug!("Creating catalog directory: {}", parent.display());
            fs::create_dir_all(parent).await.map_err(|e| write_failed("create directory", &e))?;
        }

        let content = serde_json::to_string_pretty(snapshot).map_err(|e| {
            BillingError::Store(StoreError::serialization(format!(
                "Failed to serialize catalog: {e}"
            )))
        })?;

        // Write to a temporary file first, then rename for atomicity
        let temp_path = path.with_extension("tmp");
        let mut file = fs::File::create(&temp_path)
            .await
            .map_err(|e| write_failed("create temp file", &e))?;
        file.write_all(content.as_bytes())
            .await
            .map_err(|e| write_failed("write catalog", &e))?;
        file.sync_all().await.map_err(|e| write_failed("sync catalog", &e))?;
        fs::rename(&temp_path, path)
            .await
            .map_err(|e| write_failed("rename catalog", &e))?;

        debug!("Catalog saved to {}", path.display());
        Ok(())
    }
}

fn write_failed(action: &str, err: &std::io::Error) -> BillingError {
    BillingError::Store(StoreError::WriteFailed {
        message: format!("Failed to {action}: {err}"),
    })
}

fn not_found(resource: &'static str, id: Uuid) -> BillingError {
    BillingError::Store(StoreError::NotFound {
        resource,
        id: id.to_string(),
    })
}

fn conflict(message: String) -> BillingError {
    BillingError::Store(StoreError::conflict(message))
}

#[async_trait]
impl CatalogStore for LocalCatalogStore {
    async fn find_product(&self, key: &str) -> Result<Option<BillingProduct>> {
        let data = self.data.lock().await;
        Ok(data.products.iter().find(|p| p.key == key).cloned())
    }

    async fn active_products_excluding(&self, keys: &BTreeSet<String>) -> Result<Vec<BillingProduct>> {
        let data = self.data.lock().await;
        Ok(data
            .products
            .iter()
            .filter(|p| p.active && !keys.contains(&p.key))
            .cloned()
            .collect())
    }

    async fn create_product(&self, product: BillingProduct) -> Result<BillingProduct> {
        self.mutate(move |data| {
            if data.products.iter().any(|p| p.key == product.key) {
                return Err(conflict(format!("product key '{}' already exists", product.key)));
            }
            if data.products.iter().any(|p| p.provider_id == product.provider_id) {
                return Err(conflict(format!(
                    "provider product '{}' is already mapped",
                    product.provider_id
                )));
            }
            data.products.push(product.clone());
            Ok(product)
        })
        .await
    }

    async fn update_product(&self, product: &BillingProduct) -> Result<BillingProduct> {
        let mut updated = product.clone();
        updated.updated_at = Utc::now();
        self.mutate(move |data| {
            let slot = data
                .products
                .iter_mut()
                .find(|p| p.id == updated.id)
                .ok_or_else(|| not_found("Product", updated.id))?;
            if slot.key != updated.key {
                return Err(conflict(format!(
                    "product key cannot change from '{}' to '{}'",
                    slot.key, updated.key
                )));
            }
            *slot = updated.clone();
            Ok(updated)
        })
        .await
    }

    async fn deactivate_product(&self, id: Uuid) -> Result<BillingProduct> {
        self.mutate(move |data| {
            let slot = data
                .products
                .iter_mut()
                .find(|p| p.id == id)
                .ok_or_else(|| not_found("Product", id))?;
            slot.active = false;
            slot.updated_at = Utc::now();
            Ok(slot.clone())
        })
        .await
    }

    async fn find_active_price(&self, product_id: Uuid, key: &str) -> Result<Option<BillingPrice>> {
        let data = self.data.lock().await;
        Ok(data
            .prices
            .iter()
            .find(|p| p.active && p.product_id == product_id && p.key == key)
            .cloned())
    }

    async fn active_prices_excluding(
        &self,
        product_id: Uuid,
        keys: &BTreeSet<String>,
    ) -> Result<Vec<BillingPrice>> {
        let data = self.data.lock().await;
        Ok(data
            .prices
            .iter()
            .filter(|p| p.active && p.product_id == product_id && !keys.contains(&p.key))
            .cloned()
            .collect())
    }

    async fn create_price(&self, price: BillingPrice) -> Result<BillingPrice> {
        self.mutate(move |data| {
            if !data.products.iter().any(|p| p.id == price.product_id) {
                return Err(not_found("Product", price.product_id));
            }
            if price.active
                && data
                    .prices
                    .iter()
                    .any(|p| p.active && p.product_id == price.product_id && p.key == price.key)
            {
                return Err(conflict(format!(
                    "an active price of type '{}' already exists for this product",
                    price.key
                )));
            }
            if data.prices.iter().any(|p| p.provider_id == price.provider_id) {
                return Err(conflict(format!(
                    "provider price '{}' is already mapped",
                    price.provider_id
                )));
            }
            data.prices.push(price.clone());
            Ok(price)
        })
        .await
    }

    async fn update_price(&self, price: &BillingPrice) -> Result<BillingPrice> {
        let mut updated = price.clone();
        updated.updated_at = Utc::now();
        self.mutate(move |data| {
            let slot = data
                .prices
                .iter_mut()
                .find(|p| p.id == updated.id)
                .ok_or_else(|| not_found("Price", updated.id))?;
            *slot = updated.clone();
            Ok(updated)
        })
        .await
    }

    async fn deactivate_price(&self, id: Uuid) -> Result<BillingPrice> {
        self.mutate(move |data| {
            let slot = data
                .prices
                .iter_mut()
                .find(|p| p.id == id)
                .ok_or_else(|| not_found("Price", id))?;
            slot.active = false;
            slot.updated_at = Utc::now();
            Ok(slot.clone())
        })
        .await
    }

    async fn snapshot(&self) -> Result<CatalogSnapshot> {
        Ok(self.data.lock().await.clone())
    }

    fn backend_type(&self) -> &'static str {
        if self.path.is_some() { "local" } else { "memory" }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{PriceDefinition, ProductDefinition};
    use std::collections::BTreeMap;
    use tempfile::TempDir;

    fn product_def(name: &str) -> ProductDefinition {
        ProductDefinition {
            name: name.to_string(),
            description: None,
            metadata: None,
            stripe: None,
            prices: BTreeMap::new(),
        }
    }

    fn price_def(amount: i64) -> PriceDefinition {
        PriceDefinition {
            amount,
            currency: String::from("eur"),
            recurring: None,
            nickname: None,
            metadata: None,
            trial_period_days: None,
            stripe: None,
        }
    }

    #[tokio::test]
    async fn test_save_and_reload() {
        let temp = TempDir::new().expect("Failed to create temp dir");
        let path = temp.path().join("nested/catalog.json");

        let store = LocalCatalogStore::open(&path).await.unwrap();
        let product = store
            .create_product(BillingProduct::new("nif", "prod_1", &product_def("NIF")))
            .await
            .unwrap();
        store
            .create_price(BillingPrice::new(product.id, "default", "price_1", &price_def(12000)))
            .await
            .unwrap();

        let reopened = LocalCatalogStore::open(&path).await.unwrap();
        let found = reopened.find_product("nif").await.unwrap().unwrap();
        assert_eq!(found.provider_id, "prod_1");
        let price = reopened
            .find_active_price(found.id, "default")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(price.amount, 12000);
        assert_eq!(reopened.backend_type(), "local");
    }

    #[tokio::test]
    async fn test_one_active_price_per_type() {
        let store = LocalCatalogStore::in_memory();
        let product = store
            .create_product(BillingProduct::new("pro", "prod_1", &product_def("Pro")))
            .await
            .unwrap();
        let first = store
            .create_price(BillingPrice::new(product.id, "monthly", "price_1", &price_def(999)))
            .await
            .unwrap();

        let dup = store
            .create_price(BillingPrice::new(product.id, "monthly", "price_2", &price_def(1299)))
            .await;
        assert!(matches!(dup, Err(BillingError::Store(StoreError::Conflict { .. }))));

        store.deactivate_price(first.id).await.unwrap();
        store
            .create_price(BillingPrice::new(product.id, "monthly", "price_2", &price_def(1299)))
            .await
            .unwrap();

        let snapshot = store.snapshot().await.unwrap();
        assert_eq!(snapshot.prices.len(), 2);
        assert_eq!(snapshot.active_price_count(), 1);
    }

    #[tokio::test]
    async fn test_duplicate_product_key_rejected() {
        let store = LocalCatalogStore::in_memory();
        store
            .create_product(BillingProduct::new("pro", "prod_1", &product_def("Pro")))
            .await
            .unwrap();
        let result = store
            .create_product(BillingProduct::new("pro", "prod_2", &product_def("Pro")))
            .await;
        assert!(result.is_err());
        assert_eq!(store.snapshot().await.unwrap().products.len(), 1);
    }

    #[tokio::test]
    async fn test_active_excluding() {
        let store = LocalCatalogStore::in_memory();
        for (key, id) in [("a", "prod_a"), ("b", "prod_b"), ("c", "prod_c")] {
            store
                .create_product(BillingProduct::new(key, id, &product_def(key)))
                .await
                .unwrap();
        }
        let c = store.find_product("c").await.unwrap().unwrap();
        store.deactivate_product(c.id).await.unwrap();

        let keep: BTreeSet<String> = [String::from("a")].into_iter().collect();
        let orphans = store.active_products_excluding(&keep).await.unwrap();
        assert_eq!(orphans.len(), 1);
        assert_eq!(orphans[0].key, "b");
    }

    #[tokio::test]
    async fn test_update_missing_product() {
        let store = LocalCatalogStore::in_memory();
        let ghost = BillingProduct::new("ghost", "prod_x", &product_def("Ghost"));
        let result = store.update_product(&ghost).await;
        assert!(matches!(result, Err(BillingError::Store(StoreError::NotFound { .. }))));
    }
}
