//! Product synchronization against the provider.

use std::collections::BTreeSet;
use tracing::{debug, info, warn};

use crate::config::ProductDefinition;
use crate::error::Result;
use crate::pipeline::ChangeType;
use crate::planner::{ChangeDetector, ComparisonProjector, FieldChanges, ImmutableFields};
use crate::provider::{NewProduct, ProviderClient};
use crate::store::{BillingProduct, CatalogStore};

use super::params;
use super::retry::RetryPolicy;
use super::SyncOutcome;

/// Creates, updates and archives products.
///
/// The provider call always happens before the local write, so a failed
/// call never leaves a local record without a provider object.
pub struct ProductService<'a> {
    provider: &'a dyn ProviderClient,
    store: &'a dyn CatalogStore,
    retry: RetryPolicy,
    detector: ChangeDetector,
    immutable: ImmutableFields,
}

impl<'a> ProductService<'a> {
    /// Creates a product service.
    #[must_use]
    pub fn new(provider: &'a dyn ProviderClient, store: &'a dyn CatalogStore, retry: RetryPolicy) -> Self {
        let kind = provider.kind();
        Self {
            provider,
            store,
            retry,
            detector: ChangeDetector::new(ComparisonProjector::for_provider(kind)),
            immutable: kind.product_immutable_fields(),
        }
    }

    /// The detector used for diffs.
    #[must_use]
    pub const fn detector(&self) -> ChangeDetector {
        self.detector
    }

    /// Brings the product with `key` in line with `definition`.
    ///
    /// # Errors
    ///
    /// Returns an error if a provider call or store write fails.
    pub async fn sync(&self, key: &str, definition: &ProductDefinition) -> Result<SyncOutcome<BillingProduct>> {
        let Some(existing) = self.store.find_product(key).await? else {
            let created = self.create(key, definition).await?;
            return Ok(SyncOutcome {
                action: ChangeType::Created,
                resource: created,
                changes: FieldChanges::new(),
            });
        };

        let changes = self.detector.product_changes(&existing, definition);
        if changes.is_empty() {
            debug!("Product '{key}' is up to date");
            return Ok(SyncOutcome {
                action: ChangeType::Unchanged,
                resource: existing,
                changes,
            });
        }

        let immutable = self.immutable.filter_immutable(&changes);
        if !immutable.is_empty() {
            warn!(
                "Product '{key}' changes fields {} cannot update: {:?}",
                self.immutable.name(),
                immutable.keys().collect::<Vec<_>>()
            );
        }

        let feature_key = self.detector.projector().feature_key();
        let update = params::product_update(&self.immutable.filter_mutable(&changes), feature_key);
        if !update.is_empty() {
            let provider_id = existing.provider_id.as_str();
            self.retry
                .run("update product", || self.provider.products().update(provider_id, &update))
                .await?;
            info!("Updated product '{key}' ({provider_id})");
        }

        let mut record = existing;
        record.apply(definition);
        record.active = true;
        let updated = self.store.update_product(&record).await?;

        Ok(SyncOutcome {
            action: ChangeType::Updated,
            resource: updated,
            changes,
        })
    }

    async fn create(&self, key: &str, definition: &ProductDefinition) -> Result<BillingProduct> {
        let features = definition.stripe.clone().unwrap_or_default();
        let request = NewProduct {
            name: definition.name.clone(),
            description: definition.description.clone(),
            metadata: params::creation_metadata(definition.metadata.as_ref(), key),
            tax_code: features.tax_code,
            statement_descriptor: features.statement_descriptor,
        };

        let remote = self
            .retry
            .run("create product", || self.provider.products().create(&request))
            .await?;
        info!("Created product '{key}' ({})", remote.id);

        self.store
            .create_product(BillingProduct::new(key, &remote.id, definition))
            .await
    }

    /// Deactivates one product on the provider, then locally.
    ///
    /// # Errors
    ///
    /// Returns an error if the provider call or store write fails.
    pub async fn archive(&self, product: &BillingProduct) -> Result<BillingProduct> {
        let provider_id = product.provider_id.as_str();
        self.retry
            .run("archive product", || self.provider.products().archive(provider_id))
            .await?;
        warn!("Archived product '{}' ({provider_id})", product.key);
        self.store.deactivate_product(product.id).await
    }

    /// Archives every active product whose key is not in `keep`.
    ///
    /// Products are archived one at a time; a failure leaves earlier
    /// archivals committed.
    ///
    /// # Errors
    ///
    /// Returns the first failure.
    pub async fn archive_removed(&self, keep: &BTreeSet<String>) -> Result<Vec<BillingProduct>> {
        let removed = self.store.active_products_excluding(keep).await?;
        let mut archived = Vec::with_capacity(removed.len());
        for product in &removed {
            archived.push(self.archive(product).await?);
        }
        Ok(archived)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{BillingError, ProviderError};
    use crate::provider::memory::{MemoryProvider, ops};
    use crate::provider::BUSINESS_KEY_METADATA;
    use crate::store::LocalCatalogStore;
    use std::collections::BTreeMap;

    fn definition(name: &str) -> ProductDefinition {
        ProductDefinition {
            name: name.into(),
            description: None,
            metadata: None,
            stripe: None,
            prices: BTreeMap::new(),
        }
    }

    #[tokio::test]
    async fn test_sync_creates_then_is_unchanged() {
        let provider = MemoryProvider::new();
        let store = LocalCatalogStore::in_memory();
        let service = ProductService::new(&provider, &store, RetryPolicy::once());

        let first = service.sync("nif", &definition("NIF Portugal")).await.unwrap();
        assert_eq!(first.action, ChangeType::Created);
        let remote = provider.remote_products();
        assert_eq!(remote[0].metadata[BUSINESS_KEY_METADATA], "nif");

        let calls = provider.calls();
        let second = service.sync("nif", &definition("NIF Portugal")).await.unwrap();
        assert_eq!(second.action, ChangeType::Unchanged);
        assert_eq!(provider.calls(), calls);
    }

    #[tokio::test]
    async fn test_sync_updates_mutable_fields() {
        let provider = MemoryProvider::new();
        let store = LocalCatalogStore::in_memory();
        let service = ProductService::new(&provider, &store, RetryPolicy::once());
        service.sync("pro", &definition("Pro")).await.unwrap();

        let outcome = service.sync("pro", &definition("Pro Plan")).await.unwrap();
        assert_eq!(outcome.action, ChangeType::Updated);
        assert!(outcome.changes.contains_key("name"));
        assert_eq!(outcome.resource.name, "Pro Plan");
        assert_eq!(provider.remote_products()[0].name, "Pro Plan");
    }

    #[tokio::test]
    async fn test_failed_create_leaves_no_local_record() {
        let provider = MemoryProvider::new();
        provider.fail_next(
            ops::CREATE_PRODUCT,
            ProviderError::InvalidRequest {
                message: "bad".into(),
                param: Some("name".into()),
            },
        );
        let store = LocalCatalogStore::in_memory();
        let service = ProductService::new(&provider, &store, RetryPolicy::once());

        let err = service.sync("pro", &definition("Pro")).await.unwrap_err();
        assert!(matches!(err, BillingError::Provider(_)));
        assert!(store.find_product("pro").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_archive_removed_and_reactivate() {
        let provider = MemoryProvider::new();
        let store = LocalCatalogStore::in_memory();
        let service = ProductService::new(&provider, &store, RetryPolicy::once());
        service.sync("basic", &definition("Basic")).await.unwrap();
        service.sync("pro", &definition("Pro")).await.unwrap();

        let keep: BTreeSet<String> = ["pro".to_string()].into();
        let archived = service.archive_removed(&keep).await.unwrap();
        assert_eq!(archived.len(), 1);
        assert_eq!(archived[0].key, "basic");
        assert!(!archived[0].active);

        let revived = service.sync("basic", &definition("Basic")).await.unwrap();
        assert_eq!(revived.action, ChangeType::Updated);
        assert!(revived.changes.contains_key("active"));
        assert!(revived.resource.active);
        assert!(provider.remote_products().iter().all(|p| p.active));
    }
}
