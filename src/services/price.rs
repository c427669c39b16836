//! Price synchronization against the provider.

use std::collections::BTreeSet;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::PriceDefinition;
use crate::error::{BillingError, Result};
use crate::pipeline::ChangeType;
use crate::planner::{ChangeDetector, ComparisonProjector, FieldChanges, ImmutableFields};
use crate::provider::{NewPrice, ProviderClient, RemotePrice};
use crate::resolver::Resolution;
use crate::store::{BillingPrice, BillingProduct, CatalogStore};

use super::params;
use super::retry::RetryPolicy;
use super::SyncOutcome;

/// Creates, updates, replaces and archives prices.
pub struct PriceService<'a> {
    provider: &'a dyn ProviderClient,
    store: &'a dyn CatalogStore,
    retry: RetryPolicy,
    detector: ChangeDetector,
    immutable: ImmutableFields,
}

impl<'a> PriceService<'a> {
    /// Creates a price service.
    #[must_use]
    pub fn new(provider: &'a dyn ProviderClient, store: &'a dyn CatalogStore, retry: RetryPolicy) -> Self {
        let kind = provider.kind();
        Self {
            provider,
            store,
            retry,
            detector: ChangeDetector::new(ComparisonProjector::for_provider(kind)),
            immutable: kind.price_immutable_fields(),
        }
    }

    /// The detector used for diffs.
    #[must_use]
    pub const fn detector(&self) -> ChangeDetector {
        self.detector
    }

    /// The provider's immutable price fields.
    #[must_use]
    pub const fn immutable_fields(&self) -> ImmutableFields {
        self.immutable
    }

    /// The active row that currently stands for the price type `key`.
    ///
    /// A duplicate created for `key` supersedes the row stored under `key`
    /// itself; among several candidates the most recently created wins.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    pub async fn current_price(&self, product_id: Uuid, key: &str) -> Result<Option<BillingPrice>> {
        let current = self
            .store
            .active_prices(product_id)
            .await?
            .into_iter()
            .filter(|p| p.realizes(key))
            .max_by(|a, b| {
                a.created_at
                    .cmp(&b.created_at)
                    .then(a.duplicate_of.is_some().cmp(&b.duplicate_of.is_some()))
            });
        Ok(current)
    }

    /// Keys of active duplicates created for any of the price types in `keys`.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    pub async fn duplicate_keys(&self, product_id: Uuid, keys: &BTreeSet<String>) -> Result<BTreeSet<String>> {
        Ok(self
            .store
            .active_prices(product_id)
            .await?
            .into_iter()
            .filter(|p| p.duplicate_of.as_ref().is_some_and(|origin| keys.contains(origin)))
            .map(|p| p.key)
            .collect())
    }

    /// Brings the price of type `key` under `product` in line with `definition`.
    ///
    /// The comparison runs against [`Self::current_price`]. A diff touching
    /// an immutable field is applied according to `resolution`: replace the
    /// row stored under `key`, or create a duplicate under a new key while
    /// the current price stays active.
    ///
    /// # Errors
    ///
    /// Returns an error if a provider call or store write fails, or if an
    /// immutable change arrives without a resolution.
    pub async fn sync(
        &self,
        product: &BillingProduct,
        key: &str,
        definition: &PriceDefinition,
        resolution: Option<&Resolution>,
    ) -> Result<SyncOutcome<BillingPrice>> {
        let Some(existing) = self.current_price(product.id, key).await? else {
            let remote = self.create_remote(product, key, definition, false).await?;
            let created = self.record(product, key, &remote, definition).await?;
            return Ok(SyncOutcome {
                action: ChangeType::Created,
                resource: created,
                changes: FieldChanges::new(),
            });
        };

        let changes = self.detector.price_changes(&existing, definition);
        if changes.is_empty() {
            debug!("Price '{}/{key}' is up to date", product.key);
            return Ok(SyncOutcome {
                action: ChangeType::Unchanged,
                resource: existing,
                changes,
            });
        }

        if !self.immutable.filter_immutable(&changes).is_empty() {
            return match resolution {
                Some(Resolution::Archive) => {
                    let replacement = self.replace(product, key, definition).await?;
                    Ok(SyncOutcome {
                        action: ChangeType::Updated,
                        resource: replacement,
                        changes,
                    })
                }
                Some(Resolution::Duplicate { key: new_key }) => {
                    let remote = self.create_remote(product, new_key, definition, false).await?;
                    let duplicate = self
                        .store
                        .create_price(BillingPrice::new(product.id, new_key, &remote.id, definition).duplicating(key))
                        .await?;
                    Ok(SyncOutcome {
                        action: ChangeType::Created,
                        resource: duplicate,
                        changes,
                    })
                }
                None => Err(BillingError::internal(format!(
                    "price '{}/{key}' has immutable changes but no resolution",
                    product.key
                ))),
            };
        }

        let feature_key = self.detector.projector().feature_key();
        let update = params::price_update(&self.immutable.filter_mutable(&changes), feature_key);
        if !update.is_empty() {
            let provider_id = existing.provider_id.as_str();
            self.retry
                .run("update price", || self.provider.prices().update(provider_id, &update))
                .await?;
            info!("Updated price '{}/{key}' ({provider_id})", product.key);
        }

        let mut record = existing;
        record.apply_mutable(definition);
        let updated = self.store.update_price(&record).await?;

        Ok(SyncOutcome {
            action: ChangeType::Updated,
            resource: updated,
            changes,
        })
    }

    /// Replaces the row stored under `key`.
    ///
    /// The replacement exists on the provider before the old price is
    /// archived, so a failed create leaves the old price live. Duplicates
    /// of `key` are left alone.
    async fn replace(&self, product: &BillingProduct, key: &str, definition: &PriceDefinition) -> Result<BillingPrice> {
        let remote = self.create_remote(product, key, definition, true).await?;
        if let Some(original) = self.store.find_active_price(product.id, key).await? {
            self.archive(&original).await?;
        }
        self.record(product, key, &remote, definition).await
    }

    async fn create_remote(
        &self,
        product: &BillingProduct,
        key: &str,
        definition: &PriceDefinition,
        replacing: bool,
    ) -> Result<RemotePrice> {
        let features = definition.stripe.clone().unwrap_or_default();
        let request = NewPrice {
            product_id: product.provider_id.clone(),
            amount: definition.amount,
            currency: definition.currency.clone(),
            recurring: definition.recurring.clone(),
            nickname: definition.nickname.clone(),
            metadata: params::creation_metadata(definition.metadata.as_ref(), key),
            trial_period_days: definition.trial_period_days,
            tax_behavior: features.tax_behavior,
            lookup_key: features.lookup_key,
            transfer_lookup_key: replacing,
        };

        let remote = self
            .retry
            .run("create price", || self.provider.prices().create(&request))
            .await?;
        info!("Created price '{}/{key}' ({})", product.key, remote.id);
        Ok(remote)
    }

    async fn record(
        &self,
        product: &BillingProduct,
        key: &str,
        remote: &RemotePrice,
        definition: &PriceDefinition,
    ) -> Result<BillingPrice> {
        self.store
            .create_price(BillingPrice::new(product.id, key, &remote.id, definition))
            .await
    }

    /// Deactivates one price on the provider, then locally.
    ///
    /// # Errors
    ///
    /// Returns an error if the provider call or store write fails.
    pub async fn archive(&self, price: &BillingPrice) -> Result<BillingPrice> {
        let provider_id = price.provider_id.as_str();
        self.retry
            .run("archive price", || self.provider.prices().archive(provider_id))
            .await?;
        warn!("Archived price '{}' ({provider_id})", price.key);
        self.store.deactivate_price(price.id).await
    }

    /// Archives every active price of `product` whose key is not in `keep`.
    ///
    /// # Errors
    ///
    /// Returns the first failure; earlier archivals stay committed.
    pub async fn archive_removed(
        &self,
        product: &BillingProduct,
        keep: &BTreeSet<String>,
    ) -> Result<Vec<BillingPrice>> {
        let removed = self.store.active_prices_excluding(product.id, keep).await?;
        let mut archived = Vec::with_capacity(removed.len());
        for price in &removed {
            archived.push(self.archive(price).await?);
        }
        Ok(archived)
    }
}
