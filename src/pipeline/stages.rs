//! The ordered pipeline stages.
//!
//! Detect stages only read the local store. Process stages call the
//! provider and are the only stages skipped in a dry run.

use std::collections::BTreeSet;
use std::fmt;
use tracing::{debug, info};

use crate::error::{BillingError, Result};
use crate::resolver::Resolution;
use crate::store::{BillingPrice, BillingProduct};

use super::Pipeline;
use super::changes::{ChangeType, PriceChange, ProductChange};
use super::context::DeployContext;

/// A pipeline position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Compare product definitions with the store.
    DetectProducts,
    /// Create or update products on the provider.
    ProcessProducts,
    /// Compare price definitions with the store.
    DetectPrices,
    /// Create, update or replace prices on the provider.
    ProcessPrices,
    /// Find active resources that are no longer configured.
    DetectOrphans,
    /// Archive those resources.
    ProcessOrphans,
    /// Run code generators on the final key set.
    PostDeploy,
}

impl Stage {
    /// Every stage in execution order.
    pub const ALL: [Self; 7] = [
        Self::DetectProducts,
        Self::ProcessProducts,
        Self::DetectPrices,
        Self::ProcessPrices,
        Self::DetectOrphans,
        Self::ProcessOrphans,
        Self::PostDeploy,
    ];

    /// Stage name for logs.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::DetectProducts => "detect product changes",
            Self::ProcessProducts => "process product changes",
            Self::DetectPrices => "detect price changes",
            Self::ProcessPrices => "process price changes",
            Self::DetectOrphans => "detect orphaned resources",
            Self::ProcessOrphans => "archive orphaned resources",
            Self::PostDeploy => "post-deploy generation",
        }
    }

    /// Returns true for stages with side effects.
    #[must_use]
    pub const fn is_side_effecting(self) -> bool {
        matches!(
            self,
            Self::ProcessProducts | Self::ProcessPrices | Self::ProcessOrphans | Self::PostDeploy
        )
    }

    /// Returns true if the stage runs in the given mode.
    #[must_use]
    pub const fn runs_in(self, dry_run: bool) -> bool {
        !dry_run || !self.is_side_effecting()
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl Pipeline<'_> {
    /// Runs one stage, consuming and returning the context.
    pub(super) async fn run_stage(&self, stage: Stage, context: DeployContext) -> Result<DeployContext> {
        match stage {
            Stage::DetectProducts => self.detect_products(context).await,
            Stage::ProcessProducts => self.process_products(context).await,
            Stage::DetectPrices => self.detect_prices(context).await,
            Stage::ProcessPrices => self.process_prices(context).await,
            Stage::DetectOrphans => self.detect_orphans(context).await,
            Stage::ProcessOrphans => self.process_orphans(context).await,
            Stage::PostDeploy => self.post_deploy(context).await,
        }
    }

    async fn detect_products(&self, mut ctx: DeployContext) -> Result<DeployContext> {
        let detector = self.products.detector();

        for (key, definition) in &ctx.definitions {
            let change = match self.store.find_product(key).await? {
                None => ProductChange::created(key, definition),
                Some(existing) => {
                    let changes = detector.product_changes(&existing, definition);
                    ProductChange::compared(key, definition, existing, changes)
                }
            };
            debug!("Product '{key}': {}", change.change_type);
            ctx.products.push(change);
        }

        Ok(ctx)
    }

    async fn process_products(&self, mut ctx: DeployContext) -> Result<DeployContext> {
        for change in &mut ctx.products {
            if !matches!(change.change_type, ChangeType::Created | ChangeType::Updated) {
                continue;
            }
            let Some(definition) = change.definition.as_ref() else {
                continue;
            };

            let outcome = self.products.sync(&change.key, definition).await?;
            change.change_type = outcome.action;
            change.after = Some(outcome.resource);
            change.changes = outcome.changes;
        }

        Ok(ctx)
    }

    async fn detect_prices(&self, mut ctx: DeployContext) -> Result<DeployContext> {
        let detector = self.prices.detector();
        let immutable = self.prices.immutable_fields();

        for product in &ctx.products {
            if product.change_type == ChangeType::Archived {
                continue;
            }
            let Some(definition) = product.definition.as_ref() else {
                continue;
            };
            let record = product.current();

            if let Some(record) = record {
                let configured: BTreeSet<String> = definition.prices.keys().cloned().collect();
                let duplicates = self.prices.duplicate_keys(record.id, &configured).await?;
                if !duplicates.is_empty() {
                    debug!("Product '{}' keeps duplicates {duplicates:?}", product.key);
                    ctx.duplicates.insert(product.key.clone(), duplicates);
                }
            }

            for (key, price) in &definition.prices {
                let existing = match record {
                    Some(record) => self.prices.current_price(record.id, key).await?,
                    None => None,
                };
                let change = match existing {
                    None => PriceChange::created(&product.key, key, price),
                    Some(existing) => {
                        let changes = detector.price_changes(&existing, price);
                        let immutable_fields = immutable.filter_immutable(&changes).into_keys().collect();
                        PriceChange::compared(&product.key, price, existing, changes, immutable_fields)
                    }
                };
                debug!("Price '{}/{key}': {}", product.key, change.change_type);
                ctx.prices.push(change);
            }
        }

        Ok(ctx)
    }

    async fn process_prices(&self, mut ctx: DeployContext) -> Result<DeployContext> {
        let DeployContext {
            definitions,
            products,
            prices,
            ..
        } = &mut ctx;

        for change in prices.iter_mut() {
            if !matches!(change.change_type, ChangeType::Created | ChangeType::Updated) {
                continue;
            }
            let Some(definition) = change.definition.clone() else {
                continue;
            };
            let product = products
                .iter()
                .find(|p| p.key == change.product_key)
                .and_then(ProductChange::current)
                .cloned()
                .ok_or_else(|| {
                    BillingError::internal(format!(
                        "product '{}' has no record after processing",
                        change.product_key
                    ))
                })?;

            let resolution = if change.has_immutable_changes() {
                let mut taken: BTreeSet<String> = self
                    .store
                    .active_prices(product.id)
                    .await?
                    .into_iter()
                    .map(|p| p.key)
                    .collect();
                if let Some(configured) = definitions.get(&change.product_key) {
                    taken.extend(configured.prices.keys().cloned());
                }

                let resolution = self.resolver.resolve(change, &taken)?;
                change.strategy = Some(resolution.strategy());
                if let Resolution::Duplicate { key } = &resolution {
                    change.duplicate_key = Some(key.clone());
                }
                Some(resolution)
            } else {
                None
            };

            let outcome = self
                .prices
                .sync(&product, &change.key, &definition, resolution.as_ref())
                .await?;
            change.change_type = outcome.action;
            change.after = Some(outcome.resource);
            change.changes = outcome.changes;
        }

        Ok(ctx)
    }

    async fn detect_orphans(&self, mut ctx: DeployContext) -> Result<DeployContext> {
        let mut orphan_prices = Vec::new();
        let mut orphan_products = Vec::new();

        for product in &ctx.products {
            let Some(record) = product.current() else {
                continue;
            };
            let keep = ctx.retained_price_keys(&product.key);
            for price in self.store.active_prices_excluding(record.id, &keep).await? {
                orphan_prices.push(PriceChange::archived(&product.key, price));
            }
        }

        for product in self.store.active_products_excluding(&ctx.product_keys()).await? {
            for price in self.store.active_prices(product.id).await? {
                orphan_prices.push(PriceChange::archived(&product.key, price));
            }
            orphan_products.push(ProductChange::archived(product));
        }

        if !orphan_products.is_empty() || !orphan_prices.is_empty() {
            info!(
                "Found {} orphaned products and {} orphaned prices",
                orphan_products.len(),
                orphan_prices.len()
            );
        }
        ctx.prices.extend(orphan_prices);
        ctx.products.extend(orphan_products);
        Ok(ctx)
    }

    async fn process_orphans(&self, mut ctx: DeployContext) -> Result<DeployContext> {
        let configured: Vec<(BillingProduct, BTreeSet<String>)> = ctx
            .products
            .iter()
            .filter(|c| c.change_type != ChangeType::Archived)
            .filter_map(|c| c.current().map(|r| (r.clone(), ctx.retained_price_keys(&c.key))))
            .collect();
        for (product, keep) in &configured {
            let archived = self.prices.archive_removed(product, keep).await?;
            record_archived_prices(&mut ctx.prices, &product.key, archived);
        }

        let removed: Vec<BillingProduct> = ctx
            .products
            .iter()
            .filter(|c| c.change_type == ChangeType::Archived)
            .filter_map(|c| c.before.clone())
            .collect();
        for product in &removed {
            let archived = self.prices.archive_removed(product, &BTreeSet::new()).await?;
            record_archived_prices(&mut ctx.prices, &product.key, archived);
        }

        for product in self.products.archive_removed(&ctx.product_keys()).await? {
            match ctx
                .products
                .iter_mut()
                .find(|c| c.change_type == ChangeType::Archived && c.key == product.key)
            {
                Some(change) => change.after = Some(product),
                None => {
                    let mut change = ProductChange::archived(product.clone());
                    change.after = Some(product);
                    ctx.products.push(change);
                }
            }
        }

        Ok(ctx)
    }

    async fn post_deploy(&self, ctx: DeployContext) -> Result<DeployContext> {
        let Some(codegen) = self.codegen else {
            debug!("No code generator configured");
            return Ok(ctx);
        };

        let keys = self.store.active_keys().await?;
        codegen.generate(&keys).await?;
        info!("Code generator '{}' ran on {} products", codegen.name(), keys.len());
        Ok(ctx)
    }
}

/// Stores archival results on the matching change records.
fn record_archived_prices(changes: &mut Vec<PriceChange>, product_key: &str, archived: Vec<BillingPrice>) {
    for price in archived {
        match changes
            .iter_mut()
            .find(|c| c.change_type == ChangeType::Archived && c.before.as_ref().is_some_and(|b| b.id == price.id))
        {
            Some(change) => change.after = Some(price),
            None => {
                let mut change = PriceChange::archived(product_key, price.clone());
                change.after = Some(price);
                changes.push(change);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dry_run_skips_only_side_effects() {
        let detect: Vec<_> = Stage::ALL.iter().filter(|s| s.runs_in(true)).collect();
        assert_eq!(
            detect,
            [&Stage::DetectProducts, &Stage::DetectPrices, &Stage::DetectOrphans]
        );
        assert!(Stage::ALL.iter().all(|s| s.runs_in(false)));
    }

    #[test]
    fn test_products_precede_prices() {
        let position = |stage| Stage::ALL.iter().position(|s| *s == stage);
        assert!(position(Stage::ProcessProducts) < position(Stage::DetectPrices));
        assert!(position(Stage::ProcessPrices) < position(Stage::DetectOrphans));
        assert_eq!(position(Stage::PostDeploy), Some(6));
    }
}
