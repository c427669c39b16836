//! The deployment pipeline.
//!
//! A run threads one [`DeployContext`] through the fixed [`Stage`] order.
//! Products are always processed before prices so every price has a
//! provider product to attach to, and orphans are archived only after the
//! configured catalog is in place.

mod changes;
mod context;
mod stages;

use tracing::info;

use crate::codegen::CodeGenerator;
use crate::error::Result;
use crate::provider::ProviderClient;
use crate::resolver::{StrategyPrompt, StrategyResolver};
use crate::services::{PriceService, ProductService, RetryPolicy};
use crate::store::CatalogStore;

pub use changes::{ChangeCounts, ChangeSet, ChangeSummary, ChangeType, PriceChange, ProductChange};
pub use context::DeployContext;
pub use stages::Stage;

/// Runs the deployment stages against one provider and store.
pub struct Pipeline<'a> {
    store: &'a dyn CatalogStore,
    products: ProductService<'a>,
    prices: PriceService<'a>,
    resolver: StrategyResolver<'a>,
    codegen: Option<&'a dyn CodeGenerator>,
}

impl<'a> Pipeline<'a> {
    /// Creates a pipeline.
    #[must_use]
    pub fn new(
        provider: &'a dyn ProviderClient,
        store: &'a dyn CatalogStore,
        retry: RetryPolicy,
        prompt: &'a dyn StrategyPrompt,
    ) -> Self {
        Self {
            store,
            products: ProductService::new(provider, store, retry),
            prices: PriceService::new(provider, store, retry),
            resolver: StrategyResolver::new(prompt),
            codegen: None,
        }
    }

    /// Runs `generator` after a live deployment.
    #[must_use]
    pub fn with_codegen(mut self, generator: &'a dyn CodeGenerator) -> Self {
        self.codegen = Some(generator);
        self
    }

    /// Runs every stage that applies to the context's mode.
    ///
    /// # Errors
    ///
    /// Returns the first stage failure. Provider calls made before the
    /// failure are not rolled back.
    pub async fn run(&self, context: DeployContext) -> Result<ChangeSet> {
        let dry_run = context.dry_run;
        let mut context = context;

        for stage in Stage::ALL {
            if !stage.runs_in(dry_run) {
                info!("Skipping {stage} (dry run)");
                continue;
            }
            info!("Running {stage}");
            context = self.run_stage(stage, context).await?;
        }

        Ok(context.into_change_set())
    }
}
