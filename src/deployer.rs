//! Deployment entry point.
//!
//! The deployer validates the catalog, runs the pipeline in the requested
//! mode and turns live failures into [`DeployError::Failed`].

use tracing::{error, info, warn};

use crate::codegen::CodeGenerator;
use crate::config::{BillingConfig, ConfigHasher, ConfigValidator};
use crate::error::{BillingError, ConfigError, DeployError, Result};
use crate::pipeline::{ChangeSet, DeployContext, Pipeline};
use crate::provider::{ProviderClient, ProviderKind};
use crate::resolver::StrategyPrompt;
use crate::services::RetryPolicy;
use crate::store::CatalogStore;

/// Options for one deployment.
#[derive(Debug, Clone, Copy, Default)]
pub struct DeployOptions {
    /// Detect only; no provider or store writes.
    pub dry_run: bool,
}

/// Deploys a catalog to a provider.
pub struct Deployer<'a> {
    config: &'a BillingConfig,
    provider: &'a dyn ProviderClient,
    store: &'a dyn CatalogStore,
    prompt: &'a dyn StrategyPrompt,
    codegen: Option<&'a dyn CodeGenerator>,
}

impl<'a> Deployer<'a> {
    /// Creates a deployer.
    #[must_use]
    pub fn new(
        config: &'a BillingConfig,
        provider: &'a dyn ProviderClient,
        store: &'a dyn CatalogStore,
        prompt: &'a dyn StrategyPrompt,
    ) -> Self {
        Self {
            config,
            provider,
            store,
            prompt,
            codegen: None,
        }
    }

    /// Runs `generator` after live deployments.
    #[must_use]
    pub fn with_codegen(mut self, generator: &'a dyn CodeGenerator) -> Self {
        self.codegen = Some(generator);
        self
    }

    /// Deploys the catalog.
    ///
    /// # Errors
    ///
    /// Returns a configuration error before any stage runs if the catalog is
    /// invalid or names a different provider. During a live run every
    /// failure other than a cancellation is wrapped in
    /// [`DeployError::Failed`].
    pub async fn deploy(&self, options: DeployOptions) -> Result<ChangeSet> {
        self.check_config()?;

        let context = DeployContext::new(self.config, options.dry_run);
        info!(
            "Deploying {} products ({}){}",
            context.definitions.len(),
            ConfigHasher::short(&context.config_hash),
            if options.dry_run { " [dry run]" } else { "" }
        );

        let retry = RetryPolicy::from_settings(&self.config.provider);
        let mut pipeline = Pipeline::new(self.provider, self.store, retry, self.prompt);
        if let Some(generator) = self.codegen {
            pipeline = pipeline.with_codegen(generator);
        }

        match pipeline.run(context).await {
            Ok(changes) => {
                let summary = changes.summary();
                info!(
                    "Deployment finished: {} product and {} price changes",
                    summary.products.pending(),
                    summary.prices.pending()
                );
                Ok(changes)
            }
            Err(e) if e.is_cancellation() => {
                warn!("{e}");
                Err(e)
            }
            Err(e) if options.dry_run => Err(e),
            Err(e) => {
                error!("Live deployment failed: {e}");
                Err(e.into_deploy_failure())
            }
        }
    }

    fn check_config(&self) -> Result<()> {
        let result = ConfigValidator::new().validate(self.config)?;
        for warning in &result.warnings {
            warn!("{warning}");
        }

        let configured: ProviderKind = self.config.provider.name.parse()?;
        if configured != self.provider.kind() {
            return Err(BillingError::Config(ConfigError::validation(
                format!(
                    "configuration targets '{configured}' but the client is '{}'",
                    self.provider.kind()
                ),
                "provider.name",
            )));
        }
        Ok(())
    }
}

/// Returns true if `error` came from a live run that may have partially applied.
#[must_use]
pub const fn is_partial_failure(error: &BillingError) -> bool {
    matches!(error, BillingError::Deploy(DeployError::Failed { .. }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigParser;
    use crate::error::ProviderError;
    use crate::pipeline::ChangeType;
    use crate::provider::memory::{MemoryProvider, ops};
    use crate::resolver::FixedStrategy;
    use crate::store::LocalCatalogStore;

    const CATALOG: &str = r"
provider:
  max_retries: 0
products:
  pro:
    name: Pro
    prices:
      monthly:
        amount: 999
        currency: eur
        recurring:
          interval: month
";

    fn config(yaml: &str) -> BillingConfig {
        ConfigParser::new().parse_yaml(yaml, None).unwrap()
    }

    #[tokio::test]
    async fn test_deploy_live() {
        let config = config(CATALOG);
        let provider = MemoryProvider::new();
        let store = LocalCatalogStore::in_memory();
        let prompt = FixedStrategy::default();

        let changes = Deployer::new(&config, &provider, &store, &prompt)
            .deploy(DeployOptions::default())
            .await
            .unwrap();

        assert!(!changes.is_dry_run());
        assert_eq!(changes.product("pro").unwrap().change_type, ChangeType::Created);
        assert_eq!(provider.remote_prices().len(), 1);
    }

    #[tokio::test]
    async fn test_invalid_config_fails_before_any_call() {
        let config = config(&CATALOG.replace("amount: 999", "amount: -1"));
        let provider = MemoryProvider::new();
        let store = LocalCatalogStore::in_memory();
        let prompt = FixedStrategy::default();

        let err = Deployer::new(&config, &provider, &store, &prompt)
            .deploy(DeployOptions::default())
            .await
            .unwrap_err();

        assert!(matches!(err, BillingError::Config(ConfigError::ValidationError { .. })));
        assert_eq!(provider.calls(), 0);
    }

    #[tokio::test]
    async fn test_unknown_provider_is_config_error() {
        let config = config(&CATALOG.replace("max_retries: 0", "name: paddle"));
        let provider = MemoryProvider::new();
        let store = LocalCatalogStore::in_memory();
        let prompt = FixedStrategy::default();

        let err = Deployer::new(&config, &provider, &store, &prompt)
            .deploy(DeployOptions::default())
            .await
            .unwrap_err();

        assert!(matches!(err, BillingError::Config(ConfigError::UnknownProvider { .. })));
    }

    #[tokio::test]
    async fn test_live_failure_is_wrapped() {
        let config = config(CATALOG);
        let provider = MemoryProvider::new();
        let store = LocalCatalogStore::in_memory();
        let prompt = FixedStrategy::default();
        provider.fail_next(ops::CREATE_PRODUCT, ProviderError::connection("reset by peer"));

        let err = Deployer::new(&config, &provider, &store, &prompt)
            .deploy(DeployOptions::default())
            .await
            .unwrap_err();

        assert!(is_partial_failure(&err));
        assert!(err.to_string().contains("--dry-run"));
    }

    #[tokio::test]
    async fn test_dry_run_is_not_wrapped() {
        let config = config(CATALOG);
        let provider = MemoryProvider::new();
        let store = LocalCatalogStore::in_memory();
        let prompt = FixedStrategy::default();

        let changes = Deployer::new(&config, &provider, &store, &prompt)
            .deploy(DeployOptions { dry_run: true })
            .await
            .unwrap();

        assert!(changes.is_dry_run());
        assert_eq!(provider.calls(), 0);
        assert!(store.snapshot().await.unwrap().products.is_empty());
    }
}
