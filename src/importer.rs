//! Import of an existing provider catalog.
//!
//! Walks every active product and price on the provider and records the
//! ones the local store does not know yet, either in the store, in a YAML
//! catalog, or both.

use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::config::{
    Interval, Metadata, PriceDefinition, ProductDefinition, Recurring, StripePriceFeatures,
    StripeProductFeatures, TaxBehavior,
};
use crate::error::{ConfigError, Result};
use crate::provider::{
    BUSINESS_KEY_METADATA, ProviderClient, RemotePrice, RemoteProduct, all_prices, all_products,
};
use crate::resolver::suggest_key;
use crate::services::RetryPolicy;
use crate::store::{BillingPrice, BillingProduct, CatalogStore};

/// Default file name for a generated catalog.
pub const DEFAULT_IMPORT_FILE: &str = "billing.imported.yaml";

/// Import targets and verbosity.
#[derive(Debug, Clone, Default)]
pub struct ImportOptions {
    /// Write the store only.
    pub db_only: bool,
    /// Write a catalog to this path only.
    pub generate_config: Option<PathBuf>,
    /// Suppress per-record logging.
    pub quiet: bool,
}

impl ImportOptions {
    const fn writes_store(&self) -> bool {
        self.generate_config.is_none()
    }

    fn config_target(&self, default_path: &Path) -> Option<PathBuf> {
        if self.db_only {
            None
        } else {
            Some(
                self.generate_config
                    .clone()
                    .unwrap_or_else(|| default_path.to_path_buf()),
            )
        }
    }
}

/// One imported product.
#[derive(Debug, Clone, Serialize)]
pub struct ImportedProduct {
    /// Business key assigned to the product.
    pub key: String,
    /// Provider identifier.
    pub provider_id: String,
    /// Price keys mapped to provider identifiers.
    pub prices: BTreeMap<String, String>,
}

/// Outcome of an import.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ImportReport {
    /// Products imported in this run.
    pub products: Vec<ImportedProduct>,
    /// Remote objects skipped, with the reason.
    pub skipped: Vec<String>,
    /// Catalog file written, if any.
    pub config_path: Option<PathBuf>,
    /// Whether the store was written.
    pub stored: bool,
}

impl ImportReport {
    /// Number of imported prices.
    #[must_use]
    pub fn price_count(&self) -> usize {
        self.products.iter().map(|p| p.prices.len()).sum()
    }
}

/// The `products` section of a generated catalog.
#[derive(Debug, Serialize)]
struct ImportedCatalog<'a> {
    products: &'a BTreeMap<String, ProductDefinition>,
}

/// Imports a provider catalog.
pub struct Importer<'a> {
    provider: &'a dyn ProviderClient,
    store: &'a dyn CatalogStore,
    retry: RetryPolicy,
}

impl<'a> Importer<'a> {
    /// Creates an importer.
    #[must_use]
    pub const fn new(provider: &'a dyn ProviderClient, store: &'a dyn CatalogStore, retry: RetryPolicy) -> Self {
        Self {
            provider,
            store,
            retry,
        }
    }

    /// Runs the import.
    ///
    /// `default_path` is where the catalog goes when neither target flag is set.
    ///
    /// # Errors
    ///
    /// Returns an error if listing fails, a store write fails, or the
    /// catalog cannot be written.
    pub async fn run(&self, options: &ImportOptions, default_path: &Path) -> Result<ImportReport> {
        let mut report = ImportReport::default();
        let known = self.store.snapshot().await?;
        let known_ids: BTreeSet<&str> = known.products.iter().map(|p| p.provider_id.as_str()).collect();
        let mut taken: BTreeSet<String> = known.products.iter().map(|p| p.key.clone()).collect();
        let mut catalog = BTreeMap::new();

        let remote = self
            .retry
            .run("list products", || all_products(self.provider.products()).collect_all())
            .await?;
        info!("Found {} products on the provider", remote.len());

        for product in remote {
            if !product.active {
                debug!("Ignoring archived product {}", product.id);
                continue;
            }
            let key = product_key(&product);
            if known_ids.contains(product.id.as_str()) || taken.contains(&key) {
                report
                    .skipped
                    .push(format!("product '{key}' ({}) already tracked", product.id));
                continue;
            }

            let prices = self
                .retry
                .run("list prices", || {
                    all_prices(self.provider.prices(), &product.id).collect_all()
                })
                .await?;
            let mut definition = product_definition(&product);
            let mut price_ids = Vec::new();
            for price in prices.into_iter().filter(|p| p.active) {
                let Some(price_definition) = price_definition(&price) else {
                    report
                        .skipped
                        .push(format!("price {} of '{key}' has no unit amount", price.id));
                    continue;
                };
                let price_key = price_key(&price, &definition.prices);
                price_ids.push((price_key.clone(), price.id.clone()));
                definition.prices.insert(price_key, price_definition);
            }

            if options.writes_store() {
                self.store_product(&key, &product.id, &definition, &price_ids).await?;
            }
            if !options.quiet {
                info!(
                    "Imported product '{key}' ({}) with {} prices",
                    product.id,
                    price_ids.len()
                );
            }

            report.products.push(ImportedProduct {
                key: key.clone(),
                provider_id: product.id.clone(),
                prices: price_ids.into_iter().collect(),
            });
            taken.insert(key.clone());
            catalog.insert(key, definition);
        }

        report.stored = options.writes_store();
        if let Some(path) = options.config_target(default_path) {
            write_catalog(&path, &catalog)?;
            report.config_path = Some(path);
        }

        for reason in &report.skipped {
            warn!("Skipped {reason}");
        }
        Ok(report)
    }

    async fn store_product(
        &self,
        key: &str,
        provider_id: &str,
        definition: &ProductDefinition,
        prices: &[(String, String)],
    ) -> Result<()> {
        let product = self
            .store
            .create_product(BillingProduct::new(key, provider_id, definition))
            .await?;
        for (price_key, price_id) in prices {
            if let Some(price) = definition.prices.get(price_key) {
                self.store
                    .create_price(BillingPrice::new(product.id, price_key, price_id, price))
                    .await?;
            }
        }
        Ok(())
    }
}

fn product_key(product: &RemoteProduct) -> String {
    product
        .metadata
        .get(BUSINESS_KEY_METADATA)
        .cloned()
        .unwrap_or_else(|| product.id.clone())
}

fn price_key(price: &RemotePrice, taken: &BTreeMap<String, PriceDefinition>) -> String {
    let base = price
        .metadata
        .get(BUSINESS_KEY_METADATA)
        .cloned()
        .or_else(|| price.lookup_key.clone())
        .or_else(|| price.nickname.as_deref().map(slugify))
        .filter(|k| !k.is_empty())
        .unwrap_or_else(|| String::from("default"));

    if taken.contains_key(&base) {
        let keys: BTreeSet<String> = taken.keys().cloned().collect();
        suggest_key(&base, &keys)
    } else {
        base
    }
}

fn slugify(value: &str) -> String {
    let mut slug = String::with_capacity(value.len());
    for c in value.trim().chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
        } else if !slug.ends_with('_') {
            slug.push('_');
        }
    }
    slug.trim_matches('_').to_string()
}

fn user_metadata(metadata: &Metadata) -> Option<Metadata> {
    let filtered: Metadata = metadata
        .iter()
        .filter(|(k, _)| k.as_str() != BUSINESS_KEY_METADATA)
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();
    (!filtered.is_empty()).then_some(filtered)
}

fn product_definition(product: &RemoteProduct) -> ProductDefinition {
    let features = StripeProductFeatures {
        tax_code: product.tax_code.clone(),
        statement_descriptor: product.statement_descriptor.clone(),
    };
    ProductDefinition {
        name: product.name.clone(),
        description: product.description.clone().filter(|d| !d.is_empty()),
        metadata: user_metadata(&product.metadata),
        stripe: (!features.is_empty()).then_some(features),
        prices: BTreeMap::new(),
    }
}

fn price_definition(price: &RemotePrice) -> Option<PriceDefinition> {
    let amount = price.unit_amount?;
    let recurring = price.recurring.as_ref().and_then(|r| {
        parse_interval(&r.interval).map(|interval| Recurring {
            interval,
            interval_count: r.interval_count,
        })
    });
    let features = StripePriceFeatures {
        tax_behavior: price.tax_behavior.as_deref().and_then(parse_tax_behavior),
        lookup_key: price.lookup_key.clone(),
    };

    Some(PriceDefinition {
        amount,
        currency: price.currency.to_ascii_lowercase(),
        recurring,
        nickname: price.nickname.clone(),
        metadata: user_metadata(&price.metadata),
        trial_period_days: price.recurring.as_ref().and_then(|r| r.trial_period_days),
        stripe: (!features.is_empty()).then_some(features),
    })
}

fn parse_interval(value: &str) -> Option<Interval> {
    match value {
        "day" => Some(Interval::Day),
        "week" => Some(Interval::Week),
        "month" => Some(Interval::Month),
        "year" => Some(Interval::Year),
        _ => None,
    }
}

fn parse_tax_behavior(value: &str) -> Option<TaxBehavior> {
    match value {
        "exclusive" => Some(TaxBehavior::Exclusive),
        "inclusive" => Some(TaxBehavior::Inclusive),
        "unspecified" => Some(TaxBehavior::Unspecified),
        _ => None,
    }
}

fn write_catalog(path: &Path, products: &BTreeMap<String, ProductDefinition>) -> Result<()> {
    let content = serde_yaml::to_string(&ImportedCatalog { products }).map_err(|e| ConfigError::ParseError {
        message: format!("Failed to serialize catalog: {e}"),
        location: Some(path.display().to_string()),
    })?;

    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, content)?;
    info!("Wrote {} products to {}", products.len(), path.display());
    Ok(())
}
