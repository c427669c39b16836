//! In-memory provider used by pipeline and service tests.
//!
//! Behaves like Stripe for the fields the reconciliation core touches:
//! ids are generated, archive flips `active`, updates merge metadata and
//! treat `null` as unset. Every call is counted so tests can assert that a
//! no-op deployment never talks to the provider.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::config::Metadata;
use crate::error::{BillingError, ProviderError, Result};

use super::registry::ProviderKind;
use super::resource::{PriceResource, ProductResource, ProviderClient};
use super::types::{
    NewPrice, NewProduct, Page, RemotePrice, RemoteProduct, RemoteRecurring, UpdateParams,
};

/// Operation names accepted by [`MemoryProvider::fail_next`].
pub mod ops {
    /// Product creation.
    pub const CREATE_PRODUCT: &str = "product.create";
    /// Product update.
    pub const UPDATE_PRODUCT: &str = "product.update";
    /// Product archive.
    pub const ARCHIVE_PRODUCT: &str = "product.archive";
    /// Price creation.
    pub const CREATE_PRICE: &str = "price.create";
    /// Price update.
    pub const UPDATE_PRICE: &str = "price.update";
    /// Price archive.
    pub const ARCHIVE_PRICE: &str = "price.archive";
}

#[derive(Default)]
struct Inner {
    products: Vec<RemoteProduct>,
    prices: Vec<RemotePrice>,
    failures: VecDeque<(&'static str, ProviderError)>,
    next_id: usize,
}

/// Stripe-like provider held in memory.
#[derive(Default)]
pub struct MemoryProvider {
    inner: Mutex<Inner>,
    calls: AtomicUsize,
    page_size: usize,
}

impl MemoryProvider {
    /// Creates an empty provider serving two items per page.
    pub fn new() -> Self {
        Self {
            page_size: 2,
            ..Self::default()
        }
    }

    /// Total calls made, listings included.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Queues a failure for the next call of the given operation.
    pub fn fail_next(&self, op: &'static str, error: ProviderError) {
        self.lock().failures.push_back((op, error));
    }

    /// Snapshot of every product.
    pub fn remote_products(&self) -> Vec<RemoteProduct> {
        self.lock().products.clone()
    }

    /// Snapshot of every price.
    pub fn remote_prices(&self) -> Vec<RemotePrice> {
        self.lock().prices.clone()
    }

    /// Seeds a product directly, bypassing the call counter.
    pub fn seed_product(&self, product: RemoteProduct) {
        self.lock().products.push(product);
    }

    /// Seeds a price directly, bypassing the call counter.
    pub fn seed_price(&self, price: RemotePrice) {
        self.lock().prices.push(price);
    }

    #[allow(clippy::unwrap_used)]
    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap()
    }

    fn begin(&self, op: &'static str) -> Result<std::sync::MutexGuard<'_, Inner>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut inner = self.lock();
        if inner.failures.front().is_some_and(|(queued, _)| *queued == op)
            && let Some((_, error)) = inner.failures.pop_front()
        {
            return Err(error.into());
        }
        Ok(inner)
    }

    fn page<T: Clone>(&self, items: &[T], starting_after: Option<&str>, id: impl Fn(&T) -> &str) -> Page<T> {
        let start = starting_after
            .and_then(|cursor| items.iter().position(|item| id(item) == cursor))
            .map_or(0, |pos| pos + 1);
        let data: Vec<T> = items.iter().skip(start).take(self.page_size).cloned().collect();
        Page {
            has_more: start + data.len() < items.len(),
            data,
        }
    }
}

fn not_found(kind: &str, id: &str) -> BillingError {
    ProviderError::InvalidRequest {
        message: format!("No such {kind}: '{id}'"),
        param: Some(String::from("id")),
    }
    .into()
}

fn string_param(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        _ => None,
    }
}

fn merge_metadata(metadata: &mut Metadata, patch: &Value) {
    match patch {
        Value::Object(map) if !map.is_empty() => {
            for (key, value) in map {
                match string_param(value) {
                    Some(v) => {
                        metadata.insert(key.clone(), v);
                    }
                    None => {
                        metadata.remove(key);
                    }
                }
            }
        }
        _ => metadata.clear(),
    }
}

#[async_trait]
impl ProductResource for MemoryProvider {
    async fn create(&self, product: &NewProduct) -> Result<RemoteProduct> {
        let mut inner = self.begin(ops::CREATE_PRODUCT)?;
        inner.next_id += 1;
        let created = RemoteProduct {
            id: format!("prod_{}", inner.next_id),
            name: product.name.clone(),
            description: product.description.clone(),
            active: true,
            metadata: product.metadata.clone(),
            tax_code: product.tax_code.clone(),
            statement_descriptor: product.statement_descriptor.clone(),
        };
        inner.products.push(created.clone());
        Ok(created)
    }

    async fn retrieve(&self, id: &str) -> Result<RemoteProduct> {
        let inner = self.begin("product.retrieve")?;
        inner
            .products
            .iter()
            .find(|p| p.id == id)
            .cloned()
            .ok_or_else(|| not_found("product", id))
    }

    async fn update(&self, id: &str, params: &UpdateParams) -> Result<RemoteProduct> {
        let mut inner = self.begin(ops::UPDATE_PRODUCT)?;
        let product = inner
            .products
            .iter_mut()
            .find(|p| p.id == id)
            .ok_or_else(|| not_found("product", id))?;
        for (field, value) in params {
            match field.as_str() {
                "name" => product.name = string_param(value).unwrap_or_default(),
                "description" => product.description = string_param(value),
                "metadata" => merge_metadata(&mut product.metadata, value),
                "tax_code" => product.tax_code = string_param(value),
                "statement_descriptor" => product.statement_descriptor = string_param(value),
                "active" => product.active = value.as_bool().unwrap_or(true),
                other => {
                    return Err(ProviderError::InvalidRequest {
                        message: format!("Received unknown parameter: {other}"),
                        param: Some(other.to_string()),
                    }
                    .into());
                }
            }
        }
        Ok(product.clone())
    }

    async fn archive(&self, id: &str) -> Result<RemoteProduct> {
        let mut inner = self.begin(ops::ARCHIVE_PRODUCT)?;
        let product = inner
            .products
            .iter_mut()
            .find(|p| p.id == id)
            .ok_or_else(|| not_found("product", id))?;
        product.active = false;
        Ok(product.clone())
    }

    async fn list_page(&self, starting_after: Option<String>) -> Result<Page<RemoteProduct>> {
        let inner = self.begin("product.list")?;
        Ok(self.page(&inner.products, starting_after.as_deref(), |p| p.id.as_str()))
    }
}

#[async_trait]
impl PriceResource for MemoryProvider {
    async fn create(&self, price: &NewPrice) -> Result<RemotePrice> {
        let mut inner = self.begin(ops::CREATE_PRICE)?;
        if !inner.products.iter().any(|p| p.id == price.product_id) {
            return Err(not_found("product", &price.product_id));
        }
        if price.transfer_lookup_key
            && let Some(lookup_key) = &price.lookup_key
        {
            for other in &mut inner.prices {
                if other.lookup_key.as_ref() == Some(lookup_key) {
                    other.lookup_key = None;
                }
            }
        }
        inner.next_id += 1;
        let created = RemotePrice {
            id: format!("price_{}", inner.next_id),
            product: price.product_id.clone(),
            unit_amount: Some(price.amount),
            currency: price.currency.clone(),
            recurring: price.recurring.as_ref().map(|r| RemoteRecurring {
                interval: r.interval.as_str().to_string(),
                interval_count: r.interval_count,
                trial_period_days: price.trial_period_days,
            }),
            nickname: price.nickname.clone(),
            active: true,
            metadata: price.metadata.clone(),
            lookup_key: price.lookup_key.clone(),
            tax_behavior: price.tax_behavior.map(|b| b.as_str().to_string()),
        };
        inner.prices.push(created.clone());
        Ok(created)
    }

    async fn update(&self, id: &str, params: &UpdateParams) -> Result<RemotePrice> {
        let mut inner = self.begin(ops::UPDATE_PRICE)?;
        let price = inner
            .prices
            .iter_mut()
            .find(|p| p.id == id)
            .ok_or_else(|| not_found("price", id))?;
        for (field, value) in params {
            match field.as_str() {
                "nickname" => price.nickname = string_param(value),
                "metadata" => merge_metadata(&mut price.metadata, value),
                "lookup_key" => price.lookup_key = string_param(value),
                "tax_behavior" => price.tax_behavior = string_param(value),
                "active" => price.active = value.as_bool().unwrap_or(true),
                other => {
                    return Err(ProviderError::InvalidRequest {
                        message: format!("Received unknown parameter: {other}"),
                        param: Some(other.to_string()),
                    }
                    .into());
                }
            }
        }
        Ok(price.clone())
    }

    async fn archive(&self, id: &str) -> Result<RemotePrice> {
        let mut inner = self.begin(ops::ARCHIVE_PRICE)?;
        let price = inner
            .prices
            .iter_mut()
            .find(|p| p.id == id)
            .ok_or_else(|| not_found("price", id))?;
        price.active = false;
        Ok(price.clone())
    }

    async fn list_page_for_product(
        &self,
        product_id: &str,
        starting_after: Option<String>,
    ) -> Result<Page<RemotePrice>> {
        let inner = self.begin("price.list")?;
        let prices: Vec<RemotePrice> = inner
            .prices
            .iter()
            .filter(|p| p.product == product_id)
            .cloned()
            .collect();
        Ok(self.page(&prices, starting_after.as_deref(), |p| p.id.as_str()))
    }
}

impl ProviderClient for MemoryProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Stripe
    }

    fn products(&self) -> &dyn ProductResource {
        self
    }

    fn prices(&self) -> &dyn PriceResource {
        self
    }
}
