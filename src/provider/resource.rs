//! Provider resource contracts.
//!
//! The reconciliation core talks to a billing provider only through these
//! traits. Every call is a single attempt; retrying is the caller's concern.

use async_trait::async_trait;

use crate::error::Result;

use super::registry::ProviderKind;
use super::types::{NewPrice, NewProduct, Page, RemotePrice, RemoteProduct, UpdateParams};

/// Product operations on the provider.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ProductResource: Send + Sync {
    /// Creates a product and returns the provider object.
    async fn create(&self, product: &NewProduct) -> Result<RemoteProduct>;

    /// Fetches a product by provider id.
    async fn retrieve(&self, id: &str) -> Result<RemoteProduct>;

    /// Applies an in-place update.
    async fn update(&self, id: &str, params: &UpdateParams) -> Result<RemoteProduct>;

    /// Deactivates a product.
    async fn archive(&self, id: &str) -> Result<RemoteProduct>;

    /// Fetches one page of products after the given cursor.
    async fn list_page(&self, starting_after: Option<String>) -> Result<Page<RemoteProduct>>;
}

/// Price operations on the provider.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PriceResource: Send + Sync {
    /// Creates a price and returns the provider object.
    async fn create(&self, price: &NewPrice) -> Result<RemotePrice>;

    /// Applies an in-place update to the mutable fields of a price.
    async fn update(&self, id: &str, params: &UpdateParams) -> Result<RemotePrice>;

    /// Deactivates a price.
    async fn archive(&self, id: &str) -> Result<RemotePrice>;

    /// Fetches one page of a product's prices after the given cursor.
    async fn list_page_for_product(
        &self,
        product_id: &str,
        starting_after: Option<String>,
    ) -> Result<Page<RemotePrice>>;
}

/// Entry point to a billing provider.
pub trait ProviderClient: Send + Sync {
    /// Which provider this client talks to.
    fn kind(&self) -> ProviderKind;

    /// Product resource.
    fn products(&self) -> &dyn ProductResource;

    /// Price resource.
    fn prices(&self) -> &dyn PriceResource;
}
