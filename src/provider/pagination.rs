//! Lazy cursor pagination over provider listings.
//!
//! A [`Paginator`] fetches pages only when its buffer runs dry. It cannot be
//! rewound; build a new one to restart from the first page.

use async_trait::async_trait;
use std::collections::VecDeque;
use tracing::debug;

use crate::error::Result;

use super::resource::{PriceResource, ProductResource};
use super::types::{Page, RemotePrice, RemoteProduct};

/// Something that serves cursor-addressed pages.
#[async_trait]
pub trait PageSource: Send + Sync {
    /// Item type of the listing.
    type Item: Send;

    /// Fetches the page that follows `starting_after`.
    async fn fetch(&self, starting_after: Option<String>) -> Result<Page<Self::Item>>;

    /// Cursor value identifying an item.
    fn cursor(item: &Self::Item) -> String;
}

/// Lazily walks every page of a listing.
pub struct Paginator<S: PageSource> {
    source: S,
    buffer: VecDeque<S::Item>,
    cursor: Option<String>,
    exhausted: bool,
    pages_fetched: usize,
}

impl<S: PageSource> Paginator<S> {
    /// Creates a paginator positioned before the first page.
    #[must_use]
    pub fn new(source: S) -> Self {
        Self {
            source,
            buffer: VecDeque::new(),
            cursor: None,
            exhausted: false,
            pages_fetched: 0,
        }
    }

    /// Returns the next item, fetching another page when needed.
    ///
    /// # Errors
    ///
    /// Returns an error if a page fetch fails. The paginator can be polled
    /// again afterwards and will retry the same page.
    pub async fn next_item(&mut self) -> Result<Option<S::Item>> {
        loop {
            if let Some(item) = self.buffer.pop_front() {
                return Ok(Some(item));
            }
            if self.exhausted {
                return Ok(None);
            }

            let page = self.source.fetch(self.cursor.clone()).await?;
            self.pages_fetched += 1;
            debug!("Fetched page {} with {} items", self.pages_fetched, page.data.len());

            self.exhausted = !page.has_more || page.data.is_empty();
            if let Some(last) = page.data.last() {
                self.cursor = Some(S::cursor(last));
            }
            self.buffer.extend(page.data);
        }
    }

    /// Drives pagination to completion.
    ///
    /// # Errors
    ///
    /// Returns the first page fetch error.
    pub async fn collect_all(mut self) -> Result<Vec<S::Item>> {
        let mut items = Vec::new();
        while let Some(item) = self.next_item().await? {
            items.push(item);
        }
        Ok(items)
    }

    /// Number of pages fetched so far.
    #[must_use]
    pub const fn pages_fetched(&self) -> usize {
        self.pages_fetched
    }
}

/// Every product on the provider.
pub struct ProductPages<'a> {
    resource: &'a dyn ProductResource,
}

/// Every price of one provider product.
pub struct PricePages<'a> {
    resource: &'a dyn PriceResource,
    product_id: String,
}

#[async_trait]
impl PageSource for ProductPages<'_> {
    type Item = RemoteProduct;

    async fn fetch(&self, starting_after: Option<String>) -> Result<Page<RemoteProduct>> {
        self.resource.list_page(starting_after).await
    }

    fn cursor(item: &RemoteProduct) -> String {
        item.id.clone()
    }
}

#[async_trait]
impl PageSource for PricePages<'_> {
    type Item = RemotePrice;

    async fn fetch(&self, starting_after: Option<String>) -> Result<Page<RemotePrice>> {
        self.resource
            .list_page_for_product(&self.product_id, starting_after)
            .await
    }

    fn cursor(item: &RemotePrice) -> String {
        item.id.clone()
    }
}

/// Lazily lists all products.
#[must_use]
pub fn all_products(resource: &dyn ProductResource) -> Paginator<ProductPages<'_>> {
    Paginator::new(ProductPages { resource })
}

/// Lazily lists all prices of a product.
#[must_use]
pub fn all_prices<'a>(resource: &'a dyn PriceResource, product_id: &str) -> Paginator<PricePages<'a>> {
    Paginator::new(PricePages {
        resource,
        product_id: product_id.to_string(),
    })
}
