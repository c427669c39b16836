//! Billing provider integration.
//!
//! This module provides the resource contracts the reconciliation core
//! depends on, the Stripe implementation behind them, and lazy pagination
//! over provider listings.

mod client;
#[cfg(test)]
pub mod memory;
mod pagination;
mod registry;
mod resource;
mod types;

pub use client::{STRIPE_API_BASE, StripeClient, encode_form, price_params, product_params};
pub use pagination::{PageSource, Paginator, PricePages, ProductPages, all_prices, all_products};
pub use registry::{ProviderKind, build_provider};
pub use resource::{PriceResource, ProductResource, ProviderClient};
#[cfg(test)]
pub use resource::{MockPriceResource, MockProductResource};
pub use types::{
    BUSINESS_KEY_METADATA, NewPrice, NewProduct, Page, RemotePrice, RemoteProduct,
    RemoteRecurring, UpdateParams,
};
