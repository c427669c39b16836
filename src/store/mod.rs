//! Local catalog storage for the billing deployment system.
//!
//! This module holds the relational cache of provider products and prices
//! that the reconciliation core diffs against.

mod repository;
mod local;
mod types;

pub use repository::CatalogStore;
pub use local::LocalCatalogStore;
pub use types::{ActiveKeys, BillingPrice, BillingProduct, CatalogSnapshot, CATALOG_VERSION};
