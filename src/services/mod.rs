//! Provider-facing resource services.
//!
//! Each service pairs a provider resource with the local store and keeps
//! them consistent one record at a time.

mod params;
mod price;
mod product;
mod retry;

use serde::Serialize;

use crate::pipeline::ChangeType;
use crate::planner::FieldChanges;

pub use price::PriceService;
pub use product::ProductService;
pub use retry::RetryPolicy;

/// Result of synchronizing one resource.
#[derive(Debug, Clone, Serialize)]
pub struct SyncOutcome<T> {
    /// What was done.
    pub action: ChangeType,
    /// The record after synchronization.
    pub resource: T,
    /// Field-level diff that was applied.
    pub changes: FieldChanges,
}
