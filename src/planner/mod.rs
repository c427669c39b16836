//! Change planning primitives.
//!
//! This module holds the pure parts of reconciliation: projecting records and
//! definitions onto a common shape, diffing them field by field, and
//! splitting a diff into what a provider can update in place and what it
//! cannot.

mod detector;
mod immutable;
mod projector;

pub use detector::{ChangeDetector, FieldChange, FieldChanges, Projection, detect};
pub use immutable::ImmutableFields;
pub use projector::ComparisonProjector;
