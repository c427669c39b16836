//! Change records and the change set produced by a pipeline run.

use serde::Serialize;
use std::fmt;

use crate::config::{PriceDefinition, ProductDefinition};
use crate::planner::FieldChanges;
use crate::resolver::ImmutableStrategy;
use crate::store::{BillingPrice, BillingProduct};

/// Outcome class of a reconciled resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeType {
    /// The resource did not exist and is (or will be) created.
    Created,
    /// The resource exists and some fields differ.
    Updated,
    /// The resource matches its definition.
    Unchanged,
    /// The resource is no longer configured and is (or will be) deactivated.
    Archived,
}

impl ChangeType {
    /// Returns true for changes that need execution.
    #[must_use]
    pub const fn is_pending(self) -> bool {
        !matches!(self, Self::Unchanged)
    }
}

impl fmt::Display for ChangeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Created => "created",
            Self::Updated => "updated",
            Self::Unchanged => "unchanged",
            Self::Archived => "archived",
        };
        f.write_str(label)
    }
}

/// One reconciled product.
#[derive(Debug, Clone, Serialize)]
pub struct ProductChange {
    /// Business key.
    pub key: String,
    /// Outcome class.
    pub change_type: ChangeType,
    /// Desired state; absent for archived products.
    pub definition: Option<ProductDefinition>,
    /// Record before this run; absent for new products.
    pub before: Option<BillingProduct>,
    /// Record after execution.
    pub after: Option<BillingProduct>,
    /// Field-level diff.
    pub changes: FieldChanges,
}

/// One reconciled price.
#[derive(Debug, Clone, Serialize)]
pub struct PriceChange {
    /// Business key of the owning product.
    pub product_key: String,
    /// Price type key.
    pub key: String,
    /// Outcome class.
    pub change_type: ChangeType,
    /// Desired state; absent for archived prices.
    pub definition: Option<PriceDefinition>,
    /// Record before this run; absent for new prices.
    pub before: Option<BillingPrice>,
    /// Record after execution.
    pub after: Option<BillingPrice>,
    /// Field-level diff.
    pub changes: FieldChanges,
    /// Changed fields the provider cannot update in place.
    pub immutable_fields: Vec<String>,
    /// Strategy chosen for an immutable change.
    pub strategy: Option<ImmutableStrategy>,
    /// New type key chosen under the duplicate strategy.
    pub duplicate_key: Option<String>,
}

impl ProductChange {
    /// A product that does not exist yet.
    #[must_use]
    pub fn created(key: &str, definition: &ProductDefinition) -> Self {
        Self {
            key: key.to_string(),
            change_type: ChangeType::Created,
            definition: Some(definition.clone()),
            before: None,
            after: None,
            changes: FieldChanges::new(),
        }
    }

    /// A product compared against its existing record.
    #[must_use]
    pub fn compared(
        key: &str,
        definition: &ProductDefinition,
        existing: BillingProduct,
        changes: FieldChanges,
    ) -> Self {
        let unchanged = changes.is_empty();
        Self {
            key: key.to_string(),
            change_type: if unchanged {
                ChangeType::Unchanged
            } else {
                ChangeType::Updated
            },
            definition: Some(definition.clone()),
            after: unchanged.then(|| existing.clone()),
            before: Some(existing),
            changes,
        }
    }

    /// A product no longer in configuration.
    #[must_use]
    pub fn archived(existing: BillingProduct) -> Self {
        Self {
            key: existing.key.clone(),
            change_type: ChangeType::Archived,
            definition: None,
            before: Some(existing),
            after: None,
            changes: FieldChanges::new(),
        }
    }

    /// The freshest known record: after execution, else before.
    #[must_use]
    pub fn current(&self) -> Option<&BillingProduct> {
        self.after.as_ref().or(self.before.as_ref())
    }
}

impl PriceChange {
    /// A price that does not exist yet.
    #[must_use]
    pub fn created(product_key: &str, key: &str, definition: &PriceDefinition) -> Self {
        Self {
            product_key: product_key.to_string(),
            key: key.to_string(),
            change_type: ChangeType::Created,
            definition: Some(definition.clone()),
            before: None,
            after: None,
            changes: FieldChanges::new(),
            immutable_fields: Vec::new(),
            strategy: None,
            duplicate_key: None,
        }
    }

    /// A price compared against its existing record.
    #[must_use]
    pub fn compared(
        product_key: &str,
        definition: &PriceDefinition,
        existing: BillingPrice,
        changes: FieldChanges,
        immutable_fields: Vec<String>,
    ) -> Self {
        let unchanged = changes.is_empty();
        Self {
            product_key: product_key.to_string(),
            key: existing.key.clone(),
            change_type: if unchanged {
                ChangeType::Unchanged
            } else {
                ChangeType::Updated
            },
            definition: Some(definition.clone()),
            after: unchanged.then(|| existing.clone()),
            before: Some(existing),
            changes,
            immutable_fields,
            strategy: None,
            duplicate_key: None,
        }
    }

    /// A price no longer in configuration.
    #[must_use]
    pub fn archived(product_key: &str, existing: BillingPrice) -> Self {
        Self {
            product_key: product_key.to_string(),
            key: existing.key.clone(),
            change_type: ChangeType::Archived,
            definition: None,
            before: Some(existing),
            after: None,
            changes: FieldChanges::new(),
            immutable_fields: Vec::new(),
            strategy: None,
            duplicate_key: None,
        }
    }

    /// Returns true if the diff touches a field the provider cannot update.
    #[must_use]
    pub fn has_immutable_changes(&self) -> bool {
        !self.immutable_fields.is_empty()
    }
}

/// Counts per change type.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ChangeCounts {
    /// Created resources.
    pub created: usize,
    /// Updated resources.
    pub updated: usize,
    /// Unchanged resources.
    pub unchanged: usize,
    /// Archived resources.
    pub archived: usize,
}

impl ChangeCounts {
    fn tally(types: impl Iterator<Item = ChangeType>) -> Self {
        types.fold(Self::default(), |mut counts, change_type| {
            match change_type {
                ChangeType::Created => counts.created += 1,
                ChangeType::Updated => counts.updated += 1,
                ChangeType::Unchanged => counts.unchanged += 1,
                ChangeType::Archived => counts.archived += 1,
            }
            counts
        })
    }

    /// Number of resources that need or received a change.
    #[must_use]
    pub const fn pending(&self) -> usize {
        self.created + self.updated + self.archived
    }
}

/// Summary of a change set.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ChangeSummary {
    /// Product counts.
    pub products: ChangeCounts,
    /// Price counts.
    pub prices: ChangeCounts,
}

/// Every change of one pipeline run.
#[derive(Debug, Clone, Serialize)]
pub struct ChangeSet {
    products: Vec<ProductChange>,
    prices: Vec<PriceChange>,
    dry_run: bool,
    config_hash: String,
}

impl ChangeSet {
    /// Freezes the changes of a run.
    #[must_use]
    pub const fn new(
        products: Vec<ProductChange>,
        prices: Vec<PriceChange>,
        dry_run: bool,
        config_hash: String,
    ) -> Self {
        Self {
            products,
            prices,
            dry_run,
            config_hash,
        }
    }

    /// Product changes in processing order.
    #[must_use]
    pub fn products(&self) -> &[ProductChange] {
        &self.products
    }

    /// Price changes in processing order.
    #[must_use]
    pub fn prices(&self) -> &[PriceChange] {
        &self.prices
    }

    /// Whether this is a preview.
    #[must_use]
    pub const fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    /// Fingerprint of the configuration that produced this set.
    #[must_use]
    pub fn config_hash(&self) -> &str {
        &self.config_hash
    }

    /// Counts per change type.
    #[must_use]
    pub fn summary(&self) -> ChangeSummary {
        ChangeSummary {
            products: ChangeCounts::tally(self.products.iter().map(|c| c.change_type)),
            prices: ChangeCounts::tally(self.prices.iter().map(|c| c.change_type)),
        }
    }

    /// Returns true if anything was (or would be) changed.
    #[must_use]
    pub fn has_changes(&self) -> bool {
        self.products.iter().any(|c| c.change_type.is_pending())
            || self.prices.iter().any(|c| c.change_type.is_pending())
    }

    /// Price changes touching immutable fields.
    pub fn immutable_price_changes(&self) -> impl Iterator<Item = &PriceChange> {
        self.prices.iter().filter(|c| c.has_immutable_changes())
    }

    /// Price changes resolved with a duplicate key.
    pub fn duplicates(&self) -> impl Iterator<Item = &PriceChange> {
        self.prices.iter().filter(|c| c.duplicate_key.is_some())
    }

    /// Looks up a product change by key.
    #[must_use]
    pub fn product(&self, key: &str) -> Option<&ProductChange> {
        self.products.iter().find(|c| c.key == key)
    }

    /// Looks up a price change by product and type key.
    #[must_use]
    pub fn price(&self, product_key: &str, key: &str) -> Option<&PriceChange> {
        self.prices
            .iter()
            .find(|c| c.product_key == product_key && c.key == key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::planner::FieldChange;
    use serde_json::json;
    use std::collections::BTreeMap;
    use uuid::Uuid;

    fn price_definition(amount: i64) -> PriceDefinition {
        PriceDefinition {
            amount,
            currency: "eur".into(),
            recurring: None,
            nickname: None,
            metadata: None,
            trial_period_days: None,
            stripe: None,
        }
    }

    #[test]
    fn test_summary_and_queries() {
        let product = ProductDefinition {
            name: "Pro".into(),
            description: None,
            metadata: None,
            stripe: None,
            prices: BTreeMap::new(),
        };
        let existing = BillingPrice::new(Uuid::new_v4(), "monthly", "price_1", &price_definition(999));
        let mut changes = FieldChanges::new();
        changes.insert(
            "amount".into(),
            FieldChange {
                old: json!(999),
                new: json!(1299),
            },
        );

        let set = ChangeSet::new(
            vec![ProductChange::created("pro", &product)],
            vec![
                PriceChange::compared(
                    "pro",
                    &price_definition(1299),
                    existing,
                    changes,
                    vec!["amount".into()],
                ),
                PriceChange::created("pro", "yearly", &price_definition(9900)),
            ],
            true,
            "abc".into(),
        );

        let summary = set.summary();
        assert_eq!(summary.products.created, 1);
        assert_eq!(summary.prices.updated, 1);
        assert_eq!(summary.prices.pending(), 2);
        assert!(set.has_changes());
        assert_eq!(set.immutable_price_changes().count(), 1);
        assert_eq!(set.duplicates().count(), 0);
        assert_eq!(set.price("pro", "monthly").unwrap().change_type, ChangeType::Updated);
    }

    #[test]
    fn test_unchanged_comparison_keeps_record_as_after() {
        let existing = BillingPrice::new(Uuid::new_v4(), "monthly", "price_1", &price_definition(999));
        let change = PriceChange::compared(
            "pro",
            &price_definition(999),
            existing.clone(),
            FieldChanges::new(),
            Vec::new(),
        );
        assert_eq!(change.change_type, ChangeType::Unchanged);
        assert_eq!(change.after, Some(existing));
        assert!(!change.has_immutable_changes());
    }

    #[test]
    fn test_empty_set_has_no_changes() {
        let set = ChangeSet::new(Vec::new(), Vec::new(), false, String::new());
        assert!(!set.has_changes());
        assert_eq!(set.summary(), ChangeSummary::default());
    }
}
