//! Provider-specific immutable field sets.

use super::detector::FieldChanges;

/// Fields a provider refuses to change in place on an existing object.
///
/// A change touching any of these fields has to replace the object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImmutableFields {
    name: &'static str,
    fields: &'static [&'static str],
}

impl ImmutableFields {
    /// Stripe prices: amounts, currency and billing cycle are fixed at creation.
    pub const STRIPE_PRICE: Self = Self {
        name: "stripe.price",
        fields: &["amount", "currency", "recurring", "trialPeriodDays"],
    };

    /// Stripe products: every tracked field is updatable.
    pub const STRIPE_PRODUCT: Self = Self {
        name: "stripe.product",
        fields: &[],
    };

    /// Name of the set, for logs.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        self.name
    }

    /// Every immutable field.
    #[must_use]
    pub const fn all(&self) -> &'static [&'static str] {
        self.fields
    }

    /// Returns true if the field cannot be updated in place.
    #[must_use]
    pub fn is_immutable(&self, field: &str) -> bool {
        self.fields.contains(&field)
    }

    /// Returns true if the field can be updated in place.
    #[must_use]
    pub fn is_mutable(&self, field: &str) -> bool {
        !self.is_immutable(field)
    }

    /// Keeps the changes that require a replacement.
    #[must_use]
    pub fn filter_immutable(&self, changes: &FieldChanges) -> FieldChanges {
        changes
            .iter()
            .filter(|(field, _)| self.is_immutable(field))
            .map(|(field, change)| (field.clone(), change.clone()))
            .collect()
    }

    /// Keeps the changes that can be applied with an update call.
    #[must_use]
    pub fn filter_mutable(&self, changes: &FieldChanges) -> FieldChanges {
        changes
            .iter()
            .filter(|(field, _)| self.is_mutable(field))
            .map(|(field, change)| (field.clone(), change.clone()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::planner::detector::FieldChange;
    use serde_json::json;

    fn changes() -> FieldChanges {
        let mut changes = FieldChanges::new();
        changes.insert(
            "amount".into(),
            FieldChange {
                old: json!(999),
                new: json!(1299),
            },
        );
        changes.insert(
            "nickname".into(),
            FieldChange {
                old: json!(null),
                new: json!("Monthly"),
            },
        );
        changes
    }

    #[test]
    fn test_split_partitions_changes() {
        let fields = ImmutableFields::STRIPE_PRICE;
        let immutable = fields.filter_immutable(&changes());
        let mutable = fields.filter_mutable(&changes());

        assert_eq!(immutable.keys().collect::<Vec<_>>(), ["amount"]);
        assert_eq!(mutable.keys().collect::<Vec<_>>(), ["nickname"]);
    }

    #[test]
    fn test_classification_is_case_sensitive() {
        let fields = ImmutableFields::STRIPE_PRICE;
        assert!(fields.is_immutable("trialPeriodDays"));
        assert!(fields.is_mutable("trial_period_days"));
        assert!(fields.is_mutable("metadata"));
    }

    #[test]
    fn test_empty_set_is_all_mutable() {
        let fields = ImmutableFields::STRIPE_PRODUCT;
        assert!(fields.filter_immutable(&changes()).is_empty());
        assert_eq!(fields.filter_mutable(&changes()).len(), 2);
    }
}
