//! Field-level change detection.
//!
//! Both sides of a comparison are flat JSON objects in definition shape, as
//! produced by [`ComparisonProjector`](super::ComparisonProjector). Values are
//! normalized before comparison so that representation differences (an empty
//! metadata map versus no metadata, a recurring interval with an implicit
//! count) never register as changes.

use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;

use crate::config::{PriceDefinition, ProductDefinition};
use crate::store::{BillingPrice, BillingProduct};

use super::projector::ComparisonProjector;

/// A flat object whose keys are definition field names.
pub type Projection = Map<String, Value>;

/// Old and new value of one field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldChange {
    /// Current value.
    pub old: Value,
    /// Desired value.
    pub new: Value,
}

/// Changes keyed by field name.
pub type FieldChanges = BTreeMap<String, FieldChange>;

/// Field holding the recurring interval.
const RECURRING_FIELD: &str = "recurring";

/// Compares `existing` and `desired` over `fields`.
///
/// Only fields whose normalized values differ appear in the result.
#[must_use]
pub fn detect(existing: &Projection, desired: &Projection, fields: &[&str]) -> FieldChanges {
    fields
        .iter()
        .filter_map(|field| {
            let old = normalize(field, existing.get(*field));
            let new = normalize(field, desired.get(*field));
            (old != new).then(|| ((*field).to_string(), FieldChange { old, new }))
        })
        .collect()
}

/// Normalizes a field value for comparison.
fn normalize(field: &str, value: Option<&Value>) -> Value {
    let Some(value) = value else {
        return Value::Null;
    };
    if field == RECURRING_FIELD {
        return canonical_recurring(value);
    }
    strip_nulls(value)
}

/// Drops null members; objects left empty collapse to null.
fn strip_nulls(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let kept: Map<String, Value> = map
                .iter()
                .map(|(k, v)| (k.clone(), strip_nulls(v)))
                .filter(|(_, v)| !v.is_null())
                .collect();
            if kept.is_empty() {
                Value::Null
            } else {
                Value::Object(kept)
            }
        }
        other => other.clone(),
    }
}

/// Serializes a recurring interval to a single canonical string.
///
/// Accepts the structured form or an already serialized JSON string, in
/// camelCase or snake_case, with the count defaulting to one.
fn canonical_recurring(value: &Value) -> Value {
    let parsed;
    let object = match value {
        Value::Object(map) => map,
        Value::String(s) => match serde_json::from_str::<Value>(s) {
            Ok(Value::Object(map)) => {
                parsed = map;
                &parsed
            }
            _ => return value.clone(),
        },
        Value::Null => return Value::Null,
        other => return other.clone(),
    };

    let Some(interval) = object.get("interval").and_then(Value::as_str) else {
        return strip_nulls(value);
    };
    let count = object
        .get("intervalCount")
        .or_else(|| object.get("interval_count"))
        .and_then(Value::as_u64)
        .unwrap_or(1);

    let mut canonical = Map::new();
    canonical.insert("interval".into(), Value::String(interval.to_lowercase()));
    canonical.insert("intervalCount".into(), Value::from(count));
    Value::String(Value::Object(canonical).to_string())
}

/// Diffs persisted records against definitions.
#[derive(Debug, Clone, Copy)]
pub struct ChangeDetector {
    projector: ComparisonProjector,
}

impl ChangeDetector {
    /// Creates a detector for the projector's provider.
    #[must_use]
    pub const fn new(projector: ComparisonProjector) -> Self {
        Self { projector }
    }

    /// The projector in use.
    #[must_use]
    pub const fn projector(&self) -> ComparisonProjector {
        self.projector
    }

    /// Changes needed to bring a product in line with its definition.
    ///
    /// An inactive product gains an `active` change so that it is revived.
    #[must_use]
    pub fn product_changes(
        &self,
        existing: &BillingProduct,
        definition: &ProductDefinition,
    ) -> FieldChanges {
        let mut changes = detect(
            &self.projector.project_product(existing),
            &self.projector.product_definition(definition),
            &self.projector.product_fields(),
        );
        if !existing.active {
            changes.insert(
                "active".into(),
                FieldChange {
                    old: Value::Bool(false),
                    new: Value::Bool(true),
                },
            );
        }
        changes
    }

    /// Changes needed to bring a price in line with its definition.
    #[must_use]
    pub fn price_changes(&self, existing: &BillingPrice, definition: &PriceDefinition) -> FieldChanges {
        detect(
            &self.projector.project_price(existing),
            &self.projector.price_definition(definition),
            &self.projector.price_fields(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn object(value: Value) -> Projection {
        match value {
            Value::Object(map) => map,
            _ => Projection::new(),
        }
    }

    #[test]
    fn test_reports_only_differing_fields() {
        let existing = object(json!({"amount": 999, "currency": "eur", "nickname": "Monthly"}));
        let desired = object(json!({"amount": 1299, "currency": "eur", "nickname": "Monthly"}));

        let changes = detect(&existing, &desired, &["amount", "currency", "nickname"]);
        assert_eq!(changes.len(), 1);
        assert_eq!(changes["amount"].old, json!(999));
        assert_eq!(changes["amount"].new, json!(1299));
    }

    #[test]
    fn test_empty_field_list_yields_no_changes() {
        let existing = object(json!({"amount": 1}));
        let desired = object(json!({"amount": 2}));
        assert!(detect(&existing, &desired, &[]).is_empty());
    }

    #[test]
    fn test_unlisted_fields_are_ignored() {
        let existing = object(json!({"amount": 1, "name": "a"}));
        let desired = object(json!({"amount": 1, "name": "b"}));
        assert!(detect(&existing, &desired, &["amount"]).is_empty());
    }

    #[test]
    fn test_recurring_representations_compare_equal() {
        let existing = object(json!({"recurring": "{\"interval_count\":1,\"interval\":\"month\"}"}));
        let desired = object(json!({"recurring": {"interval": "month"}}));
        assert!(detect(&existing, &desired, &["recurring"]).is_empty());
    }

    #[test]
    fn test_recurring_count_change_detected() {
        let existing = object(json!({"recurring": {"interval": "month", "intervalCount": 1}}));
        let desired = object(json!({"recurring": {"interval": "month", "intervalCount": 3}}));
        let changes = detect(&existing, &desired, &["recurring"]);
        assert!(changes.contains_key("recurring"));
    }

    #[test]
    fn test_empty_and_null_objects_are_equivalent() {
        let existing = object(json!({"metadata": {}, "stripe": {"taxBehavior": null}}));
        let desired = object(json!({"metadata": null}));
        assert!(detect(&existing, &desired, &["metadata", "stripe"]).is_empty());
    }

    #[test]
    fn test_missing_field_against_value_is_change() {
        let existing = object(json!({}));
        let desired = object(json!({"description": "New"}));
        let changes = detect(&existing, &desired, &["description"]);
        assert_eq!(changes["description"].old, Value::Null);
    }

    #[test]
    fn test_symmetry() {
        let a = object(json!({"name": "A", "amount": 1}));
        let b = object(json!({"name": "B", "amount": 1}));
        let forward = detect(&a, &b, &["name", "amount"]);
        let backward = detect(&b, &a, &["name", "amount"]);
        assert_eq!(
            forward.keys().collect::<Vec<_>>(),
            backward.keys().collect::<Vec<_>>()
        );
        assert_eq!(forward["name"].old, backward["name"].new);
    }
}
