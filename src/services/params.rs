//! Translation of field changes into provider update parameters.

use serde_json::{Map, Value};

use crate::config::Metadata;
use crate::planner::{FieldChange, FieldChanges};
use crate::provider::{BUSINESS_KEY_METADATA, UpdateParams};

/// Product feature fields and their wire names.
const PRODUCT_FEATURE_PARAMS: &[(&str, &str)] = &[
    ("taxCode", "tax_code"),
    ("statementDescriptor", "statement_descriptor"),
];

/// Price feature fields and their wire names.
const PRICE_FEATURE_PARAMS: &[(&str, &str)] =
    &[("taxBehavior", "tax_behavior"), ("lookupKey", "lookup_key")];

/// Update parameters for the mutable changes of a product.
#[must_use]
pub fn product_update(changes: &FieldChanges, feature_key: &str) -> UpdateParams {
    let mut params = Map::new();
    for (field, change) in changes {
        match field.as_str() {
            "name" | "description" | "active" => {
                params.insert(field.clone(), change.new.clone());
            }
            "metadata" => {
                params.insert(field.clone(), metadata_patch(change));
            }
            key if key == feature_key => feature_patch(change, PRODUCT_FEATURE_PARAMS, &mut params),
            _ => {}
        }
    }
    params
}

/// Update parameters for the mutable changes of a price.
#[must_use]
pub fn price_update(changes: &FieldChanges, feature_key: &str) -> UpdateParams {
    let mut params = Map::new();
    for (field, change) in changes {
        match field.as_str() {
            "nickname" => {
                params.insert(field.clone(), change.new.clone());
            }
            "metadata" => {
                params.insert(field.clone(), metadata_patch(change));
            }
            key if key == feature_key => feature_patch(change, PRICE_FEATURE_PARAMS, &mut params),
            _ => {}
        }
    }
    params
}

/// Metadata sent on creation: the configured entries plus the business key.
#[must_use]
pub fn creation_metadata(metadata: Option<&Metadata>, key: &str) -> Metadata {
    let mut out = metadata.cloned().unwrap_or_default();
    out.insert(BUSINESS_KEY_METADATA.to_string(), key.to_string());
    out
}

/// Sets new entries and unsets dropped ones. The business key is never touched.
fn metadata_patch(change: &FieldChange) -> Value {
    let empty = Map::new();
    let old = change.old.as_object().unwrap_or(&empty);
    let new = change.new.as_object().unwrap_or(&empty);

    let mut patch: Map<String, Value> = new.clone();
    for key in old.keys() {
        if !new.contains_key(key) && key != BUSINESS_KEY_METADATA {
            patch.insert(key.clone(), Value::Null);
        }
    }
    Value::Object(patch)
}

fn feature_patch(change: &FieldChange, fields: &[(&str, &str)], params: &mut UpdateParams) {
    for (field, wire) in fields {
        let old = change.old.get(field).unwrap_or(&Value::Null);
        let new = change.new.get(field).unwrap_or(&Value::Null);
        if old != new {
            params.insert((*wire).to_string(), new.clone());
        }
    }
}
