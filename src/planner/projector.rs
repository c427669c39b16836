//! Projection of records and definitions onto comparable objects.
//!
//! Persisted records use storage field names and keep provider features in a
//! satellite. Projections use definition field names (`trialPeriodDays`) and
//! place the satellite under the provider's feature key, so the detector can
//! compare both sides field by field.

use serde_json::{Map, Value, json};

use crate::config::{
    Metadata, PriceDefinition, ProductDefinition, Recurring, StripePriceFeatures,
    StripeProductFeatures,
};
use crate::provider::ProviderKind;
use crate::store::{BillingPrice, BillingProduct};

use super::detector::Projection;

/// Product fields compared before the feature key.
const PRODUCT_CORE_FIELDS: &[&str] = &["name", "description", "metadata"];

/// Price fields compared before the feature key.
const PRICE_CORE_FIELDS: &[&str] = &[
    "currency",
    "amount",
    "recurring",
    "nickname",
    "metadata",
    "trialPeriodDays",
];

/// Builds comparison objects for one provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ComparisonProjector {
    feature_key: &'static str,
}

impl ComparisonProjector {
    /// Creates a projector placing features under `feature_key`.
    #[must_use]
    pub const fn new(feature_key: &'static str) -> Self {
        Self { feature_key }
    }

    /// Creates the projector matching a provider.
    #[must_use]
    pub const fn for_provider(kind: ProviderKind) -> Self {
        Self::new(kind.feature_key())
    }

    /// Key of the feature sub-object.
    #[must_use]
    pub const fn feature_key(&self) -> &'static str {
        self.feature_key
    }

    /// Product fields the detector compares.
    #[must_use]
    pub fn product_fields(&self) -> Vec<&'static str> {
        let mut fields = PRODUCT_CORE_FIELDS.to_vec();
        fields.push(self.feature_key);
        fields
    }

    /// Price fields the detector compares.
    #[must_use]
    pub fn price_fields(&self) -> Vec<&'static str> {
        let mut fields = PRICE_CORE_FIELDS.to_vec();
        fields.push(self.feature_key);
        fields
    }

    /// Projects a persisted product.
    #[must_use]
    pub fn project_product(&self, product: &BillingProduct) -> Projection {
        let mut out = Map::new();
        out.insert("name".into(), Value::String(product.name.clone()));
        out.insert("description".into(), optional_string(product.description.as_ref()));
        out.insert("metadata".into(), metadata(Some(&product.metadata)));
        out.insert(self.feature_key.into(), product_features(product.stripe.as_ref()));
        out
    }

    /// Projects a product definition.
    #[must_use]
    pub fn product_definition(&self, definition: &ProductDefinition) -> Projection {
        let mut out = Map::new();
        out.insert("name".into(), Value::String(definition.name.clone()));
        out.insert("description".into(), optional_string(definition.description.as_ref()));
        out.insert("metadata".into(), metadata(definition.metadata.as_ref()));
        out.insert(self.feature_key.into(), product_features(definition.stripe.as_ref()));
        out
    }

    /// Projects a persisted price.
    #[must_use]
    pub fn project_price(&self, price: &BillingPrice) -> Projection {
        let mut out = Map::new();
        out.insert("currency".into(), Value::String(price.currency.clone()));
        out.insert("amount".into(), Value::from(price.amount));
        out.insert("recurring".into(), recurring(price.recurring.as_ref()));
        out.insert("nickname".into(), optional_string(price.nickname.as_ref()));
        out.insert("metadata".into(), metadata(Some(&price.metadata)));
        out.insert("trialPeriodDays".into(), price.trial_period_days.map_or(Value::Null, Value::from));
        out.insert(self.feature_key.into(), price_features(price.stripe.as_ref()));
        out
    }

    /// Projects a price definition.
    #[must_use]
    pub fn price_definition(&self, definition: &PriceDefinition) -> Projection {
        let mut out = Map::new();
        out.insert("currency".into(), Value::String(definition.currency.clone()));
        out.insert("amount".into(), Value::from(definition.amount));
        out.insert("recurring".into(), recurring(definition.recurring.as_ref()));
        out.insert("nickname".into(), optional_string(definition.nickname.as_ref()));
        out.insert("metadata".into(), metadata(definition.metadata.as_ref()));
        out.insert(
            "trialPeriodDays".into(),
            definition.trial_period_days.map_or(Value::Null, Value::from),
        );
        out.insert(self.feature_key.into(), price_features(definition.stripe.as_ref()));
        out
    }
}

fn optional_string(value: Option<&String>) -> Value {
    value.map_or(Value::Null, |s| Value::String(s.clone()))
}

fn metadata(metadata: Option<&Metadata>) -> Value {
    match metadata {
        Some(map) if !map.is_empty() => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), Value::String(v.clone())))
                .collect(),
        ),
        _ => Value::Null,
    }
}

fn recurring(recurring: Option<&Recurring>) -> Value {
    recurring.map_or(Value::Null, |r| {
        json!({"interval": r.interval.as_str(), "intervalCount": r.interval_count})
    })
}

/// Feature sub-object, or null when no attribute is set.
fn product_features(features: Option<&StripeProductFeatures>) -> Value {
    match features {
        Some(f) if !f.is_empty() => json!({
            "taxCode": f.tax_code,
            "statementDescriptor": f.statement_descriptor,
        }),
        _ => Value::Null,
    }
}

/// Feature sub-object, or null when no attribute is set.
fn price_features(features: Option<&StripePriceFeatures>) -> Value {
    match features {
        Some(f) if !f.is_empty() => json!({
            "taxBehavior": f.tax_behavior.map(|b| b.as_str()),
            "lookupKey": f.lookup_key,
        }),
        _ => Value::Null,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Interval, TaxBehavior};
    use uuid::Uuid;

    fn price_definition() -> PriceDefinition {
        PriceDefinition {
            amount: 999,
            currency: "eur".into(),
            recurring: Some(Recurring {
                interval: Interval::Month,
                interval_count: 1,
            }),
            nickname: Some("Monthly".into()),
            metadata: None,
            trial_period_days: Some(14),
            stripe: Some(StripePriceFeatures {
                tax_behavior: Some(TaxBehavior::Exclusive),
                lookup_key: None,
            }),
        }
    }

    #[test]
    fn test_price_projection_uses_definition_names() {
        let projector = ComparisonProjector::for_provider(ProviderKind::Stripe);
        let projection = projector.price_definition(&price_definition());

        assert_eq!(projection["trialPeriodDays"], json!(14));
        assert!(!projection.contains_key("trial_period_days"));
        assert_eq!(projection["stripe"]["taxBehavior"], json!("exclusive"));
    }

    #[test]
    fn test_record_and_definition_project_identically() {
        let projector = ComparisonProjector::for_provider(ProviderKind::Stripe);
        let definition = price_definition();
        let record = BillingPrice::new(Uuid::new_v4(), "monthly", "price_1", &definition);

        assert_eq!(
            projector.project_price(&record),
            projector.price_definition(&definition)
        );
    }

    #[test]
    fn test_empty_features_project_to_null() {
        let projector = ComparisonProjector::new("stripe");
        let definition = ProductDefinition {
            name: "Pro".into(),
            description: None,
            metadata: None,
            stripe: Some(StripeProductFeatures::default()),
            prices: std::collections::BTreeMap::new(),
        };
        let projection = projector.product_definition(&definition);
        assert_eq!(projection["stripe"], Value::Null);
        assert_eq!(projection["metadata"], Value::Null);
    }

    #[test]
    fn test_fields_end_with_feature_key() {
        let projector = ComparisonProjector::new("stripe");
        assert_eq!(projector.product_fields().last(), Some(&"stripe"));
        assert!(projector.price_fields().contains(&"trialPeriodDays"));
    }
}
