//! Provider object and request types.
//!
//! These types describe what the billing provider returns and what the
//! resource services send to it. Field names follow the Stripe wire format.

use serde::{Deserialize, Serialize};

use crate::config::{Metadata, Recurring, TaxBehavior};

/// Parameters for an in-place update, keyed by provider field name.
///
/// Nested objects (`metadata`, `recurring`) stay nested; `null` unsets a field.
pub type UpdateParams = serde_json::Map<String, serde_json::Value>;

/// Metadata key carrying the business key on provider objects.
pub const BUSINESS_KEY_METADATA: &str = "billing_key";

/// A product as returned by the provider.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RemoteProduct {
    /// Provider identifier.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Description.
    #[serde(default)]
    pub description: Option<String>,
    /// Whether the product is live.
    #[serde(default = "default_active")]
    pub active: bool,
    /// Metadata.
    #[serde(default)]
    pub metadata: Metadata,
    /// Tax code identifier.
    #[serde(default)]
    pub tax_code: Option<String>,
    /// Statement descriptor.
    #[serde(default)]
    pub statement_descriptor: Option<String>,
}

/// A price as returned by the provider.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RemotePrice {
    /// Provider identifier.
    pub id: String,
    /// Owning product identifier.
    pub product: String,
    /// Amount in minor units; absent for tiered prices.
    #[serde(default)]
    pub unit_amount: Option<i64>,
    /// Lowercase currency code.
    pub currency: String,
    /// Recurring settings.
    #[serde(default)]
    pub recurring: Option<RemoteRecurring>,
    /// Nickname.
    #[serde(default)]
    pub nickname: Option<String>,
    /// Whether the price is live.
    #[serde(default = "default_active")]
    pub active: bool,
    /// Metadata.
    #[serde(default)]
    pub metadata: Metadata,
    /// Lookup key.
    #[serde(default)]
    pub lookup_key: Option<String>,
    /// Tax behavior.
    #[serde(default)]
    pub tax_behavior: Option<String>,
}

/// Recurring settings of a provider price.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RemoteRecurring {
    /// Interval unit name.
    pub interval: String,
    /// Units between bills.
    #[serde(default = "default_interval_count")]
    pub interval_count: u32,
    /// Trial period in days.
    #[serde(default)]
    pub trial_period_days: Option<u32>,
}

/// Request to create a product.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewProduct {
    /// Display name.
    pub name: String,
    /// Description.
    pub description: Option<String>,
    /// Metadata.
    pub metadata: Metadata,
    /// Tax code identifier.
    pub tax_code: Option<String>,
    /// Statement descriptor.
    pub statement_descriptor: Option<String>,
}

/// Request to create a price.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewPrice {
    /// Owning product identifier.
    pub product_id: String,
    /// Amount in minor units.
    pub amount: i64,
    /// Currency code.
    pub currency: String,
    /// Recurring interval.
    pub recurring: Option<Recurring>,
    /// Nickname.
    pub nickname: Option<String>,
    /// Metadata.
    pub metadata: Metadata,
    /// Trial period in days.
    pub trial_period_days: Option<u32>,
    /// Tax behavior.
    pub tax_behavior: Option<TaxBehavior>,
    /// Lookup key.
    pub lookup_key: Option<String>,
    /// Moves the lookup key off any price already holding it.
    pub transfer_lookup_key: bool,
}

/// One page of a cursor-paginated listing.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Page<T> {
    /// Items on this page.
    pub data: Vec<T>,
    /// Whether another page follows.
    #[serde(default)]
    pub has_more: bool,
}

impl RemoteProduct {
    /// Business key recorded on the object, if any.
    #[must_use]
    pub fn business_key(&self) -> Option<&str> {
        self.metadata.get(BUSINESS_KEY_METADATA).map(String::as_str)
    }
}

impl RemotePrice {
    /// Business key recorded on the object, if any.
    #[must_use]
    pub fn business_key(&self) -> Option<&str> {
        self.metadata.get(BUSINESS_KEY_METADATA).map(String::as_str)
    }
}

const fn default_active() -> bool {
    true
}

const fn default_interval_count() -> u32 {
    1
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_stripe_price() {
        let json = r#"{
            "id": "price_123",
            "object": "price",
            "active": true,
            "currency": "eur",
            "product": "prod_1",
            "unit_amount": 999,
            "nickname": null,
            "lookup_key": "pro_monthly",
            "tax_behavior": "exclusive",
            "metadata": {"billing_key": "monthly"},
            "recurring": {"interval": "month", "interval_count": 1, "usage_type": "licensed"}
        }"#;
        let price: RemotePrice = serde_json::from_str(json).unwrap();
        assert_eq!(price.unit_amount, Some(999));
        assert_eq!(price.business_key(), Some("monthly"));
        assert_eq!(price.recurring.unwrap().interval, "month");
    }

    #[test]
    fn test_deserialize_page() {
        let json = r#"{"object": "list", "data": [{"id": "prod_1", "name": "Pro"}], "has_more": true}"#;
        let page: Page<RemoteProduct> = serde_json::from_str(json).unwrap();
        assert!(page.has_more);
        assert!(page.data[0].active);
        assert!(page.data[0].business_key().is_none());
    }
}
