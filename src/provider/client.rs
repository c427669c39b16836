//! Stripe API client implementation.
//!
//! Requests are form-encoded with Stripe's bracket notation for nested
//! parameters. Each call is a single attempt; the resource services wrap
//! calls in a retry policy.

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode, header};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use std::time::Duration;
use tracing::trace;

use crate::error::{ProviderError, Result};

use super::registry::ProviderKind;
use super::resource::{PriceResource, ProductResource, ProviderClient};
use super::types::{NewPrice, NewProduct, Page, RemotePrice, RemoteProduct, UpdateParams};

/// Stripe API base URL.
pub const STRIPE_API_BASE: &str = "https://api.stripe.com";

/// Default request timeout in seconds.
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Page size used for listings.
const LIST_PAGE_LIMIT: &str = "100";

/// Wait hint used when a 429 carries no usable `Retry-After`.
const DEFAULT_RETRY_AFTER_SECS: u64 = 1;

/// Stripe API client.
#[derive(Debug, Clone)]
pub struct StripeClient {
    /// HTTP client.
    client: Client,
    /// Secret API key.
    api_key: String,
    /// API base URL without trailing slash.
    base_url: String,
}

/// Stripe error envelope.
#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

/// Stripe error body.
#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    param: Option<String>,
}

impl StripeClient {
    /// Creates a new Stripe API client.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be created.
    pub fn new(api_key: &str) -> Result<Self> {
        Self::with_timeout(api_key, DEFAULT_TIMEOUT_SECS)
    }

    /// Creates a client with a custom timeout.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be created.
    pub fn with_timeout(api_key: &str, timeout_secs: u64) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| ProviderError::connection(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            api_key: api_key.to_string(),
            base_url: String::from(STRIPE_API_BASE),
        })
    }

    /// Points the client at another API base URL.
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    async fn get<T: DeserializeOwned>(&self, path: &str, query: &[(String, String)]) -> Result<T> {
        trace!("GET {path} {query:?}");
        let request = self.client.get(self.url(path)).query(query);
        self.send(request).await
    }

    async fn post<T: DeserializeOwned>(&self, path: &str, params: &UpdateParams) -> Result<T> {
        let form = encode_form(params);
        trace!("POST {path} {form:?}");
        let request = self.client.post(self.url(path)).form(&form);
        self.send(request).await
    }

    /// Sends a request once and maps the response.
    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T> {
        let response = request
            .header(header::AUTHORIZATION, format!("Bearer {}", self.api_key))
            .send()
            .await
            .map_err(|e| ProviderError::connection(format!("Request failed: {e}")))?;

        let status = response.status();
        if status.is_success() {
            let body = response
                .text()
                .await
                .map_err(|e| ProviderError::connection(format!("Failed to read response: {e}")))?;
            return serde_json::from_str(&body).map_err(|e| {
                ProviderError::Api {
                    status: status.as_u16(),
                    message: format!("Failed to parse response: {e}"),
                }
                .into()
            });
        }

        Err(error_from_response(response).await.into())
    }
}

/// Maps a non-success response to a provider error.
async fn error_from_response(response: Response) -> ProviderError {
    let status = response.status();

    if status == StatusCode::TOO_MANY_REQUESTS {
        let retry_after = response
            .headers()
            .get(header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.trim().parse::<u64>().ok())
            .filter(|secs| *secs > 0)
            .unwrap_or(DEFAULT_RETRY_AFTER_SECS);
        return ProviderError::RateLimited {
            retry_after_secs: retry_after,
        };
    }

    let body = response.text().await.unwrap_or_default();
    let (message, param) = match serde_json::from_str::<ErrorEnvelope>(&body) {
        Ok(envelope) => (
            envelope.error.message.unwrap_or_else(|| body.clone()),
            envelope.error.param,
        ),
        Err(_) => (body, None),
    };

    match status.as_u16() {
        401 | 403 => ProviderError::Authentication { message },
        400 | 402 | 404 => ProviderError::InvalidRequest { message, param },
        code => ProviderError::Api {
            status: code,
            message,
        },
    }
}

/// Flattens nested parameters into Stripe's bracketed form fields.
///
/// `null` becomes an empty string, which Stripe reads as "unset".
#[must_use]
pub fn encode_form(params: &UpdateParams) -> Vec<(String, String)> {
    let mut out = Vec::new();
    for (key, value) in params {
        encode_value(key.clone(), value, &mut out);
    }
    out
}

fn encode_value(key: String, value: &Value, out: &mut Vec<(String, String)>) {
    match value {
        Value::Null => out.push((key, String::new())),
        Value::Bool(b) => out.push((key, b.to_string())),
        Value::Number(n) => out.push((key, n.to_string())),
        Value::String(s) => out.push((key, s.clone())),
        Value::Array(items) => {
            for (index, item) in items.iter().enumerate() {
                encode_value(format!("{key}[{index}]"), item, out);
            }
        }
        Value::Object(map) if map.is_empty() => out.push((key, String::new())),
        Value::Object(map) => {
            for (sub, item) in map {
                encode_value(format!("{key}[{sub}]"), item, out);
            }
        }
    }
}

fn metadata_value(metadata: &crate::config::Metadata) -> Value {
    Value::Object(
        metadata
            .iter()
            .map(|(k, v)| (k.clone(), Value::String(v.clone())))
            .collect(),
    )
}

/// Creation parameters for a product.
#[must_use]
pub fn product_params(product: &NewProduct) -> UpdateParams {
    let mut params = Map::new();
    params.insert("name".into(), Value::String(product.name.clone()));
    if let Some(description) = &product.description {
        params.insert("description".into(), Value::String(description.clone()));
    }
    if !product.metadata.is_empty() {
        params.insert("metadata".into(), metadata_value(&product.metadata));
    }
    if let Some(tax_code) = &product.tax_code {
        params.insert("tax_code".into(), Value::String(tax_code.clone()));
    }
    if let Some(descriptor) = &product.statement_descriptor {
        params.insert("statement_descriptor".into(), Value::String(descriptor.clone()));
    }
    params
}

/// Creation parameters for a price.
#[must_use]
pub fn price_params(price: &NewPrice) -> UpdateParams {
    let mut params = Map::new();
    params.insert("product".into(), Value::String(price.product_id.clone()));
    params.insert("unit_amount".into(), Value::from(price.amount));
    params.insert("currency".into(), Value::String(price.currency.clone()));
    if let Some(recurring) = &price.recurring {
        let mut nested = Map::new();
        nested.insert("interval".into(), Value::String(recurring.interval.as_str().into()));
        nested.insert("interval_count".into(), Value::from(recurring.interval_count));
        if let Some(days) = price.trial_period_days {
            nested.insert("trial_period_days".into(), Value::from(days));
        }
        params.insert("recurring".into(), Value::Object(nested));
    }
    if let Some(nickname) = &price.nickname {
        params.insert("nickname".into(), Value::String(nickname.clone()));
    }
    if !price.metadata.is_empty() {
        params.insert("metadata".into(), metadata_value(&price.metadata));
    }
    if let Some(behavior) = price.tax_behavior {
        params.insert("tax_behavior".into(), Value::String(behavior.as_str().into()));
    }
    if let Some(lookup_key) = &price.lookup_key {
        params.insert("lookup_key".into(), Value::String(lookup_key.clone()));
        if price.transfer_lookup_key {
            params.insert("transfer_lookup_key".into(), Value::Bool(true));
        }
    }
    params
}

fn archive_params() -> UpdateParams {
    let mut params = Map::new();
    params.insert("active".into(), Value::Bool(false));
    params
}

fn list_query(starting_after: Option<String>) -> Vec<(String, String)> {
    let mut query = vec![(String::from("limit"), String::from(LIST_PAGE_LIMIT))];
    if let Some(cursor) = starting_after {
        query.push((String::from("starting_after"), cursor));
    }
    query
}

#[async_trait]
impl ProductResource for StripeClient {
    async fn create(&self, product: &NewProduct) -> Result<RemoteProduct> {
        self.post("/v1/products", &product_params(product)).await
    }

    async fn retrieve(&self, id: &str) -> Result<RemoteProduct> {
        self.get(&format!("/v1/products/{id}"), &[]).await
    }

    async fn update(&self, id: &str, params: &UpdateParams) -> Result<RemoteProduct> {
        self.post(&format!("/v1/products/{id}"), params).await
    }

    async fn archive(&self, id: &str) -> Result<RemoteProduct> {
        self.post(&format!("/v1/products/{id}"), &archive_params()).await
    }

    async fn list_page(&self, starting_after: Option<String>) -> Result<Page<RemoteProduct>> {
        self.get("/v1/products", &list_query(starting_after)).await
    }
}

#[async_trait]
impl PriceResource for StripeClient {
    async fn create(&self, price: &NewPrice) -> Result<RemotePrice> {
        self.post("/v1/prices", &price_params(price)).await
    }

    async fn update(&self, id: &str, params: &UpdateParams) -> Result<RemotePrice> {
        self.post(&format!("/v1/prices/{id}"), params).await
    }

    async fn archive(&self, id: &str) -> Result<RemotePrice> {
        self.post(&format!("/v1/prices/{id}"), &archive_params()).await
    }

    async fn list_page_for_product(
        &self,
        product_id: &str,
        starting_after: Option<String>,
    ) -> Result<Page<RemotePrice>> {
        let mut query = list_query(starting_after);
        query.push((String::from("product"), product_id.to_string()));
        self.get("/v1/prices", &query).await
    }
}

impl ProviderClient for StripeClient {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Stripe
    }

    fn products(&self) -> &dyn ProductResource {
        self
    }

    fn prices(&self) -> &dyn PriceResource {
        self
    }
}
