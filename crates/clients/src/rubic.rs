//! Read-only client for the Rubic membership API.

use std::time::Duration;

use async_trait::async_trait;
use log::debug;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT};
use serde::Deserialize;

use ledgersync_core::endpoints::validate_endpoint;
use ledgersync_core::errors::{Error, Result};
use ledgersync_core::settings::SourceSettings;
use ledgersync_core::sync::{SourceClient, SourceCustomer, SourceInvoice, SourceProduct};

const DEFAULT_TIMEOUT_SECS: u64 = 30;
const API_KEY_HEADER: &str = "x-api-key";

#[derive(Debug, Deserialize)]
struct ApiErrorResponse {
    code: String,
    message: String,
}

/// Collection responses arrive wrapped in a `data` envelope.
#[derive(Debug, Deserialize)]
struct CollectionResponse<T> {
    data: Vec<T>,
}

#[derive(Debug, Clone)]
pub struct RubicClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl RubicClient {
    pub fn new(settings: &SourceSettings) -> Result<Self> {
        validate_endpoint(&settings.endpoint, "rubic")?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
            .build()
            .map_err(|e| Error::configuration(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: settings.endpoint.trim_end_matches('/').to_string(),
            api_key: settings.api_key.clone(),
        })
    }

    fn headers(&self) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        let key_value = HeaderValue::from_str(&self.api_key)
            .map_err(|_| Error::authentication("Invalid API key format"))?;
        headers.insert(API_KEY_HEADER, key_value);
        Ok(headers)
    }

    async fn fetch_collection<T: serde::de::DeserializeOwned>(&self, path: &str) -> Result<Vec<T>> {
        let url = format!("{}{}", self.base_url, path);
        debug!("Fetching {}", url);

        let response = self
            .client
            .get(&url)
            .headers(self.headers()?)
            .send()
            .await
            .map_err(|e| Error::source_fetch(format!("Request to {} failed: {}", path, e)))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| Error::source_fetch(format!("Reading {} response failed: {}", path, e)))?;

        if !status.is_success() {
            if let Ok(error) = serde_json::from_str::<ApiErrorResponse>(&body) {
                return Err(Error::source_fetch(format!(
                    "{} returned {}: {}: {}",
                    path, status, error.code, error.message
                )));
            }
            return Err(Error::source_fetch(format!(
                "{} returned {}: {}",
                path, status, body
            )));
        }

        let parsed: CollectionResponse<T> = serde_json::from_str(&body)
            .map_err(|e| Error::source_fetch(format!("Failed to parse {} response: {}", path, e)))?;
        Ok(parsed.data)
    }
}

#[async_trait]
impl SourceClient for RubicClient {
    async fn fetch_customers(&self) -> Result<Vec<SourceCustomer>> {
        self.fetch_collection("/v1/customers").await
    }

    async fn fetch_products(&self) -> Result<Vec<SourceProduct>> {
        self.fetch_collection("/v1/products").await
    }

    async fn fetch_invoices(&self) -> Result<Vec<SourceInvoice>> {
        self.fetch_collection("/v1/invoices").await
    }
}
