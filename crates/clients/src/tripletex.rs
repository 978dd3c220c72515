//! Client for the Tripletex accounting API.
//!
//! One client per target environment. Tripletex authenticates with a
//! short-lived session token created from the environment's consumer and
//! employee tokens; the session is cached and renewed transparently.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use log::debug;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use ledgersync_core::endpoints::validate_endpoint;
use ledgersync_core::errors::{Error, Result};
use ledgersync_core::settings::TargetEnvironment;
use ledgersync_core::sync::{
    InvoicePayment, SourceCustomer, SourceInvoice, SourceProduct, TargetClient,
    TargetClientFactory,
};

const DEFAULT_TIMEOUT_SECS: u64 = 30;
const SESSION_RENEWAL_MARGIN_SECS: i64 = 300;
const MAX_LOG_BODY_CHARS: usize = 512;

#[derive(Debug, Deserialize)]
struct ApiErrorResponse {
    message: String,
}

#[derive(Debug, Deserialize)]
struct ValueResponse<T> {
    value: T,
}

#[derive(Debug, Deserialize)]
struct IdRef {
    id: i64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SessionTokenResponse {
    token: String,
    expiration_date: String,
}

#[derive(Debug, Clone)]
struct Session {
    token: String,
    expires_at: DateTime<Utc>,
}

// ─────────────────────────────────────────────────────────────────────────
// Request payloads
// ─────────────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct AddressPayload {
    address_line1: Option<String>,
    postal_code: Option<String>,
    city: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CustomerPayload {
    name: String,
    email: Option<String>,
    phone_number: Option<String>,
    organization_number: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    physical_address: Option<AddressPayload>,
}

impl CustomerPayload {
    fn from_source(customer: &SourceCustomer) -> Self {
        let has_address = customer.postal_address.is_some()
            || customer.postal_code.is_some()
            || customer.city.is_some();
        Self {
            name: customer.name.clone(),
            email: customer.email.clone(),
            phone_number: customer.phone.clone(),
            organization_number: customer.organization_number.clone(),
            physical_address: has_address.then(|| AddressPayload {
                address_line1: customer.postal_address.clone(),
                postal_code: customer.postal_code.clone(),
                city: customer.city.clone(),
            }),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ProductPayload {
    name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    number: Option<String>,
    price_excluding_vat_currency: Decimal,
    currency_code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    vat_percent: Option<Decimal>,
}

impl ProductPayload {
    fn from_source(product: &SourceProduct) -> Self {
        Self {
            name: product.name.clone(),
            number: product.product_number.clone(),
            price_excluding_vat_currency: product.unit_price,
            currency_code: product.currency.clone(),
            vat_percent: product.vat_percent,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct OrderLinePayload {
    description: Option<String>,
    count: Decimal,
    unit_price_excluding_vat_currency: Decimal,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct InvoicePayload {
    invoice_number: String,
    invoice_date: String,
    invoice_due_date: String,
    currency_code: String,
    order_lines: Vec<OrderLinePayload>,
}

impl InvoicePayload {
    fn from_source(invoice: &SourceInvoice) -> Self {
        Self {
            invoice_number: invoice.invoice_number.clone(),
            invoice_date: invoice.issued_date.to_string(),
            invoice_due_date: invoice.due_date.to_string(),
            currency_code: invoice.currency.clone(),
            order_lines: invoice
                .lines
                .iter()
                .map(|line| OrderLinePayload {
                    description: line.description.clone(),
                    count: line.quantity,
                    unit_price_excluding_vat_currency: line.unit_price,
                })
                .collect(),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────
// Client
// ─────────────────────────────────────────────────────────────────────────

pub struct TripletexClient {
    client: reqwest::Client,
    base_url: String,
    consumer_token: String,
    employee_token: String,
    session: Mutex<Option<Session>>,
}

impl TripletexClient {
    pub fn new(environment: &TargetEnvironment) -> Result<Self> {
        validate_endpoint(&environment.endpoint, "tripletex")?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
            .build()
            .map_err(|e| Error::configuration(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: environment.endpoint.trim_end_matches('/').to_string(),
            consumer_token: environment.consumer_token.clone(),
            employee_token: environment.employee_token.clone(),
            session: Mutex::new(None),
        })
    }

    fn log_response(status: reqwest::StatusCode, body: &str) {
        if status.is_success() {
            debug!("API response status: {}", status);
            return;
        }
        let mut preview = body.chars().take(MAX_LOG_BODY_CHARS).collect::<String>();
        if body.chars().count() > MAX_LOG_BODY_CHARS {
            preview.push_str("...");
        }
        debug!("API response error ({}): {}", status, preview);
    }

    fn error_from_response(status: reqwest::StatusCode, body: &str) -> Error {
        let message = match serde_json::from_str::<ApiErrorResponse>(body) {
            Ok(error) => error.message,
            Err(_) => format!("Request failed: {}", body),
        };
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            return Error::authentication(message);
        }
        Error::api(status.as_u16(), message)
    }

    async fn parse_response<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T> {
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| Error::transport(e.to_string()))?;
        Self::log_response(status, &body);

        if !status.is_success() {
            return Err(Self::error_from_response(status, &body));
        }

        serde_json::from_str(&body).map_err(|e| {
            Error::api(status.as_u16(), format!("Failed to parse response: {}", e))
        })
    }

    async fn expect_success(response: reqwest::Response) -> Result<()> {
        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let body = response
            .text()
            .await
            .map_err(|e| Error::transport(e.to_string()))?;
        Self::log_response(status, &body);
        Err(Self::error_from_response(status, &body))
    }

    /// Return a valid session token, creating one when the cached session
    /// is absent or close to expiry.
    ///
    /// PUT /v2/token/session/:create
    async fn session_token(&self) -> Result<String> {
        let mut session = self.session.lock().await;
        if let Some(current) = session.as_ref() {
            let margin = ChronoDuration::seconds(SESSION_RENEWAL_MARGIN_SECS);
            if current.expires_at - margin > Utc::now() {
                return Ok(current.token.clone());
            }
        }

        let url = format!("{}/v2/token/session/:create", self.base_url);
        let expiration = (Utc::now() + ChronoDuration::days(1))
            .date_naive()
            .to_string();
        debug!("Creating Tripletex session token (expires {})", expiration);

        let response = self
            .client
            .put(&url)
            .query(&[
                ("consumerToken", self.consumer_token.as_str()),
                ("employeeToken", self.employee_token.as_str()),
                ("expirationDate", expiration.as_str()),
            ])
            .send()
            .await
            .map_err(|e| Error::transport(e.to_string()))?;
        let parsed: ValueResponse<SessionTokenResponse> = Self::parse_response(response).await?;

        let expires_at = parsed
            .value
            .expiration_date
            .parse::<chrono::NaiveDate>()
            .map(|d| {
                d.and_hms_opt(0, 0, 0)
                    .map(|dt| dt.and_utc())
                    .unwrap_or_else(Utc::now)
            })
            .unwrap_or_else(|_| Utc::now() + ChronoDuration::hours(1));

        let token = parsed.value.token;
        *session = Some(Session {
            token: token.clone(),
            expires_at,
        });
        Ok(token)
    }

    async fn post_for_id<B: Serialize>(&self, path: &str, body: &B) -> Result<String> {
        let token = self.session_token().await?;
        let url = format!("{}{}", self.base_url, path);
        let response = self
            .client
            .post(&url)
            .basic_auth("0", Some(&token))
            .json(body)
            .send()
            .await
            .map_err(|e| Error::transport(e.to_string()))?;
        let parsed: ValueResponse<IdRef> = Self::parse_response(response).await?;
        Ok(parsed.value.id.to_string())
    }

    async fn put_payload<B: Serialize>(&self, path: &str, body: &B) -> Result<()> {
        let token = self.session_token().await?;
        let url = format!("{}{}", self.base_url, path);
        let response = self
            .client
            .put(&url)
            .basic_auth("0", Some(&token))
            .json(body)
            .send()
            .await
            .map_err(|e| Error::transport(e.to_string()))?;
        Self::expect_success(response).await
    }
}

#[async_trait]
impl TargetClient for TripletexClient {
    async fn create_customer(&self, customer: &SourceCustomer) -> Result<String> {
        self.post_for_id("/v2/customer", &CustomerPayload::from_source(customer))
            .await
    }

    async fn update_customer(&self, target_id: &str, customer: &SourceCustomer) -> Result<()> {
        self.put_payload(
            &format!("/v2/customer/{}", target_id),
            &CustomerPayload::from_source(customer),
        )
        .await
    }

    async fn create_product(&self, product: &SourceProduct) -> Result<String> {
        self.post_for_id("/v2/product", &ProductPayload::from_source(product))
            .await
    }

    async fn update_product(&self, target_id: &str, product: &SourceProduct) -> Result<()> {
        self.put_payload(
            &format!("/v2/product/{}", target_id),
            &ProductPayload::from_source(product),
        )
        .await
    }

    async fn create_invoice(&self, invoice: &SourceInvoice) -> Result<String> {
        self.post_for_id("/v2/invoice", &InvoicePayload::from_source(invoice))
            .await
    }

    async fn update_invoice(&self, target_id: &str, invoice: &SourceInvoice) -> Result<()> {
        self.put_payload(
            &format!("/v2/invoice/{}", target_id),
            &InvoicePayload::from_source(invoice),
        )
        .await
    }

    /// PUT /v2/invoice/{id}/:payment
    async fn register_invoice_payment(
        &self,
        target_id: &str,
        payment: &InvoicePayment,
    ) -> Result<()> {
        let token = self.session_token().await?;
        let url = format!("{}/v2/invoice/{}/:payment", self.base_url, target_id);
        let response = self
            .client
            .put(&url)
            .basic_auth("0", Some(&token))
            .query(&[
                ("paymentDate", payment.paid_date.to_string()),
                ("paidAmount", payment.amount.to_string()),
            ])
            .send()
            .await
            .map_err(|e| Error::transport(e.to_string()))?;
        Self::expect_success(response).await
    }
}

/// Builds one [`TripletexClient`] per environment.
pub struct TripletexClientFactory;

impl TripletexClientFactory {
    pub fn new() -> Self {
        Self
    }
}

impl Default for TripletexClientFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl TargetClientFactory for TripletexClientFactory {
    fn create(&self, environment: &TargetEnvironment) -> Result<Arc<dyn TargetClient>> {
        Ok(Arc::new(TripletexClient::new(environment)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use rust_decimal_macros::dec;

    fn environment(endpoint: &str) -> TargetEnvironment {
        TargetEnvironment {
            id: "club-a".to_string(),
            endpoint: endpoint.to_string(),
            consumer_token: "consumer".to_string(),
            employee_token: "employee".to_string(),
            enabled: true,
        }
    }

    #[test]
    fn factory_rejects_disallowed_endpoint() {
        let factory = TripletexClientFactory::new();
        assert!(factory
            .create(&environment("https://tripletex.example.org/v2"))
            .is_err());
        assert!(factory
            .create(&environment("https://api-test.tripletex.tech/v2"))
            .is_ok());
    }

    #[test]
    fn customer_payload_omits_missing_address() {
        let customer = SourceCustomer {
            id: "cust-1".to_string(),
            name: "Acme AS".to_string(),
            email: Some("post@acme.no".to_string()),
            phone: None,
            organization_number: None,
            postal_address: None,
            postal_code: None,
            city: None,
        };
        let json =
            serde_json::to_value(CustomerPayload::from_source(&customer)).expect("serialize");
        assert_eq!(json["name"], "Acme AS");
        assert!(json.get("physicalAddress").is_none());

        let with_address = SourceCustomer {
            city: Some("Oslo".to_string()),
            ..customer
        };
        let json =
            serde_json::to_value(CustomerPayload::from_source(&with_address)).expect("serialize");
        assert_eq!(json["physicalAddress"]["city"], "Oslo");
    }

    #[test]
    fn invoice_payload_carries_lines_and_dates() {
        let invoice = SourceInvoice {
            id: "inv-1".to_string(),
            invoice_number: "2026-001".to_string(),
            customer_id: "cust-1".to_string(),
            issued_date: NaiveDate::from_ymd_opt(2026, 2, 1).unwrap(),
            due_date: NaiveDate::from_ymd_opt(2026, 2, 15).unwrap(),
            currency: "NOK".to_string(),
            total_amount: dec!(900),
            paid_amount: None,
            paid_date: None,
            lines: vec![ledgersync_core::sync::InvoiceLine {
                product_id: "prod-1".to_string(),
                description: Some("Medlemskontingent".to_string()),
                quantity: dec!(1),
                unit_price: dec!(900),
            }],
        };
        let json = serde_json::to_value(InvoicePayload::from_source(&invoice)).expect("serialize");
        assert_eq!(json["invoiceDate"], "2026-02-01");
        assert_eq!(json["invoiceDueDate"], "2026-02-15");
        assert_eq!(json["orderLines"][0]["description"], "Medlemskontingent");
    }

    #[test]
    fn create_response_value_id_parses() {
        let body = r#"{"value": {"id": 4211}}"#;
        let parsed: ValueResponse<IdRef> = serde_json::from_str(body).expect("parse");
        assert_eq!(parsed.value.id, 4211);
    }

    #[test]
    fn session_token_response_parses() {
        let body = r#"{"value": {"token": "abc123", "expirationDate": "2026-09-01"}}"#;
        let parsed: ValueResponse<SessionTokenResponse> =
            serde_json::from_str(body).expect("parse");
        assert_eq!(parsed.value.token, "abc123");
        assert_eq!(parsed.value.expiration_date, "2026-09-01");
    }

    #[test]
    fn auth_failures_map_to_authentication_errors() {
        let err = TripletexClient::error_from_response(
            reqwest::StatusCode::UNAUTHORIZED,
            r#"{"message": "Invalid session token"}"#,
        );
        assert!(matches!(err, Error::Authentication(_)));

        let err = TripletexClient::error_from_response(
            reqwest::StatusCode::UNPROCESSABLE_ENTITY,
            r#"{"message": "Organization number is invalid"}"#,
        );
        assert!(matches!(err, Error::Api { status: 422, .. }));
    }
}
