//! Reconciliation domain models shared by the engine, stores and clients.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Entity types the engine reconciles. Payments are a separate phase over
/// invoice mappings, not a mapped entity of their own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    Customers,
    Products,
    Invoices,
    Payments,
}

impl EntityType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityType::Customers => "customers",
            EntityType::Products => "products",
            EntityType::Invoices => "invoices",
            EntityType::Payments => "payments",
        }
    }

    /// Mapping table backing this entity type, if it has one.
    pub fn mapped_entity(&self) -> Option<MappedEntity> {
        match self {
            EntityType::Customers => Some(MappedEntity::Customer),
            EntityType::Products => Some(MappedEntity::Product),
            EntityType::Invoices => Some(MappedEntity::Invoice),
            EntityType::Payments => None,
        }
    }
}

impl std::str::FromStr for EntityType {
    type Err = String;

    fn from_str(value: &str) -> std::result::Result<Self, Self::Err> {
        match value {
            "customers" => Ok(EntityType::Customers),
            "products" => Ok(EntityType::Products),
            "invoices" => Ok(EntityType::Invoices),
            "payments" => Ok(EntityType::Payments),
            other => Err(format!("Unknown entity type '{}'", other)),
        }
    }
}

/// Entities with a persisted source-id -> target-id mapping table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MappedEntity {
    Customer,
    Product,
    Invoice,
}

impl MappedEntity {
    pub fn as_str(&self) -> &'static str {
        match self {
            MappedEntity::Customer => "customer",
            MappedEntity::Product => "product",
            MappedEntity::Invoice => "invoice",
        }
    }
}

/// Lifecycle status of one sync run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncRunStatus {
    Running,
    Success,
    Failed,
}

/// One tracked reconciliation attempt for one entity type against one
/// environment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncRun {
    pub id: String,
    pub entity_type: EntityType,
    pub environment: String,
    pub status: SyncRunStatus,
    pub records_processed: i64,
    pub records_failed: i64,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
}

/// Terminal bookkeeping for a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunCompletion {
    pub status: SyncRunStatus,
    pub records_processed: i64,
    pub records_failed: i64,
    pub completed_at: DateTime<Utc>,
    pub error_message: Option<String>,
}

/// Persisted correspondence between a source entity and its target twin.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityMapping {
    pub source_id: String,
    pub target_id: String,
    /// Digest of the syncable fields at last successful write. None until
    /// the first sync completes.
    pub content_hash: Option<String>,
    pub last_synced_at: DateTime<Utc>,
}

/// Write request for a mapping row. Keyed by the immutable source id, so
/// retries are safe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MappingUpsert {
    pub source_id: String,
    pub target_id: String,
    pub content_hash: String,
    pub synced_at: DateTime<Utc>,
    /// Human-facing invoice number; only meaningful for invoice mappings.
    pub invoice_number: Option<String>,
}

/// Invoice mapping view used by the payment phase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvoiceMappingInfo {
    pub source_id: String,
    pub target_id: String,
    pub invoice_number: String,
    pub payment_synced: bool,
}

/// Counters returned by one engine pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncOutcome {
    pub processed: i64,
    pub failed: i64,
}

impl SyncOutcome {
    /// Sentinel distinguishing "could not start" (source fetch failed)
    /// from "ran with partial failures".
    pub const SOURCE_FETCH_FAILED: SyncOutcome = SyncOutcome {
        processed: 0,
        failed: -1,
    };

    pub fn is_fetch_failure(&self) -> bool {
        self.failed < 0
    }
}

/// Result of invoking the engine for one (entity type, environment) pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// The run went to a terminal status; counters are in the outcome.
    Completed(SyncOutcome),
    /// Another run is active for the same pair; nothing was done.
    AlreadyRunning,
}

/// Per-environment status reported by the orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnvironmentSyncStatus {
    Completed,
    AlreadyRunning,
    Failed,
}

/// One environment's entry in the orchestrator response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnvironmentSyncResult {
    pub status: EnvironmentSyncStatus,
    pub processed: i64,
    pub failed: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl EnvironmentSyncResult {
    pub fn completed(outcome: SyncOutcome) -> Self {
        Self {
            status: EnvironmentSyncStatus::Completed,
            processed: outcome.processed,
            failed: outcome.failed,
            error: None,
        }
    }

    pub fn already_running() -> Self {
        Self {
            status: EnvironmentSyncStatus::AlreadyRunning,
            processed: 0,
            failed: 0,
            error: None,
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            status: EnvironmentSyncStatus::Failed,
            processed: 0,
            failed: 0,
            error: Some(message.into()),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────
// Source entities
// ─────────────────────────────────────────────────────────────────────────

/// Customer as exposed by the source system.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceCustomer {
    pub id: String,
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub organization_number: Option<String>,
    pub postal_address: Option<String>,
    pub postal_code: Option<String>,
    pub city: Option<String>,
}

/// Product as exposed by the source system.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceProduct {
    pub id: String,
    pub name: String,
    pub product_number: Option<String>,
    pub unit_price: Decimal,
    pub currency: String,
    pub vat_percent: Option<Decimal>,
}

/// One line on a source invoice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvoiceLine {
    pub product_id: String,
    pub description: Option<String>,
    pub quantity: Decimal,
    pub unit_price: Decimal,
}

/// Invoice as exposed by the source system. Payment fields are carried on
/// the invoice; the payment phase reads them through [`SourceInvoice::payment`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceInvoice {
    pub id: String,
    pub invoice_number: String,
    pub customer_id: String,
    pub issued_date: NaiveDate,
    pub due_date: NaiveDate,
    pub currency: String,
    pub total_amount: Decimal,
    pub paid_amount: Option<Decimal>,
    pub paid_date: Option<NaiveDate>,
    pub lines: Vec<InvoiceLine>,
}

/// A registered payment against an invoice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvoicePayment {
    pub amount: Decimal,
    pub paid_date: NaiveDate,
}

impl SourceInvoice {
    /// Payment carried on this invoice, if both amount and date are present.
    pub fn payment(&self) -> Option<InvoicePayment> {
        match (self.paid_amount, self.paid_date) {
            (Some(amount), Some(paid_date)) => Some(InvoicePayment { amount, paid_date }),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entity_type_serialization_matches_run_table_contract() {
        let actual = [
            EntityType::Customers,
            EntityType::Products,
            EntityType::Invoices,
            EntityType::Payments,
        ]
        .iter()
        .map(|entity| serde_json::to_string(entity).expect("serialize entity type"))
        .collect::<Vec<_>>();

        let expected = vec!["\"customers\"", "\"products\"", "\"invoices\"", "\"payments\""];
        assert_eq!(actual, expected);
    }

    #[test]
    fn entity_type_round_trips_from_str() {
        for entity in [
            EntityType::Customers,
            EntityType::Products,
            EntityType::Invoices,
            EntityType::Payments,
        ] {
            let parsed: EntityType = entity.as_str().parse().expect("parse entity type");
            assert_eq!(parsed, entity);
        }
        assert!("prospects".parse::<EntityType>().is_err());
    }

    #[test]
    fn payments_have_no_mapping_table() {
        assert_eq!(EntityType::Payments.mapped_entity(), None);
        assert_eq!(
            EntityType::Invoices.mapped_entity(),
            Some(MappedEntity::Invoice)
        );
    }

    #[test]
    fn fetch_failure_sentinel_is_distinguishable() {
        assert!(SyncOutcome::SOURCE_FETCH_FAILED.is_fetch_failure());
        assert!(!SyncOutcome {
            processed: 0,
            failed: 0
        }
        .is_fetch_failure());
    }

    #[test]
    fn invoice_payment_requires_amount_and_date() {
        use rust_decimal_macros::dec;

        let mut invoice = SourceInvoice {
            id: "inv-1".to_string(),
            invoice_number: "2026-001".to_string(),
            customer_id: "cust-1".to_string(),
            issued_date: NaiveDate::from_ymd_opt(2026, 1, 10).unwrap(),
            due_date: NaiveDate::from_ymd_opt(2026, 1, 24).unwrap(),
            currency: "NOK".to_string(),
            total_amount: dec!(1250.00),
            paid_amount: Some(dec!(1250.00)),
            paid_date: None,
            lines: Vec::new(),
        };
        assert!(invoice.payment().is_none());

        invoice.paid_date = NaiveDate::from_ymd_opt(2026, 1, 20);
        let payment = invoice.payment().expect("payment present");
        assert_eq!(payment.amount, dec!(1250.00));
    }
}
