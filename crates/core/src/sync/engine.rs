//! The reconciliation engine: hash-based diff/upsert of one entity type
//! against one target environment.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use log::{debug, warn};

use crate::errors::{Error, Result};

use super::clients::{SourceClient, TargetClient};
use super::hash::ContentHash;
use super::model::{
    EntityType, InvoicePayment, InvoiceMappingInfo, MappedEntity, MappingUpsert, RunCompletion,
    RunOutcome, SourceCustomer, SourceInvoice, SourceProduct, SyncOutcome, SyncRunStatus,
};
use super::store::{MappingRepositoryTrait, SyncRunRepositoryTrait};

/// One source entity normalized for the reconciliation loop.
struct SourceRecord {
    source_id: String,
    content_hash: String,
    invoice_number: Option<String>,
    payload: RecordPayload,
}

enum RecordPayload {
    Customer(SourceCustomer),
    Product(SourceProduct),
    Invoice(SourceInvoice),
}

impl SourceRecord {
    fn customer(customer: SourceCustomer) -> Self {
        Self {
            source_id: customer.id.clone(),
            content_hash: customer.content_hash(),
            invoice_number: None,
            payload: RecordPayload::Customer(customer),
        }
    }

    fn product(product: SourceProduct) -> Self {
        Self {
            source_id: product.id.clone(),
            content_hash: product.content_hash(),
            invoice_number: None,
            payload: RecordPayload::Product(product),
        }
    }

    fn invoice(invoice: SourceInvoice) -> Self {
        Self {
            source_id: invoice.id.clone(),
            content_hash: invoice.content_hash(),
            invoice_number: Some(invoice.invoice_number.clone()),
            payload: RecordPayload::Invoice(invoice),
        }
    }
}

/// Executes reconciliation for one target environment.
///
/// Clients and stores are injected so tests substitute fakes; the engine
/// owns no global state.
pub struct ReconciliationEngine {
    environment: String,
    source: Arc<dyn SourceClient>,
    target: Arc<dyn TargetClient>,
    mappings: Arc<dyn MappingRepositoryTrait>,
    runs: Arc<dyn SyncRunRepositoryTrait>,
}

impl ReconciliationEngine {
    pub fn new(
        environment: impl Into<String>,
        source: Arc<dyn SourceClient>,
        target: Arc<dyn TargetClient>,
        mappings: Arc<dyn MappingRepositoryTrait>,
        runs: Arc<dyn SyncRunRepositoryTrait>,
    ) -> Self {
        Self {
            environment: environment.into(),
            source,
            target,
            mappings,
            runs,
        }
    }

    /// Run reconciliation for one entity type.
    ///
    /// Returns [`RunOutcome::AlreadyRunning`] without touching anything when
    /// a run for the same (entity type, environment) pair is still active.
    /// A failed source fetch terminates the run and yields the
    /// [`SyncOutcome::SOURCE_FETCH_FAILED`] sentinel; per-record failures
    /// are tallied and never abort the pass.
    pub async fn run(&self, entity: EntityType) -> Result<RunOutcome> {
        if let Some(active) = self.runs.find_running(entity)? {
            warn!(
                "Skipping {} sync for environment '{}': run {} is still active",
                entity.as_str(),
                self.environment,
                active.id
            );
            return Ok(RunOutcome::AlreadyRunning);
        }

        let run_id = match self.runs.start(entity, Utc::now()).await {
            Ok(run_id) => run_id,
            Err(Error::RunAlreadyActive { .. }) => return Ok(RunOutcome::AlreadyRunning),
            Err(err) => return Err(err),
        };
        debug!(
            "Started {} sync run {} for environment '{}'",
            entity.as_str(),
            run_id,
            self.environment
        );

        let outcome = match entity.mapped_entity() {
            Some(mapped) => self.reconcile_mapped(entity, mapped, &run_id).await?,
            None => self.reconcile_payments(&run_id).await?,
        };
        Ok(RunOutcome::Completed(outcome))
    }

    // ─────────────────────────────────────────────────────────────────────
    // Phase 1: mapped entities (customers, products, invoices)
    // ─────────────────────────────────────────────────────────────────────

    async fn reconcile_mapped(
        &self,
        entity: EntityType,
        mapped: MappedEntity,
        run_id: &str,
    ) -> Result<SyncOutcome> {
        let records = match self.fetch_records(entity).await {
            Ok(records) => records,
            Err(err) => {
                self.fail_run(run_id, err.to_string()).await?;
                return Ok(SyncOutcome::SOURCE_FETCH_FAILED);
            }
        };

        let total = records.len();
        let mut processed = 0i64;
        let mut failed = 0i64;
        for record in &records {
            match self.sync_record(mapped, record).await {
                Ok(true) => processed += 1,
                Ok(false) => {}
                Err(err) => {
                    failed += 1;
                    warn!(
                        "{} '{}' failed to sync to environment '{}': {}",
                        mapped.as_str(),
                        record.source_id,
                        self.environment,
                        err
                    );
                }
            }
        }

        self.finish_run(run_id, processed, failed, total).await?;
        Ok(SyncOutcome { processed, failed })
    }

    async fn fetch_records(&self, entity: EntityType) -> Result<Vec<SourceRecord>> {
        let records = match entity {
            EntityType::Customers => self
                .source
                .fetch_customers()
                .await?
                .into_iter()
                .map(SourceRecord::customer)
                .collect(),
            EntityType::Products => self
                .source
                .fetch_products()
                .await?
                .into_iter()
                .map(SourceRecord::product)
                .collect(),
            EntityType::Invoices => self
                .source
                .fetch_invoices()
                .await?
                .into_iter()
                .map(SourceRecord::invoice)
                .collect(),
            EntityType::Payments => Vec::new(),
        };
        Ok(records)
    }

    /// Returns Ok(true) when a target write happened, Ok(false) on a
    /// hash-unchanged skip. A persistence failure after a successful target
    /// write surfaces as a record failure; the upsert is idempotent so the
    /// next run repairs the mapping.
    async fn sync_record(&self, mapped: MappedEntity, record: &SourceRecord) -> Result<bool> {
        let existing = self.mappings.find(mapped, &record.source_id)?;

        let target_id = match existing {
            Some(mapping) => {
                if mapping.content_hash.as_deref() == Some(record.content_hash.as_str()) {
                    return Ok(false);
                }
                self.update_record(&mapping.target_id, &record.payload)
                    .await?;
                mapping.target_id
            }
            None => self.create_record(&record.payload).await?,
        };

        self.mappings
            .upsert(
                mapped,
                MappingUpsert {
                    source_id: record.source_id.clone(),
                    target_id,
                    content_hash: record.content_hash.clone(),
                    synced_at: Utc::now(),
                    invoice_number: record.invoice_number.clone(),
                },
            )
            .await?;
        Ok(true)
    }

    async fn create_record(&self, payload: &RecordPayload) -> Result<String> {
        match payload {
            RecordPayload::Customer(customer) => self.target.create_customer(customer).await,
            RecordPayload::Product(product) => self.target.create_product(product).await,
            RecordPayload::Invoice(invoice) => self.target.create_invoice(invoice).await,
        }
    }

    async fn update_record(&self, target_id: &str, payload: &RecordPayload) -> Result<()> {
        match payload {
            RecordPayload::Customer(customer) => {
                self.target.update_customer(target_id, customer).await
            }
            RecordPayload::Product(product) => self.target.update_product(target_id, product).await,
            RecordPayload::Invoice(invoice) => self.target.update_invoice(target_id, invoice).await,
        }
    }

    // ─────────────────────────────────────────────────────────────────────
    // Phase 2: payments over existing invoice mappings
    // ─────────────────────────────────────────────────────────────────────

    /// Propagates payments for invoice mappings with `payment_synced = false`.
    /// Never creates an invoice mapping and never touches `target_id` or
    /// `content_hash`; a flagged invoice leaves the candidate set for good.
    async fn reconcile_payments(&self, run_id: &str) -> Result<SyncOutcome> {
        let invoices = match self.source.fetch_invoices().await {
            Ok(invoices) => invoices,
            Err(err) => {
                self.fail_run(run_id, err.to_string()).await?;
                return Ok(SyncOutcome::SOURCE_FETCH_FAILED);
            }
        };
        let by_source_id: HashMap<&str, &SourceInvoice> = invoices
            .iter()
            .map(|invoice| (invoice.id.as_str(), invoice))
            .collect();

        let pending = match self.mappings.list_pending_payment_invoices() {
            Ok(pending) => pending,
            Err(err) => {
                self.fail_run(run_id, err.to_string()).await?;
                return Err(err);
            }
        };

        let total = pending.len();
        let mut processed = 0i64;
        let mut failed = 0i64;
        for mapping in &pending {
            let Some(invoice) = by_source_id.get(mapping.source_id.as_str()) else {
                // Invoice left the source set; nothing to propagate.
                continue;
            };
            let Some(payment) = invoice.payment() else {
                continue;
            };
            match self.propagate_payment(mapping, &payment).await {
                Ok(()) => processed += 1,
                Err(err) => {
                    failed += 1;
                    warn!(
                        "Payment for invoice {} ('{}') failed in environment '{}': {}",
                        mapping.source_id, mapping.invoice_number, self.environment, err
                    );
                }
            }
        }

        self.finish_run(run_id, processed, failed, total).await?;
        Ok(SyncOutcome { processed, failed })
    }

    async fn propagate_payment(
        &self,
        mapping: &InvoiceMappingInfo,
        payment: &InvoicePayment,
    ) -> Result<()> {
        self.target
            .register_invoice_payment(&mapping.target_id, payment)
            .await?;
        self.mappings
            .mark_invoice_payment_synced(&mapping.source_id)
            .await
    }

    // ─────────────────────────────────────────────────────────────────────
    // Run bookkeeping
    // ─────────────────────────────────────────────────────────────────────

    async fn finish_run(
        &self,
        run_id: &str,
        processed: i64,
        failed: i64,
        total: usize,
    ) -> Result<()> {
        let status = if failed > 0 {
            SyncRunStatus::Failed
        } else {
            SyncRunStatus::Success
        };
        let error_message =
            (failed > 0).then(|| format!("{} of {} records failed to sync", failed, total));
        self.runs
            .complete(
                run_id,
                RunCompletion {
                    status,
                    records_processed: processed,
                    records_failed: failed,
                    completed_at: Utc::now(),
                    error_message,
                },
            )
            .await
    }

    async fn fail_run(&self, run_id: &str, message: String) -> Result<()> {
        self.runs
            .complete(
                run_id,
                RunCompletion {
                    status: SyncRunStatus::Failed,
                    records_processed: 0,
                    records_failed: 0,
                    completed_at: Utc::now(),
                    error_message: Some(message),
                },
            )
            .await
    }
}
