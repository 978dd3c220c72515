//! Engine and orchestrator tests against in-memory fakes injected through
//! the client/store trait seams.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal_macros::dec;
use uuid::Uuid;

use crate::errors::{Error, Result};
use crate::settings::TargetEnvironment;

use super::*;

// ─────────────────────────────────────────────────────────────────────────
// Fakes
// ─────────────────────────────────────────────────────────────────────────

#[derive(Default)]
struct FakeSource {
    customers: Mutex<Vec<SourceCustomer>>,
    products: Mutex<Vec<SourceProduct>>,
    invoices: Mutex<Vec<SourceInvoice>>,
    failures_remaining: AtomicUsize,
    fetch_calls: AtomicUsize,
}

impl FakeSource {
    fn with_customers(customers: Vec<SourceCustomer>) -> Arc<Self> {
        let source = Self::default();
        *source.customers.lock().unwrap() = customers;
        Arc::new(source)
    }

    fn with_invoices(invoices: Vec<SourceInvoice>) -> Arc<Self> {
        let source = Self::default();
        *source.invoices.lock().unwrap() = invoices;
        Arc::new(source)
    }

    fn set_customers(&self, customers: Vec<SourceCustomer>) {
        *self.customers.lock().unwrap() = customers;
    }

    fn set_invoices(&self, invoices: Vec<SourceInvoice>) {
        *self.invoices.lock().unwrap() = invoices;
    }

    /// Make the next `count` fetches fail before recovering.
    fn fail_next_fetches(&self, count: usize) {
        self.failures_remaining.store(count, Ordering::SeqCst);
    }

    fn fetch_count(&self) -> usize {
        self.fetch_calls.load(Ordering::SeqCst)
    }

    fn gate(&self) -> Result<()> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        loop {
            let remaining = self.failures_remaining.load(Ordering::SeqCst);
            if remaining == 0 {
                return Ok(());
            }
            if self
                .failures_remaining
                .compare_exchange(remaining, remaining - 1, Ordering::SeqCst, Ordering::SeqCst)
                .is_ok()
            {
                return Err(Error::source_fetch("source system unavailable"));
            }
        }
    }
}

#[async_trait]
impl SourceClient for FakeSource {
    async fn fetch_customers(&self) -> Result<Vec<SourceCustomer>> {
        self.gate()?;
        Ok(self.customers.lock().unwrap().clone())
    }

    async fn fetch_products(&self) -> Result<Vec<SourceProduct>> {
        self.gate()?;
        Ok(self.products.lock().unwrap().clone())
    }

    async fn fetch_invoices(&self) -> Result<Vec<SourceInvoice>> {
        self.gate()?;
        Ok(self.invoices.lock().unwrap().clone())
    }
}

#[derive(Default)]
struct FakeTarget {
    next_id: AtomicUsize,
    create_calls: AtomicUsize,
    update_calls: AtomicUsize,
    payment_calls: AtomicUsize,
    rejected_ids: Mutex<HashSet<String>>,
    payments: Mutex<Vec<(String, InvoicePayment)>>,
}

impl FakeTarget {
    fn reject(&self, id: &str) {
        self.rejected_ids.lock().unwrap().insert(id.to_string());
    }

    fn total_calls(&self) -> usize {
        self.create_calls.load(Ordering::SeqCst)
            + self.update_calls.load(Ordering::SeqCst)
            + self.payment_calls.load(Ordering::SeqCst)
    }

    fn check(&self, id: &str) -> Result<()> {
        if self.rejected_ids.lock().unwrap().contains(id) {
            return Err(Error::api(422, format!("'{}' rejected by target", id)));
        }
        Ok(())
    }

    fn allocate_id(&self) -> String {
        format!("T-{}", self.next_id.fetch_add(1, Ordering::SeqCst) + 1)
    }
}

#[async_trait]
impl TargetClient for FakeTarget {
    async fn create_customer(&self, customer: &SourceCustomer) -> Result<String> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        self.check(&customer.id)?;
        Ok(self.allocate_id())
    }

    async fn update_customer(&self, _target_id: &str, customer: &SourceCustomer) -> Result<()> {
        self.update_calls.fetch_add(1, Ordering::SeqCst);
        self.check(&customer.id)
    }

    async fn create_product(&self, product: &SourceProduct) -> Result<String> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        self.check(&product.id)?;
        Ok(self.allocate_id())
    }

    async fn update_product(&self, _target_id: &str, product: &SourceProduct) -> Result<()> {
        self.update_calls.fetch_add(1, Ordering::SeqCst);
        self.check(&product.id)
    }

    async fn create_invoice(&self, invoice: &SourceInvoice) -> Result<String> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        self.check(&invoice.id)?;
        Ok(self.allocate_id())
    }

    async fn update_invoice(&self, _target_id: &str, invoice: &SourceInvoice) -> Result<()> {
        self.update_calls.fetch_add(1, Ordering::SeqCst);
        self.check(&invoice.id)
    }

    async fn register_invoice_payment(
        &self,
        target_id: &str,
        payment: &InvoicePayment,
    ) -> Result<()> {
        self.payment_calls.fetch_add(1, Ordering::SeqCst);
        self.check(target_id)?;
        self.payments
            .lock()
            .unwrap()
            .push((target_id.to_string(), payment.clone()));
        Ok(())
    }
}

#[derive(Default)]
struct FakeMappings {
    rows: Mutex<HashMap<(MappedEntity, String), EntityMapping>>,
    // source_id -> (invoice_number, payment_synced)
    invoice_meta: Mutex<HashMap<String, (String, bool)>>,
    fail_upserts: AtomicBool,
}

impl FakeMappings {
    fn mapping(&self, entity: MappedEntity, source_id: &str) -> Option<EntityMapping> {
        self.rows
            .lock()
            .unwrap()
            .get(&(entity, source_id.to_string()))
            .cloned()
    }

    fn payment_synced(&self, source_id: &str) -> Option<bool> {
        self.invoice_meta
            .lock()
            .unwrap()
            .get(source_id)
            .map(|(_, synced)| *synced)
    }
}

#[async_trait]
impl MappingRepositoryTrait for FakeMappings {
    fn find(&self, entity: MappedEntity, source_id: &str) -> Result<Option<EntityMapping>> {
        Ok(self.mapping(entity, source_id))
    }

    async fn upsert(&self, entity: MappedEntity, upsert: MappingUpsert) -> Result<()> {
        if self.fail_upserts.load(Ordering::SeqCst) {
            return Err(Error::database("mapping write refused"));
        }
        if entity == MappedEntity::Invoice {
            self.invoice_meta
                .lock()
                .unwrap()
                .entry(upsert.source_id.clone())
                .or_insert_with(|| (upsert.invoice_number.clone().unwrap_or_default(), false));
        }
        self.rows.lock().unwrap().insert(
            (entity, upsert.source_id.clone()),
            EntityMapping {
                source_id: upsert.source_id,
                target_id: upsert.target_id,
                content_hash: Some(upsert.content_hash),
                last_synced_at: upsert.synced_at,
            },
        );
        Ok(())
    }

    fn list_pending_payment_invoices(&self) -> Result<Vec<InvoiceMappingInfo>> {
        let rows = self.rows.lock().unwrap();
        let meta = self.invoice_meta.lock().unwrap();
        let mut pending = Vec::new();
        for ((entity, source_id), mapping) in rows.iter() {
            if *entity != MappedEntity::Invoice {
                continue;
            }
            let Some((invoice_number, payment_synced)) = meta.get(source_id) else {
                continue;
            };
            if *payment_synced {
                continue;
            }
            pending.push(InvoiceMappingInfo {
                source_id: source_id.clone(),
                target_id: mapping.target_id.clone(),
                invoice_number: invoice_number.clone(),
                payment_synced: false,
            });
        }
        pending.sort_by(|a, b| a.source_id.cmp(&b.source_id));
        Ok(pending)
    }

    async fn mark_invoice_payment_synced(&self, source_id: &str) -> Result<()> {
        let mut meta = self.invoice_meta.lock().unwrap();
        match meta.get_mut(source_id) {
            Some((_, payment_synced)) => {
                *payment_synced = true;
                Ok(())
            }
            None => Err(Error::database(format!(
                "No invoice mapping for '{}'",
                source_id
            ))),
        }
    }
}

#[derive(Default)]
struct FakeRuns {
    environment: String,
    rows: Mutex<Vec<SyncRun>>,
}

impl FakeRuns {
    fn for_environment(environment: &str) -> Self {
        Self {
            environment: environment.to_string(),
            rows: Mutex::new(Vec::new()),
        }
    }

    fn latest(&self, entity: EntityType) -> Option<SyncRun> {
        self.rows
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|run| run.entity_type == entity)
            .cloned()
    }
}

#[async_trait]
impl SyncRunRepositoryTrait for FakeRuns {
    fn find_running(&self, entity: EntityType) -> Result<Option<SyncRun>> {
        Ok(self
            .rows
            .lock()
            .unwrap()
            .iter()
            .find(|run| run.entity_type == entity && run.status == SyncRunStatus::Running)
            .cloned())
    }

    async fn start(&self, entity: EntityType, started_at: DateTime<Utc>) -> Result<String> {
        let mut rows = self.rows.lock().unwrap();
        if rows
            .iter()
            .any(|run| run.entity_type == entity && run.status == SyncRunStatus::Running)
        {
            return Err(Error::RunAlreadyActive {
                entity: entity.as_str().to_string(),
                environment: self.environment.clone(),
            });
        }
        let id = Uuid::new_v4().to_string();
        rows.push(SyncRun {
            id: id.clone(),
            entity_type: entity,
            environment: self.environment.clone(),
            status: SyncRunStatus::Running,
            records_processed: 0,
            records_failed: 0,
            started_at,
            completed_at: None,
            error_message: None,
        });
        Ok(id)
    }

    async fn complete(&self, run_id: &str, completion: RunCompletion) -> Result<()> {
        let mut rows = self.rows.lock().unwrap();
        let run = rows
            .iter_mut()
            .find(|run| run.id == run_id)
            .ok_or_else(|| Error::database(format!("No sync run '{}'", run_id)))?;
        run.status = completion.status;
        run.records_processed = completion.records_processed;
        run.records_failed = completion.records_failed;
        run.completed_at = Some(completion.completed_at);
        run.error_message = completion.error_message;
        Ok(())
    }

    fn list_recent(&self, entity: Option<EntityType>, limit: i64) -> Result<Vec<SyncRun>> {
        let rows = self.rows.lock().unwrap();
        Ok(rows
            .iter()
            .rev()
            .filter(|run| entity.map_or(true, |e| run.entity_type == e))
            .take(limit as usize)
            .cloned()
            .collect())
    }
}

// ─────────────────────────────────────────────────────────────────────────
// Fixtures and harness
// ─────────────────────────────────────────────────────────────────────────

fn customer(id: &str, name: &str, email: &str) -> SourceCustomer {
    SourceCustomer {
        id: id.to_string(),
        name: name.to_string(),
        email: Some(email.to_string()),
        phone: None,
        organization_number: None,
        postal_address: None,
        postal_code: None,
        city: None,
    }
}

fn invoice(id: &str, number: &str, paid: bool) -> SourceInvoice {
    SourceInvoice {
        id: id.to_string(),
        invoice_number: number.to_string(),
        customer_id: "cust-1".to_string(),
        issued_date: NaiveDate::from_ymd_opt(2026, 2, 1).unwrap(),
        due_date: NaiveDate::from_ymd_opt(2026, 2, 15).unwrap(),
        currency: "NOK".to_string(),
        total_amount: dec!(900),
        paid_amount: paid.then(|| dec!(900)),
        paid_date: paid.then(|| NaiveDate::from_ymd_opt(2026, 2, 10).unwrap()),
        lines: vec![InvoiceLine {
            product_id: "prod-1".to_string(),
            description: None,
            quantity: dec!(1),
            unit_price: dec!(900),
        }],
    }
}

struct Harness {
    source: Arc<FakeSource>,
    target: Arc<FakeTarget>,
    mappings: Arc<FakeMappings>,
    runs: Arc<FakeRuns>,
    engine: ReconciliationEngine,
}

fn harness(source: Arc<FakeSource>) -> Harness {
    let target = Arc::new(FakeTarget::default());
    let mappings = Arc::new(FakeMappings::default());
    let runs = Arc::new(FakeRuns::for_environment("test"));
    let engine = ReconciliationEngine::new(
        "test",
        Arc::clone(&source) as Arc<dyn SourceClient>,
        Arc::clone(&target) as Arc<dyn TargetClient>,
        Arc::clone(&mappings) as Arc<dyn MappingRepositoryTrait>,
        Arc::clone(&runs) as Arc<dyn SyncRunRepositoryTrait>,
    );
    Harness {
        source,
        target,
        mappings,
        runs,
        engine,
    }
}

fn completed(outcome: RunOutcome) -> SyncOutcome {
    match outcome {
        RunOutcome::Completed(outcome) => outcome,
        RunOutcome::AlreadyRunning => panic!("expected a completed run"),
    }
}

// ─────────────────────────────────────────────────────────────────────────
// Engine
// ─────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn unchanged_source_set_is_idempotent() {
    let source = FakeSource::with_customers(vec![
        customer("cust-1", "Acme AS", "post@acme.no"),
        customer("cust-2", "Borre IL", "post@borre.no"),
    ]);
    let h = harness(source);

    let first = completed(h.engine.run(EntityType::Customers).await.expect("first run"));
    assert_eq!(first, SyncOutcome { processed: 2, failed: 0 });
    assert_eq!(h.target.total_calls(), 2);

    let synced_at = h
        .mappings
        .mapping(MappedEntity::Customer, "cust-1")
        .expect("mapping exists")
        .last_synced_at;

    let second = completed(h.engine.run(EntityType::Customers).await.expect("second run"));
    assert_eq!(second, SyncOutcome { processed: 0, failed: 0 });
    // Skips make no network calls and do not advance last_synced_at.
    assert_eq!(h.target.total_calls(), 2);
    assert_eq!(
        h.mappings
            .mapping(MappedEntity::Customer, "cust-1")
            .unwrap()
            .last_synced_at,
        synced_at
    );

    let run = h.runs.latest(EntityType::Customers).expect("run recorded");
    assert_eq!(run.status, SyncRunStatus::Success);
    assert!(run.completed_at.is_some());
}

#[tokio::test]
async fn mutating_one_field_yields_exactly_one_update() {
    let source = FakeSource::with_customers(vec![
        customer("cust-1", "Acme AS", "post@acme.no"),
        customer("cust-2", "Borre IL", "post@borre.no"),
    ]);
    let h = harness(source);
    completed(h.engine.run(EntityType::Customers).await.expect("seed run"));
    let target_id = h
        .mappings
        .mapping(MappedEntity::Customer, "cust-2")
        .unwrap()
        .target_id;
    let old_hash = h
        .mappings
        .mapping(MappedEntity::Customer, "cust-2")
        .unwrap()
        .content_hash;

    h.source.set_customers(vec![
        customer("cust-1", "Acme AS", "post@acme.no"),
        customer("cust-2", "Borre IL", "faktura@borre.no"),
    ]);

    let outcome = completed(h.engine.run(EntityType::Customers).await.expect("run"));
    assert_eq!(outcome, SyncOutcome { processed: 1, failed: 0 });
    assert_eq!(h.target.update_calls.load(Ordering::SeqCst), 1);
    assert_eq!(h.target.create_calls.load(Ordering::SeqCst), 2);

    let mapping = h.mappings.mapping(MappedEntity::Customer, "cust-2").unwrap();
    assert_eq!(mapping.target_id, target_id, "target id is immutable");
    assert_ne!(mapping.content_hash, old_hash, "hash advanced on update");
}

#[tokio::test]
async fn one_rejected_record_does_not_abort_the_run() {
    let source = FakeSource::with_customers(vec![
        customer("cust-1", "Acme AS", "post@acme.no"),
        customer("cust-2", "Borre IL", "post@borre.no"),
        customer("cust-3", "Casa SA", "post@casa.no"),
    ]);
    let h = harness(source);
    h.target.reject("cust-2");

    let outcome = completed(h.engine.run(EntityType::Customers).await.expect("run"));
    assert_eq!(outcome, SyncOutcome { processed: 2, failed: 1 });

    // No mapping is written for a failed target write.
    assert!(h.mappings.mapping(MappedEntity::Customer, "cust-2").is_none());

    let run = h.runs.latest(EntityType::Customers).expect("run recorded");
    assert_eq!(run.status, SyncRunStatus::Failed);
    assert_eq!(run.records_processed, 2);
    assert_eq!(run.records_failed, 1);
    assert_eq!(
        run.error_message.as_deref(),
        Some("1 of 3 records failed to sync")
    );
}

#[tokio::test]
async fn source_fetch_failure_returns_sentinel_and_fails_run() {
    let source = FakeSource::with_customers(vec![customer("cust-1", "Acme AS", "post@acme.no")]);
    source.fail_next_fetches(1);
    let h = harness(source);

    let outcome = completed(h.engine.run(EntityType::Customers).await.expect("run"));
    assert_eq!(outcome, SyncOutcome::SOURCE_FETCH_FAILED);
    assert_eq!(h.target.total_calls(), 0);

    let run = h.runs.latest(EntityType::Customers).expect("run recorded");
    assert_eq!(run.status, SyncRunStatus::Failed);
    assert!(run
        .error_message
        .as_deref()
        .unwrap_or_default()
        .contains("unavailable"));
    assert!(run.completed_at.is_some());
}

#[tokio::test]
async fn trigger_while_running_is_a_noop() {
    let source = FakeSource::with_customers(vec![customer("cust-1", "Acme AS", "post@acme.no")]);
    let h = harness(source);
    h.runs
        .start(EntityType::Customers, Utc::now())
        .await
        .expect("seed running run");

    let outcome = h.engine.run(EntityType::Customers).await.expect("run");
    assert_eq!(outcome, RunOutcome::AlreadyRunning);
    assert_eq!(h.source.fetch_count(), 0);
    assert_eq!(h.target.total_calls(), 0);
    // The guard did not create a second run row.
    assert_eq!(h.runs.rows.lock().unwrap().len(), 1);

    // A different entity type is not blocked by the customers run.
    let products = h.engine.run(EntityType::Products).await.expect("run");
    assert!(matches!(products, RunOutcome::Completed(_)));
}

#[tokio::test]
async fn mapping_write_failure_counts_as_record_failure() {
    let source = FakeSource::with_customers(vec![customer("cust-1", "Acme AS", "post@acme.no")]);
    let h = harness(source);
    h.mappings.fail_upserts.store(true, Ordering::SeqCst);

    let outcome = completed(h.engine.run(EntityType::Customers).await.expect("run"));
    assert_eq!(outcome, SyncOutcome { processed: 0, failed: 1 });
    let run = h.runs.latest(EntityType::Customers).expect("run recorded");
    assert_eq!(run.status, SyncRunStatus::Failed);
}

// ─────────────────────────────────────────────────────────────────────────
// Two-phase invoice/payment lifecycle
// ─────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn paid_invoice_payment_is_propagated_once() {
    let source = FakeSource::with_invoices(vec![invoice("inv-1", "2026-001", false)]);
    let h = harness(source);

    completed(h.engine.run(EntityType::Invoices).await.expect("invoice run"));
    let target_id = h
        .mappings
        .mapping(MappedEntity::Invoice, "inv-1")
        .expect("invoice mapping")
        .target_id;

    // Not paid yet: candidate set is empty.
    let outcome = completed(h.engine.run(EntityType::Payments).await.expect("payment run"));
    assert_eq!(outcome, SyncOutcome { processed: 0, failed: 0 });
    assert_eq!(h.target.payment_calls.load(Ordering::SeqCst), 0);

    h.source.set_invoices(vec![invoice("inv-1", "2026-001", true)]);
    let outcome = completed(h.engine.run(EntityType::Payments).await.expect("payment run"));
    assert_eq!(outcome, SyncOutcome { processed: 1, failed: 0 });
    assert_eq!(h.mappings.payment_synced("inv-1"), Some(true));
    let payments = h.target.payments.lock().unwrap().clone();
    assert_eq!(payments.len(), 1);
    assert_eq!(payments[0].0, target_id);

    // Flagged invoices leave the candidate set; retrying is free.
    let outcome = completed(h.engine.run(EntityType::Payments).await.expect("retry run"));
    assert_eq!(outcome, SyncOutcome { processed: 0, failed: 0 });
    assert_eq!(h.target.payment_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn unmapped_invoice_is_never_submitted_for_payment() {
    let source = FakeSource::with_invoices(vec![invoice("inv-9", "2026-009", true)]);
    let h = harness(source);

    // No invoice run has happened, so no mapping exists.
    let outcome = completed(h.engine.run(EntityType::Payments).await.expect("payment run"));
    assert_eq!(outcome, SyncOutcome { processed: 0, failed: 0 });
    assert_eq!(h.target.payment_calls.load(Ordering::SeqCst), 0);
    assert!(h.mappings.mapping(MappedEntity::Invoice, "inv-9").is_none());
}

#[tokio::test]
async fn payment_phase_does_not_touch_invoice_hash_or_target_id() {
    let source = FakeSource::with_invoices(vec![invoice("inv-1", "2026-001", true)]);
    let h = harness(source);
    completed(h.engine.run(EntityType::Invoices).await.expect("invoice run"));
    let before = h.mappings.mapping(MappedEntity::Invoice, "inv-1").unwrap();

    completed(h.engine.run(EntityType::Payments).await.expect("payment run"));
    let after = h.mappings.mapping(MappedEntity::Invoice, "inv-1").unwrap();
    assert_eq!(after.target_id, before.target_id);
    assert_eq!(after.content_hash, before.content_hash);
    assert_eq!(after.last_synced_at, before.last_synced_at);
}

// ─────────────────────────────────────────────────────────────────────────
// Orchestrator
// ─────────────────────────────────────────────────────────────────────────

#[derive(Default)]
struct FakeStateStore {
    mappings: Mutex<HashMap<String, Arc<FakeMappings>>>,
    runs: Mutex<HashMap<String, Arc<FakeRuns>>>,
}

impl SyncStateStore for FakeStateStore {
    fn mappings(&self, environment: &str) -> Arc<dyn MappingRepositoryTrait> {
        Arc::clone(
            self.mappings
                .lock()
                .unwrap()
                .entry(environment.to_string())
                .or_default(),
        ) as Arc<dyn MappingRepositoryTrait>
    }

    fn runs(&self, environment: &str) -> Arc<dyn SyncRunRepositoryTrait> {
        Arc::clone(
            self.runs
                .lock()
                .unwrap()
                .entry(environment.to_string())
                .or_insert_with(|| Arc::new(FakeRuns::for_environment(environment))),
        ) as Arc<dyn SyncRunRepositoryTrait>
    }
}

#[derive(Default)]
struct FakeTargetFactory {
    targets: Mutex<HashMap<String, Arc<FakeTarget>>>,
    broken: Mutex<HashSet<String>>,
}

impl FakeTargetFactory {
    fn break_environment(&self, environment: &str) {
        self.broken.lock().unwrap().insert(environment.to_string());
    }
}

impl TargetClientFactory for FakeTargetFactory {
    fn create(&self, environment: &TargetEnvironment) -> Result<Arc<dyn TargetClient>> {
        if self.broken.lock().unwrap().contains(&environment.id) {
            return Err(Error::configuration(format!(
                "Cannot build client for '{}'",
                environment.id
            )));
        }
        Ok(Arc::clone(
            self.targets
                .lock()
                .unwrap()
                .entry(environment.id.clone())
                .or_default(),
        ) as Arc<dyn TargetClient>)
    }
}

fn environment(id: &str) -> TargetEnvironment {
    TargetEnvironment {
        id: id.to_string(),
        endpoint: "https://api.tripletex.io/v2".to_string(),
        consumer_token: "consumer".to_string(),
        employee_token: "employee".to_string(),
        enabled: true,
    }
}

#[tokio::test]
async fn failing_environment_does_not_block_siblings() {
    let source = FakeSource::with_customers(vec![customer("cust-1", "Acme AS", "post@acme.no")]);
    // Environment A's source fetch fails; B's succeeds.
    source.fail_next_fetches(1);

    let orchestrator = SyncOrchestrator::new(
        vec![environment("club-a"), environment("club-b")],
        Arc::clone(&source) as Arc<dyn SourceClient>,
        Arc::new(FakeTargetFactory::default()),
        Arc::new(FakeStateStore::default()),
    );

    let results = orchestrator.sync_entity(EntityType::Customers).await;
    assert_eq!(results.len(), 2);

    let a = &results["club-a"];
    assert_eq!(a.status, EnvironmentSyncStatus::Failed);
    assert_eq!((a.processed, a.failed), (0, -1));

    let b = &results["club-b"];
    assert_eq!(b.status, EnvironmentSyncStatus::Completed);
    assert_eq!((b.processed, b.failed), (1, 0));
}

#[tokio::test]
async fn client_construction_failure_is_recorded_per_environment() {
    let source = FakeSource::with_customers(vec![customer("cust-1", "Acme AS", "post@acme.no")]);
    let factory = Arc::new(FakeTargetFactory::default());
    factory.break_environment("club-a");

    let orchestrator = SyncOrchestrator::new(
        vec![environment("club-a"), environment("club-b")],
        Arc::clone(&source) as Arc<dyn SourceClient>,
        Arc::clone(&factory) as Arc<dyn TargetClientFactory>,
        Arc::new(FakeStateStore::default()),
    );

    let results = orchestrator.sync_entity(EntityType::Customers).await;
    let a = &results["club-a"];
    assert_eq!(a.status, EnvironmentSyncStatus::Failed);
    assert!(a.error.as_deref().unwrap_or_default().contains("club-a"));

    let b = &results["club-b"];
    assert_eq!(b.status, EnvironmentSyncStatus::Completed);
    assert_eq!((b.processed, b.failed), (1, 0));
}

#[tokio::test]
async fn disabled_environments_are_not_attempted() {
    let source = FakeSource::with_customers(vec![customer("cust-1", "Acme AS", "post@acme.no")]);
    let mut disabled = environment("club-b");
    disabled.enabled = false;

    let orchestrator = SyncOrchestrator::new(
        vec![environment("club-a"), disabled],
        Arc::clone(&source) as Arc<dyn SourceClient>,
        Arc::new(FakeTargetFactory::default()),
        Arc::new(FakeStateStore::default()),
    );

    let results = orchestrator.sync_entity(EntityType::Customers).await;
    assert_eq!(results.len(), 1);
    assert!(results.contains_key("club-a"));
}

#[tokio::test]
async fn environments_keep_independent_mapping_state() {
    let source = FakeSource::with_customers(vec![customer("cust-1", "Acme AS", "post@acme.no")]);
    let store = Arc::new(FakeStateStore::default());

    let orchestrator = SyncOrchestrator::new(
        vec![environment("club-a"), environment("club-b")],
        Arc::clone(&source) as Arc<dyn SourceClient>,
        Arc::new(FakeTargetFactory::default()),
        Arc::clone(&store) as Arc<dyn SyncStateStore>,
    );

    let results = orchestrator.sync_entity(EntityType::Customers).await;
    assert!(results.values().all(|r| r.processed == 1));

    let mappings = store.mappings.lock().unwrap();
    for env in ["club-a", "club-b"] {
        assert!(mappings[env]
            .mapping(MappedEntity::Customer, "cust-1")
            .is_some());
    }
}
