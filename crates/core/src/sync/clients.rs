//! Client contracts for the two external systems.
//!
//! The engine only depends on these traits; the concrete HTTP wrappers live
//! in `ledgersync-clients` and fakes are injected in tests.

use std::sync::Arc;

use async_trait::async_trait;

use crate::errors::Result;
use crate::settings::TargetEnvironment;

use super::model::{InvoicePayment, SourceCustomer, SourceInvoice, SourceProduct};

/// Read access to the authoritative source system. Each fetch returns the
/// complete current set; the engine assumes no pagination contract beyond
/// that.
#[async_trait]
pub trait SourceClient: Send + Sync {
    async fn fetch_customers(&self) -> Result<Vec<SourceCustomer>>;
    async fn fetch_products(&self) -> Result<Vec<SourceProduct>>;
    async fn fetch_invoices(&self) -> Result<Vec<SourceInvoice>>;
}

/// Write access to one target environment. Create calls return the target
/// system's identifier for the new entity; failures surface as typed errors
/// the engine catches per record.
#[async_trait]
pub trait TargetClient: Send + Sync {
    async fn create_customer(&self, customer: &SourceCustomer) -> Result<String>;
    async fn update_customer(&self, target_id: &str, customer: &SourceCustomer) -> Result<()>;

    async fn create_product(&self, product: &SourceProduct) -> Result<String>;
    async fn update_product(&self, target_id: &str, product: &SourceProduct) -> Result<()>;

    async fn create_invoice(&self, invoice: &SourceInvoice) -> Result<String>;
    async fn update_invoice(&self, target_id: &str, invoice: &SourceInvoice) -> Result<()>;

    async fn register_invoice_payment(
        &self,
        target_id: &str,
        payment: &InvoicePayment,
    ) -> Result<()>;
}

/// Builds a target client for one environment. Construction failures are
/// caught by the orchestrator and recorded per environment.
pub trait TargetClientFactory: Send + Sync {
    fn create(&self, environment: &TargetEnvironment) -> Result<Arc<dyn TargetClient>>;
}
