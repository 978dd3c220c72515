//! Persistence contracts for the mapping store and the sync run recorder.
//!
//! Implementations are handed out pre-scoped to one environment, so every
//! operation is keyed by the entity's source id alone. The sqlite
//! implementation lives in `ledgersync-storage-sqlite`.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::errors::Result;

use super::model::{
    EntityMapping, EntityType, InvoiceMappingInfo, MappedEntity, MappingUpsert, RunCompletion,
    SyncRun,
};

/// Persisted source-id -> target-id correspondence for one environment.
#[async_trait]
pub trait MappingRepositoryTrait: Send + Sync {
    /// Local persistence read; never performs network I/O.
    fn find(&self, entity: MappedEntity, source_id: &str) -> Result<Option<EntityMapping>>;

    /// Idempotent single-row upsert keyed by the immutable source id.
    async fn upsert(&self, entity: MappedEntity, upsert: MappingUpsert) -> Result<()>;

    /// Invoice mappings still awaiting payment propagation
    /// (`payment_synced = false`).
    fn list_pending_payment_invoices(&self) -> Result<Vec<InvoiceMappingInfo>>;

    /// Flag an existing invoice mapping as payment-synced. Never creates a
    /// mapping; fails if the row does not exist.
    async fn mark_invoice_payment_synced(&self, source_id: &str) -> Result<()>;
}

/// Lifecycle records of reconciliation attempts for one environment.
#[async_trait]
pub trait SyncRunRepositoryTrait: Send + Sync {
    fn find_running(&self, entity: EntityType) -> Result<Option<SyncRun>>;

    /// Create a run with status `running`. The check for an existing running
    /// run and the insert happen atomically; a concurrent trigger gets
    /// [`crate::errors::Error::RunAlreadyActive`].
    async fn start(&self, entity: EntityType, started_at: DateTime<Utc>) -> Result<String>;

    /// Terminal transition; sets `completed_at` exactly once.
    async fn complete(&self, run_id: &str, completion: RunCompletion) -> Result<()>;

    /// Most recent runs, newest first.
    fn list_recent(&self, entity: Option<EntityType>, limit: i64) -> Result<Vec<SyncRun>>;
}

/// Hands out environment-scoped repositories over shared storage.
pub trait SyncStateStore: Send + Sync {
    fn mappings(&self, environment: &str) -> Arc<dyn MappingRepositoryTrait>;
    fn runs(&self, environment: &str) -> Arc<dyn SyncRunRepositoryTrait>;
}
