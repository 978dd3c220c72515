//! Sqlite-backed mapping store and sync run recorder.
//!
//! Repositories are scoped to one target environment at construction;
//! every query filters on that environment so tenants never see each
//! other's rows. Reads go through the pool, writes through the writer
//! actor.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use uuid::Uuid;

use ledgersync_core::errors::{Error, Result};
use ledgersync_core::sync::{
    EntityMapping, EntityType, InvoiceMappingInfo, MappedEntity, MappingRepositoryTrait,
    MappingUpsert, RunCompletion, SyncRun, SyncRunRepositoryTrait, SyncRunStatus, SyncStateStore,
};

use crate::db::{get_connection, DbPool, WriteHandle};
use crate::errors::StorageError;
use crate::schema::{customer_mappings, invoice_mappings, product_mappings, sync_runs};

use super::model::{
    enum_to_db, CustomerMappingDB, InvoiceMappingDB, ProductMappingDB, SyncRunDB,
};

pub struct MappingRepository {
    pool: Arc<DbPool>,
    writer: WriteHandle,
    environment: String,
}

impl MappingRepository {
    pub fn new(pool: Arc<DbPool>, writer: WriteHandle, environment: impl Into<String>) -> Self {
        Self {
            pool,
            writer,
            environment: environment.into(),
        }
    }
}

#[async_trait]
impl MappingRepositoryTrait for MappingRepository {
    fn find(&self, entity: MappedEntity, source_id: &str) -> Result<Option<EntityMapping>> {
        let mut conn = get_connection(&self.pool)?;
        let key = (&self.environment, source_id);

        match entity {
            MappedEntity::Customer => customer_mappings::table
                .find(key)
                .first::<CustomerMappingDB>(&mut conn)
                .optional()
                .map_err(StorageError::from)?
                .map(CustomerMappingDB::into_domain)
                .transpose(),
            MappedEntity::Product => product_mappings::table
                .find(key)
                .first::<ProductMappingDB>(&mut conn)
                .optional()
                .map_err(StorageError::from)?
                .map(ProductMappingDB::into_domain)
                .transpose(),
            MappedEntity::Invoice => invoice_mappings::table
                .find(key)
                .first::<InvoiceMappingDB>(&mut conn)
                .optional()
                .map_err(StorageError::from)?
                .map(InvoiceMappingDB::into_domain)
                .transpose(),
        }
    }

    async fn upsert(&self, entity: MappedEntity, upsert: MappingUpsert) -> Result<()> {
        let environment = self.environment.clone();
        self.writer
            .exec(move |conn| {
                let synced_at = upsert.synced_at.to_rfc3339();
                match entity {
                    MappedEntity::Customer => {
                        let row = CustomerMappingDB {
                            environment,
                            source_id: upsert.source_id,
                            target_id: upsert.target_id,
                            content_hash: Some(upsert.content_hash),
                            last_synced_at: synced_at,
                        };
                        diesel::insert_into(customer_mappings::table)
                            .values(&row)
                            .on_conflict((
                                customer_mappings::environment,
                                customer_mappings::source_id,
                            ))
                            .do_update()
                            .set((
                                customer_mappings::target_id.eq(row.target_id.clone()),
                                customer_mappings::content_hash.eq(row.content_hash.clone()),
                                customer_mappings::last_synced_at.eq(row.last_synced_at.clone()),
                            ))
                            .execute(conn)
                            .map_err(StorageError::from)?;
                    }
                    MappedEntity::Product => {
                        let row = ProductMappingDB {
                            environment,
                            source_id: upsert.source_id,
                            target_id: upsert.target_id,
                            content_hash: Some(upsert.content_hash),
                            last_synced_at: synced_at,
                        };
                        diesel::insert_into(product_mappings::table)
                            .values(&row)
                            .on_conflict((
                                product_mappings::environment,
                                product_mappings::source_id,
                            ))
                            .do_update()
                            .set((
                                product_mappings::target_id.eq(row.target_id.clone()),
                                product_mappings::content_hash.eq(row.content_hash.clone()),
                                product_mappings::last_synced_at.eq(row.last_synced_at.clone()),
                            ))
                            .execute(conn)
                            .map_err(StorageError::from)?;
                    }
                    MappedEntity::Invoice => {
                        let invoice_number = upsert.invoice_number.ok_or_else(|| {
                            Error::database("Invoice mapping requires an invoice number")
                        })?;
                        let row = InvoiceMappingDB {
                            environment,
                            source_id: upsert.source_id,
                            target_id: upsert.target_id,
                            content_hash: Some(upsert.content_hash),
                            invoice_number,
                            payment_synced: 0,
                            last_synced_at: synced_at,
                        };
                        // payment_synced is deliberately absent from the
                        // update set: an invoice re-sync never reopens a
                        // settled payment.
                        diesel::insert_into(invoice_mappings::table)
                            .values(&row)
                            .on_conflict((
                                invoice_mappings::environment,
                                invoice_mappings::source_id,
                            ))
                            .do_update()
                            .set((
                                invoice_mappings::target_id.eq(row.target_id.clone()),
                                invoice_mappings::content_hash.eq(row.content_hash.clone()),
                                invoice_mappings::invoice_number.eq(row.invoice_number.clone()),
                                invoice_mappings::last_synced_at.eq(row.last_synced_at.clone()),
                            ))
                            .execute(conn)
                            .map_err(StorageError::from)?;
                    }
                }
                Ok(())
            })
            .await
    }

    fn list_pending_payment_invoices(&self) -> Result<Vec<InvoiceMappingInfo>> {
        let mut conn = get_connection(&self.pool)?;
        let rows = invoice_mappings::table
            .filter(invoice_mappings::environment.eq(&self.environment))
            .filter(invoice_mappings::payment_synced.eq(0))
            .order(invoice_mappings::source_id.asc())
            .load::<InvoiceMappingDB>(&mut conn)
            .map_err(StorageError::from)?;
        Ok(rows
            .into_iter()
            .map(InvoiceMappingDB::into_payment_info)
            .collect())
    }

    async fn mark_invoice_payment_synced(&self, source_id: &str) -> Result<()> {
        let environment = self.environment.clone();
        let source_id = source_id.to_string();
        self.writer
            .exec(move |conn| {
                let updated = diesel::update(
                    invoice_mappings::table
                        .filter(invoice_mappings::environment.eq(&environment))
                        .filter(invoice_mappings::source_id.eq(&source_id)),
                )
                .set(invoice_mappings::payment_synced.eq(1))
                .execute(conn)
                .map_err(StorageError::from)?;

                if updated == 0 {
                    return Err(Error::database(format!(
                        "No invoice mapping for '{}' in environment '{}'",
                        source_id, environment
                    )));
                }
                Ok(())
            })
            .await
    }
}

pub struct SyncRunRepository {
    pool: Arc<DbPool>,
    writer: WriteHandle,
    environment: String,
}

impl SyncRunRepository {
    pub fn new(pool: Arc<DbPool>, writer: WriteHandle, environment: impl Into<String>) -> Self {
        Self {
            pool,
            writer,
            environment: environment.into(),
        }
    }
}

#[async_trait]
impl SyncRunRepositoryTrait for SyncRunRepository {
    fn find_running(&self, entity: EntityType) -> Result<Option<SyncRun>> {
        let mut conn = get_connection(&self.pool)?;
        sync_runs::table
            .filter(sync_runs::environment.eq(&self.environment))
            .filter(sync_runs::entity_type.eq(enum_to_db(&entity)?))
            .filter(sync_runs::status.eq(enum_to_db(&SyncRunStatus::Running)?))
            .first::<SyncRunDB>(&mut conn)
            .optional()
            .map_err(StorageError::from)?
            .map(SyncRunDB::into_domain)
            .transpose()
    }

    async fn start(&self, entity: EntityType, started_at: DateTime<Utc>) -> Result<String> {
        let environment = self.environment.clone();
        // Guard check and insert share one IMMEDIATE transaction, so two
        // concurrent triggers cannot both create a running run.
        self.writer
            .exec(move |conn| {
                let running: i64 = sync_runs::table
                    .filter(sync_runs::environment.eq(&environment))
                    .filter(sync_runs::entity_type.eq(enum_to_db(&entity)?))
                    .filter(sync_runs::status.eq(enum_to_db(&SyncRunStatus::Running)?))
                    .count()
                    .get_result(conn)
                    .map_err(StorageError::from)?;
                if running > 0 {
                    return Err(Error::RunAlreadyActive {
                        entity: entity.as_str().to_string(),
                        environment: environment.clone(),
                    });
                }

                let row = SyncRunDB {
                    id: Uuid::new_v4().to_string(),
                    entity_type: enum_to_db(&entity)?,
                    environment,
                    status: enum_to_db(&SyncRunStatus::Running)?,
                    records_processed: 0,
                    records_failed: 0,
                    started_at: started_at.to_rfc3339(),
                    completed_at: None,
                    error_message: None,
                };
                diesel::insert_into(sync_runs::table)
                    .values(&row)
                    .execute(conn)
                    .map_err(StorageError::from)?;
                Ok(row.id)
            })
            .await
    }

    async fn complete(&self, run_id: &str, completion: RunCompletion) -> Result<()> {
        let run_id = run_id.to_string();
        self.writer
            .exec(move |conn| {
                let updated = diesel::update(
                    sync_runs::table
                        .find(&run_id)
                        .filter(sync_runs::completed_at.is_null()),
                )
                .set((
                    sync_runs::status.eq(enum_to_db(&completion.status)?),
                    sync_runs::records_processed.eq(completion.records_processed),
                    sync_runs::records_failed.eq(completion.records_failed),
                    sync_runs::completed_at.eq(Some(completion.completed_at.to_rfc3339())),
                    sync_runs::error_message.eq(completion.error_message.clone()),
                ))
                .execute(conn)
                .map_err(StorageError::from)?;

                if updated == 0 {
                    return Err(Error::database(format!(
                        "Sync run '{}' is missing or already completed",
                        run_id
                    )));
                }
                Ok(())
            })
            .await
    }

    fn list_recent(&self, entity: Option<EntityType>, limit: i64) -> Result<Vec<SyncRun>> {
        let mut conn = get_connection(&self.pool)?;
        let mut query = sync_runs::table
            .filter(sync_runs::environment.eq(&self.environment))
            .into_boxed();
        if let Some(entity) = entity {
            query = query.filter(sync_runs::entity_type.eq(enum_to_db(&entity)?));
        }
        let rows = query
            .order(sync_runs::started_at.desc())
            .limit(limit)
            .load::<SyncRunDB>(&mut conn)
            .map_err(StorageError::from)?;
        rows.into_iter().map(SyncRunDB::into_domain).collect()
    }
}

/// Hands out environment-scoped repositories over one shared pool and
/// writer.
pub struct SqliteSyncStore {
    pool: Arc<DbPool>,
    writer: WriteHandle,
}

impl SqliteSyncStore {
    pub fn new(pool: Arc<DbPool>, writer: WriteHandle) -> Self {
        Self { pool, writer }
    }
}

impl SyncStateStore for SqliteSyncStore {
    fn mappings(&self, environment: &str) -> Arc<dyn MappingRepositoryTrait> {
        Arc::new(MappingRepository::new(
            Arc::clone(&self.pool),
            self.writer.clone(),
            environment,
        ))
    }

    fn runs(&self, environment: &str) -> Arc<dyn SyncRunRepositoryTrait> {
        Arc::new(SyncRunRepository::new(
            Arc::clone(&self.pool),
            self.writer.clone(),
            environment,
        ))
    }
}
