//! Database models for the sync state tables. Timestamps are stored as
//! RFC 3339 TEXT.

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};

use ledgersync_core::errors::Result;
use ledgersync_core::sync::{EntityMapping, InvoiceMappingInfo, SyncRun};

pub(crate) fn enum_to_db<T: serde::Serialize>(value: &T) -> Result<String> {
    Ok(serde_json::to_string(value)?.trim_matches('"').to_string())
}

pub(crate) fn enum_from_db<T: serde::de::DeserializeOwned>(value: &str) -> Result<T> {
    Ok(serde_json::from_str(&format!("\"{}\"", value))?)
}

pub(crate) fn timestamp_from_db(value: &str) -> Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(value)
        .map_err(|e| {
            ledgersync_core::Error::database(format!("Invalid stored timestamp '{}': {}", value, e))
        })?
        .with_timezone(&Utc))
}

#[derive(
    Queryable,
    Identifiable,
    Insertable,
    AsChangeset,
    Selectable,
    Debug,
    Clone,
    Serialize,
    Deserialize,
)]
#[diesel(primary_key(environment, source_id))]
#[diesel(table_name = crate::schema::customer_mappings)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct CustomerMappingDB {
    pub environment: String,
    pub source_id: String,
    pub target_id: String,
    pub content_hash: Option<String>,
    pub last_synced_at: String,
}

#[derive(
    Queryable,
    Identifiable,
    Insertable,
    AsChangeset,
    Selectable,
    Debug,
    Clone,
    Serialize,
    Deserialize,
)]
#[diesel(primary_key(environment, source_id))]
#[diesel(table_name = crate::schema::product_mappings)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct ProductMappingDB {
    pub environment: String,
    pub source_id: String,
    pub target_id: String,
    pub content_hash: Option<String>,
    pub last_synced_at: String,
}

#[derive(
    Queryable,
    Identifiable,
    Insertable,
    AsChangeset,
    Selectable,
    Debug,
    Clone,
    Serialize,
    Deserialize,
)]
#[diesel(primary_key(environment, source_id))]
#[diesel(table_name = crate::schema::invoice_mappings)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct InvoiceMappingDB {
    pub environment: String,
    pub source_id: String,
    pub target_id: String,
    pub content_hash: Option<String>,
    pub invoice_number: String,
    pub payment_synced: i32,
    pub last_synced_at: String,
}

#[derive(
    Queryable,
    Identifiable,
    Insertable,
    AsChangeset,
    Selectable,
    Debug,
    Clone,
    Serialize,
    Deserialize,
)]
#[diesel(table_name = crate::schema::sync_runs)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct SyncRunDB {
    pub id: String,
    pub entity_type: String,
    pub environment: String,
    pub status: String,
    pub records_processed: i64,
    pub records_failed: i64,
    pub started_at: String,
    pub completed_at: Option<String>,
    pub error_message: Option<String>,
}

impl CustomerMappingDB {
    pub fn into_domain(self) -> Result<EntityMapping> {
        Ok(EntityMapping {
            source_id: self.source_id,
            target_id: self.target_id,
            content_hash: self.content_hash,
            last_synced_at: timestamp_from_db(&self.last_synced_at)?,
        })
    }
}

impl ProductMappingDB {
    pub fn into_domain(self) -> Result<EntityMapping> {
        Ok(EntityMapping {
            source_id: self.source_id,
            target_id: self.target_id,
            content_hash: self.content_hash,
            last_synced_at: timestamp_from_db(&self.last_synced_at)?,
        })
    }
}

impl InvoiceMappingDB {
    pub fn into_domain(self) -> Result<EntityMapping> {
        Ok(EntityMapping {
            source_id: self.source_id,
            target_id: self.target_id,
            content_hash: self.content_hash,
            last_synced_at: timestamp_from_db(&self.last_synced_at)?,
        })
    }

    pub fn into_payment_info(self) -> InvoiceMappingInfo {
        InvoiceMappingInfo {
            source_id: self.source_id,
            target_id: self.target_id,
            invoice_number: self.invoice_number,
            payment_synced: self.payment_synced != 0,
        }
    }
}

impl SyncRunDB {
    pub fn into_domain(self) -> Result<SyncRun> {
        Ok(SyncRun {
            entity_type: enum_from_db(&self.entity_type)?,
            status: enum_from_db(&self.status)?,
            started_at: timestamp_from_db(&self.started_at)?,
            completed_at: self
                .completed_at
                .as_deref()
                .map(timestamp_from_db)
                .transpose()?,
            id: self.id,
            environment: self.environment,
            records_processed: self.records_processed,
            records_failed: self.records_failed,
            error_message: self.error_message,
        })
    }
}
