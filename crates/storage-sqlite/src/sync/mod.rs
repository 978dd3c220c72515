//! Sqlite storage for sync state (entity mappings, sync runs).

pub mod model;
pub mod repository;

pub use model::{CustomerMappingDB, InvoiceMappingDB, ProductMappingDB, SyncRunDB};
pub use repository::{MappingRepository, SqliteSyncStore, SyncRunRepository};
