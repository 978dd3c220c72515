//! Sqlite persistence for the reconciliation engine: identity mappings,
//! sync run bookkeeping, migrations and the single-writer actor.

pub mod db;
pub mod errors;
pub mod schema;
pub mod sync;

pub use db::{create_pool, get_connection, init, run_migrations, spawn_writer, WriteHandle};
pub use errors::StorageError;
pub use sync::{MappingRepository, SqliteSyncStore, SyncRunRepository};
