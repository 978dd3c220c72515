//! Storage-level errors, converted to the domain error at the crate
//! boundary.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error(transparent)]
    Query(#[from] diesel::result::Error),

    #[error("Connection error: {0}")]
    Connection(#[from] diesel::ConnectionError),

    #[error("Connection pool error: {0}")]
    Pool(#[from] diesel::r2d2::PoolError),

    #[error("Migration error: {0}")]
    Migration(String),

    #[error("Write actor unavailable: {0}")]
    WriterGone(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Domain error raised inside a storage closure; passed through
    /// unchanged so callers still see e.g. `RunAlreadyActive`.
    #[error(transparent)]
    Domain(#[from] ledgersync_core::Error),
}

impl From<StorageError> for ledgersync_core::Error {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::Domain(inner) => inner,
            other => ledgersync_core::Error::database(other.to_string()),
        }
    }
}
