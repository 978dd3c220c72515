//! Error types for the reconciliation core.

use thiserror::Error;

/// Result type alias for reconciliation operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur during reconciliation.
#[derive(Debug, Error)]
pub enum Error {
    /// Invalid endpoint, unknown provider or malformed settings. Fatal at
    /// load time; no run is started with a bad configuration.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Trigger credential mismatch. Rejected before any sync work.
    #[error("Authentication error: {0}")]
    Authentication(String),

    /// The full source entity set could not be retrieved. Fatal to the
    /// affected run only.
    #[error("Source fetch failed: {0}")]
    SourceFetch(String),

    /// A single entity's create/update failed. Recovered locally and
    /// tallied; the run continues.
    #[error("Record sync failed for {entity} '{source_id}': {message}")]
    RecordSync {
        entity: String,
        source_id: String,
        message: String,
    },

    /// A sync run is already active for this (entity type, environment)
    /// pair. The engine treats this as a no-op, not a failure.
    #[error("Sync run already active for {entity} in environment '{environment}'")]
    RunAlreadyActive { entity: String, environment: String },

    /// Persistence failure from the mapping/run store.
    #[error("Database error: {0}")]
    Database(String),

    /// Error response from an external API.
    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    /// Transport-level HTTP failure (timeout, connect, body read).
    #[error("Transport error: {0}")]
    Transport(String),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Create a configuration error
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    /// Create an authentication error
    pub fn authentication(message: impl Into<String>) -> Self {
        Self::Authentication(message.into())
    }

    /// Create a source fetch error
    pub fn source_fetch(message: impl Into<String>) -> Self {
        Self::SourceFetch(message.into())
    }

    /// Create an API error from status and message
    pub fn api(status: u16, message: impl Into<String>) -> Self {
        Self::Api {
            status,
            message: message.into(),
        }
    }

    /// Create a database error
    pub fn database(message: impl Into<String>) -> Self {
        Self::Database(message.into())
    }

    /// Create a transport error
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport(message.into())
    }
}
