//! Shared server state handed to every handler.

use std::sync::Arc;

use ledgersync_core::sync::{SyncOrchestrator, SyncStateStore};

pub struct AppState {
    pub orchestrator: SyncOrchestrator,
    pub store: Arc<dyn SyncStateStore>,
    /// Enabled environment ids, in configured order.
    pub environment_ids: Vec<String>,
    /// When set, sync triggers must carry this as a bearer token.
    pub trigger_secret: Option<String>,
}
