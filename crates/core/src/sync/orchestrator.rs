//! Fan-out of one reconciliation request across all enabled target
//! environments.

use std::collections::BTreeMap;
use std::sync::Arc;

use log::{error, info};

use crate::errors::Result;
use crate::settings::TargetEnvironment;

use super::clients::{SourceClient, TargetClientFactory};
use super::engine::ReconciliationEngine;
use super::model::{EntityType, EnvironmentSyncResult, EnvironmentSyncStatus, RunOutcome};
use super::store::SyncStateStore;

/// Runs the engine once per enabled environment, isolating failures so one
/// broken environment never prevents the others from being attempted.
///
/// Environments are processed sequentially: they share a single source
/// client and its rate limits.
pub struct SyncOrchestrator {
    environments: Vec<TargetEnvironment>,
    source: Arc<dyn SourceClient>,
    target_factory: Arc<dyn TargetClientFactory>,
    store: Arc<dyn SyncStateStore>,
}

impl SyncOrchestrator {
    /// Disabled environments are dropped here; the orchestrator only ever
    /// sees environments it should attempt.
    pub fn new(
        environments: Vec<TargetEnvironment>,
        source: Arc<dyn SourceClient>,
        target_factory: Arc<dyn TargetClientFactory>,
        store: Arc<dyn SyncStateStore>,
    ) -> Self {
        Self {
            environments: environments.into_iter().filter(|e| e.enabled).collect(),
            source,
            target_factory,
            store,
        }
    }

    /// Reconcile one entity type into every enabled environment.
    ///
    /// The returned map always contains one entry per attempted
    /// environment; a failure (client construction included) is recorded
    /// there instead of propagating.
    pub async fn sync_entity(
        &self,
        entity: EntityType,
    ) -> BTreeMap<String, EnvironmentSyncResult> {
        let mut results = BTreeMap::new();
        for environment in &self.environments {
            let result = match self.sync_environment(environment, entity).await {
                Ok(RunOutcome::Completed(outcome)) if outcome.is_fetch_failure() => {
                    EnvironmentSyncResult {
                        status: EnvironmentSyncStatus::Failed,
                        processed: outcome.processed,
                        failed: outcome.failed,
                        error: Some("Source fetch failed; see sync run log".to_string()),
                    }
                }
                Ok(RunOutcome::Completed(outcome)) => EnvironmentSyncResult::completed(outcome),
                Ok(RunOutcome::AlreadyRunning) => EnvironmentSyncResult::already_running(),
                Err(err) => {
                    error!(
                        "{} sync failed for environment '{}': {}",
                        entity.as_str(),
                        environment.id,
                        err
                    );
                    EnvironmentSyncResult::failed(err.to_string())
                }
            };
            info!(
                "{} sync for environment '{}': {:?} (processed={}, failed={})",
                entity.as_str(),
                environment.id,
                result.status,
                result.processed,
                result.failed
            );
            results.insert(environment.id.clone(), result);
        }
        results
    }

    async fn sync_environment(
        &self,
        environment: &TargetEnvironment,
        entity: EntityType,
    ) -> Result<RunOutcome> {
        let target = self.target_factory.create(environment)?;
        let engine = ReconciliationEngine::new(
            environment.id.clone(),
            Arc::clone(&self.source),
            target,
            self.store.mappings(&environment.id),
            self.store.runs(&environment.id),
        );
        engine.run(entity).await
    }
}
