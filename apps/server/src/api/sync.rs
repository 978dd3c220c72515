//! Sync trigger and run inspection endpoints.

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::{header::AUTHORIZATION, HeaderMap},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tracing::info;

use ledgersync_core::sync::{EntityType, EnvironmentSyncResult, SyncRun};

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

const DEFAULT_RUNS_LIMIT: i64 = 20;
const MAX_RUNS_LIMIT: i64 = 200;

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
}

/// Reject the request before any sync work when a trigger secret is
/// configured and the caller did not present it.
fn authorize(state: &AppState, headers: &HeaderMap) -> ApiResult<()> {
    let Some(secret) = state.trigger_secret.as_deref() else {
        return Ok(());
    };
    match bearer_token(headers) {
        Some(token) if token == secret => Ok(()),
        _ => Err(ApiError::Unauthorized(
            "Missing or invalid trigger secret".to_string(),
        )),
    }
}

fn parse_entity_type(value: &str) -> ApiResult<EntityType> {
    value
        .parse::<EntityType>()
        .map_err(ApiError::BadRequest)
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct TriggerSyncResponse {
    entity_type: EntityType,
    environments: BTreeMap<String, EnvironmentSyncResult>,
}

/// POST /api/v1/sync/{entity_type}
async fn trigger_sync(
    State(state): State<Arc<AppState>>,
    Path(entity_type): Path<String>,
    headers: HeaderMap,
) -> ApiResult<Json<TriggerSyncResponse>> {
    authorize(&state, &headers)?;
    let entity = parse_entity_type(&entity_type)?;

    info!("Triggering {} sync", entity.as_str());
    let environments = state.orchestrator.sync_entity(entity).await;

    Ok(Json(TriggerSyncResponse {
        entity_type: entity,
        environments,
    }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListRunsQuery {
    entity_type: Option<String>,
    environment: Option<String>,
    limit: Option<i64>,
}

/// GET /api/v1/sync/runs
async fn list_runs(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListRunsQuery>,
) -> ApiResult<Json<Vec<SyncRun>>> {
    let entity = query
        .entity_type
        .as_deref()
        .map(parse_entity_type)
        .transpose()?;
    let limit = query
        .limit
        .unwrap_or(DEFAULT_RUNS_LIMIT)
        .clamp(1, MAX_RUNS_LIMIT);

    let environment_ids: Vec<&str> = match query.environment.as_deref() {
        Some(environment) => {
            if !state.environment_ids.iter().any(|id| id == environment) {
                return Err(ApiError::NotFound(format!(
                    "Unknown environment '{}'",
                    environment
                )));
            }
            vec![environment]
        }
        None => state.environment_ids.iter().map(String::as_str).collect(),
    };

    let mut runs = Vec::new();
    for environment in environment_ids {
        runs.extend(state.store.runs(environment).list_recent(entity, limit)?);
    }
    runs.sort_by(|a, b| b.started_at.cmp(&a.started_at));
    runs.truncate(limit as usize);

    Ok(Json(runs))
}

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/sync/runs", get(list_runs))
        .route("/sync/{entity_type}", post(trigger_sync))
}
