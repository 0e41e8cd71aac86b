use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use std::collections::HashMap;
use tracing::error;

use super::{RequestIdentity, UpsertFeatureRequest};
use crate::evaluation::{FeatureDefinition, FeatureEvaluation};
use crate::state::AppState;

/// Check a single flag for the calling identity
pub async fn is_enabled(
    State(state): State<AppState>,
    Path(name): Path<String>,
    RequestIdentity(ctx): RequestIdentity,
) -> Json<bool> {
    Json(state.manager.is_enabled(&name, &ctx))
}

/// Same check, with the reason behind the decision
pub async fn evaluation(
    State(state): State<AppState>,
    Path(name): Path<String>,
    RequestIdentity(ctx): RequestIdentity,
) -> Json<FeatureEvaluation> {
    Json(state.manager.evaluate(&name, &ctx))
}

/// Every known flag and its state for the calling identity
pub async fn list(
    State(state): State<AppState>,
    RequestIdentity(ctx): RequestIdentity,
) -> Json<HashMap<String, bool>> {
    Json(state.manager.get_all_features(&ctx))
}

/// Reload definitions from the repository now
pub async fn refresh(State(state): State<AppState>) -> Result<StatusCode, (StatusCode, String)> {
    state.manager.refresh().await.map_err(|e| {
        error!(error = %e, "manual refresh failed");
        (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
    })?;

    Ok(StatusCode::NO_CONTENT)
}

/// Add or replace a definition in the live repository
pub async fn upsert(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Json(payload): Json<UpsertFeatureRequest>,
) -> Result<StatusCode, (StatusCode, String)> {
    let def = FeatureDefinition::new(name, payload.enabled, payload.filters);
    state
        .manager
        .repository()
        .add_feature(def)
        .map_err(|e| (StatusCode::BAD_REQUEST, e.to_string()))?;

    Ok(StatusCode::NO_CONTENT)
}
