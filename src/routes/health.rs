use axum::{extract::State, http::StatusCode, Json};
use serde::Serialize;

use crate::state::AppState;

#[derive(Serialize)]
pub struct HealthData {
    status: u16,
    source: &'static str,
    features: usize,
}

pub async fn health(State(state): State<AppState>) -> Json<HealthData> {
    let repository = state.manager.repository();
    let health_data = HealthData {
        status: StatusCode::OK.as_u16(),
        source: repository.name(),
        features: repository.get_all_features().len(),
    };
    Json(health_data)
}
