use axum::{
    routing::{get, post},
    Router,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

mod features;
mod health;

pub use health::health;

use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    let feature_router = Router::new()
        .route("/", get(features::routes::list))
        .route("/refresh", post(features::routes::refresh))
        .route(
            "/{name}",
            get(features::routes::is_enabled).put(features::routes::upsert),
        )
        .route("/{name}/evaluation", get(features::routes::evaluation));

    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .nest("/features", feature_router)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

async fn root() -> &'static str {
    "Feature manager service"
}
