use crate::state::AppState;
use axum::Router;
use axum::routing::{get, post};
use std::sync::{Arc, RwLock};

pub mod handlers;
pub mod responses;

pub fn router(state: Arc<RwLock<AppState>>) -> Router {
    Router::new()
        .route("/api/events", post(handlers::post_event))
        .route("/api/prediction", get(handlers::get_prediction))
        .route("/api/health", get(handlers::get_health))
        .route(
            "/api/crossing",
            get(handlers::get_crossing).put(handlers::put_crossing),
        )
        .with_state(state)
}
