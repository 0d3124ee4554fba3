// libs/schedule-cell/src/router.rs
use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};

use shared_config::AppConfig;

use crate::handlers::{
    self, ScheduleHandlers,
};

pub fn schedule_routes(config: Arc<AppConfig>) -> Router {
    let handlers = Arc::new(ScheduleHandlers::new(config));

    Router::new()
        .route("/optimize", post(handlers::optimize_schedule))
        .route("/{schedule_id}/conflicts", get(handlers::get_schedule_conflicts))
        .route("/{schedule_id}/efficiency", get(handlers::get_schedule_efficiency))
        .with_state(handlers)
}
