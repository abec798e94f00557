use axum::{extract::State, http::StatusCode, Json};
use serde::Serialize;

use crate::logging::ActivityLogger;

#[derive(Serialize)]
pub struct HealthResponse {
    status: String,
    version: String,
}

pub async fn health_check() -> (StatusCode, Json<HealthResponse>) {
    (
        StatusCode::OK,
        Json(HealthResponse {
            status: "healthy".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }),
    )
}

#[derive(Serialize)]
pub struct ReadinessResponse {
    status: String,
    activity_journal: bool,
    activity_queue: usize,
}

pub async fn readiness_check(
    State(activity): State<ActivityLogger>,
) -> (StatusCode, Json<ReadinessResponse>) {
    (
        StatusCode::OK,
        Json(ReadinessResponse {
            status: "ready".to_string(),
            activity_journal: activity.is_enabled(),
            activity_queue: activity.queue_len(),
        }),
    )
}
