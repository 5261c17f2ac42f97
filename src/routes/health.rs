use axum::{extract::State, http::StatusCode, response::Json};
use diesel::connection::SimpleConnection;
use serde_json::json;

use crate::state::AppState;

pub async fn health_check(State(state): State<AppState>) -> (StatusCode, Json<serde_json::Value>) {
    let database = match state.db() {
        Ok(mut conn) => conn.batch_execute("SELECT 1").is_ok(),
        Err(_) => false,
    };

    if database {
        (StatusCode::OK, Json(json!({ "status": "ok" })))
    } else {
        tracing::warn!("health check could not reach the database");
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "status": "degraded" })),
        )
    }
}
