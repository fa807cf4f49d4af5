//! A liveness probe for load balancers and uptime checks.

use axum::Json;
use serde_json::{Value, json};

/// Respond with `{"status": "ok"}`.
pub async fn get_health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}
