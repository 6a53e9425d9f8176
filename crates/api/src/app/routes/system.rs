use axum::Json;
use serde_json::{Value, json};

pub async fn readiness() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

pub async fn liveness() -> Json<Value> {
    Json(json!({
        "status": "up",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}
