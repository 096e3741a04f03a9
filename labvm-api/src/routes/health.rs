use crate::state::AppState;
use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use labvm_core::{is_tool_installed, REQUIRED_TOOLS};
use serde_json::{json, Map, Value};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health_check))
        .route("/health/ready", get(readiness_check))
}

#[utoipa::path(
    get,
    path = "/health",
    responses((status = 200, description = "Service is up")),
    tag = "health"
)]
pub async fn health_check() -> Json<Value> {
    Json(json!({
        "success": true,
        "message": "ok",
        "service": "labvm-api",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

#[utoipa::path(
    get,
    path = "/health/ready",
    responses(
        (status = 200, description = "Database reachable"),
        (status = 503, description = "Database unreachable")
    ),
    tag = "health"
)]
pub async fn readiness_check(State(state): State<AppState>) -> (StatusCode, Json<Value>) {
    // Check database connectivity
    let db_ok = sqlx::query("SELECT 1")
        .fetch_one(state.orchestrator.pool())
        .await
        .is_ok();

    // Missing tools are reported, not fatal: the hypervisor may be remote.
    let tools: Map<String, Value> = REQUIRED_TOOLS
        .iter()
        .map(|tool| (tool.to_string(), Value::Bool(is_tool_installed(tool))))
        .collect();

    let status = if db_ok {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        status,
        Json(json!({
            "success": db_ok,
            "message": if db_ok { "ready" } else { "not_ready" },
            "service": "labvm-api",
            "version": env!("CARGO_PKG_VERSION"),
            "database": if db_ok { "connected" } else { "disconnected" },
            "tools": tools
        })),
    )
}
