//! HTTP 接口

use axum::{extract::State, Json};
use serde_json::{json, Value};

use crate::server::registry::SessionMetadata;
use crate::server::AppState;

/// 健康检查
pub async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

/// 当前终端会话列表
pub async fn list_sessions(State(state): State<AppState>) -> Json<Vec<SessionMetadata>> {
    Json(state.registry.list().await)
}
