//! HTTP tool server.
//!
//! Exposes the knowledge-base tools as a JSON HTTP API for agents.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/health` | Health check (returns version) |
//! | `GET`  | `/tools/list` | List all registered tools with schemas |
//! | `POST` | `/tools/{name}` | Call a tool by name |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "query must not be empty" } }
//! ```
//!
//! Codes map to statuses in [`status_for`]. All origins, methods and headers
//! are permitted (CORS).

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};

use crate::knowledge::KnowledgeBase;
use crate::tools::{validate_params, ToolError, ToolInfo, ToolRegistry};

#[derive(Clone)]
struct AppState {
    kb: Arc<KnowledgeBase>,
    tools: Arc<ToolRegistry>,
}

/// Build the router over an open knowledge base.
pub fn router(kb: Arc<KnowledgeBase>, tools: Arc<ToolRegistry>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handle_health))
        .route("/tools/list", get(handle_list_tools))
        .route("/tools/{name}", post(handle_tool_call))
        .layer(cors)
        .with_state(AppState { kb, tools })
}

/// Serve the built-in tools on `[server].bind` until the process is stopped.
pub async fn run_server(kb: Arc<KnowledgeBase>) -> anyhow::Result<()> {
    let bind_addr = kb.config().server.bind.clone();
    let tools = Arc::new(ToolRegistry::with_builtins());
    for t in tools.tools() {
        info!(tool = t.name(), "registered tool");
    }

    let app = router(kb, tools);
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!(addr = %bind_addr, "tool server listening");
    println!("Tool server listening on http://{}", bind_addr);
    axum::serve(listener, app).await?;
    Ok(())
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

struct AppError(ToolError);

impl From<ToolError> for AppError {
    fn from(e: ToolError) -> Self {
        AppError(e)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.0.code.to_string(),
                message: self.0.message,
            },
        };
        (status_for(self.0.code), Json(body)).into_response()
    }
}

/// HTTP status for a tool error code.
pub fn status_for(code: &str) -> StatusCode {
    match code {
        "bad_request" | "file_unreadable" => StatusCode::BAD_REQUEST,
        "not_found" => StatusCode::NOT_FOUND,
        "cancelled" => StatusCode::REQUEST_TIMEOUT,
        "store_unavailable" | "retrieval_unavailable" => StatusCode::SERVICE_UNAVAILABLE,
        "rewrite_failed" | "generation_failed" | "embedding_failed" => StatusCode::BAD_GATEWAY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============ GET /tools/list ============

#[derive(Serialize)]
struct ToolListResponse {
    tools: Vec<ToolInfo>,
}

async fn handle_list_tools(State(state): State<AppState>) -> Json<ToolListResponse> {
    Json(ToolListResponse {
        tools: state.tools.infos(),
    })
}

// ============ POST /tools/{name} ============

async fn handle_tool_call(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Json(params): Json<serde_json::Value>,
) -> Result<Json<serde_json::Value>, AppError> {
    let tool = state.tools.find(&name).ok_or_else(|| ToolError {
        code: "not_found",
        message: format!("no tool registered with name: {}", name),
    })?;

    validate_params(&tool.parameters_schema(), &params)?;

    let result = tool.execute(params, &state.kb).await.map_err(|e| {
        warn!(tool = %name, code = e.code, error = %e.message, "tool call failed");
        e
    })?;

    Ok(Json(serde_json::json!({ "result": result })))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_codes_map_to_statuses() {
        assert_eq!(status_for("bad_request"), StatusCode::BAD_REQUEST);
        assert_eq!(status_for("not_found"), StatusCode::NOT_FOUND);
        assert_eq!(status_for("retrieval_unavailable"), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(status_for("generation_failed"), StatusCode::BAD_GATEWAY);
        assert_eq!(status_for("internal"), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
